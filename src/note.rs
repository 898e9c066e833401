//! Reconstructed notes: matched Note On / Note Off pairs on an absolute tick timeline

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod stack;

pub use stack::{NoteStack, NoteStackTable, StackArena, StackCursor};

/// A note with absolute start and end positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Note {
    /// MIDI channel, 0-15
    pub channel: u8,
    /// Key number
    pub pitch: u8,
    /// Velocity of the Note On that opened the note
    pub velocity: u8,
    /// Absolute tick of the Note On
    pub start_tick: u64,
    /// Absolute tick of the matching Note Off, `None` until the note is closed
    pub end_tick: Option<u64>,
}

impl Note {
    /// An open note starting at `start_tick`
    pub fn open(channel: u8, pitch: u8, velocity: u8, start_tick: u64) -> Self {
        Self {
            channel,
            pitch,
            velocity,
            start_tick,
            end_tick: None,
        }
    }

    /// Returns if a Note Off (or the end of the track) has closed the note
    pub fn is_closed(&self) -> bool {
        self.end_tick.is_some()
    }

    /// Length in ticks of a closed note
    pub fn duration(&self) -> Option<u64> {
        self.end_tick.map(|end| end.saturating_sub(self.start_tick))
    }
}
