//! Track chunk data enums and structs

use event::ChannelVoiceEvent;
use meta::{MetaEvent, TempoEvent};
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::reader::ReadError;

pub mod decoder;
pub mod event;
pub mod meta;

pub use decoder::EventDecoder;

/// Error types from decoding a track's events
#[derive(Error, Debug)]
pub enum TrackError {
    /// The track's bytes ran out before an End of Track meta event
    #[error("Track ended without an End of Track event (reached tick {tick})")]
    TruncatedTrack {
        /// Tick reached when the bytes ran out
        tick: u64,
    },
    /// A Tempo, Time Signature or Key Signature event with the wrong payload size
    #[error("Meta event {meta_type:#04x} carries {found} bytes, expected {expected}")]
    MalformedMetaEvent {
        /// The meta event type byte
        meta_type: u8,
        /// Payload size the event type requires
        expected: u32,
        /// Payload size the file declares
        found: u32,
    },
    /// A Tempo event of zero microseconds per quarter note
    #[error("Tempo event at tick {tick} declares zero microseconds per quarter note")]
    ZeroTempo {
        /// Absolute tick of the event
        tick: u64,
    },
    /// A data byte appeared where a status byte was needed and no running status applies
    #[error("Data byte {byte:#04x} at tick {tick} with no running status in effect")]
    MissingRunningStatus {
        /// The stray data byte
        byte: u8,
        /// Absolute tick of the event
        tick: u64,
    },
    /// The underlying source failed
    #[error("Failed to read track data: {0}")]
    Read(ReadError),
}

impl TrackError {
    /// Lifts a read failure at `tick`: running off the window means the track is truncated
    pub(crate) fn from_read(error: ReadError, tick: u64) -> Self {
        match error {
            ReadError::OutOfRange { .. } => Self::TruncatedTrack { tick },
            other => Self::Read(other),
        }
    }

    /// Returns if the failure came from the byte source rather than the track's contents
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Read(ReadError::Io(_)))
    }
}

/// Counters produced by the enumeration pass over one track
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackSummary {
    /// Note On events with a non-zero velocity
    pub note_count: u64,
    /// Channel voice events plus counted meta events
    pub event_count: u64,
    /// Sum of all delta-times up to and including End of Track
    pub length_ticks: u64,
}

/// Every event a track holds, split by kind, in file order
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackEvents {
    /// Channel voice messages
    pub channel: Vec<ChannelVoiceEvent>,
    /// Meta events other than Tempo
    pub meta: Vec<MetaEvent>,
    /// Tempo changes
    pub tempo: Vec<TempoEvent>,
}

impl TrackEvents {
    /// Total number of recorded events
    pub fn len(&self) -> usize {
        self.channel.len() + self.meta.len() + self.tempo.len()
    }

    /// Returns if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
