//! Channel voice messages

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The seven channel voice message types, keyed by the high nibble of their status byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ChannelEventKind {
    /// Turn Off event, status 0x8n.
    /// Note On events with a velocity of 0 are recorded as this kind as well
    NoteOff,
    /// Turn On event, status 0x9n
    NoteOn,
    /// Polyphonic Key Pressure, status 0xAn
    KeyPressure,
    /// Control change, status 0xBn
    ControlChange,
    /// Program change, status 0xCn
    ProgramChange,
    /// Channel Pressure, status 0xDn
    ChannelPressure,
    /// Pitch Wheel Change, status 0xEn
    PitchWheel,
}

impl ChannelEventKind {
    /// Maps a status byte to its message type, `None` for system and meta statuses
    pub fn from_status(status: u8) -> Option<Self> {
        match status >> 4 {
            0x8 => Some(Self::NoteOff),
            0x9 => Some(Self::NoteOn),
            0xA => Some(Self::KeyPressure),
            0xB => Some(Self::ControlChange),
            0xC => Some(Self::ProgramChange),
            0xD => Some(Self::ChannelPressure),
            0xE => Some(Self::PitchWheel),
            _ => None,
        }
    }

    /// Number of data bytes following the status byte
    pub fn data_len(self) -> usize {
        match self {
            Self::ProgramChange | Self::ChannelPressure => 1,
            _ => 2,
        }
    }
}

/// A decoded channel voice message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChannelVoiceEvent {
    /// Message type
    pub kind: ChannelEventKind,
    /// Ticks since the previous event of the track
    pub delta_ticks: u32,
    /// MIDI channel, 0-15
    pub channel: u8,
    /// Data bytes, only the first [`ChannelEventKind::data_len`] are meaningful
    pub data: [u8; 2],
}

impl ChannelVoiceEvent {
    /// The meaningful data bytes
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.kind.data_len()]
    }

    /// Key of a note or key pressure message
    pub fn key(&self) -> Option<u8> {
        match self.kind {
            ChannelEventKind::NoteOff | ChannelEventKind::NoteOn | ChannelEventKind::KeyPressure => {
                Some(self.data[0])
            }
            _ => None,
        }
    }

    /// The 14 bit pitch wheel value, 0x2000 being centered
    pub fn pitch_wheel(&self) -> Option<u16> {
        (self.kind == ChannelEventKind::PitchWheel)
            .then(|| u16::from(self.data[0] & 0x7F) | (u16::from(self.data[1] & 0x7F) << 7))
    }
}
