//! Header Chunk Enum and Struct Definitions

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use thiserror::Error;

/// Header chunk data, including format, ntrks and division as 3 16 bit unsigned integers.
///
/// Values are kept exactly as the file declares them, the typed views are opt-in through
/// [`HeaderChunk::format_kind`] and [`HeaderChunk::division_kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HeaderChunk {
    /// The raw MIDI format word
    pub format: u16,
    /// Number of tracks the header claims the file holds
    pub declared_track_count: u16,
    /// Raw division word, ticks per quarter note for metrical files
    pub division: u16,
}

impl From<(u16, u16, u16)> for HeaderChunk {
    fn from(value: (u16, u16, u16)) -> Self {
        let (format, declared_track_count, division) = value;

        Self {
            format,
            declared_track_count,
            division,
        }
    }
}

impl HeaderChunk {
    /// Pulses per quarter note, the raw division word
    pub fn ppq(&self) -> u16 {
        self.division
    }

    /// The format as one of the three defined organizations
    pub fn format_kind(&self) -> Result<Format, InvalidFormat> {
        self.format.try_into()
    }

    /// The division split into its metrical or time-code meaning
    pub fn division_kind(&self) -> Division {
        self.division.into()
    }
}

/// The overall organization of the MIDI file. Only three values are valid, making most of the 16
/// bits irrelevant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Format {
    /// The file contains a single multi-channel track
    Zero,
    /// The file contains one or more simultaneous tracks (or MIDI outputs) of a sequence
    One,
    /// The file contains one or more sequentially independent single-track patterns
    Two,
}

/// Error struct representing an invalid format specifier
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Invalid header format {0}")]
pub struct InvalidFormat(pub u16);

impl TryFrom<u16> for Format {
    type Error = InvalidFormat;
    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Format::Zero),
            1 => Ok(Format::One),
            2 => Ok(Format::Two),
            other => Err(InvalidFormat(other)),
        }
    }
}

/// The meaning of the delta-times in the MIDI sequence,
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Division {
    /// When bit 15 is a 0, bits 14-0 represent ticks per quarter note
    Metrical(u16),
    /// When bit 15 is 1, the high byte is the negative SMPTE frame rate
    /// and the low byte is ticks per frame
    TimeCodeBased(SmpteTicks),
}

/// Division defined by time-code-based time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SmpteTicks {
    /// Negative frames per second (-24, -25, -29 or -30)
    pub smpte: i8,
    /// Ticks per frame
    pub tpf: u8,
}

impl From<u16> for Division {
    fn from(value: u16) -> Self {
        const MASK: u16 = 0x7FFF;

        if value & !MASK == 0 {
            Division::Metrical(value)
        } else {
            let [high, low] = value.to_be_bytes();

            // The high byte already holds the two's complement frame rate
            Division::TimeCodeBased(SmpteTicks {
                smpte: high as i8,
                tpf: low,
            })
        }
    }
}
