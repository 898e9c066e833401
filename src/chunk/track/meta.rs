//! Meta Event Structs and Parsing

use std::borrow::Cow;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::TrackError;

/// Tag of the End of Track meta event
pub const END_OF_TRACK: u8 = 0x2F;
/// Tag of the Tempo meta event
pub const TEMPO: u8 = 0x51;
/// Tag of the Time Signature meta event
pub const TIME_SIGNATURE: u8 = 0x58;
/// Tag of the Key Signature meta event
pub const KEY_SIGNATURE: u8 = 0x59;

/// Microseconds in a minute, tempo events count microseconds per quarter note
const MICROS_PER_MINUTE: f64 = 60_000_000.0;

/// Meta event types the decoder recognizes. Tempo is decoded into its own [`TempoEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MetaKind {
    /// Text metadata, tag 0x01
    Text,
    /// Copyright, tag 0x02
    Copyright,
    /// Sequence or track name, tag 0x03
    SequenceName,
    /// Instrument name, tag 0x04
    InstrumentName,
    /// Lyric, tag 0x05
    Lyric,
    /// Marker, tag 0x06
    Marker,
    /// Cue Point, tag 0x07
    CuePoint,
    /// End of Track Identifier, tag 0x2F
    EndOfTrack,
    /// Time signature, tag 0x58
    TimeSignature,
    /// Key Signature, tag 0x59
    KeySignature,
    /// Any other tag, payload kept verbatim
    Unknown(u8),
}

impl MetaKind {
    /// Classifies a meta type byte. Tempo (0x51) has no kind and yields `None`
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0x01 => Self::Text,
            0x02 => Self::Copyright,
            0x03 => Self::SequenceName,
            0x04 => Self::InstrumentName,
            0x05 => Self::Lyric,
            0x06 => Self::Marker,
            0x07 => Self::CuePoint,
            END_OF_TRACK => Self::EndOfTrack,
            TEMPO => return None,
            TIME_SIGNATURE => Self::TimeSignature,
            KEY_SIGNATURE => Self::KeySignature,
            other => Self::Unknown(other),
        })
    }

    /// The type byte this kind was read from
    pub fn tag(self) -> u8 {
        match self {
            Self::Text => 0x01,
            Self::Copyright => 0x02,
            Self::SequenceName => 0x03,
            Self::InstrumentName => 0x04,
            Self::Lyric => 0x05,
            Self::Marker => 0x06,
            Self::CuePoint => 0x07,
            Self::EndOfTrack => END_OF_TRACK,
            Self::TimeSignature => TIME_SIGNATURE,
            Self::KeySignature => KEY_SIGNATURE,
            Self::Unknown(tag) => tag,
        }
    }

    /// Payload size the kind requires, if it is fixed
    pub fn required_len(self) -> Option<u32> {
        match self {
            Self::TimeSignature => Some(4),
            Self::KeySignature => Some(2),
            _ => None,
        }
    }

    /// Whether the event contributes to a track's event count
    pub fn is_counted(self) -> bool {
        !matches!(self, Self::EndOfTrack | Self::Unknown(_))
    }

    /// Whether the payload is human readable text
    pub fn is_text(self) -> bool {
        matches!(
            self,
            Self::Text
                | Self::Copyright
                | Self::SequenceName
                | Self::InstrumentName
                | Self::Lyric
                | Self::Marker
                | Self::CuePoint
        )
    }
}

/// Checks a fixed-size meta payload length
pub(crate) fn check_len(tag: u8, expected: u32, found: u32) -> Result<(), TrackError> {
    if expected == found {
        Ok(())
    } else {
        Err(TrackError::MalformedMetaEvent {
            meta_type: tag,
            expected,
            found,
        })
    }
}

/// A meta level event with its raw payload
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MetaEvent {
    /// Event type
    pub kind: MetaKind,
    /// Ticks since the previous event of the track
    pub delta_ticks: u32,
    /// Payload exactly as stored in the file
    pub data: Vec<u8>,
}

impl MetaEvent {
    /// Text payload of the text-like kinds, invalid UTF-8 is replaced rather than rejected
    pub fn text(&self) -> Option<Cow<'_, str>> {
        self.kind
            .is_text()
            .then(|| String::from_utf8_lossy(&self.data))
    }

    /// Decoded payload of a Time Signature event
    pub fn time_signature(&self) -> Option<TimeSignature> {
        match (self.kind, self.data.as_slice()) {
            (MetaKind::TimeSignature, &[numerator, power, clocks, thirty_seconds]) => {
                Some(TimeSignature {
                    numerator,
                    denominator: 1u32.checked_shl(u32::from(power)).unwrap_or(0),
                    clocks_per_tick: clocks,
                    thirty_second_notes_per_quarter: thirty_seconds,
                })
            }
            _ => None,
        }
    }

    /// Decoded payload of a Key Signature event
    pub fn key_signature(&self) -> Option<KeySignature> {
        match (self.kind, self.data.as_slice()) {
            (MetaKind::KeySignature, &[sharps_flats, mode]) => Some(KeySignature {
                sharps_flats: sharps_flats as i8,
                minor: mode != 0,
            }),
            _ => None,
        }
    }
}

/// A tempo change
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TempoEvent {
    /// Ticks since the previous event of the track
    pub delta_ticks: u32,
    /// Raw 24 bit tempo
    pub microseconds_per_quarter: u32,
    /// Tempo in quarter notes per minute
    pub beats_per_minute: f64,
}

impl TempoEvent {
    /// Builds a tempo event from the 24 bit big-endian microseconds per quarter note payload
    pub fn from_payload(delta_ticks: u32, payload: [u8; 3]) -> Option<Self> {
        let [high, mid, low] = payload;
        let microseconds_per_quarter = u32::from_be_bytes([0, high, mid, low]);
        if microseconds_per_quarter == 0 {
            return None;
        }

        Some(Self {
            delta_ticks,
            microseconds_per_quarter,
            beats_per_minute: MICROS_PER_MINUTE / f64::from(microseconds_per_quarter),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
/// A key signature
pub struct KeySignature {
    /// Negative for flats, positive for sharps
    pub sharps_flats: i8,
    /// Minor rather than major key
    pub minor: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
/// A Time Signature
pub struct TimeSignature {
    /// The time signature's numerator
    pub numerator: u8,
    /// The time signature's denominator, stored in the file as a power of two
    pub denominator: u32,
    /// MIDI clocks per metronome click
    pub clocks_per_tick: u8,
    /// Thirty second notes per quarter
    pub thirty_second_notes_per_quarter: u8,
}

#[cfg(test)]
mod tests {
    use super::{check_len, KeySignature, MetaEvent, MetaKind, TempoEvent, TimeSignature};
    use crate::chunk::track::TrackError;

    fn meta(kind: MetaKind, data: &[u8]) -> MetaEvent {
        MetaEvent {
            kind,
            delta_ticks: 0,
            data: data.to_vec(),
        }
    }

    #[test]
    fn tags_classify() {
        assert_eq!(MetaKind::from_tag(0x03), Some(MetaKind::SequenceName));
        assert_eq!(MetaKind::from_tag(0x2F), Some(MetaKind::EndOfTrack));
        assert_eq!(MetaKind::from_tag(0x51), None);
        assert_eq!(MetaKind::from_tag(0x00), Some(MetaKind::Unknown(0x00)));
        assert_eq!(MetaKind::from_tag(0x7F), Some(MetaKind::Unknown(0x7F)));
        assert_eq!(MetaKind::Unknown(0x54).tag(), 0x54);
    }

    #[test]
    fn test_text_event() {
        let event = meta(MetaKind::Text, b"Hello");
        assert_eq!(event.text().as_deref(), Some("Hello"));
        assert_eq!(meta(MetaKind::Unknown(0x7F), b"Hello").text(), None);
    }

    #[test]
    fn test_tempo_event() {
        // 500,000 microseconds per quarter note
        let tempo = TempoEvent::from_payload(12, [0x07, 0xA1, 0x20]).unwrap();

        assert_eq!(tempo.microseconds_per_quarter, 500_000);
        assert_eq!(tempo.beats_per_minute, 120.0);
        assert_eq!(tempo.delta_ticks, 12);
        assert!(TempoEvent::from_payload(0, [0, 0, 0]).is_none());
    }

    #[test]
    fn test_time_signature_event() {
        let event = meta(MetaKind::TimeSignature, &[0x06, 0x03, 0x18, 0x08]);
        assert_eq!(
            event.time_signature(),
            Some(TimeSignature {
                numerator: 6,
                denominator: 8,
                clocks_per_tick: 24,
                thirty_second_notes_per_quarter: 8,
            })
        );
        assert_eq!(event.key_signature(), None);
    }

    #[test]
    fn test_key_signature_event() {
        let event = meta(MetaKind::KeySignature, &[0xFD, 0x01]);
        assert_eq!(
            event.key_signature(),
            Some(KeySignature {
                sharps_flats: -3,
                minor: true,
            })
        );
    }

    #[test]
    fn test_invalid_length() {
        assert!(check_len(0x59, 2, 2).is_ok());
        assert!(matches!(
            check_len(0x58, 4, 3),
            Err(TrackError::MalformedMetaEvent {
                meta_type: 0x58,
                expected: 4,
                found: 3
            })
        ));
    }

    #[test]
    fn end_of_track_and_unknown_are_not_counted() {
        assert!(MetaKind::Marker.is_counted());
        assert!(MetaKind::TimeSignature.is_counted());
        assert!(!MetaKind::EndOfTrack.is_counted());
        assert!(!MetaKind::Unknown(0x21).is_counted());
    }
}
