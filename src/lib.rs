//! # smf_scan
//!
//! A Standard MIDI File scanner built for large files. The chunk structure is indexed once, then
//! every track is decoded on a bounded worker pool, each worker streaming its track's bytes
//! through a double-buffered [`reader::StreamWindow`].
//!
//! ## Overview
//!
//! MIDI files are structured as a series of chunks. Each chunk contains a 4-character ASCII
//! type identifier and a 32-bit length that specifies how many bytes of data follow. The `MThd`
//! header comes first, followed by one `MTrk` chunk per track.
//!
//! Decoding a track takes up to two passes:
//!
//! - **Enumeration** validates the event grammar (running status included), counts notes and
//!   events and records every channel, meta and tempo event.
//! - **Note connection** rewinds the track and pairs Note On / Note Off events into [`note::Note`]s,
//!   closing the most recently opened note of a pitch and channel first.
//!
//! Analysis only parses skip recording and note connection and just count.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use smf_scan::parser::{MidiParser, ParseOptions};
//!
//! let parser = MidiParser::new(ParseOptions::default().with_max_workers(4));
//! let result = parser.parse_file("test/run.mid")?;
//!
//! println!(
//!     "{} notes over {} ticks in {} tracks",
//!     result.total_note_count, result.length_ticks, result.true_track_count
//! );
//! for note in result.notes() {
//!     println!("{note:?}");
//! }
//! # Ok::<(), smf_scan::parser::ParseError>(())
//! ```
//!
//! ## Library Structure
//!
//! - **[`reader`]**: byte sources shared between threads, the [`reader::MidiStream`] trait and
//!   the buffered track window.
//! - **[`vlq`]**: variable-length quantities.
//! - **[`chunk`]**: header validation, track chunk indexing and the per-track
//!   [`chunk::track::EventDecoder`].
//! - **[`note`]**: reconstructed notes and the LIFO stacks used to pair them.
//! - **[`parser`]**: the parallel whole-file entry points and progress notifications.
//!

pub mod chunk;
pub mod note;
pub mod parser;
pub mod reader;
pub mod vlq;

pub use parser::{parse, MidiParser, ParseError, ParseOptions, ParseResult, ParseStatus};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The 8 byte preamble every chunk starts with: a 4-character ASCII type identifier and the
/// 32-bit length of the payload that follows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Chunk {
    /// 4 character ASCII chunk type
    pub chunk_type: [char; 4],
    /// Length of the payload that follows
    length: u32,
}

impl Chunk {
    /// Payload length as a usize
    pub fn len(&self) -> usize {
        self.length as usize
    }

    /// Payload length as declared
    pub fn length(&self) -> u32 {
        self.length
    }

    /// Returns if the chunk has no payload
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Returns if the chunk carries the given type tag
    pub fn is(&self, chunk_type: [char; 4]) -> bool {
        self.chunk_type == chunk_type
    }
}

/// Splits a big-endian preamble read as one u64
impl From<u64> for Chunk {
    fn from(value: u64) -> Self {
        let [a, b, c, d, ..] = value.to_be_bytes();

        Self {
            chunk_type: [a as char, b as char, c as char, d as char],
            length: value as u32,
        }
    }
}
