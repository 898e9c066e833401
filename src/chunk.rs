//! Chunk level parsing: the `MThd` header and the index of `MTrk` chunks that follow it

use std::io;

use header::HeaderChunk;
use thiserror::Error;

use crate::{
    chunk::chunk_types::{CHUNK_PREAMBLE_LEN, HEADER_CHUNK, HEADER_PAYLOAD_LEN, TRACK_DATA_CHUNK},
    reader::{ByteSource, ReadError},
    Chunk,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod chunk_types;
pub mod header;
pub mod track;

/// What exactly was wrong with a header chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderFault {
    /// The file does not start with `MThd`
    BadMagic([char; 4]),
    /// The header chunk does not declare a 6 byte payload
    BadLength(u32),
    /// The file ends before the 14 header bytes
    Truncated,
}

impl core::fmt::Display for HeaderFault {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::BadMagic(tag) => write![f, "expected MThd, found {}", tag.iter().collect::<String>()],
            Self::BadLength(len) => write![f, "header length is {len}, expected 6"],
            Self::Truncated => write![f, "file ends inside the header chunk"],
        }
    }
}

/// Error type for header validation and track chunk indexing
#[derive(Debug, Error)]
pub enum ChunkParseError {
    /// The header chunk is missing or invalid
    #[error("Malformed header chunk: {0}")]
    MalformedHeader(HeaderFault),
    /// Something other than a complete `MTrk` chunk was found while indexing
    #[error("Malformed track chunk at byte {offset}")]
    MalformedTrackChunk {
        /// File offset of the offending chunk preamble
        offset: u64,
    },
    /// The source could not be read
    #[error("Failed to read chunk data")]
    Read(#[from] ReadError),
}

impl From<io::Error> for ChunkParseError {
    fn from(value: io::Error) -> Self {
        Self::Read(ReadError::Io(value))
    }
}

/// Location of one track's event bytes within the file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackPointer {
    /// File offset of the first event byte, right after the chunk preamble
    pub offset: u64,
    /// Number of event bytes
    pub length: u32,
}

impl TrackPointer {
    /// File offset one past the last event byte
    pub fn end(&self) -> u64 {
        self.offset + u64::from(self.length)
    }
}

/// Walks the chunk structure of a source: header first, then every track chunk
#[derive(Debug)]
pub struct ChunkIndexer<'a, S: ByteSource + ?Sized> {
    /// Where the chunks are read from
    source: &'a S,
    /// Total number of bytes in the source
    len: u64,
    /// Offset of the next chunk preamble
    position: u64,
}

impl<'a, S: ByteSource + ?Sized> ChunkIndexer<'a, S> {
    /// Creates an indexer positioned at the start of the source
    pub fn new(source: &'a S) -> Result<Self, ChunkParseError> {
        Ok(Self {
            source,
            len: source.len()?,
            position: 0,
        })
    }

    /// Reads and validates the 14 byte `MThd` chunk at the start of the source
    pub fn parse_header(&mut self) -> Result<HeaderChunk, ChunkParseError> {
        if self.len < CHUNK_PREAMBLE_LEN + HEADER_PAYLOAD_LEN as u64 {
            return Err(ChunkParseError::MalformedHeader(HeaderFault::Truncated));
        }

        let chunk = self.read_preamble(0)?;
        if !chunk.is(HEADER_CHUNK) {
            return Err(ChunkParseError::MalformedHeader(HeaderFault::BadMagic(
                chunk.chunk_type,
            )));
        }
        if chunk.len() != HEADER_PAYLOAD_LEN {
            return Err(ChunkParseError::MalformedHeader(HeaderFault::BadLength(
                chunk.length(),
            )));
        }

        let mut payload = [0u8; HEADER_PAYLOAD_LEN];
        self.source.read_exact_at(CHUNK_PREAMBLE_LEN, &mut payload)?;
        self.position = CHUNK_PREAMBLE_LEN + HEADER_PAYLOAD_LEN as u64;

        let format = u16::from_be_bytes([payload[0], payload[1]]);
        let ntrks = u16::from_be_bytes([payload[2], payload[3]]);
        let division = u16::from_be_bytes([payload[4], payload[5]]);

        Ok(HeaderChunk::from((format, ntrks, division)))
    }

    /// Records a pointer for every `MTrk` chunk from the current position to the end of the
    /// source. The number of pointers is the true track count of the file.
    pub fn index_tracks(&mut self) -> Result<Vec<TrackPointer>, ChunkParseError> {
        let mut pointers = vec![];

        while self.position < self.len {
            let offset = self.position;
            if self.len - offset < CHUNK_PREAMBLE_LEN {
                return Err(ChunkParseError::MalformedTrackChunk { offset });
            }

            let chunk = self.read_preamble(offset)?;
            if !chunk.is(TRACK_DATA_CHUNK) {
                return Err(ChunkParseError::MalformedTrackChunk { offset });
            }

            let pointer = TrackPointer {
                offset: offset + CHUNK_PREAMBLE_LEN,
                length: chunk.length(),
            };
            if pointer.end() > self.len {
                return Err(ChunkParseError::MalformedTrackChunk { offset });
            }

            pointers.push(pointer);
            self.position = pointer.end();
        }

        Ok(pointers)
    }

    /// Reads the 8 byte tag and length preamble at `offset`
    fn read_preamble(&self, offset: u64) -> Result<Chunk, ChunkParseError> {
        let mut raw = [0u8; CHUNK_PREAMBLE_LEN as usize];
        self.source.read_exact_at(offset, &mut raw)?;

        Ok(u64::from_be_bytes(raw).into())
    }
}

/// Validates the header and indexes every track chunk of a source in one go
pub fn index<S: ByteSource + ?Sized>(
    source: &S,
) -> Result<(HeaderChunk, Vec<TrackPointer>), ChunkParseError> {
    let mut indexer = ChunkIndexer::new(source)?;
    let header = indexer.parse_header()?;
    let pointers = indexer.index_tracks()?;

    log::debug!(
        "Indexed {} track chunks, header declares {}",
        pointers.len(),
        header.declared_track_count
    );

    Ok((header, pointers))
}
