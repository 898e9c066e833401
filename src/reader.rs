//! Byte sources and the streaming reader traits used by every parsing stage

use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom},
    path::Path,
    sync::Mutex,
};

use thiserror::Error;

pub mod window;

pub use window::StreamWindow;

/// Errors raised while pulling bytes out of a source
#[derive(Debug, Error)]
pub enum ReadError {
    /// A read was requested past the end of a bounded window
    #[error("Read at position {position} is out of range for a window of {length} bytes")]
    OutOfRange {
        /// Window-relative position of the failed read
        position: u64,
        /// Length of the window
        length: u64,
    },
    /// The underlying source failed
    #[error("I/O error while reading MIDI data: {0}")]
    Io(#[from] io::Error),
}

/// Trait for anything that yields MIDI bytes one at a time
pub trait MidiStream {
    /// Reads the next byte, advancing the stream
    fn read_byte(&mut self) -> Result<u8, ReadError>;

    /// Reads a big-endian u16
    fn read_u16(&mut self) -> Result<u16, ReadError> {
        Ok(u16::from_be_bytes([self.read_byte()?, self.read_byte()?]))
    }

    /// Reads a big-endian u32
    fn read_u32(&mut self) -> Result<u32, ReadError> {
        let mut bytes = [0u8; 4];
        for byte in bytes.iter_mut() {
            *byte = self.read_byte()?;
        }
        Ok(u32::from_be_bytes(bytes))
    }
}

/// In-memory byte slices are streams that shrink from the front as they are read
impl MidiStream for &[u8] {
    fn read_byte(&mut self) -> Result<u8, ReadError> {
        match self.split_first() {
            Some((&byte, rest)) => {
                *self = rest;
                Ok(byte)
            }
            None => Err(ReadError::OutOfRange {
                position: 0,
                length: 0,
            }),
        }
    }
}

/// A random access byte store that many readers may share across threads
pub trait ByteSource: Send + Sync + 'static {
    /// Total number of bytes in the source
    fn len(&self) -> io::Result<u64>;

    /// Returns if the source holds no bytes at all
    fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Reads as many bytes as are available at `offset` into `buf`, returning the count.
    /// A return of zero means `offset` is at or past the end of the source.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Fills `buf` completely from `offset`, failing with `UnexpectedEof` if the source ends first
    fn read_exact_at(&self, mut offset: u64, mut buf: &mut [u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.read_at(offset, buf)? {
                0 => return Err(io::ErrorKind::UnexpectedEof.into()),
                n => {
                    offset += n as u64;
                    buf = &mut buf[n..];
                }
            }
        }
        Ok(())
    }
}

/// Copies out of an in-memory slice
fn read_slice_at(data: &[u8], offset: u64, buf: &mut [u8]) -> usize {
    let Ok(start) = usize::try_from(offset) else {
        return 0;
    };
    if start >= data.len() {
        return 0;
    }

    let n = buf.len().min(data.len() - start);
    buf[..n].copy_from_slice(&data[start..start + n]);
    n
}

impl ByteSource for Vec<u8> {
    fn len(&self) -> io::Result<u64> {
        Ok(self.as_slice().len() as u64)
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        Ok(read_slice_at(self, offset, buf))
    }
}

impl ByteSource for Box<[u8]> {
    fn len(&self) -> io::Result<u64> {
        Ok((**self).len() as u64)
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        Ok(read_slice_at(self, offset, buf))
    }
}

/// A file handle that can be shared between readers.
///
/// The OS file cursor is shared by everyone holding the handle, so every seek and the read that
/// follows it happen under one lock.
#[derive(Debug)]
pub struct SharedFile {
    /// The file, guarded so seek+read pairs never interleave
    file: Mutex<File>,
    /// File length captured at open time
    len: u64,
}

impl SharedFile {
    /// Opens a file for shared reading
    pub fn open<PATH: AsRef<Path>>(path: PATH) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            file: Mutex::new(file),
            len,
        })
    }
}

impl ByteSource for SharedFile {
    fn len(&self) -> io::Result<u64> {
        Ok(self.len)
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| io::Error::other("shared MIDI file lock was poisoned"))?;

        file.seek(SeekFrom::Start(offset))?;
        let mut filled = 0;
        while filled < buf.len() {
            match file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(filled)
    }
}
