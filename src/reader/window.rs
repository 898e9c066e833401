//! Double-buffered, bounded view over a sub-range of a shared [`ByteSource`].
//!
//! A window owns two buffers of the same size. While the consumer drains the active one, the
//! other is filled on a background thread starting at the next unread offset. When the active
//! buffer runs dry the window waits for that refill, swaps the buffers and immediately starts
//! fetching the one after, so reads always look synchronous to the caller.

use std::{
    collections::VecDeque,
    io, mem,
    sync::Arc,
    thread::{self, JoinHandle},
};

use super::{ByteSource, MidiStream, ReadError};

/// A refill running in the background, handing its buffer back when joined
type Refill = JoinHandle<io::Result<Vec<u8>>>;

/// Bounded sequential reader over `[start, start + length)` of a byte source
#[derive(Debug)]
pub struct StreamWindow<S: ByteSource> {
    /// The shared source all windows of a parse read from
    source: Arc<S>,
    /// Absolute offset of the first byte of the window
    start: u64,
    /// Number of bytes in the window
    length: u64,
    /// Size of each of the two buffers
    buffer_size: usize,
    /// Buffer currently being drained
    active: Vec<u8>,
    /// Index of the next unread byte in `active`
    cursor: usize,
    /// Window offset of the next buffer fetch to issue
    next_fetch: u64,
    /// In-flight fetch of the buffer after `active`, if the window extends that far
    refill: Option<Refill>,
    /// Second buffer when no fetch owns it
    spare: Option<Vec<u8>>,
    /// Number of buffered bytes handed out so far
    consumed: u64,
    /// Single pushback register, always read before buffered bytes
    pushback: Option<u8>,
    /// Bytes pushed back while the register was already occupied
    overflow: VecDeque<u8>,
}

impl<S: ByteSource> StreamWindow<S> {
    /// Opens a window over `length` bytes of `source` starting at `start`, blocking until the
    /// first buffer is filled.
    pub fn new(
        source: Arc<S>,
        start: u64,
        length: u64,
        buffer_size: usize,
    ) -> Result<Self, ReadError> {
        // No point in buffers bigger than the window itself
        let buffer_size = usize::try_from(length)
            .map_or(buffer_size, |len| buffer_size.min(len))
            .max(1);

        let mut window = Self {
            source,
            start,
            length,
            buffer_size,
            active: Vec::with_capacity(buffer_size),
            cursor: 0,
            next_fetch: 0,
            refill: None,
            spare: Some(Vec::with_capacity(buffer_size)),
            consumed: 0,
            pushback: None,
            overflow: VecDeque::new(),
        };

        window.restart()?;
        Ok(window)
    }

    /// Number of bytes covered by the window
    pub fn len(&self) -> u64 {
        self.length
    }

    /// Returns if the window covers no bytes
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Window-relative position of the next byte that will be read, accounting for pushback
    pub fn position(&self) -> u64 {
        self.consumed.saturating_sub(self.pending_pushback() as u64)
    }

    /// Returns if every byte of the window has been read and nothing is pushed back
    pub fn is_exhausted(&self) -> bool {
        self.consumed >= self.length && self.pushback.is_none()
    }

    /// Size of each of the two internal buffers
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Reads the next byte, serving pushed back bytes first
    pub fn read_byte(&mut self) -> Result<u8, ReadError> {
        if let Some(byte) = self.take_pushback() {
            return Ok(byte);
        }

        self.read_fast()
    }

    /// Reads the next buffered byte without looking at the pushback register.
    ///
    /// Only valid where the caller knows nothing has been pushed back since the last read.
    pub fn read_fast(&mut self) -> Result<u8, ReadError> {
        if self.consumed >= self.length {
            return Err(self.out_of_range());
        }

        if self.cursor == self.active.len() {
            self.swap_buffers()?;
        }

        let byte = self.active[self.cursor];
        self.cursor += 1;
        self.consumed += 1;
        Ok(byte)
    }

    /// Un-reads a byte. The first pushed byte lands in the register, later ones queue behind it
    pub fn push_back(&mut self, byte: u8) {
        if self.pushback.is_none() {
            self.pushback = Some(byte);
        } else {
            self.overflow.push_back(byte);
        }
    }

    /// Advances past `count` bytes, pushed back bytes first.
    ///
    /// Fails without moving if fewer than `count` bytes remain.
    pub fn skip(&mut self, count: u64) -> Result<(), ReadError> {
        let available = self.pending_pushback() as u64 + (self.length - self.consumed);
        if count > available {
            return Err(ReadError::OutOfRange {
                position: self.position() + count,
                length: self.length,
            });
        }

        let mut remaining = count;
        while remaining > 0 && self.take_pushback().is_some() {
            remaining -= 1;
        }

        while remaining > 0 {
            if self.cursor == self.active.len() {
                self.swap_buffers()?;
            }

            let buffered = (self.active.len() - self.cursor) as u64;
            let step = remaining.min(buffered);
            // step <= buffered, which came from a usize
            self.cursor += step as usize;
            self.consumed += step;
            remaining -= step;
        }

        Ok(())
    }

    /// Rewinds to the start of the window, dropping pushback and restarting buffering
    pub fn reset(&mut self) -> Result<(), ReadError> {
        self.restart()
    }

    /// Count of bytes waiting in the pushback register and its queue
    fn pending_pushback(&self) -> usize {
        usize::from(self.pushback.is_some()) + self.overflow.len()
    }

    /// Pops the pushback register, refilling it from the queue
    fn take_pushback(&mut self) -> Option<u8> {
        let byte = self.pushback.take()?;
        self.pushback = self.overflow.pop_front();
        Some(byte)
    }

    /// Error for a read at the current position
    fn out_of_range(&self) -> ReadError {
        ReadError::OutOfRange {
            position: self.consumed,
            length: self.length,
        }
    }

    /// Waits for the in-flight refill and makes it the active buffer, then starts the next one
    fn swap_buffers(&mut self) -> Result<(), ReadError> {
        let refill = self.refill.take().ok_or_else(|| self.out_of_range())?;
        let next = join_refill(refill)?;

        let drained = mem::replace(&mut self.active, next);
        self.cursor = 0;
        self.spare = Some(drained);
        self.start_refill();

        Ok(())
    }

    /// Issues a background fetch of the next buffer if the window extends past what was fetched
    fn start_refill(&mut self) {
        let remaining = self.length - self.next_fetch;
        if remaining == 0 {
            return;
        }

        // Bounded by buffer_size, so the cast cannot truncate
        let want = remaining.min(self.buffer_size as u64) as usize;
        let offset = self.start + self.next_fetch;
        self.next_fetch += want as u64;

        let buffer = self
            .spare
            .take()
            .unwrap_or_else(|| Vec::with_capacity(self.buffer_size));
        let source = Arc::clone(&self.source);

        log::trace!("Refilling {want} bytes at offset {offset}");
        self.refill = Some(thread::spawn(move || fetch(&*source, offset, buffer, want)));
    }

    /// Brings the window back to its initial state and fills the first buffer
    fn restart(&mut self) -> Result<(), ReadError> {
        if let Some(refill) = self.refill.take() {
            // Reclaim the buffer, the data itself is stale
            if let Ok(buffer) = join_refill(refill) {
                self.spare = Some(buffer);
            }
        }

        self.cursor = 0;
        self.consumed = 0;
        self.next_fetch = 0;
        self.pushback = None;
        self.overflow.clear();

        self.active.clear();

        // The first buffer is fetched exactly like the rest, then waited on
        self.start_refill();
        if self.refill.is_some() {
            self.swap_buffers()?;
        }

        Ok(())
    }
}

impl<S: ByteSource> MidiStream for StreamWindow<S> {
    fn read_byte(&mut self) -> Result<u8, ReadError> {
        StreamWindow::read_byte(self)
    }
}

/// Blocks on a refill thread
fn join_refill(refill: Refill) -> Result<Vec<u8>, ReadError> {
    let buffer = refill
        .join()
        .map_err(|_| io::Error::other("MIDI buffer refill thread panicked"))??;
    Ok(buffer)
}

/// Reads up to `want` bytes at `offset` into a recycled buffer
fn fetch<S: ByteSource + ?Sized>(
    source: &S,
    offset: u64,
    mut buffer: Vec<u8>,
    want: usize,
) -> io::Result<Vec<u8>> {
    buffer.clear();
    buffer.resize(want, 0);

    let mut filled = 0;
    while filled < want {
        match source.read_at(offset + filled as u64, &mut buffer[filled..])? {
            0 => break,
            n => filled += n,
        }
    }

    // Every fetch lies inside the window, a short read means the source ended early
    if filled < want {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "MIDI source ended inside a track window",
        ));
    }

    Ok(buffer)
}
