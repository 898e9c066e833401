//! Whole-file parsing: index the chunks once, then decode every track on a bounded worker pool
//! and fold the per-track results into one [`ParseResult`].

use std::{
    fmt, io,
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use crossbeam_channel::Sender;
use rayon::prelude::*;
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    chunk::{
        self,
        header::HeaderChunk,
        track::{EventDecoder, TrackError, TrackEvents},
        ChunkParseError, TrackPointer,
    },
    note::Note,
    reader::{ByteSource, ReadError, SharedFile, StreamWindow},
};

pub mod progress;

pub use progress::ParseProgress;
use progress::ProgressSink;

/// Default ceiling on concurrently decoded tracks
pub const DEFAULT_MAX_WORKERS: usize = 8;
/// Default size of each of a track window's two buffers
pub const DEFAULT_BUFFER_SIZE: usize = 100_000;

/// Knobs for a parse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParseOptions {
    /// Only count, skipping event recording and note pairing
    pub analysis_only: bool,
    /// Tracks decoded at once, 0 is treated as 1
    pub max_workers: usize,
    /// Bytes per window buffer, 0 is treated as 1
    pub buffer_size: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            analysis_only: false,
            max_workers: DEFAULT_MAX_WORKERS,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl ParseOptions {
    /// Sets analysis only mode
    pub fn with_analysis_only(mut self, analysis_only: bool) -> Self {
        self.analysis_only = analysis_only;
        self
    }

    /// Sets the worker ceiling
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Sets the window buffer size
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    /// Effective worker ceiling
    pub fn workers(&self) -> usize {
        self.max_workers.max(1)
    }

    /// Effective buffer size
    pub fn buffer(&self) -> usize {
        self.buffer_size.max(1)
    }
}

/// Errors that abort a parse as a whole
#[derive(Debug, Error)]
pub enum ParseError {
    /// The header or the chunk structure is invalid
    #[error("Failed to index MIDI chunks: {0}")]
    Chunk(#[from] ChunkParseError),
    /// The file could not be opened
    #[error("Failed to open MIDI file: {0}")]
    Io(#[from] io::Error),
    /// The worker pool could not be started
    #[error("Failed to start track workers: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    /// Reading a track's bytes failed at the source
    #[error("I/O failure in track {index}: {source}")]
    Track {
        /// Index of the track chunk
        index: usize,
        /// What went wrong
        #[source]
        source: TrackError,
    },
}

/// Overall outcome of a parse that got as far as decoding tracks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ParseStatus {
    /// Every track decoded
    #[default]
    Success,
    /// At least one track failed to decode
    ParseError,
}

impl fmt::Display for ParseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write![f, "Success"],
            Self::ParseError => write![f, "ParseError"],
        }
    }
}

/// Everything decoded out of one track
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParsedTrack {
    /// Index of the track chunk in the file
    pub index: usize,
    /// Note On events with a non-zero velocity
    pub note_count: u64,
    /// Counted events
    pub event_count: u64,
    /// Final tick of the track
    pub length_ticks: u64,
    /// Recorded events, empty in analysis only mode
    pub events: TrackEvents,
    /// Paired notes, empty in analysis only mode
    pub notes: Vec<Note>,
}

/// A track that failed to decode
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackFailure {
    /// Index of the track chunk in the file
    pub index: usize,
    /// Display form of the track's error
    pub reason: String,
}

/// Aggregate of a whole parse. Counters only include tracks that decoded successfully
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParseResult {
    /// Raw format word of the header
    pub format: u16,
    /// Track count the header declares
    pub declared_track_count: u16,
    /// Track chunks actually found
    pub true_track_count: usize,
    /// Raw division word of the header
    pub ppq: u16,
    /// Sum of the tracks' note counts
    pub total_note_count: u64,
    /// Sum of the tracks' event counts
    pub total_event_count: u64,
    /// Longest track, in ticks
    pub length_ticks: u64,
    /// Whether every track decoded
    pub status: ParseStatus,
    /// Successful tracks by index
    pub tracks: Vec<ParsedTrack>,
    /// Failed tracks by index
    pub failed_tracks: Vec<TrackFailure>,
}

impl ParseResult {
    /// An empty aggregate for a header and its indexed tracks
    fn new(header: &HeaderChunk, true_track_count: usize) -> Self {
        Self {
            format: header.format,
            declared_track_count: header.declared_track_count,
            true_track_count,
            ppq: header.ppq(),
            total_note_count: 0,
            total_event_count: 0,
            length_ticks: 0,
            status: ParseStatus::Success,
            tracks: Vec::with_capacity(true_track_count),
            failed_tracks: vec![],
        }
    }

    /// Folds in a track that decoded
    fn merge(&mut self, track: ParsedTrack) {
        self.total_note_count += track.note_count;
        self.total_event_count += track.event_count;
        self.length_ticks = self.length_ticks.max(track.length_ticks);
        self.tracks.push(track);
    }

    /// Records a track that did not
    fn fail(&mut self, index: usize, error: &TrackError) {
        self.status = ParseStatus::ParseError;
        self.failed_tracks.push(TrackFailure {
            index,
            reason: error.to_string(),
        });
    }

    /// Returns if every track decoded
    pub fn is_success(&self) -> bool {
        self.status == ParseStatus::Success
    }

    /// Every paired note of the file, track by track
    pub fn notes(&self) -> impl Iterator<Item = &Note> + '_ {
        self.tracks.iter().flat_map(|track| track.notes.iter())
    }
}

/// Runs parses with a fixed set of options
#[derive(Debug, Clone, Default)]
pub struct MidiParser {
    /// Parse configuration
    options: ParseOptions,
    /// Lifecycle notifications
    progress: ProgressSink,
}

impl MidiParser {
    /// Creates a parser
    pub fn new(options: ParseOptions) -> Self {
        Self {
            options,
            progress: ProgressSink::default(),
        }
    }

    /// Sends [`ParseProgress`] messages to `sender` during every parse
    pub fn with_progress(mut self, sender: Sender<ParseProgress>) -> Self {
        self.progress = ProgressSink::new(sender);
        self
    }

    /// The options in use
    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// Parses a file, every worker reading through a file handle of its own
    pub fn parse_file<PATH: AsRef<Path>>(&self, path: PATH) -> Result<ParseResult, ParseError> {
        let path = path.as_ref();
        log::debug!("Parsing {}", path.display());

        let parsed = SharedFile::open(path)
            .map_err(ParseError::from)
            .and_then(|file| self.index(&file))
            .and_then(|(header, pointers)| {
                self.decode_tracks(&header, &pointers, || SharedFile::open(path).map(Arc::new))
            });

        self.finish(parsed)
    }

    /// Parses an already opened source shared by every worker
    pub fn parse_source<S: ByteSource>(&self, source: Arc<S>) -> Result<ParseResult, ParseError> {
        let parsed = self.index(&*source).and_then(|(header, pointers)| {
            self.decode_tracks(&header, &pointers, || Ok(Arc::clone(&source)))
        });

        self.finish(parsed)
    }

    /// Validates the header and finds every track chunk
    fn index<S: ByteSource + ?Sized>(
        &self,
        source: &S,
    ) -> Result<(HeaderChunk, Vec<TrackPointer>), ParseError> {
        Ok(chunk::index(source)?)
    }

    /// Decodes every track on the pool, then merges the outcomes in track order
    fn decode_tracks<S, OPEN>(
        &self,
        header: &HeaderChunk,
        pointers: &[TrackPointer],
        open: OPEN,
    ) -> Result<ParseResult, ParseError>
    where
        S: ByteSource,
        OPEN: Fn() -> io::Result<Arc<S>> + Sync,
    {
        let total = pointers.len();
        self.progress
            .notify(ParseProgress::Started { track_count: total });

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.workers())
            .thread_name(|worker| format!("smf-track-{worker}"))
            .build()?;

        let completed = AtomicUsize::new(0);
        let outcomes: Vec<Result<ParsedTrack, TrackError>> = pool.install(|| {
            pointers
                .par_iter()
                .enumerate()
                .map(|(index, pointer)| {
                    let outcome = self.decode_track(index, *pointer, &open);
                    let completed = completed.fetch_add(1, Ordering::Relaxed) + 1;

                    self.progress.notify(match &outcome {
                        Ok(_) => ParseProgress::TrackParsed {
                            index,
                            completed,
                            total,
                        },
                        Err(_) => ParseProgress::TrackFailed {
                            index,
                            completed,
                            total,
                        },
                    });

                    outcome
                })
                .collect()
        });

        let mut result = ParseResult::new(header, total);
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(track) => result.merge(track),
                Err(source) if source.is_io() => return Err(ParseError::Track { index, source }),
                Err(error) => result.fail(index, &error),
            }
        }

        Ok(result)
    }

    /// Runs Pass 1 and, unless analysis only, Pass 2 over one track
    fn decode_track<S, OPEN>(
        &self,
        index: usize,
        pointer: TrackPointer,
        open: &OPEN,
    ) -> Result<ParsedTrack, TrackError>
    where
        S: ByteSource,
        OPEN: Fn() -> io::Result<Arc<S>>,
    {
        let source = open().map_err(|error| TrackError::Read(ReadError::Io(error)))?;
        let mut window = StreamWindow::new(
            source,
            pointer.offset,
            u64::from(pointer.length),
            self.options.buffer(),
        )
        .map_err(|error| TrackError::from_read(error, 0))?;

        let analysis_only = self.options.analysis_only;
        let mut decoder = EventDecoder::new(&mut window, analysis_only);
        let summary = decoder.enumerate_events().inspect_err(|error| {
            log::warn!("Track {index} failed: {error}");
        })?;

        let notes = if analysis_only {
            vec![]
        } else {
            decoder.connect_notes()
        };

        log::debug!(
            "Track {index}: {} notes, {} events, {} ticks",
            summary.note_count,
            summary.event_count,
            summary.length_ticks
        );

        Ok(ParsedTrack {
            index,
            note_count: summary.note_count,
            event_count: summary.event_count,
            length_ticks: summary.length_ticks,
            events: decoder.into_events(),
            notes,
        })
    }

    /// Logs and announces how a parse ended
    fn finish(
        &self,
        parsed: Result<ParseResult, ParseError>,
    ) -> Result<ParseResult, ParseError> {
        match &parsed {
            Ok(result) => {
                log::info!(
                    "Parsed {} of {} tracks: {} notes, {} events, {} ticks ({})",
                    result.tracks.len(),
                    result.true_track_count,
                    result.total_note_count,
                    result.total_event_count,
                    result.length_ticks,
                    result.status
                );
                self.progress.notify(ParseProgress::Finished {
                    status: result.status,
                });
            }
            Err(error) => self.progress.notify(ParseProgress::Failed {
                reason: error.to_string(),
            }),
        }

        parsed
    }
}

/// Parses a file with the default options
pub fn parse<PATH: AsRef<Path>>(
    path: PATH,
    analysis_only: bool,
) -> Result<ParseResult, ParseError> {
    MidiParser::new(ParseOptions::default().with_analysis_only(analysis_only)).parse_file(path)
}

#[cfg(test)]
mod tests {
    use std::{io, sync::Arc};

    use pretty_assertions::assert_eq;

    use super::{MidiParser, ParseError, ParseOptions, ParseStatus};
    use crate::{chunk::ChunkParseError, reader::ByteSource, vlq};

    /// A source that reports its full length but stops delivering bytes at `cut`
    struct ShortSource {
        bytes: Vec<u8>,
        cut: u64,
    }

    impl ByteSource for ShortSource {
        fn len(&self) -> io::Result<u64> {
            Ok(self.bytes.len() as u64)
        }

        fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
            let end = self.cut.min(self.bytes.len() as u64);
            if offset >= end {
                return Ok(0);
            }

            let available = &self.bytes[offset as usize..end as usize];
            let n = buf.len().min(available.len());
            buf[..n].copy_from_slice(&available[..n]);
            Ok(n)
        }
    }

    /// A format 1 file at 96 PPQ holding the given track payloads
    fn file(tracks: &[Vec<u8>]) -> Vec<u8> {
        let mut bytes = b"MThd\0\0\0\x06\0\x01".to_vec();
        bytes.extend((tracks.len() as u16).to_be_bytes());
        bytes.extend(96u16.to_be_bytes());
        for track in tracks {
            bytes.extend(b"MTrk");
            bytes.extend((track.len() as u32).to_be_bytes());
            bytes.extend(track);
        }
        bytes
    }

    /// A track playing one note of `ticks` ticks
    fn note_track(pitch: u8, ticks: u32) -> Vec<u8> {
        let mut track = vec![0x00, 0x90, pitch, 0x40];
        track.extend(vlq::encode(ticks));
        track.extend([0x80, pitch, 0x00, 0x00, 0xFF, 0x2F, 0x00]);
        track
    }

    #[test]
    fn options_clamp_to_one() {
        let options = ParseOptions::default()
            .with_max_workers(0)
            .with_buffer_size(0);
        assert_eq!(options.workers(), 1);
        assert_eq!(options.buffer(), 1);

        let raw = ParseOptions {
            max_workers: 0,
            ..ParseOptions::default()
        };
        assert_eq!(raw.workers(), 1);
        assert_eq!(ParseOptions::default().workers(), 8);
    }

    #[test]
    fn length_is_the_longest_track() {
        let source = Arc::new(file(&[note_track(60, 100), note_track(62, 300), note_track(64, 200)]));
        let result = MidiParser::default().parse_source(source).unwrap();

        assert_eq!(result.status, ParseStatus::Success);
        assert_eq!(result.length_ticks, 300);
        assert_eq!(result.total_note_count, 3);
        assert_eq!(result.total_event_count, 6);
        assert_eq!(result.notes().count(), 3);
        assert_eq!(
            result.tracks.iter().map(|track| track.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn failed_tracks_are_not_merged() {
        let truncated = vec![0x00, 0x90, 60, 0x40, 0x10, 0x90, 62, 0x40];
        let source = Arc::new(file(&[note_track(60, 50), truncated]));
        let result = MidiParser::default().parse_source(source).unwrap();

        assert_eq!(result.status, ParseStatus::ParseError);
        assert_eq!(result.true_track_count, 2);
        assert_eq!(result.total_note_count, 1);
        assert_eq!(result.length_ticks, 50);
        assert_eq!(result.failed_tracks.len(), 1);
        assert_eq!(result.failed_tracks[0].index, 1);
    }

    #[test]
    fn header_failures_abort() {
        let mut bytes = file(&[note_track(60, 1)]);
        bytes[0] = b'X';

        assert!(matches!(
            MidiParser::default().parse_source(Arc::new(bytes)),
            Err(ParseError::Chunk(ChunkParseError::MalformedHeader(_)))
        ));
    }

    #[test]
    fn sources_ending_early_abort_the_parse() {
        let first = note_track(60, 10);
        let bytes = file(&[first.clone(), note_track(62, 300)]);
        // Header, both preambles and a few bytes of the second track stay readable
        let cut = (14 + 8 + first.len() + 8 + 4) as u64;

        for options in [ParseOptions::default(), ParseOptions::default().with_buffer_size(2)] {
            let source = Arc::new(ShortSource {
                bytes: bytes.clone(),
                cut,
            });

            assert!(matches!(
                MidiParser::new(options).parse_source(source),
                Err(ParseError::Track { index: 1, ref source }) if source.is_io()
            ));
        }
    }

    #[test]
    fn analysis_only_skips_recording() {
        let source = Arc::new(file(&[note_track(60, 10)]));
        let parser = MidiParser::new(ParseOptions::default().with_analysis_only(true));
        let result = parser.parse_source(source).unwrap();

        assert_eq!(result.total_note_count, 1);
        assert!(result.tracks[0].events.is_empty());
        assert!(result.tracks[0].notes.is_empty());
    }
}
