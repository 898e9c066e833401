//! The per-track event state machine.
//!
//! A decoder runs up to two passes over the same track window. The enumeration pass validates
//! the event grammar, counts notes and events and optionally records every event. The note
//! connection pass rewinds the window and pairs Note On / Note Off events into [`Note`]s using
//! one LIFO stack per (pitch, channel).

use super::{
    event::{ChannelEventKind, ChannelVoiceEvent},
    meta::{self, MetaEvent, MetaKind, TempoEvent},
    TrackError, TrackEvents, TrackSummary,
};
use crate::{
    note::{Note, NoteStackTable},
    reader::{ByteSource, ReadError, StreamWindow},
    vlq,
};

/// Start of a system exclusive message
const SYSEX: u8 = 0xF0;
/// End of a system exclusive message
const SYSEX_END: u8 = 0xF7;
/// Song Position Pointer, two data bytes
const SONG_POSITION: u8 = 0xF2;
/// Song Select, one data byte
const SONG_SELECT: u8 = 0xF3;
/// Meta event prefix
const META: u8 = 0xFF;
/// Payload size of a Tempo event
const TEMPO_LEN: u32 = 3;

/// One decoded step of the event grammar
#[derive(Debug)]
enum Message {
    /// A channel voice message, Note On with velocity 0 already turned into Note Off
    Channel {
        /// Message type
        kind: ChannelEventKind,
        /// Low nibble of the status
        channel: u8,
        /// Data bytes, the second one is zero for single byte messages
        data: [u8; 2],
    },
    /// A meta event other than Tempo
    Meta {
        /// Event type
        kind: MetaKind,
        /// Payload, empty when it was skipped
        data: Vec<u8>,
    },
    /// A Tempo meta event's 3 byte payload
    Tempo([u8; 3]),
    /// System messages that are skipped over
    System,
}

/// Decodes the events of one track out of its window
#[derive(Debug)]
pub struct EventDecoder<'w, S: ByteSource> {
    /// The track's bytes
    window: &'w mut StreamWindow<S>,
    /// Count only, record nothing
    analysis_only: bool,
    /// Last status byte seen
    running_status: Option<u8>,
    /// Sum of delta-times read so far in the current pass
    tick: u64,
    /// Result of the enumeration pass
    summary: TrackSummary,
    /// Events recorded by the enumeration pass
    events: TrackEvents,
}

impl<'w, S: ByteSource> EventDecoder<'w, S> {
    /// Creates a decoder over a freshly opened track window
    pub fn new(window: &'w mut StreamWindow<S>, analysis_only: bool) -> Self {
        Self {
            window,
            analysis_only,
            running_status: None,
            tick: 0,
            summary: TrackSummary::default(),
            events: TrackEvents::default(),
        }
    }

    /// Absolute tick reached by the current pass
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Counters of the last successful enumeration pass
    pub fn summary(&self) -> TrackSummary {
        self.summary
    }

    /// Hands over the recorded events
    pub fn into_events(self) -> TrackEvents {
        self.events
    }

    /// Pass 1: walks every event up to End of Track, counting and (unless analysis only)
    /// recording them.
    ///
    /// Running out of bytes before End of Track fails with [`TrackError::TruncatedTrack`].
    pub fn enumerate_events(&mut self) -> Result<TrackSummary, TrackError> {
        let record = !self.analysis_only;
        let mut summary = TrackSummary::default();

        loop {
            let (delta_ticks, message) = self.next_message(record)?;

            match message {
                Message::Channel {
                    kind,
                    channel,
                    data,
                } => {
                    summary.event_count += 1;
                    if kind == ChannelEventKind::NoteOn {
                        summary.note_count += 1;
                    }

                    if record {
                        self.events.channel.push(ChannelVoiceEvent {
                            kind,
                            delta_ticks,
                            channel,
                            data,
                        });
                    }
                }
                Message::Tempo(payload) => {
                    let tempo = TempoEvent::from_payload(delta_ticks, payload)
                        .ok_or(TrackError::ZeroTempo { tick: self.tick })?;
                    summary.event_count += 1;

                    if record {
                        self.events.tempo.push(tempo);
                    }
                }
                Message::Meta { kind, data } => {
                    if kind.is_counted() {
                        summary.event_count += 1;
                    }

                    if record {
                        self.events.meta.push(MetaEvent {
                            kind,
                            delta_ticks,
                            data,
                        });
                    }

                    if kind == MetaKind::EndOfTrack {
                        break;
                    }
                }
                Message::System => {}
            }
        }

        summary.length_ticks = self.tick;
        self.summary = summary;
        Ok(summary)
    }

    /// Pass 2: rewinds the window and pairs notes, most recently opened first per
    /// (pitch, channel).
    ///
    /// Best effort: a decode failure stops pairing early without an error. Notes still open
    /// when the pass ends are closed at the last tick reached.
    pub fn connect_notes(&mut self) -> Vec<Note> {
        let mut notes = Vec::with_capacity(usize::try_from(self.summary.note_count).unwrap_or(0));

        if let Err(error) = self.window.reset() {
            log::warn!("Could not rewind track for note pairing: {error}");
            return notes;
        }
        self.running_status = None;
        self.tick = 0;

        let mut open = NoteStackTable::new();
        if let Err(error) = self.pair_notes(&mut open, &mut notes) {
            log::warn!("Note pairing stopped at tick {}: {error}", self.tick);
        }

        let end = self.tick;
        open.drain_all(|index: usize| notes[index].end_tick = Some(end));

        notes
    }

    /// Opens and closes notes until End of Track
    fn pair_notes(
        &mut self,
        open: &mut NoteStackTable<usize>,
        notes: &mut Vec<Note>,
    ) -> Result<(), TrackError> {
        loop {
            let (_, message) = self.next_message(false)?;

            match message {
                Message::Channel {
                    kind: ChannelEventKind::NoteOn,
                    channel,
                    data: [pitch, velocity],
                } => {
                    open.push(pitch, channel, notes.len());
                    notes.push(Note::open(channel, pitch, velocity, self.tick));
                }
                Message::Channel {
                    kind: ChannelEventKind::NoteOff,
                    channel,
                    data: [pitch, _],
                } => {
                    // A Note Off with nothing open is dropped
                    if let Some(index) = open.pop(pitch, channel) {
                        notes[index].end_tick = Some(self.tick);
                    }
                }
                Message::Meta {
                    kind: MetaKind::EndOfTrack,
                    ..
                } => return Ok(()),
                _ => {}
            }
        }
    }

    /// Reads one delta-time and the event after it, advancing the tick
    fn next_message(&mut self, keep_meta: bool) -> Result<(u32, Message), TrackError> {
        let delta_ticks = self.vlq()?;
        self.tick += u64::from(delta_ticks);

        let mut status = self.byte_fast()?;
        if status < 0x80 {
            // A data byte: the event reuses the running status
            let running = self
                .running_status
                .ok_or(TrackError::MissingRunningStatus {
                    byte: status,
                    tick: self.tick,
                })?;
            self.window.push_back(status);
            status = running;
        } else {
            self.running_status = Some(status);
        }

        if let Some(kind) = ChannelEventKind::from_status(status) {
            let mut data = [self.byte()?, 0];
            if kind.data_len() == 2 {
                data[1] = self.byte_fast()?;
            }

            let kind = match kind {
                ChannelEventKind::NoteOn if data[1] == 0 => ChannelEventKind::NoteOff,
                kind => kind,
            };

            return Ok((
                delta_ticks,
                Message::Channel {
                    kind,
                    channel: status & 0x0F,
                    data,
                },
            ));
        }

        let message = match status {
            SYSEX => {
                while self.byte()? != SYSEX_END {}
                Message::System
            }
            SONG_POSITION => {
                self.skip(2)?;
                Message::System
            }
            SONG_SELECT => {
                self.skip(1)?;
                Message::System
            }
            META => self.meta(keep_meta)?,
            _ => Message::System,
        };

        Ok((delta_ticks, message))
    }

    /// Reads a meta event after its 0xFF prefix
    fn meta(&mut self, keep: bool) -> Result<Message, TrackError> {
        let tag = self.byte()?;
        let length = self.vlq()?;

        let Some(kind) = MetaKind::from_tag(tag) else {
            meta::check_len(tag, TEMPO_LEN, length)?;
            return Ok(Message::Tempo([self.byte()?, self.byte()?, self.byte()?]));
        };

        if let Some(expected) = kind.required_len() {
            meta::check_len(tag, expected, length)?;
        }

        let data = if keep {
            // Never trust the declared length further than the window reaches
            let reachable = self.window.len().saturating_sub(self.window.position());
            let mut data = Vec::with_capacity(u64::from(length).min(reachable) as usize);
            for _ in 0..length {
                data.push(self.byte()?);
            }
            data
        } else {
            self.skip(u64::from(length))?;
            vec![]
        };

        Ok(Message::Meta { kind, data })
    }

    /// Lifts a window failure into a track failure at the current tick
    fn lift(&self, error: ReadError) -> TrackError {
        TrackError::from_read(error, self.tick)
    }

    /// Reads a byte, pushback first
    fn byte(&mut self) -> Result<u8, TrackError> {
        self.window.read_byte().map_err(|e| self.lift(e))
    }

    /// Reads a byte where nothing can be pushed back
    fn byte_fast(&mut self) -> Result<u8, TrackError> {
        self.window.read_fast().map_err(|e| self.lift(e))
    }

    /// Reads a variable-length quantity
    fn vlq(&mut self) -> Result<u32, TrackError> {
        vlq::decode(&mut *self.window).map_err(|e| self.lift(e))
    }

    /// Skips bytes
    fn skip(&mut self, count: u64) -> Result<(), TrackError> {
        self.window.skip(count).map_err(|e| self.lift(e))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::EventDecoder;
    use crate::{
        chunk::track::{
            event::{ChannelEventKind, ChannelVoiceEvent},
            meta::MetaKind,
            TrackError, TrackSummary,
        },
        note::Note,
        reader::StreamWindow,
        vlq,
    };

    /// Encodes one event with its delta-time
    fn ev(delta: u32, bytes: &[u8]) -> Vec<u8> {
        let mut out = vlq::encode(delta);
        out.extend_from_slice(bytes);
        out
    }

    /// Concatenates events into track bytes
    fn track(events: &[Vec<u8>]) -> Vec<u8> {
        events.concat()
    }

    /// End of Track after `delta` ticks
    fn end(delta: u32) -> Vec<u8> {
        ev(delta, &[0xFF, 0x2F, 0x00])
    }

    /// A window with tiny buffers so events straddle refills
    fn window(bytes: Vec<u8>) -> StreamWindow<Vec<u8>> {
        let len = bytes.len() as u64;
        StreamWindow::new(Arc::new(bytes), 0, len, 3).unwrap()
    }

    /// Runs both passes over a track
    fn decode(bytes: Vec<u8>) -> (TrackSummary, Vec<Note>, Vec<ChannelVoiceEvent>) {
        let mut window = window(bytes);
        let mut decoder = EventDecoder::new(&mut window, false);
        let summary = decoder.enumerate_events().unwrap();
        let notes = decoder.connect_notes();
        let events = decoder.into_events();
        (summary, notes, events.channel)
    }

    #[test]
    fn running_status_decodes_like_explicit_status() {
        let explicit = track(&[
            ev(0, &[0x90, 60, 100]),
            ev(10, &[0x90, 64, 100]),
            ev(10, &[0x90, 60, 0]),
            ev(10, &[0x90, 64, 0]),
            ev(0, &[0xB3, 7, 127]),
            ev(5, &[0xB3, 10, 64]),
            ev(0, &[0xC3, 5]),
            ev(0, &[0xC3, 6]),
            end(0),
        ]);
        let running = track(&[
            ev(0, &[0x90, 60, 100]),
            ev(10, &[64, 100]),
            ev(10, &[60, 0]),
            ev(10, &[64, 0]),
            ev(0, &[0xB3, 7, 127]),
            ev(5, &[10, 64]),
            ev(0, &[0xC3, 5]),
            ev(0, &[6]),
            end(0),
        ]);

        let (explicit_summary, explicit_notes, explicit_events) = decode(explicit);
        let (running_summary, running_notes, running_events) = decode(running);

        assert_eq!(explicit_summary, running_summary);
        assert_eq!(explicit_events, running_events);
        assert_eq!(explicit_notes, running_notes);
        assert_eq!(
            running_summary,
            TrackSummary {
                note_count: 2,
                event_count: 8,
                length_ticks: 35,
            }
        );
        assert_eq!(
            running_events[7],
            ChannelVoiceEvent {
                kind: ChannelEventKind::ProgramChange,
                delta_ticks: 0,
                channel: 3,
                data: [6, 0],
            }
        );
    }

    #[test]
    fn notes_pair_last_in_first_out() {
        let (_, notes, _) = decode(track(&[
            ev(0, &[0x90, 60, 1]),
            ev(10, &[0x90, 60, 2]),
            ev(10, &[0x80, 60, 0]),
            ev(10, &[0x80, 60, 0]),
            end(0),
        ]));

        assert_eq!(
            notes,
            vec![
                Note {
                    channel: 0,
                    pitch: 60,
                    velocity: 1,
                    start_tick: 0,
                    end_tick: Some(30),
                },
                Note {
                    channel: 0,
                    pitch: 60,
                    velocity: 2,
                    start_tick: 10,
                    end_tick: Some(20),
                },
            ]
        );
    }

    #[test]
    fn unmatched_notes_close_at_end_of_track() {
        let (summary, notes, _) = decode(track(&[
            ev(5, &[0x91, 72, 90]),
            ev(7, &[0x91, 74, 90]),
            ev(3, &[0x81, 74, 0]),
            end(100),
        ]));

        assert_eq!(summary.length_ticks, 115);
        assert_eq!(notes[0].start_tick, 5);
        assert_eq!(notes[0].end_tick, Some(115));
        assert_eq!(notes[1].end_tick, Some(15));
    }

    #[test]
    fn orphan_note_offs_are_dropped() {
        let (_, notes, events) = decode(track(&[
            ev(0, &[0x90, 48, 80]),
            ev(4, &[0x80, 50, 0]),
            ev(0, &[0x85, 48, 0]),
            ev(4, &[0x80, 48, 0]),
            end(0),
        ]));

        assert_eq!(events.len(), 4);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].end_tick, Some(8));
    }

    #[test]
    fn velocity_zero_note_on_is_a_note_off() {
        let (summary, notes, events) = decode(track(&[
            ev(0, &[0x92, 40, 64]),
            ev(12, &[0x92, 40, 0]),
            end(0),
        ]));

        assert_eq!(summary.note_count, 1);
        assert_eq!(events[1].kind, ChannelEventKind::NoteOff);
        assert_eq!(notes[0].end_tick, Some(12));
    }

    #[test]
    fn fixed_size_meta_events_are_validated() {
        for (tag, payload) in [
            (0x51u8, vec![0x07, 0xA1]),
            (0x51, vec![0x07, 0xA1, 0x20, 0x00]),
            (0x58, vec![4, 2, 24]),
            (0x59, vec![0]),
            (0x59, vec![0, 0, 0]),
        ] {
            let mut meta = vec![0xFF, tag, payload.len() as u8];
            meta.extend(&payload);

            let mut window = window(track(&[ev(0, &meta), end(0)]));
            let result = EventDecoder::new(&mut window, true).enumerate_events();

            assert!(
                matches!(result, Err(TrackError::MalformedMetaEvent { meta_type, .. }) if meta_type == tag),
                "tag {tag:#x} with {} bytes",
                payload.len()
            );
        }
    }

    #[test]
    fn meta_events_are_recorded_and_counted() {
        let bytes = track(&[
            ev(0, &[0xFF, 0x03, 0x05, b'P', b'i', b'a', b'n', b'o']),
            ev(0, &[0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20]),
            ev(0, &[0xFF, 0x58, 0x04, 0x03, 0x02, 0x18, 0x08]),
            ev(0, &[0xFF, 0x21, 0x01, 0x00]),
            end(96),
        ]);
        let mut window = window(bytes);
        let mut decoder = EventDecoder::new(&mut window, false);
        let summary = decoder.enumerate_events().unwrap();
        let events = decoder.into_events();

        // Name, tempo and time signature count, the unknown 0x21 and End of Track do not
        assert_eq!(summary.event_count, 3);
        assert_eq!(events.tempo.len(), 1);
        assert_eq!(events.tempo[0].beats_per_minute, 120.0);
        assert_eq!(events.meta.len(), 4);
        assert_eq!(events.meta[0].text().as_deref(), Some("Piano"));
        assert_eq!(events.meta[1].time_signature().map(|ts| ts.denominator), Some(4));
        assert_eq!(events.meta[2].kind, MetaKind::Unknown(0x21));
        assert_eq!(events.meta[2].data, vec![0x00]);
        assert_eq!(events.meta[3].kind, MetaKind::EndOfTrack);
        assert_eq!(events.meta[3].delta_ticks, 96);
    }

    #[test]
    fn zero_tempo_is_rejected() {
        let mut window = window(track(&[ev(0, &[0xFF, 0x51, 0x03, 0, 0, 0]), end(0)]));

        assert!(matches!(
            EventDecoder::new(&mut window, false).enumerate_events(),
            Err(TrackError::ZeroTempo { tick: 0 })
        ));
    }

    #[test]
    fn system_messages_are_skipped() {
        let (summary, notes, events) = decode(track(&[
            ev(0, &[0xF0, 0x43, 0x12, 0x00, 0xF7]),
            ev(1, &[0xF2, 0x10, 0x20]),
            ev(1, &[0xF3, 0x05]),
            ev(1, &[0xF6]),
            ev(1, &[0x90, 60, 100]),
            ev(1, &[0x80, 60, 0]),
            end(0),
        ]));

        assert_eq!(summary.event_count, 2);
        assert_eq!(events.len(), 2);
        assert_eq!(notes[0].start_tick, 4);
        assert_eq!(notes[0].end_tick, Some(5));
    }

    #[test]
    fn meta_and_system_statuses_become_the_running_status() {
        // After the Marker the running status is 0xFF, so `3C 00` reads as meta type 0x3C
        let bytes = track(&[
            ev(0, &[0x90, 60, 100]),
            ev(0, &[0xFF, 0x06, 0x01, b'A']),
            ev(8, &[0x3C, 0x00]),
            end(0),
        ]);
        let mut window = window(bytes.clone());
        let mut decoder = EventDecoder::new(&mut window, false);
        let summary = decoder.enumerate_events().unwrap();
        let events = decoder.into_events();

        assert_eq!(summary.event_count, 2);
        assert_eq!(events.channel.len(), 1);
        assert_eq!(
            events.meta.iter().map(|meta| meta.kind).collect::<Vec<_>>(),
            vec![MetaKind::Marker, MetaKind::Unknown(0x3C), MetaKind::EndOfTrack]
        );
        assert_eq!(events.meta[1].delta_ticks, 8);
        assert!(events.meta[1].data.is_empty());

        // The note is never switched off and closes at the end of the track
        let (_, notes, _) = decode(bytes);
        assert_eq!(notes[0].end_tick, Some(8));

        // Running sysex discards through the next 0xF7
        let (summary, _, _) = decode(track(&[
            ev(0, &[0xF0, 0x01, 0xF7]),
            ev(4, &[0x02, 0x03, 0xF7]),
            ev(0, &[0x90, 60, 100]),
            end(2),
        ]));
        assert_eq!(summary.event_count, 1);
        assert_eq!(summary.length_ticks, 6);
    }

    #[test]
    fn data_byte_without_running_status_fails() {
        let mut window = window(track(&[ev(0, &[60, 100]), end(0)]));

        assert!(matches!(
            EventDecoder::new(&mut window, false).enumerate_events(),
            Err(TrackError::MissingRunningStatus { byte: 60, tick: 0 })
        ));
    }

    #[test]
    fn tracks_without_end_of_track_are_truncated() {
        let mut window = window(track(&[ev(0, &[0x90, 60, 100]), ev(30, &[0x80, 60, 0])]));

        assert!(matches!(
            EventDecoder::new(&mut window, false).enumerate_events(),
            Err(TrackError::TruncatedTrack { tick: 30 })
        ));

        let mut window = self::window(track(&[ev(0, &[0x90, 60])]));
        assert!(matches!(
            EventDecoder::new(&mut window, false).enumerate_events(),
            Err(TrackError::TruncatedTrack { .. })
        ));
    }

    #[test]
    fn analysis_only_records_nothing() {
        let mut window = window(track(&[
            ev(0, &[0x90, 60, 100]),
            ev(0, &[0xFF, 0x01, 0x02, b'h', b'i']),
            ev(0, &[0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20]),
            end(48),
        ]));
        let mut decoder = EventDecoder::new(&mut window, true);
        let summary = decoder.enumerate_events().unwrap();

        assert_eq!(summary.event_count, 3);
        assert_eq!(summary.note_count, 1);
        assert_eq!(summary.length_ticks, 48);
        assert!(decoder.into_events().is_empty());
    }

    #[test]
    fn note_pairing_failures_are_suppressed() {
        // Pairing alone over a track that stops mid-event
        let mut window = window(track(&[
            ev(0, &[0x90, 60, 100]),
            ev(6, &[0x90, 62, 100]),
            ev(6, &[0x80, 62, 0]),
            ev(6, &[0x90]),
        ]));
        let mut decoder = EventDecoder::new(&mut window, false);
        let notes = decoder.connect_notes();

        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].end_tick, Some(18));
        assert_eq!(notes[1].end_tick, Some(12));
    }

    #[test]
    fn bytes_after_end_of_track_are_ignored() {
        let mut bytes = track(&[ev(3, &[0x90, 60, 100]), end(5)]);
        bytes.extend([0xDE, 0xAD]);

        let (summary, notes, _) = decode(bytes);
        assert_eq!(summary.length_ticks, 8);
        assert_eq!(notes[0].end_tick, Some(8));
    }
}
