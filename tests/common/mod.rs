//! Builds Standard MIDI Files in memory
#![allow(dead_code)]

use smf_scan::vlq;

/// Track payload builder
#[derive(Debug, Default, Clone)]
pub struct TrackBuilder {
    bytes: Vec<u8>,
}

impl TrackBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends raw event bytes after a delta-time
    pub fn event(mut self, delta: u32, bytes: &[u8]) -> Self {
        self.bytes.extend(vlq::encode(delta));
        self.bytes.extend_from_slice(bytes);
        self
    }

    /// Appends a meta event
    pub fn meta(mut self, delta: u32, tag: u8, payload: &[u8]) -> Self {
        self.bytes.extend(vlq::encode(delta));
        self.bytes.extend([0xFF, tag]);
        self.bytes.extend(vlq::encode(payload.len() as u32));
        self.bytes.extend_from_slice(payload);
        self
    }

    /// A Note On followed by its Note Off `length` ticks later
    pub fn note(self, delta: u32, channel: u8, pitch: u8, length: u32) -> Self {
        self.event(delta, &[0x90 | channel, pitch, 0x64])
            .event(length, &[0x80 | channel, pitch, 0x00])
    }

    /// Closes the track with End of Track
    pub fn end(self, delta: u32) -> Vec<u8> {
        self.meta(delta, 0x2F, &[]).bytes
    }

    /// The bytes so far, without End of Track
    pub fn unterminated(self) -> Vec<u8> {
        self.bytes
    }
}

/// Whole file builder
#[derive(Debug, Clone)]
pub struct SmfBuilder {
    format: u16,
    declared: Option<u16>,
    division: u16,
    tracks: Vec<Vec<u8>>,
}

impl Default for SmfBuilder {
    fn default() -> Self {
        Self {
            format: 1,
            declared: None,
            division: 96,
            tracks: vec![],
        }
    }
}

impl SmfBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn division(mut self, division: u16) -> Self {
        self.division = division;
        self
    }

    /// Overrides the header's track count
    pub fn declare(mut self, count: u16) -> Self {
        self.declared = Some(count);
        self
    }

    pub fn track(mut self, payload: Vec<u8>) -> Self {
        self.tracks.push(payload);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let declared = self.declared.unwrap_or(self.tracks.len() as u16);

        let mut bytes = b"MThd".to_vec();
        bytes.extend(6u32.to_be_bytes());
        bytes.extend(self.format.to_be_bytes());
        bytes.extend(declared.to_be_bytes());
        bytes.extend(self.division.to_be_bytes());

        for track in self.tracks {
            bytes.extend(b"MTrk");
            bytes.extend((track.len() as u32).to_be_bytes());
            bytes.extend(track);
        }

        bytes
    }
}

/// A file of `count` tracks of varying size, track `i` holding `i + 1` notes on channel `i % 16`
pub fn many_tracks(count: u8) -> Vec<u8> {
    let mut smf = SmfBuilder::new();
    for i in 0..count {
        let mut track = TrackBuilder::new().meta(0, 0x03, format!("Track {i}").as_bytes());
        for n in 0..=i {
            track = track.note(u32::from(n) * 7, i % 16, 36 + n, 90 + u32::from(i));
        }
        smf = smf.track(track.end(u32::from(i) * 11));
    }
    smf.build()
}
