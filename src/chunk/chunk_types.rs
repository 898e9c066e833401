//! Chunk type tags and fixed chunk sizes

/// Creates a chunk type identifier
macro_rules! chunk_type {
    ($const_name:ident, $a:expr_2021, $b:expr_2021, $c:expr_2021, $d:expr_2021) => {
        /// MIDI chunk type
        pub const $const_name: [char; 4] = [$a, $b, $c, $d];
    };
}

chunk_type!(HEADER_CHUNK, 'M', 'T', 'h', 'd');
chunk_type!(TRACK_DATA_CHUNK, 'M', 'T', 'r', 'k');

/// Bytes in a chunk preamble: the 4 byte tag followed by the 32 bit length
pub const CHUNK_PREAMBLE_LEN: u64 = 8;

/// The only valid payload length of a header chunk
pub const HEADER_PAYLOAD_LEN: usize = 6;
