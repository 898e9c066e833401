//! Variable-length quantities, MIDI's 7 bits per byte big-endian integers used for delta-times
//! and meta event lengths

use crate::reader::{MidiStream, ReadError};

/// Low 7 bits of a VLQ byte carry the value
const VALUE_MASK: u8 = 0x7F;
/// High bit of a VLQ byte marks that another byte follows
const CONTINUATION: u8 = 0x80;

/// Decodes a variable-length quantity, most significant group first.
///
/// No length bound is enforced, values that need more than 32 bits wrap around.
pub fn decode<STREAM: MidiStream + ?Sized>(stream: &mut STREAM) -> Result<u32, ReadError> {
    let mut result: u32 = 0;

    loop {
        let byte = stream.read_byte()?;
        result = (result << 7) | u32::from(byte & VALUE_MASK);

        if byte & CONTINUATION == 0 {
            return Ok(result);
        }
    }
}

/// Encodes a value as its minimal-length variable-length quantity
pub fn encode(mut value: u32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(5);

    loop {
        let mut byte = (value & u32::from(VALUE_MASK)) as u8;
        value >>= 7;

        // Every byte but the last one emitted (least significant) carries the continuation bit
        if !bytes.is_empty() {
            byte |= CONTINUATION;
        }

        bytes.push(byte);

        if value == 0 {
            break;
        }
    }

    bytes.reverse();
    bytes
}
