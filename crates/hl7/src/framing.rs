//! MLLP framing over an accumulation buffer
//!
//! A frame is `0x0B <message> 0x1C 0x0D`. Bytes arrive in arbitrary
//! chunks, so the session keeps a `BytesMut` and asks for complete
//! frames; anything before the start byte is noise from the transport
//! and is discarded.

use bytes::{BufMut, BytesMut};

/// Frame start byte (vertical tab)
pub const START_BLOCK: u8 = 0x0B;
/// First frame end byte (file separator)
pub const END_BLOCK: u8 = 0x1C;
/// Second frame end byte (carriage return)
pub const END_CR: u8 = 0x0D;

/// Extract the next complete frame from the buffer, if one is present.
///
/// Consumes the frame bytes (and any leading noise) from the buffer.
/// Returns `None` when the buffer holds only an incomplete frame; the
/// caller should read more bytes and try again.
pub fn next_frame(buffer: &mut BytesMut) -> Option<Vec<u8>> {
    // Drop noise ahead of the start byte.
    match buffer.iter().position(|&b| b == START_BLOCK) {
        Some(0) => {}
        Some(start) => {
            let _ = buffer.split_to(start);
        }
        None => {
            buffer.clear();
            return None;
        }
    }

    let end = buffer
        .windows(2)
        .position(|w| w == [END_BLOCK, END_CR])?;
    let frame = buffer.split_to(end + 2);
    Some(frame[1..end].to_vec())
}

/// Wrap message bytes in an MLLP frame for writing back on the socket
pub fn wrap_frame(message: &[u8]) -> Vec<u8> {
    let mut out = BytesMut::with_capacity(message.len() + 3);
    out.put_u8(START_BLOCK);
    out.put_slice(message);
    out.put_u8(END_BLOCK);
    out.put_u8(END_CR);
    out.to_vec()
}
