//! Fixed-offset field encoding for log lines
//!
//! Every scalar is stored little-endian at an offset chosen by the channel
//! layout. Callers guarantee that scalar offsets fit inside the line; string
//! slots are clipped to the buffer so a bad layout can never write out of
//! bounds.
//!
//! String slots carry a 2-byte length prefix instead of a terminator, so any
//! byte (zero included) survives the round-trip.

/// Size of the length prefix at the start of each string slot
pub const STRING_PREFIX_SIZE: usize = 2;

/// Encode a signed 64-bit value (timestamps)
#[inline]
pub fn encode_i64(buf: &mut [u8], offset: usize, value: i64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

/// Decode a signed 64-bit value
#[inline]
pub fn decode_i64(buf: &[u8], offset: usize) -> i64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    i64::from_le_bytes(bytes)
}

/// Encode an unsigned 64-bit value (addresses)
#[inline]
pub fn encode_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

/// Decode an unsigned 64-bit value
#[inline]
pub fn decode_u64(buf: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

/// Encode a signed 32-bit value (thread ids, enum discriminants)
#[inline]
pub fn encode_i32(buf: &mut [u8], offset: usize, value: i32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Decode a signed 32-bit value
#[inline]
pub fn decode_i32(buf: &[u8], offset: usize) -> i32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    i32::from_le_bytes(bytes)
}

/// Encode an unsigned 32-bit value
#[inline]
pub fn encode_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Decode an unsigned 32-bit value
#[inline]
pub fn decode_u32(buf: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

/// Usable slot range after clipping to the buffer
fn clip_slot(buf_len: usize, offset: usize, width: usize) -> Option<(usize, usize)> {
    let end = offset.saturating_add(width).min(buf_len);
    if end < offset.saturating_add(STRING_PREFIX_SIZE) {
        return None;
    }
    Some((offset, end))
}

/// Write `src` into the slot `[offset, offset + width)`
///
/// Copies at most `width - STRING_PREFIX_SIZE` bytes and silently drops the
/// rest. Returns the number of payload bytes stored.
pub fn encode_string(buf: &mut [u8], offset: usize, width: usize, src: &[u8]) -> usize {
    let Some((start, end)) = clip_slot(buf.len(), offset, width) else {
        return 0;
    };

    let payload_start = start + STRING_PREFIX_SIZE;
    let max_payload = (end - payload_start).min(u16::MAX as usize);
    let written = src.len().min(max_payload);

    buf[start..payload_start].copy_from_slice(&(written as u16).to_le_bytes());
    buf[payload_start..payload_start + written].copy_from_slice(&src[..written]);
    written
}

/// Read the bytes stored in the slot `[offset, offset + width)`
///
/// A corrupt prefix is clamped to the slot, so this never reads past it.
pub fn decode_string(buf: &[u8], offset: usize, width: usize) -> &[u8] {
    let Some((start, end)) = clip_slot(buf.len(), offset, width) else {
        return &[];
    };

    let payload_start = start + STRING_PREFIX_SIZE;
    let stored = u16::from_le_bytes([buf[start], buf[start + 1]]) as usize;
    let len = stored.min(end - payload_start);
    &buf[payload_start..payload_start + len]
}

/// Decode a string slot as text, replacing invalid UTF-8
pub fn decode_string_lossy(buf: &[u8], offset: usize, width: usize) -> String {
    String::from_utf8_lossy(decode_string(buf, offset, width)).into_owned()
}

/// Format an address the way crash dumps show it: uppercase hex, no prefix
pub fn format_address(address: u64) -> String {
    format!("{:X}", address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_fields_at_offsets() {
        let mut line = [0u8; 32];
        encode_i64(&mut line, 0, 1_700_000_000_123);
        encode_i32(&mut line, 8, -42);
        encode_u32(&mut line, 12, 7);
        encode_u64(&mut line, 16, 0xDEAD_BEEF_0000_1234);

        assert_eq!(decode_i64(&line, 0), 1_700_000_000_123);
        assert_eq!(decode_i32(&line, 8), -42);
        assert_eq!(decode_u32(&line, 12), 7);
        assert_eq!(decode_u64(&line, 16), 0xDEAD_BEEF_0000_1234);
    }

    #[test]
    fn test_string_keeps_zero_bytes() {
        let mut line = [0xFFu8; 64];
        let src = [b'a', 0, b'b', 0, 0];
        assert_eq!(encode_string(&mut line, 8, 16, &src), src.len());
        assert_eq!(decode_string(&line, 8, 16), &src);
    }

    #[test]
    fn test_string_truncation() {
        let mut line = [0u8; 64];
        let src = b"0123456789abcdefghij";
        let written = encode_string(&mut line, 4, 10, src);
        assert_eq!(written, 10 - STRING_PREFIX_SIZE);
        assert_eq!(decode_string(&line, 4, 10), &src[..8]);
        // Nothing past the slot was touched
        assert!(line[14..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_slot_clipped_to_buffer() {
        let mut line = [0u8; 16];
        let written = encode_string(&mut line, 10, 100, b"abcdefghij");
        assert_eq!(written, 4);
        assert_eq!(decode_string(&line, 10, 100), b"abcd");

        // Slot too small for even the prefix
        assert_eq!(encode_string(&mut line, 15, 8, b"x"), 0);
        assert!(decode_string(&line, 15, 8).is_empty());
        assert!(decode_string(&line, 40, 8).is_empty());
    }

    #[test]
    fn test_corrupt_prefix_is_clamped() {
        let mut line = [b'z'; 32];
        line[0..2].copy_from_slice(&u16::MAX.to_le_bytes());
        assert_eq!(decode_string(&line, 0, 12).len(), 10);
    }

    #[test]
    fn test_format_address() {
        assert_eq!(format_address(0x1F2E3D4C), "1F2E3D4C");
        assert_eq!(format_address(0), "0");
    }
}
