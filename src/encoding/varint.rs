//! Variable-length integer encoding (LEB128)
//!
//! Lengths and memo slots use unsigned LEB128. Signed integers are zigzag
//! mapped first so small negative values stay short.

use crate::error::DecodeError;

/// Maximum bytes for a 64-bit varint (ceil(64/7) = 10)
pub const MAX_VARINT_BYTES: usize = 10;

/// Encode a u64 as varint into a byte buffer.
/// Returns the number of bytes written.
///
/// # Encoding Format
/// Each byte contains 7 bits of data and 1 continuation bit (MSB).
/// - If MSB is 1, more bytes follow.
/// - If MSB is 0, this is the last byte.
pub fn encode_varint(mut value: u64, buf: &mut [u8; MAX_VARINT_BYTES]) -> usize {
    let mut i = 0;
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buf[i] = byte;
            return i + 1;
        }
        buf[i] = byte | 0x80;
        i += 1;
    }
}

/// Append a varint to an output buffer.
#[inline]
pub fn write_varint(value: u64, out: &mut Vec<u8>) {
    let mut buf = [0u8; MAX_VARINT_BYTES];
    let len = encode_varint(value, &mut buf);
    out.extend_from_slice(&buf[..len]);
}

/// Decode a varint from a byte slice.
/// Returns (value, bytes_consumed) or error.
pub fn decode_varint(buf: &[u8]) -> Result<(u64, usize), DecodeError> {
    let mut result: u64 = 0;
    let mut shift = 0;

    for (i, &byte) in buf.iter().enumerate() {
        if i >= MAX_VARINT_BYTES {
            return Err(DecodeError::VarintOverflow);
        }

        let value = u64::from(byte & 0x7F);

        // Check for overflow before shifting
        if shift == 63 && value > 1 {
            return Err(DecodeError::VarintOverflow);
        }

        result |= value << shift;

        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }

        shift += 7;
    }

    Err(DecodeError::InvalidVarint)
}

/// Compute the number of bytes needed to encode a value.
#[inline]
pub const fn varint_size(value: u64) -> usize {
    if value == 0 {
        return 1;
    }
    // Number of bytes = ceil(bits_needed / 7)
    let bits = 64 - value.leading_zeros() as usize;
    (bits + 6) / 7
}

/// Map a signed integer onto the unsigned range: 0, -1, 1, -2, 2, ...
#[inline]
pub const fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

#[inline]
pub const fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_roundtrip() {
        let values = [
            0u64,
            1,
            127,
            128,
            255,
            256,
            16383,
            16384,
            u64::from(u32::MAX),
            u64::MAX,
        ];

        for &value in &values {
            let mut buf = [0u8; MAX_VARINT_BYTES];
            let len = encode_varint(value, &mut buf);
            let (decoded, decoded_len) = decode_varint(&buf[..len]).unwrap();
            assert_eq!(value, decoded, "Failed for value {value}");
            assert_eq!(len, decoded_len);
            assert_eq!(len, varint_size(value));
        }
    }

    #[test]
    fn test_varint_sizes() {
        assert_eq!(varint_size(0), 1);
        assert_eq!(varint_size(127), 1);
        assert_eq!(varint_size(128), 2);
        assert_eq!(varint_size(16383), 2);
        assert_eq!(varint_size(16384), 3);
        assert_eq!(varint_size(u64::MAX), 10);
    }

    #[test]
    fn test_write_varint_appends() {
        let mut out = vec![0xAA];
        write_varint(300, &mut out);
        assert_eq!(out, vec![0xAA, 0xAC, 0x02]);
    }

    #[test]
    fn test_truncated_varint() {
        assert!(matches!(
            decode_varint(&[0x80, 0x80]),
            Err(DecodeError::InvalidVarint)
        ));
    }

    #[test]
    fn test_varint_overflow() {
        let buf = [0xFF; 11];
        assert!(matches!(
            decode_varint(&buf),
            Err(DecodeError::VarintOverflow)
        ));
    }

    #[test]
    fn test_zigzag() {
        assert_eq!(zigzag_encode(0), 0);
        assert_eq!(zigzag_encode(-1), 1);
        assert_eq!(zigzag_encode(1), 2);
        assert_eq!(zigzag_encode(-2), 3);
        for v in [0, 5, -5, i64::MAX, i64::MIN] {
            assert_eq!(zigzag_decode(zigzag_encode(v)), v);
        }
    }
}
