//! CompactSize ("VarInt") encoding used for every length prefix in the wire format
//!
//! - value < 0xfd: single byte
//! - value <= 0xffff: 0xfd + u16 little-endian
//! - value <= 0xffffffff: 0xfe + u32 little-endian
//! - otherwise: 0xff + u64 little-endian
//!
//! Non-canonical encodings (a wider prefix than the value needs) are rejected.

use crate::error::{ChainError, Result};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarIntError {
    InsufficientBytes,
    NonCanonical,
}

impl fmt::Display for VarIntError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarIntError::InsufficientBytes => write!(f, "insufficient bytes to decode varint"),
            VarIntError::NonCanonical => write!(f, "non-canonical varint encoding"),
        }
    }
}

impl std::error::Error for VarIntError {}

impl From<VarIntError> for ChainError {
    fn from(err: VarIntError) -> Self {
        ChainError::Serialization(err.to_string().into())
    }
}

/// Append the encoding of `value` to `out`
pub fn write_varint(out: &mut Vec<u8>, value: u64) {
    if value < 0xfd {
        out.push(value as u8);
    } else if value <= 0xffff {
        out.push(0xfd);
        out.extend_from_slice(&(value as u16).to_le_bytes());
    } else if value <= 0xffff_ffff {
        out.push(0xfe);
        out.extend_from_slice(&(value as u32).to_le_bytes());
    } else {
        out.push(0xff);
        out.extend_from_slice(&value.to_le_bytes());
    }
}

/// Encode a u64 value as a VarInt
///
/// ```
/// use blvm_chainstate::serialization::varint::encode_varint;
///
/// assert_eq!(encode_varint(252), vec![252]);
/// assert_eq!(encode_varint(253), vec![0xfd, 253, 0]);
/// assert_eq!(encode_varint(65536), vec![0xfe, 0, 0, 1, 0]);
/// ```
pub fn encode_varint(value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(9);
    write_varint(&mut out, value);
    out
}

/// Number of bytes [`encode_varint`] produces for `value`
pub fn varint_len(value: u64) -> usize {
    match value {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

/// Decode a VarInt, returning the value and the number of bytes consumed
///
/// ```
/// use blvm_chainstate::serialization::varint::decode_varint;
///
/// assert_eq!(decode_varint(&[0xfd, 253, 0]).unwrap(), (253, 3));
/// assert!(decode_varint(&[0xfd, 1, 0]).is_err());
/// assert!(decode_varint(&[]).is_err());
/// ```
pub fn decode_varint(data: &[u8]) -> Result<(u64, usize)> {
    let first = *data.first().ok_or(VarIntError::InsufficientBytes)?;
    let (width, min) = match first {
        b if b < 0xfd => return Ok((b as u64, 1)),
        0xfd => (2, 0xfd),
        0xfe => (4, 0x1_0000),
        _ => (8, 0x1_0000_0000),
    };
    let body = data
        .get(1..1 + width)
        .ok_or(VarIntError::InsufficientBytes)?;
    let mut buf = [0u8; 8];
    buf[..width].copy_from_slice(body);
    let value = u64::from_le_bytes(buf);
    if value < min {
        return Err(VarIntError::NonCanonical.into());
    }
    Ok((value, 1 + width))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_boundaries() {
        for value in [0u64, 0xfc, 0xfd, 0xffff, 0x1_0000, 0xffff_ffff, 0x1_0000_0000, u64::MAX] {
            let encoded = encode_varint(value);
            assert_eq!(encoded.len(), varint_len(value));
            assert_eq!(decode_varint(&encoded).unwrap(), (value, encoded.len()));
        }
    }

    #[test]
    fn test_varint_rejects_non_canonical() {
        assert!(decode_varint(&[0xfe, 0xff, 0xff, 0, 0]).is_err());
        assert!(decode_varint(&[0xff, 0xff, 0xff, 0xff, 0xff, 0, 0, 0, 0]).is_err());
    }

    #[test]
    fn test_varint_truncated() {
        assert!(decode_varint(&[0xfd, 0x01]).is_err());
        assert!(decode_varint(&[0xff, 0, 0, 0]).is_err());
    }
}
