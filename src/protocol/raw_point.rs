//! Fixed-size instrument sample record.
//!
//! The FIFO streams 32-byte value blocks:
//!
//! | offset | field      | type    |
//! |--------|------------|---------|
//! | 0      | fwd_re     | i32 LE  |
//! | 4      | fwd_im     | i32 LE  |
//! | 8      | rev_re     | i32 LE  |
//! | 12     | rev_im     | i32 LE  |
//! | 16..24 | reserved   |         |
//! | 24     | freq_index | u16 LE  |
//! | 26..32 | reserved   |         |
//!
//! Records are parsed read-only and never mutated.

use crate::error::{BridgeError, Result};

/// Size of one sample block on the wire.
pub const RAW_POINT_SIZE: usize = 32;

/// One decoded sample block: forward/reflected channel samples plus the
/// instrument-reported frequency index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawPoint {
    pub fwd_re: i32,
    pub fwd_im: i32,
    pub rev_re: i32,
    pub rev_im: i32,
    pub freq_index: u16,
}

impl RawPoint {
    /// Decode one 32-byte block.
    ///
    /// Pure function; the only failure mode is a short input. Callers slice
    /// chunk buffers into exact 32-byte blocks, so the length check is a
    /// guard rather than an expected path.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::MalformedBlock`] when fewer than 32 bytes are
    /// supplied.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < RAW_POINT_SIZE {
            return Err(BridgeError::MalformedBlock { len: bytes.len(), expected: RAW_POINT_SIZE });
        }

        Ok(Self {
            fwd_re: parse_i32_le(bytes, 0)?,
            fwd_im: parse_i32_le(bytes, 4)?,
            rev_re: parse_i32_le(bytes, 8)?,
            rev_im: parse_i32_le(bytes, 12)?,
            freq_index: parse_u16_le(bytes, 24)?,
        })
    }
}

fn parse_i32_le(data: &[u8], offset: usize) -> Result<i32> {
    if offset + 4 > data.len() {
        return Err(BridgeError::MalformedBlock { len: data.len(), expected: offset + 4 });
    }
    Ok(i32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]]))
}

fn parse_u16_le(data: &[u8], offset: usize) -> Result<u16> {
    if offset + 2 > data.len() {
        return Err(BridgeError::MalformedBlock { len: data.len(), expected: offset + 2 });
    }
    Ok(u16::from_le_bytes([data[offset], data[offset + 1]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a wire block from its fields; reserved bytes are left zero.
    pub(crate) fn encode(
        fwd_re: i32,
        fwd_im: i32,
        rev_re: i32,
        rev_im: i32,
        freq_index: u16,
    ) -> [u8; RAW_POINT_SIZE] {
        let mut block = [0u8; RAW_POINT_SIZE];
        block[0..4].copy_from_slice(&fwd_re.to_le_bytes());
        block[4..8].copy_from_slice(&fwd_im.to_le_bytes());
        block[8..12].copy_from_slice(&rev_re.to_le_bytes());
        block[12..16].copy_from_slice(&rev_im.to_le_bytes());
        block[24..26].copy_from_slice(&freq_index.to_le_bytes());
        block
    }

    #[test]
    fn decodes_all_fields_from_their_offsets() {
        let block = encode(1000, -2000, 30, -40, 57);
        let point = RawPoint::decode(&block).expect("well-formed block");

        assert_eq!(point.fwd_re, 1000);
        assert_eq!(point.fwd_im, -2000);
        assert_eq!(point.rev_re, 30);
        assert_eq!(point.rev_im, -40);
        assert_eq!(point.freq_index, 57);
    }

    #[test]
    fn reserved_bytes_are_ignored() {
        let mut block = encode(1, 2, 3, 4, 5);
        for b in &mut block[16..24] {
            *b = 0xAA;
        }
        for b in &mut block[26..32] {
            *b = 0x55;
        }
        let point = RawPoint::decode(&block).expect("reserved bytes must not affect decode");
        assert_eq!(point, RawPoint { fwd_re: 1, fwd_im: 2, rev_re: 3, rev_im: 4, freq_index: 5 });
    }

    #[test]
    fn short_input_is_malformed() {
        let block = [0u8; RAW_POINT_SIZE];
        for len in [0, 1, 16, 31] {
            let err = RawPoint::decode(&block[..len]).unwrap_err();
            match err {
                BridgeError::MalformedBlock { len: got, expected } => {
                    assert_eq!(got, len);
                    assert_eq!(expected, RAW_POINT_SIZE);
                }
                other => panic!("expected MalformedBlock, got {other:?}"),
            }
        }
    }

    #[test]
    fn oversized_input_uses_leading_block() {
        let mut long = vec![0u8; 64];
        long[..RAW_POINT_SIZE].copy_from_slice(&encode(7, 8, 9, 10, 11));
        let point = RawPoint::decode(&long).expect("leading 32 bytes are a valid block");
        assert_eq!(point.freq_index, 11);
    }

    #[cfg(test)]
    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn decode_inverts_field_encoding(
                fwd_re in any::<i32>(),
                fwd_im in any::<i32>(),
                rev_re in any::<i32>(),
                rev_im in any::<i32>(),
                freq_index in any::<u16>()
            ) {
                let block = encode(fwd_re, fwd_im, rev_re, rev_im, freq_index);
                let point = RawPoint::decode(&block).expect("encoded block must decode");
                prop_assert_eq!(point, RawPoint { fwd_re, fwd_im, rev_re, rev_im, freq_index });
            }
        }
    }
}
