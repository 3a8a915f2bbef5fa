//! Outbound command frame builders.
//!
//! The instrument speaks a small register protocol: a write opcode, a
//! register address, and a little-endian payload. Sweep parameters live in
//! four registers written once per connection; per-sweep traffic is a FIFO
//! clear followed by repeated chunked FIFO reads.

/// Write an 8-byte little-endian value to a register.
pub const CMD_WRITE8: u8 = 0x23;
/// Write a 2-byte little-endian value to a register.
pub const CMD_WRITE2: u8 = 0x21;
/// Write a single byte to a register.
pub const CMD_WRITE1: u8 = 0x20;
/// Read `n` 32-byte value blocks from a FIFO register.
pub const CMD_READ_FIFO: u8 = 0x18;
/// Link-alive probe; the instrument answers with [`INDICATE_OK`].
pub const CMD_INDICATE: u8 = 0x0D;
/// Expected single-byte reply to [`CMD_INDICATE`].
pub const INDICATE_OK: u8 = 0x32;

/// Sweep start frequency register (8-byte).
pub const ADDR_SWEEP_START: u8 = 0x00;
/// Sweep step frequency register (8-byte).
pub const ADDR_SWEEP_STEP: u8 = 0x10;
/// Sweep point count register (2-byte).
pub const ADDR_SWEEP_POINTS: u8 = 0x20;
/// Values-per-frequency register (2-byte).
pub const ADDR_VALUES_PER_POINT: u8 = 0x22;
/// Sample FIFO register.
pub const ADDR_VALUES_FIFO: u8 = 0x30;

/// Build a WRITE8 frame: opcode, address, 8-byte LE payload.
pub fn write_u64(addr: u8, value: u64) -> [u8; 10] {
    let mut frame = [0u8; 10];
    frame[0] = CMD_WRITE8;
    frame[1] = addr;
    frame[2..10].copy_from_slice(&value.to_le_bytes());
    frame
}

/// Build a WRITE2 frame: opcode, address, 2-byte LE payload.
pub fn write_u16(addr: u8, value: u16) -> [u8; 4] {
    let mut frame = [0u8; 4];
    frame[0] = CMD_WRITE2;
    frame[1] = addr;
    frame[2..4].copy_from_slice(&value.to_le_bytes());
    frame
}

/// Reset the instrument's output FIFO. Writing zero to the FIFO register
/// discards any samples buffered from a previous sweep.
pub fn clear_fifo() -> [u8; 3] {
    [CMD_WRITE1, ADDR_VALUES_FIFO, 0x00]
}

/// Request the next `points` sample blocks from the FIFO. The count rides in
/// a single byte; [`crate::SweepConfig::validate`] rejects chunk sizes that
/// do not fit.
pub fn read_fifo(points: u32) -> [u8; 3] {
    [CMD_READ_FIFO, ADDR_VALUES_FIFO, (points & 0xFF) as u8]
}

/// Link-alive probe frame.
pub fn indicate() -> [u8; 1] {
    [CMD_INDICATE]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write8_frame_is_byte_exact() {
        // 2.4 GHz = 0x8F0D1800, little-endian in the payload.
        let frame = write_u64(ADDR_SWEEP_START, 2_400_000_000);
        assert_eq!(frame, [0x23, 0x00, 0x00, 0x18, 0x0D, 0x8F, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn write2_frame_is_byte_exact() {
        let frame = write_u16(ADDR_SWEEP_POINTS, 200);
        assert_eq!(frame, [0x21, 0x20, 0xC8, 0x00]);

        let frame = write_u16(ADDR_VALUES_PER_POINT, 1);
        assert_eq!(frame, [0x21, 0x22, 0x01, 0x00]);
    }

    #[test]
    fn clear_fifo_matches_wire_spec() {
        assert_eq!(clear_fifo(), [0x20, 0x30, 0x00]);
    }

    #[test]
    fn read_fifo_masks_count_to_one_byte() {
        assert_eq!(read_fifo(50), [0x18, 0x30, 50]);
        assert_eq!(read_fifo(200), [0x18, 0x30, 200]);
        // Masking, not saturation: matches the source's `n & 0xFF`.
        assert_eq!(read_fifo(0x1FF), [0x18, 0x30, 0xFF]);
    }

    #[test]
    fn indicate_probe_is_one_opcode_byte() {
        assert_eq!(indicate(), [0x0D]);
    }
}
