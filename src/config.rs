//! Sweep and session configuration.
//!
//! A [`SweepConfig`] is immutable for the lifetime of a session: it is written
//! to the instrument once during the configuration handshake and then used to
//! size chunk buffers and map frequency indices back to hertz. Validation
//! happens up front in [`SweepConfig::validate`] so the transfer path never
//! has to re-check divisibility or range invariants.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{BridgeError, Result};
use crate::protocol::RAW_POINT_SIZE;

/// Immutable per-session sweep parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Sweep start frequency in Hz (written to the instrument as 8-byte LE).
    pub start_freq_hz: u64,
    /// Frequency step between adjacent points in Hz.
    pub step_hz: u64,
    /// Total points per sweep.
    pub point_count: u32,
    /// Values recorded per frequency point (instrument-side averaging).
    pub values_per_point: u16,
    /// Points transferred per READ_FIFO exchange. Must evenly divide
    /// `point_count` and fit the command's single count byte.
    pub chunk_point_count: u32,
}

impl Default for SweepConfig {
    fn default() -> Self {
        // 200 points over 2.0-2.4 GHz, pulled in 4 chunks of 50.
        Self {
            start_freq_hz: 2_000_000_000,
            step_hz: 2_000_000,
            point_count: 200,
            values_per_point: 1,
            chunk_point_count: 50,
        }
    }
}

impl SweepConfig {
    /// Validate the configuration invariants.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidConfig`] when a field is zero, when
    /// `point_count` is not an exact multiple of `chunk_point_count`, or when
    /// a value does not fit its wire encoding.
    pub fn validate(&self) -> Result<()> {
        if self.point_count == 0 {
            return Err(BridgeError::invalid_config("point_count must be nonzero"));
        }
        if self.chunk_point_count == 0 {
            return Err(BridgeError::invalid_config("chunk_point_count must be nonzero"));
        }
        if self.point_count % self.chunk_point_count != 0 {
            return Err(BridgeError::invalid_config(format!(
                "chunk_point_count {} must evenly divide point_count {}",
                self.chunk_point_count, self.point_count
            )));
        }
        // READ_FIFO carries the count in a single byte.
        if self.chunk_point_count > 0xFF {
            return Err(BridgeError::invalid_config(format!(
                "chunk_point_count {} exceeds the READ_FIFO count byte",
                self.chunk_point_count
            )));
        }
        // Point count is written with a 2-byte register command.
        if self.point_count > u32::from(u16::MAX) {
            return Err(BridgeError::invalid_config(format!(
                "point_count {} exceeds the 2-byte register width",
                self.point_count
            )));
        }
        if self.values_per_point == 0 {
            return Err(BridgeError::invalid_config("values_per_point must be nonzero"));
        }
        Ok(())
    }

    /// Number of READ_FIFO exchanges per sweep.
    pub fn chunk_count(&self) -> u32 {
        self.point_count / self.chunk_point_count
    }

    /// Size of one chunk in bytes.
    pub fn chunk_bytes(&self) -> usize {
        self.chunk_point_count as usize * RAW_POINT_SIZE
    }

    /// Frequency of a point index, in exact integer arithmetic, promoted to
    /// floating point only at the end.
    pub fn frequency_at(&self, index: u32) -> f64 {
        (self.start_freq_hz + u64::from(index) * self.step_hz) as f64
    }
}

/// USB device selection for the CDC-ACM host stack.
///
/// Defaults match the instrument as observed on the bus in its FIFO-capable
/// mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSelector {
    pub vid: u16,
    pub pid: u16,
    pub interface: u8,
}

impl Default for DeviceSelector {
    fn default() -> Self {
        Self { vid: 0x04B4, pid: 0x0008, interface: 0 }
    }
}

/// Timing knobs for the connection lifecycle and transfer path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    /// Fixed delay between failed open attempts.
    pub open_retry_delay: Duration,
    /// Settle time after open before the configuration handshake starts.
    pub settle_delay: Duration,
    /// Gap between consecutive configuration commands.
    pub inter_command_delay: Duration,
    /// Per-command transmit deadline.
    pub send_timeout: Duration,
    /// Deadline for one complete chunk to arrive after READ_FIFO.
    pub chunk_timeout: Duration,
    /// Deadline for the link-alive probe reply.
    pub probe_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            open_retry_delay: Duration::from_secs(2),
            settle_delay: Duration::from_millis(100),
            inter_command_delay: Duration::from_millis(50),
            send_timeout: Duration::from_secs(1),
            chunk_timeout: Duration::from_secs(5),
            probe_timeout: Duration::from_millis(500),
        }
    }
}

/// Complete bridge configuration: sweep parameters plus link selection and
/// timing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub sweep: SweepConfig,
    pub selector: DeviceSelector,
    pub timing: Timing,
}
