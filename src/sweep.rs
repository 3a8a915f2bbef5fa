//! Transfer orchestrator: one full chunked sweep.
//!
//! Runs on the session task. For each chunk it arms the pump, sends the
//! chunked READ_FIFO command, then waits on whichever comes first: the
//! completion signal, the disconnect flag, or the per-chunk deadline.
//! Completed chunks are decoded and folded into the running minimum right
//! here, after the hand-off, never in the receive path. A failed chunk is
//! not retried; it aborts the sweep, and the caller may trigger a fresh
//! sweep once the connection is confirmed healthy.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::config::BridgeConfig;
use crate::link::SerialLink;
use crate::protocol::{RAW_POINT_SIZE, RawPoint, commands};
use crate::pump::{CompletedChunk, PumpCommand};
use crate::s11::{SweepResult, evaluate, update_minimum};

/// Why a sweep did not produce a clean result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepFailure {
    /// A command failed to transmit; the connection is presumed suspect.
    SendFailed,
    /// A chunk missed its completion deadline.
    ChunkTimeout { chunk: u32 },
    /// The link dropped mid-sweep.
    Disconnected,
    /// Every point evaluated to an unusable magnitude.
    NoFiniteMinimum,
}

impl SweepFailure {
    /// Short class label used in diagnostic notifications.
    pub fn label(&self) -> &'static str {
        match self {
            SweepFailure::SendFailed => "send-failed",
            SweepFailure::ChunkTimeout { .. } => "timeout",
            SweepFailure::Disconnected => "disconnected",
            SweepFailure::NoFiniteMinimum => "no-minimum",
        }
    }
}

/// Frozen outcome of one sweep, emitted exactly once per trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub result: SweepResult,
    pub failure: Option<SweepFailure>,
    /// Configured points per sweep, carried so diagnostics can report
    /// `processed/expected`.
    pub expected_points: u32,
}

/// Run one full sweep. Always returns a report; failures are encoded in it,
/// never propagated.
pub(crate) async fn run_sweep<L: SerialLink>(
    link: &mut L,
    config: &BridgeConfig,
    pump: &mpsc::Sender<PumpCommand>,
    chunks: &mut mpsc::Receiver<CompletedChunk>,
    disconnect: &mut watch::Receiver<bool>,
) -> Arc<SweepReport> {
    let sweep = &config.sweep;
    let timing = &config.timing;
    let chunk_count = sweep.chunk_count();
    let mut result = SweepResult::start();
    let mut failure: Option<SweepFailure> = None;

    info!(points = sweep.point_count, chunks = chunk_count, "sweep started");

    // Best effort: a stale FIFO only skews the first chunk, it does not
    // justify aborting before we even asked for data.
    if let Err(error) = link.send(&commands::clear_fifo(), timing.send_timeout).await {
        warn!(%error, "clear-fifo failed, continuing");
    }

    // At most one chunk in flight: arm, send, then wait for this chunk (or a
    // disconnect or the deadline) before asking for the next.
    'chunks: for index in 0..chunk_count {
        trace!(chunk = index, "requesting chunk");

        // A completion left over from an aborted sweep would otherwise be
        // mistaken for this chunk.
        while chunks.try_recv().is_ok() {
            warn!(chunk = index, "discarding stale chunk completion");
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        let armed = pump.send(PumpCommand::Arm { capacity: sweep.chunk_bytes(), ack: ack_tx }).await;
        if armed.is_err() || ack_rx.await.is_err() {
            failure = Some(SweepFailure::Disconnected);
            break 'chunks;
        }

        if let Err(error) =
            link.send(&commands::read_fifo(sweep.chunk_point_count), timing.send_timeout).await
        {
            warn!(chunk = index, %error, "read-fifo send failed, aborting sweep");
            failure = Some(SweepFailure::SendFailed);
            break 'chunks;
        }

        let started = Instant::now();
        let chunk = tokio::select! {
            received = chunks.recv() => match received {
                Some(chunk) => chunk,
                None => {
                    failure = Some(SweepFailure::Disconnected);
                    break 'chunks;
                }
            },
            _ = disconnect.wait_for(|gone| *gone) => {
                warn!(chunk = index, "link disconnected while awaiting chunk");
                failure = Some(SweepFailure::Disconnected);
                break 'chunks;
            }
            _ = tokio::time::sleep(timing.chunk_timeout) => {
                warn!(
                    chunk = index,
                    timeout = ?timing.chunk_timeout,
                    "chunk completion timed out"
                );
                failure = Some(SweepFailure::ChunkTimeout { chunk: index });
                break 'chunks;
            }
        };

        debug!(
            chunk = index,
            bytes = chunk.bytes.len(),
            elapsed = ?started.elapsed(),
            "chunk received"
        );
        process_chunk(&chunk.bytes, config, index, &mut result);
    }

    let _ = pump.send(PumpCommand::Disarm).await;

    result.completed = failure.is_none() && result.points_processed == sweep.point_count;

    // A completed sweep where nothing ever replaced the +inf starting
    // minimum has no reportable resonance.
    if result.completed && !result.has_minimum() {
        failure = Some(SweepFailure::NoFiniteMinimum);
    }

    match &failure {
        None => info!(
            min_db = result.min_magnitude_db,
            freq_hz = result.freq_at_min_hz,
            points = result.points_processed,
            "sweep done"
        ),
        Some(failure) => info!(
            class = failure.label(),
            points = result.points_processed,
            expected = sweep.point_count,
            "sweep failed"
        ),
    }

    Arc::new(SweepReport { result, failure, expected_points: sweep.point_count })
}

/// Decode a completed chunk and fold every point into the running minimum.
fn process_chunk(bytes: &[u8], config: &BridgeConfig, chunk_index: u32, result: &mut SweepResult) {
    let sweep = &config.sweep;
    for (offset, block) in bytes.chunks_exact(RAW_POINT_SIZE).enumerate() {
        let fallback_index = chunk_index * sweep.chunk_point_count + offset as u32;
        match RawPoint::decode(block) {
            Ok(point) => {
                let s11 = evaluate(&point, sweep, fallback_index);
                update_minimum(result, &s11);
            }
            Err(error) => {
                // Unreachable with exact chunking, kept as a guard.
                warn!(index = fallback_index, %error, "skipping undecodable block");
            }
        }
        result.points_processed += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SweepConfig;

    fn config(points: u32, chunk: u32) -> BridgeConfig {
        BridgeConfig {
            sweep: SweepConfig {
                start_freq_hz: 1_000_000_000,
                step_hz: 1_000_000,
                point_count: points,
                values_per_point: 1,
                chunk_point_count: chunk,
            },
            ..Default::default()
        }
    }

    fn block(fwd_re: i32, rev_re: i32, freq_index: u16) -> [u8; RAW_POINT_SIZE] {
        let mut bytes = [0u8; RAW_POINT_SIZE];
        bytes[0..4].copy_from_slice(&fwd_re.to_le_bytes());
        bytes[8..12].copy_from_slice(&rev_re.to_le_bytes());
        bytes[24..26].copy_from_slice(&freq_index.to_le_bytes());
        bytes
    }

    #[test]
    fn process_chunk_tracks_minimum_and_count() {
        let config = config(4, 2);
        let mut result = SweepResult::start();

        let mut chunk = Vec::new();
        chunk.extend_from_slice(&block(1000, 100, 0));
        chunk.extend_from_slice(&block(1000, 10, 1));
        process_chunk(&chunk, &config, 0, &mut result);

        let mut chunk = Vec::new();
        chunk.extend_from_slice(&block(1000, 50, 2));
        chunk.extend_from_slice(&block(1000, 200, 3));
        process_chunk(&chunk, &config, 1, &mut result);

        assert_eq!(result.points_processed, 4);
        // rev/fwd = 10/1000 -> 20*log10(0.01) = -40 dB at index 1.
        assert!((result.min_magnitude_db + 40.0).abs() < 1e-9);
        assert_eq!(result.freq_at_min_hz, 1_001_000_000.0);
    }

    #[test]
    fn process_chunk_uses_fallback_for_bad_index() {
        let config = config(4, 2);
        let mut result = SweepResult::start();

        // freq_index 999 is out of range for 4 points; the point sits at
        // sweep position 3 (chunk 1, offset 1).
        let mut chunk = Vec::new();
        chunk.extend_from_slice(&block(1000, 500, 2));
        chunk.extend_from_slice(&block(1000, 10, 999));
        process_chunk(&chunk, &config, 1, &mut result);

        assert_eq!(result.points_processed, 2);
        assert_eq!(result.freq_at_min_hz, 1_003_000_000.0);
    }

    #[test]
    fn failure_labels_are_stable() {
        assert_eq!(SweepFailure::SendFailed.label(), "send-failed");
        assert_eq!(SweepFailure::ChunkTimeout { chunk: 3 }.label(), "timeout");
        assert_eq!(SweepFailure::Disconnected.label(), "disconnected");
        assert_eq!(SweepFailure::NoFiniteMinimum.label(), "no-minimum");
    }
}
