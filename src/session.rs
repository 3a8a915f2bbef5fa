//! Connection lifecycle manager and session task.
//!
//! One task owns the link handle, the lifecycle state machine, and the
//! transfer orchestrator; every other component sees the state only through
//! the published status watch. The state machine:
//!
//! ```text
//! Disconnected -> Opening -> Configuring -> Ready <-> Transferring
//!      ^                                      |            |
//!      |                                      v            v
//!      +------------- Closing <--------- (disconnect at any point)
//! ```
//!
//! Open failures retry forever with a fixed delay. Configuration command
//! failures are logged and do not block the transition to `Ready`; the
//! permissiveness is observable through
//! [`SessionStatus::configured_cleanly`]. A disconnect anywhere drops the
//! in-flight sweep (bounded by the per-chunk timeout) and re-enters the
//! reconnect loop. The manager guarantees at most one open connection and
//! at most one in-flight sweep.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::link::{Notifier, SerialLink};
use crate::notify;
use crate::protocol::commands;
use crate::pump::{CompletedChunk, PumpCommand, pump_task};
use crate::sweep::{SweepFailure, SweepReport, run_sweep};

/// Connection lifecycle states. Owned solely by the session task; observers
/// read them from the status watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Opening,
    Configuring,
    Ready,
    Transferring,
    Closing,
}

/// Published session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub state: ConnectionState,
    /// Whether every configuration command (and the link-alive probe) of the
    /// current connection succeeded. `Ready` with `false` here means the
    /// instrument may be running a stale sweep plan; meaningful only once
    /// the state has reached `Ready`.
    pub configured_cleanly: bool,
}

impl SessionStatus {
    pub(crate) fn initial() -> Self {
        Self { state: ConnectionState::Disconnected, configured_cleanly: false }
    }
}

/// Everything the session task owns.
pub(crate) struct SessionTask<L, N> {
    pub link: L,
    pub notifier: N,
    pub config: BridgeConfig,
    pub triggers: mpsc::Receiver<()>,
    pub reports: watch::Sender<Option<Arc<SweepReport>>>,
    pub status: watch::Sender<SessionStatus>,
    pub cancel: CancellationToken,
}

impl<L: SerialLink, N: Notifier> SessionTask<L, N> {
    pub(crate) async fn run(self) {
        let SessionTask {
            mut link,
            mut notifier,
            config,
            mut triggers,
            reports,
            status,
            cancel,
        } = self;

        info!(
            vid = format_args!("{:04x}", config.selector.vid),
            pid = format_args!("{:04x}", config.selector.pid),
            "session task started"
        );

        'reconnect: loop {
            if cancel.is_cancelled() {
                break;
            }

            publish(&status, ConnectionState::Opening, false);
            let events = tokio::select! {
                _ = cancel.cancelled() => break 'reconnect,
                opened = link.open(&config.selector) => opened,
            };
            let events = match events {
                Ok(events) => events,
                Err(error) => {
                    warn!(
                        %error,
                        retry_in = ?config.timing.open_retry_delay,
                        "open failed, retrying"
                    );
                    publish(&status, ConnectionState::Disconnected, false);
                    tokio::select! {
                        _ = cancel.cancelled() => break 'reconnect,
                        _ = tokio::time::sleep(config.timing.open_retry_delay) => {}
                    }
                    continue 'reconnect;
                }
            };
            info!("instrument link open");

            // Per-connection plumbing: pump commands in, completed chunks and
            // the disconnect flag out.
            let (pump_tx, pump_rx) = mpsc::channel(4);
            let (chunk_tx, mut chunk_rx) = mpsc::channel(1);
            let (disconnect_tx, mut disconnect_rx) = watch::channel(false);
            let pump = tokio::spawn(pump_task(
                events,
                pump_rx,
                chunk_tx,
                disconnect_tx,
                cancel.child_token(),
            ));

            publish(&status, ConnectionState::Configuring, false);
            tokio::time::sleep(config.timing.settle_delay).await;
            let clean =
                configure(&mut link, &config, &pump_tx, &mut chunk_rx, &mut disconnect_rx).await;
            if !clean {
                warn!("configuration incomplete, proceeding to ready anyway");
            }
            // Triggers that landed while we were away are dropped, not
            // queued; drain before announcing readiness so a trigger sent
            // after observing `Ready` is never discarded.
            drain_stale_triggers(&mut triggers);
            publish(&status, ConnectionState::Ready, clean);
            info!(configured_cleanly = clean, "session ready for triggers");

            'connected: loop {
                tokio::select! {
                    _ = cancel.cancelled() => break 'connected,
                    // Scoped so the watch guard is dropped before the trigger
                    // arm hands the receiver to the sweep.
                    _ = async { let _ = disconnect_rx.wait_for(|gone| *gone).await; } => {
                        info!("disconnect observed while ready");
                        break 'connected;
                    }
                    trigger = triggers.recv() => match trigger {
                        None => {
                            debug!("trigger channel closed, shutting down");
                            cancel.cancel();
                            break 'connected;
                        }
                        Some(()) => {
                            publish(&status, ConnectionState::Transferring, clean);
                            let report = run_sweep(
                                &mut link,
                                &config,
                                &pump_tx,
                                &mut chunk_rx,
                                &mut disconnect_rx,
                            )
                            .await;

                            let payload = notify::format_report(&report);
                            let disconnected =
                                matches!(report.failure, Some(SweepFailure::Disconnected));
                            reports.send_replace(Some(Arc::clone(&report)));
                            if let Err(error) = notifier.notify(&payload).await {
                                warn!(%error, "notification send failed");
                            }

                            if disconnected {
                                break 'connected;
                            }
                            // Triggers that arrived mid-sweep are dropped.
                            drain_stale_triggers(&mut triggers);
                            publish(&status, ConnectionState::Ready, clean);
                        }
                    }
                }
            }

            publish(&status, ConnectionState::Closing, clean);
            link.close().await;
            drop(pump_tx);
            let _ = pump.await;
            publish(&status, ConnectionState::Disconnected, false);
        }

        link.close().await;
        publish(&status, ConnectionState::Disconnected, false);
        info!("session task ended");
    }
}

fn publish(status: &watch::Sender<SessionStatus>, state: ConnectionState, clean: bool) {
    status.send_replace(SessionStatus { state, configured_cleanly: clean });
}

fn drain_stale_triggers(triggers: &mut mpsc::Receiver<()>) {
    while triggers.try_recv().is_ok() {
        debug!("dropping trigger received while not ready");
    }
}

/// Send the sweep-configuration command sequence, then probe the link.
///
/// Fixed order, short inter-command delay, each command best-effort: a
/// failure flips the clean flag but never blocks progression to `Ready`.
async fn configure<L: SerialLink>(
    link: &mut L,
    config: &BridgeConfig,
    pump: &mpsc::Sender<PumpCommand>,
    chunks: &mut mpsc::Receiver<CompletedChunk>,
    disconnect: &mut watch::Receiver<bool>,
) -> bool {
    let sweep = &config.sweep;
    let timing = &config.timing;
    let mut clean = true;

    let frames: [(&str, Vec<u8>); 4] = [
        ("sweep start", commands::write_u64(commands::ADDR_SWEEP_START, sweep.start_freq_hz).to_vec()),
        ("sweep step", commands::write_u64(commands::ADDR_SWEEP_STEP, sweep.step_hz).to_vec()),
        (
            "point count",
            commands::write_u16(commands::ADDR_SWEEP_POINTS, sweep.point_count as u16).to_vec(),
        ),
        (
            "values per point",
            commands::write_u16(commands::ADDR_VALUES_PER_POINT, sweep.values_per_point).to_vec(),
        ),
    ];

    for (label, frame) in &frames {
        if let Err(error) = link.send(frame, timing.send_timeout).await {
            warn!(command = label, %error, "configuration command failed");
            clean = false;
        }
        tokio::time::sleep(timing.inter_command_delay).await;
    }

    if !probe_link(link, config, pump, chunks, disconnect).await {
        clean = false;
    }
    clean
}

/// Send the INDICATE probe and wait briefly for its one-byte reply.
async fn probe_link<L: SerialLink>(
    link: &mut L,
    config: &BridgeConfig,
    pump: &mpsc::Sender<PumpCommand>,
    chunks: &mut mpsc::Receiver<CompletedChunk>,
    disconnect: &mut watch::Receiver<bool>,
) -> bool {
    while chunks.try_recv().is_ok() {}

    let (ack_tx, ack_rx) = oneshot::channel();
    let armed = pump.send(PumpCommand::Arm { capacity: 1, ack: ack_tx }).await;
    if armed.is_err() || ack_rx.await.is_err() {
        return false;
    }

    if let Err(error) = link.send(&commands::indicate(), config.timing.send_timeout).await {
        warn!(%error, "link probe send failed");
        let _ = pump.send(PumpCommand::Disarm).await;
        return false;
    }

    let alive = tokio::select! {
        received = chunks.recv() => match received {
            Some(chunk) if chunk.bytes == [commands::INDICATE_OK] => true,
            Some(chunk) => {
                warn!(reply = ?chunk.bytes, "unexpected probe reply");
                false
            }
            None => false,
        },
        _ = disconnect.wait_for(|gone| *gone) => false,
        _ = tokio::time::sleep(config.timing.probe_timeout) => {
            warn!(timeout = ?config.timing.probe_timeout, "link probe timed out");
            false
        }
    };

    let _ = pump.send(PumpCommand::Disarm).await;
    alive
}
