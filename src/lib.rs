//! Async bridge between a vector network analyzer on USB CDC-ACM and a
//! short-range wireless notification channel.
//!
//! The bridge drives the instrument's binary register protocol to run
//! frequency sweeps, streams the 32-byte sample blocks back in fixed-size
//! chunks, computes the S11 reflection magnitude/phase per point on the fly,
//! and tracks the frequency of minimum return loss across the sweep. A
//! wireless write of the trigger literal starts a sweep; every trigger is
//! answered with exactly one notification, success or diagnostic.
//!
//! # Architecture
//!
//! - **Session task** owns the connection lifecycle state machine and the
//!   transfer orchestrator; it is the only task that blocks on chunk
//!   completion or triggers.
//! - **Transport pump task** drains link events into the chunk accumulator
//!   and publishes completed chunks over a capacity-1 channel.
//! - The USB host stack and the wireless service stay behind the
//!   [`SerialLink`] and [`Notifier`] trait seams.
//!
//! # Example
//!
//! ```rust,no_run
//! use resonant_bridge::{Bridge, BridgeConfig, Notifier, SerialLink};
//!
//! # async fn demo(link: impl SerialLink, notifier: impl Notifier) -> resonant_bridge::Result<()> {
//! let handle = Bridge::spawn(link, notifier, BridgeConfig::default())?;
//!
//! // Wire the wireless stack's write callback to the bridge:
//! handle.on_wireless_write(b"MEASURE");
//!
//! // Observe frozen sweep reports:
//! use futures::StreamExt;
//! let mut reports = handle.reports();
//! if let Some(report) = reports.next().await {
//!     println!("min {} dB at {} Hz", report.result.min_magnitude_db, report.result.freq_at_min_hz);
//! }
//! # Ok(())
//! # }
//! ```

mod accumulator;
mod config;
mod error;
mod link;
mod notify;
mod protocol;
mod pump;
mod s11;
mod session;
mod sweep;

use std::sync::Arc;

use futures::Stream;
use tokio::sync::{mpsc, watch};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

pub use accumulator::{ChunkAccumulator, ChunkStatus};
pub use config::{BridgeConfig, DeviceSelector, SweepConfig, Timing};
pub use error::{BridgeError, Result};
pub use link::{LinkEvent, Notifier, SerialLink};
pub use notify::{MAX_PAYLOAD_BYTES, TRIGGER_LITERAL, format_report, is_trigger};
pub use protocol::{RAW_POINT_SIZE, RawPoint, commands};
pub use s11::{
    ComplexSample, DENOM_FLOOR, MAG_SQ_FLOOR, S11Point, SweepResult, evaluate, update_minimum,
};
pub use session::{ConnectionState, SessionStatus};
pub use sweep::{SweepFailure, SweepReport};

use session::SessionTask;

/// Entry point: spawn the bridge against a link and a notifier.
pub struct Bridge;

impl Bridge {
    /// Validate the configuration and spawn the session and pump tasks.
    ///
    /// Must be called within a tokio runtime. The returned handle is the
    /// only way to trigger sweeps and observe results; dropping it shuts
    /// the bridge down.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidConfig`] when the sweep parameters
    /// violate their invariants (see [`SweepConfig::validate`]).
    pub fn spawn<L, N>(link: L, notifier: N, config: BridgeConfig) -> Result<BridgeHandle>
    where
        L: SerialLink,
        N: Notifier,
    {
        config.sweep.validate()?;

        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (report_tx, report_rx) = watch::channel(None);
        let (status_tx, status_rx) = watch::channel(SessionStatus::initial());
        let cancel = CancellationToken::new();

        let task = SessionTask {
            link,
            notifier,
            config,
            triggers: trigger_rx,
            reports: report_tx,
            status: status_tx,
            cancel: cancel.clone(),
        };
        tokio::spawn(task.run());

        Ok(BridgeHandle { triggers: trigger_tx, reports: report_rx, status: status_rx, cancel })
    }
}

/// Handle to a running bridge.
///
/// Cheap to query; the watches always hold the latest published values.
pub struct BridgeHandle {
    triggers: mpsc::Sender<()>,
    reports: watch::Receiver<Option<Arc<SweepReport>>>,
    status: watch::Receiver<SessionStatus>,
    cancel: CancellationToken,
}

impl BridgeHandle {
    /// Entry point for the wireless stack's write callback.
    ///
    /// Starts a sweep iff the payload is the trigger literal and the session
    /// is ready to accept one. Triggers received while a sweep is running or
    /// the device is disconnected are dropped, not queued.
    pub fn on_wireless_write(&self, payload: &[u8]) {
        if !is_trigger(payload) {
            trace!(len = payload.len(), "ignoring non-trigger wireless write");
            return;
        }
        self.request_sweep();
    }

    /// Request a sweep directly, bypassing the trigger-literal check.
    pub fn request_sweep(&self) {
        if self.triggers.try_send(()).is_err() {
            debug!("trigger dropped: sweep already pending");
        }
    }

    /// The most recent frozen sweep report, if any sweep has finished.
    pub fn latest_report(&self) -> Option<Arc<SweepReport>> {
        self.reports.borrow().clone()
    }

    /// Stream of frozen sweep reports, one per trigger.
    ///
    /// Subscribing mid-flight yields the latest report first (watch
    /// semantics), then every subsequent one.
    pub fn reports(&self) -> impl Stream<Item = Arc<SweepReport>> + Unpin + 'static {
        WatchStream::new(self.reports.clone()).filter_map(|report| report)
    }

    /// Current lifecycle state.
    pub fn connection_state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    /// Current session status (state plus configuration cleanliness).
    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// Watch receiver for session status changes.
    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Watch receiver for sweep reports.
    pub fn watch_reports(&self) -> watch::Receiver<Option<Arc<SweepReport>>> {
        self.reports.clone()
    }

    /// Stop the bridge: cancels the session and pump tasks and closes the
    /// link.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for BridgeHandle {
    fn drop(&mut self) {
        debug!("bridge handle dropped, shutting down");
        self.cancel.cancel();
    }
}
