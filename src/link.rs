//! Trait seams for the external collaborators.
//!
//! The USB CDC-ACM host stack and the wireless notification service are out
//! of scope for the bridge core; they are reached only through the narrow
//! interfaces here. Implementations own their discovery, descriptor, and
//! advertising machinery and surface nothing but opens, sends, and events.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::DeviceSelector;
use crate::error::Result;

/// Link-level events delivered by the transport to the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Inbound bytes from the device, in arrival order. May be any size;
    /// chunk framing is the accumulator's job.
    Data(Vec<u8>),
    /// The device went away. Terminal for the current connection.
    Disconnected,
}

/// USB serial (CDC-ACM) host link to the instrument.
///
/// At most one connection is open at a time; the connection lifecycle
/// manager is the only caller. Inbound traffic and disconnects arrive on the
/// event channel returned by [`open`](Self::open); when the implementation
/// drops the sender, the bridge treats it as a disconnect.
#[async_trait]
pub trait SerialLink: Send + 'static {
    /// Discover and open the device, returning the event channel for this
    /// connection. Control-line setup (DTR/RTS) happens here, inside the
    /// implementation.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::TransportOpen`](crate::BridgeError::TransportOpen)
    /// when the device is absent or enumeration fails; the session retries
    /// with a fixed delay.
    async fn open(&mut self, selector: &DeviceSelector) -> Result<mpsc::Receiver<LinkEvent>>;

    /// Transmit one opaque command frame within `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Send`](crate::BridgeError::Send) on transmit
    /// failure or deadline overrun; mid-sweep this aborts the sweep.
    async fn send(&mut self, frame: &[u8], timeout: Duration) -> Result<()>;

    /// Close the connection. Idempotent; called on disconnect recovery and
    /// shutdown.
    async fn close(&mut self);
}

/// Short-range wireless notification channel.
///
/// The bridge emits exactly one notification per trigger, success or
/// diagnostic. Payloads are pre-bounded to the transport limit by the
/// notify adapter.
#[async_trait]
pub trait Notifier: Send + 'static {
    /// Send one UTF-8 notification.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Notify`](crate::BridgeError::Notify) on
    /// delivery failure; the session logs it and continues.
    async fn notify(&mut self, text: &str) -> Result<()>;
}
