//! Transport pump task.
//!
//! Drains link-level events for one connection and nothing else: received
//! bytes go into the [`ChunkAccumulator`], completed chunks are published to
//! the session task over a capacity-1 channel, and disconnects are forwarded
//! on their own watch channel. The pump never interprets sample data and
//! never blocks on the session task; a duplicate completion that arrives
//! before pickup is dropped with a warning instead of blocking.

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::accumulator::{ChunkAccumulator, ChunkStatus};
use crate::link::LinkEvent;

/// Control messages from the transfer orchestrator to the pump.
#[derive(Debug)]
pub(crate) enum PumpCommand {
    /// Reset the accumulator for a chunk of `capacity` bytes. The ack tells
    /// the orchestrator the pump is armed before READ_FIFO goes out, keeping
    /// at most one chunk in flight.
    Arm { capacity: usize, ack: oneshot::Sender<()> },
    /// Stop accumulating; out-of-sweep bytes are logged and discarded.
    Disarm,
}

/// A completed chunk, published pump -> session. The channel transfer is the
/// happens-before edge that lets the session task read the bytes without a
/// lock.
#[derive(Debug)]
pub(crate) struct CompletedChunk {
    pub bytes: Vec<u8>,
}

/// Run the pump for one connection. Ends when the link disconnects, the
/// event sender is dropped, the command sender is dropped, or the bridge is
/// cancelled.
pub(crate) async fn pump_task(
    mut events: mpsc::Receiver<LinkEvent>,
    mut commands: mpsc::Receiver<PumpCommand>,
    chunks: mpsc::Sender<CompletedChunk>,
    disconnected: watch::Sender<bool>,
    cancel: CancellationToken,
) {
    debug!("transport pump started");
    let mut accumulator: Option<ChunkAccumulator> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("transport pump cancelled");
                break;
            }
            command = commands.recv() => match command {
                Some(PumpCommand::Arm { capacity, ack }) => {
                    // Bytes already queued predate this arm; route them
                    // through the old state so they cannot land in the new
                    // chunk. A queued disconnect means the arm must fail,
                    // not ack.
                    if drain_pre_arm_events(&mut events, &mut accumulator, &chunks) {
                        debug!("link disconnected, notifying session");
                        let _ = disconnected.send(true);
                        break;
                    }
                    accumulator = Some(ChunkAccumulator::new(capacity));
                    let _ = ack.send(());
                }
                Some(PumpCommand::Disarm) => {
                    accumulator = None;
                }
                None => {
                    debug!("session dropped pump commands, stopping pump");
                    break;
                }
            },
            event = events.recv() => match event {
                Some(LinkEvent::Data(data)) => {
                    handle_data(&mut accumulator, &data, &chunks);
                }
                Some(LinkEvent::Disconnected) | None => {
                    debug!("link disconnected, notifying session");
                    let _ = disconnected.send(true);
                    break;
                }
            },
        }
    }
}

/// Drain events queued ahead of an arm command. Returns `true` when a
/// disconnect was among them (or the event sender is gone).
fn drain_pre_arm_events(
    events: &mut mpsc::Receiver<LinkEvent>,
    accumulator: &mut Option<ChunkAccumulator>,
    chunks: &mpsc::Sender<CompletedChunk>,
) -> bool {
    loop {
        match events.try_recv() {
            Ok(LinkEvent::Data(data)) => handle_data(accumulator, &data, chunks),
            Ok(LinkEvent::Disconnected) | Err(TryRecvError::Disconnected) => return true,
            Err(TryRecvError::Empty) => return false,
        }
    }
}

fn handle_data(
    accumulator: &mut Option<ChunkAccumulator>,
    data: &[u8],
    chunks: &mpsc::Sender<CompletedChunk>,
) {
    let Some(acc) = accumulator.as_mut() else {
        warn!(len = data.len(), "bytes received outside a chunk request, discarding");
        return;
    };

    match acc.on_bytes(data) {
        ChunkStatus::Partial => {
            trace!(len = data.len(), have = acc.len(), want = acc.capacity(), "chunk bytes");
        }
        ChunkStatus::Complete => {
            publish(acc, chunks);
        }
        ChunkStatus::Overflow => {
            warn!(
                len = data.len(),
                capacity = acc.capacity(),
                "chunk overflow, excess bytes truncated"
            );
            publish(acc, chunks);
        }
        ChunkStatus::Unexpected => {
            warn!(len = data.len(), "unexpected bytes after chunk completion, discarding");
        }
    }
}

fn publish(acc: &mut ChunkAccumulator, chunks: &mpsc::Sender<CompletedChunk>) {
    let bytes = acc.take();
    trace!(len = bytes.len(), "chunk complete");
    // Capacity-1, drop-if-full: a stale completion must never block the pump.
    if chunks.try_send(CompletedChunk { bytes }).is_err() {
        warn!("completion signal dropped: previous chunk not yet consumed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn spawn_pump() -> (
        mpsc::Sender<LinkEvent>,
        mpsc::Sender<PumpCommand>,
        mpsc::Receiver<CompletedChunk>,
        watch::Receiver<bool>,
        CancellationToken,
    ) {
        let (event_tx, event_rx) = mpsc::channel(16);
        let (command_tx, command_rx) = mpsc::channel(4);
        let (chunk_tx, chunk_rx) = mpsc::channel(1);
        let (disc_tx, disc_rx) = watch::channel(false);
        let cancel = CancellationToken::new();
        tokio::spawn(pump_task(event_rx, command_rx, chunk_tx, disc_tx, cancel.clone()));
        (event_tx, command_tx, chunk_rx, disc_rx, cancel)
    }

    async fn arm(commands: &mpsc::Sender<PumpCommand>, capacity: usize) {
        let (ack_tx, ack_rx) = oneshot::channel();
        commands.send(PumpCommand::Arm { capacity, ack: ack_tx }).await.expect("pump alive");
        ack_rx.await.expect("pump acks arm");
    }

    #[tokio::test]
    async fn armed_pump_publishes_completed_chunk() {
        let (events, commands, mut chunks, _disc, cancel) = spawn_pump().await;
        arm(&commands, 8).await;

        events.send(LinkEvent::Data(vec![1; 5])).await.expect("pump alive");
        events.send(LinkEvent::Data(vec![2; 3])).await.expect("pump alive");

        let chunk = chunks.recv().await.expect("one completion");
        assert_eq!(chunk.bytes, vec![1, 1, 1, 1, 1, 2, 2, 2]);
        cancel.cancel();
    }

    #[tokio::test]
    async fn idle_pump_discards_data() {
        let (events, commands, mut chunks, _disc, cancel) = spawn_pump().await;

        events.send(LinkEvent::Data(vec![9; 32])).await.expect("pump alive");
        // Arm afterwards: earlier bytes must not count toward the new chunk.
        arm(&commands, 4).await;
        events.send(LinkEvent::Data(vec![1, 2, 3, 4])).await.expect("pump alive");

        let chunk = chunks.recv().await.expect("one completion");
        assert_eq!(chunk.bytes, vec![1, 2, 3, 4]);
        cancel.cancel();
    }

    #[tokio::test]
    async fn bytes_queued_before_arm_never_enter_the_new_chunk() {
        let (events, commands, mut chunks, _disc, cancel) = spawn_pump().await;

        // Queue stale bytes and then arm, so both can be pending when the
        // pump next polls. Whichever the select takes first, the stale bytes
        // must be attributed to the pre-arm state.
        events.send(LinkEvent::Data(vec![9; 4])).await.expect("pump alive");
        arm(&commands, 4).await;
        events.send(LinkEvent::Data(vec![1, 2, 3, 4])).await.expect("pump alive");

        let chunk = chunks.recv().await.expect("one completion");
        assert_eq!(chunk.bytes, vec![1, 2, 3, 4]);
        cancel.cancel();
    }

    #[tokio::test]
    async fn disconnect_queued_before_arm_fails_the_arm() {
        let (events, commands, _chunks, mut disc, _cancel) = spawn_pump().await;

        events.send(LinkEvent::Disconnected).await.expect("pump alive");
        let (ack_tx, ack_rx) = oneshot::channel();
        let _ = commands.send(PumpCommand::Arm { capacity: 8, ack: ack_tx }).await;

        assert!(ack_rx.await.is_err(), "arm must not be acked across a disconnect");
        disc.wait_for(|d| *d).await.expect("disconnect observed");
    }

    #[tokio::test]
    async fn disconnect_event_raises_the_watch_flag() {
        let (events, _commands, _chunks, mut disc, _cancel) = spawn_pump().await;
        events.send(LinkEvent::Disconnected).await.expect("pump alive");
        disc.wait_for(|d| *d).await.expect("disconnect observed");
    }

    #[tokio::test]
    async fn dropped_event_sender_counts_as_disconnect() {
        let (events, _commands, _chunks, mut disc, _cancel) = spawn_pump().await;
        drop(events);
        disc.wait_for(|d| *d).await.expect("disconnect observed");
    }

    #[tokio::test]
    async fn duplicate_completion_is_dropped_not_blocking() {
        let (events, commands, mut chunks, _disc, cancel) = spawn_pump().await;

        // Two back-to-back chunks without a pickup in between: the second
        // completion must be dropped, not block the pump.
        arm(&commands, 2).await;
        events.send(LinkEvent::Data(vec![1, 1])).await.expect("pump alive");
        arm(&commands, 2).await;
        events.send(LinkEvent::Data(vec![2, 2])).await.expect("pump alive");

        // Pump still responsive after the drop.
        arm(&commands, 1).await;

        let first = chunks.recv().await.expect("first completion kept");
        assert_eq!(first.bytes, vec![1, 1]);
        assert!(chunks.try_recv().is_err(), "second completion was dropped");
        cancel.cancel();
    }
}
