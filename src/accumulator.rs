//! Byte-level chunk receive buffer.
//!
//! The accumulator runs inside the transport pump task, the analogue of the
//! host stack's receive callback: it must stay cheap (append plus a
//! completion check) and must never interpret sample data. Interpretation
//! happens on the session task after the completed chunk has been published
//! through the hand-off channel.

/// Outcome of feeding received bytes into the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    /// Appended; the chunk is not yet full.
    Partial,
    /// This call filled the buffer exactly. Reported once per chunk.
    Complete,
    /// This call filled the buffer with bytes left over; the excess was
    /// truncated. A protocol anomaly, not a crash condition.
    Overflow,
    /// Bytes arrived after the chunk completed (or between chunks). The
    /// caller logs and discards them.
    Unexpected,
}

/// Fixed-capacity receive buffer for one chunk.
#[derive(Debug)]
pub struct ChunkAccumulator {
    buffer: Vec<u8>,
    capacity: usize,
    complete: bool,
}

impl ChunkAccumulator {
    /// Create an accumulator sized to one chunk.
    pub fn new(capacity: usize) -> Self {
        Self { buffer: Vec::with_capacity(capacity), capacity, complete: false }
    }

    /// Discard buffered bytes and re-arm for a fresh chunk.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.complete = false;
    }

    /// Append received bytes, reporting completion exactly once.
    ///
    /// Appends `min(data.len(), remaining)` bytes. Once the write cursor
    /// reaches capacity the chunk is complete; anything beyond that in the
    /// same call is truncated ([`ChunkStatus::Overflow`]), and any later
    /// call lands in [`ChunkStatus::Unexpected`] until [`reset`] or [`take`].
    ///
    /// [`reset`]: Self::reset
    /// [`take`]: Self::take
    pub fn on_bytes(&mut self, data: &[u8]) -> ChunkStatus {
        if self.complete {
            return ChunkStatus::Unexpected;
        }

        let room = self.capacity - self.buffer.len();
        let copied = room.min(data.len());
        self.buffer.extend_from_slice(&data[..copied]);

        if self.buffer.len() == self.capacity {
            self.complete = true;
            if copied < data.len() { ChunkStatus::Overflow } else { ChunkStatus::Complete }
        } else {
            ChunkStatus::Partial
        }
    }

    /// Take the completed chunk out of the buffer.
    ///
    /// The accumulator stays in its completed state, so stragglers arriving
    /// before the next [`reset`](Self::reset) still report
    /// [`ChunkStatus::Unexpected`].
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }

    /// Bytes accumulated so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing has been accumulated yet.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Chunk capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the chunk has completed.
    pub fn is_complete(&self) -> bool {
        self.complete
    }
}
