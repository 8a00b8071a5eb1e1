/// Delta buffering for snapshot recovery
///
/// While a snapshot is outstanding, live deltas are parked here keyed by ordinal. Once
/// the snapshot lands, everything it already covers is discarded and the rest is handed
/// back in ascending ordinal order for replay.

use std::collections::BTreeMap;

use tracing::warn;

use crate::protocol::DeltaUpdate;

/// Deltas held when no capacity is configured.
pub const DEFAULT_BUFFER_CAPACITY: usize = 100_000;

#[derive(Debug, Clone)]
pub struct DeltaBuffer {
    pending: BTreeMap<i64, DeltaUpdate>,
    capacity: usize,
    overflowed: u64,
}

impl DeltaBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        DeltaBuffer {
            pending: BTreeMap::new(),
            capacity: capacity.max(1),
            overflowed: 0,
        }
    }

    /// Park a delta. A repeated ordinal keeps the first copy and returns false.
    ///
    /// When full, the lowest ordinal is evicted. If the snapshot does not cover it, replay
    /// sees the hole and resyncs.
    pub fn push(&mut self, update: DeltaUpdate) -> bool {
        if self.pending.contains_key(&update.ordinal) {
            return false;
        }
        self.pending.insert(update.ordinal, update);

        if self.pending.len() > self.capacity {
            if let Some((evicted, _)) = self.pending.pop_first() {
                self.overflowed += 1;
                warn!(evicted, capacity = self.capacity, "delta_buffer_overflow");
            }
        }
        true
    }

    /// Take every delta newer than `ordinal`, ascending, and empty the buffer.
    pub fn drain_after(&mut self, ordinal: i64) -> Vec<DeltaUpdate> {
        let pending = std::mem::take(&mut self.pending);
        pending
            .into_iter()
            .filter(|(seq, _)| *seq > ordinal)
            .map(|(_, update)| update)
            .collect()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Deltas evicted because the buffer was full
    pub fn overflowed(&self) -> u64 {
        self.overflowed
    }

    pub fn lowest_ordinal(&self) -> Option<i64> {
        self.pending.keys().next().copied()
    }

    pub fn highest_ordinal(&self) -> Option<i64> {
        self.pending.keys().next_back().copied()
    }
}

impl Default for DeltaBuffer {
    fn default() -> Self {
        Self::new()
    }
}
