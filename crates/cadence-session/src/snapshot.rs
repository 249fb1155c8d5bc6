//! RNG snapshot ring for rollback
//!
//! A fixed-size circular buffer of generator states, one per processed
//! tick. Deliberately lightweight: it captures the generator position and
//! tick only, not entity state, so rolling back restores randomness
//! alignment and nothing else. Full world recovery goes through the host's
//! resync snapshot instead.

use cadence_core::{RngState, Tick};
use serde::{Deserialize, Serialize};

/// Generator state captured after one tick was processed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RngSnapshot {
    /// Tick this snapshot belongs to
    pub tick: Tick,
    /// Generator position at the start of that tick
    pub rng_state: RngState,
    /// Wall-clock capture time (diagnostics only)
    pub timestamp_ms: u64,
}

/// Fixed-size ring of [`RngSnapshot`]s
///
/// O(1) insertion; a slot is reused once the ring wraps, so only the most
/// recent `capacity` ticks are recoverable.
#[derive(Debug, Clone)]
pub struct SnapshotRing {
    /// Ring storage; None means the slot is empty
    slots: Vec<Option<RngSnapshot>>,
    /// Number of occupied slots
    count: usize,
    /// Maximum snapshots retained
    capacity: usize,
}

impl SnapshotRing {
    /// Create a ring holding up to `capacity` snapshots
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            count: 0,
            capacity,
        }
    }

    fn index_for(&self, tick: Tick) -> usize {
        (tick as usize) % self.capacity
    }

    /// Store a snapshot, evicting whatever occupied its slot
    pub fn push(&mut self, snapshot: RngSnapshot) {
        let index = self.index_for(snapshot.tick);
        if self.slots[index].is_none() {
            self.count += 1;
        }
        self.slots[index] = Some(snapshot);
    }

    /// Snapshot for an exact tick, if still retained
    pub fn get(&self, tick: Tick) -> Option<&RngSnapshot> {
        let index = self.index_for(tick);
        self.slots[index].as_ref().filter(|s| s.tick == tick)
    }

    /// Drop every snapshot
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.count = 0;
    }

    /// Number of retained snapshots
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether the ring is empty
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Maximum snapshots retained
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest and newest retained tick
    pub fn tick_range(&self) -> Option<(Tick, Tick)> {
        let mut min = Tick::MAX;
        let mut max = 0;
        for snapshot in self.slots.iter().flatten() {
            min = min.min(snapshot.tick);
            max = max.max(snapshot.tick);
        }
        if min == Tick::MAX {
            None
        } else {
            Some((min, max))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::SessionRng;

    fn snapshot(tick: Tick) -> RngSnapshot {
        let mut rng = SessionRng::new(42i64);
        rng.sync_for_tick(42, tick);
        RngSnapshot {
            tick,
            rng_state: rng.state(),
            timestamp_ms: tick * 50,
        }
    }

    #[test]
    fn test_push_and_get() {
        let mut ring = SnapshotRing::new(8);
        ring.push(snapshot(10));
        ring.push(snapshot(11));

        assert_eq!(ring.len(), 2);
        assert_eq!(ring.get(10).unwrap().tick, 10);
        assert!(ring.get(12).is_none());
    }

    #[test]
    fn test_ring_wrap_evicts_old() {
        let mut ring = SnapshotRing::new(4);
        for tick in 0..6 {
            ring.push(snapshot(tick));
        }

        // Ticks 0 and 1 were overwritten by 4 and 5
        assert!(ring.get(0).is_none());
        assert!(ring.get(1).is_none());
        assert!(ring.get(4).is_some());
        assert!(ring.get(5).is_some());
        assert_eq!(ring.len(), 4);
    }

    #[test]
    fn test_tick_range() {
        let mut ring = SnapshotRing::new(8);
        assert_eq!(ring.tick_range(), None);

        ring.push(snapshot(20));
        ring.push(snapshot(23));
        assert_eq!(ring.tick_range(), Some((20, 23)));
    }

    #[test]
    fn test_clear() {
        let mut ring = SnapshotRing::new(4);
        ring.push(snapshot(1));
        ring.clear();
        assert!(ring.is_empty());
        assert!(ring.get(1).is_none());
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let ring = SnapshotRing::new(0);
        assert_eq!(ring.capacity(), 1);
    }
}
