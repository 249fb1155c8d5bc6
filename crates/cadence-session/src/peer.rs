//! Per-remote-peer bookkeeping
//!
//! One `PeerLockstepState` exists per remote peer, created when the peer
//! joins and owned exclusively by the manager. Disconnection is a flag,
//! not a removal: buffered input survives so a reconnecting peer resumes
//! without resending commands that already arrived.

use cadence_core::{InputBuffer, PeerId, Tick};

/// Latency EMA weight for new samples
const LATENCY_ALPHA: f64 = 0.2;

/// Synchronization bookkeeping for one remote peer
#[derive(Debug)]
pub struct PeerLockstepState {
    /// The peer this state belongs to
    pub peer_id: PeerId,
    /// Highest tick whose hash matched ours
    pub last_confirmed_tick: Tick,
    /// Highest tick we have received input for
    pub last_received_tick: Tick,
    /// Smoothed one-way latency estimate in milliseconds
    pub latency_ms: f64,
    /// False while the peer is dropped; orthogonal to desync
    pub connected: bool,
    /// True after a hash mismatch, cleared by a subsequent match or resync
    pub desynced: bool,
    /// This peer's own input commands, tick-indexed
    pub buffer: InputBuffer,
}

impl PeerLockstepState {
    /// Create fresh state for a newly joined peer
    pub fn new(peer_id: PeerId) -> Self {
        Self {
            peer_id,
            last_confirmed_tick: 0,
            last_received_tick: 0,
            latency_ms: 0.0,
            connected: true,
            desynced: false,
            buffer: InputBuffer::new(),
        }
    }

    /// Record that input for `tick` arrived from this peer
    ///
    /// `last_received_tick` only moves forward; reordered packets cannot
    /// roll it back.
    pub fn record_input_tick(&mut self, tick: Tick) {
        self.last_received_tick = self.last_received_tick.max(tick);
    }

    /// Fold a latency sample into the smoothed estimate
    pub fn record_latency(&mut self, sample_ms: u64) {
        if self.latency_ms == 0.0 {
            self.latency_ms = sample_ms as f64;
        } else {
            self.latency_ms =
                self.latency_ms * (1.0 - LATENCY_ALPHA) + sample_ms as f64 * LATENCY_ALPHA;
        }
    }

    /// Record a hash match at `tick`
    pub fn confirm(&mut self, tick: Tick) {
        self.desynced = false;
        self.last_confirmed_tick = self.last_confirmed_tick.max(tick);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_peer_defaults() {
        let peer = PeerLockstepState::new(PeerId::new("p2"));
        assert!(peer.connected);
        assert!(!peer.desynced);
        assert_eq!(peer.last_received_tick, 0);
        assert_eq!(peer.last_confirmed_tick, 0);
    }

    #[test]
    fn test_received_tick_monotonic() {
        let mut peer = PeerLockstepState::new(PeerId::new("p2"));
        peer.record_input_tick(10);
        peer.record_input_tick(7);
        assert_eq!(peer.last_received_tick, 10);
        peer.record_input_tick(12);
        assert_eq!(peer.last_received_tick, 12);
    }

    #[test]
    fn test_latency_smoothing() {
        let mut peer = PeerLockstepState::new(PeerId::new("p2"));
        peer.record_latency(100);
        assert_eq!(peer.latency_ms, 100.0);

        peer.record_latency(200);
        assert!(peer.latency_ms > 100.0 && peer.latency_ms < 200.0);
    }

    #[test]
    fn test_confirm_clears_desync() {
        let mut peer = PeerLockstepState::new(PeerId::new("p2"));
        peer.desynced = true;
        peer.confirm(30);
        assert!(!peer.desynced);
        assert_eq!(peer.last_confirmed_tick, 30);

        // Confirmation never regresses
        peer.confirm(20);
        assert_eq!(peer.last_confirmed_tick, 30);
    }
}
