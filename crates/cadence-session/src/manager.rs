//! LockstepManager - the fixed-tick scheduler
//!
//! Owns the single authoritative tick counter, the local and per-peer input
//! buffers, the session generator, the RNG snapshot ring, and the hash
//! comparison ledger. `update()` is called once per rendered frame and
//! processes zero or more simulation ticks; "waiting for a peer" is simply
//! processing fewer ticks than the accumulator would allow.
//!
//! # Advance guard
//!
//! With no remote peers every banked tick advances (offline fallback).
//! With remote peers, a tick advances only when every *connected* peer has
//! reported input up to `current_tick - input_delay_ticks` and the local
//! tick has not drifted more than `max_tick_drift` past the slowest
//! connected peer's last confirmed hash tick. Input flow and hash
//! confirmation are independent bounds: a peer that keeps sending input
//! but stops confirming hashes cannot drag the session arbitrarily far
//! from its last agreed state. Disconnected peers are excluded, so a
//! dropped peer never stalls the rest. A stall that outlives
//! `input_wait_timeout_ms` disconnects the peers causing it.

use crate::{LockstepConfig, PeerLockstepState, RngSnapshot, SnapshotRing};
use cadence_core::{
    CommandKind, IndexMap, InputBuffer, InputCommand, PeerId, SessionRng, StateHash, Tick,
    TickTimer, ValueMap,
};
use log::{debug, warn};
use std::collections::BTreeMap;
use std::fmt;

/// The ordered input set for one processed tick
///
/// Returned from [`LockstepManager::update`]; the caller feeds each batch
/// to the external simulation before querying state for the next hash.
#[derive(Debug, Clone)]
pub struct TickInputs {
    /// The tick these inputs belong to
    pub tick: Tick,
    /// All peers' commands for the tick, sorted by peer id then input id
    pub inputs: Vec<InputCommand>,
}

/// Hash bookkeeping for one exchange tick
///
/// Created when either side of the comparison (local computation or a
/// remote report) arrives first; resolved as the other side lands. Never
/// mutates simulation state.
#[derive(Debug, Clone)]
pub struct PendingHashComparison {
    /// Exchange tick
    pub tick: Tick,
    /// Locally computed hash, if already recorded
    pub local_hash: Option<StateHash>,
    /// Hashes reported by remote peers
    pub peer_hashes: IndexMap<PeerId, StateHash>,
}

/// One detected divergence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesyncReport {
    /// Peer whose hash disagreed
    pub peer_id: PeerId,
    /// Exchange tick the hashes belong to
    pub tick: Tick,
    /// Our hash
    pub local_hash: StateHash,
    /// Their hash
    pub peer_hash: StateHash,
}

/// Coarse per-peer synchronization state for introspection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerSyncState {
    /// Connected, no hash confirmed yet
    Unconfirmed,
    /// At least one hash matched and none is outstanding as a mismatch
    Synced,
    /// Last comparison mismatched
    Desynced,
    /// Currently dropped (buffered data retained)
    Disconnected,
}

/// Summary statistics for debugging overlays
#[derive(Debug, Clone, Copy)]
pub struct LockstepStats {
    pub current_tick: Tick,
    pub peer_count: usize,
    pub connected_peers: usize,
    pub desynced_peers: usize,
    pub desync_count: u64,
    pub pending_comparisons: usize,
    pub buffered_local_commands: usize,
}

/// Callback invoked on each detected divergence
pub type DesyncHandler = Box<dyn FnMut(&DesyncReport)>;

/// The tick scheduler and peer coordinator for one lockstep session
pub struct LockstepManager {
    config: LockstepConfig,
    session_seed: u64,
    local_peer_id: PeerId,
    /// The single authoritative tick counter; advances only in `update`
    current_tick: Tick,
    rng: SessionRng,
    timer: TickTimer,
    local_buffer: InputBuffer,
    local_seq: u32,
    peers: IndexMap<PeerId, PeerLockstepState>,
    snapshots: SnapshotRing,
    pending_hashes: BTreeMap<Tick, PendingHashComparison>,
    desync_count: u64,
    /// When the advance guard first blocked, if currently blocked
    stall_since_ms: Option<u64>,
    on_desync: Option<DesyncHandler>,
    initialized: bool,
}

impl LockstepManager {
    /// Create an uninitialized manager with the given configuration
    pub fn new(config: LockstepConfig) -> Self {
        let config = config.normalized();
        let timer = TickTimer::new(config.tick_interval_ms);
        let snapshots = SnapshotRing::new(config.snapshot_history);
        Self {
            config,
            session_seed: 1,
            local_peer_id: PeerId::new("local"),
            current_tick: 0,
            rng: SessionRng::default(),
            timer,
            local_buffer: InputBuffer::new(),
            local_seq: 0,
            peers: IndexMap::new(),
            snapshots,
            pending_hashes: BTreeMap::new(),
            desync_count: 0,
            stall_since_ms: None,
            on_desync: None,
            initialized: false,
        }
    }

    /// Arm the manager for a new session
    ///
    /// Resets the tick counter, seeds the generator, creates fresh state
    /// for every remote peer, and clears all history.
    pub fn initialize(&mut self, session_seed: u64, local_peer_id: PeerId, peer_ids: &[PeerId]) {
        self.session_seed = if session_seed == 0 { 1 } else { session_seed };
        self.local_peer_id = local_peer_id;
        self.current_tick = 0;
        self.rng = SessionRng::new(self.session_seed as i64);
        self.timer.reset();
        self.local_buffer.clear();
        self.local_seq = 0;
        self.peers.clear();
        for id in peer_ids {
            if *id != self.local_peer_id {
                self.peers.insert(id.clone(), PeerLockstepState::new(id.clone()));
            }
        }
        self.snapshots.clear();
        self.pending_hashes.clear();
        self.desync_count = 0;
        self.stall_since_ms = None;
        self.initialized = true;
    }

    /// Replace the session configuration
    ///
    /// Call before `initialize`; used by non-host peers adopting the
    /// host's init message.
    pub fn reconfigure(&mut self, config: LockstepConfig) {
        let config = config.normalized();
        self.timer = TickTimer::new(config.tick_interval_ms);
        self.snapshots = SnapshotRing::new(config.snapshot_history);
        self.config = config;
    }

    /// Register the divergence callback
    pub fn on_desync(&mut self, handler: DesyncHandler) {
        self.on_desync = Some(handler);
    }

    /// Current authoritative tick
    pub fn current_tick(&self) -> Tick {
        self.current_tick
    }

    /// Seed shared by all peers this session
    pub fn session_seed(&self) -> u64 {
        self.session_seed
    }

    /// The local peer's id
    pub fn local_peer_id(&self) -> &PeerId {
        &self.local_peer_id
    }

    /// Session configuration (identical on every peer)
    pub fn config(&self) -> &LockstepConfig {
        &self.config
    }

    /// The session generator, reseeded per processed tick
    pub fn rng_mut(&mut self) -> &mut SessionRng {
        &mut self.rng
    }

    /// Advance the session by however many ticks the clock and the guard
    /// allow, and return their ordered input batches
    ///
    /// Bounded by `max_ticks_per_update`; leftover banked time carries to
    /// the next call.
    pub fn update(&mut self, now_ms: u64) -> Vec<TickInputs> {
        if !self.initialized {
            return Vec::new();
        }
        self.timer.accumulate(now_ms);

        let mut processed = Vec::new();
        while (processed.len() as u32) < self.config.max_ticks_per_update && self.timer.has_tick() {
            if !self.can_advance_tick() {
                if self.expire_stalled_peers(now_ms) {
                    // Stalling peers were dropped; re-check the guard
                    continue;
                }
                break;
            }
            self.stall_since_ms = None;
            self.timer.consume_tick();
            processed.push(self.advance_one_tick(now_ms));
        }
        processed
    }

    /// Whether the next tick may be processed
    ///
    /// Public for introspection; `update` applies it internally.
    pub fn can_advance_tick(&self) -> bool {
        let mut min_received = Tick::MAX;
        let mut min_confirmed = Tick::MAX;
        let mut any_connected = false;
        for peer in self.peers.values().filter(|p| p.connected) {
            any_connected = true;
            min_received = min_received.min(peer.last_received_tick);
            min_confirmed = min_confirmed.min(peer.last_confirmed_tick);
        }
        if !any_connected {
            // No connected remote peers: single-player/offline fallback
            return true;
        }
        let horizon = self.current_tick.saturating_sub(self.config.input_delay_ticks);
        if min_received < horizon {
            return false;
        }
        // Hash confirmations lag input flow, so this bounds run-ahead past
        // the last state every peer actually agreed on
        self.current_tick.saturating_sub(min_confirmed) <= self.config.max_tick_drift
    }

    fn advance_one_tick(&mut self, now_ms: u64) -> TickInputs {
        let tick = self.current_tick;

        // Concatenate local + connected remote inputs, then impose the
        // cross-peer total order: peer id first, issue order within a peer
        let mut inputs: Vec<InputCommand> = self.local_buffer.inputs_for_tick(tick).to_vec();
        self.local_buffer.confirm_tick(tick);
        for peer in self.peers.values_mut() {
            if peer.connected {
                inputs.extend_from_slice(peer.buffer.inputs_for_tick(tick));
                peer.buffer.confirm_tick(tick);
            }
        }
        inputs.sort_by(|a, b| a.peer_id.cmp(&b.peer_id).then_with(|| a.id.cmp(&b.id)));

        // Fresh generator stream for this tick, snapshotted for rollback
        self.rng.sync_for_tick(self.session_seed, tick);
        self.snapshots.push(RngSnapshot {
            tick,
            rng_state: self.rng.state(),
            timestamp_ms: now_ms,
        });

        self.current_tick = tick + 1;
        self.prune_history();

        TickInputs { tick, inputs }
    }

    /// Evict buffered inputs and hash comparisons older than the rollback
    /// window
    fn prune_history(&mut self) {
        let floor = self
            .current_tick
            .saturating_sub(self.config.snapshot_history as u64);
        if floor == 0 {
            return;
        }
        self.local_buffer.clear_before(floor);
        for peer in self.peers.values_mut() {
            peer.buffer.clear_before(floor);
        }
        self.pending_hashes = self.pending_hashes.split_off(&floor);
    }

    /// Disconnect peers that have blocked advancement longer than the
    /// configured timeout; returns true if any peer was dropped
    fn expire_stalled_peers(&mut self, now_ms: u64) -> bool {
        let since = *self.stall_since_ms.get_or_insert(now_ms);
        if now_ms.saturating_sub(since) < self.config.input_wait_timeout_ms {
            return false;
        }
        let horizon = self.current_tick.saturating_sub(self.config.input_delay_ticks);
        let mut dropped = false;
        for peer in self.peers.values_mut().filter(|p| p.connected) {
            if peer.last_received_tick < horizon {
                warn!(
                    "peer {} stalled at tick {} (local tick {}); marking disconnected",
                    peer.peer_id, peer.last_received_tick, self.current_tick
                );
                peer.connected = false;
                dropped = true;
            }
        }
        self.stall_since_ms = None;
        dropped
    }

    /// Schedule a local command `input_delay_ticks` into the future
    ///
    /// Returns the broadcast-ready command, or None when the buffer
    /// rejected it as a duplicate.
    pub fn queue_local_input(
        &mut self,
        kind: CommandKind,
        payload: ValueMap,
        now_ms: u64,
    ) -> Option<InputCommand> {
        let tick = self.current_tick + self.config.input_delay_ticks;
        let command = InputCommand::new(
            tick,
            self.local_peer_id.clone(),
            kind,
            payload,
            now_ms,
            self.local_seq,
        );
        self.local_seq = self.local_seq.wrapping_add(1);
        if self.local_buffer.add(command.clone()) {
            Some(command)
        } else {
            None
        }
    }

    /// Highest tick accepted from remote traffic right now
    ///
    /// Ticks beyond this would outlive the pruning window and accumulate
    /// forever, so they are dropped on arrival.
    fn acceptance_horizon(&self) -> Tick {
        self.current_tick
            .saturating_add(self.config.snapshot_history as u64)
    }

    /// Store a remote peer's command
    ///
    /// Messages from unknown peers or for ticks beyond the acceptance
    /// horizon are logged and dropped (never fatal). Returns whether the
    /// command was stored.
    pub fn receive_remote_input(&mut self, command: InputCommand, now_ms: u64) -> bool {
        if command.tick > self.acceptance_horizon() {
            warn!(
                "dropping input from {} for far-future tick {} (local tick {})",
                command.peer_id, command.tick, self.current_tick
            );
            return false;
        }
        let Some(peer) = self.peers.get_mut(&command.peer_id) else {
            warn!("dropping input from unknown peer {}", command.peer_id);
            return false;
        };
        peer.record_input_tick(command.tick);
        peer.record_latency(now_ms.saturating_sub(command.timestamp_ms));
        let stored = peer.buffer.add(command);
        if !stored {
            debug!("duplicate or stale remote input dropped");
        }
        stored
    }

    /// Whether a state hash should be exchanged for this processed tick
    pub fn hash_due(&self, tick: Tick) -> bool {
        tick > 0 && tick % self.config.hash_interval_ticks == 0
    }

    /// Record the locally computed hash for an exchange tick
    ///
    /// Resolves any peer hashes that arrived before ours; returns the
    /// divergences detected by that resolution.
    pub fn record_local_hash(&mut self, tick: Tick, hash: StateHash) -> Vec<DesyncReport> {
        let entry = self
            .pending_hashes
            .entry(tick)
            .or_insert_with(|| PendingHashComparison {
                tick,
                local_hash: None,
                peer_hashes: IndexMap::new(),
            });
        entry.local_hash = Some(hash);

        let deferred: Vec<(PeerId, StateHash)> = entry
            .peer_hashes
            .iter()
            .map(|(id, h)| (id.clone(), *h))
            .collect();
        let mut reports = Vec::new();
        for (peer_id, peer_hash) in deferred {
            if let Some(report) = self.resolve_comparison(&peer_id, tick, hash, peer_hash) {
                reports.push(report);
            }
        }
        reports
    }

    /// Record a hash reported by a remote peer
    ///
    /// If our hash for that tick is not recorded yet the comparison is
    /// deferred until it is. Hashes for ticks beyond the acceptance
    /// horizon are dropped so stored comparisons stay within reach of the
    /// pruner. Returns the divergence, if one was detected now.
    pub fn receive_remote_hash(
        &mut self,
        peer_id: &PeerId,
        tick: Tick,
        hash: StateHash,
    ) -> Option<DesyncReport> {
        if !self.peers.contains_key(peer_id) {
            warn!("dropping hash from unknown peer {}", peer_id);
            return None;
        }
        if tick > self.acceptance_horizon() {
            warn!(
                "dropping hash from {} for far-future tick {} (local tick {})",
                peer_id, tick, self.current_tick
            );
            return None;
        }
        let entry = self
            .pending_hashes
            .entry(tick)
            .or_insert_with(|| PendingHashComparison {
                tick,
                local_hash: None,
                peer_hashes: IndexMap::new(),
            });
        entry.peer_hashes.insert(peer_id.clone(), hash);

        let local = entry.local_hash?;
        self.resolve_comparison(peer_id, tick, local, hash)
    }

    fn resolve_comparison(
        &mut self,
        peer_id: &PeerId,
        tick: Tick,
        local_hash: StateHash,
        peer_hash: StateHash,
    ) -> Option<DesyncReport> {
        let peer = self.peers.get_mut(peer_id)?;
        if local_hash == peer_hash {
            peer.confirm(tick);
            return None;
        }
        peer.desynced = true;
        self.desync_count += 1;
        let report = DesyncReport {
            peer_id: peer_id.clone(),
            tick,
            local_hash,
            peer_hash,
        };
        warn!(
            "desync with peer {} at tick {}: local {} vs peer {}",
            report.peer_id, tick, local_hash, peer_hash
        );
        if let Some(handler) = self.on_desync.as_mut() {
            handler(&report);
        }
        Some(report)
    }

    /// Restore generator state from the snapshot ring and reset the tick
    /// counter
    ///
    /// Intentionally partial: entity state is untouched. Returns false when
    /// no snapshot exists for the tick; the caller's fallback is requesting
    /// a full snapshot from the host.
    pub fn rollback_to_tick(&mut self, tick: Tick) -> bool {
        let Some(snapshot) = self.snapshots.get(tick) else {
            return false;
        };
        let rng_state = snapshot.rng_state.clone();
        self.rng.restore(&rng_state);
        self.current_tick = tick;
        self.timer.reset();
        true
    }

    /// Align with a host-pushed full snapshot taken at `tick`
    ///
    /// Resets the tick counter, reseeds the generator for that tick, and
    /// clears every desync flag and stored comparison. The pushed snapshot
    /// is a state every peer now shares, so it also counts as a hash
    /// confirmation at `tick`.
    pub fn resync_to(&mut self, tick: Tick) {
        self.current_tick = tick;
        self.rng.sync_for_tick(self.session_seed, tick);
        self.timer.reset();
        self.snapshots.clear();
        self.pending_hashes.clear();
        for peer in self.peers.values_mut() {
            peer.confirm(tick);
        }
    }

    // --- Peer lifecycle ---

    /// Add a remote peer mid-session (no-op for the local id or an
    /// existing peer)
    pub fn add_peer(&mut self, peer_id: PeerId) {
        if peer_id != self.local_peer_id && !self.peers.contains_key(&peer_id) {
            self.peers.insert(peer_id.clone(), PeerLockstepState::new(peer_id));
        }
    }

    /// Remove a peer and discard its buffered input
    pub fn remove_peer(&mut self, peer_id: &PeerId) -> bool {
        self.peers.shift_remove(peer_id).is_some()
    }

    /// Flag a peer as disconnected; its buffered input is retained
    pub fn peer_disconnected(&mut self, peer_id: &PeerId) {
        if let Some(peer) = self.peers.get_mut(peer_id) {
            peer.connected = false;
        }
    }

    /// Flag a previously disconnected peer as connected again
    pub fn peer_reconnected(&mut self, peer_id: &PeerId) {
        if let Some(peer) = self.peers.get_mut(peer_id) {
            peer.connected = true;
        }
    }

    /// Per-peer state, if the peer is known
    pub fn peer(&self, peer_id: &PeerId) -> Option<&PeerLockstepState> {
        self.peers.get(peer_id)
    }

    /// Mutable per-peer state, if the peer is known
    pub fn peer_mut(&mut self, peer_id: &PeerId) -> Option<&mut PeerLockstepState> {
        self.peers.get_mut(peer_id)
    }

    /// Coarse synchronization state for a peer
    pub fn peer_sync_state(&self, peer_id: &PeerId) -> Option<PeerSyncState> {
        let peer = self.peers.get(peer_id)?;
        Some(if !peer.connected {
            PeerSyncState::Disconnected
        } else if peer.desynced {
            PeerSyncState::Desynced
        } else if peer.last_confirmed_tick > 0 {
            PeerSyncState::Synced
        } else {
            PeerSyncState::Unconfirmed
        })
    }

    /// All known peer ids
    pub fn peer_ids(&self) -> impl Iterator<Item = &PeerId> {
        self.peers.keys()
    }

    /// Fold a latency sample into a peer's estimate
    pub fn record_peer_latency(&mut self, peer_id: &PeerId, sample_ms: u64) {
        if let Some(peer) = self.peers.get_mut(peer_id) {
            peer.record_latency(sample_ms);
        }
    }

    /// The local peer's own buffered commands
    pub fn local_buffer(&self) -> &InputBuffer {
        &self.local_buffer
    }

    /// Stored comparison for an exchange tick, if retained
    pub fn pending_comparison(&self, tick: Tick) -> Option<&PendingHashComparison> {
        self.pending_hashes.get(&tick)
    }

    /// Summary statistics
    pub fn stats(&self) -> LockstepStats {
        LockstepStats {
            current_tick: self.current_tick,
            peer_count: self.peers.len(),
            connected_peers: self.peers.values().filter(|p| p.connected).count(),
            desynced_peers: self.peers.values().filter(|p| p.desynced).count(),
            desync_count: self.desync_count,
            pending_comparisons: self.pending_hashes.len(),
            buffered_local_commands: self.local_buffer.stats().total_commands,
        }
    }
}

impl fmt::Debug for LockstepManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockstepManager")
            .field("current_tick", &self.current_tick)
            .field("session_seed", &self.session_seed)
            .field("local_peer_id", &self.local_peer_id)
            .field("peers", &self.peers.len())
            .field("desync_count", &self.desync_count)
            .field("initialized", &self.initialized)
            .finish()
    }
}
