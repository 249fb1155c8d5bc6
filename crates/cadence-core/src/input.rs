//! Input commands and the tick-indexed input buffer
//!
//! Every player action becomes an [`InputCommand`] scheduled for a future
//! tick. Each peer keeps one [`InputBuffer`] for its own commands plus one
//! per remote peer; the buffers de-duplicate on content so a retransmitted
//! command never executes twice.

use crate::{InputId, PeerId, Tick, ValueMap};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// The action a command asks the simulation to perform
///
/// The synchronization core never interprets these; they are dispatched to
/// injected per-kind handlers by the embedding game.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    /// Move selected units
    Move,
    /// Attack a target
    Attack,
    /// Place a building
    Build,
    /// Queue unit production
    Produce,
    /// Sell a building
    Sell,
    /// Pause the simulation
    Pause,
    /// Resume the simulation
    Resume,
    /// Set a rally point
    Rally,
    /// Deploy a mine
    DeployMine,
    /// Sweep for mines
    Sweep,
    /// Application-defined command
    Custom(String),
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Custom(s) => write!(f, "{}", s),
            other => write!(f, "{:?}", other),
        }
    }
}

/// One player action scheduled to execute at a specific tick
///
/// Immutable once created. The same command may exist in the sender's local
/// buffer and, as a broadcast copy, in every other peer's buffer for that
/// sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputCommand {
    /// Tick at which the command executes
    pub tick: Tick,
    /// Peer that issued the command
    pub peer_id: PeerId,
    /// What to do
    pub kind: CommandKind,
    /// Kind-specific parameters
    pub payload: ValueMap,
    /// Wall-clock creation time (latency estimation only, never hashed)
    pub timestamp_ms: u64,
    /// Unique id, `"{peer}:{tick}:{seq}"`
    pub id: InputId,
}

impl InputCommand {
    /// Create a command scheduled for `tick`
    pub fn new(
        tick: Tick,
        peer_id: PeerId,
        kind: CommandKind,
        payload: ValueMap,
        timestamp_ms: u64,
        seq: u32,
    ) -> Self {
        let id = InputId::new(&peer_id, tick, seq);
        Self {
            tick,
            peer_id,
            kind,
            payload,
            timestamp_ms,
            id,
        }
    }

    /// Content equality: same issuer, same action, same parameters
    ///
    /// Deliberately ignores `timestamp_ms` and `id` so a retransmitted copy
    /// of a command matches the original.
    pub fn same_content(&self, other: &InputCommand) -> bool {
        self.peer_id == other.peer_id && self.kind == other.kind && self.payload == other.payload
    }
}

/// Buffer statistics for debugging and introspection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferStats {
    /// Number of distinct ticks holding at least one command
    pub buffered_ticks: usize,
    /// Total stored commands across all ticks
    pub total_commands: usize,
    /// Smallest and largest buffered tick, if any
    pub tick_range: Option<(Tick, Tick)>,
}

/// Tick-indexed, de-duplicating store of input commands
///
/// `clear_before` establishes a floor below which commands are rejected,
/// so a late retransmission of an already-executed tick cannot resurrect
/// stale state.
#[derive(Debug, Clone, Default)]
pub struct InputBuffer {
    /// Commands keyed by execution tick
    ticks: BTreeMap<Tick, Vec<InputCommand>>,
    /// Ticks whose full input set is known to have arrived
    confirmed: BTreeSet<Tick>,
    /// Everything strictly below this tick has been evicted
    floor: Tick,
}

impl InputBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a command for its tick
    ///
    /// Returns false without storing when the tick is below the eviction
    /// floor or an equal `(peer, kind, payload)` command already exists for
    /// that tick.
    pub fn add(&mut self, command: InputCommand) -> bool {
        if command.tick < self.floor {
            return false;
        }
        let slot = self.ticks.entry(command.tick).or_default();
        if slot.iter().any(|c| c.same_content(&command)) {
            return false;
        }
        slot.push(command);
        true
    }

    /// All commands stored for a tick (empty if none)
    pub fn inputs_for_tick(&self, tick: Tick) -> &[InputCommand] {
        self.ticks.get(&tick).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether any command is stored for a tick
    pub fn has_inputs_for_tick(&self, tick: Tick) -> bool {
        self.ticks.get(&tick).is_some_and(|v| !v.is_empty())
    }

    /// Mark a tick's input set complete
    ///
    /// Confirmation is driven externally, by whoever knows the expected
    /// peer roster.
    pub fn confirm_tick(&mut self, tick: Tick) {
        if tick >= self.floor {
            self.confirmed.insert(tick);
        }
    }

    /// Whether a tick's input set has been marked complete
    pub fn is_tick_confirmed(&self, tick: Tick) -> bool {
        self.confirmed.contains(&tick)
    }

    /// Evict all ticks strictly below `tick` and their confirmations
    pub fn clear_before(&mut self, tick: Tick) {
        self.ticks = self.ticks.split_off(&tick);
        self.confirmed = self.confirmed.split_off(&tick);
        self.floor = self.floor.max(tick);
    }

    /// Drop everything, including the floor
    pub fn clear(&mut self) {
        self.ticks.clear();
        self.confirmed.clear();
        self.floor = 0;
    }

    /// Current eviction floor
    pub fn floor(&self) -> Tick {
        self.floor
    }

    /// Buffered-tick count, command count, and tick range
    pub fn stats(&self) -> BufferStats {
        let first = self.ticks.keys().next().copied();
        let last = self.ticks.keys().next_back().copied();
        BufferStats {
            buffered_ticks: self.ticks.len(),
            total_commands: self.ticks.values().map(Vec::len).sum(),
            tick_range: first.zip(last),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;

    fn make_command(tick: Tick, peer: &str, kind: CommandKind, x: i64) -> InputCommand {
        let mut payload = ValueMap::new();
        payload.insert("x".to_string(), Value::Int(x));
        InputCommand::new(tick, PeerId::new(peer), kind, payload, 0, 0)
    }

    #[test]
    fn test_add_and_retrieve() {
        let mut buffer = InputBuffer::new();
        assert!(buffer.add(make_command(5, "p1", CommandKind::Move, 10)));

        assert!(buffer.has_inputs_for_tick(5));
        assert!(!buffer.has_inputs_for_tick(4));
        assert_eq!(buffer.inputs_for_tick(5).len(), 1);
        assert!(buffer.inputs_for_tick(4).is_empty());
    }

    #[test]
    fn test_dedup_same_content() {
        let mut buffer = InputBuffer::new();
        assert!(buffer.add(make_command(5, "p1", CommandKind::Move, 10)));
        // Identical (peer, kind, payload) for the same tick: rejected
        assert!(!buffer.add(make_command(5, "p1", CommandKind::Move, 10)));
        assert_eq!(buffer.inputs_for_tick(5).len(), 1);
    }

    #[test]
    fn test_dedup_allows_different_payload_or_peer() {
        let mut buffer = InputBuffer::new();
        assert!(buffer.add(make_command(5, "p1", CommandKind::Move, 10)));
        assert!(buffer.add(make_command(5, "p1", CommandKind::Move, 11)));
        assert!(buffer.add(make_command(5, "p2", CommandKind::Move, 10)));
        assert_eq!(buffer.inputs_for_tick(5).len(), 3);
    }

    #[test]
    fn test_dedup_is_per_tick() {
        let mut buffer = InputBuffer::new();
        assert!(buffer.add(make_command(5, "p1", CommandKind::Move, 10)));
        // Same content, different tick: stored
        assert!(buffer.add(make_command(6, "p1", CommandKind::Move, 10)));
    }

    #[test]
    fn test_confirmation() {
        let mut buffer = InputBuffer::new();
        buffer.add(make_command(5, "p1", CommandKind::Move, 10));
        assert!(!buffer.is_tick_confirmed(5));

        buffer.confirm_tick(5);
        assert!(buffer.is_tick_confirmed(5));
    }

    #[test]
    fn test_clear_before() {
        let mut buffer = InputBuffer::new();
        for tick in 0..10 {
            buffer.add(make_command(tick, "p1", CommandKind::Move, tick as i64));
            buffer.confirm_tick(tick);
        }

        buffer.clear_before(5);

        for tick in 0..5 {
            assert!(!buffer.has_inputs_for_tick(tick));
            assert!(!buffer.is_tick_confirmed(tick));
        }
        for tick in 5..10 {
            assert!(buffer.has_inputs_for_tick(tick));
            assert!(buffer.is_tick_confirmed(tick));
        }
        assert_eq!(buffer.floor(), 5);

        // Late retransmission below the floor is rejected
        assert!(!buffer.add(make_command(3, "p1", CommandKind::Move, 3)));
    }

    #[test]
    fn test_stats() {
        let mut buffer = InputBuffer::new();
        assert_eq!(buffer.stats().tick_range, None);

        buffer.add(make_command(3, "p1", CommandKind::Move, 1));
        buffer.add(make_command(3, "p2", CommandKind::Attack, 2));
        buffer.add(make_command(8, "p1", CommandKind::Build, 3));

        let stats = buffer.stats();
        assert_eq!(stats.buffered_ticks, 2);
        assert_eq!(stats.total_commands, 3);
        assert_eq!(stats.tick_range, Some((3, 8)));
    }
}
