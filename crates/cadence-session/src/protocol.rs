//! SessionProtocol - the message layer between manager and transport
//!
//! Turns manager events into wire messages and routes received wire
//! messages back into the manager. The transport itself is injected via
//! the [`Broadcast`] trait; the game simulation via [`Simulation`]. This
//! module is the only place wire payload shapes are defined, so they stay
//! a stable contract.
//!
//! # Roles
//!
//! Exactly one peer is the host. The host picks the session seed, emits
//! the init message, and is the only peer that answers divergence with a
//! resync snapshot. Everything else is symmetric.

use crate::{DesyncReport, Error, LockstepConfig, LockstepManager, Result};
use cadence_core::{
    compute_state_hash, CommandKind, IndexMap, InputCommand, InputId, PeerId, StateHash, Tick,
    ValueMap, WorldView,
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// A message exchanged between peers
///
/// Payload shapes are stable contracts; extend, never reshape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WireMessage {
    /// Host → all: arm the session with shared constants
    Init {
        session_seed: u64,
        tick_rate: u32,
        input_delay: u64,
        hash_interval: u64,
    },
    /// Any → all: one scheduled input command
    Input(InputCommand),
    /// Host → sender, optional: input received
    InputAck {
        tick: Tick,
        input_id: InputId,
        peer_id: PeerId,
    },
    /// Any → all: state digest for an exchange tick
    Hash { tick: Tick, hash: StateHash },
    /// Informational broadcast on detected divergence
    HashMismatch {
        tick: Tick,
        local_hash: StateHash,
        peer_id: PeerId,
        peer_hash: StateHash,
    },
    /// Host → all: full external snapshot for recovery
    Resync {
        tick: Tick,
        snapshot: Vec<u8>,
        desync_tick: Tick,
    },
}

impl WireMessage {
    /// Encode for a byte-oriented transport
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode from a byte-oriented transport
    pub fn decode(data: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(data)?)
    }
}

/// Transport seam: deliver a message to every other peer
///
/// Implementations own reliability and addressing; this core assumes
/// neither. Implement over UDP, WebSocket, an in-memory queue, whatever
/// the application uses.
pub trait Broadcast {
    /// Send `message` to all other peers
    fn broadcast(&mut self, message: &WireMessage) -> Result<()>;
}

/// Simulation seam: the external game this core keeps in lockstep
///
/// The core never mutates game state directly; it hands commands and
/// fixed timesteps across this trait and reads back a hashable view.
pub trait Simulation {
    /// Apply one input command to the game state
    fn apply_command(&mut self, command: &InputCommand);

    /// Advance the game state by one fixed tick
    fn advance(&mut self, fixed_delta_ms: u64);

    /// Quantized projection of the mutable state, for hashing
    fn world_view(&self) -> WorldView;

    /// Serialize the full game state (resync only)
    fn create_snapshot(&self) -> Vec<u8>;

    /// Replace the full game state (resync only)
    fn apply_snapshot(&mut self, data: &[u8]) -> Result<()>;
}

/// The thin message-level layer wiring manager, simulation, and transport
pub struct SessionProtocol {
    manager: LockstepManager,
    local_peer_id: PeerId,
    is_host: bool,
    send_acks: bool,
    /// Expected session members, including the local peer
    roster: Vec<PeerId>,
    /// Send times of our own commands, for ack-based latency samples
    outstanding: IndexMap<InputId, u64>,
    initialized: bool,
}

impl SessionProtocol {
    /// Create a protocol endpoint for one peer
    pub fn new(config: LockstepConfig, local_peer_id: PeerId, is_host: bool) -> Self {
        Self {
            manager: LockstepManager::new(config),
            local_peer_id,
            is_host,
            send_acks: false,
            roster: Vec::new(),
            outstanding: IndexMap::new(),
            initialized: false,
        }
    }

    /// Enable host input acknowledgements (off by default)
    pub fn with_input_acks(mut self, enabled: bool) -> Self {
        self.send_acks = enabled;
        self
    }

    /// Whether this peer is the session host
    pub fn is_host(&self) -> bool {
        self.is_host
    }

    /// The underlying scheduler
    pub fn manager(&self) -> &LockstepManager {
        &self.manager
    }

    /// Mutable access to the underlying scheduler
    pub fn manager_mut(&mut self) -> &mut LockstepManager {
        &mut self.manager
    }

    /// Declare the session membership, local peer included
    ///
    /// The host needs this before `initialize_session`; non-host peers
    /// before the init message arrives.
    pub fn set_roster(&mut self, peers: &[PeerId]) {
        self.roster = peers.to_vec();
    }

    /// Host only: pick a fresh seed, arm local state, announce the session
    ///
    /// The seed comes from an ambient non-deterministic source; it is the
    /// last non-deterministic draw of the session.
    pub fn initialize_session(&mut self, tx: &mut impl Broadcast) -> Result<u64> {
        if !self.is_host {
            return Err(Error::NotHost);
        }
        let mut seed: u32 = rand::random();
        if seed == 0 {
            seed = 1;
        }
        let seed = seed as u64;
        let roster = self.roster.clone();
        self.manager
            .initialize(seed, self.local_peer_id.clone(), &roster);
        self.initialized = true;

        let config = self.manager.config();
        tx.broadcast(&WireMessage::Init {
            session_seed: seed,
            tick_rate: config.tick_rate_hz(),
            input_delay: config.input_delay_ticks,
            hash_interval: config.hash_interval_ticks,
        })?;
        info!("session initialized as host, seed {}", seed);
        Ok(seed)
    }

    /// Schedule a local action and broadcast it
    ///
    /// The command executes at `current_tick + input_delay_ticks` on every
    /// peer. Returns None when the manager rejected it as a duplicate (in
    /// which case nothing is sent).
    pub fn queue_local_input(
        &mut self,
        kind: CommandKind,
        payload: ValueMap,
        now_ms: u64,
        tx: &mut impl Broadcast,
    ) -> Result<Option<InputCommand>> {
        if !self.initialized {
            return Err(Error::NotInitialized);
        }
        let Some(command) = self.manager.queue_local_input(kind, payload, now_ms) else {
            return Ok(None);
        };
        self.outstanding.insert(command.id.clone(), now_ms);
        tx.broadcast(&WireMessage::Input(command.clone()))?;
        Ok(Some(command))
    }

    /// The single per-tick entry point for the embedding game loop
    ///
    /// Advances the scheduler, applies each processed tick's inputs to the
    /// simulation, advances the simulation by the fixed timestep, and
    /// exchanges a state hash at the configured interval. Returns the
    /// number of ticks processed.
    pub fn process_lockstep_tick(
        &mut self,
        now_ms: u64,
        sim: &mut impl Simulation,
        tx: &mut impl Broadcast,
    ) -> Result<u32> {
        if !self.initialized {
            // Waiting for the host's init message is not an error
            return Ok(0);
        }
        let batches = self.manager.update(now_ms);
        let processed = batches.len() as u32;
        let tick_interval_ms = self.manager.config().tick_interval_ms;

        for batch in batches {
            for command in &batch.inputs {
                sim.apply_command(command);
            }
            sim.advance(tick_interval_ms);

            if self.manager.hash_due(batch.tick) {
                let hash = compute_state_hash(&sim.world_view(), batch.tick);
                let reports = self.manager.record_local_hash(batch.tick, hash);
                tx.broadcast(&WireMessage::Hash {
                    tick: batch.tick,
                    hash,
                })?;
                self.react_to_desyncs(&reports, sim, tx)?;
            }
        }
        Ok(processed)
    }

    /// Route one received wire message
    ///
    /// Malformed or out-of-place traffic is logged and dropped; nothing
    /// here is fatal to the session.
    pub fn handle_message(
        &mut self,
        from: &PeerId,
        message: WireMessage,
        now_ms: u64,
        sim: &mut impl Simulation,
        tx: &mut impl Broadcast,
    ) -> Result<()> {
        match message {
            WireMessage::Init {
                session_seed,
                tick_rate,
                input_delay,
                hash_interval,
            } => self.handle_init(from, session_seed, tick_rate, input_delay, hash_interval),
            WireMessage::Input(command) => self.handle_input(from, command, now_ms, tx),
            WireMessage::InputAck {
                input_id, peer_id, ..
            } => {
                if peer_id == self.local_peer_id {
                    if let Some(sent_ms) = self.outstanding.shift_remove(&input_id) {
                        self.manager
                            .record_peer_latency(from, now_ms.saturating_sub(sent_ms));
                    }
                }
                Ok(())
            }
            WireMessage::Hash { tick, hash } => {
                if let Some(report) = self.manager.receive_remote_hash(from, tick, hash) {
                    self.react_to_desyncs(&[report], sim, tx)?;
                }
                Ok(())
            }
            WireMessage::HashMismatch {
                tick,
                peer_id,
                local_hash,
                peer_hash,
            } => {
                // Informational only; the host acts via Resync
                warn!(
                    "{} reports mismatch with {} at tick {}: {} vs {}",
                    from, peer_id, tick, local_hash, peer_hash
                );
                Ok(())
            }
            WireMessage::Resync {
                tick,
                snapshot,
                desync_tick,
            } => self.handle_resync(from, tick, &snapshot, desync_tick, sim),
        }
    }

    fn handle_init(
        &mut self,
        from: &PeerId,
        session_seed: u64,
        tick_rate: u32,
        input_delay: u64,
        hash_interval: u64,
    ) -> Result<()> {
        if self.is_host {
            warn!("host ignoring init message from {}", from);
            return Ok(());
        }
        if !self.roster.contains(from) {
            self.roster.push(from.clone());
        }
        let config = self
            .manager
            .config()
            .clone()
            .with_tick_rate_hz(tick_rate)
            .with_input_delay(input_delay)
            .with_hash_interval(hash_interval);
        self.manager.reconfigure(config);
        let roster = self.roster.clone();
        self.manager
            .initialize(session_seed, self.local_peer_id.clone(), &roster);
        self.outstanding.clear();
        self.initialized = true;
        info!("session initialized from host {}, seed {}", from, session_seed);
        Ok(())
    }

    fn handle_input(
        &mut self,
        from: &PeerId,
        command: InputCommand,
        now_ms: u64,
        tx: &mut impl Broadcast,
    ) -> Result<()> {
        if command.peer_id != *from {
            warn!(
                "dropping input claiming to be from {} but sent by {}",
                command.peer_id, from
            );
            return Ok(());
        }
        let ack = WireMessage::InputAck {
            tick: command.tick,
            input_id: command.id.clone(),
            peer_id: command.peer_id.clone(),
        };
        if self.manager.receive_remote_input(command, now_ms) {
            if self.is_host && self.send_acks {
                tx.broadcast(&ack)?;
            }
        } else {
            debug!("remote input from {} not stored", from);
        }
        Ok(())
    }

    /// Broadcast mismatch reports; the host additionally pushes a full
    /// snapshot so desynced peers can realign
    fn react_to_desyncs(
        &mut self,
        reports: &[DesyncReport],
        sim: &mut impl Simulation,
        tx: &mut impl Broadcast,
    ) -> Result<()> {
        for report in reports {
            tx.broadcast(&WireMessage::HashMismatch {
                tick: report.tick,
                local_hash: report.local_hash,
                peer_id: report.peer_id.clone(),
                peer_hash: report.peer_hash,
            })?;
        }
        if self.is_host && !reports.is_empty() {
            let tick = self.manager.current_tick();
            tx.broadcast(&WireMessage::Resync {
                tick,
                snapshot: sim.create_snapshot(),
                desync_tick: reports[0].tick,
            })?;
            // The host's own state is the authority; it only clears the
            // bookkeeping it just resolved
            self.manager.resync_to(tick);
        }
        Ok(())
    }

    fn handle_resync(
        &mut self,
        from: &PeerId,
        tick: Tick,
        snapshot: &[u8],
        desync_tick: Tick,
        sim: &mut impl Simulation,
    ) -> Result<()> {
        if self.is_host {
            warn!("host ignoring resync from {}", from);
            return Ok(());
        }
        info!(
            "applying resync from {}: snapshot tick {}, desync detected at {}",
            from, tick, desync_tick
        );
        sim.apply_snapshot(snapshot)?;
        self.manager.resync_to(tick);
        self.outstanding.clear();
        Ok(())
    }
}
