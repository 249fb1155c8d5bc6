//! Cadence Session - Lockstep coordination between peers
//!
//! This crate keeps multiple independent simulations bit-identical over an
//! unreliable transport:
//!
//! - **LockstepManager**: the fixed-tick scheduler; owns per-peer state,
//!   input buffers, the advance guard, hash-exchange bookkeeping, and the
//!   RNG snapshot ring.
//! - **SessionProtocol**: the message layer; turns manager events into wire
//!   messages (init, input, hash, resync) and routes inbound messages back
//!   into the manager.
//! - **Broadcast / Simulation**: the two seams to the outside world. The
//!   transport and the game simulation are injected, never owned.
//!
//! # Architecture
//!
//! ```text
//! transport ──▶ SessionProtocol ──▶ LockstepManager ──▶ InputBuffer
//!                     ▲                    │
//!                     │                    ▼ update(now)
//!                 Broadcast ◀── hashes ── Simulation (injected)
//! ```
//!
//! Everything is single-threaded and cooperative: `update()` is called once
//! per rendered frame and processes zero or more simulation ticks, bounded
//! by a per-frame cap. "Waiting for a peer" is just `update()` advancing
//! fewer ticks; nothing blocks.

mod config;
mod error;
mod manager;
mod peer;
mod protocol;
mod snapshot;

pub use config::LockstepConfig;
pub use error::{Error, Result};
pub use manager::{
    DesyncReport, LockstepManager, LockstepStats, PeerSyncState, PendingHashComparison, TickInputs,
};
pub use peer::PeerLockstepState;
pub use protocol::{Broadcast, SessionProtocol, Simulation, WireMessage};
pub use snapshot::{RngSnapshot, SnapshotRing};

// Re-export the core types that appear in this crate's public API
pub use cadence_core::{
    compute_quick_hash, compute_state_hash, CommandKind, InputBuffer, InputCommand, InputId,
    PeerId, SessionRng, StateHash, Tick, Value, ValueMap, WorldView,
};
