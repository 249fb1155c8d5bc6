//! Cadence Core - Deterministic building blocks for lockstep simulation
//!
//! This crate provides the leaf components every peer in a lockstep session
//! relies on to stay bit-identical:
//! - Seeded, snapshot-friendly random number generation (`SessionRng`)
//! - Tick-indexed, de-duplicating input storage (`InputBuffer`)
//! - Order-independent 32-bit state hashing (`hash` module)
//! - Dynamic value types for generic command payloads (`Value`, `ValueMap`)
//! - Fixed-timestep accumulation (`TickTimer`)
//!
//! Nothing here talks to the network or owns the tick schedule; that is the
//! job of `cadence-session`. Everything in this crate is a pure, explicitly
//! constructed object so two peers running the same inputs compute the same
//! bytes.

mod error;
pub mod hash;
mod identity;
mod input;
mod rng;
mod time;
mod value;

pub use error::{Error, Result};
pub use hash::{
    compute_quick_hash, compute_state_hash, hash_ordered, BuildingView, Digest, MineView,
    ProjectileView, StateHash, UnitView, WorldView,
};
pub use identity::{InputId, PeerId};
pub use input::{BufferStats, CommandKind, InputBuffer, InputCommand};
pub use rng::{RngState, Seed, SessionRng};
pub use time::{Tick, TickTimer};
pub use value::{Value, ValueMap};

// Re-export so downstream crates share one indexmap version
pub use indexmap::IndexMap;
