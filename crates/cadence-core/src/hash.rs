//! Order-independent state hashing for divergence detection
//!
//! Peers exchange a 32-bit digest of their mutable simulation state every
//! few ticks; a mismatch means the simulations have diverged. For the
//! digest to be meaningful it must be reproducible bit-for-bit on every
//! peer even when in-memory iteration order differs, so:
//!
//! - Each entity is hashed independently into a 32-bit FNV-1a digest over
//!   its identity, kind, owner, and quantized fields.
//! - A collection's digests combine via XOR plus the collection length,
//!   never sequentially, so iteration order cannot leak into the result.
//! - Floats are quantized before hashing: positions to 1/100 of a unit,
//!   angles to 1/1000 of a radian. Sub-quantum platform drift hashes the
//!   same; real divergence does not.
//! - The tick number folds in first, so identical state at different ticks
//!   hashes differently.
//!
//! [`hash_ordered`] exists for the callers that explicitly want
//! order-sensitive combination (e.g. verifying a path list), and
//! [`compute_quick_hash`] is a cheap counts-and-totals variant for
//! high-frequency sanity checks.

use crate::{Error, PeerId, Result, Tick};
use serde::{Deserialize, Serialize};
use std::fmt;

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Position quantum: 1/100 of a world unit
const POS_SCALE: f64 = 100.0;
/// Angle quantum: 1/1000 of a radian
const ANGLE_SCALE: f64 = 1000.0;

// Per-kind discriminators so an empty unit list and an empty mine list
// cannot cancel each other out
const TAG_UNIT: u32 = 1;
const TAG_BUILDING: u32 = 2;
const TAG_PROJECTILE: u32 = 3;
const TAG_MINE: u32 = 4;
const TAG_RESOURCES: u32 = 5;

/// A 32-bit state digest, rendered as 8 hex digits on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateHash(pub u32);

// The wire format is the 8-hex-digit string, not the raw integer
impl Serialize for StateHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for StateHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        StateHash::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl StateHash {
    /// Render as an 8-hex-digit string (the wire format)
    pub fn to_hex(self) -> String {
        format!("{:08x}", self.0)
    }

    /// Parse the 8-hex-digit wire form
    pub fn from_hex(s: &str) -> Result<Self> {
        if s.len() != 8 {
            return Err(Error::InvalidHash(s.to_string()));
        }
        u32::from_str_radix(s, 16)
            .map(StateHash)
            .map_err(|_| Error::InvalidHash(s.to_string()))
    }
}

impl fmt::Display for StateHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Incremental FNV-1a digest builder with quantizing writers
#[derive(Debug, Clone)]
pub struct Digest {
    state: u32,
}

impl Digest {
    /// Start a fresh digest
    pub fn new() -> Self {
        Self { state: FNV_OFFSET }
    }

    /// Fold in raw bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        for b in bytes {
            self.state ^= *b as u32;
            self.state = self.state.wrapping_mul(FNV_PRIME);
        }
        self
    }

    /// Fold in a u32 (little-endian bytes)
    pub fn write_u32(&mut self, v: u32) -> &mut Self {
        self.write_bytes(&v.to_le_bytes())
    }

    /// Fold in a u64
    pub fn write_u64(&mut self, v: u64) -> &mut Self {
        self.write_bytes(&v.to_le_bytes())
    }

    /// Fold in an i64
    pub fn write_i64(&mut self, v: i64) -> &mut Self {
        self.write_bytes(&v.to_le_bytes())
    }

    /// Fold in a bool
    pub fn write_bool(&mut self, v: bool) -> &mut Self {
        self.write_bytes(&[v as u8])
    }

    /// Fold in a string (length-prefixed so "ab","c" differs from "a","bc")
    pub fn write_str(&mut self, s: &str) -> &mut Self {
        self.write_u32(s.len() as u32);
        self.write_bytes(s.as_bytes())
    }

    /// Fold in a position coordinate, quantized to 1/100 unit
    pub fn write_pos(&mut self, v: f64) -> &mut Self {
        self.write_i64((v * POS_SCALE).round() as i64)
    }

    /// Fold in an angle, quantized to 1/1000 radian
    pub fn write_angle(&mut self, v: f64) -> &mut Self {
        self.write_i64((v * ANGLE_SCALE).round() as i64)
    }

    /// Fold in a scalar (health, damage, progress) at position precision
    pub fn write_scalar(&mut self, v: f64) -> &mut Self {
        self.write_pos(v)
    }

    /// Finish and return the 32-bit digest
    pub fn finish(&self) -> u32 {
        self.state
    }
}

impl Default for Digest {
    fn default() -> Self {
        Self::new()
    }
}

/// Quantized projection of one unit, supplied by the embedding simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitView {
    pub id: u64,
    pub kind: String,
    pub owner: PeerId,
    pub x: f64,
    pub y: f64,
    pub health: f64,
    pub heading: f64,
    pub speed: f64,
}

impl UnitView {
    /// Per-entity digest over identity, kind, owner, and quantized fields
    pub fn digest(&self) -> u32 {
        let mut d = Digest::new();
        d.write_u32(TAG_UNIT)
            .write_u64(self.id)
            .write_str(&self.kind)
            .write_str(self.owner.as_str())
            .write_pos(self.x)
            .write_pos(self.y)
            .write_scalar(self.health)
            .write_angle(self.heading)
            .write_scalar(self.speed);
        d.finish()
    }
}

/// Quantized projection of one building
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingView {
    pub id: u64,
    pub kind: String,
    pub owner: PeerId,
    pub x: f64,
    pub y: f64,
    pub health: f64,
    /// Production progress in [0, 1]
    pub progress: f64,
}

impl BuildingView {
    pub fn digest(&self) -> u32 {
        let mut d = Digest::new();
        d.write_u32(TAG_BUILDING)
            .write_u64(self.id)
            .write_str(&self.kind)
            .write_str(self.owner.as_str())
            .write_pos(self.x)
            .write_pos(self.y)
            .write_scalar(self.health)
            .write_scalar(self.progress);
        d.finish()
    }
}

/// Quantized projection of one projectile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectileView {
    pub id: u64,
    pub kind: String,
    pub owner: PeerId,
    pub x: f64,
    pub y: f64,
    pub heading: f64,
    pub damage: f64,
}

impl ProjectileView {
    pub fn digest(&self) -> u32 {
        let mut d = Digest::new();
        d.write_u32(TAG_PROJECTILE)
            .write_u64(self.id)
            .write_str(&self.kind)
            .write_str(self.owner.as_str())
            .write_pos(self.x)
            .write_pos(self.y)
            .write_angle(self.heading)
            .write_scalar(self.damage);
        d.finish()
    }
}

/// Quantized projection of one mine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MineView {
    pub id: u64,
    pub owner: PeerId,
    pub x: f64,
    pub y: f64,
    pub armed: bool,
}

impl MineView {
    pub fn digest(&self) -> u32 {
        let mut d = Digest::new();
        d.write_u32(TAG_MINE)
            .write_u64(self.id)
            .write_str(self.owner.as_str())
            .write_pos(self.x)
            .write_pos(self.y)
            .write_bool(self.armed);
        d.finish()
    }
}

/// Snapshot of the hashable world, built fresh by the simulation each time
/// a hash is due
///
/// The collections may be in any order; the hash does not depend on it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldView {
    pub units: Vec<UnitView>,
    pub buildings: Vec<BuildingView>,
    pub projectiles: Vec<ProjectileView>,
    pub mines: Vec<MineView>,
    /// Per-peer resource totals (credits, supply, ...)
    pub resources: Vec<(PeerId, i64)>,
}

/// XOR-combine entity digests plus the collection length
///
/// XOR is commutative, so two peers iterating the same set in different
/// orders produce the same value. The length term distinguishes an empty
/// collection from one whose digests cancel.
fn combine_unordered(digests: impl Iterator<Item = u32>) -> u32 {
    let mut acc: u32 = 0;
    let mut len: u32 = 0;
    for d in digests {
        acc ^= d;
        len += 1;
    }
    let mut d = Digest::new();
    d.write_u32(acc).write_u32(len);
    d.finish()
}

/// Order-sensitive combination for callers that need it
pub fn hash_ordered(digests: &[u32]) -> u32 {
    let mut d = Digest::new();
    for v in digests {
        d.write_u32(*v);
    }
    d.write_u32(digests.len() as u32);
    d.finish()
}

/// Full order-independent digest of the world at a tick
pub fn compute_state_hash(world: &WorldView, tick: Tick) -> StateHash {
    let mut d = Digest::new();
    // Tick first: identical state at different ticks must differ
    d.write_u64(tick);
    d.write_u32(combine_unordered(world.units.iter().map(UnitView::digest)));
    d.write_u32(combine_unordered(
        world.buildings.iter().map(BuildingView::digest),
    ));
    d.write_u32(combine_unordered(
        world.projectiles.iter().map(ProjectileView::digest),
    ));
    d.write_u32(combine_unordered(world.mines.iter().map(MineView::digest)));
    d.write_u32(combine_unordered(world.resources.iter().map(|(peer, amount)| {
        let mut rd = Digest::new();
        rd.write_u32(TAG_RESOURCES)
            .write_str(peer.as_str())
            .write_i64(*amount);
        rd.finish()
    })));
    StateHash(d.finish())
}

/// Cheap sanity-check digest: entity counts and aggregate totals only
///
/// Much cheaper than the full hash; misses per-entity divergence but
/// catches gross drift (entity count or total health/resources off).
pub fn compute_quick_hash(world: &WorldView, tick: Tick) -> StateHash {
    let total_health: i64 = world
        .units
        .iter()
        .map(|u| (u.health * POS_SCALE).round() as i64)
        .chain(
            world
                .buildings
                .iter()
                .map(|b| (b.health * POS_SCALE).round() as i64),
        )
        .sum();
    let total_resources: i64 = world.resources.iter().map(|(_, amount)| *amount).sum();

    let mut d = Digest::new();
    d.write_u64(tick)
        .write_u32(world.units.len() as u32)
        .write_u32(world.buildings.len() as u32)
        .write_u32(world.projectiles.len() as u32)
        .write_u32(world.mines.len() as u32)
        .write_i64(total_health)
        .write_i64(total_resources);
    StateHash(d.finish())
}
