//! Deterministic random number generator with per-tick reseeding
//!
//! Uses a simple xorshift64 core for reproducibility across platforms: the
//! same seed produces the same sequence on every peer. The generator can be
//! disabled outside a session, in which case draws fall through to an
//! ambient non-deterministic source and the call counter does not move.
//!
//! # Per-tick reseeding
//!
//! [`SessionRng::sync_for_tick`] does not continue the existing stream; it
//! derives a fresh stream from `session_seed + tick` and zeroes the call
//! counter. If a latent non-determinism bug makes two peers consume a
//! different number of draws in one tick, the divergence dies with that
//! tick instead of poisoning every tick after it.

use crate::Tick;
use serde::{Deserialize, Serialize};

/// A seed accepted by [`SessionRng`]
///
/// Integer seeds are used as-is after normalization (zero becomes 1,
/// negatives take their absolute value). String seeds are hashed to a
/// 32-bit integer with a stable, order-sensitive FNV-1a so `"alpha"` and
/// `"ahpla"` seed different streams on every platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Seed {
    /// Numeric seed
    Int(i64),
    /// String seed, hashed to an integer
    Str(String),
}

impl Seed {
    /// Reduce the seed to a non-zero u64
    pub fn normalize(&self) -> u64 {
        let raw = match self {
            Seed::Int(i) => i.unsigned_abs(),
            Seed::Str(s) => fnv1a_str(s) as u64,
        };
        if raw == 0 {
            1
        } else {
            raw
        }
    }
}

impl From<i64> for Seed {
    fn from(i: i64) -> Self {
        Seed::Int(i)
    }
}

impl From<u32> for Seed {
    fn from(i: u32) -> Self {
        Seed::Int(i as i64)
    }
}

impl From<&str> for Seed {
    fn from(s: &str) -> Self {
        Seed::Str(s.to_string())
    }
}

impl From<String> for Seed {
    fn from(s: String) -> Self {
        Seed::Str(s)
    }
}

/// Stable 32-bit FNV-1a over the string's bytes
fn fnv1a_str(s: &str) -> u32 {
    let mut h: u32 = 0x811c9dc5;
    for b in s.as_bytes() {
        h ^= *b as u32;
        h = h.wrapping_mul(0x0100_0193);
    }
    h
}

/// splitmix64-style mixer, used to spread small seeds (tick numbers, seed
/// plus tick sums) across the full 64-bit state space
fn mix(seed: u64) -> u64 {
    let mut z = seed.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Captured generator position
///
/// Restoring replays the stream forward by `call_count` draws, which is
/// O(call_count). Acceptable because the counter is zeroed by the per-tick
/// reseed, so it never exceeds one tick's worth of draws.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RngState {
    /// Effective (normalized) seed of the current stream
    pub seed: u64,
    /// Draws consumed from the current stream
    pub call_count: u64,
    /// Whether the deterministic stream is active
    pub enabled: bool,
}

/// Seedable random source shared by all deterministic simulation code
///
/// Never reach for `rand::random` in simulation logic; route every draw
/// through the session's generator so peers stay aligned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRng {
    /// Effective seed of the current stream
    seed: u64,
    /// xorshift64 state
    state: u64,
    /// Draws consumed since the last (re)seed
    call_count: u64,
    /// When false, draws fall through to an ambient source
    enabled: bool,
}

impl SessionRng {
    /// Create a generator from any accepted seed form
    pub fn new(seed: impl Into<Seed>) -> Self {
        let mut rng = Self {
            seed: 1,
            state: mix(1),
            call_count: 0,
            enabled: true,
        };
        rng.set_seed(seed);
        rng
    }

    /// Reseed the generator and zero the call counter
    pub fn set_seed(&mut self, seed: impl Into<Seed>) {
        self.seed = seed.into().normalize();
        self.state = Self::non_zero(mix(self.seed));
        self.call_count = 0;
    }

    /// Derive a fresh stream for one tick of the session
    ///
    /// The stream depends only on `(session_seed, tick)`, never on how many
    /// draws earlier ticks consumed.
    pub fn sync_for_tick(&mut self, session_seed: u64, tick: Tick) {
        let derived = session_seed.wrapping_add(tick);
        self.seed = if derived == 0 { 1 } else { derived };
        self.state = Self::non_zero(mix(self.seed));
        self.call_count = 0;
    }

    /// Switch to the deterministic stream
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Switch to the ambient non-deterministic source
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Whether the deterministic stream is active
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Effective seed of the current stream
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Draws consumed since the last (re)seed
    pub fn call_count(&self) -> u64 {
        self.call_count
    }

    // xorshift64 requires a non-zero state
    fn non_zero(state: u64) -> u64 {
        if state == 0 {
            0x9e37_79b9_7f4a_7c15
        } else {
            state
        }
    }

    /// Next raw value from the deterministic stream, counting the draw
    fn draw(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        self.call_count += 1;
        x
    }

    /// Random f64 in [0, 1)
    ///
    /// When disabled this delegates to the ambient source and the call
    /// counter does not advance.
    pub fn random(&mut self) -> f64 {
        if !self.enabled {
            return rand::random::<f64>();
        }
        (self.draw() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Random integer in [min, max] inclusive
    ///
    /// Returns `min` when the range is empty or inverted. The span is
    /// computed in u64 so extreme ranges (up to the full i64 domain)
    /// cannot overflow.
    pub fn random_int(&mut self, min: i64, max: i64) -> i64 {
        if max <= min {
            return min;
        }
        let span = max.wrapping_sub(min) as u64;
        let offset = (self.random() * (span as f64 + 1.0)) as u64;
        min.wrapping_add(offset.min(span) as i64)
    }

    /// Random f64 in [min, max)
    pub fn random_float(&mut self, min: f64, max: f64) -> f64 {
        min + self.random() * (max - min)
    }

    /// Random bool with the given probability of true
    pub fn random_bool(&mut self, probability: f64) -> bool {
        self.random() < probability
    }

    /// Pick a random element from a slice
    pub fn random_element<'a, T>(&mut self, slice: &'a [T]) -> Option<&'a T> {
        if slice.is_empty() {
            None
        } else {
            let i = self.random_int(0, slice.len() as i64 - 1) as usize;
            Some(&slice[i])
        }
    }

    /// Shuffle a slice in place (Fisher-Yates)
    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        for i in (1..slice.len()).rev() {
            let j = self.random_int(0, i as i64) as usize;
            slice.swap(i, j);
        }
    }

    /// Capture the current position
    pub fn state(&self) -> RngState {
        RngState {
            seed: self.seed,
            call_count: self.call_count,
            enabled: self.enabled,
        }
    }

    /// Restore a captured position by replaying the stream forward
    pub fn restore(&mut self, state: &RngState) {
        self.seed = if state.seed == 0 { 1 } else { state.seed };
        self.enabled = state.enabled;
        self.state = Self::non_zero(mix(self.seed));
        self.call_count = 0;
        for _ in 0..state.call_count {
            self.draw();
        }
    }
}

impl Default for SessionRng {
    fn default() -> Self {
        Self::new(12345i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_determinism() {
        let mut a = SessionRng::new(42i64);
        let mut b = SessionRng::new(42i64);
        for _ in 0..20 {
            assert_eq!(a.random().to_bits(), b.random().to_bits());
        }
    }

    #[test]
    fn test_string_seed_stable() {
        let mut a = SessionRng::new("match-seed");
        let mut b = SessionRng::new("match-seed");
        assert_eq!(a.random().to_bits(), b.random().to_bits());

        let mut c = SessionRng::new("other-seed");
        assert_ne!(
            SessionRng::new("match-seed").random().to_bits(),
            c.random().to_bits()
        );
    }

    #[test]
    fn test_string_seed_order_sensitive() {
        assert_ne!(fnv1a_str("alpha"), fnv1a_str("ahpla"));
    }

    #[test]
    fn test_seed_normalization() {
        assert_eq!(Seed::Int(0).normalize(), 1);
        assert_eq!(Seed::Int(-7).normalize(), 7);
        assert_eq!(Seed::Int(7).normalize(), 7);

        // Zero and negative-of-same collapse to the same stream
        let mut a = SessionRng::new(-42i64);
        let mut b = SessionRng::new(42i64);
        assert_eq!(a.random().to_bits(), b.random().to_bits());
    }

    #[test]
    fn test_sync_for_tick_isolation() {
        let mut rng = SessionRng::new(1000i64);
        rng.sync_for_tick(1000, 5);
        let first = rng.random();
        rng.random();
        rng.random();

        // Resyncing to the same tick restarts the same stream
        rng.sync_for_tick(1000, 5);
        assert_eq!(rng.random().to_bits(), first.to_bits());
        assert_eq!(rng.call_count(), 1);

        // A different tick yields a different stream
        rng.sync_for_tick(1000, 6);
        assert_ne!(rng.random().to_bits(), first.to_bits());
    }

    #[test]
    fn test_disabled_does_not_advance_counter() {
        let mut rng = SessionRng::new(42i64);
        rng.random();
        assert_eq!(rng.call_count(), 1);

        rng.disable();
        let v = rng.random();
        assert!((0.0..1.0).contains(&v));
        assert_eq!(rng.call_count(), 1);

        rng.enable();
        rng.random();
        assert_eq!(rng.call_count(), 2);
    }

    #[test]
    fn test_state_capture_restore() {
        let mut rng = SessionRng::new(42i64);
        for _ in 0..7 {
            rng.random();
        }
        let saved = rng.state();
        let expected: Vec<u64> = (0..5).map(|_| rng.random().to_bits()).collect();

        let mut other = SessionRng::new(1i64);
        other.restore(&saved);
        let replayed: Vec<u64> = (0..5).map(|_| other.random().to_bits()).collect();
        assert_eq!(expected, replayed);
    }

    #[test]
    fn test_random_int_bounds() {
        let mut rng = SessionRng::new(42i64);
        for _ in 0..200 {
            let v = rng.random_int(10, 20);
            assert!((10..=20).contains(&v));
        }
        assert_eq!(rng.random_int(5, 5), 5);
        assert_eq!(rng.random_int(5, 3), 5);
    }

    #[test]
    fn test_random_int_extreme_spans() {
        let mut rng = SessionRng::new(42i64);
        // The full i64 domain must not overflow the span arithmetic
        for _ in 0..100 {
            rng.random_int(i64::MIN, i64::MAX);
        }
        for _ in 0..100 {
            let v = rng.random_int(i64::MAX - 3, i64::MAX);
            assert!(v >= i64::MAX - 3);
        }
        for _ in 0..100 {
            let v = rng.random_int(i64::MIN, i64::MIN + 3);
            assert!(v <= i64::MIN + 3);
        }
    }

    #[test]
    fn test_shuffle_preserves_elements() {
        let mut rng = SessionRng::new(42i64);
        let original = vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        let mut shuffled = original.clone();
        rng.shuffle(&mut shuffled);

        let mut sorted = shuffled.clone();
        sorted.sort();
        assert_eq!(sorted, original);
        assert_ne!(shuffled, original);
    }

    #[test]
    fn test_random_element() {
        let mut rng = SessionRng::new(42i64);
        let empty: [i32; 0] = [];
        assert!(rng.random_element(&empty).is_none());

        let items = [10, 20, 30];
        let picked = *rng.random_element(&items).unwrap();
        assert!(items.contains(&picked));
    }
}
