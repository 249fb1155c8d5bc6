//! Session configuration - tunables that must match on every peer
//!
//! These values are chosen by the host, carried in the init message, and
//! never changed mid-session. Two peers running different values here will
//! desync immediately, which is why the struct travels on the wire instead
//! of living in each peer's local settings.

use serde::{Deserialize, Serialize};

/// Tunable constants for one lockstep session
///
/// # Example
///
/// ```
/// use cadence_session::LockstepConfig;
///
/// let config = LockstepConfig::default();
/// assert_eq!(config.tick_interval_ms, 50);
/// assert_eq!(config.tick_rate_hz(), 20);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockstepConfig {
    /// Milliseconds per simulation tick (50 ms = 20 Hz)
    pub tick_interval_ms: u64,
    /// How many ticks into the future local inputs are scheduled
    pub input_delay_ticks: u64,
    /// State hashes are exchanged every this many ticks
    pub hash_interval_ticks: u64,
    /// Hard cap on ticks processed per `update()` call (bounds catch-up
    /// after a stall)
    pub max_ticks_per_update: u32,
    /// Length of the RNG snapshot ring, in ticks
    pub snapshot_history: usize,
    /// The local tick may not run more than this far past the slowest
    /// connected peer's last confirmed hash tick
    pub max_tick_drift: u64,
    /// A peer that blocks tick advancement for this long is marked
    /// disconnected so the rest of the session can resume
    pub input_wait_timeout_ms: u64,
}

impl LockstepConfig {
    /// Tick rate in Hz implied by the tick interval
    pub fn tick_rate_hz(&self) -> u32 {
        (1000 / self.tick_interval_ms.max(1)) as u32
    }

    /// Build a config from a tick rate in Hz
    pub fn with_tick_rate_hz(mut self, hz: u32) -> Self {
        self.tick_interval_ms = 1000 / hz.max(1) as u64;
        self
    }

    /// Set the input delay
    pub fn with_input_delay(mut self, ticks: u64) -> Self {
        self.input_delay_ticks = ticks;
        self
    }

    /// Set the hash exchange interval
    pub fn with_hash_interval(mut self, ticks: u64) -> Self {
        self.hash_interval_ticks = ticks.max(1);
        self
    }

    /// Clamp every field to a usable value
    ///
    /// Zero intervals and empty histories make no sense at runtime; this
    /// mirrors how deserialized configs from the wire are sanitized.
    pub fn normalized(mut self) -> Self {
        self.tick_interval_ms = self.tick_interval_ms.max(1);
        self.hash_interval_ticks = self.hash_interval_ticks.max(1);
        self.max_ticks_per_update = self.max_ticks_per_update.max(1);
        self.snapshot_history = self.snapshot_history.max(1);
        // Confirmations only happen at hash exchanges, so a drift bound
        // tighter than the exchange interval would deadlock the session
        self.max_tick_drift = self.max_tick_drift.max(self.hash_interval_ticks);
        self
    }
}

impl Default for LockstepConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 50,
            input_delay_ticks: 3,
            hash_interval_ticks: 10,
            max_ticks_per_update: 5,
            snapshot_history: 60,
            max_tick_drift: 10,
            input_wait_timeout_ms: 5000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LockstepConfig::default();
        assert_eq!(config.tick_interval_ms, 50);
        assert_eq!(config.input_delay_ticks, 3);
        assert_eq!(config.hash_interval_ticks, 10);
        assert_eq!(config.max_ticks_per_update, 5);
        assert_eq!(config.snapshot_history, 60);
        assert_eq!(config.tick_rate_hz(), 20);
    }

    #[test]
    fn test_builders() {
        let config = LockstepConfig::default()
            .with_tick_rate_hz(10)
            .with_input_delay(5)
            .with_hash_interval(4);
        assert_eq!(config.tick_interval_ms, 100);
        assert_eq!(config.input_delay_ticks, 5);
        assert_eq!(config.hash_interval_ticks, 4);
    }

    #[test]
    fn test_normalized_clamps_zeros() {
        let config = LockstepConfig {
            tick_interval_ms: 0,
            input_delay_ticks: 3,
            hash_interval_ticks: 8,
            max_ticks_per_update: 0,
            snapshot_history: 0,
            max_tick_drift: 0,
            input_wait_timeout_ms: 0,
        }
        .normalized();

        assert_eq!(config.tick_interval_ms, 1);
        assert_eq!(config.hash_interval_ticks, 8);
        assert_eq!(config.max_ticks_per_update, 1);
        assert_eq!(config.snapshot_history, 1);
        // Drift may never be tighter than the hash exchange interval
        assert_eq!(config.max_tick_drift, 8);
    }
}
