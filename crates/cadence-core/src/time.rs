//! Time system for fixed-timestep simulation
//!
//! Provides discrete time management for deterministic systems:
//! - `Tick` - Logical time unit
//! - `TickTimer` - Wall-clock accumulator that banks fixed ticks
//!
//! The timer only accumulates and dispenses time; whether a banked tick may
//! actually be consumed is decided by the scheduler's advance guard, so
//! accumulation and consumption are separate calls.

use serde::{Deserialize, Serialize};

/// A discrete tick identifier (logical time unit)
pub type Tick = u64;

/// Fixed-timestep accumulator
///
/// Fed with a monotonically increasing wall-clock timestamp, it banks
/// elapsed milliseconds and hands them back one tick interval at a time.
/// A scheduler stall simply leaves time in the bank for the next call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickTimer {
    /// Milliseconds per simulation tick
    interval_ms: u64,
    /// Banked, not-yet-consumed milliseconds
    accumulator_ms: u64,
    /// Timestamp of the previous `accumulate` call
    last_update_ms: Option<u64>,
}

impl TickTimer {
    /// Create a timer with the given tick interval in milliseconds
    ///
    /// A zero interval is clamped to 1 ms.
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms: interval_ms.max(1),
            accumulator_ms: 0,
            last_update_ms: None,
        }
    }

    /// Bank the time elapsed since the previous call
    ///
    /// The first call establishes the reference point and banks nothing.
    /// A timestamp that goes backwards banks nothing but becomes the new
    /// reference point.
    pub fn accumulate(&mut self, now_ms: u64) {
        if let Some(last) = self.last_update_ms {
            self.accumulator_ms += now_ms.saturating_sub(last);
        }
        self.last_update_ms = Some(now_ms);
    }

    /// Check whether at least one full tick's worth of time is banked
    pub fn has_tick(&self) -> bool {
        self.accumulator_ms >= self.interval_ms
    }

    /// Consume one tick's worth of banked time
    ///
    /// Returns false (and consumes nothing) if less than a full tick is
    /// banked.
    pub fn consume_tick(&mut self) -> bool {
        if self.has_tick() {
            self.accumulator_ms -= self.interval_ms;
            true
        } else {
            false
        }
    }

    /// Drop all banked time and the reference point
    pub fn reset(&mut self) {
        self.accumulator_ms = 0;
        self.last_update_ms = None;
    }

    /// Milliseconds per tick
    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// Currently banked milliseconds
    pub fn accumulated_ms(&self) -> u64 {
        self.accumulator_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_call_banks_nothing() {
        let mut timer = TickTimer::new(50);
        timer.accumulate(1000);
        assert!(!timer.has_tick());
        assert_eq!(timer.accumulated_ms(), 0);
    }

    #[test]
    fn test_accumulate_and_consume() {
        let mut timer = TickTimer::new(50);
        timer.accumulate(1000);
        timer.accumulate(1120);
        assert_eq!(timer.accumulated_ms(), 120);

        assert!(timer.consume_tick());
        assert!(timer.consume_tick());
        assert!(!timer.consume_tick());
        assert_eq!(timer.accumulated_ms(), 20);
    }

    #[test]
    fn test_backwards_clock() {
        let mut timer = TickTimer::new(50);
        timer.accumulate(1000);
        timer.accumulate(900);
        assert_eq!(timer.accumulated_ms(), 0);

        // Reference point moved; elapsed time counts from the new value
        timer.accumulate(960);
        assert_eq!(timer.accumulated_ms(), 60);
    }

    #[test]
    fn test_reset() {
        let mut timer = TickTimer::new(50);
        timer.accumulate(0);
        timer.accumulate(500);
        timer.reset();
        assert_eq!(timer.accumulated_ms(), 0);

        // After reset the next call re-establishes the reference point
        timer.accumulate(10_000);
        assert_eq!(timer.accumulated_ms(), 0);
    }

    #[test]
    fn test_zero_interval_clamped() {
        let timer = TickTimer::new(0);
        assert_eq!(timer.interval_ms(), 1);
    }
}
