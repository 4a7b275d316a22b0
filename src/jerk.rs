//! Jerk limiting: caps the per-tick change of an already slew-limited
//! power value. Follows the same rate-limited-scalar shape as the slew
//! limiter, but with a single `cap` parameter instead of named rate
//! presets.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::config::JerkConfig;

/// Limits how much a power value may change between consecutive calls to
/// `limit`, smoothing out the discrete jumps a slew limiter's own steps can
/// still produce at low sample rates.
pub struct JerkLimiter {
    cap: f64,
    current: Mutex<f64>,
    enabled: AtomicBool,
    suppressed: AtomicBool,
}

impl JerkLimiter {
    /// `enabled`/`suppressed` come from `motors.enable_jerk_limiter` /
    /// `motors.suppress_jerk_limiter`, not `JerkConfig` itself, since those
    /// flags gate the limiter as a whole rather than shaping its cap.
    #[must_use]
    pub fn new(config: &JerkConfig, enabled: bool, suppressed: bool) -> Self {
        Self {
            cap: config.cap,
            current: Mutex::new(0.0),
            enabled: AtomicBool::new(enabled),
            suppressed: AtomicBool::new(suppressed),
        }
    }

    #[must_use]
    pub fn current(&self) -> f64 {
        *self.current.lock().unwrap()
    }

    pub fn reset(&self, value: f64) {
        *self.current.lock().unwrap() = value;
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn suppressed(&self) -> bool {
        self.suppressed.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn set_suppressed(&self, suppressed: bool) {
        self.suppressed.store(suppressed, Ordering::Release);
    }

    /// Steps `current` toward `target` by at most `cap` and returns the
    /// result. Disabled or suppressed, the target passes straight through
    /// unshaped, per spec §4.7.
    pub fn limit(&self, target: f64) -> f64 {
        if !self.enabled() || self.suppressed() {
            return target;
        }
        let mut current = self.current.lock().unwrap();
        let diff = target - *current;
        if diff.abs() <= self.cap {
            *current = target;
        } else if diff > 0.0 {
            *current += self.cap;
        } else {
            *current -= self.cap;
        }
        *current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_step_never_exceeds_cap() {
        let limiter = JerkLimiter::new(&JerkConfig { cap: 0.05 }, true, false);
        let next = limiter.limit(1.0);
        assert_eq!(next, 0.05);
    }

    #[test]
    fn converges_to_target_over_several_ticks() {
        let limiter = JerkLimiter::new(&JerkConfig { cap: 0.1 }, true, false);
        let mut last = 0.0;
        for _ in 0..20 {
            last = limiter.limit(0.75);
        }
        assert_eq!(last, 0.75);
    }

    #[test]
    fn small_differences_snap_directly() {
        let limiter = JerkLimiter::new(&JerkConfig { cap: 0.05 }, true, false);
        limiter.reset(0.5);
        assert_eq!(limiter.limit(0.52), 0.52);
    }

    #[test]
    fn disabled_limiter_passes_target_straight_through() {
        let limiter = JerkLimiter::new(&JerkConfig { cap: 0.05 }, false, false);
        assert_eq!(limiter.limit(1.0), 1.0);
        assert_eq!(limiter.current(), 0.0);
    }

    #[test]
    fn suppressed_limiter_passes_target_straight_through() {
        let limiter = JerkLimiter::new(&JerkConfig { cap: 0.05 }, true, true);
        assert_eq!(limiter.limit(-1.0), -1.0);
        assert_eq!(limiter.current(), 0.0);
    }
}
