//! Slew-rate limiting, grounded on `hardware/slew.py`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use crate::config::SlewConfig;
use crate::error::{Error, Result};

/// Named rate presets, each a fraction of the limiter's full output range
/// allowed to change per second of wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlewRate {
    ExtremelySlow,
    VerySlow,
    Slower,
    Slow,
    Normal,
    Fast,
    VeryFast,
}

impl SlewRate {
    #[must_use]
    pub fn ratio(self) -> f64 {
        match self {
            SlewRate::ExtremelySlow => 0.01,
            SlewRate::VerySlow => 0.025,
            SlewRate::Slower => 0.05,
            SlewRate::Slow => 0.075,
            SlewRate::Normal => 0.10,
            SlewRate::Fast => 0.25,
            SlewRate::VeryFast => 0.5,
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "EXTREMELY_SLOW" => Some(Self::ExtremelySlow),
            "VERY_SLOW" => Some(Self::VerySlow),
            "SLOWER" => Some(Self::Slower),
            "SLOW" => Some(Self::Slow),
            "NORMAL" => Some(Self::Normal),
            "FAST" => Some(Self::Fast),
            "VERY_FAST" => Some(Self::VeryFast),
            _ => None,
        }
    }
}

/// Clamps the rate of change of a scalar output. Called once per control
/// loop tick with a new target; returns the value actually reached this
/// tick, which may lag the target until enough ticks have passed.
pub struct SlewLimiter {
    rate: SlewRate,
    minimum_output: f64,
    maximum_output: f64,
    use_elapsed_time: bool,
    hysteresis: f64,
    enabled: AtomicBool,
    suppressed: AtomicBool,
    current: Mutex<f64>,
    last_tick: Mutex<Instant>,
}

impl SlewLimiter {
    /// `enabled`/`suppressed` come from `motors.enable_slew_limiter` /
    /// `motors.suppress_slew_limiter`, not `SlewConfig` itself, since those
    /// flags gate the limiter as a whole rather than shaping its curve.
    pub fn new(config: &SlewConfig, enabled: bool, suppressed: bool) -> Result<Self> {
        let rate = SlewRate::from_name(&config.rate)
            .ok_or_else(|| Error::configuration(format!("unknown slew rate: {}", config.rate)))?;
        Ok(Self {
            rate,
            minimum_output: config.minimum_output,
            maximum_output: config.maximum_output,
            use_elapsed_time: config.use_elapsed_time,
            hysteresis: config.hysteresis,
            enabled: AtomicBool::new(enabled),
            suppressed: AtomicBool::new(suppressed),
            current: Mutex::new(0.0),
            last_tick: Mutex::new(Instant::now()),
        })
    }

    #[must_use]
    pub fn current(&self) -> f64 {
        *self.current.lock().unwrap()
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

    /// Forces the limiter to a value immediately, bypassing the rate limit
    /// (used when a motor is re-enabled or a brake/stop snaps power to
    /// zero).
    pub fn reset(&self, value: f64) {
        *self.current.lock().unwrap() = value.clamp(self.minimum_output, self.maximum_output);
        *self.last_tick.lock().unwrap() = Instant::now();
    }

    /// Advances `current` toward `target` by at most one rate-limited step
    /// and returns the new current value. Two distinct increment models:
    /// `use_elapsed_time` moves by `rate * dt` (a fraction of the full
    /// output range per second of wall-clock time elapsed since the
    /// previous call); otherwise the increment is `rate * |target -
    /// current|`, a fixed percentage of whatever error remains this call.
    /// Disabled or suppressed, the target passes straight through
    /// unshaped, per spec §4.6.
    pub fn slew_to(&self, target: f64) -> f64 {
        if !self.enabled() || self.suppressed() {
            return target;
        }
        let target = target.clamp(self.minimum_output, self.maximum_output);

        let mut current = self.current.lock().unwrap();
        let diff = target - *current;
        if diff.abs() < self.hysteresis {
            return *current;
        }

        let max_step = if self.use_elapsed_time {
            let range = self.maximum_output - self.minimum_output;
            let mut last = self.last_tick.lock().unwrap();
            let now = Instant::now();
            let elapsed = now.duration_since(*last).as_secs_f64();
            *last = now;
            self.rate.ratio() * range * elapsed
        } else {
            self.rate.ratio() * diff.abs()
        };

        if diff.abs() <= max_step {
            *current = target;
        } else if diff > 0.0 {
            *current += max_step;
        } else {
            *current -= max_step;
        }
        *current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(rate: &str) -> SlewConfig {
        SlewConfig {
            minimum_output: -1.0,
            maximum_output: 1.0,
            use_elapsed_time: false,
            rate: rate.to_owned(),
            hysteresis: 0.0,
        }
    }

    #[test]
    fn unknown_rate_name_is_a_configuration_error() {
        let err = SlewLimiter::new(&config("WARP_SPEED"), true, false).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn slew_steps_toward_target_without_overshoot() {
        let limiter = SlewLimiter::new(&config("NORMAL"), true, false).unwrap();
        assert_eq!(limiter.current(), 0.0);
        let step1 = limiter.slew_to(1.0);
        assert!(step1 > 0.0 && step1 < 1.0);
        let mut last = step1;
        for _ in 0..200 {
            last = limiter.slew_to(1.0);
        }
        assert!((last - 1.0).abs() < 1e-6);
    }

    /// Ratio mode moves `current` by `ratio * |target - current|` each
    /// call; on a velocity scale of `[-100, 100]`, NORMAL's 0.10 ratio
    /// takes the first step from 0 to exactly 50 * 0.10 = 5.0.
    #[test]
    fn scenario_s3_normal_ratio_first_step_is_ten_percent_of_error() {
        let limiter = SlewLimiter::new(
            &SlewConfig {
                minimum_output: -100.0,
                maximum_output: 100.0,
                use_elapsed_time: false,
                rate: "NORMAL".to_owned(),
                hysteresis: 0.5,
            },
            true,
            false,
        )
        .unwrap();
        assert_eq!(limiter.slew_to(50.0), 5.0);
        for _ in 0..200 {
            limiter.slew_to(50.0);
        }
        assert!((limiter.current() - 50.0).abs() <= 0.5);
    }

    #[test]
    fn reset_snaps_immediately() {
        let limiter = SlewLimiter::new(&config("EXTREMELY_SLOW"), true, false).unwrap();
        limiter.reset(0.9);
        assert_eq!(limiter.current(), 0.9);
    }

    #[test]
    fn output_never_exceeds_configured_range() {
        let limiter = SlewLimiter::new(&config("VERY_FAST"), true, false).unwrap();
        for _ in 0..500 {
            limiter.slew_to(5.0);
        }
        assert!((limiter.current() - 1.0).abs() < 1e-6);
        for _ in 0..500 {
            limiter.slew_to(-5.0);
        }
        assert!((limiter.current() - -1.0).abs() < 1e-6);
    }

    #[test]
    fn hysteresis_band_holds_current_steady() {
        let limiter = SlewLimiter::new(
            &SlewConfig {
                minimum_output: -1.0,
                maximum_output: 1.0,
                use_elapsed_time: false,
                rate: "NORMAL".to_owned(),
                hysteresis: 0.2,
            },
            true,
            false,
        )
        .unwrap();
        limiter.reset(0.5);
        assert_eq!(limiter.slew_to(0.55), 0.5);
    }

    #[test]
    fn disabled_limiter_passes_target_straight_through() {
        let limiter = SlewLimiter::new(&config("NORMAL"), false, false).unwrap();
        assert_eq!(limiter.slew_to(1.0), 1.0);
        assert_eq!(limiter.current(), 0.0);
    }

    #[test]
    fn suppressed_limiter_passes_target_straight_through() {
        let limiter = SlewLimiter::new(&config("NORMAL"), true, true).unwrap();
        assert_eq!(limiter.slew_to(-1.0), -1.0);
        assert_eq!(limiter.current(), 0.0);
    }
}
