//! Discrete PID control, built directly from the error/cp/ci/cd/output
//! formulas of a standard discrete PID loop. The `hyst_queue_len` window
//! averages recent *setpoints* (not errors) to detect a near-zero
//! commanded value and force the output to zero, suppressing jitter
//! around a stationary setpoint.

/// Setpoints whose running average falls within this band of zero force the
/// output to zero. Expressed in
/// setpoint units (the same scale as velocity, `[-100, 100]`).
const SETPOINT_ZERO_TOLERANCE: f64 = 0.5;

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::config::PidControllerConfig;

struct Terms {
    integral: f64,
    last_error: f64,
}

/// The last computed (cp, ci, cd) contributions, exposed for telemetry.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Components {
    pub cp: f64,
    pub ci: f64,
    pub cd: f64,
}

pub struct PidController {
    kp: f64,
    ki: f64,
    kd: f64,
    minimum_output: f64,
    maximum_output: f64,
    sample_freq_hz: u32,
    hyst_queue_len: usize,
    hyst_queue: Mutex<VecDeque<f64>>,
    terms: Mutex<Terms>,
    setpoint: Mutex<f64>,
    /// Optional clamp on the setpoint itself, set via [`PidController::set_limit`].
    limit: Mutex<Option<f64>>,
    components: Mutex<Components>,
}

impl PidController {
    #[must_use]
    pub fn new(config: &PidControllerConfig) -> Self {
        Self {
            kp: config.kp,
            ki: config.ki,
            kd: config.kd,
            minimum_output: config.minimum_output,
            maximum_output: config.maximum_output,
            sample_freq_hz: config.sample_freq_hz,
            hyst_queue_len: config.hyst_queue_len.max(1),
            hyst_queue: Mutex::new(VecDeque::new()),
            terms: Mutex::new(Terms {
                integral: 0.0,
                last_error: 0.0,
            }),
            setpoint: Mutex::new(0.0),
            limit: Mutex::new(None),
            components: Mutex::new(Components::default()),
        }
    }

    /// Sets the setpoint, clamped to the optional limit set via
    /// [`PidController::set_limit`]. Also pushes the new
    /// setpoint into the hysteresis window used by [`PidController::compute`]
    /// to detect a near-zero commanded value.
    pub fn set_setpoint(&self, setpoint: f64) {
        let setpoint = match *self.limit.lock().unwrap() {
            Some(limit) => setpoint.clamp(-limit.abs(), limit.abs()),
            None => setpoint,
        };
        *self.setpoint.lock().unwrap() = setpoint;
        let mut queue = self.hyst_queue.lock().unwrap();
        queue.push_back(setpoint);
        while queue.len() > self.hyst_queue_len {
            queue.pop_front();
        }
    }

    #[must_use]
    pub fn setpoint(&self) -> f64 {
        *self.setpoint.lock().unwrap()
    }

    /// Installs (or clears, with `None`) a symmetric clamp applied to every
    /// subsequent [`PidController::set_setpoint`] call.
    pub fn set_limit(&self, limit: Option<f64>) {
        *self.limit.lock().unwrap() = limit;
    }

    /// `(kp, ki, kd)`, for telemetry.
    #[must_use]
    pub fn constants(&self) -> (f64, f64, f64) {
        (self.kp, self.ki, self.kd)
    }

    /// The last computed `(cp, ci, cd)` contributions, for telemetry.
    #[must_use]
    pub fn components(&self) -> Components {
        *self.components.lock().unwrap()
    }

    /// Clears accumulated integral/derivative/hysteresis state, leaving the
    /// setpoint untouched. Used when a motor is re-enabled after a stop.
    pub fn reset(&self) {
        let mut terms = self.terms.lock().unwrap();
        terms.integral = 0.0;
        terms.last_error = 0.0;
        self.hyst_queue.lock().unwrap().clear();
        *self.components.lock().unwrap() = Components::default();
    }

    /// One discrete PID step: `error =
    /// setpoint - measured`, `cp = kp*error`, `ci` accumulates `ki*error*dt`
    /// clamped to `[min_output, max_output]` (anti-windup), `cd =
    /// kd*(error-last_error)/dt`, `output = clamp(cp+ci+cd)`. If the
    /// setpoint's recent running average sits within
    /// [`SETPOINT_ZERO_TOLERANCE`] of zero, the output is forced to zero to
    /// suppress jitter around a stationary setpoint.
    pub fn compute(&self, measured_value: f64) -> f64 {
        let dt = 1.0 / f64::from(self.sample_freq_hz.max(1));
        let setpoint = self.setpoint();
        let error = setpoint - measured_value;

        let mut terms = self.terms.lock().unwrap();
        let cp = self.kp * error;
        let ci = (terms.integral + self.ki * error * dt).clamp(self.minimum_output, self.maximum_output);
        let cd = self.kd * (error - terms.last_error) / dt;

        terms.integral = ci;
        terms.last_error = error;
        drop(terms);

        let setpoint_near_zero = {
            let queue = self.hyst_queue.lock().unwrap();
            !queue.is_empty()
                && (queue.iter().sum::<f64>() / queue.len() as f64).abs() <= SETPOINT_ZERO_TOLERANCE
        };

        let output = if setpoint_near_zero {
            0.0
        } else {
            (cp + ci + cd).clamp(self.minimum_output, self.maximum_output)
        };
        *self.components.lock().unwrap() = Components { cp, ci, cd };
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PidControllerConfig {
        PidControllerConfig {
            kp: 1.0,
            ki: 0.1,
            kd: 0.01,
            minimum_output: -1.0,
            maximum_output: 1.0,
            sample_freq_hz: 20,
            hyst_queue_len: 3,
        }
    }

    #[test]
    fn proportional_only_tracks_error_sign() {
        let pid = PidController::new(&PidControllerConfig {
            ki: 0.0,
            kd: 0.0,
            hyst_queue_len: 1,
            ..config()
        });
        pid.set_setpoint(10.0);
        let output = pid.compute(5.0);
        assert!(output > 0.0);
    }

    #[test]
    fn output_is_clamped_to_configured_range() {
        let pid = PidController::new(&PidControllerConfig {
            kp: 100.0,
            hyst_queue_len: 1,
            ..config()
        });
        pid.set_setpoint(1000.0);
        assert_eq!(pid.compute(0.0), 1.0);
    }

    #[test]
    fn reset_clears_integral_state() {
        let pid = PidController::new(&config());
        pid.set_setpoint(5.0);
        for _ in 0..10 {
            pid.compute(0.0);
        }
        pid.reset();
        pid.set_setpoint(0.0);
        let output = pid.compute(0.0);
        assert_eq!(output, 0.0);
    }

    #[test]
    fn zero_constants_yield_zero_output_regardless_of_input() {
        let pid = PidController::new(&PidControllerConfig {
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
            hyst_queue_len: 1,
            ..config()
        });
        pid.set_setpoint(37.0);
        assert_eq!(pid.compute(-1_000.0), 0.0);
        assert_eq!(pid.compute(1_000.0), 0.0);
    }

    #[test]
    fn integrator_never_escapes_the_output_clamp() {
        let pid = PidController::new(&PidControllerConfig {
            kp: 0.0,
            kd: 0.0,
            hyst_queue_len: 1,
            ..config()
        });
        pid.set_setpoint(100.0);
        for _ in 0..10_000 {
            pid.compute(0.0);
        }
        assert!(pid.components().ci <= 1.0 + f64::EPSILON);
        assert!(pid.components().ci >= -1.0 - f64::EPSILON);
    }

    #[test]
    fn setpoint_near_zero_forces_output_to_zero() {
        let pid = PidController::new(&PidControllerConfig {
            hyst_queue_len: 1,
            ..config()
        });
        pid.set_setpoint(0.1);
        assert_eq!(pid.compute(5.0), 0.0);
    }

    #[test]
    fn set_limit_clamps_subsequent_setpoints() {
        let pid = PidController::new(&config());
        pid.set_limit(Some(10.0));
        pid.set_setpoint(50.0);
        assert_eq!(pid.setpoint(), 10.0);
        pid.set_setpoint(-50.0);
        assert_eq!(pid.setpoint(), -10.0);
        pid.set_limit(None);
        pid.set_setpoint(50.0);
        assert_eq!(pid.setpoint(), 50.0);
    }

    #[test]
    fn constants_and_components_expose_telemetry() {
        let pid = PidController::new(&PidControllerConfig {
            hyst_queue_len: 1,
            ..config()
        });
        assert_eq!(pid.constants(), (1.0, 0.1, 0.01));
        pid.set_setpoint(10.0);
        pid.compute(0.0);
        let components = pid.components();
        assert!(components.cp > 0.0);
    }
}
