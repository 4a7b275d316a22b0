//! Motor, grounded on `hardware/motor.py`: a single wheel's
//! slew-limited velocity target, jerk-limited power output, and encoder step
//! count, behind a small `MotorDriver` seam so tests never touch real
//! hardware.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use log::warn;

use crate::component::{Component, ComponentState};
use crate::config::MotorsConfig;
use crate::error::Result;
use crate::jerk::JerkLimiter;
use crate::orient::Orientation;
use crate::slew::SlewLimiter;

/// The velocity setpoint range a [`Motor`] accepts, matching the
/// `[-100, 100]` scale `MotorController` commands targets in.
const VELOCITY_RANGE: f64 = 100.0;

/// How many times `current_power` retries a driver read that returns `None`
/// before giving up and reporting zero.
const CURRENT_POWER_RETRIES: u32 = 20;
const CURRENT_POWER_RETRY_DELAY: Duration = Duration::from_millis(5);

/// Seam over the hardware-specific motor controller chip. `set_motor` sends
/// a signed power in `[-1.0, 1.0]`; `get_motor` reads it back, returning
/// `None` when the read transiently fails — retried up to
/// [`CURRENT_POWER_RETRIES`] times before the caller gives up.
pub trait MotorDriver: Send + Sync {
    fn set_motor(&self, orientation: Orientation, power: f64);
    fn get_motor(&self, orientation: Orientation) -> Option<f64>;
}

/// In-memory driver used by tests and by a fully mocked robot, whose
/// max-power ratio is always 1.0.
#[derive(Default)]
pub struct MockMotorDriver {
    port: Mutex<f64>,
    stbd: Mutex<f64>,
}

impl MotorDriver for MockMotorDriver {
    fn set_motor(&self, orientation: Orientation, power: f64) {
        match orientation {
            Orientation::Port => *self.port.lock().unwrap() = power,
            Orientation::Stbd => *self.stbd.lock().unwrap() = power,
            _ => {}
        }
    }
    fn get_motor(&self, orientation: Orientation) -> Option<f64> {
        Some(match orientation {
            Orientation::Port => *self.port.lock().unwrap(),
            Orientation::Stbd => *self.stbd.lock().unwrap(),
            _ => 0.0,
        })
    }
}

pub struct Motor {
    state: ComponentState,
    orientation: Orientation,
    slew: SlewLimiter,
    jerk: JerkLimiter,
    steps: AtomicI64,
    target_velocity: Mutex<f64>,
    motor_power_limit: f64,
    max_power_ratio: f64,
    max_power: Mutex<f64>,
    max_driving_power: Mutex<f64>,
    driver: Box<dyn MotorDriver>,
}

impl Motor {
    pub fn new(
        orientation: Orientation,
        config: &MotorsConfig,
        max_power_ratio: f64,
        driver: Box<dyn MotorDriver>,
    ) -> Result<Self> {
        assert!(
            matches!(orientation, Orientation::Port | Orientation::Stbd),
            "a Motor is always Port or Stbd, got {orientation}"
        );
        Ok(Self {
            state: ComponentState::new(format!("motor-{orientation}"), false, false),
            orientation,
            slew: SlewLimiter::new(&config.slew, config.enable_slew_limiter, config.suppress_slew_limiter)?,
            jerk: JerkLimiter::new(&config.jerk, config.enable_jerk_limiter, config.suppress_jerk_limiter),
            steps: AtomicI64::new(0),
            target_velocity: Mutex::new(0.0),
            motor_power_limit: config.motor_power_limit,
            max_power_ratio,
            max_power: Mutex::new(0.0),
            max_driving_power: Mutex::new(0.0),
            driver,
        })
    }

    #[must_use]
    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    #[must_use]
    pub fn steps(&self) -> i64 {
        self.steps.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn target_velocity(&self) -> f64 {
        *self.target_velocity.lock().unwrap()
    }

    pub fn set_target_velocity(&self, velocity: f64) {
        *self.target_velocity.lock().unwrap() = velocity;
    }

    /// The velocity this motor is actually at, as shaped by the slew
    /// limiter so far — distinct from `target_velocity`, which the
    /// controller's tick compares against to decide whether another
    /// `set_motor_velocity` call is owed.
    #[must_use]
    pub fn velocity(&self) -> f64 {
        self.slew.current()
    }

    /// Snaps both the target and the slew limiter straight to zero with no
    /// ramp, then cuts power immediately: `STOP` sets both targets and
    /// velocities to zero immediately, with no slew.
    pub fn stop_immediately(&self) {
        self.set_target_velocity(0.0);
        self.slew.reset(0.0);
        self.set_motor_power(0.0);
    }

    /// `target' = slew.limit(current_velocity, target)`, then `target'` is
    /// translated to a power command by the stateless linear map a velocity
    /// in `[-100, 100]` to a power in `[-motor_power_limit,
    /// motor_power_limit]`: there is no tachometer feedback in scope, so the
    /// conversion is a straight ratio, not a closed loop.
    pub fn set_motor_velocity(&self, target: f64) {
        let shaped = self.slew.slew_to(target);
        let power = Self::velocity_to_power(shaped, self.motor_power_limit);
        self.set_motor_power(power);
    }

    /// `velocity / 100` clamped to `±motor_power_limit`, sign preserved.
    fn velocity_to_power(velocity: f64, motor_power_limit: f64) -> f64 {
        if velocity < 0.0 {
            (velocity / VELOCITY_RANGE).max(-motor_power_limit)
        } else {
            (velocity / VELOCITY_RANGE).min(motor_power_limit)
        }
    }

    /// Jerk-limits `target_power`, scales by `max_power_ratio` (the
    /// battery-to-motor voltage ratio), and sends the result to the driver.
    /// Refuses positive power while disabled.
    pub fn set_motor_power(&self, target_power: f64) {
        if !self.state.enabled() && target_power > 0.0 {
            warn!(
                "motor-{}: refusing to drive at power {:.3}, motor is disabled",
                self.orientation, target_power
            );
            return;
        }
        let target_power = target_power.clamp(-self.motor_power_limit, self.motor_power_limit);
        let shaped = self.jerk.limit(target_power);
        let driving = shaped * self.max_power_ratio;
        self.driver.set_motor(self.orientation, driving);

        let mut max_power = self.max_power.lock().unwrap();
        if shaped.abs() > *max_power {
            *max_power = shaped.abs();
        }
        let mut max_driving = self.max_driving_power.lock().unwrap();
        if driving.abs() > *max_driving {
            *max_driving = driving.abs();
        }
    }

    /// Reads the driver's current power, retrying on transient `None` reads
    ///. Reports `0.0` after exhausting retries rather than
    /// propagating an error: a failed power read is not a routing or
    /// configuration error.
    #[must_use]
    pub fn current_power(&self) -> f64 {
        for attempt in 0..=CURRENT_POWER_RETRIES {
            if let Some(p) = self.driver.get_motor(self.orientation) {
                return p;
            }
            if attempt < CURRENT_POWER_RETRIES {
                thread::sleep(CURRENT_POWER_RETRY_DELAY);
            }
        }
        warn!(
            "motor-{}: current_power read failed after {} retries, reporting 0",
            self.orientation, CURRENT_POWER_RETRIES
        );
        0.0
    }

    #[must_use]
    pub fn stopped(&self) -> bool {
        self.current_power() == 0.0
    }

    #[must_use]
    pub fn is_in_motion(&self) -> bool {
        self.current_power() > 0.0
    }

    #[must_use]
    pub fn max_power(&self) -> f64 {
        *self.max_power.lock().unwrap()
    }

    #[must_use]
    pub fn max_driving_power(&self) -> f64 {
        *self.max_driving_power.lock().unwrap()
    }

    /// Encoder pulse callback: port decrements, starboard
    /// increments, so step sign encodes direction of travel uniformly
    /// across both motors.
    pub fn on_encoder_pulse(&self, pulses: i64) {
        match self.orientation {
            Orientation::Port => {
                self.steps.fetch_sub(pulses, Ordering::AcqRel);
            }
            Orientation::Stbd => {
                self.steps.fetch_add(pulses, Ordering::AcqRel);
            }
            _ => {}
        }
    }
}

impl Component for Motor {
    fn state(&self) -> &ComponentState {
        &self.state
    }
    fn classname(&self) -> &'static str {
        "Motor"
    }
}

impl Motor {
    /// Enabling/disabling a motor cascades to both limiters.
    pub fn enable(&self) -> bool {
        self.slew.reset(self.slew.current());
        self.jerk.reset(self.jerk.current());
        self.state.enable()
    }

    pub fn disable(&self) -> bool {
        self.state.disable()
    }

    /// Forces power to zero regardless of current state before closing:
    /// a motor never leaves a stale nonzero power command behind it.
    pub fn close(&self) -> bool {
        self.driver.set_motor(self.orientation, 0.0);
        self.jerk.reset(0.0);
        self.slew.reset(0.0);
        self.state.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn motor(orientation: Orientation) -> Motor {
        let config = MotorsConfig::default();
        let motor = Motor::new(
            orientation,
            &config,
            1.0,
            Box::new(MockMotorDriver::default()),
        )
        .unwrap();
        motor.enable();
        motor
    }

    #[test]
    fn set_motor_power_zero_stops_the_motor() {
        let m = motor(Orientation::Port);
        m.set_motor_power(0.0);
        assert!(m.stopped());
        assert!(!m.is_in_motion());
    }

    #[test]
    fn driving_power_never_exceeds_limit_times_ratio() {
        let mut config = MotorsConfig::default();
        config.motor_power_limit = 0.5;
        let motor = Motor::new(
            Orientation::Stbd,
            &config,
            0.8,
            Box::new(MockMotorDriver::default()),
        )
        .unwrap();
        motor.enable();
        for _ in 0..200 {
            motor.set_motor_power(10.0);
        }
        assert!(motor.current_power().abs() <= 0.5 * 0.8 + 1e-9);
    }

    #[test]
    fn disabled_motor_refuses_positive_power() {
        let config = MotorsConfig::default();
        let motor = Motor::new(
            Orientation::Port,
            &config,
            1.0,
            Box::new(MockMotorDriver::default()),
        )
        .unwrap();
        motor.set_motor_power(0.5);
        assert_eq!(motor.current_power(), 0.0);
    }

    #[test]
    fn encoder_pulses_decrement_port_and_increment_stbd() {
        let port = motor(Orientation::Port);
        let stbd = motor(Orientation::Stbd);
        port.on_encoder_pulse(5);
        stbd.on_encoder_pulse(5);
        assert_eq!(port.steps(), -5);
        assert_eq!(stbd.steps(), 5);
    }

    #[test]
    fn close_forces_zero_power_on_both_limiters() {
        let m = motor(Orientation::Port);
        for _ in 0..50 {
            m.set_motor_power(1.0);
        }
        m.close();
        assert_eq!(m.current_power(), 0.0);
        assert!(m.closed());
        assert!(!m.enabled());
    }

    #[test]
    fn velocity_to_power_is_the_literal_linear_map() {
        assert_eq!(Motor::velocity_to_power(50.0, 0.9), 0.5);
        assert_eq!(Motor::velocity_to_power(-50.0, 0.9), -0.5);
        assert_eq!(Motor::velocity_to_power(0.0, 0.9), 0.0);
    }

    #[test]
    fn velocity_to_power_clamps_to_motor_power_limit() {
        assert_eq!(Motor::velocity_to_power(100.0, 0.5), 0.5);
        assert_eq!(Motor::velocity_to_power(-100.0, 0.5), -0.5);
    }

    #[test]
    fn set_motor_velocity_sustains_power_at_steady_state_cruise() {
        // Once the slew limiter has converged on the commanded velocity
        // (the normal cruise/travel case, where hysteresis holds `current`
        // steady), the motor must keep driving power proportional to that
        // velocity rather than collapsing to zero because nothing changed
        // this tick.
        let mut config = MotorsConfig::default();
        config.slew.minimum_output = -100.0;
        config.slew.maximum_output = 100.0;
        let motor = Motor::new(
            Orientation::Port,
            &config,
            1.0,
            Box::new(MockMotorDriver::default()),
        )
        .unwrap();
        motor.enable();
        for _ in 0..500 {
            motor.set_motor_velocity(50.0);
        }
        assert!((motor.velocity() - 50.0).abs() < 1.0);
        assert!((motor.current_power() - 0.5).abs() < 1e-6);
        // One further tick at the same target: power holds, it does not
        // drop back to zero at steady state.
        motor.set_motor_velocity(50.0);
        assert!((motor.current_power() - 0.5).abs() < 1e-6);
    }
}
