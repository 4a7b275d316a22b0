//! Motor controller, grounded on `hardware/motor_controller.py`:
//! pairs a port and starboard [`Motor`], exposes ship-telegraph-style
//! maneuvers, and is the [`Controller`] the arbitrator dispatches
//! prioritized payloads to.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::{debug, info};

use crate::arbitrator::Controller;
use crate::component::{Component, ComponentState};
use crate::config::MotorsConfig;
use crate::event::{Event, Group, Value};
use crate::motor::Motor;
use crate::orient::Direction;
use crate::tasks;

/// A single side's phase within a `travel()` maneuver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TravelPhase {
    Accelerating,
    Cruising,
    Decelerating,
    Targeting,
    Done,
}

pub struct MotorController {
    state: ComponentState,
    port: Motor,
    stbd: Motor,
    config: MotorsConfig,
    /// Deceleration ratio armed by `halt()`/`brake()`; applied to both
    /// targets every tick until they snap to zero.
    decel_ratio: Mutex<Option<f64>>,
    travelling: AtomicBool,
}

impl MotorController {
    pub fn new(config: MotorsConfig, port: Motor, stbd: Motor) -> Self {
        Self {
            state: ComponentState::new("motor-controller", false, false),
            port,
            stbd,
            config,
            decel_ratio: Mutex::new(None),
            travelling: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn port(&self) -> &Motor {
        &self.port
    }

    #[must_use]
    pub fn stbd(&self) -> &Motor {
        &self.stbd
    }

    pub fn enable(&self) -> bool {
        self.port.enable();
        self.stbd.enable();
        self.state.enable()
    }

    pub fn disable(&self) -> bool {
        self.port.disable();
        self.stbd.disable();
        self.state.disable()
    }

    pub fn close(&self) -> bool {
        self.port.close();
        self.stbd.close();
        self.state.close()
    }

    /// One control-loop tick, driven by the external clock or
    /// an internal loop at the configured nominal rate.
    pub fn tick(&self) {
        let mut decel = self.decel_ratio.lock().unwrap();
        if let Some(ratio) = *decel {
            let port_target = self.port.target_velocity() * ratio;
            let stbd_target = self.stbd.target_velocity() * ratio;
            if port_target.abs() < 1.0 && stbd_target.abs() < 1.0 {
                self.port.set_target_velocity(0.0);
                self.stbd.set_target_velocity(0.0);
                *decel = None;
            } else {
                self.port.set_target_velocity(port_target);
                self.stbd.set_target_velocity(stbd_target);
            }
        }
        drop(decel);
        // Port before starboard: a stable tie-break only; the
        // external clock observes both as simultaneous.
        if (self.port.velocity() - self.port.target_velocity()).abs() > f64::EPSILON {
            self.port.set_motor_velocity(self.port.target_velocity());
        }
        if (self.stbd.velocity() - self.stbd.target_velocity()).abs() > f64::EPSILON {
            self.stbd.set_motor_velocity(self.stbd.target_velocity());
        }
    }

    fn clamp_velocity(&self, v: f64) -> f64 {
        v.clamp(-self.config.max_velocity, self.config.max_velocity)
    }

    // --- velocity group -------------------------------------------------

    pub fn velocity_inc_port(&self) {
        let v = self.clamp_velocity(self.port.target_velocity() + self.config.accel_increment);
        self.port.set_target_velocity(v);
    }
    pub fn velocity_dec_port(&self) {
        let v = self.clamp_velocity(self.port.target_velocity() - self.config.decel_increment);
        self.port.set_target_velocity(v);
    }
    pub fn velocity_inc_stbd(&self) {
        let v = self.clamp_velocity(self.stbd.target_velocity() + self.config.accel_increment);
        self.stbd.set_target_velocity(v);
    }
    pub fn velocity_dec_stbd(&self) {
        let v = self.clamp_velocity(self.stbd.target_velocity() - self.config.decel_increment);
        self.stbd.set_target_velocity(v);
    }
    pub fn velocity_inc_both(&self) {
        self.velocity_inc_port();
        self.velocity_inc_stbd();
    }
    pub fn velocity_dec_both(&self) {
        self.velocity_dec_port();
        self.velocity_dec_stbd();
    }

    // --- chadburn group ---------------------------------------------------

    /// Sets both targets to `sign(direction) * speed.value()`.
    pub fn chadburn(&self, direction: Direction, speed: crate::orient::Speed) {
        let v = direction.sign() * speed.value();
        self.port.set_target_velocity(v);
        self.stbd.set_target_velocity(v);
    }

    // --- theta group --------------------------------------------------

    pub fn theta_even(&self) {
        let avg = (self.port.target_velocity() + self.stbd.target_velocity()) / 2.0;
        self.port.set_target_velocity(avg);
        self.stbd.set_target_velocity(avg);
    }

    pub fn spin_port(&self) {
        self.port.set_target_velocity(-self.config.spin_speed);
        self.stbd.set_target_velocity(self.config.spin_speed);
    }

    pub fn spin_stbd(&self) {
        self.port.set_target_velocity(self.config.spin_speed);
        self.stbd.set_target_velocity(-self.config.spin_speed);
    }

    // --- stop group -----------------------------------------------------

    /// Immediately zeroes both targets and velocities, with no slew.
    pub fn stop(&self) {
        *self.decel_ratio.lock().unwrap() = None;
        self.port.stop_immediately();
        self.stbd.stop_immediately();
    }

    /// Arms a fast deceleration ramp handled by subsequent `tick()` calls.
    pub fn halt(&self) {
        *self.decel_ratio.lock().unwrap() = Some(self.config.halt_ratio);
    }

    /// Arms a slower deceleration ramp than `halt()`.
    pub fn brake(&self) {
        *self.decel_ratio.lock().unwrap() = Some(self.config.brake_ratio);
    }

    /// `travel()`: encoder-geometry-driven distance maneuver.
    /// Runs the phase state machine to completion, polling steps at
    /// `loop_delay_sec`. When `blocking` is `false` it runs on a dedicated
    /// worker thread — blocking hardware-paced work stays off the bus's
    /// event loop — and returns immediately; `on_complete` always runs,
    /// on whichever thread finishes the maneuver.
    pub fn travel<F>(
        self: &Arc<Self>,
        direction: Direction,
        distance_cm: f64,
        blocking: bool,
        on_complete: F,
    ) where
        F: FnOnce() + Send + 'static,
    {
        let cruising = self.config.max_velocity;
        let targeting = cruising * 0.25;
        let sign = direction.sign();
        let steps_per_cm = self.config.steps_per_cm();
        let target_steps = (distance_cm * steps_per_cm).round() as i64;

        let mut accel_range_steps = (self.config.accel_range_cm * steps_per_cm).round() as i64;
        if target_steps < 2 * accel_range_steps {
            accel_range_steps = (target_steps as f64 / 4.0).round() as i64;
        }
        let final_rotation_steps = self.config.steps_per_rotation as i64;
        let loop_delay = Duration::from_secs_f64(self.config.loop_delay_sec.max(0.001));

        self.port.set_target_velocity(0.0);
        self.stbd.set_target_velocity(0.0);
        let start_port = self.port.steps().abs();
        let start_stbd = self.stbd.steps().abs();

        let run = move |controller: &MotorController| {
            controller.travelling.store(true, Ordering::Release);
            loop {
                let port_done = controller.travel_phase_step(
                    &controller.port,
                    start_port,
                    target_steps,
                    accel_range_steps,
                    final_rotation_steps,
                    cruising,
                    targeting,
                    sign,
                );
                let stbd_done = controller.travel_phase_step(
                    &controller.stbd,
                    start_stbd,
                    target_steps,
                    accel_range_steps,
                    final_rotation_steps,
                    cruising,
                    targeting,
                    sign,
                );
                if port_done && stbd_done {
                    break;
                }
                thread::sleep(loop_delay);
            }
            controller.travelling.store(false, Ordering::Release);
        };

        if blocking {
            run(self);
            on_complete();
        } else {
            let controller = Arc::clone(self);
            tasks::spawn_worker("travel", move || {
                run(&controller);
                on_complete();
            });
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn travel_phase_step(
        &self,
        motor: &Motor,
        start_steps: i64,
        target_steps: i64,
        accel_range_steps: i64,
        final_rotation_steps: i64,
        cruising: f64,
        targeting: f64,
        sign: f64,
    ) -> bool {
        let travelled = motor.steps().abs() - start_steps;
        if travelled >= target_steps {
            motor.set_target_velocity(0.0);
            return true;
        }
        let phase = if travelled < accel_range_steps {
            TravelPhase::Accelerating
        } else if travelled < target_steps - accel_range_steps {
            TravelPhase::Cruising
        } else if travelled < target_steps - final_rotation_steps {
            TravelPhase::Decelerating
        } else {
            TravelPhase::Targeting
        };
        let target_velocity = match phase {
            TravelPhase::Accelerating | TravelPhase::Cruising => cruising,
            TravelPhase::Decelerating | TravelPhase::Targeting => targeting,
            TravelPhase::Done => 0.0,
        };
        motor.set_target_velocity(sign * target_velocity);
        false
    }

    #[must_use]
    pub fn is_travelling(&self) -> bool {
        self.travelling.load(Ordering::Acquire)
    }
}

impl Component for MotorController {
    fn state(&self) -> &ComponentState {
        &self.state
    }
    fn classname(&self) -> &'static str {
        "MotorController"
    }
}

impl Controller for MotorController {
    fn name(&self) -> &str {
        Component::name(self)
    }

    /// Command dispatch, called by the arbitrator once it has
    /// selected the highest-priority pending event.
    fn handle(&self, event: Event, value: Option<Value>) {
        if self.suppressed() {
            debug!("motor-controller: suppressed, dropping {event:?}");
            return;
        }
        match event.group() {
            Group::Velocity => match event {
                Event::VelocityIncPort => self.velocity_inc_port(),
                Event::VelocityDecPort => self.velocity_dec_port(),
                Event::VelocityIncStbd => self.velocity_inc_stbd(),
                Event::VelocityDecStbd => self.velocity_dec_stbd(),
                Event::VelocityIncBoth => self.velocity_inc_both(),
                Event::VelocityDecBoth => self.velocity_dec_both(),
                _ => {}
            },
            Group::Chadburn => {
                if let Some((direction, speed)) = event.chadburn() {
                    self.chadburn(direction, speed);
                }
            }
            Group::Theta => match event {
                Event::ThetaEven => self.theta_even(),
                Event::SpinPort => self.spin_port(),
                Event::SpinStbd => self.spin_stbd(),
                _ => {}
            },
            Group::Stop => match event {
                Event::Stop => self.stop(),
                Event::Halt => self.halt(),
                Event::Brake => self.brake(),
                _ => {}
            },
            Group::Bumper | Group::Infrared => {
                // Reactive stops only; sensor-specific thresholds are out
                // of scope. Any bumper/IR contact arms a halt.
                info!("motor-controller: reactive halt on {event:?}");
                self.halt();
            }
            _ => {
                let _ = value;
            }
        }
    }
}
