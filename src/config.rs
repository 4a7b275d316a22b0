//! YAML configuration loading: a `Config`/`CoreConfig` deserialize
//! pattern with no build-time codegen machinery.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

fn default_stop_timeout() -> f64 {
    5.0
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    version: u16,
    #[serde(default)]
    pub core: CoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub kros: KrosConfig,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoreConfig {
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout: f64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            stop_timeout: default_stop_timeout(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub target: Option<LogTarget>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    Stdout,
    Syslog,
}

/// The `kros:` root section holding this crate's domain configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KrosConfig {
    #[serde(default)]
    pub message_bus: MessageBusConfig,
    #[serde(default)]
    pub motors: MotorsConfig,
    #[serde(default)]
    pub motor: MotorConfig,
    #[serde(default)]
    pub publisher: PublisherConfig,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageBusConfig {
    #[serde(default = "default_max_age_ms")]
    pub max_age_ms: u64,
    #[serde(default = "default_publish_delay_sec")]
    pub publish_delay_sec: f64,
    #[serde(default)]
    pub clip_event_list: bool,
    #[serde(default = "default_clip_length")]
    pub clip_length: usize,
}

fn default_max_age_ms() -> u64 {
    2_000
}
fn default_publish_delay_sec() -> f64 {
    0.01
}
fn default_clip_length() -> usize {
    40
}

impl Default for MessageBusConfig {
    fn default() -> Self {
        Self {
            max_age_ms: default_max_age_ms(),
            publish_delay_sec: default_publish_delay_sec(),
            clip_event_list: false,
            clip_length: default_clip_length(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlewConfig {
    pub minimum_output: f64,
    pub maximum_output: f64,
    #[serde(default)]
    pub use_elapsed_time: bool,
    #[serde(default = "default_slew_rate")]
    pub rate: String,
    #[serde(default = "default_hysteresis")]
    pub hysteresis: f64,
}

fn default_slew_rate() -> String {
    "NORMAL".to_owned()
}
fn default_hysteresis() -> f64 {
    0.5
}

impl Default for SlewConfig {
    fn default() -> Self {
        Self {
            minimum_output: -1.0,
            maximum_output: 1.0,
            use_elapsed_time: false,
            rate: default_slew_rate(),
            hysteresis: default_hysteresis(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JerkConfig {
    #[serde(default = "default_jerk_cap")]
    pub cap: f64,
}

fn default_jerk_cap() -> f64 {
    0.05
}

impl Default for JerkConfig {
    fn default() -> Self {
        Self {
            cap: default_jerk_cap(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MotorsConfig {
    #[serde(default = "default_motor_power_limit")]
    pub motor_power_limit: f64,
    #[serde(default)]
    pub suppress_slew_limiter: bool,
    #[serde(default = "default_true")]
    pub enable_slew_limiter: bool,
    #[serde(default)]
    pub suppress_jerk_limiter: bool,
    #[serde(default = "default_true")]
    pub enable_jerk_limiter: bool,
    #[serde(default)]
    pub slew: SlewConfig,
    #[serde(default)]
    pub jerk: JerkConfig,
    #[serde(default = "default_max_velocity")]
    pub max_velocity: f64,
    #[serde(default = "default_accel_increment")]
    pub accel_increment: f64,
    #[serde(default = "default_decel_increment")]
    pub decel_increment: f64,
    #[serde(default = "default_halt_ratio")]
    pub halt_ratio: f64,
    #[serde(default = "default_brake_ratio")]
    pub brake_ratio: f64,
    #[serde(default = "default_spin_speed")]
    pub spin_speed: f64,
    #[serde(default = "default_loop_delay_sec")]
    pub loop_delay_sec: f64,
    #[serde(default = "default_steps_per_rotation")]
    pub steps_per_rotation: u32,
    #[serde(default = "default_wheel_circumference_mm")]
    pub wheel_circumference_mm: f64,
    #[serde(default = "default_accel_range_cm")]
    pub accel_range_cm: f64,
}

fn default_motor_power_limit() -> f64 {
    0.9
}
fn default_true() -> bool {
    true
}
fn default_max_velocity() -> f64 {
    90.0
}
fn default_accel_increment() -> f64 {
    2.0
}
fn default_decel_increment() -> f64 {
    2.0
}
fn default_halt_ratio() -> f64 {
    0.70
}
fn default_brake_ratio() -> f64 {
    0.90
}
fn default_spin_speed() -> f64 {
    30.0
}
fn default_loop_delay_sec() -> f64 {
    0.05
}
fn default_steps_per_rotation() -> u32 {
    494
}
fn default_wheel_circumference_mm() -> f64 {
    218.0
}
/// `travel()`'s configured acceleration/deceleration run-up distance, in
/// centimetres, before being compressed for short moves.
fn default_accel_range_cm() -> f64 {
    10.0
}

impl Default for MotorsConfig {
    fn default() -> Self {
        Self {
            motor_power_limit: default_motor_power_limit(),
            suppress_slew_limiter: false,
            enable_slew_limiter: default_true(),
            suppress_jerk_limiter: false,
            enable_jerk_limiter: default_true(),
            slew: SlewConfig::default(),
            jerk: JerkConfig::default(),
            max_velocity: default_max_velocity(),
            accel_increment: default_accel_increment(),
            decel_increment: default_decel_increment(),
            halt_ratio: default_halt_ratio(),
            brake_ratio: default_brake_ratio(),
            spin_speed: default_spin_speed(),
            loop_delay_sec: default_loop_delay_sec(),
            steps_per_rotation: default_steps_per_rotation(),
            wheel_circumference_mm: default_wheel_circumference_mm(),
            accel_range_cm: default_accel_range_cm(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PidControllerConfig {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    #[serde(default = "default_pid_min")]
    pub minimum_output: f64,
    #[serde(default = "default_pid_max")]
    pub maximum_output: f64,
    #[serde(default = "default_sample_freq_hz")]
    pub sample_freq_hz: u32,
    #[serde(default = "default_hyst_queue_len")]
    pub hyst_queue_len: usize,
}

fn default_pid_min() -> f64 {
    -1.0
}
fn default_pid_max() -> f64 {
    1.0
}
fn default_sample_freq_hz() -> u32 {
    20
}
fn default_hyst_queue_len() -> usize {
    5
}

impl Default for PidControllerConfig {
    fn default() -> Self {
        Self {
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
            minimum_output: default_pid_min(),
            maximum_output: default_pid_max(),
            sample_freq_hz: default_sample_freq_hz(),
            hyst_queue_len: default_hyst_queue_len(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MotorConfig {
    #[serde(default)]
    pub pid_controller: PidControllerConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublisherConfig {
    #[serde(rename = "macro", default)]
    pub macro_publisher: MacroPublisherConfig,
    #[serde(default)]
    pub external_clock: ExternalClockConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MacroPublisherConfig {
    #[serde(default = "default_loop_freq_hz")]
    pub loop_freq_hz: f64,
    #[serde(default = "default_quiescent_loop_freq_hz")]
    pub quiescent_loop_freq_hz: f64,
    #[serde(default = "default_wait_limit_ms")]
    pub wait_limit_ms: u64,
    #[serde(default)]
    pub load_macros: bool,
    #[serde(default)]
    pub macro_path: Option<String>,
}

fn default_loop_freq_hz() -> f64 {
    20.0
}
fn default_quiescent_loop_freq_hz() -> f64 {
    5.0
}
fn default_wait_limit_ms() -> u64 {
    3_000
}

impl Default for MacroPublisherConfig {
    fn default() -> Self {
        Self {
            loop_freq_hz: default_loop_freq_hz(),
            quiescent_loop_freq_hz: default_quiescent_loop_freq_hz(),
            wait_limit_ms: default_wait_limit_ms(),
            load_macros: false,
            macro_path: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExternalClockConfig {
    #[serde(default)]
    pub pin: Option<u8>,
    #[serde(default = "default_clock_freq_hz")]
    pub freq_hz: f64,
}

fn default_clock_freq_hz() -> f64 {
    20.0
}

impl Default for ExternalClockConfig {
    fn default() -> Self {
        Self {
            pin: None,
            freq_hz: default_clock_freq_hz(),
        }
    }
}

impl MotorsConfig {
    /// Steps per centimetre of travel, derived from the encoder/wheel
    /// geometry.
    #[must_use]
    pub fn steps_per_cm(&self) -> f64 {
        f64::from(self.steps_per_rotation) / (self.wheel_circumference_mm / 10.0)
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&raw)?;
        if config.version != 1 {
            return Err(Error::configuration(format!(
                "unsupported config version: {}",
                config.version
            )));
        }
        Ok(config)
    }
}
