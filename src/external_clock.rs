//! External clock: a periodic tick source driving callbacks in
//! registration order. Uses the worker-thread idiom in [`crate::tasks`]
//! for the thread-driven fallback; this crate carries no GPIO crate in
//! its dependency stack, so a hardware edge is delivered through
//! [`ExternalClock::on_edge`] by whatever platform-specific code owns the
//! pin, rather than this module reaching for its own GPIO binding.

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use parking_lot::Mutex;

use crate::component::{Component, ComponentState};
use crate::config::ExternalClockConfig;
use crate::macros::Callable;
use crate::tasks;

/// Which edge source drives ticks: hardware-driven, or a thread-driven
/// fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockMode {
    /// A configured GPIO pin is present: ticks arrive via [`ExternalClock::on_edge`].
    HardwareDriven,
    /// No pin configured: a background thread fires ticks at `freq_hz`.
    ThreadDriven,
}

pub struct ExternalClock {
    state: ComponentState,
    config: ExternalClockConfig,
    mode: ClockMode,
    callbacks: Mutex<Vec<Callable>>,
}

impl ExternalClock {
    #[must_use]
    pub fn new(config: ExternalClockConfig) -> Self {
        let mode = if config.pin.is_some() {
            ClockMode::HardwareDriven
        } else {
            ClockMode::ThreadDriven
        };
        Self {
            state: ComponentState::new("external-clock", false, false),
            config,
            mode,
            callbacks: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn mode(&self) -> ClockMode {
        self.mode
    }

    pub fn add_callback(&self, f: Callable) {
        self.callbacks.lock().push(f);
    }

    fn fire(&self) {
        if !self.state.active() {
            return;
        }
        let callbacks = self.callbacks.lock().clone();
        for cb in callbacks {
            cb();
        }
    }

    /// Delivers one hardware edge. A no-op in
    /// [`ClockMode::ThreadDriven`] mode, since that mode never receives
    /// edges.
    pub fn on_edge(&self) {
        if self.mode == ClockMode::HardwareDriven {
            self.fire();
        }
    }

    /// Starts the thread-driven fallback. A no-op in
    /// [`ClockMode::HardwareDriven`] mode.
    pub fn run(self: &Arc<Self>) {
        if self.mode != ClockMode::ThreadDriven {
            return;
        }
        self.state.enable();
        let period = Duration::from_secs_f64(1.0 / self.config.freq_hz.max(0.001));
        let clock = Arc::clone(self);
        tasks::spawn_worker("external-clock", move || {
            while !clock.state().closed() {
                std::thread::sleep(period);
                clock.fire();
            }
            debug!("external-clock: worker exiting, component closed");
        });
    }
}

impl Component for ExternalClock {
    fn state(&self) -> &ComponentState {
        &self.state
    }
    fn classname(&self) -> &'static str {
        "ExternalClock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn no_pin_selects_thread_driven_mode() {
        let clock = ExternalClock::new(ExternalClockConfig {
            pin: None,
            freq_hz: 20.0,
        });
        assert_eq!(clock.mode(), ClockMode::ThreadDriven);
    }

    #[test]
    fn configured_pin_selects_hardware_driven_mode() {
        let clock = ExternalClock::new(ExternalClockConfig {
            pin: Some(17),
            freq_hz: 20.0,
        });
        assert_eq!(clock.mode(), ClockMode::HardwareDriven);
    }

    #[test]
    fn callbacks_run_in_registration_order_on_edge() {
        let clock = ExternalClock::new(ExternalClockConfig {
            pin: Some(17),
            freq_hz: 20.0,
        });
        clock.state.enable();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            clock.add_callback(Arc::new(move || order.lock().push(i)));
        }
        clock.on_edge();
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn thread_driven_mode_ignores_on_edge() {
        let clock = ExternalClock::new(ExternalClockConfig {
            pin: None,
            freq_hz: 20.0,
        });
        clock.state.enable();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = fired.clone();
        clock.add_callback(Arc::new(move || {
            fired2.fetch_add(1, Ordering::SeqCst);
        }));
        clock.on_edge();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn thread_driven_run_fires_callbacks_until_closed() {
        let clock = Arc::new(ExternalClock::new(ExternalClockConfig {
            pin: None,
            freq_hz: 1_000.0,
        }));
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = fired.clone();
        clock.add_callback(Arc::new(move || {
            fired2.fetch_add(1, Ordering::SeqCst);
        }));
        clock.run();
        while fired.load(Ordering::SeqCst) == 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
        clock.state().close();
    }
}
