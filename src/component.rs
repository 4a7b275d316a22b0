//! Component lifecycle and registry, grounded on
//! `core/component.py`'s `Component`/`ComponentRegistry`.

use crate::error::Error;
use log::warn;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Three orthogonal lifecycle flags shared by every component in the
/// system. `active` is derived, never stored directly: `Active ⇔ enabled
/// ∧ ¬suppressed ∧ ¬closed`.
#[derive(Debug, Default)]
pub struct ComponentState {
    name: String,
    enabled: AtomicBool,
    suppressed: AtomicBool,
    closed: AtomicBool,
}

impl ComponentState {
    #[must_use]
    pub fn new(name: impl Into<String>, suppressed: bool, enabled: bool) -> Self {
        Self {
            name: name.into(),
            enabled: AtomicBool::new(enabled),
            suppressed: AtomicBool::new(suppressed),
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn suppressed(&self) -> bool {
        self.suppressed.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn active(&self) -> bool {
        self.enabled() && !self.suppressed() && !self.closed()
    }

    /// Enables the component. A no-op (with a warning) if already closed;
    /// idempotent otherwise. Returns `true` so callers may chain.
    pub fn enable(&self) -> bool {
        if self.closed() {
            warn!("{}: cannot enable, already closed", self.name);
            return true;
        }
        self.enabled.store(true, Ordering::Release);
        true
    }

    pub fn disable(&self) -> bool {
        self.enabled.store(false, Ordering::Release);
        true
    }

    pub fn suppress(&self) -> bool {
        self.suppressed.store(true, Ordering::Release);
        true
    }

    pub fn release(&self) -> bool {
        self.suppressed.store(false, Ordering::Release);
        true
    }

    /// Terminal: disables and marks closed. A closed component can never be
    /// re-enabled.
    pub fn close(&self) -> bool {
        self.disable();
        self.closed.store(true, Ordering::Release);
        true
    }
}

/// Implemented by every core component so the registry can treat them
/// uniformly for listing/printing; individual components additionally
/// expose their own domain methods.
pub trait Component {
    fn state(&self) -> &ComponentState;
    fn classname(&self) -> &'static str;

    fn name(&self) -> &str {
        self.state().name()
    }
    fn enabled(&self) -> bool {
        self.state().enabled()
    }
    fn suppressed(&self) -> bool {
        self.state().suppressed()
    }
    fn closed(&self) -> bool {
        self.state().closed()
    }
    fn active(&self) -> bool {
        self.state().active()
    }
}

/// Append-only, insertion-ordered registry of named components: entries
/// are never removed until process exit. Uses a `BTreeMap` keyed by an
/// insertion sequence number so iteration preserves registration order
/// while still allowing lookup by name through a secondary index.
pub struct Registry {
    inner: Mutex<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    order: Vec<String>,
    entries: BTreeMap<String, RegistryEntry>,
}

struct RegistryEntry {
    classname: &'static str,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    /// Registers a component name. Errors if the name is already present.
    pub fn add(&self, name: &str, classname: &'static str) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        if inner.entries.contains_key(name) {
            return Err(Error::configuration(format!(
                "duplicate component name: {name}"
            )));
        }
        inner.order.push(name.to_owned());
        inner.entries.insert(name.to_owned(), RegistryEntry { classname });
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.lock().entries.contains_key(name)
    }

    /// Returns the classname registered for `name`, or a
    /// `MissingComponentError` if it was never registered.
    pub fn get(&self, name: &str) -> Result<&'static str, Error> {
        self.inner
            .lock()
            .entries
            .get(name)
            .map(|e| e.classname)
            .ok_or_else(|| Error::missing_component(name))
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.inner.lock().order.clone()
    }

    #[must_use]
    pub fn print_registry(&self) -> String {
        let inner = self.inner.lock();
        let mut out = String::from("component registry:\n");
        for name in &inner.order {
            let classname = inner.entries.get(name).map_or("?", |e| e.classname);
            out.push_str(&format!("  {name} ({classname})\n"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_iff_enabled_not_suppressed_not_closed() {
        let s = ComponentState::new("x", false, false);
        assert!(!s.active());
        s.enable();
        assert!(s.active());
        s.suppress();
        assert!(!s.active());
        s.release();
        assert!(s.active());
        s.close();
        assert!(!s.active());
        assert!(!s.enabled());
    }

    #[test]
    fn closed_component_cannot_be_reenabled() {
        let s = ComponentState::new("x", false, true);
        s.close();
        assert!(s.closed());
        s.enable();
        assert!(!s.enabled());
        assert!(s.closed());
    }

    #[test]
    fn duplicate_registration_is_a_configuration_error() {
        let reg = Registry::new();
        reg.add("motors", "Motors").unwrap();
        let err = reg.add("motors", "Motors").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn missing_component_lookup_errors() {
        let reg = Registry::new();
        let err = reg.get("nope").unwrap_err();
        assert!(matches!(err, Error::MissingComponent(_)));
    }

    #[test]
    fn registration_order_is_preserved() {
        let reg = Registry::new();
        reg.add("a", "A").unwrap();
        reg.add("b", "B").unwrap();
        reg.add("c", "C").unwrap();
        assert_eq!(reg.names(), vec!["a", "b", "c"]);
    }
}
