//! Macro scheduler, built on the macro model in [`crate::macros`]: a
//! component driven by its own loop, ticking at `loop_freq_hz` while a
//! macro is in flight and backing off to `quiescent_loop_freq_hz` when
//! idle.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::time::sleep;

use crate::bus::MessageBus;
use crate::component::{Component, ComponentState};
use crate::config::MacroPublisherConfig;
use crate::dequeue::{DeQueue, Mode};
use crate::error::{Error, Result};
use crate::event::Event;
use crate::macros::{Callable, Macro, MacroLibrary, MacroPayload, Statement};

/// A statement as it appears in a `*.yaml` macro file: either `event` or
/// `function` is set, never both.
#[derive(Debug, Deserialize)]
struct StatementDef {
    label: String,
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    function: Option<String>,
    #[serde(default)]
    duration_ms: u64,
}

#[derive(Debug, Deserialize)]
struct MacroDef {
    name: String,
    #[serde(default)]
    description: Option<String>,
    statements: Vec<StatementDef>,
}

struct CurrentStatement {
    statement: Statement,
    start: Instant,
}

/// The macro scheduler component. `run` drives the state machine: pop a
/// queued macro when idle, poll its next statement, wait out the
/// statement's duration (capped by `wait_limit_ms`), then execute it.
pub struct MacroPublisher {
    state: ComponentState,
    config: MacroPublisherConfig,
    library: Mutex<MacroLibrary>,
    stack: DeQueue<Macro>,
    functions: Mutex<HashMap<String, Callable>>,
    current_macro: Mutex<Option<Macro>>,
    current_statement: Mutex<Option<CurrentStatement>>,
    callbacks: Mutex<Vec<Callable>>,
    bus: Arc<MessageBus>,
}

impl MacroPublisher {
    #[must_use]
    pub fn new(config: MacroPublisherConfig, bus: Arc<MessageBus>) -> Self {
        Self {
            state: ComponentState::new("macro-publisher", false, false),
            config,
            library: Mutex::new(MacroLibrary::new()),
            // Most-recently-queued macro runs first.
            stack: DeQueue::new(Mode::Lifo),
            functions: Mutex::new(HashMap::new()),
            current_macro: Mutex::new(None),
            current_statement: Mutex::new(None),
            callbacks: Mutex::new(Vec::new()),
            bus,
        }
    }

    /// Registers a callable a YAML statement can reference by `function:
    /// <name>`.
    pub fn register_function(&self, name: impl Into<String>, f: Callable) {
        self.functions.lock().insert(name.into(), f);
    }

    /// Registers a one-shot callback, run (and cleared) when the current
    /// macro finishes.
    pub fn add_callback(&self, f: Callable) {
        self.callbacks.lock().push(f);
    }

    pub fn insert_macro(&self, m: Macro) {
        self.library.lock().insert(m);
    }

    /// Looks up `name` in the library, deep-copies it (the library's
    /// original is untouched and remains equal-by-value to the copy),
    /// optionally attaches `payload`, and pushes the copy onto the stack.
    pub fn queue_macro_by_name(&self, name: &str, payload: Option<MacroPayload>) -> bool {
        let Some(copy) = self.library.lock().deep_copy(name) else {
            warn!("macro-publisher: no macro named {name:?}");
            return false;
        };
        let copy = match payload {
            Some(p) => copy.with_payload(p),
            None => copy,
        };
        self.stack.push(copy);
        true
    }

    /// Enumerates `*.yaml` files under `path` and loads each as one macro;
    /// a later file overwrites an earlier macro of the same name.
    pub fn load_macro_files(&self, path: &str) -> Result<usize> {
        let dir = Path::new(path);
        let mut loaded = 0usize;
        let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<std::io::Result<_>>()?;
        entries.sort_by_key(std::fs::DirEntry::path);
        for entry in entries {
            let file_path = entry.path();
            if file_path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            let text = fs::read_to_string(&file_path)?;
            let def: MacroDef = serde_yaml::from_str(&text)?;
            let m = self.build_macro(def, &file_path)?;
            self.library.lock().insert(m);
            loaded += 1;
        }
        debug!("macro-publisher: loaded {loaded} macro file(s) from {path}");
        Ok(loaded)
    }

    fn build_macro(&self, def: MacroDef, file_path: &Path) -> Result<Macro> {
        let mut m = Macro::new(def.name);
        if let Some(desc) = def.description {
            m = m.with_description(desc);
        }
        let functions = self.functions.lock();
        for s in def.statements {
            let statement = match (&s.event, &s.function) {
                (Some(event_name), None) => {
                    let event = Event::from_name(event_name).ok_or_else(|| {
                        Error::configuration(format!(
                            "{}: unknown event {event_name:?}",
                            file_path.display()
                        ))
                    })?;
                    Statement::event(s.label, event, s.duration_ms)
                }
                (None, Some(function_name)) => {
                    let callable = functions.get(function_name).ok_or_else(|| {
                        Error::configuration(format!(
                            "{}: unregistered function {function_name:?}",
                            file_path.display()
                        ))
                    })?;
                    Statement::callable(s.label, Arc::clone(callable), s.duration_ms)
                }
                _ => {
                    return Err(Error::configuration(format!(
                        "{}: statement {:?} must set exactly one of event/function",
                        file_path.display(),
                        s.label
                    )))
                }
            };
            m.push(statement);
        }
        Ok(m)
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.current_macro.lock().is_none() && self.stack.is_empty()
    }

    /// Runs the scheduler loop until the component is closed.
    pub async fn run(&self) {
        self.state.enable();
        while !self.state.closed() {
            self.tick().await;
            let hz = if self.is_idle() {
                self.config.quiescent_loop_freq_hz
            } else {
                self.config.loop_freq_hz
            };
            sleep(Duration::from_secs_f64(1.0 / hz.max(0.001))).await;
        }
    }

    async fn tick(&self) {
        if !self.state.active() {
            return;
        }
        if self.current_macro.lock().is_none() {
            if let Some(next) = self.stack.pop() {
                *self.current_macro.lock() = Some(next);
            } else {
                return;
            }
        }

        if self.current_statement.lock().is_none() {
            let statement = self
                .current_macro
                .lock()
                .as_ref()
                .and_then(Macro::poll);
            if let Some(statement) = statement {
                *self.current_statement.lock() = Some(CurrentStatement {
                    statement,
                    start: Instant::now(),
                });
            }
        }

        let ready = {
            let guard = self.current_statement.lock();
            guard.as_ref().is_some_and(|cur| {
                let elapsed = cur.start.elapsed();
                elapsed.as_millis() as u64 >= cur.statement.duration_ms
                    || elapsed.as_millis() as u64 >= self.config.wait_limit_ms
            })
        };
        if ready {
            if let Some(cur) = self.current_statement.lock().take() {
                self.execute_statement(&cur.statement).await;
            }
        }

        let macro_finished = self
            .current_macro
            .lock()
            .as_ref()
            .is_some_and(|m| m.is_empty());
        if macro_finished {
            self.finish_current_macro().await;
        }
    }

    async fn execute_statement(&self, statement: &Statement) {
        match &statement.body {
            crate::macros::StatementBody::Callable(f) => f(),
            crate::macros::StatementBody::Event(event) => {
                self.bus.publish(*event, None).await;
            }
        }
    }

    async fn finish_current_macro(&self) {
        let finished = self.current_macro.lock().take();
        let Some(finished) = finished else {
            return;
        };
        let callbacks: Vec<Callable> = self.callbacks.lock().drain(..).collect();
        for cb in callbacks {
            cb();
        }
        if let Some(payload) = finished.payload {
            match payload {
                MacroPayload::Message(message) => {
                    self.bus.publish(message.event, message.value).await;
                }
                MacroPayload::Raw(event, value) => {
                    self.bus.publish(event, value).await;
                }
            }
        }
    }
}

impl Component for MacroPublisher {
    fn state(&self) -> &ComponentState {
        &self.state
    }
    fn classname(&self) -> &'static str {
        "MacroPublisher"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MessageBusConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn publisher() -> MacroPublisher {
        let bus = Arc::new(MessageBus::new(MessageBusConfig::default()));
        let config = MacroPublisherConfig {
            loop_freq_hz: 200.0,
            quiescent_loop_freq_hz: 50.0,
            wait_limit_ms: 1_000,
            ..MacroPublisherConfig::default()
        };
        MacroPublisher::new(config, bus)
    }

    #[test]
    fn queue_macro_by_name_deep_copies_and_leaves_library_untouched() {
        let pub_ = publisher();
        let m = Macro::new("avoid");
        m.push(Statement::event("stop", Event::Stop, 10));
        pub_.insert_macro(m);

        assert!(pub_.queue_macro_by_name("avoid", None));
        assert_eq!(pub_.library.lock().get("avoid").unwrap().size(), 1);
        assert!(!pub_.stack.is_empty());
    }

    #[test]
    fn queue_macro_by_name_reports_missing_macro() {
        let pub_ = publisher();
        assert!(!pub_.queue_macro_by_name("nope", None));
    }

    #[tokio::test]
    async fn tick_executes_statements_in_order_and_runs_callbacks() {
        let pub_ = publisher();
        pub_.state.enable();
        let m = Macro::new("seq");
        m.push(Statement::event("a", Event::Stop, 0));
        m.push(Statement::event("b", Event::Halt, 0));
        pub_.insert_macro(m);
        pub_.queue_macro_by_name("seq", None);

        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = ran.clone();
        pub_.add_callback(Arc::new(move || {
            ran2.fetch_add(1, Ordering::SeqCst);
        }));

        for _ in 0..8 {
            pub_.tick().await;
        }
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert!(pub_.is_idle());
    }

    #[tokio::test]
    async fn load_macro_files_builds_macros_from_yaml() {
        let dir = tempfile_dir();
        std::fs::write(
            dir.join("avoid.yaml"),
            "name: avoid\ndescription: back off\nstatements:\n  - label: stop\n    event: STOP\n    duration_ms: 250\n",
        )
        .unwrap();
        let pub_ = publisher();
        let n = pub_.load_macro_files(dir.to_str().unwrap()).unwrap();
        assert_eq!(n, 1);
        let lib = pub_.library.lock();
        let m = lib.get("avoid").unwrap();
        assert_eq!(m.description, Some("back off".to_owned()));
        assert_eq!(m.size(), 1);
    }

    fn tempfile_dir() -> std::path::PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!(
            "kros-macro-test-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
