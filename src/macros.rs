//! Macro data model: statements, macros, and the macro
//! library. Grounded on `core/macro.py`/`core/macro_library.py`'s "named,
//! ordered queue of statements" shape, reusing [`crate::dequeue::DeQueue`]
//! for both the per-macro statement queue and the macro publisher's stack of
//! queued macros.
//!
//! `macro` is a Rust keyword, hence the module name `macros`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::dequeue::{DeQueue, Mode};
use crate::event::{Event, Message, Value};
use crate::orient::{Direction, Speed};

/// A macro statement's optional arguments: either a raw duration
/// or a domain-specific (Direction, Speed) pair, as used by chadburn-style
/// statements that carry their own speed distinct from the statement's
/// playback duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arguments {
    DurationMs(u64),
    DirectionSpeed(Direction, Speed),
}

/// A callable statement body. Shared by reference — cloning a `Statement`
/// clones the `Arc`, not the closure: callables are shared by reference,
/// and lambdas are immutable in intent.
pub type Callable = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone)]
pub enum StatementBody {
    Event(Event),
    Callable(Callable),
}

impl fmt::Debug for StatementBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatementBody::Event(e) => write!(f, "Event({e:?})"),
            StatementBody::Callable(_) => write!(f, "Callable(..)"),
        }
    }
}

impl PartialEq for StatementBody {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (StatementBody::Event(a), StatementBody::Event(b)) => a == b,
            (StatementBody::Callable(a), StatementBody::Callable(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Immutable statement record. Equality is `(label, duration,
/// event, callable identity)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub label: String,
    pub body: StatementBody,
    pub arguments: Option<Arguments>,
    pub duration_ms: u64,
}

impl Statement {
    #[must_use]
    pub fn event(label: impl Into<String>, event: Event, duration_ms: u64) -> Self {
        Self {
            label: label.into(),
            body: StatementBody::Event(event),
            arguments: None,
            duration_ms,
        }
    }

    #[must_use]
    pub fn event_with_arguments(
        label: impl Into<String>,
        event: Event,
        arguments: Arguments,
        duration_ms: u64,
    ) -> Self {
        Self {
            label: label.into(),
            body: StatementBody::Event(event),
            arguments: Some(arguments),
            duration_ms,
        }
    }

    #[must_use]
    pub fn callable(label: impl Into<String>, callable: Callable, duration_ms: u64) -> Self {
        Self {
            label: label.into(),
            body: StatementBody::Callable(callable),
            arguments: None,
            duration_ms,
        }
    }

    #[must_use]
    pub fn is_lambda(&self) -> bool {
        matches!(self.body, StatementBody::Callable(_))
    }

    #[must_use]
    pub fn event_value(&self) -> Option<Event> {
        match &self.body {
            StatementBody::Event(e) => Some(*e),
            StatementBody::Callable(_) => None,
        }
    }
}

/// What a completed macro publishes, if anything: its attached payload,
/// republished once the macro finishes.
#[derive(Clone)]
pub enum MacroPayload {
    /// A full message to be republished as-is.
    Message(Arc<Message>),
    /// A raw (event, value) pair to be wrapped and dispatched.
    Raw(Event, Option<Value>),
}

/// Named, ordered queue of statements. Macros are deep-copied out
/// of the library before execution, so `Clone` here is
/// always a genuine value copy, never a shared reference.
#[derive(Clone)]
pub struct Macro {
    pub name: String,
    pub description: Option<String>,
    statements: DeQueue<Statement>,
    pub payload: Option<MacroPayload>,
}

impl Macro {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            statements: DeQueue::new(Mode::Fifo),
            payload: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: MacroPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn push(&self, statement: Statement) {
        self.statements.push(statement);
    }

    pub fn poll(&self) -> Option<Statement> {
        self.statements.pop()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.statements.len()
    }

    #[must_use]
    pub fn statements(&self) -> Vec<Statement> {
        self.statements.to_vec()
    }

    /// Deep-copies this macro: a distinct statement queue with identical
    /// contents and a distinct `Macro` identity. The statements' callables
    /// remain shared `Arc`s.
    #[must_use]
    pub fn deep_clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            description: self.description.clone(),
            statements: self.statements.deep_clone(),
            payload: self.payload.clone(),
        }
    }
}

impl PartialEq for Macro {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.description == other.description
            && self.statements == other.statements
    }
}

/// Name → macro library. Re-inserting a name overwrites the prior
/// entry; iteration preserves insertion order.
#[derive(Default)]
pub struct MacroLibrary {
    order: Vec<String>,
    entries: HashMap<String, Macro>,
}

impl MacroLibrary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites the macro named `m.name`.
    pub fn insert(&mut self, m: Macro) {
        if !self.entries.contains_key(&m.name) {
            self.order.push(m.name.clone());
        }
        self.entries.insert(m.name.clone(), m);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Macro> {
        self.entries.get(name)
    }

    /// Deep-copies the named macro for the caller to queue for execution,
    /// leaving the library's own copy untouched.
    #[must_use]
    pub fn deep_copy(&self, name: &str) -> Option<Macro> {
        self.entries.get(name).map(Macro::deep_clone)
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.order
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
