//! Priority arbitration, grounded on `core/controller.py`'s
//! priority queue but generalized so the popped payload dispatches to every
//! registered controller instead of just one.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::component::{Component, ComponentState};
use crate::event::{Event, Value};

pub trait Controller: Send + Sync {
    fn name(&self) -> &str;
    fn handle(&self, event: Event, value: Option<Value>);
}

struct HeapItem {
    priority: i32,
    seq: u64,
    event: Event,
    value: Option<Value>,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// `BinaryHeap` is a max-heap; reversed here so the lowest `priority`
/// (highest urgency) pops first, and among equal priorities the
/// earliest-submitted item pops first.
impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A min-heap of pending events keyed by `(priority, insertion order)`,
/// fanning each popped event out to every registered controller:
/// arbitration does not pick a single winning controller, it picks a
/// single winning event.
pub struct Arbitrator {
    state: ComponentState,
    heap: Mutex<BinaryHeap<HeapItem>>,
    controllers: Mutex<Vec<Arc<dyn Controller>>>,
    seq: AtomicU64,
}

impl Default for Arbitrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Arbitrator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ComponentState::new("arbitrator", false, true),
            heap: Mutex::new(BinaryHeap::new()),
            controllers: Mutex::new(Vec::new()),
            seq: AtomicU64::new(0),
        }
    }

    pub fn register_controller(&self, controller: Arc<dyn Controller>) {
        self.controllers.lock().push(controller);
    }

    /// Dropped while suppressed: a suppressed arbitrator never delivers a
    /// payload whose owning component is suppressed, and that starts at the
    /// point of submission.
    pub fn submit(&self, event: Event, value: Option<Value>) {
        if self.state.suppressed() {
            debug!("arbitrator: suppressed, dropping submitted event {event:?}");
            return;
        }
        let seq = self.seq.fetch_add(1, AtomicOrdering::Relaxed);
        self.heap.lock().push(HeapItem {
            priority: event.priority(),
            seq,
            event,
            value,
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }

    /// Pops the highest-priority pending event and calls every registered
    /// controller's `handle`. Returns `false` if the heap was empty or the
    /// arbitrator is suppressed.
    pub fn dispatch_next(&self) -> bool {
        if self.state.suppressed() {
            return false;
        }
        let item = self.heap.lock().pop();
        let Some(item) = item else {
            return false;
        };
        let controllers = self.controllers.lock().clone();
        for controller in controllers {
            controller.handle(item.event, item.value);
        }
        true
    }

    pub fn enable(&self) -> bool {
        self.state.enable()
    }

    pub fn disable(&self) -> bool {
        self.state.disable()
    }

    /// Clears any already-queued payloads on entry: a suppressed arbitrator
    /// holds nothing pending for later release.
    pub fn suppress(&self) -> bool {
        self.heap.lock().clear();
        self.state.suppress()
    }

    pub fn release(&self) -> bool {
        self.state.release()
    }

    pub fn close(&self) -> bool {
        self.state.close()
    }
}

impl Component for Arbitrator {
    fn state(&self) -> &ComponentState {
        &self.state
    }
    fn classname(&self) -> &'static str {
        "Arbitrator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct RecordingController {
        name: String,
        seen: StdMutex<Vec<Event>>,
    }

    impl Controller for RecordingController {
        fn name(&self) -> &str {
            &self.name
        }
        fn handle(&self, event: Event, _value: Option<Value>) {
            self.seen.lock().unwrap().push(event);
        }
    }

    #[test]
    fn pops_lowest_priority_first() {
        let arb = Arbitrator::new();
        arb.submit(Event::ClockTick, None); // priority 5
        arb.submit(Event::Halt, None); // priority 0
        arb.submit(Event::BumperPort, None); // priority 1

        let rec = Arc::new(RecordingController {
            name: "r".to_owned(),
            seen: StdMutex::new(Vec::new()),
        });
        arb.register_controller(rec.clone());

        assert!(arb.dispatch_next());
        assert!(arb.dispatch_next());
        assert!(arb.dispatch_next());
        assert!(!arb.dispatch_next());

        assert_eq!(
            *rec.seen.lock().unwrap(),
            vec![Event::Halt, Event::BumperPort, Event::ClockTick]
        );
    }

    #[test]
    fn ties_resolve_by_insertion_order() {
        let arb = Arbitrator::new();
        arb.submit(Event::BumperPort, None);
        arb.submit(Event::BumperCntr, None);
        arb.submit(Event::BumperStbd, None);

        let rec = Arc::new(RecordingController {
            name: "r".to_owned(),
            seen: StdMutex::new(Vec::new()),
        });
        arb.register_controller(rec.clone());
        while arb.dispatch_next() {}

        assert_eq!(
            *rec.seen.lock().unwrap(),
            vec![Event::BumperPort, Event::BumperCntr, Event::BumperStbd]
        );
    }

    #[test]
    fn dispatch_reaches_every_registered_controller() {
        let arb = Arbitrator::new();
        arb.submit(Event::Stop, None);
        let a = Arc::new(RecordingController {
            name: "a".to_owned(),
            seen: StdMutex::new(Vec::new()),
        });
        let b = Arc::new(RecordingController {
            name: "b".to_owned(),
            seen: StdMutex::new(Vec::new()),
        });
        arb.register_controller(a.clone());
        arb.register_controller(b.clone());
        assert!(arb.dispatch_next());
        assert_eq!(a.seen.lock().unwrap().len(), 1);
        assert_eq!(b.seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn suppressed_arbitrator_drops_submitted_events() {
        let arb = Arbitrator::new();
        arb.suppress();
        arb.submit(Event::Halt, None);
        assert!(arb.is_empty());
        assert!(!arb.dispatch_next());
    }

    #[test]
    fn suppress_clears_already_queued_payloads() {
        let arb = Arbitrator::new();
        arb.submit(Event::Halt, None);
        arb.submit(Event::BumperPort, None);
        assert_eq!(arb.len(), 2);
        arb.suppress();
        assert!(arb.is_empty());
    }

    #[test]
    fn release_after_suppress_resumes_normal_dispatch() {
        let arb = Arbitrator::new();
        arb.suppress();
        arb.submit(Event::Halt, None);
        assert!(arb.is_empty());
        arb.release();
        arb.submit(Event::Halt, None);
        assert_eq!(arb.len(), 1);
        assert!(arb.dispatch_next());
    }
}
