//! The async message bus, grounded on `message_bus.py`: a
//! single pending-event queue, fed by publishers and drained by a
//! single-threaded consume loop that fans each message out to every
//! accepting, active subscriber.

use std::sync::Arc;

use log::{debug, trace, warn};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::{sleep, Duration};

use crate::component::{Component, ComponentState};
use crate::config::MessageBusConfig;
use crate::event::{Event, Message, Value};
use crate::queue::PeekableQueue;

/// Anything that can publish onto the bus. The trait itself carries no
/// behavior beyond a name; publishing happens through [`MessageBus::publish`].
pub trait Publisher: Send + Sync {
    fn name(&self) -> &str;
}

/// A bus subscriber. `accepts` is the coarse filter
/// (`event.group ∈ my_groups ∨ event ∈ my_events`); `on_message` is called
/// synchronously from the consume loop, once per accepted message, and must
/// not block.
pub trait Subscriber: Send + Sync {
    fn name(&self) -> &str;
    fn accepts(&self, event: Event) -> bool;
    fn on_message(&self, message: &Message);

    /// True only for the bus's own [`CleanupSink`], which every dispatch
    /// pass visits last: it never accepts an event for processing, it only
    /// decides whether a message is done.
    fn is_cleanup_sink(&self) -> bool {
        false
    }
}

/// The cleanup/sink subscriber from spec §3/§4.3/§4.4: discards a message
/// once every other subscriber has acked it, or re-publishes it if some
/// required subscriber has not. Registered internally by every
/// [`MessageBus`] and always dispatched last in a pass, so it is the one
/// place a message's lifetime actually ends.
pub struct CleanupSink {
    name: String,
}

impl CleanupSink {
    fn new() -> Self {
        Self {
            name: "cleanup".to_owned(),
        }
    }
}

impl Subscriber for CleanupSink {
    fn name(&self) -> &str {
        &self.name
    }
    fn accepts(&self, _event: Event) -> bool {
        false
    }
    fn on_message(&self, _message: &Message) {}
    fn is_cleanup_sink(&self) -> bool {
        true
    }
}

/// Subscribers are dispatched in registration order (documented in
/// DESIGN.md as a deliberate simplification over reverse-of-registration
/// order, since only *a* consistent order is required).
pub struct MessageBus {
    state: ComponentState,
    config: MessageBusConfig,
    queue: PeekableQueue<Arc<Message>>,
    subscribers: Mutex<Vec<Arc<dyn Subscriber>>>,
    publishers: Mutex<Vec<Arc<dyn Publisher>>>,
    cleanup: Arc<CleanupSink>,
    shutdown: Notify,
}

impl MessageBus {
    #[must_use]
    pub fn new(config: MessageBusConfig) -> Self {
        Self {
            state: ComponentState::new("message-bus", false, false),
            config,
            queue: PeekableQueue::new(),
            subscribers: Mutex::new(Vec::new()),
            publishers: Mutex::new(Vec::new()),
            cleanup: Arc::new(CleanupSink::new()),
            shutdown: Notify::new(),
        }
    }

    pub fn add_publisher(&self, publisher: Arc<dyn Publisher>) {
        self.publishers.lock().push(publisher);
    }

    pub fn add_subscriber(&self, subscriber: Arc<dyn Subscriber>) {
        self.subscribers.lock().push(subscriber);
    }

    /// Names of every currently-active subscriber, snapshotted at message
    /// creation time to build the message's required-ack set.
    fn active_subscriber_names(&self) -> Vec<String> {
        self.subscribers
            .lock()
            .iter()
            .filter(|s| true_or_not_inactive(s))
            .map(|s| s.name().to_owned())
            .collect()
    }

    /// Publishes an event onto the bus. A no-op once the bus is closed.
    pub async fn publish(&self, event: Event, value: Option<Value>) {
        if self.state.closed() {
            warn!("message-bus: dropping publish of {event:?}, bus is closed");
            return;
        }
        if self.config.clip_event_list && self.queue.len().await >= self.config.clip_length {
            let dropped = self.queue.get().await;
            debug!(
                "message-bus: queue at clip_length {}, dropping oldest message {}",
                self.config.clip_length,
                dropped.id()
            );
        }
        let subs = self.active_subscriber_names();
        let message = Arc::new(Message::new(event, value, &subs));
        trace!("message-bus: publish {event:?} as message {}", message.id());
        self.queue.put(message).await;
    }

    pub fn initiate_shutdown(&self) {
        self.state.close();
        self.shutdown.notify_waiters();
    }

    /// Runs the consume loop until the bus is closed. Each iteration pops
    /// the head message, dispatches it to every active subscriber — an
    /// accepting subscriber processes it, a non-accepting one just marks it
    /// passed-through — then hands it to the [`CleanupSink`] to discard or
    /// re-publish per spec §4.4 rule 1/3.
    pub async fn run(&self) {
        self.state.enable();
        loop {
            let shutdown = self.shutdown.notified();
            tokio::select! {
                biased;
                () = shutdown => {
                    debug!("message-bus: shutdown requested, consume loop exiting");
                    break;
                }
                message = self.queue.get() => {
                    self.dispatch(&message).await;
                }
            }
            if self.config.publish_delay_sec > 0.0 {
                sleep(Duration::from_secs_f64(self.config.publish_delay_sec)).await;
            }
        }
    }

    /// Dispatch rule per spec §4.4 rule 2/3: an accepting subscriber
    /// processes the message and acks it; a non-accepting one still acks
    /// it, to record that it passed through. The cleanup sink runs last and
    /// is the only subscriber that ever removes a message for good.
    async fn dispatch(&self, message: &Arc<Message>) {
        if message.is_expired(self.config.max_age_ms) {
            message.set_expired();
            warn!(
                "message-bus: message {} ({:?}) expired before dispatch, dropping",
                message.id(),
                message.event
            );
            return;
        }
        let subs: Vec<Arc<dyn Subscriber>> = self.subscribers.lock().clone();
        for sub in subs {
            if sub.accepts(message.event) {
                sub.on_message(message);
            }
            message.ack(sub.name());
        }
        if message.fully_acked() {
            trace!(
                "message-bus: message {} fully acked, {} discarding",
                message.id(),
                self.cleanup.name()
            );
        } else {
            warn!(
                "message-bus: message {} not fully acked, {} re-publishing",
                message.id(),
                self.cleanup.name()
            );
            self.queue.put(Arc::clone(message)).await;
        }
    }

    #[must_use]
    pub async fn pending(&self) -> usize {
        self.queue.len().await
    }

    #[must_use]
    pub fn subscriber_names(&self) -> Vec<String> {
        self.subscribers
            .lock()
            .iter()
            .map(|s| s.name().to_owned())
            .collect()
    }
}

fn true_or_not_inactive(_s: &Arc<dyn Subscriber>) -> bool {
    // Subscribers currently expose no enable/disable state of their own
    // distinct from bus membership; placeholder seam for a future
    // Component-backed subscriber that can suppress itself without
    // unregistering.
    true
}

impl Component for MessageBus {
    fn state(&self) -> &ComponentState {
        &self.state
    }
    fn classname(&self) -> &'static str {
        "MessageBus"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSubscriber {
        name: String,
        group: Event,
        count: AtomicUsize,
    }

    impl Subscriber for CountingSubscriber {
        fn name(&self) -> &str {
            &self.name
        }
        fn accepts(&self, event: Event) -> bool {
            event.group() == self.group.group()
        }
        fn on_message(&self, _message: &Message) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn accepting_subscriber_receives_and_acks() {
        let bus = MessageBus::new(MessageBusConfig::default());
        let sub = Arc::new(CountingSubscriber {
            name: "counter".to_owned(),
            group: Event::BumperPort,
            count: AtomicUsize::new(0),
        });
        bus.add_subscriber(sub.clone());
        bus.publish(Event::BumperCntr, None).await;
        let msg = bus.queue.get().await;
        bus.dispatch(&msg).await;
        assert_eq!(sub.count.load(Ordering::SeqCst), 1);
        assert!(msg.fully_acked());
    }

    #[tokio::test]
    async fn non_accepting_subscriber_is_skipped_but_still_acks() {
        let bus = MessageBus::new(MessageBusConfig::default());
        let sub = Arc::new(CountingSubscriber {
            name: "counter".to_owned(),
            group: Event::BumperPort,
            count: AtomicUsize::new(0),
        });
        bus.add_subscriber(sub.clone());
        bus.publish(Event::ClockTick, None).await;
        let msg = bus.queue.get().await;
        bus.dispatch(&msg).await;
        assert_eq!(sub.count.load(Ordering::SeqCst), 0);
        // S6: an uninterested subscriber still acks, marking it passed
        // through, so the cleanup sink can retire the message.
        assert!(msg.acked_by("counter"));
    }

    #[tokio::test]
    async fn closed_bus_drops_published_messages() {
        let bus = MessageBus::new(MessageBusConfig::default());
        bus.initiate_shutdown();
        bus.publish(Event::Halt, None).await;
        assert_eq!(bus.pending().await, 0);
    }

    /// S2/S6: a message fully acked after one dispatch pass (one interested
    /// subscriber processes it, one uninterested one passes it through) is
    /// discarded by the cleanup sink rather than re-queued.
    #[tokio::test]
    async fn cleanup_sink_discards_a_fully_acked_message() {
        let bus = MessageBus::new(MessageBusConfig::default());
        let interested = Arc::new(CountingSubscriber {
            name: "bumper-port".to_owned(),
            group: Event::BumperPort,
            count: AtomicUsize::new(0),
        });
        let uninterested = Arc::new(CountingSubscriber {
            name: "infrared-cntr".to_owned(),
            group: Event::InfraredCntr,
            count: AtomicUsize::new(0),
        });
        bus.add_subscriber(interested.clone());
        bus.add_subscriber(uninterested.clone());
        bus.publish(Event::BumperPort, None).await;
        bus.dispatch(&bus.queue.get().await).await;

        assert_eq!(interested.count.load(Ordering::SeqCst), 1);
        assert_eq!(uninterested.count.load(Ordering::SeqCst), 0);
        assert_eq!(bus.pending().await, 0);
    }

    /// A message whose required-ack set names a subscriber no longer
    /// present after construction is re-published by the cleanup sink
    /// instead of silently vanishing.
    #[tokio::test]
    async fn cleanup_sink_republishes_a_message_missing_an_ack() {
        let bus = MessageBus::new(MessageBusConfig::default());
        let msg = Arc::new(Message::new(
            Event::BumperPort,
            None,
            &["never-registered".to_owned()],
        ));
        bus.dispatch(&msg).await;
        assert_eq!(bus.pending().await, 1);
    }
}
