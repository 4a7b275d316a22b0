//! Event and Payload/Message model.

use crate::orient::{Direction, Speed};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A coarse filter tag so subscribers can accept whole families of events
/// cheaply ⇔ event.group ∈ my_groups ∨ event ∈
/// my_events`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Group {
    System,
    Lambda,
    Clock,
    Bumper,
    Infrared,
    Velocity,
    Chadburn,
    Theta,
    Stop,
    Macro,
    Experiment,
    Other,
}

/// A closed enumeration of events, totally ordered by `(priority, id)`.
/// Lower priority number sorts first (wins arbitration).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// Marks a macro statement carrying a callable rather than a
    /// publishable event.
    Lambda,
    ClockTick,
    ClockTock,
    BumperPort,
    BumperCntr,
    BumperStbd,
    InfraredPort,
    InfraredCntr,
    InfraredStbd,
    VelocityIncPort,
    VelocityDecPort,
    VelocityIncStbd,
    VelocityDecStbd,
    VelocityIncBoth,
    VelocityDecBoth,
    FullAhead,
    ThreeQuarterAhead,
    HalfAhead,
    SlowAhead,
    DeadSlowAhead,
    ChadburnStop,
    DeadSlowAstern,
    SlowAstern,
    HalfAstern,
    ThreeQuarterAstern,
    FullAstern,
    ThetaEven,
    SpinPort,
    SpinStbd,
    Stop,
    Halt,
    Brake,
    Macro,
    Experiment,
    Other,
}

impl Event {
    /// Stable numeric id, used as the ordering tiebreak. Declaration order
    /// doubles as the id space so it never needs to be hand-maintained.
    #[must_use]
    pub fn id(self) -> u16 {
        self as u16
    }

    #[must_use]
    pub fn group(self) -> Group {
        use Event::*;
        match self {
            Lambda => Group::Lambda,
            ClockTick | ClockTock => Group::Clock,
            BumperPort | BumperCntr | BumperStbd => Group::Bumper,
            InfraredPort | InfraredCntr | InfraredStbd => Group::Infrared,
            VelocityIncPort | VelocityDecPort | VelocityIncStbd | VelocityDecStbd
            | VelocityIncBoth | VelocityDecBoth => Group::Velocity,
            FullAhead | ThreeQuarterAhead | HalfAhead | SlowAhead | DeadSlowAhead
            | ChadburnStop | DeadSlowAstern | SlowAstern | HalfAstern | ThreeQuarterAstern
            | FullAstern => Group::Chadburn,
            ThetaEven | SpinPort | SpinStbd => Group::Theta,
            Stop | Halt | Brake => Group::Stop,
            Macro => Group::Macro,
            Experiment => Group::Experiment,
            Other => Group::Other,
        }
    }

    /// Lower number = higher priority. System/stop events preempt
    /// everything; clock ticks and macro playback sit in the middle;
    /// diagnostics trail behind.
    #[must_use]
    pub fn priority(self) -> i32 {
        match self.group() {
            Group::Stop => 0,
            Group::Bumper => 1,
            Group::Infrared => 2,
            Group::Chadburn => 3,
            Group::Theta => 3,
            Group::Velocity => 4,
            Group::Clock => 5,
            Group::Macro => 6,
            Group::Lambda => 6,
            Group::System => 7,
            Group::Other => 8,
            Group::Experiment => 9,
        }
    }

    #[must_use]
    pub fn is_lambda(self) -> bool {
        matches!(self, Event::Lambda)
    }

    /// Parses the `SCREAMING_SNAKE_CASE` wire/config name used in macro YAML
    /// files back into an `Event`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        use Event::*;
        Some(match name {
            "LAMBDA" => Lambda,
            "CLOCK_TICK" => ClockTick,
            "CLOCK_TOCK" => ClockTock,
            "BUMPER_PORT" => BumperPort,
            "BUMPER_CNTR" => BumperCntr,
            "BUMPER_STBD" => BumperStbd,
            "INFRARED_PORT" => InfraredPort,
            "INFRARED_CNTR" => InfraredCntr,
            "INFRARED_STBD" => InfraredStbd,
            "VELOCITY_INC_PORT" => VelocityIncPort,
            "VELOCITY_DEC_PORT" => VelocityDecPort,
            "VELOCITY_INC_STBD" => VelocityIncStbd,
            "VELOCITY_DEC_STBD" => VelocityDecStbd,
            "VELOCITY_INC_BOTH" => VelocityIncBoth,
            "VELOCITY_DEC_BOTH" => VelocityDecBoth,
            "FULL_AHEAD" => FullAhead,
            "THREE_QUARTER_AHEAD" => ThreeQuarterAhead,
            "HALF_AHEAD" => HalfAhead,
            "SLOW_AHEAD" => SlowAhead,
            "DEAD_SLOW_AHEAD" => DeadSlowAhead,
            "CHADBURN_STOP" => ChadburnStop,
            "DEAD_SLOW_ASTERN" => DeadSlowAstern,
            "SLOW_ASTERN" => SlowAstern,
            "HALF_ASTERN" => HalfAstern,
            "THREE_QUARTER_ASTERN" => ThreeQuarterAstern,
            "FULL_ASTERN" => FullAstern,
            "THETA_EVEN" => ThetaEven,
            "SPIN_PORT" => SpinPort,
            "SPIN_STBD" => SpinStbd,
            "STOP" => Stop,
            "HALT" => Halt,
            "BRAKE" => Brake,
            "MACRO" => Macro,
            "EXPERIMENT" => Experiment,
            "OTHER" => Other,
            _ => return None,
        })
    }

    /// Maps a Chadburn event to the `(Direction, Speed)` pair the motor
    /// controller consumes. Returns `None` for events
    /// outside the Chadburn group.
    #[must_use]
    pub fn chadburn(self) -> Option<(Direction, Speed)> {
        use Event::*;
        Some(match self {
            FullAhead => (Direction::Ahead, Speed::Full),
            ThreeQuarterAhead => (Direction::Ahead, Speed::ThreeQuarter),
            HalfAhead => (Direction::Ahead, Speed::Half),
            SlowAhead => (Direction::Ahead, Speed::Slow),
            DeadSlowAhead => (Direction::Ahead, Speed::DeadSlow),
            ChadburnStop => (Direction::Ahead, Speed::Stop),
            DeadSlowAstern => (Direction::Astern, Speed::DeadSlow),
            SlowAstern => (Direction::Astern, Speed::Slow),
            HalfAstern => (Direction::Astern, Speed::Half),
            ThreeQuarterAstern => (Direction::Astern, Speed::ThreeQuarter),
            FullAstern => (Direction::Astern, Speed::Full),
            _ => return None,
        })
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority()
            .cmp(&other.priority())
            .then_with(|| self.id().cmp(&other.id()))
    }
}

/// The scalar (or tuple) a message carries: distance in cm, velocity
/// setpoint, direction+speed tuple, or a timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Distance(f64),
    Velocity(f64),
    DirectionSpeed(Direction, Speed),
    DurationMs(u64),
}

static NEXT_MESSAGE_ID: AtomicU64 = AtomicU64::new(1);

/// A message envelope. Carries the subscriber ack bookkeeping
/// that lets the bus deliver each message exactly once per interested
/// subscriber even though it may traverse the queue repeatedly.
#[derive(Debug)]
pub struct Message {
    id: u64,
    created_at: Instant,
    pub event: Event,
    pub value: Option<Value>,
    expired: AtomicBool,
    /// Every subscriber registered with the bus at creation time; a message
    /// is fully acked once every name here has acked at least once.
    required: HashSet<String>,
    acked: Mutex<HashSet<String>>,
}

impl Message {
    #[must_use]
    pub fn new(event: Event, value: Option<Value>, subscribers: &[String]) -> Self {
        Self {
            id: NEXT_MESSAGE_ID.fetch_add(1, AtomicOrdering::Relaxed),
            created_at: Instant::now(),
            event,
            value,
            expired: AtomicBool::new(false),
            required: subscribers.iter().cloned().collect(),
            acked: Mutex::new(HashSet::new()),
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    #[must_use]
    pub fn expired(&self) -> bool {
        self.expired.load(AtomicOrdering::Acquire)
    }

    /// Once set, `expired` never clears: a message's age is monotonic, so
    /// once `expired` is true it stays true.
    pub fn set_expired(&self) {
        self.expired.store(true, AtomicOrdering::Release);
    }

    #[must_use]
    pub fn is_expired(&self, max_age_ms: u64) -> bool {
        self.expired() || self.age() > Duration::from_millis(max_age_ms)
    }

    /// Records that `subscriber` has acknowledged this message at least
    /// once. Safe to call repeatedly.
    pub fn ack(&self, subscriber: &str) {
        self.acked.lock().unwrap().insert(subscriber.to_owned());
    }

    #[must_use]
    pub fn acked_by(&self, subscriber: &str) -> bool {
        self.acked.lock().unwrap().contains(subscriber)
    }

    /// True once every subscriber named at creation time has acked.
    #[must_use]
    pub fn fully_acked(&self) -> bool {
        let acked = self.acked.lock().unwrap();
        self.required.iter().all(|s| acked.contains(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_order_by_priority_then_id() {
        assert!(Event::Halt < Event::ClockTick);
        assert!(Event::BumperPort < Event::InfraredPort);
        assert!(Event::FullAhead < Event::VelocityIncPort);
    }

    #[test]
    fn from_name_roundtrips_known_names() {
        assert_eq!(Event::from_name("BUMPER_PORT"), Some(Event::BumperPort));
        assert_eq!(Event::from_name("HALT"), Some(Event::Halt));
        assert_eq!(Event::from_name("NOT_AN_EVENT"), None);
    }

    #[test]
    fn chadburn_maps_to_direction_speed() {
        assert_eq!(
            Event::FullAstern.chadburn(),
            Some((Direction::Astern, Speed::Full))
        );
        assert_eq!(Event::ClockTick.chadburn(), None);
    }

    #[test]
    fn message_is_fully_acked_once_every_subscriber_has_acked() {
        let subs = vec!["a".to_owned(), "b".to_owned()];
        let m = Message::new(Event::BumperPort, None, &subs);
        assert!(!m.fully_acked());
        m.ack("a");
        assert!(!m.fully_acked());
        m.ack("b");
        assert!(m.fully_acked());
    }

    #[test]
    fn expiry_is_monotonic() {
        let m = Message::new(Event::Other, None, &[]);
        assert!(!m.expired());
        m.set_expired();
        assert!(m.expired());
        assert!(m.is_expired(u64::MAX));
    }
}
