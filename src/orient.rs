//! Navigation/orientation enums, grounded on `core/orient.py`.

use std::fmt;

/// A motor or sensor orientation tag. The `label` is the 4-character token
/// used both in log output and in the serial wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orientation {
    None,
    Both,
    Port,
    Cntr,
    Stbd,
    PortSide,
    StbdSide,
}

impl Orientation {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Orientation::None => "none",
            Orientation::Both => "both",
            Orientation::Port => "port",
            Orientation::Cntr => "cntr",
            Orientation::Stbd => "stbd",
            Orientation::PortSide => "psid",
            Orientation::StbdSide => "ssid",
        }
    }

    /// Parses one of the 4-character wire tokens: `port`, `cntr`, `stbd`,
    /// `paft`, `mast`, `saft`.
    #[must_use]
    pub fn from_wire_token(token: &str) -> Option<Self> {
        match token {
            "port" => Some(Orientation::Port),
            "cntr" | "mast" => Some(Orientation::Cntr),
            "stbd" => Some(Orientation::Stbd),
            "paft" => Some(Orientation::PortSide),
            "saft" => Some(Orientation::StbdSide),
            _ => None,
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Direction of travel, paired with [`Speed`] to form a Chadburn command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Ahead,
    Astern,
}

impl Direction {
    #[must_use]
    pub fn sign(self) -> f64 {
        match self {
            Direction::Ahead => 1.0,
            Direction::Astern => -1.0,
        }
    }
}

/// A discrete ship-telegraph-style speed setting, as dispatched by a
/// chadburn event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Speed {
    Stop,
    DeadSlow,
    Slow,
    Half,
    TwoThirds,
    ThreeQuarter,
    Full,
    Emergency,
    Maximum,
}

impl Speed {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Speed::Stop => "stop",
            Speed::DeadSlow => "dead slow",
            Speed::Slow => "slow",
            Speed::Half => "half speed",
            Speed::TwoThirds => "two third speed",
            Speed::ThreeQuarter => "three quarter speed",
            Speed::Full => "full speed",
            Speed::Emergency => "emergency speed",
            Speed::Maximum => "maximum speed",
        }
    }

    /// Magnitude in the robot's velocity units, 0.0-100.000001.
    #[must_use]
    pub fn value(self) -> f64 {
        match self {
            Speed::Stop => 0.0,
            Speed::DeadSlow => 20.0,
            Speed::Slow => 30.0,
            Speed::Half => 50.0,
            Speed::TwoThirds => 66.7,
            Speed::ThreeQuarter => 75.0,
            Speed::Full => 90.0,
            Speed::Emergency => 100.0,
            Speed::Maximum => 100.000_001,
        }
    }

    /// Returns the next slower speed than `value`, for deceleration ramps.
    #[must_use]
    pub fn slower_than(value: f64) -> Self {
        if value < Speed::DeadSlow.value() {
            Speed::Stop
        } else if value < Speed::Slow.value() {
            Speed::DeadSlow
        } else if value < Speed::Half.value() {
            Speed::Slow
        } else if value < Speed::TwoThirds.value() {
            Speed::Half
        } else if value < Speed::ThreeQuarter.value() {
            Speed::TwoThirds
        } else if value < Speed::Full.value() {
            Speed::ThreeQuarter
        } else {
            Speed::Full
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_tokens_roundtrip_to_orientation() {
        assert_eq!(Orientation::from_wire_token("port"), Some(Orientation::Port));
        assert_eq!(Orientation::from_wire_token("stbd"), Some(Orientation::Stbd));
        assert_eq!(Orientation::from_wire_token("bogus"), None);
    }

    #[test]
    fn slower_than_steps_down_one_tier() {
        assert_eq!(Speed::slower_than(95.0), Speed::Full);
        assert_eq!(Speed::slower_than(10.0), Speed::Stop);
    }
}
