//! Serial decode: a `parse_path`/`open` pair that returns `Result`-based
//! configuration errors rather than panicking on a malformed connection
//! string.

use std::io::{BufRead, BufReader};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, warn};
use serial::prelude::*;
use serial::SystemPort;

use crate::bus::MessageBus;
use crate::component::{Component, ComponentState};
use crate::error::{Error, Result};
use crate::event::Event;
use crate::orient::Orientation;
use crate::tasks;

/// Which event family this link's tokens map onto — a connection carries
/// either bumper or infrared readings, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Bumper,
    Infrared,
}

impl LinkKind {
    fn event_for(self, orientation: Orientation) -> Option<Event> {
        // `PortSide`/`StbdSide` (the `paft`/`saft` aft sensor tokens) fold
        // onto the same port/starboard events as the midships sensors: the
        // event model has no separate fore/aft distinction, and is closed
        // at Port/Cntr/Stbd per group.
        match (self, orientation) {
            (LinkKind::Bumper, Orientation::Port | Orientation::PortSide) => {
                Some(Event::BumperPort)
            }
            (LinkKind::Bumper, Orientation::Cntr) => Some(Event::BumperCntr),
            (LinkKind::Bumper, Orientation::Stbd | Orientation::StbdSide) => {
                Some(Event::BumperStbd)
            }
            (LinkKind::Infrared, Orientation::Port | Orientation::PortSide) => {
                Some(Event::InfraredPort)
            }
            (LinkKind::Infrared, Orientation::Cntr) => Some(Event::InfraredCntr),
            (LinkKind::Infrared, Orientation::Stbd | Orientation::StbdSide) => {
                Some(Event::InfraredStbd)
            }
            _ => None,
        }
    }
}

/// Parses a `device:baud:charsize:parity:stopbits` connection string.
fn parse_path(
    path: &str,
) -> Result<(
    &str,
    serial::BaudRate,
    serial::CharSize,
    serial::Parity,
    serial::StopBits,
)> {
    let bad = |msg: String| Error::configuration(format!("serial connection string {path:?}: {msg}"));
    let mut sp = path.split(':');
    let port_dev = sp.next().ok_or_else(|| bad("missing device path".into()))?;
    let s_baud = sp.next().ok_or_else(|| bad("missing baud rate".into()))?;
    let s_char_size = sp.next().ok_or_else(|| bad("missing char size".into()))?;
    let s_parity = sp.next().ok_or_else(|| bad("missing parity".into()))?;
    let s_stop_bits = sp.next().ok_or_else(|| bad("missing stop bits".into()))?;

    let baud_rate = match s_baud {
        "110" => serial::Baud110,
        "300" => serial::Baud300,
        "600" => serial::Baud600,
        "1200" => serial::Baud1200,
        "2400" => serial::Baud2400,
        "4800" => serial::Baud4800,
        "9600" => serial::Baud9600,
        "19200" => serial::Baud19200,
        "38400" => serial::Baud38400,
        "57600" => serial::Baud57600,
        "115200" => serial::Baud115200,
        v => return Err(bad(format!("unsupported baud rate {v}"))),
    };
    let char_size = match s_char_size {
        "5" => serial::Bits5,
        "6" => serial::Bits6,
        "7" => serial::Bits7,
        "8" => serial::Bits8,
        v => return Err(bad(format!("unsupported char size {v}"))),
    };
    let parity = match s_parity {
        "N" => serial::ParityNone,
        "E" => serial::ParityEven,
        "O" => serial::ParityOdd,
        v => return Err(bad(format!("unsupported parity {v}"))),
    };
    let stop_bits = match s_stop_bits {
        "1" => serial::Stop1,
        "2" => serial::Stop2,
        v => return Err(bad(format!("unsupported stop bits {v}"))),
    };
    Ok((port_dev, baud_rate, char_size, parity, stop_bits))
}

fn open(path: &str, timeout: Duration) -> Result<SystemPort> {
    let (port_dev, baud_rate, char_size, parity, stop_bits) = parse_path(path)?;
    let mut port =
        serial::open(port_dev).map_err(|e| Error::DeviceNotFound(format!("{port_dev}: {e}")))?;
    port.reconfigure(&|settings| {
        settings.set_baud_rate(baud_rate)?;
        settings.set_char_size(char_size);
        settings.set_parity(parity);
        settings.set_stop_bits(stop_bits);
        settings.set_flow_control(serial::FlowNone);
        Ok(())
    })
    .map_err(|e| Error::configuration(format!("serial reconfigure failed: {e}")))?;
    port.set_timeout(timeout)
        .map_err(|e| Error::configuration(format!("serial set_timeout failed: {e}")))?;
    Ok(port)
}

/// A running serial boundary adapter: decodes `\n`-terminated
/// 4-character orientation tokens (`port`, `cntr`, `stbd`, `paft`, `mast`,
/// `saft`) and publishes the corresponding event onto the bus.
pub struct SerialLink {
    state: ComponentState,
    path: String,
    kind: LinkKind,
    timeout: Duration,
}

impl SerialLink {
    pub fn new(name: &str, path: &str, kind: LinkKind, timeout: Duration) -> Result<Self> {
        parse_path(path)?;
        Ok(Self {
            state: ComponentState::new(name, false, false),
            path: path.to_owned(),
            kind,
            timeout,
        })
    }

    /// Spawns the blocking read loop on a worker thread and bridges
    /// decoded tokens back to the bus over a bounded `async-channel` for
    /// crossing the blocking/async boundary.
    pub fn run(self: Arc<Self>, bus: Arc<MessageBus>) {
        let (tx, rx) = async_channel::bounded::<Event>(64);
        let worker = Arc::clone(&self);
        tasks::spawn_worker(&format!("serial-{}", self.state.name()), move || {
            worker.read_loop(&tx);
        });
        tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                bus.publish(event, None).await;
            }
        });
    }

    fn read_loop(&self, tx: &async_channel::Sender<Event>) {
        loop {
            if self.state.closed() {
                return;
            }
            let port = match open(&self.path, self.timeout) {
                Ok(p) => p,
                Err(e) => {
                    error!("serial-link {}: {e}, retrying in 1s", self.state.name());
                    std::thread::sleep(Duration::from_secs(1));
                    continue;
                }
            };
            let mut reader = BufReader::new(port);
            loop {
                if self.state.closed() {
                    return;
                }
                let mut line = String::new();
                match reader.read_line(&mut line) {
                    Ok(0) => {
                        warn!("serial-link {}: EOF, reconnecting", self.state.name());
                        break;
                    }
                    Ok(_) => self.decode_and_send(line.trim(), tx),
                    Err(e) => {
                        warn!(
                            "serial-link {}: read error {e}, reconnecting",
                            self.state.name()
                        );
                        break;
                    }
                }
            }
        }
    }

    fn decode_and_send(&self, token: &str, tx: &async_channel::Sender<Event>) {
        let Some(orientation) = Orientation::from_wire_token(token) else {
            debug!("serial-link {}: unrecognized token {token:?}", self.state.name());
            return;
        };
        let Some(event) = self.kind.event_for(orientation) else {
            debug!(
                "serial-link {}: no event mapping for {orientation}",
                self.state.name()
            );
            return;
        };
        if tx.try_send(event).is_err() {
            warn!(
                "serial-link {}: publish channel full, dropping {event:?}",
                self.state.name()
            );
        }
    }
}

impl Component for SerialLink {
    fn state(&self) -> &ComponentState {
        &self.state
    }
    fn classname(&self) -> &'static str {
        "SerialLink"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_path_rejects_missing_fields() {
        let err = parse_path("/dev/ttyUSB0:38400").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn parse_path_accepts_well_formed_string() {
        let (dev, _baud, _cs, _parity, _stop) =
            parse_path("/dev/ttyUSB0:38400:8:N:1").unwrap();
        assert_eq!(dev, "/dev/ttyUSB0");
    }

    #[test]
    fn bumper_kind_maps_wire_tokens_to_bumper_events() {
        assert_eq!(
            LinkKind::Bumper.event_for(Orientation::Port),
            Some(Event::BumperPort)
        );
        assert_eq!(
            LinkKind::Bumper.event_for(Orientation::StbdSide),
            Some(Event::BumperStbd)
        );
    }

    #[test]
    fn infrared_kind_maps_wire_tokens_to_infrared_events() {
        assert_eq!(
            LinkKind::Infrared.event_for(Orientation::Cntr),
            Some(Event::InfraredCntr)
        );
    }
}
