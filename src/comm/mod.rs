//! Serial boundary. This crate talks to exactly one kind of external
//! device — the bumper/IR messenger microcontroller — so the module is a
//! single `SerialLink` rather than a broader `Comm` trait hierarchy (TCP
//! register links have no counterpart here and are not carried over).

#[cfg(feature = "serial-link")]
pub mod serial;

#[cfg(feature = "serial-link")]
pub use serial::SerialLink;
