//! Binary wire protocol for the instrument.
//!
//! Two halves: outbound command frames ([`commands`]) and the inbound
//! fixed-size sample record ([`RawPoint`]). Everything here is pure byte
//! manipulation with explicit little-endian handling and bounds checks;
//! no I/O happens in this module.

pub mod commands;
mod raw_point;

pub use raw_point::{RAW_POINT_SIZE, RawPoint};
