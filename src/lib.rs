//! Vehicle-tracking telemetry firmware.
//!
//! Raw GPS sentences come in over UART, get decoded into a position fix,
//! classified by motion pattern, and uplinked through a SIM800-style cellular
//! modem as an HTTP request. Uplink cadence follows the motion pattern: a
//! vehicle driving straight reports once a minute, one mid-turn twice a
//! second.
//!
//! The moving parts are a handful of cooperating tasks (see [`pipeline`])
//! handshaking through a bit-signal group ([`event`]), with the modem dialect
//! and its retrying request/response engine in [`modem`]. Hardware access is
//! confined behind the traits in [`port`]; the `esp32` feature provides the
//! UART-backed implementations, the default host feature provides scripted
//! ones for tests ([`mock`]).

#![cfg_attr(not(feature = "std"), no_std)]

mod fmt;

pub mod config;
pub mod event;
pub mod gnss;
pub mod modem;
pub mod pipeline;
pub mod port;
pub mod rate;

#[cfg(feature = "native-testing")]
pub mod mock;
