//! UM6 inertial/GPS sensor driver daemon.
//!
//! Talks to a UM6 orientation sensor over a serial port, runs its startup
//! configuration, and republishes every broadcast burst as framed
//! telemetry messages over TCP. A second TCP endpoint accepts reset
//! requests that are serviced on the serial link between bursts.

pub mod comms;
pub mod config;
pub mod configure;
pub mod dispatch;
pub mod error;
pub mod registers;
pub mod session;
pub mod streaming;
pub mod transform;
pub mod transport;

#[cfg(test)]
pub(crate) mod support;

pub use config::DriverConfig;
pub use error::{Error, Result};
