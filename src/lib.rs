//! Async drivers for hobbyist sensor hardware: the Bosch BMP180 and
//! BMP280/BME280 barometric sensors with their exact fixed-point
//! compensation pipelines, the ADS1015 and MCP3002 ADCs behind a common
//! channel abstraction, and a couple of analog sensors consuming it.
//!
//! Everything is `no_std` and generic over `embedded-hal-async` bus
//! traits; shared-bus access goes through one `embassy-sync` mutex per
//! concern so drivers can sit on the same physical bus.

#![no_std]

#[cfg(test)]
extern crate std;

pub mod adc;
pub mod bus;
pub mod error;
pub mod sensors;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::{Error, InitFailure};
