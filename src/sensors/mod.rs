//! Sensor drivers.
//!
//! The register-mapped barometric sensors own their bus handle through
//! [`Registers`](crate::bus::Registers); the analog sensors borrow an
//! acquired [`AdcChannel`](crate::adc::AdcChannel) instead.

#[cfg(feature = "sensor-bmp180")]
pub mod bmp180;
#[cfg(feature = "sensor-bmx280")]
pub mod bmx280;
#[cfg(feature = "sensor-analog")]
pub mod ldr;
#[cfg(feature = "sensor-analog")]
pub mod mcp970x;

/// Lifecycle phase of a register-mapped sensor facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Uninitialized,
    Ready,
    Faulted,
    Disposed,
}
