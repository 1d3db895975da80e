//! Analog-to-digital converter drivers and the channel abstraction the
//! analog sensors consume.

#[cfg(feature = "adc-ads1015")]
pub mod ads1015;
#[cfg(feature = "adc-mcp3002")]
pub mod mcp3002;

/// A single acquired converter channel.
///
/// Implemented by the channel handles of both converters so analog sensors
/// like [`Ldr`](crate::sensors::ldr::Ldr) can be written once against the
/// trait. The meaning of `read_value` follows each converter's resolution:
/// millivolts for the ADS1015, raw 10-bit counts for the MCP3002.
pub trait AdcChannel {
    type Error;

    /// Trigger a conversion and return the scaled sample.
    async fn read_value(&mut self) -> Result<u16, Self::Error>;

    /// Trigger a conversion and return the sample as a 0..1 ratio of the
    /// converter's full range.
    async fn read_ratio(&mut self) -> Result<f64, Self::Error>;
}
