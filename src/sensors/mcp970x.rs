//! MCP9700/9701 family of analog linear thermistors.
//!
//! All family members put out a voltage linear in temperature; they differ
//! only in the zero-degree offset, the slope and a per-part calibration
//! trim, so one driver covers the family and the part-specific
//! constructors just fill in the datasheet constants.
//!
//! The output is noisy enough that a single sample is not trustworthy, so
//! a reading averages six samples spaced a millisecond apart.

use embedded_hal_async::delay::DelayNs;

use crate::adc::AdcChannel;

const SAMPLES: u32 = 6;
const SAMPLE_SPACING_MS: u32 = 1;

/// Linear thermistor on an acquired ADC channel.
pub struct Mcp970x<C, D> {
    channel: C,
    delay: D,
    reference_millivolts: u32,
    zero_degree_offset: f64,
    millivolts_per_degree: f64,
    calibration_offset: f64,
}

impl<C: AdcChannel, D: DelayNs> Mcp970x<C, D> {
    /// MCP9700A: 500 mV at zero degrees, 10 mV/°C nominal, with the
    /// empirically determined trim for this part.
    pub fn mcp9700a(channel: C, delay: D, reference_millivolts: u32) -> Self {
        Self::new(channel, delay, reference_millivolts, 530.0, 11.0, -2.0)
    }

    /// MCP9701A: 400 mV at zero degrees, 19.5 mV/°C nominal.
    pub fn mcp9701a(channel: C, delay: D, reference_millivolts: u32) -> Self {
        Self::new(channel, delay, reference_millivolts, 400.0, 19.53, -6.0)
    }

    /// MCP9700AE variant trim.
    pub fn mcp9700ae(channel: C, delay: D, reference_millivolts: u32) -> Self {
        Self::new(channel, delay, reference_millivolts, 400.0, 19.5, -4.0)
    }

    pub fn new(
        channel: C,
        delay: D,
        reference_millivolts: u32,
        zero_degree_offset: f64,
        millivolts_per_degree: f64,
        calibration_offset: f64,
    ) -> Self {
        Self {
            channel,
            delay,
            reference_millivolts,
            zero_degree_offset,
            millivolts_per_degree,
            calibration_offset,
        }
    }

    /// Averaged temperature in degrees Celsius.
    pub async fn temperature(&mut self) -> Result<f64, C::Error> {
        let mut sum = 0.0;
        for _ in 0..SAMPLES {
            sum += self.channel.read_ratio().await?;
            self.delay.delay_ms(SAMPLE_SPACING_MS).await;
        }
        let millivolts = sum / SAMPLES as f64 * self.reference_millivolts as f64;
        Ok((millivolts - self.zero_degree_offset) / self.millivolts_per_degree
            + self.calibration_offset)
    }

    /// Hand the channel back, releasing its reservation.
    pub fn release(self) -> C {
        self.channel
    }
}
