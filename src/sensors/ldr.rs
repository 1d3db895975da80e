//! Light-dependent resistor on an acquired ADC channel.
//!
//! An LDR in a voltage divider has no meaningful unit of its own, so this
//! driver only forwards the channel readings: the ratio is the fraction of
//! the reference rail, with bright light driving it toward one end of the
//! divider and darkness toward the other.

use crate::adc::AdcChannel;

pub struct Ldr<C> {
    channel: C,
}

impl<C: AdcChannel> Ldr<C> {
    pub fn new(channel: C) -> Self {
        Self { channel }
    }

    /// Raw channel value, in whatever unit the converter reports.
    pub async fn read_value(&mut self) -> Result<u16, C::Error> {
        self.channel.read_value().await
    }

    /// Fraction of the reference rail, 0.0 to 1.0.
    pub async fn read_ratio(&mut self) -> Result<f64, C::Error> {
        self.channel.read_ratio().await
    }

    /// Hand the channel back, releasing its reservation.
    pub fn release(self) -> C {
        self.channel
    }
}
