//! MCP3002 10-bit SPI ADC with two single-ended inputs.
//!
//! One conversion is one full-duplex two-byte frame: the command byte
//! selects single-ended mode and the channel, the reply carries the
//! 10-bit result in its low bits. There is no per-channel reservation on
//! this part; acquiring a channel only range-checks the index.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embedded_hal_async::spi::SpiDevice;

use crate::adc::AdcChannel;
use crate::error::Error;

/// Number of single-ended inputs.
pub const CHANNEL_COUNT: usize = 2;

/// Largest raw sample (10 bits).
pub const MAX_VALUE: u16 = 1023;

/// Start bit plus single-ended mode; the channel sets one more bit.
const MODE_SINGLE_ENDED: u8 = 0x60;

/// MCP3002 driver.
pub struct Mcp3002<S> {
    spi: Mutex<CriticalSectionRawMutex, Option<S>>,
}

impl<S: SpiDevice<u8>> Mcp3002<S> {
    pub fn new(spi: S) -> Self {
        Self {
            spi: Mutex::new(Some(spi)),
        }
    }

    fn check_range(&self, channel: usize) -> Result<(), Error<S::Error>> {
        if channel >= CHANNEL_COUNT {
            return Err(Error::ChannelRange {
                channel,
                count: CHANNEL_COUNT,
            });
        }
        Ok(())
    }

    /// Hand out a channel handle. Only the index is checked; the MCP3002
    /// tracks no reservations, so the same channel can be acquired twice.
    pub fn acquire_channel(&self, channel: usize) -> Result<Mcp3002Channel<'_, S>, Error<S::Error>> {
        self.check_range(channel)?;
        Ok(Mcp3002Channel {
            adc: self,
            channel,
        })
    }

    /// No-op besides the range check, kept for symmetry with the ADS1015.
    pub fn release_channel(&self, channel: usize) -> Result<(), Error<S::Error>> {
        self.check_range(channel)
    }

    /// Run one conversion and return the raw 10-bit count.
    pub async fn read(&self, channel: usize) -> Result<u16, Error<S::Error>> {
        self.check_range(channel)?;

        let mut guard = self.spi.lock().await;
        let spi = guard.as_mut().ok_or(Error::Disposed)?;

        let command = [MODE_SINGLE_ENDED | (0x08 << channel), 0x00];
        let mut reply = [0u8; 2];
        spi.transfer(&mut reply, &command)
            .await
            .map_err(Error::BusIo)?;

        Ok(u16::from(reply[0] & 0x03) << 8 | u16::from(reply[1]))
    }

    /// Dispose the driver, returning the SPI device.
    pub async fn release(&self) -> Result<S, Error<S::Error>> {
        let mut guard = self.spi.lock().await;
        guard.take().ok_or(Error::Disposed)
    }
}

/// A validated MCP3002 channel.
pub struct Mcp3002Channel<'a, S> {
    adc: &'a Mcp3002<S>,
    channel: usize,
}

impl<S> Mcp3002Channel<'_, S> {
    pub const fn index(&self) -> usize {
        self.channel
    }
}

impl<S: SpiDevice<u8>> AdcChannel for Mcp3002Channel<'_, S> {
    type Error = Error<S::Error>;

    async fn read_value(&mut self) -> Result<u16, Self::Error> {
        self.adc.read(self.channel).await
    }

    async fn read_ratio(&mut self) -> Result<f64, Self::Error> {
        let raw = self.adc.read(self.channel).await?;
        Ok(raw as f64 / MAX_VALUE as f64)
    }
}
