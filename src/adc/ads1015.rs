//! ADS1015 12-bit I2C ADC with a 4-way input multiplexer.
//!
//! Single-shot conversions only: each read programs the config register
//! with the channel mux, programmable gain and data rate, waits out the
//! conversion, then reads the result. Gain and data rate are fixed at
//! construction; reconfiguring means building a new driver.
//!
//! Datasheet: <https://www.ti.com/product/ADS1015>

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;

use crate::adc::AdcChannel;
use crate::error::Error;

/// Number of single-ended inputs.
pub const CHANNEL_COUNT: usize = 4;

/// Default address with the ADDR pin tied to ground.
pub const DEFAULT_ADDRESS: u8 = 0x48;

const REG_CONVERSION: u8 = 0x00;
const REG_CONFIG: u8 = 0x01;

/// Start a single conversion.
const CONFIG_OS_SINGLE: u16 = 0x8000;
/// Disable the comparator.
const CONFIG_COMP_DISABLE: u16 = 0x0003;
/// Single-ended AIN0; channels 1..3 step the mux field by 0x1000.
const CONFIG_MUX_SINGLE_0: u16 = 0x4000;

/// Programmable gain amplifier setting, named by full-scale millivolts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gain {
    Fs6144,
    #[default]
    Fs4096,
    Fs2048,
    Fs1024,
    Fs512,
    Fs256,
}

impl Gain {
    const fn bits(self) -> u16 {
        match self {
            Gain::Fs6144 => 0x0000,
            Gain::Fs4096 => 0x0200,
            Gain::Fs2048 => 0x0400,
            Gain::Fs1024 => 0x0600,
            Gain::Fs512 => 0x0800,
            Gain::Fs256 => 0x0A00,
        }
    }

    /// Full-scale input range in millivolts.
    pub const fn full_scale_millivolts(self) -> u16 {
        match self {
            Gain::Fs6144 => 6144,
            Gain::Fs4096 => 4096,
            Gain::Fs2048 => 2048,
            Gain::Fs1024 => 1024,
            Gain::Fs512 => 512,
            Gain::Fs256 => 256,
        }
    }
}

/// Conversion data rate in samples per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataRate {
    Sps128,
    Sps250,
    Sps490,
    Sps920,
    #[default]
    Sps1600,
    Sps2400,
    Sps3300,
}

impl DataRate {
    const fn bits(self) -> u16 {
        match self {
            DataRate::Sps128 => 0x0000,
            DataRate::Sps250 => 0x0020,
            DataRate::Sps490 => 0x0040,
            DataRate::Sps920 => 0x0060,
            DataRate::Sps1600 => 0x0080,
            DataRate::Sps2400 => 0x00A0,
            DataRate::Sps3300 => 0x00C0,
        }
    }

    const fn samples_per_second(self) -> u32 {
        match self {
            DataRate::Sps128 => 128,
            DataRate::Sps250 => 250,
            DataRate::Sps490 => 490,
            DataRate::Sps920 => 920,
            DataRate::Sps1600 => 1600,
            DataRate::Sps2400 => 2400,
            DataRate::Sps3300 => 3300,
        }
    }

    /// Settle time for one conversion at this rate, plus a small margin.
    const fn settle_micros(self) -> u32 {
        1_000_000 / self.samples_per_second() + 100
    }
}

/// Construction-time settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ads1015Config {
    pub address: u8,
    pub gain: Gain,
    pub data_rate: DataRate,
    /// Supply rail in millivolts; denominator for ratio reads.
    pub reference_millivolts: u16,
}

impl Default for Ads1015Config {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            gain: Gain::default(),
            data_rate: DataRate::default(),
            reference_millivolts: 3300,
        }
    }
}

struct Inner<I, D> {
    i2c: I,
    delay: D,
}

/// ADS1015 driver.
///
/// The device mutex is held across the whole configure/settle/read
/// sequence of one conversion, so concurrent readers on different channels
/// cannot interleave register traffic. Channel reservation is a plain flag
/// table guarded by a blocking mutex; acquiring never touches the bus.
pub struct Ads1015<I, D> {
    inner: Mutex<CriticalSectionRawMutex, Option<Inner<I, D>>>,
    reservations: BlockingMutex<CriticalSectionRawMutex, RefCell<[bool; CHANNEL_COUNT]>>,
    config: Ads1015Config,
}

// Free of the bus and delay bounds so the channel handle's Drop impl,
// which cannot carry them, can clear reservations.
impl<I, D> Ads1015<I, D> {
    fn check_range<E>(&self, channel: usize) -> Result<(), Error<E>> {
        if channel >= CHANNEL_COUNT {
            return Err(Error::ChannelRange {
                channel,
                count: CHANNEL_COUNT,
            });
        }
        Ok(())
    }

    fn clear_reservation(&self, channel: usize) {
        self.reservations
            .lock(|flags| flags.borrow_mut()[channel] = false);
    }
}

impl<I, D> Ads1015<I, D>
where
    I: I2c,
    D: DelayNs,
{
    /// Driver with default address, gain and data rate.
    pub fn new(i2c: I, delay: D) -> Self {
        Self::with_config(i2c, delay, Ads1015Config::default())
    }

    pub fn with_config(i2c: I, delay: D, config: Ads1015Config) -> Self {
        Self {
            inner: Mutex::new(Some(Inner { i2c, delay })),
            reservations: BlockingMutex::new(RefCell::new([false; CHANNEL_COUNT])),
            config,
        }
    }

    /// Reserve a channel and hand out a handle for it.
    ///
    /// Fails with [`Error::ChannelRange`] before any bus transaction if the
    /// index is out of range, and with [`Error::ChannelBusy`] if the channel
    /// is already reserved. The reservation is cleared when the handle is
    /// dropped or [`Ads1015Channel::release`] is called.
    pub fn acquire_channel(&self, channel: usize) -> Result<Ads1015Channel<'_, I, D>, Error<I::Error>> {
        self.check_range(channel)?;
        self.reservations.lock(|flags| {
            let mut flags = flags.borrow_mut();
            if flags[channel] {
                return Err(Error::ChannelBusy { channel });
            }
            flags[channel] = true;
            Ok(())
        })?;
        Ok(Ads1015Channel {
            adc: self,
            channel,
        })
    }

    /// Clear a channel reservation.
    pub fn release_channel(&self, channel: usize) -> Result<(), Error<I::Error>> {
        self.check_range(channel)?;
        self.clear_reservation(channel);
        Ok(())
    }

    /// Run one single-shot conversion on `channel` and scale the 12-bit
    /// result to millivolts against the programmable-gain full scale.
    pub async fn read_millivolts(&self, channel: usize) -> Result<u16, Error<I::Error>> {
        self.check_range(channel)?;

        let mut guard = self.inner.lock().await;
        let dev = guard.as_mut().ok_or(Error::Disposed)?;

        let word = CONFIG_OS_SINGLE
            | CONFIG_COMP_DISABLE
            | self.config.data_rate.bits()
            | self.config.gain.bits()
            | (CONFIG_MUX_SINGLE_0 + ((channel as u16) << 12));
        let [hi, lo] = word.to_be_bytes();
        dev.i2c
            .write(self.config.address, &[REG_CONFIG, hi, lo])
            .await
            .map_err(Error::BusIo)?;

        dev.delay
            .delay_us(self.config.data_rate.settle_micros())
            .await;

        let mut buf = [0u8; 2];
        dev.i2c
            .write_read(self.config.address, &[REG_CONVERSION], &mut buf)
            .await
            .map_err(Error::BusIo)?;

        let raw = u16::from_be_bytes(buf) >> 4;
        let scale = self.config.gain.full_scale_millivolts() as u32;
        Ok((raw as u32 * scale / 2048) as u16)
    }

    /// Dispose the driver, returning the bus handle and delay.
    ///
    /// Any later read fails with [`Error::Disposed`].
    pub async fn release(&self) -> Result<(I, D), Error<I::Error>> {
        let mut guard = self.inner.lock().await;
        let dev = guard.take().ok_or(Error::Disposed)?;
        Ok((dev.i2c, dev.delay))
    }
}

/// An acquired ADS1015 channel.
pub struct Ads1015Channel<'a, I, D> {
    adc: &'a Ads1015<I, D>,
    channel: usize,
}

impl<I, D> Ads1015Channel<'_, I, D> {
    pub const fn index(&self) -> usize {
        self.channel
    }

    /// Release the reservation explicitly (equivalent to dropping).
    pub fn release(self) {}
}

impl<I, D> Drop for Ads1015Channel<'_, I, D> {
    fn drop(&mut self) {
        self.adc.clear_reservation(self.channel);
    }
}

impl<I, D> AdcChannel for Ads1015Channel<'_, I, D>
where
    I: I2c,
    D: DelayNs,
{
    type Error = Error<I::Error>;

    async fn read_value(&mut self) -> Result<u16, Self::Error> {
        self.adc.read_millivolts(self.channel).await
    }

    async fn read_ratio(&mut self) -> Result<f64, Self::Error> {
        let millivolts = self.adc.read_millivolts(self.channel).await?;
        Ok(millivolts as f64 / self.adc.config.reference_millivolts as f64)
    }
}
