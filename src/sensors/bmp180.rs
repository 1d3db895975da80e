//! Driver for the Bosch BMP180 barometric sensor.
//!
//! Older sibling of the BMP280: every conversion is commanded explicitly
//! through register 0xF4 and then waited out, so unlike the BMx280 driver
//! this one owns a delay provider. The delay is cloned into each
//! measurement region and only ever awaited outside the bus lock, keeping
//! the bus free for other devices during the conversion wait.
//!
//! The locking model otherwise mirrors the BMx280 facade: temperature is
//! one region, pressure another, and a pressure read first runs a full
//! temperature cycle because the pressure pipeline consumes the
//! intermediate `b5` from a fresh temperature conversion.

use core::num::Wrapping as W;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;
use log::{error, info};

use super::Status;
use crate::bus::Registers;
use crate::error::{Error, InitFailure};

const REG_CALIBRATION: u8 = 0xAA;
const REG_CHIP_ID: u8 = 0xD0;
const REG_COMMAND: u8 = 0xF4;
const REG_DATA: u8 = 0xF6;

const CMD_TEMPERATURE: u8 = 0x2E;
const CMD_PRESSURE: u8 = 0x34;

/// Fixed chip-id signature, verified at initialization.
pub const CHIP_ID: u8 = 0x55;

/// Conventional bus address.
pub const DEFAULT_ADDRESS: u8 = 0x77;

const TEMPERATURE_CONVERSION_MS: u32 = 5;

/// Pressure oversampling setting. Higher settings average more internal
/// samples, trading conversion time for noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    UltraLowPower,
    Standard,
    HighResolution,
    UltraHighResolution,
}

impl Mode {
    /// The oss field: number of extra sample doublings.
    const fn oversampling(self) -> u8 {
        match self {
            Mode::UltraLowPower => 0,
            Mode::Standard => 1,
            Mode::HighResolution => 2,
            Mode::UltraHighResolution => 3,
        }
    }

    /// Worst-case pressure conversion time for this setting.
    const fn conversion_ms(self) -> u32 {
        match self {
            Mode::UltraLowPower => 5,
            Mode::Standard => 8,
            Mode::HighResolution => 14,
            Mode::UltraHighResolution => 26,
        }
    }
}

/// The eleven factory coefficients, stored big-endian from 0xAA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bmp180Calibration {
    pub ac1: i16,
    pub ac2: i16,
    pub ac3: i16,
    pub ac4: u16,
    pub ac5: u16,
    pub ac6: u16,
    pub b1: i16,
    pub b2: i16,
    pub mb: i16,
    pub mc: i16,
    pub md: i16,
}

impl Bmp180Calibration {
    pub fn parse(block: &[u8; 22]) -> Self {
        let u = |i: usize| u16::from_be_bytes([block[i], block[i + 1]]);
        let s = |i: usize| i16::from_be_bytes([block[i], block[i + 1]]);
        Self {
            ac1: s(0),
            ac2: s(2),
            ac3: s(4),
            ac4: u(6),
            ac5: u(8),
            ac6: u(10),
            b1: s(12),
            b2: s(14),
            mb: s(16),
            mc: s(18),
            md: s(20),
        }
    }
}

/// `b5` from a raw temperature readout. Shared intermediate of the
/// temperature and pressure pipelines.
fn compute_b5(ut: i32, cal: &Bmp180Calibration) -> i32 {
    let x1 = (W(ut) - W(cal.ac6 as i32)) * W(cal.ac5 as i32) >> 15;
    let x2 = W(((cal.mc as i32) << 11) / (x1.0 + cal.md as i32));
    (x1 + x2).0
}

/// Temperature in tenths of a degree Celsius.
fn temperature_deci(b5: i32) -> i32 {
    (b5 + 8) >> 4
}

/// Pressure in whole pascals from a raw readout and a fresh `b5`.
fn pressure_pascal(up: i32, b5: i32, oss: u8, cal: &Bmp180Calibration) -> i32 {
    let b6 = W(b5 - 4000);
    let x1 = (W(cal.b2 as i32) * (b6 * b6 >> 12)) >> 11;
    let x2 = W(cal.ac2 as i32) * b6 >> 11;
    let x3 = x1 + x2;
    let b3 = ((((W(cal.ac1 as i32) * W(4) + x3) << oss as usize) + W(2)) >> 2).0;

    let x1 = W(cal.ac3 as i32) * b6 >> 13;
    let x2 = (W(cal.b1 as i32) * (b6 * b6 >> 12)) >> 16;
    let x3 = ((x1 + x2 + W(2)) >> 2).0;
    let b4 = (cal.ac4 as u32).wrapping_mul((x3 + 32768) as u32) >> 15;
    let b7 = ((up - b3) as u32).wrapping_mul(50_000 >> oss);

    let p = if b7 < 0x8000_0000 {
        ((b7 << 1) / b4) as i32
    } else {
        ((b7 / b4) << 1) as i32
    };

    let x1 = W(p >> 8) * W(p >> 8);
    let x1 = (x1 * W(3038)) >> 16;
    let x2 = W(-7357) * W(p) >> 16;
    (W(p) + ((x1 + x2 + W(3791)) >> 4)).0
}

/// Calibration is only ever held in `Ready`, so a failed attempt cannot
/// leak coefficients into the next one.
#[derive(Clone, Copy)]
enum InitState {
    Uninitialized,
    Faulted,
    Ready(Bmp180Calibration),
}

/// BMP180 driver. See the module docs for the locking model.
pub struct Bmp180<I, D> {
    bus: Mutex<CriticalSectionRawMutex, Option<Registers<I>>>,
    state: Mutex<CriticalSectionRawMutex, InitState>,
    /// Each region owns its own delay so a conversion wait in one region
    /// never blocks the other.
    temperature_gate: Mutex<CriticalSectionRawMutex, D>,
    pressure_gate: Mutex<CriticalSectionRawMutex, D>,
    mode: Mode,
}

impl<I: I2c, D: DelayNs + Clone> Bmp180<I, D> {
    pub fn new(i2c: I, delay: D) -> Self {
        Self::with_mode(i2c, delay, DEFAULT_ADDRESS, Mode::Standard)
    }

    pub fn with_mode(i2c: I, delay: D, address: u8, mode: Mode) -> Self {
        Self {
            bus: Mutex::new(Some(Registers::new(i2c, address))),
            state: Mutex::new(InitState::Uninitialized),
            temperature_gate: Mutex::new(delay.clone()),
            pressure_gate: Mutex::new(delay),
            mode,
        }
    }

    pub const fn mode(&self) -> Mode {
        self.mode
    }

    /// Current lifecycle phase.
    pub async fn status(&self) -> Status {
        if self.bus.lock().await.is_none() {
            return Status::Disposed;
        }
        match *self.state.lock().await {
            InitState::Uninitialized => Status::Uninitialized,
            InitState::Faulted => Status::Faulted,
            InitState::Ready(_) => Status::Ready,
        }
    }

    /// Explicitly run (or re-run) the initialization sequence.
    ///
    /// Idempotent once ready. Unlike the lazy path taken by the
    /// measurement accessors, this also retries from the faulted state.
    pub async fn initialize(&self) -> Result<(), Error<I::Error>> {
        if self.bus.lock().await.is_none() {
            return Err(Error::Disposed);
        }
        let mut state = self.state.lock().await;
        if matches!(*state, InitState::Ready(_)) {
            return Ok(());
        }
        self.run_init(&mut state).await.map(|_| ())
    }

    /// Dispose the device and hand back the bus handle.
    ///
    /// Every subsequent access fails with [`Error::Disposed`].
    pub async fn release(&self) -> Result<I, Error<I::Error>> {
        let mut bus = self.bus.lock().await;
        let regs = bus.take().ok_or(Error::Disposed)?;
        Ok(regs.free())
    }

    /// Measure the temperature in degrees Celsius, one decimal.
    pub async fn temperature(&self) -> Result<f64, Error<I::Error>> {
        let cal = self.ensure_ready().await?;
        let (b5, _) = self.measure_temperature(&cal).await?;
        Ok(temperature_deci(b5) as f64 / 10.0)
    }

    /// Measure the pressure in whole pascals.
    ///
    /// Runs a full temperature cycle first so the pipeline sees a fresh
    /// `b5`, then commands and reads the pressure conversion under its
    /// own region.
    pub async fn pressure(&self) -> Result<i32, Error<I::Error>> {
        let cal = self.ensure_ready().await?;
        let (b5, _) = self.measure_temperature(&cal).await?;

        let mut delay = self.pressure_gate.lock().await;
        let oss = self.mode.oversampling();
        self.command(CMD_PRESSURE | (oss << 6)).await?;
        delay.delay_ms(self.mode.conversion_ms()).await;

        let mut bus = self.bus.lock().await;
        let regs = bus.as_mut().ok_or(Error::Disposed)?;
        let mut buf = [0u8; 3];
        regs.read_into(REG_DATA, &mut buf).await.map_err(Error::BusIo)?;
        let up = (((buf[0] as i32) << 16) | ((buf[1] as i32) << 8) | (buf[2] as i32)) >> (8 - oss);
        drop(bus);

        Ok(pressure_pascal(up, b5, oss, &cal))
    }

    /// One temperature cycle inside the temperature region: command,
    /// conversion wait, readout, `b5` computation.
    async fn measure_temperature(
        &self,
        cal: &Bmp180Calibration,
    ) -> Result<(i32, i32), Error<I::Error>> {
        let mut delay = self.temperature_gate.lock().await;
        self.command(CMD_TEMPERATURE).await?;
        delay.delay_ms(TEMPERATURE_CONVERSION_MS).await;

        let mut bus = self.bus.lock().await;
        let regs = bus.as_mut().ok_or(Error::Disposed)?;
        let ut = regs.read_u16_be(REG_DATA).await.map_err(Error::BusIo)? as i32;
        drop(bus);

        let b5 = compute_b5(ut, cal);
        Ok((b5, temperature_deci(b5)))
    }

    /// Write a conversion command, releasing the bus before the caller
    /// waits the conversion out.
    async fn command(&self, cmd: u8) -> Result<(), Error<I::Error>> {
        let mut bus = self.bus.lock().await;
        let regs = bus.as_mut().ok_or(Error::Disposed)?;
        regs.write_u8(REG_COMMAND, cmd).await.map_err(Error::BusIo)
    }

    /// Lazy initialization: trigger the sequence from `Uninitialized`,
    /// but never retry a faulted device.
    async fn ensure_ready(&self) -> Result<Bmp180Calibration, Error<I::Error>> {
        let mut state = self.state.lock().await;
        match *state {
            InitState::Ready(cal) => Ok(cal),
            InitState::Faulted => Err(Error::Initialization(InitFailure::Faulted)),
            InitState::Uninitialized => self.run_init(&mut state).await,
        }
    }

    async fn run_init(&self, state: &mut InitState) -> Result<Bmp180Calibration, Error<I::Error>> {
        match self.try_init().await {
            Ok(cal) => {
                info!("BMP180 ready ({:?})", self.mode);
                *state = InitState::Ready(cal);
                Ok(cal)
            }
            Err(err) => {
                error!("BMP180 initialization failed");
                *state = InitState::Faulted;
                Err(err)
            }
        }
    }

    async fn try_init(&self) -> Result<Bmp180Calibration, Error<I::Error>> {
        let mut bus = self.bus.lock().await;
        let regs = bus.as_mut().ok_or(Error::Disposed)?;

        let found = regs.read_u8(REG_CHIP_ID).await.map_err(Error::init_bus)?;
        if found != CHIP_ID {
            return Err(Error::Initialization(InitFailure::ChipIdMismatch {
                expected: CHIP_ID,
                found,
            }));
        }

        let mut block = [0u8; 22];
        regs.read_into(REG_CALIBRATION, &mut block)
            .await
            .map_err(Error::init_bus)?;
        Ok(Bmp180Calibration::parse(&block))
    }
}
