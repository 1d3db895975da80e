//! Device facade for the Bosch BMP280/BME280 barometric sensor family.
//!
//! One driver covers both parts: a [`Variant`] tag selects the bus
//! address, the optional chip-id check and the humidity capability, so the
//! BME280 is the BMP280 profile plus humidity rather than a separate
//! driver.
//!
//! Initialization is lazy and one-shot. The first measurement access (or
//! an explicit [`Bmx280::initialize`]) verifies the chip id where the
//! variant requires it, loads the calibration coefficients and programs
//! the control registers, all while holding the init gate so racing first
//! callers block instead of re-programming hardware. A failed attempt
//! latches the device faulted; only another explicit `initialize` call
//! retries.
//!
//! Each measurement kind has its own mutual-exclusion region. Temperature
//! owns `t_fine` and always performs a fresh conversion-read plus
//! compensation. Pressure and humidity first run a full temperature cycle
//! to refresh `t_fine` and then read under their own region, so two
//! concurrent temperature reads serialize while a pressure and a humidity
//! read may share one freshly computed `t_fine`.

pub mod calibration;
pub mod compensation;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embedded_hal_async::i2c::I2c;
use log::{error, info};

use crate::bus::Registers;
use crate::error::{Error, InitFailure};
pub use calibration::{CalibrationData, HumidityCalibration};

const REG_CALIB_TP: u8 = 0x88;
const REG_DIG_H1: u8 = 0xA1;
const REG_CALIB_HUMIDITY: u8 = 0xE1;
const REG_CHIP_ID: u8 = 0xD0;
const REG_CTRL_HUM: u8 = 0xF2;
const REG_CTRL_MEAS: u8 = 0xF4;
const REG_PRESS_DATA: u8 = 0xF7;
const REG_TEMP_DATA: u8 = 0xFA;
const REG_HUM_DATA: u8 = 0xFD;

/// Chip-id signature of the humidity-capable part.
pub const BME280_CHIP_ID: u8 = 0x60;

/// Which family member is wired up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Bmp280,
    Bme280,
}

impl Variant {
    pub const fn has_humidity(self) -> bool {
        matches!(self, Variant::Bme280)
    }

    /// Signature to verify at 0xD0, if this variant verifies one.
    /// The BMP280 profile skips the check.
    pub const fn expected_chip_id(self) -> Option<u8> {
        match self {
            Variant::Bmp280 => None,
            Variant::Bme280 => Some(BME280_CHIP_ID),
        }
    }

    /// Conventional wiring puts the two parts on different addresses.
    pub const fn default_address(self) -> u8 {
        match self {
            Variant::Bmp280 => 0x77,
            Variant::Bme280 => 0x76,
        }
    }
}

/// Oversampling factor for one measurement kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Oversampling {
    Skip,
    X1,
    X2,
    X4,
    X8,
    X16,
}

impl Oversampling {
    const fn bits(self) -> u8 {
        match self {
            Oversampling::Skip => 0b000,
            Oversampling::X1 => 0b001,
            Oversampling::X2 => 0b010,
            Oversampling::X4 => 0b011,
            Oversampling::X8 => 0b100,
            Oversampling::X16 => 0b101,
        }
    }
}

/// Power mode field of the measurement control register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Sleep,
    Forced,
    Normal,
}

impl Mode {
    const fn bits(self) -> u8 {
        match self {
            Mode::Sleep => 0b00,
            Mode::Forced => 0b01,
            Mode::Normal => 0b11,
        }
    }
}

/// Oversampling and mode configuration, programmed once at initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub temperature_oversampling: Oversampling,
    pub pressure_oversampling: Oversampling,
    /// Ignored by the BMP280 profile.
    pub humidity_oversampling: Oversampling,
    pub mode: Mode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            temperature_oversampling: Oversampling::X1,
            pressure_oversampling: Oversampling::X16,
            humidity_oversampling: Oversampling::X16,
            mode: Mode::Normal,
        }
    }
}

impl Config {
    /// mode in bits 0-1, pressure oversampling in 2-4, temperature in 5-7.
    const fn ctrl_meas(&self) -> u8 {
        (self.temperature_oversampling.bits() << 5)
            | (self.pressure_oversampling.bits() << 2)
            | self.mode.bits()
    }

    const fn ctrl_hum(&self) -> u8 {
        self.humidity_oversampling.bits()
    }
}

pub use super::Status;

/// Calibration is only ever held in `Ready`, so a failed attempt cannot
/// leak coefficients into the next one.
#[derive(Clone, Copy)]
enum InitState {
    Uninitialized,
    Faulted,
    Ready(CalibrationData),
}

/// BMP280/BME280 driver. See the module docs for the locking model.
pub struct Bmx280<I> {
    bus: Mutex<CriticalSectionRawMutex, Option<Registers<I>>>,
    state: Mutex<CriticalSectionRawMutex, InitState>,
    /// Owns the most recent `t_fine`; doubles as the temperature region.
    t_fine: Mutex<CriticalSectionRawMutex, i32>,
    pressure_gate: Mutex<CriticalSectionRawMutex, ()>,
    humidity_gate: Mutex<CriticalSectionRawMutex, ()>,
    variant: Variant,
    config: Config,
}

impl<I: I2c> Bmx280<I> {
    /// BMP280 at its conventional address with the default configuration.
    pub fn bmp280(i2c: I) -> Self {
        Self::new(i2c, Variant::Bmp280, Variant::Bmp280.default_address(), Config::default())
    }

    /// BME280 at its conventional address with the default configuration.
    pub fn bme280(i2c: I) -> Self {
        Self::new(i2c, Variant::Bme280, Variant::Bme280.default_address(), Config::default())
    }

    pub fn new(i2c: I, variant: Variant, address: u8, config: Config) -> Self {
        Self {
            bus: Mutex::new(Some(Registers::new(i2c, address))),
            state: Mutex::new(InitState::Uninitialized),
            t_fine: Mutex::new(0),
            pressure_gate: Mutex::new(()),
            humidity_gate: Mutex::new(()),
            variant,
            config,
        }
    }

    pub const fn variant(&self) -> Variant {
        self.variant
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

    /// Measure the temperature in degrees Celsius, two decimals.
    ///
    /// Always a fresh conversion read; never cached.
    pub async fn temperature(&self) -> Result<f64, Error<I::Error>> {
        let cal = self.ensure_ready().await?;
        let (_, centi) = self.measure_temperature(&cal).await?;
        Ok(centi as f64 / 100.0)
    }

    /// Measure the pressure in pascals, two decimals.
    ///
    /// Runs a full temperature cycle first so the compensation sees a
    /// fresh `t_fine`, then reads pressure under its own region. A result
    /// of exactly 0.0 means the pipeline hit its division guard.
    pub async fn pressure(&self) -> Result<f64, Error<I::Error>> {
        let cal = self.ensure_ready().await?;
        let (t_fine, _) = self.measure_temperature(&cal).await?;

        let _region = self.pressure_gate.lock().await;
        let adc_p = self.read_raw20(REG_PRESS_DATA).await?;
        Ok(compensation::pressure_pascal(compensation::pressure(
            adc_p, t_fine, &cal,
        )))
    }

    /// Measure the relative humidity in percent (BME280 only).
    pub async fn humidity(&self) -> Result<f64, Error<I::Error>> {
        if !self.variant.has_humidity() {
            return Err(Error::HumidityUnsupported);
        }
        let cal = self.ensure_ready().await?;
        let hcal = cal.humidity.ok_or(Error::HumidityUnsupported)?;
        let (t_fine, _) = self.measure_temperature(&cal).await?;

        let _region = self.humidity_gate.lock().await;
        let adc_h = self.read_raw16(REG_HUM_DATA).await?;
        Ok(compensation::humidity(adc_h, t_fine, &hcal) as f64 / 1024.0)
    }

    /// One temperature cycle inside the temperature region: fresh raw
    /// read, compensation, `t_fine` update.
    async fn measure_temperature(
        &self,
        cal: &CalibrationData,
    ) -> Result<(i32, i32), Error<I::Error>> {
        let mut t_fine = self.t_fine.lock().await;
        let adc_t = self.read_raw20(REG_TEMP_DATA).await?;
        let (fine, centi) = compensation::temperature(adc_t, cal);
        *t_fine = fine;
        Ok((fine, centi))
    }

    /// Lazy initialization: trigger the sequence from `Uninitialized`,
    /// but never retry a faulted device.
    async fn ensure_ready(&self) -> Result<CalibrationData, Error<I::Error>> {
        let mut state = self.state.lock().await;
        match *state {
            InitState::Ready(cal) => Ok(cal),
            InitState::Faulted => Err(Error::Initialization(InitFailure::Faulted)),
            InitState::Uninitialized => self.run_init(&mut state).await,
        }
    }

    /// The init sequence proper; runs with the state lock held so exactly
    /// one caller programs the hardware while the rest block.
    async fn run_init(&self, state: &mut InitState) -> Result<CalibrationData, Error<I::Error>> {
        match self.try_init().await {
            Ok(cal) => {
                info!("{:?} ready (ctrl_meas {:#04x})", self.variant, self.config.ctrl_meas());
                *state = InitState::Ready(cal);
                Ok(cal)
            }
            Err(err) => {
                error!("{:?} initialization failed", self.variant);
                *state = InitState::Faulted;
                Err(err)
            }
        }
    }

    async fn try_init(&self) -> Result<CalibrationData, Error<I::Error>> {
        let mut bus = self.bus.lock().await;
        let regs = bus.as_mut().ok_or(Error::Disposed)?;

        if let Some(expected) = self.variant.expected_chip_id() {
            let found = regs.read_u8(REG_CHIP_ID).await.map_err(Error::init_bus)?;
            if found != expected {
                return Err(Error::Initialization(InitFailure::ChipIdMismatch {
                    expected,
                    found,
                }));
            }
        }

        let cal = CalibrationData::read(regs, self.variant)
            .await
            .map_err(Error::init_bus)?;

        // The humidity control register latches only on a ctrl_meas write,
        // so it must be programmed first or the hardware ignores it.
        if self.variant.has_humidity() {
            regs.write_u8(REG_CTRL_HUM, self.config.ctrl_hum())
                .await
                .map_err(Error::init_bus)?;
        }
        regs.write_u8(REG_CTRL_MEAS, self.config.ctrl_meas())
            .await
            .map_err(Error::init_bus)?;

        Ok(cal)
    }

    /// Burst-read a 20-bit conversion value (msb, lsb, xlsb<7:4>).
    async fn read_raw20(&self, reg: u8) -> Result<i32, Error<I::Error>> {
        let mut bus = self.bus.lock().await;
        let regs = bus.as_mut().ok_or(Error::Disposed)?;
        let mut buf = [0u8; 3];
        regs.read_into(reg, &mut buf).await.map_err(Error::BusIo)?;
        Ok(((buf[0] as i32) << 12) | ((buf[1] as i32) << 4) | ((buf[2] as i32) >> 4))
    }

    /// Burst-read a 16-bit conversion value, most significant byte first.
    async fn read_raw16(&self, reg: u8) -> Result<i32, Error<I::Error>> {
        let mut bus = self.bus.lock().await;
        let regs = bus.as_mut().ok_or(Error::Disposed)?;
        let mut buf = [0u8; 2];
        regs.read_into(reg, &mut buf).await.map_err(Error::BusIo)?;
        Ok(((buf[0] as i32) << 8) | (buf[1] as i32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeI2c;
    use embassy_futures::block_on;

    /// Datasheet worked-example coefficients plus conversion readouts:
    /// adc_T = 519888, adc_P = 415148.
    fn seed_bmp280(i2c: &FakeI2c) {
        let tp: [(u8, u16); 12] = [
            (0x88, 27504),           // dig_T1
            (0x8A, 26435),           // dig_T2
            (0x8C, (-1000i16) as u16),
            (0x8E, 36477),           // dig_P1
            (0x90, (-10685i16) as u16),
            (0x92, 3024),
            (0x94, 2855),
            (0x96, 140),
            (0x98, (-7i16) as u16),
            (0x9A, 15500),
            (0x9C, (-14600i16) as u16),
            (0x9E, 6000),
        ];
        for (reg, value) in tp {
            let [lo, hi] = value.to_le_bytes();
            i2c.set_register(reg, lo);
            i2c.set_register(reg + 1, hi);
        }
        // adc_T = 519888 = 0x7EED0
        i2c.set_register(0xFA, 0x7E);
        i2c.set_register(0xFB, 0xED);
        i2c.set_register(0xFC, 0x00);
        // adc_P = 415148 = 0x655AC
        i2c.set_register(0xF7, 0x65);
        i2c.set_register(0xF8, 0x5A);
        i2c.set_register(0xF9, 0xC0);
    }

    fn seed_bme280(i2c: &FakeI2c) {
        seed_bmp280(i2c);
        i2c.set_register(0xD0, BME280_CHIP_ID);
        // humidity coefficients chosen so the pipeline rails at 100 %RH
        // for adc_H = 32768 regardless of t_fine: dig_H2 = 255, rest 0
        i2c.set_register(0xE1, 0xFF);
        i2c.set_register(0xE2, 0x00);
        // adc_H = 32768
        i2c.set_register(0xFD, 0x80);
        i2c.set_register(0xFE, 0x00);
    }

    #[test]
    fn temperature_matches_datasheet_example() {
        let i2c = FakeI2c::new();
        seed_bmp280(&i2c);
        let dev = Bmx280::bmp280(i2c);

        let celsius = block_on(dev.temperature()).unwrap();
        assert!((celsius - 25.08).abs() < 1e-9);
        assert_eq!(block_on(dev.status()), Status::Ready);
    }

    #[test]
    fn pressure_before_any_temperature_access_is_correct() {
        let i2c = FakeI2c::new();
        seed_bmp280(&i2c);
        let dev = Bmx280::bmp280(i2c);

        // no temperature() call first: pressure must refresh t_fine itself
        let pascal = block_on(dev.pressure()).unwrap();

        let cal = CalibrationData {
            dig_t1: 27504,
            dig_t2: 26435,
            dig_t3: -1000,
            dig_p1: 36477,
            dig_p2: -10685,
            dig_p3: 3024,
            dig_p4: 2855,
            dig_p5: 140,
            dig_p6: -7,
            dig_p7: 15500,
            dig_p8: -14600,
            dig_p9: 6000,
            humidity: None,
        };
        let (t_fine, _) = compensation::temperature(519888, &cal);
        assert_eq!(t_fine, 128422);
        let expected = compensation::pressure_pascal(compensation::pressure(415148, t_fine, &cal));
        assert!((pascal - expected).abs() < 1e-9);
        assert!(pascal > 100_000.0 && pascal < 101_000.0);
    }

    #[test]
    fn initialization_programs_ctrl_hum_before_ctrl_meas() {
        let i2c = FakeI2c::new();
        seed_bme280(&i2c);
        let dev = Bmx280::bme280(i2c.clone());
        block_on(dev.initialize()).unwrap();

        let writes = i2c.state.writes.borrow();
        let pos = |reg: u8| writes.iter().position(|frame| frame[0] == reg);
        let hum = pos(REG_CTRL_HUM).expect("ctrl_hum written");
        let meas = pos(REG_CTRL_MEAS).expect("ctrl_meas written");
        assert!(hum < meas, "ctrl_hum must be programmed first");
    }

    #[test]
    fn bmp280_does_not_program_ctrl_hum() {
        let i2c = FakeI2c::new();
        seed_bmp280(&i2c);
        let dev = Bmx280::bmp280(i2c.clone());
        block_on(dev.initialize()).unwrap();

        let writes = i2c.state.writes.borrow();
        assert!(writes.iter().all(|frame| frame[0] != REG_CTRL_HUM));
    }

    #[test]
    fn humidity_rails_at_one_hundred_percent() {
        let i2c = FakeI2c::new();
        seed_bme280(&i2c);
        let dev = Bmx280::bme280(i2c);

        let rh = block_on(dev.humidity()).unwrap();
        assert!((rh - 100.0).abs() < 1e-9);
    }

    #[test]
    fn humidity_is_rejected_on_the_bmp280_profile() {
        let i2c = FakeI2c::new();
        seed_bmp280(&i2c);
        let dev = Bmx280::bmp280(i2c.clone());

        assert_eq!(block_on(dev.humidity()).unwrap_err(), Error::HumidityUnsupported);
        // rejected before any bus traffic
        assert!(i2c.state.writes.borrow().is_empty());
    }

    #[test]
    fn chip_id_mismatch_faults_the_device() {
        let i2c = FakeI2c::new();
        seed_bmp280(&i2c);
        i2c.set_register(0xD0, 0x58);
        let dev = Bmx280::bme280(i2c);

        let err = block_on(dev.initialize()).unwrap_err();
        assert_eq!(
            err,
            Error::Initialization(InitFailure::ChipIdMismatch {
                expected: BME280_CHIP_ID,
                found: 0x58,
            })
        );
        assert_eq!(block_on(dev.status()), Status::Faulted);
    }

    #[test]
    fn failed_attempts_fault_without_retaining_state() {
        let i2c = FakeI2c::new();
        seed_bmp280(&i2c);
        i2c.state.fail.set(true);
        let dev = Bmx280::bmp280(i2c.clone());

        // first attempt: bus failure, device faults
        assert!(matches!(
            block_on(dev.initialize()),
            Err(Error::Initialization(InitFailure::Bus(_)))
        ));
        assert_eq!(block_on(dev.status()), Status::Faulted);

        // lazy accessors do not retry a faulted device
        assert_eq!(
            block_on(dev.temperature()).unwrap_err(),
            Error::Initialization(InitFailure::Faulted)
        );

        // a second explicit attempt runs the whole sequence again and
        // faults again
        assert!(matches!(
            block_on(dev.initialize()),
            Err(Error::Initialization(InitFailure::Bus(_)))
        ));
        assert_eq!(block_on(dev.status()), Status::Faulted);

        // once the bus recovers, an explicit attempt loads everything
        // from scratch
        i2c.state.fail.set(false);
        block_on(dev.initialize()).unwrap();
        assert_eq!(block_on(dev.status()), Status::Ready);
        let celsius = block_on(dev.temperature()).unwrap();
        assert!((celsius - 25.08).abs() < 1e-9);
    }

    #[test]
    fn access_after_release_is_disposed() {
        let i2c = FakeI2c::new();
        seed_bmp280(&i2c);
        let dev = Bmx280::bmp280(i2c);
        block_on(dev.initialize()).unwrap();

        let _bus = block_on(dev.release()).unwrap();
        assert_eq!(block_on(dev.status()), Status::Disposed);
        assert_eq!(block_on(dev.temperature()).unwrap_err(), Error::Disposed);
        assert_eq!(block_on(dev.pressure()).unwrap_err(), Error::Disposed);
        // re-initializing a released device reports Disposed, not Ok
        assert_eq!(block_on(dev.initialize()).unwrap_err(), Error::Disposed);
        assert!(matches!(block_on(dev.release()), Err(Error::Disposed)));
    }
}
