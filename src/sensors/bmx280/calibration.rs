//! Factory calibration coefficients and the loader that reads them.
//!
//! The coefficient block lives at 0x88..0x9F as little-endian 16-bit
//! fields. The humidity-capable variant adds dig_H1 at 0xA1 and
//! dig_H2..dig_H6 at 0xE1..0xE7, where dig_H4 and dig_H5 share the 0xE5
//! register and have to be reassembled nibble by nibble.

use embedded_hal_async::i2c::I2c;

use super::{REG_CALIB_HUMIDITY, REG_CALIB_TP, REG_DIG_H1, Variant};
use crate::bus::Registers;

/// Humidity coefficients, present on the BME280 only.
///
/// dig_H4/dig_H5 are reassembled without sign extension of the packed
/// nibbles, matching the reference routines bit for bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HumidityCalibration {
    pub dig_h1: u8,
    pub dig_h2: i16,
    pub dig_h3: u8,
    pub dig_h4: i16,
    pub dig_h5: i16,
    pub dig_h6: i8,
}

impl HumidityCalibration {
    /// Assemble the humidity coefficients from dig_H1 and the raw
    /// 0xE1..0xE7 block.
    pub fn parse(dig_h1: u8, block: &[u8; 7]) -> Self {
        Self {
            dig_h1,
            dig_h2: i16::from_le_bytes([block[0], block[1]]),
            dig_h3: block[2],
            // 0xE4 holds dig_H4<11:4>, 0xE5<3:0> holds dig_H4<3:0>
            dig_h4: ((block[3] as i16) << 4) | (block[4] & 0x0F) as i16,
            // 0xE6 holds dig_H5<11:4>, 0xE5<7:4> holds dig_H5<3:0>
            dig_h5: ((block[5] as i16) << 4) | (block[4] >> 4) as i16,
            dig_h6: block[6] as i8,
        }
    }
}

/// Immutable calibration record for one physical sensor.
///
/// Loaded exactly once per device lifetime under the initialization gate
/// and owned by the device facade from then on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CalibrationData {
    pub dig_t1: u16,
    pub dig_t2: i16,
    pub dig_t3: i16,

    pub dig_p1: u16,
    pub dig_p2: i16,
    pub dig_p3: i16,
    pub dig_p4: i16,
    pub dig_p5: i16,
    pub dig_p6: i16,
    pub dig_p7: i16,
    pub dig_p8: i16,
    pub dig_p9: i16,

    pub humidity: Option<HumidityCalibration>,
}

impl CalibrationData {
    /// Decode the temperature/pressure coefficient block read at 0x88.
    pub fn parse(block: &[u8; 24], humidity: Option<HumidityCalibration>) -> Self {
        let le_u16 = |offset: usize| u16::from_le_bytes([block[offset], block[offset + 1]]);
        let le_i16 = |offset: usize| i16::from_le_bytes([block[offset], block[offset + 1]]);

        Self {
            dig_t1: le_u16(0),
            dig_t2: le_i16(2),
            dig_t3: le_i16(4),
            dig_p1: le_u16(6),
            dig_p2: le_i16(8),
            dig_p3: le_i16(10),
            dig_p4: le_i16(12),
            dig_p5: le_i16(14),
            dig_p6: le_i16(16),
            dig_p7: le_i16(18),
            dig_p8: le_i16(20),
            dig_p9: le_i16(22),
            humidity,
        }
    }

    /// Read the full coefficient map for `variant` from the device.
    pub(crate) async fn read<I: I2c>(
        regs: &mut Registers<I>,
        variant: Variant,
    ) -> Result<Self, I::Error> {
        let mut block = [0u8; 24];
        regs.read_into(REG_CALIB_TP, &mut block).await?;

        let humidity = if variant.has_humidity() {
            let dig_h1 = regs.read_u8(REG_DIG_H1).await?;
            let mut hblock = [0u8; 7];
            regs.read_into(REG_CALIB_HUMIDITY, &mut hblock).await?;
            Some(HumidityCalibration::parse(dig_h1, &hblock))
        } else {
            None
        };

        Ok(Self::parse(&block, humidity))
    }
}
