//! Fixed-point compensation pipelines for the BMP280/BME280 family.
//!
//! These are the manufacturer's integer routines (BME280 datasheet,
//! section 4.2.3) transcribed with their exact operation order and
//! intermediate widths: temperature and humidity run in 32 bits, pressure
//! in 64 bits. All arithmetic wraps on overflow like the reference C, so
//! no intermediate may be widened or reordered without silently changing
//! the results.
//!
//! Everything here is pure. The only state that flows between pipelines is
//! `t_fine`, which a temperature computation produces and the pressure and
//! humidity computations consume; callers must refresh it immediately
//! before either, since the sensor may have sampled again in the meantime.

use core::num::Wrapping as W;

use super::calibration::{CalibrationData, HumidityCalibration};

/// Upper clamp of the humidity pipeline before the final 12-bit shift;
/// corresponds to exactly 100 %RH.
pub const HUMIDITY_CLAMP_MAX: i32 = 419_430_400;

/// Compensate a raw 20-bit temperature sample.
///
/// Returns `(t_fine, centi_celsius)`; divide the second value by 100 for
/// degrees Celsius with exactly two decimals.
pub fn temperature(adc_t: i32, cal: &CalibrationData) -> (i32, i32) {
    let adc_t = W(adc_t);
    let t1 = W(cal.dig_t1 as i32);
    let t2 = W(cal.dig_t2 as i32);
    let t3 = W(cal.dig_t3 as i32);

    let var1 = (((adc_t >> 3) - (t1 << 1)) * t2) >> 11;
    let var2 = (((((adc_t >> 4) - t1) * ((adc_t >> 4) - t1)) >> 12) * t3) >> 14;

    let t_fine = var1 + var2;
    let centi = (t_fine * W(5) + W(128)) >> 8;
    (t_fine.0, centi.0)
}

/// Compensate a raw 20-bit pressure sample against a fresh `t_fine`.
///
/// Returns pascals in unsigned Q24.8 fixed point. When the first 64-bit
/// intermediate works out to zero the function returns 0 instead of
/// dividing by it; callers must treat a 0 result as "no reading", not as
/// vacuum.
pub fn pressure(adc_p: i32, t_fine: i32, cal: &CalibrationData) -> i64 {
    let p1 = W(cal.dig_p1 as i64);
    let p2 = W(cal.dig_p2 as i64);
    let p3 = W(cal.dig_p3 as i64);
    let p4 = W(cal.dig_p4 as i64);
    let p5 = W(cal.dig_p5 as i64);
    let p6 = W(cal.dig_p6 as i64);
    let p7 = W(cal.dig_p7 as i64);
    let p8 = W(cal.dig_p8 as i64);
    let p9 = W(cal.dig_p9 as i64);

    let mut var1 = W(t_fine as i64) - W(128000);
    let mut var2 = var1 * var1 * p6;
    var2 += (var1 * p5) << 17;
    var2 += p4 << 35;
    var1 = ((var1 * var1 * p3) >> 8) + ((var1 * p2) << 12);
    var1 = ((W(1i64 << 47) + var1) * p1) >> 33;
    if var1.0 == 0 {
        return 0;
    }

    let mut p = W(1_048_576i64) - W(adc_p as i64);
    p = ((p << 31) - var2) * W(3125) / var1;
    var1 = (p9 * (p >> 13) * (p >> 13)) >> 25;
    var2 = (p8 * p) >> 19;
    p = ((p + var1 + var2) >> 8) + (p7 << 4);
    p.0
}

/// Convert a Q24.8 pressure to pascals rounded to two decimals.
pub fn pressure_pascal(q24_8: i64) -> f64 {
    ((q24_8 * 100 + 128) >> 8) as f64 / 100.0
}

/// Compensate a raw 16-bit humidity sample against a fresh `t_fine`.
///
/// Returns relative humidity in unsigned Q22.10 fixed point; divide by
/// 1024 for %RH. The 32-bit intermediate is clamped into
/// `[0, HUMIDITY_CLAMP_MAX]` before the final shift, so the result always
/// lands in 0..=100 %RH.
pub fn humidity(adc_h: i32, t_fine: i32, cal: &HumidityCalibration) -> u32 {
    let h1 = W(cal.dig_h1 as i32);
    let h2 = W(cal.dig_h2 as i32);
    let h3 = W(cal.dig_h3 as i32);
    let h4 = W(cal.dig_h4 as i32);
    let h5 = W(cal.dig_h5 as i32);
    let h6 = W(cal.dig_h6 as i32);

    let mut v = W(t_fine) - W(76800);

    v = ((((W(adc_h) << 14) - (h4 << 20) - h5 * v) + W(16384)) >> 15)
        * (((((((v * h6) >> 10) * (((v * h3) >> 11) + W(32768))) >> 10) + W(2097152)) * h2
            + W(8192))
            >> 14);

    v -= ((((v >> 15) * (v >> 15)) >> 7) * h1) >> 4;

    let clamped = v.0.clamp(0, HUMIDITY_CLAMP_MAX);
    (clamped >> 12) as u32
}
