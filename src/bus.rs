//! Register bus plumbing shared by the I2C drivers.
//!
//! Two pieces live here: [`SharedI2c`], which lets several drivers hold
//! handles onto one physical bus behind an async mutex, and [`Registers`],
//! a byte-addressed register window over any [`I2c`] implementation.
//!
//! The platform HAL owns the actual bus; this module only adapts it. Each
//! locked region covers exactly one transaction, so a multi-byte transfer
//! can never interleave with another driver's traffic.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embedded_hal_async::i2c::{ErrorType, I2c, Operation};

/// Handle onto a shared async I2C bus.
///
/// Construct one per driver from a reference to the bus mutex; every
/// transaction takes the mutex for its own duration and yields to the
/// executor while the transfer is in flight.
pub struct SharedI2c<'a, T> {
    bus: &'a Mutex<CriticalSectionRawMutex, T>,
}

impl<'a, T> SharedI2c<'a, T> {
    #[inline]
    pub const fn new(bus: &'a Mutex<CriticalSectionRawMutex, T>) -> Self {
        Self { bus }
    }
}

impl<T: ErrorType> ErrorType for SharedI2c<'_, T> {
    type Error = T::Error;
}

impl<T: I2c> I2c for SharedI2c<'_, T> {
    #[inline]
    async fn read(&mut self, address: u8, read: &mut [u8]) -> Result<(), Self::Error> {
        self.bus.lock().await.read(address, read).await
    }

    #[inline]
    async fn write(&mut self, address: u8, write: &[u8]) -> Result<(), Self::Error> {
        self.bus.lock().await.write(address, write).await
    }

    #[inline]
    async fn write_read(
        &mut self,
        address: u8,
        write: &[u8],
        read: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.bus.lock().await.write_read(address, write, read).await
    }

    #[inline]
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.bus.lock().await.transaction(address, operations).await
    }
}

/// Byte-addressed register window over an I2C device.
///
/// Wraps a bus handle together with the 7-bit device address and exposes
/// the small read/write vocabulary the register-mapped sensors need.
/// Multi-byte values are returned in the endianness the datasheet
/// specifies, so both orders are available.
pub struct Registers<I> {
    i2c: I,
    address: u8,
}

impl<I: I2c> Registers<I> {
    pub const fn new(i2c: I, address: u8) -> Self {
        Self { i2c, address }
    }

    pub const fn address(&self) -> u8 {
        self.address
    }

    /// Read a single register.
    pub async fn read_u8(&mut self, reg: u8) -> Result<u8, I::Error> {
        let mut buf = [0u8; 1];
        self.i2c.write_read(self.address, &[reg], &mut buf).await?;
        Ok(buf[0])
    }

    /// Burst-read `buf.len()` bytes starting at `reg`.
    pub async fn read_into(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), I::Error> {
        self.i2c.write_read(self.address, &[reg], buf).await
    }

    /// Read a 16-bit register pair, most significant byte first.
    pub async fn read_u16_be(&mut self, reg: u8) -> Result<u16, I::Error> {
        let mut buf = [0u8; 2];
        self.i2c.write_read(self.address, &[reg], &mut buf).await?;
        Ok(u16::from_be_bytes(buf))
    }

    /// Read a 16-bit register pair, least significant byte first.
    pub async fn read_u16_le(&mut self, reg: u8) -> Result<u16, I::Error> {
        let mut buf = [0u8; 2];
        self.i2c.write_read(self.address, &[reg], &mut buf).await?;
        Ok(u16::from_le_bytes(buf))
    }

    /// Write a single register.
    pub async fn write_u8(&mut self, reg: u8, value: u8) -> Result<(), I::Error> {
        self.i2c.write(self.address, &[reg, value]).await
    }

    /// Release the underlying bus handle.
    pub fn free(self) -> I {
        self.i2c
    }
}
