//! Error types shared by every driver in the crate.
//!
//! All drivers are generic over the bus error `E` of the HAL implementation
//! they were constructed with, so bus-level failures surface unchanged
//! inside the crate's own error enum.

use thiserror_no_std::Error;

/// Why a one-shot device initialization sequence failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InitFailure<E> {
    /// The chip-id register did not contain the signature expected for the
    /// configured variant. Usually a wiring or bus-address mistake.
    #[error("chip id mismatch: expected {expected:#04x}, found {found:#04x}")]
    ChipIdMismatch { expected: u8, found: u8 },

    /// A bus transaction failed while probing the chip, loading calibration
    /// coefficients, or programming control registers.
    #[error("bus error during initialization")]
    Bus(E),

    /// A previous initialization attempt failed and the device is latched
    /// faulted. Lazy accessors never retry; call `initialize` to request a
    /// fresh attempt.
    #[error("device is faulted after a failed initialization attempt")]
    Faulted,
}

/// Unified error type for the sensor and converter drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error<E> {
    /// Initialization failed; fatal until explicitly re-initialized.
    #[error("initialization failed: {0}")]
    Initialization(InitFailure<E>),

    /// A single bus transaction failed outside initialization. Surfaced to
    /// the caller without retry; hardware state after a partial transfer is
    /// undefined.
    #[error("bus transaction failed")]
    BusIo(E),

    /// An ADC channel index outside `0..channel_count` was requested.
    #[error("channel {channel} out of range for a {count}-channel converter")]
    ChannelRange { channel: usize, count: usize },

    /// The ADC channel is already reserved by another caller.
    #[error("channel {channel} is already acquired")]
    ChannelBusy { channel: usize },

    /// The device was disposed and its bus handle released.
    #[error("device has been disposed")]
    Disposed,

    /// Humidity was requested from a variant without a humidity sensing
    /// element.
    #[error("sensor variant does not support humidity")]
    HumidityUnsupported,
}

impl<E> Error<E> {
    /// Wrap a bus error that occurred during the initialization sequence.
    pub(crate) fn init_bus(err: E) -> Self {
        Error::Initialization(InitFailure::Bus(err))
    }
}
