//! Shared test doubles: register-model I2C and SPI buses plus a no-op
//! delay, all cheap to clone so a test can keep a handle for inspection
//! while the driver owns another.

use core::cell::{Cell, RefCell};

use std::rc::Rc;
use std::vec::Vec;

/// Error produced by the fake buses when their `fail` flag is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakeBusError;

impl embedded_hal::i2c::Error for FakeBusError {
    fn kind(&self) -> embedded_hal::i2c::ErrorKind {
        embedded_hal::i2c::ErrorKind::Other
    }
}

impl embedded_hal::spi::Error for FakeBusError {
    fn kind(&self) -> embedded_hal::spi::ErrorKind {
        embedded_hal::spi::ErrorKind::Other
    }
}

/// Backing store of a [`FakeI2c`], shared across clones.
pub struct FakeBusState {
    /// Full 8-bit register file.
    pub regs: RefCell<[u8; 256]>,
    /// Every pure write frame, in order. Register-select writes that are
    /// part of a read transaction are not recorded.
    pub writes: RefCell<Vec<Vec<u8>>>,
    /// While set, every transaction fails with [`FakeBusError`].
    pub fail: Cell<bool>,
    /// Conversion results staged per command byte; writing that command
    /// to 0xF4 latches the result into the data registers at 0xF6.
    pub command_responses: RefCell<Vec<(u8, Vec<u8>)>>,
}

const COMMAND_REGISTER: u8 = 0xF4;
const DATA_REGISTER: u8 = 0xF6;

/// Register-model I2C bus double.
#[derive(Clone)]
pub struct FakeI2c {
    pub state: Rc<FakeBusState>,
}

impl FakeI2c {
    pub fn new() -> Self {
        Self {
            state: Rc::new(FakeBusState {
                regs: RefCell::new([0; 256]),
                writes: RefCell::new(Vec::new()),
                fail: Cell::new(false),
                command_responses: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn set_register(&self, reg: u8, value: u8) {
        self.state.regs.borrow_mut()[reg as usize] = value;
    }

    /// Stage a conversion result for a command byte (see
    /// [`FakeBusState::command_responses`]).
    pub fn set_command_response(&self, command: u8, bytes: &[u8]) {
        let mut responses = self.state.command_responses.borrow_mut();
        if let Some(entry) = responses.iter_mut().find(|(cmd, _)| *cmd == command) {
            entry.1 = bytes.to_vec();
        } else {
            responses.push((command, bytes.to_vec()));
        }
    }

    /// Writes never touch the register file, so seeded readouts survive
    /// control-register traffic; the only side effect is the conversion
    /// command hook.
    fn apply_write(&self, bytes: &[u8]) {
        let mut regs = self.state.regs.borrow_mut();
        if bytes[0] == COMMAND_REGISTER && bytes.len() == 2 {
            let responses = self.state.command_responses.borrow();
            if let Some((_, result)) = responses.iter().find(|(cmd, _)| *cmd == bytes[1]) {
                for (i, value) in result.iter().enumerate() {
                    regs[(DATA_REGISTER as usize + i) & 0xFF] = *value;
                }
            }
        }
    }
}

impl embedded_hal::i2c::ErrorType for FakeI2c {
    type Error = FakeBusError;
}

impl embedded_hal_async::i2c::I2c for FakeI2c {
    async fn transaction(
        &mut self,
        _address: u8,
        operations: &mut [embedded_hal::i2c::Operation<'_>],
    ) -> Result<(), Self::Error> {
        if self.state.fail.get() {
            return Err(FakeBusError);
        }

        let has_read = operations
            .iter()
            .any(|op| matches!(op, embedded_hal::i2c::Operation::Read(_)));
        let mut pointer = 0usize;
        for op in operations {
            match op {
                embedded_hal::i2c::Operation::Write(bytes) => {
                    if has_read {
                        // register select ahead of a read
                        pointer = bytes[0] as usize;
                    } else {
                        self.state.writes.borrow_mut().push(bytes.to_vec());
                        self.apply_write(bytes);
                    }
                }
                embedded_hal::i2c::Operation::Read(buf) => {
                    let regs = self.state.regs.borrow();
                    for byte in buf.iter_mut() {
                        *byte = regs[pointer & 0xFF];
                        pointer += 1;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Backing store of a [`FakeSpi`], shared across clones.
pub struct FakeSpiState {
    /// Every outgoing frame, in order.
    pub frames: RefCell<Vec<Vec<u8>>>,
    /// Fixed reply clocked out for every transfer.
    pub response: [u8; 2],
    /// While set, every transaction fails with [`FakeBusError`].
    pub fail: Cell<bool>,
}

/// Full-duplex SPI device double with a fixed two-byte reply.
#[derive(Clone)]
pub struct FakeSpi {
    pub state: Rc<FakeSpiState>,
}

impl FakeSpi {
    pub fn new(response: [u8; 2]) -> Self {
        Self {
            state: Rc::new(FakeSpiState {
                frames: RefCell::new(Vec::new()),
                response,
                fail: Cell::new(false),
            }),
        }
    }

    fn reply_into(&self, buf: &mut [u8]) {
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = self.state.response.get(i).copied().unwrap_or(0);
        }
    }
}

impl embedded_hal::spi::ErrorType for FakeSpi {
    type Error = FakeBusError;
}

impl embedded_hal_async::spi::SpiDevice<u8> for FakeSpi {
    async fn transaction(
        &mut self,
        operations: &mut [embedded_hal::spi::Operation<'_, u8>],
    ) -> Result<(), Self::Error> {
        if self.state.fail.get() {
            return Err(FakeBusError);
        }

        for op in operations {
            match op {
                embedded_hal::spi::Operation::Write(bytes) => {
                    self.state.frames.borrow_mut().push(bytes.to_vec());
                }
                embedded_hal::spi::Operation::Read(buf) => {
                    self.reply_into(buf);
                }
                embedded_hal::spi::Operation::Transfer(read, write) => {
                    self.state.frames.borrow_mut().push(write.to_vec());
                    self.reply_into(read);
                }
                embedded_hal::spi::Operation::TransferInPlace(buf) => {
                    self.state.frames.borrow_mut().push(buf.to_vec());
                    self.reply_into(buf);
                }
                embedded_hal::spi::Operation::DelayNs(_) => {}
            }
        }
        Ok(())
    }
}

/// Delay double that returns immediately.
#[derive(Clone, Copy)]
pub struct NoopDelay;

impl embedded_hal_async::delay::DelayNs for NoopDelay {
    async fn delay_ns(&mut self, _ns: u32) {}
}

/// [`AdcChannel`](crate::adc::AdcChannel) double reporting fixed readings.
pub struct FixedChannel {
    value: u16,
    ratio: f64,
    pub ratio_reads: Cell<u32>,
}

impl FixedChannel {
    pub fn new(value: u16, ratio: f64) -> Self {
        Self {
            value,
            ratio,
            ratio_reads: Cell::new(0),
        }
    }
}

impl crate::adc::AdcChannel for FixedChannel {
    type Error = FakeBusError;

    async fn read_value(&mut self) -> Result<u16, Self::Error> {
        Ok(self.value)
    }

    async fn read_ratio(&mut self) -> Result<f64, Self::Error> {
        self.ratio_reads.set(self.ratio_reads.get() + 1);
        Ok(self.ratio)
    }
}
