//! Protocol drivers for the AVR teaching board: an HD44780 character LCD on a parallel bus and
//! the TWI (I2C) master used to read a TC74 temperature sensor.
//!
//! Every driver talks to the hardware through a [RegisterFile], so the same code runs against
//! a memory-mapped register image ([raw::MappedRegisterFile]) or the simulated board in [sim].

pub mod delay;
pub mod i2c;
pub mod lcd;
pub mod poll;
pub mod raw;
pub mod regs;
pub mod sim;

use std::fmt::{Debug, Display, Formatter};
use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum HwError {
    /// The start condition was not confirmed by the TWI hardware.
    #[error("start condition failed (status {status:#04x})")]
    BusError { status: u8 },
    /// No device acknowledged the address byte.
    #[error("device {address:#04x} not found (status {status:#04x})")]
    DeviceNotFound { address: u8, status: u8 },
    /// A transmitted data byte was not acknowledged.
    #[error("data byte not acknowledged (status {status:#04x})")]
    StatusError { status: u8 },
    /// A flag never reached the expected state within the poll budget.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("invalid argument")]
    InvalidArgument,
    #[error("the feature is not supported by this driver")]
    NotSupported,
    #[error("IO error: {0}")]
    Io(std::io::ErrorKind),
    #[error("error: {0}")]
    Other(String),
}

impl From<std::io::Error> for HwError {
    fn from(err: std::io::Error) -> Self {
        HwError::Io(err.kind())
    }
}

pub type HwResult<T> = Result<T, HwError>;

/// Data-space address of an 8-bit I/O register.
///
/// The known registers of the target are listed in [regs].
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Register(pub u16);

impl Register {
    pub fn address(&self) -> u16 {
        self.0
    }
}

impl Debug for Register {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match regs::name_of(*self) {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "Register({:#06x})", self.0),
        }
    }
}

impl Display for Register {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

/// Access to the memory-mapped I/O registers of the microcontroller.
///
/// Implementations use interior mutability, so a single register file can be shared by the LCD
/// and TWI drivers the same way both peripherals share the data space on the chip.
pub trait RegisterFile: Debug {
    /// Reads the current value of the register.
    fn read(&self, register: Register) -> HwResult<u8>;

    /// Writes a value to the register.
    fn write(&self, register: Register, value: u8) -> HwResult<()>;

    /// Sets the bits of `mask` in the register, leaving the rest untouched.
    fn set_bits(&self, register: Register, mask: u8) -> HwResult<()> {
        let value = self.read(register)?;
        self.write(register, value | mask)
    }

    /// Clears the bits of `mask` in the register, leaving the rest untouched.
    fn clear_bits(&self, register: Register, mask: u8) -> HwResult<()> {
        let value = self.read(register)?;
        self.write(register, value & !mask)
    }

    /// Replaces the bits selected by `mask` with the corresponding bits of `value`.
    fn modify(&self, register: Register, mask: u8, value: u8) -> HwResult<()> {
        let current = self.read(register)?;
        self.write(register, (current & !mask) | (value & mask))
    }

    /// Checks whether any bit of `mask` is set in the register.
    fn is_set(&self, register: Register, mask: u8) -> HwResult<bool> {
        Ok(self.read(register)? & mask != 0)
    }
}

/// Builds a single-bit mask, rejecting bit positions outside of a byte.
pub fn bit(position: u8) -> HwResult<u8> {
    if position > 7 {
        return Err(HwError::InvalidArgument);
    }
    Ok(1 << position)
}
