//! I2C master on the TWI unit and the devices read through it.

mod tc74;
mod twi;
pub mod status;

use crate::{HwError, HwResult};
use log::{trace, warn};
use std::fmt::Debug;
pub use tc74::*;
pub use twi::*;

/// Transfer direction, sent as the R/W bit of the address byte.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Direction {
    Write,
    Read,
}

/// Builds the address byte (SLA+R/W) for a 7-bit device address.
pub fn address_byte(address: u8, direction: Direction) -> u8 {
    let rw = match direction {
        Direction::Write => 0,
        Direction::Read => 1,
    };
    (address << 1) | rw
}

/// Byte-level I2C master operations.
///
/// A transfer is `start`, any number of byte reads or writes in the direction given by the
/// address byte, then `stop`.
pub trait TwiMaster: Debug {
    /// Sets up the pins, the bit rate and enables the TWI unit.
    fn initialize_bus(&mut self) -> HwResult<()>;

    /// Sends a start condition followed by the address byte (SLA+R/W).
    ///
    /// Fails with [HwError::BusError](crate::HwError::BusError) if the start condition was not
    /// confirmed, in which case the address byte is not sent, and with
    /// [HwError::DeviceNotFound](crate::HwError::DeviceNotFound) if it was not acknowledged.
    fn start(&mut self, address_and_direction: u8) -> HwResult<()>;

    /// Receives a byte and acknowledges it, asking the device for more.
    fn read_byte_with_ack(&mut self) -> HwResult<u8>;

    /// Receives a byte without acknowledging it, ending the read.
    fn read_byte_without_ack(&mut self) -> HwResult<u8>;

    /// Transmits a byte. Fails if the device does not acknowledge it.
    fn write_byte(&mut self, byte: u8) -> HwResult<()>;

    /// Sends a stop condition and waits until it has been executed.
    fn stop(&mut self) -> HwResult<()>;

    /// Reads `buffer.len()` bytes from the device in one transfer.
    ///
    /// Once the start condition has gone through, the transfer ends with a stop even if a later
    /// step fails.
    fn read_bytes(&mut self, address: u8, buffer: &mut [u8]) -> HwResult<()> {
        if buffer.is_empty() {
            return Err(HwError::InvalidArgument);
        }
        begin_transfer(self, address_byte(address, Direction::Read))?;
        let count = buffer.len();
        let result = buffer.iter_mut().enumerate().try_for_each(|(i, byte)| -> HwResult<()> {
            *byte = if i + 1 < count {
                self.read_byte_with_ack()?
            } else {
                self.read_byte_without_ack()?
            };
            Ok(())
        });
        end_transfer(self, result)?;
        trace!("Read {:02x?} from {:#04x}", buffer, address);
        Ok(())
    }

    /// Writes all bytes to the device in one transfer.
    ///
    /// Stops at the first byte that is not acknowledged, releasing the bus.
    fn write_bytes(&mut self, address: u8, data: &[u8]) -> HwResult<()> {
        begin_transfer(self, address_byte(address, Direction::Write))?;
        let result = data.iter().try_for_each(|&byte| self.write_byte(byte));
        end_transfer(self, result)?;
        trace!("Wrote {:02x?} to {:#04x}", data, address);
        Ok(())
    }
}

/// Sends the start condition and the address byte.
///
/// A device that does not answer still leaves the bus claimed by the start condition, so it is
/// released before the error is returned.
pub(crate) fn begin_transfer<M: TwiMaster + ?Sized>(
    bus: &mut M,
    address_and_direction: u8,
) -> HwResult<()> {
    match bus.start(address_and_direction) {
        Err(err @ HwError::DeviceNotFound { .. }) => {
            bus.stop()?;
            Err(err)
        }
        result => result,
    }
}

/// Sends the stop condition after the bytes of a transfer, whatever `result` is.
///
/// The transfer's own error wins over one from the stop.
pub(crate) fn end_transfer<M: TwiMaster + ?Sized, T>(
    bus: &mut M,
    result: HwResult<T>,
) -> HwResult<T> {
    if let Err(err) = &result {
        warn!("Transfer failed, releasing the bus: {}", err);
    }
    let stopped = bus.stop();
    let value = result?;
    stopped?;
    Ok(value)
}
