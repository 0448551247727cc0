use crate::i2c::{address_byte, begin_transfer, end_transfer, Direction, TwiMaster};
use crate::HwResult;
use log::debug;
use std::fmt::{Display, Formatter};

/// Temperature in whole degrees Celsius, as reported by the sensor.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct Temperature(pub i8);

impl Temperature {
    /// Decodes the two's complement temperature register.
    pub fn from_register(value: u8) -> Self {
        if value & 0x80 == 0 {
            Temperature(value as i8)
        } else {
            // Magnitude of a negative reading; 0x80 is -128 and has no positive counterpart.
            let magnitude = (!value).wrapping_add(1);
            Temperature((magnitude as i8).wrapping_neg())
        }
    }

    pub fn celsius(&self) -> i8 {
        self.0
    }
}

impl Display for Temperature {
    /// Shows an explicit sign, except for zero.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let magnitude = self.0.unsigned_abs();
        match self.0 {
            0 => write!(f, "0"),
            t if t > 0 => write!(f, "+{}", magnitude),
            _ => write!(f, "-{}", magnitude),
        }
    }
}

/// Microchip TC74 digital temperature sensor.
#[derive(Debug)]
pub struct Tc74<'a> {
    bus: &'a mut dyn TwiMaster,
    address: u8,
}

impl<'a> Tc74<'a> {
    /// Address of the TC74A5, the variant on the board.
    pub const DEFAULT_ADDRESS: u8 = 0x4D;

    const READ_TEMPERATURE: u8 = 0x00;
    const READ_WRITE_CONFIG: u8 = 0x01;
    const STANDBY: u8 = 0x80;
    const DATA_READY: u8 = 0x40;

    pub fn new(bus: &'a mut dyn TwiMaster, address: u8) -> Self {
        Tc74 { bus, address }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Reads the temperature register.
    ///
    /// The sensor returns the register selected last, which is the temperature register unless
    /// [Tc74::read_config] or [Tc74::set_standby] ran since.
    pub fn read_temperature(&mut self) -> HwResult<Temperature> {
        let value = self.read_current()?;
        let temperature = Temperature::from_register(value);
        debug!("TC74 at {:#04x}: {} C", self.address, temperature);
        Ok(temperature)
    }

    /// Checks whether a conversion has finished since power-up or standby.
    pub fn is_data_ready(&mut self) -> HwResult<bool> {
        Ok(self.read_config()? & Self::DATA_READY != 0)
    }

    /// Reads the configuration register, then selects the temperature register again.
    pub fn read_config(&mut self) -> HwResult<u8> {
        self.bus
            .write_bytes(self.address, &[Self::READ_WRITE_CONFIG])?;
        let config = self.read_current()?;
        self.bus
            .write_bytes(self.address, &[Self::READ_TEMPERATURE])?;
        Ok(config)
    }

    /// Puts the sensor into standby or wakes it up.
    pub fn set_standby(&mut self, standby: bool) -> HwResult<()> {
        let config = if standby { Self::STANDBY } else { 0 };
        self.bus
            .write_bytes(self.address, &[Self::READ_WRITE_CONFIG, config])?;
        self.bus
            .write_bytes(self.address, &[Self::READ_TEMPERATURE])
    }

    /// Reads one byte from the selected register.
    fn read_current(&mut self) -> HwResult<u8> {
        begin_transfer(&mut *self.bus, address_byte(self.address, Direction::Read))?;
        let result = self.bus.read_byte_without_ack();
        end_transfer(&mut *self.bus, result)
    }
}
