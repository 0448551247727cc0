use crate::i2c::status::{MR_SLA_ACK, MT_DATA_ACK, MT_SLA_ACK, REP_START, START, TwiStatus};
use crate::i2c::TwiMaster;
use crate::poll::PollPolicy;
use crate::regs::{
    PORT_D, TWBR, TWCR, TWDR, TWEA, TWEN, TWINT, TWI_SCL, TWI_SDA, TWPS_MASK, TWSR, TWSTA, TWSTO,
    TW_STATUS_MASK,
};
use crate::{HwError, HwResult, RegisterFile};
use log::{debug, trace, warn};

/// TWI bit rate prescaler, stored in the TWPS bits of TWSR.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Prescaler {
    Div1,
    Div4,
    Div16,
    Div64,
}

impl Prescaler {
    pub fn bits(&self) -> u8 {
        match self {
            Prescaler::Div1 => 0b00,
            Prescaler::Div4 => 0b01,
            Prescaler::Div16 => 0b10,
            Prescaler::Div64 => 0b11,
        }
    }

    pub fn factor(&self) -> u32 {
        4u32.pow(self.bits() as u32)
    }
}

/// Clock settings of the TWI unit.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TwiConfig {
    /// CPU clock frequency.
    pub cpu_hz: u32,
    /// Target SCL frequency.
    pub scl_hz: u32,
    pub prescaler: Prescaler,
    /// How long to wait for TWINT and TWSTO.
    pub poll: PollPolicy,
}

impl TwiConfig {
    /// Computes TWBR for `SCL = CPU / (16 + 2 * TWBR * prescaler)`.
    pub fn bit_rate_divisor(&self) -> HwResult<u8> {
        if self.scl_hz == 0 || self.cpu_hz / self.scl_hz < 16 {
            return Err(HwError::InvalidArgument);
        }
        let divisor = (self.cpu_hz / self.scl_hz - 16) / (2 * self.prescaler.factor());
        u8::try_from(divisor).map_err(|_| HwError::InvalidArgument)
    }

    /// The SCL frequency the configured divisor actually produces.
    pub fn effective_scl_hz(&self) -> HwResult<u32> {
        let divisor = self.bit_rate_divisor()? as u32;
        Ok(self.cpu_hz / (16 + 2 * divisor * self.prescaler.factor()))
    }
}

impl Default for TwiConfig {
    /// 2 MHz CPU clock, about 41.7 kHz on SCL.
    fn default() -> Self {
        TwiConfig {
            cpu_hz: 2_000_000,
            scl_hz: 41_500,
            prescaler: Prescaler::Div1,
            poll: PollPolicy::default(),
        }
    }
}

/// I2C master driving the TWI registers directly.
#[derive(Debug)]
pub struct HardwareTwi<'a> {
    registers: &'a dyn RegisterFile,
    config: TwiConfig,
}

impl<'a> HardwareTwi<'a> {
    pub fn new(registers: &'a dyn RegisterFile, config: TwiConfig) -> Self {
        HardwareTwi { registers, config }
    }

    pub fn config(&self) -> &TwiConfig {
        &self.config
    }

    /// Status code of the last bus operation, prescaler bits masked off.
    pub fn status(&self) -> HwResult<u8> {
        Ok(self.registers.read(TWSR)? & TW_STATUS_MASK)
    }

    fn wait_for_interrupt(&self) -> HwResult<()> {
        self.config
            .poll
            .wait_for("TWINT", || self.registers.is_set(TWCR, TWINT))?;
        Ok(())
    }

    /// Starts a bus operation and returns the resulting status.
    fn execute(&self, control: u8) -> HwResult<u8> {
        self.registers.write(TWCR, TWINT | TWEN | control)?;
        self.wait_for_interrupt()?;
        let status = self.status()?;
        trace!("TWI: {}", TwiStatus::from_status(status));
        Ok(status)
    }
}

impl TwiMaster for HardwareTwi<'_> {
    fn initialize_bus(&mut self) -> HwResult<()> {
        let divisor = self.config.bit_rate_divisor()?;
        debug!(
            "Initializing TWI: TWBR {}, SCL {} Hz",
            divisor,
            self.config.effective_scl_hz()?
        );

        // SCL and SDA as inputs with pull-ups
        self.registers.clear_bits(PORT_D.ddr, TWI_SCL | TWI_SDA)?;
        self.registers.set_bits(PORT_D.port, TWI_SCL | TWI_SDA)?;

        self.registers
            .modify(TWSR, TWPS_MASK, self.config.prescaler.bits())?;
        self.registers.write(TWBR, divisor)?;
        self.registers.write(TWCR, TWEN)?;
        Ok(())
    }

    fn start(&mut self, address_and_direction: u8) -> HwResult<()> {
        let status = self.execute(TWSTA)?;
        if status != START && status != REP_START {
            warn!("TWI start failed: {}", TwiStatus::from_status(status));
            return Err(HwError::BusError { status });
        }

        self.registers.write(TWDR, address_and_direction)?;
        let status = self.execute(0)?;
        let expected = if address_and_direction & 0x01 != 0 {
            MR_SLA_ACK
        } else {
            MT_SLA_ACK
        };
        if status != expected {
            debug!("No ACK for address byte {:#04x}", address_and_direction);
            return Err(HwError::DeviceNotFound {
                address: address_and_direction >> 1,
                status,
            });
        }
        Ok(())
    }

    fn read_byte_with_ack(&mut self) -> HwResult<u8> {
        self.execute(TWEA)?;
        self.registers.read(TWDR)
    }

    fn read_byte_without_ack(&mut self) -> HwResult<u8> {
        self.execute(0)?;
        self.registers.read(TWDR)
    }

    fn write_byte(&mut self, byte: u8) -> HwResult<()> {
        self.registers.write(TWDR, byte)?;
        let status = self.execute(0)?;
        if status != MT_DATA_ACK {
            return Err(HwError::StatusError { status });
        }
        Ok(())
    }

    fn stop(&mut self) -> HwResult<()> {
        self.registers.write(TWCR, TWINT | TWEN | TWSTO)?;
        self.config
            .poll
            .wait_for("TWSTO", || Ok(!self.registers.is_set(TWCR, TWSTO)?))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::{DDRD, PORTD};
    use crate::sim::SimRegisterFile;

    #[test]
    fn default_clock_gives_twbr_16() {
        let config = TwiConfig::default();
        assert_eq!(config.bit_rate_divisor(), Ok(16));
        assert_eq!(config.effective_scl_hz(), Ok(41_666));
    }

    #[test]
    fn prescaler_divides_the_divisor() {
        let config = TwiConfig {
            cpu_hz: 16_000_000,
            scl_hz: 10_000,
            prescaler: Prescaler::Div4,
            ..TwiConfig::default()
        };
        assert_eq!(config.bit_rate_divisor(), Ok(198));
    }

    #[test]
    fn unreachable_frequencies_are_rejected() {
        let too_fast = TwiConfig {
            scl_hz: 400_000,
            ..TwiConfig::default()
        };
        assert_eq!(too_fast.bit_rate_divisor(), Err(HwError::InvalidArgument));
        let too_slow = TwiConfig {
            cpu_hz: 16_000_000,
            scl_hz: 1_000,
            ..TwiConfig::default()
        };
        assert_eq!(too_slow.bit_rate_divisor(), Err(HwError::InvalidArgument));
    }

    #[test]
    fn initialize_bus_sets_pins_and_bit_rate() {
        let registers = SimRegisterFile::new();
        registers.write(DDRD, 0xFF).unwrap();
        registers.write(TWSR, 0b11).unwrap();
        let mut twi = HardwareTwi::new(&registers, TwiConfig::default());
        twi.initialize_bus().unwrap();

        assert_eq!(registers.read(DDRD).unwrap(), 0xFC);
        assert_eq!(registers.read(PORTD).unwrap() & 0b11, 0b11);
        assert_eq!(registers.read(TWSR).unwrap() & TWPS_MASK, 0);
        assert_eq!(registers.read(TWBR).unwrap(), 16);
        assert_eq!(registers.read(TWCR).unwrap(), TWEN);
    }
}
