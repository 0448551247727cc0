use crate::i2c::status::*;
use crate::regs::{TWCR, TWDR, TWEA, TWEN, TWINT, TWPS_MASK, TWSR, TWSTA, TWSTO, TW_STATUS_MASK};
use crate::sim::{DataSpace, SimPeripheral};
use crate::Register;
use log::trace;

/// Faults the simulated TWI unit can be told to produce.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TwiFaults {
    /// Start conditions fail with arbitration lost.
    pub no_start: bool,
    /// TWINT never comes back and TWSTO never clears.
    pub hang: bool,
    /// Data bytes written by the master are not acknowledged.
    pub nack_data: bool,
    /// The reserved TWSR bit 2 reads as one.
    pub reserved_status_bits: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Phase {
    Idle,
    AddressPending,
    Transmitting,
    Receiving,
    Rejected,
}

/// Model of a TC74 digital temperature sensor.
///
/// Register 0 holds the temperature, register 1 the configuration. The first byte of a write
/// transfer selects the register later reads return.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SimTc74 {
    address: u8,
    temperature: u8,
    config: u8,
    pointer: u8,
    pointer_pending: bool,
}

impl SimTc74 {
    const READ_TEMPERATURE: u8 = 0x00;
    const READ_WRITE_CONFIG: u8 = 0x01;
    const STANDBY: u8 = 0x80;
    const DATA_READY: u8 = 0x40;

    pub fn new(address: u8) -> Self {
        SimTc74 {
            address,
            temperature: 0,
            config: 0,
            pointer: Self::READ_TEMPERATURE,
            pointer_pending: false,
        }
    }

    pub fn with_temperature(mut self, celsius: i8) -> Self {
        self.set_temperature(celsius);
        self
    }

    pub fn set_temperature(&mut self, celsius: i8) {
        self.temperature = celsius as u8;
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn is_standby(&self) -> bool {
        self.config & Self::STANDBY != 0
    }

    fn begin(&mut self, read: bool) {
        self.pointer_pending = !read;
    }

    fn write(&mut self, byte: u8) -> bool {
        if self.pointer_pending {
            self.pointer_pending = false;
            if byte > Self::READ_WRITE_CONFIG {
                return false;
            }
            self.pointer = byte;
        } else if self.pointer == Self::READ_WRITE_CONFIG {
            self.config = byte & Self::STANDBY;
        }
        true
    }

    fn read(&self) -> u8 {
        match self.pointer {
            Self::READ_WRITE_CONFIG => self.config | Self::DATA_READY,
            _ => self.temperature,
        }
    }
}

/// Model of the TWI unit in master mode, with an optional TC74 on the bus.
///
/// Writing TWCR with TWINT and TWEN set runs one bus operation, picked the way the hardware
/// does: stop, start, address, then data depending on the transfer state.
#[derive(Debug)]
pub struct SimTwi {
    device: Option<SimTc74>,
    faults: TwiFaults,
    phase: Phase,
    status: u8,
    starts: u32,
    stops: u32,
    addresses: Vec<u8>,
    transmitted: Vec<u8>,
}

impl SimTwi {
    pub fn new() -> Self {
        SimTwi {
            device: None,
            faults: TwiFaults::default(),
            phase: Phase::Idle,
            status: NO_INFO,
            starts: 0,
            stops: 0,
            addresses: Vec::new(),
            transmitted: Vec::new(),
        }
    }

    pub fn with_device(mut self, device: SimTc74) -> Self {
        self.device = Some(device);
        self
    }

    pub fn with_faults(mut self, faults: TwiFaults) -> Self {
        self.faults = faults;
        self
    }

    pub fn device_mut(&mut self) -> Option<&mut SimTc74> {
        self.device.as_mut()
    }

    pub fn set_faults(&mut self, faults: TwiFaults) {
        self.faults = faults;
    }

    /// Start conditions requested so far.
    pub fn starts(&self) -> u32 {
        self.starts
    }

    pub fn stops(&self) -> u32 {
        self.stops
    }

    /// Address bytes (SLA+R/W) that went out on the bus.
    pub fn addresses(&self) -> &[u8] {
        &self.addresses
    }

    /// Data bytes the master transmitted.
    pub fn transmitted(&self) -> &[u8] {
        &self.transmitted
    }

    fn noise(&self) -> u8 {
        if self.faults.reserved_status_bits { 0b0000_0100 } else { 0 }
    }

    fn publish_status(&self, memory: &mut DataSpace) {
        let twsr = &mut memory[TWSR.address() as usize];
        *twsr = self.status | (*twsr & TWPS_MASK) | self.noise();
    }

    fn run(&mut self, memory: &mut DataSpace, control: u8) {
        if control & TWSTO != 0 {
            trace!("Simulated TWI stop");
            self.stops += 1;
            self.phase = Phase::Idle;
            self.status = NO_INFO;
            if !self.faults.hang {
                memory[TWCR.address() as usize] &= !TWSTO;
            }
            self.publish_status(memory);
            return;
        }

        self.status = if control & TWSTA != 0 {
            self.starts += 1;
            if self.faults.no_start {
                ARB_LOST
            } else {
                let repeated = self.phase != Phase::Idle;
                self.phase = Phase::AddressPending;
                if repeated { REP_START } else { START }
            }
        } else {
            match self.phase {
                Phase::AddressPending => self.address(memory[TWDR.address() as usize]),
                Phase::Transmitting => self.transmit(memory[TWDR.address() as usize]),
                Phase::Receiving => {
                    memory[TWDR.address() as usize] = self.device.as_ref().map_or(0xFF, |d| d.read());
                    if control & TWEA != 0 { MR_DATA_ACK } else { MR_DATA_NACK }
                }
                Phase::Idle | Phase::Rejected => BUS_ERROR,
            }
        };
        trace!("Simulated TWI status {:#04x}", self.status);

        self.publish_status(memory);
        if !self.faults.hang {
            memory[TWCR.address() as usize] |= TWINT;
        }
    }

    fn address(&mut self, sla: u8) -> u8 {
        self.addresses.push(sla);
        let read = sla & 0x01 != 0;
        match self.device.as_mut() {
            Some(device) if device.address == sla >> 1 => {
                device.begin(read);
                self.phase = if read { Phase::Receiving } else { Phase::Transmitting };
                if read { MR_SLA_ACK } else { MT_SLA_ACK }
            }
            _ => {
                self.phase = Phase::Rejected;
                if read { MR_SLA_NACK } else { MT_SLA_NACK }
            }
        }
    }

    fn transmit(&mut self, byte: u8) -> u8 {
        self.transmitted.push(byte);
        let acked = self.device.as_mut().is_some_and(|device| device.write(byte));
        if acked && !self.faults.nack_data {
            MT_DATA_ACK
        } else {
            MT_DATA_NACK
        }
    }
}

impl Default for SimTwi {
    fn default() -> Self {
        Self::new()
    }
}

impl SimPeripheral for SimTwi {
    fn on_write(&mut self, memory: &mut DataSpace, register: Register, _previous: u8) {
        if register == TWSR {
            // Only the prescaler bits are writable.
            let written = memory[TWSR.address() as usize] & TWPS_MASK;
            memory[TWSR.address() as usize] = (self.status & TW_STATUS_MASK) | written | self.noise();
            return;
        }
        if register != TWCR {
            return;
        }

        let control = memory[TWCR.address() as usize];
        if control & TWINT == 0 || control & TWEN == 0 {
            return;
        }
        // Writing a one clears the flag.
        memory[TWCR.address() as usize] &= !TWINT;
        self.run(memory, control);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus() -> (SimTwi, DataSpace) {
        let twi = SimTwi::new().with_device(SimTc74::new(0x4D).with_temperature(-10));
        (twi, [0; crate::regs::DATA_SPACE_SIZE])
    }

    fn control(twi: &mut SimTwi, memory: &mut DataSpace, value: u8) {
        memory[TWCR.address() as usize] = value;
        twi.on_write(memory, TWCR, 0);
    }

    fn status(memory: &DataSpace) -> u8 {
        memory[TWSR.address() as usize] & TW_STATUS_MASK
    }

    #[test]
    fn read_transfer_walks_through_the_states() {
        let (mut twi, mut memory) = bus();

        control(&mut twi, &mut memory, TWINT | TWSTA | TWEN);
        assert_eq!(status(&memory), START);
        assert_ne!(memory[TWCR.address() as usize] & TWINT, 0);

        memory[TWDR.address() as usize] = (0x4D << 1) | 1;
        control(&mut twi, &mut memory, TWINT | TWEN);
        assert_eq!(status(&memory), MR_SLA_ACK);

        control(&mut twi, &mut memory, TWINT | TWEN);
        assert_eq!(status(&memory), MR_DATA_NACK);
        assert_eq!(memory[TWDR.address() as usize], 0xF6);

        control(&mut twi, &mut memory, TWINT | TWEN | TWSTO);
        assert_eq!(memory[TWCR.address() as usize] & TWSTO, 0);
        assert_eq!(twi.stops(), 1);
        assert_eq!(twi.addresses(), &[0x9B]);
    }

    #[test]
    fn unknown_address_is_not_acknowledged() {
        let (mut twi, mut memory) = bus();
        control(&mut twi, &mut memory, TWINT | TWSTA | TWEN);
        memory[TWDR.address() as usize] = 0x48 << 1;
        control(&mut twi, &mut memory, TWINT | TWEN);
        assert_eq!(status(&memory), MT_SLA_NACK);
    }

    #[test]
    fn second_start_is_a_repeated_start() {
        let (mut twi, mut memory) = bus();
        control(&mut twi, &mut memory, TWINT | TWSTA | TWEN);
        control(&mut twi, &mut memory, TWINT | TWSTA | TWEN);
        assert_eq!(status(&memory), REP_START);
    }

    #[test]
    fn prescaler_bits_survive_status_updates() {
        let (mut twi, mut memory) = bus();
        twi.set_faults(TwiFaults {
            reserved_status_bits: true,
            ..TwiFaults::default()
        });
        memory[TWSR.address() as usize] = 0b11;
        twi.on_write(&mut memory, TWSR, 0);
        control(&mut twi, &mut memory, TWINT | TWSTA | TWEN);
        assert_eq!(memory[TWSR.address() as usize], START | 0b111);
    }

    #[test]
    fn hang_leaves_the_flags_alone() {
        let (mut twi, mut memory) = bus();
        twi.set_faults(TwiFaults {
            hang: true,
            ..TwiFaults::default()
        });
        control(&mut twi, &mut memory, TWINT | TWSTA | TWEN);
        assert_eq!(memory[TWCR.address() as usize] & TWINT, 0);
        control(&mut twi, &mut memory, TWINT | TWEN | TWSTO);
        assert_ne!(memory[TWCR.address() as usize] & TWSTO, 0);
    }

    #[test]
    fn tc74_pointer_selects_the_config_register() {
        let mut sensor = SimTc74::new(0x4D).with_temperature(24);
        sensor.begin(false);
        assert!(sensor.write(0x01));
        assert!(sensor.write(0x80));
        assert!(sensor.is_standby());
        sensor.begin(true);
        assert_eq!(sensor.read(), 0xC0);

        sensor.begin(false);
        assert!(sensor.write(0x00));
        assert_eq!(sensor.read(), 24);
        sensor.begin(false);
        assert!(!sensor.write(0x07));
    }
}
