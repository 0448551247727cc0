//! Register map of the ATmega16U4/32U4.
//!
//! Addresses are data-space addresses (I/O address + 0x20), as used for memory-mapped access.
//! These have to match the datasheet bit for bit.

use crate::Register;

pub const PINB: Register = Register(0x23);
pub const DDRB: Register = Register(0x24);
pub const PORTB: Register = Register(0x25);
pub const PINC: Register = Register(0x26);
pub const DDRC: Register = Register(0x27);
pub const PORTC: Register = Register(0x28);
pub const PIND: Register = Register(0x29);
pub const DDRD: Register = Register(0x2A);
pub const PORTD: Register = Register(0x2B);

/// TWI bit rate register.
pub const TWBR: Register = Register(0xB8);
/// TWI status register. Bits 7..3 hold the status, bits 1..0 the prescaler.
pub const TWSR: Register = Register(0xB9);
/// TWI data register.
pub const TWDR: Register = Register(0xBB);
/// TWI control register.
pub const TWCR: Register = Register(0xBC);

// TWCR bits
pub const TWINT: u8 = 1 << 7;
pub const TWEA: u8 = 1 << 6;
pub const TWSTA: u8 = 1 << 5;
pub const TWSTO: u8 = 1 << 4;
pub const TWEN: u8 = 1 << 2;

/// TWSR prescaler bits (TWPS1..0).
pub const TWPS_MASK: u8 = 0b0000_0011;
/// Masks off the prescaler and reserved bits of TWSR, leaving the status code.
pub const TW_STATUS_MASK: u8 = 0b1111_1000;

/// SCL line of the TWI (PD0).
pub const TWI_SCL: u8 = 1 << 0;
/// SDA line of the TWI (PD1).
pub const TWI_SDA: u8 = 1 << 1;

/// Size of the memory-mapped register area, covering all of the I/O and extended I/O space.
pub const DATA_SPACE_SIZE: usize = 0x100;

/// The three registers controlling one GPIO port.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Port {
    /// Data direction register, `1` bits are outputs.
    pub ddr: Register,
    /// Output register. Writing `1` to an input pin enables its pull-up.
    pub port: Register,
    /// Input register, the sampled pin levels.
    pub pin: Register,
}

pub const PORT_B: Port = Port { ddr: DDRB, port: PORTB, pin: PINB };
pub const PORT_C: Port = Port { ddr: DDRC, port: PORTC, pin: PINC };
pub const PORT_D: Port = Port { ddr: DDRD, port: PORTD, pin: PIND };

/// Gets the datasheet name of a known register.
pub fn name_of(register: Register) -> Option<&'static str> {
    let name = match register {
        PINB => "PINB",
        DDRB => "DDRB",
        PORTB => "PORTB",
        PINC => "PINC",
        DDRC => "DDRC",
        PORTC => "PORTC",
        PIND => "PIND",
        DDRD => "DDRD",
        PORTD => "PORTD",
        TWBR => "TWBR",
        TWSR => "TWSR",
        TWDR => "TWDR",
        TWCR => "TWCR",
        _ => return None,
    };
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_registers_are_offset_into_data_space() {
        // I/O address 0x03 (PINB) lives at 0x23 in data space
        assert_eq!(PINB.address(), 0x03 + 0x20);
        assert_eq!(PORTD.address(), 0x0B + 0x20);
    }

    #[test]
    fn register_debug_uses_datasheet_names() {
        assert_eq!(format!("{:?}", TWCR), "TWCR");
        assert_eq!(format!("{:?}", Register(0x90)), "Register(0x0090)");
    }

    #[test]
    fn status_mask_keeps_only_status_code() {
        assert_eq!(0x0B & TW_STATUS_MASK, 0x08);
        assert_eq!(0x18 & TW_STATUS_MASK, 0x18);
    }
}
