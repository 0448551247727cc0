//! TWSR status codes of the TWI unit in master mode.
//!
//! The codes are only meaningful after masking off the prescaler and reserved bits with
//! [TW_STATUS_MASK](crate::regs::TW_STATUS_MASK).

use std::fmt::{Display, Formatter};

pub const START: u8 = 0x08;
pub const REP_START: u8 = 0x10;
pub const MT_SLA_ACK: u8 = 0x18;
pub const MT_SLA_NACK: u8 = 0x20;
pub const MT_DATA_ACK: u8 = 0x28;
pub const MT_DATA_NACK: u8 = 0x30;
pub const ARB_LOST: u8 = 0x38;
pub const MR_SLA_ACK: u8 = 0x40;
pub const MR_SLA_NACK: u8 = 0x48;
pub const MR_DATA_ACK: u8 = 0x50;
pub const MR_DATA_NACK: u8 = 0x58;
pub const NO_INFO: u8 = 0xF8;
pub const BUS_ERROR: u8 = 0x00;

/// Decoded master-mode status.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TwiStatus {
    Start,
    RepeatedStart,
    /// SLA+W sent, ACK received.
    AddressWriteAck,
    /// SLA+W sent, NACK received.
    AddressWriteNack,
    DataSentAck,
    DataSentNack,
    ArbitrationLost,
    /// SLA+R sent, ACK received.
    AddressReadAck,
    /// SLA+R sent, NACK received.
    AddressReadNack,
    DataReceivedAck,
    DataReceivedNack,
    NoInfo,
    BusError,
    /// A code not used in master mode.
    Unknown(u8),
}

impl TwiStatus {
    /// Decodes a TWSR value. The prescaler bits are ignored.
    pub fn from_status(status: u8) -> Self {
        match status & crate::regs::TW_STATUS_MASK {
            START => TwiStatus::Start,
            REP_START => TwiStatus::RepeatedStart,
            MT_SLA_ACK => TwiStatus::AddressWriteAck,
            MT_SLA_NACK => TwiStatus::AddressWriteNack,
            MT_DATA_ACK => TwiStatus::DataSentAck,
            MT_DATA_NACK => TwiStatus::DataSentNack,
            ARB_LOST => TwiStatus::ArbitrationLost,
            MR_SLA_ACK => TwiStatus::AddressReadAck,
            MR_SLA_NACK => TwiStatus::AddressReadNack,
            MR_DATA_ACK => TwiStatus::DataReceivedAck,
            MR_DATA_NACK => TwiStatus::DataReceivedNack,
            NO_INFO => TwiStatus::NoInfo,
            BUS_ERROR => TwiStatus::BusError,
            other => TwiStatus::Unknown(other),
        }
    }
}

impl Display for TwiStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            TwiStatus::Start => "start condition transmitted",
            TwiStatus::RepeatedStart => "repeated start condition transmitted",
            TwiStatus::AddressWriteAck => "SLA+W transmitted, ACK received",
            TwiStatus::AddressWriteNack => "SLA+W transmitted, NACK received",
            TwiStatus::DataSentAck => "data transmitted, ACK received",
            TwiStatus::DataSentNack => "data transmitted, NACK received",
            TwiStatus::ArbitrationLost => "arbitration lost",
            TwiStatus::AddressReadAck => "SLA+R transmitted, ACK received",
            TwiStatus::AddressReadNack => "SLA+R transmitted, NACK received",
            TwiStatus::DataReceivedAck => "data received, ACK returned",
            TwiStatus::DataReceivedNack => "data received, NACK returned",
            TwiStatus::NoInfo => "no relevant state information",
            TwiStatus::BusError => "bus error",
            TwiStatus::Unknown(status) => return write!(f, "unknown status {:#04x}", status),
        };
        write!(f, "{}", text)
    }
}
