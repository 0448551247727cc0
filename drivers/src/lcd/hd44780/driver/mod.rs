mod parallel;

use crate::lcd::charset;
use crate::poll::PollPolicy;
use crate::{HwError, HwResult};
use log::warn;
use std::fmt::Debug;
pub use parallel::*;

/// Instruction opcodes and option bits of the HD44780 instruction set.
///
/// An instruction is built by OR-ing a base opcode with its option bits.
pub mod instruction {
    pub const CLEAR_DISPLAY: u8 = 0b00000001;
    pub const RETURN_HOME: u8 = 0b00000010;

    pub const ENTRY_MODE: u8 = 0b00000100;
    /// I/D: move the cursor right (increment the address) after each byte.
    pub const ENTRY_INCREMENT: u8 = 0b00000010;
    /// S: shift the whole display on each write.
    pub const ENTRY_SHIFT: u8 = 0b00000001;

    pub const DISPLAY_CONTROL: u8 = 0b00001000;
    pub const DISPLAY_ON: u8 = 0b00000100;
    pub const CURSOR_ON: u8 = 0b00000010;
    pub const BLINK_ON: u8 = 0b00000001;

    pub const CURSOR_SHIFT: u8 = 0b00010000;
    pub const SHIFT_DISPLAY: u8 = 0b00001000;
    pub const SHIFT_RIGHT: u8 = 0b00000100;

    pub const FUNCTION_SET: u8 = 0b00100000;
    /// DL: 8-bit interface.
    pub const DATA_LENGTH_8BIT: u8 = 0b00010000;
    /// N: two display lines.
    pub const TWO_LINES: u8 = 0b00001000;
    /// F: 5x10 dot font.
    pub const FONT_5X10: u8 = 0b00000100;

    pub const SET_CGRAM_ADDRESS: u8 = 0b01000000;
    pub const SET_DDRAM_ADDRESS: u8 = 0b10000000;

    /// Top bit of the status byte, set while the controller executes an instruction.
    pub const BUSY_FLAG: u8 = 0b10000000;
}

use instruction::*;

/// Low-level interface of an HD44780 controller driver.
///
/// The wiring-specific implementation provides the raw reads and writes plus the two setup steps;
/// the instruction helpers are built on top of [HD44780Driver::write_instruction].
pub trait HD44780Driver: Debug {
    /// Configures the MCU ports used by the display. Has to be called once before anything else.
    fn configure_ports(&mut self) -> HwResult<()>;

    /// Runs the power-on reset sequence of the controller, leaving it in a defined state
    /// regardless of the state it was in before.
    fn initialize_display(&mut self) -> HwResult<()>;

    /// Clears the display and sets the cursor to the home position.
    fn clear_display(&mut self) -> HwResult<()> {
        self.write_instruction(CLEAR_DISPLAY)
    }

    /// Sets the cursor to the home position and undoes any display shift.
    fn return_home(&mut self) -> HwResult<()> {
        self.write_instruction(RETURN_HOME)
    }

    /// Sets the cursor direction and whether the display shifts on each write.
    fn set_entry_mode(&mut self, cursor_direction: CursorDirection, shift: bool) -> HwResult<()> {
        let mut command = ENTRY_MODE;
        if cursor_direction == CursorDirection::Right {
            command |= ENTRY_INCREMENT;
        }
        if shift {
            command |= ENTRY_SHIFT;
        }
        self.write_instruction(command)
    }

    /// Sets the display on/off, cursor on/off, and blinking on/off.
    fn set_display_control(
        &mut self,
        display_on: bool,
        cursor_on: bool,
        blink_on: bool,
    ) -> HwResult<()> {
        let mut command = DISPLAY_CONTROL;
        if display_on {
            command |= DISPLAY_ON;
        }
        if cursor_on {
            command |= CURSOR_ON;
        }
        if blink_on {
            command |= BLINK_ON;
        }
        self.write_instruction(command)
    }

    /// Moves the cursor or shifts the display by one position.
    fn cursor_shift(&mut self, display_shift: bool, direction: CursorDirection) -> HwResult<()> {
        let mut command = CURSOR_SHIFT;
        if display_shift {
            command |= SHIFT_DISPLAY;
        }
        if direction == CursorDirection::Right {
            command |= SHIFT_RIGHT;
        }
        self.write_instruction(command)
    }

    /// Sets the interface width, the number of lines and the font.
    fn function_set(&mut self, eight_bit: bool, two_lines: bool, large_font: bool) -> HwResult<()> {
        let mut command = FUNCTION_SET;
        if eight_bit {
            command |= DATA_LENGTH_8BIT;
        }
        if two_lines {
            command |= TWO_LINES;
        }
        if large_font {
            command |= FONT_5X10;
        }
        self.write_instruction(command)
    }

    /// Sets the CGRAM address.
    fn set_cgram_address(&mut self, address: u8) -> HwResult<()> {
        if address > 0b00111111 {
            return Err(HwError::InvalidArgument);
        }
        self.write_instruction(SET_CGRAM_ADDRESS | address)
    }

    /// Sets the DDRAM address.
    fn set_ddram_address(&mut self, address: u8) -> HwResult<()> {
        if address > 0b01111111 {
            return Err(HwError::InvalidArgument);
        }
        self.write_instruction(SET_DDRAM_ADDRESS | address)
    }

    /// Reads the busy flag and the address counter.
    fn busy_flag_and_address(&mut self) -> HwResult<(bool, u8)> {
        let status = self.read_instruction()?;
        Ok((status & BUSY_FLAG != 0, status & !BUSY_FLAG))
    }

    // Raw transfers, implemented by the wiring-specific driver.

    /// Writes a byte to the instruction register (RS = 0) and waits until the controller
    /// has accepted it. The byte is not validated.
    fn write_instruction(&mut self, instruction: u8) -> HwResult<()>;

    /// Writes a character code to the data register (RS = 1) and waits until the controller
    /// has accepted it.
    fn write_data(&mut self, data: u8) -> HwResult<()>;

    /// Reads the status byte (RS = 0): the busy flag in bit 7 and the address counter below it.
    fn read_instruction(&mut self) -> HwResult<u8>;

    /// Reads the byte at the address counter from DDRAM or CGRAM (RS = 1).
    fn read_data(&mut self) -> HwResult<u8>;
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CursorDirection {
    /// Moves the cursor to the left after writing/reading data.
    Left,
    /// Moves the cursor to the right after writing/reading data.
    Right,
}

/// How the driver waits for the controller to finish a transfer.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BusyStrategy {
    /// Read the busy flag after every byte until it clears. Needs the R/W line.
    PollBusyFlag(PollPolicy),
    /// Sleep for a fixed time after every byte and never read back.
    FixedDelay { micros: u32 },
}

impl BusyStrategy {
    /// Long enough for the slowest instructions (clear display, return home).
    pub const DEFAULT_FIXED_DELAY_US: u32 = 2000;

    pub fn fixed_delay() -> Self {
        BusyStrategy::FixedDelay {
            micros: Self::DEFAULT_FIXED_DELAY_US,
        }
    }
}

impl Default for BusyStrategy {
    fn default() -> Self {
        BusyStrategy::PollBusyFlag(PollPolicy::default())
    }
}

/// Display options applied by [HD44780Driver::initialize_display].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DisplaySettings {
    pub two_lines: bool,
    /// 5x10 dot font instead of 5x8. Only available on single-line displays.
    pub large_font: bool,
    pub display_on: bool,
    pub cursor_on: bool,
    pub blink_on: bool,
    pub cursor_direction: CursorDirection,
    /// Shift the display on each write instead of moving the cursor.
    pub shift_on_write: bool,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        DisplaySettings {
            two_lines: false,
            large_font: true,
            display_on: true,
            cursor_on: true,
            blink_on: false,
            cursor_direction: CursorDirection::Right,
            shift_on_write: true,
        }
    }
}

/// Text output on top of the raw HD44780 transfers.
pub trait HD44780Ext {
    /// Writes the bytes one by one as character codes, stopping at the first NUL.
    fn write_string(&mut self, bytes: &[u8]) -> HwResult<()>;

    /// Writes the decimal representation of the number.
    fn write_number(&mut self, number: i32) -> HwResult<()>;

    /// Writes text, translating it to the character ROM of the display.
    ///
    /// Characters the ROM does not have are written as `?`.
    fn print(&mut self, text: &str) -> HwResult<()>;

    /// Moves the cursor to the given line and column of a two-line display.
    fn set_cursor(&mut self, row: u8, col: u8) -> HwResult<()>;
}

impl<T: ?Sized + HD44780Driver> HD44780Ext for T {
    fn write_string(&mut self, bytes: &[u8]) -> HwResult<()> {
        for &byte in bytes.iter().take_while(|&&byte| byte != 0) {
            self.write_data(byte)?;
        }
        Ok(())
    }

    fn write_number(&mut self, number: i32) -> HwResult<()> {
        let mut buffer = itoa::Buffer::new();
        self.write_string(buffer.format(number).as_bytes())
    }

    fn print(&mut self, text: &str) -> HwResult<()> {
        for c in text.chars() {
            match charset::encode(c) {
                Some(code) => self.write_data(code)?,
                None => {
                    warn!("Character not in the display ROM: {}", c);
                    self.write_data(b'?')?
                }
            }
        }
        Ok(())
    }

    fn set_cursor(&mut self, row: u8, col: u8) -> HwResult<()> {
        if row > 1 || col > 39 {
            return Err(HwError::InvalidArgument);
        }
        self.set_ddram_address(col + 0x40 * row)
    }
}
