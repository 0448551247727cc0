use crate::lcd::charset;
use crate::lcd::hd44780::driver::instruction::*;
use crate::lcd::hd44780::driver::{BusWidth, LcdPins};
use crate::sim::{DataSpace, SimPeripheral};
use crate::Register;
use log::trace;

/// How long the simulated controller stays busy after a transfer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BusyModel {
    /// Busy until the MCU has spent the datasheet execution time in delays:
    /// 1.52 ms for clear display and return home, 37 us for everything else.
    Timed,
    /// Busy for exactly the given number of status reads. A single delay of 100 us or more
    /// releases it as well, standing in for the fixed waits of the setup sequences.
    Polls(u32),
}

/// Something that happened on the simulated display bus.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LcdEvent {
    /// A nibble latched while the controller runs a 4-bit interface.
    Nibble(u8),
    Instruction(u8),
    Data(u8),
    StatusRead { busy: bool },
    DataRead(u8),
}

/// Internal state of the controller, as far as the MCU can influence it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ControllerState {
    pub eight_bit: bool,
    pub two_lines: bool,
    pub large_font: bool,
    pub display_on: bool,
    pub cursor_on: bool,
    pub blink_on: bool,
    pub increment: bool,
    pub shift: bool,
    /// Address counter.
    pub address: u8,
    /// Whether the address counter points into CGRAM instead of DDRAM.
    pub cgram_selected: bool,
    /// Display shift, in characters.
    pub display_offset: u8,
    pub ddram: [u8; 0x80],
    pub cgram: [u8; 0x40],
}

impl ControllerState {
    fn line_length(&self) -> u8 {
        if self.two_lines { 40 } else { 80 }
    }

    fn step_address(&mut self, forward: bool) {
        self.address = match (self.two_lines, forward, self.address) {
            (true, true, 0x27) => 0x40,
            (true, true, 0x67) => 0x00,
            (true, false, 0x00) => 0x67,
            (true, false, 0x40) => 0x27,
            (false, true, 0x4F) => 0x00,
            (false, false, 0x00) => 0x4F,
            (_, true, address) => (address + 1) & 0x7F,
            (_, false, address) => address.wrapping_sub(1) & 0x7F,
        };
    }

    fn shift_display(&mut self, left: bool) {
        let length = self.line_length();
        let offset = self.display_offset % length;
        self.display_offset = if left {
            (offset + 1) % length
        } else {
            (offset + length - 1) % length
        };
    }
}

impl Default for ControllerState {
    /// State after the internal power-on reset.
    fn default() -> Self {
        ControllerState {
            eight_bit: true,
            two_lines: false,
            large_font: false,
            display_on: false,
            cursor_on: false,
            blink_on: false,
            increment: true,
            shift: false,
            address: 0,
            cgram_selected: false,
            display_offset: 0,
            ddram: [b' '; 0x80],
            cgram: [0; 0x40],
        }
    }
}

/// Model of an HD44780 wired to the MCU ports.
///
/// Writes are latched on the falling edge of E, from the data lines the MCU drives. Reads are served while E is high, from the pin
/// register of the data port, but only on the lines the MCU switched to input.
#[derive(Debug)]
pub struct SimHd44780 {
    pins: LcdPins,
    width: BusWidth,
    busy_model: BusyModel,
    columns: u8,
    state: ControllerState,
    busy_polls_left: u32,
    busy_us_left: u32,
    pending_high_nibble: Option<u8>,
    read_low_nibble: bool,
    read_latch: u8,
    events: Vec<LcdEvent>,
    writes_while_busy: u32,
}

impl SimHd44780 {
    const SLOW_INSTRUCTION_US: u32 = 1520;
    const INSTRUCTION_US: u32 = 37;
    const RELEASE_DELAY_US: u32 = 100;

    pub fn new(pins: LcdPins, width: BusWidth) -> Self {
        SimHd44780 {
            pins,
            width,
            busy_model: BusyModel::Timed,
            columns: 16,
            state: ControllerState::default(),
            busy_polls_left: 0,
            busy_us_left: 0,
            pending_high_nibble: None,
            read_low_nibble: false,
            read_latch: 0,
            events: Vec::new(),
            writes_while_busy: 0,
        }
    }

    pub fn with_busy_model(mut self, busy_model: BusyModel) -> Self {
        self.busy_model = busy_model;
        self
    }

    /// Sets the number of visible characters per line.
    pub fn with_columns(mut self, columns: u8) -> Self {
        self.columns = columns;
        self
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn events(&self) -> &[LcdEvent] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    /// Bytes written to the data register, in order.
    pub fn data_written(&self) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|event| match event {
                LcdEvent::Data(data) => Some(*data),
                _ => None,
            })
            .collect()
    }

    /// How many latches arrived while the controller was still busy.
    pub fn writes_while_busy(&self) -> u32 {
        self.writes_while_busy
    }

    pub fn is_busy(&self) -> bool {
        self.busy_polls_left > 0 || self.busy_us_left > 0
    }

    /// The visible characters of a display line, with the display shift applied.
    pub fn line(&self, row: u8) -> String {
        let length = self.state.line_length() as usize;
        let base = if row == 0 { 0x00 } else { 0x40 };
        (0..self.columns as usize)
            .map(|col| {
                let index = base + (self.state.display_offset as usize + col) % length;
                charset::decode(self.state.ddram[index & 0x7F]).unwrap_or('?')
            })
            .collect()
    }

    /// All visible lines, separated by newlines.
    pub fn text(&self) -> String {
        if self.state.two_lines {
            format!("{}\n{}", self.line(0), self.line(1))
        } else {
            self.line(0)
        }
    }

    fn start_busy(&mut self, slow: bool) {
        match self.busy_model {
            BusyModel::Timed => {
                self.busy_us_left = if slow {
                    Self::SLOW_INSTRUCTION_US
                } else {
                    Self::INSTRUCTION_US
                };
            }
            BusyModel::Polls(polls) => self.busy_polls_left = polls,
        }
    }

    fn status(&self) -> u8 {
        let busy = if self.is_busy() { BUSY_FLAG } else { 0 };
        busy | (self.state.address & !BUSY_FLAG)
    }

    /// Levels of DB7..DB0 as seen by the controller.
    fn bus_byte(&self, port_value: u8) -> u8 {
        match self.width {
            BusWidth::EightBit => port_value,
            // DB3..DB0 are not connected and read as low
            BusWidth::FourBit => (port_value & 0x0F) << 4,
        }
    }

    fn latch(&mut self, port_value: u8, rs: bool) {
        if self.is_busy() {
            self.writes_while_busy += 1;
        }
        self.read_low_nibble = false;

        let bus = self.bus_byte(port_value);
        if self.state.eight_bit {
            self.accept(bus, rs);
            return;
        }

        let nibble = bus >> 4;
        self.events.push(LcdEvent::Nibble(nibble));
        match self.pending_high_nibble.take() {
            None => self.pending_high_nibble = Some(nibble),
            Some(high) => self.accept((high << 4) | nibble, rs),
        }
    }

    fn accept(&mut self, byte: u8, rs: bool) {
        trace!("Simulated LCD accepted {:08b}, RS: {}", byte, rs);
        if rs {
            self.events.push(LcdEvent::Data(byte));
            self.write_ram(byte);
            self.start_busy(false);
        } else {
            self.events.push(LcdEvent::Instruction(byte));
            self.execute(byte);
            self.start_busy(byte == CLEAR_DISPLAY || byte & !0x01 == RETURN_HOME);
        }
    }

    fn execute(&mut self, instruction: u8) {
        let state = &mut self.state;
        if instruction & SET_DDRAM_ADDRESS != 0 {
            state.address = instruction & 0x7F;
            state.cgram_selected = false;
        } else if instruction & SET_CGRAM_ADDRESS != 0 {
            state.address = instruction & 0x3F;
            state.cgram_selected = true;
        } else if instruction & FUNCTION_SET != 0 {
            state.eight_bit = instruction & DATA_LENGTH_8BIT != 0;
            state.two_lines = instruction & TWO_LINES != 0;
            state.large_font = instruction & FONT_5X10 != 0;
            if state.eight_bit {
                self.pending_high_nibble = None;
            }
        } else if instruction & CURSOR_SHIFT != 0 {
            let right = instruction & SHIFT_RIGHT != 0;
            if instruction & SHIFT_DISPLAY != 0 {
                state.shift_display(!right);
            } else {
                state.step_address(right);
            }
        } else if instruction & DISPLAY_CONTROL != 0 {
            state.display_on = instruction & DISPLAY_ON != 0;
            state.cursor_on = instruction & CURSOR_ON != 0;
            state.blink_on = instruction & BLINK_ON != 0;
        } else if instruction & ENTRY_MODE != 0 {
            state.increment = instruction & ENTRY_INCREMENT != 0;
            state.shift = instruction & ENTRY_SHIFT != 0;
        } else if instruction & RETURN_HOME != 0 {
            state.address = 0;
            state.cgram_selected = false;
            state.display_offset = 0;
        } else if instruction & CLEAR_DISPLAY != 0 {
            state.ddram = [b' '; 0x80];
            state.address = 0;
            state.cgram_selected = false;
            state.display_offset = 0;
            state.increment = true;
        }
    }

    fn write_ram(&mut self, byte: u8) {
        let state = &mut self.state;
        if state.cgram_selected {
            state.cgram[(state.address & 0x3F) as usize] = byte;
            state.address = if state.increment {
                (state.address + 1) & 0x3F
            } else {
                state.address.wrapping_sub(1) & 0x3F
            };
            return;
        }
        state.ddram[(state.address & 0x7F) as usize] = byte;
        let forward = state.increment;
        state.step_address(forward);
        if state.shift {
            state.shift_display(forward);
        }
    }

    fn read_ram(&self) -> u8 {
        if self.state.cgram_selected {
            self.state.cgram[(self.state.address & 0x3F) as usize]
        } else {
            self.state.ddram[(self.state.address & 0x7F) as usize]
        }
    }

    /// Levels the controller drives on the port bits of the data lines during a read.
    fn drive(&mut self, rs: bool) -> u8 {
        let nibble_read = !self.state.eight_bit;
        if !nibble_read || !self.read_low_nibble {
            self.read_latch = if rs { self.read_ram() } else { self.status() };
        }
        let byte = self.read_latch;
        let db = if nibble_read && self.read_low_nibble {
            byte << 4
        } else {
            byte
        };
        match self.width {
            BusWidth::EightBit => db,
            BusWidth::FourBit => db >> 4,
        }
    }

    fn finish_read(&mut self, rs: bool) {
        if !self.state.eight_bit {
            self.read_low_nibble = !self.read_low_nibble;
            if self.read_low_nibble {
                return;
            }
        }
        if rs {
            self.events.push(LcdEvent::DataRead(self.read_latch));
            let forward = self.state.increment;
            if self.state.cgram_selected {
                self.state.address = (self.state.address + 1) & 0x3F;
            } else {
                self.state.step_address(forward);
            }
        } else {
            self.events.push(LcdEvent::StatusRead {
                busy: self.read_latch & BUSY_FLAG != 0,
            });
            self.busy_polls_left = self.busy_polls_left.saturating_sub(1);
        }
    }
}

impl SimPeripheral for SimHd44780 {
    fn on_write(&mut self, memory: &mut DataSpace, register: Register, previous: u8) {
        if register != self.pins.command.port {
            return;
        }
        let command = memory[register.address() as usize];
        let e_mask = self.pins.e_mask();
        if previous & e_mask == 0 || command & e_mask != 0 {
            return;
        }

        // Falling edge of E
        let rs = command & self.pins.rs_mask() != 0;
        if command & self.pins.rw_mask() != 0 {
            self.finish_read(rs);
        } else {
            let ddr = memory[self.pins.data.ddr.address() as usize];
            let port = memory[self.pins.data.port.address() as usize];
            // Data lines left as inputs float high.
            self.latch(((port & ddr) | !ddr) & self.width.data_mask(), rs);
        }
    }

    fn on_read(&mut self, memory: &mut DataSpace, register: Register) {
        if register != self.pins.data.pin {
            return;
        }
        let command = memory[self.pins.command.port.address() as usize];
        let reading = command & self.pins.e_mask() != 0 && command & self.pins.rw_mask() != 0;
        let driven = if reading {
            self.drive(command & self.pins.rs_mask() != 0)
        } else {
            0
        };

        let mask = self.width.data_mask();
        let ddr = memory[self.pins.data.ddr.address() as usize];
        let port = memory[self.pins.data.port.address() as usize];
        let pin = &mut memory[register.address() as usize];
        // Output lines read back what the MCU drives, data inputs what the controller drives.
        *pin = (port & ddr) | (driven & mask & !ddr) | (*pin & !mask & !ddr);
    }

    fn on_delay(&mut self, micros: u32) {
        self.busy_us_left = self.busy_us_left.saturating_sub(micros);
        if micros >= Self::RELEASE_DELAY_US {
            self.busy_polls_left = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::DATA_SPACE_SIZE;

    fn state_with(two_lines: bool) -> ControllerState {
        ControllerState {
            two_lines,
            ..ControllerState::default()
        }
    }

    #[test]
    fn address_wraps_between_lines() {
        let mut state = state_with(true);
        state.address = 0x27;
        state.step_address(true);
        assert_eq!(state.address, 0x40);
        state.step_address(false);
        assert_eq!(state.address, 0x27);

        let mut state = state_with(false);
        state.address = 0x4F;
        state.step_address(true);
        assert_eq!(state.address, 0x00);
    }

    #[test]
    fn instructions_update_the_state() {
        let mut lcd = SimHd44780::new(LcdPins::default(), BusWidth::EightBit);
        lcd.accept(0x38, false);
        lcd.accept(0x0F, false);
        lcd.accept(0x05, false);
        lcd.accept(0x85, false);
        let state = lcd.state();
        assert!(state.eight_bit && state.two_lines && !state.large_font);
        assert!(state.display_on && state.cursor_on && state.blink_on);
        assert!(!state.increment && state.shift);
        assert_eq!(state.address, 0x05);
    }

    #[test]
    fn data_goes_to_ddram_and_moves_the_cursor() {
        let mut lcd = SimHd44780::new(LcdPins::default(), BusWidth::EightBit);
        lcd.accept(0x06, false);
        for &byte in b"Hi" {
            lcd.accept(byte, true);
        }
        assert_eq!(lcd.state().address, 2);
        assert!(lcd.line(0).starts_with("Hi "));
        assert_eq!(lcd.data_written(), b"Hi");
    }

    #[test]
    fn shift_on_write_moves_the_window() {
        let mut lcd = SimHd44780::new(LcdPins::default(), BusWidth::EightBit).with_columns(4);
        lcd.accept(0x07, false);
        for &byte in b"abcdef" {
            lcd.accept(byte, true);
        }
        assert_eq!(lcd.state().display_offset, 6);
        lcd.accept(RETURN_HOME, false);
        assert_eq!(lcd.line(0), "abcd");
    }

    #[test]
    fn timed_busy_flag_clears_after_execution_time() {
        let mut lcd = SimHd44780::new(LcdPins::default(), BusWidth::EightBit);
        lcd.accept(CLEAR_DISPLAY, false);
        assert!(lcd.is_busy());
        lcd.on_delay(1000);
        assert!(lcd.is_busy());
        lcd.on_delay(520);
        assert!(!lcd.is_busy());
    }

    #[test]
    fn poll_busy_model_counts_status_reads() {
        let mut lcd = SimHd44780::new(LcdPins::default(), BusWidth::EightBit)
            .with_busy_model(BusyModel::Polls(2));
        lcd.accept(b'x', true);
        assert_eq!(lcd.status() & BUSY_FLAG, BUSY_FLAG);
        lcd.read_latch = lcd.status();
        lcd.finish_read(false);
        lcd.read_latch = lcd.status();
        lcd.finish_read(false);
        assert_eq!(lcd.status(), 0x01);
    }

    #[test]
    fn undriven_data_lines_latch_high() {
        let pins = LcdPins::default();
        let mut lcd = SimHd44780::new(pins, BusWidth::EightBit);
        let mut memory = [0; DATA_SPACE_SIZE];
        memory[pins.data.port.address() as usize] = b'A';
        memory[pins.data.ddr.address() as usize] = 0x0F;
        memory[pins.command.port.address() as usize] = pins.rs_mask();

        lcd.on_write(&mut memory, pins.command.port, pins.rs_mask() | pins.e_mask());
        assert_eq!(lcd.data_written(), vec![0xF1]);
    }
}
