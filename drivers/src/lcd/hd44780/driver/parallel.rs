use crate::delay::Delay;
use crate::lcd::hd44780::driver::instruction::{BUSY_FLAG, RETURN_HOME};
use crate::lcd::hd44780::driver::{BusyStrategy, DisplaySettings, HD44780Driver};
use crate::regs::{Port, PORT_B, PORT_C, PORT_D};
use crate::{bit, HwError, HwResult, RegisterFile};
use log::{debug, trace};

/// Width of the data bus between the MCU and the display.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BusWidth {
    /// DB0..DB7 on port bits 0..7.
    EightBit,
    /// DB4..DB7 on port bits 0..3. Every byte is sent as two nibbles, high nibble first.
    FourBit,
}

impl BusWidth {
    /// Port bits used by the data lines.
    pub fn data_mask(&self) -> u8 {
        match self {
            BusWidth::EightBit => 0xFF,
            BusWidth::FourBit => 0x0F,
        }
    }
}

/// Wiring of the display to the MCU ports.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct LcdPins {
    /// Port carrying the data lines.
    pub data: Port,
    /// Port carrying the E, R/W and RS lines. May be the same as the data port on a 4-bit bus.
    pub command: Port,
    /// Enable, latches the bus on its falling edge.
    pub pin_e: u8,
    /// Read/Write select, high for reads.
    pub pin_rw: u8,
    /// Register select, low for the instruction register, high for the data register.
    pub pin_rs: u8,
}

impl LcdPins {
    /// Wiring of the 4-bit sample board: everything on port B, data on B0..B3,
    /// RS on B4, R/W on B5 and E on B6.
    pub fn sample_4bit() -> Self {
        LcdPins {
            data: PORT_B,
            command: PORT_B,
            pin_e: 6,
            pin_rw: 5,
            pin_rs: 4,
        }
    }

    pub fn e_mask(&self) -> u8 {
        1 << self.pin_e
    }

    pub fn rw_mask(&self) -> u8 {
        1 << self.pin_rw
    }

    pub fn rs_mask(&self) -> u8 {
        1 << self.pin_rs
    }

    /// Checks that the control lines are distinct pins that don't collide with the data lines.
    pub fn validate(&self, width: BusWidth) -> HwResult<()> {
        let e = bit(self.pin_e)?;
        let rw = bit(self.pin_rw)?;
        let rs = bit(self.pin_rs)?;
        let control = e | rw | rs;
        if control.count_ones() != 3 {
            return Err(HwError::InvalidArgument);
        }
        if self.command == self.data && control & width.data_mask() != 0 {
            return Err(HwError::InvalidArgument);
        }
        Ok(())
    }
}

impl Default for LcdPins {
    /// Wiring of the 8-bit board: data on port D, E on C5, R/W on C6 and RS on C7.
    fn default() -> Self {
        LcdPins {
            data: PORT_D,
            command: PORT_C,
            pin_e: 5,
            pin_rw: 6,
            pin_rs: 7,
        }
    }
}

/// HD44780 driver that bit-bangs the parallel bus through the MCU port registers.
///
/// Each byte is put on the bus while E is high and latched by the controller on the falling
/// edge. E is held high for 15 us before the data changes (setup time) and low for 5 us after.
/// What happens afterwards depends on the [BusyStrategy]: either the busy flag is read back
/// until it clears, or the driver just sleeps for a fixed time.
#[derive(Debug)]
pub struct ParallelHD44780Driver<'a> {
    registers: &'a dyn RegisterFile,
    delay: &'a dyn Delay,
    pins: LcdPins,
    width: BusWidth,
    busy: BusyStrategy,
    settings: DisplaySettings,
}

impl<'a> ParallelHD44780Driver<'a> {
    const ENABLE_SETUP_US: u32 = 15;
    const ENABLE_HOLD_US: u32 = 5;
    const READ_HOLD_US: u32 = 15;

    fn new(
        registers: &'a dyn RegisterFile,
        delay: &'a dyn Delay,
        pins: LcdPins,
        width: BusWidth,
    ) -> HwResult<Self> {
        pins.validate(width)?;
        Ok(ParallelHD44780Driver {
            registers,
            delay,
            pins,
            width,
            busy: BusyStrategy::default(),
            settings: DisplaySettings::default(),
        })
    }

    /// Creates a driver for a display with all eight data lines connected.
    pub fn new_8bit(
        registers: &'a dyn RegisterFile,
        delay: &'a dyn Delay,
        pins: LcdPins,
    ) -> HwResult<Self> {
        Self::new(registers, delay, pins, BusWidth::EightBit)
    }

    /// Creates a driver for a display with only DB4..DB7 connected.
    pub fn new_4bit(
        registers: &'a dyn RegisterFile,
        delay: &'a dyn Delay,
        pins: LcdPins,
    ) -> HwResult<Self> {
        Self::new(registers, delay, pins, BusWidth::FourBit)
    }

    pub fn with_busy_strategy(mut self, busy: BusyStrategy) -> Self {
        self.busy = busy;
        self
    }

    pub fn with_settings(mut self, settings: DisplaySettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn width(&self) -> BusWidth {
        self.width
    }

    pub fn busy_strategy(&self) -> BusyStrategy {
        self.busy
    }

    fn set_command_line(&self, mask: u8, high: bool) -> HwResult<()> {
        if high {
            self.registers.set_bits(self.pins.command.port, mask)
        } else {
            self.registers.clear_bits(self.pins.command.port, mask)
        }
    }

    fn set_enable(&self, high: bool) -> HwResult<()> {
        self.set_command_line(self.pins.e_mask(), high)
    }

    /// RS high selects the data register, low the instruction register.
    fn set_register_select(&self, data: bool) -> HwResult<()> {
        self.set_command_line(self.pins.rs_mask(), data)
    }

    fn set_read_mode(&self, read: bool) -> HwResult<()> {
        self.set_command_line(self.pins.rw_mask(), read)
    }

    fn set_bus_output(&self, output: bool) -> HwResult<()> {
        let mask = self.width.data_mask();
        self.registers
            .modify(self.pins.data.ddr, mask, if output { 0xFF } else { 0x00 })
    }

    /// Puts one bus-width value on the data lines and pulses E.
    fn latch(&self, value: u8) -> HwResult<()> {
        self.set_enable(true)?;
        self.delay.delay_us(Self::ENABLE_SETUP_US);
        self.registers
            .modify(self.pins.data.port, self.width.data_mask(), value)?;
        self.set_enable(false)?;
        self.delay.delay_us(Self::ENABLE_HOLD_US);
        Ok(())
    }

    /// Pulses E and samples the data lines while it is high.
    fn sample(&self) -> HwResult<u8> {
        self.set_enable(true)?;
        self.delay.delay_us(Self::ENABLE_SETUP_US);
        let value = self.registers.read(self.pins.data.pin)? & self.width.data_mask();
        self.set_enable(false)?;
        self.delay.delay_us(Self::READ_HOLD_US);
        Ok(value)
    }

    fn send(&self, data: u8, rs: bool) -> HwResult<()> {
        trace!("Sending data: {:08b}, RS: {}", data, rs);

        self.set_register_select(rs)?;
        self.set_bus_output(true)?;
        self.set_read_mode(false)?;

        match self.width {
            BusWidth::EightBit => self.latch(data)?,
            BusWidth::FourBit => {
                let high_nibble = (data >> 4) & 0x0F;
                let low_nibble = data & 0x0F;
                trace!("Writing HN: {:04b}", high_nibble);
                self.latch(high_nibble)?;
                trace!("Writing LN: {:04b}", low_nibble);
                self.latch(low_nibble)?;
            }
        }

        self.wait_idle()?;
        Ok(())
    }

    fn read(&self, rs: bool) -> HwResult<u8> {
        self.set_register_select(rs)?;
        self.set_bus_output(false)?;
        self.set_read_mode(true)?;

        let data = match self.width {
            BusWidth::EightBit => self.sample()?,
            BusWidth::FourBit => {
                let high_nibble = self.sample()?;
                let low_nibble = self.sample()?;
                (high_nibble << 4) | low_nibble
            }
        };

        // The data lines stay inputs otherwise, and the next write would go nowhere.
        self.set_read_mode(false)?;
        self.set_bus_output(true)?;

        trace!("Read data: {:08b}, RS: {}", data, rs);
        Ok(data)
    }

    /// Blocks until the controller can take the next byte.
    ///
    /// Returns the number of status reads it took, `0` for [BusyStrategy::FixedDelay].
    pub fn wait_idle(&self) -> HwResult<u32> {
        match self.busy {
            BusyStrategy::PollBusyFlag(policy) => {
                let polls = policy.wait_for("LCD busy flag", || {
                    Ok(self.read(false)? & BUSY_FLAG == 0)
                })?;
                trace!("LCD idle after {} polls", polls);
                Ok(polls)
            }
            BusyStrategy::FixedDelay { micros } => {
                self.delay.delay_us(micros);
                Ok(0)
            }
        }
    }

    /// Forces a 4-bit bus interface whatever mode the controller is in.
    ///
    /// Single nibbles are sent as if the interface was 8 bits wide: three times the function set
    /// nibble `0x3`, then `0x2` to switch to 4 bits. Until that is done, nibble pairs may be
    /// misaligned, so the busy flag can't be read and fixed waits are used instead.
    fn synchronize_4bit(&self) -> HwResult<()> {
        debug!("Synchronizing 4-bit interface");
        self.set_register_select(false)?;
        self.set_bus_output(true)?;
        self.set_read_mode(false)?;

        for (nibble, wait_us) in [(0x3, 4100), (0x3, 100), (0x3, 100), (0x2, 100)] {
            trace!("Writing sync nibble: {:04b}", nibble);
            self.latch(nibble)?;
            self.delay.delay_us(wait_us);
        }
        Ok(())
    }
}

impl HD44780Driver for ParallelHD44780Driver<'_> {
    fn configure_ports(&mut self) -> HwResult<()> {
        debug!("Configuring LCD ports: {:?}", self.pins);
        self.delay.delay_ms(20);
        self.set_bus_output(true)?;
        self.registers.set_bits(
            self.pins.command.ddr,
            self.pins.e_mask() | self.pins.rw_mask() | self.pins.rs_mask(),
        )?;
        self.set_register_select(false)?;
        self.set_enable(false)?;
        self.delay.delay_ms(5);
        Ok(())
    }

    fn initialize_display(&mut self) -> HwResult<()> {
        debug!("Initializing HD44780 on a {:?} bus", self.width);
        self.delay.delay_ms(200);

        if self.width == BusWidth::FourBit {
            self.synchronize_4bit()?;
        }

        // Return home three times resynchronizes an 8-bit interface.
        for _ in 0..3 {
            self.write_instruction(RETURN_HOME)?;
            self.delay.delay_ms(10);
        }
        self.delay.delay_ms(40);

        let settings = self.settings;
        self.clear_display()?;
        self.function_set(
            self.width == BusWidth::EightBit,
            settings.two_lines,
            settings.large_font,
        )?;
        self.set_display_control(settings.display_on, settings.cursor_on, settings.blink_on)?;
        self.set_entry_mode(settings.cursor_direction, settings.shift_on_write)?;
        self.clear_display()?;
        self.return_home()?;
        debug!("HD44780 initialized");
        Ok(())
    }

    fn write_instruction(&mut self, instruction: u8) -> HwResult<()> {
        self.send(instruction, false)
    }

    fn write_data(&mut self, data: u8) -> HwResult<()> {
        self.send(data, true)
    }

    fn read_instruction(&mut self) -> HwResult<u8> {
        self.read(false)
    }

    fn read_data(&mut self) -> HwResult<u8> {
        let data = self.read(true)?;
        // Reading data moves the address counter; let the controller catch up.
        self.wait_idle()?;
        Ok(data)
    }
}
