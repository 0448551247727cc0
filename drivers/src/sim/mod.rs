//! Simulated board for running the drivers off-target.
//!
//! [SimRegisterFile] stores the data space in memory and lets peripheral models react to the
//! register accesses. It also implements [Delay], so the hold times show up in the access log
//! instead of actually sleeping, and the models can advance their own clocks.

mod hd44780;
mod twi;

use crate::delay::Delay;
use crate::regs::DATA_SPACE_SIZE;
use crate::{HwError, HwResult, Register, RegisterFile};
use std::cell::{Cell, RefCell};
use std::fmt::{Debug, Formatter};
use std::rc::Rc;
pub use hd44780::*;
pub use twi::*;

pub type DataSpace = [u8; DATA_SPACE_SIZE];

/// A peripheral model hooked into a [SimRegisterFile].
pub trait SimPeripheral: Debug {
    /// Called after the MCU wrote `register`; `previous` is the value it held before.
    fn on_write(&mut self, memory: &mut DataSpace, register: Register, previous: u8);

    /// Called before the MCU reads `register`, so the model can put its outputs in place.
    fn on_read(&mut self, _memory: &mut DataSpace, _register: Register) {}

    /// Called when the MCU busy-waits.
    fn on_delay(&mut self, _micros: u32) {}
}

/// One entry of the access log.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Access {
    Read(Register, u8),
    Write(Register, u8),
    Delay(u32),
}

pub struct SimRegisterFile {
    memory: RefCell<DataSpace>,
    peripherals: RefCell<Vec<Rc<RefCell<dyn SimPeripheral>>>>,
    log: RefCell<Vec<Access>>,
    logging: Cell<bool>,
    elapsed_us: Cell<u64>,
}

impl SimRegisterFile {
    pub fn new() -> Self {
        SimRegisterFile {
            memory: RefCell::new([0; DATA_SPACE_SIZE]),
            peripherals: RefCell::new(Vec::new()),
            log: RefCell::new(Vec::new()),
            logging: Cell::new(true),
            elapsed_us: Cell::new(0),
        }
    }

    /// Connects a peripheral model. Keep a clone of the `Rc` to inspect the model later.
    pub fn attach<P: SimPeripheral + 'static>(&self, peripheral: Rc<RefCell<P>>) {
        self.peripherals.borrow_mut().push(peripheral);
    }

    /// Enables or disables the access log. Long-running simulations should turn it off.
    pub fn set_logging(&self, enabled: bool) {
        self.logging.set(enabled);
    }

    pub fn log(&self) -> Vec<Access> {
        self.log.borrow().clone()
    }

    pub fn clear_log(&self) {
        self.log.borrow_mut().clear();
    }

    /// Values written to the register, in order.
    pub fn writes_to(&self, register: Register) -> Vec<u8> {
        self.log
            .borrow()
            .iter()
            .filter_map(|access| match access {
                Access::Write(reg, value) if *reg == register => Some(*value),
                _ => None,
            })
            .collect()
    }

    /// Total simulated time spent in delays.
    pub fn elapsed_us(&self) -> u64 {
        self.elapsed_us.get()
    }

    /// Reads a register without notifying the peripherals or logging.
    pub fn peek(&self, register: Register) -> u8 {
        self.memory.borrow()[register.address() as usize % DATA_SPACE_SIZE]
    }

    /// Writes a register without notifying the peripherals or logging.
    pub fn poke(&self, register: Register, value: u8) {
        self.memory.borrow_mut()[register.address() as usize % DATA_SPACE_SIZE] = value;
    }

    fn index(register: Register) -> HwResult<usize> {
        let index = register.address() as usize;
        if index >= DATA_SPACE_SIZE {
            return Err(HwError::InvalidArgument);
        }
        Ok(index)
    }

    fn record(&self, access: Access) {
        if self.logging.get() {
            self.log.borrow_mut().push(access);
        }
    }
}

impl Default for SimRegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for SimRegisterFile {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SimRegisterFile({} peripherals)",
            self.peripherals.borrow().len()
        )
    }
}

impl RegisterFile for SimRegisterFile {
    fn read(&self, register: Register) -> HwResult<u8> {
        let index = Self::index(register)?;
        let mut memory = self.memory.borrow_mut();
        for peripheral in self.peripherals.borrow().iter() {
            peripheral.borrow_mut().on_read(&mut memory, register);
        }
        let value = memory[index];
        self.record(Access::Read(register, value));
        Ok(value)
    }

    fn write(&self, register: Register, value: u8) -> HwResult<()> {
        let index = Self::index(register)?;
        let mut memory = self.memory.borrow_mut();
        let previous = memory[index];
        memory[index] = value;
        for peripheral in self.peripherals.borrow().iter() {
            peripheral.borrow_mut().on_write(&mut memory, register, previous);
        }
        self.record(Access::Write(register, value));
        Ok(())
    }
}

impl Delay for SimRegisterFile {
    fn delay_us(&self, micros: u32) {
        self.elapsed_us.set(self.elapsed_us.get() + micros as u64);
        for peripheral in self.peripherals.borrow().iter() {
            peripheral.borrow_mut().on_delay(micros);
        }
        self.record(Access::Delay(micros));
    }
}
