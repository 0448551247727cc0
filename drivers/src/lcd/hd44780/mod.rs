//! HD44780 LCD module.
//!
//! See [driver::HD44780Driver] for the instruction set and [driver::ParallelHD44780Driver] for the
//! driver that bit-bangs the parallel bus through the MCU port registers.

pub mod driver;
