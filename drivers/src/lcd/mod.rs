//! Character LCD support.

pub mod charset;
pub mod hd44780;
