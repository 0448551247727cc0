//! Reads the sensor and shows the reading on the display.

use avrlab_drivers::i2c::{Tc74, Temperature};
use avrlab_drivers::lcd::hd44780::driver::{HD44780Driver, HD44780Ext};
use avrlab_drivers::HwResult;
use log::{debug, warn};

/// Text shown for a sensor reading.
pub fn reading_text(reading: &HwResult<Temperature>) -> String {
    match reading {
        Ok(temperature) => format!("Temp: {}°C", temperature),
        Err(_) => "Err".to_string(),
    }
}

pub struct TemperatureDisplay<'a> {
    lcd: &'a mut dyn HD44780Driver,
    sensor: Tc74<'a>,
    last: Option<Temperature>,
}

impl<'a> TemperatureDisplay<'a> {
    pub fn new(lcd: &'a mut dyn HD44780Driver, sensor: Tc74<'a>) -> Self {
        TemperatureDisplay {
            lcd,
            sensor,
            last: None,
        }
    }

    /// The last successful reading.
    pub fn last(&self) -> Option<Temperature> {
        self.last
    }

    /// Reads the sensor once and redraws the display.
    ///
    /// A failed sensor read is shown as `Err` and is not an error of the refresh itself;
    /// display failures are returned.
    pub fn refresh(&mut self) -> HwResult<String> {
        let reading = self.sensor.read_temperature();
        match &reading {
            Ok(temperature) => self.last = Some(*temperature),
            Err(err) => {
                warn!("Reading the sensor at {:#04x} failed: {}", self.sensor.address(), err)
            }
        }

        let text = reading_text(&reading);
        self.lcd.clear_display()?;
        self.lcd.print(&text)?;
        debug!("Display shows {:?}", text);
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avrlab_drivers::HwError;
    use avrlab_drivers::i2c::{HardwareTwi, TwiConfig, TwiMaster};
    use avrlab_drivers::lcd::hd44780::driver::{
        BusWidth, DisplaySettings, LcdPins, ParallelHD44780Driver,
    };
    use avrlab_drivers::sim::{BusyModel, SimHd44780, SimRegisterFile, SimTc74, SimTwi};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn readings_are_formatted_with_sign_and_unit() {
        assert_eq!(reading_text(&Ok(Temperature(24))), "Temp: +24°C");
        assert_eq!(reading_text(&Ok(Temperature(-5))), "Temp: -5°C");
        assert_eq!(reading_text(&Ok(Temperature(0))), "Temp: 0°C");
        assert_eq!(
            reading_text(&Err(HwError::BusError { status: 0x38 })),
            "Err"
        );
    }

    fn show_once(sensor_address: u8) -> (String, String) {
        let registers = SimRegisterFile::new();
        registers.set_logging(false);
        let display = Rc::new(RefCell::new(
            SimHd44780::new(LcdPins::sample_4bit(), BusWidth::FourBit)
                .with_busy_model(BusyModel::Polls(2)),
        ));
        registers.attach(display.clone());
        registers.attach(Rc::new(RefCell::new(
            SimTwi::new().with_device(SimTc74::new(sensor_address).with_temperature(24)),
        )));

        let mut lcd =
            ParallelHD44780Driver::new_4bit(&registers, &registers, LcdPins::sample_4bit())
                .unwrap()
                .with_settings(DisplaySettings {
                    shift_on_write: false,
                    ..DisplaySettings::default()
                });
        lcd.configure_ports().unwrap();
        lcd.initialize_display().unwrap();
        let mut twi = HardwareTwi::new(&registers, TwiConfig::default());
        twi.initialize_bus().unwrap();

        let mut app = TemperatureDisplay::new(&mut lcd, Tc74::new(&mut twi, Tc74::DEFAULT_ADDRESS));
        let text = app.refresh().unwrap();
        let shown = display.borrow().line(0);
        (text, shown)
    }

    #[test]
    fn temperature_reaches_the_display() {
        let (text, shown) = show_once(Tc74::DEFAULT_ADDRESS);
        assert_eq!(text, "Temp: +24°C");
        assert_eq!(shown, "Temp: +24°C     ");
    }

    #[test]
    fn missing_sensor_shows_err() {
        let (text, shown) = show_once(0x48);
        assert_eq!(text, "Err");
        assert_eq!(shown, "Err             ");
    }
}
