mod app;
mod config;

use crate::app::TemperatureDisplay;
use crate::config::{Backend, Config};
use avrlab_drivers::delay::{Delay, SleepDelay};
use avrlab_drivers::i2c::{HardwareTwi, Tc74, TwiMaster};
use avrlab_drivers::lcd::hd44780::driver::{BusWidth, HD44780Driver, HD44780Ext, ParallelHD44780Driver};
use avrlab_drivers::raw::MappedRegisterFile;
use avrlab_drivers::sim::{SimHd44780, SimRegisterFile, SimTc74, SimTwi};
use avrlab_drivers::RegisterFile;
use dotenv::dotenv;
use log::{debug, info};
use std::cell::RefCell;
use std::rc::Rc;

/// Brings up the display and the sensor, then shows `config.iterations` readings.
///
/// `on_round` runs after every round with the text that was put on the display.
fn run(
    config: &Config,
    registers: &dyn RegisterFile,
    delay: &dyn Delay,
    mut on_round: impl FnMut(u32, &str),
) -> eyre::Result<()> {
    debug!("Initializing LCD driver...");
    let pins = config.lcd.pins();
    let lcd = match config.lcd.width() {
        BusWidth::EightBit => ParallelHD44780Driver::new_8bit(registers, delay, pins)?,
        BusWidth::FourBit => ParallelHD44780Driver::new_4bit(registers, delay, pins)?,
    };
    let mut lcd = lcd
        .with_busy_strategy(config.lcd.busy_strategy())
        .with_settings(config.lcd.settings());
    lcd.configure_ports()?;
    lcd.initialize_display()?;
    lcd.print("avrlab")?;
    debug!(
        "LCD initialized on a {:?} bus, waiting with {:?}",
        lcd.width(),
        lcd.busy_strategy()
    );

    debug!("Initializing TWI...");
    let mut twi = HardwareTwi::new(registers, config.sensor.twi_config());
    twi.initialize_bus()?;
    info!("TWI initialized at {} Hz", twi.config().effective_scl_hz()?);

    let sensor = Tc74::new(&mut twi, config.sensor.address);
    let mut app = TemperatureDisplay::new(&mut lcd, sensor);

    info!("Starting main loop...");
    for round in 0..config.iterations {
        let text = app.refresh()?;
        on_round(round, &text);
        if round + 1 < config.iterations {
            delay.delay_ms(config.interval_ms);
        }
    }

    match app.last() {
        Some(temperature) => info!("Last reading: {} C", temperature.celsius()),
        None => info!("No successful reading."),
    }
    Ok(())
}

fn run_simulated(config: &Config) -> eyre::Result<()> {
    let reading = |round: u32| -> i8 {
        let readings = &config.simulated_readings;
        if readings.is_empty() {
            0
        } else {
            readings[round as usize % readings.len()]
        }
    };

    let registers = SimRegisterFile::new();
    // Every round is a few thousand accesses, nobody reads them here.
    registers.set_logging(false);

    let display = Rc::new(RefCell::new(SimHd44780::new(
        config.lcd.pins(),
        config.lcd.width(),
    )));
    registers.attach(display.clone());
    let twi = Rc::new(RefCell::new(SimTwi::new().with_device(
        SimTc74::new(Tc74::DEFAULT_ADDRESS).with_temperature(reading(0)),
    )));
    registers.attach(twi.clone());

    run(config, &registers, &registers, |round, text| {
        info!("Round {}: {:?}", round + 1, text);
        for line in display.borrow().text().lines() {
            info!("| {} |", line);
        }
        if let Some(sensor) = twi.borrow_mut().device_mut() {
            sensor.set_temperature(reading(round + 1));
        }
    })?;

    info!(
        "Simulated {} ms of bus time.",
        registers.elapsed_us() / 1000
    );
    Ok(())
}

fn main() -> eyre::Result<()> {
    // Initialize environment and logger
    dotenv().ok();
    pretty_env_logger::init();

    info!("avrlab demo starting...");

    debug!("Trying to load config...");
    let mut config = if let Some(config) = Config::try_load() {
        info!("Config loaded.");
        config
    } else {
        info!("Config not found. Using default");
        let config = Config::default();
        config.save()?;
        info!("Default config saved.");
        config
    };
    config.apply_env()?;
    config.check_wiring()?;

    match &config.backend {
        Backend::Sim => run_simulated(&config),
        Backend::Mmap { path, offset } => {
            info!("Mapping registers from {} at offset {}", path.display(), offset);
            let registers = MappedRegisterFile::open_at(path, *offset)?;
            run(&config, &registers, &SleepDelay, |round, text| {
                info!("Round {}: {:?}", round + 1, text);
            })
        }
    }
}
