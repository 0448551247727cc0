use avrlab_drivers::i2c::{Prescaler, Tc74, TwiConfig};
use avrlab_drivers::lcd::hd44780::driver::{
    BusWidth, BusyStrategy, CursorDirection, DisplaySettings, LcdPins,
};
use avrlab_drivers::poll::PollPolicy;
use avrlab_drivers::regs::{Port, PORT_B, PORT_C, PORT_D, TWI_SCL, TWI_SDA};
use dotenv::var;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::env::var_os;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

const CONFIG_ENV: &str = "AVRLAB_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "avrlab.json";

/// Where the registers come from.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Backend {
    /// Simulated display and sensor, nothing leaves the process.
    Sim,
    /// A register image mapped from a file, e.g. one shared with an emulator.
    Mmap {
        path: PathBuf,
        #[serde(default)]
        offset: u64,
    },
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub enum PortName {
    B,
    C,
    D,
}

impl PortName {
    pub fn port(&self) -> Port {
        match self {
            PortName::B => PORT_B,
            PortName::C => PORT_C,
            PortName::D => PORT_D,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum BusMode {
    FourBit,
    EightBit,
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum BusyConfig {
    /// Poll the busy flag; `attempts: null` waits forever.
    Poll { attempts: Option<u32> },
    FixedDelay { micros: u32 },
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
#[serde(default)]
pub struct LcdConfig {
    pub bus: BusMode,
    pub data_port: PortName,
    pub command_port: PortName,
    pub pin_e: u8,
    pub pin_rw: u8,
    pub pin_rs: u8,
    pub busy: BusyConfig,
    pub two_lines: bool,
    pub large_font: bool,
    pub cursor_on: bool,
    pub blink_on: bool,
    pub shift_on_write: bool,
}

impl LcdConfig {
    pub fn pins(&self) -> LcdPins {
        LcdPins {
            data: self.data_port.port(),
            command: self.command_port.port(),
            pin_e: self.pin_e,
            pin_rw: self.pin_rw,
            pin_rs: self.pin_rs,
        }
    }

    pub fn width(&self) -> BusWidth {
        match self.bus {
            BusMode::FourBit => BusWidth::FourBit,
            BusMode::EightBit => BusWidth::EightBit,
        }
    }

    pub fn busy_strategy(&self) -> BusyStrategy {
        match self.busy {
            BusyConfig::Poll { attempts } => {
                BusyStrategy::PollBusyFlag(PollPolicy::from_attempts(attempts))
            }
            BusyConfig::FixedDelay { micros } => BusyStrategy::FixedDelay { micros },
        }
    }

    pub fn settings(&self) -> DisplaySettings {
        DisplaySettings {
            two_lines: self.two_lines,
            large_font: self.large_font,
            display_on: true,
            cursor_on: self.cursor_on,
            blink_on: self.blink_on,
            cursor_direction: CursorDirection::Right,
            shift_on_write: self.shift_on_write,
        }
    }

    /// Port bits used by the display, data and control lines together.
    fn used_bits(&self, port: Port) -> u8 {
        let pins = self.pins();
        let mut bits = 0;
        if pins.data == port {
            bits |= self.width().data_mask();
        }
        if pins.command == port {
            bits |= pins.e_mask() | pins.rw_mask() | pins.rs_mask();
        }
        bits
    }
}

impl Default for LcdConfig {
    /// The 4-bit wiring on port B, which leaves PD0/PD1 free for the TWI.
    fn default() -> Self {
        let pins = LcdPins::sample_4bit();
        LcdConfig {
            bus: BusMode::FourBit,
            data_port: PortName::B,
            command_port: PortName::B,
            pin_e: pins.pin_e,
            pin_rw: pins.pin_rw,
            pin_rs: pins.pin_rs,
            busy: BusyConfig::Poll {
                attempts: Some(PollPolicy::DEFAULT_ATTEMPTS),
            },
            two_lines: false,
            large_font: true,
            cursor_on: false,
            blink_on: false,
            shift_on_write: false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
#[serde(default)]
pub struct SensorConfig {
    pub address: u8,
    pub cpu_hz: u32,
    pub scl_hz: u32,
    pub poll_attempts: Option<u32>,
}

impl SensorConfig {
    pub fn twi_config(&self) -> TwiConfig {
        TwiConfig {
            cpu_hz: self.cpu_hz,
            scl_hz: self.scl_hz,
            prescaler: Prescaler::Div1,
            poll: PollPolicy::from_attempts(self.poll_attempts),
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        let twi = TwiConfig::default();
        SensorConfig {
            address: Tc74::DEFAULT_ADDRESS,
            cpu_hz: twi.cpu_hz,
            scl_hz: twi.scl_hz,
            poll_attempts: Some(PollPolicy::DEFAULT_ATTEMPTS),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub backend: Backend,
    pub lcd: LcdConfig,
    pub sensor: SensorConfig,
    /// How many times the temperature is read and shown.
    pub iterations: u32,
    pub interval_ms: u32,
    /// Temperatures the simulated sensor reports, one per round, repeating.
    pub simulated_readings: Vec<i8>,
}

impl Config {
    fn path() -> PathBuf {
        let path = var_os(CONFIG_ENV);
        let path: &OsStr = path.as_deref().unwrap_or(OsStr::new(DEFAULT_CONFIG_FILE));
        PathBuf::from(path)
    }

    pub fn try_load() -> Option<Self> {
        let config_path = Self::path();
        if config_path.exists() {
            let file = std::fs::File::open(&config_path).ok()?;
            let reader = std::io::BufReader::new(file);
            match serde_json::from_reader(reader) {
                Ok(config) => Some(config),
                Err(err) => {
                    warn!("Ignoring {}: {}", config_path.display(), err);
                    None
                }
            }
        } else {
            None
        }
    }

    pub fn save(&self) -> std::io::Result<()> {
        self.save_to(&Self::path())
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Overrides the wiring from the environment (or `.env`).
    pub fn apply_env(&mut self) -> eyre::Result<()> {
        if let Ok(pin) = var("AVRLAB_LCD_PIN_E") {
            self.lcd.pin_e = pin.trim().parse()?;
        }
        if let Ok(pin) = var("AVRLAB_LCD_PIN_RW") {
            self.lcd.pin_rw = pin.trim().parse()?;
        }
        if let Ok(pin) = var("AVRLAB_LCD_PIN_RS") {
            self.lcd.pin_rs = pin.trim().parse()?;
        }
        if let Ok(address) = var("AVRLAB_SENSOR_ADDR") {
            self.sensor.address = parse_address(&address)?;
        }
        Ok(())
    }

    /// Checks the wiring for collisions the drivers can't see on their own.
    pub fn check_wiring(&self) -> eyre::Result<()> {
        self.lcd.pins().validate(self.lcd.width())?;
        if self.sensor.address > 0x7F {
            eyre::bail!("I2C address {:#04x} is not a 7-bit address", self.sensor.address);
        }
        if self.lcd.used_bits(PORT_D) & (TWI_SCL | TWI_SDA) != 0 {
            warn!("The LCD wiring uses PD0/PD1, which the TWI needs for SCL/SDA");
        }
        info!(
            "LCD @ {:?} bus, E: {}, RW: {}, RS: {}",
            self.lcd.bus, self.lcd.pin_e, self.lcd.pin_rw, self.lcd.pin_rs
        );
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            backend: Backend::Sim,
            lcd: LcdConfig::default(),
            sensor: SensorConfig::default(),
            iterations: 5,
            interval_ms: 1000,
            simulated_readings: vec![24, 23, -5, 0, 12],
        }
    }
}

/// Parses a decimal or `0x`-prefixed hexadecimal address.
fn parse_address(text: &str) -> eyre::Result<u8> {
    let text = text.trim();
    let address = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16)?,
        None => text.parse()?,
    };
    Ok(address)
}
