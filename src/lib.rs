//! # max6675_monitor
//!
//! Reads one or more MAX6675 thermocouple converters over Linux SPI and
//! reports their temperatures at a fixed interval.
//!
//! Chips can sit behind their own spidev device, or share one bus (a hardware
//! peripheral or a bit-banged pair of GPIO lines) with a GPIO chip select per
//! chip. Either way a reader performs one 16-bit transfer and decodes it.
//!
//! ## Usage
//!
//! To read a single chip, you'll need to know which SPI device to select.
//! On Linux, you can use `ls /dev -1 | grep spidev` to figure it out!
//!
//! ```no_run
//! fn main() -> anyhow::Result<()> {
//!     use max6675_monitor::{GpioChipSelect, HardwareSpi, Max6675, SpiSettings};
//!     use std::time::Duration;
//!
//!     let spi = HardwareSpi::open("/dev/spidev0.0", &SpiSettings::hardware())?;
//!     let mut max = Max6675::<_, GpioChipSelect>::dedicated(spi);
//!
//!     loop {
//!         println!("Read Celsius! Got: {}", max.read_temperature()?);
//!         std::thread::sleep(Duration::from_millis(500));
//!     }
//! }
//! ```
//!
//! Several chips on one bus share a [`SharedBus`] and each get a chip select:
//!
//! ```no_run
//! fn main() -> anyhow::Result<()> {
//!     use max6675_monitor::{BitBangSpi, GpioChipSelect, Max6675, SharedBus, SpiSettings};
//!     use rppal::gpio::Gpio;
//!
//!     let gpio = Gpio::new()?;
//!     let bus = SharedBus::new(BitBangSpi::open(&gpio, 11, 9, SpiSettings::software())?);
//!     let mut sensors = [23, 24]
//!         .into_iter()
//!         .map(|pin| Ok(Max6675::shared(bus.clone(), GpioChipSelect::new(&gpio, pin)?)))
//!         .collect::<Result<Vec<_>, max6675_monitor::Max6675Error>>()?;
//!
//!     for (id, sensor) in sensors.iter_mut().enumerate() {
//!         println!("ID {id}: {}", sensor.read_temperature()?);
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

pub mod board;
pub mod bus;
pub mod calibrate;
pub mod chip_select;
pub mod config;
pub mod decode;
pub mod kalman;
pub mod poll;
pub mod reader;
pub mod transport;

pub use bus::SharedBus;
pub use chip_select::{ChipSelect, GpioChipSelect, Selected};
pub use config::Config;
pub use decode::{decode, RawSample, Reading};
pub use poll::{Poller, Report, Sensor};
pub use reader::{Binding, Max6675};
pub use transport::{BitBangSpi, BitOrder, HardwareSpi, SpiMode, SpiSettings, SpiTransport};

/// An error emitted due to problems with the MAX6675 or the bus it sits on.
#[derive(Debug, Error)]
pub enum Max6675Error {
    #[error("Couldn't talk to the SPI device. See std::io::Error: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },
    #[error("GPIO access failed: {source}")]
    Gpio {
        #[from]
        source: rppal::gpio::Error,
    },
    #[error("Did not read expected number of bytes from device! Expected {expected}, got {got}.")]
    ShortRead { expected: usize, got: usize },
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    #[error("Couldn't parse the configuration file: {source}")]
    ConfigParse {
        #[from]
        source: toml::de::Error,
    },
    #[error("The shared SPI bus lock was poisoned by a panicking reader.")]
    BusPoisoned,
}
