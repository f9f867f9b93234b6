//! Wires configured hardware into sensors.
//!
//! The GPIO controller and the shared bus are created here, once, and handed
//! to each reader instead of living in globals.

use rppal::gpio::Gpio;
use tracing::info;

use crate::bus::SharedBus;
use crate::chip_select::{ChipSelect, GpioChipSelect};
use crate::config::{Config, Transport};
use crate::kalman::Kalman;
use crate::poll::{Poller, Sensor};
use crate::reader::Max6675;
use crate::transport::{BitBangSpi, HardwareSpi, SpiTransport};
use crate::Max6675Error;

pub type DynTransport = Box<dyn SpiTransport>;
pub type DynChipSelect = Box<dyn ChipSelect>;
pub type BoardSensor = Sensor<DynTransport, DynChipSelect>;

/// Process-wide hardware handles for one configuration.
pub struct Board {
    config: Config,
    transport: Transport,
    gpio: Option<Gpio>,
}

impl Board {
    /// Opens the GPIO controller if the configured transport needs one.
    pub fn new(config: Config) -> Result<Self, Max6675Error> {
        let transport = config.transport()?;
        let gpio = match transport {
            Transport::Software { .. } | Transport::Hardware { .. } => Some(Gpio::new()?),
            Transport::Dedicated { .. } => None,
        };
        Ok(Self {
            config,
            transport,
            gpio,
        })
    }

    fn gpio(&self) -> Result<&Gpio, Max6675Error> {
        self.gpio.as_ref().ok_or_else(|| {
            Max6675Error::Configuration("this transport has no GPIO controller".into())
        })
    }

    /// One sensor per configured chip select, IDs in configuration order.
    pub fn sensors(&self) -> Result<Vec<BoardSensor>, Max6675Error> {
        let settings = self.config.spi_settings();
        info!(
            transport = ?self.transport,
            ?settings,
            chip_selects = ?self.config.chip_selects,
            "setting up sensors"
        );

        let readers = match &self.transport {
            Transport::Dedicated { bus } => self
                .config
                .chip_selects
                .iter()
                .map(|&cs| {
                    let path = Transport::dedicated_device(*bus, cs);
                    let spi: DynTransport = Box::new(HardwareSpi::open(path, &settings)?);
                    Ok(Max6675::dedicated(spi))
                })
                .collect::<Result<Vec<_>, Max6675Error>>()?,
            Transport::Software { clk_pin, miso_pin } => {
                let spi = BitBangSpi::open(self.gpio()?, *clk_pin, *miso_pin, settings)?;
                self.shared_readers(Box::new(spi))?
            }
            Transport::Hardware { device } => {
                self.shared_readers(Box::new(HardwareSpi::open(device, &settings)?))?
            }
        };

        Ok(readers
            .into_iter()
            .zip(&self.config.chip_selects)
            .enumerate()
            .map(|(id, (reader, &cs))| {
                let sensor = Sensor::new(id, cs, reader).with_offset(self.config.offset(id));
                match self.config.filter {
                    Some(filter) => sensor.with_filter(Kalman::from(filter)),
                    None => sensor,
                }
            })
            .collect())
    }

    /// Puts every configured chip on one bus behind its own GPIO chip select.
    fn shared_readers(
        &self,
        spi: DynTransport,
    ) -> Result<Vec<Max6675<DynTransport, DynChipSelect>>, Max6675Error> {
        let gpio = self.gpio()?;
        let bus = SharedBus::new(spi);
        self.config
            .chip_selects
            .iter()
            .map(|&pin| {
                let cs: DynChipSelect = Box::new(GpioChipSelect::new(gpio, pin)?);
                Ok(Max6675::shared(bus.clone(), cs))
            })
            .collect()
    }

    /// A poller over [`Board::sensors`] with the configured interval and policy.
    pub fn poller(&self) -> Result<Poller<DynTransport, DynChipSelect>, Max6675Error> {
        Ok(Poller::new(
            self.sensors()?,
            self.config.poll_interval(),
            self.config.on_transport_error,
        ))
    }
}
