//! Startup configuration, read once from a TOML file.
//!
//! ```toml
//! chip_selects = [23, 24]
//! poll_interval_ms = 1000
//! on_transport_error = "abort"
//! offsets = [0.0, -0.75]
//!
//! [spi]
//! clock_hz = 5000000
//! mode = 0
//! bit_order = "msb_first"
//!
//! [transport]
//! kind = "software"
//! clk_pin = 11
//! miso_pin = 9
//!
//! [filter]
//! measurement_error = 2.0
//! process_variance = 0.01
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::transport::{BitOrder, SpiMode, SpiSettings};
use crate::Max6675Error;

const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// GPIO pins (or spidev chip-select indices for `dedicated`). Order gives
    /// each sensor its ID.
    pub chip_selects: Vec<u8>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub spi: SpiConfig,
    pub transport: TransportConfig,
    #[serde(default)]
    pub on_transport_error: ErrorPolicy,
    /// Calibration offsets in °C, by sensor ID. Missing entries are 0.
    #[serde(default)]
    pub offsets: Vec<f64>,
    pub filter: Option<FilterConfig>,
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpiConfig {
    /// Defaults depend on the transport, see [`SpiSettings`].
    pub clock_hz: Option<u32>,
    #[serde(default)]
    pub mode: SpiMode,
    #[serde(default)]
    pub bit_order: BitOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Bit-banged over GPIO, chip selects on GPIO.
    Software,
    /// One spidev device shared by all chips, chip selects on GPIO.
    Hardware,
    /// One spidev device per chip, chip select handled by the kernel.
    Dedicated,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    pub kind: TransportKind,
    pub clk_pin: Option<u8>,
    pub miso_pin: Option<u8>,
    pub device: Option<String>,
    pub bus: Option<u8>,
}

/// A transport description with everything its kind needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    Software { clk_pin: u8, miso_pin: u8 },
    Hardware { device: String },
    Dedicated { bus: u8 },
}

impl Transport {
    /// spidev path of a chip on a dedicated bus.
    pub fn dedicated_device(bus: u8, chip_select: u8) -> String {
        format!("/dev/spidev{bus}.{chip_select}")
    }
}

/// What a poll cycle does when a read fails on the bus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Stop polling and report the error.
    #[default]
    Abort,
    /// Log it and leave the sensor out of this cycle.
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    #[serde(default = "FilterConfig::default_measurement_error")]
    pub measurement_error: f64,
    #[serde(default = "FilterConfig::default_process_variance")]
    pub process_variance: f64,
}

impl FilterConfig {
    fn default_measurement_error() -> f64 {
        2.0
    }

    fn default_process_variance() -> f64 {
        0.01
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            measurement_error: Self::default_measurement_error(),
            process_variance: Self::default_process_variance(),
        }
    }
}

impl Config {
    /// Reads and validates the file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Max6675Error> {
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Parses and validates a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, Max6675Error> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Max6675Error> {
        if self.chip_selects.is_empty() {
            return Err(Max6675Error::Configuration(
                "at least one chip select must be listed".into(),
            ));
        }
        if self.spi.clock_hz == Some(0) {
            return Err(Max6675Error::Configuration(
                "SPI clock must be above 0 Hz".into(),
            ));
        }
        if self.offsets.len() > self.chip_selects.len() {
            return Err(Max6675Error::Configuration(format!(
                "{} calibration offsets given for {} chip selects",
                self.offsets.len(),
                self.chip_selects.len()
            )));
        }
        self.transport()?;
        Ok(())
    }

    /// Resolves the transport section, checking the kind has what it needs.
    pub fn transport(&self) -> Result<Transport, Max6675Error> {
        let t = &self.transport;
        match t.kind {
            TransportKind::Software => match (t.clk_pin, t.miso_pin) {
                (Some(clk_pin), Some(miso_pin)) => Ok(Transport::Software { clk_pin, miso_pin }),
                _ => Err(Max6675Error::Configuration(
                    "software SPI needs both `clk_pin` and `miso_pin`".into(),
                )),
            },
            TransportKind::Hardware => t
                .device
                .clone()
                .map(|device| Transport::Hardware { device })
                .ok_or_else(|| {
                    Max6675Error::Configuration("hardware SPI needs a `device` path".into())
                }),
            TransportKind::Dedicated => Ok(Transport::Dedicated {
                bus: t.bus.unwrap_or(0),
            }),
        }
    }

    /// SPI settings with the transport's default clock filled in.
    pub fn spi_settings(&self) -> SpiSettings {
        let defaults = match self.transport.kind {
            TransportKind::Software => SpiSettings::software(),
            TransportKind::Hardware | TransportKind::Dedicated => SpiSettings::hardware(),
        };
        SpiSettings {
            clock_hz: self.spi.clock_hz.unwrap_or(defaults.clock_hz),
            mode: self.spi.mode,
            bit_order: self.spi.bit_order,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Calibration offset for sensor `id`.
    pub fn offset(&self, id: usize) -> f64 {
        self.offsets.get(id).copied().unwrap_or(0.0)
    }
}
