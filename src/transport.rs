//! Byte-oriented SPI read channels.
//!
//! The reader only ever needs `read(n)`, so both the kernel's spidev interface
//! and a bit-banged bus over two GPIO lines fit behind [`SpiTransport`].

use std::io::Read;
use std::time::{Duration, Instant};

use rppal::gpio::{Gpio, InputPin, OutputPin};
use serde::Deserialize;
use spidev::{SpiModeFlags, Spidev, SpidevOptions};
use tracing::{debug, warn};

use crate::Max6675Error;

/// Default clock for bit-banged SPI.
pub const SOFTWARE_CLOCK_HZ: u32 = 5_000_000;
/// Default clock for hardware SPI. Well below the datasheet limit.
pub const HARDWARE_CLOCK_HZ: u32 = 500_000;
/// Highest SCK frequency the MAX6675 datasheet allows.
pub const MAX_CLOCK_HZ: u32 = 4_300_000;

/// Something that can clock `len` bytes in from a slave.
///
/// Implementations return what actually arrived. They never return more than
/// requested, but may return less; callers decide what a short read means.
pub trait SpiTransport {
    fn read(&mut self, len: usize) -> Result<Vec<u8>, Max6675Error>;
}

impl<T: SpiTransport + ?Sized> SpiTransport for Box<T> {
    fn read(&mut self, len: usize) -> Result<Vec<u8>, Max6675Error> {
        (**self).read(len)
    }
}

/// Clock polarity and phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u8")]
pub enum SpiMode {
    /// CPOL 0, CPHA 0. Clock idles low, data sampled on the rising edge.
    #[default]
    Mode0,
    /// CPOL 0, CPHA 1
    Mode1,
    /// CPOL 1, CPHA 0
    Mode2,
    /// CPOL 1, CPHA 1
    Mode3,
}

impl SpiMode {
    /// Clock level while idle.
    pub fn idle_high(self) -> bool {
        matches!(self, SpiMode::Mode2 | SpiMode::Mode3)
    }

    /// Whether data is sampled on the trailing rather than the leading edge.
    pub fn samples_on_trailing_edge(self) -> bool {
        matches!(self, SpiMode::Mode1 | SpiMode::Mode3)
    }

    fn flags(self) -> SpiModeFlags {
        match self {
            SpiMode::Mode0 => SpiModeFlags::SPI_MODE_0,
            SpiMode::Mode1 => SpiModeFlags::SPI_MODE_1,
            SpiMode::Mode2 => SpiModeFlags::SPI_MODE_2,
            SpiMode::Mode3 => SpiModeFlags::SPI_MODE_3,
        }
    }
}

impl TryFrom<u8> for SpiMode {
    type Error = String;

    fn try_from(mode: u8) -> Result<Self, Self::Error> {
        match mode {
            0 => Ok(SpiMode::Mode0),
            1 => Ok(SpiMode::Mode1),
            2 => Ok(SpiMode::Mode2),
            3 => Ok(SpiMode::Mode3),
            other => Err(format!("SPI mode must be 0..=3, got {other}")),
        }
    }
}

/// Order in which bits of a byte travel on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BitOrder {
    #[default]
    MsbFirst,
    LsbFirst,
}

/// Bus parameters fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiSettings {
    pub clock_hz: u32,
    pub mode: SpiMode,
    pub bit_order: BitOrder,
}

impl SpiSettings {
    /// Mode 0, MSB first, at [`SOFTWARE_CLOCK_HZ`].
    pub const fn software() -> Self {
        Self {
            clock_hz: SOFTWARE_CLOCK_HZ,
            mode: SpiMode::Mode0,
            bit_order: BitOrder::MsbFirst,
        }
    }

    /// Mode 0, MSB first, at [`HARDWARE_CLOCK_HZ`].
    pub const fn hardware() -> Self {
        Self {
            clock_hz: HARDWARE_CLOCK_HZ,
            ..Self::software()
        }
    }
}

/// A Linux spidev device, e.g. `/dev/spidev0.0`.
pub struct HardwareSpi {
    inner: Spidev,
}

impl HardwareSpi {
    /// Opens and configures the device. Only fails if there's something wrong
    /// with the SPI connection.
    pub fn open(spi_path: impl AsRef<str>, settings: &SpiSettings) -> Result<Self, Max6675Error> {
        let spi_path = spi_path.as_ref();
        if settings.clock_hz > MAX_CLOCK_HZ {
            warn!(
                clock_hz = settings.clock_hz,
                "SPI clock exceeds the MAX6675's {MAX_CLOCK_HZ} Hz limit"
            );
        }

        let mut inner = Spidev::open(spi_path)?;
        let options = SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(settings.clock_hz)
            .mode(settings.mode.flags())
            .lsb_first(settings.bit_order == BitOrder::LsbFirst)
            .build();
        inner.configure(&options)?;
        debug!(spi_path, ?settings, "opened hardware SPI");

        Ok(Self { inner })
    }
}

impl SpiTransport for HardwareSpi {
    fn read(&mut self, len: usize) -> Result<Vec<u8>, Max6675Error> {
        let mut buf = vec![0_u8; len];
        // A plain read so a short transfer stays visible to the caller.
        let got = self.inner.read(&mut buf)?;
        buf.truncate(got);
        Ok(buf)
    }
}

/// Output line driving SCK.
pub trait ClockLine {
    fn set_level(&mut self, high: bool);
}

/// Input line sampling MISO.
pub trait DataLine {
    fn is_high(&self) -> bool;
}

impl ClockLine for OutputPin {
    fn set_level(&mut self, high: bool) {
        if high {
            self.set_high();
        } else {
            self.set_low();
        }
    }
}

impl DataLine for InputPin {
    fn is_high(&self) -> bool {
        InputPin::is_high(self)
    }
}

/// Software SPI: SCK is toggled and MISO sampled by hand.
///
/// Read-only; the MAX6675 has no MOSI line.
#[derive(Debug)]
pub struct BitBangSpi<Clk = OutputPin, Miso = InputPin> {
    clk: Clk,
    miso: Miso,
    settings: SpiSettings,
    half_period: Duration,
}

impl BitBangSpi {
    /// Claims the clock and data GPIO pins (BCM numbering).
    pub fn open(
        gpio: &Gpio,
        clk_pin: u8,
        miso_pin: u8,
        settings: SpiSettings,
    ) -> Result<Self, Max6675Error> {
        let clk = gpio.get(clk_pin)?.into_output();
        let miso = gpio.get(miso_pin)?.into_input();
        debug!(clk_pin, miso_pin, ?settings, "opened software SPI");
        Ok(Self::new(clk, miso, settings))
    }
}

impl<Clk: ClockLine, Miso: DataLine> BitBangSpi<Clk, Miso> {
    /// Builds a bus over already-configured lines and parks the clock at its
    /// idle level.
    pub fn new(mut clk: Clk, miso: Miso, settings: SpiSettings) -> Self {
        clk.set_level(settings.mode.idle_high());
        let half_period = Duration::from_nanos(500_000_000 / u64::from(settings.clock_hz.max(1)));
        Self {
            clk,
            miso,
            settings,
            half_period,
        }
    }

    fn wait_half_period(&self) {
        let deadline = Instant::now() + self.half_period;
        while Instant::now() < deadline {
            std::hint::spin_loop();
        }
    }

    fn set_clock_active(&mut self, active: bool) {
        self.clk.set_level(active != self.settings.mode.idle_high());
    }

    fn read_bit(&mut self) -> bool {
        if self.settings.mode.samples_on_trailing_edge() {
            self.set_clock_active(true);
            self.wait_half_period();
            self.set_clock_active(false);
            let bit = self.miso.is_high();
            self.wait_half_period();
            bit
        } else {
            self.wait_half_period();
            self.set_clock_active(true);
            let bit = self.miso.is_high();
            self.wait_half_period();
            self.set_clock_active(false);
            bit
        }
    }

    fn read_byte(&mut self) -> u8 {
        (0..8).fold(0_u8, |byte, i| {
            let bit = u8::from(self.read_bit());
            match self.settings.bit_order {
                BitOrder::MsbFirst => (byte << 1) | bit,
                BitOrder::LsbFirst => byte | (bit << i),
            }
        })
    }

    /// Gives the clock and data lines back.
    pub fn into_lines(self) -> (Clk, Miso) {
        (self.clk, self.miso)
    }
}

impl<Clk: ClockLine, Miso: DataLine> SpiTransport for BitBangSpi<Clk, Miso> {
    fn read(&mut self, len: usize) -> Result<Vec<u8>, Max6675Error> {
        Ok((0..len).map(|_| self.read_byte()).collect())
    }
}
