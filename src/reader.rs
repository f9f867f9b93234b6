//! A single MAX6675 and the bus it hangs off.

use tracing::{debug, warn};

use crate::bus::SharedBus;
use crate::chip_select::ChipSelect;
use crate::decode::{decode, RawSample, Reading, SAMPLE_LEN};
use crate::transport::SpiTransport;
use crate::Max6675Error;

/// How a chip is reached.
#[derive(Debug)]
pub enum Binding<T, C> {
    /// The transport owns the chip select (one spidev device per chip).
    Dedicated(T),
    /// A bus shared with other chips, addressed through `cs`.
    Shared { bus: SharedBus<T>, cs: C },
}

/// A representation of the MAX6675 thermocouple digitizer.
#[derive(Debug)]
pub struct Max6675<T, C> {
    binding: Binding<T, C>,
}

impl<T: SpiTransport, C: ChipSelect> Max6675<T, C> {
    /// A chip behind its own hardware chip select.
    pub fn dedicated(transport: T) -> Self {
        Self {
            binding: Binding::Dedicated(transport),
        }
    }

    /// A chip on a shared bus, selected through `cs`.
    pub fn shared(bus: SharedBus<T>, cs: C) -> Self {
        Self {
            binding: Binding::Shared { bus, cs },
        }
    }

    /// Tries to return the thermocouple's raw conversion word.
    ///
    /// Refer to page 5 of [Maxim Integrated's MAX6675 specsheet](https://www.analog.com/media/en/technical-documentation/data-sheets/MAX6675.pdf)
    /// for info on how to interpret this raw data.
    pub fn read_raw(&mut self) -> Result<u16, Max6675Error> {
        let bytes = match &mut self.binding {
            Binding::Dedicated(transport) => transport.read(SAMPLE_LEN)?,
            Binding::Shared { bus, cs } => bus.transaction(cs, SAMPLE_LEN)?,
        };
        let raw = RawSample::from_bytes(&bytes)?.word();
        debug!("Raw value: 0x{raw:04X}");

        // Neither pattern stops decoding, but both usually mean a wiring fault.
        match raw {
            0x0000 => warn!("Sensor is probably not present, value 0x{raw:04X}"),
            0xFFFF => warn!("Sensor connection is probably wrong, value 0x{raw:04X}"),
            _ => {}
        }

        Ok(raw)
    }

    /// Tries to read the thermocouple's temperature.
    ///
    /// An open thermocouple is not an error; it comes back as
    /// [`Reading::OpenCircuit`].
    pub fn read_temperature(&mut self) -> Result<Reading, Max6675Error> {
        self.read_raw().map(decode)
    }

    /// Check if thermocouple input is open (-T must be grounded).
    pub fn is_open(&mut self) -> Result<bool, Max6675Error> {
        self.read_temperature().map(Reading::is_open_circuit)
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MockTransport;
    use super::*;
    use crate::chip_select::mock::{Lines, MockChipSelect};
    use std::cell::RefCell;
    use std::rc::Rc;

    type Dedicated = Max6675<MockTransport, MockChipSelect>;

    #[test]
    fn dedicated_read_decodes() {
        let mut max = Dedicated::dedicated(MockTransport::replying([
            vec![0x00, 0x32],
            vec![0x00, 0x04],
        ]));

        assert_eq!(max.read_temperature().unwrap(), Reading::Celsius(1.5));
        assert_eq!(max.read_temperature().unwrap(), Reading::OpenCircuit);
    }

    #[test]
    fn read_raw_is_big_endian() {
        let mut max = Dedicated::dedicated(MockTransport::replying([vec![0x01, 0x90]]));
        assert_eq!(max.read_raw().unwrap(), 0x0190);
    }

    #[test]
    fn short_reads_fail() {
        for bytes in [vec![], vec![0x01]] {
            let got = bytes.len();
            let mut max = Dedicated::dedicated(MockTransport::replying([bytes]));
            match max.read_temperature() {
                Err(Max6675Error::ShortRead { expected: 2, got: g }) => assert_eq!(g, got),
                other => panic!("expected short read, got {other:?}"),
            }
        }
    }

    #[test]
    fn over_long_reads_fail() {
        struct Chatty;
        impl SpiTransport for Chatty {
            fn read(&mut self, _len: usize) -> Result<Vec<u8>, Max6675Error> {
                Ok(vec![0x00, 0x32, 0x00])
            }
        }

        let mut max = Max6675::<_, MockChipSelect>::dedicated(Chatty);
        assert!(matches!(
            max.read_temperature(),
            Err(Max6675Error::ShortRead { expected: 2, got: 3 })
        ));
    }

    #[test]
    fn is_open_reports_bit_d2() {
        let mut max = Dedicated::dedicated(MockTransport::replying([
            vec![0x03, 0xFC],
            vec![0x03, 0xF8],
        ]));
        assert!(max.is_open().unwrap());
        assert!(!max.is_open().unwrap());
    }

    #[test]
    fn shared_chips_never_overlap_even_on_failure() {
        let lines = Rc::new(RefCell::new(Lines::default()));
        let bus = SharedBus::new(MockTransport::replying([
            vec![0x00, 0x32],
            vec![0x00],
            vec![0x00, 0x04],
            vec![0x01, 0x90],
        ]));
        let mut first = Max6675::shared(bus.clone(), MockChipSelect::new(23, &lines));
        let mut second = Max6675::shared(bus, MockChipSelect::new(24, &lines));

        assert_eq!(first.read_temperature().unwrap(), Reading::Celsius(1.5));
        assert!(second.read_temperature().is_err());
        assert_eq!(first.read_temperature().unwrap(), Reading::OpenCircuit);
        assert_eq!(second.read_temperature().unwrap(), Reading::Celsius(12.5));

        let lines = lines.borrow();
        assert_eq!(lines.max_active, 1);
        assert!(lines.active.is_empty());
        assert_eq!(
            lines.events,
            vec![
                (23, true),
                (23, false),
                (24, true),
                (24, false),
                (23, true),
                (23, false),
                (24, true),
                (24, false),
            ]
        );
    }
}
