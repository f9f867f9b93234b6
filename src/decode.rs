//! Bit-level decoding of the MAX6675's 16-bit conversion word.
//!
//! Refer to page 5 of [Maxim Integrated's MAX6675 specsheet](https://www.analog.com/media/en/technical-documentation/data-sheets/MAX6675.pdf)
//! for the layout:
//!
//! | bit    | 15         | 14..3             | 2            | 1         | 0          |
//! |--------|------------|-------------------|--------------|-----------|------------|
//! | meaning| dummy sign | 12-bit reading    | input open   | device id | tri-state  |

use std::fmt;

use crate::Max6675Error;

/// Number of bytes the MAX6675 clocks out per conversion.
pub const SAMPLE_LEN: usize = 2;

/// Bit D2: high when the thermocouple input is open.
pub const OPEN_CIRCUIT_BIT: u16 = 0x0004;

/// Degrees Celsius per count of the 12-bit reading.
pub const CELSIUS_PER_COUNT: f64 = 0.25;

/// Exactly two bytes as they came off the bus, most significant byte first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSample([u8; SAMPLE_LEN]);

impl RawSample {
    /// Wraps a bus read. Anything other than exactly two bytes is rejected,
    /// nothing is truncated or padded.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Max6675Error> {
        let buf: [u8; SAMPLE_LEN] = bytes.try_into().map_err(|_| Max6675Error::ShortRead {
            expected: SAMPLE_LEN,
            got: bytes.len(),
        })?;
        Ok(Self(buf))
    }

    /// The sample as a big-endian word.
    pub fn word(self) -> u16 {
        u16::from_be_bytes(self.0)
    }
}

/// One temperature reading from one chip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    /// A finite temperature in degrees Celsius.
    Celsius(f64),
    /// The chip flagged an open thermocouple (bit D2 was high).
    OpenCircuit,
}

impl Reading {
    /// The temperature in Celsius, or `NaN` for an open circuit.
    pub fn celsius(self) -> f64 {
        match self {
            Reading::Celsius(temp) => temp,
            Reading::OpenCircuit => f64::NAN,
        }
    }

    pub fn is_open_circuit(self) -> bool {
        matches!(self, Reading::OpenCircuit)
    }

    /// Shifts a finite reading by a calibration offset. Open circuits stay open.
    pub fn offset_by(self, offset: f64) -> Self {
        match self {
            Reading::Celsius(temp) => Reading::Celsius(temp + offset),
            Reading::OpenCircuit => Reading::OpenCircuit,
        }
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Celsius(temp) => write!(f, "{temp:.3}°C"),
            Reading::OpenCircuit => f.write_str("NaN"),
        }
    }
}

/// Decodes a raw conversion word into a [`Reading`].
pub fn decode(raw: u16) -> Reading {
    // Open input short-circuits everything else.
    if raw & OPEN_CIRCUIT_BIT != 0 {
        return Reading::OpenCircuit;
    }

    // Widened the way the chip's word is handled on 32-bit hosts. Bit 31 can
    // never be set from a 16-bit sample; the branch documents the two's
    // complement rule from the datasheet and is otherwise dead.
    let widened = u32::from(raw);
    let mut count = i32::from(raw >> 3);
    if widened & 0x8000_0000 != 0 {
        count -= 4096;
    }

    Reading::Celsius(f64::from(count) * CELSIUS_PER_COUNT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datasheet_table() {
        assert_eq!(decode(0x0000), Reading::Celsius(0.0));
        assert_eq!(decode(0x0032), Reading::Celsius(1.5));
        assert_eq!(decode(0x0190), Reading::Celsius(12.5));
        // 100°C is 400 counts.
        assert_eq!(decode(400 << 3), Reading::Celsius(100.0));
        // Full scale, 1023.75°C.
        assert_eq!(decode(0x7FF8), Reading::Celsius(1023.75));
    }

    #[test]
    fn low_status_bits_are_discarded() {
        // D1 and D0 carry no temperature information.
        assert_eq!(decode(0x0033), decode(0x0030));
        assert_eq!(decode(0x0032), decode(0x0030));
    }

    #[test]
    fn open_circuit_bit_wins_over_everything() {
        assert_eq!(decode(0x0004), Reading::OpenCircuit);
        assert_eq!(decode(0x03FC), Reading::OpenCircuit);
        assert_eq!(decode(0xFFFF), Reading::OpenCircuit);

        for raw in (0..=u16::MAX).filter(|raw| raw & OPEN_CIRCUIT_BIT != 0) {
            assert!(decode(raw).is_open_circuit(), "0x{raw:04X}");
            assert!(decode(raw).celsius().is_nan());
        }
    }

    #[test]
    fn every_closed_sample_is_finite_and_non_negative() {
        for raw in (0..=u16::MAX).filter(|raw| raw & OPEN_CIRCUIT_BIT == 0) {
            let Reading::Celsius(temp) = decode(raw) else {
                panic!("0x{raw:04X} decoded as open circuit");
            };
            assert!(temp.is_finite() && temp >= 0.0);
            assert_eq!(temp, f64::from(raw >> 3) * 0.25, "0x{raw:04X}");
        }
    }

    #[test]
    fn raw_sample_requires_exactly_two_bytes() {
        assert_eq!(RawSample::from_bytes(&[0x01, 0x90]).unwrap().word(), 0x0190);

        for len in [0, 1, 3, 4] {
            let bytes = vec![0_u8; len];
            match RawSample::from_bytes(&bytes) {
                Err(Max6675Error::ShortRead { expected: 2, got }) => assert_eq!(got, len),
                other => panic!("expected a short read for {len} bytes, got {other:?}"),
            }
        }
    }

    #[test]
    fn display_matches_report_format() {
        assert_eq!(Reading::Celsius(1.5).to_string(), "1.500°C");
        assert_eq!(Reading::OpenCircuit.to_string(), "NaN");
        assert_eq!(Reading::Celsius(21.0).offset_by(-0.25).to_string(), "20.750°C");
        assert_eq!(Reading::OpenCircuit.offset_by(3.0), Reading::OpenCircuit);
    }
}
