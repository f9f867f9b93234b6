//! The polling loop: read every sensor in order, report, sleep, repeat.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::chip_select::ChipSelect;
use crate::config::ErrorPolicy;
use crate::decode::Reading;
use crate::kalman::Kalman;
use crate::reader::Max6675;
use crate::transport::SpiTransport;
use crate::Max6675Error;

/// Longest stretch the loop sleeps without checking whether it should stop.
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// A reader plus everything needed to report on it.
#[derive(Debug)]
pub struct Sensor<T, C> {
    id: usize,
    chip_select: u8,
    reader: Max6675<T, C>,
    offset: f64,
    filter: Option<Kalman>,
}

impl<T: SpiTransport, C: ChipSelect> Sensor<T, C> {
    /// `id` is the sensor's position in the configuration, `chip_select` the
    /// identifier it was configured with.
    pub fn new(id: usize, chip_select: u8, reader: Max6675<T, C>) -> Self {
        Self {
            id,
            chip_select,
            reader,
            offset: 0.0,
            filter: None,
        }
    }

    /// Adds a calibration offset (°C) to every finite reading.
    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_filter(mut self, filter: Kalman) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn chip_select(&self) -> u8 {
        self.chip_select
    }

    /// Reads the chip without calibration or filtering.
    pub fn read_uncalibrated(&mut self) -> Result<Reading, Max6675Error> {
        self.reader.read_temperature()
    }

    /// Reads the chip once and produces a report.
    pub fn read(&mut self) -> Result<Report, Max6675Error> {
        let reading = self.read_uncalibrated()?.offset_by(self.offset);
        let filtered = match (&mut self.filter, reading) {
            (Some(filter), Reading::Celsius(temp)) => Some(filter.update(temp)),
            _ => None,
        };

        Ok(Report {
            id: self.id,
            chip_select: self.chip_select,
            reading,
            filtered,
        })
    }
}

/// One sensor's result for one cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Report {
    pub id: usize,
    pub chip_select: u8,
    pub reading: Reading,
    /// Smoothed value, when filtering is on and the reading was finite.
    pub filtered: Option<f64>,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ID {}, CS {}, temp {}",
            self.id, self.chip_select, self.reading
        )?;
        if let Some(filtered) = self.filtered {
            write!(f, ", filtered {filtered:.3}°C")?;
        }
        Ok(())
    }
}

/// Reads a fixed set of sensors one after another.
///
/// Sensors are read strictly in order and each transfer completes before the
/// next starts, so chips sharing a bus never overlap.
#[derive(Debug)]
pub struct Poller<T, C> {
    sensors: Vec<Sensor<T, C>>,
    interval: Duration,
    policy: ErrorPolicy,
}

impl<T: SpiTransport, C: ChipSelect> Poller<T, C> {
    pub fn new(sensors: Vec<Sensor<T, C>>, interval: Duration, policy: ErrorPolicy) -> Self {
        Self {
            sensors,
            interval,
            policy,
        }
    }

    pub fn sensors_mut(&mut self) -> &mut [Sensor<T, C>] {
        &mut self.sensors
    }

    /// Reads every sensor once and logs one line per sensor.
    ///
    /// A bus error either ends the cycle or drops that sensor from it,
    /// depending on the [`ErrorPolicy`].
    pub fn poll_once(&mut self) -> Result<Vec<Report>, Max6675Error> {
        let mut reports = Vec::with_capacity(self.sensors.len());
        for sensor in self.sensors.iter_mut() {
            match sensor.read() {
                Ok(report) => {
                    info!("{report}");
                    reports.push(report);
                }
                Err(e) if self.policy == ErrorPolicy::Skip => {
                    warn!(
                        "Failed to read sensor_id {}, CS {}: {e}",
                        sensor.id, sensor.chip_select
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(reports)
    }

    /// Polls until `running` is cleared, e.g. from a signal handler.
    ///
    /// The flag is checked between cycles and during the sleep, so a stop
    /// request lands within [`STOP_CHECK_INTERVAL`] of the current cycle ending.
    pub fn run(&mut self, running: &AtomicBool) -> Result<(), Max6675Error> {
        let mut cycles: u64 = 0;
        while running.load(Ordering::SeqCst) {
            self.poll_once()?;
            cycles += 1;
            sleep_while(running, self.interval);
        }
        debug!(cycles, "polling stopped");
        Ok(())
    }
}

fn sleep_while(running: &AtomicBool, duration: Duration) {
    let deadline = Instant::now() + duration;
    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep((deadline - now).min(STOP_CHECK_INTERVAL));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::SharedBus;
    use crate::chip_select::mock::{Lines, MockChipSelect};
    use crate::reader::mock::MockTransport;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn shared_poller(
        responses: Vec<Vec<u8>>,
        policy: ErrorPolicy,
    ) -> (Poller<MockTransport, MockChipSelect>, Rc<RefCell<Lines>>) {
        let lines = Rc::new(RefCell::new(Lines::default()));
        let bus = SharedBus::new(MockTransport::replying(responses));
        let sensors = [23, 24]
            .into_iter()
            .enumerate()
            .map(|(id, cs)| {
                Sensor::new(
                    id,
                    cs,
                    Max6675::shared(bus.clone(), MockChipSelect::new(cs, &lines)),
                )
            })
            .collect();
        (Poller::new(sensors, Duration::ZERO, policy), lines)
    }

    #[test]
    fn two_sensors_one_cycle() {
        let (mut poller, lines) = shared_poller(
            vec![vec![0x00, 0x32], vec![0x00, 0x04]],
            ErrorPolicy::Abort,
        );

        let lines_out: Vec<String> = poller
            .poll_once()
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();

        assert_eq!(
            lines_out,
            vec!["ID 0, CS 23, temp 1.500°C", "ID 1, CS 24, temp NaN"]
        );
        assert_eq!(lines.borrow().max_active, 1);
    }

    #[test]
    fn abort_policy_surfaces_short_reads() {
        let (mut poller, lines) =
            shared_poller(vec![vec![0x00], vec![0x00, 0x32]], ErrorPolicy::Abort);

        assert!(matches!(
            poller.poll_once(),
            Err(Max6675Error::ShortRead { expected: 2, got: 1 })
        ));
        // The failing chip's line was still released.
        assert!(lines.borrow().active.is_empty());
    }

    #[test]
    fn skip_policy_drops_the_failing_sensor() {
        let (mut poller, _lines) =
            shared_poller(vec![vec![0x00], vec![0x00, 0x32]], ErrorPolicy::Skip);

        let reports = poller.poll_once().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].id, 1);
        assert_eq!(reports[0].chip_select, poller.sensors_mut()[1].chip_select());
        assert_eq!(reports[0].reading, Reading::Celsius(1.5));
    }

    #[test]
    fn offsets_and_filter_apply_to_finite_readings() {
        let responses = vec![vec![0x01, 0x90], vec![0x00, 0x04]];
        let mut sensor = Sensor::new(
            0,
            7,
            Max6675::<_, MockChipSelect>::dedicated(MockTransport::replying(responses)),
        )
        .with_offset(-0.5)
        .with_filter(Kalman::new(2.0, 0.01));

        let report = sensor.read().unwrap();
        assert_eq!(report.reading, Reading::Celsius(12.0));
        assert_eq!(report.filtered, Some(18.5));
        assert_eq!(
            report.to_string(),
            "ID 0, CS 7, temp 12.000°C, filtered 18.500°C"
        );

        let report = sensor.read().unwrap();
        assert_eq!(report.reading, Reading::OpenCircuit);
        assert_eq!(report.filtered, None);
    }

    /// Tracks a pin's level and drives it high when dropped.
    struct OwnedPin {
        id: u8,
        levels: Rc<RefCell<Vec<(u8, bool)>>>,
    }

    impl ChipSelect for OwnedPin {
        fn id(&self) -> u8 {
            self.id
        }

        fn select(&mut self) {
            self.levels.borrow_mut().push((self.id, false));
        }

        fn deselect(&mut self) {
            self.levels.borrow_mut().push((self.id, true));
        }
    }

    impl Drop for OwnedPin {
        fn drop(&mut self) {
            self.deselect();
        }
    }

    #[test]
    fn dropping_the_poller_releases_every_line() {
        let levels = Rc::new(RefCell::new(Vec::new()));
        let bus = SharedBus::new(MockTransport::replying([vec![0x00, 0x32]]));
        let sensors = [23, 24]
            .into_iter()
            .enumerate()
            .map(|(id, pin)| {
                let cs = OwnedPin {
                    id: pin,
                    levels: levels.clone(),
                };
                Sensor::new(id, pin, Max6675::shared(bus.clone(), cs))
            })
            .collect();
        let mut poller = Poller::new(sensors, Duration::ZERO, ErrorPolicy::Skip);
        assert_eq!(poller.poll_once().unwrap().len(), 1);
        levels.borrow_mut().clear();

        drop(poller);

        assert_eq!(*levels.borrow(), vec![(23, true), (24, true)]);
    }

    #[test]
    fn run_stops_when_flag_is_cleared() {
        let (mut poller, _lines) = shared_poller(Vec::new(), ErrorPolicy::Skip);
        let running = AtomicBool::new(false);
        assert!(poller.run(&running).is_ok());
    }

    #[test]
    fn run_propagates_errors() {
        let (mut poller, _lines) = shared_poller(Vec::new(), ErrorPolicy::Abort);
        let running = AtomicBool::new(true);
        assert!(matches!(
            poller.run(&running),
            Err(Max6675Error::ShortRead { got: 0, .. })
        ));
    }
}
