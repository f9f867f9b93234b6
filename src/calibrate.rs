//! Offset calibration against a known reference temperature.
//!
//! All thermocouples are held at the same known temperature while each sensor is
//! sampled repeatedly. The offset for a sensor is `reference - mean(readings)`.
//! Results are only reported; paste them into the config's `offsets`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::chip_select::ChipSelect;
use crate::decode::Reading;
use crate::poll::Sensor;
use crate::transport::SpiTransport;

pub const DEFAULT_SAMPLES: usize = 180;
/// A conversion takes up to 220 ms; reading faster returns stale data.
pub const DEFAULT_SAMPLE_DELAY: Duration = Duration::from_millis(330);

/// Samples every sensor and returns one offset per sensor, by ID.
///
/// A sensor that never produced a finite reading gets `None`. Failed reads
/// are logged and skipped. Stops early if `running` is cleared.
pub fn calibrate<T: SpiTransport, C: ChipSelect>(
    sensors: &mut [Sensor<T, C>],
    reference: f64,
    samples: usize,
    delay: Duration,
    running: &AtomicBool,
) -> Vec<Option<f64>> {
    let mut sums = vec![(0.0_f64, 0_usize); sensors.len()];

    info!(
        "Acquiring temperatures, it will take about {} seconds",
        (delay * samples as u32).as_secs()
    );
    for _ in 0..samples {
        if !running.load(Ordering::SeqCst) {
            warn!("calibration interrupted");
            break;
        }
        for (sensor, (sum, count)) in sensors.iter_mut().zip(sums.iter_mut()) {
            match sensor.read_uncalibrated() {
                Ok(Reading::Celsius(temp)) => {
                    *sum += temp;
                    *count += 1;
                }
                Ok(Reading::OpenCircuit) => {
                    warn!(
                        "Sensor {} (CS {}) reports an open thermocouple",
                        sensor.id(),
                        sensor.chip_select()
                    )
                }
                Err(e) => warn!(
                    "Failed to read temp from sensor {} (CS {}): {e}",
                    sensor.id(),
                    sensor.chip_select()
                ),
            }
        }
        thread::sleep(delay);
    }

    sensors
        .iter()
        .zip(sums)
        .map(|(sensor, (sum, count))| {
            if count == 0 {
                warn!(
                    "No usable samples from sensor {} (CS {})",
                    sensor.id(),
                    sensor.chip_select()
                );
                return None;
            }
            let avg_temp = sum / count as f64;
            let offset = reference - avg_temp;
            debug!(
                "sensor_id {:2}, avg_temp {avg_temp:+6.2}, offset {offset:+5.2}",
                sensor.id()
            );
            Some(offset)
        })
        .collect()
}

/// Renders offsets as a config line, missing ones as `0.0`.
pub fn offsets_line(offsets: &[Option<f64>]) -> String {
    let values: Vec<String> = offsets
        .iter()
        .map(|offset| format!("{:.2}", offset.unwrap_or(0.0)))
        .collect();
    format!("offsets = [{}]", values.join(", "))
}
