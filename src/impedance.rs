//! Averaged impedance analyzer readings.

use crate::capture::{wait_for, CaptureError};
use crate::constants::{DwfState, ImpedanceMeasurement};
use crate::device::Device;
use serde::Deserialize;
use std::{
    sync::atomic::AtomicBool,
    thread,
    time::{Duration, Instant},
};

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ImpedanceSettings {
    /// 0 = W1-C1-DUT-C2-R-GND, 1 = W1-C1-R-C2-DUT-GND, 8 = impedance adapter
    pub mode: i32,
    /// Reference resistor, ohms.
    pub reference: f64,
    pub frequency: f64,
    pub amplitude: f64,
    /// Samples per capture; more is slower but finer.
    pub buffer_size: usize,
    /// Seconds to let the signal settle after starting.
    #[serde(default = "default_settle")]
    pub settle: f64,
}

fn default_settle() -> f64 {
    1.0
}

impl Default for ImpedanceSettings {
    fn default() -> Self {
        Self {
            mode: 8,
            reference: 1e3,
            frequency: 333e3,
            amplitude: 1.0,
            buffer_size: 1024,
            settle: default_settle(),
        }
    }
}

/// Running mean of every measurement kind.
#[derive(Debug, Clone, Default)]
pub struct Averager {
    sums: [f64; ImpedanceMeasurement::ALL.len()],
    count: usize,
}

impl Averager {
    pub fn add(&mut self, values: &[f64; ImpedanceMeasurement::ALL.len()]) {
        for (sum, v) in self.sums.iter_mut().zip(values) {
            *sum += v;
        }
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mean(&self) -> Vec<(ImpedanceMeasurement, f64)> {
        let n = self.count.max(1) as f64;
        ImpedanceMeasurement::ALL
            .iter()
            .zip(&self.sums)
            .map(|(&m, sum)| (m, sum / n))
            .collect()
    }
}

/// Averages `count` captures of every measurement. The capture pending when
/// the analyzer starts is discarded.
pub fn measure_average(
    device: &Device,
    settings: &ImpedanceSettings,
    count: usize,
    timeout: Option<Duration>,
    shutdown: &AtomicBool,
) -> Result<Vec<(ImpedanceMeasurement, f64)>, CaptureError> {
    device.impedance_reset()?;
    device.impedance_mode_set(settings.mode)?;
    device.impedance_reference_set(settings.reference)?;
    device.impedance_frequency_set(settings.frequency)?;
    device.impedance_amplitude_set(settings.amplitude)?;
    device.analog_in_buffer_size_set(settings.buffer_size)?;
    device.impedance_configure(true)?;
    thread::sleep(Duration::from_secs_f64(settings.settle.max(0.0)));
    // stale capture
    device.impedance_status()?;

    let t_begin = Instant::now();
    let mut averager = Averager::default();
    for _ in 0..count {
        wait_for(
            || device.impedance_status(),
            DwfState::Done,
            Duration::ZERO,
            timeout,
            shutdown,
        )?;
        let mut values = [0.0; ImpedanceMeasurement::ALL.len()];
        for (slot, &m) in values.iter_mut().zip(&ImpedanceMeasurement::ALL) {
            *slot = device.impedance_status_measure(m)?;
        }
        averager.add(&values);
    }
    let elapsed = t_begin.elapsed().as_secs_f64();
    device.impedance_configure(false)?;
    log::info!(
        "Elapsed: {elapsed:.3} s, captures: {count}, {:.1} measurements/s",
        count as f64 / elapsed.max(1e-9)
    );
    Ok(averager.mean())
}

/// `value` with an engineering prefix. Angles stay in radians.
pub fn format_si(value: f64, unit: &str) -> String {
    let mag = value.abs();
    let (scaled, prefix) = if unit == "Radian" {
        (value, "")
    } else if mag == 0.0 {
        (0.0, "")
    } else if mag >= 1e9 {
        (value / 1e9, "G")
    } else if mag >= 1e6 {
        (value / 1e6, "M")
    } else if mag >= 1e3 {
        (value / 1e3, "k")
    } else if mag < 1e-9 {
        (value * 1e12, "p")
    } else if mag < 1e-6 {
        (value * 1e9, "n")
    } else if mag < 1e-3 {
        (value * 1e6, "u")
    } else if mag < 1.0 {
        (value * 1e3, "m")
    } else {
        (value, "")
    };
    format!("{scaled:.4} {prefix}{unit}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes() {
        assert_eq!(format_si(4.7e3, "Ohm"), "4.7000 kOhm");
        assert_eq!(format_si(2.2e6, "Ohm"), "2.2000 MOhm");
        assert_eq!(format_si(1.5e9, "Ohm"), "1.5000 GOhm");
        assert_eq!(format_si(100e-9, "F"), "100.0000 nF");
        assert_eq!(format_si(10e-12, "F"), "10.0000 pF");
        assert_eq!(format_si(-2.5e-3, "A"), "-2.5000 mA");
        assert_eq!(format_si(47e-6, "H"), "47.0000 uH");
        assert_eq!(format_si(3.3, "V"), "3.3000 V");
    }

    #[test]
    fn zero_has_no_prefix() {
        assert_eq!(format_si(0.0, "Ohm"), "0.0000 Ohm");
        assert_eq!(format_si(-0.0, "S"), "0.0000 S");
        assert_eq!(format_si(1e-13, "F"), "0.1000 pF");
    }

    #[test]
    fn radians_are_never_scaled() {
        assert_eq!(format_si(-0.0123, "Radian"), "-0.0123 Radian");
        assert_eq!(format_si(1e-10, "Radian"), "0.0000 Radian");
    }

    #[test]
    fn averager_means_each_kind() {
        let mut averager = Averager::default();
        let mut a = [0.0; 20];
        let mut b = [0.0; 20];
        a[0] = 100.0;
        b[0] = 200.0;
        a[19] = -1.0;
        b[19] = 1.0;
        averager.add(&a);
        averager.add(&b);
        let mean = averager.mean();
        assert_eq!(averager.count(), 2);
        assert_eq!(mean.len(), 20);
        assert_eq!(mean[0], (ImpedanceMeasurement::Impedance, 150.0));
        assert_eq!(mean[19], (ImpedanceMeasurement::Iimag, 0.0));
    }

    #[test]
    fn empty_average_is_zero() {
        let mean = Averager::default().mean();
        assert!(mean.iter().all(|(_, v)| *v == 0.0));
    }
}
