use crate::capture::{wait_for, CaptureError, POLL_INTERVAL};
use crate::constants::{AnalogOutFunction, AnalogOutIdle, AnalogOutNode, DwfState, TriggerSource};
use crate::device::Device;
use crate::dwf::DwfError;
use serde::Deserialize;
use std::{fmt, sync::atomic::AtomicBool, time::Duration};

#[derive(Debug, Clone, PartialEq)]
pub enum PulseError {
    Period(f64),
    Width { width: f64, period: f64 },
    Count(i32),
    Frequency(f64),
    /// Percent.
    Duty(f64),
    EmptyWaveform,
    Device(DwfError),
}

impl fmt::Display for PulseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Period(p) => write!(f, "pulse period must be positive, got {p}"),
            Self::Width { width, period } => {
                write!(f, "pulse width {width} must be within (0, {period}]")
            }
            Self::Count(c) => write!(f, "pulse count must not be negative, got {c}"),
            Self::Frequency(hz) => write!(f, "frequency must be positive, got {hz}"),
            Self::Duty(d) => write!(f, "duty cycle must be within (0, 100) percent, got {d}"),
            Self::EmptyWaveform => write!(f, "custom waveform has no samples"),
            Self::Device(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for PulseError {}

impl From<DwfError> for PulseError {
    fn from(value: DwfError) -> Self {
        Self::Device(value)
    }
}

/// A rectangular pulse train on one waveform generator channel.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PulseSettings {
    pub channel: i32,
    /// Seconds.
    pub period: f64,
    /// High time in seconds.
    pub width: f64,
    pub amplitude: f64,
    #[serde(default)]
    pub offset: f64,
    /// Number of periods; 0 repeats until stopped.
    #[serde(default = "one")]
    pub count: i32,
    /// Delay before the first period, seconds.
    #[serde(default)]
    pub wait: f64,
    /// Source that starts each repetition.
    #[serde(default = "no_trigger")]
    pub trigger: TriggerSource,
}

fn one() -> i32 {
    1
}

fn no_trigger() -> TriggerSource {
    TriggerSource::None
}

impl PulseSettings {
    pub fn frequency(&self) -> f64 {
        1.0 / self.period
    }

    /// Duty cycle in percent.
    pub fn symmetry(&self) -> f64 {
        (self.width / self.period * 100.0).clamp(0.0, 100.0)
    }

    pub fn validate(&self) -> Result<(), PulseError> {
        if !(self.period > 0.0) {
            return Err(PulseError::Period(self.period));
        }
        if !(self.width > 0.0 && self.width <= self.period) {
            return Err(PulseError::Width {
                width: self.width,
                period: self.period,
            });
        }
        if self.count < 0 {
            return Err(PulseError::Count(self.count));
        }
        Ok(())
    }
}

/// Loads the pulse into the generator. With `start` false it waits for a
/// later `analog_out_configure(channel, true)`.
pub fn configure_pulse(device: &Device, settings: &PulseSettings, start: bool) -> Result<(), DwfError> {
    let ch = settings.channel;
    let node = AnalogOutNode::Carrier;
    device.analog_out_reset(ch)?;
    device.analog_out_node_enable_set(ch, node, true)?;
    device.analog_out_idle_set(ch, AnalogOutIdle::Offset)?;
    device.analog_out_node_function_set(ch, node, AnalogOutFunction::Pulse)?;
    device.analog_out_node_frequency_set(ch, node, settings.frequency())?;
    device.analog_out_node_amplitude_set(ch, node, settings.amplitude)?;
    device.analog_out_node_offset_set(ch, node, settings.offset)?;
    device.analog_out_node_symmetry_set(ch, node, settings.symmetry())?;

    let run = if settings.count == 0 {
        0.0
    } else {
        settings.period
    };
    device.analog_out_run_set(ch, run)?;
    device.analog_out_wait_set(ch, settings.wait)?;
    device.analog_out_repeat_set(ch, settings.count)?;
    device.analog_out_trigger_source_set(ch, settings.trigger)?;
    device.analog_out_repeat_trigger_set(ch, settings.trigger != TriggerSource::None)?;
    device.analog_out_configure(ch, start)?;
    log::info!(
        "W{}: pulse {:.3e} s / {:.3e} s ({:.1}%), {} V + {} V, count {}",
        ch + 1,
        settings.width,
        settings.period,
        settings.symmetry(),
        settings.amplitude,
        settings.offset,
        settings.count
    );
    Ok(())
}

/// Waits until generator `channel` finished its repetitions.
pub fn wait_generator_done(
    device: &Device,
    channel: i32,
    timeout: Option<Duration>,
    shutdown: &AtomicBool,
) -> Result<(), CaptureError> {
    wait_for(
        || device.analog_out_status(channel),
        DwfState::Done,
        POLL_INTERVAL,
        timeout,
        shutdown,
    )?;
    Ok(())
}

/// Samples scaled to the generator's [-1, 1] custom buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomWaveform {
    pub data: Vec<f64>,
    pub amplitude: f64,
    pub offset: f64,
}

impl CustomWaveform {
    /// Centers `samples` between their extremes; `amplitude` and `offset`
    /// give the recorded voltages back.
    pub fn from_samples(samples: &[f64]) -> Result<Self, PulseError> {
        let (min, max) = samples
            .iter()
            .fold(None, |acc: Option<(f64, f64)>, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
            .ok_or(PulseError::EmptyWaveform)?;
        let offset = (max + min) / 2.0;
        let amplitude = (max - min) / 2.0;
        let data = if amplitude > 0.0 {
            samples.iter().map(|v| (v - offset) / amplitude).collect()
        } else {
            vec![0.0; samples.len()]
        };
        Ok(Self {
            data,
            amplitude,
            offset,
        })
    }
}

/// Plays `waveform` once per `1 / frequency` seconds, `count` times (0 =
/// until stopped).
pub fn configure_custom(
    device: &Device,
    channel: i32,
    waveform: &CustomWaveform,
    frequency: f64,
    phase: f64,
    count: i32,
) -> Result<(), PulseError> {
    if !(frequency > 0.0) {
        return Err(PulseError::Frequency(frequency));
    }
    if count < 0 {
        return Err(PulseError::Count(count));
    }
    let node = AnalogOutNode::Carrier;
    device.analog_out_reset(channel)?;
    device.analog_out_node_enable_set(channel, node, true)?;
    device.analog_out_node_function_set(channel, node, AnalogOutFunction::Custom)?;
    device.analog_out_node_data_set(channel, node, &waveform.data)?;
    device.analog_out_node_frequency_set(channel, node, frequency)?;
    device.analog_out_node_amplitude_set(channel, node, waveform.amplitude)?;
    device.analog_out_node_offset_set(channel, node, waveform.offset)?;
    device.analog_out_node_phase_set(channel, node, phase)?;
    let run = if count == 0 { 0.0 } else { 1.0 / frequency };
    device.analog_out_run_set(channel, run)?;
    device.analog_out_repeat_set(channel, count)?;
    device.analog_out_configure(channel, true)?;
    log::info!(
        "W{}: custom waveform of {} samples at {frequency} Hz, {:.3} V + {:.3} V",
        channel + 1,
        waveform.data.len(),
        waveform.amplitude,
        waveform.offset
    );
    Ok(())
}

/// Square wave on one digital pin.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ClockSettings {
    pub pin: i32,
    pub frequency: f64,
    /// Percent high.
    pub duty: f64,
}

/// Counter steps per clock period; duty resolution is one step.
pub const CLOCK_STEPS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockCounts {
    pub divider: u32,
    pub low: u32,
    pub high: u32,
}

impl ClockCounts {
    pub fn frequency(&self, base_hz: f64) -> f64 {
        base_hz / self.divider as f64 / (self.low + self.high) as f64
    }
}

/// Divider and low/high counts for `settings` from a `base_hz` clock.
pub fn clock_counts(base_hz: f64, settings: &ClockSettings) -> Result<ClockCounts, PulseError> {
    if !(settings.frequency > 0.0) {
        return Err(PulseError::Frequency(settings.frequency));
    }
    if !(settings.duty > 0.0 && settings.duty < 100.0) {
        return Err(PulseError::Duty(settings.duty));
    }
    let high = ((settings.duty / 100.0 * CLOCK_STEPS as f64).round() as u32).clamp(1, CLOCK_STEPS - 1);
    let divider = ((base_hz / (settings.frequency * CLOCK_STEPS as f64)).round() as u32).max(1);
    Ok(ClockCounts {
        divider,
        low: CLOCK_STEPS - high,
        high,
    })
}

/// Starts the clock and returns the frequency the pattern generator runs at.
pub fn configure_clock(device: &Device, settings: &ClockSettings) -> Result<f64, PulseError> {
    let base = device.digital_out_internal_clock_info()?;
    let counts = clock_counts(base, settings)?;
    device.digital_out_reset()?;
    device.digital_out_enable_set(settings.pin, true)?;
    device.digital_out_divider_set(settings.pin, counts.divider)?;
    device.digital_out_counter_set(settings.pin, counts.low, counts.high)?;
    device.digital_out_configure(true)?;
    let actual = counts.frequency(base);
    if (actual - settings.frequency).abs() > settings.frequency * 0.01 {
        log::warn!("DIO{} clock runs at {actual} Hz, not {} Hz", settings.pin, settings.frequency);
    }
    log::info!("DIO{}: clock {actual} Hz, {counts:?}", settings.pin);
    Ok(actual)
}

/// Drives the pins in `mask` as outputs at `value`.
pub fn dio_switch(device: &Device, mask: u32, value: u32) -> Result<(), DwfError> {
    device.digital_io_output_enable_set(mask)?;
    device.digital_io_output_set(value & mask)?;
    device.digital_io_configure()?;
    log::debug!("DIO mask {mask:#06x} = {:#06x}", value & mask);
    Ok(())
}

/// Current level of every DIO pin.
pub fn dio_read(device: &Device) -> Result<u32, DwfError> {
    device.digital_io_status()?;
    device.digital_io_input_status()
}

const SUPPLY_POSITIVE: i32 = 0;
const SUPPLY_NEGATIVE: i32 = 1;
const NODE_ENABLE: i32 = 0;
const NODE_VOLTAGE: i32 = 1;

fn set_supply(device: &Device, channel: i32, volts: Option<f64>) -> Result<(), DwfError> {
    match volts {
        Some(v) => {
            device.analog_io_channel_node_set(channel, NODE_ENABLE, 1.0)?;
            device.analog_io_channel_node_set(channel, NODE_VOLTAGE, v)?;
        }
        None => device.analog_io_channel_node_set(channel, NODE_ENABLE, 0.0)?,
    }
    Ok(())
}

/// Enables each supply given a voltage, disables the others, then sets the
/// master enable.
pub fn set_supplies(
    device: &Device,
    positive: Option<f64>,
    negative: Option<f64>,
) -> Result<(), DwfError> {
    set_supply(device, SUPPLY_POSITIVE, positive)?;
    set_supply(device, SUPPLY_NEGATIVE, negative)?;
    device.analog_io_enable_set(true)?;
    device.analog_io_configure()?;
    log::info!("Supplies: V+ {positive:?}, V- {negative:?}");
    Ok(())
}

/// Measured supply voltages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupplyReading {
    pub positive: f64,
    pub negative: f64,
}

pub fn read_supplies(device: &Device) -> Result<SupplyReading, DwfError> {
    device.analog_io_status()?;
    Ok(SupplyReading {
        positive: device.analog_io_channel_node_status(SUPPLY_POSITIVE, NODE_VOLTAGE)?,
        negative: device.analog_io_channel_node_status(SUPPLY_NEGATIVE, NODE_VOLTAGE)?,
    })
}

pub fn supplies_off(device: &Device) -> Result<(), DwfError> {
    device.analog_io_enable_set(false)?;
    device.analog_io_configure()?;
    log::info!("Supplies off");
    Ok(())
}
