//! Single and repeated oscilloscope acquisitions.

use crate::constants::{AcquisitionMode, DwfState, TriggerSlope, TriggerSource, TriggerType};
use crate::device::Device;
use crate::dwf::DwfError;
use ndarray::{Array1, Array2, ArrayView1};
use serde::Deserialize;
use std::{
    fmt,
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::{Duration, Instant},
};
use time::{macros::format_description, OffsetDateTime};

/// Sleep between status polls while waiting for a capture.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ChannelSettings {
    pub index: i32,
    /// Full scale peak to peak, volts.
    pub range: f64,
    #[serde(default)]
    pub offset: f64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TriggerSettings {
    pub source: TriggerSource,
    pub channel: i32,
    pub level: f64,
    pub hysteresis: f64,
    pub slope: TriggerSlope,
    /// Seconds, relative to the middle of the buffer.
    pub position: f64,
    /// 0 waits for a real trigger.
    pub auto_timeout: f64,
}

impl Default for TriggerSettings {
    fn default() -> Self {
        Self {
            source: TriggerSource::None,
            channel: 0,
            level: 0.0,
            hysteresis: 0.01,
            slope: TriggerSlope::Rise,
            position: 0.0,
            auto_timeout: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AcquisitionSettings {
    pub frequency: f64,
    pub buffer_size: usize,
    pub channels: Vec<ChannelSettings>,
    pub trigger: TriggerSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureError {
    /// The instrument did not reach the wanted state in time.
    Timeout { waited: Duration, last: DwfState },
    /// The shutdown flag was raised while waiting.
    Interrupted,
    Device(DwfError),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { waited, last } => {
                write!(f, "timed out after {waited:?} waiting for capture (state {last:?})")
            }
            Self::Interrupted => write!(f, "interrupted while waiting for capture"),
            Self::Device(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CaptureError {}

impl From<DwfError> for CaptureError {
    fn from(value: DwfError) -> Self {
        Self::Device(value)
    }
}

/// Device timestamp of a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTime {
    pub sec_utc: u32,
    pub tick: u32,
    pub ticks_per_second: u32,
}

impl CaptureTime {
    /// Nanoseconds past `sec_utc`.
    pub fn subsec_nanos(&self) -> u64 {
        if self.ticks_per_second == 0 {
            return 0;
        }
        self.tick as u64 * 1_000_000_000 / self.ticks_per_second as u64
    }
}

impl fmt::Display for CaptureTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let date = OffsetDateTime::from_unix_timestamp(self.sec_utc as i64).map_err(|_| fmt::Error)?;
        let stamp = date
            .format(format_description!(
                "[year]-[month]-[day] [hour]:[minute]:[second]"
            ))
            .map_err(|_| fmt::Error)?;
        let ns = self.subsec_nanos();
        write!(
            f,
            "{stamp}.{:03}.{:03}.{:03}",
            ns / 1_000_000,
            ns / 1_000 % 1_000,
            ns % 1_000
        )
    }
}

/// One acquisition, one row per enabled channel.
#[derive(Debug, Clone)]
pub struct Capture {
    pub sample_rate: f64,
    pub data: Array2<f64>,
    pub time: Option<CaptureTime>,
}

impl Capture {
    pub fn n_samples(&self) -> usize {
        self.data.ncols()
    }

    pub fn channel(&self, row: usize) -> ArrayView1<'_, f64> {
        self.data.row(row)
    }

    /// Seconds from the first sample.
    pub fn time_axis(&self) -> Array1<f64> {
        let rate = self.sample_rate;
        Array1::from_shape_fn(self.n_samples(), |i| i as f64 / rate)
    }
}

/// Writes channel, buffer and trigger settings without starting.
pub fn configure_acquisition(
    device: &Device,
    settings: &AcquisitionSettings,
) -> Result<(), DwfError> {
    device.analog_in_reset()?;
    device.analog_in_acquisition_mode_set(AcquisitionMode::Single)?;
    device.analog_in_frequency_set(settings.frequency)?;
    device.analog_in_buffer_size_set(settings.buffer_size)?;
    for ch in &settings.channels {
        device.analog_in_channel_enable_set(ch.index, true)?;
        device.analog_in_channel_range_set(ch.index, ch.range)?;
        device.analog_in_channel_offset_set(ch.index, ch.offset)?;
    }

    let trigger = &settings.trigger;
    device.analog_in_trigger_auto_timeout_set(trigger.auto_timeout)?;
    device.analog_in_trigger_source_set(trigger.source)?;
    if trigger.source == TriggerSource::DetectorAnalogIn {
        device.analog_in_trigger_type_set(TriggerType::Edge)?;
        device.analog_in_trigger_channel_set(trigger.channel)?;
        device.analog_in_trigger_level_set(trigger.level)?;
        device.analog_in_trigger_hysteresis_set(trigger.hysteresis)?;
        device.analog_in_trigger_condition_set(trigger.slope)?;
    }
    device.analog_in_trigger_position_set(trigger.position)?;
    device.analog_in_configure(true, false)?;
    let actual = device.analog_in_buffer_size_get()?;
    if actual != settings.buffer_size {
        log::warn!(
            "Buffer size {} not supported, using {actual}",
            settings.buffer_size
        );
    }
    log::debug!("Acquisition configured: {settings:?}");
    Ok(())
}

/// Polls `poll` every `interval` until it reports `target`, the timeout runs
/// out or `shutdown` is raised.
pub fn wait_for<F>(
    mut poll: F,
    target: DwfState,
    interval: Duration,
    timeout: Option<Duration>,
    shutdown: &AtomicBool,
) -> Result<DwfState, CaptureError>
where
    F: FnMut() -> Result<DwfState, DwfError>,
{
    let t_begin = Instant::now();
    loop {
        let state = poll()?;
        if state == target {
            return Ok(state);
        }
        if shutdown.load(Ordering::SeqCst) {
            return Err(CaptureError::Interrupted);
        }
        if let Some(limit) = timeout {
            let waited = t_begin.elapsed();
            if waited >= limit {
                return Err(CaptureError::Timeout {
                    waited,
                    last: state,
                });
            }
        }
        thread::sleep(interval);
    }
}

fn read_capture(device: &Device, settings: &AcquisitionSettings) -> Result<Capture, DwfError> {
    let n = device.analog_in_buffer_size_get()?;
    let mut data = Array2::<f64>::zeros((settings.channels.len(), n));
    for (mut row, ch) in data.rows_mut().into_iter().zip(&settings.channels) {
        match row.as_slice_mut() {
            Some(dst) => device.analog_in_status_data(ch.index, dst)?,
            None => {
                let mut buffer = vec![0.0; n];
                device.analog_in_status_data(ch.index, &mut buffer)?;
                row.assign(&ArrayView1::from(&buffer));
            }
        }
    }
    let (sec_utc, tick, ticks_per_second) = device.analog_in_status_time()?;
    let time = (ticks_per_second != 0).then_some(CaptureTime {
        sec_utc,
        tick,
        ticks_per_second,
    });
    Ok(Capture {
        sample_rate: device.analog_in_frequency_get()?,
        data,
        time,
    })
}

/// Configures, arms and reads back one capture.
pub fn acquire(
    device: &Device,
    settings: &AcquisitionSettings,
    timeout: Option<Duration>,
    shutdown: &AtomicBool,
) -> Result<Capture, CaptureError> {
    acquire_armed(device, settings, timeout, shutdown, || Ok(()))
}

/// Like [`acquire`], running `after_arm` once the scope waits for its
/// trigger, e.g. to start the generator that produces it.
pub fn acquire_armed<F>(
    device: &Device,
    settings: &AcquisitionSettings,
    timeout: Option<Duration>,
    shutdown: &AtomicBool,
    after_arm: F,
) -> Result<Capture, CaptureError>
where
    F: FnOnce() -> Result<(), DwfError>,
{
    configure_acquisition(device, settings)?;
    device.analog_in_configure(false, true)?;
    after_arm()?;
    wait_for(
        || device.analog_in_status(true),
        DwfState::Done,
        POLL_INTERVAL,
        timeout,
        shutdown,
    )?;
    Ok(read_capture(device, settings)?)
}

/// `count` back to back captures. The device re-arms itself after each Done.
pub fn acquire_repeated(
    device: &Device,
    settings: &AcquisitionSettings,
    count: usize,
    timeout: Option<Duration>,
    shutdown: &AtomicBool,
) -> Result<Vec<Capture>, CaptureError> {
    configure_acquisition(device, settings)?;
    device.analog_in_configure(false, true)?;
    let mut captures = Vec::with_capacity(count);
    for i in 0..count {
        wait_for(
            || device.analog_in_status(true),
            DwfState::Done,
            Duration::ZERO,
            timeout,
            shutdown,
        )?;
        let capture = read_capture(device, settings)?;
        if let Some(t) = &capture.time {
            log::debug!("Capture {i}: {t}");
        }
        captures.push(capture);
    }
    Ok(captures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{install_interrupt_handler, interrupt_flag, interrupted};

    #[test]
    fn time_display_splits_subseconds() {
        let t = CaptureTime {
            sec_utc: 0,
            tick: 123_456_789,
            ticks_per_second: 1_000_000_000,
        };
        assert_eq!(t.to_string(), "1970-01-01 00:00:00.123.456.789");

        let t = CaptureTime {
            sec_utc: 1_700_000_000,
            tick: 50,
            ticks_per_second: 100,
        };
        assert_eq!(t.to_string(), "2023-11-14 22:13:20.500.000.000");
    }

    #[test]
    fn zero_tick_rate_has_no_subseconds() {
        let t = CaptureTime {
            sec_utc: 0,
            tick: 7,
            ticks_per_second: 0,
        };
        assert_eq!(t.subsec_nanos(), 0);
    }

    #[test]
    fn time_axis_follows_rate() {
        let capture = Capture {
            sample_rate: 100e6,
            data: Array2::zeros((2, 5)),
            time: None,
        };
        let axis = capture.time_axis();
        assert_eq!(axis.len(), 5);
        assert_eq!(axis[0], 0.0);
        assert!((axis[4] - 40e-9).abs() < 1e-18);
        assert_eq!(capture.channel(1).len(), 5);
    }

    #[test]
    fn wait_returns_on_target_state() {
        let mut states = vec![DwfState::Armed, DwfState::Running, DwfState::Done].into_iter();
        let mut polls = 0;
        let state = wait_for(
            || {
                polls += 1;
                Ok(states.next().unwrap_or(DwfState::Unknown))
            },
            DwfState::Done,
            Duration::ZERO,
            None,
            &AtomicBool::new(false),
        )
        .unwrap();
        assert_eq!(state, DwfState::Done);
        assert_eq!(polls, 3);
    }

    #[test]
    fn wait_times_out() {
        let err = wait_for(
            || Ok(DwfState::Armed),
            DwfState::Done,
            Duration::from_millis(1),
            Some(Duration::from_millis(5)),
            &AtomicBool::new(false),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CaptureError::Timeout {
                last: DwfState::Armed,
                ..
            }
        ));
    }

    #[test]
    fn wait_propagates_device_errors() {
        let err = wait_for(
            || Err(DwfError::BusError),
            DwfState::Done,
            Duration::ZERO,
            None,
            &AtomicBool::new(false),
        )
        .unwrap_err();
        assert_eq!(err, CaptureError::Device(DwfError::BusError));
    }

    #[test]
    fn wait_stops_when_shutdown_is_raised() {
        let shutdown = AtomicBool::new(false);
        let mut polls = 0;
        let err = wait_for(
            || {
                polls += 1;
                if polls == 3 {
                    shutdown.store(true, Ordering::SeqCst);
                }
                Ok(DwfState::Armed)
            },
            DwfState::Done,
            Duration::ZERO,
            None,
            &shutdown,
        )
        .unwrap_err();
        assert_eq!(err, CaptureError::Interrupted);
        assert_eq!(polls, 3);
    }

    #[test]
    fn target_state_wins_over_shutdown() {
        let state = wait_for(
            || Ok(DwfState::Done),
            DwfState::Done,
            Duration::ZERO,
            None,
            &AtomicBool::new(true),
        )
        .unwrap();
        assert_eq!(state, DwfState::Done);
    }

    #[test]
    fn ctrl_c_ends_a_wait_without_trigger() {
        install_interrupt_handler().unwrap();
        unsafe { libc::raise(libc::SIGINT) };
        assert!(interrupted());

        let (tx, rx) = crossbeam_channel::bounded(1);
        thread::spawn(move || {
            let res = wait_for(
                || Ok(DwfState::Armed),
                DwfState::Done,
                Duration::from_millis(1),
                None,
                interrupt_flag(),
            );
            let _ = tx.send(res);
        });
        let res = rx.recv_timeout(Duration::from_millis(500));
        interrupt_flag().store(false, Ordering::SeqCst);
        assert_eq!(res.unwrap().unwrap_err(), CaptureError::Interrupted);
    }
}
