use crate::constants::{AcquisitionMode, DwfState, TriggerSlope, TriggerSource, TriggerType};
use crate::device::Device;
use crate::dwf::DwfError;

/// What the device reports on one record-mode poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordStatus {
    pub state: DwfState,
    pub available: usize,
    pub lost: usize,
    pub corrupted: usize,
}

impl RecordStatus {
    fn from_raw(state: DwfState, (available, lost, corrupted): (i32, i32, i32)) -> Self {
        Self {
            state,
            available: available.max(0) as usize,
            lost: lost.max(0) as usize,
            corrupted: corrupted.max(0) as usize,
        }
    }
}

/// A device instrument running in record mode.
///
/// `poll` reads the status once; `read` then copies `dst.len()` samples
/// starting at `offset` within the chunk reported by that poll.
pub trait RecordSource {
    type Sample: Copy + Default + Send;

    fn poll(&mut self) -> Result<RecordStatus, DwfError>;

    fn read(&mut self, dst: &mut [Self::Sample], offset: usize) -> Result<(), DwfError>;
}

/// Single analog in channel in record mode.
pub struct AnalogInRecord<'a> {
    device: &'a Device,
    channel: i32,
}

impl<'a> AnalogInRecord<'a> {
    pub fn new(device: &'a Device, channel: i32) -> Self {
        Self { device, channel }
    }
}

impl RecordSource for AnalogInRecord<'_> {
    type Sample = f64;

    fn poll(&mut self) -> Result<RecordStatus, DwfError> {
        let state = self.device.analog_in_status(true)?;
        let counts = self.device.analog_in_status_record()?;
        Ok(RecordStatus::from_raw(state, counts))
    }

    fn read(&mut self, dst: &mut [f64], offset: usize) -> Result<(), DwfError> {
        self.device.analog_in_status_data2(self.channel, dst, offset)
    }
}

/// Packed digital sample word. The width selects the device sample format.
pub trait DigitalSample: Copy + Default + Send + Into<u64> + 'static {
    const BITS: u32;
}

impl DigitalSample for u8 {
    const BITS: u32 = 8;
}

impl DigitalSample for u16 {
    const BITS: u32 = 16;
}

impl DigitalSample for u32 {
    const BITS: u32 = 32;
}

impl DigitalSample for u64 {
    const BITS: u32 = 64;
}

/// Logic analyzer in record mode, one `T` per sample.
pub struct DigitalInRecord<'a, T> {
    device: &'a Device,
    _sample: std::marker::PhantomData<T>,
}

impl<'a, T: DigitalSample> DigitalInRecord<'a, T> {
    pub fn new(device: &'a Device) -> Self {
        Self {
            device,
            _sample: std::marker::PhantomData,
        }
    }
}

impl<T: DigitalSample> RecordSource for DigitalInRecord<'_, T> {
    type Sample = T;

    fn poll(&mut self) -> Result<RecordStatus, DwfError> {
        let state = self.device.digital_in_status(true)?;
        let counts = self.device.digital_in_status_record()?;
        Ok(RecordStatus::from_raw(state, counts))
    }

    fn read(&mut self, dst: &mut [T], offset: usize) -> Result<(), DwfError> {
        self.device.digital_in_status_data2(dst, offset)
    }
}

/// Analog record configuration.
#[derive(Debug, Clone)]
pub struct AnalogRecordSettings {
    pub channel: i32,
    pub frequency: f64,
    pub range: f64,
    /// Device side buffer, in samples.
    pub buffer_size: usize,
    /// Seconds; 0 records until stopped.
    pub length: f64,
    pub trigger: Option<EdgeTrigger>,
}

#[derive(Debug, Clone, Copy)]
pub struct EdgeTrigger {
    pub channel: i32,
    pub level: f64,
    pub slope: TriggerSlope,
}

/// Writes the analog in record configuration without starting it.
pub fn configure_analog_record(
    device: &Device,
    settings: &AnalogRecordSettings,
) -> Result<(), DwfError> {
    device.analog_in_channel_enable_set(settings.channel, true)?;
    device.analog_in_channel_range_set(settings.channel, settings.range)?;
    device.analog_in_acquisition_mode_set(AcquisitionMode::Record)?;
    device.analog_in_frequency_set(settings.frequency)?;
    device.analog_in_record_length_set(settings.length)?;
    if settings.buffer_size > 0 {
        device.analog_in_buffer_size_set(settings.buffer_size)?;
    }
    match settings.trigger {
        Some(trigger) => {
            device.analog_in_trigger_source_set(TriggerSource::DetectorAnalogIn)?;
            device.analog_in_trigger_type_set(TriggerType::Edge)?;
            device.analog_in_trigger_channel_set(trigger.channel)?;
            device.analog_in_trigger_level_set(trigger.level)?;
            device.analog_in_trigger_condition_set(trigger.slope)?;
        }
        None => device.analog_in_trigger_source_set(TriggerSource::None)?,
    }
    device.analog_in_configure(true, false)?;
    log::debug!("Analog record configured: {settings:?}");
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DigitalRecordSettings {
    pub frequency: f64,
    pub buffer_size: usize,
    pub trigger: TriggerSource,
    pub dio_first: bool,
}

/// Divider for the requested rate, never below 1.
pub fn digital_divider(base_hz: f64, hz: f64) -> u32 {
    if hz <= 0.0 {
        return 1;
    }
    ((base_hz / hz).round() as u32).max(1)
}

/// Writes the logic analyzer record configuration for samples of type `T`.
/// Returns the effective sample rate.
pub fn configure_digital_record<T: DigitalSample>(
    device: &Device,
    settings: &DigitalRecordSettings,
) -> Result<f64, DwfError> {
    device.digital_in_reset()?;
    let base = device.digital_in_internal_clock_info()?;
    let divider = digital_divider(base, settings.frequency);
    device.digital_in_acquisition_mode_set(AcquisitionMode::Record)?;
    device.digital_in_divider_set(divider)?;
    device.digital_in_sample_format_set(T::BITS)?;
    device.digital_in_input_order_set(settings.dio_first)?;
    if settings.buffer_size > 0 {
        device.digital_in_buffer_size_set(settings.buffer_size)?;
    }
    device.digital_in_trigger_source_set(settings.trigger)?;
    device.digital_in_trigger_position_set(0)?;
    device.digital_in_configure(true, false)?;
    let applied = device.digital_in_divider_get()?.max(1);
    if applied != divider {
        log::warn!("Logic analyzer divider is {applied}, asked for {divider}");
    }
    let rate = base / applied as f64;
    log::debug!("Digital record configured: base {base} Hz, divider {applied}, rate {rate} Hz");
    Ok(rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_counts_clamp_to_zero() {
        let status = RecordStatus::from_raw(DwfState::Running, (-1, 3, -2));
        assert_eq!(status.available, 0);
        assert_eq!(status.lost, 3);
        assert_eq!(status.corrupted, 0);
    }

    #[test]
    fn divider_rounds_and_never_hits_zero() {
        assert_eq!(digital_divider(100e6, 50e6), 2);
        assert_eq!(digital_divider(100e6, 1e6), 100);
        assert_eq!(digital_divider(100e6, 300e6), 1);
        assert_eq!(digital_divider(100e6, 0.0), 1);
        assert_eq!(digital_divider(800e6, 3e6), 267);
    }

    #[test]
    fn sample_widths() {
        assert_eq!(<u8 as DigitalSample>::BITS, 8);
        assert_eq!(<u16 as DigitalSample>::BITS, 16);
        assert_eq!(<u32 as DigitalSample>::BITS, 32);
        assert_eq!(<u64 as DigitalSample>::BITS, 64);
    }
}
