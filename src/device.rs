use crate::constants::{
    AcquisitionMode, AnalogOutFunction, AnalogOutIdle, AnalogOutNode, DigitalOutIdle, DwfParam,
    DwfState, ImpedanceMeasurement, TriggerSlope, TriggerSource, TriggerType, HDWF_NONE,
};
use crate::dwf::{dwf_call, Dwf, DwfError, Hdwf};
use libc::{c_double, c_int, c_uchar, c_uint, c_void};
use std::sync::Arc;

/// One opened instrument session. The handle is closed on drop.
#[derive(Debug)]
pub struct Device {
    dwf: Arc<Dwf>,
    handle: Hdwf,
}

impl Device {
    /// Opens device `index` (-1 = first available).
    pub fn open(dwf: Arc<Dwf>, index: i32) -> Result<Self, DwfError> {
        let mut handle: Hdwf = HDWF_NONE;
        dwf_call!(&dwf, FDwfDeviceOpen(index => c_int, &mut handle => *mut Hdwf))?;
        Self::from_handle(dwf, handle)
    }

    /// Opens device `index` with configuration `config`.
    pub fn open_config(dwf: Arc<Dwf>, index: i32, config: i32) -> Result<Self, DwfError> {
        let mut handle: Hdwf = HDWF_NONE;
        dwf_call!(
            &dwf,
            FDwfDeviceConfigOpen(index => c_int, config => c_int, &mut handle => *mut Hdwf)
        )?;
        Self::from_handle(dwf, handle)
    }

    fn from_handle(dwf: Arc<Dwf>, handle: Hdwf) -> Result<Self, DwfError> {
        if handle == HDWF_NONE {
            let (_, message) = dwf.last_error();
            return Err(DwfError::NoDevice(message));
        }
        log::info!("Opened device handle {handle}");
        Ok(Self { dwf, handle })
    }

    pub fn close(mut self) -> Result<(), DwfError> {
        let handle = std::mem::replace(&mut self.handle, HDWF_NONE);
        dwf_call!(&self.dwf, FDwfDeviceClose(handle => Hdwf))?;
        log::info!("Closed device handle {handle}");
        Ok(())
    }

    /// With auto configure off, settings are applied only by the `*_configure` calls.
    pub fn auto_configure_set(&self, enable: bool) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfDeviceAutoConfigureSet(self.handle => Hdwf, enable as c_int => c_int))
    }

    pub fn reset(&self) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfDeviceReset(self.handle => Hdwf))
    }

    pub fn param_set(&self, param: DwfParam, value: i32) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfDeviceParamSet(self.handle => Hdwf, param as c_int => c_int, value => c_int)
        )
    }

    pub fn param_get(&self, param: DwfParam) -> Result<i32, DwfError> {
        let mut value: c_int = 0;
        dwf_call!(
            &self.dwf,
            FDwfDeviceParamGet(self.handle => Hdwf, param as c_int => c_int, &mut value => *mut c_int)
        )?;
        Ok(value)
    }

    pub fn trigger_pc(&self) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfDeviceTriggerPC(self.handle => Hdwf))
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if self.handle == HDWF_NONE {
            return;
        }
        let handle = self.handle;
        match dwf_call_close(&self.dwf, handle) {
            Ok(()) => log::info!("Closed device handle {handle}"),
            Err(e) => log::warn!("Closing device handle {handle}: {e}"),
        }
    }
}

fn dwf_call_close(dwf: &Dwf, handle: Hdwf) -> Result<(), DwfError> {
    dwf_call!(dwf, FDwfDeviceClose(handle => Hdwf))
}

// Analog in (oscilloscope)
impl Device {
    pub fn analog_in_reset(&self) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfAnalogInReset(self.handle => Hdwf))
    }

    pub fn analog_in_configure(&self, reconfigure: bool, start: bool) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfAnalogInConfigure(self.handle => Hdwf, reconfigure as c_int => c_int, start as c_int => c_int)
        )
    }

    pub fn analog_in_status(&self, read_data: bool) -> Result<DwfState, DwfError> {
        let mut state: c_uchar = 0;
        dwf_call!(
            &self.dwf,
            FDwfAnalogInStatus(self.handle => Hdwf, read_data as c_int => c_int, &mut state => *mut c_uchar)
        )?;
        Ok(DwfState::from(state))
    }

    /// Returns (available, lost, corrupted) for record mode.
    pub fn analog_in_status_record(&self) -> Result<(i32, i32, i32), DwfError> {
        let (mut available, mut lost, mut corrupted): (c_int, c_int, c_int) = (0, 0, 0);
        dwf_call!(
            &self.dwf,
            FDwfAnalogInStatusRecord(
                self.handle => Hdwf,
                &mut available => *mut c_int,
                &mut lost => *mut c_int,
                &mut corrupted => *mut c_int
            )
        )?;
        Ok((available, lost, corrupted))
    }

    pub fn analog_in_status_data(&self, channel: i32, dst: &mut [f64]) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfAnalogInStatusData(
                self.handle => Hdwf,
                channel => c_int,
                dst.as_mut_ptr() => *mut c_double,
                dst.len() as c_int => c_int
            )
        )
    }

    /// Copies `dst.len()` samples starting at sample `first` of the device buffer.
    pub fn analog_in_status_data2(
        &self,
        channel: i32,
        dst: &mut [f64],
        first: usize,
    ) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfAnalogInStatusData2(
                self.handle => Hdwf,
                channel => c_int,
                dst.as_mut_ptr() => *mut c_double,
                first as c_int => c_int,
                dst.len() as c_int => c_int
            )
        )
    }

    /// Returns (UTC seconds, tick, ticks per second) of the last capture.
    pub fn analog_in_status_time(&self) -> Result<(u32, u32, u32), DwfError> {
        let (mut sec, mut tick, mut ticks_per_sec): (c_uint, c_uint, c_uint) = (0, 0, 0);
        dwf_call!(
            &self.dwf,
            FDwfAnalogInStatusTime(
                self.handle => Hdwf,
                &mut sec => *mut c_uint,
                &mut tick => *mut c_uint,
                &mut ticks_per_sec => *mut c_uint
            )
        )?;
        Ok((sec, tick, ticks_per_sec))
    }

    pub fn analog_in_frequency_set(&self, hz: f64) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfAnalogInFrequencySet(self.handle => Hdwf, hz => c_double))
    }

    pub fn analog_in_frequency_get(&self) -> Result<f64, DwfError> {
        let mut hz: c_double = 0.0;
        dwf_call!(&self.dwf, FDwfAnalogInFrequencyGet(self.handle => Hdwf, &mut hz => *mut c_double))?;
        Ok(hz)
    }

    pub fn analog_in_buffer_size_set(&self, size: usize) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfAnalogInBufferSizeSet(self.handle => Hdwf, size as c_int => c_int))
    }

    pub fn analog_in_buffer_size_get(&self) -> Result<usize, DwfError> {
        let mut size: c_int = 0;
        dwf_call!(&self.dwf, FDwfAnalogInBufferSizeGet(self.handle => Hdwf, &mut size => *mut c_int))?;
        Ok(size.max(0) as usize)
    }

    /// Returns (min, max) buffer size.
    pub fn analog_in_buffer_size_info(&self) -> Result<(usize, usize), DwfError> {
        let (mut min, mut max): (c_int, c_int) = (0, 0);
        dwf_call!(
            &self.dwf,
            FDwfAnalogInBufferSizeInfo(self.handle => Hdwf, &mut min => *mut c_int, &mut max => *mut c_int)
        )?;
        Ok((min.max(0) as usize, max.max(0) as usize))
    }

    pub fn analog_in_acquisition_mode_set(&self, mode: AcquisitionMode) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfAnalogInAcquisitionModeSet(self.handle => Hdwf, mode as c_int => c_int)
        )
    }

    /// Record length in seconds; 0 records until stopped.
    pub fn analog_in_record_length_set(&self, seconds: f64) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfAnalogInRecordLengthSet(self.handle => Hdwf, seconds => c_double))
    }

    pub fn analog_in_channel_count(&self) -> Result<usize, DwfError> {
        let mut count: c_int = 0;
        dwf_call!(&self.dwf, FDwfAnalogInChannelCount(self.handle => Hdwf, &mut count => *mut c_int))?;
        Ok(count.max(0) as usize)
    }

    pub fn analog_in_channel_enable_set(&self, channel: i32, enable: bool) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfAnalogInChannelEnableSet(self.handle => Hdwf, channel => c_int, enable as c_int => c_int)
        )
    }

    pub fn analog_in_channel_range_set(&self, channel: i32, volts: f64) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfAnalogInChannelRangeSet(self.handle => Hdwf, channel => c_int, volts => c_double)
        )
    }

    pub fn analog_in_channel_offset_set(&self, channel: i32, volts: f64) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfAnalogInChannelOffsetSet(self.handle => Hdwf, channel => c_int, volts => c_double)
        )
    }

    pub fn analog_in_trigger_source_set(&self, source: TriggerSource) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfAnalogInTriggerSourceSet(self.handle => Hdwf, source as c_uchar => c_uchar)
        )
    }

    pub fn analog_in_trigger_type_set(&self, kind: TriggerType) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfAnalogInTriggerTypeSet(self.handle => Hdwf, kind as c_int => c_int))
    }

    pub fn analog_in_trigger_channel_set(&self, channel: i32) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfAnalogInTriggerChannelSet(self.handle => Hdwf, channel => c_int))
    }

    pub fn analog_in_trigger_level_set(&self, volts: f64) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfAnalogInTriggerLevelSet(self.handle => Hdwf, volts => c_double))
    }

    pub fn analog_in_trigger_hysteresis_set(&self, volts: f64) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfAnalogInTriggerHysteresisSet(self.handle => Hdwf, volts => c_double))
    }

    pub fn analog_in_trigger_condition_set(&self, slope: TriggerSlope) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfAnalogInTriggerConditionSet(self.handle => Hdwf, slope as c_int => c_int)
        )
    }

    /// Trigger position in seconds, relative to the middle of the buffer.
    pub fn analog_in_trigger_position_set(&self, seconds: f64) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfAnalogInTriggerPositionSet(self.handle => Hdwf, seconds => c_double))
    }

    /// 0 disables the auto trigger.
    pub fn analog_in_trigger_auto_timeout_set(&self, seconds: f64) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfAnalogInTriggerAutoTimeoutSet(self.handle => Hdwf, seconds => c_double)
        )
    }
}

// Analog out (waveform generator)
impl Device {
    pub fn analog_out_count(&self) -> Result<usize, DwfError> {
        let mut count: c_int = 0;
        dwf_call!(&self.dwf, FDwfAnalogOutCount(self.handle => Hdwf, &mut count => *mut c_int))?;
        Ok(count.max(0) as usize)
    }

    pub fn analog_out_reset(&self, channel: i32) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfAnalogOutReset(self.handle => Hdwf, channel => c_int))
    }

    pub fn analog_out_configure(&self, channel: i32, start: bool) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfAnalogOutConfigure(self.handle => Hdwf, channel => c_int, start as c_int => c_int)
        )
    }

    pub fn analog_out_status(&self, channel: i32) -> Result<DwfState, DwfError> {
        let mut state: c_uchar = 0;
        dwf_call!(
            &self.dwf,
            FDwfAnalogOutStatus(self.handle => Hdwf, channel => c_int, &mut state => *mut c_uchar)
        )?;
        Ok(DwfState::from(state))
    }

    pub fn analog_out_node_enable_set(
        &self,
        channel: i32,
        node: AnalogOutNode,
        enable: bool,
    ) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfAnalogOutNodeEnableSet(
                self.handle => Hdwf,
                channel => c_int,
                node as c_int => c_int,
                enable as c_int => c_int
            )
        )
    }

    pub fn analog_out_node_function_set(
        &self,
        channel: i32,
        node: AnalogOutNode,
        function: AnalogOutFunction,
    ) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfAnalogOutNodeFunctionSet(
                self.handle => Hdwf,
                channel => c_int,
                node as c_int => c_int,
                function as c_uchar => c_uchar
            )
        )
    }

    pub fn analog_out_node_frequency_set(
        &self,
        channel: i32,
        node: AnalogOutNode,
        hz: f64,
    ) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfAnalogOutNodeFrequencySet(self.handle => Hdwf, channel => c_int, node as c_int => c_int, hz => c_double)
        )
    }

    pub fn analog_out_node_amplitude_set(
        &self,
        channel: i32,
        node: AnalogOutNode,
        volts: f64,
    ) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfAnalogOutNodeAmplitudeSet(self.handle => Hdwf, channel => c_int, node as c_int => c_int, volts => c_double)
        )
    }

    pub fn analog_out_node_offset_set(
        &self,
        channel: i32,
        node: AnalogOutNode,
        volts: f64,
    ) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfAnalogOutNodeOffsetSet(self.handle => Hdwf, channel => c_int, node as c_int => c_int, volts => c_double)
        )
    }

    /// Symmetry (duty) in percent.
    pub fn analog_out_node_symmetry_set(
        &self,
        channel: i32,
        node: AnalogOutNode,
        percent: f64,
    ) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfAnalogOutNodeSymmetrySet(self.handle => Hdwf, channel => c_int, node as c_int => c_int, percent => c_double)
        )
    }

    pub fn analog_out_node_phase_set(
        &self,
        channel: i32,
        node: AnalogOutNode,
        degrees: f64,
    ) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfAnalogOutNodePhaseSet(self.handle => Hdwf, channel => c_int, node as c_int => c_int, degrees => c_double)
        )
    }

    /// Custom waveform samples, normalized to [-1, 1].
    pub fn analog_out_node_data_set(
        &self,
        channel: i32,
        node: AnalogOutNode,
        data: &[f64],
    ) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfAnalogOutNodeDataSet(
                self.handle => Hdwf,
                channel => c_int,
                node as c_int => c_int,
                data.as_ptr() as *mut c_double => *mut c_double,
                data.len() as c_int => c_int
            )
        )
    }

    pub fn analog_out_idle_set(&self, channel: i32, idle: AnalogOutIdle) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfAnalogOutIdleSet(self.handle => Hdwf, channel => c_int, idle as c_int => c_int)
        )
    }

    pub fn analog_out_run_set(&self, channel: i32, seconds: f64) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfAnalogOutRunSet(self.handle => Hdwf, channel => c_int, seconds => c_double)
        )
    }

    pub fn analog_out_wait_set(&self, channel: i32, seconds: f64) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfAnalogOutWaitSet(self.handle => Hdwf, channel => c_int, seconds => c_double)
        )
    }

    /// 0 repeats forever.
    pub fn analog_out_repeat_set(&self, channel: i32, count: i32) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfAnalogOutRepeatSet(self.handle => Hdwf, channel => c_int, count => c_int)
        )
    }

    pub fn analog_out_repeat_trigger_set(&self, channel: i32, enable: bool) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfAnalogOutRepeatTriggerSet(self.handle => Hdwf, channel => c_int, enable as c_int => c_int)
        )
    }

    pub fn analog_out_trigger_source_set(
        &self,
        channel: i32,
        source: TriggerSource,
    ) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfAnalogOutTriggerSourceSet(self.handle => Hdwf, channel => c_int, source as c_uchar => c_uchar)
        )
    }
}

// Analog IO (power supplies, DMM)
impl Device {
    pub fn analog_io_configure(&self) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfAnalogIOConfigure(self.handle => Hdwf))
    }

    pub fn analog_io_status(&self) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfAnalogIOStatus(self.handle => Hdwf))
    }

    /// Master enable of the supplies.
    pub fn analog_io_enable_set(&self, enable: bool) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfAnalogIOEnableSet(self.handle => Hdwf, enable as c_int => c_int))
    }

    pub fn analog_io_channel_node_set(
        &self,
        channel: i32,
        node: i32,
        value: f64,
    ) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfAnalogIOChannelNodeSet(self.handle => Hdwf, channel => c_int, node => c_int, value => c_double)
        )
    }

    pub fn analog_io_channel_node_status(&self, channel: i32, node: i32) -> Result<f64, DwfError> {
        let mut value: c_double = 0.0;
        dwf_call!(
            &self.dwf,
            FDwfAnalogIOChannelNodeStatus(
                self.handle => Hdwf,
                channel => c_int,
                node => c_int,
                &mut value => *mut c_double
            )
        )?;
        Ok(value)
    }
}

// Digital IO (static pins)
impl Device {
    pub fn digital_io_reset(&self) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfDigitalIOReset(self.handle => Hdwf))
    }

    pub fn digital_io_configure(&self) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfDigitalIOConfigure(self.handle => Hdwf))
    }

    pub fn digital_io_status(&self) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfDigitalIOStatus(self.handle => Hdwf))
    }

    pub fn digital_io_output_enable_set(&self, mask: u32) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfDigitalIOOutputEnableSet(self.handle => Hdwf, mask => c_uint))
    }

    pub fn digital_io_output_set(&self, value: u32) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfDigitalIOOutputSet(self.handle => Hdwf, value => c_uint))
    }

    pub fn digital_io_input_status(&self) -> Result<u32, DwfError> {
        let mut value: c_uint = 0;
        dwf_call!(&self.dwf, FDwfDigitalIOInputStatus(self.handle => Hdwf, &mut value => *mut c_uint))?;
        Ok(value)
    }
}

// Digital in (logic analyzer)
impl Device {
    pub fn digital_in_reset(&self) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfDigitalInReset(self.handle => Hdwf))
    }

    pub fn digital_in_configure(&self, reconfigure: bool, start: bool) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfDigitalInConfigure(self.handle => Hdwf, reconfigure as c_int => c_int, start as c_int => c_int)
        )
    }

    pub fn digital_in_status(&self, read_data: bool) -> Result<DwfState, DwfError> {
        let mut state: c_uchar = 0;
        dwf_call!(
            &self.dwf,
            FDwfDigitalInStatus(self.handle => Hdwf, read_data as c_int => c_int, &mut state => *mut c_uchar)
        )?;
        Ok(DwfState::from(state))
    }

    /// Returns (available, lost, corrupted) for record mode.
    pub fn digital_in_status_record(&self) -> Result<(i32, i32, i32), DwfError> {
        let (mut available, mut lost, mut corrupted): (c_int, c_int, c_int) = (0, 0, 0);
        dwf_call!(
            &self.dwf,
            FDwfDigitalInStatusRecord(
                self.handle => Hdwf,
                &mut available => *mut c_int,
                &mut lost => *mut c_int,
                &mut corrupted => *mut c_int
            )
        )?;
        Ok((available, lost, corrupted))
    }

    /// Copies `dst.len()` samples starting at sample `first`; the sample width is
    /// taken from `T` and must match the configured sample format.
    pub fn digital_in_status_data2<T: Copy>(
        &self,
        dst: &mut [T],
        first: usize,
    ) -> Result<(), DwfError> {
        let bytes = std::mem::size_of_val(dst);
        dwf_call!(
            &self.dwf,
            FDwfDigitalInStatusData2(
                self.handle => Hdwf,
                dst.as_mut_ptr() as *mut c_void => *mut c_void,
                first as c_int => c_int,
                bytes as c_int => c_int
            )
        )
    }

    /// Returns (available, lost, corrupted) of compressed data.
    pub fn digital_in_status_compress(&self) -> Result<(i32, i32, i32), DwfError> {
        let (mut available, mut lost, mut corrupted): (c_int, c_int, c_int) = (0, 0, 0);
        dwf_call!(
            &self.dwf,
            FDwfDigitalInStatusCompress(
                self.handle => Hdwf,
                &mut available => *mut c_int,
                &mut lost => *mut c_int,
                &mut corrupted => *mut c_int
            )
        )?;
        Ok((available, lost, corrupted))
    }

    /// Compressed samples come as (value, stable count - 1) pairs.
    pub fn digital_in_status_compressed(&self, dst: &mut [u32]) -> Result<(), DwfError> {
        let bytes = std::mem::size_of_val(dst);
        dwf_call!(
            &self.dwf,
            FDwfDigitalInStatusCompressed(
                self.handle => Hdwf,
                dst.as_mut_ptr() as *mut c_void => *mut c_void,
                bytes as c_int => c_int
            )
        )
    }

    pub fn digital_in_internal_clock_info(&self) -> Result<f64, DwfError> {
        let mut hz: c_double = 0.0;
        dwf_call!(
            &self.dwf,
            FDwfDigitalInInternalClockInfo(self.handle => Hdwf, &mut hz => *mut c_double)
        )?;
        Ok(hz)
    }

    pub fn digital_in_divider_set(&self, divider: u32) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfDigitalInDividerSet(self.handle => Hdwf, divider => c_uint))
    }

    pub fn digital_in_divider_get(&self) -> Result<u32, DwfError> {
        let mut divider: c_uint = 0;
        dwf_call!(&self.dwf, FDwfDigitalInDividerGet(self.handle => Hdwf, &mut divider => *mut c_uint))?;
        Ok(divider)
    }

    /// 8, 16, 32 (or 64 on devices that support it) bits per sample.
    pub fn digital_in_sample_format_set(&self, bits: u32) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfDigitalInSampleFormatSet(self.handle => Hdwf, bits as c_int => c_int)
        )
    }

    pub fn digital_in_buffer_size_set(&self, size: usize) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfDigitalInBufferSizeSet(self.handle => Hdwf, size as c_int => c_int))
    }

    pub fn digital_in_acquisition_mode_set(&self, mode: AcquisitionMode) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfDigitalInAcquisitionModeSet(self.handle => Hdwf, mode as c_int => c_int)
        )
    }

    /// Only transitions on the masked pins produce new compressed samples.
    pub fn digital_in_sample_sensible_set(&self, mask: u32) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfDigitalInSampleSensibleSet(self.handle => Hdwf, mask => c_uint))
    }

    /// Puts DIO pins in the least significant bits (Digital Discovery).
    pub fn digital_in_input_order_set(&self, dio_first: bool) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfDigitalInInputOrderSet(self.handle => Hdwf, dio_first as c_int => c_int)
        )
    }

    pub fn digital_in_trigger_source_set(&self, source: TriggerSource) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfDigitalInTriggerSourceSet(self.handle => Hdwf, source as c_uchar => c_uchar)
        )
    }

    /// Samples acquired after the trigger; 0 in record mode is continuous.
    pub fn digital_in_trigger_position_set(&self, samples: u32) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfDigitalInTriggerPositionSet(self.handle => Hdwf, samples => c_uint))
    }
}

// Digital out (pattern generator)
impl Device {
    pub fn digital_out_reset(&self) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfDigitalOutReset(self.handle => Hdwf))
    }

    pub fn digital_out_configure(&self, start: bool) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfDigitalOutConfigure(self.handle => Hdwf, start as c_int => c_int))
    }

    pub fn digital_out_enable_set(&self, channel: i32, enable: bool) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfDigitalOutEnableSet(self.handle => Hdwf, channel => c_int, enable as c_int => c_int)
        )
    }

    pub fn digital_out_divider_set(&self, channel: i32, divider: u32) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfDigitalOutDividerSet(self.handle => Hdwf, channel => c_int, divider => c_uint)
        )
    }

    pub fn digital_out_counter_set(&self, channel: i32, low: u32, high: u32) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfDigitalOutCounterSet(self.handle => Hdwf, channel => c_int, low => c_uint, high => c_uint)
        )
    }

    pub fn digital_out_internal_clock_info(&self) -> Result<f64, DwfError> {
        let mut hz: c_double = 0.0;
        dwf_call!(
            &self.dwf,
            FDwfDigitalOutInternalClockInfo(self.handle => Hdwf, &mut hz => *mut c_double)
        )?;
        Ok(hz)
    }
}

// Impedance analyzer
impl Device {
    pub fn impedance_reset(&self) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfAnalogImpedanceReset(self.handle => Hdwf))
    }

    /// 0 = W1-C1-DUT-C2-R-GND, 1 = W1-C1-R-C2-DUT-GND, 8 = impedance adapter
    pub fn impedance_mode_set(&self, mode: i32) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfAnalogImpedanceModeSet(self.handle => Hdwf, mode => c_int))
    }

    pub fn impedance_reference_set(&self, ohms: f64) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfAnalogImpedanceReferenceSet(self.handle => Hdwf, ohms => c_double))
    }

    pub fn impedance_frequency_set(&self, hz: f64) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfAnalogImpedanceFrequencySet(self.handle => Hdwf, hz => c_double))
    }

    pub fn impedance_amplitude_set(&self, volts: f64) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfAnalogImpedanceAmplitudeSet(self.handle => Hdwf, volts => c_double))
    }

    pub fn impedance_configure(&self, start: bool) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfAnalogImpedanceConfigure(self.handle => Hdwf, start as c_int => c_int)
        )
    }

    pub fn impedance_status(&self) -> Result<DwfState, DwfError> {
        let mut state: c_uchar = 0;
        dwf_call!(
            &self.dwf,
            FDwfAnalogImpedanceStatus(self.handle => Hdwf, &mut state => *mut c_uchar)
        )?;
        Ok(DwfState::from(state))
    }

    pub fn impedance_status_measure(&self, measure: ImpedanceMeasurement) -> Result<f64, DwfError> {
        let mut value: c_double = 0.0;
        dwf_call!(
            &self.dwf,
            FDwfAnalogImpedanceStatusMeasure(
                self.handle => Hdwf,
                measure as c_int => c_int,
                &mut value => *mut c_double
            )
        )?;
        Ok(value)
    }
}

// SPI master
impl Device {
    pub fn spi_reset(&self) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfDigitalSpiReset(self.handle => Hdwf))
    }

    pub fn spi_frequency_set(&self, hz: f64) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfDigitalSpiFrequencySet(self.handle => Hdwf, hz => c_double))
    }

    pub fn spi_clock_set(&self, pin: i32) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfDigitalSpiClockSet(self.handle => Hdwf, pin => c_int))
    }

    /// `dq` 0 = MOSI/SISO, 1 = MISO.
    pub fn spi_data_set(&self, dq: i32, pin: i32) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfDigitalSpiDataSet(self.handle => Hdwf, dq => c_int, pin => c_int))
    }

    pub fn spi_idle_set(&self, dq: i32, idle: DigitalOutIdle) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfDigitalSpiIdleSet(self.handle => Hdwf, dq => c_int, idle as c_int => c_int)
        )
    }

    pub fn spi_mode_set(&self, mode: i32) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfDigitalSpiModeSet(self.handle => Hdwf, mode => c_int))
    }

    pub fn spi_order_set(&self, msb_first: bool) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfDigitalSpiOrderSet(self.handle => Hdwf, msb_first as c_int => c_int))
    }

    /// Chip select pin and its idle level.
    pub fn spi_select_set(&self, pin: i32, idle_high: bool) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfDigitalSpiSelectSet(self.handle => Hdwf, pin => c_int, idle_high as c_uchar => c_uchar)
        )
    }

    pub fn spi_write_one(&self, dq_count: i32, bits: i32, word: u32) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfDigitalSpiWriteOne(self.handle => Hdwf, dq_count => c_int, bits => c_int, word => c_uint)
        )
    }

    pub fn spi_write_read(
        &self,
        dq_count: i32,
        bits: i32,
        tx: &[u8],
        rx: &mut [u8],
    ) -> Result<(), DwfError> {
        dwf_call!(
            &self.dwf,
            FDwfDigitalSpiWriteRead(
                self.handle => Hdwf,
                dq_count => c_int,
                bits => c_int,
                tx.as_ptr() as *mut c_uchar => *mut c_uchar,
                tx.len() as c_int => c_int,
                rx.as_mut_ptr() => *mut c_uchar,
                rx.len() as c_int => c_int
            )
        )
    }
}

// I2C master. Addresses are 7-bit; the shift happens here.
impl Device {
    pub fn i2c_reset(&self) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfDigitalI2cReset(self.handle => Hdwf))
    }

    pub fn i2c_rate_set(&self, hz: f64) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfDigitalI2cRateSet(self.handle => Hdwf, hz => c_double))
    }

    pub fn i2c_scl_set(&self, pin: i32) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfDigitalI2cSclSet(self.handle => Hdwf, pin => c_int))
    }

    pub fn i2c_sda_set(&self, pin: i32) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfDigitalI2cSdaSet(self.handle => Hdwf, pin => c_int))
    }

    pub fn i2c_stretch_set(&self, enable: bool) -> Result<(), DwfError> {
        dwf_call!(&self.dwf, FDwfDigitalI2cStretchSet(self.handle => Hdwf, enable as c_int => c_int))
    }

    /// True when SCL and SDA are both high.
    pub fn i2c_clear(&self) -> Result<bool, DwfError> {
        let mut free: c_int = 0;
        dwf_call!(&self.dwf, FDwfDigitalI2cClear(self.handle => Hdwf, &mut free => *mut c_int))?;
        Ok(free != 0)
    }

    /// Returns the NAK index, 0 when every byte was acknowledged.
    pub fn i2c_write(&self, address: u8, tx: &[u8]) -> Result<i32, DwfError> {
        let mut nak: c_int = 0;
        dwf_call!(
            &self.dwf,
            FDwfDigitalI2cWrite(
                self.handle => Hdwf,
                address << 1 => c_uchar,
                tx.as_ptr() as *mut c_uchar => *mut c_uchar,
                tx.len() as c_int => c_int,
                &mut nak => *mut c_int
            )
        )?;
        Ok(nak)
    }

    pub fn i2c_read(&self, address: u8, rx: &mut [u8]) -> Result<i32, DwfError> {
        let mut nak: c_int = 0;
        dwf_call!(
            &self.dwf,
            FDwfDigitalI2cRead(
                self.handle => Hdwf,
                address << 1 => c_uchar,
                rx.as_mut_ptr() => *mut c_uchar,
                rx.len() as c_int => c_int,
                &mut nak => *mut c_int
            )
        )?;
        Ok(nak)
    }

    pub fn i2c_write_read(&self, address: u8, tx: &[u8], rx: &mut [u8]) -> Result<i32, DwfError> {
        let mut nak: c_int = 0;
        dwf_call!(
            &self.dwf,
            FDwfDigitalI2cWriteRead(
                self.handle => Hdwf,
                address << 1 => c_uchar,
                tx.as_ptr() as *mut c_uchar => *mut c_uchar,
                tx.len() as c_int => c_int,
                rx.as_mut_ptr() => *mut c_uchar,
                rx.len() as c_int => c_int,
                &mut nak => *mut c_int
            )
        )?;
        Ok(nak)
    }
}
