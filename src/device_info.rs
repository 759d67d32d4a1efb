use crate::constants::{DwfParam, EnumFilter};
use crate::device::Device;
use crate::dwf::{c_buffer_to_string, dwf_call, Dwf, DwfError};
use libc::{c_char, c_int};
use log::info;
use std::sync::Arc;

/// One enumerated device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEntry {
    pub index: i32,
    pub name: String,
    pub serial: String,
    pub device_id: i32,
    pub revision: i32,
    pub opened: bool,
}

fn enum_string(
    dwf: &Dwf,
    name: &'static str,
    index: i32,
) -> Result<String, DwfError> {
    let func = dwf.symbol::<unsafe extern "C" fn(c_int, *mut c_char) -> c_int>(name)?;
    let mut buffer = vec![0u8; 32];
    let ret = unsafe { func(index, buffer.as_mut_ptr() as *mut c_char) };
    dwf.check(name, ret)?;
    Ok(c_buffer_to_string(&buffer))
}

/// Lists every connected device.
pub fn enumerate(dwf: &Dwf) -> Result<Vec<DeviceEntry>, DwfError> {
    let mut count: c_int = 0;
    dwf_call!(dwf, FDwfEnum(EnumFilter::All as c_int => c_int, &mut count => *mut c_int))?;

    let mut entries = Vec::with_capacity(count.max(0) as usize);
    for index in 0..count {
        let (mut device_id, mut revision, mut opened): (c_int, c_int, c_int) = (0, 0, 0);
        dwf_call!(
            dwf,
            FDwfEnumDeviceType(index => c_int, &mut device_id => *mut c_int, &mut revision => *mut c_int)
        )?;
        dwf_call!(dwf, FDwfEnumDeviceIsOpened(index => c_int, &mut opened => *mut c_int))?;
        entries.push(DeviceEntry {
            index,
            name: enum_string(dwf, "FDwfEnumDeviceName", index)?,
            serial: enum_string(dwf, "FDwfEnumSN", index)?,
            device_id,
            revision,
            opened: opened != 0,
        });
    }
    Ok(entries)
}

/// Instrument capabilities of an open device, as `(name, value)` pairs.
pub fn capabilities(device: &Device) -> Vec<(&'static str, String)> {
    let mut caps = Vec::new();
    let mut push = |name: &'static str, value: Result<String, DwfError>| {
        if let Ok(v) = value {
            caps.push((name, v));
        }
    };
    push(
        "AnalogInChannels",
        device.analog_in_channel_count().map(|n| n.to_string()),
    );
    push(
        "AnalogInBufferSize",
        device
            .analog_in_buffer_size_info()
            .map(|(min, max)| format!("{min}..{max}")),
    );
    push(
        "AnalogOutChannels",
        device.analog_out_count().map(|n| n.to_string()),
    );
    push(
        "DigitalInClock",
        device.digital_in_internal_clock_info().map(|hz| format!("{hz} Hz")),
    );
    push(
        "DigitalOutClock",
        device.digital_out_internal_clock_info().map(|hz| format!("{hz} Hz")),
    );
    push(
        "SystemFrequency",
        device.param_get(DwfParam::Frequency).map(|hz| format!("{hz} Hz")),
    );
    push(
        "OnClose",
        device.param_get(DwfParam::OnClose).map(|v| v.to_string()),
    );
    caps
}

fn format_entry(entry: &DeviceEntry, caps: &[(&'static str, String)]) -> String {
    let mut log = format!(
        "Name: {}\nSerialNum: {}\nDeviceId: {}\nRevision: {}\nOpened: {}",
        entry.name, entry.serial, entry.device_id, entry.revision, entry.opened
    );
    for (name, value) in caps {
        log.push_str(&format!("\n{name}: {value}"));
    }
    log
}

/// Logs one block per device. Devices not in use elsewhere are opened
/// briefly to read their capabilities.
pub fn log_all(dwf: &Arc<Dwf>, entries: &[DeviceEntry]) {
    if entries.is_empty() {
        info!("No devices found");
    }
    for entry in entries {
        let caps = if entry.opened {
            Vec::new()
        } else {
            match Device::open(Arc::clone(dwf), entry.index) {
                Ok(device) => {
                    let caps = capabilities(&device);
                    if let Err(e) = device.close() {
                        log::warn!("Device {}: {e}", entry.index);
                    }
                    caps
                }
                Err(e) => {
                    log::warn!("Device {}: {e}", entry.index);
                    Vec::new()
                }
            }
        };
        info!("Device {} parameters:\n{}", entry.index, format_entry(entry, &caps));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_block_lists_capabilities() {
        let entry = DeviceEntry {
            index: 0,
            name: "Analog Discovery 3".into(),
            serial: "SN:210415BB1234".into(),
            device_id: 10,
            revision: 1,
            opened: false,
        };
        let block = format_entry(&entry, &[("AnalogInChannels", "2".into())]);
        assert_eq!(
            block,
            "Name: Analog Discovery 3\nSerialNum: SN:210415BB1234\nDeviceId: 10\n\
             Revision: 1\nOpened: false\nAnalogInChannels: 2"
        );
    }
}
