use crate::{
    AcquisitionSettings, AnalogRecordSettings, ChannelSettings, ClockSettings,
    DigitalRecordSettings, EdgeTrigger, ImpedanceSettings, OverflowPolicy, PulseSettings, QuadMode, StopCondition,
    TriggerSettings, TriggerSlope, TriggerSource,
};
use confique::Config;
use serde::Deserialize;
use std::time::Duration;

#[derive(Config, Debug, Clone)]
pub struct Conf {
    #[config(nested)]
    pub library: LibrarySettings,
    #[config(nested)]
    pub device: DeviceSettings,
    #[config(nested)]
    pub record: RecordConf,
    #[config(nested)]
    pub capture: CaptureConf,
    #[config(nested)]
    pub pulse: PulseConf,
    #[config(nested)]
    pub clock: ClockConf,
    #[config(nested)]
    pub impedance: ImpedanceConf,
    #[config(nested)]
    pub quadrature: QuadratureConf,
    #[config(nested)]
    pub output: OutputSettings,
}

#[derive(Config, Debug, Clone)]
pub struct LibrarySettings {
    /// Overrides the platform default shared library.
    #[config(env = "DWF_DAQ_LIBRARY")]
    pub path: Option<String>,
}

#[derive(Config, Debug, Clone)]
pub struct DeviceSettings {
    /// -1 opens the first free device.
    #[config(default = -1, env = "DWF_DAQ_DEVICE")]
    pub index: i32,
    pub config: Option<i32>,
    #[config(default = false)]
    pub auto_configure: bool,
    /// 0 = keep running, 1 = stop, 2 = shutdown
    #[config(default = 0)]
    pub on_close: i32,
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
    Analog,
    Digital,
    /// Analog and digital in one loop.
    Mixed,
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlopeConfig {
    None,
    Rise,
    Fall,
    Either,
}

impl SlopeConfig {
    pub fn slope(self) -> Option<TriggerSlope> {
        match self {
            Self::None => None,
            Self::Rise => Some(TriggerSlope::Rise),
            Self::Fall => Some(TriggerSlope::Fall),
            Self::Either => Some(TriggerSlope::Either),
        }
    }
}

#[derive(Config, Debug, Clone)]
pub struct RecordConf {
    #[config(default = "Analog")]
    pub kind: RecordKind,
    #[config(default = 0)]
    pub channel: i32,
    #[config(default = 1e6)]
    pub frequency: f64,
    #[config(default = 5.0)]
    pub range: f64,
    /// Device buffer; 0 keeps the device default.
    #[config(default = 0)]
    pub device_buffer: usize,
    /// Host ring capacity in samples.
    #[config(default = 1048576)]
    pub ring_capacity: usize,
    #[config(default = "Abort")]
    pub overflow: OverflowPolicy,
    pub samples: Option<u64>,
    /// Seconds.
    pub duration: Option<f64>,
    #[config(default = 16)]
    pub digital_bits: u32,
    #[config(default = "None")]
    pub trigger: SlopeConfig,
    #[config(default = 0.0)]
    pub trigger_level: f64,
    /// Chunk size of `--simulate`.
    #[config(default = 4096)]
    pub sim_chunk: usize,
    /// Mixed records report the delay from the first rising edge of the
    /// `edge_mask` pins to the analog crossing of `edge_low`..`edge_high`.
    #[config(default = 1.3)]
    pub edge_low: f64,
    #[config(default = 1.4)]
    pub edge_high: f64,
    #[config(default = 1)]
    pub edge_mask: u64,
}

impl RecordConf {
    pub fn analog(&self) -> AnalogRecordSettings {
        AnalogRecordSettings {
            channel: self.channel,
            frequency: self.frequency,
            range: self.range,
            buffer_size: self.device_buffer,
            length: 0.0,
            trigger: self.trigger.slope().map(|slope| EdgeTrigger {
                channel: self.channel,
                level: self.trigger_level,
                slope,
            }),
        }
    }

    pub fn digital(&self) -> DigitalRecordSettings {
        DigitalRecordSettings {
            frequency: self.frequency,
            buffer_size: self.device_buffer,
            trigger: TriggerSource::None,
            dio_first: true,
        }
    }

    pub fn stop(&self) -> StopCondition {
        StopCondition {
            samples: self.samples,
            duration: self.duration.map(Duration::from_secs_f64),
        }
    }
}

#[derive(Config, Debug, Clone)]
pub struct CaptureConf {
    #[config(default = 100e6)]
    pub frequency: f64,
    #[config(default = 8192)]
    pub buffer_size: usize,
    #[config(default = [0])]
    pub channels: Vec<i32>,
    #[config(default = 5.0)]
    pub range: f64,
    #[config(default = "None")]
    pub trigger_source: TriggerSource,
    #[config(default = 0)]
    pub trigger_channel: i32,
    #[config(default = 0.0)]
    pub trigger_level: f64,
    #[config(default = 0.01)]
    pub trigger_hysteresis: f64,
    #[config(default = "Rise")]
    pub trigger_slope: TriggerSlope,
    #[config(default = 0.0)]
    pub trigger_position: f64,
    #[config(default = 0.0)]
    pub trigger_auto_timeout: f64,
    /// Seconds to wait for each capture.
    pub timeout: Option<f64>,
}

impl CaptureConf {
    pub fn settings(&self) -> AcquisitionSettings {
        AcquisitionSettings {
            frequency: self.frequency,
            buffer_size: self.buffer_size,
            channels: self
                .channels
                .iter()
                .map(|&index| ChannelSettings {
                    index,
                    range: self.range,
                    offset: 0.0,
                })
                .collect(),
            trigger: TriggerSettings {
                source: self.trigger_source,
                channel: self.trigger_channel,
                level: self.trigger_level,
                hysteresis: self.trigger_hysteresis,
                slope: self.trigger_slope,
                position: self.trigger_position,
                auto_timeout: self.trigger_auto_timeout,
            },
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs_f64)
    }
}

#[derive(Config, Debug, Clone)]
pub struct PulseConf {
    #[config(default = 0)]
    pub channel: i32,
    #[config(default = 1e-6)]
    pub period: f64,
    #[config(default = 5e-7)]
    pub width: f64,
    #[config(default = 1.0)]
    pub amplitude: f64,
    #[config(default = 0.0)]
    pub offset: f64,
    #[config(default = 1)]
    pub count: i32,
    #[config(default = 0.0)]
    pub wait: f64,
    /// `PC` waits for a software trigger per repetition.
    #[config(default = "None")]
    pub trigger: TriggerSource,
}

impl PulseConf {
    pub fn settings(&self) -> PulseSettings {
        PulseSettings {
            channel: self.channel,
            period: self.period,
            width: self.width,
            amplitude: self.amplitude,
            offset: self.offset,
            count: self.count,
            wait: self.wait,
            trigger: self.trigger,
        }
    }
}

#[derive(Config, Debug, Clone)]
pub struct ClockConf {
    #[config(default = 0)]
    pub pin: i32,
    #[config(default = 1e3)]
    pub frequency: f64,
    /// Percent high.
    #[config(default = 50.0)]
    pub duty: f64,
}

impl ClockConf {
    pub fn settings(&self) -> ClockSettings {
        ClockSettings {
            pin: self.pin,
            frequency: self.frequency,
            duty: self.duty,
        }
    }
}

#[derive(Config, Debug, Clone)]
pub struct ImpedanceConf {
    #[config(default = 8)]
    pub mode: i32,
    #[config(default = 1e3)]
    pub reference: f64,
    #[config(default = 333e3)]
    pub frequency: f64,
    #[config(default = 1.0)]
    pub amplitude: f64,
    #[config(default = 1024)]
    pub buffer_size: usize,
    #[config(default = 100)]
    pub average: usize,
}

impl ImpedanceConf {
    pub fn settings(&self) -> ImpedanceSettings {
        ImpedanceSettings {
            mode: self.mode,
            reference: self.reference,
            frequency: self.frequency,
            amplitude: self.amplitude,
            buffer_size: self.buffer_size,
            ..Default::default()
        }
    }
}

#[derive(Config, Debug, Clone)]
pub struct QuadratureConf {
    #[config(default = 0)]
    pub pin_a: u32,
    #[config(default = 1)]
    pub pin_b: u32,
    #[config(default = "X4")]
    pub mode: QuadMode,
    /// Glitch filter in samples.
    #[config(default = 2)]
    pub filter: u64,
    #[config(default = 100e6)]
    pub rate: f64,
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Hdf5,
}

#[derive(Config, Debug, Clone)]
pub struct OutputSettings {
    #[config(default = "data", env = "DWF_DAQ_OUTPUT_DIR")]
    pub dir: String,
    #[config(default = "run")]
    pub stem: String,
    #[config(default = "Csv")]
    pub format: OutputFormat,
    /// Keep the terminal UI off and log to the terminal instead.
    #[config(default = false)]
    pub headless: bool,
    /// Also draw each capture to a PNG next to its data file.
    #[config(default = false)]
    pub plot: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_need_no_file() {
        let conf = Conf::builder().load().unwrap();
        assert_eq!(conf.device.index, -1);
        assert_eq!(conf.record.kind, RecordKind::Analog);
        assert_eq!(conf.record.overflow, OverflowPolicy::Abort);
        assert_eq!(conf.capture.channels, vec![0]);
        assert_eq!(conf.quadrature.mode, QuadMode::X4);
        assert_eq!(conf.output.format, OutputFormat::Csv);
        assert!(!conf.output.plot);
        assert_eq!(conf.pulse.settings().trigger, TriggerSource::None);
        assert!(conf.record.stop().samples.is_none());
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[record]
kind = "Mixed"
overflow = "KeepNewest"
duration = 2.5
trigger = "Fall"
trigger_level = 0.3

[capture]
channels = [0, 1]
trigger_source = "DetectorAnalogIn"

[pulse]
period = 2.5e-6
trigger = "PC"

[clock]
duty = 25.0

[output]
plot = true
"#
        )
        .unwrap();
        let conf = Conf::builder().file(file.path()).load().unwrap();
        assert_eq!(conf.record.kind, RecordKind::Mixed);
        assert_eq!(conf.record.overflow, OverflowPolicy::KeepNewest);
        assert_eq!(conf.record.stop().duration, Some(Duration::from_millis(2500)));

        let analog = conf.record.analog();
        let trigger = analog.trigger.unwrap();
        assert_eq!(trigger.slope, TriggerSlope::Fall);
        assert_eq!(trigger.level, 0.3);

        let capture = conf.capture.settings();
        assert_eq!(capture.channels.len(), 2);
        assert_eq!(capture.trigger.source, TriggerSource::DetectorAnalogIn);

        let pulse = conf.pulse.settings();
        assert!((pulse.symmetry() - 20.0).abs() < 1e-9);
        assert_eq!(pulse.trigger, TriggerSource::PC);

        let clock = conf.clock.settings();
        assert_eq!((clock.frequency, clock.duty), (1e3, 25.0));
        assert!(conf.output.plot);
    }
}
