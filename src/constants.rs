//! Enumeration values of the WaveForms SDK header.

use crate::dwf::Hdwf;
use serde::Deserialize;

/// `From<i32>` matching the raw value against the listed variants; anything
/// else becomes `Unknown`.
macro_rules! from_raw {
    ($name:ident [$($variant:ident),* $(,)?]) => {
        impl From<i32> for $name {
            fn from(value: i32) -> Self {
                [$(Self::$variant),*]
                    .into_iter()
                    .find(|v| *v as i32 == value)
                    .unwrap_or(Self::Unknown)
            }
        }
    };
}

/// Handle value returned when no device could be opened.
pub const HDWF_NONE: Hdwf = 0;

#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DwfState {
    Ready = 0,
    Armed = 1,
    Done = 2,
    /// Also reported as "triggered".
    Running = 3,
    Config = 4,
    Prefill = 5,
    NotDone = 6,
    Wait = 7,
    Unknown = 255,
}

impl From<u8> for DwfState {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Ready,
            1 => Self::Armed,
            2 => Self::Done,
            3 => Self::Running,
            4 => Self::Config,
            5 => Self::Prefill,
            6 => Self::NotDone,
            7 => Self::Wait,
            _ => Self::Unknown,
        }
    }
}

impl From<i32> for DwfState {
    fn from(value: i32) -> Self {
        u8::try_from(value).map_or(Self::Unknown, Self::from)
    }
}

impl DwfState {
    pub fn is_done(self) -> bool {
        self == Self::Done
    }
}

#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
pub enum TriggerSource {
    None = 0,
    PC = 1,
    DetectorAnalogIn = 2,
    DetectorDigitalIn = 3,
    AnalogIn = 4,
    DigitalIn = 5,
    DigitalOut = 6,
    AnalogOut1 = 7,
    AnalogOut2 = 8,
    AnalogOut3 = 9,
    AnalogOut4 = 10,
    External1 = 11,
    External2 = 12,
    External3 = 13,
    External4 = 14,
    High = 15,
    Low = 16,
    Clock = 17,
    #[serde(skip)]
    Unknown = 255,
}

impl TriggerSource {
    /// Trigger source following the given analog out channel.
    pub fn analog_out(channel: i32) -> Self {
        match channel {
            1 => Self::AnalogOut2,
            2 => Self::AnalogOut3,
            3 => Self::AnalogOut4,
            _ => Self::AnalogOut1,
        }
    }
}

#[repr(i32)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
pub enum AcquisitionMode {
    Single = 0,
    ScanShift = 1,
    ScanScreen = 2,
    Record = 3,
    Overs = 4,
    Single1 = 5,
    #[serde(skip)]
    Unknown = -1,
}

#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
pub enum AnalogOutFunction {
    DC = 0,
    Sine = 1,
    Square = 2,
    Triangle = 3,
    RampUp = 4,
    RampDown = 5,
    Noise = 6,
    Pulse = 7,
    Trapezium = 8,
    SinePower = 9,
    SineNA = 10,
    CustomPattern = 28,
    PlayPattern = 29,
    Custom = 30,
    Play = 31,
    #[serde(skip)]
    Unknown = 255,
}

#[repr(i32)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AnalogOutNode {
    Carrier = 0,
    FM = 1,
    AM = 2,
    Unknown = -1,
}

#[repr(i32)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
pub enum AnalogOutIdle {
    Disable = 0,
    Offset = 1,
    Initial = 2,
    High = 3,
    Low = 4,
    #[serde(skip)]
    Unknown = -1,
}

#[repr(i32)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
pub enum TriggerType {
    Edge = 0,
    Pulse = 1,
    Transition = 2,
    Window = 3,
    #[serde(skip)]
    Unknown = -1,
}

#[repr(i32)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
pub enum TriggerSlope {
    Rise = 0,
    Fall = 1,
    Either = 2,
    #[serde(skip)]
    Unknown = -1,
}

#[repr(i32)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DwfParam {
    UsbPower = 2,
    LedBrightness = 3,
    /// 0 = keep running, 1 = stop, 2 = shutdown
    OnClose = 4,
    AudioOut = 5,
    UsbLimit = 6,
    AnalogOut = 7,
    Frequency = 8,
    ExtFreq = 9,
    ClockMode = 10,
    TempLimit = 11,
    FreqPhase = 12,
    FreqPhaseSteps = 13,
    Unknown = -1,
}

#[repr(i32)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DigitalOutIdle {
    Init = 0,
    Low = 1,
    High = 2,
    Zet = 3,
    Unknown = -1,
}

#[repr(i32)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EnumFilter {
    All = 0,
    Usb = 0x0000001,
    Network = 0x0000002,
    Axi = 0x0000004,
    Remote = 0x1000000,
    Audio = 0x2000000,
    Demo = 0x4000000,
    Unknown = -1,
}

#[repr(i32)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ImpedanceMeasurement {
    Impedance = 0,
    ImpedancePhase = 1,
    Resistance = 2,
    Reactance = 3,
    Admittance = 4,
    AdmittancePhase = 5,
    Conductance = 6,
    Susceptance = 7,
    SeriesCapacitance = 8,
    ParallelCapacitance = 9,
    SeriesInductance = 10,
    ParallelInductance = 11,
    Dissipation = 12,
    Quality = 13,
    Vrms = 14,
    Vreal = 15,
    Vimag = 16,
    Irms = 17,
    Ireal = 18,
    Iimag = 19,
    Unknown = -1,
}

impl ImpedanceMeasurement {
    pub const ALL: [ImpedanceMeasurement; 20] = [
        Self::Impedance,
        Self::ImpedancePhase,
        Self::Resistance,
        Self::Reactance,
        Self::Admittance,
        Self::AdmittancePhase,
        Self::Conductance,
        Self::Susceptance,
        Self::SeriesCapacitance,
        Self::ParallelCapacitance,
        Self::SeriesInductance,
        Self::ParallelInductance,
        Self::Dissipation,
        Self::Quality,
        Self::Vrms,
        Self::Vreal,
        Self::Vimag,
        Self::Irms,
        Self::Ireal,
        Self::Iimag,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Impedance => "Impedance",
            Self::ImpedancePhase => "ImpedancePhase",
            Self::Resistance => "Resistance",
            Self::Reactance => "Reactance",
            Self::Admittance => "Admittance",
            Self::AdmittancePhase => "AdmittancePhase",
            Self::Conductance => "Conductance",
            Self::Susceptance => "Susceptance",
            Self::SeriesCapacitance => "SeriesCapacitance",
            Self::ParallelCapacitance => "ParallelCapacitance",
            Self::SeriesInductance => "SeriesInductance",
            Self::ParallelInductance => "ParallelInductance",
            Self::Dissipation => "Dissipation",
            Self::Quality => "Quality",
            Self::Vrms => "Vrms",
            Self::Vreal => "Vreal",
            Self::Vimag => "Vimag",
            Self::Irms => "Irms",
            Self::Ireal => "Ireal",
            Self::Iimag => "Iimag",
            Self::Unknown => "Unknown",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Self::Impedance | Self::Resistance | Self::Reactance => "Ohm",
            Self::ImpedancePhase | Self::AdmittancePhase => "Radian",
            Self::Admittance | Self::Conductance | Self::Susceptance => "S",
            Self::SeriesCapacitance | Self::ParallelCapacitance => "F",
            Self::SeriesInductance | Self::ParallelInductance => "H",
            Self::Dissipation | Self::Quality => "X",
            Self::Vrms | Self::Vreal | Self::Vimag => "V",
            Self::Irms | Self::Ireal | Self::Iimag => "A",
            Self::Unknown => "",
        }
    }
}

from_raw!(TriggerSource [
    None, PC, DetectorAnalogIn, DetectorDigitalIn, AnalogIn, DigitalIn, DigitalOut,
    AnalogOut1, AnalogOut2, AnalogOut3, AnalogOut4,
    External1, External2, External3, External4, High, Low, Clock,
]);
from_raw!(AcquisitionMode [Single, ScanShift, ScanScreen, Record, Overs, Single1]);
from_raw!(AnalogOutFunction [
    DC, Sine, Square, Triangle, RampUp, RampDown, Noise, Pulse, Trapezium, SinePower, SineNA,
    CustomPattern, PlayPattern, Custom, Play,
]);
from_raw!(AnalogOutNode [Carrier, FM, AM]);
from_raw!(AnalogOutIdle [Disable, Offset, Initial, High, Low]);
from_raw!(TriggerType [Edge, Pulse, Transition, Window]);
from_raw!(TriggerSlope [Rise, Fall, Either]);
from_raw!(DwfParam [
    UsbPower, LedBrightness, OnClose, AudioOut, UsbLimit, AnalogOut, Frequency, ExtFreq,
    ClockMode, TempLimit, FreqPhase, FreqPhaseSteps,
]);
from_raw!(DigitalOutIdle [Init, Low, High, Zet]);
from_raw!(EnumFilter [All, Usb, Network, Axi, Remote, Audio, Demo]);

impl From<i32> for ImpedanceMeasurement {
    fn from(value: i32) -> Self {
        usize::try_from(value)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .unwrap_or(Self::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_from_raw_byte() {
        assert_eq!(DwfState::from(2), DwfState::Done);
        assert_eq!(DwfState::from(3), DwfState::Running);
        assert_eq!(DwfState::from(7), DwfState::Wait);
        assert_eq!(DwfState::from(42), DwfState::Unknown);
        assert!(DwfState::from(2).is_done());
    }

    #[test]
    fn header_values() {
        assert_eq!(TriggerSource::AnalogOut1 as u8, 7);
        assert_eq!(TriggerSource::External1 as u8, 11);
        assert_eq!(AcquisitionMode::Record as i32, 3);
        assert_eq!(AnalogOutFunction::Pulse as u8, 7);
        assert_eq!(AnalogOutFunction::Custom as u8, 30);
        assert_eq!(DwfParam::OnClose as i32, 4);
        assert_eq!(TriggerSource::analog_out(1), TriggerSource::AnalogOut2);
    }

    #[test]
    fn impedance_table_is_in_header_order() {
        for (i, m) in ImpedanceMeasurement::ALL.iter().enumerate() {
            assert_eq!(*m as i32, i as i32);
        }
        assert_eq!(ImpedanceMeasurement::Quality.unit(), "X");
        assert_eq!(ImpedanceMeasurement::SeriesInductance.name(), "SeriesInductance");
    }

    #[test]
    fn raw_values_convert_back() {
        assert_eq!(TriggerSource::from(7), TriggerSource::AnalogOut1);
        assert_eq!(TriggerSource::from(TriggerSource::Clock as i32), TriggerSource::Clock);
        assert_eq!(AcquisitionMode::from(3), AcquisitionMode::Record);
        assert_eq!(AnalogOutFunction::from(30), AnalogOutFunction::Custom);
        assert_eq!(AnalogOutNode::from(2), AnalogOutNode::AM);
        assert_eq!(AnalogOutIdle::from(1), AnalogOutIdle::Offset);
        assert_eq!(TriggerType::from(3), TriggerType::Window);
        assert_eq!(TriggerSlope::from(1), TriggerSlope::Fall);
        assert_eq!(DwfParam::from(4), DwfParam::OnClose);
        assert_eq!(DigitalOutIdle::from(3), DigitalOutIdle::Zet);
        assert_eq!(EnumFilter::from(0x1000000), EnumFilter::Remote);
        assert_eq!(ImpedanceMeasurement::from(13), ImpedanceMeasurement::Quality);
        assert_eq!(DwfState::from(2i32), DwfState::Done);
    }

    #[test]
    fn unknown_values_fall_back() {
        assert_eq!(TriggerSource::from(18), TriggerSource::Unknown);
        assert_eq!(TriggerSource::from(-1), TriggerSource::Unknown);
        assert_eq!(AcquisitionMode::from(6), AcquisitionMode::Unknown);
        assert_eq!(AnalogOutFunction::from(12), AnalogOutFunction::Unknown);
        assert_eq!(AnalogOutNode::from(3), AnalogOutNode::Unknown);
        assert_eq!(AnalogOutIdle::from(9), AnalogOutIdle::Unknown);
        assert_eq!(TriggerType::from(4), TriggerType::Unknown);
        assert_eq!(TriggerSlope::from(-5), TriggerSlope::Unknown);
        assert_eq!(DwfParam::from(1), DwfParam::Unknown);
        assert_eq!(DigitalOutIdle::from(4), DigitalOutIdle::Unknown);
        assert_eq!(EnumFilter::from(3), EnumFilter::Unknown);
        assert_eq!(ImpedanceMeasurement::from(20), ImpedanceMeasurement::Unknown);
        assert_eq!(ImpedanceMeasurement::from(-1), ImpedanceMeasurement::Unknown);
        assert_eq!(DwfState::from(300i32), DwfState::Unknown);
        assert_eq!(ImpedanceMeasurement::Unknown.name(), "Unknown");
    }

    #[test]
    fn unknown_is_not_a_config_choice() {
        #[derive(Deserialize)]
        struct Wrap {
            slope: TriggerSlope,
        }
        assert!(toml::from_str::<Wrap>("slope = \"Unknown\"").is_err());
        let w: Wrap = toml::from_str("slope = \"Either\"").unwrap();
        assert_eq!(w.slope, TriggerSlope::Either);
    }
}
