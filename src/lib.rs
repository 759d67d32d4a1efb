//! Acquisition toolkit for Digilent WaveForms instruments, driven through
//! the `dwf` shared library loaded at runtime.

mod bus;
mod capture;
mod config;
mod constants;
mod device;
mod device_info;
mod dwf;
mod impedance;
mod plot;
mod pulse;
mod quadrature;
mod record;
mod ring;
mod sim;
mod source;
mod tui;
mod utils;
mod writer;

pub use bus::*;
pub use capture::*;
pub use config::*;
pub use constants::*;
pub use device::*;
pub use device_info::*;
pub use dwf::*;
pub use impedance::*;
pub use plot::*;
pub use pulse::*;
pub use quadrature::*;
pub use record::*;
pub use ring::*;
pub use sim::*;
pub use source::*;
pub use tui::*;
pub use utils::*;
pub use writer::*;
