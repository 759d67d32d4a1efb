use crate::constants::DigitalOutIdle;
use crate::device::Device;
use crate::dwf::DwfError;
use serde::Deserialize;

/// SPI master pins and framing. Pins are DIO indices.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SpiSettings {
    pub frequency: f64,
    pub clock: i32,
    pub mosi: i32,
    pub miso: i32,
    pub select: i32,
    /// CPOL << 1 | CPHA
    pub mode: i32,
    pub msb_first: bool,
}

impl Default for SpiSettings {
    fn default() -> Self {
        Self {
            frequency: 1e6,
            clock: 1,
            mosi: 2,
            miso: 3,
            select: 0,
            mode: 0,
            msb_first: true,
        }
    }
}

const DQ0_MOSI: i32 = 0;
const DQ1_MISO: i32 = 1;

pub fn configure_spi(device: &Device, settings: &SpiSettings) -> Result<(), DwfError> {
    device.spi_reset()?;
    device.spi_frequency_set(settings.frequency)?;
    device.spi_clock_set(settings.clock)?;
    device.spi_data_set(DQ0_MOSI, settings.mosi)?;
    device.spi_data_set(DQ1_MISO, settings.miso)?;
    device.spi_idle_set(DQ0_MOSI, DigitalOutIdle::Zet)?;
    device.spi_idle_set(DQ1_MISO, DigitalOutIdle::Zet)?;
    device.spi_mode_set(settings.mode)?;
    device.spi_order_set(settings.msb_first)?;
    device.spi_select_set(settings.select, true)?;
    // release pins an earlier static IO configuration may still drive
    device.digital_io_reset()?;
    device.digital_io_configure()?;
    // start driving clock and data
    device.spi_write_one(1, 0, 0)?;
    log::debug!("SPI configured: {settings:?}");
    Ok(())
}

/// Full duplex 8-bit transfer; returns as many bytes as were sent.
pub fn spi_transfer(device: &Device, tx: &[u8]) -> Result<Vec<u8>, DwfError> {
    let mut rx = vec![0u8; tx.len()];
    device.spi_write_read(1, 8, tx, &mut rx)?;
    log::debug!("SPI tx {tx:02x?} rx {rx:02x?}");
    Ok(rx)
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct I2cSettings {
    pub rate: f64,
    pub scl: i32,
    pub sda: i32,
    #[serde(default)]
    pub stretch: bool,
}

impl Default for I2cSettings {
    fn default() -> Self {
        Self {
            rate: 100e3,
            scl: 0,
            sda: 1,
            stretch: true,
        }
    }
}

/// Configures the I2C master and checks both lines are pulled high.
pub fn configure_i2c(device: &Device, settings: &I2cSettings) -> Result<(), DwfError> {
    device.i2c_reset()?;
    device.i2c_stretch_set(settings.stretch)?;
    device.i2c_rate_set(settings.rate)?;
    device.i2c_scl_set(settings.scl)?;
    device.i2c_sda_set(settings.sda)?;
    if !device.i2c_clear()? {
        log::error!("I2C bus error, check the pull-ups");
        return Err(DwfError::BusError);
    }
    log::debug!("I2C configured: {settings:?}");
    Ok(())
}

fn check_nak(nak: i32) -> Result<(), DwfError> {
    match nak {
        0 => Ok(()),
        n => Err(DwfError::Nak(n)),
    }
}

pub fn i2c_write(device: &Device, address: u8, tx: &[u8]) -> Result<(), DwfError> {
    check_nak(device.i2c_write(address, tx)?)
}

pub fn i2c_read(device: &Device, address: u8, count: usize) -> Result<Vec<u8>, DwfError> {
    let mut rx = vec![0u8; count];
    check_nak(device.i2c_read(address, &mut rx)?)?;
    Ok(rx)
}

/// Write, repeated start, read.
pub fn i2c_write_read(
    device: &Device,
    address: u8,
    tx: &[u8],
    count: usize,
) -> Result<Vec<u8>, DwfError> {
    let mut rx = vec![0u8; count];
    check_nak(device.i2c_write_read(address, tx, &mut rx)?)?;
    Ok(rx)
}

/// Sends an empty write; true when a device acknowledges `address`.
pub fn i2c_ping(device: &Device, address: u8) -> Result<bool, DwfError> {
    match i2c_write(device, address, &[]) {
        Ok(()) => Ok(true),
        Err(DwfError::Nak(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Three little-endian 16-bit axes at 256 LSB/g, as read from an
/// ADXL345 style accelerometer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Acceleration {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Acceleration {
    pub const LSB_PER_G: f64 = 256.0;

    pub fn from_le_bytes(raw: &[u8; 6]) -> Self {
        let axis = |i: usize| i16::from_le_bytes([raw[i], raw[i + 1]]) as f64 / Self::LSB_PER_G;
        Self {
            x: axis(0),
            y: axis(2),
            z: axis(4),
        }
    }

    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nak_index_becomes_error() {
        assert_eq!(check_nak(0), Ok(()));
        assert_eq!(check_nak(2), Err(DwfError::Nak(2)));
    }

    #[test]
    fn accelerometer_axes() {
        let raw = [0x00, 0x01, 0x80, 0xff, 0x00, 0x00];
        let acc = Acceleration::from_le_bytes(&raw);
        assert_eq!(acc.x, 1.0);
        assert_eq!(acc.y, -0.5);
        assert_eq!(acc.z, 0.0);
        assert!((acc.magnitude() - 1.25f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn defaults_match_common_wiring() {
        let spi = SpiSettings::default();
        assert_eq!((spi.select, spi.clock, spi.mosi, spi.miso), (0, 1, 2, 3));
        assert!(spi.msb_first);
        let i2c = I2cSettings::default();
        assert_eq!((i2c.scl, i2c.sda), (0, 1));
    }
}
