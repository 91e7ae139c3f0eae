//! I2C Bus Abstractions
//!
//! Blocking, addressed transfers over any `embedded-hal` I2C controller.
//! Nothing at this layer retries; callers wrap transfers in a
//! [`RetryPolicy`](crate::retry::RetryPolicy).

use embedded_hal::i2c::{Error as _, I2c};
use heapless::Vec;

use crate::config;
use crate::error::BusError;

/// Transport result
pub type I2cResult<T> = Result<T, BusError>;

/// First and last non-reserved 7-bit addresses
const SCAN_FIRST: u8 = 0x08;
const SCAN_LAST: u8 = 0x77;

/// Maximum number of devices reported by a scan
pub const MAX_SCAN_RESULTS: usize = (SCAN_LAST - SCAN_FIRST + 1) as usize;

/// I2C device address wrapper
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct I2cAddress(u8);

impl I2cAddress {
    /// 24-series EEPROM
    pub const EEPROM: Self = Self(config::EEPROM_I2C_ADDR);

    /// ADAU1701 DSP
    pub const ADAU1701: Self = Self(config::dsp::I2C_ADDR);

    /// Create from 7-bit address
    #[must_use]
    pub const fn new(addr: u8) -> Self {
        Self(addr & 0x7F)
    }

    /// Get the 7-bit address
    #[must_use]
    pub const fn addr(self) -> u8 {
        self.0
    }

    /// Whether the address is outside the reserved ranges
    #[must_use]
    pub const fn is_general(self) -> bool {
        self.0 >= SCAN_FIRST && self.0 <= SCAN_LAST
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for I2cAddress {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "0x{:02X}", self.0);
    }
}

/// Owned I2C controller with 16-bit register/memory addressing helpers
pub struct I2cTransport<B> {
    bus: B,
}

impl<B: I2c> I2cTransport<B> {
    /// Wrap a bus controller
    #[must_use]
    pub const fn new(bus: B) -> Self {
        Self { bus }
    }

    /// Give the controller back
    pub fn release(self) -> B {
        self.bus
    }

    /// Borrow the controller
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Write `prefix` followed by `data` as one transaction
    ///
    /// # Errors
    ///
    /// `InvalidLength` if the transfer does not fit the controller buffer,
    /// otherwise the mapped bus error.
    pub fn write_bytes(&mut self, device: I2cAddress, prefix: &[u8], data: &[u8]) -> I2cResult<()> {
        let total = prefix.len() + data.len();
        if total > config::I2C_BUFFER_SIZE {
            return Err(BusError::InvalidLength(data.len()));
        }
        let mut frame = [0u8; config::I2C_BUFFER_SIZE];
        frame[..prefix.len()].copy_from_slice(prefix);
        frame[prefix.len()..total].copy_from_slice(data);
        self.bus
            .write(device.addr(), &frame[..total])
            .map_err(|e| BusError::from_kind(e.kind()))
    }

    /// Read one byte at a 16-bit memory or register address
    ///
    /// # Errors
    ///
    /// The mapped bus error.
    pub fn read_byte(&mut self, device: I2cAddress, address: u16) -> I2cResult<u8> {
        let mut buf = [0u8; 1];
        self.read_into(device, address, &mut buf)?;
        Ok(buf[0])
    }

    /// Sequential read starting at a 16-bit memory or register address
    ///
    /// # Errors
    ///
    /// The mapped bus error.
    pub fn read_into(&mut self, device: I2cAddress, address: u16, buf: &mut [u8]) -> I2cResult<()> {
        if buf.is_empty() {
            return Ok(());
        }
        self.bus
            .write_read(device.addr(), &address.to_be_bytes(), buf)
            .map_err(|e| BusError::from_kind(e.kind()))
    }

    /// Zero-length write; true when the device acknowledges its address
    pub fn probe(&mut self, device: I2cAddress) -> bool {
        self.bus.write(device.addr(), &[]).is_ok()
    }

    /// Probe every non-reserved 7-bit address
    pub fn scan(&mut self) -> Vec<I2cAddress, MAX_SCAN_RESULTS> {
        let mut devices = Vec::new();

        for addr in SCAN_FIRST..=SCAN_LAST {
            let device = I2cAddress::new(addr);
            if self.probe(device) {
                let _ = devices.push(device);
            }
        }

        devices
    }
}
