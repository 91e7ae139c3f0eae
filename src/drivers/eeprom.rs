//! 24-series serial EEPROM driver
//!
//! Page-aware writer for 16-bit addressed I2C EEPROMs (24LC256 class).
//!
//! A write is cut into bus transactions that never cross a page boundary
//! (the device would wrap inside the page) and never exceed the controller
//! transfer limit. Each transaction is retried under a [`RetryPolicy`] and
//! followed by ACK polling until the internal write cycle completes.

use embassy_futures::yield_now;
use embedded_hal::i2c::I2c;
use embedded_hal_async::delay::DelayNs;

use crate::config;
use crate::error::{BusError, Error, Result};
use crate::hal::i2c::{I2cAddress, I2cTransport};
use crate::retry::RetryPolicy;
use crate::types::EepromGeometry;

/// A failed transaction attempt reported during a physical write
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub struct WriteFault {
    /// First byte of the failed transaction
    pub address: u32,
    /// Bytes in the failed transaction
    pub len: usize,
    /// 1-based attempt number
    pub attempt: u8,
    /// Bus error returned by the attempt
    pub error: BusError,
}

/// ACK polling budget derived from the timeout and probe interval
const ACK_POLL_MAX_PROBES: u32 = config::ACK_POLL_TIMEOUT_MS * 1000 / config::ACK_POLL_INTERVAL_US;

/// 24-series EEPROM on a dedicated transport
pub struct Eeprom<B, D> {
    transport: I2cTransport<B>,
    delay: D,
    geometry: EepromGeometry,
    retry: RetryPolicy,
}

impl<B: I2c, D: DelayNs> Eeprom<B, D> {
    /// Create a driver with the default page-write retry policy
    pub fn new(bus: B, delay: D, geometry: EepromGeometry) -> Self {
        Self {
            transport: I2cTransport::new(bus),
            delay,
            geometry,
            retry: RetryPolicy::PAGE_WRITE,
        }
    }

    /// Replace the retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Device geometry
    #[must_use]
    pub const fn geometry(&self) -> &EepromGeometry {
        &self.geometry
    }

    /// Device bus address
    #[must_use]
    pub const fn address(&self) -> I2cAddress {
        I2cAddress::new(self.geometry.device_addr)
    }

    /// Shared bus access for other devices on the same wires
    pub fn bus_parts(&mut self) -> (&mut I2cTransport<B>, &mut D) {
        (&mut self.transport, &mut self.delay)
    }

    /// Whether the device acknowledges its address
    pub fn is_present(&mut self) -> bool {
        let device = self.address();
        self.transport.probe(device)
    }

    /// Write `data` at `address`, splitting at page and transfer boundaries
    ///
    /// # Errors
    ///
    /// `Range` before any bus activity, `Transport` once a transaction has
    /// exhausted its retries or the write cycle did not finish in time.
    /// Transactions already committed are not rolled back.
    pub async fn write_physical(&mut self, address: u32, data: &[u8]) -> Result<()> {
        self.write_physical_observed(address, data, |_| {}).await
    }

    /// [`write_physical`](Self::write_physical), reporting every failed attempt
    ///
    /// # Errors
    ///
    /// Same as [`write_physical`](Self::write_physical).
    pub async fn write_physical_observed<O>(&mut self, address: u32, data: &[u8], mut on_fault: O) -> Result<()>
    where
        O: FnMut(WriteFault),
    {
        self.geometry.check_range(address, data.len())?;

        let device = self.address();
        let retry = self.retry;
        let mut offset = 0usize;

        while offset < data.len() {
            let at = address + offset as u32;
            let len = self.geometry.transaction_len(at, data.len() - offset);
            let piece = &data[offset..offset + len];
            let header = memory_address(at)?.to_be_bytes();

            let transport = &mut self.transport;
            retry
                .run_observed(
                    &mut self.delay,
                    |_| transport.write_bytes(device, &header, piece),
                    |attempt, error| {
                        crate::log_warn!("page write {:#x} attempt {} failed: {}", at, attempt, *error);
                        on_fault(WriteFault {
                            address: at,
                            len,
                            attempt,
                            error: *error,
                        });
                    },
                )
                .await?;

            self.wait_ready().await?;
            offset += len;
            yield_now().await;
        }

        Ok(())
    }

    /// Poll the device address until the internal write cycle finishes
    ///
    /// # Errors
    ///
    /// `Transport(Timeout)` when the device stays busy past the polling budget.
    pub async fn wait_ready(&mut self) -> Result<()> {
        let device = self.address();
        for _ in 0..ACK_POLL_MAX_PROBES {
            if self.transport.probe(device) {
                return Ok(());
            }
            self.delay.delay_us(config::ACK_POLL_INTERVAL_US).await;
        }
        crate::log_error!("write cycle did not complete within {} ms", config::ACK_POLL_TIMEOUT_MS);
        Err(Error::Transport(BusError::Timeout))
    }

    /// Read a single byte
    ///
    /// # Errors
    ///
    /// `Range` for addresses past the end, `Transport` on bus failure.
    pub fn read_byte(&mut self, address: u32) -> Result<u8> {
        self.geometry.check_range(address, 1)?;
        let device = self.address();
        Ok(self.transport.read_byte(device, memory_address(address)?)?)
    }

    /// Sequential read into `buf`
    ///
    /// # Errors
    ///
    /// `Range` for spans past the end, `Transport` on bus failure.
    pub fn read_into(&mut self, address: u32, buf: &mut [u8]) -> Result<()> {
        self.geometry.check_range(address, buf.len())?;
        let device = self.address();
        Ok(self.transport.read_into(device, memory_address(address)?, buf)?)
    }
}

/// Two-byte memory address for the frame header
fn memory_address(address: u32) -> Result<u16> {
    u16::try_from(address).map_err(|_| Error::Range {
        address,
        len: 0,
        capacity: u32::from(u16::MAX) + 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_poll_budget() {
        assert_eq!(ACK_POLL_MAX_PROBES, 100);
    }

    #[test]
    fn test_memory_address_is_sixteen_bits() {
        assert_eq!(memory_address(0x7FFF), Ok(0x7FFF));
        assert!(memory_address(0x1_0000).is_err());
    }
}
