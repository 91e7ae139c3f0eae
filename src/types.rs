//! Shared types used across the programmer
//!
//! Device geometry, progress snapshots and the reports returned by the
//! read-only inspection operations.

use heapless::Vec;

use crate::config;
use crate::error::{Error, Result};

/// Physical layout of the attached EEPROM
///
/// Addresses are flat byte offsets. All range arithmetic is done in `u64`
/// so `address + len` can never wrap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub struct EepromGeometry {
    /// 7-bit bus address
    pub device_addr: u8,
    /// Capacity in bytes
    pub capacity: u32,
    /// Physical page size in bytes
    pub page_size: u16,
    /// Maximum data bytes per bus transaction
    pub transfer_limit: usize,
}

impl EepromGeometry {
    /// Create a geometry. Zero page size or transfer limit are raised to 1.
    #[must_use]
    pub const fn new(device_addr: u8, capacity: u32, page_size: u16, transfer_limit: usize) -> Self {
        Self {
            device_addr,
            capacity,
            page_size: if page_size == 0 { 1 } else { page_size },
            transfer_limit: if transfer_limit == 0 { 1 } else { transfer_limit },
        }
    }

    /// Check that `len` bytes starting at `address` fit in the device
    ///
    /// # Errors
    ///
    /// Returns [`Error::Range`] when the access would run past the end.
    pub fn check_range(&self, address: u32, len: usize) -> Result<()> {
        if self.fits(address, len) {
            Ok(())
        } else {
            Err(Error::Range {
                address,
                len,
                capacity: self.capacity,
            })
        }
    }

    /// Whether `len` bytes starting at `address` fit in the device
    #[must_use]
    pub fn fits(&self, address: u32, len: usize) -> bool {
        u64::from(address) + len as u64 <= u64::from(self.capacity)
    }

    /// Bytes left in the page containing `address`
    #[must_use]
    pub const fn page_remaining(&self, address: u32) -> usize {
        let page = self.page_size as u32;
        (page - address % page) as usize
    }

    /// Length of the next bus transaction for a write of `remaining` bytes at `address`
    ///
    /// Never crosses a page boundary and never exceeds the transfer limit.
    #[must_use]
    pub fn transaction_len(&self, address: u32, remaining: usize) -> usize {
        self.page_remaining(address)
            .min(self.transfer_limit)
            .min(remaining)
    }

    /// Number of pages in the device
    #[must_use]
    pub const fn page_count(&self) -> u32 {
        self.capacity.div_ceil(self.page_size as u32)
    }
}

impl Default for EepromGeometry {
    fn default() -> Self {
        Self::new(
            config::EEPROM_I2C_ADDR,
            config::EEPROM_CAPACITY,
            config::EEPROM_PAGE_SIZE,
            config::I2C_MAX_DATA_PER_XFER,
        )
    }
}

/// Write progress as seen by reporting collaborators
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub struct Progress {
    /// Bytes committed so far
    pub bytes_written: u32,
    /// Bytes expected for the running operation
    pub bytes_total: u32,
    /// Whether an erase, write or upload is running
    pub in_progress: bool,
}

impl Progress {
    /// Completion in whole percent, clamped to 100
    #[must_use]
    pub fn percent(&self) -> u8 {
        if self.bytes_total == 0 {
            return if self.in_progress { 0 } else { 100 };
        }
        let pct = u64::from(self.bytes_written) * 100 / u64::from(self.bytes_total);
        pct.min(100) as u8
    }
}

/// One byte that did not match during a verification pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub struct Mismatch {
    /// Device address
    pub address: u32,
    /// Expected value
    pub expected: u8,
    /// Value read from the device
    pub actual: u8,
}

/// Result of comparing device contents against expected bytes
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub struct VerifyReport {
    /// Bytes compared
    pub bytes_checked: u32,
    /// Mismatching (or unreadable) bytes
    pub errors: u32,
    /// The first few mismatches, in address order
    pub mismatches: Vec<Mismatch, { config::MAX_REPORTED_MISMATCHES }>,
}

impl VerifyReport {
    /// Whether every byte matched
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.errors == 0
    }

    /// Record a mismatch, keeping only the first few
    pub fn record(&mut self, mismatch: Mismatch) {
        self.errors += 1;
        let _ = self.mismatches.push(mismatch);
    }
}

/// Result of the single-byte write/read-back stress test
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub struct StressReport {
    /// Probes executed
    pub tests_run: u16,
    /// Probes that read back the written value
    pub passed: u16,
    /// Probes that failed to write or read back
    pub failed: u16,
}

impl StressReport {
    /// Success rate in whole percent
    #[must_use]
    pub fn success_rate(&self) -> u8 {
        if self.tests_run == 0 {
            return 0;
        }
        (u32::from(self.passed) * 100 / u32::from(self.tests_run)) as u8
    }
}

/// How upload payloads are interpreted
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub enum UploadMode {
    /// Raw bytes written at an auto-incrementing address
    Binary,
    /// Intel HEX or hex-literal text
    #[default]
    Text,
}

impl UploadMode {
    /// Pick the mode from a file name: `.bin` and `.rom` are binary
    #[must_use]
    pub fn from_filename(filename: &str) -> Self {
        let is_binary = filename
            .rsplit_once('.')
            .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case("bin") || ext.eq_ignore_ascii_case("rom"));
        if is_binary {
            Self::Binary
        } else {
            Self::Text
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_len_stops_at_page_boundary() {
        let geo = EepromGeometry::default();
        assert_eq!(geo.transaction_len(60, 10), 4);
        assert_eq!(geo.transaction_len(64, 100), 30);
        assert_eq!(geo.transaction_len(94, 100), 30);
        assert_eq!(geo.transaction_len(124, 100), 4);
        assert_eq!(geo.transaction_len(0, 5), 5);
    }

    #[test]
    fn test_check_range_edges() {
        let geo = EepromGeometry::default();
        assert!(geo.check_range(32_767, 1).is_ok());
        assert_eq!(
            geo.check_range(32_767, 2),
            Err(Error::Range {
                address: 32_767,
                len: 2,
                capacity: 32_768
            })
        );
        assert!(geo.check_range(u32::MAX, usize::MAX).is_err());
        assert!(geo.check_range(32_768, 0).is_ok());
    }

    #[test]
    fn test_upload_mode_from_filename() {
        assert_eq!(UploadMode::from_filename("fw.BIN"), UploadMode::Binary);
        assert_eq!(UploadMode::from_filename("image.rom"), UploadMode::Binary);
        assert_eq!(UploadMode::from_filename("image.hex"), UploadMode::Text);
        assert_eq!(UploadMode::from_filename("bin"), UploadMode::Text);
        assert_eq!(UploadMode::from_filename(""), UploadMode::Text);
    }

    #[test]
    fn test_progress_percent() {
        let p = Progress {
            bytes_written: 16_384,
            bytes_total: 32_768,
            in_progress: true,
        };
        assert_eq!(p.percent(), 50);
        assert_eq!(Progress::default().percent(), 100);
    }

    #[test]
    fn test_verify_report_keeps_first_mismatches() {
        let mut report = VerifyReport::default();
        for address in 0..5 {
            report.record(Mismatch {
                address,
                expected: 0,
                actual: 1,
            });
        }
        assert_eq!(report.errors, 5);
        assert_eq!(report.mismatches.len(), config::MAX_REPORTED_MISMATCHES);
        assert_eq!(report.mismatches[0].address, 0);
        assert!(!report.passed());
    }
}
