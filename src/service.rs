//! Programmer service facade
//!
//! The surface an outer layer (HTTP routes, a CLI, a test harness) calls.
//! Operations report plain booleans, bytes and reports; errors are
//! recorded in the activity log instead of being returned.
//!
//! Progress, verification policy and the activity log live in a
//! [`SharedState`] the caller provides, so status handlers can read them
//! through [`ProgrammerService::state`] while an operation is suspended.

use core::fmt;

use embedded_hal::digital::OutputPin;
use embedded_hal::i2c::I2c;
use embedded_hal_async::delay::DelayNs;
use heapless::Vec;

use crate::drivers::dsp::DspStatus;
use crate::error::Result;
use crate::hal::i2c::{I2cAddress, MAX_SCAN_RESULTS};
use crate::hal::system::System;
use crate::programmer::state::SharedState;
use crate::programmer::{Programmer, ProgrammerConfig};
use crate::types::{Progress, StressReport, VerifyReport};
use crate::upload::{UploadReport, UploadSession, UploadState};

/// Programmer plus upload session behind one interface
pub struct ProgrammerService<'a, B, P, D, S> {
    programmer: Programmer<'a, B, P, D, S>,
    upload: UploadSession,
}

impl<'a, B, P, D, S> ProgrammerService<'a, B, P, D, S>
where
    B: I2c,
    P: OutputPin,
    D: DelayNs,
    S: System,
{
    /// Build the service from its hardware
    pub fn new(bus: B, wp_pin: P, delay: D, system: S, state: &'a SharedState, config: ProgrammerConfig) -> Self {
        Self {
            programmer: Programmer::new(bus, wp_pin, delay, system, state, config),
            upload: UploadSession::new(),
        }
    }

    /// Underlying programmer
    pub fn programmer(&mut self) -> &mut Programmer<'a, B, P, D, S> {
        &mut self.programmer
    }

    /// Shared state handle for status readers
    #[must_use]
    pub const fn state(&self) -> &'a SharedState {
        self.programmer.state()
    }

    /// Whether the EEPROM answers
    pub fn detect(&mut self) -> bool {
        self.programmer.detect()
    }

    /// Erase the whole device
    pub async fn erase(&mut self) -> bool {
        self.programmer.erase().await.is_ok()
    }

    /// Write `data` at `address`
    pub async fn write(&mut self, address: u32, data: &[u8]) -> bool {
        self.programmer.write(address, data).await.is_ok()
    }

    /// Read one byte (0xFF on failure)
    pub fn read(&mut self, address: u32) -> u8 {
        self.programmer.read(address)
    }

    /// Read a span of the device
    ///
    /// # Errors
    ///
    /// `Range` or `Transport`.
    pub async fn read_range(&mut self, address: u32, buf: &mut [u8]) -> Result<()> {
        self.programmer.read_range(address, buf).await
    }

    /// Stream the whole device to `sink`
    ///
    /// # Errors
    ///
    /// `Transport`.
    pub async fn dump<F: FnMut(u32, &[u8])>(&mut self, sink: F) -> Result<u32> {
        self.programmer.dump(sink).await
    }

    /// Compare device contents with `expected`
    ///
    /// # Errors
    ///
    /// `Range` or `Transport`.
    pub async fn verify_range(&mut self, address: u32, expected: &[u8]) -> Result<VerifyReport> {
        self.programmer.verify_range(address, expected).await
    }

    /// Single-byte write and read-back
    pub async fn test_write_byte(&mut self, address: u32, value: u8) -> bool {
        self.programmer.test_write_byte(address, value).await
    }

    /// Repeated single-byte probes
    pub async fn stress_test(&mut self, count: u16) -> StressReport {
        self.programmer.stress_test(count).await
    }

    /// Start an upload
    pub fn begin_upload(&mut self, filename: &str, expected_size: u32) {
        self.upload.begin(&mut self.programmer, filename, expected_size);
    }

    /// Deliver a slice of the upload payload. Returns false when the slice
    /// was dropped or the upload failed.
    pub async fn feed_upload_chunk(&mut self, bytes: &[u8]) -> bool {
        self.upload.feed(&mut self.programmer, bytes).await.is_ok()
    }

    /// Finish the upload
    pub async fn end_upload(&mut self) -> UploadReport {
        self.upload.end(&mut self.programmer).await
    }

    /// Cancel the upload
    pub fn abort_upload(&mut self) {
        self.upload.abort(&mut self.programmer);
    }

    /// Upload lifecycle state
    #[must_use]
    pub const fn upload_state(&self) -> UploadState {
        self.upload.state()
    }

    /// Progress snapshot
    #[must_use]
    pub fn progress(&self) -> Progress {
        self.programmer.progress()
    }

    /// Enable or disable read-back verification
    pub fn set_verification(&mut self, enabled: bool) {
        self.programmer.set_verification(enabled);
    }

    /// Whether read-back verification is on
    #[must_use]
    pub fn verification(&self) -> bool {
        self.programmer.verification()
    }

    /// Drive the write-protect line
    pub fn set_write_protect(&mut self, protected: bool) {
        self.programmer.set_write_protect(protected);
    }

    /// Write the activity log, oldest first, newline separated
    ///
    /// # Errors
    ///
    /// Propagates the writer's error.
    pub fn activity_log<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        self.programmer.render_activity_log(out)
    }

    /// Activity log as one string
    #[cfg(feature = "std")]
    #[must_use]
    pub fn activity_log_text(&self) -> std::string::String {
        let mut out = std::string::String::new();
        let _ = self.activity_log(&mut out);
        out
    }

    /// Devices answering on the bus
    pub fn scan_bus(&mut self) -> Vec<I2cAddress, MAX_SCAN_RESULTS> {
        self.programmer.scan_bus()
    }

    /// Look for the DSP
    pub fn detect_dsp(&mut self) -> bool {
        self.programmer.detect_dsp()
    }

    /// Halt (`false`) or resume (`true`) the DSP core
    pub async fn set_dsp_run_state(&mut self, run: bool) -> bool {
        self.programmer.set_dsp_run_state(run).await.is_ok()
    }

    /// DSP register snapshot, `None` when it cannot be read
    pub fn dsp_status(&mut self) -> Option<DspStatus> {
        self.programmer.dsp_status().ok()
    }

    /// Halt and restart the DSP core
    pub async fn dsp_soft_reset(&mut self) -> bool {
        self.programmer.dsp_soft_reset().await.is_ok()
    }
}
