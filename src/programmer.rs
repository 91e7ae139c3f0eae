//! Write/verify orchestrator
//!
//! [`Programmer`] owns the EEPROM driver, the write-protect line and the DSP
//! driver, and borrows the [`SharedState`] that holds progress, the
//! activity log and the verification policy. High-level operations (write,
//! erase, verify, dump) run here, in 32-byte processing chunks, with
//! progress counting and activity logging. Every operation is `async` and
//! yields to the executor after each bus transaction and every few verified
//! or dumped bytes, so a long erase never starves other tasks and status
//! readers holding the same [`SharedState`] see it advance.

pub mod activity_log;
pub mod state;

use core::fmt;

use embassy_futures::yield_now;
use embedded_hal::digital::OutputPin;
use embedded_hal::i2c::I2c;
use embedded_hal_async::delay::DelayNs;
use heapless::Vec;

use crate::config;
use crate::drivers::dsp::{Adau1701, DspStatus};
use crate::drivers::eeprom::Eeprom;
use crate::error::{Error, Result};
use crate::hal::gpio::{WpState, WriteProtect};
use crate::hal::i2c::{I2cAddress, MAX_SCAN_RESULTS};
use crate::hal::system::{Stopwatch, System};
use crate::image::batch::BatchSink;
use crate::image::hex::ChecksumPolicy;
use crate::retry::RetryPolicy;
use crate::types::{EepromGeometry, Mismatch, Progress, StressReport, VerifyReport};

use self::state::SharedState;

/// Runtime configuration, defaults taken from [`crate::config`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgrammerConfig {
    /// EEPROM layout
    pub geometry: EepromGeometry,
    /// Page write retry policy
    pub retry: RetryPolicy,
    /// Write-protect polarity
    pub wp_active_high: bool,
    /// Read-back verification at power-up
    pub verify_after_write: bool,
    /// Free memory required to accept text upload data
    pub min_free_memory: usize,
    /// Intel HEX checksum handling
    pub checksum_policy: ChecksumPolicy,
    /// Configured DSP address
    pub dsp_addr: u8,
}

impl Default for ProgrammerConfig {
    fn default() -> Self {
        Self {
            geometry: EepromGeometry::default(),
            retry: RetryPolicy::PAGE_WRITE,
            wp_active_high: config::WP_ACTIVE_HIGH,
            verify_after_write: config::VERIFY_AFTER_WRITE,
            min_free_memory: config::MIN_FREE_MEMORY,
            checksum_policy: ChecksumPolicy::default(),
            dsp_addr: config::dsp::I2C_ADDR,
        }
    }
}

/// Bytes written by [`Programmer::erase`]
const ERASED: [u8; config::WRITE_CHUNK_SIZE] = [0xFF; config::WRITE_CHUNK_SIZE];

/// EEPROM programmer core
pub struct Programmer<'a, B, P, D, S> {
    eeprom: Eeprom<B, D>,
    write_protect: WriteProtect<P>,
    dsp: Adau1701,
    system: S,
    state: &'a SharedState,
    config: ProgrammerConfig,
}

impl<'a, B, P, D, S> Programmer<'a, B, P, D, S>
where
    B: I2c,
    P: OutputPin,
    D: DelayNs,
    S: System,
{
    /// Assemble the programmer. The write-protect line is asserted
    /// immediately and the verification policy in `state` is reset from
    /// `config`.
    pub fn new(bus: B, wp_pin: P, delay: D, system: S, state: &'a SharedState, config: ProgrammerConfig) -> Self {
        state.with_mut(|s| s.set_verify(config.verify_after_write));
        let mut programmer = Self {
            eeprom: Eeprom::new(bus, delay, config.geometry).with_retry(config.retry),
            write_protect: WriteProtect::new(wp_pin, config.wp_active_high),
            dsp: Adau1701::new(config.dsp_addr),
            system,
            state,
            config,
        };
        programmer.note(format_args!(
            "programmer ready: {} bytes, page {}",
            config.geometry.capacity, config.geometry.page_size
        ));
        programmer
    }

    /// Runtime configuration
    #[must_use]
    pub const fn config(&self) -> &ProgrammerConfig {
        &self.config
    }

    /// Device geometry
    #[must_use]
    pub const fn geometry(&self) -> &EepromGeometry {
        self.eeprom.geometry()
    }

    /// Shared state handle, for status readers in other tasks
    #[must_use]
    pub const fn state(&self) -> &'a SharedState {
        self.state
    }

    /// System services
    #[must_use]
    pub const fn system(&self) -> &S {
        &self.system
    }

    /// Progress snapshot
    #[must_use]
    pub fn progress(&self) -> Progress {
        self.state.progress()
    }

    /// Append a line to the activity log
    pub fn note(&mut self, message: fmt::Arguments<'_>) {
        self.state.record(self.system.now_ms(), message);
    }

    /// Write the activity log, oldest line first
    ///
    /// # Errors
    ///
    /// Propagates the writer's error.
    pub fn render_activity_log<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        self.state.render_activity_log(out)
    }

    /// Reset progress to `{0, total, true}` for a long operation
    pub fn begin_tracking(&mut self, total: u32) {
        self.state.with_mut(|s| s.progress.begin(total));
    }

    /// End the long operation started by [`begin_tracking`](Self::begin_tracking)
    pub fn end_tracking(&mut self) {
        self.state.with_mut(|s| s.progress.finish());
    }

    /// Enable or disable read-back verification
    pub fn set_verification(&mut self, enabled: bool) {
        self.state.with_mut(|s| s.set_verify(enabled));
        self.note(format_args!("verification {}", if enabled { "on" } else { "off" }));
    }

    /// Whether read-back verification is enabled
    #[must_use]
    pub fn verification(&self) -> bool {
        self.state.verify_enabled()
    }

    /// Drive the write-protect line
    pub fn set_write_protect(&mut self, protected: bool) {
        self.write_protect.set(WpState::from_protected(protected));
        self.note(format_args!(
            "write protect {}",
            if protected { "enabled" } else { "disabled" }
        ));
    }

    /// Current write-protect level
    #[must_use]
    pub const fn write_protect(&self) -> WpState {
        self.write_protect.state()
    }

    /// Whether the EEPROM acknowledges its address
    pub fn detect(&mut self) -> bool {
        let found = self.eeprom.is_present();
        let addr = self.eeprom.address().addr();
        self.note(format_args!(
            "EEPROM {:#04x} {}",
            addr,
            if found { "detected" } else { "not responding" }
        ));
        found
    }

    /// Probe every general-call address on the bus
    pub fn scan_bus(&mut self) -> Vec<I2cAddress, MAX_SCAN_RESULTS> {
        let (bus, _) = self.eeprom.bus_parts();
        let found = bus.scan();
        self.note(format_args!("bus scan: {} device(s)", found.len()));
        found
    }

    /// Write `data` at `address`
    ///
    /// Write-protect is released for the duration of the call and restored
    /// to its prior level on every exit path.
    ///
    /// # Errors
    ///
    /// `Range` before any bus activity, `Transport` or `Verification` from
    /// the first failing chunk. Earlier chunks stay committed.
    pub async fn write(&mut self, address: u32, data: &[u8]) -> Result<()> {
        if let Err(err) = self.geometry().check_range(address, data.len()) {
            self.note(format_args!("write rejected: {}", err));
            return Err(err);
        }
        if data.is_empty() {
            return Ok(());
        }

        let tracking = TransientTracking::begin(self.state, data.len() as u32);
        self.note(format_args!("write {} bytes at {:#06x}", data.len(), address));
        let stopwatch = Stopwatch::started(&self.system);

        let result = {
            let _wp = self.write_protect.release();
            write_chunks(&mut self.eeprom, self.state, &self.system, address, data).await
        };

        drop(tracking);
        let now = self.system.now_ms();
        match result {
            Ok(()) => self.note(format_args!(
                "write done: {} bytes in {} ms ({} B/s)",
                data.len(),
                stopwatch.elapsed_ms(now),
                stopwatch.bytes_per_second(data.len() as u32, now)
            )),
            Err(err) => self.note(format_args!("write failed: {}", err)),
        }
        result
    }

    /// Fill the whole device with 0xFF
    ///
    /// # Errors
    ///
    /// The first failing chunk aborts the erase; the device is left
    /// partially erased.
    pub async fn erase(&mut self) -> Result<()> {
        let capacity = self.geometry().capacity;
        self.begin_tracking(capacity);
        self.note(format_args!("erase start: {} bytes", capacity));
        let stopwatch = Stopwatch::started(&self.system);

        let result = {
            let _wp = self.write_protect.release();
            let mut address = 0u32;
            let mut outcome = Ok(());
            while address < capacity {
                let len = (capacity - address).min(ERASED.len() as u32) as usize;
                if let Err(err) =
                    write_chunks(&mut self.eeprom, self.state, &self.system, address, &ERASED[..len]).await
                {
                    outcome = Err(err);
                    break;
                }
                address += len as u32;
            }
            outcome
        };

        self.end_tracking();
        let now = self.system.now_ms();
        match result {
            Ok(()) => self.note(format_args!(
                "erase done in {} ms ({} B/s)",
                stopwatch.elapsed_ms(now),
                stopwatch.bytes_per_second(capacity, now)
            )),
            Err(err) => {
                let erased = self.progress().bytes_written;
                self.note(format_args!("erase failed after {} bytes: {}", erased, err));
            }
        }
        result
    }

    /// Read one byte; 0xFF when the address is out of range or the bus fails
    pub fn read(&mut self, address: u32) -> u8 {
        match self.eeprom.read_byte(address) {
            Ok(value) => value,
            Err(err) => {
                crate::log_warn!("read {:#x} failed: {}", address, err);
                0xFF
            }
        }
    }

    /// Read `buf.len()` bytes starting at `address`
    ///
    /// # Errors
    ///
    /// `Range` before any bus activity, `Transport` on bus failure.
    pub async fn read_range(&mut self, address: u32, buf: &mut [u8]) -> Result<()> {
        self.geometry().check_range(address, buf.len())?;
        let mut at = address;
        for slice in buf.chunks_mut(config::READ_SLICE_SIZE) {
            self.eeprom.read_into(at, slice)?;
            at += slice.len() as u32;
            yield_now().await;
        }
        Ok(())
    }

    /// Stream the whole device to `sink` in blocks, returning the bytes sent
    ///
    /// Each block is filled by short reads with a yield after every one.
    ///
    /// # Errors
    ///
    /// `Transport` on bus failure; blocks already delivered stay delivered.
    pub async fn dump<F>(&mut self, mut sink: F) -> Result<u32>
    where
        F: FnMut(u32, &[u8]),
    {
        let capacity = self.geometry().capacity;
        let mut block = [0u8; config::DUMP_BLOCK_SIZE];
        let mut address = 0u32;

        while address < capacity {
            let len = (capacity - address).min(block.len() as u32) as usize;
            let mut at = address;
            for piece in block[..len].chunks_mut(config::VERIFY_YIELD_INTERVAL) {
                self.eeprom.read_into(at, piece)?;
                at += piece.len() as u32;
                yield_now().await;
            }
            sink(address, &block[..len]);
            address += len as u32;
        }

        self.note(format_args!("dump: {} bytes", capacity));
        Ok(capacity)
    }

    /// Compare device contents at `address` with `expected` without writing
    ///
    /// # Errors
    ///
    /// `Range` before any bus activity, `Transport` on bus failure.
    pub async fn verify_range(&mut self, address: u32, expected: &[u8]) -> Result<VerifyReport> {
        self.geometry().check_range(address, expected.len())?;
        let mut report = VerifyReport::default();
        let mut actual = [0u8; config::READ_SLICE_SIZE];
        let mut at = address;

        for slice in expected.chunks(config::READ_SLICE_SIZE) {
            let read = &mut actual[..slice.len()];
            self.eeprom.read_into(at, read)?;
            for (i, (&want, &got)) in slice.iter().zip(read.iter()).enumerate() {
                if want != got {
                    report.record(Mismatch {
                        address: at + i as u32,
                        expected: want,
                        actual: got,
                    });
                }
                report.bytes_checked += 1;
                if report.bytes_checked as usize % config::VERIFY_YIELD_INTERVAL == 0 {
                    yield_now().await;
                }
            }
            at += slice.len() as u32;
        }

        self.note(format_args!(
            "verify {:#06x}+{}: {} error(s)",
            address,
            expected.len(),
            report.errors
        ));
        Ok(report)
    }

    /// Write one byte and read it back
    pub async fn test_write_byte(&mut self, address: u32, value: u8) -> bool {
        if !self.geometry().fits(address, 1) {
            return false;
        }
        let written = {
            let _wp = self.write_protect.release();
            self.eeprom.write_physical(address, &[value]).await
        };
        let ok = match written {
            Ok(()) => self.eeprom.read_byte(address) == Ok(value),
            Err(_) => false,
        };
        self.note(format_args!(
            "test write {:#04x} at {:#06x}: {}",
            value,
            address,
            if ok { "pass" } else { "fail" }
        ));
        ok
    }

    /// Run up to 100 single-byte write/read-back probes spread over the device
    pub async fn stress_test(&mut self, count: u16) -> StressReport {
        let count = count.min(config::MAX_STRESS_TESTS);
        let span = self.geometry().capacity.saturating_sub(config::WRITE_CHUNK_SIZE as u32).max(1);
        let mut report = StressReport::default();

        for i in 0..count {
            let address = (u32::from(i) * config::WRITE_CHUNK_SIZE as u32) % span;
            let value = ((u32::from(i) * 23) & 0xFF) as u8;
            report.tests_run += 1;
            if self.test_write_byte(address, value).await {
                report.passed += 1;
            } else {
                report.failed += 1;
            }
        }

        self.note(format_args!(
            "stress test: {}/{} passed ({}%)",
            report.passed,
            report.tests_run,
            report.success_rate()
        ));
        report
    }

    /// Look for the DSP on its configured and alternate addresses
    pub fn detect_dsp(&mut self) -> bool {
        let (bus, _) = self.eeprom.bus_parts();
        let found = self.dsp.detect(bus);
        let addr = self.dsp.address().addr();
        self.note(format_args!(
            "DSP {} at {:#04x}",
            if found { "found" } else { "missing" },
            addr
        ));
        found
    }

    /// Halt or resume the DSP core
    ///
    /// # Errors
    ///
    /// `NotDetected`, or the verified control write failure.
    pub async fn set_dsp_run_state(&mut self, run: bool) -> Result<()> {
        let (bus, delay) = self.eeprom.bus_parts();
        let result = self.dsp.set_run_state(bus, delay, run).await;
        match &result {
            Ok(()) => self.note(format_args!("DSP {}", if run { "running" } else { "stopped" })),
            Err(err) => self.note(format_args!("DSP run-state change failed: {}", err)),
        }
        result
    }

    /// DSP register snapshot
    ///
    /// # Errors
    ///
    /// `NotDetected` or `Transport`.
    pub fn dsp_status(&mut self) -> Result<DspStatus> {
        let (bus, _) = self.eeprom.bus_parts();
        self.dsp.status(bus)
    }

    /// Halt and restart the DSP core
    ///
    /// # Errors
    ///
    /// `NotDetected`, or the failing run-state change.
    pub async fn dsp_soft_reset(&mut self) -> Result<()> {
        let (bus, delay) = self.eeprom.bus_parts();
        let result = self.dsp.soft_reset(bus, delay).await;
        match &result {
            Ok(()) => self.note(format_args!("DSP soft reset")),
            Err(err) => self.note(format_args!("DSP soft reset failed: {}", err)),
        }
        result
    }
}

impl<B, P, D, S> BatchSink for Programmer<'_, B, P, D, S>
where
    B: I2c,
    P: OutputPin,
    D: DelayNs,
    S: System,
{
    async fn write_batch(&mut self, address: u32, data: &[u8]) -> Result<()> {
        self.write(address, data).await
    }
}

/// Transient progress for one write, ended on every exit path including a
/// dropped future
struct TransientTracking<'s> {
    state: &'s SharedState,
    started: bool,
}

impl<'s> TransientTracking<'s> {
    fn begin(state: &'s SharedState, total: u32) -> Self {
        let started = state.with_mut(|s| s.progress.begin_transient(total));
        Self { state, started }
    }
}

impl Drop for TransientTracking<'_> {
    fn drop(&mut self) {
        let started = self.started;
        self.state.with_mut(|s| s.progress.end_transient(started));
    }
}

/// Hand `data` to the page writer in processing chunks, verifying and
/// counting each one. Takes the fields it needs so the caller can keep the
/// write-protect guard alive across the whole loop.
async fn write_chunks<B, D, S>(
    eeprom: &mut Eeprom<B, D>,
    state: &SharedState,
    system: &S,
    address: u32,
    data: &[u8],
) -> Result<()>
where
    B: I2c,
    D: DelayNs,
    S: System,
{
    let mut at = address;
    for chunk in data.chunks(config::WRITE_CHUNK_SIZE) {
        eeprom
            .write_physical_observed(at, chunk, |fault| {
                state.record(
                    system.now_ms(),
                    format_args!(
                        "retry {} at {:#06x} ({} bytes): {}",
                        fault.attempt, fault.address, fault.len, fault.error
                    ),
                );
            })
            .await?;

        if state.verify_enabled() {
            verify_chunk(eeprom, at, chunk).await?;
        }

        state.with_mut(|s| {
            s.progress.add(chunk.len());
            s.record(system.now_ms(), format_args!("chunk {:#06x}: {} bytes", at, chunk.len()));
        });
        at += chunk.len() as u32;
    }
    Ok(())
}

/// Read back a freshly written chunk. A mismatching byte gets one re-read
/// before the chunk is declared bad.
async fn verify_chunk<B, D>(eeprom: &mut Eeprom<B, D>, address: u32, expected: &[u8]) -> Result<()>
where
    B: I2c,
    D: DelayNs,
{
    for (i, &want) in expected.iter().enumerate() {
        let at = address + i as u32;
        let mut got = eeprom.read_byte(at)?;
        if got != want {
            got = eeprom.read_byte(at)?;
            if got != want {
                return Err(Error::Verification {
                    address: at,
                    expected: want,
                    actual: got,
                });
            }
        }
        if (i + 1) % config::VERIFY_YIELD_INTERVAL == 0 {
            yield_now().await;
        }
    }
    Ok(())
}
