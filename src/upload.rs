//! Upload session state machine
//!
//! Drives one firmware upload through `begin -> feed* -> end`, or `abort`
//! at any point. Binary payloads are written straight through at an
//! auto-incrementing address; text payloads go through the image parser
//! and batch accumulator.
//!
//! ```text
//!  Idle ──begin──► Started ──feed──► Receiving ──end──► Finished
//!                                        │                ▲
//!                                        └─fatal─► Failed ┘ (end)
//!  any state ──abort──► Aborted
//! ```

use core::fmt::Write as _;

use embedded_hal::digital::OutputPin;
use embedded_hal::i2c::I2c;
use embedded_hal_async::delay::DelayNs;
use heapless::String;

use crate::config;
use crate::error::{Error, Result};
use crate::hal::system::{Stopwatch, System};
use crate::image::{BatchAccumulator, ImageParser, ParseStats};
use crate::programmer::Programmer;
use crate::types::UploadMode;

/// Upload lifecycle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub enum UploadState {
    /// No upload has been started
    #[default]
    Idle,
    /// `begin` accepted, no data yet
    Started,
    /// At least one data delivery accepted
    Receiving,
    /// `end` completed; the report tells whether the upload succeeded
    Finished,
    /// Cancelled by `abort`
    Aborted,
    /// Stopped by a transport, verification or range error, waiting for `end`
    Failed,
}

impl UploadState {
    /// Whether data deliveries are accepted
    #[must_use]
    pub const fn accepts_data(self) -> bool {
        matches!(self, Self::Started | Self::Receiving)
    }

    /// Whether an upload is open (accepting data or waiting for `end`)
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Started | Self::Receiving | Self::Failed)
    }
}

/// Upload summary message
pub type ReportMessage = String<{ config::REPORT_MESSAGE_SIZE }>;

/// Outcome of [`UploadSession::end`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadReport {
    /// Bytes committed to the EEPROM
    pub bytes_written: u32,
    /// Payload bytes received
    pub bytes_received: u32,
    /// Whether the upload wrote data and hit no fatal error
    pub success: bool,
    /// Human-readable summary
    pub message: ReportMessage,
    /// Payload interpretation
    pub mode: UploadMode,
    /// Time from `begin` to `end`
    pub elapsed_ms: u64,
    /// Text parser counters (all zero for binary uploads)
    pub stats: ParseStats,
    /// Deliveries dropped for lack of memory
    pub dropped_chunks: u32,
}

/// One upload in flight
pub struct UploadSession {
    state: UploadState,
    mode: UploadMode,
    cursor: u32,
    expected_total: u32,
    bytes_processed: u32,
    parser: ImageParser,
    batch: BatchAccumulator,
    failure: Option<Error>,
    dropped: u32,
    stopwatch: Stopwatch,
}

impl UploadSession {
    /// Idle session
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: UploadState::Idle,
            mode: UploadMode::default(),
            cursor: 0,
            expected_total: 0,
            bytes_processed: 0,
            parser: ImageParser::default(),
            batch: BatchAccumulator::new(),
            failure: None,
            dropped: 0,
            stopwatch: Stopwatch::new(),
        }
    }

    /// Lifecycle state
    #[must_use]
    pub const fn state(&self) -> UploadState {
        self.state
    }

    /// Payload interpretation of the current upload
    #[must_use]
    pub const fn mode(&self) -> UploadMode {
        self.mode
    }

    /// Next binary write address
    #[must_use]
    pub const fn cursor(&self) -> u32 {
        self.cursor
    }

    /// Size announced at `begin`
    #[must_use]
    pub const fn expected_total(&self) -> u32 {
        self.expected_total
    }

    /// Payload bytes received so far
    #[must_use]
    pub const fn bytes_processed(&self) -> u32 {
        self.bytes_processed
    }

    /// Fatal error that stopped the upload
    #[must_use]
    pub const fn failure(&self) -> Option<Error> {
        self.failure
    }

    /// Text parser counters
    #[must_use]
    pub const fn parse_stats(&self) -> &ParseStats {
        self.parser.stats()
    }

    /// Start an upload, aborting any upload still open
    pub fn begin<B, P, D, S>(&mut self, programmer: &mut Programmer<'_, B, P, D, S>, filename: &str, expected_size: u32)
    where
        B: I2c,
        P: OutputPin,
        D: DelayNs,
        S: System,
    {
        if self.state.is_open() {
            programmer.note(format_args!("upload restarted, aborting previous"));
            self.abort(programmer);
        }

        self.mode = UploadMode::from_filename(filename);
        self.cursor = 0;
        self.expected_total = expected_size;
        self.bytes_processed = 0;
        self.failure = None;
        self.dropped = 0;
        self.parser.reset();
        self.parser.set_checksum_policy(programmer.config().checksum_policy);
        self.batch.reset();
        self.stopwatch = Stopwatch::started(programmer.system());

        programmer.begin_tracking(expected_size);
        programmer.set_write_protect(false);
        programmer.note(format_args!(
            "upload start: {} ({} bytes, {})",
            filename,
            expected_size,
            match self.mode {
                UploadMode::Binary => "binary",
                UploadMode::Text => "text",
            }
        ));
        self.state = UploadState::Started;
    }

    /// Deliver the next slice of the payload
    ///
    /// Deliveries outside an open upload, or after a fatal error, are
    /// ignored.
    ///
    /// # Errors
    ///
    /// `Resource` when a text delivery was dropped for low memory (the
    /// upload continues). Fatal errors (`Range`, `Transport`,
    /// `Verification`) move the session to [`UploadState::Failed`] and are
    /// returned once.
    pub async fn feed<B, P, D, S>(&mut self, programmer: &mut Programmer<'_, B, P, D, S>, bytes: &[u8]) -> Result<()>
    where
        B: I2c,
        P: OutputPin,
        D: DelayNs,
        S: System,
    {
        if !self.state.accepts_data() {
            crate::log_debug!("upload data ignored in state {}", self.state as u8);
            return Ok(());
        }
        self.state = UploadState::Receiving;
        self.bytes_processed = self.bytes_processed.saturating_add(bytes.len() as u32);

        let result = match self.mode {
            UploadMode::Binary => self.feed_binary(programmer, bytes).await,
            UploadMode::Text => self.feed_text(programmer, bytes).await,
        };

        match result {
            Err(err) if !err.is_recoverable() => {
                self.fail(programmer, err);
                Err(err)
            }
            other => other,
        }
    }

    async fn feed_binary<B, P, D, S>(&mut self, programmer: &mut Programmer<'_, B, P, D, S>, bytes: &[u8]) -> Result<()>
    where
        B: I2c,
        P: OutputPin,
        D: DelayNs,
        S: System,
    {
        programmer.write(self.cursor, bytes).await?;
        self.cursor += bytes.len() as u32;
        Ok(())
    }

    async fn feed_text<B, P, D, S>(&mut self, programmer: &mut Programmer<'_, B, P, D, S>, bytes: &[u8]) -> Result<()>
    where
        B: I2c,
        P: OutputPin,
        D: DelayNs,
        S: System,
    {
        let free = programmer.system().free_memory();
        let required = programmer.config().min_free_memory;
        if free < required {
            self.dropped += 1;
            programmer.note(format_args!(
                "low memory ({} free), dropped {} bytes",
                free,
                bytes.len()
            ));
            return Err(Error::Resource { free, required });
        }

        let skipped_before = self.parser.stats().skipped;
        let result = self.parser.feed(bytes, &mut self.batch, programmer).await;
        let stats = *self.parser.stats();
        if stats.skipped > skipped_before {
            match stats.last_error {
                Some(err) => programmer.note(format_args!(
                    "skipped {} line(s): {}",
                    stats.skipped - skipped_before,
                    err
                )),
                None => programmer.note(format_args!(
                    "skipped {} record(s) after EOF",
                    stats.skipped - skipped_before
                )),
            }
        }
        result
    }

    /// Finish the upload and report the outcome
    pub async fn end<B, P, D, S>(&mut self, programmer: &mut Programmer<'_, B, P, D, S>) -> UploadReport
    where
        B: I2c,
        P: OutputPin,
        D: DelayNs,
        S: System,
    {
        if !self.state.is_open() {
            let mut message = ReportMessage::new();
            let _ = message.push_str("no upload in progress");
            return self.report(programmer, 0, false, message);
        }

        if self.state.accepts_data() && self.mode == UploadMode::Text {
            if let Err(err) = self.parser.finish(&mut self.batch, programmer).await {
                self.fail(programmer, err);
            }
        }

        programmer.set_write_protect(true);
        programmer.end_tracking();

        let written = programmer.progress().bytes_written;
        let elapsed = self.stopwatch.elapsed_ms(programmer.system().now_ms());
        let mut message = ReportMessage::new();
        let success = match self.failure {
            Some(err) => {
                let _ = write!(message, "upload failed after {} bytes: {}", written, err);
                false
            }
            None if written == 0 => {
                let _ = message.push_str("no data written");
                false
            }
            None => {
                let _ = write!(message, "wrote {} bytes in {} ms", written, elapsed);
                true
            }
        };

        programmer.note(format_args!("upload end: {}", message.as_str()));
        let report = self.report(programmer, written, success, message);
        self.state = UploadState::Finished;
        self.batch.reset();
        report
    }

    /// Cancel the upload. Pending data is dropped and write-protect re-asserted.
    pub fn abort<B, P, D, S>(&mut self, programmer: &mut Programmer<'_, B, P, D, S>)
    where
        B: I2c,
        P: OutputPin,
        D: DelayNs,
        S: System,
    {
        self.batch.discard();
        self.parser.reset();
        programmer.set_write_protect(true);
        programmer.end_tracking();
        let written = programmer.progress().bytes_written;
        programmer.note(format_args!("upload aborted after {} bytes", written));
        self.state = UploadState::Aborted;
    }

    fn fail<B, P, D, S>(&mut self, programmer: &mut Programmer<'_, B, P, D, S>, err: Error)
    where
        B: I2c,
        P: OutputPin,
        D: DelayNs,
        S: System,
    {
        self.batch.discard();
        self.failure = Some(err);
        self.state = UploadState::Failed;
        programmer.set_write_protect(true);
        programmer.end_tracking();
        programmer.note(format_args!("upload failed: {}", err));
    }

    fn report<B, P, D, S>(
        &self,
        programmer: &Programmer<'_, B, P, D, S>,
        bytes_written: u32,
        success: bool,
        message: ReportMessage,
    ) -> UploadReport
    where
        B: I2c,
        P: OutputPin,
        D: DelayNs,
        S: System,
    {
        UploadReport {
            bytes_written,
            bytes_received: self.bytes_processed,
            success,
            message,
            mode: self.mode,
            elapsed_ms: self.stopwatch.elapsed_ms(programmer.system().now_ms()),
            stats: *self.parser.stats(),
            dropped_chunks: self.dropped,
        }
    }
}

impl Default for UploadSession {
    fn default() -> Self {
        Self::new()
    }
}
