//! Batch accumulator
//!
//! Coalesces bytes at consecutive addresses into runs so the parser hands
//! the orchestrator one write per run instead of one per byte.

use heapless::Vec;

use crate::config;
use crate::error::Result;

/// Destination for coalesced runs
#[allow(async_fn_in_trait)]
pub trait BatchSink {
    /// Write `data` starting at `address`
    async fn write_batch(&mut self, address: u32, data: &[u8]) -> Result<()>;
}

/// Run of consecutive-address bytes waiting to be written
#[derive(Debug, Default)]
pub struct BatchAccumulator {
    start: u32,
    bytes: Vec<u8, { config::BATCH_CAPACITY }>,
    flushed: u32,
}

impl BatchAccumulator {
    /// Create an empty accumulator
    #[must_use]
    pub const fn new() -> Self {
        Self {
            start: 0,
            bytes: Vec::new(),
            flushed: 0,
        }
    }

    /// Append a byte, flushing first when it does not extend the open run
    /// or the run is full
    ///
    /// # Errors
    ///
    /// The sink's error when a flush was needed and failed.
    pub async fn add_byte<S: BatchSink>(&mut self, address: u32, value: u8, sink: &mut S) -> Result<()> {
        if !self.bytes.is_empty() && (address != self.next_address() || self.bytes.is_full()) {
            self.flush(sink).await?;
        }
        if self.bytes.is_empty() {
            self.start = address;
        }
        // Cannot fail: the run was flushed above if it was full
        let _ = self.bytes.push(value);
        Ok(())
    }

    /// Hand the open run to `sink` and clear it. The run is cleared even
    /// when the write fails.
    ///
    /// # Errors
    ///
    /// The sink's error.
    pub async fn flush<S: BatchSink>(&mut self, sink: &mut S) -> Result<()> {
        if self.bytes.is_empty() {
            return Ok(());
        }
        crate::log_debug!("flush batch {:#x} ({} bytes)", self.start, self.bytes.len());
        let result = sink.write_batch(self.start, &self.bytes).await;
        self.bytes.clear();
        self.flushed += 1;
        result
    }

    /// Drop the open run without writing it
    pub fn discard(&mut self) {
        if !self.bytes.is_empty() {
            crate::log_warn!("discarding {} pending bytes at {:#x}", self.bytes.len(), self.start);
        }
        self.bytes.clear();
    }

    /// Forget the open run and the flush count
    pub fn reset(&mut self) {
        self.bytes.clear();
        self.start = 0;
        self.flushed = 0;
    }

    /// Open run, if any
    #[must_use]
    pub fn pending(&self) -> Option<(u32, &[u8])> {
        if self.bytes.is_empty() {
            None
        } else {
            Some((self.start, &self.bytes))
        }
    }

    /// Runs handed to the sink since the last reset
    #[must_use]
    pub const fn flushed(&self) -> u32 {
        self.flushed
    }

    fn next_address(&self) -> u32 {
        self.start.wrapping_add(self.bytes.len() as u32)
    }
}
