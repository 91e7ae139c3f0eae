//! Streaming image parser
//!
//! Accepts upload payloads in arbitrary slices, reassembles lines in a
//! fixed buffer and dispatches each line to the Intel HEX or hex-literal
//! grammar. Data bytes go through a [`BatchAccumulator`] to the sink.
//!
//! Malformed lines are counted and skipped; only sink errors stop a feed.

use embassy_futures::yield_now;
use heapless::Vec;

use super::batch::{BatchAccumulator, BatchSink};
use super::hex::{parse_record, ChecksumPolicy, RecordKind};
use super::literal::{contains_literal, literals, split_point};
use crate::config;
use crate::error::{ParseError, Result};

/// Parser counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub struct ParseStats {
    /// Non-empty lines processed
    pub lines: u32,
    /// Data bytes handed to the accumulator
    pub data_bytes: u32,
    /// Lines rejected by the record grammar, plus data records after EOF
    pub skipped: u32,
    /// Lines that were neither a record nor held any literal
    pub ignored: u32,
    /// Most recent rejection reason
    pub last_error: Option<ParseError>,
}

/// Incremental Intel HEX / hex-literal parser
pub struct ImageParser {
    line: Vec<u8, { config::LINE_BUFFER_SIZE }>,
    base: u32,
    cursor: u32,
    eof: bool,
    policy: ChecksumPolicy,
    stats: ParseStats,
    since_yield: usize,
}

impl ImageParser {
    /// Create a parser
    #[must_use]
    pub const fn new(policy: ChecksumPolicy) -> Self {
        Self {
            line: Vec::new(),
            base: 0,
            cursor: 0,
            eof: false,
            policy,
            stats: ParseStats {
                lines: 0,
                data_bytes: 0,
                skipped: 0,
                ignored: 0,
                last_error: None,
            },
            since_yield: 0,
        }
    }

    /// Forget buffered text, address state and counters
    pub fn reset(&mut self) {
        *self = Self::new(self.policy);
    }

    /// Change the checksum policy
    pub fn set_checksum_policy(&mut self, policy: ChecksumPolicy) {
        self.policy = policy;
    }

    /// Counters since the last reset
    #[must_use]
    pub const fn stats(&self) -> &ParseStats {
        &self.stats
    }

    /// Whether an end-of-file record was seen
    #[must_use]
    pub const fn seen_eof(&self) -> bool {
        self.eof
    }

    /// Next hex-literal address
    #[must_use]
    pub const fn cursor(&self) -> u32 {
        self.cursor
    }

    /// Bytes buffered waiting for a line end
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.line.len()
    }

    /// Consume a slice of upload text
    ///
    /// # Errors
    ///
    /// The sink's error; parse problems never fail a feed.
    pub async fn feed<S: BatchSink>(&mut self, bytes: &[u8], batch: &mut BatchAccumulator, sink: &mut S) -> Result<()> {
        for &c in bytes {
            match c {
                b'\r' => {}
                b'\n' => self.end_line(batch, sink).await?,
                _ => {
                    if self.line.is_full() {
                        self.overflow(batch, sink).await?;
                    }
                    let _ = self.line.push(c);
                }
            }
        }
        Ok(())
    }

    /// Process the unterminated last line and flush the accumulator
    ///
    /// # Errors
    ///
    /// The sink's error.
    pub async fn finish<S: BatchSink>(&mut self, batch: &mut BatchAccumulator, sink: &mut S) -> Result<()> {
        if !self.line.is_empty() {
            self.end_line(batch, sink).await?;
        }
        batch.flush(sink).await
    }

    async fn end_line<S: BatchSink>(&mut self, batch: &mut BatchAccumulator, sink: &mut S) -> Result<()> {
        let line = core::mem::take(&mut self.line);
        self.dispatch(&line, batch, sink).await
    }

    /// Full buffer without a line end. Literal lines are cut after their
    /// last separator, or before their last `0x` prefix when there is none,
    /// and the tail is kept; anything else is processed whole.
    async fn overflow<S: BatchSink>(&mut self, batch: &mut BatchAccumulator, sink: &mut S) -> Result<()> {
        let line = core::mem::take(&mut self.line);
        let trimmed = line.trim_ascii_start();
        let cut = if trimmed.first() == Some(&b':') || !contains_literal(&line) {
            None
        } else {
            split_point(&line)
        };

        match cut {
            Some(at) => {
                crate::log_debug!("long literal line split at {}", at);
                let _ = self.line.extend_from_slice(&line[at..]);
                self.dispatch(&line[..at], batch, sink).await
            }
            None => {
                crate::log_warn!("line exceeds {} bytes, processing as is", config::LINE_BUFFER_SIZE);
                self.dispatch(&line, batch, sink).await
            }
        }
    }

    async fn dispatch<S: BatchSink>(&mut self, raw: &[u8], batch: &mut BatchAccumulator, sink: &mut S) -> Result<()> {
        let line = raw.trim_ascii();
        if line.is_empty() {
            return Ok(());
        }
        self.stats.lines += 1;

        if line[0] == b':' {
            self.record(line, batch, sink).await
        } else if contains_literal(line) {
            for value in literals(line) {
                batch.add_byte(self.cursor, value, sink).await?;
                self.cursor = self.cursor.wrapping_add(1);
                self.count_byte().await;
            }
            Ok(())
        } else {
            self.stats.ignored += 1;
            Ok(())
        }
    }

    async fn record<S: BatchSink>(&mut self, line: &[u8], batch: &mut BatchAccumulator, sink: &mut S) -> Result<()> {
        let record = match parse_record(line, self.policy) {
            Ok(record) => record,
            Err(err) => {
                crate::log_warn!("skipping record on line {}: {}", self.stats.lines, err);
                self.stats.skipped += 1;
                self.stats.last_error = Some(err);
                return Ok(());
            }
        };

        match record.kind {
            RecordKind::Data if self.eof => {
                self.stats.skipped += 1;
            }
            RecordKind::Data => {
                let start = self.base.wrapping_add(u32::from(record.offset));
                for (i, &value) in record.data.iter().enumerate() {
                    batch.add_byte(start.wrapping_add(i as u32), value, sink).await?;
                    self.count_byte().await;
                }
            }
            RecordKind::EndOfFile => {
                self.eof = true;
                batch.flush(sink).await?;
            }
            RecordKind::ExtendedSegmentAddress | RecordKind::ExtendedLinearAddress => {
                if let Some(base) = record.extended_base() {
                    crate::log_debug!("address base {:#x}", base);
                    self.base = base;
                }
            }
            RecordKind::StartSegmentAddress | RecordKind::StartLinearAddress => {}
        }
        Ok(())
    }

    async fn count_byte(&mut self) {
        self.stats.data_bytes += 1;
        self.since_yield += 1;
        if self.since_yield >= config::PARSE_YIELD_INTERVAL {
            self.since_yield = 0;
            yield_now().await;
        }
    }
}

impl Default for ImageParser {
    fn default() -> Self {
        Self::new(ChecksumPolicy::default())
    }
}
