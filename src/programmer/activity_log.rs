//! Activity log
//!
//! Bounded ring of timestamped text lines. The oldest entry is evicted
//! when the ring is full and pushing never fails; over-long messages are
//! truncated at a character boundary.

use core::fmt::{self, Write};

use heapless::{HistoryBuffer, String};

use crate::config;

/// One log line, timestamp prefix included
pub type LogEntry = String<{ config::ACTIVITY_LOG_ENTRY_SIZE }>;

/// Fixed-capacity ring of log lines
pub struct ActivityLog<const N: usize = { config::ACTIVITY_LOG_ENTRIES }> {
    entries: HistoryBuffer<LogEntry, N>,
    total: u32,
}

impl<const N: usize> ActivityLog<N> {
    /// Create an empty log
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: HistoryBuffer::new(),
            total: 0,
        }
    }

    /// Append `"[<ms>] <message>"`, evicting the oldest line when full
    pub fn push(&mut self, now_ms: u64, message: fmt::Arguments<'_>) {
        let mut entry = LogEntry::new();
        let mut out = Truncating(&mut entry);
        let _ = write!(out, "[{now_ms}] ");
        let _ = out.write_fmt(message);
        self.entries.write(entry);
        self.total = self.total.wrapping_add(1);
    }

    /// Lines currently held
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been logged
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.len() == 0
    }

    /// Lines ever pushed, evicted ones included
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.total
    }

    /// Most recent line
    #[must_use]
    pub fn latest(&self) -> Option<&str> {
        self.entries.recent().map(String::as_str)
    }

    /// Lines from oldest to newest
    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.oldest_ordered().map(String::as_str)
    }

    /// Write every line, oldest first, each followed by a newline
    ///
    /// # Errors
    ///
    /// Propagates the writer's error.
    pub fn render<W: Write>(&self, out: &mut W) -> fmt::Result {
        for line in self.entries() {
            out.write_str(line)?;
            out.write_char('\n')?;
        }
        Ok(())
    }

    /// Drop every line
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<const N: usize> Default for ActivityLog<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Writer that silently stops at the string's capacity
struct Truncating<'a, const M: usize>(&'a mut String<M>);

impl<const M: usize> Write for Truncating<'_, M> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.chars() {
            if self.0.push(c).is_err() {
                break;
            }
        }
        Ok(())
    }
}
