//! Programmer state
//!
//! Progress counters, activity log and verification policy, grouped in one
//! value. The [`Programmer`](super::Programmer) mutates it through a
//! [`SharedState`] handle while status reporting in other tasks reads the
//! same handle mid-operation.
//!
//! Progress is either *owned* by a long operation (erase, upload) or
//! tracked transiently by a single write. Writes issued inside an owned
//! operation only add to the counters and never end it.

use core::cell::RefCell;
use core::fmt;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use super::activity_log::ActivityLog;
use crate::config;
use crate::types::Progress;

/// Progress counters with an ownership flag
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProgressCounters {
    current: Progress,
    owned: bool,
}

impl ProgressCounters {
    /// Idle counters
    #[must_use]
    pub const fn new() -> Self {
        Self {
            current: Progress {
                bytes_written: 0,
                bytes_total: 0,
                in_progress: false,
            },
            owned: false,
        }
    }

    /// Reset to `{0, total, true}` and hold until [`finish`](Self::finish)
    pub fn begin(&mut self, total: u32) {
        self.current = Progress {
            bytes_written: 0,
            bytes_total: total,
            in_progress: true,
        };
        self.owned = true;
    }

    /// End the owned operation
    pub fn finish(&mut self) {
        self.current.in_progress = false;
        self.owned = false;
    }

    /// Start tracking a single write unless an owned operation is running.
    /// Returns whether the caller must call [`end_transient`](Self::end_transient).
    pub fn begin_transient(&mut self, total: u32) -> bool {
        if self.owned {
            return false;
        }
        self.current = Progress {
            bytes_written: 0,
            bytes_total: total,
            in_progress: true,
        };
        true
    }

    /// End a single write started with [`begin_transient`](Self::begin_transient)
    pub fn end_transient(&mut self, started: bool) {
        if started && !self.owned {
            self.current.in_progress = false;
        }
    }

    /// Count committed bytes
    pub fn add(&mut self, bytes: usize) {
        self.current.bytes_written = self.current.bytes_written.saturating_add(bytes as u32);
    }

    /// Whether a long operation holds the counters
    #[must_use]
    pub const fn is_owned(&self) -> bool {
        self.owned
    }

    /// Current snapshot
    #[must_use]
    pub const fn snapshot(&self) -> Progress {
        self.current
    }
}

/// Mutable programmer state shared by every operation
#[derive(Default)]
pub struct ProgrammerState {
    /// Write progress
    pub progress: ProgressCounters,
    /// Timestamped activity lines
    pub log: ActivityLog,
    verify: bool,
}

impl ProgrammerState {
    /// Fresh state with the given verification policy
    #[must_use]
    pub const fn new(verify: bool) -> Self {
        Self {
            progress: ProgressCounters::new(),
            log: ActivityLog::new(),
            verify,
        }
    }

    /// Whether chunks are read back after writing
    #[must_use]
    pub const fn verify_enabled(&self) -> bool {
        self.verify
    }

    /// Change the verification policy; takes effect at the next chunk
    pub fn set_verify(&mut self, enabled: bool) {
        self.verify = enabled;
    }

    /// Append to the activity log and mirror the line to the debug log
    pub fn record(&mut self, now_ms: u64, message: fmt::Arguments<'_>) {
        self.log.push(now_ms, message);
        if let Some(line) = self.log.latest() {
            crate::log_info!("{}", line);
        }
    }
}

/// [`ProgrammerState`] behind a critical-section mutex
///
/// Every access is a short closure; the lock is never held across an
/// `await`, so readers see the counters as of the last suspension point.
pub struct SharedState {
    inner: Mutex<CriticalSectionRawMutex, RefCell<ProgrammerState>>,
}

impl SharedState {
    /// Fresh state with the default verification policy. Usable in a `static`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(ProgrammerState::new(config::VERIFY_AFTER_WRITE))),
        }
    }

    /// Read the state
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&ProgrammerState) -> R,
    {
        self.inner.lock(|cell| f(&cell.borrow()))
    }

    /// Mutate the state
    pub fn with_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut ProgrammerState) -> R,
    {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }

    /// Progress snapshot
    #[must_use]
    pub fn progress(&self) -> Progress {
        self.with(|state| state.progress.snapshot())
    }

    /// Whether chunks are read back after writing
    #[must_use]
    pub fn verify_enabled(&self) -> bool {
        self.with(ProgrammerState::verify_enabled)
    }

    /// Append a timestamped activity line
    pub fn record(&self, now_ms: u64, message: fmt::Arguments<'_>) {
        self.with_mut(|state| state.record(now_ms, message));
    }

    /// Write the activity log, oldest line first
    ///
    /// # Errors
    ///
    /// Propagates the writer's error.
    pub fn render_activity_log<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        self.with(|state| state.log.render(out))
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owned_progress_survives_inner_writes() {
        let mut p = ProgressCounters::default();
        p.begin(100);
        let started = p.begin_transient(10);
        assert!(!started);
        p.add(10);
        p.end_transient(started);
        let snap = p.snapshot();
        assert!(snap.in_progress);
        assert_eq!(snap.bytes_written, 10);
        assert_eq!(snap.bytes_total, 100);
        p.finish();
        assert!(!p.snapshot().in_progress);
    }

    #[test]
    fn test_transient_progress_resets_and_ends() {
        let mut p = ProgressCounters::default();
        let started = p.begin_transient(64);
        assert!(started);
        assert!(p.snapshot().in_progress);
        p.add(64);
        p.end_transient(started);
        assert_eq!(
            p.snapshot(),
            Progress {
                bytes_written: 64,
                bytes_total: 64,
                in_progress: false
            }
        );
    }

    #[test]
    fn test_record_appends_line() {
        let mut state = ProgrammerState::new(false);
        state.record(5, format_args!("hello {}", 1));
        assert_eq!(state.log.latest(), Some("[5] hello 1"));
        assert!(!state.verify_enabled());
        state.set_verify(true);
        assert!(state.verify_enabled());
    }

    #[test]
    fn test_shared_state_mutation_visible_to_readers() {
        let shared = SharedState::new();
        let reader = &shared;
        shared.with_mut(|state| {
            state.progress.begin(256);
            state.progress.add(32);
        });
        assert_eq!(
            reader.progress(),
            Progress {
                bytes_written: 32,
                bytes_total: 256,
                in_progress: true
            }
        );
        shared.record(7, format_args!("erase start"));
        let mut out = std::string::String::new();
        reader.render_activity_log(&mut out).unwrap();
        assert_eq!(out, "[7] erase start\n");
    }
}
