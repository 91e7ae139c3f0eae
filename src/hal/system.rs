//! Clock and memory services
//!
//! The programmer timestamps its activity log, measures throughput and
//! checks free memory before accepting text uploads. Those needs are
//! captured by the [`System`] trait so host tests can drive them manually.

/// Monotonic time and free-memory source
pub trait System {
    /// Milliseconds since boot
    fn now_ms(&self) -> u64;

    /// Bytes of RAM still unused
    fn free_memory(&self) -> usize;
}

/// Target system backed by the embassy time driver
///
/// The firmware has no heap allocator. Free memory is the unused RAM
/// between the end of static data and the current stack pointer, which is
/// what a deep parse or a large task future would consume.
#[cfg(feature = "embedded")]
#[derive(Clone, Copy, Debug, Default)]
pub struct EmbassySystem;

#[cfg(feature = "embedded")]
impl System for EmbassySystem {
    fn now_ms(&self) -> u64 {
        embassy_time::Instant::now().as_millis()
    }

    fn free_memory(&self) -> usize {
        let stack_pointer = cortex_m::register::msp::read() as usize;
        let static_end = cortex_m_rt::heap_start() as usize;
        stack_pointer.saturating_sub(static_end)
    }
}

/// Stopwatch for timing measurements
#[derive(Clone, Copy, Debug, Default)]
pub struct Stopwatch {
    start_ms: Option<u64>,
}

impl Stopwatch {
    /// Create a new stopped stopwatch
    #[must_use]
    pub const fn new() -> Self {
        Self { start_ms: None }
    }

    /// Start (or restart) at `now_ms`
    pub fn start(&mut self, now_ms: u64) {
        self.start_ms = Some(now_ms);
    }

    /// Start a stopwatch from the system clock
    #[must_use]
    pub fn started<S: System + ?Sized>(system: &S) -> Self {
        Self {
            start_ms: Some(system.now_ms()),
        }
    }

    /// Stop the stopwatch
    pub fn stop(&mut self) {
        self.start_ms = None;
    }

    /// Whether the stopwatch is running
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.start_ms.is_some()
    }

    /// Milliseconds since start, zero when stopped
    #[must_use]
    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        self.start_ms.map_or(0, |start| now_ms.saturating_sub(start))
    }

    /// Throughput in bytes per second; `bytes` when less than 1 ms elapsed
    #[must_use]
    pub fn bytes_per_second(&self, bytes: u32, now_ms: u64) -> u32 {
        let elapsed = self.elapsed_ms(now_ms);
        if elapsed == 0 {
            return bytes;
        }
        (u64::from(bytes) * 1000 / elapsed).min(u64::from(u32::MAX)) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stopwatch_elapsed() {
        let mut sw = Stopwatch::new();
        assert_eq!(sw.elapsed_ms(100), 0);
        sw.start(100);
        assert!(sw.is_running());
        assert_eq!(sw.elapsed_ms(350), 250);
        assert_eq!(sw.elapsed_ms(50), 0);
        sw.stop();
        assert!(!sw.is_running());
    }

    #[test]
    fn test_throughput() {
        let mut sw = Stopwatch::new();
        sw.start(0);
        assert_eq!(sw.bytes_per_second(2048, 500), 4096);
        assert_eq!(sw.bytes_per_second(64, 0), 64);
    }
}
