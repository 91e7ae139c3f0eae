//! Bounded retry with a fixed back-off
//!
//! Shared by the EEPROM page writer and the DSP verified register write.
//! Only errors that classify themselves as retryable are repeated.

use embedded_hal_async::delay::DelayNs;

use crate::config;
use crate::error::{BusError, Error};

/// Errors that know whether repeating the operation can help
pub trait Retryable {
    /// Whether another attempt may succeed
    fn is_retryable(&self) -> bool;
}

impl Retryable for BusError {
    fn is_retryable(&self) -> bool {
        BusError::is_retryable(*self)
    }
}

impl Retryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(bus) => bus.is_retryable(),
            Self::Verification { .. } => true,
            _ => false,
        }
    }
}

/// Attempt budget and delay between attempts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub struct RetryPolicy {
    /// Total attempts, first one included
    pub attempts: u8,
    /// Wait after each failed attempt
    pub backoff_ms: u32,
}

impl RetryPolicy {
    /// EEPROM page write transactions
    pub const PAGE_WRITE: Self = Self::new(config::WRITE_RETRY_ATTEMPTS, config::WRITE_RETRY_DELAY_MS);

    /// DSP verified register writes
    pub const DSP_REGISTER: Self = Self::new(config::dsp::WRITE_VERIFY_RETRIES, config::dsp::RETRY_DELAY_MS);

    /// Single attempt, no waiting
    pub const NONE: Self = Self::new(1, 0);

    /// Create a policy. At least one attempt is always made.
    #[must_use]
    pub const fn new(attempts: u8, backoff_ms: u32) -> Self {
        Self {
            attempts: if attempts == 0 { 1 } else { attempts },
            backoff_ms,
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// budget is spent. `op` receives the 1-based attempt number.
    ///
    /// # Errors
    ///
    /// Returns the last error produced by `op`.
    pub async fn run<D, T, E, F>(&self, delay: &mut D, op: F) -> Result<T, E>
    where
        D: DelayNs,
        E: Retryable,
        F: FnMut(u8) -> Result<T, E>,
    {
        self.run_observed(delay, op, |_, _| {}).await
    }

    /// Same as [`run`](Self::run), calling `on_failure(attempt, &error)`
    /// after every failed attempt.
    ///
    /// # Errors
    ///
    /// Returns the last error produced by `op`.
    pub async fn run_observed<D, T, E, F, O>(&self, delay: &mut D, mut op: F, mut on_failure: O) -> Result<T, E>
    where
        D: DelayNs,
        E: Retryable,
        F: FnMut(u8) -> Result<T, E>,
        O: FnMut(u8, &E),
    {
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) => {
                    on_failure(attempt, &err);
                    if attempt >= self.attempts || !err.is_retryable() {
                        return Err(err);
                    }
                    if self.backoff_ms > 0 {
                        delay.delay_ms(self.backoff_ms).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::PAGE_WRITE
    }
}
