//! GPIO Abstractions
//!
//! Semantic wrapper for the EEPROM write-protect line. Writes are only
//! possible while the line is released, and releasing it goes through a
//! guard that restores the previous level when dropped.

use embedded_hal::digital::OutputPin;

/// Write-protect line level
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum WpState {
    /// Writes inhibited
    #[default]
    Protected,
    /// Writes allowed
    Writable,
}

impl WpState {
    /// Build from a "protected" flag
    #[must_use]
    pub const fn from_protected(protected: bool) -> Self {
        if protected {
            Self::Protected
        } else {
            Self::Writable
        }
    }

    /// Whether writes are inhibited
    #[must_use]
    pub const fn is_protected(self) -> bool {
        matches!(self, Self::Protected)
    }
}

#[cfg(feature = "embedded")]
impl defmt::Format for WpState {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Protected => defmt::write!(f, "PROTECTED"),
            Self::Writable => defmt::write!(f, "WRITABLE"),
        }
    }
}

/// EEPROM write-protect driver
pub struct WriteProtect<P> {
    pin: P,
    active_high: bool,
    state: WpState,
}

impl<P: OutputPin> WriteProtect<P> {
    /// Take the pin and assert protection
    pub fn new(pin: P, active_high: bool) -> Self {
        let mut wp = Self {
            pin,
            active_high,
            state: WpState::Protected,
        };
        wp.drive(WpState::Protected);
        wp
    }

    /// Drive the line to `state`
    pub fn set(&mut self, state: WpState) {
        if self.state != state {
            self.drive(state);
        }
    }

    /// Assert protection
    pub fn protect(&mut self) {
        self.set(WpState::Protected);
    }

    /// Release protection
    pub fn unprotect(&mut self) {
        self.set(WpState::Writable);
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> WpState {
        self.state
    }

    /// Release protection until the returned guard is dropped
    pub fn release(&mut self) -> WriteEnableGuard<'_, P> {
        let previous = self.state;
        self.set(WpState::Writable);
        WriteEnableGuard { wp: self, previous }
    }

    /// Give the pin back
    pub fn into_inner(self) -> P {
        self.pin
    }

    fn drive(&mut self, state: WpState) {
        let high = state.is_protected() == self.active_high;
        let result = if high { self.pin.set_high() } else { self.pin.set_low() };
        if result.is_err() {
            crate::log_warn!("write-protect pin did not switch");
        }
        self.state = state;
    }
}

/// Holds the write-protect line released; restores the prior level on drop
pub struct WriteEnableGuard<'a, P: OutputPin> {
    wp: &'a mut WriteProtect<P>,
    previous: WpState,
}

impl<P: OutputPin> WriteEnableGuard<'_, P> {
    /// Level that will be restored
    #[must_use]
    pub const fn previous(&self) -> WpState {
        self.previous
    }
}

impl<P: OutputPin> Drop for WriteEnableGuard<'_, P> {
    fn drop(&mut self) {
        self.wp.set(self.previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;

    #[derive(Default)]
    struct LevelPin {
        high: bool,
        writes: usize,
    }

    impl embedded_hal::digital::ErrorType for LevelPin {
        type Error = Infallible;
    }

    impl OutputPin for LevelPin {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.high = false;
            self.writes += 1;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.high = true;
            self.writes += 1;
            Ok(())
        }
    }

    #[test]
    fn test_new_asserts_protection() {
        let wp = WriteProtect::new(LevelPin::default(), true);
        assert!(wp.state().is_protected());
        assert!(wp.into_inner().high);
    }

    #[test]
    fn test_active_low_polarity() {
        let mut wp = WriteProtect::new(LevelPin::default(), false);
        assert!(!wp.pin.high);
        wp.unprotect();
        assert!(wp.pin.high);
    }

    #[test]
    fn test_guard_restores_protected() {
        let mut wp = WriteProtect::new(LevelPin::default(), true);
        {
            let guard = wp.release();
            assert_eq!(guard.previous(), WpState::Protected);
        }
        assert_eq!(wp.state(), WpState::Protected);
        assert!(wp.pin.high);
    }

    #[test]
    fn test_guard_keeps_writable_when_already_released() {
        let mut wp = WriteProtect::new(LevelPin::default(), true);
        wp.unprotect();
        let writes = wp.pin.writes;
        drop(wp.release());
        assert_eq!(wp.state(), WpState::Writable);
        assert_eq!(wp.pin.writes, writes);
    }
}
