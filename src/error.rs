//! Error types
//!
//! Every fallible core operation returns [`Result`]. Range, transport and
//! verification errors abort the current high-level operation; parse and
//! resource errors are recovered where they occur and only surface in logs
//! and statistics.

use thiserror::Error;

/// Result type for programmer operations
pub type Result<T> = core::result::Result<T, Error>;

/// Programmer-level errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// `address + len` does not fit in the device. Raised before any bus activity.
    #[error("range {address:#06x}+{len} exceeds capacity {capacity}")]
    Range {
        /// First byte of the rejected access
        address: u32,
        /// Length of the rejected access
        len: usize,
        /// Device capacity in bytes
        capacity: u32,
    },

    /// The bus transaction failed after the retry budget was spent
    #[error("bus error: {0}")]
    Transport(#[from] BusError),

    /// Read-back differed from the source after one re-read
    #[error("verify mismatch at {address:#06x}: expected {expected:#04x}, read {actual:#04x}")]
    Verification {
        /// Address of the mismatching byte
        address: u32,
        /// Byte that was written
        expected: u8,
        /// Byte that was read back
        actual: u8,
    },

    /// An image line could not be parsed
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Free memory dropped below the safety threshold
    #[error("low memory: {free} bytes free, {required} required")]
    Resource {
        /// Free bytes at the time of the check
        free: usize,
        /// Threshold that was not met
        required: usize,
    },

    /// The addressed device did not answer on any known address
    #[error("device not detected")]
    NotDetected,
}

/// I2C bus failure classes
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub enum BusError {
    /// Address or data byte was not acknowledged (device busy or absent)
    #[error("no acknowledge")]
    Nack,
    /// Another controller won arbitration
    #[error("arbitration lost")]
    ArbitrationLost,
    /// Bus fault (misplaced START/STOP, stuck line)
    #[error("bus fault")]
    Bus,
    /// Device did not complete within the polling budget
    #[error("timeout")]
    Timeout,
    /// Controller FIFO overrun or underrun
    #[error("overrun")]
    Overrun,
    /// Transfer longer than the controller can send in one transaction
    #[error("transfer of {0} bytes exceeds limit")]
    InvalidLength(usize),
    /// Any other controller-specific failure
    #[error("controller error")]
    Other,
}

impl BusError {
    /// Whether repeating the same transaction can succeed
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        !matches!(self, Self::InvalidLength(_))
    }

    /// Map an `embedded-hal` I2C error kind onto a bus error class
    #[must_use]
    pub fn from_kind(kind: embedded_hal::i2c::ErrorKind) -> Self {
        use embedded_hal::i2c::ErrorKind;
        match kind {
            ErrorKind::NoAcknowledge(_) => Self::Nack,
            ErrorKind::ArbitrationLoss => Self::ArbitrationLost,
            ErrorKind::Bus => Self::Bus,
            ErrorKind::Overrun => Self::Overrun,
            _ => Self::Other,
        }
    }
}

/// Reasons an image line is rejected
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub enum ParseError {
    /// Shorter than the 11-character minimum record
    #[error("record too short ({0} chars)")]
    TooShort(usize),
    /// Declared byte count needs more characters than the line holds
    #[error("record truncated: {declared} data bytes declared")]
    Truncated {
        /// Byte count from the record header
        declared: u8,
    },
    /// A character that is not a hexadecimal digit
    #[error("invalid hex digit at column {0}")]
    InvalidDigit(usize),
    /// Record checksum does not sum to zero
    #[error("checksum mismatch: expected {expected:#04x}, found {found:#04x}")]
    Checksum {
        /// Checksum computed over the record
        expected: u8,
        /// Checksum stored in the record
        found: u8,
    },
    /// Extended address record without its two-byte payload
    #[error("malformed extended address record")]
    BadExtendedAddress,
    /// Record type outside 0x00..=0x05
    #[error("unsupported record type {0:#04x}")]
    UnsupportedRecord(u8),
}

impl Error {
    /// Whether an upload may continue after this error
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Parse(_) | Self::Resource { .. })
    }
}
