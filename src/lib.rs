//! EEPROM Programmer Firmware Library
//!
//! Core of an STM32G474-based programmer for 24-series I2C serial EEPROMs
//! that also controls the run state of an ADAU1701 DSP sharing the bus.
//! Firmware images arrive as Intel HEX, C-style hex literals or raw binary
//! and are streamed to the device under a fixed memory budget.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      SERVICE LAYER                           │
//! │  ProgrammerService  │  UploadSession state machine           │
//! ├─────────────────────────────────────────────────────────────┤
//! │                       CORE LAYER                             │
//! │  Programmer (write/verify, erase, dump)  │  Image parser     │
//! │  SharedState: progress + activity log    │  Batch accumulator│
//! ├─────────────────────────────────────────────────────────────┤
//! │                   HAL / DRIVER LAYER                         │
//! │  EEPROM page writer  │  ADAU1701  │  I2C  │  WP pin  │ clock │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    RTOS / SCHEDULER                          │
//! │           embassy-rs (async/await executor)                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Design Principles
//!
//! - **Bounded everything**: fixed buffers, bounded retries and polling
//! - **Cooperative**: long operations yield after every bus transaction
//! - **No unsafe in application code**
//! - **Explicit error handling**: all fallible operations return `Result`

#![cfg_attr(feature = "embedded", no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]

#[cfg(all(feature = "embedded", feature = "std"))]
extern crate std;

// Re-export dependencies needed by applications (only in embedded mode)
#[cfg(feature = "embedded")]
pub use embassy_executor;
#[cfg(feature = "embedded")]
pub use embassy_stm32;
#[cfg(feature = "embedded")]
pub use embassy_time;

/// Logging macros
#[macro_use]
pub mod logging;

/// System configuration and constants
pub mod config;

/// Error types
pub mod error;

/// Shared types used across modules
pub mod types;

/// Bounded retry policy
pub mod retry;

/// Hardware Abstraction Layer
///
/// I2C transport, write-protect line, clock, and host mocks.
pub mod hal;

/// Peripheral Drivers
///
/// 24-series EEPROM page writer and ADAU1701 run control.
pub mod drivers;

/// Write/verify orchestration
pub mod programmer;

/// Firmware image formats
pub mod image;

/// Upload lifecycle
pub mod upload;

/// Service facade
pub mod service;

pub use error::{BusError, Error, ParseError, Result};
pub use programmer::state::SharedState;
pub use programmer::{Programmer, ProgrammerConfig};
pub use service::ProgrammerService;

/// Prelude module for common imports
pub mod prelude {
    //! Convenient re-exports for common types and traits.

    pub use crate::config::*;
    pub use crate::error::{BusError, Error, ParseError, Result};
    pub use crate::image::{BatchSink, ChecksumPolicy};
    pub use crate::programmer::state::SharedState;
    pub use crate::programmer::{Programmer, ProgrammerConfig};
    pub use crate::service::ProgrammerService;
    pub use crate::types::*;
    pub use crate::upload::{UploadReport, UploadState};

    // Common traits
    pub use embedded_hal::digital::OutputPin;
    pub use embedded_hal::i2c::I2c;
    pub use embedded_hal_async::delay::DelayNs;
}
