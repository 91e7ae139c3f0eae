//! Peripheral Drivers
//!
//! Device drivers for the ICs on the programming bus. These provide
//! domain-specific abstractions over the HAL layer.

pub mod dsp;
pub mod eeprom;
