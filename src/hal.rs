//! Hardware Abstraction Layer
//!
//! Thin wrappers over the `embedded-hal` traits the programmer needs:
//! a blocking I2C transport, the write-protect line and a system clock.
//! Host builds (`std`) add simulated hardware in [`mock`].

pub mod gpio;
pub mod i2c;
pub mod system;

#[cfg(feature = "std")]
pub mod mock;
