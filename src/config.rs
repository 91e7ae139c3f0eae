//! System configuration and hardware constants
//!
//! This module defines compile-time constants for the EEPROM programmer.
//! Bus addresses, device geometry, timing budgets and memory limits are
//! centralized here; runtime values are derived from them through
//! [`crate::types::EepromGeometry::default`] and
//! [`crate::programmer::ProgrammerConfig::default`].

/// I2C bus frequency (standard mode, matches long programming leads)
pub const I2C_FREQUENCY_HZ: u32 = 100_000;

/// 24-series EEPROM I2C address (A0..A2 tied low)
pub const EEPROM_I2C_ADDR: u8 = 0x50;

/// EEPROM capacity in bytes (24LC256 / AT24C256)
pub const EEPROM_CAPACITY: u32 = 32_768;

/// EEPROM physical page size in bytes
pub const EEPROM_PAGE_SIZE: u16 = 64;

/// Size of the bus controller's transmit buffer
pub const I2C_BUFFER_SIZE: usize = 32;

/// Bytes of memory address sent ahead of every EEPROM data transfer
pub const EEPROM_ADDRESS_BYTES: usize = 2;

/// Maximum data bytes per bus transaction
pub const I2C_MAX_DATA_PER_XFER: usize = I2C_BUFFER_SIZE - EEPROM_ADDRESS_BYTES;

/// Processing chunk size for writes and inline verification
pub const WRITE_CHUNK_SIZE: usize = 32;

/// Mismatches retained in a verification report
pub const MAX_REPORTED_MISMATCHES: usize = 3;

/// Bus transaction attempts before a page write is abandoned
pub const WRITE_RETRY_ATTEMPTS: u8 = 3;

/// Delay between failed bus transaction attempts
pub const WRITE_RETRY_DELAY_MS: u32 = 10;

/// Upper bound on the EEPROM internal write cycle
pub const ACK_POLL_TIMEOUT_MS: u32 = 50;

/// Interval between ACK polling probes
pub const ACK_POLL_INTERVAL_US: u32 = 500;

/// Verified (or dumped) bytes between cooperative yields
pub const VERIFY_YIELD_INTERVAL: usize = 8;

/// Parsed data bytes between cooperative yields
pub const PARSE_YIELD_INTERVAL: usize = 16;

/// Block size used when streaming a full-device dump
pub const DUMP_BLOCK_SIZE: usize = 64;

/// Slice size used by range reads
pub const READ_SLICE_SIZE: usize = 16;

/// Maximum number of probes accepted by the stress test
pub const MAX_STRESS_TESTS: u16 = 100;

/// Batch accumulator capacity (one EEPROM page)
pub const BATCH_CAPACITY: usize = 64;

/// Pending-line buffer for the streaming image parser
pub const LINE_BUFFER_SIZE: usize = 128;

/// Free memory below which text-mode deliveries are dropped
pub const MIN_FREE_MEMORY: usize = 4_000;

/// Activity log depth in entries
pub const ACTIVITY_LOG_ENTRIES: usize = 64;

/// Activity log entry size in bytes (timestamp prefix included)
pub const ACTIVITY_LOG_ENTRY_SIZE: usize = 128;

/// Upload report message capacity
pub const REPORT_MESSAGE_SIZE: usize = 96;

/// Whether write-protect is asserted by driving the pin high
pub const WP_ACTIVE_HIGH: bool = true;

/// Read-back verification default at power-up
pub const VERIFY_AFTER_WRITE: bool = false;

/// DSP (ADAU1701) register interface configuration
pub mod dsp {
    //! ADAU1701 addresses, registers and timing

    /// Configured 7-bit I2C address (ADDR0/ADDR1 low)
    pub const I2C_ADDR: u8 = 0x34;

    /// Addresses tried when the configured one does not answer
    pub const ALTERNATE_ADDRS: [u8; 3] = [0x68, 0x34, 0x1D];

    /// Core control register
    pub const REG_CONTROL: u16 = 0xF000;

    /// Core status register
    pub const REG_STATUS: u16 = 0xF001;

    /// Hardware ID register (reads 0x02 on ADAU1701)
    pub const REG_HW_ID: u16 = 0xF002;

    /// Software ID register
    pub const REG_SW_ID: u16 = 0xF003;

    /// Expected hardware ID value
    pub const HW_ID_ADAU1701: u8 = 0x02;

    /// Control register: core halted while set
    pub const CR_CORE_HOLD: u8 = 0x01;

    /// Status register: DCK stable
    pub const SR_DCK_STABLE: u8 = 0x01;

    /// Status register: PLL locked
    pub const SR_PLL_LOCKED: u8 = 0x04;

    /// Status register: safeload ready
    pub const SR_SAFELOAD_READY: u8 = 0x08;

    /// Verified register write attempts
    pub const WRITE_VERIFY_RETRIES: u8 = 3;

    /// Delay between verified write attempts
    pub const RETRY_DELAY_MS: u32 = 5;

    /// Settling time around a soft reset
    pub const RESET_DELAY_MS: u32 = 50;
}

/// Pin assignments for GPIO
pub mod pins {
    //! GPIO pin assignments matching the programmer board

    /// Status LED (directly on MCU)
    pub const LED_STATUS: &str = "PA5";

    /// I2C1 SCL (EEPROM, DSP)
    pub const I2C1_SCL: &str = "PB8";

    /// I2C1 SDA (EEPROM, DSP)
    pub const I2C1_SDA: &str = "PB9";

    /// EEPROM write-protect line
    pub const EEPROM_WP: &str = "PB0";
}
