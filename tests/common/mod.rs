//! Shared fixtures for the host test suites
//!
//! A [`Rig`] holds one handle to every mock so tests can inspect the bus,
//! the write-protect line and the clock after the code under test has
//! taken ownership of its own handles. It also owns the shared programmer
//! state, which tests read while an operation is suspended.

#![allow(dead_code)]

use core::future::{poll_fn, Future};
use core::pin::pin;
use core::task::Poll;

use eeprom_programmer::hal::mock::{MockBus, MockPin, MockSystem, NoopDelay};
use eeprom_programmer::types::EepromGeometry;
use eeprom_programmer::{Programmer, ProgrammerConfig, ProgrammerService, SharedState};
use embassy_futures::block_on;

pub type TestProgrammer<'a> = Programmer<'a, MockBus, MockPin, NoopDelay, MockSystem>;
pub type TestService<'a> = ProgrammerService<'a, MockBus, MockPin, NoopDelay, MockSystem>;

/// Small part used where a full 32 KiB device would only slow tests down
pub const SMALL: EepromGeometry = EepromGeometry::new(0x50, 256, 16, 30);

pub struct Rig {
    pub bus: MockBus,
    pub wp: MockPin,
    pub delay: NoopDelay,
    pub system: MockSystem,
    pub state: SharedState,
    pub config: ProgrammerConfig,
}

impl Rig {
    /// Default 32 KiB EEPROM with its WP input wired to the programmer
    pub fn new() -> Self {
        Self::with_bus(MockBus::with_default_eeprom(), ProgrammerConfig::default())
    }

    /// Blank EEPROM of the given geometry
    pub fn with_geometry(geometry: EepromGeometry) -> Self {
        let config = ProgrammerConfig {
            geometry,
            ..ProgrammerConfig::default()
        };
        Self::with_bus(MockBus::new(geometry), config)
    }

    pub fn with_bus(bus: MockBus, config: ProgrammerConfig) -> Self {
        let wp = MockPin::new();
        Self {
            bus: bus.with_write_protect(&wp),
            wp,
            delay: NoopDelay::new(),
            system: MockSystem::new(),
            state: SharedState::new(),
            config,
        }
    }

    pub fn programmer(&self) -> TestProgrammer<'_> {
        Programmer::new(
            self.bus.clone(),
            self.wp.clone(),
            self.delay.clone(),
            self.system.clone(),
            &self.state,
            self.config,
        )
    }

    pub fn service(&self) -> TestService<'_> {
        ProgrammerService::new(
            self.bus.clone(),
            self.wp.clone(),
            self.delay.clone(),
            self.system.clone(),
            &self.state,
            self.config,
        )
    }
}

/// Deterministic test pattern
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + 3) as u8).collect()
}

/// Run `future` to completion, counting how often it suspended
pub fn run_counting_yields<F: Future>(future: F) -> (F::Output, usize) {
    let mut future = pin!(future);
    let mut suspensions = 0;
    let output = block_on(poll_fn(|cx| match future.as_mut().poll(cx) {
        Poll::Ready(output) => Poll::Ready(output),
        Poll::Pending => {
            suspensions += 1;
            Poll::Pending
        }
    }));
    (output, suspensions)
}
