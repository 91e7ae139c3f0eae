//! EEPROM Programmer Main Application
//!
//! Entry point for the STM32G474-based programmer firmware.
//! Initializes the bus, write-protect line and DSP link, then keeps the
//! programmer service alive for the host-facing layer.

#![no_std]
#![no_main]

use defmt::info;
use embassy_executor::Spawner;
use embassy_stm32::gpio::{Level, Output, Speed};
use embassy_stm32::i2c::I2c;
use embassy_stm32::time::Hertz;
use embassy_time::{Delay, Duration, Timer};
use {defmt_rtt as _, panic_probe as _};

use eeprom_programmer::hal::system::EmbassySystem;
use eeprom_programmer::prelude::*;

/// Progress, verification policy and activity log, readable from any task
static STATE: SharedState = SharedState::new();

/// Main entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("EEPROM Programmer Firmware v{}", env!("CARGO_PKG_VERSION"));

    // Initialize STM32G474 peripherals with default clock configuration
    let config = embassy_stm32::Config::default();
    let p = embassy_stm32::init(config);

    info!("Peripherals initialized");

    // Status LED (PA5 on Nucleo boards)
    let led = Output::new(p.PA5, Level::Low, Speed::Low);

    // EEPROM write-protect, asserted until a write needs it
    let wp = Output::new(p.PB0, Level::High, Speed::Low);

    // I2C1 shared by the EEPROM and the DSP
    // PB8 = SCL, PB9 = SDA
    let i2c = I2c::new_blocking(
        p.I2C1,
        p.PB8, // SCL
        p.PB9, // SDA
        Hertz(I2C_FREQUENCY_HZ),
        Default::default(),
    );

    info!("I2C1 initialized at {} Hz", I2C_FREQUENCY_HZ);

    let mut service = ProgrammerService::new(i2c, wp, Delay, EmbassySystem, &STATE, ProgrammerConfig::default());

    if service.detect() {
        info!("EEPROM ready at {:#x}", EEPROM_I2C_ADDR);
    } else {
        defmt::warn!("EEPROM not responding at {:#x}", EEPROM_I2C_ADDR);
    }

    let devices = service.scan_bus();
    info!("I2C scan: {} device(s)", devices.len());
    for device in &devices {
        info!("  found {}", device);
    }

    if service.detect_dsp() {
        if let Some(status) = service.dsp_status() {
            info!("DSP status: {}", status);
        }
    }

    spawner.must_spawn(heartbeat_task(led));
    spawner.must_spawn(status_task(&STATE));

    info!("Tasks spawned, entering main loop");

    // Main loop - the host-facing layer drives `service` from here
    loop {
        Timer::after(Duration::from_secs(10)).await;
        info!("verification {}", service.verification());
    }
}

/// Status task - reports progress while long operations run elsewhere
#[embassy_executor::task]
async fn status_task(state: &'static SharedState) {
    loop {
        Timer::after(Duration::from_secs(1)).await;
        let progress = state.progress();
        if progress.in_progress {
            info!("progress: {}/{} bytes ({}%)", progress.bytes_written, progress.bytes_total, progress.percent());
        }
    }
}

/// Heartbeat task - blinks LED to show system is running
#[embassy_executor::task]
async fn heartbeat_task(mut led: Output<'static>) {
    loop {
        led.set_high();
        Timer::after(Duration::from_millis(100)).await;
        led.set_low();
        Timer::after(Duration::from_millis(900)).await;
    }
}
