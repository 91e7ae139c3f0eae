//! ADAU1701 SigmaDSP run-state driver
//!
//! Only the control-port plumbing needed to halt and resume the core:
//! detection, verified register writes, the core control register and a
//! status snapshot. Register addresses are 16-bit big-endian.
//!
//! The driver does not own the bus. It borrows the transport and delay
//! of the EEPROM driver, which shares the same wires.

use embedded_hal::i2c::I2c;
use embedded_hal_async::delay::DelayNs;

use crate::config::dsp as cfg;
use crate::error::{Error, Result};
use crate::hal::i2c::{I2cAddress, I2cTransport};
use crate::retry::RetryPolicy;

/// Register snapshot and decoded flags
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "embedded", derive(defmt::Format))]
pub struct DspStatus {
    /// Address the DSP answered on
    pub address: u8,
    /// Hardware ID register
    pub hardware_id: u8,
    /// Software ID register
    pub software_id: u8,
    /// Core control register
    pub control: u8,
    /// Core status register
    pub status: u8,
}

impl DspStatus {
    /// Hardware ID matches an ADAU1701
    #[must_use]
    pub const fn hardware_valid(&self) -> bool {
        self.hardware_id == cfg::HW_ID_ADAU1701
    }

    /// Core is executing (hold bit clear)
    #[must_use]
    pub const fn core_running(&self) -> bool {
        self.control & cfg::CR_CORE_HOLD == 0
    }

    /// PLL locked
    #[must_use]
    pub const fn pll_locked(&self) -> bool {
        self.status & cfg::SR_PLL_LOCKED != 0
    }

    /// Data clock stable
    #[must_use]
    pub const fn dck_stable(&self) -> bool {
        self.status & cfg::SR_DCK_STABLE != 0
    }

    /// Safeload registers ready
    #[must_use]
    pub const fn safeload_ready(&self) -> bool {
        self.status & cfg::SR_SAFELOAD_READY != 0
    }
}

/// ADAU1701 control-port driver
#[derive(Clone, Copy, Debug)]
pub struct Adau1701 {
    address: I2cAddress,
    configured: I2cAddress,
    retry: RetryPolicy,
    detected: bool,
}

impl Adau1701 {
    /// Driver for a DSP expected at `address`
    #[must_use]
    pub const fn new(address: u8) -> Self {
        Self {
            address: I2cAddress::new(address),
            configured: I2cAddress::new(address),
            retry: RetryPolicy::DSP_REGISTER,
            detected: false,
        }
    }

    /// Address in use (the configured one until an alternate answers)
    #[must_use]
    pub const fn address(&self) -> I2cAddress {
        self.address
    }

    /// Whether the last detection found the DSP
    #[must_use]
    pub const fn is_detected(&self) -> bool {
        self.detected
    }

    /// Probe the configured address, then the alternates, adopting the first that answers
    pub fn detect<B: I2c>(&mut self, bus: &mut I2cTransport<B>) -> bool {
        if bus.probe(self.configured) {
            self.address = self.configured;
            self.detected = true;
            crate::log_info!("DSP detected at {:#x}", self.address.addr());
            return true;
        }

        for &alt in &cfg::ALTERNATE_ADDRS {
            let candidate = I2cAddress::new(alt);
            if candidate == self.configured {
                continue;
            }
            if bus.probe(candidate) {
                crate::log_warn!(
                    "DSP answered on alternate {:#x} (configured {:#x})",
                    alt,
                    self.configured.addr()
                );
                self.address = candidate;
                self.detected = true;
                return true;
            }
        }

        crate::log_warn!("DSP not found");
        self.detected = false;
        false
    }

    /// Read one register
    ///
    /// # Errors
    ///
    /// `Transport` on bus failure.
    pub fn read_register<B: I2c>(&self, bus: &mut I2cTransport<B>, reg: u16) -> Result<u8> {
        Ok(bus.read_byte(self.address, reg)?)
    }

    /// Write one register without read-back
    ///
    /// # Errors
    ///
    /// `Transport` on bus failure.
    pub fn write_register<B: I2c>(&self, bus: &mut I2cTransport<B>, reg: u16, value: u8) -> Result<()> {
        Ok(bus.write_bytes(self.address, &reg.to_be_bytes(), &[value])?)
    }

    /// Write a register and read it back, retrying on failure or mismatch
    ///
    /// # Errors
    ///
    /// The last `Transport` or `Verification` error once retries are spent.
    pub async fn write_register_verified<B: I2c, D: DelayNs>(
        &self,
        bus: &mut I2cTransport<B>,
        delay: &mut D,
        reg: u16,
        value: u8,
    ) -> Result<()> {
        self.retry
            .run_observed(
                delay,
                |_| {
                    self.write_register(bus, reg, value)?;
                    let actual = self.read_register(bus, reg)?;
                    if actual == value {
                        Ok(())
                    } else {
                        Err(Error::Verification {
                            address: u32::from(reg),
                            expected: value,
                            actual,
                        })
                    }
                },
                |attempt, error| crate::log_warn!("DSP reg {:#x} attempt {} failed: {}", reg, attempt, *error),
            )
            .await
    }

    /// Halt (`false`) or resume (`true`) the DSP core
    ///
    /// # Errors
    ///
    /// `NotDetected` when the DSP does not answer, `Transport` when the
    /// control register cannot be read (nothing is written), otherwise the
    /// error of the verified control register write.
    pub async fn set_run_state<B: I2c, D: DelayNs>(
        &mut self,
        bus: &mut I2cTransport<B>,
        delay: &mut D,
        run: bool,
    ) -> Result<()> {
        if !self.detected && !self.detect(bus) {
            return Err(Error::NotDetected);
        }

        let current = self.read_register(bus, cfg::REG_CONTROL)?;
        let value = if run {
            current & !cfg::CR_CORE_HOLD
        } else {
            current | cfg::CR_CORE_HOLD
        };
        self.write_register_verified(bus, delay, cfg::REG_CONTROL, value).await?;
        crate::log_info!("DSP core {}", if run { "running" } else { "halted" });
        Ok(())
    }

    /// Whether the core is executing
    ///
    /// # Errors
    ///
    /// `Transport` on bus failure.
    pub fn is_running<B: I2c>(&self, bus: &mut I2cTransport<B>) -> Result<bool> {
        Ok(self.read_register(bus, cfg::REG_CONTROL)? & cfg::CR_CORE_HOLD == 0)
    }

    /// Halt, settle, resume, settle
    ///
    /// # Errors
    ///
    /// The first failing run-state change.
    pub async fn soft_reset<B: I2c, D: DelayNs>(&mut self, bus: &mut I2cTransport<B>, delay: &mut D) -> Result<()> {
        self.set_run_state(bus, delay, false).await?;
        delay.delay_ms(cfg::RESET_DELAY_MS).await;
        self.set_run_state(bus, delay, true).await?;
        delay.delay_ms(cfg::RESET_DELAY_MS).await;
        Ok(())
    }

    /// Read the identification, control and status registers
    ///
    /// # Errors
    ///
    /// `NotDetected` when the DSP does not answer, `Transport` on bus failure.
    pub fn status<B: I2c>(&mut self, bus: &mut I2cTransport<B>) -> Result<DspStatus> {
        if !self.detected && !self.detect(bus) {
            return Err(Error::NotDetected);
        }
        Ok(DspStatus {
            address: self.address.addr(),
            hardware_id: self.read_register(bus, cfg::REG_HW_ID)?,
            software_id: self.read_register(bus, cfg::REG_SW_ID)?,
            control: self.read_register(bus, cfg::REG_CONTROL)?,
            status: self.read_register(bus, cfg::REG_STATUS)?,
        })
    }
}

impl Default for Adau1701 {
    fn default() -> Self {
        Self::new(cfg::I2C_ADDR)
    }
}
