//! Mock hardware for host testing
//!
//! [`MockBus`] simulates a 24-series EEPROM (page roll-over, write-cycle
//! busy window, write-protect input) and optionally an ADAU1701 register
//! file on one I2C bus. Every handle is a cheap clone sharing the same
//! state, so a test can keep one handle while the code under test owns
//! another.

use core::cell::{Cell, RefCell};
use core::convert::Infallible;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::vec;
use std::vec::Vec;

use embedded_hal::digital::{ErrorType as PinErrorType, OutputPin};
use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};
use embedded_hal_async::delay::DelayNs;

use super::system::System;
use crate::config;
use crate::types::EepromGeometry;

/// One bus transaction as seen by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusOp {
    /// Plain write (address phase only when `data` is empty)
    Write {
        /// 7-bit device address
        addr: u8,
        /// Bytes after the address
        data: Vec<u8>,
    },
    /// Write followed by a repeated-start read
    WriteRead {
        /// 7-bit device address
        addr: u8,
        /// Bytes written before the read
        write: Vec<u8>,
        /// Bytes read
        read_len: usize,
    },
    /// Plain read
    Read {
        /// 7-bit device address
        addr: u8,
        /// Bytes read
        len: usize,
    },
}

/// A data write that reached the EEPROM array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWrite {
    /// Memory address in the frame header
    pub address: u16,
    /// Data bytes in the frame
    pub len: usize,
}

/// Simulated 24-series EEPROM
#[derive(Debug)]
struct SimEeprom {
    memory: Vec<u8>,
    page_size: usize,
    pointer: usize,
    busy_probes: u32,
    busy_left: u32,
    corrupt: BTreeMap<usize, (u8, Option<u32>)>,
    fail_writes: u32,
    fail_writes_after: Option<u32>,
    fail_reads: u32,
    fault: ErrorKind,
    page_writes: Vec<PageWrite>,
}

impl SimEeprom {
    fn new(capacity: usize, page_size: usize) -> Self {
        Self {
            memory: vec![0xFF; capacity],
            page_size,
            pointer: 0,
            busy_probes: 2,
            busy_left: 0,
            corrupt: BTreeMap::new(),
            fail_writes: 0,
            fail_writes_after: None,
            fail_reads: 0,
            fault: ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data),
            page_writes: Vec::new(),
        }
    }

    fn set_pointer(&mut self, header: &[u8]) {
        if header.len() >= 2 {
            let address = usize::from(u16::from_be_bytes([header[0], header[1]]));
            self.pointer = address % self.memory.len();
        }
    }

    fn write(&mut self, frame: &[u8], protected: bool) -> Result<(), ErrorKind> {
        if frame.len() <= 2 {
            self.set_pointer(frame);
            return Ok(());
        }
        if self.fail_writes > 0 {
            self.fail_writes -= 1;
            return Err(self.fault);
        }
        if let Some(left) = self.fail_writes_after.as_mut() {
            if *left == 0 {
                return Err(self.fault);
            }
            *left -= 1;
        }

        self.set_pointer(frame);
        let data = &frame[2..];
        self.page_writes.push(PageWrite {
            address: u16::from_be_bytes([frame[0], frame[1]]),
            len: data.len(),
        });

        // Write-protected devices acknowledge but do not program
        if !protected {
            let page_base = self.pointer - self.pointer % self.page_size;
            let mut offset = self.pointer % self.page_size;
            for &byte in data {
                self.memory[page_base + offset] = byte;
                offset = (offset + 1) % self.page_size;
            }
            self.pointer = page_base + offset;
        }
        self.busy_left = self.busy_probes;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<(), ErrorKind> {
        if self.fail_reads > 0 {
            self.fail_reads -= 1;
            return Err(self.fault);
        }
        for slot in buf.iter_mut() {
            let mut value = self.memory[self.pointer];
            if let Some((corrupted, remaining)) = self.corrupt.get_mut(&self.pointer) {
                match remaining {
                    Some(0) => {}
                    Some(n) => {
                        *n -= 1;
                        value = *corrupted;
                    }
                    None => value = *corrupted,
                }
            }
            *slot = value;
            self.pointer = (self.pointer + 1) % self.memory.len();
        }
        Ok(())
    }
}

/// Simulated ADAU1701 register file
#[derive(Debug)]
struct SimDsp {
    registers: BTreeMap<u16, u8>,
    pointer: u16,
    drop_writes: u32,
    fail_reads: u32,
}

impl SimDsp {
    fn new() -> Self {
        let mut registers = BTreeMap::new();
        registers.insert(config::dsp::REG_CONTROL, 0x00);
        registers.insert(
            config::dsp::REG_STATUS,
            config::dsp::SR_DCK_STABLE | config::dsp::SR_PLL_LOCKED,
        );
        registers.insert(config::dsp::REG_HW_ID, config::dsp::HW_ID_ADAU1701);
        registers.insert(config::dsp::REG_SW_ID, 0x01);
        Self {
            registers,
            pointer: 0,
            drop_writes: 0,
            fail_reads: 0,
        }
    }

    fn write(&mut self, frame: &[u8]) {
        if frame.len() < 2 {
            return;
        }
        self.pointer = u16::from_be_bytes([frame[0], frame[1]]);
        if frame.len() == 2 {
            return;
        }
        if self.drop_writes > 0 {
            self.drop_writes -= 1;
            return;
        }
        for (i, &value) in frame[2..].iter().enumerate() {
            self.registers.insert(self.pointer.wrapping_add(i as u16), value);
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<(), ErrorKind> {
        if self.fail_reads > 0 {
            self.fail_reads -= 1;
            return Err(ErrorKind::Bus);
        }
        for (i, slot) in buf.iter_mut().enumerate() {
            let reg = self.pointer.wrapping_add(i as u16);
            *slot = self.registers.get(&reg).copied().unwrap_or(0);
        }
        Ok(())
    }
}

#[derive(Debug)]
struct BusState {
    eeprom_addr: u8,
    eeprom_present: bool,
    eeprom: SimEeprom,
    dsp: Option<(u8, SimDsp)>,
    others: Vec<u8>,
    write_protect: Option<MockPin>,
    log: Vec<BusOp>,
}

/// Simulated I2C bus with an EEPROM and optional peripherals
#[derive(Debug, Clone)]
pub struct MockBus {
    state: Rc<RefCell<BusState>>,
}

impl MockBus {
    /// Bus with a blank (all 0xFF) EEPROM of the given geometry
    #[must_use]
    pub fn new(geometry: EepromGeometry) -> Self {
        Self {
            state: Rc::new(RefCell::new(BusState {
                eeprom_addr: geometry.device_addr,
                eeprom_present: true,
                eeprom: SimEeprom::new(geometry.capacity as usize, usize::from(geometry.page_size)),
                dsp: None,
                others: Vec::new(),
                write_protect: None,
                log: Vec::new(),
            })),
        }
    }

    /// Bus with the default 32 KiB EEPROM
    #[must_use]
    pub fn with_default_eeprom() -> Self {
        Self::new(EepromGeometry::default())
    }

    /// Attach an ADAU1701 at `addr`
    #[must_use]
    pub fn with_dsp(self, addr: u8) -> Self {
        self.state.borrow_mut().dsp = Some((addr, SimDsp::new()));
        self
    }

    /// Add a device that only acknowledges its address
    #[must_use]
    pub fn with_device(self, addr: u8) -> Self {
        self.state.borrow_mut().others.push(addr);
        self
    }

    /// Remove the EEPROM from the bus
    #[must_use]
    pub fn without_eeprom(self) -> Self {
        self.state.borrow_mut().eeprom_present = false;
        self
    }

    /// Wire the EEPROM WP input to `pin` (high = protected)
    #[must_use]
    pub fn with_write_protect(self, pin: &MockPin) -> Self {
        self.state.borrow_mut().write_protect = Some(pin.clone());
        self
    }

    /// Address probes NACKed after every data write
    pub fn set_write_cycle_probes(&self, probes: u32) {
        self.state.borrow_mut().eeprom.busy_probes = probes;
    }

    /// Error kind reported by injected faults
    pub fn set_fault_kind(&self, kind: ErrorKind) {
        self.state.borrow_mut().eeprom.fault = kind;
    }

    /// Fail the next `count` EEPROM data writes
    pub fn fail_next_writes(&self, count: u32) {
        self.state.borrow_mut().eeprom.fail_writes = count;
    }

    /// Accept `count` more EEPROM data writes, then fail every one after
    pub fn fail_writes_after(&self, count: u32) {
        self.state.borrow_mut().eeprom.fail_writes_after = Some(count);
    }

    /// Fail the next `count` EEPROM reads
    pub fn fail_next_reads(&self, count: u32) {
        self.state.borrow_mut().eeprom.fail_reads = count;
    }

    /// Always read `value` at `address`
    pub fn corrupt_reads(&self, address: u32, value: u8) {
        self.state
            .borrow_mut()
            .eeprom
            .corrupt
            .insert(address as usize, (value, None));
    }

    /// Read `value` at `address` for the next `times` reads only
    pub fn corrupt_reads_times(&self, address: u32, value: u8, times: u32) {
        self.state
            .borrow_mut()
            .eeprom
            .corrupt
            .insert(address as usize, (value, Some(times)));
    }

    /// Drop the next `count` DSP register writes
    pub fn dsp_drop_writes(&self, count: u32) {
        if let Some((_, dsp)) = self.state.borrow_mut().dsp.as_mut() {
            dsp.drop_writes = count;
        }
    }

    /// Fail the next `count` DSP register reads with a bus error
    pub fn dsp_fail_reads(&self, count: u32) {
        if let Some((_, dsp)) = self.state.borrow_mut().dsp.as_mut() {
            dsp.fail_reads = count;
        }
    }

    /// Preset a DSP register
    pub fn set_dsp_register(&self, reg: u16, value: u8) {
        if let Some((_, dsp)) = self.state.borrow_mut().dsp.as_mut() {
            dsp.registers.insert(reg, value);
        }
    }

    /// Current DSP register value
    #[must_use]
    pub fn dsp_register(&self, reg: u16) -> Option<u8> {
        self.state
            .borrow()
            .dsp
            .as_ref()
            .and_then(|(_, dsp)| dsp.registers.get(&reg).copied())
    }

    /// Fill EEPROM contents directly
    pub fn load(&self, address: u32, data: &[u8]) {
        let mut state = self.state.borrow_mut();
        let start = address as usize;
        state.eeprom.memory[start..start + data.len()].copy_from_slice(data);
    }

    /// Copy of the EEPROM contents
    #[must_use]
    pub fn memory(&self) -> Vec<u8> {
        self.state.borrow().eeprom.memory.clone()
    }

    /// One EEPROM byte
    #[must_use]
    pub fn byte(&self, address: u32) -> u8 {
        self.state.borrow().eeprom.memory[address as usize]
    }

    /// Every transaction since the last [`clear_log`](Self::clear_log)
    #[must_use]
    pub fn transactions(&self) -> Vec<BusOp> {
        self.state.borrow().log.clone()
    }

    /// Number of transactions since the last clear
    #[must_use]
    pub fn transaction_count(&self) -> usize {
        self.state.borrow().log.len()
    }

    /// Data writes that reached the EEPROM
    #[must_use]
    pub fn page_writes(&self) -> Vec<PageWrite> {
        self.state.borrow().eeprom.page_writes.clone()
    }

    /// Forget recorded transactions and page writes
    pub fn clear_log(&self) {
        let mut state = self.state.borrow_mut();
        state.log.clear();
        state.eeprom.page_writes.clear();
    }
}

impl BusState {
    fn nack() -> ErrorKind {
        ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)
    }

    fn record(&mut self, address: u8, operations: &[Operation<'_>]) {
        let op = match operations {
            [Operation::Write(w), Operation::Read(r)] => BusOp::WriteRead {
                addr: address,
                write: w.to_vec(),
                read_len: r.len(),
            },
            [Operation::Read(r)] => BusOp::Read {
                addr: address,
                len: r.len(),
            },
            ops => BusOp::Write {
                addr: address,
                data: ops
                    .iter()
                    .filter_map(|op| match op {
                        Operation::Write(w) => Some(w.to_vec()),
                        Operation::Read(_) => None,
                    })
                    .flatten()
                    .collect(),
            },
        };
        self.log.push(op);
    }

    fn run_eeprom(&mut self, operations: &mut [Operation<'_>]) -> Result<(), ErrorKind> {
        if !self.eeprom_present {
            return Err(Self::nack());
        }
        if self.eeprom.busy_left > 0 {
            if self.eeprom.busy_left != u32::MAX {
                self.eeprom.busy_left -= 1;
            }
            return Err(Self::nack());
        }
        let protected = self.write_protect.as_ref().is_some_and(MockPin::is_high);
        for op in operations.iter_mut() {
            match op {
                Operation::Write(frame) => self.eeprom.write(frame, protected)?,
                Operation::Read(buf) => self.eeprom.read(buf)?,
            }
        }
        Ok(())
    }

    fn run_dsp(&mut self, operations: &mut [Operation<'_>]) -> Result<(), ErrorKind> {
        if let Some((_, dsp)) = self.dsp.as_mut() {
            for op in operations.iter_mut() {
                match op {
                    Operation::Write(frame) => dsp.write(frame),
                    Operation::Read(buf) => dsp.read(buf)?,
                }
            }
        }
        Ok(())
    }
}

impl ErrorType for MockBus {
    type Error = ErrorKind;
}

impl I2c for MockBus {
    fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        state.record(address, operations);

        if address == state.eeprom_addr {
            return state.run_eeprom(operations);
        }
        if state.dsp.as_ref().is_some_and(|(addr, _)| *addr == address) {
            return state.run_dsp(operations);
        }
        if state.others.contains(&address) {
            for op in operations.iter_mut() {
                if let Operation::Read(buf) = op {
                    buf.fill(0);
                }
            }
            return Ok(());
        }
        Err(BusState::nack())
    }
}

/// Recording output pin
#[derive(Debug, Clone, Default)]
pub struct MockPin {
    levels: Rc<RefCell<Vec<bool>>>,
}

impl MockPin {
    /// Pin that has never been driven (reads low)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current level
    #[must_use]
    pub fn is_high(&self) -> bool {
        self.levels.borrow().last().copied().unwrap_or(false)
    }

    /// Every level driven so far, oldest first
    #[must_use]
    pub fn history(&self) -> Vec<bool> {
        self.levels.borrow().clone()
    }
}

impl PinErrorType for MockPin {
    type Error = Infallible;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.levels.borrow_mut().push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.levels.borrow_mut().push(true);
        Ok(())
    }
}

/// Delay that returns immediately and counts requested time
#[derive(Debug, Clone, Default)]
pub struct NoopDelay {
    waited_ns: Rc<Cell<u64>>,
    calls: Rc<Cell<u32>>,
}

impl NoopDelay {
    /// New delay with zeroed counters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total requested delay in microseconds
    #[must_use]
    pub fn waited_us(&self) -> u64 {
        self.waited_ns.get() / 1_000
    }

    /// Number of delay calls
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.get()
    }
}

impl DelayNs for NoopDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.waited_ns.set(self.waited_ns.get() + u64::from(ns));
        self.calls.set(self.calls.get() + 1);
    }
}

/// Manually driven clock and memory meter
#[derive(Debug, Clone)]
pub struct MockSystem {
    now_ms: Rc<Cell<u64>>,
    free: Rc<Cell<usize>>,
}

impl MockSystem {
    /// Clock at zero with plenty of free memory
    #[must_use]
    pub fn new() -> Self {
        Self {
            now_ms: Rc::new(Cell::new(0)),
            free: Rc::new(Cell::new(64 * 1024)),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, ms: u64) {
        self.now_ms.set(self.now_ms.get() + ms);
    }

    /// Set the reported free memory
    pub fn set_free_memory(&self, bytes: usize) {
        self.free.set(bytes);
    }
}

impl Default for MockSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for MockSystem {
    fn now_ms(&self) -> u64 {
        self.now_ms.get()
    }

    fn free_memory(&self) -> usize {
        self.free.get()
    }
}
