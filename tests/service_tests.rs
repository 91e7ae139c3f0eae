//! Service Facade Tests
//!
//! The boolean/byte surface exposed to outer layers, plus the activity
//! log text.

mod common;

use eeprom_programmer::hal::mock::MockBus;
use eeprom_programmer::types::Progress;
use eeprom_programmer::ProgrammerConfig;
use embassy_futures::join::join;
use embassy_futures::{block_on, yield_now};
use pretty_assertions::assert_eq;

use common::{pattern, Rig, SMALL};

// ============================================================================
// Detection and Scanning
// ============================================================================

#[test]
fn test_detect() {
    let rig = Rig::new();
    let mut svc = rig.service();
    assert!(svc.detect());
    assert!(svc.activity_log_text().contains("EEPROM 0x50 detected"));
}

#[test]
fn test_detect_missing_device() {
    let rig = Rig::with_bus(MockBus::with_default_eeprom().without_eeprom(), ProgrammerConfig::default());
    let mut svc = rig.service();
    assert!(!svc.detect());
    assert!(!block_on(svc.write(0, &[1])));
    assert_eq!(svc.read(0), 0xFF);
}

#[test]
fn test_scan_bus() {
    let bus = MockBus::with_default_eeprom().with_dsp(0x34);
    let rig = Rig::with_bus(bus, ProgrammerConfig::default());
    let mut svc = rig.service();

    let found: Vec<u8> = svc.scan_bus().iter().map(|a| a.addr()).collect();
    assert_eq!(found, vec![0x34, 0x50]);
}

// ============================================================================
// Core Operations
// ============================================================================

#[test]
fn test_write_and_read() {
    let rig = Rig::new();
    let mut svc = rig.service();
    assert!(block_on(svc.write(0x100, &[0xDE, 0xAD])));
    assert_eq!(svc.read(0x100), 0xDE);
    assert_eq!(svc.read(0x101), 0xAD);
}

#[test]
fn test_write_out_of_range() {
    let rig = Rig::new();
    let mut svc = rig.service();
    assert!(!block_on(svc.write(32_768, &[1])));
    assert!(svc.activity_log_text().contains("write rejected"));
}

#[test]
fn test_erase() {
    let rig = Rig::with_geometry(SMALL);
    rig.bus.load(0, &pattern(256));
    let mut svc = rig.service();

    assert!(block_on(svc.erase()));
    assert!(rig.bus.memory().iter().all(|&b| b == 0xFF));
    assert_eq!(svc.progress().bytes_written, 256);
}

#[test]
fn test_erase_failure() {
    let rig = Rig::with_geometry(SMALL);
    rig.bus.fail_writes_after(0);
    let mut svc = rig.service();
    assert!(!block_on(svc.erase()));
    assert!(!svc.progress().in_progress);
}

#[test]
fn test_verification_toggle() {
    let rig = Rig::new();
    let mut svc = rig.service();
    assert!(!svc.verification());
    svc.set_verification(true);
    assert!(svc.verification());

    rig.bus.corrupt_reads(2, 0x00);
    assert!(!block_on(svc.write(0, &[0x77; 4])));
    svc.set_verification(false);
    assert!(block_on(svc.write(0, &[0x77; 4])));
}

#[test]
fn test_write_protect_toggle() {
    let rig = Rig::new();
    let mut svc = rig.service();
    svc.set_write_protect(false);
    assert!(!rig.wp.is_high());
    svc.set_write_protect(true);
    assert!(rig.wp.is_high());
}

// ============================================================================
// Inspection
// ============================================================================

#[test]
fn test_read_range_and_verify() {
    let rig = Rig::new();
    let mut svc = rig.service();
    let data = pattern(40);
    assert!(block_on(svc.write(500, &data)));

    let mut buf = [0u8; 40];
    block_on(svc.read_range(500, &mut buf)).unwrap();
    assert_eq!(&buf[..], &data[..]);
    assert!(block_on(svc.verify_range(500, &data)).unwrap().passed());
}

#[test]
fn test_dump() {
    let rig = Rig::with_geometry(SMALL);
    let mut svc = rig.service();
    let mut total = 0usize;
    let sent = block_on(svc.dump(|_, block| total += block.len())).unwrap();
    assert_eq!(sent, 256);
    assert_eq!(total, 256);
}

#[test]
fn test_diagnostics() {
    let rig = Rig::new();
    let mut svc = rig.service();
    assert!(block_on(svc.test_write_byte(10, 0x3C)));
    let report = block_on(svc.stress_test(5));
    assert_eq!(report.tests_run, 5);
    assert_eq!(report.passed, 5);
}

// ============================================================================
// DSP
// ============================================================================

#[test]
fn test_dsp_control() {
    let bus = MockBus::with_default_eeprom().with_dsp(0x34);
    let rig = Rig::with_bus(bus, ProgrammerConfig::default());
    let mut svc = rig.service();

    assert!(svc.detect_dsp());
    assert!(block_on(svc.set_dsp_run_state(false)));
    assert!(!svc.dsp_status().unwrap().core_running());
    assert!(block_on(svc.dsp_soft_reset()));
    assert!(svc.dsp_status().unwrap().core_running());
}

#[test]
fn test_dsp_missing() {
    let rig = Rig::new();
    let mut svc = rig.service();
    assert!(!svc.detect_dsp());
    assert!(!block_on(svc.set_dsp_run_state(true)));
    assert_eq!(svc.dsp_status(), None);
    assert!(!block_on(svc.dsp_soft_reset()));
}

// ============================================================================
// Status While Busy
// ============================================================================

#[test]
fn test_status_readable_during_upload_chunk() {
    let rig = Rig::new();
    let mut svc = rig.service();
    let status = svc.state();
    let data = pattern(64);
    svc.begin_upload("fw.bin", 64);

    let (accepted, (mid, log)) = block_on(join(svc.feed_upload_chunk(&data), async {
        yield_now().await;
        yield_now().await;
        let mut log = String::new();
        status.render_activity_log(&mut log).unwrap();
        (status.progress(), log)
    }));

    assert!(accepted);
    assert_eq!(
        mid,
        Progress {
            bytes_written: 32,
            bytes_total: 64,
            in_progress: true
        }
    );
    assert!(log.contains("chunk 0x0000: 32 bytes"));
    assert!(!log.contains("chunk 0x0020"));
    assert_eq!(status.progress().bytes_written, 64);
}

#[test]
fn test_verification_flag_shared_with_status_readers() {
    let rig = Rig::new();
    let mut svc = rig.service();
    let status = svc.state();
    svc.set_verification(true);
    assert!(status.verify_enabled());
    assert!(rig.state.verify_enabled());
}

// ============================================================================
// Activity Log
// ============================================================================

#[test]
fn test_activity_log_oldest_first() {
    let rig = Rig::new();
    let mut svc = rig.service();
    rig.system.advance(5);
    svc.set_verification(true);
    rig.system.advance(5);
    svc.set_write_protect(false);

    let text = svc.activity_log_text();
    let lines: Vec<&str> = text.lines().collect();
    assert!(lines[0].starts_with("[0] programmer ready"));
    assert_eq!(lines[lines.len() - 2], "[5] verification on");
    assert_eq!(lines[lines.len() - 1], "[10] write protect disabled");
    assert!(text.ends_with('\n'));
}

#[test]
fn test_activity_log_is_bounded() {
    let rig = Rig::new();
    let mut svc = rig.service();
    for _ in 0..100 {
        svc.set_write_protect(true);
    }

    let text = svc.activity_log_text();
    assert_eq!(text.lines().count(), 64);
    assert!(!text.contains("programmer ready"));
}

#[test]
fn test_activity_log_into_fixed_buffer() {
    let rig = Rig::new();
    let svc = rig.service();
    let mut out: heapless::String<256> = heapless::String::new();
    svc.activity_log(&mut out).unwrap();
    assert!(out.contains("programmer ready"));
}
