//! Programmer Tests
//!
//! Write/verify orchestration, erase, inspection operations and
//! write-protect handling against the simulated EEPROM.

mod common;

use eeprom_programmer::config::VERIFY_YIELD_INTERVAL;
use eeprom_programmer::error::Error;
use eeprom_programmer::hal::gpio::WpState;
use eeprom_programmer::hal::system::System;
use eeprom_programmer::types::{Mismatch, Progress};
use embassy_futures::join::join;
use embassy_futures::select::{select, Either};
use embassy_futures::{block_on, yield_now};
use pretty_assertions::assert_eq;

use common::{pattern, run_counting_yields, Rig, SMALL};

// ============================================================================
// Accessors
// ============================================================================

#[test]
fn test_system_accessor_shares_injected_services() {
    let rig = Rig::new();
    let p = rig.programmer();

    rig.system.advance(1_500);
    rig.system.set_free_memory(2_048);

    assert_eq!(p.system().now_ms(), 1_500);
    assert_eq!(p.system().free_memory(), 2_048);
}

// ============================================================================
// Write and Read Back
// ============================================================================

#[test]
fn test_write_then_read_back_with_verification() {
    let rig = Rig::new();
    let mut p = rig.programmer();
    p.set_verification(true);
    let data = pattern(300);

    block_on(p.write(1000, &data)).unwrap();

    for (i, &b) in data.iter().enumerate() {
        assert_eq!(p.read(1000 + i as u32), b, "byte {i}");
    }
}

#[test]
fn test_write_updates_progress() {
    let rig = Rig::new();
    let mut p = rig.programmer();
    block_on(p.write(0, &pattern(100))).unwrap();

    assert_eq!(
        p.progress(),
        Progress {
            bytes_written: 100,
            bytes_total: 100,
            in_progress: false
        }
    );
    assert_eq!(p.progress().percent(), 100);
}

#[test]
fn test_empty_write_is_noop() {
    let rig = Rig::new();
    let mut p = rig.programmer();
    block_on(p.write(10, &[])).unwrap();
    assert_eq!(rig.bus.transaction_count(), 0);
}

#[test]
fn test_write_splits_into_chunks_in_log() {
    let rig = Rig::new();
    let mut p = rig.programmer();
    block_on(p.write(0, &pattern(70))).unwrap();

    let chunks = p.state().with(|s| s.log.entries().filter(|l| l.contains("chunk")).count());
    assert_eq!(chunks, 3);
}

// ============================================================================
// Range Edges
// ============================================================================

#[test]
fn test_last_byte_accepted() {
    let rig = Rig::new();
    let mut p = rig.programmer();
    block_on(p.write(32_767, &[0x42])).unwrap();
    assert_eq!(rig.bus.byte(32_767), 0x42);
}

#[test]
fn test_overflow_rejected_without_bus_traffic() {
    let rig = Rig::new();
    let mut p = rig.programmer();
    let result = block_on(p.write(32_767, &[1, 2]));

    assert_eq!(
        result,
        Err(Error::Range {
            address: 32_767,
            len: 2,
            capacity: 32_768
        })
    );
    assert_eq!(rig.bus.transaction_count(), 0);
    assert!(rig.wp.is_high());
}

#[test]
fn test_read_out_of_range_is_erased_value() {
    let rig = Rig::new();
    let mut p = rig.programmer();
    assert_eq!(p.read(40_000), 0xFF);
}

#[test]
fn test_read_bus_failure_is_erased_value() {
    let rig = Rig::new();
    rig.bus.load(5, &[0x12]);
    rig.bus.fail_next_reads(1);
    let mut p = rig.programmer();
    assert_eq!(p.read(5), 0xFF);
    assert_eq!(p.read(5), 0x12);
}

// ============================================================================
// Verification
// ============================================================================

#[test]
fn test_corrupt_read_back_fails_when_verifying() {
    let rig = Rig::new();
    rig.bus.corrupt_reads(5, 0x00);
    let mut p = rig.programmer();
    p.set_verification(true);

    let result = block_on(p.write(0, &[0x11; 8]));
    assert_eq!(
        result,
        Err(Error::Verification {
            address: 5,
            expected: 0x11,
            actual: 0x00
        })
    );
}

#[test]
fn test_corrupt_read_back_ignored_without_verification() {
    let rig = Rig::new();
    rig.bus.corrupt_reads(5, 0x00);
    let mut p = rig.programmer();
    assert!(!p.verification());

    block_on(p.write(0, &[0x11; 8])).unwrap();
    assert_eq!(rig.bus.byte(5), 0x11);
}

#[test]
fn test_single_glitch_recovered_by_reread() {
    let rig = Rig::new();
    rig.bus.corrupt_reads_times(3, 0xEE, 1);
    let mut p = rig.programmer();
    p.set_verification(true);
    block_on(p.write(0, &[0x22; 8])).unwrap();
}

#[test]
fn test_verification_failure_stops_later_chunks() {
    let rig = Rig::new();
    rig.bus.corrupt_reads(40, 0x00);
    let mut p = rig.programmer();
    p.set_verification(true);

    assert!(block_on(p.write(0, &[0x33; 96])).is_err());
    assert_eq!(rig.bus.byte(31), 0x33);
    assert_eq!(rig.bus.byte(64), 0xFF);
    assert_eq!(p.progress().bytes_written, 32);
}

// ============================================================================
// Write Protect
// ============================================================================

#[test]
fn test_write_protect_asserted_at_start() {
    let rig = Rig::new();
    let p = rig.programmer();
    assert_eq!(p.write_protect(), WpState::Protected);
    assert!(rig.wp.is_high());
}

#[test]
fn test_write_protect_released_and_restored() {
    let rig = Rig::new();
    let mut p = rig.programmer();
    block_on(p.write(0, &[1, 2, 3])).unwrap();

    assert!(rig.wp.history().contains(&false));
    assert!(rig.wp.is_high());
    assert_eq!(rig.bus.byte(0), 1);
}

#[test]
fn test_write_protect_restored_after_failure() {
    let rig = Rig::new();
    rig.bus.fail_writes_after(0);
    let mut p = rig.programmer();

    assert!(block_on(p.write(0, &[1, 2, 3])).is_err());
    assert!(rig.wp.is_high());
}

#[test]
fn test_manual_unprotect_survives_write() {
    let rig = Rig::new();
    let mut p = rig.programmer();
    p.set_write_protect(false);
    block_on(p.write(0, &[9])).unwrap();

    assert_eq!(p.write_protect(), WpState::Writable);
    assert!(!rig.wp.is_high());
}

#[test]
fn test_dropped_write_restores_protection() {
    let rig = Rig::new();
    let mut p = rig.programmer();
    let data = pattern(100);

    // The write suspends after each transaction; the bare yield wins the
    // second round and the write future is dropped mid-flight.
    let outcome = block_on(select(p.write(0, &data), yield_now()));

    assert!(matches!(outcome, Either::Second(())));
    assert!(rig.wp.is_high());
    assert!(!rig.state.progress().in_progress);
    assert_eq!(rig.bus.byte(0), data[0]);
    assert_eq!(rig.bus.byte(99), 0xFF);
}

// ============================================================================
// Erase
// ============================================================================

#[test]
fn test_erase_fills_device() {
    let rig = Rig::new();
    rig.bus.load(0, &[0u8; 512]);
    rig.bus.load(32_000, &[0x55; 768]);
    let mut p = rig.programmer();

    block_on(p.erase()).unwrap();

    assert!(rig.bus.memory().iter().all(|&b| b == 0xFF));
    assert_eq!(p.read(123), 0xFF);
    assert_eq!(
        p.progress(),
        Progress {
            bytes_written: 32_768,
            bytes_total: 32_768,
            in_progress: false
        }
    );
    assert!(rig.wp.is_high());
}

#[test]
fn test_erase_failure_is_partial() {
    let rig = Rig::with_geometry(SMALL);
    rig.bus.load(0, &[0u8; 256]);
    rig.bus.fail_writes_after(4);
    let mut p = rig.programmer();

    assert!(block_on(p.erase()).is_err());
    let progress = p.progress();
    assert!(!progress.in_progress);
    assert!(progress.bytes_written < 256);
    assert_eq!(rig.bus.byte(255), 0x00);
    assert!(p.state().with(|s| s.log.entries().any(|l| l.contains("erase failed"))));
}

// ============================================================================
// Inspection
// ============================================================================

#[test]
fn test_read_range() {
    let rig = Rig::new();
    let data = pattern(50);
    rig.bus.load(200, &data);
    let mut p = rig.programmer();

    let mut buf = [0u8; 50];
    block_on(p.read_range(200, &mut buf)).unwrap();
    assert_eq!(&buf[..], &data[..]);
}

#[test]
fn test_read_range_rejects_overflow() {
    let rig = Rig::new();
    let mut p = rig.programmer();
    let mut buf = [0u8; 4];
    assert!(matches!(block_on(p.read_range(32_766, &mut buf)), Err(Error::Range { .. })));
}

#[test]
fn test_verify_range_reports_first_mismatches() {
    let rig = Rig::new();
    let expected = pattern(40);
    let mut stored = expected.clone();
    for i in [3, 9, 20, 33] {
        stored[i] ^= 0xFF;
    }
    rig.bus.load(0, &stored);
    let mut p = rig.programmer();

    let report = block_on(p.verify_range(0, &expected)).unwrap();

    assert_eq!(report.bytes_checked, 40);
    assert_eq!(report.errors, 4);
    assert!(!report.passed());
    assert_eq!(report.mismatches.len(), 3);
    assert_eq!(
        report.mismatches[0],
        Mismatch {
            address: 3,
            expected: expected[3],
            actual: stored[3]
        }
    );
}

#[test]
fn test_verify_range_clean() {
    let rig = Rig::new();
    rig.bus.load(100, &[1, 2, 3]);
    let mut p = rig.programmer();
    let report = block_on(p.verify_range(100, &[1, 2, 3])).unwrap();
    assert!(report.passed());
    assert!(report.mismatches.is_empty());
}

#[test]
fn test_dump_streams_whole_device() {
    let rig = Rig::with_geometry(SMALL);
    let data = pattern(256);
    rig.bus.load(0, &data);
    let mut p = rig.programmer();

    let mut image = Vec::new();
    let mut blocks = Vec::new();
    let total = block_on(p.dump(|addr, block| {
        blocks.push(addr);
        image.extend_from_slice(block);
    }))
    .unwrap();

    assert_eq!(total, 256);
    assert_eq!(image, data);
    assert_eq!(blocks, vec![0, 64, 128, 192]);
}

// ============================================================================
// Cooperative Scheduling
// ============================================================================

#[test]
fn test_progress_visible_while_erase_runs() {
    let rig = Rig::with_geometry(SMALL);
    let mut p = rig.programmer();
    let status = &rig.state;

    let (result, seen) = block_on(join(p.erase(), async {
        let mut seen = Vec::new();
        for _ in 0..8 {
            yield_now().await;
            seen.push(status.progress());
        }
        seen
    }));

    result.unwrap();
    assert_eq!(seen.len(), 8);
    assert!(seen.iter().all(|s| s.in_progress && s.bytes_total == 256));
    assert!(seen.iter().any(|s| s.bytes_written > 0 && s.bytes_written < 256));
    assert_eq!(
        status.progress(),
        Progress {
            bytes_written: 256,
            bytes_total: 256,
            in_progress: false
        }
    );
}

#[test]
fn test_activity_log_readable_mid_write() {
    let rig = Rig::new();
    let mut p = rig.programmer();
    let status = &rig.state;

    let (result, started) = block_on(join(p.write(0, &pattern(64)), async {
        yield_now().await;
        status.with(|s| s.log.entries().any(|l| l.contains("write 64 bytes at 0x0000")))
    }));

    result.unwrap();
    assert!(started);
}

#[test]
fn test_dump_yields_every_eight_bytes() {
    let rig = Rig::with_geometry(SMALL);
    let mut p = rig.programmer();

    let (total, yields) = run_counting_yields(p.dump(|_, _| {}));

    assert_eq!(total.unwrap(), 256);
    assert!(yields >= 256 / VERIFY_YIELD_INTERVAL, "{yields} yields for 256 bytes");
}

#[test]
fn test_verify_range_yields_every_eight_bytes() {
    let rig = Rig::new();
    let data = pattern(100);
    rig.bus.load(0, &data);
    let mut p = rig.programmer();

    let (report, yields) = run_counting_yields(p.verify_range(0, &data));

    assert!(report.unwrap().passed());
    assert!(yields >= 100 / VERIFY_YIELD_INTERVAL, "{yields} yields for 100 bytes");
}

#[test]
fn test_write_yields_per_transaction_and_verified_bytes() {
    let rig = Rig::new();
    let mut p = rig.programmer();
    p.set_verification(true);

    let (result, yields) = run_counting_yields(p.write(0, &pattern(96)));

    result.unwrap();
    let transactions = rig.bus.page_writes().len();
    assert_eq!(transactions, 6);
    assert!(
        yields >= transactions + 96 / VERIFY_YIELD_INTERVAL,
        "{yields} yields for {transactions} transactions"
    );
}

#[test]
fn test_unverified_write_yields_per_transaction() {
    let rig = Rig::new();
    let mut p = rig.programmer();

    let (result, yields) = run_counting_yields(p.write(10, &pattern(200)));

    result.unwrap();
    assert!(yields >= rig.bus.page_writes().len());
}

// ============================================================================
// Diagnostics
// ============================================================================

#[test]
fn test_test_write_byte() {
    let rig = Rig::new();
    let mut p = rig.programmer();
    assert!(block_on(p.test_write_byte(77, 0xA5)));
    assert_eq!(rig.bus.byte(77), 0xA5);
    assert!(!block_on(p.test_write_byte(32_768, 0xA5)));
    assert!(rig.wp.is_high());
}

#[test]
fn test_stress_test_is_capped() {
    let rig = Rig::new();
    let mut p = rig.programmer();
    let report = block_on(p.stress_test(150));

    assert_eq!(report.tests_run, 100);
    assert_eq!(report.passed, 100);
    assert_eq!(report.failed, 0);
    assert_eq!(report.success_rate(), 100);
    assert_eq!(rig.bus.byte(32), 23);
}

#[test]
fn test_stress_test_counts_failures() {
    let rig = Rig::new();
    rig.bus.fail_writes_after(10);
    let mut p = rig.programmer();
    let report = block_on(p.stress_test(20));

    assert_eq!(report.tests_run, 20);
    assert_eq!(report.passed, 10);
    assert_eq!(report.failed, 10);
    assert_eq!(report.success_rate(), 50);
}

// ============================================================================
// Activity Log
// ============================================================================

#[test]
fn test_retries_are_logged() {
    let rig = Rig::new();
    rig.bus.fail_next_writes(1);
    let mut p = rig.programmer();
    block_on(p.write(0, &[1])).unwrap();

    assert!(p.state().with(|s| s.log.entries().any(|l| l.contains("retry 1 at 0x0000"))));
}

#[test]
fn test_log_lines_carry_timestamp() {
    let rig = Rig::new();
    let mut p = rig.programmer();
    rig.system.advance(1234);
    p.set_verification(true);

    assert_eq!(
        p.state().with(|s| s.log.latest().map(str::to_owned)),
        Some("[1234] verification on".to_owned())
    );
}
