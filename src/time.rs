//! Collection of time utilities for zmond
//!
//! Wall-clock time is read directly from the system. Cache expiry and
//! deadline math is done against a process-local monotonic clock so that
//! stepping the system clock -- something an NTP-collecting agent must
//! assume will happen -- cannot spuriously expire or immortalize entries.

use chrono::offset::Utc;
use std::thread;
use std::time::{Duration, Instant};

lazy_static! {
    static ref EPOCH: Instant = Instant::now();
}

/// Return the current wall-clock time in epoch seconds
pub fn now() -> i64 {
    Utc::now().timestamp()
}

/// Milliseconds elapsed since the process-local epoch. Monotonic.
pub fn monotonic_millis() -> u64 {
    let elapsed = EPOCH.elapsed();
    elapsed.as_secs() * 1_000 + u64::from(elapsed.subsec_nanos() / 1_000_000)
}

/// Back off a polling loop.
///
/// Sleeps `2^(attempts - 1)` milliseconds, saturating at 512 ms.
/// Attempt zero returns without sleeping, so a caller gets one free
/// spin before it starts paying for patience. The plugin executor
/// drives its child-reaping loop with this.
#[inline]
pub fn delay(attempts: u32) {
    if attempts == 0 {
        return;
    }
    let exponent = if attempts > 10 { 9 } else { attempts - 1 };
    thread::sleep(Duration::from_millis(1u64 << exponent));
}
