//! Stand-in for `mm::timer`: a settable millisecond counter instead of one
//! driven by the timer interrupt, so DHCP's retry/renewal timing can be
//! exercised deterministically.

use std::sync::atomic::{AtomicU64, Ordering};

static TICKS_MS: AtomicU64 = AtomicU64::new(0);

pub fn init() {
    TICKS_MS.store(0, Ordering::SeqCst);
}

pub fn tick(elapsed_ms: u64) {
    TICKS_MS.fetch_add(elapsed_ms, Ordering::Relaxed);
}

pub fn now_ms() -> u64 {
    TICKS_MS.load(Ordering::Relaxed)
}

/// Test-only: pins the clock to an absolute value.
pub fn set_now_ms(ms: u64) {
    TICKS_MS.store(ms, Ordering::SeqCst);
}

/// Test-only: advances the clock by `ms` and returns the new value.
pub fn advance_ms(ms: u64) -> u64 {
    TICKS_MS.fetch_add(ms, Ordering::SeqCst) + ms
}
