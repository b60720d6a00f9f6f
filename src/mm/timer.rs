//! Monotonic millisecond tick counter.
//!
//! Driven by whichever periodic source is wired up (legacy PIC IRQ0 or the
//! LAPIC timer — see `interrupts::handlers::timer_interrupt_handler`). The
//! tick unit is fixed to milliseconds everywhere in this kernel
//! (`config::TICK_UNIT_MS`), including the DHCP client's timeouts.

use core::sync::atomic::{AtomicU64, Ordering};

static TICKS_MS: AtomicU64 = AtomicU64::new(0);

pub fn init() {
    TICKS_MS.store(0, Ordering::SeqCst);
}

/// Advances the tick counter. Called once per timer interrupt.
pub fn tick(elapsed_ms: u64) {
    TICKS_MS.fetch_add(elapsed_ms, Ordering::Relaxed);
}

/// Milliseconds since `init()` ran.
pub fn now_ms() -> u64 {
    TICKS_MS.load(Ordering::Relaxed)
}

/// Busy-waits for approximately `ms` milliseconds by polling the tick
/// counter. Only safe to call with interrupts enabled, since the counter
/// only advances from the timer interrupt handler.
pub fn busy_sleep_ms(ms: u64) {
    let deadline = now_ms().saturating_add(ms);
    while now_ms() < deadline {
        crate::safety::x86::pause();
    }
}
