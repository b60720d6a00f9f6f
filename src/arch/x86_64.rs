//! Architecture entry points that don't belong to a narrower `arch` submodule.

/// Parks the CPU forever with interrupts disabled. Used for unrecoverable
/// boot failures and CPU-exception panics: the frame gets a diagnostic dump,
/// then the CPU halts for good.
pub fn halt_loop() -> ! {
    unsafe {
        crate::safety::cli();
    }
    loop {
        crate::safety::hlt();
    }
}
