//! GS-segment scratch space used by the `SYSCALL` fast path.
//!
//! `swapgs` switches the GS base between a user value (opaque to the kernel)
//! and this struct's address, so the syscall entry stub can stash the user
//! RSP/RIP/RFLAGS and load the kernel stack without touching any other
//! segment. Single-CPU: one static instance, not an array indexed by APIC id.

use core::sync::atomic::{AtomicU64, Ordering};

#[repr(C)]
pub struct GsContext {
    pub user_rsp: AtomicU64,
    pub kernel_rsp: AtomicU64,
    pub saved_rip: AtomicU64,
    pub saved_rflags: AtomicU64,
    pub user_cs: AtomicU64,
    pub user_ss: AtomicU64,
}

pub static GS_CONTEXT: GsContext = GsContext {
    user_rsp: AtomicU64::new(0),
    kernel_rsp: AtomicU64::new(0),
    saved_rip: AtomicU64::new(0),
    saved_rflags: AtomicU64::new(0),
    user_cs: AtomicU64::new(0),
    user_ss: AtomicU64::new(0),
};

/// Byte offset of `kernel_rsp` within `GsContext`, for the assembly stub.
pub const OFFSET_USER_RSP: usize = 0;
pub const OFFSET_KERNEL_RSP: usize = 8;
pub const OFFSET_SAVED_RIP: usize = 16;
pub const OFFSET_SAVED_RFLAGS: usize = 24;
pub const OFFSET_USER_CS: usize = 32;
pub const OFFSET_USER_SS: usize = 40;

/// Address of the static `GsContext`, written into `KERNEL_GS_BASE` so
/// `swapgs` loads it.
pub fn base_address() -> u64 {
    &GS_CONTEXT as *const GsContext as u64
}

/// Updates the kernel stack pointer loaded on syscall entry. Called by the
/// scheduler whenever it switches to a different thread's kernel stack.
pub fn set_kernel_rsp(rsp: u64) {
    GS_CONTEXT.kernel_rsp.store(rsp, Ordering::Relaxed);
}
