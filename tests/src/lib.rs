//! Kernel unit/integration tests, run under `std` against a hardware mock
//! layer (`mock`) instead of real x86_64 state.
//!
//! `build.rs` copies a scoped subset of `../src` into `build/kernel_src` and
//! rewrites it to link `std`'s `alloc` instead of `extern crate alloc`; the
//! modules below pull that preprocessed source in via `#[path]` so it keeps
//! its original module layout (`fs::vfs`, `net::dhcp`, ...) and its original
//! `crate::`-qualified references resolve against this crate's root instead
//! of the kernel's.
//!
//! `process`/`scheduler` are hand-written shims mirroring the kernel's own
//! `process`/`scheduler` re-export surface: `process::types`, `process::loader`
//! and `scheduler::ready_queue` have no x86_64 dependency beyond the
//! data-only `PageTableFlags` bitflags, so they're copied and run against
//! the `mm` mock below; the rest of `process`/`scheduler` (the context
//! switch, the PCB table) does need real hardware and stays out of scope.

pub mod mock;

#[path = "../build/kernel_src/config.rs"]
pub mod config;

#[path = "../build/kernel_src/fs/mod.rs"]
pub mod fs;

#[path = "../build/kernel_src/net/mod.rs"]
pub mod net;

pub mod process {
    #[path = "../build/kernel_src/process/types.rs"]
    mod types;
    #[path = "../build/kernel_src/process/loader.rs"]
    pub mod loader;

    pub use types::{
        empty_process_slot, Children, Context, Pid, Process, ProcessFlags, ProcessState,
        DEFAULT_KERNEL_STACK_SIZE, PROCESS_TABLE_LEN,
    };

    pub const IDLE_PID: Pid = 0;
}

pub mod scheduler {
    #[path = "../build/kernel_src/scheduler/ready_queue.rs"]
    pub mod ready_queue;
}

/// Stands in for the kernel's own `mm` façade: `pmm`/`vmm` backed by the host
/// heap and a `HashMap`, `timer` backed by a settable counter instead of the
/// real tick interrupt. Grounded in the kernel's `src/mm` module surface
/// (`pmm::alloc_page`, `vmm::map_page`/`translate`, `timer::now_ms`) so
/// `process::loader`, copied unmodified, compiles and runs against it.
pub mod mm {
    pub use crate::mock::mm::{pmm, timer, vmm};
}

#[macro_export]
macro_rules! klog {
    ($level:expr, $($arg:tt)*) => {{
        let _ = $level;
        eprintln!($($arg)*);
    }};
}

#[macro_export]
macro_rules! kfatal {
    ($($arg:tt)*) => {{ eprintln!("[FATAL] {}", format!($($arg)*)); }};
}

#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => {{ eprintln!("[ERROR] {}", format!($($arg)*)); }};
}

#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => {{ eprintln!("[WARN] {}", format!($($arg)*)); }};
}

#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => {{ eprintln!("[INFO] {}", format!($($arg)*)); }};
}

#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => {{ eprintln!("[DEBUG] {}", format!($($arg)*)); }};
}

#[macro_export]
macro_rules! ktrace {
    ($($arg:tt)*) => {{ eprintln!("[TRACE] {}", format!($($arg)*)); }};
}

#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => {{ eprint!($($arg)*); }};
}

#[macro_export]
macro_rules! serial_println {
    () => { eprintln!() };
    ($($arg:tt)*) => {{ eprintln!($($arg)*); }};
}

#[cfg(test)]
mod elf_loader_tests;
#[cfg(test)]
mod vfs_tests;
#[cfg(test)]
mod udp_tests;
#[cfg(test)]
mod dhcp_tests;
