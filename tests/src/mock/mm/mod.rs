//! Mock replacement for the kernel's `mm` façade (`src/mm/mod.rs`):
//! `pmm`/`vmm` backed by the host heap and a plain map instead of a frame
//! bitmap and real page tables, `timer` backed by a settable counter instead
//! of the timer interrupt.

pub mod pmm;
pub mod timer;
pub mod vmm;
