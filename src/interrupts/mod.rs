//! Interrupt handling: the IDT, CPU exception handlers, PIC-routed IRQ
//! handlers, the GS-segment syscall scratch space, and the `SYSCALL` entry
//! stub.

pub mod exceptions;
pub mod gs_context;
pub mod handlers;
pub mod idt;
pub mod syscall_asm;

pub use gs_context::{base_address as gs_base_address, set_kernel_rsp};
pub use handlers::{PIC_1_OFFSET, PIC_2_OFFSET, PICS};
pub use idt::{init_interrupts, is_idt_initialized, mask_legacy_pic};
