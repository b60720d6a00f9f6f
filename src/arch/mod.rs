//! Architecture-specific code: GDT/TSS, local APIC, and CPU entry points.

pub mod gdt;
pub mod lapic;
pub mod x86_64;

pub use x86_64::halt_loop;

pub use gdt::{init as init_gdt, kernel_stack, selectors, set_kernel_stack, Selectors, RING3};

pub use lapic::{
    bsp_apic_id, init as init_lapic, is_ready as lapic_is_ready, send_eoi, send_init_deassert_ipi,
    send_init_ipi, send_ipi, send_ipi_all_except_self, send_ipi_self, send_startup_ipi,
    TIMER_VECTOR,
};
