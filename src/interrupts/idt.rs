//! IDT construction and the syscall MSR setup.

use core::sync::atomic::{AtomicBool, Ordering};

use lazy_static::lazy_static;
use x86_64::instructions::port::Port;
use x86_64::structures::idt::InterruptDescriptorTable;

use crate::arch::gdt;
use crate::interrupts::exceptions::*;
use crate::interrupts::handlers::*;
use crate::interrupts::syscall_asm::syscall_entry;
use crate::safety::x86::{rdmsr, wrmsr, MSR_IA32_FMASK, MSR_IA32_LSTAR, MSR_IA32_STAR};

static IDT_INITIALIZED: AtomicBool = AtomicBool::new(false);

lazy_static! {
    static ref IDT: InterruptDescriptorTable = {
        let mut idt = InterruptDescriptorTable::new();

        idt.breakpoint.set_handler_fn(breakpoint_handler);
        idt.divide_error.set_handler_fn(divide_error_handler);
        idt.invalid_opcode.set_handler_fn(invalid_opcode_handler);

        unsafe {
            idt.page_fault
                .set_handler_fn(page_fault_handler)
                .set_stack_index(gdt::ERROR_CODE_IST_INDEX);
            idt.general_protection_fault
                .set_handler_fn(general_protection_fault_handler)
                .set_stack_index(gdt::ERROR_CODE_IST_INDEX);
            idt.double_fault
                .set_handler_fn(double_fault_handler)
                .set_stack_index(gdt::DOUBLE_FAULT_IST_INDEX);
            idt.segment_not_present
                .set_handler_fn(segment_not_present_handler)
                .set_stack_index(gdt::ERROR_CODE_IST_INDEX);
            idt.invalid_tss
                .set_handler_fn(invalid_tss_handler)
                .set_stack_index(gdt::ERROR_CODE_IST_INDEX);
            idt.stack_segment_fault
                .set_handler_fn(stack_segment_fault_handler)
                .set_stack_index(gdt::ERROR_CODE_IST_INDEX);
        }

        idt[PIC_1_OFFSET as usize].set_handler_fn(timer_interrupt_handler);
        idt[(PIC_1_OFFSET + 1) as usize].set_handler_fn(spurious_irq1_handler);
        idt[(PIC_1_OFFSET + 2) as usize].set_handler_fn(spurious_irq2_handler);
        idt[(PIC_1_OFFSET + 3) as usize].set_handler_fn(spurious_irq3_handler);
        idt[(PIC_1_OFFSET + 4) as usize].set_handler_fn(spurious_irq4_handler);
        idt[(PIC_1_OFFSET + 5) as usize].set_handler_fn(spurious_irq5_handler);
        idt[(PIC_1_OFFSET + 6) as usize].set_handler_fn(spurious_irq6_handler);
        idt[(PIC_1_OFFSET + 7) as usize].set_handler_fn(spurious_irq7_handler);
        idt[PIC_2_OFFSET as usize].set_handler_fn(spurious_irq8_handler);
        idt[(PIC_2_OFFSET + 1) as usize].set_handler_fn(spurious_irq9_handler);
        idt[(PIC_2_OFFSET + 2) as usize].set_handler_fn(spurious_irq10_handler);
        idt[(PIC_2_OFFSET + 3) as usize].set_handler_fn(spurious_irq11_handler);
        idt[(PIC_2_OFFSET + 4) as usize].set_handler_fn(spurious_irq12_handler);
        idt[(PIC_2_OFFSET + 5) as usize].set_handler_fn(spurious_irq13_handler);
        idt[(PIC_2_OFFSET + 6) as usize].set_handler_fn(spurious_irq14_handler);
        idt[(PIC_2_OFFSET + 7) as usize].set_handler_fn(spurious_irq15_handler);

        idt
    };
}

/// Masks the PIC, remaps it to vectors 32-47, loads the IDT, unmasks the
/// timer line, then programs the `SYSCALL` MSRs. Must run once, after
/// `arch::init_gdt`.
pub fn init_interrupts() {
    x86_64::instructions::interrupts::disable();

    if IDT_INITIALIZED.swap(true, Ordering::SeqCst) {
        crate::kwarn!("init_interrupts: already initialized, skipping");
        return;
    }

    unsafe {
        let mut master = Port::<u8>::new(0x21);
        master.write(0xFFu8);
        let mut slave = Port::<u8>::new(0xA1);
        slave.write(0xFFu8);

        PICS.lock().initialize();
    }

    IDT.load();

    unsafe {
        let mut master = Port::<u8>::new(0x21);
        master.write(0xFEu8); // unmask timer (IRQ0) only
        let mut slave = Port::<u8>::new(0xA1);
        slave.write(0xFFu8);
    }

    setup_syscall();

    crate::kinfo!("interrupts: IDT loaded, PIC remapped to 32-47, timer unmasked");
}

pub fn is_idt_initialized() -> bool {
    IDT_INITIALIZED.load(Ordering::SeqCst)
}

/// Masks both legacy PIC lines entirely. Called once the local APIC has
/// taken over vector 32 as the periodic timer source, so the PIC can no
/// longer double-fire it.
pub fn mask_legacy_pic() {
    unsafe {
        let mut master = Port::<u8>::new(0x21);
        master.write(0xFFu8);
        let mut slave = Port::<u8>::new(0xA1);
        slave.write(0xFFu8);
    }
    crate::kinfo!("interrupts: legacy PIC fully masked, LAPIC timer is authoritative");
}

/// Programs `STAR`/`LSTAR`/`FMASK` and sets `EFER.SCE` so `SYSCALL` traps to
/// `syscall_entry`. Requires the GDT's user/kernel descriptor
/// layout (null, kcode, kdata, udata, ucode, tss — see `arch::gdt`).
fn setup_syscall() {
    if !cpu_supports_syscall() {
        crate::kwarn!("CPU lacks SYSCALL/SYSRET support; syscalls unavailable");
        return;
    }

    let selectors = gdt::selectors();
    let kernel_cs = selectors.kernel_code.0 as u64;
    let user_cs_base = selectors.user_data.0 as u64; // SYSRET adds +8/+16 from this base

    // STAR[47:32] = kernel CS (SS implied as CS+8).
    // STAR[63:48] = base for user segments: SYSRET sets CS = base+16, SS = base+8.
    let star_value = ((kernel_cs & !0x7) << 32) | ((user_cs_base & !0x7) << 48);

    unsafe {
        wrmsr(
            crate::safety::x86::MSR_IA32_KERNEL_GS_BASE,
            super::gs_base_address(),
        );
        wrmsr(MSR_IA32_STAR, star_value);
        wrmsr(MSR_IA32_LSTAR, syscall_entry as u64);
        wrmsr(MSR_IA32_FMASK, 0x200); // clear IF on entry

        let efer = rdmsr(0xC000_0080);
        wrmsr(0xC000_0080, efer | 1); // EFER.SCE
    }

    crate::kinfo!("interrupts: SYSCALL MSRs programmed (star={:#x})", star_value);
}

fn cpu_supports_syscall() -> bool {
    let (_, _, _, edx) = crate::safety::x86::cpuid(0x8000_0001);
    (edx & (1 << 11)) != 0
}
