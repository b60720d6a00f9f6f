//! Global Descriptor Table: a seven-slot layout — null, kernel code, kernel
//! data, user code, user data, and a 16-byte TSS slot.
//!
//! User data is placed 8 bytes before user code in the table so the
//! fast-`SYSRET` descriptor arithmetic (`CS = STAR[63:48]+16`,
//! `SS = STAR[63:48]+8`) lands on the right descriptors; this table is built
//! in that order rather than the code-before-data order a naive port would
//! reach for.

use lazy_static::lazy_static;
use x86_64::instructions::segmentation::{Segment, CS, DS, SS};
use x86_64::instructions::tables::load_tss;
use x86_64::structures::gdt::{Descriptor, GlobalDescriptorTable, SegmentSelector};
use x86_64::structures::tss::TaskStateSegment;
use x86_64::PrivilegeLevel;
use x86_64::VirtAddr;

use crate::config::KERNEL_STACK_SIZE;

/// IST slot used by the double-fault handler: the CPU switches to a known
/// good stack so a double fault caused by stack corruption can't cascade
/// into a triple fault.
pub const DOUBLE_FAULT_IST_INDEX: u16 = 0;
/// IST slot shared by exceptions that push an error code (#GP, #PF, ...).
pub const ERROR_CODE_IST_INDEX: u16 = 1;

const IST_STACK_SIZE: usize = KERNEL_STACK_SIZE;

#[repr(align(16))]
struct IstStack([u8; IST_STACK_SIZE]);
static mut DOUBLE_FAULT_STACK: IstStack = IstStack([0; IST_STACK_SIZE]);
static mut ERROR_CODE_STACK: IstStack = IstStack([0; IST_STACK_SIZE]);

/// The ring-0 stack pointer loaded into the TSS on every privilege-level
/// transition back to ring 0 (syscall return, interrupt return). The process
/// layer rewrites this whenever it switches to a new thread's kernel stack.
static mut TSS_RSP0: u64 = 0;

#[derive(Debug, Clone, Copy)]
pub struct Selectors {
    pub kernel_code: SegmentSelector,
    pub kernel_data: SegmentSelector,
    pub user_data: SegmentSelector,
    pub user_code: SegmentSelector,
    pub tss: SegmentSelector,
}

lazy_static! {
    static ref TSS: TaskStateSegment = {
        let mut tss = TaskStateSegment::new();
        tss.interrupt_stack_table[DOUBLE_FAULT_IST_INDEX as usize] = unsafe {
            let start = VirtAddr::from_ptr(core::ptr::addr_of!(DOUBLE_FAULT_STACK));
            start + IST_STACK_SIZE as u64
        };
        tss.interrupt_stack_table[ERROR_CODE_IST_INDEX as usize] = unsafe {
            let start = VirtAddr::from_ptr(core::ptr::addr_of!(ERROR_CODE_STACK));
            start + IST_STACK_SIZE as u64
        };
        tss
    };

    static ref GDT: (GlobalDescriptorTable, Selectors) = {
        let mut gdt = GlobalDescriptorTable::new();
        let kernel_code = gdt.append(Descriptor::kernel_code_segment());
        let kernel_data = gdt.append(Descriptor::kernel_data_segment());
        // User data MUST precede user code by exactly one descriptor (8 bytes)
        // for SYSRET's STAR-derived selector arithmetic.
        let user_data = gdt.append(Descriptor::user_data_segment());
        let user_code = gdt.append(Descriptor::user_code_segment());
        let tss = gdt.append(Descriptor::tss_segment(&TSS));
        (
            gdt,
            Selectors {
                kernel_code,
                kernel_data,
                user_data,
                user_code,
                tss,
            },
        )
    };
}

/// Loads the GDT, reloads the segment registers, then loads the task
/// register. Must run once, early in boot, before the IDT and before any
/// process ever runs.
pub fn init() {
    GDT.0.load();
    unsafe {
        CS::set_reg(GDT.1.kernel_code);
        SS::set_reg(GDT.1.kernel_data);
        DS::set_reg(GDT.1.kernel_data);
        load_tss(GDT.1.tss);
    }
    crate::kinfo!(
        "gdt: loaded (kernel_cs={:#x}, kernel_ss={:#x}, user_cs={:#x}, user_ss={:#x})",
        GDT.1.kernel_code.0,
        GDT.1.kernel_data.0,
        GDT.1.user_code.0,
        GDT.1.user_data.0
    );
}

pub fn selectors() -> Selectors {
    GDT.1
}

/// Sets the ring-0 stack pointer the CPU will load on the next privilege
/// transition into the kernel. The scheduler calls this on every context
/// switch so syscalls/interrupts taken from the new thread land on its own
/// kernel stack rather than the previous thread's.
pub fn set_kernel_stack(rsp0: u64) {
    unsafe {
        TSS_RSP0 = rsp0;
        let tss_ptr = &*TSS as *const TaskStateSegment as *mut TaskStateSegment;
        (*tss_ptr).privilege_stack_table[0] = VirtAddr::new(rsp0);
    }
}

pub fn kernel_stack() -> u64 {
    unsafe { TSS_RSP0 }
}

pub const RING3: PrivilegeLevel = PrivilegeLevel::Ring3;
