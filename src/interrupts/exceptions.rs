//! CPU exception handlers.
//!
//! There is no signal mechanism in the kernel and no per-process fault
//! recovery: every exception dumps the interrupt frame and halts. A real page-fault-driven demand-paging path would hook
//! `page_fault_handler` first; none exists here.

use x86_64::structures::idt::{InterruptStackFrame, PageFaultErrorCode};

use crate::{kerror, kpanic};

fn dump_and_halt(name: &str, stack_frame: &InterruptStackFrame) -> ! {
    kerror!(
        "EXCEPTION {}: rip={:#x} cs={:#x} rflags={:#x} rsp={:#x} ss={:#x}",
        name,
        stack_frame.instruction_pointer.as_u64(),
        stack_frame.code_segment.0,
        stack_frame.cpu_flags.bits(),
        stack_frame.stack_pointer.as_u64(),
        stack_frame.stack_segment.0,
    );
    crate::arch::halt_loop();
}

pub extern "x86-interrupt" fn breakpoint_handler(stack_frame: InterruptStackFrame) {
    kerror!(
        "EXCEPTION BREAKPOINT: rip={:#x} cs={:#x}",
        stack_frame.instruction_pointer.as_u64(),
        stack_frame.code_segment.0
    );
}

pub extern "x86-interrupt" fn page_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: PageFaultErrorCode,
) {
    use x86_64::registers::control::Cr2;
    let fault_addr = Cr2::read()
        .map(|a| a.as_u64())
        .unwrap_or(0);
    kerror!(
        "EXCEPTION PAGE FAULT: addr={:#x} error={:?} rip={:#x}",
        fault_addr,
        error_code,
        stack_frame.instruction_pointer.as_u64(),
    );
    dump_and_halt("PAGE FAULT", &stack_frame);
}

pub extern "x86-interrupt" fn general_protection_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) {
    kerror!("EXCEPTION GENERAL PROTECTION FAULT: error={:#x}", error_code);
    dump_and_halt("GENERAL PROTECTION FAULT", &stack_frame);
}

pub extern "x86-interrupt" fn divide_error_handler(stack_frame: InterruptStackFrame) {
    dump_and_halt("DIVIDE ERROR", &stack_frame);
}

pub extern "x86-interrupt" fn double_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) -> ! {
    kpanic!(
        "DOUBLE FAULT: code={:#x} rip={:#x} rsp={:#x} ss={:#x}",
        error_code,
        stack_frame.instruction_pointer.as_u64(),
        stack_frame.stack_pointer.as_u64(),
        stack_frame.stack_segment.0
    );
}

pub extern "x86-interrupt" fn segment_not_present_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) {
    kerror!("EXCEPTION SEGMENT NOT PRESENT: error={:#x}", error_code);
    dump_and_halt("SEGMENT NOT PRESENT", &stack_frame);
}

pub extern "x86-interrupt" fn invalid_tss_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) {
    kerror!("EXCEPTION INVALID TSS: error={:#x}", error_code);
    dump_and_halt("INVALID TSS", &stack_frame);
}

pub extern "x86-interrupt" fn stack_segment_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) {
    kerror!("EXCEPTION STACK SEGMENT FAULT: error={:#x}", error_code);
    dump_and_halt("STACK SEGMENT FAULT", &stack_frame);
}

pub extern "x86-interrupt" fn invalid_opcode_handler(stack_frame: InterruptStackFrame) {
    dump_and_halt("INVALID OPCODE", &stack_frame);
}
