//! Assembly entry point for the fast `SYSCALL` path.
//!
//! On `SYSCALL`, the CPU loads CS/SS from `STAR`, stores the return RIP in
//! RCX and RFLAGS in R11, and does nothing else — no stack switch, no frame.
//! This stub does that by hand: swap to the kernel GS context, load the
//! kernel stack, save the fixed frame (callee-saved registers, the six
//! argument registers, the flags register, the return-address register, and
//! the user stack pointer), call `syscall::dispatch`, then restore and
//! `sysretq`.
//!
//! Syscall argument convention follows the Linux x86_64 ABI: the number is
//! in RAX, arguments in RDI, RSI, RDX, R10, R8, R9 (R10 stands in for RCX,
//! which `SYSCALL` clobbers with the return address).

use core::arch::naked_asm;

use super::gs_context::{
    OFFSET_KERNEL_RSP, OFFSET_SAVED_RFLAGS, OFFSET_SAVED_RIP, OFFSET_USER_RSP,
};

#[unsafe(naked)]
pub extern "C" fn syscall_entry() {
    naked_asm!(
        "swapgs",
        "mov gs:[{user_rsp}], rsp",
        "mov gs:[{saved_rip}], rcx",
        "mov gs:[{saved_rflags}], r11",
        "mov rsp, gs:[{kernel_rsp}]",
        "push rbx",
        "push rbp",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        // Shift syscall-convention args (rax,rdi,rsi,rdx,r10,r8,r9) into the
        // SysV call convention (rdi,rsi,rdx,rcx,r8,r9,stack) for dispatch().
        // Processed so every source register is read before it's clobbered.
        "push r9",          // a6 -> 7th argument, passed on the stack
        "mov r9, r8",        // r9  (a5) <- r8
        "mov r8, r10",       // r8  (a4) <- r10
        "mov rcx, rdx",      // rcx (a3) <- rdx
        "mov rdx, rsi",      // rdx (a2) <- rsi
        "mov rsi, rdi",      // rsi (a1) <- rdi
        "mov rdi, rax",      // rdi (nr) <- rax
        "sub rsp, 8",        // align: 6 callee-saved + 1 stack-arg = 56 bytes pushed
        "call {dispatch}",
        "add rsp, 16",       // drop alignment pad + stack-passed a6
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbp",
        "pop rbx",
        "mov rcx, gs:[{saved_rip}]",
        "mov r11, gs:[{saved_rflags}]",
        "mov rsp, gs:[{user_rsp}]",
        "swapgs",
        "sysretq",
        user_rsp = const OFFSET_USER_RSP,
        kernel_rsp = const OFFSET_KERNEL_RSP,
        saved_rip = const OFFSET_SAVED_RIP,
        saved_rflags = const OFFSET_SAVED_RFLAGS,
        dispatch = sym crate::syscall::dispatch,
    );
}
