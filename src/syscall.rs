//! Syscall dispatch table.
//!
//! `interrupts::syscall_asm::syscall_entry` reshuffles the `SYSCALL`
//! register convention into a plain SysV call and lands here. Numbers follow
//! the Linux x86_64 ABI the entry stub already assumes. Only `write` to
//! stdout/stderr performs real I/O; everything else returns the appropriate
//! "not implemented" error so the contract (numbers, argument positions,
//! dispatcher shape) is complete even though most handlers are stubs.

use crate::safety::ptr::UserSlice;

pub const SYS_READ: u64 = 0;
pub const SYS_WRITE: u64 = 1;
pub const SYS_OPEN: u64 = 2;
pub const SYS_CLOSE: u64 = 3;
pub const SYS_MMAP: u64 = 9;
pub const SYS_MUNMAP: u64 = 11;
pub const SYS_SLEEP: u64 = 35;
pub const SYS_GETPID: u64 = 39;
pub const SYS_FORK: u64 = 57;
pub const SYS_EXECVE: u64 = 59;
pub const SYS_EXIT: u64 = 60;
pub const SYS_WAIT4: u64 = 61;

const MAX_SYSCALL_NUMBER: u64 = SYS_WAIT4;

const ENOSYS: i64 = -38;
const EBADF: i64 = -9;
const EFAULT: i64 = -14;
const EINVAL: i64 = -22;

const FD_STDOUT: u64 = 1;
const FD_STDERR: u64 = 2;

/// Entry point called from `syscall_entry`. `nr` is the syscall number
/// (originally `rax`); `a1..a6` are its arguments in order. The return value
/// lands back in `rax` via the C calling convention, consumed by `sysretq`.
pub extern "C" fn dispatch(nr: u64, a1: u64, a2: u64, a3: u64, a4: u64, a5: u64, _a6: u64) -> i64 {
    if nr > MAX_SYSCALL_NUMBER {
        return ENOSYS;
    }

    match nr {
        SYS_EXIT => sys_exit(a1 as i32),
        SYS_READ => sys_read(a1, a2, a3),
        SYS_WRITE => sys_write(a1, a2, a3),
        SYS_OPEN => sys_open(a1, a2, a3),
        SYS_CLOSE => sys_close(a1),
        SYS_FORK => sys_fork(),
        SYS_EXECVE => sys_execve(a1, a2, a3),
        SYS_WAIT4 => sys_wait4(a1, a2, a3, a4),
        SYS_GETPID => sys_getpid(),
        SYS_SLEEP => sys_sleep(a1),
        SYS_MMAP => sys_mmap(a1, a2, a3, a4, a5),
        SYS_MUNMAP => sys_munmap(a1, a2),
        _ => ENOSYS,
    }
}

/// Terminates the calling process and reschedules; does not return to its
/// caller. `exit_code`'s low byte is what a `wait`-ing parent observes.
fn sys_exit(exit_code: i32) -> i64 {
    let pid = crate::scheduler::current_pid();
    crate::process::exit_process(pid, exit_code);
    crate::scheduler::do_schedule();
    crate::kpanic!("sys_exit: scheduled back into an exited process {}", pid);
}

/// Nothing is open for reading yet; fd 0/1/2 all reject it.
fn sys_read(_fd: u64, _buf: u64, _count: u64) -> i64 {
    ENOSYS
}

/// Writes `count` bytes from user memory at `buf` to the serial console, if
/// `fd` names stdout or stderr. Any other descriptor is rejected.
fn sys_write(fd: u64, buf: u64, count: u64) -> i64 {
    if fd != FD_STDOUT && fd != FD_STDERR {
        return EBADF;
    }
    let Some(user_slice) = UserSlice::<u8>::new(buf as *const u8, count as usize) else {
        return EFAULT;
    };
    let bytes = unsafe { user_slice.as_slice() };
    crate::serial::write_bytes(bytes);
    bytes.len() as i64
}

fn sys_open(_path: u64, _flags: u64, _mode: u64) -> i64 {
    ENOSYS
}

fn sys_close(_fd: u64) -> i64 {
    ENOSYS
}

fn sys_fork() -> i64 {
    ENOSYS
}

fn sys_execve(_path: u64, _argv: u64, _envp: u64) -> i64 {
    ENOSYS
}

fn sys_wait4(_pid: u64, _status: u64, _options: u64, _rusage: u64) -> i64 {
    ENOSYS
}

fn sys_getpid() -> i64 {
    crate::scheduler::current_pid() as i64
}

/// Busy-waits the calling kernel thread for `ms` milliseconds. There is no
/// blocking/wake primitive yet, so this parks the CPU rather than
/// descheduling the thread.
fn sys_sleep(ms: u64) -> i64 {
    if ms > i64::MAX as u64 {
        return EINVAL;
    }
    crate::mm::timer::busy_sleep_ms(ms);
    0
}

fn sys_mmap(_addr: u64, _len: u64, _prot: u64, _flags: u64, _fd: u64) -> i64 {
    ENOSYS
}

fn sys_munmap(_addr: u64, _len: u64) -> i64 {
    ENOSYS
}
