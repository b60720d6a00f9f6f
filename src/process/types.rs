//! The process control block and the saved CPU context it carries.

use crate::config::{KERNEL_STACK_SIZE, MAX_INLINE_CHILDREN, MAX_PROCESSES};

pub type Pid = u64;

/// Process lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Slot is unused.
    Invalid,
    /// Waiting in the ready queue for the scheduler.
    Ready,
    /// Currently loaded onto the CPU.
    Running,
    /// Waiting on an event (not currently produced by any subsystem, but
    /// modeled so blocking syscalls have somewhere to put a thread).
    Blocked,
    /// Exited; `exit_code` is valid. Reaped on the next `wait` from its
    /// parent, or immediately reparented to the idle process.
    Terminated,
}

/// Saved general-purpose register file, instruction pointer, stack pointer
/// and flags register, swapped in and out by `scheduler::context::context_switch`.
/// Field order and offsets are load-bearing: the naked-asm switch routine
/// indexes into this struct by raw byte offset.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Context {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub rbp: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,
    pub rip: u64,
    pub rsp: u64,
    pub rflags: u64,
}

impl Context {
    pub const fn empty() -> Self {
        Self {
            r15: 0,
            r14: 0,
            r13: 0,
            r12: 0,
            r11: 0,
            r10: 0,
            r9: 0,
            r8: 0,
            rsi: 0,
            rdi: 0,
            rbp: 0,
            rdx: 0,
            rcx: 0,
            rbx: 0,
            rax: 0,
            rip: 0,
            rsp: 0,
            rflags: 0x202, // IF set, reserved bit 1 set
        }
    }
}

const MAX_NAME_LEN: usize = 32;

/// Bounded child set: the common case (a handful of children) lives inline;
/// anything beyond `MAX_INLINE_CHILDREN` spills into a heap-backed overflow
/// list rather than being silently dropped.
pub struct Children {
    inline: [Option<Pid>; MAX_INLINE_CHILDREN],
    inline_len: usize,
    overflow: Option<alloc::vec::Vec<Pid>>,
}

impl Children {
    const fn empty() -> Self {
        Self {
            inline: [None; MAX_INLINE_CHILDREN],
            inline_len: 0,
            overflow: None,
        }
    }

    pub fn push(&mut self, pid: Pid) {
        if self.inline_len < MAX_INLINE_CHILDREN {
            self.inline[self.inline_len] = Some(pid);
            self.inline_len += 1;
            return;
        }
        self.overflow
            .get_or_insert_with(alloc::vec::Vec::new)
            .push(pid);
    }

    pub fn remove(&mut self, pid: Pid) -> bool {
        if let Some(idx) = self.inline[..self.inline_len]
            .iter()
            .position(|p| *p == Some(pid))
        {
            self.inline_len -= 1;
            self.inline[idx] = self.inline[self.inline_len];
            self.inline[self.inline_len] = None;
            if let Some(overflow) = &mut self.overflow {
                if let Some(promoted) = overflow.pop() {
                    self.inline[self.inline_len] = Some(promoted);
                    self.inline_len += 1;
                }
            }
            return true;
        }
        if let Some(overflow) = &mut self.overflow {
            if let Some(pos) = overflow.iter().position(|p| *p == pid) {
                overflow.swap_remove(pos);
                return true;
            }
        }
        false
    }

    pub fn iter(&self) -> impl Iterator<Item = Pid> + '_ {
        self.inline[..self.inline_len]
            .iter()
            .filter_map(|p| *p)
            .chain(self.overflow.iter().flatten().copied())
    }

    pub fn len(&self) -> usize {
        self.inline_len + self.overflow.as_ref().map_or(0, |v| v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessFlags(pub u32);

impl ProcessFlags {
    pub const IS_KERNEL_THREAD: u32 = 1 << 0;
    pub const IS_IDLE: u32 = 1 << 1;

    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn contains(&self, bit: u32) -> bool {
        self.0 & bit != 0
    }

    pub fn set(&mut self, bit: u32) {
        self.0 |= bit;
    }
}

pub struct Process {
    pub pid: Pid,
    pub name: [u8; MAX_NAME_LEN],
    pub name_len: u8,
    pub state: ProcessState,
    pub priority: u8,
    pub quantum_remaining: u32,
    pub ticks_accumulated: u64,
    pub context: Context,
    pub page_table_root: u64,
    pub kernel_stack_base: u64,
    pub kernel_stack_top: u64,
    pub parent: Option<Pid>,
    pub children: Children,
    pub flags: ProcessFlags,
    pub exit_code: i32,
}

impl Process {
    pub fn set_name(&mut self, name: &str) {
        let bytes = name.as_bytes();
        let len = bytes.len().min(MAX_NAME_LEN);
        self.name[..len].copy_from_slice(&bytes[..len]);
        self.name_len = len as u8;
    }

    pub fn name(&self) -> &str {
        core::str::from_utf8(&self.name[..self.name_len as usize]).unwrap_or("<invalid>")
    }
}

pub const fn empty_process_slot() -> Process {
    Process {
        pid: 0,
        name: [0; MAX_NAME_LEN],
        name_len: 0,
        state: ProcessState::Invalid,
        priority: 0,
        quantum_remaining: 0,
        ticks_accumulated: 0,
        context: Context::empty(),
        page_table_root: 0,
        kernel_stack_base: 0,
        kernel_stack_top: 0,
        parent: None,
        children: Children::empty(),
        flags: ProcessFlags::empty(),
        exit_code: 0,
    }
}

pub const PROCESS_TABLE_LEN: usize = MAX_PROCESSES;
pub const DEFAULT_KERNEL_STACK_SIZE: usize = KERNEL_STACK_SIZE;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_spill_into_overflow_past_inline_capacity() {
        let mut children = Children::empty();
        for pid in 0..(MAX_INLINE_CHILDREN as Pid + 3) {
            children.push(pid);
        }
        assert_eq!(children.len(), MAX_INLINE_CHILDREN + 3);
        let seen: alloc::vec::Vec<Pid> = children.iter().collect();
        for pid in 0..(MAX_INLINE_CHILDREN as Pid + 3) {
            assert!(seen.contains(&pid), "lost child {pid} past inline capacity");
        }
    }

    #[test]
    fn removing_an_inline_child_promotes_one_from_overflow() {
        let mut children = Children::empty();
        for pid in 0..(MAX_INLINE_CHILDREN as Pid + 1) {
            children.push(pid);
        }
        assert!(children.remove(0));
        assert_eq!(children.len(), MAX_INLINE_CHILDREN);
        let seen: alloc::vec::Vec<Pid> = children.iter().collect();
        assert!(!seen.contains(&0));
        assert!(seen.contains(&(MAX_INLINE_CHILDREN as Pid)));
    }

    #[test]
    fn removing_a_pid_not_present_reports_false() {
        let mut children = Children::empty();
        children.push(1);
        assert!(!children.remove(99));
        assert!(children.remove(1));
        assert!(children.is_empty());
    }

    #[test]
    fn empty_slot_has_invalid_state_and_interrupts_enabled_context() {
        let slot = empty_process_slot();
        assert_eq!(slot.state, ProcessState::Invalid);
        assert_eq!(slot.context.rflags & 0x200, 0x200);
        assert!(slot.children.is_empty());
    }

    #[test]
    fn set_name_truncates_to_the_fixed_buffer() {
        let mut slot = empty_process_slot();
        let long_name = "a".repeat(MAX_NAME_LEN + 10);
        slot.set_name(&long_name);
        assert_eq!(slot.name().len(), MAX_NAME_LEN);
    }
}
