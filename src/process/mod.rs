//! Process management: the process table, creation/exit/reparenting, and
//! ELF loading.

extern crate alloc;

pub mod loader;
mod types;

pub use types::{
    empty_process_slot, Children, Context, Pid, Process, ProcessFlags, ProcessState,
    DEFAULT_KERNEL_STACK_SIZE, PROCESS_TABLE_LEN,
};

use core::sync::atomic::{AtomicU64, Ordering};
use spin::Mutex;

use crate::config::DEFAULT_QUANTUM_TICKS;

/// PID 0 is reserved for the idle thread, which always exists and never exits.
pub const IDLE_PID: Pid = 0;

static NEXT_PID: AtomicU64 = AtomicU64::new(1);

pub struct ProcessTable {
    slots: [Process; PROCESS_TABLE_LEN],
}

unsafe impl Send for ProcessTable {}

static TABLE: Mutex<ProcessTable> = Mutex::new(ProcessTable {
    slots: [const { empty_process_slot() }; PROCESS_TABLE_LEN],
});

fn allocate_pid() -> Pid {
    NEXT_PID.fetch_add(1, Ordering::Relaxed)
}

/// Runs forever on the CPU whenever no other process is ready.
extern "C" fn idle_loop() -> ! {
    crate::arch::halt_loop()
}

/// Brings up the process table: carves out PID 0 (idle) as a `Ready` kernel
/// thread with no parent, its own kernel stack, and a context that enters
/// `idle_loop`. Must run once, after `mm::init`.
pub fn init() {
    let stack_phys = crate::mm::pmm::alloc_pages(DEFAULT_KERNEL_STACK_SIZE / 4096)
        .expect("out of physical memory for the idle kernel stack");
    let stack_base = stack_phys + crate::mm::vmm::PHYS_MEM_OFFSET;
    let stack_top = stack_base + DEFAULT_KERNEL_STACK_SIZE as u64;

    let mut context = Context::empty();
    context.rip = idle_loop as u64;
    context.rsp = stack_top - 8;

    let mut table = TABLE.lock();
    let idle = &mut table.slots[0];
    idle.pid = IDLE_PID;
    idle.set_name("idle");
    idle.state = ProcessState::Ready;
    idle.priority = 0;
    idle.quantum_remaining = DEFAULT_QUANTUM_TICKS;
    idle.context = context;
    idle.kernel_stack_base = stack_base;
    idle.kernel_stack_top = stack_top;
    idle.flags.set(ProcessFlags::IS_IDLE | ProcessFlags::IS_KERNEL_THREAD);
    crate::kinfo!("process: table initialized, idle is PID {}", IDLE_PID);
}

fn find_free_slot(table: &mut ProcessTable) -> Option<usize> {
    table
        .slots
        .iter()
        .position(|p| p.state == ProcessState::Invalid)
}

/// Creates a kernel thread: a process with no user address space, running
/// `entry` on a freshly allocated kernel stack.
pub fn spawn_kernel_thread(
    name: &str,
    entry: extern "C" fn() -> !,
    parent: Option<Pid>,
) -> Result<Pid, &'static str> {
    let stack_phys = crate::mm::pmm::alloc_pages(DEFAULT_KERNEL_STACK_SIZE / 4096)
        .map_err(|_| "out of physical memory for kernel stack")?;
    let stack_base = stack_phys + crate::mm::vmm::PHYS_MEM_OFFSET;
    let stack_top = stack_base + DEFAULT_KERNEL_STACK_SIZE as u64;

    let mut table = TABLE.lock();
    let slot = find_free_slot(&mut table).ok_or("process table full")?;
    let pid = allocate_pid();

    let mut context = Context::empty();
    context.rip = entry as u64;
    context.rsp = stack_top - 8; // leave room for the return address slot

    let process = &mut table.slots[slot];
    *process = empty_process_slot();
    process.pid = pid;
    process.set_name(name);
    process.state = ProcessState::Ready;
    process.priority = 10;
    process.quantum_remaining = DEFAULT_QUANTUM_TICKS;
    process.context = context;
    process.kernel_stack_base = stack_base;
    process.kernel_stack_top = stack_top;
    process.parent = parent;
    process.flags.set(ProcessFlags::IS_KERNEL_THREAD);

    if let Some(parent_pid) = parent {
        if let Some(parent_proc) = table.slots.iter_mut().find(|p| p.pid == parent_pid) {
            parent_proc.children.push(pid);
        }
    }

    drop(table);
    crate::scheduler::enqueue(pid);
    Ok(pid)
}

/// Runs `f` with exclusive access to the process table. Used by the
/// scheduler and syscall dispatcher; kept narrow so callers can't hold the
/// lock across a context switch.
pub fn with_table<R>(f: impl FnOnce(&mut ProcessTable) -> R) -> R {
    f(&mut TABLE.lock())
}

impl ProcessTable {
    pub fn get(&self, pid: Pid) -> Option<&Process> {
        self.slots
            .iter()
            .find(|p| p.pid == pid && p.state != ProcessState::Invalid)
    }

    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut Process> {
        self.slots
            .iter_mut()
            .find(|p| p.pid == pid && p.state != ProcessState::Invalid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Process> {
        self.slots.iter().filter(|p| p.state != ProcessState::Invalid)
    }
}

/// Marks `pid` terminated, reparents its children onto idle, and wakes its
/// parent if the parent is blocked in `wait`. The slot itself is freed only
/// once the parent reaps it (or immediately, if `pid` has no parent).
pub fn exit_process(pid: Pid, exit_code: i32) {
    let mut table = TABLE.lock();

    let child_pids: alloc::vec::Vec<Pid> = match table.get(pid) {
        Some(p) => p.children.iter().collect(),
        None => return,
    };
    for child in child_pids {
        if let Some(child_proc) = table.get_mut(child) {
            child_proc.parent = Some(IDLE_PID);
        }
        if let Some(idle) = table.get_mut(IDLE_PID) {
            idle.children.push(child);
        }
    }

    let parent = table.get(pid).and_then(|p| p.parent);
    if let Some(proc) = table.get_mut(pid) {
        proc.state = ProcessState::Terminated;
        proc.exit_code = exit_code;
    }

    if parent.is_none() {
        free_slot(&mut table, pid);
    }

    drop(table);
    crate::scheduler::dequeue(pid);
}

/// Reaps a terminated child of `parent`, returning its pid and exit code.
/// Used by the `wait` syscall.
pub fn reap_child(parent: Pid) -> Option<(Pid, i32)> {
    let mut table = TABLE.lock();
    let child_pid = table
        .get(parent)?
        .children
        .iter()
        .find(|&c| table.get(c).map(|p| p.state) == Some(ProcessState::Terminated))?;
    let exit_code = table.get(child_pid)?.exit_code;
    if let Some(parent_proc) = table.get_mut(parent) {
        parent_proc.children.remove(child_pid);
    }
    free_slot(&mut table, child_pid);
    Some((child_pid, exit_code))
}

fn free_slot(table: &mut ProcessTable, pid: Pid) {
    if let Some(proc) = table.slots.iter_mut().find(|p| p.pid == pid) {
        let stack_base = proc.kernel_stack_base;
        if stack_base != 0 {
            let phys = stack_base - crate::mm::vmm::PHYS_MEM_OFFSET;
            let _ = crate::mm::pmm::free_pages(phys, DEFAULT_KERNEL_STACK_SIZE / 4096);
        }
        *proc = empty_process_slot();
    }
}
