//! Preemptive round-robin scheduler.
//!
//! The ready queue is a fixed-capacity ring buffer (`ready_queue`) of pids;
//! nothing here allocates. The idle process (pid 0) is an ordinary member of
//! the rotation rather than a special-cased fallback, so it accumulates real
//! ticks whenever no other process is ready to run, and gets preempted in
//! turn like everything else.
//!
//! A running process is *not* present in the ready queue; it's named by
//! `CURRENT`. On preemption or voluntary yield it's pushed back to the tail
//! (unless it has since blocked or exited) and the head of the queue is
//! popped and switched to via `context::context_switch`.

pub mod context;
mod ready_queue;

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use spin::Mutex;

use crate::config::DEFAULT_QUANTUM_TICKS;
use crate::process::{self, Context, Pid, ProcessFlags, ProcessState, IDLE_PID};
use context::context_switch;
use ready_queue::ReadyQueue;

static READY: Mutex<ReadyQueue> = Mutex::new(ReadyQueue::new());
static CURRENT: AtomicU64 = AtomicU64::new(IDLE_PID);
static STARTED: AtomicBool = AtomicBool::new(false);

static CONTEXT_SWITCHES: AtomicU64 = AtomicU64::new(0);
static IDLE_TICKS: AtomicU64 = AtomicU64::new(0);

/// Brings the ready queue up: idle (pid 0) is the sole initial entrant, so
/// `start()` has something to pop. Must run after `process::init`.
pub fn init() {
    READY.lock().push(IDLE_PID);
    crate::kinfo!("scheduler: ready queue initialized");
}

/// Currently running pid, as last recorded by the scheduler.
pub fn current_pid() -> Pid {
    CURRENT.load(Ordering::SeqCst)
}

pub fn context_switch_count() -> u64 {
    CONTEXT_SWITCHES.load(Ordering::Relaxed)
}

pub fn idle_ticks() -> u64 {
    IDLE_TICKS.load(Ordering::Relaxed)
}

/// Adds `pid` to the back of the ready queue. Called by `process` whenever a
/// new thread is spawned or a blocked one wakes up.
pub fn enqueue(pid: Pid) {
    if !READY.lock().push(pid) {
        crate::kerror!("scheduler: ready queue full, dropping pid {}", pid);
    }
}

/// Removes `pid` from the ready queue if it's sitting there. Called when a
/// process leaves the runnable set (exit, block) while not the one
/// currently running, so a terminated or blocked task is never popped and
/// switched into.
pub fn dequeue(pid: Pid) {
    READY.lock().remove(pid);
}

/// Advances the currently running process's accounting by one timer tick.
/// Returns `true` once its quantum is exhausted and a reschedule is due.
/// Called once per timer interrupt, before any scheduling decision.
pub fn tick(elapsed_ms: u64) -> bool {
    let pid = current_pid();
    process::with_table(|table| {
        let Some(proc) = table.get_mut(pid) else {
            return false;
        };
        proc.ticks_accumulated += elapsed_ms;
        if proc.flags.contains(ProcessFlags::IS_IDLE) {
            IDLE_TICKS.fetch_add(elapsed_ms, Ordering::Relaxed);
        }
        if proc.quantum_remaining <= 1 {
            proc.quantum_remaining = 0;
            true
        } else {
            proc.quantum_remaining -= 1;
            false
        }
    })
}

/// Starts multitasking: pops the first ready pid (idle, per `init`) and
/// switches into it, discarding the bootstrap call stack. Never returns.
/// Must run once, after `init`, before interrupts are enabled; enables them
/// itself right before the first switch so the timer can preempt from there.
pub fn start() -> ! {
    if STARTED.swap(true, Ordering::SeqCst) {
        crate::kpanic!("scheduler::start called more than once");
    }

    let first_pid = READY
        .lock()
        .pop()
        .expect("scheduler::init must seed the ready queue before start()");

    let (new_ctx, kstack) = process::with_table(|table| {
        let proc = table
            .get_mut(first_pid)
            .expect("ready queue referenced a process missing from the table");
        proc.state = ProcessState::Running;
        (&proc.context as *const Context, proc.kernel_stack_top)
    });

    CURRENT.store(first_pid, Ordering::SeqCst);
    CONTEXT_SWITCHES.fetch_add(1, Ordering::Relaxed);
    if kstack != 0 {
        crate::arch::set_kernel_stack(kstack);
        crate::interrupts::set_kernel_rsp(kstack);
    }

    x86_64::instructions::interrupts::enable();

    unsafe {
        context_switch(core::ptr::null_mut(), new_ctx);
    }
    unreachable!("context_switch never returns into the bootstrap flow");
}

/// Picks the next ready process and switches to it if it differs from the
/// one currently running. Shared by the timer-driven preemption path and
/// voluntary yields; the caller decides which is appropriate.
fn schedule() {
    let prev_pid = current_pid();

    let next_pid = match READY.lock().pop() {
        Some(pid) => pid,
        None => return, // nothing else is ready; keep running prev
    };

    if next_pid == prev_pid {
        process::with_table(|table| {
            if let Some(proc) = table.get_mut(prev_pid) {
                proc.quantum_remaining = DEFAULT_QUANTUM_TICKS;
            }
        });
        return;
    }

    let prev_still_running = process::with_table(|table| {
        table
            .get(prev_pid)
            .map(|p| p.state == ProcessState::Running)
            .unwrap_or(false)
    });

    let (old_ctx, new_ctx, new_kstack) = process::with_table(|table| {
        if prev_still_running {
            if let Some(proc) = table.get_mut(prev_pid) {
                proc.state = ProcessState::Ready;
                proc.quantum_remaining = DEFAULT_QUANTUM_TICKS;
            }
        }
        let old_ctx = table
            .get_mut(prev_pid)
            .map_or(core::ptr::null_mut(), |p| &mut p.context as *mut Context);

        let (new_ctx, kstack) = match table.get_mut(next_pid) {
            Some(proc) => {
                proc.state = ProcessState::Running;
                (&proc.context as *const Context, proc.kernel_stack_top)
            }
            None => (core::ptr::null(), 0),
        };
        (old_ctx, new_ctx, kstack)
    });

    if prev_still_running {
        enqueue(prev_pid);
    }

    if new_ctx.is_null() {
        crate::kerror!("scheduler: pid {} vanished from the table mid-schedule", next_pid);
        return;
    }

    CURRENT.store(next_pid, Ordering::SeqCst);
    CONTEXT_SWITCHES.fetch_add(1, Ordering::Relaxed);
    if new_kstack != 0 {
        crate::arch::set_kernel_stack(new_kstack);
        crate::interrupts::set_kernel_rsp(new_kstack);
    }

    unsafe {
        context_switch(old_ctx, new_ctx);
    }
}

/// Called from the timer interrupt handler once `tick` reports the running
/// process's quantum is spent.
pub fn do_schedule_from_interrupt() {
    schedule();
}

/// Equivalent to `do_schedule_from_interrupt`, for call sites outside an
/// interrupt context (e.g. a blocking syscall putting its caller to sleep).
pub fn do_schedule() {
    schedule();
}

/// Voluntarily gives up the remainder of the current quantum.
pub fn yield_now() {
    x86_64::instructions::interrupts::disable();
    let pid = current_pid();
    process::with_table(|table| {
        if let Some(proc) = table.get_mut(pid) {
            proc.quantum_remaining = 0;
        }
    });
    schedule();
    x86_64::instructions::interrupts::enable();
}
