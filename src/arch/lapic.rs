//! Local APIC: timer calibration, periodic tick source, and inter-processor
//! interrupt send primitives. SMP is out of scope beyond these send
//! primitives; there is no receiving/coordinating AP code here.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use crate::safety::x86::{inb, outb, rdmsr, wrmsr};

const IA32_APIC_BASE_MSR: u32 = 0x1B;
const APIC_ENABLE: u64 = 1 << 11;
const APIC_BASE_MASK: u64 = 0xFFFF_F000;

const REG_ID: u32 = 0x20;
const REG_EOI: u32 = 0x0B0;
const REG_SVR: u32 = 0x0F0;
const REG_ICR_LOW: u32 = 0x300;
const REG_ICR_HIGH: u32 = 0x310;
const REG_LVT_TIMER: u32 = 0x320;
const REG_TIMER_INITIAL_COUNT: u32 = 0x380;
const REG_TIMER_CURRENT_COUNT: u32 = 0x390;
const REG_TIMER_DIVIDE: u32 = 0x3E0;

const DEFAULT_SPURIOUS_VECTOR: u8 = 0xFF;
pub const TIMER_VECTOR: u8 = 0x20;

const ICR_DELIVERY_INIT: u32 = 0x500;
const ICR_DELIVERY_STARTUP: u32 = 0x600;
const ICR_DELIVERY_FIXED: u32 = 0x000;
const ICR_LEVEL_ASSERT: u32 = 1 << 14;
const ICR_TRIGGER_LEVEL: u32 = 1 << 15;
const ICR_DEST_ALL_EXCEPT_SELF: u32 = 0b11 << 18;
const ICR_DEST_SELF: u32 = 0b01 << 18;

static LAPIC_BASE: AtomicU64 = AtomicU64::new(0);
static LAPIC_READY: AtomicBool = AtomicBool::new(false);
/// Bus cycles the LAPIC timer counts down in one millisecond, established by
/// `calibrate` against the PIT's well-known 1.193182 MHz channel 2 frequency.
static TICKS_PER_MS: AtomicU32 = AtomicU32::new(0);

fn reg_addr(base: u64, reg: u32) -> *mut u32 {
    (base + reg as u64) as *mut u32
}

unsafe fn read_reg(reg: u32) -> u32 {
    let base = LAPIC_BASE.load(Ordering::Acquire);
    core::ptr::read_volatile(reg_addr(base, reg))
}

unsafe fn write_reg(reg: u32, value: u32) {
    let base = LAPIC_BASE.load(Ordering::Acquire);
    core::ptr::write_volatile(reg_addr(base, reg), value);
}

/// Enables the LAPIC via `IA32_APIC_BASE`, records its MMIO base, unmasks the
/// spurious-interrupt vector, then calibrates and arms the periodic timer.
/// `mmio_virt_base` is the virtual address the physical LAPIC page is mapped
/// at (identity offset mapping, per `mm::vmm::PHYS_MEM_OFFSET`).
pub fn init(mmio_virt_base: u64) {
    unsafe {
        let base_msr = rdmsr(IA32_APIC_BASE_MSR);
        wrmsr(IA32_APIC_BASE_MSR, base_msr | APIC_ENABLE);
    }

    LAPIC_BASE.store(mmio_virt_base, Ordering::Release);
    LAPIC_READY.store(true, Ordering::Release);

    unsafe {
        write_reg(REG_SVR, 0x100 | DEFAULT_SPURIOUS_VECTOR as u32);
    }

    calibrate();
    arm_periodic_timer();

    crate::kinfo!(
        "lapic: id={} ticks_per_ms={}",
        bsp_apic_id(),
        TICKS_PER_MS.load(Ordering::Relaxed)
    );
}

pub fn is_ready() -> bool {
    LAPIC_READY.load(Ordering::Acquire)
}

pub fn bsp_apic_id() -> u32 {
    unsafe { read_reg(REG_ID) >> 24 }
}

/// Signals end-of-interrupt to the LAPIC. Every LAPIC-routed handler (timer,
/// spurious, IPIs) must call this before returning.
pub fn send_eoi() {
    unsafe {
        write_reg(REG_EOI, 0);
    }
}

const PIT_CHANNEL2_DATA: u16 = 0x42;
const PIT_COMMAND: u16 = 0x43;
const PIT_GATE_PORT: u16 = 0x61;
const PIT_FREQUENCY_HZ: u32 = 1_193_182;

/// Measures LAPIC timer ticks per millisecond against PIT channel 2, which
/// the legacy platform guarantees runs at a fixed, known frequency regardless
/// of CPU speed.
fn calibrate() {
    unsafe {
        write_reg(REG_TIMER_DIVIDE, 0b1011); // divide by 1
        write_reg(REG_LVT_TIMER, 0x10000); // masked while calibrating

        let gate = inb(PIT_GATE_PORT);
        outb(PIT_GATE_PORT, (gate & 0xFD) | 0x01);
        outb(PIT_COMMAND, 0b10110010); // channel 2, mode 0, binary

        let calibration_ms = 10u32;
        let count = (PIT_FREQUENCY_HZ / 1000) * calibration_ms;
        outb(PIT_CHANNEL2_DATA, (count & 0xFF) as u8);
        outb(PIT_CHANNEL2_DATA, (count >> 8) as u8);

        write_reg(REG_TIMER_INITIAL_COUNT, u32::MAX);
        while inb(PIT_GATE_PORT) & 0x20 == 0 {
            core::hint::spin_loop();
        }
        let elapsed = u32::MAX - read_reg(REG_TIMER_CURRENT_COUNT);
        write_reg(REG_TIMER_INITIAL_COUNT, 0);

        let ticks_per_ms = (elapsed / calibration_ms).max(1);
        TICKS_PER_MS.store(ticks_per_ms, Ordering::Relaxed);
    }
}

/// Arms the LAPIC timer to fire `TIMER_VECTOR` once per millisecond, driving
/// `mm::timer`'s tick counter and the scheduler's preemption quantum.
fn arm_periodic_timer() {
    let ticks = TICKS_PER_MS.load(Ordering::Relaxed).max(1);
    unsafe {
        write_reg(REG_LVT_TIMER, 0x20000 | TIMER_VECTOR as u32); // periodic mode
        write_reg(REG_TIMER_DIVIDE, 0b1011);
        write_reg(REG_TIMER_INITIAL_COUNT, ticks);
    }
}

fn send_icr(dest_apic_id: u32, icr_low: u32) {
    unsafe {
        write_reg(REG_ICR_HIGH, dest_apic_id << 24);
        write_reg(REG_ICR_LOW, icr_low);
        while read_reg(REG_ICR_LOW) & (1 << 12) != 0 {
            core::hint::spin_loop();
        }
    }
}

/// Sends a fixed-vector IPI to a specific APIC ID.
pub fn send_ipi(dest_apic_id: u32, vector: u8) {
    send_icr(dest_apic_id, ICR_DELIVERY_FIXED | vector as u32);
}

/// Sends a fixed-vector IPI to every other CPU in the system (no-op on a
/// single-CPU system, but kept as a correct primitive for multi-CPU
/// IPI broadcast).
pub fn send_ipi_all_except_self(vector: u8) {
    send_icr(0, ICR_DEST_ALL_EXCEPT_SELF | ICR_DELIVERY_FIXED | vector as u32);
}

/// Sends a fixed-vector IPI back to the sending CPU.
pub fn send_ipi_self(vector: u8) {
    send_icr(0, ICR_DEST_SELF | ICR_DELIVERY_FIXED | vector as u32);
}

/// Asserts INIT on the target APIC, part of the AP bring-up sequence.
pub fn send_init_ipi(dest_apic_id: u32) {
    send_icr(
        dest_apic_id,
        ICR_DELIVERY_INIT | ICR_LEVEL_ASSERT | ICR_TRIGGER_LEVEL,
    );
}

/// Deasserts INIT, completing the INIT pulse.
pub fn send_init_deassert_ipi(dest_apic_id: u32) {
    send_icr(dest_apic_id, ICR_DELIVERY_INIT | ICR_TRIGGER_LEVEL);
}

/// Sends a STARTUP IPI pointing the AP at `vector << 12` as its real-mode
/// entry point.
pub fn send_startup_ipi(dest_apic_id: u32, vector: u8) {
    send_icr(dest_apic_id, ICR_DELIVERY_STARTUP | vector as u32);
}
