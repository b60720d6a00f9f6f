//! Hardware interrupt handlers routed through the legacy 8259 PIC.

use pic8259::ChainedPics;
use x86_64::instructions::port::Port;
use x86_64::structures::idt::InterruptStackFrame;

pub const PIC_1_OFFSET: u8 = 32;
pub const PIC_2_OFFSET: u8 = PIC_1_OFFSET + 8;

pub static PICS: spin::Mutex<ChainedPics> =
    spin::Mutex::new(unsafe { ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET) });

const TIMER_TICK_MS: u64 = crate::config::TICK_UNIT_MS;

/// Timer interrupt handler (vector 32). Fires from the legacy PIC's IRQ0
/// until the local APIC comes up, and from the LAPIC's periodic timer
/// afterward; the two never fire concurrently; `arch::init_lapic` fully
/// masks the PIC before the LAPIC timer is armed.
pub extern "x86-interrupt" fn timer_interrupt_handler(_stack_frame: InterruptStackFrame) {
    if crate::arch::lapic_is_ready() {
        crate::arch::send_eoi();
    } else {
        unsafe {
            PICS.lock().notify_end_of_interrupt(PIC_1_OFFSET);
        }
    }

    crate::mm::timer::tick(TIMER_TICK_MS);

    if crate::scheduler::tick(TIMER_TICK_MS) {
        crate::scheduler::do_schedule_from_interrupt();
    }

    crate::net::poll();
}

/// Masks the interrupt line and logs a warning. Installed on every PIC
/// vector this kernel doesn't otherwise handle.
macro_rules! define_spurious_irq {
    ($name:ident, $vector:expr) => {
        pub extern "x86-interrupt" fn $name(_stack_frame: InterruptStackFrame) {
            crate::kwarn!("Unhandled IRQ vector {} received; masking line", $vector);
            unsafe {
                PICS.lock().notify_end_of_interrupt($vector);
                if $vector < PIC_2_OFFSET {
                    let irq_index = ($vector - PIC_1_OFFSET) as u8;
                    let mut port = Port::<u8>::new(0x21);
                    let mask = port.read() | (1 << irq_index);
                    port.write(mask);
                } else {
                    let irq_index = ($vector - PIC_2_OFFSET) as u8;
                    let mut port = Port::<u8>::new(0xA1);
                    let mask = port.read() | (1 << irq_index);
                    port.write(mask);
                }
            }
        }
    };
}

define_spurious_irq!(spurious_irq1_handler, PIC_1_OFFSET + 1);
define_spurious_irq!(spurious_irq2_handler, PIC_1_OFFSET + 2);
define_spurious_irq!(spurious_irq3_handler, PIC_1_OFFSET + 3);
define_spurious_irq!(spurious_irq4_handler, PIC_1_OFFSET + 4);
define_spurious_irq!(spurious_irq5_handler, PIC_1_OFFSET + 5);
define_spurious_irq!(spurious_irq6_handler, PIC_1_OFFSET + 6);
define_spurious_irq!(spurious_irq7_handler, PIC_1_OFFSET + 7);
define_spurious_irq!(spurious_irq8_handler, PIC_2_OFFSET + 0);
define_spurious_irq!(spurious_irq9_handler, PIC_2_OFFSET + 1);
define_spurious_irq!(spurious_irq10_handler, PIC_2_OFFSET + 2);
define_spurious_irq!(spurious_irq11_handler, PIC_2_OFFSET + 3);
define_spurious_irq!(spurious_irq12_handler, PIC_2_OFFSET + 4);
define_spurious_irq!(spurious_irq13_handler, PIC_2_OFFSET + 5);
define_spurious_irq!(spurious_irq14_handler, PIC_2_OFFSET + 6);
define_spurious_irq!(spurious_irq15_handler, PIC_2_OFFSET + 7);
