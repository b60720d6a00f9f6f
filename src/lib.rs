#![no_std]

extern crate alloc;

pub mod arch;
pub mod config;
pub mod fs;
pub mod interrupts;
pub mod logger;
pub mod memory;
pub mod mm;
pub mod net;
pub mod process;
pub mod safety;
pub mod scheduler;
pub mod serial;
pub mod syscall;
pub mod vga_buffer;

use core::panic::PanicInfo;
use multiboot2::{BootInformation, BootInformationHeader};

pub const MULTIBOOT_BOOTLOADER_MAGIC: u32 = 0x2BADB002; // Multiboot v1
pub const MULTIBOOT2_BOOTLOADER_MAGIC: u32 = 0x36d76289; // Multiboot v2

/// Physical address of the local APIC's MMIO register page on every x86_64
/// system that hasn't relocated it via `IA32_APIC_BASE`.
const LAPIC_PHYS_BASE: u64 = 0xFEE0_0000;

pub fn kernel_main(multiboot_info_address: u64, magic: u32) -> ! {
    let freq_hz = logger::init();
    vga_buffer::init();

    kinfo!("NexaOS kernel bootstrap start");
    kdebug!("Multiboot magic: {:#x}", magic);
    kdebug!("Multiboot info struct at: {:#x}", multiboot_info_address);

    if logger::tsc_frequency_is_guessed() {
        kwarn!(
            "Falling back to default TSC frequency: {}.{:03} MHz",
            freq_hz / 1_000_000,
            (freq_hz % 1_000_000) / 1_000
        );
    } else {
        kinfo!(
            "Detected invariant TSC frequency: {}.{:03} MHz",
            freq_hz / 1_000_000,
            (freq_hz % 1_000_000) / 1_000
        );
    }

    if magic != MULTIBOOT2_BOOTLOADER_MAGIC && magic != MULTIBOOT_BOOTLOADER_MAGIC {
        kerror!("Invalid Multiboot magic value: {:#x}", magic);
        arch::halt_loop();
    }

    if magic != MULTIBOOT2_BOOTLOADER_MAGIC {
        kwarn!("Multiboot v1 detected; this kernel needs the v2 memory map to boot further.");
        kinfo!("System halted awaiting next stage.");
        arch::halt_loop();
    }

    let boot_info = unsafe {
        BootInformation::load(multiboot_info_address as *const BootInformationHeader)
            .expect("valid multiboot info structure")
    };

    memory::log_memory_overview(&boot_info);

    arch::init_gdt();
    interrupts::init_interrupts();
    mm::init(&boot_info);
    bring_up_local_apic();
    process::init();
    scheduler::init();
    fs::init();
    net::init();

    let elapsed_us = logger::boot_time_us();
    kinfo!(
        "Kernel initialization completed in {}.{:03} ms",
        elapsed_us / 1_000,
        elapsed_us % 1_000
    );

    scheduler::start()
}

/// Maps the LAPIC's MMIO page, calibrates and arms its periodic timer, and
/// masks the legacy PIC so vector 32 has exactly one source from here on.
/// Falls back to the PIC-driven timer (already unmasked by
/// `interrupts::init_interrupts`) if the mapping fails.
fn bring_up_local_apic() {
    use x86_64::structures::paging::PageTableFlags;

    let virt = LAPIC_PHYS_BASE + mm::vmm::PHYS_MEM_OFFSET;
    let flags = PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::NO_CACHE;
    match mm::vmm::map_page(virt, LAPIC_PHYS_BASE, flags) {
        Ok(()) | Err(mm::vmm::VmmError::AlreadyMapped) => {
            arch::init_lapic(virt);
            interrupts::mask_legacy_pic();
        }
        Err(e) => {
            kwarn!("lapic: failed to map MMIO page ({:?}); staying on PIC timer", e);
        }
    }
}

pub fn panic(info: &PanicInfo) -> ! {
    kfatal!("KERNEL PANIC: {}", info);
    arch::halt_loop()
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        $crate::vga_buffer::_print(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! println {
    () => { $crate::print!("\n") };
    ($($arg:tt)*) => {{
        $crate::vga_buffer::_print(format_args!($($arg)*));
        $crate::vga_buffer::_print(format_args!("\n"));
    }};
}

#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => {
        $crate::serial::_print(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! serial_println {
    () => { $crate::serial_print!("\n") };
    ($($arg:tt)*) => {{
        $crate::serial::_print(format_args!($($arg)*));
        $crate::serial::_print(format_args!("\n"));
    }};
}

#[macro_export]
macro_rules! klog {
    ($level:expr, $($arg:tt)*) => {{
        $crate::logger::log($level, format_args!($($arg)*));
    }};
}

#[macro_export]
macro_rules! kfatal {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::Fatal, $($arg)*);
    }};
}

/// Unrecoverable kernel error: logs at `Fatal` level, then halts. Used at
/// call sites that can't return (CPU exceptions with no recovery path),
/// where `kfatal!` alone wouldn't satisfy a `-> !` return type.
#[macro_export]
macro_rules! kpanic {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::Fatal, $($arg)*);
        $crate::arch::halt_loop()
    }};
}

#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::Error, $($arg)*);
    }};
}

#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::Warn, $($arg)*);
    }};
}

#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::Info, $($arg)*);
    }};
}

#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::Debug, $($arg)*);
    }};
}

#[macro_export]
macro_rules! ktrace {
    ($($arg:tt)*) => {{
        $crate::klog!($crate::logger::LogLevel::Trace, $($arg)*);
    }};
}
