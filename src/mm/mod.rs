//! Physical/virtual memory façade.
//!
//! `process` and `process::loader` treat this module as an external
//! collaborator: a narrow, working reference implementation of frame
//! allocation, page mapping and the monotonic tick counter, so the kernel is
//! a complete bootable system rather than one with memory management stubbed
//! out entirely.

pub mod pmm;
pub mod timer;
pub mod vmm;

use linked_list_allocator::LockedHeap;

#[global_allocator]
static HEAP_ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Heap reserved for the kernel's own `alloc` usage (VFS node pool, UDP
/// socket table, scheduler bookkeeping). Per-process userspace heaps are
/// separate and are mapped by `process::loader`.
const KERNEL_HEAP_SIZE: usize = 2 * 1024 * 1024;

/// Brings up the physical frame allocator, the virtual memory mapper, the
/// kernel heap and the monotonic timer. Must run once, after `arch::init`
/// and before anything that allocates (`fs::init`, `net::init`, `process::init`).
pub fn init(boot_info: &multiboot2::BootInformation<'_>) {
    let (heap_phys_start, heap_size) =
        crate::memory::find_heap_region(boot_info, KERNEL_HEAP_SIZE as u64).unwrap_or_else(|| {
            crate::kerror!("mm: no region large enough for the kernel heap; using a fallback");
            (0x0010_0000, KERNEL_HEAP_SIZE as u64)
        });
    let heap_size = heap_size.min(KERNEL_HEAP_SIZE as u64) as usize;

    pmm::init(boot_info, heap_phys_start + heap_size as u64);
    vmm::init();

    unsafe {
        HEAP_ALLOCATOR
            .lock()
            .init(heap_phys_start as *mut u8, heap_size);
    }

    timer::init();

    crate::kinfo!(
        "mm: kernel heap at {:#x}, {} KiB",
        heap_phys_start,
        heap_size / 1024
    );
}
