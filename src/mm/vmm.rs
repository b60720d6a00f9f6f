//! Virtual memory mapper built on the `x86_64` crate's 4-level page table
//! abstractions, using a fixed physical-memory offset mapping (the whole of
//! physical memory is identity-mapped at `PHYS_MEM_OFFSET`).

use spin::Mutex;
use x86_64::structures::paging::{
    FrameAllocator, Mapper, OffsetPageTable, Page, PageTable, PageTableFlags, PhysFrame, Size4KiB,
};
use x86_64::{PhysAddr, VirtAddr};

use super::pmm;

/// Physical memory is mapped 1:1 starting at this virtual offset. The boot
/// assembly stub's page tables are expected to provide this mapping for at
/// least the range covered by the memory map's usable regions.
pub const PHYS_MEM_OFFSET: u64 = 0xFFFF_8000_0000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmmError {
    AllocationFailed,
    AlreadyMapped,
    NotAligned,
}

struct FrameAlloc;

unsafe impl FrameAllocator<Size4KiB> for FrameAlloc {
    fn allocate_frame(&mut self) -> Option<PhysFrame<Size4KiB>> {
        let phys = pmm::alloc_page().ok()?;
        PhysFrame::from_start_address(PhysAddr::new(phys)).ok()
    }
}

static MAPPER: Mutex<Option<OffsetPageTable<'static>>> = Mutex::new(None);

pub fn init() {
    let level_4_table = unsafe { active_level_4_table() };
    let mapper = unsafe { OffsetPageTable::new(level_4_table, VirtAddr::new(PHYS_MEM_OFFSET)) };
    *MAPPER.lock() = Some(mapper);
}

unsafe fn active_level_4_table() -> &'static mut PageTable {
    use x86_64::registers::control::Cr3;

    let (frame, _) = Cr3::read();
    let phys = frame.start_address().as_u64();
    let virt = VirtAddr::new(phys + PHYS_MEM_OFFSET);
    let ptr: *mut PageTable = virt.as_mut_ptr();
    &mut *ptr
}

/// Maps `virt` to `phys` with the given flags. Allocates any intermediate
/// page-table frames that don't exist yet.
pub fn map_page(virt: u64, phys: u64, flags: PageTableFlags) -> Result<(), VmmError> {
    if virt % 4096 != 0 || phys % 4096 != 0 {
        return Err(VmmError::NotAligned);
    }

    let mut guard = MAPPER.lock();
    let mapper = guard.as_mut().expect("vmm::init must run before map_page");

    let page = Page::<Size4KiB>::containing_address(VirtAddr::new(virt));
    let frame = PhysFrame::containing_address(PhysAddr::new(phys));

    let mut allocator = FrameAlloc;
    unsafe {
        mapper
            .map_to(page, frame, flags, &mut allocator)
            .map_err(|_| VmmError::AlreadyMapped)?
            .flush();
    }
    Ok(())
}

/// Returns whether `virt` currently resolves to a physical frame.
pub fn is_mapped(virt: u64) -> bool {
    let guard = MAPPER.lock();
    let Some(mapper) = guard.as_ref() else {
        return false;
    };
    use x86_64::structures::paging::mapper::Translate;
    mapper.translate_addr(VirtAddr::new(virt)).is_some()
}

/// Resolves `virt` (assumed page-aligned) to its backing physical frame
/// address, if mapped.
pub fn translate(virt: u64) -> Option<u64> {
    let guard = MAPPER.lock();
    let mapper = guard.as_ref()?;
    use x86_64::structures::paging::mapper::Translate;
    mapper.translate_addr(VirtAddr::new(virt)).map(|a| a.as_u64())
}

/// Unmaps a single page, flushing the TLB entry. Does not free the backing frame.
pub fn unmap_page(virt: u64) -> Result<(), VmmError> {
    let mut guard = MAPPER.lock();
    let mapper = guard.as_mut().expect("vmm::init must run before unmap_page");
    let page = Page::<Size4KiB>::containing_address(VirtAddr::new(virt));
    let (_, flush) = mapper.unmap(page).map_err(|_| VmmError::NotAligned)?;
    flush.flush();
    Ok(())
}
