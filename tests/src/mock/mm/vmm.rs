//! Stand-in for `mm::vmm`: a plain virt-to-phys map instead of real 4-level
//! page tables. `PHYS_MEM_OFFSET` is fixed at zero, so a physical address
//! returned by the mock `pmm` (a real host pointer) is directly usable
//! without translation.

use std::collections::HashMap;
use std::sync::Mutex;

use x86_64::structures::paging::PageTableFlags;

pub const PHYS_MEM_OFFSET: u64 = 0;
const PAGE_SIZE: u64 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmmError {
    AllocationFailed,
    AlreadyMapped,
    NotAligned,
}

static MAP: Mutex<Option<HashMap<u64, u64>>> = Mutex::new(None);

fn with_map<R>(f: impl FnOnce(&mut HashMap<u64, u64>) -> R) -> R {
    let mut guard = MAP.lock().unwrap();
    let map = guard.get_or_insert_with(HashMap::new);
    f(map)
}

/// Maps `virt` to `phys`. Ignores `flags`: there's no real page table to
/// program permissions into.
pub fn map_page(virt: u64, phys: u64, _flags: PageTableFlags) -> Result<(), VmmError> {
    if virt % PAGE_SIZE != 0 || phys % PAGE_SIZE != 0 {
        return Err(VmmError::NotAligned);
    }
    with_map(|m| {
        if m.contains_key(&virt) {
            return Err(VmmError::AlreadyMapped);
        }
        m.insert(virt, phys);
        Ok(())
    })
}

pub fn is_mapped(virt: u64) -> bool {
    with_map(|m| m.contains_key(&virt))
}

/// Resolves `virt` (assumed page-aligned) to its backing physical address.
pub fn translate(virt: u64) -> Option<u64> {
    with_map(|m| m.get(&virt).copied())
}

pub fn unmap_page(virt: u64) -> Result<(), VmmError> {
    with_map(|m| m.remove(&virt).map(|_| ()).ok_or(VmmError::AllocationFailed))
}
