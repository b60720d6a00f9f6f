//! Stand-in for `mm::pmm`: hands out real host heap allocations, sized and
//! aligned like 4 KiB physical frames, instead of indexing a bitmap over
//! bootloader-reported RAM. Good enough for the loader, which only ever
//! treats the returned address as an opaque frame number.

use std::alloc::{alloc, dealloc, Layout};
use std::collections::HashMap;
use std::sync::Mutex;

const FRAME_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PmmError {
    OutOfMemory,
    NotFrameAligned,
    OutOfRange,
}

static LIVE: Mutex<Option<HashMap<u64, usize>>> = Mutex::new(None);

fn with_live<R>(f: impl FnOnce(&mut HashMap<u64, usize>) -> R) -> R {
    let mut guard = LIVE.lock().unwrap();
    let map = guard.get_or_insert_with(HashMap::new);
    f(map)
}

/// Allocates a single 4 KiB frame.
pub fn alloc_page() -> Result<u64, PmmError> {
    alloc_pages(1)
}

/// Allocates `count` contiguous 4 KiB frames.
pub fn alloc_pages(count: usize) -> Result<u64, PmmError> {
    if count == 0 {
        return Err(PmmError::OutOfRange);
    }
    let size = count * FRAME_SIZE;
    let layout = Layout::from_size_align(size, FRAME_SIZE).map_err(|_| PmmError::OutOfMemory)?;
    let ptr = unsafe { alloc(layout) };
    if ptr.is_null() {
        return Err(PmmError::OutOfMemory);
    }
    let addr = ptr as u64;
    with_live(|m| m.insert(addr, size));
    Ok(addr)
}

/// Frees a single frame previously returned by `alloc_page`.
pub fn free_page(phys_addr: u64) -> Result<(), PmmError> {
    free_pages(phys_addr, 1)
}

/// Frees `count` frames starting at `phys_addr`.
pub fn free_pages(phys_addr: u64, count: usize) -> Result<(), PmmError> {
    if phys_addr % FRAME_SIZE as u64 != 0 {
        return Err(PmmError::NotFrameAligned);
    }
    let size = with_live(|m| m.remove(&phys_addr)).ok_or(PmmError::OutOfRange)?;
    if size != count * FRAME_SIZE {
        with_live(|m| {
            m.insert(phys_addr, size);
        });
        return Err(PmmError::OutOfRange);
    }
    let layout = Layout::from_size_align(size, FRAME_SIZE).unwrap();
    unsafe { dealloc(phys_addr as *mut u8, layout) };
    Ok(())
}
