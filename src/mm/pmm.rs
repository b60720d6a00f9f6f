//! Physical frame allocator: a bitmap over 4 KiB frames, seeded from the
//! Multiboot2 memory map.

use alloc::vec::Vec;
use spin::Mutex;

const FRAME_SIZE: u64 = 4096;
const MAX_FRAMES: usize = 1 << 20; // covers up to 4 GiB of physical address space

struct Bitmap {
    bits: Vec<u64>,
    frame_count: usize,
    next_hint: usize,
}

impl Bitmap {
    const fn empty() -> Self {
        Self {
            bits: Vec::new(),
            frame_count: 0,
            next_hint: 0,
        }
    }

    fn set_used(&mut self, frame: usize, used: bool) {
        let word = frame / 64;
        let bit = frame % 64;
        if word >= self.bits.len() {
            return;
        }
        if used {
            self.bits[word] |= 1 << bit;
        } else {
            self.bits[word] &= !(1 << bit);
        }
    }

    fn is_used(&self, frame: usize) -> bool {
        let word = frame / 64;
        let bit = frame % 64;
        word >= self.bits.len() || (self.bits[word] & (1 << bit)) != 0
    }

    fn alloc_one(&mut self) -> Option<usize> {
        for offset in 0..self.frame_count {
            let frame = (self.next_hint + offset) % self.frame_count;
            if !self.is_used(frame) {
                self.set_used(frame, true);
                self.next_hint = frame + 1;
                return Some(frame);
            }
        }
        None
    }

    fn alloc_contiguous(&mut self, count: usize) -> Option<usize> {
        if count == 0 {
            return None;
        }
        let mut run_start = None;
        let mut run_len = 0;
        for frame in 0..self.frame_count {
            if self.is_used(frame) {
                run_start = None;
                run_len = 0;
                continue;
            }
            if run_start.is_none() {
                run_start = Some(frame);
            }
            run_len += 1;
            if run_len == count {
                let start = run_start.unwrap();
                for f in start..start + count {
                    self.set_used(f, true);
                }
                return Some(start);
            }
        }
        None
    }
}

static BITMAP: Mutex<Bitmap> = Mutex::new(Bitmap::empty());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PmmError {
    OutOfMemory,
    NotFrameAligned,
    OutOfRange,
}

/// Seeds the bitmap from the bootloader-reported memory map. `reserved_end`
/// (kernel image + boot heap) is marked used regardless of what the map says,
/// since the allocator itself and the heap it returned live there.
pub fn init(boot_info: &multiboot2::BootInformation<'_>, reserved_end: u64) {
    use multiboot2::MemoryAreaType;

    let mut bitmap = BITMAP.lock();
    let frame_count = MAX_FRAMES;
    bitmap.bits = alloc::vec![u64::MAX; (frame_count + 63) / 64];
    bitmap.frame_count = frame_count;

    let Some(memmap) = boot_info.memory_map_tag() else {
        crate::kerror!("pmm: no memory map tag; physical allocator has no usable frames");
        return;
    };

    for area in memmap.memory_areas() {
        if area.typ() != MemoryAreaType::Available {
            continue;
        }
        let start = align_up(area.start_address() as u64);
        let end = align_down(area.end_address() as u64);
        if end <= start {
            continue;
        }
        let first_frame = (start / FRAME_SIZE) as usize;
        let last_frame = (end / FRAME_SIZE) as usize;
        for frame in first_frame..last_frame.min(frame_count) {
            bitmap.set_used(frame, false);
        }
    }

    // Never hand out frame 0 (commonly used as a null-physical-address sentinel)
    // or anything below reserved_end.
    let reserved_frames = (align_up(reserved_end) / FRAME_SIZE) as usize;
    for frame in 0..reserved_frames.min(frame_count) {
        bitmap.set_used(frame, true);
    }
}

/// Allocates a single 4 KiB physical frame.
pub fn alloc_page() -> Result<u64, PmmError> {
    BITMAP
        .lock()
        .alloc_one()
        .map(|frame| frame as u64 * FRAME_SIZE)
        .ok_or(PmmError::OutOfMemory)
}

/// Allocates `count` physically contiguous 4 KiB frames.
pub fn alloc_pages(count: usize) -> Result<u64, PmmError> {
    BITMAP
        .lock()
        .alloc_contiguous(count)
        .map(|frame| frame as u64 * FRAME_SIZE)
        .ok_or(PmmError::OutOfMemory)
}

/// Frees a single frame previously returned by `alloc_page`.
pub fn free_page(phys_addr: u64) -> Result<(), PmmError> {
    if phys_addr % FRAME_SIZE != 0 {
        return Err(PmmError::NotFrameAligned);
    }
    let frame = (phys_addr / FRAME_SIZE) as usize;
    let mut bitmap = BITMAP.lock();
    if frame >= bitmap.frame_count {
        return Err(PmmError::OutOfRange);
    }
    bitmap.set_used(frame, false);
    Ok(())
}

/// Frees `count` frames starting at `phys_addr`.
pub fn free_pages(phys_addr: u64, count: usize) -> Result<(), PmmError> {
    for i in 0..count {
        free_page(phys_addr + i as u64 * FRAME_SIZE)?;
    }
    Ok(())
}

fn align_up(addr: u64) -> u64 {
    (addr + FRAME_SIZE - 1) & !(FRAME_SIZE - 1)
}

fn align_down(addr: u64) -> u64 {
    addr & !(FRAME_SIZE - 1)
}
