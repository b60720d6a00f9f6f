//! ELF64 loader: validates the header, materializes PT_LOAD
//! segments through the `mm` façade, and applies `R_X86_64_RELATIVE`
//! relocations from the PT_DYNAMIC segment.

use alloc::vec::Vec;

use x86_64::structures::paging::PageTableFlags;

use crate::mm::{pmm, vmm};

const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
const ELFCLASS64: u8 = 2;
const ELFDATA2LSB: u8 = 1;
const EV_CURRENT: u8 = 1;
const EM_X86_64: u16 = 0x3E;

const ET_EXEC: u16 = 2;
const ET_DYN: u16 = 3;

const PT_LOAD: u32 = 1;
const PT_DYNAMIC: u32 = 2;
const PT_INTERP: u32 = 3;

const PF_X: u32 = 1;
const PF_W: u32 = 2;

const DT_RELA: u64 = 7;
const DT_RELASZ: u64 = 8;
const DT_NULL: u64 = 0;

const R_X86_64_NONE: u32 = 0;
const R_X86_64_RELATIVE: u32 = 8;

/// Base address imposed on position-independent (`ET_DYN`) executables that
/// don't request one of their own. Below this, addresses collide with the
/// zero page and common null-pointer-sized bugs.
const DYN_BASE_FLOOR: u64 = 0x0040_0000;
const PAGE_SIZE: u64 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderError {
    TooShort,
    BadMagic,
    WrongClass,
    WrongEndianness,
    WrongVersion,
    WrongMachine,
    ProgramHeaderOutOfBounds,
    SegmentOutOfBounds,
    MapFailed,
}

pub struct LoadedImage {
    pub entry: u64,
    pub base: u64,
    pub load_end: u64,
    pub is_pie: bool,
    pub interpreter: Option<alloc::string::String>,
    pub bss_start: u64,
    pub bss_end: u64,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct Elf64Header {
    e_ident: [u8; 16],
    e_type: u16,
    e_machine: u16,
    e_version: u32,
    e_entry: u64,
    e_phoff: u64,
    e_shoff: u64,
    e_flags: u32,
    e_ehsize: u16,
    e_phentsize: u16,
    e_phnum: u16,
    e_shentsize: u16,
    e_shnum: u16,
    e_shstrndx: u16,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct Elf64ProgramHeader {
    p_type: u32,
    p_flags: u32,
    p_offset: u64,
    p_vaddr: u64,
    p_paddr: u64,
    p_filesz: u64,
    p_memsz: u64,
    p_align: u64,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct Elf64Dyn {
    d_tag: u64,
    d_val: u64,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct Elf64Rela {
    r_offset: u64,
    r_info: u64,
    r_addend: i64,
}

fn read_header(data: &[u8]) -> Result<Elf64Header, LoaderError> {
    if data.len() < core::mem::size_of::<Elf64Header>() {
        return Err(LoaderError::TooShort);
    }
    let header = unsafe { *(data.as_ptr() as *const Elf64Header) };
    if header.e_ident[0..4] != ELF_MAGIC {
        return Err(LoaderError::BadMagic);
    }
    if header.e_ident[4] != ELFCLASS64 {
        return Err(LoaderError::WrongClass);
    }
    if header.e_ident[5] != ELFDATA2LSB {
        return Err(LoaderError::WrongEndianness);
    }
    if header.e_ident[6] != EV_CURRENT {
        return Err(LoaderError::WrongVersion);
    }
    if header.e_machine != EM_X86_64 {
        return Err(LoaderError::WrongMachine);
    }
    Ok(header)
}

fn program_headers<'a>(
    data: &'a [u8],
    header: &Elf64Header,
) -> Result<&'a [Elf64ProgramHeader], LoaderError> {
    let phentsize = header.e_phentsize as usize;
    let phnum = header.e_phnum as usize;
    if phentsize != core::mem::size_of::<Elf64ProgramHeader>() {
        return Err(LoaderError::ProgramHeaderOutOfBounds);
    }
    let start = header.e_phoff as usize;
    let end = start
        .checked_add(phentsize * phnum)
        .ok_or(LoaderError::ProgramHeaderOutOfBounds)?;
    if end > data.len() {
        return Err(LoaderError::ProgramHeaderOutOfBounds);
    }
    let ptr = unsafe { data.as_ptr().add(start) } as *const Elf64ProgramHeader;
    Ok(unsafe { core::slice::from_raw_parts(ptr, phnum) })
}

/// Loads `data` (a whole ELF64 image held in memory, e.g. from an initramfs)
/// into freshly allocated, mapped physical pages and returns where it ended
/// up. Caller is responsible for switching into the resulting address space
/// before jumping to `entry`.
///
/// `requested_base` only matters for `ET_DYN` images: if the segment set's
/// own `p_vaddr` range begins below [`DYN_BASE_FLOOR`], the floor wins
/// regardless of what was asked for; otherwise `requested_base` is honoured
/// as-is. `ET_EXEC` images are always loaded at their linked addresses
/// (effectively base zero) and `requested_base` is ignored.
pub fn load(data: &[u8], requested_base: u64) -> Result<LoadedImage, LoaderError> {
    let header = read_header(data)?;
    let phdrs = program_headers(data, &header)?;

    let is_pie = header.e_type == ET_DYN;
    if header.e_type != ET_EXEC && header.e_type != ET_DYN {
        return Err(LoaderError::WrongMachine);
    }

    let base = if is_pie {
        let min_vaddr = phdrs
            .iter()
            .filter(|ph| ph.p_type == PT_LOAD)
            .map(|ph| ph.p_vaddr)
            .min()
            .unwrap_or(0);
        if min_vaddr < DYN_BASE_FLOOR {
            DYN_BASE_FLOOR
        } else {
            requested_base
        }
    } else {
        0
    };
    let mut load_end = base;
    let mut interpreter = None;
    let mut bss_start = base;
    let mut bss_end = base;
    let mut bss_seg_end = 0u64;

    for ph in phdrs {
        match ph.p_type {
            PT_LOAD => {
                let seg_start = base + ph.p_vaddr;
                let seg_end = seg_start + ph.p_memsz;
                load_end = load_end.max(align_up(seg_end));
                if seg_end > bss_seg_end {
                    bss_seg_end = seg_end;
                    bss_start = seg_start + ph.p_filesz;
                    bss_end = seg_end;
                }
                materialize_segment(data, ph, seg_start)?;
            }
            PT_INTERP => {
                let start = ph.p_offset as usize;
                let len = (ph.p_filesz as usize).min(255);
                let end = start
                    .checked_add(len)
                    .ok_or(LoaderError::SegmentOutOfBounds)?;
                if end > data.len() {
                    return Err(LoaderError::SegmentOutOfBounds);
                }
                let path = core::str::from_utf8(&data[start..end])
                    .unwrap_or("<invalid interp>")
                    .trim_end_matches('\0');
                interpreter = Some(alloc::string::String::from(path));
            }
            _ => {}
        }
    }

    for ph in phdrs {
        if ph.p_type == PT_DYNAMIC {
            apply_dynamic_relocations(data, ph, base)?;
        }
    }

    Ok(LoadedImage {
        entry: base + header.e_entry,
        base,
        load_end,
        is_pie,
        interpreter,
        bss_start,
        bss_end,
    })
}

fn align_up(addr: u64) -> u64 {
    (addr + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

fn align_down(addr: u64) -> u64 {
    addr & !(PAGE_SIZE - 1)
}

/// Maps the pages backing one PT_LOAD segment, copies `p_filesz` bytes from
/// the image, and zero-fills the BSS tail (`p_memsz - p_filesz`).
fn materialize_segment(
    data: &[u8],
    ph: &Elf64ProgramHeader,
    seg_vaddr: u64,
) -> Result<(), LoaderError> {
    let first_page = align_down(seg_vaddr);
    let last_page = align_down(seg_vaddr + ph.p_memsz.max(1) - 1).max(first_page);
    let page_count = ((last_page - first_page) / PAGE_SIZE + 1) as usize;

    let mut flags = PageTableFlags::PRESENT | PageTableFlags::USER_ACCESSIBLE;
    if ph.p_flags & PF_W != 0 {
        flags |= PageTableFlags::WRITABLE;
    }
    if ph.p_flags & PF_X == 0 {
        flags |= PageTableFlags::NO_EXECUTE;
    }

    for i in 0..page_count {
        let virt = first_page + i as u64 * PAGE_SIZE;
        let phys = pmm::alloc_page().map_err(|_| LoaderError::MapFailed)?;
        vmm::map_page(virt, phys, flags).map_err(|_| LoaderError::MapFailed)?;

        let page_ptr = (phys + vmm::PHYS_MEM_OFFSET) as *mut u8;
        unsafe { core::ptr::write_bytes(page_ptr, 0, PAGE_SIZE as usize) };
    }

    let file_start = ph.p_offset as usize;
    let file_end = file_start
        .checked_add(ph.p_filesz as usize)
        .ok_or(LoaderError::SegmentOutOfBounds)?;
    if file_end > data.len() {
        return Err(LoaderError::SegmentOutOfBounds);
    }

    for (i, byte) in data[file_start..file_end].iter().enumerate() {
        let dst_virt = seg_vaddr + i as u64;
        let page = align_down(dst_virt);
        let offset_in_page = (dst_virt - page) as usize;
        let phys = vmm::translate(page).ok_or(LoaderError::MapFailed)?;
        unsafe {
            let dst = (phys + vmm::PHYS_MEM_OFFSET) as *mut u8;
            dst.add(offset_in_page).write(*byte);
        }
    }

    Ok(())
}

fn apply_dynamic_relocations(
    data: &[u8],
    ph: &Elf64ProgramHeader,
    base: u64,
) -> Result<(), LoaderError> {
    let dyn_start = ph.p_offset as usize;
    let dyn_count = ph.p_filesz as usize / core::mem::size_of::<Elf64Dyn>();
    if dyn_start.checked_add(dyn_count * core::mem::size_of::<Elf64Dyn>())
        .map_or(true, |end| end > data.len())
    {
        return Err(LoaderError::SegmentOutOfBounds);
    }
    let entries = unsafe {
        core::slice::from_raw_parts(data.as_ptr().add(dyn_start) as *const Elf64Dyn, dyn_count)
    };

    let mut rela_off = None;
    let mut rela_size = 0u64;
    for entry in entries {
        match entry.d_tag {
            DT_RELA => rela_off = Some(entry.d_val),
            DT_RELASZ => rela_size = entry.d_val,
            DT_NULL => break,
            _ => {}
        }
    }

    let Some(rela_off) = rela_off else {
        return Ok(());
    };
    let rela_count = rela_size as usize / core::mem::size_of::<Elf64Rela>();
    if (rela_off as usize)
        .checked_add(rela_count * core::mem::size_of::<Elf64Rela>())
        .map_or(true, |end| end > data.len())
    {
        return Err(LoaderError::SegmentOutOfBounds);
    }
    let relas = unsafe {
        core::slice::from_raw_parts(
            data.as_ptr().add(rela_off as usize) as *const Elf64Rela,
            rela_count,
        )
    };

    let mut applied = Vec::with_capacity(rela_count);
    for rela in relas {
        let r_type = (rela.r_info & 0xFFFF_FFFF) as u32;
        match r_type {
            R_X86_64_NONE => {}
            R_X86_64_RELATIVE => {
                let value = (base as i64 + rela.r_addend) as u64;
                let target = base + rela.r_offset;
                let page = align_down(target);
                let offset_in_page = (target - page) as usize;
                let phys = vmm::translate(page).ok_or(LoaderError::MapFailed)?;
                unsafe {
                    let dst = (phys + vmm::PHYS_MEM_OFFSET + offset_in_page as u64) as *mut u64;
                    dst.write_unaligned(value);
                }
                applied.push(rela.r_offset);
            }
            other => {
                crate::kwarn!("elf: skipping unsupported relocation type {}", other);
            }
        }
    }
    Ok(())
}
