//! ELF32 kernel loading.

use std::path::Path;

use goblin::elf::program_header::PT_LOAD;
use goblin::elf::Elf;

use crate::error::{Error, ImageErrorKind, Result};
use crate::memory::GuestMemory;

const EI_MAG: [u8; 4] = [0x7F, b'E', b'L', b'F'];
const ELFCLASS32: u8 = 1;
const ELFDATA2LSB: u8 = 1;
const EV_CURRENT: u8 = 1;
const ET_EXEC: u16 = 2;
const EM_386: u16 = 3;

/// What `load_elf32` recorded about the image it just placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadedKernel {
    pub entry_va: u32,
    pub kernel_base: u32,
    pub kernel_size: u32,
}

/// Validates the seven ELF32 header conditions, in
/// order, against the raw file bytes.
fn validate_header(data: &[u8]) -> Result<()> {
    if data.len() < 52 {
        return Err(Error::InvalidImage(ImageErrorKind::Magic));
    }
    if data[0..4] != EI_MAG {
        return Err(Error::InvalidImage(ImageErrorKind::Magic));
    }
    if data[4] != ELFCLASS32 {
        return Err(Error::InvalidImage(ImageErrorKind::Class));
    }
    if data[5] != ELFDATA2LSB {
        return Err(Error::InvalidImage(ImageErrorKind::Encoding));
    }
    if data[6] != EV_CURRENT {
        return Err(Error::InvalidImage(ImageErrorKind::IdentVersion));
    }

    let e_type = u16::from_le_bytes([data[16], data[17]]);
    if e_type != ET_EXEC {
        return Err(Error::InvalidImage(ImageErrorKind::ObjectType));
    }

    let e_machine = u16::from_le_bytes([data[18], data[19]]);
    if e_machine != EM_386 {
        return Err(Error::InvalidImage(ImageErrorKind::Machine));
    }

    let e_version = u32::from_le_bytes([data[20], data[21], data[22], data[23]]);
    if e_version != EV_CURRENT as u32 {
        return Err(Error::InvalidImage(ImageErrorKind::HeaderVersion));
    }

    Ok(())
}

/// Reads `path`, validates its ELF32 header, and copies every `PT_LOAD`
/// segment's file-backed bytes into `guest_memory` at `p_vaddr`.
pub fn load_elf32(guest_memory: &mut GuestMemory, path: &Path) -> Result<LoadedKernel> {
    let data = std::fs::read(path)?;
    validate_header(&data)?;

    let elf = Elf::parse(&data).map_err(|e| {
        log::warn!("malformed ELF despite valid header: {e}");
        Error::InvalidImage(ImageErrorKind::Magic)
    })?;

    let mut kernel_base = u64::MAX;
    let mut kernel_end = 0u64;

    for (index, ph) in elf.program_headers.iter().enumerate() {
        if ph.p_type != PT_LOAD {
            continue;
        }

        let seg_end = ph
            .p_vaddr
            .checked_add(ph.p_memsz)
            .ok_or(Error::SegmentOutOfBounds(index))?;
        if seg_end > guest_memory.size() as u64 {
            return Err(Error::SegmentOutOfBounds(index));
        }

        let file_start = ph.p_offset as usize;
        let file_end = file_start + ph.p_filesz as usize;
        let bytes = data
            .get(file_start..file_end)
            .ok_or(Error::SegmentOutOfBounds(index))?;
        guest_memory.write(ph.p_vaddr, bytes)?;

        kernel_base = kernel_base.min(ph.p_vaddr);
        kernel_end = kernel_end.max(seg_end);
    }

    if kernel_base == u64::MAX {
        return Err(Error::InvalidImage(ImageErrorKind::EntryNotLoaded));
    }

    let kernel_size = kernel_end - kernel_base;
    let entry_va = elf.entry;
    if entry_va < kernel_base || entry_va >= kernel_base + kernel_size {
        return Err(Error::InvalidImage(ImageErrorKind::EntryNotLoaded));
    }

    log::info!(
        "loaded kernel: base={kernel_base:#x} size={kernel_size:#x} entry={entry_va:#x}"
    );

    Ok(LoadedKernel {
        entry_va: entry_va as u32,
        kernel_base: kernel_base as u32,
        kernel_size: kernel_size as u32,
    })
}


#[cfg(test)]
mod tests {
    use super::test_fixtures::build_elf32;
    use super::*;
    use std::io::Write;

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f
    }

    #[test]
    fn loads_segment_bytes_verbatim() {
        let payload = b"\xf4\xf4\xf4\xf4hello kernel";
        let image = build_elf32(0x1000, 0x2000, payload);
        let file = write_temp(&image);

        let mut mem = GuestMemory::new(0x10000).unwrap();
        let loaded = load_elf32(&mut mem, file.path()).unwrap();

        assert_eq!(loaded.kernel_base, 0x1000);
        assert_eq!(loaded.kernel_size, 0x2000);
        assert_eq!(loaded.entry_va, 0x1000);
        assert_eq!(mem.read(0x1000, payload.len()).unwrap(), payload);
    }

    #[test]
    fn kernel_map_uses_min_vaddr_and_max_extent() {
        let image = build_elf32(0x2000, 0x1000, b"x");
        let file = write_temp(&image);
        let mut mem = GuestMemory::new(0x10000).unwrap();
        let loaded = load_elf32(&mut mem, file.path()).unwrap();
        assert_eq!(loaded.kernel_base, 0x2000);
        assert_eq!(loaded.kernel_size, 0x1000);
    }

    #[test]
    fn rejects_segment_outside_guest_memory() {
        let image = build_elf32(0x1000, 0x2000, b"x");
        let file = write_temp(&image);
        let mut mem = GuestMemory::new(0x1000).unwrap();
        assert!(matches!(
            load_elf32(&mut mem, file.path()),
            Err(Error::SegmentOutOfBounds(0))
        ));
    }

    #[test]
    fn rejects_entry_outside_loaded_range() {
        let image = super::test_fixtures::build_elf32_with_entry(0x1000, 0x2000, b"x", 0x9000);
        let file = write_temp(&image);
        let mut mem = GuestMemory::new(0x10000).unwrap();
        assert!(matches!(
            load_elf32(&mut mem, file.path()),
            Err(Error::InvalidImage(ImageErrorKind::EntryNotLoaded))
        ));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut image = build_elf32(0x1000, 0x1000, b"x");
        image[0] = 0;
        let file = write_temp(&image);
        let mut mem = GuestMemory::new(0x10000).unwrap();
        assert!(matches!(
            load_elf32(&mut mem, file.path()),
            Err(Error::InvalidImage(ImageErrorKind::Magic))
        ));
    }

    #[test]
    fn rejects_non_32bit_class() {
        let mut image = build_elf32(0x1000, 0x1000, b"x");
        image[4] = 2; // ELFCLASS64
        let file = write_temp(&image);
        let mut mem = GuestMemory::new(0x10000).unwrap();
        assert!(matches!(
            load_elf32(&mut mem, file.path()),
            Err(Error::InvalidImage(ImageErrorKind::Class))
        ));
    }

    #[test]
    fn rejects_big_endian() {
        let mut image = build_elf32(0x1000, 0x1000, b"x");
        image[5] = 2; // ELFDATA2MSB
        let file = write_temp(&image);
        let mut mem = GuestMemory::new(0x10000).unwrap();
        assert!(matches!(
            load_elf32(&mut mem, file.path()),
            Err(Error::InvalidImage(ImageErrorKind::Encoding))
        ));
    }

    #[test]
    fn rejects_bad_ident_version() {
        let mut image = build_elf32(0x1000, 0x1000, b"x");
        image[6] = 0;
        let file = write_temp(&image);
        let mut mem = GuestMemory::new(0x10000).unwrap();
        assert!(matches!(
            load_elf32(&mut mem, file.path()),
            Err(Error::InvalidImage(ImageErrorKind::IdentVersion))
        ));
    }

    #[test]
    fn rejects_non_executable_type() {
        let mut image = build_elf32(0x1000, 0x1000, b"x");
        image[16..18].copy_from_slice(&1u16.to_le_bytes()); // ET_REL
        let file = write_temp(&image);
        let mut mem = GuestMemory::new(0x10000).unwrap();
        assert!(matches!(
            load_elf32(&mut mem, file.path()),
            Err(Error::InvalidImage(ImageErrorKind::ObjectType))
        ));
    }

    #[test]
    fn rejects_wrong_machine() {
        let mut image = build_elf32(0x1000, 0x1000, b"x");
        image[18..20].copy_from_slice(&62u16.to_le_bytes()); // EM_X86_64
        let file = write_temp(&image);
        let mut mem = GuestMemory::new(0x10000).unwrap();
        assert!(matches!(
            load_elf32(&mut mem, file.path()),
            Err(Error::InvalidImage(ImageErrorKind::Machine))
        ));
    }

    #[test]
    fn rejects_bad_header_version() {
        let mut image = build_elf32(0x1000, 0x1000, b"x");
        image[20..24].copy_from_slice(&0u32.to_le_bytes());
        let file = write_temp(&image);
        let mut mem = GuestMemory::new(0x10000).unwrap();
        assert!(matches!(
            load_elf32(&mut mem, file.path()),
            Err(Error::InvalidImage(ImageErrorKind::HeaderVersion))
        ));
    }

    #[test]
    fn accepts_a_file_that_passes_every_check() {
        let image = build_elf32(0x1000, 0x1000, b"x");
        let file = write_temp(&image);
        let mut mem = GuestMemory::new(0x10000).unwrap();
        assert!(load_elf32(&mut mem, file.path()).is_ok());
    }
}
