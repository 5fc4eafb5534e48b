//! Init RAM disk staging.

use std::path::Path;

use crate::error::{Error, Result};
use crate::memory::GuestMemory;

use super::{round_up_to_page, INITRD_BASE};

/// Stages the file at `path` at the fixed guest-physical base
/// `INITRD_BASE`, after checking it neither overlaps the kernel image nor
/// runs past the end of guest memory. Returns `(initrd_base, initrd_size)`
/// with `initrd_size` rounded up to a 4096-byte page.
pub fn load_initrd(
    guest_memory: &mut GuestMemory,
    kernel_base: u32,
    kernel_size: u32,
    path: &Path,
) -> Result<(u32, u32)> {
    let data = std::fs::read(path)?;
    let file_size = data.len() as u64;

    let kernel_start = kernel_base as u64;
    let kernel_end = kernel_start + kernel_size as u64;
    let initrd_end = INITRD_BASE + file_size;

    if INITRD_BASE < kernel_end && initrd_end > kernel_start {
        return Err(Error::InitrdOverlap);
    }
    if initrd_end > guest_memory.size() as u64 {
        return Err(Error::InitrdTooLarge);
    }

    guest_memory.write(INITRD_BASE, &data)?;

    let initrd_size = round_up_to_page(file_size);
    log::info!("loaded initrd: base={INITRD_BASE:#x} size={initrd_size:#x}");

    Ok((INITRD_BASE as u32, initrd_size as u32))
}
