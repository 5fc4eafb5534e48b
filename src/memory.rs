//! A single contiguous, anonymously-mapped region of guest-physical memory.

use crate::error::{Error, Result};
use crate::hvb::VmHandle;

/// Owns the host-side mapping that backs guest-physical address `0..size`.
///
/// The mapping is never resized and is released only when this value is
/// dropped, which must happen no earlier than the `VmHandle` it was
/// installed into.
pub struct GuestMemory {
    host_base: *mut u8,
    size: usize,
}

// SAFETY: the mapping is exclusively owned by this value, and no other
// thread touches it while the guest is running.
unsafe impl Send for GuestMemory {}

impl GuestMemory {
    /// Allocates an anonymous, private, non-reserved mapping of `size` bytes
    /// and advises the host kernel that its pages are merge-eligible (KSM).
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::OutOfMemory);
        }

        log::info!("allocating {size} bytes of guest memory");

        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_ANONYMOUS | libc::MAP_PRIVATE | libc::MAP_NORESERVE,
                -1,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            log::error!("mmap of {size} bytes for guest memory failed");
            return Err(Error::OutOfMemory);
        }

        unsafe {
            // Best-effort: KSM may not be compiled into the host kernel, and
            // that is not a reason to fail VM setup.
            libc::madvise(ptr, size, libc::MADV_MERGEABLE);
        }

        Ok(Self {
            host_base: ptr as *mut u8,
            size,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Raw host pointer backing guest-physical address 0. Used only by
    /// `install_into` and the loader's bounded writer.
    pub(crate) fn host_base(&self) -> *mut u8 {
        self.host_base
    }

    /// Bounded write into `[offset, offset + bytes.len())`.
    pub fn write(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        let end = offset
            .checked_add(bytes.len() as u64)
            .ok_or(Error::OutOfBounds)?;
        if end > self.size as u64 {
            return Err(Error::OutOfBounds);
        }

        unsafe {
            let dst = self.host_base.add(offset as usize);
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len());
        }
        Ok(())
    }

    /// Reads back a bounded range; used by tests to assert load fidelity.
    #[cfg(test)]
    pub fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let end = offset
            .checked_add(len as u64)
            .ok_or(Error::OutOfBounds)?;
        if end > self.size as u64 {
            return Err(Error::OutOfBounds);
        }
        let mut buf = vec![0u8; len];
        unsafe {
            let src = self.host_base.add(offset as usize);
            std::ptr::copy_nonoverlapping(src, buf.as_mut_ptr(), len);
        }
        Ok(buf)
    }

    /// Installs this region into `vm` at slot 0, guest-physical base 0.
    pub fn install_into(&self, vm: &VmHandle) -> Result<()> {
        vm.install_memory(0, 0, self.host_base, self.size)
    }
}

impl Drop for GuestMemory {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.host_base as *mut libc::c_void, self.size);
        }
    }
}
