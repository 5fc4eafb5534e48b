//! Thin, typed adapter over `/dev/kvm` (`kvm-ioctls`/`kvm-bindings`).
//!
//! Every other module talks to the host only through this one; it performs
//! no policy of its own beyond translating `kvm-ioctls` error and exit types
//! into this crate's own `Error`/`ExitReason`.

use kvm_bindings::{kvm_regs, kvm_sregs, kvm_userspace_memory_region, KVM_API_VERSION};
use kvm_ioctls::{Kvm, VcpuExit, VcpuFd, VmFd};

use crate::error::{Error, Result};

/// An open handle to `/dev/kvm`.
pub struct Endpoint {
    kvm: Kvm,
}

impl Endpoint {
    /// Opens `/dev/kvm` and checks that the reported API version matches the
    /// single version this crate was built against.
    pub fn open() -> Result<Self> {
        let kvm = Kvm::new()?;
        let got = kvm.get_api_version();
        let want = KVM_API_VERSION as i32;
        if got != want {
            return Err(Error::VersionMismatch { got, want });
        }
        log::debug!("opened /dev/kvm, API version {got}");
        Ok(Self { kvm })
    }

    pub fn create_vm(&self) -> Result<VmHandle> {
        let vm = self.kvm.create_vm()?;
        Ok(VmHandle { vm })
    }
}

/// A single guest VM: one installed memory region, zero or more vCPUs.
pub struct VmHandle {
    vm: VmFd,
}

impl VmHandle {
    /// Registers a userspace memory region at `guest_phys` in the given
    /// `slot`, backed by `size` bytes starting at `host_ptr`.
    pub fn install_memory(
        &self,
        slot: u32,
        guest_phys: u64,
        host_ptr: *mut u8,
        size: usize,
    ) -> Result<()> {
        let region = kvm_userspace_memory_region {
            slot,
            guest_phys_addr: guest_phys,
            memory_size: size as u64,
            userspace_addr: host_ptr as u64,
            flags: 0,
        };
        // SAFETY: `host_ptr` backs a live mapping of at least `size` bytes
        // for as long as the region stays installed; the caller (GuestMemory)
        // upholds that by construction.
        unsafe {
            self.vm.set_user_memory_region(region)?;
        }
        Ok(())
    }

    pub fn create_vcpu(&self, id: u8) -> Result<VcpuHandle> {
        let vcpu_fd = self.vm.create_vcpu(id as u64)?;
        log::debug!("created vcpu {id}");
        Ok(VcpuHandle { vcpu_fd })
    }
}

/// A single virtual CPU. `kvm-ioctls` owns and sizes the shared `kvm_run`
/// page internally; `run` hands back the already-decoded exit.
pub struct VcpuHandle {
    vcpu_fd: VcpuFd,
}

impl VcpuHandle {
    pub fn get_sregs(&self) -> Result<kvm_sregs> {
        Ok(self.vcpu_fd.get_sregs()?)
    }

    pub fn set_sregs(&self, sregs: &kvm_sregs) -> Result<()> {
        self.vcpu_fd.set_sregs(sregs)?;
        Ok(())
    }

    pub fn set_regs(&self, regs: &kvm_regs) -> Result<()> {
        self.vcpu_fd.set_regs(regs)?;
        Ok(())
    }

    /// Runs the vCPU until the next VM exit and decodes it into an
    /// `ExitReason`, the only shape the dispatcher ever sees. `IoIn`'s data
    /// buffer borrows directly from the shared `kvm_run` page for the
    /// duration of this call, exactly like `kvm-ioctls`'s own `VcpuExit`, so
    /// the dispatcher must fill it in before the next `run`.
    pub fn run(&mut self) -> Result<ExitReason<'_>> {
        let exit = self.vcpu_fd.run()?;
        Ok(match exit {
            VcpuExit::Hlt => ExitReason::Hlt,
            VcpuExit::IoOut(port, data) => ExitReason::IoOut { port, data },
            VcpuExit::IoIn(port, data) => ExitReason::IoIn { port, data },
            other => ExitReason::Other(format!("{other:?}")),
        })
    }
}

/// A VM exit translated out of `kvm-ioctls`'s `VcpuExit`, decoded once per
/// dispatch-loop iteration. `IoOut`/`IoIn` payloads borrow the shared
/// `kvm_run` page and are bounded to 1, 2, or 4 bytes by the host interface.
#[derive(Debug)]
pub enum ExitReason<'a> {
    Hlt,
    IoOut { port: u16, data: &'a [u8] },
    IoIn { port: u16, data: &'a mut [u8] },
    Other(String),
}
