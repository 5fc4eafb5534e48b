//! A minimal type-2 hypervisor: boots a 32-bit ELF guest kernel under KVM,
//! services a paravirtual console and ACPI-style shutdown, and nothing
//! else.

pub mod config;
pub mod cpu;
pub mod dispatch;
pub mod error;
pub mod hvb;
pub mod loader;
pub mod memory;

pub use config::Config;
pub use error::{Error, Result};

use memory::GuestMemory;

/// Boots the guest described by `config` and services it until shutdown or
/// a fatal error. HVB setup →
/// image load → vCPU bootstrap → dispatch loop.
pub fn run(config: Config) -> Result<()> {
    let Config {
        kernel_path,
        initrd_path,
        mem_size,
        mode,
        mut stdout,
        mut stdin,
    } = config;

    let endpoint = hvb::Endpoint::open()?;
    let vm = endpoint.create_vm()?;

    let mut guest_memory = GuestMemory::new(mem_size)?;

    let loaded = loader::elf::load_elf32(&mut guest_memory, &kernel_path)?;
    let mut memory_map =
        loader::MemoryMap::kernel_only(loaded.kernel_base, loaded.kernel_size);

    if let Some(path) = initrd_path {
        let (initrd_base, initrd_size) = loader::initrd::load_initrd(
            &mut guest_memory,
            memory_map.kernel_base,
            memory_map.kernel_size,
            &path,
        )?;
        memory_map.initrd_base = initrd_base;
        memory_map.initrd_size = initrd_size;
    }

    guest_memory.install_into(&vm)?;

    let mut vcpu = vm.create_vcpu(0)?;
    cpu::bootstrap(&vcpu, mode, loaded.entry_va, &memory_map)?;

    dispatch::dispatch_loop(&mut vcpu, &mut *stdout, &mut *stdin)
}
