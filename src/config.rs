//! The `Config` value the front end hands to `run`.

use std::io::{Read, Write};
use std::path::PathBuf;

use crate::cpu::EntryMode;

/// Default guest memory size: 128 MiB.
pub const DEFAULT_MEM_SIZE: usize = 128 * 1024 * 1024;

/// Everything the core needs to boot one guest and service its I/O.
pub struct Config {
    pub kernel_path: PathBuf,
    pub initrd_path: Option<PathBuf>,
    pub mem_size: usize,
    pub mode: EntryMode,
    pub stdout: Box<dyn Write + Send>,
    pub stdin: Box<dyn Read + Send>,
}

impl Config {
    /// A `Config` for `kernel_path` with every other field at its
    /// documented default (128 MiB, real mode, process stdout/stdin).
    pub fn new(kernel_path: PathBuf) -> Self {
        Self {
            kernel_path,
            initrd_path: None,
            mem_size: DEFAULT_MEM_SIZE,
            mode: EntryMode::Real,
            stdout: Box::new(std::io::stdout()),
            stdin: Box::new(std::io::stdin()),
        }
    }
}
