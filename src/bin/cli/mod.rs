//! Command-line surface. Not part of the tested core contract,
//! but wired up so the crate is runnable end to end.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;

use clap::Parser;
use vmlet::config::{Config, DEFAULT_MEM_SIZE};
use vmlet::cpu::EntryMode;
use vmlet::error::{Error, Result};

#[derive(Parser)]
#[command(name = "vmlet")]
pub struct Cli {
    /// Path to a 32-bit little-endian Intel 80386 ELF executable.
    #[arg(short = 'k', long = "kernel")]
    kernel: PathBuf,

    /// Init RAM disk file, loaded at guest-physical 0x00800000.
    #[arg(long = "initrd")]
    initrd: Option<PathBuf>,

    /// Total guest memory, e.g. "256M", "1G". Suffix (K/M/G) is required.
    #[arg(long = "memory")]
    memory: Option<String>,

    /// Enter the guest in 32-bit protected mode instead of real mode.
    #[arg(long = "protected")]
    protected: bool,

    /// Redirect guest console output to a file (truncating).
    #[arg(long = "stdout")]
    stdout: Option<PathBuf>,

    /// Redirect guest console input from a file.
    #[arg(long = "stdin")]
    stdin: Option<PathBuf>,
}

impl Cli {
    /// Resolves the parsed flags into a `Config`, opening any redirected
    /// streams.
    pub fn into_config(self) -> Result<Config> {
        let mem_size = match self.memory {
            Some(raw) => parse_mem_size(&raw)?,
            None => DEFAULT_MEM_SIZE,
        };

        let mut config = Config::new(self.kernel);
        config.initrd_path = self.initrd;
        config.mem_size = mem_size;
        config.mode = if self.protected {
            EntryMode::Protected
        } else {
            EntryMode::Real
        };

        if let Some(path) = self.stdout {
            let file = File::create(&path)?;
            config.stdout = Box::new(BufWriter::new(file));
        }
        if let Some(path) = self.stdin {
            let file = File::open(&path)?;
            config.stdin = Box::new(BufReader::new(file));
        }

        Ok(config)
    }
}

/// Parses a `-memory` value like `"256M"`, `"2G"`, or `"131072K"`. The
/// suffix is mandatory; bare digits are a configuration error.
pub fn parse_mem_size(raw: &str) -> Result<usize> {
    let raw = raw.trim();
    let (digits, multiplier) = match raw.as_bytes().last() {
        Some(b'K') | Some(b'k') => (&raw[..raw.len() - 1], 1024),
        Some(b'M') | Some(b'm') => (&raw[..raw.len() - 1], 1024 * 1024),
        Some(b'G') | Some(b'g') => (&raw[..raw.len() - 1], 1024 * 1024 * 1024),
        _ => {
            return Err(Error::Config(format!(
                "-memory value {raw:?} is missing a K/M/G suffix"
            )))
        }
    };

    let count: usize = digits
        .parse()
        .map_err(|_| Error::Config(format!("-memory value {raw:?} is not a number")))?;

    count
        .checked_mul(multiplier)
        .ok_or_else(|| Error::Config(format!("-memory value {raw:?} overflows")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kilobytes() {
        assert_eq!(parse_mem_size("512K").unwrap(), 512 * 1024);
    }

    #[test]
    fn parses_megabytes_lowercase() {
        assert_eq!(parse_mem_size("256m").unwrap(), 256 * 1024 * 1024);
    }

    #[test]
    fn parses_gigabytes() {
        assert_eq!(parse_mem_size("2G").unwrap(), 2 * 1024 * 1024 * 1024);
    }

    #[test]
    fn rejects_missing_suffix() {
        assert!(matches!(parse_mem_size("1024"), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_non_numeric_digits() {
        assert!(matches!(parse_mem_size("abcM"), Err(Error::Config(_))));
    }
}
