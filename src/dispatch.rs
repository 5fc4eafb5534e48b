//! The VM-exit dispatch loop: the only place guest I/O is serviced.

use std::io::{Read, Write};

use crate::error::{Error, Result};
use crate::hvb::{ExitReason, VcpuHandle};

/// Character I/O port: raw byte out/in, content not inspected.
pub const CONSOLE_PORT: u16 = 0xE9;
/// ACPI-style shutdown port.
pub const SHUTDOWN_PORT: u16 = 0x604;
/// The 16-bit value that, written to `SHUTDOWN_PORT`, requests shutdown.
pub const SHUTDOWN_VALUE: u16 = 0x2000;

/// Runs `vcpu` until the guest shuts down or a fatal exit occurs.
///
/// `stdout`/`stdin` are the character streams the guest's console port is
/// wired to; they are injected by the caller (see `Config`) rather than
/// hard-coded to the process's own streams.
pub fn dispatch_loop(
    vcpu: &mut VcpuHandle,
    stdout: &mut dyn Write,
    stdin: &mut dyn Read,
) -> Result<()> {
    loop {
        match vcpu.run()? {
            ExitReason::Hlt => {
                log::trace!("vm exit: hlt");
            }

            ExitReason::IoOut {
                port: CONSOLE_PORT,
                data,
            } => {
                stdout.write_all(data)?;
                stdout.flush()?;
            }

            ExitReason::IoOut {
                port: SHUTDOWN_PORT,
                data,
            } => {
                if is_shutdown_request(data) {
                    log::info!("guest requested shutdown");
                    return Ok(());
                }
                log::trace!("vm exit: unrecognized shutdown-port write");
            }

            ExitReason::IoOut { port, .. } => {
                log::trace!("vm exit: ignored OUT on port {port:#x}");
            }

            ExitReason::IoIn {
                port: CONSOLE_PORT,
                data,
            } => {
                fill_from_stdin(stdin, data)?;
            }

            ExitReason::IoIn { port, .. } => {
                log::trace!("vm exit: ignored IN on port {port:#x}");
            }

            ExitReason::Other(reason) => {
                log::error!("vm exit: unexpected reason {reason}");
                return Err(Error::UnexpectedExit(reason));
            }
        }
    }
}

/// True iff `data` is exactly the 16-bit little-endian shutdown value.
fn is_shutdown_request(data: &[u8]) -> bool {
    data.len() == 2 && u16::from_le_bytes([data[0], data[1]]) == SHUTDOWN_VALUE
}

/// Reads up to `data.len()` bytes from `stdin` into `data`, zero-padding on
/// end-of-stream. Any non-EOF read error is propagated.
fn fill_from_stdin(stdin: &mut dyn Read, data: &mut [u8]) -> Result<()> {
    data.fill(0);
    let mut filled = 0;
    while filled < data.len() {
        match stdin.read(&mut data[filled..]) {
            Ok(0) => break, // EOF: remainder stays zero.
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(())
}
