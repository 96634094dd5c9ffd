// SPDX-License-Identifier: MIT OR Apache-2.0
//! Raw byte transport to a DDC/CI monitor.
//!
//! The only production implementation is [`I2cDevice`], which talks to the
//! kernel's `/dev/i2c-N` character devices. The [`Transport`] trait exists so
//! the exchange engine and everything above it can be driven by an in-memory
//! monitor in tests, and so embedders can bring their own bus access.
//!
//! The transport is deliberately dumb: byte-exact writes and reads, no
//! framing knowledge, no buffering, no padding. Error translation from the
//! kernel happens here and nowhere else.

use crate::error::DdcError;

/// Byte-level access to a monitor.
pub trait Transport {
    /// Write `bytes` to the monitor. Returns the number of bytes accepted;
    /// the engine treats anything short of the full frame as a failure.
    fn write(&mut self, bytes: &[u8]) -> Result<usize, DdcError>;

    /// Read exactly `len` bytes from the monitor.
    fn read(&mut self, len: usize) -> Result<Vec<u8>, DdcError>;

    /// Whether this transport can deliver a save-settings command.
    ///
    /// Defaults to `true`; transports that cannot (for example a monitor
    /// behind a bridge that filters write-only commands) return `false` and
    /// the operation fails up front with `OperationUnsupported`.
    fn supports_save_settings(&self) -> bool {
        true
    }
}

#[cfg(target_os = "linux")]
pub use linux::I2cDevice;

#[cfg(target_os = "linux")]
mod linux {
    use super::*;
    use crate::packet::DDC_SLAVE_ADDR;
    use std::fs::{File, OpenOptions};
    use std::io::{Read, Write};
    use std::os::fd::AsRawFd;

    // From the kernel's i2c-dev interface.
    const I2C_SLAVE: libc::c_ulong = 0x0703;
    const I2C_SLAVE_FORCE: libc::c_ulong = 0x0706;
    const I2C_TIMEOUT: libc::c_ulong = 0x0702;

    /// An open `/dev/i2c-N` device addressed to the DDC slave.
    ///
    /// The device is opened read-write and bound to slave address `0x37` at
    /// construction. Dropping the handle closes the file descriptor; there is
    /// no other cleanup, so every exit path releases the bus.
    #[derive(Debug)]
    pub struct I2cDevice {
        file: File,
        bus: u32,
    }

    impl I2cDevice {
        /// Open `/dev/i2c-{bus}` and select the DDC slave address.
        ///
        /// With `force_slave` set, an `EBUSY` answer to the plain
        /// slave-address ioctl (typically a kernel driver holding the
        /// address) is retried with the forced variant.
        ///
        /// `read_timeout_ms` arms the kernel's per-device I²C timeout; reads
        /// that exceed it fail with a bus error, which the retry driver
        /// treats as retryable.
        pub fn open(
            bus: u32,
            force_slave: bool,
            read_timeout_ms: Option<u64>,
        ) -> Result<I2cDevice, DdcError> {
            let path = format!("/dev/i2c-{}", bus);
            let file = OpenOptions::new().read(true).write(true).open(&path)?;
            set_slave_address(&file, DDC_SLAVE_ADDR, force_slave)?;
            if let Some(ms) = read_timeout_ms {
                // The ioctl takes units of 10ms.
                let arg = (ms / 10).max(1) as libc::c_ulong;
                ioctl_or_errno(&file, I2C_TIMEOUT, arg)?;
            }
            #[cfg(feature = "logwise")]
            logwise::debuginternal_sync!("ddci: opened i2c bus {bus}", bus = bus);
            Ok(I2cDevice { file, bus })
        }

        pub fn bus(&self) -> u32 {
            self.bus
        }
    }

    fn ioctl_or_errno(file: &File, request: libc::c_ulong, arg: libc::c_ulong) -> Result<(), DdcError> {
        let rc = unsafe { libc::ioctl(file.as_raw_fd(), request as _, arg) };
        if rc < 0 {
            return Err(DdcError::Bus(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    fn set_slave_address(file: &File, addr: u16, force: bool) -> Result<(), DdcError> {
        match ioctl_or_errno(file, I2C_SLAVE, addr as libc::c_ulong) {
            Err(DdcError::Bus(io_err))
                if force && io_err.raw_os_error() == Some(libc::EBUSY) =>
            {
                ioctl_or_errno(file, I2C_SLAVE_FORCE, addr as libc::c_ulong)
            }
            other => other,
        }
    }

    impl Transport for I2cDevice {
        fn write(&mut self, bytes: &[u8]) -> Result<usize, DdcError> {
            let sent = self.file.write(bytes)?;
            Ok(sent)
        }

        fn read(&mut self, len: usize) -> Result<Vec<u8>, DdcError> {
            let mut buf = vec![0u8; len];
            let got = self.file.read(&mut buf)?;
            if got < len {
                return Err(DdcError::ShortRead { got, expected: len });
            }
            Ok(buf)
        }
    }
}
