//! Port I/O seam between the protocol engine and the machine.
//!
//! The engine only ever needs byte/word reads and writes on fixed addresses
//! plus a millisecond delay. [`DevPort`] provides them on Linux through
//! `/dev/port`; tests use [`crate::sim::SimulatedBus`].

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::warn;

use crate::error::{ProbeError, ProbeResult};

/// Default port I/O device on Linux.
pub const DEV_PORT: &str = "/dev/port";

pub trait PortIo {
    fn read_byte(&mut self, port: u16) -> u8;

    fn write_byte(&mut self, port: u16, value: u8);

    /// Little-endian word: low byte at `port`, high byte at `port + 1`.
    fn read_word(&mut self, port: u16) -> u16 {
        let lo = self.read_byte(port);
        let hi = self.read_byte(port.wrapping_add(1));
        u16::from_le_bytes([lo, hi])
    }

    /// Little-endian word: low byte to `port`, high byte to `port + 1`.
    fn write_word(&mut self, port: u16, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.write_byte(port, lo);
        self.write_byte(port.wrapping_add(1), hi);
    }

    fn delay_ms(&mut self, ms: u32);
}

impl<P: PortIo + ?Sized> PortIo for &mut P {
    fn read_byte(&mut self, port: u16) -> u8 {
        (**self).read_byte(port)
    }

    fn write_byte(&mut self, port: u16, value: u8) {
        (**self).write_byte(port, value)
    }

    fn read_word(&mut self, port: u16) -> u16 {
        (**self).read_word(port)
    }

    fn write_word(&mut self, port: u16, value: u16) {
        (**self).write_word(port, value)
    }

    fn delay_ms(&mut self, ms: u32) {
        (**self).delay_ms(ms)
    }
}

/// Port I/O through the kernel's `/dev/port` character device.
///
/// The file offset is the port number. Requires `CAP_SYS_RAWIO`.
#[derive(Debug)]
pub struct DevPort {
    file: File,
    path: PathBuf,
}

impl DevPort {
    pub fn open(path: impl AsRef<Path>) -> ProbeResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !cfg!(unix) {
            return Err(ProbeError::PortIoUnsupported);
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| ProbeError::PortAccess {
                path: path.clone(),
                source,
            })?;
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
impl PortIo for DevPort {
    fn read_byte(&mut self, port: u16) -> u8 {
        use std::os::unix::fs::FileExt;

        let mut buf = [0xFFu8; 1];
        if let Err(e) = self.file.read_exact_at(&mut buf, u64::from(port)) {
            warn!("inb({port:#06X}) via {} failed: {e}", self.path.display());
            return 0xFF;
        }
        buf[0]
    }

    fn write_byte(&mut self, port: u16, value: u8) {
        use std::os::unix::fs::FileExt;

        if let Err(e) = self.file.write_all_at(&[value], u64::from(port)) {
            warn!("outb({port:#06X}) via {} failed: {e}", self.path.display());
        }
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}

#[cfg(not(unix))]
impl PortIo for DevPort {
    fn read_byte(&mut self, _port: u16) -> u8 {
        0xFF
    }

    fn write_byte(&mut self, _port: u16, _value: u8) {}

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct ByteMap {
        bytes: BTreeMap<u16, u8>,
        slept: u32,
    }

    impl PortIo for ByteMap {
        fn read_byte(&mut self, port: u16) -> u8 {
            self.bytes.get(&port).copied().unwrap_or(0xFF)
        }

        fn write_byte(&mut self, port: u16, value: u8) {
            self.bytes.insert(port, value);
        }

        fn delay_ms(&mut self, ms: u32) {
            self.slept += ms;
        }
    }

    #[test]
    fn test_word_is_little_endian() {
        let mut io = ByteMap::default();
        io.write_word(0x300, 0xBEEF);
        assert_eq!(io.read_byte(0x300), 0xEF);
        assert_eq!(io.read_byte(0x301), 0xBE);
        assert_eq!(io.read_word(0x300), 0xBEEF);
    }

    #[test]
    fn test_forwarding_through_mut_ref() {
        let mut io = ByteMap::default();
        {
            let mut by_ref = &mut io;
            by_ref.write_byte(0x80, 0x12);
            by_ref.delay_ms(3);
        }
        assert_eq!(io.read_byte(0x80), 0x12);
        assert_eq!(io.slept, 3);
    }

    #[test]
    fn test_open_missing_device_fails() {
        let err = DevPort::open("/nonexistent/isapnp/port").err();
        assert!(matches!(
            err,
            Some(ProbeError::PortAccess { .. } | ProbeError::PortIoUnsupported)
        ));
    }
}
