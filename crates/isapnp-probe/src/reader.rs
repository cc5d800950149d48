//! Resource data reads over the status/data handshake.

use std::io::Write;

use isapnp_protocol::registers::{ADDRESS_PORT, RESOURCE_HEADER_LEN, STATUS_DATA_READY, reg};
use isapnp_protocol::{ReadTimeout, ResourceByteSource, TIMEOUT_SENTINEL};

use crate::dump::DumpWriter;
use crate::port_io::PortIo;
use crate::retry::RetryPolicy;

/// Pulls resource bytes from the card currently in Config state and copies
/// every byte, including timeout sentinels, into the dump.
pub struct HandshakeReader<'a, P: PortIo + ?Sized, W: Write> {
    io: &'a mut P,
    read_port: u16,
    ready: RetryPolicy,
    dump: &'a mut DumpWriter<W>,
    count: usize,
}

impl<'a, P: PortIo + ?Sized, W: Write> HandshakeReader<'a, P, W> {
    pub fn new(
        io: &'a mut P,
        read_port: u16,
        ready: RetryPolicy,
        dump: &'a mut DumpWriter<W>,
    ) -> Self {
        Self {
            io,
            read_port,
            ready,
            dump,
            count: 0,
        }
    }

    fn record(&mut self, byte: u8) {
        self.dump.push(byte);
        self.count += 1;
        if self.count == RESOURCE_HEADER_LEN {
            self.dump.flush();
        }
    }
}

impl<P: PortIo + ?Sized, W: Write> ResourceByteSource for HandshakeReader<'_, P, W> {
    fn next_byte(&mut self) -> Result<u8, ReadTimeout> {
        let port = self.read_port;
        let ready = self.ready.poll(&mut *self.io, |io| {
            io.write_byte(ADDRESS_PORT, reg::STATUS);
            (io.read_byte(port) & STATUS_DATA_READY != 0).then_some(())
        });

        match ready {
            Ok(()) => {
                self.io.write_byte(ADDRESS_PORT, reg::RESOURCE_DATA);
                let byte = self.io.read_byte(port);
                self.record(byte);
                Ok(byte)
            }
            Err(_) => {
                self.record(TIMEOUT_SENTINEL);
                Err(ReadTimeout)
            }
        }
    }
}
