//! PnP command link: every write sequence the scanner issues to the
//! ADDRESS and WRITE_DATA ports.

use isapnp_protocol::registers::{
    ADDRESS_PORT, WRITE_DATA_PORT, config_control, read_port_argument, reg,
};
use isapnp_protocol::INITIATION_KEY;
use tracing::trace;

use crate::port_io::PortIo;

/// Borrowed command interface over a port I/O backend.
pub struct LinkController<'a, P: PortIo + ?Sized> {
    io: &'a mut P,
    settle_ms: u32,
}

impl<'a, P: PortIo + ?Sized> LinkController<'a, P> {
    pub fn new(io: &'a mut P, settle_ms: u32) -> Self {
        Self { io, settle_ms }
    }

    pub fn io(&mut self) -> &mut P {
        &mut *self.io
    }

    pub fn settle(&mut self) {
        self.io.delay_ms(self.settle_ms);
    }

    /// Select `register` and write `argument` to it.
    pub fn command(&mut self, register: u8, argument: u8) {
        trace!("reg {register:02X} <- {argument:02X}");
        self.io.write_byte(ADDRESS_PORT, register);
        self.io.write_byte(WRITE_DATA_PORT, argument);
    }

    /// Return every card to Wait for Key, reset the LFSR with two zero writes
    /// and send the 32-byte initiation key.
    pub fn send_initiation_key(&mut self) {
        self.command(reg::CONFIG_CONTROL, config_control::WAIT_FOR_KEY);
        self.settle();
        self.io.write_byte(ADDRESS_PORT, 0x00);
        self.io.write_byte(ADDRESS_PORT, 0x00);
        for byte in INITIATION_KEY {
            self.io.write_byte(ADDRESS_PORT, byte);
        }
    }

    /// Clear every card's CSN.
    pub fn reset_all_csns(&mut self) {
        self.command(reg::CONFIG_CONTROL, config_control::RESET_CSN);
        self.settle();
        self.settle();
    }

    /// Wake\[csn\]: the matching card enters Config (or Isolation for CSN 0),
    /// every other awake card goes to Sleep.
    pub fn wake(&mut self, csn: u8) {
        self.command(reg::WAKE, csn);
        self.settle();
    }

    /// Wake\[0\]: configured cards go to Sleep, cards without a CSN enter
    /// Isolation.
    pub fn sleep_all(&mut self) {
        self.wake(0);
    }

    pub fn set_read_data_port(&mut self, port: u16) {
        self.command(reg::SET_RD_DATA, read_port_argument(port));
        self.settle();
    }

    /// Hand `csn` to the card that just won isolation.
    pub fn assign_csn(&mut self, csn: u8) {
        self.command(reg::CARD_SELECT_NUMBER, csn);
        self.settle();
    }

    /// Select the serial isolation register so the next reads arbitrate.
    pub fn begin_isolation(&mut self) {
        self.io.write_byte(ADDRESS_PORT, reg::SERIAL_ISOLATION);
        self.settle();
    }

    pub fn return_to_wait_for_key(&mut self) {
        self.command(reg::CONFIG_CONTROL, config_control::WAIT_FOR_KEY);
    }

    /// Full setup for one Read Data Port candidate: unlock, clear CSNs,
    /// unlock again, put every card into Isolation and program the port.
    pub fn prepare_port(&mut self, port: u16) {
        self.send_initiation_key();
        self.reset_all_csns();
        self.send_initiation_key();
        self.sleep_all();
        self.set_read_data_port(port);
    }
}
