//! Serial isolation: one 72-bit arbitration pass on the Read Data Port.
//!
//! Every card still in Isolation drives its identifier onto the bus one bit
//! at a time, LSB first. A one bit answers the two reads with `0x55` then
//! `0xAA`; cards seeing a one they did not drive while holding a zero drop
//! out. After the pass exactly one card (the winner) remains.

use isapnp_protocol::registers::{FLOATING_BUS, ISOLATION_BYTES, ISOLATION_SIGNATURE};
use isapnp_protocol::SerialIdentifier;
use tracing::{debug, trace, warn};

use crate::link::LinkController;
use crate::port_io::PortIo;

/// Result of one isolation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationOutcome {
    /// A card won and its checksum verified.
    Winner(SerialIdentifier),
    /// No `0x55AA` pair was seen. `life_seen` is set when anything other
    /// than a floating bus was read.
    NoResponse { life_seen: bool },
    /// Bits were received but the checksum does not match.
    ChecksumMismatch(SerialIdentifier),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationState {
    Idle,
    Arbitrating,
    WinnerFound,
    NoResponse,
}

/// Counters gathered during a pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassCounters {
    /// Bit slots that read `0x55AA`.
    pub ones: u32,
    /// Bit slots that read anything other than `0xFFFF`.
    pub life: u32,
}

#[derive(Debug)]
pub struct IsolationResolver {
    read_port: u16,
    state: IsolationState,
    counters: PassCounters,
}

impl IsolationResolver {
    pub fn new(read_port: u16) -> Self {
        Self {
            read_port,
            state: IsolationState::Idle,
            counters: PassCounters::default(),
        }
    }

    pub fn state(&self) -> IsolationState {
        self.state
    }

    pub fn counters(&self) -> PassCounters {
        self.counters
    }

    /// Run one pass. Selects the serial isolation register, then reads 72
    /// bit slots from the Read Data Port.
    pub fn run<P: PortIo + ?Sized>(&mut self, link: &mut LinkController<'_, P>) -> IsolationOutcome {
        self.state = IsolationState::Arbitrating;
        self.counters = PassCounters::default();
        link.begin_isolation();

        let mut bytes = [0u8; ISOLATION_BYTES];
        for slot in bytes.iter_mut() {
            *slot = self.read_byte(link);
        }

        if self.counters.ones == 0 {
            self.state = IsolationState::NoResponse;
            let life_seen = self.counters.life > 0;
            debug!(
                "no isolation response on {:04X} (life: {})",
                self.read_port, self.counters.life
            );
            return IsolationOutcome::NoResponse { life_seen };
        }

        let identifier = SerialIdentifier::from_bytes(bytes);
        if let Err(e) = identifier.validate() {
            self.state = IsolationState::NoResponse;
            warn!("{e} on {:04X}", self.read_port);
            return IsolationOutcome::ChecksumMismatch(identifier);
        }

        self.state = IsolationState::WinnerFound;
        IsolationOutcome::Winner(identifier)
    }

    fn read_byte<P: PortIo + ?Sized>(&mut self, link: &mut LinkController<'_, P>) -> u8 {
        let mut byte = 0u8;
        for _ in 0..8 {
            let first = link.io().read_byte(self.read_port);
            link.settle();
            let second = link.io().read_byte(self.read_port);
            link.settle();

            let composite = u16::from_be_bytes([first, second]);
            byte >>= 1;
            if composite != FLOATING_BUS {
                self.counters.life += 1;
                if composite == ISOLATION_SIGNATURE {
                    byte |= 0x80;
                    self.counters.ones += 1;
                }
            }
        }
        trace!("isolation byte {byte:02X}");
        byte
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays a scripted sequence of reads.
    #[derive(Default)]
    struct Script {
        reads: VecDeque<u8>,
        delays: u32,
    }

    impl Script {
        fn from_bits(bits: impl IntoIterator<Item = bool>) -> Self {
            let reads = bits
                .into_iter()
                .flat_map(|one| if one { [0x55, 0xAA] } else { [0xFF, 0xFF] })
                .collect();
            Self { reads, delays: 0 }
        }
    }

    impl PortIo for Script {
        fn read_byte(&mut self, _port: u16) -> u8 {
            self.reads.pop_front().unwrap_or(0xFF)
        }

        fn write_byte(&mut self, _port: u16, _value: u8) {}

        fn delay_ms(&mut self, _ms: u32) {
            self.delays += 1;
        }
    }

    fn bits_of(bytes: &[u8]) -> Vec<bool> {
        bytes
            .iter()
            .flat_map(|b| (0..8).map(move |i| (b >> i) & 1 == 1))
            .collect()
    }

    #[test]
    fn test_winner_reassembled_lsb_first() {
        let id = SerialIdentifier::with_checksum([0xAB, 0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE]);
        let mut io = Script::from_bits(bits_of(id.as_bytes()));
        let mut resolver = IsolationResolver::new(0x0213);
        let outcome = resolver.run(&mut LinkController::new(&mut io, 1));
        assert_eq!(outcome, IsolationOutcome::Winner(id));
        assert_eq!(resolver.state(), IsolationState::WinnerFound);
        // begin_isolation plus one delay per read
        assert_eq!(io.delays, 1 + 144);
    }

    #[test]
    fn test_floating_bus_is_silent() {
        let mut io = Script::default();
        let mut resolver = IsolationResolver::new(0x0213);
        let outcome = resolver.run(&mut LinkController::new(&mut io, 1));
        assert_eq!(outcome, IsolationOutcome::NoResponse { life_seen: false });
        assert_eq!(resolver.state(), IsolationState::NoResponse);
        assert_eq!(resolver.counters(), PassCounters { ones: 0, life: 0 });
    }

    #[test]
    fn test_noise_without_signature_is_life() {
        let mut io = Script {
            reads: std::iter::repeat_n(0x00, 144).collect(),
            delays: 0,
        };
        let mut resolver = IsolationResolver::new(0x0213);
        let outcome = resolver.run(&mut LinkController::new(&mut io, 1));
        assert_eq!(outcome, IsolationOutcome::NoResponse { life_seen: true });
        assert_eq!(resolver.counters().life, 72);
    }

    #[test]
    fn test_corrupt_checksum_reported() {
        let mut bytes = *SerialIdentifier::with_checksum([1, 2, 3, 4, 5, 6, 7, 8]).as_bytes();
        bytes[8] ^= 0x10;
        let mut io = Script::from_bits(bits_of(&bytes));
        let outcome = IsolationResolver::new(0x0213).run(&mut LinkController::new(&mut io, 1));
        assert_eq!(
            outcome,
            IsolationOutcome::ChecksumMismatch(SerialIdentifier::from_bytes(bytes))
        );
    }
}
