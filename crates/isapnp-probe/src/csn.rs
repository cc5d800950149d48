//! Card Select Number allocation for one Read Data Port attempt.

use tracing::{debug, warn};

use crate::link::LinkController;
use crate::port_io::PortIo;

/// Hands out CSNs 1, 2, ... to isolation winners in order.
#[derive(Debug, Clone)]
pub struct CsnAllocator {
    last: u8,
    max: u8,
}

impl CsnAllocator {
    pub fn new(max: u8) -> Self {
        Self { last: 0, max }
    }

    /// Highest CSN assigned so far; 0 when none.
    pub fn last_assigned(&self) -> u8 {
        self.last
    }

    /// Assign the next CSN to the current winner and wake it into Config.
    /// Returns `None` once the ceiling is reached.
    pub fn allocate<P: PortIo + ?Sized>(&mut self, link: &mut LinkController<'_, P>) -> Option<u8> {
        if self.last >= self.max {
            warn!("CSN ceiling {} reached, not assigning more", self.max);
            return None;
        }
        self.last += 1;
        let csn = self.last;
        link.assign_csn(csn);
        link.wake(csn);
        debug!("assigned CSN {csn}");
        Some(csn)
    }

    /// Put the configured card to sleep and let the remaining cards
    /// re-enter Isolation.
    pub fn release<P: PortIo + ?Sized>(&mut self, link: &mut LinkController<'_, P>) {
        link.sleep_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Writes(Vec<(u16, u8)>);

    impl PortIo for Writes {
        fn read_byte(&mut self, _port: u16) -> u8 {
            0xFF
        }

        fn write_byte(&mut self, port: u16, value: u8) {
            self.0.push((port, value));
        }

        fn delay_ms(&mut self, _ms: u32) {}
    }

    #[test]
    fn test_sequential_allocation() {
        let mut io = Writes::default();
        let mut link = LinkController::new(&mut io, 1);
        let mut csns = CsnAllocator::new(255);
        assert_eq!(csns.allocate(&mut link), Some(1));
        assert_eq!(csns.allocate(&mut link), Some(2));
        assert_eq!(csns.last_assigned(), 2);
    }

    #[test]
    fn test_allocate_assigns_then_wakes() {
        let mut io = Writes::default();
        CsnAllocator::new(255).allocate(&mut LinkController::new(&mut io, 1));
        assert_eq!(
            io.0,
            vec![(0x0279, 0x06), (0x0A79, 1), (0x0279, 0x03), (0x0A79, 1)]
        );
    }

    #[test]
    fn test_ceiling_stops_allocation() {
        let mut io = Writes::default();
        let mut link = LinkController::new(&mut io, 1);
        let mut csns = CsnAllocator::new(1);
        assert_eq!(csns.allocate(&mut link), Some(1));
        assert_eq!(csns.allocate(&mut link), None);
        assert_eq!(csns.last_assigned(), 1);
    }
}
