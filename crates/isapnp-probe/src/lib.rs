//! ISA Plug and Play bus scanner.
//!
//! Finds a working Read Data Port, isolates every PnP card on it, assigns
//! Card Select Numbers and dumps each card's resource data to
//! `<ID><suffix>.BIN`. Port access goes through the [`PortIo`] trait so the
//! whole engine runs against [`sim::SimulatedBus`] in tests.
//!
//! # Example
//!
//! ```
//! use isapnp_probe::dump::MemorySink;
//! use isapnp_probe::sim::{SimulatedBus, SimulatedCard};
//! use isapnp_probe::{ProbeConfig, ScanContext, ScanOutcome, scan};
//!
//! let bus = SimulatedBus::new()
//!     .with_card(SimulatedCard::new([0x0E, 0x8C, 0x00, 0x42, 1, 0, 0, 0]));
//! let mut ctx = ScanContext::new(bus, MemorySink::new(), ProbeConfig::default());
//! let report = scan(&mut ctx);
//! assert_eq!(report.outcome, ScanOutcome::CardsFound);
//! assert_eq!(report.cards.len(), 1);
//! ```

#![deny(static_mut_refs)]

pub mod config;
pub mod csn;
pub mod dump;
pub mod error;
pub mod isolation;
pub mod link;
pub mod port_io;
pub mod reader;
pub mod registry;
pub mod report;
pub mod retry;
pub mod scanner;
pub mod sim;
pub mod superio;

pub use config::{PortHole, PortRange, ProbeConfig, Timing};
pub use csn::CsnAllocator;
pub use dump::{DirectorySink, DumpSink, DumpWriter, MemorySink};
pub use error::{ProbeError, ProbeResult};
pub use isolation::{IsolationOutcome, IsolationResolver, IsolationState};
pub use link::LinkController;
pub use port_io::{DevPort, PortIo};
pub use reader::HandshakeReader;
pub use registry::{CardRecord, CardRegistry};
pub use report::{
    CardReport, PortAttempt, ResourceReport, ResourceStatus, ScanOutcome, ScanReport,
    SuperIoReport,
};
pub use retry::{RetryExhausted, RetryPolicy};
pub use scanner::{PortScanner, ScanContext, scan};
