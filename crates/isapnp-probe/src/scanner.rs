//! Read Data Port scan: walk the candidate ports, isolate every card on the
//! first port that works and dump each card's resource data.

use isapnp_protocol::{parse_resource_stream, read_port_argument, read_port_from_argument};
use tracing::{debug, info, warn};

use crate::config::ProbeConfig;
use crate::csn::CsnAllocator;
use crate::dump::{DumpSink, DumpWriter};
use crate::isolation::{IsolationOutcome, IsolationResolver};
use crate::link::LinkController;
use crate::port_io::PortIo;
use crate::reader::HandshakeReader;
use crate::registry::{CardRecord, CardRegistry};
use crate::report::{
    CardReport, PortAttempt, ResourceReport, ScanOutcome, ScanReport, SuperIoReport,
};
use crate::superio;

/// Shared scan state: port I/O backend, dump destination, configuration and
/// the registry of cards dumped so far.
#[derive(Debug)]
pub struct ScanContext<P: PortIo, S: DumpSink> {
    io: P,
    sink: S,
    config: ProbeConfig,
    registry: CardRegistry,
}

impl<P: PortIo, S: DumpSink> ScanContext<P, S> {
    pub fn new(io: P, sink: S, config: ProbeConfig) -> Self {
        Self {
            io,
            sink,
            config,
            registry: CardRegistry::new(),
        }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    pub fn registry(&self) -> &CardRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut CardRegistry {
        &mut self.registry
    }

    pub fn io_mut(&mut self) -> &mut P {
        &mut self.io
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn link(&mut self) -> LinkController<'_, P> {
        LinkController::new(&mut self.io, self.config.timing.settle_ms)
    }

    pub fn into_parts(self) -> (P, S, CardRegistry) {
        (self.io, self.sink, self.registry)
    }

    /// Read, dump and decode the resource data of whatever device is
    /// currently selected on `read_port`.
    pub fn dump_resources(&mut self, read_port: u16, record: &CardRecord) -> ResourceReport {
        let name = record.file_name();
        info!("Dumping resource data to {name}");

        let mut writer = DumpWriter::create(&mut self.sink, &name);
        let reader = HandshakeReader::new(
            &mut self.io,
            read_port,
            self.config.timing.ready_policy(),
            &mut writer,
        );
        let summary = parse_resource_stream(reader);
        let dump_file = writer.finish();
        ResourceReport::new(dump_file, &summary)
    }
}

type StopFn<'a> = Box<dyn FnMut() -> bool + 'a>;

pub struct PortScanner<'a, P: PortIo, S: DumpSink> {
    ctx: &'a mut ScanContext<P, S>,
    should_stop: StopFn<'a>,
    superio_probed: bool,
    superio: Option<SuperIoReport>,
}

impl<'a, P: PortIo, S: DumpSink> PortScanner<'a, P, S> {
    pub fn new(ctx: &'a mut ScanContext<P, S>) -> Self {
        Self {
            ctx,
            should_stop: Box::new(|| false),
            superio_probed: false,
            superio: None,
        }
    }

    /// Checked before each port and after each dumped card; returning
    /// `true` ends the scan with what has been found so far.
    pub fn with_stop(mut self, should_stop: impl FnMut() -> bool + 'a) -> Self {
        self.should_stop = Box::new(should_stop);
        self
    }

    pub fn run(mut self) -> ScanReport {
        let ports: Vec<u16> = self.ctx.config().candidate_ports().collect();
        let mut attempts = Vec::new();
        let mut life_seen = false;

        for port in ports {
            if (self.should_stop)() {
                debug!("stop requested before port {port:04X}");
                break;
            }

            let mut attempt = self.try_port(port);
            life_seen |= attempt.life_seen;

            if !attempt.cards.is_empty() {
                let cards = std::mem::take(&mut attempt.cards);
                let read_port = attempt.port;
                attempts.push(attempt);
                return ScanReport {
                    outcome: ScanOutcome::CardsFound,
                    read_port: Some(read_port),
                    cards,
                    superio: self.superio,
                    attempts,
                };
            }

            let cancelled = attempt.cancelled;
            attempts.push(attempt);
            if cancelled {
                break;
            }
        }

        let outcome = if life_seen {
            ScanOutcome::NoCleanIsolation
        } else {
            ScanOutcome::NoUsablePort
        };
        info!("{outcome}");
        ScanReport {
            outcome,
            read_port: None,
            cards: Vec::new(),
            superio: self.superio,
            attempts,
        }
    }

    /// Isolate every card reachable through `port`. Address bits 1..0 are
    /// forced high, matching the port the cards actually drive.
    pub fn try_port(&mut self, port: u16) -> PortAttempt {
        let port = read_port_from_argument(read_port_argument(port));
        info!("Scanning on Read Data Port {port:04X}");
        let mut attempt = PortAttempt::new(port);

        self.ctx.link().prepare_port(port);

        if self.ctx.config().superio && !self.superio_probed {
            self.superio_probed = true;
            self.superio = superio::probe(self.ctx, port);
        }

        let mut csns = CsnAllocator::new(self.ctx.config().max_cards);
        loop {
            let mut resolver = IsolationResolver::new(port);
            match resolver.run(&mut self.ctx.link()) {
                IsolationOutcome::NoResponse { life_seen } => {
                    attempt.life_seen |= life_seen;
                    break;
                }
                IsolationOutcome::ChecksumMismatch(identifier) => {
                    attempt.life_seen = true;
                    attempt.checksum_failures += 1;
                    warn!(
                        "Bad checksum for {} ({}) on {port:04X}",
                        identifier.parsed_id(),
                        identifier.serial_hex()
                    );
                    break;
                }
                IsolationOutcome::Winner(identifier) => {
                    attempt.life_seen = true;
                    let parsed = identifier.parsed_id();
                    info!("{parsed} ({})", identifier.serial_hex());

                    let Some(csn) = csns.allocate(&mut self.ctx.link()) else {
                        break;
                    };
                    let record = self.ctx.registry_mut().register_card(csn, parsed);
                    let resources = self.ctx.dump_resources(port, &record);
                    csns.release(&mut self.ctx.link());

                    attempt.max_csn = csn;
                    attempt.cards.push(CardReport::new(csn, &identifier, resources));

                    if (self.should_stop)() {
                        debug!("stop requested after CSN {csn}");
                        attempt.cancelled = true;
                        break;
                    }
                }
            }
        }

        self.ctx.link().return_to_wait_for_key();
        debug!(
            "port {port:04X}: {} card(s), life {}",
            attempt.cards.len(),
            attempt.life_seen
        );
        attempt
    }
}

/// Scan with the default stop predicate.
pub fn scan<P: PortIo, S: DumpSink>(ctx: &mut ScanContext<P, S>) -> ScanReport {
    PortScanner::new(ctx).run()
}
