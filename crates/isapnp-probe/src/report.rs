//! Scan results, serializable for `--json` and printable for operators.

use std::fmt;

use isapnp_protocol::{ResourceOutcome, ResourceSummary, SerialIdentifier, hex_bytes};
use serde::Serialize;

/// Final disposition of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanOutcome {
    /// At least one card was isolated and dumped.
    CardsFound,
    /// Some port showed bus activity but no card isolated cleanly.
    NoCleanIsolation,
    /// No candidate port showed any activity.
    NoUsablePort,
}

impl ScanOutcome {
    /// Process exit status for this outcome.
    pub fn exit_code(self) -> u8 {
        match self {
            Self::CardsFound => 0,
            Self::NoUsablePort => 1,
            Self::NoCleanIsolation => 2,
        }
    }
}

impl fmt::Display for ScanOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CardsFound => write!(f, "Cards found"),
            Self::NoCleanIsolation => write!(f, "No devices found"),
            Self::NoUsablePort => write!(f, "No good Read Data Ports found"),
        }
    }
}

/// How a resource stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResourceStatus {
    Complete { checksum: u8 },
    HeaderInvalid { fill: u8 },
    MalformedTag { tag: u8 },
    ReadTimeout { offset: usize },
}

impl From<ResourceOutcome> for ResourceStatus {
    fn from(outcome: ResourceOutcome) -> Self {
        match outcome {
            ResourceOutcome::Complete { checksum } => Self::Complete { checksum },
            ResourceOutcome::HeaderInvalid { fill } => Self::HeaderInvalid { fill },
            ResourceOutcome::MalformedTag { tag } => Self::MalformedTag { tag },
            ResourceOutcome::ReadTimeout { offset } => Self::ReadTimeout { offset },
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complete { checksum } => write!(f, "complete (checksum {checksum:02X})"),
            Self::HeaderInvalid { fill } => write!(f, "invalid header (all {fill:02X})"),
            Self::MalformedTag { tag } => write!(f, "stopped at tag {tag:02X}"),
            Self::ReadTimeout { offset } => write!(f, "timed out at byte {}", offset + 1),
        }
    }
}

/// Decoded resource data plus where it was dumped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceReport {
    /// `None` when the dump could not be created or written.
    pub dump_file: Option<String>,
    pub header: String,
    pub logical_devices: Vec<String>,
    pub identifier_strings: Vec<String>,
    pub status: ResourceStatus,
    pub bytes_read: usize,
}

impl ResourceReport {
    pub fn new(dump_file: Option<String>, summary: &ResourceSummary) -> Self {
        Self {
            dump_file,
            header: hex_bytes(&summary.header),
            logical_devices: summary
                .logical_devices
                .iter()
                .map(ToString::to_string)
                .collect(),
            identifier_strings: summary.identifier_strings.clone(),
            status: summary.outcome.into(),
            bytes_read: summary.bytes_consumed,
        }
    }
}

impl fmt::Display for ResourceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.dump_file {
            Some(name) => writeln!(f, "    dump: {name} ({} bytes)", self.bytes_read)?,
            None => writeln!(f, "    dump: not written ({} bytes)", self.bytes_read)?,
        }
        writeln!(f, "    header: {}", self.header)?;
        if !self.logical_devices.is_empty() {
            writeln!(f, "    devices: {}", self.logical_devices.join(", "))?;
        }
        for text in &self.identifier_strings {
            writeln!(f, "    identifier: \"{text}\"")?;
        }
        writeln!(f, "    resources: {}", self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardReport {
    pub csn: u8,
    /// Parsed identifier as read, e.g. `CTL0042`.
    pub id: String,
    /// Serial number, most significant byte first.
    pub serial: String,
    /// All nine isolation bytes.
    pub identifier: String,
    pub resources: ResourceReport,
}

impl CardReport {
    pub fn new(csn: u8, identifier: &SerialIdentifier, resources: ResourceReport) -> Self {
        Self {
            csn,
            id: identifier.parsed_id().to_string(),
            serial: identifier.serial_hex(),
            identifier: hex_bytes(identifier.as_bytes()),
            resources,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuperIoReport {
    /// Register C2 read while unlocked.
    pub c2_unlocked: u8,
    /// Register C2 read after locking.
    pub c2_locked: u8,
    pub resources: ResourceReport,
    /// `None` when the register dump could not be written.
    pub register_file: Option<String>,
}

/// Everything learned on one Read Data Port candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortAttempt {
    pub port: u16,
    pub life_seen: bool,
    /// Highest CSN assigned on this port; 0 when none.
    pub max_csn: u8,
    pub checksum_failures: u32,
    /// The stop predicate ended the attempt early.
    pub cancelled: bool,
    #[serde(skip)]
    pub cards: Vec<CardReport>,
}

impl PortAttempt {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            life_seen: false,
            max_csn: 0,
            checksum_failures: 0,
            cancelled: false,
            cards: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub outcome: ScanOutcome,
    /// Port the cards were found on.
    pub read_port: Option<u16>,
    pub cards: Vec<CardReport>,
    pub superio: Option<SuperIoReport>,
    pub attempts: Vec<PortAttempt>,
}

impl ScanReport {
    pub fn exit_code(&self) -> u8 {
        self.outcome.exit_code()
    }
}

impl fmt::Display for ScanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(superio) = &self.superio {
            writeln!(
                f,
                "UMC Super I/O (C2U={:02X} C2L={:02X})",
                superio.c2_unlocked, superio.c2_locked
            )?;
            write!(f, "{}", superio.resources)?;
            if let Some(name) = &superio.register_file {
                writeln!(f, "    registers: {name}")?;
            }
        }

        match self.read_port {
            Some(port) if self.outcome == ScanOutcome::CardsFound => writeln!(
                f,
                "Read Data Port {port:04X}: {} card(s)",
                self.cards.len()
            )?,
            _ => writeln!(f, "{}", self.outcome)?,
        }

        for card in &self.cards {
            writeln!(f, "CSN {}: {} ({})", card.csn, card.id, card.serial)?;
            write!(f, "{}", card.resources)?;
        }
        Ok(())
    }
}
