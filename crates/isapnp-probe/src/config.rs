//! Scanner configuration.
//!
//! Every field has a default so an empty YAML document (or no file at all)
//! yields the standard ISA PnP scan.

use std::path::{Path, PathBuf};

use isapnp_protocol::registers::{DEFAULT_READY_RETRIES, MAX_CSN, read_port};
use serde::{Deserialize, Serialize};

use crate::error::{ProbeError, ProbeResult};
use crate::port_io::DEV_PORT;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProbeConfig {
    /// Directory receiving `<ID><suffix>.BIN` dumps.
    pub output_dir: PathBuf,
    /// Port I/O device.
    pub device: PathBuf,
    pub port_range: PortRange,
    /// Candidates inside this window are never tried.
    pub reserved_hole: PortHole,
    pub timing: Timing,
    /// Probe for a UMC Super I/O before the first isolation pass.
    pub superio: bool,
    /// Highest CSN handed out on one Read Data Port.
    pub max_cards: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PortRange {
    pub first: u16,
    pub last: u16,
    pub stride: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PortHole {
    pub first: u16,
    pub last: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timing {
    /// Delay after each command sequence and isolation read.
    pub settle_ms: u32,
    /// Status polls before a resource byte read gives up.
    pub ready_retries: u32,
    /// Delay between status polls.
    pub ready_delay_ms: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            device: PathBuf::from(DEV_PORT),
            port_range: PortRange::default(),
            reserved_hole: PortHole::default(),
            timing: Timing::default(),
            superio: true,
            max_cards: MAX_CSN,
        }
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            first: read_port::FIRST,
            last: read_port::LAST,
            stride: read_port::STRIDE,
        }
    }
}

impl Default for PortHole {
    fn default() -> Self {
        Self {
            first: read_port::HOLE_FIRST,
            last: read_port::HOLE_LAST,
        }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            settle_ms: 1,
            ready_retries: DEFAULT_READY_RETRIES,
            ready_delay_ms: 1,
        }
    }
}

impl Timing {
    pub fn ready_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.ready_retries, self.ready_delay_ms)
    }
}

impl PortHole {
    pub fn contains(&self, port: u16) -> bool {
        (self.first..=self.last).contains(&port)
    }
}

impl ProbeConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> ProbeResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file.
    pub fn load(path: impl AsRef<Path>) -> ProbeResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ProbeError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> ProbeResult<()> {
        let range = &self.port_range;
        if range.stride == 0 {
            return Err(ProbeError::InvalidConfiguration(
                "port_range.stride must be non-zero".to_string(),
            ));
        }
        if range.first > range.last {
            return Err(ProbeError::InvalidConfiguration(format!(
                "port_range.first ({:#06X}) is above port_range.last ({:#06X})",
                range.first, range.last
            )));
        }
        // SET_RD_DATA only carries address bits 9..2; cards answer with bits 1..0 set.
        if range.first & 0x03 != 0x03 {
            return Err(ProbeError::InvalidConfiguration(format!(
                "port_range.first ({:#06X}) must end in binary 11",
                range.first
            )));
        }
        if range.stride % 4 != 0 {
            return Err(ProbeError::InvalidConfiguration(format!(
                "port_range.stride ({}) must be a multiple of 4",
                range.stride
            )));
        }
        if range.last > 0x03FF {
            return Err(ProbeError::InvalidConfiguration(format!(
                "port_range.last ({:#06X}) is outside the ISA I/O window",
                range.last
            )));
        }
        if self.reserved_hole.first > self.reserved_hole.last {
            return Err(ProbeError::InvalidConfiguration(
                "reserved_hole.first is above reserved_hole.last".to_string(),
            ));
        }
        if self.max_cards == 0 {
            return Err(ProbeError::InvalidConfiguration(
                "max_cards must be at least 1".to_string(),
            ));
        }
        if self.timing.ready_retries == 0 {
            return Err(ProbeError::InvalidConfiguration(
                "timing.ready_retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Read Data Port candidates in scan order.
    pub fn candidate_ports(&self) -> impl Iterator<Item = u16> + use<> {
        let PortRange { first, last, stride } = self.port_range;
        let hole = self.reserved_hole;
        (first..=last)
            .step_by(usize::from(stride.max(1)))
            .filter(move |port| !hole.contains(*port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_candidates() {
        let ports: Vec<u16> = ProbeConfig::default().candidate_ports().collect();
        assert_eq!(ports.first(), Some(&0x0213));
        assert_eq!(ports.get(1), Some(&0x0223));
        assert_eq!(ports.last(), Some(&0x03F3));
        assert!(ports.contains(&0x0273));
        assert!(!ports.contains(&0x0283));
        assert!(!ports.contains(&0x0373));
        assert!(ports.contains(&0x0383));
        assert_eq!(ports.len(), 15);
    }

    #[test]
    fn test_empty_yaml_is_default() -> Result<(), Box<dyn std::error::Error>> {
        let config = ProbeConfig::from_yaml_str("{}")?;
        assert_eq!(config, ProbeConfig::default());
        Ok(())
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let config = ProbeConfig::from_yaml_str(
            "output_dir: /tmp/dumps\nsuperio: false\ntiming:\n  ready_retries: 50\n",
        )?;
        assert_eq!(config.output_dir, PathBuf::from("/tmp/dumps"));
        assert!(!config.superio);
        assert_eq!(config.timing.ready_retries, 50);
        assert_eq!(config.timing.settle_ms, 1);
        assert_eq!(config.port_range, PortRange::default());
        Ok(())
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = ProbeConfig::from_yaml_str("outptu_dir: typo\n");
        assert!(matches!(result, Err(ProbeError::ConfigParse(_))));
    }

    #[test]
    fn test_zero_stride_rejected() {
        let result = ProbeConfig::from_yaml_str("port_range:\n  stride: 0\n");
        assert!(matches!(result, Err(ProbeError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let mut config = ProbeConfig::default();
        config.port_range.first = 0x300;
        config.port_range.last = 0x213;
        assert!(matches!(
            config.validate(),
            Err(ProbeError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_unaligned_first_port_rejected() {
        let result = ProbeConfig::from_yaml_str(
            "port_range:\n  first: 528\n  last: 624\n  stride: 16\n",
        );
        assert!(matches!(result, Err(ProbeError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_unaligned_stride_rejected() {
        let mut config = ProbeConfig::default();
        config.port_range.stride = 10;
        assert!(matches!(
            config.validate(),
            Err(ProbeError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_every_candidate_is_a_read_port() {
        let config = ProbeConfig::default();
        for port in config.candidate_ports() {
            assert_eq!(
                isapnp_protocol::read_port_from_argument(isapnp_protocol::read_port_argument(port)),
                port
            );
        }
    }

    #[test]
    fn test_zero_max_cards_rejected() {
        let config = ProbeConfig {
            max_cards: 0,
            ..ProbeConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_custom_range_without_hole() -> Result<(), Box<dyn std::error::Error>> {
        let config = ProbeConfig::from_yaml_str(
            "port_range:\n  first: 643\n  last: 675\n  stride: 16\nreserved_hole:\n  first: 0\n  last: 0\n",
        )?;
        let ports: Vec<u16> = config.candidate_ports().collect();
        assert_eq!(ports, vec![0x0283, 0x0293, 0x02A3]);
        Ok(())
    }

    #[test]
    fn test_load_from_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("isapnp.yaml");
        std::fs::write(&path, "max_cards: 4\ndevice: /dev/null\n")?;
        let config = ProbeConfig::load(&path)?;
        assert_eq!(config.max_cards, 4);
        assert_eq!(config.device, PathBuf::from("/dev/null"));
        Ok(())
    }

    #[test]
    fn test_load_missing_file() {
        let result = ProbeConfig::load("/nonexistent/isapnp.yaml");
        assert!(matches!(result, Err(ProbeError::ConfigRead { .. })));
    }
}
