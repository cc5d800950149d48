//! Resource data stream: tag decoding and the streaming parser.
//!
//! A card's resource data is a 9-byte header (its serial identifier) followed
//! by tagged items. Small items pack type and length into the tag byte; large
//! items carry a little-endian 16-bit length after the tag. The stream ends
//! with the small end tag whose trailing byte is the resource checksum.
//!
//! The parser pulls bytes from a [`ResourceByteSource`] one at a time, so the
//! same code decodes a live card (each byte handshaken over the bus) and a dump
//! file read back from disk.

use tracing::{debug, trace, warn};

use crate::error::{PnpError, PnpResult, ReadTimeout};
use crate::identifier::ParsedId;
use crate::registers::RESOURCE_HEADER_LEN;

/// Value substituted for a byte that timed out.
pub const TIMEOUT_SENTINEL: u8 = 0xFF;

/// Small item types (tag bits 6..3).
pub mod small_item {
    pub const PNP_VERSION: u8 = 0x01;
    pub const LOGICAL_DEVICE_ID: u8 = 0x02;
    pub const COMPATIBLE_DEVICE_ID: u8 = 0x03;
    pub const IRQ_FORMAT: u8 = 0x04;
    pub const DMA_FORMAT: u8 = 0x05;
    pub const START_DEPENDENT: u8 = 0x06;
    pub const END_DEPENDENT: u8 = 0x07;
    pub const IO_PORT: u8 = 0x08;
    pub const FIXED_IO_PORT: u8 = 0x09;
    pub const VENDOR_DEFINED: u8 = 0x0E;
    pub const END_TAG: u8 = 0x0F;
}

/// Large item types (tag bits 6..0).
pub mod large_item {
    pub const MEMORY_RANGE: u8 = 0x01;
    pub const ANSI_IDENTIFIER_STRING: u8 = 0x02;
    pub const UNICODE_IDENTIFIER_STRING: u8 = 0x03;
    pub const VENDOR_DEFINED: u8 = 0x04;
    pub const MEMORY_RANGE_32: u8 = 0x05;
    pub const FIXED_MEMORY_RANGE_32: u8 = 0x06;
}

/// Bytes of a logical device ID payload.
pub const LOGICAL_DEVICE_ID_LEN: u8 = 4;

/// Decoded tag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceTag {
    Small { item_type: u8, length: u8 },
    /// Length follows the tag as a little-endian `u16`.
    Large { item_type: u8 },
}

impl ResourceTag {
    pub const LARGE_FLAG: u8 = 0x80;

    /// Decode a tag byte. `0x00` and `0xFF` never start a valid item.
    pub const fn decode(byte: u8) -> PnpResult<Self> {
        if byte == 0x00 || byte == 0xFF {
            return Err(PnpError::MalformedTag { tag: byte });
        }
        if byte & Self::LARGE_FLAG != 0 {
            Ok(Self::Large {
                item_type: byte & 0x7F,
            })
        } else {
            Ok(Self::Small {
                item_type: (byte >> 3) & 0x0F,
                length: byte & 0x07,
            })
        }
    }

    pub const fn small(item_type: u8, length: u8) -> u8 {
        ((item_type & 0x0F) << 3) | (length & 0x07)
    }

    pub const fn large(item_type: u8) -> u8 {
        Self::LARGE_FLAG | (item_type & 0x7F)
    }
}

/// A fully framed item: tag plus its declared payload length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceItem {
    Small { item_type: u8, length: u8 },
    Large { item_type: u8, length: u16 },
}

impl ResourceItem {
    pub fn name(&self) -> &'static str {
        match *self {
            Self::Small { item_type, .. } => match item_type {
                small_item::PNP_VERSION => "PnP version",
                small_item::LOGICAL_DEVICE_ID => "logical device ID",
                small_item::COMPATIBLE_DEVICE_ID => "compatible device ID",
                small_item::IRQ_FORMAT => "IRQ format",
                small_item::DMA_FORMAT => "DMA format",
                small_item::START_DEPENDENT => "start dependent functions",
                small_item::END_DEPENDENT => "end dependent functions",
                small_item::IO_PORT => "I/O port",
                small_item::FIXED_IO_PORT => "fixed I/O port",
                small_item::VENDOR_DEFINED => "vendor defined (small)",
                small_item::END_TAG => "end tag",
                _ => "reserved (small)",
            },
            Self::Large { item_type, .. } => match item_type {
                large_item::MEMORY_RANGE => "memory range",
                large_item::ANSI_IDENTIFIER_STRING => "ANSI identifier string",
                large_item::UNICODE_IDENTIFIER_STRING => "Unicode identifier string",
                large_item::VENDOR_DEFINED => "vendor defined (large)",
                large_item::MEMORY_RANGE_32 => "32-bit memory range",
                large_item::FIXED_MEMORY_RANGE_32 => "32-bit fixed memory range",
                _ => "reserved (large)",
            },
        }
    }

    pub fn length(&self) -> usize {
        match *self {
            Self::Small { length, .. } => usize::from(length),
            Self::Large { length, .. } => usize::from(length),
        }
    }
}

/// Source of resource data bytes, one handshaken byte per call.
pub trait ResourceByteSource {
    fn next_byte(&mut self) -> Result<u8, ReadTimeout>;
}

impl<S: ResourceByteSource + ?Sized> ResourceByteSource for &mut S {
    fn next_byte(&mut self) -> Result<u8, ReadTimeout> {
        (**self).next_byte()
    }
}

/// Resource bytes held in memory, e.g. a dump file read back from disk.
///
/// Reading past the end behaves like a card that stopped answering.
#[derive(Debug, Clone)]
pub struct SliceSource<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceSource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl ResourceByteSource for SliceSource<'_> {
    fn next_byte(&mut self) -> Result<u8, ReadTimeout> {
        let byte = self.data.get(self.pos).copied().ok_or(ReadTimeout)?;
        self.pos += 1;
        Ok(byte)
    }
}

/// How decoding of a resource stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceOutcome {
    /// End tag reached; `checksum` is its last trailing byte.
    Complete { checksum: u8 },
    /// The header was all `0x00` or all `0xFF`.
    HeaderInvalid { fill: u8 },
    /// A `0x00`/`0xFF` tag byte was read where an item should start.
    MalformedTag { tag: u8 },
    /// Byte at `offset` (0-based) never became ready.
    ReadTimeout { offset: usize },
}

impl ResourceOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete { .. })
    }

    /// The outcome as an error, `None` when the stream completed.
    pub fn error(&self) -> Option<PnpError> {
        match *self {
            Self::Complete { .. } => None,
            Self::HeaderInvalid { fill } => Some(PnpError::InvalidHeader { fill }),
            Self::MalformedTag { tag } => Some(PnpError::MalformedTag { tag }),
            Self::ReadTimeout { offset } => Some(PnpError::ReadTimeout { offset }),
        }
    }
}

/// Everything identified while decoding one card's resource data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSummary {
    pub header: [u8; RESOURCE_HEADER_LEN],
    pub logical_devices: Vec<ParsedId>,
    pub identifier_strings: Vec<String>,
    pub outcome: ResourceOutcome,
    /// Bytes pulled from the source, including timed-out ones.
    pub bytes_consumed: usize,
}

/// Decoder state for one resource stream.
struct StreamParser<S> {
    source: S,
    consumed: usize,
}

impl<S: ResourceByteSource> StreamParser<S> {
    /// Read one byte, substituting [`TIMEOUT_SENTINEL`] on timeout.
    fn read_lenient(&mut self) -> (u8, bool) {
        let offset = self.consumed;
        self.consumed += 1;
        match self.source.next_byte() {
            Ok(byte) => (byte, false),
            Err(ReadTimeout) => {
                warn!(offset, "resource read timed out at byte {}", offset + 1);
                (TIMEOUT_SENTINEL, true)
            }
        }
    }

    fn read(&mut self) -> Result<u8, ResourceOutcome> {
        let offset = self.consumed;
        match self.read_lenient() {
            (byte, false) => Ok(byte),
            (_, true) => Err(ResourceOutcome::ReadTimeout { offset }),
        }
    }

    fn skip(&mut self, count: usize) -> Result<(), ResourceOutcome> {
        for _ in 0..count {
            self.read()?;
        }
        Ok(())
    }

    fn items(
        &mut self,
        logical_devices: &mut Vec<ParsedId>,
        identifier_strings: &mut Vec<String>,
    ) -> ResourceOutcome {
        match self.decode_items(logical_devices, identifier_strings) {
            Ok(outcome) | Err(outcome) => outcome,
        }
    }

    fn decode_items(
        &mut self,
        logical_devices: &mut Vec<ParsedId>,
        identifier_strings: &mut Vec<String>,
    ) -> Result<ResourceOutcome, ResourceOutcome> {
        loop {
            let tag = self.read()?;
            let tag = match ResourceTag::decode(tag) {
                Ok(tag) => tag,
                Err(_) => {
                    debug!("{tag:02X} resource tag, stopping");
                    return Ok(ResourceOutcome::MalformedTag { tag });
                }
            };

            match tag {
                ResourceTag::Large { item_type } => {
                    let length = u16::from_le_bytes([self.read()?, self.read()?]);
                    let item = ResourceItem::Large { item_type, length };
                    trace!(item = item.name(), length, "large item");
                    if item_type == large_item::ANSI_IDENTIFIER_STRING {
                        let text = self.ansi_string(usize::from(length))?;
                        debug!("identifier string \"{text}\"");
                        identifier_strings.push(text);
                    } else {
                        self.skip(item.length())?;
                    }
                }
                ResourceTag::Small { item_type, length } => {
                    let item = ResourceItem::Small { item_type, length };
                    trace!(item = item.name(), length, "small item");
                    match item_type {
                        small_item::LOGICAL_DEVICE_ID if length >= LOGICAL_DEVICE_ID_LEN => {
                            let raw = [self.read()?, self.read()?, self.read()?, self.read()?];
                            let id = ParsedId::from_bytes(raw);
                            debug!("logical device {id}");
                            logical_devices.push(id);
                            self.skip(usize::from(length - LOGICAL_DEVICE_ID_LEN))?;
                        }
                        small_item::END_TAG => {
                            // A zero-length end tag still carries the checksum byte.
                            let mut checksum = 0;
                            for _ in 0..length.max(1) {
                                checksum = self.read()?;
                            }
                            return Ok(ResourceOutcome::Complete { checksum });
                        }
                        _ => self.skip(item.length())?,
                    }
                }
            }
        }
    }

    /// Read an ANSI string payload, dropping NUL, CR and LF.
    fn ansi_string(&mut self, length: usize) -> Result<String, ResourceOutcome> {
        let mut text = String::with_capacity(length);
        for _ in 0..length {
            let byte = self.read()?;
            if !matches!(byte, 0x00 | b'\r' | b'\n') {
                text.push(char::from(byte));
            }
        }
        Ok(text)
    }
}

/// Decode a resource stream: header first, then items until the end tag.
pub fn parse_resource_stream<S: ResourceByteSource>(source: S) -> ResourceSummary {
    let mut parser = StreamParser {
        source,
        consumed: 0,
    };

    let mut header = [0u8; RESOURCE_HEADER_LEN];
    let mut header_timeout = None;
    for (offset, slot) in header.iter_mut().enumerate() {
        let (byte, timed_out) = parser.read_lenient();
        if timed_out && header_timeout.is_none() {
            header_timeout = Some(offset);
        }
        *slot = byte;
    }

    let mut logical_devices = Vec::new();
    let mut identifier_strings = Vec::new();

    let outcome = if let Some(fill) = uniform_fill(&header) {
        warn!("invalid header (all {fill:02X})");
        ResourceOutcome::HeaderInvalid { fill }
    } else if let Some(offset) = header_timeout {
        ResourceOutcome::ReadTimeout { offset }
    } else {
        debug!("header: {}", hex_bytes(&header));
        parser.items(&mut logical_devices, &mut identifier_strings)
    };

    ResourceSummary {
        header,
        logical_devices,
        identifier_strings,
        outcome,
        bytes_consumed: parser.consumed,
    }
}

/// `Some(fill)` when the header is entirely `0x00` or entirely `0xFF`.
fn uniform_fill(header: &[u8; RESOURCE_HEADER_LEN]) -> Option<u8> {
    [0x00, 0xFF]
        .into_iter()
        .find(|fill| header.iter().all(|b| b == fill))
}

/// Space-separated uppercase hex.
pub fn hex_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: [u8; 9] = [0x0E, 0x8C, 0x00, 0x42, 0x01, 0x02, 0x03, 0x04, 0x55];

    fn stream(items: &[u8]) -> Vec<u8> {
        let mut data = HEADER.to_vec();
        data.extend_from_slice(items);
        data
    }

    #[test]
    fn test_decode_small_tag() {
        assert_eq!(
            ResourceTag::decode(0x15),
            Ok(ResourceTag::Small {
                item_type: small_item::LOGICAL_DEVICE_ID,
                length: 5
            })
        );
        assert_eq!(
            ResourceTag::decode(0x79),
            Ok(ResourceTag::Small {
                item_type: small_item::END_TAG,
                length: 1
            })
        );
    }

    #[test]
    fn test_decode_large_tag() {
        assert_eq!(
            ResourceTag::decode(0x82),
            Ok(ResourceTag::Large {
                item_type: large_item::ANSI_IDENTIFIER_STRING
            })
        );
    }

    #[test]
    fn test_decode_rejects_fill_bytes() {
        assert_eq!(
            ResourceTag::decode(0x00),
            Err(PnpError::MalformedTag { tag: 0x00 })
        );
        assert_eq!(
            ResourceTag::decode(0xFF),
            Err(PnpError::MalformedTag { tag: 0xFF })
        );
    }

    #[test]
    fn test_tag_builders() {
        assert_eq!(ResourceTag::small(small_item::END_TAG, 1), 0x79);
        assert_eq!(ResourceTag::small(small_item::LOGICAL_DEVICE_ID, 6), 0x16);
        assert_eq!(ResourceTag::large(large_item::ANSI_IDENTIFIER_STRING), 0x82);
    }

    #[test]
    fn test_parse_logical_devices_and_string() {
        let data = stream(&[
            0x0A, 0x10, 0x10, // PnP version
            0x82, 0x05, 0x00, b'S', b'B', b'\r', b'1', b'6', // ANSI string
            0x15, 0x0E, 0x8C, 0x00, 0x31, 0x00, // logical device CTL0031, 1 extra byte
            0x79, 0x3C, // end tag + checksum
        ]);
        let summary = parse_resource_stream(SliceSource::new(&data));
        assert_eq!(summary.header, HEADER);
        assert_eq!(summary.identifier_strings, vec!["SB16".to_string()]);
        assert_eq!(summary.logical_devices.len(), 1);
        assert_eq!(summary.logical_devices[0].to_string(), "CTL0031");
        assert_eq!(summary.outcome, ResourceOutcome::Complete { checksum: 0x3C });
        assert_eq!(summary.bytes_consumed, data.len());
    }

    #[test]
    fn test_short_logical_device_tag_is_skipped() {
        // length 3 is too short to carry an ID
        let data = stream(&[0x13, 0x0E, 0x8C, 0x00, 0x79, 0x00]);
        let summary = parse_resource_stream(SliceSource::new(&data));
        assert!(summary.logical_devices.is_empty());
        assert!(summary.outcome.is_complete());
    }

    #[test]
    fn test_zero_length_end_tag_reads_checksum() {
        let data = stream(&[0x78, 0xAB, 0xCD]);
        let summary = parse_resource_stream(SliceSource::new(&data));
        assert_eq!(summary.outcome, ResourceOutcome::Complete { checksum: 0xAB });
        assert_eq!(summary.bytes_consumed, HEADER.len() + 2);
    }

    #[test]
    fn test_malformed_tag_stops() {
        let data = stream(&[0x0A, 0x10, 0x10, 0xFF, 0x79, 0x00]);
        let summary = parse_resource_stream(SliceSource::new(&data));
        assert_eq!(summary.outcome, ResourceOutcome::MalformedTag { tag: 0xFF });
        assert_eq!(summary.bytes_consumed, HEADER.len() + 4);
    }

    #[test]
    fn test_invalid_header_all_ff() {
        let data = [0xFFu8; 16];
        let summary = parse_resource_stream(SliceSource::new(&data));
        assert_eq!(summary.outcome, ResourceOutcome::HeaderInvalid { fill: 0xFF });
        assert_eq!(summary.bytes_consumed, 9);
        assert!(summary.logical_devices.is_empty());
    }

    #[test]
    fn test_invalid_header_all_zero() {
        let data = [0x00u8; 9];
        let summary = parse_resource_stream(SliceSource::new(&data));
        assert_eq!(summary.outcome, ResourceOutcome::HeaderInvalid { fill: 0x00 });
    }

    #[test]
    fn test_timeout_mid_item_aborts() {
        // large item declares 4 bytes but the stream ends after 2
        let data = stream(&[0x81, 0x04, 0x00, 0x01, 0x02]);
        let summary = parse_resource_stream(SliceSource::new(&data));
        assert_eq!(
            summary.outcome,
            ResourceOutcome::ReadTimeout {
                offset: HEADER.len() + 5
            }
        );
    }

    #[test]
    fn test_header_timeout_with_valid_prefix() {
        let data = [0x0E, 0x8C, 0x00, 0x42];
        let summary = parse_resource_stream(SliceSource::new(&data));
        assert_eq!(summary.outcome, ResourceOutcome::ReadTimeout { offset: 4 });
        assert_eq!(summary.header[4..], [0xFF; 5]);
    }

    #[test]
    fn test_outcome_error_mapping() {
        assert_eq!(ResourceOutcome::Complete { checksum: 0 }.error(), None);
        assert_eq!(
            ResourceOutcome::HeaderInvalid { fill: 0 }.error(),
            Some(PnpError::InvalidHeader { fill: 0 })
        );
    }

    #[test]
    fn test_item_names() {
        let item = ResourceItem::Small {
            item_type: small_item::IO_PORT,
            length: 7,
        };
        assert_eq!(item.name(), "I/O port");
        assert_eq!(item.length(), 7);
        let item = ResourceItem::Large {
            item_type: 0x70,
            length: 300,
        };
        assert_eq!(item.name(), "reserved (large)");
        assert_eq!(item.length(), 300);
    }
}
