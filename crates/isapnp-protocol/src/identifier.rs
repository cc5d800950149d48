//! Serial identifiers and their human-readable EISA-style form.

use core::fmt;

use crate::error::{PnpError, PnpResult};
use crate::lfsr;
use crate::registers::{ISOLATION_BYTES, SERIAL_ID_LEN};

/// The 72 bits a card shifts out during isolation.
///
/// Bytes 0..2 hold the compressed vendor code (big-endian), bytes 2..4 the
/// product code, bytes 4..8 the serial number (little-endian) and byte 8 the
/// LFSR checksum over the first eight bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SerialIdentifier {
    bytes: [u8; ISOLATION_BYTES],
}

impl SerialIdentifier {
    pub const fn from_bytes(bytes: [u8; ISOLATION_BYTES]) -> Self {
        Self { bytes }
    }

    /// Build an identifier whose checksum byte is computed from `id`.
    pub const fn with_checksum(id: [u8; SERIAL_ID_LEN]) -> Self {
        let sum = lfsr::checksum(&id);
        Self {
            bytes: [id[0], id[1], id[2], id[3], id[4], id[5], id[6], id[7], sum],
        }
    }

    pub const fn as_bytes(&self) -> &[u8; ISOLATION_BYTES] {
        &self.bytes
    }

    pub const fn id_bytes(&self) -> [u8; SERIAL_ID_LEN] {
        let b = &self.bytes;
        [b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]
    }

    /// Checksum byte as received from the card.
    pub const fn checksum_byte(&self) -> u8 {
        self.bytes[SERIAL_ID_LEN]
    }

    /// Checksum the first eight bytes should carry.
    pub const fn expected_checksum(&self) -> u8 {
        lfsr::checksum(&self.id_bytes())
    }

    pub const fn is_valid(&self) -> bool {
        self.checksum_byte() == self.expected_checksum()
    }

    pub fn validate(&self) -> PnpResult<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(PnpError::ChecksumMismatch {
                expected: self.expected_checksum(),
                actual: self.checksum_byte(),
            })
        }
    }

    /// Serial number as shown to operators: byte 7 first.
    pub fn serial_hex(&self) -> String {
        format!("{:08X}", self.serial_number())
    }

    pub const fn vendor_code(&self) -> u16 {
        u16::from_be_bytes([self.bytes[0], self.bytes[1]])
    }

    pub const fn product_code(&self) -> u16 {
        u16::from_be_bytes([self.bytes[2], self.bytes[3]])
    }

    pub const fn serial_number(&self) -> u32 {
        u32::from_le_bytes([self.bytes[4], self.bytes[5], self.bytes[6], self.bytes[7]])
    }

    pub fn parsed_id(&self) -> ParsedId {
        ParsedId::from_bytes([self.bytes[0], self.bytes[1], self.bytes[2], self.bytes[3]])
    }
}

/// Three-letter vendor mnemonic plus 16-bit product code, e.g. `PNP0C00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParsedId {
    vendor: [u8; 3],
    product: u16,
}

impl ParsedId {
    /// Decode the 4 raw bytes used by serial identifiers and logical device tags.
    ///
    /// Each vendor letter is a 5-bit field offset from `'@'`.
    pub const fn from_bytes(raw: [u8; 4]) -> Self {
        let vendor = u16::from_be_bytes([raw[0], raw[1]]);
        Self {
            vendor: [
                b'@' + ((vendor >> 10) & 0x1F) as u8,
                b'@' + ((vendor >> 5) & 0x1F) as u8,
                b'@' + (vendor & 0x1F) as u8,
            ],
            product: u16::from_be_bytes([raw[2], raw[3]]),
        }
    }

    pub const fn vendor(&self) -> [u8; 3] {
        self.vendor
    }

    pub const fn product(&self) -> u16 {
        self.product
    }

    /// Copy with every vendor letter above `'Z'` replaced by `'_'`.
    pub const fn sanitized(&self) -> Self {
        let mut vendor = self.vendor;
        let mut i = 0;
        while i < vendor.len() {
            if vendor[i] > b'Z' {
                vendor[i] = b'_';
            }
            i += 1;
        }
        Self {
            vendor,
            product: self.product,
        }
    }
}

impl fmt::Display for ParsedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c] = self.vendor;
        write!(
            f,
            "{}{}{}{:04X}",
            char::from(a),
            char::from(b),
            char::from(c),
            self.product
        )
    }
}
