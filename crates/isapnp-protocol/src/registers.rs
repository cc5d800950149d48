//! ISA PnP control ports, register indices and scan constants.

/// ADDRESS port: selects the PnP register and receives the initiation key.
pub const ADDRESS_PORT: u16 = 0x0279;

/// WRITE_DATA port: argument for the register selected through [`ADDRESS_PORT`].
pub const WRITE_DATA_PORT: u16 = 0x0A79;

/// Seed of the LFSR used for both the initiation key and identifier checksums.
pub const LFSR_SEED: u8 = 0x6A;

/// Length of the initiation key in bytes.
pub const INITIATION_KEY_LEN: usize = 32;

/// Serial identifier length without the checksum byte.
pub const SERIAL_ID_LEN: usize = 8;

/// Bytes transferred during one isolation pass (identifier plus checksum).
pub const ISOLATION_BYTES: usize = SERIAL_ID_LEN + 1;

/// Composite of the two isolation reads when a card asserts a one bit.
pub const ISOLATION_SIGNATURE: u16 = 0x55AA;

/// Composite of the two isolation reads when nothing drives the bus.
pub const FLOATING_BUS: u16 = 0xFFFF;

/// Size of the resource data header (serial identifier plus checksum).
pub const RESOURCE_HEADER_LEN: usize = 9;

/// Card-level PnP registers.
pub mod reg {
    /// Set RD_DATA port; the argument is bits 9..2 of the port address.
    pub const SET_RD_DATA: u8 = 0x00;
    /// Serial isolation register.
    pub const SERIAL_ISOLATION: u8 = 0x01;
    /// Config control register.
    pub const CONFIG_CONTROL: u8 = 0x02;
    /// Wake\[CSN\] register.
    pub const WAKE: u8 = 0x03;
    /// Resource data register.
    pub const RESOURCE_DATA: u8 = 0x04;
    /// Status register; bit 0 set when a resource data byte is ready.
    pub const STATUS: u8 = 0x05;
    /// Card Select Number register.
    pub const CARD_SELECT_NUMBER: u8 = 0x06;
}

/// Bits written to [`reg::CONFIG_CONTROL`].
pub mod config_control {
    /// Return every card to the Wait for Key state.
    pub const WAIT_FOR_KEY: u8 = 0x02;
    /// Reset every card's CSN to zero.
    pub const RESET_CSN: u8 = 0x04;
}

/// Status register bit signalling a ready resource data byte.
pub const STATUS_DATA_READY: u8 = 0x01;

/// Read Data Port candidates probed by the port scanner.
pub mod read_port {
    /// Lowest candidate address.
    pub const FIRST: u16 = 0x0213;
    /// Highest candidate address.
    pub const LAST: u16 = 0x03FF;
    /// Distance between consecutive candidates.
    pub const STRIDE: u16 = 16;
    /// Start of the reserved hole that never receives isolation traffic.
    pub const HOLE_FIRST: u16 = 0x0280;
    /// End (inclusive) of the reserved hole.
    pub const HOLE_LAST: u16 = 0x0380;
}

/// Default number of status polls before a resource byte read times out.
pub const DEFAULT_READY_RETRIES: u32 = 20;

/// Highest Card Select Number the protocol can address.
pub const MAX_CSN: u8 = 0xFF;

/// Encode a Read Data Port address as the SET_RD_DATA argument.
///
/// The register holds address bits 9..2; bits 1..0 are implied as `11`.
pub const fn read_port_argument(port: u16) -> u8 {
    ((port >> 2) & 0xFF) as u8
}

/// Decode a SET_RD_DATA argument back into the port address cards respond on.
pub const fn read_port_from_argument(argument: u8) -> u16 {
    ((argument as u16) << 2) | 0x03
}
