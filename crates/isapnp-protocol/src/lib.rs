//! ISA Plug and Play protocol: initiation key, serial identifiers and
//! resource data decoding.
//!
//! This crate is intentionally I/O-free. It provides pure functions and types
//! that can be tested without hardware; driving the bus is left to callers
//! that implement [`ResourceByteSource`] over real or simulated ports.
//!
//! # Key Features
//! - LFSR initiation key and identifier checksum
//! - Serial identifier fields and EISA-style `ParsedId` mnemonics
//! - Small/large resource tag decoding
//! - Streaming resource parser (logical device IDs, ANSI identifier strings,
//!   end tag checksum)

#![deny(static_mut_refs)]

pub mod error;
pub mod identifier;
pub mod lfsr;
pub mod registers;
pub mod resource;

pub use error::{PnpError, PnpResult, ReadTimeout};
pub use identifier::{ParsedId, SerialIdentifier};
pub use lfsr::{INITIATION_KEY, advance, checksum, initiation_key};
pub use registers::{
    ADDRESS_PORT, FLOATING_BUS, INITIATION_KEY_LEN, ISOLATION_BYTES, ISOLATION_SIGNATURE,
    LFSR_SEED, RESOURCE_HEADER_LEN, SERIAL_ID_LEN, WRITE_DATA_PORT, config_control,
    read_port_argument, read_port_from_argument, reg,
};
pub use resource::{
    ResourceByteSource, ResourceItem, ResourceOutcome, ResourceSummary, ResourceTag,
    SliceSource, TIMEOUT_SENTINEL, hex_bytes, large_item, parse_resource_stream, small_item,
};
