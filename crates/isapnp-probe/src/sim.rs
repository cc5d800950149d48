//! Simulated ISA bus carrying PnP cards and an optional UMC Super I/O.
//!
//! Cards follow the PnP state machine (Wait for Key, Sleep, Isolation,
//! Config), arbitrate bit by bit during isolation and answer the
//! status/data handshake. Faults can be injected per port or per card.

use std::collections::{BTreeMap, BTreeSet};

use isapnp_protocol::registers::{
    ADDRESS_PORT, ISOLATION_BYTES, RESOURCE_HEADER_LEN, WRITE_DATA_PORT, config_control,
    read_port_from_argument, reg,
};
use isapnp_protocol::{INITIATION_KEY, ResourceTag, SerialIdentifier, large_item, small_item};

use crate::port_io::PortIo;
use crate::superio;

const ISOLATION_BITS: usize = ISOLATION_BYTES * 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardState {
    WaitForKey,
    Sleep,
    Isolation,
    Config,
}

#[derive(Debug, Clone)]
pub struct SimulatedCard {
    identifier: SerialIdentifier,
    resources: Vec<u8>,
    stall_after: Option<usize>,
    state: CardState,
    csn: u8,
    resource_pos: usize,
    contending: bool,
}

impl SimulatedCard {
    /// Card with a valid checksum and an empty resource list.
    pub fn new(id: [u8; 8]) -> Self {
        let identifier = SerialIdentifier::with_checksum(id);
        Self {
            identifier,
            resources: resource_stream(&identifier, &[]),
            stall_after: None,
            state: CardState::WaitForKey,
            csn: 0,
            resource_pos: 0,
            contending: false,
        }
    }

    /// Resource items following the header; the end tag is appended.
    pub fn with_resource_items(mut self, items: &[u8]) -> Self {
        self.resources = resource_stream(&self.identifier, items);
        self
    }

    /// Replace the whole resource stream, header included.
    pub fn with_raw_resources(mut self, bytes: Vec<u8>) -> Self {
        self.resources = bytes;
        self
    }

    /// Drive a wrong checksum during isolation.
    pub fn with_corrupt_checksum(mut self) -> Self {
        let mut bytes = *self.identifier.as_bytes();
        if let Some(sum) = bytes.last_mut() {
            *sum ^= 0x01;
        }
        self.identifier = SerialIdentifier::from_bytes(bytes);
        self
    }

    /// Stop raising the ready bit once `count` resource bytes were read.
    pub fn stalling_after(mut self, count: usize) -> Self {
        self.stall_after = Some(count);
        self
    }

    pub fn identifier(&self) -> SerialIdentifier {
        self.identifier
    }

    pub fn state(&self) -> CardState {
        self.state
    }

    pub fn csn(&self) -> u8 {
        self.csn
    }

    pub fn resources(&self) -> &[u8] {
        &self.resources
    }

    fn isolation_bit(&self, index: usize) -> bool {
        let byte = self.identifier.as_bytes().get(index / 8).copied().unwrap_or(0);
        (byte >> (index % 8)) & 1 == 1
    }

    fn awake(&self) -> bool {
        self.state != CardState::WaitForKey
    }

    fn stalled(&self) -> bool {
        self.stall_after.is_some_and(|n| self.resource_pos >= n)
    }
}

/// Header, items, then an end tag whose checksum zeroes the item sum.
fn resource_stream(identifier: &SerialIdentifier, items: &[u8]) -> Vec<u8> {
    let mut stream = Vec::with_capacity(RESOURCE_HEADER_LEN + items.len() + 2);
    stream.extend_from_slice(identifier.as_bytes());
    stream.extend_from_slice(items);
    let end = ResourceTag::small(small_item::END_TAG, 1);
    let sum = items.iter().fold(end, |acc, b| acc.wrapping_add(*b));
    stream.push(end);
    stream.push(0u8.wrapping_sub(sum));
    stream
}

/// Encode an ANSI identifier string item.
pub fn ansi_identifier_item(text: &str) -> Vec<u8> {
    let len = u16::try_from(text.len()).unwrap_or(u16::MAX);
    let mut item = vec![ResourceTag::large(large_item::ANSI_IDENTIFIER_STRING)];
    item.extend_from_slice(&len.to_le_bytes());
    item.extend(text.bytes().take(usize::from(len)));
    item
}

/// Encode a logical device ID item (ID plus one flags byte).
pub fn logical_device_item(raw: [u8; 4]) -> Vec<u8> {
    let mut item = vec![ResourceTag::small(small_item::LOGICAL_DEVICE_ID, 5)];
    item.extend_from_slice(&raw);
    item.push(0x00);
    item
}

/// Encode a 16-bit decode I/O port descriptor.
pub fn io_port_item(min: u16, max: u16, align: u8, length: u8) -> Vec<u8> {
    let mut item = vec![ResourceTag::small(small_item::IO_PORT, 7), 0x01];
    item.extend_from_slice(&min.to_le_bytes());
    item.extend_from_slice(&max.to_le_bytes());
    item.push(align);
    item.push(length);
    item
}

/// UMC Super I/O register file behind ports 0x108/0x109.
#[derive(Debug, Clone)]
pub struct SimulatedUmc {
    registers: [u8; 256],
    index: u8,
    unlocked: bool,
    expect_index: bool,
}

impl SimulatedUmc {
    pub fn new(c2: u8) -> Self {
        let mut registers = [0u8; 256];
        for (i, slot) in registers.iter_mut().enumerate() {
            *slot = i as u8;
        }
        if let Some(slot) = registers.get_mut(usize::from(superio::REG_ID)) {
            *slot = c2;
        }
        if let Some(slot) = registers.get_mut(usize::from(superio::REG_CONFIG)) {
            *slot = 0x00;
        }
        Self {
            registers,
            index: 0,
            unlocked: false,
            expect_index: false,
        }
    }

    pub fn registers(&self) -> &[u8; 256] {
        &self.registers
    }

    pub fn is_locked(&self) -> bool {
        !self.unlocked
    }

    pub fn pnp_enabled(&self) -> bool {
        self.register(superio::REG_CONFIG) & superio::PNP_ENABLE != 0
    }

    fn register(&self, index: u8) -> u8 {
        self.registers.get(usize::from(index)).copied().unwrap_or(0xFF)
    }

    fn write_index(&mut self, value: u8) {
        if self.expect_index {
            self.index = value;
            self.expect_index = false;
            return;
        }
        match value {
            superio::UNLOCK => {
                self.unlocked = true;
                self.expect_index = true;
            }
            superio::LOCK => self.unlocked = false,
            index => self.index = index,
        }
    }

    fn read_data(&self) -> u8 {
        if self.unlocked {
            self.register(self.index)
        } else {
            0xFF
        }
    }

    fn write_data(&mut self, value: u8) {
        if self.unlocked
            && let Some(slot) = self.registers.get_mut(usize::from(self.index))
        {
            *slot = value;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimulatedBus {
    cards: Vec<SimulatedCard>,
    umc: Option<SimulatedUmc>,
    key_progress: usize,
    address: u8,
    read_port: Option<u16>,
    isolation_bit: usize,
    isolation_second_read: bool,
    blocked: BTreeSet<u16>,
    jammed: BTreeMap<u16, u8>,
    elapsed_ms: u64,
    writes: Vec<(u16, u8)>,
}

impl SimulatedBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_card(mut self, card: SimulatedCard) -> Self {
        self.cards.push(card);
        self
    }

    pub fn with_umc(mut self, umc: SimulatedUmc) -> Self {
        self.umc = Some(umc);
        self
    }

    /// Reads on `port` see a floating bus even when it is programmed.
    pub fn block_port(mut self, port: u16) -> Self {
        self.blocked.insert(port);
        self
    }

    /// Another device answers every read on `port` with `value`.
    pub fn jam_port(mut self, port: u16, value: u8) -> Self {
        self.jammed.insert(port, value);
        self
    }

    /// Two sound cards and a UMC Super I/O.
    pub fn demo() -> Self {
        let mut sb16 = vec![0x0A, 0x10, 0x10];
        sb16.extend(ansi_identifier_item("Creative SB16 PnP"));
        sb16.extend(logical_device_item([0x0E, 0x8C, 0x00, 0x31]));
        sb16.extend(io_port_item(0x0220, 0x0280, 0x20, 0x10));
        sb16.extend(logical_device_item([0x0E, 0x8C, 0x70, 0x01]));
        sb16.extend(io_port_item(0x0200, 0x0200, 0x01, 0x08));

        let mut ess = vec![0x0A, 0x10, 0x00];
        ess.extend(ansi_identifier_item("ES1868 Plug and Play AudioDrive"));
        ess.extend(logical_device_item([0x16, 0x73, 0x18, 0x68]));
        ess.extend(io_port_item(0x0220, 0x0280, 0x20, 0x10));

        Self::new()
            .with_card(
                SimulatedCard::new([0x0E, 0x8C, 0x00, 0x42, 0x78, 0x56, 0x34, 0x12])
                    .with_resource_items(&sb16),
            )
            .with_card(
                SimulatedCard::new([0x16, 0x73, 0x18, 0x68, 0x01, 0x00, 0x00, 0x00])
                    .with_resource_items(&ess),
            )
            .with_umc(SimulatedUmc::new(0x90))
    }

    pub fn cards(&self) -> &[SimulatedCard] {
        &self.cards
    }

    pub fn umc(&self) -> Option<&SimulatedUmc> {
        self.umc.as_ref()
    }

    /// Port the cards currently answer on.
    pub fn read_port(&self) -> Option<u16> {
        self.read_port
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    /// Every byte written, in order.
    pub fn writes(&self) -> &[(u16, u8)] {
        &self.writes
    }

    fn advance_key(&mut self, value: u8) {
        let expected = INITIATION_KEY.get(self.key_progress).copied();
        self.key_progress = if expected == Some(value) {
            self.key_progress + 1
        } else {
            usize::from(INITIATION_KEY.first() == Some(&value))
        };
        if self.key_progress == INITIATION_KEY.len() {
            self.key_progress = 0;
            for card in &mut self.cards {
                if card.state == CardState::WaitForKey {
                    card.state = CardState::Sleep;
                }
            }
        }
    }

    fn restart_isolation(&mut self) {
        self.isolation_bit = 0;
        self.isolation_second_read = false;
        for card in &mut self.cards {
            card.contending = card.state == CardState::Isolation;
        }
    }

    fn command(&mut self, register: u8, value: u8) {
        match register {
            reg::SET_RD_DATA => self.read_port = Some(read_port_from_argument(value)),
            reg::CONFIG_CONTROL => {
                for card in self.cards.iter_mut().filter(|c| c.awake()) {
                    if value & config_control::RESET_CSN != 0 {
                        card.csn = 0;
                    }
                    if value & config_control::WAIT_FOR_KEY != 0 {
                        card.state = CardState::WaitForKey;
                        card.contending = false;
                    }
                }
            }
            reg::WAKE => {
                for card in self.cards.iter_mut().filter(|c| c.awake()) {
                    if card.csn == value {
                        if value == 0 {
                            card.state = CardState::Isolation;
                        } else {
                            card.state = CardState::Config;
                            card.resource_pos = 0;
                        }
                    } else if matches!(card.state, CardState::Isolation | CardState::Config) {
                        card.state = CardState::Sleep;
                    }
                }
                self.restart_isolation();
            }
            reg::CARD_SELECT_NUMBER => {
                let complete = self.isolation_bit >= ISOLATION_BITS;
                for card in &mut self.cards {
                    if complete && card.state == CardState::Isolation && card.contending {
                        card.csn = value;
                        card.state = CardState::Config;
                        card.resource_pos = 0;
                        card.contending = false;
                    }
                }
            }
            _ => {}
        }
    }

    fn isolation_read(&mut self) -> u8 {
        let bit = self.isolation_bit;
        if bit >= ISOLATION_BITS {
            return 0xFF;
        }
        let driving = self
            .cards
            .iter()
            .any(|c| c.state == CardState::Isolation && c.contending && c.isolation_bit(bit));

        if !self.isolation_second_read {
            self.isolation_second_read = true;
            return if driving { 0x55 } else { 0xFF };
        }

        self.isolation_second_read = false;
        self.isolation_bit += 1;
        if !driving {
            return 0xFF;
        }
        for card in &mut self.cards {
            if card.state == CardState::Isolation && card.contending && !card.isolation_bit(bit) {
                card.contending = false;
                card.state = CardState::Sleep;
            }
        }
        0xAA
    }

    fn selected_card(&mut self) -> Option<&mut SimulatedCard> {
        self.cards.iter_mut().find(|c| c.state == CardState::Config)
    }
}

impl PortIo for SimulatedBus {
    fn read_byte(&mut self, port: u16) -> u8 {
        if let Some(&value) = self.jammed.get(&port) {
            return value;
        }
        if port == superio::INDEX_PORT {
            return self.umc.as_ref().map_or(0xFF, |umc| umc.index);
        }
        if port == superio::DATA_PORT {
            return self.umc.as_ref().map_or(0xFF, SimulatedUmc::read_data);
        }
        if self.read_port != Some(port) || self.blocked.contains(&port) {
            return 0xFF;
        }

        match self.address {
            reg::SERIAL_ISOLATION => self.isolation_read(),
            reg::STATUS => match self.selected_card() {
                Some(card) if card.stalled() => 0x00,
                Some(_) => 0x01,
                None => 0xFF,
            },
            reg::RESOURCE_DATA => match self.selected_card() {
                Some(card) => {
                    let byte = card.resources.get(card.resource_pos).copied().unwrap_or(0xFF);
                    card.resource_pos += 1;
                    byte
                }
                None => 0xFF,
            },
            _ => 0xFF,
        }
    }

    fn write_byte(&mut self, port: u16, value: u8) {
        self.writes.push((port, value));
        match port {
            ADDRESS_PORT => {
                self.address = value;
                self.advance_key(value);
                if value == reg::SERIAL_ISOLATION {
                    self.restart_isolation();
                }
            }
            WRITE_DATA_PORT => self.command(self.address, value),
            superio::INDEX_PORT => {
                if let Some(umc) = self.umc.as_mut() {
                    umc.write_index(value);
                }
            }
            superio::DATA_PORT => {
                if let Some(umc) = self.umc.as_mut() {
                    umc.write_data(value);
                }
            }
            _ => {}
        }
    }

    fn delay_ms(&mut self, ms: u32) {
        self.elapsed_ms += u64::from(ms);
    }
}
