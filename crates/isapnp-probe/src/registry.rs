//! Card registry: one record per dumped card, used to give repeated
//! identifiers distinct dump file names.

use isapnp_protocol::ParsedId;
use serde::Serialize;

/// Letters available for the occurrence suffix.
const SUFFIX_LETTERS: usize = 26;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardRecord {
    /// `None` for entries that were not isolated, such as the Super I/O.
    pub csn: Option<u8>,
    /// Sanitized identifier used for file naming.
    pub name: String,
    /// How many records with the same name preceded this one.
    pub occurrence: usize,
}

impl CardRecord {
    /// `'A'` for the first occurrence, wrapping after `'Z'`.
    pub fn suffix(&self) -> char {
        let letter = (self.occurrence % SUFFIX_LETTERS) as u8;
        char::from(b'A' + letter)
    }

    /// `<name><suffix>.BIN`
    pub fn file_name(&self) -> String {
        format!("{}{}.BIN", self.name, self.suffix())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CardRegistry {
    records: Vec<CardRecord>,
}

impl CardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an isolated card under its sanitized identifier.
    pub fn register_card(&mut self, csn: u8, id: ParsedId) -> CardRecord {
        self.register(Some(csn), &id.sanitized().to_string())
    }

    /// Record an arbitrary named entry.
    pub fn register(&mut self, csn: Option<u8>, name: &str) -> CardRecord {
        let record = CardRecord {
            csn,
            name: name.to_string(),
            occurrence: self.occurrences(name),
        };
        self.records.push(record.clone());
        record
    }

    pub fn occurrences(&self, name: &str) -> usize {
        self.records.iter().filter(|r| r.name == name).count()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
