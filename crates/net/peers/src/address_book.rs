//! Parsing of the operator-supplied seed list.

use crate::record::{AddressParseError, PeerRecord};

/// One item of the seed list: the raw text and what it parsed into.
#[derive(Debug, Clone)]
pub struct SeedEntry {
    pub raw: String,
    pub record: Result<PeerRecord, AddressParseError>,
}

/// Seed peers in input order. Invalid entries are kept with their parse error
/// so the bootstrap pass can log and skip them individually.
#[derive(Debug, Clone, Default)]
pub struct AddressBook {
    entries: Vec<SeedEntry>,
}

impl AddressBook {
    /// Parse a list separated by `,` or `;`. Blank items are ignored and a peer
    /// listed more than once collapses into its first entry with the addresses merged.
    pub fn parse(list: &str) -> Self {
        let mut book = Self::default();
        for raw in Self::split(list) {
            book.push(raw.to_string(), raw.parse());
        }
        book
    }

    pub fn from_records(records: impl IntoIterator<Item = PeerRecord>) -> Self {
        let mut book = Self::default();
        for record in records {
            book.push(record.to_string(), Ok(record));
        }
        book
    }

    fn push(&mut self, raw: String, record: Result<PeerRecord, AddressParseError>) {
        if let Ok(new) = &record {
            let existing = self
                .entries
                .iter_mut()
                .filter_map(|e| e.record.as_mut().ok())
                .find(|r| r.id() == new.id());
            if let Some(existing) = existing {
                let mut addrs = existing.addrs().to_vec();
                for addr in new.addrs() {
                    if !addrs.contains(addr) {
                        addrs.push(addr.clone());
                    }
                }
                *existing = PeerRecord::new(existing.id(), addrs);
                return;
            }
        }
        self.entries.push(SeedEntry { raw, record });
    }

    /// Non-blank items of a seed list, trimmed.
    pub fn split(list: &str) -> impl Iterator<Item = &str> {
        list.split([',', ';'])
            .map(str::trim)
            .filter(|item| !item.is_empty())
    }

    pub fn entries(&self) -> &[SeedEntry] {
        &self.entries
    }

    pub fn records(&self) -> impl Iterator<Item = &PeerRecord> {
        self.entries.iter().filter_map(|e| e.record.as_ref().ok())
    }

    pub fn errors(&self) -> impl Iterator<Item = (&str, &AddressParseError)> {
        self.entries
            .iter()
            .filter_map(|e| e.record.as_ref().err().map(|err| (e.raw.as_str(), err)))
    }

    /// True when the list contains no entries at all, valid or not.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
