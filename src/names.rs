use crate::error::CodecError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Name that ends every tagged property list.
pub const NONE: &str = "None";

/// Index into a [`NameTable`] plus the instance number.
///
/// A number of 0 means no suffix; `N` displays as `<name>_<N-1>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct NameRef {
    pub index: u32,
    pub number: u32,
}

impl NameRef {
    pub fn new(index: u32) -> Self {
        Self { index, number: 0 }
    }
}

/// Ordered string pool of one asset.
///
/// Entries keep their stored order, duplicates included. `lookup` maps each string
/// to the first index holding it, which is the index [`NameTable::intern`] reuses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct NameTable {
    entries: Vec<String>,
    lookup: IndexMap<String, u32>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry exactly as stored, without deduplication.
    pub fn push_raw(&mut self, text: String) -> u32 {
        let index = self.entries.len() as u32;
        self.lookup.entry(text.clone()).or_insert(index);
        self.entries.push(text);
        index
    }

    /// Returns the index of `text`, appending it if it is not present yet.
    pub fn intern(&mut self, text: &str) -> u32 {
        match self.lookup.get(text) {
            Some(&index) => index,
            None => self.push_raw(text.to_string()),
        }
    }

    /// Interns `text` and returns a reference without an instance number.
    pub fn name(&mut self, text: &str) -> NameRef {
        NameRef::new(self.intern(text))
    }

    pub fn lookup(&self, text: &str) -> Option<u32> {
        self.lookup.get(text).copied()
    }

    pub fn resolve(&self, index: u32) -> Result<&str, CodecError> {
        self.entries
            .get(index as usize)
            .map(String::as_str)
            .ok_or(CodecError::UnknownName {
                index,
                len: self.entries.len(),
            })
    }

    /// Textual form of a reference, `text` or `text_<number-1>`.
    pub fn display(&self, name: NameRef) -> Result<String, CodecError> {
        let text = self.resolve(name.index)?;
        Ok(match name.number {
            0 => text.to_string(),
            n => format!("{text}_{}", n - 1),
        })
    }

    /// Best-effort display used for error paths.
    pub fn display_lossy(&self, name: NameRef) -> String {
        self.display(name).unwrap_or_else(|_| format!("#{}", name.index))
    }

    /// True if `index` is the first entry holding its string.
    pub fn is_canonical(&self, index: u32) -> bool {
        self.entries
            .get(index as usize)
            .is_some_and(|text| self.lookup(text) == Some(index))
    }

    pub fn is_terminator(&self, name: NameRef) -> bool {
        name.number == 0 && self.lookup(NONE) == Some(name.index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}

impl PartialEq for NameTable {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl From<Vec<String>> for NameTable {
    fn from(entries: Vec<String>) -> Self {
        let mut table = NameTable::new();
        for text in entries {
            table.push_raw(text);
        }
        table
    }
}

impl From<NameTable> for Vec<String> {
    fn from(table: NameTable) -> Self {
        table.entries
    }
}
