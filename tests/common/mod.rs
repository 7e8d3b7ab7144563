//! Hand-assembled package fixtures, written without the library encoder.

#![allow(dead_code)]

use byteorder::{LittleEndian, WriteBytesExt};

pub const HEADER_SIZE: usize = 64;
pub const SCHEMA_SIZE: usize = 49;
pub const TRAILER: [u8; 4] = [0, 0, 0, 0];

pub fn name_ref(index: u32, number: u32) -> Vec<u8> {
    let mut out = Vec::new();
    out.write_u32::<LittleEndian>(index).unwrap();
    out.write_u32::<LittleEndian>(number).unwrap();
    out
}

/// Narrow string with its NUL terminator.
pub fn fstring(text: &str) -> Vec<u8> {
    let mut out = Vec::new();
    if text.is_empty() {
        out.write_i32::<LittleEndian>(0).unwrap();
        return out;
    }
    out.write_i32::<LittleEndian>(text.len() as i32 + 1).unwrap();
    out.extend_from_slice(text.as_bytes());
    out.push(0);
    out
}

/// Wide string from raw UTF-16 units, terminator included.
pub fn wide_fstring(units: &[u16]) -> Vec<u8> {
    let mut out = Vec::new();
    out.write_i32::<LittleEndian>(-(units.len() as i32 + 1)).unwrap();
    for unit in units.iter().chain([0u16].iter()) {
        out.write_u16::<LittleEndian>(*unit).unwrap();
    }
    out
}

/// A value preceded by its zero flag byte.
pub fn flagged(body: &[u8]) -> Vec<u8> {
    let mut out = vec![0];
    out.extend_from_slice(body);
    out
}

pub fn u16_le(v: u16) -> Vec<u8> {
    v.to_le_bytes().to_vec()
}

pub fn u32_le(v: u32) -> Vec<u8> {
    v.to_le_bytes().to_vec()
}

pub fn i32_le(v: i32) -> Vec<u8> {
    v.to_le_bytes().to_vec()
}

/// Array item schema with a recognizable byte pattern.
pub fn schema() -> Vec<u8> {
    (0..SCHEMA_SIZE as u8).collect()
}

/// Property tag and body with an explicit declared size.
pub fn node(name: &[u8], type_name: &[u8], declared: u32, body: &[u8]) -> Vec<u8> {
    let mut out = name.to_vec();
    out.extend_from_slice(type_name);
    out.write_u32::<LittleEndian>(declared).unwrap();
    out.write_u32::<LittleEndian>(0).unwrap();
    out.extend_from_slice(body);
    out
}

pub struct Package {
    names: Vec<String>,
    pub summary: Vec<u8>,
    pub graph_data_size: i32,
}

impl Package {
    pub fn new(names: &[&str]) -> Self {
        Self {
            names: names.iter().map(|s| s.to_string()).collect(),
            summary: vec![0x5a; 8],
            graph_data_size: 4,
        }
    }

    pub fn index(&self, text: &str) -> u32 {
        self.names
            .iter()
            .position(|n| n == text)
            .unwrap_or_else(|| panic!("fixture name `{text}` missing")) as u32
    }

    pub fn name(&self, text: &str) -> Vec<u8> {
        name_ref(self.index(text), 0)
    }

    pub fn tagged(&self, name: &str, type_name: &str, declared: u32, body: &[u8]) -> Vec<u8> {
        node(&self.name(name), &self.name(type_name), declared, body)
    }

    /// Nodes followed by the `None` terminator.
    pub fn list(&self, nodes: &[Vec<u8>]) -> Vec<u8> {
        let mut out: Vec<u8> = nodes.concat();
        out.extend(self.name("None"));
        out
    }

    fn name_map(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for text in &self.names {
            out.push(text.len() as u8);
            out.extend_from_slice(text.as_bytes());
            out.push(0);
        }
        out
    }

    /// Offset where the property list starts.
    pub fn properties_start(&self) -> usize {
        HEADER_SIZE + 1 + self.name_map().len() + self.summary.len()
    }

    /// Header, zero byte, name map, summary, `properties` and a four byte trailer.
    pub fn build(&self, properties: &[u8]) -> Vec<u8> {
        let name_map = self.name_map();
        let names_size = name_map.len() as i32;
        let hashes_offset = (HEADER_SIZE + 1) as i32 + names_size;
        let hashes_size = (self.names.len() as i32 + 1) * 8;
        let summary_end = self.properties_start() as i32;

        let mut out = Vec::new();
        out.write_u64::<LittleEndian>(1).unwrap();
        out.write_u64::<LittleEndian>(5).unwrap();
        out.write_u32::<LittleEndian>(0).unwrap();
        out.write_u32::<LittleEndian>(HEADER_SIZE as u32).unwrap();
        out.write_i32::<LittleEndian>(HEADER_SIZE as i32).unwrap();
        out.write_i32::<LittleEndian>(names_size).unwrap();
        out.write_i32::<LittleEndian>(hashes_offset).unwrap();
        out.write_i32::<LittleEndian>(hashes_size).unwrap();
        out.write_i32::<LittleEndian>(hashes_offset + hashes_size).unwrap();
        out.write_i32::<LittleEndian>(hashes_offset + hashes_size + 16).unwrap();
        out.write_i32::<LittleEndian>(hashes_offset + hashes_size + 8).unwrap();
        out.write_i32::<LittleEndian>(summary_end - self.graph_data_size).unwrap();
        out.write_i32::<LittleEndian>(self.graph_data_size).unwrap();
        out.write_i32::<LittleEndian>(0).unwrap();
        assert_eq!(out.len(), HEADER_SIZE);

        out.push(0);
        out.extend(name_map);
        out.extend_from_slice(&self.summary);
        assert_eq!(out.len(), summary_end as usize);
        out.extend_from_slice(properties);
        out.extend_from_slice(&TRAILER);
        out
    }
}
