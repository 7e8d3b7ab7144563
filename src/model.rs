use crate::names::{NameRef, NameTable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Property type keywords known to the codec.
///
/// The binary format stores type names as interned strings, so a kind is resolved by
/// looking up its keyword in the [`NameTable`] rather than by a numeric opcode. Any
/// other type name is carried as an opaque blob.
///
/// # Examples
///
/// ```
/// use uasset_text::model::PropertyKind;
///
/// let kind: PropertyKind = "IntProperty".parse().unwrap();
/// assert_eq!(kind, PropertyKind::Int32);
/// assert!(!kind.is_block());
/// assert!(PropertyKind::Map.is_block());
/// assert!("DoubleProperty".parse::<PropertyKind>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyKind {
    Bool,
    Byte,
    Int32,
    UInt16,
    UInt32,
    Float,
    Str,
    Struct,
    Array,
    Map,
}

impl PropertyKind {
    pub const ALL: [PropertyKind; 10] = [
        PropertyKind::Bool,
        PropertyKind::Byte,
        PropertyKind::Int32,
        PropertyKind::UInt16,
        PropertyKind::UInt32,
        PropertyKind::Float,
        PropertyKind::Str,
        PropertyKind::Struct,
        PropertyKind::Array,
        PropertyKind::Map,
    ];

    /// The interned type name used for this kind in both the binary and text forms.
    pub fn keyword(&self) -> &'static str {
        match self {
            PropertyKind::Bool => "BoolProperty",
            PropertyKind::Byte => "ByteProperty",
            PropertyKind::Int32 => "IntProperty",
            PropertyKind::UInt16 => "UInt16Property",
            PropertyKind::UInt32 => "UInt32Property",
            PropertyKind::Float => "FloatProperty",
            PropertyKind::Str => "StrProperty",
            PropertyKind::Struct => "StructProperty",
            PropertyKind::Array => "ArrayProperty",
            PropertyKind::Map => "MapProperty",
        }
    }

    /// Returns true for kinds whose values span an indented block of text.
    pub fn is_block(&self) -> bool {
        matches!(self, PropertyKind::Struct | PropertyKind::Array | PropertyKind::Map)
    }
}

impl FromStr for PropertyKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PropertyKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.keyword() == s)
            .ok_or(())
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// A length-prefixed string in the width it is stored in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FString {
    /// One byte per character (Latin-1), positive length prefix.
    Narrow(String),
    /// UTF-16 code units, negative length prefix. Unpaired surrogates are kept as stored.
    Wide(#[serde(with = "crate::json::utf16_units")] Vec<u16>),
}

impl Default for FString {
    fn default() -> Self {
        FString::Narrow(String::new())
    }
}

impl FString {
    pub fn narrow(value: impl Into<String>) -> Self {
        FString::Narrow(value.into())
    }

    pub fn wide(value: &str) -> Self {
        FString::Wide(value.encode_utf16().collect())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            FString::Narrow(text) => text.is_empty(),
            FString::Wide(units) => units.is_empty(),
        }
    }

    /// True if every character of `text` fits in one Latin-1 byte.
    pub fn fits_narrow(text: &str) -> bool {
        text.chars().all(|c| u32::from(c) <= 0xff)
    }
}

/// The value carried by a property node or container element.
///
/// Values are self-describing: a byte value knows its enum, an array its item kind
/// and item schema, a map its key and value kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Bool(bool),
    /// `enum_name` is absent only on keys of a byte-keyed map, which store a single byte
    Byte { enum_name: Option<NameRef>, value: u16 },
    Int32(i32),
    UInt16(u16),
    UInt32(u32),
    Float(#[serde(with = "crate::json::f32_text")] f32),
    Str(FString),
    /// Ordered child properties of a struct
    Struct(Vec<PropertyNode>),
    Array {
        item: PropertyKind,
        /// Fixed-size block stored between the count and the items, kept verbatim
        #[serde(with = "crate::json::hex_bytes")]
        schema: Vec<u8>,
        items: Vec<PropertyValue>,
    },
    /// Key/value pairs in stored order
    Map {
        key: PropertyKind,
        value: PropertyKind,
        entries: Vec<(PropertyValue, PropertyValue)>,
    },
    /// Raw body of a property whose type is not understood
    Opaque {
        type_name: NameRef,
        #[serde(with = "crate::json::hex_bytes")]
        bytes: Vec<u8>,
    },
}

impl PropertyValue {
    /// Kind of a parsed value, `None` for opaque blobs.
    pub fn kind(&self) -> Option<PropertyKind> {
        Some(match self {
            PropertyValue::Bool(_) => PropertyKind::Bool,
            PropertyValue::Byte { .. } => PropertyKind::Byte,
            PropertyValue::Int32(_) => PropertyKind::Int32,
            PropertyValue::UInt16(_) => PropertyKind::UInt16,
            PropertyValue::UInt32(_) => PropertyKind::UInt32,
            PropertyValue::Float(_) => PropertyKind::Float,
            PropertyValue::Str(_) => PropertyKind::Str,
            PropertyValue::Struct(_) => PropertyKind::Struct,
            PropertyValue::Array { .. } => PropertyKind::Array,
            PropertyValue::Map { .. } => PropertyKind::Map,
            PropertyValue::Opaque { .. } => return None,
        })
    }

    /// Short variant label used in type mismatch messages.
    pub fn variant_name(&self) -> &'static str {
        match self {
            PropertyValue::Bool(_) => "Bool",
            PropertyValue::Byte { .. } => "Byte",
            PropertyValue::Int32(_) => "Int32",
            PropertyValue::UInt16(_) => "UInt16",
            PropertyValue::UInt32(_) => "UInt32",
            PropertyValue::Float(_) => "Float",
            PropertyValue::Str(_) => "Str",
            PropertyValue::Struct(_) => "Struct",
            PropertyValue::Array { .. } => "Array",
            PropertyValue::Map { .. } => "Map",
            PropertyValue::Opaque { .. } => "Opaque",
        }
    }

    pub fn is_block(&self) -> bool {
        self.kind().is_some_and(|kind| kind.is_block())
    }
}

/// One named, typed value.
///
/// The declared size stored in the tag is not part of the model: it is checked on
/// decode and recomputed on encode. The type name is derived from the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyNode {
    pub name: NameRef,
    /// Static array slot, 0 for ordinary properties
    pub array_index: u32,
    pub value: PropertyValue,
}

impl PropertyNode {
    pub fn new(name: NameRef, value: PropertyValue) -> Self {
        Self { name, array_index: 0, value }
    }

    /// Number of nodes in this subtree, including self.
    pub fn node_count(&self) -> usize {
        1 + value_node_count(&self.value)
    }
}

fn value_node_count(value: &PropertyValue) -> usize {
    match value {
        PropertyValue::Struct(fields) => fields.iter().map(PropertyNode::node_count).sum(),
        PropertyValue::Array { items, .. } => items.iter().map(value_node_count).sum(),
        PropertyValue::Map { entries, .. } => entries
            .iter()
            .map(|(k, v)| value_node_count(k) + value_node_count(v))
            .sum(),
        _ => 0,
    }
}

/// Fixed 64-byte package summary header.
///
/// The name hash array size is derived from the name table and is not stored here.
/// `graph_data_offset` holds the value as read; encode recomputes it so that the
/// graph data ends where the summary bytes end, and moves the name map size and
/// the later section offsets by the same amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PackageHeader {
    pub name: u64,
    pub source_name: u64,
    pub package_flags: u32,
    pub cooked_header_size: u32,
    pub name_map_names_offset: i32,
    pub name_map_names_size: i32,
    pub name_map_hashes_offset: i32,
    pub import_map_offset: i32,
    pub export_map_offset: i32,
    pub export_bundles_offset: i32,
    pub graph_data_offset: i32,
    pub graph_data_size: i32,
    pub pad: i32,
}

/// One decoded asset file.
///
/// The asset exclusively owns its name table; every [`NameRef`] in the property
/// tree indexes into `names`.
///
/// # Examples
///
/// ```
/// use uasset_text::model::{Asset, PropertyNode, PropertyValue};
///
/// let mut asset = Asset::new();
/// let name = asset.names.name("Health");
/// asset.names.intern("IntProperty");
/// asset.properties.push(PropertyNode::new(name, PropertyValue::Int32(100)));
/// assert_eq!(asset.property_count(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub header: PackageHeader,
    pub names: NameTable,
    /// Summary bytes between the name map and the end of the graph data, kept unparsed
    #[serde(with = "crate::json::hex_bytes")]
    pub summary: Vec<u8>,
    /// Top-level tagged properties, in stored order
    pub properties: Vec<PropertyNode>,
    /// Bytes after the closing `None`
    #[serde(with = "crate::json::hex_bytes")]
    pub trailer: Vec<u8>,
}

impl Default for Asset {
    fn default() -> Self {
        Self::new()
    }
}

impl Asset {
    /// Creates an empty asset whose name table already holds the `None` terminator.
    pub fn new() -> Self {
        let mut names = NameTable::new();
        names.intern(crate::names::NONE);
        Self {
            header: PackageHeader::default(),
            names,
            summary: Vec::new(),
            properties: Vec::new(),
            trailer: vec![0; 4],
        }
    }

    /// Total number of property nodes, nested ones included.
    pub fn property_count(&self) -> usize {
        self.properties.iter().map(PropertyNode::node_count).sum()
    }
}
