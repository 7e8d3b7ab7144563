use crate::cursor::{to_u32, ByteReader, ByteWriter, Placeholder};
use crate::error::CodecError;
use crate::model::{Asset, PackageHeader, PropertyKind, PropertyNode, PropertyValue};
use crate::names::{NameRef, NameTable, NONE};
use crate::options::CodecOptions;
use log::{debug, trace, warn};

/// Size of the fixed summary header at the start of every package.
pub const SUMMARY_HEADER_SIZE: u64 = 64;
/// Size of the block stored between an array's count and its items.
pub const ARRAY_SCHEMA_SIZE: usize = 49;
/// Bytes per entry of the name hash array, which also holds one leading entry.
const NAME_HASH_SIZE: i32 = 8;
/// Offset of the name hash array size within the summary header.
const NAME_HASHES_SIZE_AT: u64 = 36;

struct AssetReader<'a> {
    reader: ByteReader<'a>,
    names: NameTable,
    options: CodecOptions,
}

impl<'a> AssetReader<'a> {
    fn new(data: &'a [u8], options: &CodecOptions) -> Self {
        Self {
            reader: ByteReader::new(data),
            names: NameTable::new(),
            options: *options,
        }
    }

    /// Caps a stored element count by what the remaining bytes could possibly hold.
    fn capacity(&self, count: u32, min_size: u64) -> usize {
        u64::from(count).min(self.reader.remaining() / min_size.max(1)) as usize
    }

    fn check_depth(&self, depth: usize) -> Result<(), CodecError> {
        if depth > self.options.max_depth {
            return Err(CodecError::DepthExceeded {
                limit: self.options.max_depth,
                location: format!("offset {:#x}", self.reader.position()),
            });
        }
        Ok(())
    }

    fn read_name(&mut self) -> Result<NameRef, CodecError> {
        let index = self.reader.read_u32()?;
        let number = self.reader.read_u32()?;
        self.names.resolve(index)?;
        Ok(NameRef { index, number })
    }

    /// Reads a zero byte stored ahead of most property values.
    fn read_flag(&mut self) -> Result<(), CodecError> {
        let offset = self.reader.position();
        match self.reader.read_u8()? {
            0 => Ok(()),
            other => Err(CodecError::InvalidValue {
                offset,
                message: format!("property flag byte {other:#04x} is not zero"),
            }),
        }
    }

    fn read_header(&mut self) -> Result<(PackageHeader, i32), CodecError> {
        let name = self.reader.read_u64()?;
        let source_name = self.reader.read_u64()?;
        let package_flags = self.reader.read_u32()?;
        let cooked_header_size = self.reader.read_u32()?;
        let name_map_names_offset = self.reader.read_i32()?;
        let name_map_names_size = self.reader.read_i32()?;
        let name_map_hashes_offset = self.reader.read_i32()?;
        let hashes_size = self.reader.read_i32()?;
        let header = PackageHeader {
            name,
            source_name,
            package_flags,
            cooked_header_size,
            name_map_names_offset,
            name_map_names_size,
            name_map_hashes_offset,
            import_map_offset: self.reader.read_i32()?,
            export_map_offset: self.reader.read_i32()?,
            export_bundles_offset: self.reader.read_i32()?,
            graph_data_offset: self.reader.read_i32()?,
            graph_data_size: self.reader.read_i32()?,
            pad: self.reader.read_i32()?,
        };
        Ok((header, hashes_size))
    }

    fn read_asset(mut self) -> Result<Asset, CodecError> {
        let (header, hashes_size) = self.read_header()?;
        if hashes_size < NAME_HASH_SIZE || hashes_size % NAME_HASH_SIZE != 0 {
            return Err(CodecError::InvalidValue {
                offset: NAME_HASHES_SIZE_AT,
                message: format!("name hash array size {hashes_size} is not a positive multiple of {NAME_HASH_SIZE}"),
            });
        }
        let name_count = (hashes_size / NAME_HASH_SIZE - 1) as u32;

        let offset = self.reader.position();
        if self.reader.read_u8()? != 0 {
            return Err(CodecError::InvalidValue {
                offset,
                message: "expected a zero byte before the name map".to_string(),
            });
        }
        let mut names = Vec::with_capacity(self.capacity(name_count, 2));
        for _ in 0..name_count {
            names.push(self.reader.read_name_entry()?);
        }
        self.names = NameTable::from(names);
        debug!(
            "package {:#018x} with {} names, graph data {:#x}+{}",
            header.name,
            self.names.len(),
            header.graph_data_offset,
            header.graph_data_size
        );

        let names_end = self.reader.position();
        let summary_end = i64::from(header.graph_data_offset) + i64::from(header.graph_data_size);
        let summary_len = u64::try_from(summary_end)
            .ok()
            .and_then(|end| end.checked_sub(names_end))
            .ok_or_else(|| CodecError::Layout {
                section: "graph data end".to_string(),
                recorded: summary_end.max(0) as u64,
                actual: names_end,
            })?;
        let summary = self.reader.read_bytes(summary_len)?;
        trace!("{} summary bytes, properties start at {:#x}", summary.len(), self.reader.position());

        let properties = self.read_property_list(0)?;
        let trailer = self.reader.read_bytes(self.reader.remaining())?;

        Ok(Asset {
            header,
            names: self.names,
            summary,
            properties,
            trailer,
        })
    }

    fn read_property_list(&mut self, depth: usize) -> Result<Vec<PropertyNode>, CodecError> {
        let mut nodes = Vec::new();
        loop {
            let name = self.read_name()?;
            if self.names.is_terminator(name) {
                return Ok(nodes);
            }
            let label = self.names.display_lossy(name);
            let node = self.read_tagged(name, depth).map_err(|e| e.within(&label))?;
            nodes.push(node);
        }
    }

    /// Resolves a type name to a known kind. Non-canonical references and
    /// suffixed names are treated as unknown so they re-encode unchanged.
    fn known_kind(&self, type_name: NameRef) -> Option<PropertyKind> {
        if type_name.number != 0 || !self.names.is_canonical(type_name.index) {
            return None;
        }
        self.names.resolve(type_name.index).ok()?.parse().ok()
    }

    fn read_tagged(&mut self, name: NameRef, depth: usize) -> Result<PropertyNode, CodecError> {
        self.check_depth(depth)?;
        let type_name = self.read_name()?;
        let declared = u64::from(self.reader.read_u32()?);
        let array_index = self.reader.read_u32()?;
        let body_start = self.reader.position();

        let (value, measured) = match self.known_kind(type_name) {
            Some(kind) => self.read_value(kind, depth)?,
            None => {
                debug!(
                    "unknown property type `{}` at {:#x} kept as raw bytes",
                    self.names.display_lossy(type_name),
                    body_start
                );
                // Flag byte plus the declared body
                let bytes = self.reader.read_bytes(declared + 1)?;
                (PropertyValue::Opaque { type_name, bytes }, declared)
            }
        };

        if measured != declared {
            return Err(CodecError::DeclaredSizeMismatch {
                offset: body_start,
                declared,
                actual: measured,
            });
        }

        Ok(PropertyNode {
            name,
            array_index,
            value,
        })
    }

    /// Reads an element type name, which must be a known kind.
    fn read_element_kind(&mut self) -> Result<PropertyKind, CodecError> {
        let offset = self.reader.position();
        let type_name = self.read_name()?;
        self.known_kind(type_name).ok_or_else(|| CodecError::UnsupportedType {
            type_name: self.names.display_lossy(type_name),
            offset,
        })
    }

    /// Reads one value and returns it with its contribution to the declared size.
    fn read_value(&mut self, kind: PropertyKind, depth: usize) -> Result<(PropertyValue, u64), CodecError> {
        let offset = self.reader.position();
        let read = match kind {
            PropertyKind::Bool => {
                let value = match self.reader.read_u8()? {
                    0 => false,
                    1 => true,
                    other => {
                        return Err(CodecError::InvalidValue {
                            offset,
                            message: format!("bool byte {other:#04x} is neither 0 nor 1"),
                        })
                    }
                };
                self.read_flag()?;
                (PropertyValue::Bool(value), 0)
            }
            PropertyKind::Byte => {
                let enum_name = self.read_name()?;
                let value = self.reader.read_u16()?;
                (
                    PropertyValue::Byte {
                        enum_name: Some(enum_name),
                        value,
                    },
                    1,
                )
            }
            PropertyKind::Int32 => (PropertyValue::Int32(self.reader.read_i32()?), 4),
            PropertyKind::UInt16 => {
                self.read_flag()?;
                (PropertyValue::UInt16(self.reader.read_u16()?), 2)
            }
            PropertyKind::UInt32 => {
                self.read_flag()?;
                (PropertyValue::UInt32(self.reader.read_u32()?), 4)
            }
            PropertyKind::Float => {
                self.read_flag()?;
                (PropertyValue::Float(self.reader.read_f32()?), 4)
            }
            PropertyKind::Str => {
                self.read_flag()?;
                let start = self.reader.position();
                let value = self.reader.read_fstring()?;
                (PropertyValue::Str(value), self.reader.position() - start)
            }
            PropertyKind::Struct => {
                let fields = self.read_property_list(depth + 1)?;
                (PropertyValue::Struct(fields), self.reader.position() - offset)
            }
            PropertyKind::Array => {
                self.check_depth(depth + 1)?;
                let item = self.read_element_kind()?;
                self.read_flag()?;
                let count = self.reader.read_u32()?;
                let schema = self.reader.read_bytes(ARRAY_SCHEMA_SIZE as u64)?;
                let mut size = 4 + ARRAY_SCHEMA_SIZE as u64;
                let mut items = Vec::with_capacity(self.capacity(count, 1));
                for i in 0..count {
                    let (value, item_size) = self
                        .read_value(item, depth + 1)
                        .map_err(|e| e.within(&format!("[{i}]")))?;
                    size += item_size;
                    items.push(value);
                }
                (PropertyValue::Array { item, schema, items }, size)
            }
            PropertyKind::Map => {
                self.check_depth(depth + 1)?;
                let key = self.read_element_kind()?;
                let value = self.read_element_kind()?;
                self.read_flag()?;
                let removed_at = self.reader.position();
                let removed = self.reader.read_u32()?;
                if removed != 0 {
                    return Err(CodecError::InvalidValue {
                        offset: removed_at,
                        message: format!("map removal count {removed} is not zero"),
                    });
                }
                let count = self.reader.read_u32()?;
                let mut size = 8;
                let mut entries = Vec::with_capacity(self.capacity(count, 2));
                for i in 0..count {
                    let segment = format!("[{i}]");
                    let (k, key_size) = self.read_key(key, depth + 1).map_err(|e| e.within(&segment))?;
                    let (v, value_size) = self.read_value(value, depth + 1).map_err(|e| e.within(&segment))?;
                    size += key_size + value_size;
                    entries.push((k, v));
                }
                (PropertyValue::Map { key, value, entries }, size)
            }
        };
        Ok(read)
    }

    /// Map keys of byte kind are a single bare byte; other kinds read as values.
    fn read_key(&mut self, kind: PropertyKind, depth: usize) -> Result<(PropertyValue, u64), CodecError> {
        match kind {
            PropertyKind::Byte => {
                let value = u16::from(self.reader.read_u8()?);
                Ok((PropertyValue::Byte { enum_name: None, value }, 1))
            }
            kind => self.read_value(kind, depth),
        }
    }
}

/// Decodes a binary package with default options.
pub fn read_asset(data: &[u8]) -> Result<Asset, CodecError> {
    read_asset_with(data, &CodecOptions::default())
}

pub fn read_asset_with(data: &[u8], options: &CodecOptions) -> Result<Asset, CodecError> {
    AssetReader::new(data, options).read_asset()
}

struct AssetWriter<'n> {
    writer: ByteWriter,
    names: &'n NameTable,
}

impl<'n> AssetWriter<'n> {
    fn new(names: &'n NameTable) -> Self {
        Self {
            writer: ByteWriter::new(),
            names,
        }
    }

    fn write_name(&mut self, name: NameRef) -> Result<(), CodecError> {
        self.names.resolve(name.index)?;
        self.writer.write_u32(name.index)?;
        self.writer.write_u32(name.number)
    }

    fn keyword_name(&self, keyword: &str) -> Result<NameRef, CodecError> {
        self.names
            .lookup(keyword)
            .map(NameRef::new)
            .ok_or_else(|| CodecError::MissingName(keyword.to_string()))
    }

    fn write_kind(&mut self, kind: PropertyKind) -> Result<(), CodecError> {
        let name = self.keyword_name(kind.keyword())?;
        self.write_name(name)
    }

    fn write_asset(mut self, asset: &Asset) -> Result<Vec<u8>, CodecError> {
        let header = &asset.header;
        self.writer.write_u64(header.name)?;
        self.writer.write_u64(header.source_name)?;
        self.writer.write_u32(header.package_flags)?;
        self.writer.write_u32(header.cooked_header_size)?;
        self.writer.write_i32(header.name_map_names_offset)?;
        let names_size = self.writer.reserve_u32()?;
        let hashes_offset = self.writer.reserve_u32()?;
        let hashes_size = i32::try_from(asset.names.len() + 1)
            .ok()
            .and_then(|n| n.checked_mul(NAME_HASH_SIZE))
            .ok_or_else(|| CodecError::InvalidValue {
                offset: NAME_HASHES_SIZE_AT,
                message: format!("{} names do not fit the name hash array size", asset.names.len()),
            })?;
        self.writer.write_i32(hashes_size)?;
        let import_offset = self.writer.reserve_u32()?;
        let export_offset = self.writer.reserve_u32()?;
        let bundles_offset = self.writer.reserve_u32()?;
        let graph_offset = self.writer.reserve_u32()?;
        self.writer.write_i32(header.graph_data_size)?;
        self.writer.write_i32(header.pad)?;

        self.writer.write_u8(0)?;
        for text in asset.names.iter() {
            self.writer.write_name_entry(text)?;
        }
        self.writer.write_bytes(&asset.summary)?;

        // The graph data ends where the summary ends; any change in the name map
        // size moves every section recorded after it by the same amount.
        let summary_end = self.writer.position() as i64;
        let delta = summary_end - i64::from(header.graph_data_size) - i64::from(header.graph_data_offset);
        if delta != 0 {
            warn!(
                "name map size changed by {delta} bytes; section offsets were shifted but the name hashes were not regenerated"
            );
        }
        let shifted = [
            (names_size, header.name_map_names_size, "name map size"),
            (hashes_offset, header.name_map_hashes_offset, "name hash offset"),
            (import_offset, header.import_map_offset, "import map offset"),
            (export_offset, header.export_map_offset, "export map offset"),
            (bundles_offset, header.export_bundles_offset, "export bundles offset"),
            (graph_offset, header.graph_data_offset, "graph data offset"),
        ];
        for (slot, recorded, what) in shifted {
            self.patch_shifted(slot, recorded, delta, what)?;
        }

        self.write_property_list(&asset.properties)?;
        self.writer.write_bytes(&asset.trailer)?;
        debug!("encoded package of {} bytes", self.writer.position());
        Ok(self.writer.into_inner())
    }

    fn patch_shifted(&mut self, slot: Placeholder, recorded: i32, delta: i64, what: &str) -> Result<(), CodecError> {
        let value = i32::try_from(i64::from(recorded) + delta).map_err(|_| CodecError::InvalidValue {
            offset: slot.offset(),
            message: format!("{what} {recorded} shifted by {delta} does not fit in 32 bits"),
        })?;
        self.writer.patch_i32(slot, value)
    }

    fn write_property_list(&mut self, nodes: &[PropertyNode]) -> Result<(), CodecError> {
        for node in nodes {
            let label = self.names.display_lossy(node.name);
            self.write_node(node).map_err(|e| e.within(&label))?;
        }
        let terminator = self.keyword_name(NONE)?;
        self.write_name(terminator)
    }

    fn write_node(&mut self, node: &PropertyNode) -> Result<(), CodecError> {
        self.write_name(node.name)?;
        match &node.value {
            PropertyValue::Opaque { type_name, bytes } => {
                let declared = bytes.len().checked_sub(1).ok_or_else(|| CodecError::InvalidValue {
                    offset: self.writer.position(),
                    message: "opaque body must hold at least the flag byte".to_string(),
                })?;
                self.write_name(*type_name)?;
                self.writer.write_u32(to_u32(declared, "opaque size")?)?;
                self.writer.write_u32(node.array_index)?;
                self.writer.write_bytes(bytes)
            }
            value => {
                let kind = value.kind().ok_or_else(|| mismatch("a known property kind", value))?;
                self.write_kind(kind)?;
                let size = self.writer.reserve_u32()?;
                self.writer.write_u32(node.array_index)?;
                let declared = self.write_value(value)?;
                self.writer.patch_u32(size, to_u32(declared, "declared size")?)
            }
        }
    }

    /// Writes one value and returns its contribution to the declared size.
    fn write_value(&mut self, value: &PropertyValue) -> Result<u64, CodecError> {
        let start = self.writer.position();
        let size = match value {
            PropertyValue::Bool(v) => {
                self.writer.write_u8(u8::from(*v))?;
                self.writer.write_u8(0)?;
                0
            }
            PropertyValue::Byte {
                enum_name: Some(enum_name),
                value,
            } => {
                self.write_name(*enum_name)?;
                self.writer.write_u16(*value)?;
                1
            }
            PropertyValue::Byte { enum_name: None, .. } => {
                return Err(mismatch("a byte value with an enum name", value));
            }
            PropertyValue::Int32(v) => {
                self.writer.write_i32(*v)?;
                4
            }
            PropertyValue::UInt16(v) => {
                self.writer.write_u8(0)?;
                self.writer.write_u16(*v)?;
                2
            }
            PropertyValue::UInt32(v) => {
                self.writer.write_u8(0)?;
                self.writer.write_u32(*v)?;
                4
            }
            PropertyValue::Float(v) => {
                self.writer.write_u8(0)?;
                self.writer.write_f32(*v)?;
                4
            }
            PropertyValue::Str(s) => {
                self.writer.write_u8(0)?;
                let at = self.writer.position();
                self.writer.write_fstring(s)?;
                self.writer.position() - at
            }
            PropertyValue::Struct(fields) => {
                self.write_property_list(fields)?;
                self.writer.position() - start
            }
            PropertyValue::Array { item, schema, items } => {
                if schema.len() != ARRAY_SCHEMA_SIZE {
                    return Err(CodecError::InvalidValue {
                        offset: start,
                        message: format!("array schema is {} bytes, expected {ARRAY_SCHEMA_SIZE}", schema.len()),
                    });
                }
                self.write_kind(*item)?;
                self.writer.write_u8(0)?;
                self.writer.write_u32(to_u32(items.len(), "element count")?)?;
                self.writer.write_bytes(schema)?;
                let mut size = 4 + ARRAY_SCHEMA_SIZE as u64;
                for (i, element) in items.iter().enumerate() {
                    size += self
                        .write_element(*item, element)
                        .map_err(|e| e.within(&format!("[{i}]")))?;
                }
                size
            }
            PropertyValue::Map { key, value: value_kind, entries } => {
                self.write_kind(*key)?;
                self.write_kind(*value_kind)?;
                self.writer.write_u8(0)?;
                self.writer.write_u32(0)?;
                self.writer.write_u32(to_u32(entries.len(), "map length")?)?;
                let mut size = 8;
                for (i, (k, v)) in entries.iter().enumerate() {
                    let segment = format!("[{i}]");
                    size += self.write_key(*key, k).map_err(|e| e.within(&segment))?;
                    size += self.write_element(*value_kind, v).map_err(|e| e.within(&segment))?;
                }
                size
            }
            PropertyValue::Opaque { .. } => return Err(mismatch("a known property kind", value)),
        };
        Ok(size)
    }

    fn write_element(&mut self, kind: PropertyKind, value: &PropertyValue) -> Result<u64, CodecError> {
        if value.kind() != Some(kind) {
            return Err(mismatch(kind.keyword(), value));
        }
        self.write_value(value)
    }

    fn write_key(&mut self, kind: PropertyKind, key: &PropertyValue) -> Result<u64, CodecError> {
        match (kind, key) {
            (PropertyKind::Byte, PropertyValue::Byte { enum_name: None, value }) => {
                let byte = u8::try_from(*value).map_err(|_| CodecError::InvalidValue {
                    offset: self.writer.position(),
                    message: format!("byte map key {value} does not fit in one byte"),
                })?;
                self.writer.write_u8(byte)?;
                Ok(1)
            }
            (PropertyKind::Byte, key) => Err(mismatch("a bare byte key", key)),
            (kind, key) => self.write_element(kind, key),
        }
    }
}

fn mismatch(expected: &str, value: &PropertyValue) -> CodecError {
    CodecError::TypeMismatch {
        location: "binary encode".to_string(),
        expected: expected.to_string(),
        found: value.variant_name().to_string(),
    }
}

/// Encodes an asset. The asset, its name table included, is not modified:
/// every type keyword and the `None` terminator must already be interned.
pub fn write_asset(asset: &Asset) -> Result<Vec<u8>, CodecError> {
    AssetWriter::new(&asset.names).write_asset(asset)
}
