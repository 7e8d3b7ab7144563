use crate::error::CodecError;
use crate::model::Asset;
use crate::text::{format_f32, parse_f32, parse_hex_bytes};
use serde_json::{Map, Value};

/// Serializes the whole asset model as pretty-printed JSON.
pub fn write_json(asset: &Asset) -> Result<String, CodecError> {
    Ok(serde_json::to_string_pretty(asset)?)
}

pub fn read_json(data: &str) -> Result<Asset, CodecError> {
    Ok(serde_json::from_str(data)?)
}

/// Short overview of an asset for the `info` command.
pub fn asset_summary(asset: &Asset) -> Value {
    let header = &asset.header;
    let mut root = Map::new();
    root.insert("name".to_string(), Value::String(format!("{:#018x}", header.name)));
    root.insert("source_name".to_string(), Value::String(format!("{:#018x}", header.source_name)));
    root.insert(
        "package_flags".to_string(),
        Value::String(format!("{:#010x}", header.package_flags)),
    );
    root.insert("names".to_string(), Value::Number(asset.names.len().into()));
    root.insert("summary_bytes".to_string(), Value::Number(asset.summary.len().into()));
    root.insert("properties".to_string(), Value::Number(asset.properties.len().into()));
    root.insert("property_nodes".to_string(), Value::Number(asset.property_count().into()));
    root.insert("trailer_bytes".to_string(), Value::Number(asset.trailer.len().into()));
    Value::Object(root)
}

/// Floats travel as their exact text form so NaN payloads and `-0.0` survive.
pub mod f32_text {
    use super::{format_f32, parse_f32};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &f32, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_f32(*v))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse_f32(&text).ok_or_else(|| serde::de::Error::custom(format!("invalid f32 `{text}`")))
    }
}

/// Wide string units: a JSON string when they form valid UTF-16, the raw unit array otherwise.
pub mod utf16_units {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Units {
        Text(String),
        Raw(Vec<u16>),
    }

    #[allow(clippy::ptr_arg)]
    pub fn serialize<S: Serializer>(units: &Vec<u16>, serializer: S) -> Result<S::Ok, S::Error> {
        match String::from_utf16(units) {
            Ok(text) => serializer.serialize_str(&text),
            Err(_) => units.serialize(serializer),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u16>, D::Error> {
        Ok(match Units::deserialize(deserializer)? {
            Units::Text(text) => text.encode_utf16().collect(),
            Units::Raw(units) => units,
        })
    }
}

/// Byte blobs as `0x`-prefixed lowercase hex.
pub mod hex_bytes {
    use super::parse_hex_bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ptr_arg)]
    pub fn serialize<S: Serializer>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&crate::text::hex_bytes(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse_hex_bytes(&text).ok_or_else(|| serde::de::Error::custom(format!("invalid hex bytes `{text}`")))
    }
}
