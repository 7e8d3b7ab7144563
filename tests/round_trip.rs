mod common;

use common::{flagged, fstring, i32_le, name_ref, node, schema, u16_le, u32_le, wide_fstring, Package, HEADER_SIZE};
use uasset_text::binary::{read_asset, read_asset_with};
use uasset_text::model::{FString, PropertyValue};
use uasset_text::options::CodecOptions;
use uasset_text::verify::{decode, encode, verify, Stage};
use uasset_text::CodecError;

fn opts() -> CodecOptions {
    CodecOptions::default()
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn count_package() -> (Package, Vec<u8>) {
    let pkg = Package::new(&["None", "IntProperty", "Count"]);
    let properties = pkg.list(&[pkg.tagged("Count", "IntProperty", 4, &i32_le(42))]);
    let bytes = pkg.build(&properties);
    (pkg, bytes)
}

fn stats_package() -> Vec<u8> {
    let pkg = Package::new(&[
        "None",
        "StructProperty",
        "BoolProperty",
        "IntProperty",
        "StrProperty",
        "Stats",
        "Alive",
        "Level",
        "Title",
    ]);
    let children = pkg.list(&[
        pkg.tagged("Alive", "BoolProperty", 0, &[1, 0]),
        pkg.tagged("Level", "IntProperty", 4, &i32_le(42)),
        pkg.tagged("Title", "StrProperty", 7, &flagged(&fstring("hi"))),
    ]);
    let properties = pkg.list(&[pkg.tagged("Stats", "StructProperty", children.len() as u32, &children)]);
    pkg.build(&properties)
}

#[test]
fn test_int_property_after_name_map() {
    let (_, bytes) = count_package();
    let text = decode(&bytes, &opts()).unwrap();
    let expected = concat!(
        "#uasset-text v1\n",
        "header:\n",
        "  name = 0x0000000000000001\n",
        "  source_name = 0x0000000000000005\n",
        "  package_flags = 0x00000000\n",
        "  cooked_header_size = 64\n",
        "  name_map_names_offset = 64\n",
        "  name_map_names_size = 26\n",
        "  name_map_hashes_offset = 91\n",
        "  import_map_offset = 123\n",
        "  export_map_offset = 139\n",
        "  export_bundles_offset = 131\n",
        "  graph_data_offset = 95\n",
        "  graph_data_size = 4\n",
        "  pad = 0\n",
        "names:\n",
        "  - None\n",
        "  - IntProperty\n",
        "  - Count\n",
        "summary = 0x5a5a5a5a5a5a5a5a\n",
        "properties:\n",
        "  Count : IntProperty = 42\n",
        "trailer = 0x00000000\n",
    );
    assert_eq!(text, expected);
    assert_eq!(encode(&text, &opts()).unwrap(), bytes);
    verify(&bytes, &opts()).unwrap();
}

#[test]
fn test_byte_after_header_must_be_zero() {
    let (_, mut bytes) = count_package();
    bytes[HEADER_SIZE] = 1;
    assert!(matches!(
        read_asset(&bytes),
        Err(CodecError::InvalidValue { offset, .. }) if offset == HEADER_SIZE as u64
    ));
}

#[test]
fn test_struct_children_decode_in_order() {
    let bytes = stats_package();
    let text = decode(&bytes, &opts()).unwrap();
    let expected = concat!(
        "  Stats : StructProperty\n",
        "    Alive : BoolProperty = true\n",
        "    Level : IntProperty = 42\n",
        "    Title : StrProperty = \"hi\"\n",
    );
    assert!(text.contains(expected), "unexpected text:\n{text}");
    assert_eq!(encode(&text, &opts()).unwrap(), bytes);
}

#[test]
fn test_map_keeps_insertion_order() {
    let pkg = Package::new(&["None", "MapProperty", "StrProperty", "IntProperty", "Scores"]);
    let body = [
        pkg.name("StrProperty"),
        pkg.name("IntProperty"),
        vec![0],
        u32_le(0),
        u32_le(2),
        flagged(&fstring("b")),
        i32_le(1),
        flagged(&fstring("a")),
        i32_le(2),
    ]
    .concat();
    let bytes = pkg.build(&pkg.list(&[pkg.tagged("Scores", "MapProperty", 28, &body)]));

    let text = decode(&bytes, &opts()).unwrap();
    let b = text.find("\"b\" => 1").unwrap();
    let a = text.find("\"a\" => 2").unwrap();
    assert!(b < a);
    assert_eq!(encode(&text, &opts()).unwrap(), bytes);
}

#[test]
fn test_truncated_input_reports_offset() {
    let (pkg, bytes) = count_package();
    let value_start = pkg.properties_start() + 24;
    let truncated = &bytes[..value_start + 2];
    let err = read_asset(truncated).unwrap_err();
    assert_eq!(err.property_path(), Some("Count"));
    match err.root_cause() {
        CodecError::TruncatedInput { offset, requested, available } => {
            assert_eq!(*offset, value_start as u64);
            assert_eq!(*requested, 4);
            assert_eq!(*available, 2);
        }
        other => panic!("expected truncated input, got {other:?}"),
    }
    assert_eq!(verify(truncated, &opts()).unwrap_err().stage, Stage::DecodeBinary);
}

#[test]
fn test_unknown_type_is_preserved() {
    let pkg = Package::new(&["None", "FancyProperty", "Blob"]);
    let bytes = pkg.build(&pkg.list(&[pkg.tagged("Blob", "FancyProperty", 5, &[0, 1, 2, 3, 4, 5])]));

    let text = decode(&bytes, &opts()).unwrap();
    assert!(text.contains("  Blob : unknown:FancyProperty = 0x000102030405\n"));
    assert_eq!(encode(&text, &opts()).unwrap(), bytes);
    verify(&bytes, &opts()).unwrap();
}

#[test]
fn test_set_property_with_duplicates_is_opaque() {
    let pkg = Package::new(&["None", "SetProperty", "IntProperty", "Ids"]);
    let body = [vec![0], pkg.name("IntProperty"), u32_le(0), u32_le(2), i32_le(5), i32_le(5)].concat();
    let bytes = pkg.build(&pkg.list(&[pkg.tagged("Ids", "SetProperty", body.len() as u32 - 1, &body)]));

    let asset = read_asset(&bytes).unwrap();
    match &asset.properties[0].value {
        PropertyValue::Opaque { type_name, bytes: raw } => {
            assert_eq!(asset.names.display(*type_name).unwrap(), "SetProperty");
            assert_eq!(raw, &body);
        }
        other => panic!("expected an opaque value, got {other:?}"),
    }
    let text = decode(&bytes, &opts()).unwrap();
    assert!(text.contains(&format!("  Ids : unknown:SetProperty = 0x{}\n", hex(&body))));
    assert_eq!(encode(&text, &opts()).unwrap(), bytes);
    verify(&bytes, &opts()).unwrap();
}

#[test]
fn test_unknown_element_type_is_fatal() {
    let pkg = Package::new(&["None", "ArrayProperty", "FancyProperty", "Items"]);
    let body = [pkg.name("FancyProperty"), vec![0], u32_le(0), schema()].concat();
    let bytes = pkg.build(&pkg.list(&[pkg.tagged("Items", "ArrayProperty", 53, &body)]));
    let err = read_asset(&bytes).unwrap_err();
    assert!(matches!(
        err.root_cause(),
        CodecError::UnsupportedType { type_name, .. } if type_name == "FancyProperty"
    ));
    assert_eq!(err.property_path(), Some("Items"));
}

#[test]
fn test_declared_size_mismatch() {
    let (pkg, _) = count_package();
    let bytes = pkg.build(&pkg.list(&[pkg.tagged("Count", "IntProperty", 8, &i32_le(42))]));
    let err = read_asset(&bytes).unwrap_err();
    match err.root_cause() {
        CodecError::DeclaredSizeMismatch { offset, declared, actual } => {
            assert_eq!(*offset, (pkg.properties_start() + 24) as u64);
            assert_eq!(*declared, 8);
            assert_eq!(*actual, 4);
        }
        other => panic!("expected a size mismatch, got {other:?}"),
    }
}

#[test]
fn test_scalar_flag_bytes() {
    let pkg = Package::new(&[
        "None",
        "UInt16Property",
        "UInt32Property",
        "FloatProperty",
        "StrProperty",
        "BoolProperty",
        "A",
        "B",
        "C",
        "D",
        "E",
    ]);
    let nodes = [
        pkg.tagged("A", "UInt16Property", 2, &flagged(&u16_le(7))),
        pkg.tagged("B", "UInt32Property", 4, &flagged(&u32_le(8))),
        pkg.tagged("C", "FloatProperty", 4, &flagged(&1.5f32.to_le_bytes())),
        pkg.tagged("D", "StrProperty", 6, &flagged(&fstring("x"))),
        pkg.tagged("E", "BoolProperty", 0, &[1, 0]),
    ];
    let mut bytes = pkg.build(&pkg.list(&nodes));

    let text = decode(&bytes, &opts()).unwrap();
    let expected = concat!(
        "  A : UInt16Property = 7\n",
        "  B : UInt32Property = 8\n",
        "  C : FloatProperty = 1.5\n",
        "  D : StrProperty = \"x\"\n",
        "  E : BoolProperty = true\n",
    );
    assert!(text.contains(expected), "unexpected text:\n{text}");
    assert_eq!(encode(&text, &opts()).unwrap(), bytes);

    let flag_at = pkg.properties_start() + 24;
    bytes[flag_at] = 1;
    let err = read_asset(&bytes).unwrap_err();
    assert_eq!(err.property_path(), Some("A"));
    assert!(matches!(
        err.root_cause(),
        CodecError::InvalidValue { offset, .. } if *offset == flag_at as u64
    ));
}

#[test]
fn test_byte_property_carries_enum_name() {
    let pkg = Package::new(&["None", "ByteProperty", "EMode", "Mode"]);
    let body = [pkg.name("EMode"), u16_le(3)].concat();
    let bytes = pkg.build(&pkg.list(&[pkg.tagged("Mode", "ByteProperty", 1, &body)]));

    let text = decode(&bytes, &opts()).unwrap();
    assert!(text.contains("  Mode : ByteProperty(EMode) = 3\n"));
    assert_eq!(encode(&text, &opts()).unwrap(), bytes);
}

#[test]
fn test_array_schema_is_kept_verbatim() {
    let pkg = Package::new(&["None", "ArrayProperty", "IntProperty", "Tags"]);
    let body = [pkg.name("IntProperty"), vec![0], u32_le(2), schema(), i32_le(7), i32_le(9)].concat();
    let bytes = pkg.build(&pkg.list(&[pkg.tagged("Tags", "ArrayProperty", 61, &body)]));

    let text = decode(&bytes, &opts()).unwrap();
    let expected = format!(
        "  Tags : ArrayProperty(IntProperty)\n    schema = 0x{}\n    - 7\n    - 9\n",
        hex(&schema())
    );
    assert!(text.contains(&expected), "unexpected text:\n{text}");
    assert_eq!(encode(&text, &opts()).unwrap(), bytes);
}

#[test]
fn test_byte_keyed_map() {
    let pkg = Package::new(&["None", "MapProperty", "ByteProperty", "BoolProperty", "Flags"]);
    let body = [
        pkg.name("ByteProperty"),
        pkg.name("BoolProperty"),
        vec![0],
        u32_le(0),
        u32_le(2),
        vec![3, 1, 0],
        vec![250, 0, 0],
    ]
    .concat();
    let bytes = pkg.build(&pkg.list(&[pkg.tagged("Flags", "MapProperty", 10, &body)]));

    let text = decode(&bytes, &opts()).unwrap();
    assert!(text.contains("  Flags : MapProperty(ByteProperty, BoolProperty)\n    3 => true\n    250 => false\n"));
    assert_eq!(encode(&text, &opts()).unwrap(), bytes);
}

#[test]
fn test_struct_keyed_map() {
    let pkg = Package::new(&["None", "MapProperty", "StructProperty", "IntProperty", "Lookup", "X"]);
    let key = pkg.list(&[pkg.tagged("X", "IntProperty", 4, &i32_le(1))]);
    let body = [
        pkg.name("StructProperty"),
        pkg.name("IntProperty"),
        vec![0],
        u32_le(0),
        u32_le(1),
        key.clone(),
        i32_le(10),
    ]
    .concat();
    let declared = 8 + key.len() as u32 + 4;
    let bytes = pkg.build(&pkg.list(&[pkg.tagged("Lookup", "MapProperty", declared, &body)]));

    let text = decode(&bytes, &opts()).unwrap();
    let expected = concat!(
        "  Lookup : MapProperty(StructProperty, IntProperty)\n",
        "    ?\n",
        "      X : IntProperty = 1\n",
        "    => 10\n",
    );
    assert!(text.contains(expected), "unexpected text:\n{text}");
    assert_eq!(encode(&text, &opts()).unwrap(), bytes);
}

#[test]
fn test_lone_surrogate_survives_text() {
    let pkg = Package::new(&["None", "StrProperty", "Label"]);
    let body = flagged(&wide_fstring(&[0xd800]));
    let bytes = pkg.build(&pkg.list(&[pkg.tagged("Label", "StrProperty", 8, &body)]));

    let asset = read_asset(&bytes).unwrap();
    assert_eq!(asset.properties[0].value, PropertyValue::Str(FString::Wide(vec![0xd800])));
    let text = decode(&bytes, &opts()).unwrap();
    assert!(text.contains("  Label : StrProperty = w\"\\u{d800}\"\n"));
    assert_eq!(encode(&text, &opts()).unwrap(), bytes);
    verify(&bytes, &opts()).unwrap();
}

#[test]
fn test_float_bit_patterns_survive() {
    let pkg = Package::new(&["None", "FloatProperty", "F"]);
    let floats: [u32; 6] = [0x0000_0000, 0x8000_0000, 0x0000_0001, 0x7f7f_ffff, 0x7fc0_0001, 0xffff_ffff];
    let nodes: Vec<Vec<u8>> = floats
        .iter()
        .map(|bits| pkg.tagged("F", "FloatProperty", 4, &flagged(&bits.to_le_bytes())))
        .collect();
    let bytes = pkg.build(&pkg.list(&nodes));

    verify(&bytes, &opts()).unwrap();
    let text = decode(&bytes, &opts()).unwrap();
    for expected in [
        "F : FloatProperty = 0.0\n",
        "F : FloatProperty = -0.0\n",
        "F : FloatProperty = 1e-45\n",
        "F : FloatProperty = 3.4028235e38\n",
        "F : FloatProperty = bits:0x7fc00001\n",
        "F : FloatProperty = bits:0xffffffff\n",
    ] {
        assert!(text.contains(expected), "missing `{expected}` in:\n{text}");
    }

    let asset = read_asset(&encode(&text, &opts()).unwrap()).unwrap();
    let bits: Vec<u32> = asset
        .properties
        .iter()
        .filter_map(|p| match p.value {
            PropertyValue::Float(v) => Some(v.to_bits()),
            _ => None,
        })
        .collect();
    assert_eq!(bits, floats);
}

#[test]
fn test_name_table_order_and_duplicates() {
    let pkg = Package::new(&["Zeta", "None", "Alpha", "Zeta", "IntProperty", "ByteProperty", "Pick"]);
    let properties = pkg.list(&[
        node(&name_ref(3, 0), &pkg.name("IntProperty"), 4, &i32_le(1)),
        node(&name_ref(2, 5), &pkg.name("IntProperty"), 4, &i32_le(2)),
        pkg.tagged("Pick", "ByteProperty", 1, &[name_ref(3, 0), u16_le(4)].concat()),
    ]);
    let bytes = pkg.build(&properties);

    let text = decode(&bytes, &opts()).unwrap();
    assert!(text.contains("names:\n  - Zeta\n  - None\n  - Alpha\n  - Zeta\n  - IntProperty\n  - ByteProperty\n  - Pick\n"));
    assert!(text.contains("  Zeta@3 : IntProperty = 1\n"));
    assert!(text.contains("  Alpha#5 : IntProperty = 2\n"));
    assert!(text.contains("  Pick : ByteProperty(Zeta@3) = 4\n"));

    let asset = read_asset(&bytes).unwrap();
    let texts: Vec<&str> = asset.names.iter().collect();
    assert_eq!(texts, ["Zeta", "None", "Alpha", "Zeta", "IntProperty", "ByteProperty", "Pick"]);
    assert_eq!(encode(&text, &opts()).unwrap(), bytes);
    verify(&bytes, &opts()).unwrap();
}

#[test]
fn test_verify_is_idempotent() {
    let bytes = stats_package();
    let first = verify(&bytes, &opts()).unwrap();
    let second = verify(&bytes, &opts()).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.property_nodes, 4);
}

#[test]
fn test_depth_limit_on_nested_structs() {
    let pkg = Package::new(&["None", "StructProperty", "IntProperty", "Inner", "Leaf"]);
    let mut nested = pkg.tagged("Leaf", "IntProperty", 4, &i32_le(1));
    for _ in 0..70 {
        let children = pkg.list(&[nested]);
        nested = pkg.tagged("Inner", "StructProperty", children.len() as u32, &children);
    }
    let bytes = pkg.build(&pkg.list(&[nested]));

    let err = read_asset(&bytes).unwrap_err();
    assert!(matches!(err.root_cause(), CodecError::DepthExceeded { limit: 64, .. }));
    assert!(read_asset_with(&bytes, &CodecOptions::with_max_depth(100)).is_ok());
}

#[test]
fn test_crlf_text_encodes_identically() {
    let bytes = stats_package();
    let text = decode(&bytes, &opts()).unwrap().replace('\n', "\r\n");
    assert_eq!(encode(&text, &opts()).unwrap(), bytes);
}

#[test]
fn test_edit_workflow_through_files() {
    let dir = tempfile::tempdir().unwrap();
    let asset_path = dir.path().join("Hero.uasset");
    let text_path = dir.path().join("Hero.uasset.txt");
    let bytes = stats_package();
    std::fs::write(&asset_path, &bytes).unwrap();

    let text = decode(&std::fs::read(&asset_path).unwrap(), &opts()).unwrap();
    let edited = text
        .replace("Level : IntProperty = 42", "Level : IntProperty = 43")
        .replace(
            "    Title : StrProperty = \"hi\"\n",
            "    Title : StrProperty = \"hi\"\n    Bonus : IntProperty = 7\n",
        );
    std::fs::write(&text_path, edited).unwrap();

    let encoded = encode(&std::fs::read_to_string(&text_path).unwrap(), &opts()).unwrap();
    std::fs::write(&asset_path, &encoded).unwrap();

    let asset = read_asset(&std::fs::read(&asset_path).unwrap()).unwrap();
    assert_eq!(asset.names.iter().last(), Some("Bonus"));
    // The name map grew by one entry, so the graph data moved with it
    let original = read_asset(&bytes).unwrap();
    assert_eq!(asset.header.graph_data_offset, original.header.graph_data_offset + 7);
    match &asset.properties[0].value {
        PropertyValue::Struct(fields) => {
            assert_eq!(fields.len(), 4);
            assert_eq!(fields[1].value, PropertyValue::Int32(43));
            assert_eq!(fields[3].value, PropertyValue::Int32(7));
        }
        other => panic!("expected a struct, got {other:?}"),
    }
    verify(&encoded, &opts()).unwrap();
}
