use crate::binary::ARRAY_SCHEMA_SIZE;
use crate::error::CodecError;
use crate::model::{Asset, FString, PackageHeader, PropertyKind, PropertyNode, PropertyValue};
use crate::names::{NameRef, NameTable, NONE};
use crate::options::CodecOptions;
use log::debug;
use std::fmt::Write;

/// Renders an asset in the line-oriented text form.
pub fn write_text(asset: &Asset) -> Result<String, CodecError> {
    let mut writer = TextWriter::new(&asset.names);
    writer.write_raw("#uasset-text v1\n");
    writer.write_asset(asset)?;
    Ok(writer.buffer)
}

struct TextWriter<'n> {
    buffer: String,
    indent_level: usize,
    indent_size: usize,
    names: &'n NameTable,
}

impl<'n> TextWriter<'n> {
    fn new(names: &'n NameTable) -> Self {
        Self {
            buffer: String::new(),
            indent_level: 0,
            indent_size: 2,
            names,
        }
    }

    fn indent(&mut self) {
        self.indent_level += self.indent_size;
    }

    fn dedent(&mut self) {
        self.indent_level -= self.indent_size;
    }

    fn pad(&mut self) {
        for _ in 0..self.indent_level {
            self.buffer.push(' ');
        }
    }

    fn write_raw(&mut self, s: &str) {
        self.buffer.push_str(s);
    }

    fn line(&mut self, s: &str) {
        self.pad();
        self.write_raw(s);
        self.buffer.push('\n');
    }

    fn write_asset(&mut self, asset: &Asset) -> Result<(), CodecError> {
        let h = &asset.header;
        self.line("header:");
        self.indent();
        self.line(&format!("name = {:#018x}", h.name));
        self.line(&format!("source_name = {:#018x}", h.source_name));
        self.line(&format!("package_flags = {:#010x}", h.package_flags));
        self.line(&format!("cooked_header_size = {}", h.cooked_header_size));
        self.line(&format!("name_map_names_offset = {}", h.name_map_names_offset));
        self.line(&format!("name_map_names_size = {}", h.name_map_names_size));
        self.line(&format!("name_map_hashes_offset = {}", h.name_map_hashes_offset));
        self.line(&format!("import_map_offset = {}", h.import_map_offset));
        self.line(&format!("export_map_offset = {}", h.export_map_offset));
        self.line(&format!("export_bundles_offset = {}", h.export_bundles_offset));
        self.line(&format!("graph_data_offset = {}", h.graph_data_offset));
        self.line(&format!("graph_data_size = {}", h.graph_data_size));
        self.line(&format!("pad = {}", h.pad));
        self.dedent();

        self.line("names:");
        self.indent();
        let names = self.names;
        for text in names.iter() {
            self.line(&format!("- {}", token_text(text)));
        }
        self.dedent();

        self.line(&format!("summary = {}", hex_bytes(&asset.summary)));
        self.line("properties:");
        self.indent();
        for node in &asset.properties {
            self.write_node(node)?;
        }
        self.dedent();
        self.line(&format!("trailer = {}", hex_bytes(&asset.trailer)));
        Ok(())
    }

    fn write_node(&mut self, node: &PropertyNode) -> Result<(), CodecError> {
        let mut head = name_text(self.names, node.name)?;
        if node.array_index != 0 {
            write!(head, "[{}]", node.array_index)?;
        }
        write!(head, " : {}", type_syntax(&node.value, self.names)?)?;
        match &node.value {
            PropertyValue::Opaque { bytes, .. } => {
                write!(head, " = {}", hex_bytes(bytes))?;
                self.line(&head);
            }
            value if value.is_block() => {
                self.line(&head);
                self.nested(value)?;
            }
            value => {
                write!(head, " = {}", inline_value(value)?)?;
                self.line(&head);
            }
        }
        Ok(())
    }

    fn nested(&mut self, value: &PropertyValue) -> Result<(), CodecError> {
        self.indent();
        self.write_block(value)?;
        self.dedent();
        Ok(())
    }

    fn write_block(&mut self, value: &PropertyValue) -> Result<(), CodecError> {
        match value {
            PropertyValue::Struct(fields) => {
                for field in fields {
                    self.write_node(field)?;
                }
            }
            PropertyValue::Array { schema, items, .. } => {
                self.line(&format!("schema = {}", hex_bytes(schema)));
                for item in items {
                    self.write_element("-", item)?;
                }
            }
            PropertyValue::Map { entries, .. } => {
                for (k, v) in entries {
                    if k.is_block() {
                        let head = match k {
                            PropertyValue::Struct(_) => "?".to_string(),
                            _ => format!("? {}", type_syntax(k, self.names)?),
                        };
                        self.line(&head);
                        self.nested(k)?;
                        self.write_element("=>", v)?;
                    } else {
                        self.write_element(&format!("{} =>", key_text(k)?), v)?;
                    }
                }
            }
            other => return Err(mismatch("text encode", "a block-valued property", other)),
        }
        Ok(())
    }

    /// Writes `head` followed by an element: the bare value, the annotated type
    /// and value of a byte, or the annotated type and an indented block.
    fn write_element(&mut self, head: &str, value: &PropertyValue) -> Result<(), CodecError> {
        match value {
            PropertyValue::Struct(_) => {
                self.line(head);
                self.nested(value)
            }
            PropertyValue::Array { .. } | PropertyValue::Map { .. } => {
                self.line(&format!("{head} {}", type_syntax(value, self.names)?));
                self.nested(value)
            }
            PropertyValue::Byte { enum_name: Some(_), .. } => {
                self.line(&format!("{head} {} = {}", type_syntax(value, self.names)?, inline_value(value)?));
                Ok(())
            }
            value => {
                self.line(&format!("{head} {}", inline_value(value)?));
                Ok(())
            }
        }
    }
}

fn is_bare_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '/' | '.' | '-')
}

fn is_bare(text: &str) -> bool {
    !text.is_empty() && !text.starts_with('-') && text.chars().all(is_bare_char)
}

fn push_escaped(out: &mut String, c: char) {
    match c {
        '\\' => out.push_str("\\\\"),
        '"' => out.push_str("\\\""),
        '\n' => out.push_str("\\n"),
        '\r' => out.push_str("\\r"),
        '\t' => out.push_str("\\t"),
        '\0' => out.push_str("\\0"),
        c if c.is_control() => out.push_str(&format!("\\u{{{:x}}}", u32::from(c))),
        c => out.push(c),
    }
}

fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        push_escaped(&mut out, c);
    }
    out.push('"');
    out
}

/// Quotes UTF-16 code units, writing unpaired surrogates as `\u{d800}` escapes.
fn quote_units(units: &[u16]) -> String {
    let mut out = String::with_capacity(units.len() + 2);
    out.push('"');
    for decoded in char::decode_utf16(units.iter().copied()) {
        match decoded {
            Ok(c) => push_escaped(&mut out, c),
            Err(e) => out.push_str(&format!("\\u{{{:x}}}", e.unpaired_surrogate())),
        }
    }
    out.push('"');
    out
}

fn string_literal_text(s: &FString) -> String {
    match s {
        FString::Narrow(text) => quote(text),
        FString::Wide(units) => format!("w{}", quote_units(units)),
    }
}

fn token_text(text: &str) -> String {
    if is_bare(text) {
        text.to_string()
    } else {
        quote(text)
    }
}

/// Text form of a name reference: the string, `#number` when suffixed and
/// `@index` when the reference does not point at the first entry holding the string.
fn name_text(names: &NameTable, name: NameRef) -> Result<String, CodecError> {
    let mut token = token_text(names.resolve(name.index)?);
    if name.number != 0 {
        write!(token, "#{}", name.number)?;
    }
    if !names.is_canonical(name.index) {
        write!(token, "@{}", name.index)?;
    }
    Ok(token)
}

/// Type syntax such as `MapProperty(IntProperty, StructProperty)`.
fn type_syntax(value: &PropertyValue, names: &NameTable) -> Result<String, CodecError> {
    Ok(match value {
        PropertyValue::Byte {
            enum_name: Some(enum_name),
            ..
        } => format!("ByteProperty({})", name_text(names, *enum_name)?),
        PropertyValue::Byte { enum_name: None, .. } => {
            return Err(mismatch("text encode", "a byte value with an enum name", value))
        }
        PropertyValue::Array { item, .. } => format!("ArrayProperty({item})"),
        PropertyValue::Map { key, value, .. } => format!("MapProperty({key}, {value})"),
        PropertyValue::Opaque { type_name, .. } => format!("unknown:{}", name_text(names, *type_name)?),
        other => other.kind().map(|k| k.keyword()).unwrap_or_default().to_string(),
    })
}

fn mismatch(location: &str, expected: &str, value: &PropertyValue) -> CodecError {
    CodecError::TypeMismatch {
        location: location.to_string(),
        expected: expected.to_string(),
        found: value.variant_name().to_string(),
    }
}

fn inline_value(value: &PropertyValue) -> Result<String, CodecError> {
    Ok(match value {
        PropertyValue::Bool(v) => v.to_string(),
        PropertyValue::Byte {
            enum_name: Some(_),
            value,
        } => value.to_string(),
        PropertyValue::Int32(v) => v.to_string(),
        PropertyValue::UInt16(v) => v.to_string(),
        PropertyValue::UInt32(v) => v.to_string(),
        PropertyValue::Float(v) => format_f32(*v),
        PropertyValue::Str(s) => string_literal_text(s),
        other => return Err(mismatch("text encode", "a single-line value", other)),
    })
}

/// Map keys of byte kind are bare numbers without an enum name.
fn key_text(key: &PropertyValue) -> Result<String, CodecError> {
    match key {
        PropertyValue::Byte { enum_name: None, value } => Ok(value.to_string()),
        PropertyValue::Byte { .. } => Err(mismatch("text encode", "a bare byte key", key)),
        key => inline_value(key),
    }
}

/// Shortest decimal that parses back to the same bits, else `bits:0x...`.
///
/// ```
/// use uasset_text::text::{format_f32, parse_f32};
///
/// assert_eq!(format_f32(1.5), "1.5");
/// assert_eq!(format_f32(f32::from_bits(0x7fc0_0001)), "bits:0x7fc00001");
/// assert_eq!(parse_f32("bits:0x80000000").map(f32::to_bits), Some(0x8000_0000));
/// ```
pub fn format_f32(v: f32) -> String {
    let text = format!("{v:?}");
    match text.parse::<f32>() {
        Ok(back) if back.to_bits() == v.to_bits() => text,
        _ => format!("bits:{:#010x}", v.to_bits()),
    }
}

pub fn parse_f32(text: &str) -> Option<f32> {
    match text.strip_prefix("bits:0x") {
        Some(hex) => u32::from_str_radix(hex, 16).ok().map(f32::from_bits),
        None => text.parse().ok(),
    }
}

pub fn hex_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("0x");
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

pub fn parse_hex_bytes(text: &str) -> Option<Vec<u8>> {
    let hex = text.strip_prefix("0x")?;
    if hex.len() % 2 != 0 || !hex.is_ascii() {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}

fn parse_hex_u32(text: &str) -> Option<u32> {
    u32::from_str_radix(text.strip_prefix("0x")?, 16).ok()
}

fn parse_hex_u64(text: &str) -> Option<u64> {
    u64::from_str_radix(text.strip_prefix("0x")?, 16).ok()
}

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, take_till, take_while1},
    character::complete::{char, digit1, hex_digit1, one_of},
    combinator::{all_consuming, map, map_opt, map_res, opt, recognize, rest, value, verify},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};

type ParseResult<'a, T> = IResult<&'a str, T>;

// ============================================================================
// Token Parsers
// ============================================================================

/// Name text plus optional `#number` and `@index`
#[derive(Debug, Clone, PartialEq)]
struct NameToken {
    text: String,
    number: u32,
    index: Option<u32>,
}

/// Piece of a quoted string body
#[derive(Debug, Clone, Copy)]
enum Piece<'a> {
    Text(&'a str),
    Char(char),
    /// Unpaired UTF-16 surrogate, only meaningful in wide strings
    Surrogate(u16),
}

/// Parse a signed or unsigned decimal number
fn parse_number<T: std::str::FromStr>(input: &str) -> ParseResult<T> {
    map_res(recognize(pair(opt(char('-')), digit1)), |s: &str| s.parse::<T>())(input)
}

fn number<T: std::str::FromStr>(text: &str) -> Option<T> {
    all_consuming(parse_number::<T>)(text).ok().map(|(_, v)| v)
}

/// Parse an escape sequence after a backslash
fn escape_char(input: &str) -> ParseResult<Piece> {
    preceded(
        char('\\'),
        alt((
            map(one_of("\\\"nrt0"), |c| {
                Piece::Char(match c {
                    'n' => '\n',
                    'r' => '\r',
                    't' => '\t',
                    '0' => '\0',
                    other => other,
                })
            }),
            map_opt(delimited(tag("u{"), hex_digit1, char('}')), |hex: &str| {
                let code = u32::from_str_radix(hex, 16).ok()?;
                match char::from_u32(code) {
                    Some(c) => Some(Piece::Char(c)),
                    None => u16::try_from(code)
                        .ok()
                        .filter(|unit| (0xd800..=0xdfff).contains(unit))
                        .map(Piece::Surrogate),
                }
            }),
        )),
    )(input)
}

/// Parse the pieces of a double-quoted string
fn quoted_pieces(input: &str) -> ParseResult<Vec<Piece>> {
    delimited(
        char('"'),
        many0(alt((map(is_not("\\\""), Piece::Text), escape_char))),
        char('"'),
    )(input)
}

/// Parse a double-quoted string with escape sequences
fn quoted_string(input: &str) -> ParseResult<String> {
    map_opt(quoted_pieces, |pieces| {
        let mut out = String::new();
        for piece in pieces {
            match piece {
                Piece::Text(s) => out.push_str(s),
                Piece::Char(c) => out.push(c),
                Piece::Surrogate(_) => return None,
            }
        }
        Some(out)
    })(input)
}

/// Parse a double-quoted string as UTF-16 code units
fn quoted_units(input: &str) -> ParseResult<Vec<u16>> {
    map(quoted_pieces, |pieces| {
        let mut units = Vec::new();
        let mut buf = [0u16; 2];
        for piece in pieces {
            match piece {
                Piece::Text(s) => units.extend(s.encode_utf16()),
                Piece::Char(c) => units.extend_from_slice(c.encode_utf16(&mut buf)),
                Piece::Surrogate(unit) => units.push(unit),
            }
        }
        units
    })(input)
}

/// Parse `"..."` (narrow) or `w"..."` (wide)
fn string_literal(input: &str) -> ParseResult<FString> {
    alt((
        map(preceded(char('w'), quoted_units), |units| {
            if units.is_empty() {
                FString::default()
            } else {
                FString::Wide(units)
            }
        }),
        map(quoted_string, FString::Narrow),
    ))(input)
}

/// Parse an unquoted name
fn bare_token(input: &str) -> ParseResult<&str> {
    verify(take_while1(is_bare_char), |s: &str| !s.starts_with('-'))(input)
}

/// Parse a quoted or bare string token
fn text_token(input: &str) -> ParseResult<String> {
    alt((quoted_string, map(bare_token, str::to_string)))(input)
}

/// Parse a name reference token
fn name_token(input: &str) -> ParseResult<NameToken> {
    map(
        tuple((
            text_token,
            opt(preceded(char('#'), parse_number::<u32>)),
            opt(preceded(char('@'), parse_number::<u32>)),
        )),
        |(text, number, index)| NameToken {
            text,
            number: number.unwrap_or(0),
            index,
        },
    )(input)
}

// ============================================================================
// Line Parsers
// ============================================================================

/// Type syntax before keyword resolution; `at` is the remaining input length where it started
#[derive(Debug)]
struct RawType {
    at: usize,
    form: RawForm,
}

#[derive(Debug)]
enum RawForm {
    Unknown(NameToken),
    Node { head: NameToken, args: Vec<RawType> },
}

/// Parse `unknown:<name>` or `<keyword>(<args>)`
fn raw_type(input: &str) -> ParseResult<RawType> {
    let at = input.len();
    let (input, form) = alt((
        map(preceded(tag("unknown:"), name_token), RawForm::Unknown),
        map(
            pair(
                name_token,
                opt(delimited(char('('), separated_list1(tag(", "), raw_type), char(')'))),
            ),
            |(head, args)| RawForm::Node {
                head,
                args: args.unwrap_or_default(),
            },
        ),
    ))(input)?;
    Ok((input, RawType { at, form }))
}

/// Parse `<name>[<index>] : <type>` with an optional ` = <value>`
fn property_line(input: &str) -> ParseResult<(NameToken, Option<u32>, RawType, Option<&str>)> {
    all_consuming(tuple((
        name_token,
        opt(delimited(char('['), parse_number::<u32>, char(']'))),
        preceded(tag(" : "), raw_type),
        opt(preceded(tag(" = "), rest)),
    )))(input)
}

/// Parse `<type>` with an optional ` = <value>`, the annotated element form
fn typed_value(input: &str) -> ParseResult<(RawType, Option<&str>)> {
    all_consuming(pair(raw_type, opt(preceded(tag(" = "), rest))))(input)
}

/// Parse `<key> => <value>` or a bare `<key> =>`
fn map_entry(input: &str) -> ParseResult<(&str, Option<&str>)> {
    all_consuming(pair(
        recognize(pair(opt(string_literal), take_till(|c: char| c == ' '))),
        alt((map(preceded(tag(" => "), rest), Some), value(None, tag(" =>")))),
    ))(input)
}

/// True if `text` opens a string literal that never closes.
fn is_unterminated(text: &str) -> bool {
    let body = match text.strip_prefix("w\"").or_else(|| text.strip_prefix('"')) {
        Some(body) => body,
        None => return false,
    };
    let mut escaped = false;
    for c in body.chars() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '"' {
            return false;
        }
    }
    true
}

// ============================================================================
// Document Parser
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct Line<'t> {
    number: usize,
    /// Leading spaces
    indent: usize,
    content: &'t str,
}

impl<'t> Line<'t> {
    fn level(&self) -> usize {
        self.indent / 2
    }

    /// One-based column of `rest`, which must be a suffix of the content.
    fn column_of(&self, rest: &str) -> usize {
        self.indent + self.content.len() - rest.len() + 1
    }

    /// Column just past the end of the content.
    fn end_column(&self) -> usize {
        self.indent + self.content.len() + 1
    }

    fn syntax(&self, column: usize, message: impl Into<String>) -> CodecError {
        CodecError::Syntax {
            line: self.number,
            column,
            message: message.into(),
        }
    }

    fn location(&self, column: usize) -> String {
        format!("line {}, column {}", self.number, column)
    }

    fn nom_error(&self, err: nom::Err<nom::error::Error<&str>>, fallback: &str) -> CodecError {
        let rest = match &err {
            nom::Err::Error(e) | nom::Err::Failure(e) => e.input,
            nom::Err::Incomplete(_) => "",
        };
        let message = if is_unterminated(rest) { "unterminated string" } else { fallback };
        self.syntax(self.column_of(rest), message)
    }

    /// Text after a leading `marker`: `None` for the marker alone, the rest after one space otherwise.
    fn after_marker(&self, marker: &str) -> Result<Option<&'t str>, CodecError> {
        let content = self.content;
        match content.strip_prefix(marker) {
            Some("") => Ok(None),
            Some(rest) => rest
                .strip_prefix(' ')
                .map(Some)
                .ok_or_else(|| self.syntax(self.indent + 1, format!("expected `{marker}`"))),
            None => Err(self.syntax(self.indent + 1, format!("expected `{marker}`"))),
        }
    }
}

fn split_lines(text: &str) -> Result<Vec<Line<'_>>, CodecError> {
    let mut lines = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        let number = i + 1;
        if raw.trim().is_empty() {
            continue;
        }
        let content = raw.trim_start_matches(' ');
        let indent = raw.len() - content.len();
        if content.starts_with(char::is_whitespace) {
            return Err(CodecError::Syntax {
                line: number,
                column: indent + 1,
                message: "indentation must use spaces".to_string(),
            });
        }
        if content.starts_with('#') {
            continue;
        }
        if indent % 2 != 0 {
            return Err(CodecError::Syntax {
                line: number,
                column: indent + 1,
                message: "indentation must be a multiple of 2 spaces".to_string(),
            });
        }
        lines.push(Line {
            number,
            indent,
            content: content.trim_end(),
        });
    }
    Ok(lines)
}

/// A type annotation after keyword resolution.
#[derive(Debug, Clone, Copy)]
enum TypeSpec {
    /// A keyword without arguments; `Plain(Byte)` is a bare map key
    Plain(PropertyKind),
    Byte(NameRef),
    Array(PropertyKind),
    Map(PropertyKind, PropertyKind),
    Unknown(NameRef),
}

impl TypeSpec {
    fn kind(&self) -> Option<PropertyKind> {
        match self {
            TypeSpec::Plain(kind) => Some(*kind),
            TypeSpec::Byte(_) => Some(PropertyKind::Byte),
            TypeSpec::Array(_) => Some(PropertyKind::Array),
            TypeSpec::Map(..) => Some(PropertyKind::Map),
            TypeSpec::Unknown(_) => None,
        }
    }

    fn is_block(&self) -> bool {
        self.kind().is_some_and(|kind| kind.is_block())
    }

    fn expected(&self) -> &'static str {
        match self {
            TypeSpec::Plain(PropertyKind::Byte) => "a byte key",
            TypeSpec::Unknown(_) => "0x-prefixed bytes",
            other => other.kind().map_or("?", |kind| kind.keyword()),
        }
    }
}

struct TextParser<'t> {
    lines: Vec<Line<'t>>,
    pos: usize,
    names: NameTable,
    options: CodecOptions,
}

impl<'t> TextParser<'t> {
    fn new(text: &'t str, options: &CodecOptions) -> Result<Self, CodecError> {
        Ok(Self {
            lines: split_lines(text)?,
            pos: 0,
            names: NameTable::new(),
            options: *options,
        })
    }

    fn peek(&self) -> Option<Line<'t>> {
        self.lines.get(self.pos).copied()
    }

    /// Next line if it sits exactly at `level`.
    fn peek_at(&self, level: usize) -> Option<Line<'t>> {
        self.peek().filter(|line| line.level() == level)
    }

    fn next_at(&mut self, level: usize) -> Result<Line<'t>, CodecError> {
        let line = match self.peek() {
            Some(line) => line,
            None => {
                let end = self.lines.last().map_or(1, |l| l.number + 1);
                return Err(CodecError::Syntax {
                    line: end,
                    column: 1,
                    message: "unexpected end of input".to_string(),
                });
            }
        };
        if line.level() != level {
            return Err(unexpected_indentation(&line, level));
        }
        self.pos += 1;
        Ok(line)
    }

    /// Next line at `level` when it is nested at least that deep, `None` at the end of the block.
    fn next_in_block(&mut self, level: usize) -> Result<Option<Line<'t>>, CodecError> {
        match self.peek() {
            Some(line) if line.level() > level => Err(unexpected_indentation(&line, level)),
            Some(line) if line.level() == level => {
                self.pos += 1;
                Ok(Some(line))
            }
            _ => Ok(None),
        }
    }

    fn expect_line(&mut self, level: usize, expected: &str) -> Result<Line<'t>, CodecError> {
        let line = self.next_at(level)?;
        if line.content != expected {
            return Err(line.syntax(line.indent + 1, format!("expected `{expected}`")));
        }
        Ok(line)
    }

    fn field(&mut self, level: usize, key: &str) -> Result<(Line<'t>, &'t str), CodecError> {
        let line = self.next_at(level)?;
        let text = line
            .content
            .strip_prefix(key)
            .and_then(|r| r.strip_prefix(" = "))
            .ok_or_else(|| line.syntax(line.indent + 1, format!("expected `{key} = <value>`")))?;
        Ok((line, text))
    }

    fn field_with<T>(
        &mut self,
        level: usize,
        key: &str,
        expected: &str,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Result<T, CodecError> {
        let (line, text) = self.field(level, key)?;
        parse(text).ok_or_else(|| CodecError::TypeMismatch {
            location: line.location(line.column_of(text)),
            expected: expected.to_string(),
            found: text.to_string(),
        })
    }

    fn check_depth(&self, depth: usize, line: &Line) -> Result<(), CodecError> {
        if depth > self.options.max_depth {
            return Err(CodecError::DepthExceeded {
                limit: self.options.max_depth,
                location: format!("line {}", line.number),
            });
        }
        Ok(())
    }

    fn parse_header(&mut self) -> Result<PackageHeader, CodecError> {
        self.expect_line(0, "header:")?;
        Ok(PackageHeader {
            name: self.field_with(1, "name", "0x-prefixed u64", parse_hex_u64)?,
            source_name: self.field_with(1, "source_name", "0x-prefixed u64", parse_hex_u64)?,
            package_flags: self.field_with(1, "package_flags", "0x-prefixed u32", parse_hex_u32)?,
            cooked_header_size: self.field_with(1, "cooked_header_size", "u32", number)?,
            name_map_names_offset: self.field_with(1, "name_map_names_offset", "i32", number)?,
            name_map_names_size: self.field_with(1, "name_map_names_size", "i32", number)?,
            name_map_hashes_offset: self.field_with(1, "name_map_hashes_offset", "i32", number)?,
            import_map_offset: self.field_with(1, "import_map_offset", "i32", number)?,
            export_map_offset: self.field_with(1, "export_map_offset", "i32", number)?,
            export_bundles_offset: self.field_with(1, "export_bundles_offset", "i32", number)?,
            graph_data_offset: self.field_with(1, "graph_data_offset", "i32", number)?,
            graph_data_size: self.field_with(1, "graph_data_size", "i32", number)?,
            pad: self.field_with(1, "pad", "i32", number)?,
        })
    }

    fn parse_asset(mut self) -> Result<Asset, CodecError> {
        let header = self.parse_header()?;

        self.expect_line(0, "names:")?;
        while let Some(line) = self.peek_at(1) {
            self.pos += 1;
            let text = line
                .content
                .strip_prefix("- ")
                .ok_or_else(|| line.syntax(line.indent + 1, "expected `- <name>`"))?;
            let (_, entry) = all_consuming(text_token)(text).map_err(|e| line.nom_error(e, "malformed name entry"))?;
            self.names.push_raw(entry);
        }
        debug!("text name table holds {} entries", self.names.len());

        let summary = self.field_with(0, "summary", "0x-prefixed bytes", parse_hex_bytes)?;
        self.expect_line(0, "properties:")?;
        let properties = self.parse_property_list(1, 0)?;
        let trailer = self.field_with(0, "trailer", "0x-prefixed bytes", parse_hex_bytes)?;

        if let Some(line) = self.peek() {
            return Err(line.syntax(line.indent + 1, "unexpected line after the trailer"));
        }
        self.names.intern(NONE);

        Ok(Asset {
            header,
            names: self.names,
            summary,
            properties,
            trailer,
        })
    }

    fn parse_property_list(&mut self, level: usize, depth: usize) -> Result<Vec<PropertyNode>, CodecError> {
        let mut nodes = Vec::new();
        while let Some(line) = self.peek() {
            if line.level() < level {
                break;
            }
            if line.level() > level {
                return Err(unexpected_indentation(&line, level));
            }
            nodes.push(self.parse_property(level, depth)?);
        }
        Ok(nodes)
    }

    fn parse_property(&mut self, level: usize, depth: usize) -> Result<PropertyNode, CodecError> {
        let line = self.next_at(level)?;
        let (_, (name, array_index, raw, value_text)) =
            property_line(line.content).map_err(|e| line.nom_error(e, "expected `<name> : <type> = <value>`"))?;
        self.check_depth(depth, &line)?;
        let name = self.resolve_name(&name, &line, line.indent + 1)?;
        let ty = self.resolve_type(&raw, &line, true)?;
        let value = self.parse_value(&ty, value_text, &line, level, depth)?;
        Ok(PropertyNode {
            name,
            array_index: array_index.unwrap_or(0),
            value,
        })
    }

    fn resolve_name(&mut self, token: &NameToken, line: &Line, column: usize) -> Result<NameRef, CodecError> {
        let index = match token.index {
            Some(index) => {
                let holds = self.names.resolve(index).map(|t| t == token.text).unwrap_or(false);
                if !holds {
                    return Err(line.syntax(column, format!("name @{index} does not hold `{}`", token.text)));
                }
                index
            }
            None => self.names.intern(&token.text),
        };
        Ok(NameRef {
            index,
            number: token.number,
        })
    }

    fn raw_column(line: &Line, raw: &RawType) -> usize {
        line.indent + line.content.len() - raw.at + 1
    }

    /// Resolves a type keyword; the keyword is interned so the encoder can reference it.
    fn keyword(&mut self, head: &NameToken, line: &Line, column: usize) -> Result<PropertyKind, CodecError> {
        let kind = if head.number == 0 && head.index.is_none() {
            head.text.parse::<PropertyKind>().ok()
        } else {
            None
        };
        let kind = kind.ok_or_else(|| line.syntax(column, format!("unknown type keyword `{}`", head.text)))?;
        self.names.intern(kind.keyword());
        Ok(kind)
    }

    fn resolve_type(&mut self, raw: &RawType, line: &Line, allow_unknown: bool) -> Result<TypeSpec, CodecError> {
        let column = Self::raw_column(line, raw);
        let (head, args) = match &raw.form {
            RawForm::Unknown(token) => {
                if !allow_unknown {
                    return Err(line.syntax(column, "unknown types are only allowed on properties"));
                }
                let name = self.resolve_name(token, line, column + "unknown:".len())?;
                return Ok(TypeSpec::Unknown(name));
            }
            RawForm::Node { head, args } => (head, args),
        };

        let kind = self.keyword(head, line, column)?;
        let arity = match kind {
            PropertyKind::Byte | PropertyKind::Array => 1,
            PropertyKind::Map => 2,
            _ => 0,
        };
        if args.len() != arity {
            return Err(line.syntax(
                column,
                format!("`{kind}` takes {arity} type argument(s), found {}", args.len()),
            ));
        }

        Ok(match kind {
            PropertyKind::Byte => TypeSpec::Byte(self.type_argument_name(&args[0], line)?),
            PropertyKind::Array => TypeSpec::Array(self.element_kind(&args[0], line)?),
            PropertyKind::Map => TypeSpec::Map(self.element_kind(&args[0], line)?, self.element_kind(&args[1], line)?),
            kind => TypeSpec::Plain(kind),
        })
    }

    fn type_argument_name(&mut self, raw: &RawType, line: &Line) -> Result<NameRef, CodecError> {
        let column = Self::raw_column(line, raw);
        match &raw.form {
            RawForm::Node { head, args } if args.is_empty() => self.resolve_name(head, line, column),
            _ => Err(line.syntax(column, "expected a type name")),
        }
    }

    fn element_kind(&mut self, raw: &RawType, line: &Line) -> Result<PropertyKind, CodecError> {
        let column = Self::raw_column(line, raw);
        match &raw.form {
            RawForm::Node { head, args } if args.is_empty() => self.keyword(head, line, column),
            _ => Err(line.syntax(column, "element types are plain type keywords")),
        }
    }

    fn type_mismatch(&self, ty: &TypeSpec, text: &str, line: &Line, column: usize) -> CodecError {
        CodecError::TypeMismatch {
            location: line.location(column),
            expected: ty.expected().to_string(),
            found: text.to_string(),
        }
    }

    /// Parses the value of a line that carries `ty`: inline after ` = ` or as a block below it.
    fn parse_value(
        &mut self,
        ty: &TypeSpec,
        value_text: Option<&str>,
        line: &Line,
        level: usize,
        depth: usize,
    ) -> Result<PropertyValue, CodecError> {
        if ty.is_block() {
            if let Some(text) = value_text {
                return Err(line.syntax(
                    line.column_of(text),
                    "block-valued types take their content on the following lines",
                ));
            }
            return self.parse_block(ty, level + 1, depth);
        }
        let text = value_text.ok_or_else(|| line.syntax(line.end_column(), "expected ` = <value>`"))?;
        self.parse_inline(ty, text, line, line.column_of(text))
    }

    fn parse_inline(&mut self, ty: &TypeSpec, text: &str, line: &Line, column: usize) -> Result<PropertyValue, CodecError> {
        let parsed = match ty {
            TypeSpec::Plain(PropertyKind::Bool) => match text {
                "true" => Some(PropertyValue::Bool(true)),
                "false" => Some(PropertyValue::Bool(false)),
                _ => None,
            },
            TypeSpec::Plain(PropertyKind::Int32) => number(text).map(PropertyValue::Int32),
            TypeSpec::Plain(PropertyKind::UInt16) => number(text).map(PropertyValue::UInt16),
            TypeSpec::Plain(PropertyKind::UInt32) => number(text).map(PropertyValue::UInt32),
            TypeSpec::Plain(PropertyKind::Float) => parse_f32(text).map(PropertyValue::Float),
            TypeSpec::Plain(PropertyKind::Str) => match all_consuming(string_literal)(text) {
                Ok((_, FString::Narrow(s))) if !FString::fits_narrow(&s) => None,
                Ok((_, s)) => Some(PropertyValue::Str(s)),
                Err(_) if is_unterminated(text) => return Err(line.syntax(column, "unterminated string")),
                Err(_) => None,
            },
            TypeSpec::Plain(PropertyKind::Byte) => number::<u8>(text).map(|v| PropertyValue::Byte {
                enum_name: None,
                value: u16::from(v),
            }),
            TypeSpec::Byte(enum_name) => number(text).map(|value| PropertyValue::Byte {
                enum_name: Some(*enum_name),
                value,
            }),
            TypeSpec::Unknown(type_name) => parse_hex_bytes(text).map(|bytes| PropertyValue::Opaque {
                type_name: *type_name,
                bytes,
            }),
            TypeSpec::Plain(PropertyKind::Struct | PropertyKind::Array | PropertyKind::Map)
            | TypeSpec::Array(_)
            | TypeSpec::Map(..) => None,
        };
        parsed.ok_or_else(|| self.type_mismatch(ty, text, line, column))
    }

    fn parse_block(&mut self, ty: &TypeSpec, level: usize, depth: usize) -> Result<PropertyValue, CodecError> {
        match ty {
            TypeSpec::Plain(PropertyKind::Struct) => Ok(PropertyValue::Struct(self.parse_property_list(level, depth + 1)?)),
            TypeSpec::Array(item) => {
                let (line, text) = self.field(level, "schema")?;
                let schema = parse_hex_bytes(text)
                    .filter(|bytes| bytes.len() == ARRAY_SCHEMA_SIZE)
                    .ok_or_else(|| CodecError::TypeMismatch {
                        location: line.location(line.column_of(text)),
                        expected: format!("{ARRAY_SCHEMA_SIZE} schema bytes"),
                        found: text.to_string(),
                    })?;
                let items = self.parse_elements(*item, level, depth)?;
                Ok(PropertyValue::Array {
                    item: *item,
                    schema,
                    items,
                })
            }
            TypeSpec::Map(key, value) => Ok(PropertyValue::Map {
                key: *key,
                value: *value,
                entries: self.parse_entries(*key, *value, level, depth)?,
            }),
            other => Err(CodecError::TypeMismatch {
                location: "text decode".to_string(),
                expected: "a block-valued type".to_string(),
                found: other.expected().to_string(),
            }),
        }
    }

    /// Parses one container element of `kind` whose text follows a `-`, `?` or `=>` marker.
    fn parse_element(
        &mut self,
        kind: PropertyKind,
        text: Option<&str>,
        line: &Line,
        level: usize,
        depth: usize,
    ) -> Result<PropertyValue, CodecError> {
        match kind {
            PropertyKind::Struct => {
                if let Some(text) = text {
                    return Err(line.syntax(line.column_of(text), "struct values start on the following line"));
                }
                self.parse_block(&TypeSpec::Plain(kind), level + 1, depth)
            }
            PropertyKind::Byte | PropertyKind::Array | PropertyKind::Map => {
                let text = text.ok_or_else(|| line.syntax(line.end_column(), format!("expected a `{kind}` annotation")))?;
                let (_, (raw, value_text)) =
                    typed_value(text).map_err(|e| line.nom_error(e, "expected `<type>` or `<type> = <value>`"))?;
                let ty = self.resolve_type(&raw, line, false)?;
                if ty.kind() != Some(kind) {
                    return Err(CodecError::TypeMismatch {
                        location: line.location(line.column_of(text)),
                        expected: kind.keyword().to_string(),
                        found: text.to_string(),
                    });
                }
                self.parse_value(&ty, value_text, line, level, depth)
            }
            scalar => {
                let text = text.ok_or_else(|| line.syntax(line.end_column(), "expected a value"))?;
                self.parse_inline(&TypeSpec::Plain(scalar), text, line, line.column_of(text))
            }
        }
    }

    fn parse_elements(&mut self, item: PropertyKind, level: usize, depth: usize) -> Result<Vec<PropertyValue>, CodecError> {
        let mut items = Vec::new();
        while let Some(line) = self.next_in_block(level)? {
            self.check_depth(depth + 1, &line)?;
            let text = line.after_marker("-")?;
            items.push(self.parse_element(item, text, &line, level, depth + 1)?);
        }
        Ok(items)
    }

    fn parse_entries(
        &mut self,
        key: PropertyKind,
        value: PropertyKind,
        level: usize,
        depth: usize,
    ) -> Result<Vec<(PropertyValue, PropertyValue)>, CodecError> {
        let mut entries = Vec::new();
        while let Some(line) = self.next_in_block(level)? {
            self.check_depth(depth + 1, &line)?;

            let (k, value_line, value_text) = if line.content == "?" || line.content.starts_with("? ") {
                if !key.is_block() {
                    return Err(line.syntax(line.indent + 1, "only block-valued keys use the `?` form"));
                }
                let key_text = line.after_marker("?")?;
                let k = self.parse_element(key, key_text, &line, level, depth + 1)?;
                let arrow = self.next_at(level)?;
                let value_text = arrow.after_marker("=>")?;
                (k, arrow, value_text)
            } else {
                let (_, (key_text, value_text)) =
                    map_entry(line.content).map_err(|e| line.nom_error(e, "expected `<key> => <value>`"))?;
                if key.is_block() {
                    return Err(line.syntax(line.indent + 1, "block-valued keys use the `?` form"));
                }
                let k = self.parse_inline(&TypeSpec::Plain(key), key_text, &line, line.indent + 1)?;
                (k, line, value_text)
            };
            let v = self.parse_element(value, value_text, &value_line, level, depth + 1)?;
            entries.push((k, v));
        }
        Ok(entries)
    }
}

fn unexpected_indentation(line: &Line, level: usize) -> CodecError {
    line.syntax(
        line.indent + 1,
        format!("expected indentation of {} spaces, found {}", level * 2, line.indent),
    )
}

/// Parses the text form with default options.
pub fn read_text(text: &str) -> Result<Asset, CodecError> {
    read_text_with(text, &CodecOptions::default())
}

pub fn read_text_with(text: &str, options: &CodecOptions) -> Result<Asset, CodecError> {
    TextParser::new(text, options)?.parse_asset()
}
