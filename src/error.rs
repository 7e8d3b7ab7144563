use thiserror::Error;

/// Every failure the codec can report.
///
/// Errors raised while walking the property tree of a binary asset are wrapped in
/// [`CodecError::InProperty`] so the message names the property path; use
/// [`CodecError::root_cause`] to get at the underlying variant.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("formatting error: {0}")]
    Fmt(#[from] std::fmt::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("truncated input: {requested} bytes needed at offset {offset:#x}, only {available} available")]
    TruncatedInput {
        offset: u64,
        requested: u64,
        available: u64,
    },
    #[error("unsupported property type `{type_name}` at offset {offset:#x}")]
    UnsupportedType { type_name: String, offset: u64 },
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("type mismatch at {location}: expected {expected}, found `{found}`")]
    TypeMismatch {
        location: String,
        expected: String,
        found: String,
    },
    #[error("round trip mismatch at offset {offset:#x}: expected {}, got {}", show_byte(.expected), show_byte(.actual))]
    RoundTripMismatch {
        offset: u64,
        expected: Option<u8>,
        actual: Option<u8>,
    },
    #[error("text form is not stable under a round trip, first difference at line {line}")]
    TextMismatch { line: usize },
    #[error("nesting deeper than {limit} levels at {location}")]
    DepthExceeded { limit: usize, location: String },
    #[error("{section} recorded as {recorded:#x} but found at {actual:#x}")]
    Layout {
        section: String,
        recorded: u64,
        actual: u64,
    },
    #[error("property at offset {offset:#x} declares {declared} bytes but its value measures {actual}")]
    DeclaredSizeMismatch {
        offset: u64,
        declared: u64,
        actual: u64,
    },
    #[error("name index {index} is out of range for a table of {len} names")]
    UnknownName { index: u32, len: usize },
    #[error("name `{0}` is not present in the name table")]
    MissingName(String),
    #[error("malformed string at offset {offset:#x}: {message}")]
    MalformedString { offset: u64, message: String },
    #[error("invalid value at offset {offset:#x}: {message}")]
    InvalidValue { offset: u64, message: String },
    #[error("in `{path}`: {source}")]
    InProperty {
        path: String,
        #[source]
        source: Box<CodecError>,
    },
}

fn show_byte(byte: &Option<u8>) -> String {
    match byte {
        Some(b) => format!("{b:#04x}"),
        None => "EOF".to_string(),
    }
}

impl CodecError {
    /// Attaches one more path segment, outermost first.
    pub fn within(self, segment: &str) -> Self {
        match self {
            CodecError::InProperty { path, source } => {
                let path = if path.starts_with('[') {
                    format!("{segment}{path}")
                } else {
                    format!("{segment}.{path}")
                };
                CodecError::InProperty { path, source }
            }
            other => CodecError::InProperty {
                path: segment.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The error with any property path context stripped.
    pub fn root_cause(&self) -> &CodecError {
        match self {
            CodecError::InProperty { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// The dotted property path, if the error was raised inside the property tree.
    pub fn property_path(&self) -> Option<&str> {
        match self {
            CodecError::InProperty { path, .. } => Some(path),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_builds_outer_first_path() {
        let err = CodecError::TruncatedInput { offset: 4, requested: 2, available: 0 }
            .within("Inner")
            .within("Outer");
        assert_eq!(err.property_path(), Some("Outer.Inner"));
        assert!(matches!(err.root_cause(), CodecError::TruncatedInput { offset: 4, .. }));
        assert!(err.to_string().starts_with("in `Outer.Inner`: truncated input"));
    }

    #[test]
    fn test_within_joins_element_segments() {
        let err = CodecError::MissingName("None".to_string())
            .within("X")
            .within("[2]")
            .within("Points");
        assert_eq!(err.property_path(), Some("Points[2].X"));
    }

    #[test]
    fn test_round_trip_mismatch_reports_eof() {
        let err = CodecError::RoundTripMismatch { offset: 16, expected: Some(0xab), actual: None };
        assert_eq!(err.to_string(), "round trip mismatch at offset 0x10: expected 0xab, got EOF");
    }
}
