//! Round-trip checks built from the two codecs.
//!
//! [`verify`] decodes a binary asset, re-encodes it directly and through the
//! text form, and demands byte-identical output plus a text form that is a
//! fixed point of decode(encode(text)).

use crate::binary::{read_asset_with, write_asset};
use crate::error::CodecError;
use crate::options::CodecOptions;
use crate::text::{read_text_with, write_text};
use log::debug;
use std::fmt;
use thiserror::Error;

/// Stage of the round trip that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    DecodeBinary,
    WriteText,
    ParseText,
    EncodeBinary,
    Compare,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::DecodeBinary => "binary decode",
            Stage::WriteText => "text write",
            Stage::ParseText => "text parse",
            Stage::EncodeBinary => "binary encode",
            Stage::Compare => "comparison",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
#[error("{stage} failed: {source}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: CodecError,
}

trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T, StageError>;
}

impl<T> AtStage<T> for Result<T, CodecError> {
    fn at(self, stage: Stage) -> Result<T, StageError> {
        self.map_err(|source| StageError { stage, source })
    }
}

/// Outcome of a successful [`verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundTripReport {
    pub binary_len: usize,
    pub text_lines: usize,
    pub names: usize,
    pub property_nodes: usize,
}

/// Binary asset to text.
pub fn decode(bytes: &[u8], options: &CodecOptions) -> Result<String, StageError> {
    let asset = read_asset_with(bytes, options).at(Stage::DecodeBinary)?;
    write_text(&asset).at(Stage::WriteText)
}

/// Text to binary asset.
pub fn encode(text: &str, options: &CodecOptions) -> Result<Vec<u8>, StageError> {
    let asset = read_text_with(text, options).at(Stage::ParseText)?;
    write_asset(&asset).at(Stage::EncodeBinary)
}

/// First differing byte, or a length difference reported at the shorter length.
pub fn first_mismatch(expected: &[u8], actual: &[u8]) -> Option<CodecError> {
    let offset = expected
        .iter()
        .zip(actual)
        .position(|(a, b)| a != b)
        .or_else(|| (expected.len() != actual.len()).then(|| expected.len().min(actual.len())))?;
    Some(CodecError::RoundTripMismatch {
        offset: offset as u64,
        expected: expected.get(offset).copied(),
        actual: actual.get(offset).copied(),
    })
}

fn first_line_mismatch(expected: &str, actual: &str) -> Option<usize> {
    let mut left = expected.lines();
    let mut right = actual.lines();
    let mut line = 1;
    loop {
        match (left.next(), right.next()) {
            (None, None) => return None,
            (a, b) if a != b => return Some(line),
            _ => line += 1,
        }
    }
}

pub fn verify(bytes: &[u8], options: &CodecOptions) -> Result<RoundTripReport, StageError> {
    let asset = read_asset_with(bytes, options).at(Stage::DecodeBinary)?;
    let direct = write_asset(&asset).at(Stage::EncodeBinary)?;
    if let Some(err) = first_mismatch(bytes, &direct) {
        return Err(err).at(Stage::Compare);
    }

    let text = write_text(&asset).at(Stage::WriteText)?;
    let parsed = read_text_with(&text, options).at(Stage::ParseText)?;
    let through_text = write_asset(&parsed).at(Stage::EncodeBinary)?;
    if let Some(err) = first_mismatch(bytes, &through_text) {
        return Err(err).at(Stage::Compare);
    }

    let again = write_text(&parsed).at(Stage::WriteText)?;
    if let Some(line) = first_line_mismatch(&text, &again) {
        return Err(CodecError::TextMismatch { line }).at(Stage::Compare);
    }

    debug!("verified {} bytes through {} text lines", bytes.len(), text.lines().count());
    Ok(RoundTripReport {
        binary_len: bytes.len(),
        text_lines: text.lines().count(),
        names: asset.names.len(),
        property_nodes: asset.property_count(),
    })
}
