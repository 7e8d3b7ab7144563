//! # uasset_text
//!
//! Lossless conversion between binary engine asset containers (`.uasset`) and an
//! editable, indentation-based text form.
//!
//! - **Binary format**: a fixed package header, the name map, the unparsed summary
//!   bytes and one tagged property list
//! - **Text format**: one line per scalar property, indented blocks for structs,
//!   arrays and maps
//! - **JSON format**: serde rendering of the same model
//!
//! Encoding the decoded form reproduces the original file byte for byte.
//!
//! ## Quick Start
//!
//! ```no_run
//! use uasset_text::{binary, text};
//! use std::fs;
//!
//! let data = fs::read("Hero.uasset")?;
//! let asset = binary::read_asset(&data)?;
//!
//! let text = text::write_text(&asset)?;
//! fs::write("Hero.uasset.txt", &text)?;
//!
//! let edited = text::read_text(&fs::read_to_string("Hero.uasset.txt")?)?;
//! fs::write("Hero.uasset", binary::write_asset(&edited)?)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Round Trip Check
//!
//! ```no_run
//! use uasset_text::options::CodecOptions;
//! use uasset_text::verify::verify;
//!
//! let data = std::fs::read("Hero.uasset")?;
//! let report = verify(&data, &CodecOptions::default())?;
//! println!("{} property nodes survived", report.property_nodes);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod binary;
pub mod cursor;
pub mod error;
pub mod json;
pub mod model;
pub mod names;
pub mod options;
pub mod text;
pub mod verify;

pub use error::CodecError;
pub use model::Asset;
