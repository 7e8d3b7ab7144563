use crate::error::CodecError;
use crate::model::FString;
use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};

/// Sequential little-endian reader over a borrowed buffer.
///
/// Every read checks the remaining length first, so running off the end reports the
/// exact offset and the number of bytes the field needed.
pub struct ByteReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
        }
    }

    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    pub fn len(&self) -> u64 {
        self.cursor.get_ref().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.cursor.get_ref().is_empty()
    }

    pub fn remaining(&self) -> u64 {
        self.len().saturating_sub(self.position())
    }

    fn ensure(&self, requested: u64) -> Result<(), CodecError> {
        let available = self.remaining();
        if requested > available {
            return Err(CodecError::TruncatedInput {
                offset: self.position(),
                requested,
                available,
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        self.ensure(1)?;
        Ok(self.cursor.read_u8()?)
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        self.ensure(2)?;
        Ok(self.cursor.read_u16::<LE>()?)
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        self.ensure(4)?;
        Ok(self.cursor.read_u32::<LE>()?)
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        self.ensure(8)?;
        Ok(self.cursor.read_u64::<LE>()?)
    }

    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        self.ensure(4)?;
        Ok(self.cursor.read_i32::<LE>()?)
    }

    /// Reads the raw bit pattern, NaN payloads included.
    pub fn read_f32(&mut self) -> Result<f32, CodecError> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_bytes(&mut self, n: u64) -> Result<Vec<u8>, CodecError> {
        self.ensure(n)?;
        let mut buf = vec![0u8; n as usize];
        self.cursor.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads an `i32` length-prefixed string, narrow for positive lengths and UTF-16 for negative ones.
    ///
    /// Wide strings keep their code units as stored, so unpaired surrogates survive.
    pub fn read_fstring(&mut self) -> Result<FString, CodecError> {
        let offset = self.position();
        let len = self.read_i32()?;
        let malformed = |message: &str| CodecError::MalformedString {
            offset,
            message: message.to_string(),
        };

        if len == 0 {
            return Ok(FString::default());
        }
        if len == 1 || len == -1 {
            return Err(malformed("terminator-only string"));
        }

        if len > 0 {
            let bytes = self.read_bytes(len as u64)?;
            let (body, nul) = bytes.split_at(bytes.len() - 1);
            if nul != [0] {
                return Err(malformed("missing NUL terminator"));
            }
            // Latin-1 maps each byte to the code point of the same value
            return Ok(FString::Narrow(body.iter().map(|&b| char::from(b)).collect()));
        }

        let count = u64::from(len.unsigned_abs());
        self.ensure(count * 2)?;
        let mut units = Vec::with_capacity(count as usize);
        for _ in 0..count {
            units.push(self.read_u16()?);
        }
        if units.pop() != Some(0) {
            return Err(malformed("missing NUL terminator"));
        }
        Ok(FString::Wide(units))
    }

    /// Reads a name map entry: a `u8` length, that many UTF-8 bytes, then a zero byte.
    pub fn read_name_entry(&mut self) -> Result<String, CodecError> {
        let offset = self.position();
        let len = self.read_u8()?;
        let bytes = self.read_bytes(u64::from(len))?;
        if self.read_u8()? != 0 {
            return Err(CodecError::MalformedString {
                offset,
                message: "missing NUL terminator".to_string(),
            });
        }
        String::from_utf8(bytes).map_err(|e| CodecError::MalformedString {
            offset,
            message: e.to_string(),
        })
    }
}

/// Offset of a 32-bit slot written ahead of the value it will hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placeholder(u64);

impl Placeholder {
    pub fn offset(&self) -> u64 {
        self.0
    }
}

/// Growable little-endian writer with placeholder back-patching.
pub struct ByteWriter {
    cursor: Cursor<Vec<u8>>,
}

impl Default for ByteWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteWriter {
    pub fn new() -> Self {
        Self {
            cursor: Cursor::new(Vec::new()),
        }
    }

    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.cursor.into_inner()
    }

    pub fn write_u8(&mut self, v: u8) -> Result<(), CodecError> {
        self.cursor.write_u8(v)?;
        Ok(())
    }

    pub fn write_u16(&mut self, v: u16) -> Result<(), CodecError> {
        self.cursor.write_u16::<LE>(v)?;
        Ok(())
    }

    pub fn write_u32(&mut self, v: u32) -> Result<(), CodecError> {
        self.cursor.write_u32::<LE>(v)?;
        Ok(())
    }

    pub fn write_u64(&mut self, v: u64) -> Result<(), CodecError> {
        self.cursor.write_u64::<LE>(v)?;
        Ok(())
    }

    pub fn write_i32(&mut self, v: i32) -> Result<(), CodecError> {
        self.cursor.write_i32::<LE>(v)?;
        Ok(())
    }

    pub fn write_f32(&mut self, v: f32) -> Result<(), CodecError> {
        self.write_u32(v.to_bits())
    }

    pub fn write_bytes(&mut self, v: &[u8]) -> Result<(), CodecError> {
        self.cursor.write_all(v)?;
        Ok(())
    }

    pub fn write_fstring(&mut self, s: &FString) -> Result<(), CodecError> {
        if s.is_empty() {
            return self.write_i32(0);
        }
        let offset = self.position();
        match s {
            FString::Narrow(text) => {
                let mut bytes = Vec::with_capacity(text.len() + 1);
                for c in text.chars() {
                    let b = u8::try_from(u32::from(c)).map_err(|_| CodecError::MalformedString {
                        offset,
                        message: format!("character {c:?} does not fit a narrow string"),
                    })?;
                    bytes.push(b);
                }
                bytes.push(0);
                self.write_i32(len_i32(bytes.len(), offset)?)?;
                self.write_bytes(&bytes)
            }
            FString::Wide(units) => {
                self.write_i32(-len_i32(units.len() + 1, offset)?)?;
                for &unit in units {
                    self.write_u16(unit)?;
                }
                self.write_u16(0)
            }
        }
    }

    /// Writes a name map entry, the inverse of [`ByteReader::read_name_entry`].
    pub fn write_name_entry(&mut self, text: &str) -> Result<(), CodecError> {
        let len = u8::try_from(text.len()).map_err(|_| CodecError::MalformedString {
            offset: self.position(),
            message: format!("name of {} bytes exceeds the 255 byte limit", text.len()),
        })?;
        self.write_u8(len)?;
        self.write_bytes(text.as_bytes())?;
        self.write_u8(0)
    }

    /// Writes a zero `u32` to be filled in later with [`ByteWriter::patch_u32`].
    pub fn reserve_u32(&mut self) -> Result<Placeholder, CodecError> {
        let slot = Placeholder(self.position());
        self.write_u32(0)?;
        Ok(slot)
    }

    pub fn patch_u32(&mut self, slot: Placeholder, v: u32) -> Result<(), CodecError> {
        let current = self.position();
        self.cursor.seek(SeekFrom::Start(slot.0))?;
        self.write_u32(v)?;
        self.cursor.seek(SeekFrom::Start(current))?;
        Ok(())
    }

    pub fn patch_i32(&mut self, slot: Placeholder, v: i32) -> Result<(), CodecError> {
        self.patch_u32(slot, u32::from_le_bytes(v.to_le_bytes()))
    }
}

fn len_i32(len: usize, offset: u64) -> Result<i32, CodecError> {
    i32::try_from(len).map_err(|_| CodecError::MalformedString {
        offset,
        message: format!("{len} characters exceed the length prefix"),
    })
}

/// Converts a length, count or size to the `u32` the format stores.
pub fn to_u32(value: impl TryInto<u32> + Copy + std::fmt::Display, what: &str) -> Result<u32, CodecError> {
    value.try_into().map_err(|_| CodecError::InvalidValue {
        offset: 0,
        message: format!("{what} {value} does not fit in 32 bits"),
    })
}
