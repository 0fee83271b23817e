//! Declarative fixed-layout binary decoding.
//!
//! Each event or account declares its wire layout as an ordered
//! `(name, FieldSpec)` table; one generic cursor interprets the table over
//! the raw bytes. Layouts stay data, so every layout is independently
//! testable and adding an event never means writing new offset arithmetic.

use std::collections::HashMap;

use crate::error::DecodeError;
use crate::events::PrizeTier;

/// The wire type of a single field. All integers are little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSpec {
    U8,
    U16,
    U32,
    U64,
    /// Signed 64-bit (Unix timestamps).
    I64,
    /// One byte, nonzero = true.
    Bool,
    /// 32 raw bytes, rendered base58.
    Pubkey,
    /// 32 raw bytes, rendered hex (random values, seeds).
    Bytes32,
    /// One byte mapped through the prize tier table (0..=3).
    Tier,
    /// u32 length prefix followed by UTF-8 bytes.
    Str,
    /// Fixed-length vector of u16 (account probability tables).
    U16Vec(usize),
    /// 1-byte tag (0 = absent, 1 = present) followed by the inner field.
    Option(&'static FieldSpec),
}

/// A decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I64(i64),
    Bool(bool),
    Pubkey(String),
    Bytes32(String),
    Tier(PrizeTier),
    Str(String),
    U16Vec(Vec<u16>),
    /// An absent `Option` field.
    None,
}

/// An ordered field table: the declarative description of one layout.
pub type Layout = &'static [(&'static str, FieldSpec)];

/// Byte cursor over a payload. Reads advance; short reads error.
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::Truncated {
                need: n,
                have: self.remaining(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn read(&mut self, spec: &FieldSpec) -> Result<FieldValue, DecodeError> {
        Ok(match spec {
            FieldSpec::U8 => FieldValue::U8(self.take(1)?[0]),
            FieldSpec::U16 => {
                FieldValue::U16(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
            }
            FieldSpec::U32 => {
                FieldValue::U32(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
            }
            FieldSpec::U64 => {
                FieldValue::U64(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
            }
            FieldSpec::I64 => {
                FieldValue::I64(i64::from_le_bytes(self.take(8)?.try_into().unwrap()))
            }
            FieldSpec::Bool => FieldValue::Bool(self.take(1)?[0] != 0),
            FieldSpec::Pubkey => {
                FieldValue::Pubkey(bs58::encode(self.take(32)?).into_string())
            }
            FieldSpec::Bytes32 => FieldValue::Bytes32(hex::encode(self.take(32)?)),
            FieldSpec::Tier => {
                let byte = self.take(1)?[0];
                FieldValue::Tier(PrizeTier::from_byte(byte).ok_or(DecodeError::InvalidTier(byte))?)
            }
            FieldSpec::Str => {
                let len = u32::from_le_bytes(self.take(4)?.try_into().unwrap()) as usize;
                let bytes = self.take(len)?;
                FieldValue::Str(
                    String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8)?,
                )
            }
            FieldSpec::U16Vec(count) => {
                let bytes = self.take(count * 2)?;
                FieldValue::U16Vec(
                    bytes
                        .chunks_exact(2)
                        .map(|c| u16::from_le_bytes(c.try_into().unwrap()))
                        .collect(),
                )
            }
            FieldSpec::Option(inner) => match self.take(1)?[0] {
                0 => FieldValue::None,
                1 => self.read(inner)?,
                tag => return Err(DecodeError::InvalidOptionTag(tag)),
            },
        })
    }
}

/// Decoded fields keyed by layout name, with typed accessors.
///
/// Trailing bytes after the last field are tolerated; account structs
/// carry rent padding.
#[derive(Debug)]
pub struct DecodedFields {
    fields: HashMap<&'static str, FieldValue>,
}

/// Walk `layout` over `bytes`.
pub fn decode_layout(layout: Layout, bytes: &[u8]) -> Result<DecodedFields, DecodeError> {
    let mut cursor = Cursor::new(bytes);
    let mut fields = HashMap::with_capacity(layout.len());
    for (name, spec) in layout {
        fields.insert(*name, cursor.read(spec)?);
    }
    Ok(DecodedFields { fields })
}

macro_rules! accessor {
    ($fn_name:ident, $variant:ident, $ty:ty, $expected:literal) => {
        pub fn $fn_name(&self, field: &str) -> Result<$ty, DecodeError> {
            match self.get(field)? {
                FieldValue::$variant(v) => Ok(v.clone()),
                _ => Err(DecodeError::TypeMismatch {
                    field: field.into(),
                    expected: $expected,
                }),
            }
        }
    };
}

impl DecodedFields {
    fn get(&self, field: &str) -> Result<&FieldValue, DecodeError> {
        self.fields.get(field).ok_or_else(|| DecodeError::MissingField {
            field: field.into(),
        })
    }

    accessor!(u8, U8, u8, "u8");
    accessor!(u16, U16, u16, "u16");
    accessor!(u32, U32, u32, "u32");
    accessor!(u64, U64, u64, "u64");
    accessor!(i64, I64, i64, "i64");
    accessor!(boolean, Bool, bool, "bool");
    accessor!(pubkey, Pubkey, String, "pubkey");
    accessor!(bytes32, Bytes32, String, "bytes32");
    accessor!(tier, Tier, PrizeTier, "tier");
    accessor!(string, Str, String, "string");
    accessor!(u16_vec, U16Vec, Vec<u16>, "u16 vec");

    /// Optional-field accessors: `FieldValue::None` maps to `Ok(None)`.
    pub fn opt_u64(&self, field: &str) -> Result<Option<u64>, DecodeError> {
        match self.get(field)? {
            FieldValue::None => Ok(None),
            FieldValue::U64(v) => Ok(Some(*v)),
            _ => Err(DecodeError::TypeMismatch {
                field: field.into(),
                expected: "option<u64>",
            }),
        }
    }

    pub fn opt_u8(&self, field: &str) -> Result<Option<u8>, DecodeError> {
        match self.get(field)? {
            FieldValue::None => Ok(None),
            FieldValue::U8(v) => Ok(Some(*v)),
            _ => Err(DecodeError::TypeMismatch {
                field: field.into(),
                expected: "option<u8>",
            }),
        }
    }

    pub fn opt_tier(&self, field: &str) -> Result<Option<PrizeTier>, DecodeError> {
        match self.get(field)? {
            FieldValue::None => Ok(None),
            FieldValue::Tier(v) => Ok(Some(*v)),
            _ => Err(DecodeError::TypeMismatch {
                field: field.into(),
                expected: "option<tier>",
            }),
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
