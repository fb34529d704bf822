//! Field values and field tables, the heterogeneous argument type carried
//! by method arguments and message headers.
//!
//! The tag set follows the RabbitMQ field-table errata rather than the
//! original 0-9-1 document: `s` is a signed 16-bit integer and strings are
//! always long-strings.

use bytes::{BufMut, Bytes, BytesMut};
use indexmap::IndexMap;

use crate::codec::{
    read_bytes, read_long_bytes, read_u16, read_u32, read_u64, read_u8, write_long_str,
    write_short_str,
};
use crate::error::Error;

/// A fixed-point decimal: `value / 10^scale`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decimal {
    /// Number of decimal digits after the point.
    pub scale: u8,
    /// Unscaled value.
    pub value: u32,
}

/// A single tagged value in a field table or field array.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// `t`
    Bool(bool),
    /// `b`
    I8(i8),
    /// `B`
    U8(u8),
    /// `s`
    I16(i16),
    /// `u`
    U16(u16),
    /// `I`
    I32(i32),
    /// `i`
    U32(u32),
    /// `l`
    I64(i64),
    /// `f`
    F32(f32),
    /// `d`
    F64(f64),
    /// `D`
    Decimal(Decimal),
    /// `S`; also produced when decoding an `S` whose bytes are not utf-8
    LongStr(String),
    /// `x`
    ByteArray(Bytes),
    /// `T`, seconds since the unix epoch
    Timestamp(u64),
    /// `A`
    Array(Vec<FieldValue>),
    /// `F`
    Table(FieldTable),
    /// `V`
    Void,
}

impl FieldValue {
    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        match self {
            FieldValue::Bool(v) => {
                dst.put_u8(b't');
                dst.put_u8(*v as u8);
            }
            FieldValue::I8(v) => {
                dst.put_u8(b'b');
                dst.put_i8(*v);
            }
            FieldValue::U8(v) => {
                dst.put_u8(b'B');
                dst.put_u8(*v);
            }
            FieldValue::I16(v) => {
                dst.put_u8(b's');
                dst.put_i16(*v);
            }
            FieldValue::U16(v) => {
                dst.put_u8(b'u');
                dst.put_u16(*v);
            }
            FieldValue::I32(v) => {
                dst.put_u8(b'I');
                dst.put_i32(*v);
            }
            FieldValue::U32(v) => {
                dst.put_u8(b'i');
                dst.put_u32(*v);
            }
            FieldValue::I64(v) => {
                dst.put_u8(b'l');
                dst.put_i64(*v);
            }
            FieldValue::F32(v) => {
                dst.put_u8(b'f');
                dst.put_f32(*v);
            }
            FieldValue::F64(v) => {
                dst.put_u8(b'd');
                dst.put_f64(*v);
            }
            FieldValue::Decimal(v) => {
                dst.put_u8(b'D');
                dst.put_u8(v.scale);
                dst.put_u32(v.value);
            }
            FieldValue::LongStr(v) => {
                dst.put_u8(b'S');
                write_long_str(dst, v.as_bytes());
            }
            FieldValue::ByteArray(v) => {
                dst.put_u8(b'x');
                write_long_str(dst, v);
            }
            FieldValue::Timestamp(v) => {
                dst.put_u8(b'T');
                dst.put_u64(*v);
            }
            FieldValue::Array(values) => {
                dst.put_u8(b'A');
                let mut inner = BytesMut::new();
                for value in values {
                    value.encode(&mut inner)?;
                }
                dst.put_u32(inner.len() as u32);
                dst.put_slice(&inner);
            }
            FieldValue::Table(table) => {
                dst.put_u8(b'F');
                table.encode(dst)?;
            }
            FieldValue::Void => dst.put_u8(b'V'),
        }
        Ok(())
    }

    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        let value = match read_u8(src)? {
            b't' => FieldValue::Bool(read_u8(src)? != 0),
            b'b' => FieldValue::I8(read_u8(src)? as i8),
            b'B' => FieldValue::U8(read_u8(src)?),
            b's' => FieldValue::I16(read_u16(src)? as i16),
            b'u' => FieldValue::U16(read_u16(src)?),
            b'I' => FieldValue::I32(read_u32(src)? as i32),
            b'i' => FieldValue::U32(read_u32(src)?),
            b'l' => FieldValue::I64(read_u64(src)? as i64),
            b'f' => FieldValue::F32(f32::from_bits(read_u32(src)?)),
            b'd' => FieldValue::F64(f64::from_bits(read_u64(src)?)),
            b'D' => FieldValue::Decimal(Decimal {
                scale: read_u8(src)?,
                value: read_u32(src)?,
            }),
            b'S' => {
                let raw = read_long_bytes(src)?;
                match String::from_utf8(raw.to_vec()) {
                    Ok(text) => FieldValue::LongStr(text),
                    Err(err) => FieldValue::ByteArray(err.into_bytes().into()),
                }
            }
            b'x' => FieldValue::ByteArray(read_long_bytes(src)?),
            b'T' => FieldValue::Timestamp(read_u64(src)?),
            b'A' => {
                let mut inner = read_long_bytes(src)?;
                let mut values = Vec::new();
                while !inner.is_empty() {
                    values.push(FieldValue::decode(&mut inner)?);
                }
                FieldValue::Array(values)
            }
            b'F' => FieldValue::Table(FieldTable::decode(src)?),
            b'V' => FieldValue::Void,
            _ => return Err(Error::Syntax("unknown field value tag")),
        };
        Ok(value)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::LongStr(v.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::LongStr(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::I32(v)
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::U32(v)
    }
}

/// Untagged integers narrow to `I` when they fit a signed 32-bit value and
/// widen to `l` otherwise.
impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        match i32::try_from(v) {
            Ok(narrow) => FieldValue::I32(narrow),
            Err(_) => FieldValue::I64(v),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::F64(v)
    }
}

impl From<FieldTable> for FieldValue {
    fn from(v: FieldTable) -> Self {
        FieldValue::Table(v)
    }
}

/// An ordered mapping from short-string keys to tagged values. Key
/// insertion order is preserved on encode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldTable(IndexMap<String, FieldValue>);

impl FieldTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, replacing any previous value under the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Looks up a value by key.
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.get(key)
    }

    /// Whether the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }

    pub(crate) fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        let mut inner = BytesMut::new();
        for (key, value) in &self.0 {
            if key.len() > u8::MAX as usize {
                return Err(Error::TableKeyTooLong(key.len()));
            }
            write_short_str(&mut inner, key)?;
            value.encode(&mut inner)?;
        }
        dst.put_u32(inner.len() as u32);
        dst.put_slice(&inner);
        Ok(())
    }

    pub(crate) fn decode(src: &mut Bytes) -> Result<Self, Error> {
        let len = read_u32(src)? as usize;
        let mut inner = read_bytes(src, len)?;
        let mut table = IndexMap::new();
        while !inner.is_empty() {
            let key_len = read_u8(&mut inner)? as usize;
            let raw = read_bytes(&mut inner, key_len)?;
            let key = String::from_utf8(raw.to_vec())
                .map_err(|_| Error::Syntax("table key is not utf-8"))?;
            let value = FieldValue::decode(&mut inner)?;
            table.insert(key, value);
        }
        Ok(Self(table))
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for FieldTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
