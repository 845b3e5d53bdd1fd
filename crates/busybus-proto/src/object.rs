//! Marshalled object codec.
//!
//! An `Object` is a self-describing, length-determined byte stream built
//! against a description string over the alphabet `i u b s A ( )`.
//! It is an append-only buffer for insertion and a
//! cursor-based reader for extraction, mirroring the C source's
//! `bbus_obj_ins*`/`bbus_obj_extr*` pairs one-for-one.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{ProtocolError, Result};

/// A marshalled object: raw bytes plus an extraction cursor.
///
/// Construction accumulates bytes (`insert_*`); reading walks a cursor over
/// those bytes (`extract_*`). [`Object::rewind`] resets the cursor without
/// discarding the buffer, matching `bbus_obj_rewind`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Object {
    buf: BytesMut,
    cursor: usize,
}

impl Object {
    /// Build an empty object.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap raw bytes as an object with no validation against a description.
    ///
    /// Matches `bbus_obj_frombuf`: the object's raw size is exactly the
    /// length of `bytes`.
    #[must_use]
    pub fn from_buffer(bytes: impl Into<BytesMut>) -> Self {
        Self { buf: bytes.into(), cursor: 0 }
    }

    /// The object's raw byte length.
    #[must_use]
    pub fn raw_size(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the object's raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Reset the extraction cursor to the start of the buffer.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    fn remaining(&self) -> &[u8] {
        &self.buf[self.cursor..]
    }

    /// Append a 32-bit signed integer (network byte order).
    pub fn insert_int(&mut self, val: i32) {
        self.buf.put_i32(val);
    }

    /// Read a 32-bit signed integer, advancing the cursor.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::ObjInvFmt`] if fewer than 4 bytes remain.
    pub fn extract_int(&mut self) -> Result<i32> {
        if self.remaining().len() < 4 {
            return Err(ProtocolError::ObjInvFmt);
        }
        let val = (&self.buf[self.cursor..]).get_i32();
        self.cursor += 4;
        Ok(val)
    }

    /// Append a 32-bit unsigned integer (network byte order).
    pub fn insert_uint(&mut self, val: u32) {
        self.buf.put_u32(val);
    }

    /// Read a 32-bit unsigned integer, advancing the cursor.
    pub fn extract_uint(&mut self) -> Result<u32> {
        if self.remaining().len() < 4 {
            return Err(ProtocolError::ObjInvFmt);
        }
        let val = (&self.buf[self.cursor..]).get_u32();
        self.cursor += 4;
        Ok(val)
    }

    /// Append a single byte.
    pub fn insert_byte(&mut self, val: u8) {
        self.buf.put_u8(val);
    }

    /// Read a single byte, advancing the cursor.
    pub fn extract_byte(&mut self) -> Result<u8> {
        if self.remaining().is_empty() {
            return Err(ProtocolError::ObjInvFmt);
        }
        let val = self.buf[self.cursor];
        self.cursor += 1;
        Ok(val)
    }

    /// Append a raw byte array (no length prefix, no terminator).
    pub fn insert_bytes(&mut self, data: &[u8]) {
        self.buf.put_slice(data);
    }

    /// Read `size` raw bytes, advancing the cursor.
    pub fn extract_bytes(&mut self, size: usize) -> Result<Vec<u8>> {
        if self.remaining().len() < size {
            return Err(ProtocolError::ObjInvFmt);
        }
        let data = self.buf[self.cursor..self.cursor + size].to_vec();
        self.cursor += size;
        Ok(data)
    }

    /// Append a NUL-terminated string.
    ///
    /// An empty string is encoded as a single NUL byte.
    pub fn insert_string(&mut self, val: &str) {
        self.buf.put_slice(val.as_bytes());
        self.buf.put_u8(0);
    }

    /// Read a NUL-terminated string, advancing the cursor past the
    /// terminator.
    pub fn extract_string(&mut self) -> Result<String> {
        let rest = self.remaining();
        let nul = rest.iter().position(|&b| b == 0).ok_or(ProtocolError::ObjInvFmt)?;
        let s = std::str::from_utf8(&rest[..nul]).map_err(|_| ProtocolError::ObjInvFmt)?.to_owned();
        self.cursor += nul + 1;
        Ok(s)
    }

    /// Append a 32-bit array element count.
    pub fn insert_array_header(&mut self, count: u32) {
        self.buf.put_u32(count);
    }

    /// Read a 32-bit array element count, advancing the cursor.
    pub fn extract_array_header(&mut self) -> Result<u32> {
        self.extract_uint()
    }
}

/// A single element of a parsed object description string.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Descr {
    Int,
    Uint,
    Byte,
    Str,
    Array(Box<Descr>),
    Struct(Vec<Descr>),
}

/// Parse and validate a description string.
///
/// A description is valid iff every `(` has a matching `)` and every `A` is
/// followed by exactly one element descriptor, which may itself be a group.
fn parse_descr(s: &str) -> Result<Vec<Descr>> {
    let chars: Vec<char> = s.chars().collect();
    let mut pos = 0;
    let items = parse_descr_seq(&chars, &mut pos, false)?;
    if pos != chars.len() {
        return Err(ProtocolError::ObjInvFmt);
    }
    Ok(items)
}

fn parse_descr_seq(chars: &[char], pos: &mut usize, in_group: bool) -> Result<Vec<Descr>> {
    let mut items = Vec::new();
    while *pos < chars.len() {
        match chars[*pos] {
            ')' if in_group => return Ok(items),
            ')' => return Err(ProtocolError::ObjInvFmt),
            '(' => {
                *pos += 1;
                let inner = parse_descr_seq(chars, pos, true)?;
                if *pos >= chars.len() || chars[*pos] != ')' {
                    return Err(ProtocolError::ObjInvFmt);
                }
                *pos += 1;
                items.push(Descr::Struct(inner));
            },
            'A' => {
                *pos += 1;
                let elem = parse_one(chars, pos)?;
                items.push(Descr::Array(Box::new(elem)));
            },
            'i' => {
                *pos += 1;
                items.push(Descr::Int);
            },
            'u' => {
                *pos += 1;
                items.push(Descr::Uint);
            },
            'b' => {
                *pos += 1;
                items.push(Descr::Byte);
            },
            's' => {
                *pos += 1;
                items.push(Descr::Str);
            },
            _ => return Err(ProtocolError::ObjInvFmt),
        }
    }
    if in_group {
        // Ran out of input without a closing ')'.
        return Err(ProtocolError::ObjInvFmt);
    }
    Ok(items)
}

/// Parse a single descriptor element (used after `A`).
fn parse_one(chars: &[char], pos: &mut usize) -> Result<Descr> {
    if *pos >= chars.len() {
        return Err(ProtocolError::ObjInvFmt);
    }
    match chars[*pos] {
        '(' => {
            *pos += 1;
            let inner = parse_descr_seq(chars, pos, true)?;
            if *pos >= chars.len() || chars[*pos] != ')' {
                return Err(ProtocolError::ObjInvFmt);
            }
            *pos += 1;
            Ok(Descr::Struct(inner))
        },
        'A' => {
            *pos += 1;
            let elem = parse_one(chars, pos)?;
            Ok(Descr::Array(Box::new(elem)))
        },
        'i' => {
            *pos += 1;
            Ok(Descr::Int)
        },
        'u' => {
            *pos += 1;
            Ok(Descr::Uint)
        },
        'b' => {
            *pos += 1;
            Ok(Descr::Byte)
        },
        's' => {
            *pos += 1;
            Ok(Descr::Str)
        },
        _ => Err(ProtocolError::ObjInvFmt),
    }
}

/// A single marshalled value, matching one description character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// `i` — 32-bit signed integer.
    Int(i32),
    /// `u` — 32-bit unsigned integer.
    Uint(u32),
    /// `b` — single byte.
    Byte(u8),
    /// `s` — string.
    Str(String),
    /// `A...` — array of values sharing one element descriptor.
    Array(Vec<Value>),
    /// `(...)` — struct grouping of values.
    Struct(Vec<Value>),
}

/// Validate a description string without building or parsing anything.
///
/// # Errors
///
/// [`ProtocolError::ObjInvFmt`] if the description is malformed.
pub fn descr_valid(descr: &str) -> Result<()> {
    parse_descr(descr).map(|_| ())
}

/// Build an object from a description string and matching values.
///
/// # Errors
///
/// [`ProtocolError::ObjInvFmt`] if `descr` is malformed or doesn't match the
/// shape of `values`.
pub fn build(descr: &str, values: &[Value]) -> Result<Object> {
    let items = parse_descr(descr)?;
    if items.len() != values.len() {
        return Err(ProtocolError::ObjInvFmt);
    }
    let mut obj = Object::new();
    for (item, value) in items.iter().zip(values) {
        insert_value(&mut obj, item, value)?;
    }
    Ok(obj)
}

fn insert_value(obj: &mut Object, descr: &Descr, value: &Value) -> Result<()> {
    match (descr, value) {
        (Descr::Int, Value::Int(v)) => obj.insert_int(*v),
        (Descr::Uint, Value::Uint(v)) => obj.insert_uint(*v),
        (Descr::Byte, Value::Byte(v)) => obj.insert_byte(*v),
        (Descr::Str, Value::Str(v)) => obj.insert_string(v),
        (Descr::Array(elem), Value::Array(items)) => {
            obj.insert_array_header(u32::try_from(items.len()).map_err(|_| ProtocolError::ObjInvFmt)?);
            for item in items {
                insert_value(obj, elem, item)?;
            }
        },
        (Descr::Struct(fields), Value::Struct(items)) if fields.len() == items.len() => {
            for (f, v) in fields.iter().zip(items) {
                insert_value(obj, f, v)?;
            }
        },
        _ => return Err(ProtocolError::ObjInvFmt),
    }
    Ok(())
}

/// Parse an object's buffer against a description string.
///
/// On failure the object's cursor is restored to where it was before the
/// call.
///
/// # Errors
///
/// [`ProtocolError::ObjInvFmt`] if `descr` is malformed or the buffer
/// doesn't match its shape.
pub fn parse(obj: &mut Object, descr: &str) -> Result<Vec<Value>> {
    let items = parse_descr(descr)?;
    let start_cursor = obj.cursor;
    let mut values = Vec::with_capacity(items.len());
    for item in &items {
        match extract_value(obj, item) {
            Ok(v) => values.push(v),
            Err(e) => {
                obj.cursor = start_cursor;
                return Err(e);
            },
        }
    }
    Ok(values)
}

fn extract_value(obj: &mut Object, descr: &Descr) -> Result<Value> {
    Ok(match descr {
        Descr::Int => Value::Int(obj.extract_int()?),
        Descr::Uint => Value::Uint(obj.extract_uint()?),
        Descr::Byte => Value::Byte(obj.extract_byte()?),
        Descr::Str => Value::Str(obj.extract_string()?),
        Descr::Array(elem) => {
            let count = obj.extract_array_header()?;
            let mut items = Vec::with_capacity(count as usize);
            for _ in 0..count {
                items.push(extract_value(obj, elem)?);
            }
            Value::Array(items)
        },
        Descr::Struct(fields) => {
            let mut items = Vec::with_capacity(fields.len());
            for f in fields {
                items.push(extract_value(obj, f)?);
            }
            Value::Struct(items)
        },
    })
}

/// Produce a best-effort human-readable dump of an object against a
/// description string.
///
/// Never panics on malformed data: unreadable regions are rendered as
/// `<truncated>` or `<invalid-descr>` placeholders.
#[must_use]
pub fn repr(obj: &Object, descr: &str) -> String {
    let items = match parse_descr(descr) {
        Ok(items) => items,
        Err(_) => return "<invalid-descr>".to_string(),
    };
    let mut scratch = obj.clone();
    scratch.rewind();
    let mut out = String::new();
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        repr_value(&mut scratch, item, &mut out);
    }
    out
}

fn repr_value(obj: &mut Object, descr: &Descr, out: &mut String) {
    match descr {
        Descr::Int => match obj.extract_int() {
            Ok(v) => out.push_str(&v.to_string()),
            Err(_) => out.push_str("<truncated>"),
        },
        Descr::Uint => match obj.extract_uint() {
            Ok(v) => out.push_str(&v.to_string()),
            Err(_) => out.push_str("<truncated>"),
        },
        Descr::Byte => match obj.extract_byte() {
            Ok(v) => out.push_str(&format!("{v:#04x}")),
            Err(_) => out.push_str("<truncated>"),
        },
        Descr::Str => match obj.extract_string() {
            Ok(v) => out.push_str(&format!("{v:?}")),
            Err(_) => out.push_str("<truncated>"),
        },
        Descr::Array(elem) => {
            let count = match obj.extract_array_header() {
                Ok(c) => c,
                Err(_) => {
                    out.push_str("<truncated>");
                    return;
                },
            };
            out.push('[');
            for i in 0..count {
                if i > 0 {
                    out.push(',');
                }
                repr_value(obj, elem, out);
            }
            out.push(']');
        },
        Descr::Struct(fields) => {
            out.push('(');
            for (i, f) in fields.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                repr_value(obj, f, out);
            }
            out.push(')');
        },
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn empty_string_is_single_nul() {
        let mut obj = Object::new();
        obj.insert_string("");
        assert_eq!(obj.as_bytes(), &[0]);
    }

    #[test]
    fn zero_length_array_has_no_elements() {
        let obj = build("A i", &[Value::Array(vec![])]).unwrap();
        assert_eq!(obj.raw_size(), 4);
        let mut obj = obj;
        let values = parse(&mut obj, "A i").unwrap();
        assert_eq!(values, vec![Value::Array(vec![])]);
    }

    #[test]
    fn rejects_unbalanced_struct() {
        assert!(descr_valid("(ii").is_err());
        assert!(descr_valid("ii)").is_err());
        assert!(descr_valid("((i)").is_err());
    }

    #[test]
    fn rejects_dangling_array() {
        assert!(descr_valid("A").is_err());
    }

    #[test]
    fn nested_struct_and_array_round_trip() {
        let descr = "(iAs)";
        let values = vec![Value::Struct(vec![
            Value::Int(-5),
            Value::Array(vec![Value::Str("a".into()), Value::Str("bb".into())]),
        ])];
        let mut obj = build(descr, &values).unwrap();
        let parsed = parse(&mut obj, descr).unwrap();
        assert_eq!(parsed, values);
    }

    #[test]
    fn parse_restores_cursor_on_failure() {
        let mut obj = build("i", &[Value::Int(7)]).unwrap();
        obj.rewind();
        assert!(parse(&mut obj, "ii").is_err());
        // Cursor was restored; a correct description still parses.
        let parsed = parse(&mut obj, "i").unwrap();
        assert_eq!(parsed, vec![Value::Int(7)]);
    }

    #[test]
    fn repr_does_not_panic_on_malformed_data() {
        let obj = Object::from_buffer(vec![1, 2]);
        let s = repr(&obj, "(ii)");
        assert!(s.contains("truncated"));
    }

    proptest! {
        #[test]
        fn scalar_round_trip(i in any::<i32>(), u in any::<u32>(), b in any::<u8>(), s in "[a-zA-Z0-9]{0,16}") {
            let descr = "iubs";
            let values = vec![Value::Int(i), Value::Uint(u), Value::Byte(b), Value::Str(s.clone())];
            let mut obj = build(descr, &values).unwrap();
            let expected_size = 4 + 4 + 1 + s.len() + 1;
            prop_assert_eq!(obj.raw_size(), expected_size);
            let parsed = parse(&mut obj, descr).unwrap();
            prop_assert_eq!(parsed, values);
        }
    }
}
