//! A minimal protocol-buffer wire-format reader/writer.
//!
//! spec.md treats the message schema as an external IDL producing opaque
//! `(type_tag, bytes)` pairs with `serialize`/`parse` operations (§3, §6);
//! this crate has no `.proto` compiler available to it, so the handful of
//! message shapes this core actually inspects (`OK`, `ERROR`, `NOTICE`,
//! `CONN_CAPABILITIES`, the authenticate exchange, and per-row fields) are
//! parsed by hand against the protobuf wire format, in the same
//! imperative, slice-advancing style the teacher uses in its MySQL-classic
//! `protocol/primitive.rs` (`read_int_1`/`read_string_lenenc`/...) for a
//! different wire format.

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Varint,
    Fixed64,
    LengthDelimited,
    Fixed32,
}

impl WireType {
    fn from_u64(value: u64) -> Result<Self> {
        match value {
            0 => Ok(Self::Varint),
            1 => Ok(Self::Fixed64),
            2 => Ok(Self::LengthDelimited),
            5 => Ok(Self::Fixed32),
            other => Err(Error::MalformedPacket(format!(
                "unsupported protobuf wire type {other}"
            ))),
        }
    }
}

/// Read a base-128 varint, LSB group first.
pub fn read_varint(data: &[u8]) -> Result<(u64, &[u8])> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    for (i, &byte) in data.iter().enumerate() {
        if shift >= 64 {
            return Err(Error::MalformedPacket("varint too long".to_string()));
        }
        value |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok((value, &data[i + 1..]));
        }
        shift += 7;
    }
    Err(Error::MalformedPacket("truncated varint".to_string()))
}

pub fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

pub fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

pub fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

pub fn read_fixed32(data: &[u8]) -> Result<(u32, &[u8])> {
    if data.len() < 4 {
        return Err(Error::MalformedPacket("truncated fixed32".to_string()));
    }
    let bytes: [u8; 4] = data[..4].try_into().map_err(|_| Error::MalformedPacket("truncated fixed32".to_string()))?;
    Ok((u32::from_le_bytes(bytes), &data[4..]))
}

pub fn read_fixed64(data: &[u8]) -> Result<(u64, &[u8])> {
    if data.len() < 8 {
        return Err(Error::MalformedPacket("truncated fixed64".to_string()));
    }
    let bytes: [u8; 8] = data[..8].try_into().map_err(|_| Error::MalformedPacket("truncated fixed64".to_string()))?;
    Ok((u64::from_le_bytes(bytes), &data[8..]))
}

pub fn write_fixed32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub fn write_fixed64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub fn write_length_delimited(out: &mut Vec<u8>, field_number: u32, bytes: &[u8]) {
    write_varint(out, (u64::from(field_number) << 3) | 2);
    write_varint(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

pub fn write_tagged_varint(out: &mut Vec<u8>, field_number: u32, value: u64) {
    write_varint(out, u64::from(field_number) << 3);
    write_varint(out, value);
}

/// One decoded `(field_number, wire_type, raw_value)` triple. `raw_value`
/// holds the varint's value re-encoded as bytes for `Varint`, the N raw
/// bytes for `Fixed32`/`Fixed64`, or the inner bytes for `LengthDelimited`.
pub struct Field<'a> {
    pub number: u32,
    pub wire_type: WireType,
    pub bytes: &'a [u8],
}

/// Iterates the top-level fields of a length-delimited protobuf message,
/// skipping unknown field numbers. Used by the message parsers in `codec.rs`.
pub struct FieldIter<'a> {
    rest: &'a [u8],
}

impl<'a> FieldIter<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { rest: data }
    }
}

impl<'a> Iterator for FieldIter<'a> {
    type Item = Result<Field<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        Some(self.step())
    }
}

impl<'a> FieldIter<'a> {
    fn step(&mut self) -> Result<Field<'a>> {
        let (tag, rest) = read_varint(self.rest)?;
        let number = u32::try_from(tag >> 3)
            .map_err(|_| Error::MalformedPacket("field number overflow".to_string()))?;
        let wire_type = WireType::from_u64(tag & 0x7)?;
        let (bytes, rest) = match wire_type {
            WireType::Varint => {
                let (_value, after) = read_varint(rest)?;
                (&rest[..rest.len() - after.len()], after)
            }
            WireType::Fixed32 => {
                if rest.len() < 4 {
                    return Err(Error::MalformedPacket("truncated fixed32 field".to_string()));
                }
                (&rest[..4], &rest[4..])
            }
            WireType::Fixed64 => {
                if rest.len() < 8 {
                    return Err(Error::MalformedPacket("truncated fixed64 field".to_string()));
                }
                (&rest[..8], &rest[8..])
            }
            WireType::LengthDelimited => {
                let (len, after) = read_varint(rest)?;
                let len = len as usize;
                if after.len() < len {
                    return Err(Error::MalformedPacket(
                        "truncated length-delimited field".to_string(),
                    ));
                }
                (&after[..len], &after[len..])
            }
        };
        self.rest = rest;
        Ok(Field {
            number,
            wire_type,
            bytes,
        })
    }
}

/// Convenience: decode a `Varint`-wire-type field's payload as `u64`.
pub fn field_as_u64(field: &Field<'_>) -> Result<u64> {
    if field.wire_type != WireType::Varint {
        return Err(Error::MalformedPacket("expected varint field".to_string()));
    }
    Ok(read_varint(field.bytes)?.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_round_trips() {
        for value in [0u64, 1, 127, 128, 300, u32::MAX as u64, u64::MAX] {
            let mut buf = Vec::new();
            write_varint(&mut buf, value);
            let (decoded, rest) = read_varint(&buf).unwrap();
            assert_eq!(decoded, value);
            assert!(rest.is_empty());
        }
    }

    #[test]
    fn zigzag_round_trips() {
        for value in [0i64, -1, 1, -2, i32::MIN as i64, i32::MAX as i64] {
            assert_eq!(zigzag_decode(zigzag_encode(value)), value);
        }
    }

    #[test]
    fn field_iter_reads_mixed_wire_types() {
        let mut msg = Vec::new();
        write_tagged_varint(&mut msg, 1, 42);
        write_length_delimited(&mut msg, 2, b"hello");

        let mut it = FieldIter::new(&msg);
        let f1 = it.next().unwrap().unwrap();
        assert_eq!(f1.number, 1);
        assert_eq!(field_as_u64(&f1).unwrap(), 42);

        let f2 = it.next().unwrap().unwrap();
        assert_eq!(f2.number, 2);
        assert_eq!(f2.bytes, b"hello");

        assert!(it.next().is_none());
    }
}
