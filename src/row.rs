//! Typed column metadata and the per-field binary row decoder (spec.md
//! §4.6, C6).

use crate::codec::RawColumnMetaData;
use crate::constant::FieldType;
use crate::error::{Error, Result};
use crate::pbwire::{read_fixed32, read_fixed64, read_varint, zigzag_decode};

#[derive(Debug, Clone)]
pub struct ColumnMetadata {
    pub field_type: FieldType,
    pub name: String,
    pub original_name: String,
    pub table: String,
    pub original_table: String,
    pub schema: String,
    pub catalog: String,
    pub collation: u64,
    pub fractional_digits: u32,
    pub length: u32,
    pub flags: u32,
    pub content_type: u32,
}

impl TryFrom<RawColumnMetaData> for ColumnMetadata {
    type Error = Error;

    fn try_from(raw: RawColumnMetaData) -> Result<Self> {
        let field_type = raw
            .field_type
            .ok_or_else(|| Error::MalformedPacket("column metadata missing field type".to_string()))?;
        Ok(Self {
            field_type,
            name: raw.name,
            original_name: raw.original_name,
            table: raw.table,
            original_table: raw.original_table,
            schema: raw.schema,
            catalog: raw.catalog,
            collation: raw.collation,
            fractional_digits: raw.fractional_digits,
            length: raw.length,
            flags: raw.flags,
            content_type: raw.content_type,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Time {
    pub negative: bool,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub microsecond: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTime {
    pub year: u32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub microsecond: u32,
}

/// One resultset row: borrows the column metadata for the resultset it
/// belongs to, owns its own raw per-field byte slices.
#[derive(Debug, Clone)]
pub struct Row<'a> {
    columns: &'a [ColumnMetadata],
    fields: Vec<Vec<u8>>,
}

impl<'a> Row<'a> {
    pub fn new(columns: &'a [ColumnMetadata], fields: Vec<Vec<u8>>) -> Self {
        Self { columns, fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn is_null(&self, index: usize) -> Result<bool> {
        self.raw(index).map(|f| f.is_empty())
    }

    fn raw(&self, index: usize) -> Result<&[u8]> {
        self.fields.get(index).map(Vec::as_slice).ok_or(Error::IndexOutOfRange)
    }

    fn column(&self, index: usize) -> Result<&ColumnMetadata> {
        self.columns.get(index).ok_or(Error::IndexOutOfRange)
    }

    fn expect_type(&self, index: usize, expected: FieldType) -> Result<()> {
        let column = self.column(index)?;
        if column.field_type != expected {
            return Err(Error::TypeMismatch);
        }
        Ok(())
    }

    pub fn sint(&self, index: usize) -> Result<i64> {
        self.expect_type(index, FieldType::SINT)?;
        let raw = self.raw(index)?;
        let (value, _rest) = read_varint(raw)?;
        Ok(zigzag_decode(value))
    }

    pub fn uint(&self, index: usize) -> Result<u64> {
        let column = self.column(index)?;
        if column.field_type != FieldType::UINT && column.field_type != FieldType::BIT {
            return Err(Error::TypeMismatch);
        }
        let raw = self.raw(index)?;
        Ok(read_varint(raw)?.0)
    }

    pub fn float(&self, index: usize) -> Result<f32> {
        self.expect_type(index, FieldType::FLOAT)?;
        let raw = self.raw(index)?;
        let (bits, _rest) = read_fixed32(raw)?;
        Ok(f32::from_bits(bits))
    }

    pub fn double(&self, index: usize) -> Result<f64> {
        self.expect_type(index, FieldType::DOUBLE)?;
        let raw = self.raw(index)?;
        let (bits, _rest) = read_fixed64(raw)?;
        Ok(f64::from_bits(bits))
    }

    /// `BYTES`/`ENUM`: raw bytes with a trailing NUL stripped.
    pub fn bytes(&self, index: usize) -> Result<&[u8]> {
        let column = self.column(index)?;
        if column.field_type != FieldType::BYTES && column.field_type != FieldType::ENUM {
            return Err(Error::TypeMismatch);
        }
        let raw = self.raw(index)?;
        if raw.is_empty() {
            return Ok(raw);
        }
        Ok(&raw[..raw.len() - 1])
    }

    pub fn datetime(&self, index: usize) -> Result<DateTime> {
        self.expect_type(index, FieldType::DATETIME)?;
        let raw = self.raw(index)?;
        let (year, rest) = read_varint(raw)?;
        let (month, rest) = read_varint(rest)?;
        let (day, mut rest) = read_varint(rest)?;
        let mut parts = [0u64; 4];
        for part in &mut parts {
            if rest.is_empty() {
                break;
            }
            let (value, next) = read_varint(rest)?;
            *part = value;
            rest = next;
        }
        Ok(DateTime {
            year: u32::try_from(year).map_err(|_| Error::MalformedPacket("datetime year overflow".to_string()))?,
            month: u32::try_from(month).map_err(|_| Error::MalformedPacket("datetime month overflow".to_string()))?,
            day: u32::try_from(day).map_err(|_| Error::MalformedPacket("datetime day overflow".to_string()))?,
            hour: parts[0] as u32,
            minute: parts[1] as u32,
            second: parts[2] as u32,
            microsecond: parts[3] as u32,
        })
    }

    pub fn time(&self, index: usize) -> Result<Time> {
        self.expect_type(index, FieldType::TIME)?;
        let raw = self.raw(index)?;
        let (&sign, mut rest) = raw
            .split_first()
            .ok_or_else(|| Error::MalformedPacket("empty TIME field".to_string()))?;
        let negative = sign != 0x00;
        let mut parts = [0u64; 4];
        for part in &mut parts {
            if rest.is_empty() {
                break;
            }
            let (value, next) = read_varint(rest)?;
            *part = value;
            rest = next;
        }
        Ok(Time {
            negative,
            hour: parts[0] as u32,
            minute: parts[1] as u32,
            second: parts[2] as u32,
            microsecond: parts[3] as u32,
        })
    }

    /// A sequence of `(length-varint, bytes)` pairs. The single byte `0x01`
    /// with no payload encodes the empty SET.
    pub fn set(&self, index: usize) -> Result<Vec<Vec<u8>>> {
        self.expect_type(index, FieldType::SET)?;
        let raw = self.raw(index)?;
        if raw == [0x01] {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        let mut rest = raw;
        while !rest.is_empty() {
            let (len, after) = read_varint(rest)?;
            let len = len as usize;
            if after.len() < len {
                return Err(Error::MalformedPacket("truncated SET element".to_string()));
            }
            out.push(after[..len].to_vec());
            rest = &after[len..];
        }
        Ok(out)
    }

    /// Raw decimal bytes, as produced by the upstream library, for a
    /// `rust_decimal`-based consumer to interpret.
    #[cfg(feature = "with-rust-decimal")]
    pub fn decimal(&self, index: usize) -> Result<rust_decimal::Decimal> {
        self.expect_type(index, FieldType::DECIMAL)?;
        let raw = self.raw(index)?;
        rust_decimal::Decimal::deserialize(
            raw.try_into().map_err(|_| Error::MalformedPacket("decimal field has the wrong width".to_string()))?,
        )
        .map_err(|e| Error::MalformedPacket(format!("bad decimal bytes: {e}")))
    }

    pub fn decimal_bytes(&self, index: usize) -> Result<&[u8]> {
        self.expect_type(index, FieldType::DECIMAL)?;
        self.raw(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pbwire::{write_varint, zigzag_encode};

    fn cols(field_type: FieldType) -> Vec<ColumnMetadata> {
        vec![ColumnMetadata {
            field_type,
            name: "c".to_string(),
            original_name: String::new(),
            table: String::new(),
            original_table: String::new(),
            schema: String::new(),
            catalog: String::new(),
            collation: 0,
            fractional_digits: 0,
            length: 0,
            flags: 0,
            content_type: 0,
        }]
    }

    #[test]
    fn sint_decodes_zigzag() {
        let columns = cols(FieldType::SINT);
        let mut buf = Vec::new();
        write_varint(&mut buf, zigzag_encode(-7));
        let row = Row::new(&columns, vec![buf]);
        assert_eq!(row.sint(0).unwrap(), -7);
    }

    #[test]
    fn wrong_type_accessor_fails() {
        let columns = cols(FieldType::SINT);
        let mut buf = Vec::new();
        write_varint(&mut buf, zigzag_encode(-7));
        let row = Row::new(&columns, vec![buf]);
        assert!(matches!(row.uint(0), Err(Error::TypeMismatch)));
    }

    #[test]
    fn bytes_strips_trailing_nul() {
        let columns = cols(FieldType::BYTES);
        let row = Row::new(&columns, vec![b"hi\0".to_vec()]);
        assert_eq!(row.bytes(0).unwrap(), b"hi");
    }

    #[test]
    fn empty_set_special_case() {
        let columns = cols(FieldType::SET);
        let row = Row::new(&columns, vec![vec![0x01]]);
        assert_eq!(row.set(0).unwrap(), Vec::<Vec<u8>>::new());
    }

    #[test]
    fn datetime_defaults_missing_trailing_components() {
        let columns = cols(FieldType::DATETIME);
        let mut buf = Vec::new();
        write_varint(&mut buf, 2024);
        write_varint(&mut buf, 1);
        write_varint(&mut buf, 15);
        let row = Row::new(&columns, vec![buf]);
        let dt = row.datetime(0).unwrap();
        assert_eq!(dt, DateTime { year: 2024, month: 1, day: 15, hour: 0, minute: 0, second: 0, microsecond: 0 });
    }

    #[test]
    fn index_out_of_range_is_an_error_not_a_panic() {
        let columns = cols(FieldType::SINT);
        let row = Row::new(&columns, vec![vec![0]]);
        assert!(matches!(row.sint(5), Err(Error::IndexOutOfRange)));
    }
}
