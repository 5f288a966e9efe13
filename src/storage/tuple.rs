//! Fixed-width tuple data model.
//!
//! - [`Type`] / [`Field`] - column types and values
//! - [`TupleDesc`] - ordered schema of a row
//! - [`Tuple`] - one row, optionally tagged with its [`RecordId`]
//!
//! Every field has a fixed on-disk width so a page can be carved into
//! equally sized slots.

use std::fmt;
use std::sync::Arc;

use crate::common::{Error, PageId, Result};

/// Maximum number of bytes a [`Type::Str`] value can hold.
pub const STRING_LEN: usize = 128;

/// Column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    /// 32-bit signed integer, stored big-endian.
    Int,
    /// UTF-8 string of at most [`STRING_LEN`] bytes, stored as a 4-byte
    /// big-endian length followed by the zero-padded bytes.
    Str,
}

impl Type {
    /// Width of a value of this type on disk.
    #[inline]
    pub const fn width(&self) -> usize {
        match self {
            Type::Int => 4,
            Type::Str => 4 + STRING_LEN,
        }
    }

    /// Decode one value of this type from the front of `bytes`.
    pub fn parse(&self, bytes: &[u8]) -> std::result::Result<Field, String> {
        if bytes.len() < self.width() {
            return Err(format!("need {} bytes, have {}", self.width(), bytes.len()));
        }
        match self {
            Type::Int => Ok(Field::Int(i32::from_be_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3],
            ]))),
            Type::Str => {
                let len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
                if len > STRING_LEN {
                    return Err(format!("string length {} exceeds {}", len, STRING_LEN));
                }
                String::from_utf8(bytes[4..4 + len].to_vec())
                    .map(Field::Str)
                    .map_err(|e| format!("string is not UTF-8: {}", e))
            }
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Str => write!(f, "string"),
        }
    }
}

/// A single column value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field {
    Int(i32),
    Str(String),
}

impl Field {
    /// Type of this value.
    pub fn field_type(&self) -> Type {
        match self {
            Field::Int(_) => Type::Int,
            Field::Str(_) => Type::Str,
        }
    }

    /// Encode into the front of `buf`, which must be at least
    /// `self.field_type().width()` bytes.
    pub fn write_to(&self, buf: &mut [u8]) {
        match self {
            Field::Int(v) => buf[..4].copy_from_slice(&v.to_be_bytes()),
            Field::Str(s) => {
                let bytes = s.as_bytes();
                let len = bytes.len().min(STRING_LEN);
                buf[..4].copy_from_slice(&(len as u32).to_be_bytes());
                buf[4..4 + len].copy_from_slice(&bytes[..len]);
                buf[4 + len..4 + STRING_LEN].fill(0);
            }
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Int(v) => write!(f, "{}", v),
            Field::Str(s) => write!(f, "{}", s),
        }
    }
}

/// One column of a [`TupleDesc`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TdItem {
    pub field_type: Type,
    pub name: Option<String>,
}

/// Schema of a tuple: an ordered list of typed, optionally named columns.
///
/// # Example
/// ```
/// use tupledb::storage::{TupleDesc, Type};
///
/// let td = TupleDesc::with_names(&[Type::Int, Type::Str], &["id", "name"]);
/// assert_eq!(td.num_fields(), 2);
/// assert_eq!(td.byte_size(), 4 + 132);
/// assert_eq!(td.index_of("name"), Some(1));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TupleDesc {
    items: Vec<TdItem>,
}

impl TupleDesc {
    /// Anonymous columns of the given types.
    pub fn new(types: &[Type]) -> Self {
        Self {
            items: types
                .iter()
                .map(|&field_type| TdItem {
                    field_type,
                    name: None,
                })
                .collect(),
        }
    }

    /// Named columns. `names` shorter than `types` leaves the tail unnamed.
    pub fn with_names(types: &[Type], names: &[&str]) -> Self {
        Self {
            items: types
                .iter()
                .enumerate()
                .map(|(i, &field_type)| TdItem {
                    field_type,
                    name: names.get(i).map(|n| n.to_string()),
                })
                .collect(),
        }
    }

    pub fn num_fields(&self) -> usize {
        self.items.len()
    }

    pub fn field_type(&self, i: usize) -> Option<Type> {
        self.items.get(i).map(|item| item.field_type)
    }

    pub fn field_name(&self, i: usize) -> Option<&str> {
        self.items.get(i).and_then(|item| item.name.as_deref())
    }

    /// Position of the first column called `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.items
            .iter()
            .position(|item| item.name.as_deref() == Some(name))
    }

    /// Bytes one tuple of this schema occupies in a page slot.
    pub fn byte_size(&self) -> usize {
        self.items.iter().map(|item| item.field_type.width()).sum()
    }

    pub fn items(&self) -> impl Iterator<Item = &TdItem> {
        self.items.iter()
    }

    /// True when both schemas have the same column types in the same order.
    /// Names are ignored.
    pub fn same_types(&self, other: &TupleDesc) -> bool {
        self.items.len() == other.items.len()
            && self
                .items
                .iter()
                .zip(&other.items)
                .all(|(a, b)| a.field_type == b.field_type)
    }
}

impl fmt::Display for TupleDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cols: Vec<String> = self
            .items
            .iter()
            .map(|item| format!("{}({})", item.field_type, item.name.as_deref().unwrap_or("")))
            .collect();
        write!(f, "{}", cols.join(", "))
    }
}

/// Durable address of one stored tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: usize,
}

impl RecordId {
    pub fn new(page_id: PageId, slot: usize) -> Self {
        Self { page_id, slot }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.page_id, self.slot)
    }
}

/// A row of values matching a [`TupleDesc`].
///
/// Tuples are cloned, never shared, when they leave a cached page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    schema: Arc<TupleDesc>,
    fields: Vec<Field>,
    record_id: Option<RecordId>,
}

impl Tuple {
    /// Build a tuple, checking every value against the schema.
    ///
    /// # Errors
    /// `Error::InvalidTuple` on arity or type mismatch, or a string longer
    /// than [`STRING_LEN`] bytes.
    pub fn new(schema: Arc<TupleDesc>, fields: Vec<Field>) -> Result<Self> {
        if fields.len() != schema.num_fields() {
            return Err(Error::InvalidTuple(format!(
                "expected {} fields, got {}",
                schema.num_fields(),
                fields.len()
            )));
        }
        for (i, field) in fields.iter().enumerate() {
            check_field(&schema, i, field)?;
        }
        Ok(Self {
            schema,
            fields,
            record_id: None,
        })
    }

    pub fn schema(&self) -> &Arc<TupleDesc> {
        &self.schema
    }

    pub fn field(&self, i: usize) -> Option<&Field> {
        self.fields.get(i)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Replace one value.
    ///
    /// # Errors
    /// `Error::InvalidTuple` if `i` is out of range or the type differs.
    pub fn set_field(&mut self, i: usize, field: Field) -> Result<()> {
        if i >= self.fields.len() {
            return Err(Error::InvalidTuple(format!("no field {}", i)));
        }
        check_field(&self.schema, i, &field)?;
        self.fields[i] = field;
        Ok(())
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, record_id: Option<RecordId>) {
        self.record_id = record_id;
    }

    /// Encode into a slot of exactly `schema.byte_size()` bytes.
    pub(crate) fn write_to(&self, slot: &mut [u8]) {
        let mut offset = 0;
        for field in &self.fields {
            let len = field.field_type().width();
            field.write_to(&mut slot[offset..offset + len]);
            offset += len;
        }
    }

    /// Decode from a slot.
    pub(crate) fn parse(schema: &Arc<TupleDesc>, slot: &[u8]) -> std::result::Result<Self, String> {
        let mut fields = Vec::with_capacity(schema.num_fields());
        let mut offset = 0;
        for item in schema.items() {
            let len = item.field_type.width();
            fields.push(item.field_type.parse(&slot[offset..offset + len])?);
            offset += len;
        }
        Ok(Self {
            schema: Arc::clone(schema),
            fields,
            record_id: None,
        })
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cols: Vec<String> = self.fields.iter().map(|v| v.to_string()).collect();
        write!(f, "{}", cols.join("\t"))
    }
}

fn check_field(schema: &TupleDesc, i: usize, field: &Field) -> Result<()> {
    let expected = schema
        .field_type(i)
        .ok_or_else(|| Error::InvalidTuple(format!("no field {}", i)))?;
    if field.field_type() != expected {
        return Err(Error::InvalidTuple(format!(
            "field {} should be {}, got {}",
            i,
            expected,
            field.field_type()
        )));
    }
    if let Field::Str(s) = field {
        if s.len() > STRING_LEN {
            return Err(Error::InvalidTuple(format!(
                "string of {} bytes exceeds {}",
                s.len(),
                STRING_LEN
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_str_schema() -> Arc<TupleDesc> {
        Arc::new(TupleDesc::with_names(&[Type::Int, Type::Str], &["id", "name"]))
    }

    #[test]
    fn test_type_width() {
        assert_eq!(Type::Int.width(), 4);
        assert_eq!(Type::Str.width(), 132);
    }

    #[test]
    fn test_int_byte_layout_is_big_endian() {
        let mut buf = [0u8; 4];
        Field::Int(0x01020304).write_to(&mut buf);
        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(Type::Int.parse(&buf).unwrap(), Field::Int(0x01020304));
    }

    #[test]
    fn test_string_layout() {
        let mut buf = [0xFFu8; 132];
        Field::Str("hi".to_string()).write_to(&mut buf);
        assert_eq!(&buf[..4], &[0, 0, 0, 2]);
        assert_eq!(&buf[4..6], b"hi");
        assert!(buf[6..].iter().all(|&b| b == 0));
        assert_eq!(Type::Str.parse(&buf).unwrap(), Field::Str("hi".to_string()));
    }

    #[test]
    fn test_string_length_over_limit_rejected_on_parse() {
        let mut buf = [0u8; 132];
        buf[..4].copy_from_slice(&200u32.to_be_bytes());
        assert!(Type::Str.parse(&buf).is_err());
    }

    #[test]
    fn test_tuple_new_checks_schema() {
        let schema = int_str_schema();
        assert!(Tuple::new(schema.clone(), vec![Field::Int(1)]).is_err());
        assert!(Tuple::new(
            schema.clone(),
            vec![Field::Str("x".into()), Field::Str("y".into())]
        )
        .is_err());
        assert!(Tuple::new(
            schema.clone(),
            vec![Field::Int(1), Field::Str("a".repeat(STRING_LEN + 1))]
        )
        .is_err());
        assert!(Tuple::new(schema, vec![Field::Int(1), Field::Str("ok".into())]).is_ok());
    }

    #[test]
    fn test_set_field() {
        let mut t = Tuple::new(int_str_schema(), vec![Field::Int(1), Field::Str("a".into())]).unwrap();
        t.set_field(0, Field::Int(9)).unwrap();
        assert_eq!(t.field(0), Some(&Field::Int(9)));
        assert!(t.set_field(0, Field::Str("no".into())).is_err());
        assert!(t.set_field(5, Field::Int(1)).is_err());
    }

    #[test]
    fn test_tuple_slot_roundtrip() {
        let schema = int_str_schema();
        let t = Tuple::new(schema.clone(), vec![Field::Int(-7), Field::Str("bob".into())]).unwrap();
        let mut slot = vec![0u8; schema.byte_size()];
        t.write_to(&mut slot);
        let back = Tuple::parse(&schema, &slot).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_tuple_desc_lookup() {
        let desc = TupleDesc::with_names(&[Type::Int, Type::Str, Type::Int], &["a", "b"]);
        assert_eq!(desc.num_fields(), 3);
        assert_eq!(desc.index_of("b"), Some(1));
        assert_eq!(desc.field_name(2), None);
        assert_eq!(desc.field_type(2), Some(Type::Int));
        assert!(desc.same_types(&TupleDesc::new(&[Type::Int, Type::Str, Type::Int])));
    }

    #[test]
    fn test_tuple_display() {
        let t = Tuple::new(int_str_schema(), vec![Field::Int(1), Field::Str("x".into())]).unwrap();
        assert_eq!(t.to_string(), "1\tx");
    }
}
