//! Declarative fixed-offset account layouts.
//!
//! A [`Schema`] is a table of `(name, offset, type)` rows. Decoding checks the
//! buffer covers every row before touching it, so a short buffer is an error
//! and never an out-of-bounds read. Trailing bytes past the last row are
//! ignored (token accounts carry far more than the prefix we read).

use std::sync::OnceLock;

use solana_sdk::pubkey::Pubkey;

use crate::discriminator::{account_discriminator, Discriminator, DISCRIMINATOR_LEN};
use crate::error::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Discriminator,
    Pubkey,
    U8,
    U16,
    U64,
    I64,
    /// One byte; any non-zero value reads as `true`.
    Bool,
}

impl FieldType {
    pub const fn width(self) -> usize {
        match self {
            FieldType::Discriminator => DISCRIMINATOR_LEN,
            FieldType::Pubkey => 32,
            FieldType::U8 | FieldType::Bool => 1,
            FieldType::U16 => 2,
            FieldType::U64 | FieldType::I64 => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub offset: usize,
    pub ty: FieldType,
}

impl Field {
    pub const fn new(name: &'static str, offset: usize, ty: FieldType) -> Self {
        Self { name, offset, ty }
    }

    const fn end(&self) -> usize {
        self.offset + self.ty.width()
    }
}

pub struct Schema {
    name: &'static str,
    /// Anchor account type name. `None` for foreign layouts (SPL token)
    /// that carry no discriminator.
    account_type: Option<&'static str>,
    fields: &'static [Field],
    discriminator: OnceLock<Discriminator>,
}

impl Schema {
    pub const fn new(
        name: &'static str,
        account_type: Option<&'static str>,
        fields: &'static [Field],
    ) -> Self {
        Self {
            name,
            account_type,
            fields,
            discriminator: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn fields(&self) -> &'static [Field] {
        self.fields
    }

    /// Expected leading bytes, if this layout is an Anchor account.
    pub fn discriminator(&self) -> Option<Discriminator> {
        self.account_type
            .map(|t| *self.discriminator.get_or_init(|| account_discriminator(t)))
    }

    /// Smallest buffer that covers every declared field.
    pub fn min_len(&self) -> usize {
        self.fields.iter().map(Field::end).max().unwrap_or(0)
    }

    /// Decode raw account bytes.
    ///
    /// `None` input (account does not exist) yields `Ok(None)`: an absent
    /// account is an expected state, not a failure.
    pub fn decode(&'static self, data: Option<&[u8]>) -> Result<Option<Record>, ProtocolError> {
        let Some(data) = data else {
            return Ok(None);
        };
        let required = self.min_len();
        if data.len() < required {
            return Err(ProtocolError::BufferTooShort {
                schema: self.name,
                required,
                actual: data.len(),
            });
        }
        if let Some(expected) = self.discriminator() {
            if data[..DISCRIMINATOR_LEN] != expected {
                return Err(ProtocolError::DiscriminatorMismatch { schema: self.name });
            }
        }

        let mut values = Vec::with_capacity(self.fields.len());
        for field in self.fields {
            let bytes = data
                .get(field.offset..field.end())
                .ok_or(ProtocolError::BufferTooShort {
                    schema: self.name,
                    required: field.end(),
                    actual: data.len(),
                })?;
            values.push(Value::read(field.ty, bytes));
        }
        Ok(Some(Record { schema: self, values }))
    }

    /// Serialize a record back to exactly `min_len()` bytes. Bytes not
    /// covered by any field are zero.
    pub fn encode(&self, record: &Record) -> Vec<u8> {
        let mut out = vec![0u8; self.min_len()];
        for (field, value) in self.fields.iter().zip(&record.values) {
            value.write(&mut out[field.offset..field.end()]);
        }
        out
    }
}

impl std::fmt::Debug for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("min_len", &self.min_len())
            .finish()
    }
}

// ============================================================================
// Values
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    Discriminator(Discriminator),
    Pubkey(Pubkey),
    U8(u8),
    U16(u16),
    U64(u64),
    I64(i64),
    Bool(bool),
}

impl Value {
    pub fn ty(&self) -> FieldType {
        match self {
            Value::Discriminator(_) => FieldType::Discriminator,
            Value::Pubkey(_) => FieldType::Pubkey,
            Value::U8(_) => FieldType::U8,
            Value::U16(_) => FieldType::U16,
            Value::U64(_) => FieldType::U64,
            Value::I64(_) => FieldType::I64,
            Value::Bool(_) => FieldType::Bool,
        }
    }

    // `bytes.len()` is exactly `ty.width()`; the caller sliced it.
    fn read(ty: FieldType, bytes: &[u8]) -> Value {
        let mut b8 = [0u8; 8];
        match ty {
            FieldType::Discriminator => {
                b8.copy_from_slice(bytes);
                Value::Discriminator(b8)
            }
            FieldType::Pubkey => {
                let mut b32 = [0u8; 32];
                b32.copy_from_slice(bytes);
                Value::Pubkey(Pubkey::new_from_array(b32))
            }
            FieldType::U8 => Value::U8(bytes[0]),
            FieldType::Bool => Value::Bool(bytes[0] != 0),
            FieldType::U16 => Value::U16(u16::from_le_bytes([bytes[0], bytes[1]])),
            FieldType::U64 => {
                b8.copy_from_slice(bytes);
                Value::U64(u64::from_le_bytes(b8))
            }
            FieldType::I64 => {
                b8.copy_from_slice(bytes);
                Value::I64(i64::from_le_bytes(b8))
            }
        }
    }

    fn write(&self, out: &mut [u8]) {
        match self {
            Value::Discriminator(d) => out.copy_from_slice(d),
            Value::Pubkey(k) => out.copy_from_slice(k.as_ref()),
            Value::U8(v) => out[0] = *v,
            Value::Bool(v) => out[0] = u8::from(*v),
            Value::U16(v) => out.copy_from_slice(&v.to_le_bytes()),
            Value::U64(v) => out.copy_from_slice(&v.to_le_bytes()),
            Value::I64(v) => out.copy_from_slice(&v.to_le_bytes()),
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// Decoded field values, one per schema row, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    schema: &'static Schema,
    values: Vec<Value>,
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for Schema {}

impl Record {
    /// Assemble a record from values, checking them against the schema.
    pub fn build(schema: &'static Schema, values: Vec<Value>) -> Result<Self, ProtocolError> {
        if values.len() > schema.fields.len() {
            return Err(ProtocolError::FieldCount {
                schema: schema.name,
                expected: schema.fields.len(),
                actual: values.len(),
            });
        }
        for (i, field) in schema.fields.iter().enumerate() {
            let Some(value) = values.get(i) else {
                return Err(ProtocolError::MissingField {
                    schema: schema.name,
                    field: field.name,
                });
            };
            if value.ty() != field.ty {
                return Err(ProtocolError::FieldTypeMismatch {
                    schema: schema.name,
                    field: field.name,
                    expected: field.ty,
                    found: value.ty(),
                });
            }
        }
        Ok(Self { schema, values })
    }

    /// For typed accounts whose field list is fixed at compile time.
    pub(crate) fn from_values(schema: &'static Schema, values: Vec<Value>) -> Self {
        debug_assert_eq!(values.len(), schema.fields.len());
        Self { schema, values }
    }

    pub fn schema(&self) -> &'static Schema {
        self.schema
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.schema.encode(self)
    }

    pub fn get(&self, name: &'static str) -> Result<Value, ProtocolError> {
        self.schema
            .fields
            .iter()
            .position(|f| f.name == name)
            .and_then(|i| self.values.get(i).copied())
            .ok_or(ProtocolError::MissingField {
                schema: self.schema.name,
                field: name,
            })
    }

    fn mismatch(&self, field: &'static str, expected: FieldType, found: Value) -> ProtocolError {
        ProtocolError::FieldTypeMismatch {
            schema: self.schema.name,
            field,
            expected,
            found: found.ty(),
        }
    }

    pub fn pubkey(&self, name: &'static str) -> Result<Pubkey, ProtocolError> {
        match self.get(name)? {
            Value::Pubkey(k) => Ok(k),
            other => Err(self.mismatch(name, FieldType::Pubkey, other)),
        }
    }

    pub fn u8(&self, name: &'static str) -> Result<u8, ProtocolError> {
        match self.get(name)? {
            Value::U8(v) => Ok(v),
            other => Err(self.mismatch(name, FieldType::U8, other)),
        }
    }

    pub fn u16(&self, name: &'static str) -> Result<u16, ProtocolError> {
        match self.get(name)? {
            Value::U16(v) => Ok(v),
            other => Err(self.mismatch(name, FieldType::U16, other)),
        }
    }

    pub fn u64(&self, name: &'static str) -> Result<u64, ProtocolError> {
        match self.get(name)? {
            Value::U64(v) => Ok(v),
            other => Err(self.mismatch(name, FieldType::U64, other)),
        }
    }

    pub fn i64(&self, name: &'static str) -> Result<i64, ProtocolError> {
        match self.get(name)? {
            Value::I64(v) => Ok(v),
            other => Err(self.mismatch(name, FieldType::I64, other)),
        }
    }

    pub fn bool(&self, name: &'static str) -> Result<bool, ProtocolError> {
        match self.get(name)? {
            Value::Bool(v) => Ok(v),
            other => Err(self.mismatch(name, FieldType::Bool, other)),
        }
    }
}
