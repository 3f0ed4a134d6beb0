//! Record representation shared by the coordinator and every adapter.
//!
//! A [`Record`] is an ordered map from field name to [`Bson`] value. The
//! identifier travels next to the record as a [`RecordId`] and is only merged
//! into the map when a record is handed back to the caller.

use bson::{Bson, Document, spec::BinarySubtype};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{
    error::{StoreError, StoreResult},
    schema::PropertyKind,
};

/// A record in its model-level shape.
pub type Record = Document;

/// Identifier of a record.
///
/// The concrete flavour is chosen by the backend and the model's declared id
/// property. Once assigned an identifier is stable and comparable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    /// Numeric identifier.
    Number(i64),
    /// String identifier.
    Text(String),
    /// Opaque binary token.
    Opaque(Vec<u8>),
}

impl RecordId {
    /// Reads an identifier out of a scalar BSON value.
    ///
    /// Returns `None` for values that cannot identify a record (null, arrays,
    /// documents, fractional numbers).
    pub fn from_bson(value: &Bson) -> Option<Self> {
        match value {
            Bson::Int32(n) => Some(RecordId::Number(*n as i64)),
            Bson::Int64(n) => Some(RecordId::Number(*n)),
            Bson::Double(n) if n.fract() == 0.0 && n.is_finite() => Some(RecordId::Number(*n as i64)),
            Bson::String(s) => Some(RecordId::Text(s.clone())),
            Bson::ObjectId(oid) => Some(RecordId::Text(oid.to_hex())),
            Bson::Binary(binary) => Some(RecordId::Opaque(binary.bytes.clone())),
            _ => None,
        }
    }

    /// Converts this identifier into its BSON form.
    pub fn to_bson(&self) -> Bson {
        match self {
            RecordId::Number(n) => Bson::Int64(*n),
            RecordId::Text(s) => Bson::String(s.clone()),
            RecordId::Opaque(bytes) => Bson::Binary(bson::Binary {
                subtype: BinarySubtype::Generic,
                bytes: bytes.clone(),
            }),
        }
    }

    /// Coerces this identifier to the declared id kind of a model.
    ///
    /// Backends that carry ids inside string keys hand back `Text("42")`;
    /// for a model with a numeric id this yields `Number(42)`.
    pub fn coerce(self, kind: PropertyKind) -> StoreResult<Self> {
        match (kind, self) {
            (PropertyKind::Number, RecordId::Text(s)) => s
                .parse::<i64>()
                .map(RecordId::Number)
                .map_err(|_| StoreError::InvalidRecord(format!("Id {s} is not numeric"))),
            (PropertyKind::Text, RecordId::Number(n)) => Ok(RecordId::Text(n.to_string())),
            (_, id) => Ok(id),
        }
    }

    /// Returns `true` if this identifier already has the flavour of `kind`.
    pub fn is_kind(&self, kind: PropertyKind) -> bool {
        matches!(
            (self, kind),
            (RecordId::Number(_), PropertyKind::Number)
                | (RecordId::Text(_), PropertyKind::Text)
                | (RecordId::Opaque(_), PropertyKind::Opaque)
        )
    }

    /// Parses the textual key form produced by [`fmt::Display`].
    pub fn parse_key(key: &str, kind: PropertyKind) -> StoreResult<Self> {
        RecordId::Text(key.to_string()).coerce(kind)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Number(n) => write!(f, "{n}"),
            RecordId::Text(s) => write!(f, "{s}"),
            RecordId::Opaque(bytes) => {
                for byte in bytes {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        RecordId::Number(value)
    }
}

impl From<i32> for RecordId {
    fn from(value: i32) -> Self {
        RecordId::Number(value as i64)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        RecordId::Text(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        RecordId::Text(value)
    }
}

impl From<RecordId> for Bson {
    fn from(value: RecordId) -> Self {
        value.to_bson()
    }
}

/// Outcome of a create or upsert primitive.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteResult {
    /// Identifier the record was stored under.
    pub id: RecordId,
    /// Revision token, for backends that hand one back.
    pub revision: Option<String>,
}

impl WriteResult {
    pub fn new(id: RecordId, revision: Option<String>) -> Self {
        Self { id, revision }
    }
}

/// Matched-count summary returned by destroy and the bulk operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Count {
    pub count: usize,
}

impl Count {
    pub fn new(count: usize) -> Self {
        Self { count }
    }
}

/// Per-call options forwarded untouched to the adapter.
///
/// Keys are backend specific; the document adapters read `rev` to skip the
/// revision lookup before an overwrite.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    values: Document,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an option value.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Looks up an option value.
    pub fn get(&self, key: &str) -> Option<&Bson> {
        self.values.get(key)
    }

    /// Looks up a string option value.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get_str(key).ok()
    }
}

impl From<Document> for Options {
    fn from(values: Document) -> Self {
        Self { values }
    }
}
