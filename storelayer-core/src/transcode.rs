//! Schema-driven value conversion between model and backend representations.
//!
//! Backends differ in which value types they store natively. A flat hash
//! store only knows strings, a document store knows numbers, booleans,
//! nested structures and null. [`NativeTypes`] describes what a backend
//! supports and [`Transcoder`] converts each field according to its declared
//! [`PropertyKind`].

use bson::{Bson, DateTime, ser::serialize_to_bson};
use chrono::{SecondsFormat, Utc};

use crate::{
    error::StoreResult,
    record::Record,
    schema::{PropertyKind, PropertyRegistry},
};

/// Value marker stored in place of null by backends without a native null.
pub const EMPTY_MARKER: &str = "";

/// Value types a backend stores natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeTypes {
    pub numbers: bool,
    pub booleans: bool,
    pub nulls: bool,
    /// Arrays and nested documents.
    pub structures: bool,
}

impl NativeTypes {
    /// A backend storing arbitrary BSON/JSON documents.
    pub const DOCUMENT: NativeTypes = NativeTypes {
        numbers: true,
        booleans: true,
        nulls: true,
        structures: true,
    };

    /// A backend storing flat string-to-string maps.
    pub const FLAT: NativeTypes = NativeTypes {
        numbers: false,
        booleans: false,
        nulls: false,
        structures: false,
    };
}

/// Converts records field by field using a model's declared property kinds.
#[derive(Debug, Clone, Copy)]
pub struct Transcoder<'a> {
    registry: &'a dyn PropertyRegistry,
    model: &'a str,
    native: NativeTypes,
}

impl<'a> Transcoder<'a> {
    pub fn new(registry: &'a dyn PropertyRegistry, model: &'a str, native: NativeTypes) -> Self {
        Self {
            registry,
            model,
            native,
        }
    }

    fn kind(&self, field: &str) -> Option<PropertyKind> {
        self.registry
            .property(self.model, field)
            .map(|descriptor| descriptor.kind)
    }

    /// Converts a model-level record to the backend representation.
    pub fn for_db(&self, record: Record) -> StoreResult<Record> {
        record
            .into_iter()
            .map(|(field, value)| {
                let value = encode_value(value, self.kind(&field), self.native)?;
                Ok((field, value))
            })
            .collect()
    }

    /// Converts a backend record back to the model-level representation.
    pub fn from_db(&self, record: Record) -> Record {
        record
            .into_iter()
            .map(|(field, value)| {
                let value = decode_value(value, self.kind(&field), self.native);
                (field, value)
            })
            .collect()
    }
}

/// Renders a date as an RFC 3339 timestamp with millisecond precision.
pub fn format_date(date: DateTime) -> String {
    date.to_chrono()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses an RFC 3339 timestamp.
pub fn parse_date(text: &str) -> Option<DateTime> {
    chrono::DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|date| DateTime::from_chrono(date.with_timezone(&Utc)))
}

fn is_null(value: &Bson) -> bool {
    matches!(value, Bson::Null | Bson::Undefined)
}

/// Converts a single value to its backend representation.
pub fn encode_value(value: Bson, kind: Option<PropertyKind>, native: NativeTypes) -> StoreResult<Bson> {
    if is_null(&value) {
        return Ok(if native.nulls {
            Bson::Null
        } else {
            Bson::String(EMPTY_MARKER.to_string())
        });
    }

    Ok(match (kind, value) {
        (Some(PropertyKind::Date), Bson::DateTime(date)) => Bson::String(format_date(date)),
        (Some(PropertyKind::Date), Bson::String(text)) => match parse_date(&text) {
            Some(date) => Bson::String(format_date(date)),
            None => Bson::String(text),
        },
        (Some(PropertyKind::Date), Bson::Int64(millis)) => {
            Bson::String(format_date(DateTime::from_millis(millis)))
        }
        (Some(PropertyKind::Text), value) => value,
        (Some(PropertyKind::Number), value) if !native.numbers => match value {
            Bson::Int32(n) => Bson::String(n.to_string()),
            Bson::Int64(n) => Bson::String(n.to_string()),
            Bson::Double(n) => Bson::String(n.to_string()),
            other => other,
        },
        (Some(PropertyKind::Boolean), Bson::Boolean(flag)) if !native.booleans => {
            Bson::String(if flag { "true" } else { "false" }.to_string())
        }
        (Some(PropertyKind::Number | PropertyKind::Boolean), value) => value,
        // Undeclared strings are stored as-is even on flat backends.
        (None, Bson::String(text)) => Bson::String(text),
        (_, value) if native.structures => value,
        (_, value) => Bson::String(serde_json::to_string(&value)?),
    })
}

/// Converts a single backend value to its model representation.
///
/// Values that cannot be parsed for their declared kind are returned raw.
pub fn decode_value(value: Bson, kind: Option<PropertyKind>, native: NativeTypes) -> Bson {
    if is_null(&value) {
        return Bson::Null;
    }

    if !native.nulls && value.as_str() == Some(EMPTY_MARKER) {
        return Bson::Null;
    }

    match (kind, value) {
        (None, value) => value,
        (Some(PropertyKind::Date), Bson::String(text)) => match parse_date(&text) {
            Some(date) => Bson::DateTime(date),
            None => Bson::String(text),
        },
        (Some(PropertyKind::Number), Bson::String(text)) => {
            if let Ok(n) = text.parse::<i64>() {
                Bson::Int64(n)
            } else if let Ok(n) = text.parse::<f64>() {
                Bson::Double(n)
            } else {
                Bson::String(text)
            }
        }
        (Some(PropertyKind::Boolean), Bson::String(text)) => Bson::Boolean(text == "true" || text == "1"),
        (Some(PropertyKind::Opaque), Bson::String(text)) if !native.structures => {
            match serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|json| serialize_to_bson(&json).ok())
            {
                Some(parsed) => parsed,
                None => Bson::String(text),
            }
        }
        (_, value) => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ModelDefinition, ModelRegistry};
    use bson::doc;

    fn registry() -> ModelRegistry {
        ModelRegistry::new().define(
            ModelDefinition::new("Widget")
                .property("name", PropertyKind::Text)
                .property("weight", PropertyKind::Number)
                .property("active", PropertyKind::Boolean)
                .property("createdAt", PropertyKind::Date)
                .property("meta", PropertyKind::Opaque),
        )
    }

    #[test]
    fn flat_backends_store_strings_only() {
        let registry = registry();
        let transcoder = Transcoder::new(&registry, "Widget", NativeTypes::FLAT);
        let created = DateTime::from_millis(1_700_000_000_123);

        let encoded = transcoder
            .for_db(doc! {
                "name": "a",
                "weight": 12.5,
                "active": true,
                "createdAt": created,
                "meta": { "color": "red" },
                "note": Bson::Null,
            })
            .unwrap();

        assert_eq!(encoded.get_str("weight").unwrap(), "12.5");
        assert_eq!(encoded.get_str("active").unwrap(), "true");
        assert_eq!(encoded.get_str("createdAt").unwrap(), "2023-11-14T22:13:20.123Z");
        assert_eq!(encoded.get_str("meta").unwrap(), r#"{"color":"red"}"#);
        assert_eq!(encoded.get_str("note").unwrap(), EMPTY_MARKER);

        let decoded = transcoder.from_db(encoded);

        assert_eq!(decoded.get_f64("weight").unwrap(), 12.5);
        assert!(decoded.get_bool("active").unwrap());
        assert_eq!(decoded.get_datetime("createdAt").unwrap(), &created);
        assert_eq!(decoded.get_document("meta").unwrap(), &doc! { "color": "red" });
        assert_eq!(decoded.get("note"), Some(&Bson::Null));
    }

    #[test]
    fn document_backends_keep_native_values() {
        let registry = registry();
        let transcoder = Transcoder::new(&registry, "Widget", NativeTypes::DOCUMENT);

        let encoded = transcoder
            .for_db(doc! { "weight": 3, "active": false, "meta": [1, 2], "note": Bson::Null })
            .unwrap();

        assert_eq!(encoded, doc! { "weight": 3, "active": false, "meta": [1, 2], "note": Bson::Null });
    }

    #[test]
    fn unparsable_values_come_back_raw() {
        assert_eq!(
            decode_value(Bson::String("not json".into()), Some(PropertyKind::Opaque), NativeTypes::FLAT),
            Bson::String("not json".into())
        );
        assert_eq!(
            decode_value(Bson::String("soon".into()), Some(PropertyKind::Date), NativeTypes::FLAT),
            Bson::String("soon".into())
        );
    }
}
