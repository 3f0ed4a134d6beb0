//! Field name escaping for MongoDB.
//!
//! MongoDB reserves dots and dollar signs in field names for paths and
//! operators, and rejects NUL bytes. Model records may use any of them, so
//! keys are escaped on the way in and restored on the way out. Values are
//! left untouched so that filters compare against what the caller wrote.

use bson::{Bson, Document};

pub(crate) struct KeySanitizer;

impl KeySanitizer {
    const REPLACEMENTS: [(&'static str, &'static str); 3] = [
        (".", "__dot__"),
        ("$", "__dollar__"),
        ("\0", "__null__"),
    ];

    /// Escapes every key of `document`, recursing into nested documents and arrays.
    pub(crate) fn sanitize_document(document: Document) -> Document {
        document
            .into_iter()
            .map(|(key, value)| (Self::sanitize_key(&key), Self::sanitize_value(value)))
            .collect()
    }

    fn sanitize_value(value: Bson) -> Bson {
        match value {
            Bson::Document(doc) => Bson::Document(Self::sanitize_document(doc)),
            Bson::Array(items) => Bson::Array(items.into_iter().map(Self::sanitize_value).collect()),
            other => other,
        }
    }

    pub(crate) fn sanitize_key(key: &str) -> String {
        Self::REPLACEMENTS
            .iter()
            .fold(key.to_string(), |key, (target, replacement)| key.replace(target, replacement))
    }

    /// Reverts [`sanitize_document`](Self::sanitize_document).
    pub(crate) fn restore_document(document: Document) -> Document {
        document
            .into_iter()
            .map(|(key, value)| (Self::restore_key(&key), Self::restore_value(value)))
            .collect()
    }

    fn restore_value(value: Bson) -> Bson {
        match value {
            Bson::Document(doc) => Bson::Document(Self::restore_document(doc)),
            Bson::Array(items) => Bson::Array(items.into_iter().map(Self::restore_value).collect()),
            other => other,
        }
    }

    fn restore_key(key: &str) -> String {
        Self::REPLACEMENTS
            .iter()
            .rev()
            .fold(key.to_string(), |key, (target, replacement)| key.replace(replacement, target))
    }
}
