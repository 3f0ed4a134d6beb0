//! In-memory predicate evaluation.
//!
//! Adapters that cannot filter server-side fall back to listing every record
//! of a model and filtering the result with a [`PredicateEvaluator`].
//! [`DocumentEvaluator`] is the default implementation; it also applies the
//! sort and pagination window of a [`Query`].

use bson::{Bson, DateTime};
use std::{cmp::Ordering, collections::HashMap, fmt::Debug};

use crate::{
    error::{StoreError, StoreResult},
    query::{Expr, FieldOp, Query, QueryVisitor, SortDirection},
    record::Record,
};

/// Filters model-level records by a predicate.
pub trait PredicateEvaluator: Send + Sync + Debug {
    /// Keeps the records matching `expr`.
    fn apply(&self, records: Vec<Record>, expr: &Expr) -> StoreResult<Vec<Record>>;

    /// Applies the sort, offset and limit of `query`, ignoring its predicate.
    fn apply_window(&self, mut records: Vec<Record>, query: &Query) -> Vec<Record> {
        if let Some(sort) = &query.sort {
            records.sort_by(|a, b| {
                let left = a.get(&sort.field).map(Comparable::from).unwrap_or(Comparable::Null);
                let right = b.get(&sort.field).map(Comparable::from).unwrap_or(Comparable::Null);

                match sort.direction {
                    SortDirection::Asc => left.partial_cmp(&right).unwrap_or(Ordering::Equal),
                    SortDirection::Desc => right.partial_cmp(&left).unwrap_or(Ordering::Equal),
                }
            });
        }

        records
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

/// Comparable view of a BSON value.
///
/// Every numeric type is normalized to `f64` so `Int32(1)`, `Int64(1)` and
/// `Double(1.0)` compare equal.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    Bytes(&'a [u8]),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Binary(value) => Comparable::Bytes(&value.bytes),
            Bson::Array(values) => Comparable::Array(values.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            _ => Comparable::Null,
        }
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Bytes(a), Comparable::Bytes(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::Bytes(a), Comparable::Bytes(b)) => a.partial_cmp(b),
            // Nulls sort first.
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Null, _) => Some(Ordering::Less),
            (_, Comparable::Null) => Some(Ordering::Greater),
            _ => None,
        }
    }
}

/// Default [`PredicateEvaluator`] that walks the predicate for each record.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentEvaluator;

impl DocumentEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluates `expr` against a single record.
    pub fn matches(record: &Record, expr: &Expr) -> StoreResult<bool> {
        RecordMatcher { record }.visit_expr(expr)
    }
}

impl PredicateEvaluator for DocumentEvaluator {
    fn apply(&self, records: Vec<Record>, expr: &Expr) -> StoreResult<Vec<Record>> {
        let mut matched = Vec::with_capacity(records.len());

        for record in records {
            if Self::matches(&record, expr)? {
                matched.push(record);
            }
        }

        Ok(matched)
    }
}

struct RecordMatcher<'a> {
    record: &'a Record,
}

impl RecordMatcher<'_> {
    fn value(&self, field: &str) -> Comparable<'_> {
        self.record
            .get(field)
            .map(Comparable::from)
            .unwrap_or(Comparable::Null)
    }
}

fn is_member(candidate: &Comparable<'_>, list: &Comparable<'_>) -> bool {
    match (candidate, list) {
        (Comparable::Array(items), Comparable::Array(values)) => {
            values.iter().any(|value| items.contains(value))
        }
        (Comparable::Array(items), single) => items.contains(single),
        (single, Comparable::Array(values)) => values.contains(single),
        (left, right) => left == right,
    }
}

impl QueryVisitor for RecordMatcher<'_> {
    type Output = bool;
    type Error = StoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        let present = !matches!(self.value(field), Comparable::Null);

        Ok(present == should_exist)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let left = self.value(field);
        let right = Comparable::from(value);

        Ok(match op {
            FieldOp::Eq => left == right,
            FieldOp::Ne => left != right,
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => {
                // Ordering against a missing value never matches.
                if matches!(left, Comparable::Null) || matches!(right, Comparable::Null) {
                    return Ok(false);
                }

                match left.partial_cmp(&right) {
                    Some(ordering) => match op {
                        FieldOp::Gt => ordering == Ordering::Greater,
                        FieldOp::Gte => ordering != Ordering::Less,
                        FieldOp::Lt => ordering == Ordering::Less,
                        _ => ordering != Ordering::Greater,
                    },
                    None => false,
                }
            }
            FieldOp::Contains | FieldOp::NotContains => {
                let contained = match (&left, &right) {
                    (Comparable::Array(items), needle) => items.contains(needle),
                    (Comparable::String(haystack), Comparable::String(needle)) => haystack.contains(needle),
                    _ => false,
                };

                contained == (*op == FieldOp::Contains)
            }
            FieldOp::StartsWith => match (&left, &right) {
                (Comparable::String(l), Comparable::String(r)) => l.starts_with(r),
                _ => false,
            },
            FieldOp::EndsWith => match (&left, &right) {
                (Comparable::String(l), Comparable::String(r)) => l.ends_with(r),
                _ => false,
            },
            FieldOp::AnyOf => is_member(&left, &right),
            FieldOp::NoneOf => !is_member(&left, &right),
        })
    }
}
