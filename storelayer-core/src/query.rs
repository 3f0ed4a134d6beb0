//! Predicate and query construction.
//!
//! A [`Query`] bundles an optional `where` predicate ([`Expr`]) with sorting
//! and pagination. Predicates are evaluated natively by adapters that declare
//! native filtering, and by the [`PredicateEvaluator`](crate::filter::PredicateEvaluator)
//! everywhere else. Backends translate an [`Expr`] through the [`QueryVisitor`]
//! trait.
//!
//! ```ignore
//! use storelayer_core::query::{Filter, Query, SortDirection};
//!
//! let query = Query::builder()
//!     .filter(Filter::eq("name", "a").and(Filter::gt("weight", 10)))
//!     .sort("createdAt", SortDirection::Desc)
//!     .limit(10)
//!     .build();
//! ```

use bson::Bson;
use std::collections::BTreeSet;

use crate::{error::StoreError, record::RecordId, schema::PropertyKind};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Sort specification for query results.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

/// Field comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// String or array contains value.
    Contains,
    /// String or array does not contain value.
    NotContains,
    StartsWith,
    EndsWith,
    /// Field value is one of the listed values (inclusion list).
    AnyOf,
    /// Field value is none of the listed values.
    NoneOf,
}

/// A predicate over records.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    /// Field presence check; `true` means the field must be present and non-null.
    Exists(String, bool),
    Field {
        field: String,
        op: FieldOp,
        value: Bson,
    },
}

impl Expr {
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field, op, value }
    }

    /// Combines this expression with another using logical AND.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// Extracts the identifiers this predicate pins the id field to.
    ///
    /// Only a bare equality against a scalar or a bare inclusion list on
    /// `id_name` qualifies, and only when every literal already has the
    /// model's id kind. Everything else, including a conjunction that also
    /// constrains other fields, returns `None` and must go through general
    /// predicate evaluation.
    pub fn constrained_ids(&self, id_name: &str, id_kind: PropertyKind) -> Option<BTreeSet<RecordId>> {
        let Expr::Field { field, op, value } = self else {
            return None;
        };

        if field != id_name {
            return None;
        }

        let literals = match (op, value) {
            (FieldOp::Eq, value) => std::slice::from_ref(value),
            (FieldOp::AnyOf, Bson::Array(values)) => values.as_slice(),
            _ => return None,
        };

        literals
            .iter()
            .map(|value| RecordId::from_bson(value).filter(|id| id.is_kind(id_kind)))
            .collect()
    }
}

/// A structured query: `where` predicate, sort and pagination.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filter: Option<Expr>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub sort: Option<Sort>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }

    /// Returns `true` when the query carries anything besides the predicate.
    pub fn has_window(&self) -> bool {
        self.limit.is_some() || self.offset.is_some() || self.sort.is_some()
    }
}

/// Constructors for predicate expressions.
///
/// ```ignore
/// let expr = Filter::eq("name", "a").and(Filter::any_of("id", vec![1, 2, 3]));
/// ```
pub struct Filter;

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    pub fn starts_with(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::StartsWith, value.into())
    }

    pub fn ends_with(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::EndsWith, value.into())
    }

    pub fn contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Contains, value.into())
    }

    pub fn not_contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::NotContains, value.into())
    }

    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }

    /// Inclusion list: the field equals one of `values`.
    pub fn any_of(field: impl Into<String>, values: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::AnyOf, values.into())
    }

    pub fn none_of(field: impl Into<String>, values: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::NoneOf, values.into())
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Expr) -> Self {
        self.query.filter = Some(filter);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.query.offset = Some(offset);
        self
    }

    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query.sort = Some(Sort {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn build(self) -> Query {
        self.query
    }
}

/// Walks an [`Expr`] tree. Evaluators and backend query translators implement this.
pub trait QueryVisitor {
    type Output;
    type Error: Into<StoreError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_on_id_is_a_fast_path() {
        assert_eq!(
            Filter::eq("id", 42).constrained_ids("id", PropertyKind::Number),
            Some(BTreeSet::from([RecordId::Number(42)]))
        );
    }

    #[test]
    fn inclusion_list_on_id_is_a_fast_path() {
        assert_eq!(
            Filter::any_of("id", vec![2, 1, 2]).constrained_ids("id", PropertyKind::Number),
            Some(BTreeSet::from([RecordId::Number(1), RecordId::Number(2)]))
        );
    }

    #[test]
    fn literals_of_another_kind_fall_through() {
        assert_eq!(Filter::eq("id", "2").constrained_ids("id", PropertyKind::Number), None);
        assert_eq!(
            Filter::any_of("id", vec![Bson::Int64(1), Bson::String("2".into())])
                .constrained_ids("id", PropertyKind::Number),
            None
        );
        assert_eq!(Filter::eq("id", 7).constrained_ids("id", PropertyKind::Text), None);
    }

    #[test]
    fn other_shapes_fall_through() {
        assert_eq!(Filter::gt("id", 1).constrained_ids("id", PropertyKind::Number), None);
        assert_eq!(Filter::eq("name", "a").constrained_ids("id", PropertyKind::Number), None);
        assert_eq!(Filter::any_of("id", 3).constrained_ids("id", PropertyKind::Number), None);
        assert_eq!(
            Filter::eq("id", 1)
                .and(Filter::eq("name", "a"))
                .constrained_ids("id", PropertyKind::Number),
            None
        );
    }
}
