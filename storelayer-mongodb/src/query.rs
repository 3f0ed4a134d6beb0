//! Translation of storelayer predicates into MongoDB filter documents.
//!
//! Values are transcoded with the model's declared property kinds before
//! they reach the filter, so a date compares against the timestamp string
//! the adapter stored. The model's id field is mapped onto `_id`.

use bson::{Bson, Document, doc};

use storelayer_core::{
    backend::ModelScope,
    error::{StoreError, StoreResult},
    query::{Expr, FieldOp, QueryVisitor},
    transcode::{NativeTypes, encode_value},
};

use crate::sanitizer::KeySanitizer;

/// Translates predicates for one model into MongoDB query documents.
pub(crate) struct MongoQueryTranslator<'a> {
    scope: &'a ModelScope,
}

impl<'a> MongoQueryTranslator<'a> {
    pub(crate) fn new(scope: &'a ModelScope) -> Self {
        Self { scope }
    }

    pub(crate) fn translate(scope: &'a ModelScope, expr: &Expr) -> StoreResult<Document> {
        Self::new(scope).visit_expr(expr)
    }

    fn path(&self, field: &str) -> String {
        if field == self.scope.id_name {
            "_id".to_string()
        } else {
            KeySanitizer::sanitize_key(field)
        }
    }

    fn value(&self, field: &str, value: &Bson) -> StoreResult<Bson> {
        if field == self.scope.id_name {
            return Ok(value.clone());
        }

        let kind = self
            .scope
            .registry
            .property(&self.scope.model, field)
            .map(|descriptor| descriptor.kind);

        match value {
            Bson::Array(items) => Ok(Bson::Array(
                items
                    .iter()
                    .map(|item| encode_value(item.clone(), kind, NativeTypes::DOCUMENT))
                    .collect::<StoreResult<Vec<_>>>()?,
            )),
            other => encode_value(other.clone(), kind, NativeTypes::DOCUMENT),
        }
    }

    fn list(value: Bson) -> Bson {
        match value {
            Bson::Array(items) => Bson::Array(items),
            single => Bson::Array(vec![single]),
        }
    }
}

fn escape(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len());

    for c in pattern.chars() {
        if "\\^$.|?*+()[]{}".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }

    escaped
}

impl QueryVisitor for MongoQueryTranslator<'_> {
    type Output = Document;
    type Error = StoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$and": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$or": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        // `$not` only applies to operator expressions; `$nor` negates a whole filter.
        Ok(doc! {
            "$nor": [self.visit_expr(expr)?],
        })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        let path = self.path(field);

        Ok(if should_exist {
            doc! { path: { "$exists": true, "$ne": Bson::Null } }
        } else {
            doc! { path: { "$eq": Bson::Null } }
        })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let path = self.path(field);
        let value = self.value(field, value)?;

        Ok(doc! {
            path: match op {
                FieldOp::Eq => doc! { "$eq": value },
                FieldOp::Ne => doc! { "$ne": value },
                FieldOp::Gt => doc! { "$gt": value },
                FieldOp::Gte => doc! { "$gte": value },
                FieldOp::Lt => doc! { "$lt": value },
                FieldOp::Lte => doc! { "$lte": value },
                FieldOp::Contains => match value {
                    Bson::String(s) => doc! { "$regex": escape(&s) },
                    other => doc! { "$elemMatch": { "$eq": other } },
                },
                FieldOp::NotContains => match value {
                    Bson::String(s) => doc! { "$not": { "$regex": escape(&s) } },
                    other => doc! { "$not": { "$elemMatch": { "$eq": other } } },
                },
                FieldOp::StartsWith => match value {
                    Bson::String(s) => doc! { "$regex": format!("^{}", escape(&s)) },
                    _ => return Err(StoreError::InvalidRecord("StartsWith operator requires a string value".to_string())),
                },
                FieldOp::EndsWith => match value {
                    Bson::String(s) => doc! { "$regex": format!("{}$", escape(&s)) },
                    _ => return Err(StoreError::InvalidRecord("EndsWith operator requires a string value".to_string())),
                },
                FieldOp::AnyOf => doc! { "$in": Self::list(value) },
                FieldOp::NoneOf => doc! { "$nin": Self::list(value) },
            }
        })
    }
}
