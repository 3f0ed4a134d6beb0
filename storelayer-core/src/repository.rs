//! Typed access to a model through serde.
//!
//! Implement [`Model`] for a serializable struct and obtain a
//! [`Repository`] from [`Coordinator::repository`] to work with the struct
//! instead of raw records.
//!
//! ```ignore
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Widget {
//!     pub id: Option<i64>,
//!     pub name: String,
//! }
//!
//! impl Model for Widget {
//!     fn model_name() -> &'static str { "Widget" }
//! }
//!
//! let widgets = coordinator.repository::<Widget>();
//! let created = widgets.create(&Widget { id: None, name: "a".into() }).await?;
//! ```

use bson::{Bson, de::deserialize_from_bson, ser::serialize_to_bson};
use serde::{Serialize, de::DeserializeOwned};
use std::marker::PhantomData;

use crate::{
    backend::Backend,
    coordinator::Coordinator,
    error::{StoreError, StoreResult},
    query::{Expr, Query},
    record::{Count, Options, Record, RecordId, WriteResult},
};

/// A serde type stored as records of one model.
pub trait Model: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Name of the model in the property registry.
    fn model_name() -> &'static str;
}

/// Conversions between a [`Model`] and its record form.
pub trait ModelExt: Model {
    fn to_record(&self) -> StoreResult<Record>;
    fn from_record(record: Record) -> StoreResult<Self>;
}

impl<M: Model> ModelExt for M {
    fn to_record(&self) -> StoreResult<Record> {
        match serialize_to_bson(self)? {
            Bson::Document(record) => Ok(record),
            other => Err(StoreError::InvalidRecord(format!(
                "{} serialized to {:?}, expected a document",
                M::model_name(),
                other.element_type()
            ))),
        }
    }

    fn from_record(record: Record) -> StoreResult<Self> {
        Ok(deserialize_from_bson(Bson::Document(record))?)
    }
}

/// Typed view of one model on a [`Coordinator`].
#[derive(Debug)]
pub struct Repository<'a, B: Backend, M: Model> {
    coordinator: &'a Coordinator<B>,
    options: Options,
    _marker: PhantomData<M>,
}

impl<'a, B: Backend, M: Model> Repository<'a, B, M> {
    pub(crate) fn new(coordinator: &'a Coordinator<B>) -> Self {
        Self {
            coordinator,
            options: Options::default(),
            _marker: PhantomData,
        }
    }

    /// Uses `options` for every call made through this repository.
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub async fn create(&self, model: &M) -> StoreResult<WriteResult> {
        self.coordinator
            .create(M::model_name(), model.to_record()?, &self.options)
            .await
    }

    pub async fn save(&self, model: &M) -> StoreResult<Option<String>> {
        self.coordinator
            .save(M::model_name(), model.to_record()?, &self.options)
            .await
    }

    pub async fn find_by_id(&self, id: impl Into<RecordId>) -> StoreResult<M> {
        M::from_record(
            self.coordinator
                .find_by_id(M::model_name(), id, &self.options)
                .await?,
        )
    }

    pub async fn find_all(&self) -> StoreResult<Vec<M>> {
        self.coordinator
            .find_all(M::model_name(), &self.options)
            .await?
            .into_iter()
            .map(M::from_record)
            .collect()
    }

    pub async fn query(&self, query: &Query) -> StoreResult<Vec<M>> {
        self.coordinator
            .all(M::model_name(), query, &self.options)
            .await?
            .into_iter()
            .map(M::from_record)
            .collect()
    }

    /// Merges `patch` into the stored record and returns the result.
    pub async fn update_attributes(&self, id: impl Into<RecordId>, patch: Record) -> StoreResult<M> {
        M::from_record(
            self.coordinator
                .update_attributes(M::model_name(), id, patch, &self.options)
                .await?,
        )
    }

    /// Overwrites the stored record with `model`.
    pub async fn replace(&self, id: impl Into<RecordId>, model: &M) -> StoreResult<M> {
        M::from_record(
            self.coordinator
                .replace_by_id(M::model_name(), id, model.to_record()?, &self.options)
                .await?,
        )
    }

    pub async fn destroy(&self, id: impl Into<RecordId>) -> StoreResult<Count> {
        self.coordinator
            .destroy(M::model_name(), id, &self.options)
            .await
    }

    pub async fn count(&self, filter: Option<&Expr>) -> StoreResult<usize> {
        self.coordinator
            .count(M::model_name(), filter, &self.options)
            .await
    }
}
