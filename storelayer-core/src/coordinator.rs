//! The coordinator: the single entry point of the persistence layer.
//!
//! A [`Coordinator`] owns one backend connection and one [`Adapter`] per
//! model. It turns the generic CRUD/query contract into adapter primitives,
//! emulates whatever the adapter does not support natively, and recomposes
//! backend responses into model-level records.
//!
//! # Example
//!
//! ```ignore
//! use storelayer::{prelude::*, memory::MemoryHashBackend};
//! use bson::doc;
//!
//! let coordinator = Coordinator::builder(MemoryHashBackend::new())
//!     .registry(registry)
//!     .initialize()
//!     .await?;
//!
//! let created = coordinator.create("Widget", doc! { "name": "a" }, &Options::new()).await?;
//! let widget = coordinator.find_by_id("Widget", created.id, &Options::new()).await?;
//! ```
//!
//! # Bulk operations
//!
//! [`update`](Coordinator::update) and [`destroy_all`](Coordinator::destroy_all)
//! read the matching set and then act on each record independently. A
//! record whose write fails is left out of the returned [`Count`] and the
//! failure is otherwise dropped; callers cannot tell which records failed.
//! Nothing is rolled back and concurrent writers between the read and the
//! per-record write are not detected.

use futures::future::join_all;
use mea::rwlock::RwLock;
use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    sync::Arc,
};
use tracing::{debug, trace, warn};

use crate::{
    backend::{Adapter, AdapterContext, Backend, KeyedRecord, ModelScope},
    config::ConnectionSettings,
    connection::{ConnectionHandle, ConnectionManager},
    error::{StoreError, StoreResult},
    filter::{DocumentEvaluator, PredicateEvaluator},
    id::{IdGenerator, RandomIdGenerator},
    query::{Expr, Query},
    record::{Count, Options, Record, RecordId, WriteResult},
    repository::{Model, Repository},
    schema::{ModelRegistry, PropertyRegistry},
};

/// Coordinates one backend connection and its per-model adapters.
pub struct Coordinator<B: Backend> {
    backend: Arc<B>,
    connection: Arc<ConnectionManager<B>>,
    registry: Arc<dyn PropertyRegistry>,
    evaluator: Arc<dyn PredicateEvaluator>,
    ids: Arc<dyn IdGenerator>,
    adapters: RwLock<HashMap<String, Arc<B::Adapter>>>,
}

impl<B: Backend> Coordinator<B> {
    pub fn builder(backend: B) -> CoordinatorBuilder<B> {
        CoordinatorBuilder::new(backend)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn registry(&self) -> &dyn PropertyRegistry {
        self.registry.as_ref()
    }

    /// Returns a typed repository for `M`.
    pub fn repository<M: Model>(&self) -> Repository<'_, B, M> {
        Repository::new(self)
    }

    /// Returns the pending or established connection, starting one if needed.
    pub async fn connect(&self) -> StoreResult<Arc<B::Connection>> {
        self.connection.connect().await
    }

    /// Releases the connection. A no-op when already disconnected.
    pub async fn disconnect(&self) -> StoreResult<()> {
        self.connection.disconnect().await
    }

    pub async fn is_connected(&self) -> bool {
        self.connection.is_connected().await
    }

    /// Returns the adapter for `model`, creating it on first access.
    pub async fn adapter(&self, model: &str) -> Arc<B::Adapter> {
        if let Some(adapter) = self.adapters.read().await.get(model) {
            return adapter.clone();
        }

        let mut adapters = self.adapters.write().await;

        adapters
            .entry(model.to_string())
            .or_insert_with(|| {
                debug!(backend = self.backend.name(), model, "creating adapter");

                Arc::new(self.backend.adapter(AdapterContext {
                    scope: ModelScope::new(model, self.registry.clone(), self.ids.clone()),
                    connection: ConnectionHandle::new(self.connection.clone()),
                }))
            })
            .clone()
    }

    fn encode(adapter: &B::Adapter, data: Record) -> StoreResult<Record> {
        adapter.for_db(adapter.scope().strip_id(data))
    }

    fn decode(adapter: &B::Adapter, (id, data): KeyedRecord) -> StoreResult<Record> {
        let scope = adapter.scope();
        let id = scope.coerce_id(id)?;
        let record = adapter.from_db(data)?;

        Ok(scope.hydrate(&id, record))
    }

    /// Decodes listed records, skipping those whose key does not fit the
    /// model's id kind.
    fn decode_all(adapter: &B::Adapter, records: Vec<KeyedRecord>) -> StoreResult<Vec<Record>> {
        let scope = adapter.scope();
        let mut decoded = Vec::with_capacity(records.len());

        for (id, data) in records {
            let id = match scope.coerce_id(id.clone()) {
                Ok(id) => id,
                Err(err) => {
                    warn!(model = %scope.model, id = %id, error = %err, "listing skipped record");
                    continue;
                }
            };

            decoded.push(scope.hydrate(&id, adapter.from_db(data)?));
        }

        Ok(decoded)
    }

    /// Creates a record.
    ///
    /// Without an identifier in `data` one is generated. With one, the
    /// create fails with [`StoreError::Conflict`] if that id already exists:
    /// adapters enforcing unique keys report it themselves, for the others
    /// the coordinator checks for an existing record first.
    pub async fn create(&self, model: &str, data: Record, options: &Options) -> StoreResult<WriteResult> {
        let adapter = self.adapter(model).await;
        let scope = adapter.scope();
        let id = scope
            .id_of(&data)
            .map(|id| scope.coerce_id(id))
            .transpose()?;
        let payload = Self::encode(&adapter, data)?;

        let result = match id {
            None => adapter.create_without_id(payload, options).await?,
            Some(id) => {
                if !adapter.capabilities().unique_keys && adapter.exists(&id, options).await? {
                    return Err(StoreError::conflict(model, &id));
                }

                adapter.create_with_id(&id, payload, options).await?
            }
        };

        Ok(WriteResult::new(scope.coerce_id(result.id)?, result.revision))
    }

    /// Upserts a record by its identifier and returns the new revision, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidRecord`] when `data` carries no identifier.
    pub async fn save(&self, model: &str, data: Record, options: &Options) -> StoreResult<Option<String>> {
        let adapter = self.adapter(model).await;
        let scope = adapter.scope();
        let id = scope
            .id_of(&data)
            .ok_or_else(|| StoreError::InvalidRecord(format!("Cannot save a {model} without {}", scope.id_name)))?;
        let id = scope.coerce_id(id)?;

        let payload = Self::encode(&adapter, data)?;

        Ok(adapter.upsert(&id, payload, options).await?.revision)
    }

    /// Deletes a record; a missing record yields a count of 0.
    pub async fn destroy(&self, model: &str, id: impl Into<RecordId>, options: &Options) -> StoreResult<Count> {
        let adapter = self.adapter(model).await;
        let id = adapter.scope().coerce_id(id.into())?;

        Ok(Count::new(adapter.delete(&id, options).await? as usize))
    }

    /// Returns `true` if a record with `id` exists.
    pub async fn exists(&self, model: &str, id: impl Into<RecordId>, options: &Options) -> StoreResult<bool> {
        let adapter = self.adapter(model).await;
        let id = adapter.scope().coerce_id(id.into())?;

        adapter.exists(&id, options).await
    }

    /// Reads one record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no record has this identifier.
    pub async fn find_by_id(&self, model: &str, id: impl Into<RecordId>, options: &Options) -> StoreResult<Record> {
        let adapter = self.adapter(model).await;
        let id = adapter.scope().coerce_id(id.into())?;
        let data = adapter.get(&id, options).await?;

        Self::decode(&adapter, (id, data))
    }

    /// Alias of [`find_by_id`](Self::find_by_id).
    pub async fn find(&self, model: &str, id: impl Into<RecordId>, options: &Options) -> StoreResult<Record> {
        self.find_by_id(model, id, options).await
    }

    /// Reads the records with the given identifiers.
    ///
    /// Order is not guaranteed. Identifiers that do not resolve are dropped
    /// from the result without an error.
    pub async fn find_by_ids(&self, model: &str, ids: Vec<RecordId>, options: &Options) -> StoreResult<Vec<Record>> {
        let adapter = self.adapter(model).await;
        let scope = adapter.scope();
        let ids = ids
            .into_iter()
            .filter_map(|id| scope.coerce_id(id).ok())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();

        if adapter.capabilities().multi_get {
            let records = adapter.list_by_ids(&ids, options).await?;
            return Self::decode_all(&adapter, records);
        }

        let lookups = ids
            .into_iter()
            .map(|id| self.find_by_id(model, id, options));

        Ok(join_all(lookups)
            .await
            .into_iter()
            .filter_map(Result::ok)
            .collect())
    }

    /// Reads every record of a model.
    pub async fn find_all(&self, model: &str, options: &Options) -> StoreResult<Vec<Record>> {
        let adapter = self.adapter(model).await;
        let records = adapter.list_all(options).await?;

        Self::decode_all(&adapter, records)
    }

    /// Reads the records matching `filter`; `None` matches everything.
    ///
    /// Adapters with native filtering evaluate the predicate themselves;
    /// otherwise every record is read and filtered in memory.
    pub async fn find_by_filters(&self, model: &str, filter: Option<&Expr>, options: &Options) -> StoreResult<Vec<Record>> {
        let Some(filter) = filter else {
            return self.find_all(model, options).await;
        };

        let adapter = self.adapter(model).await;

        if adapter.capabilities().native_filter {
            let records = adapter.list_by_filter(filter, options).await?;
            return Self::decode_all(&adapter, records);
        }

        let records = self.find_all(model, options).await?;
        self.evaluator.apply(records, filter)
    }

    /// Resolves a `where` predicate, taking the id fast path when it only
    /// pins the identifier field.
    async fn resolve(&self, model: &str, filter: Option<&Expr>, options: &Options) -> StoreResult<Vec<Record>> {
        let id_name = self.registry.id_name(model);
        let id_kind = self.registry.id_kind(model);

        match filter.and_then(|expr| expr.constrained_ids(&id_name, id_kind)) {
            Some(ids) => {
                trace!(model, count = ids.len(), "resolving by ids");
                self.find_by_ids(model, ids.into_iter().collect(), options).await
            }
            None => self.find_by_filters(model, filter, options).await,
        }
    }

    /// Runs a full query: `where` resolution, then sort, offset and limit.
    pub async fn all(&self, model: &str, query: &Query, options: &Options) -> StoreResult<Vec<Record>> {
        let records = self.resolve(model, query.filter.as_ref(), options).await?;

        if query.has_window() {
            return Ok(self.evaluator.apply_window(records, query));
        }

        Ok(records)
    }

    /// Upserts `data` and returns it as a later read would.
    async fn write(adapter: &B::Adapter, id: &RecordId, data: Record, options: &Options) -> StoreResult<Record> {
        let payload = Self::encode(adapter, data)?;
        adapter.upsert(id, payload.clone(), options).await?;

        Self::decode(adapter, (id.clone(), payload))
    }

    fn merge(scope: &ModelScope, mut base: Record, patch: Record) -> Record {
        for (field, value) in patch {
            if field != scope.id_name {
                base.insert(field, value);
            }
        }

        base
    }

    /// Reads a record, merges `data` over it and writes it back.
    ///
    /// Not atomic with concurrent writers.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the record does not exist.
    pub async fn update_attributes(&self, model: &str, id: impl Into<RecordId>, data: Record, options: &Options) -> StoreResult<Record> {
        let adapter = self.adapter(model).await;
        let scope = adapter.scope();
        let id = scope.coerce_id(id.into())?;

        let current = self.find_by_id(model, id.clone(), options).await?;
        let merged = Self::merge(scope, current, data);

        Self::write(&adapter, &id, merged, options).await
    }

    /// Overwrites an existing record with `data`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the record does not exist.
    pub async fn replace_by_id(&self, model: &str, id: impl Into<RecordId>, data: Record, options: &Options) -> StoreResult<Record> {
        let adapter = self.adapter(model).await;
        let scope = adapter.scope();
        let id = scope.coerce_id(id.into())?;

        self.find_by_id(model, id.clone(), options).await?;

        Self::write(&adapter, &id, data, options).await
    }

    /// Merges `patch` into every record matching `filter`.
    ///
    /// Returns how many records were written. Failed writes are excluded
    /// from the count and otherwise dropped.
    pub async fn update(&self, model: &str, filter: Option<&Expr>, patch: Record, options: &Options) -> StoreResult<Count> {
        let adapter = self.adapter(model).await;
        let scope = adapter.scope();
        let records = self.resolve(model, filter, options).await?;

        let writes = records.into_iter().filter_map(|record| {
            let id = scope.id_of(&record)?;
            let merged = Self::merge(scope, record, patch.clone());
            let adapter = &adapter;

            Some(async move {
                let result = Self::write(adapter, &id, merged, options).await;

                if let Err(err) = &result {
                    warn!(model = %scope.model, id = %id, error = %err, "bulk update skipped record");
                }

                result.is_ok()
            })
        });

        Ok(Count::new(
            join_all(writes)
                .await
                .into_iter()
                .filter(|written| *written)
                .count(),
        ))
    }

    /// Deletes every record matching `filter`.
    ///
    /// Returns how many records were deleted. Failed deletes are excluded
    /// from the count and otherwise dropped.
    pub async fn destroy_all(&self, model: &str, filter: Option<&Expr>, options: &Options) -> StoreResult<Count> {
        let adapter = self.adapter(model).await;
        let scope = adapter.scope();
        let records = self.resolve(model, filter, options).await?;

        let deletes = records.iter().filter_map(|record| {
            let id = scope.id_of(record)?;
            let adapter = &adapter;

            Some(async move {
                match adapter.delete(&id, options).await {
                    Ok(deleted) => deleted,
                    Err(err) => {
                        warn!(model = %scope.model, id = %id, error = %err, "bulk destroy skipped record");
                        false
                    }
                }
            })
        });

        Ok(Count::new(
            join_all(deletes)
                .await
                .into_iter()
                .filter(|deleted| *deleted)
                .count(),
        ))
    }

    /// Counts the records matching `filter` by resolving them.
    pub async fn count(&self, model: &str, filter: Option<&Expr>, options: &Options) -> StoreResult<usize> {
        Ok(self.resolve(model, filter, options).await?.len())
    }
}

impl<B: Backend> fmt::Debug for Coordinator<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("backend", &self.backend)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Coordinator`].
///
/// Defaults: empty [`ModelRegistry`], [`DocumentEvaluator`],
/// [`RandomIdGenerator`] and default [`ConnectionSettings`].
pub struct CoordinatorBuilder<B: Backend> {
    backend: B,
    settings: ConnectionSettings,
    registry: Arc<dyn PropertyRegistry>,
    evaluator: Arc<dyn PredicateEvaluator>,
    ids: Arc<dyn IdGenerator>,
}

impl<B: Backend> CoordinatorBuilder<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            settings: ConnectionSettings::default(),
            registry: Arc::new(ModelRegistry::new()),
            evaluator: Arc::new(DocumentEvaluator),
            ids: Arc::new(RandomIdGenerator),
        }
    }

    pub fn settings(mut self, settings: ConnectionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn registry(mut self, registry: impl PropertyRegistry + 'static) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn evaluator(mut self, evaluator: impl PredicateEvaluator + 'static) -> Self {
        self.evaluator = Arc::new(evaluator);
        self
    }

    pub fn id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Arc::new(ids);
        self
    }

    /// Builds the coordinator without connecting.
    pub fn build(self) -> Coordinator<B> {
        let backend = Arc::new(self.backend);

        Coordinator {
            connection: Arc::new(ConnectionManager::new(backend.clone(), self.settings)),
            backend,
            registry: self.registry,
            evaluator: self.evaluator,
            ids: self.ids,
            adapters: RwLock::new(HashMap::new()),
        }
    }

    /// Builds the coordinator and establishes its connection.
    pub async fn initialize(self) -> StoreResult<Coordinator<B>> {
        let coordinator = self.build();
        coordinator.connect().await?;

        Ok(coordinator)
    }
}
