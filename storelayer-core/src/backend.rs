//! Storage backend abstraction.
//!
//! Two traits split the work between a backend family and its per-model
//! gateways:
//!
//! - [`Backend`] describes one family of storage engines: how to open and
//!   close a connection and how to build an [`Adapter`] for a model.
//! - [`Adapter`] performs the primitive operations for one model against
//!   one concrete backend and transcodes records between the model-level and
//!   the backend representation.
//!
//! Adapters declare which optional primitives they support through
//! [`Capabilities`]; the [`Coordinator`](crate::coordinator::Coordinator)
//! branches on that declaration and emulates whatever is missing.
//!
//! # Implementing a backend
//!
//! ```ignore
//! #[async_trait]
//! impl Backend for MyBackend {
//!     type Connection = MyClient;
//!     type Adapter = MyAdapter;
//!
//!     fn name(&self) -> &'static str { "my-backend" }
//!     fn requires_database(&self) -> bool { true }
//!
//!     async fn connect(&self, settings: &ConnectionSettings) -> StoreResult<MyClient> { /* ... */ }
//!     async fn disconnect(&self, client: Arc<MyClient>) -> StoreResult<()> { /* ... */ }
//!
//!     fn adapter(&self, context: AdapterContext<Self>) -> MyAdapter {
//!         MyAdapter::new(context)
//!     }
//! }
//! ```

use async_trait::async_trait;
use bson::Bson;
use std::{fmt::Debug, sync::Arc};

use crate::{
    config::ConnectionSettings,
    connection::ConnectionHandle,
    error::{StoreError, StoreResult},
    id::IdGenerator,
    query::Expr,
    record::{Options, Record, RecordId, WriteResult},
    schema::{PropertyKind, PropertyRegistry},
    transcode::{NativeTypes, Transcoder},
};

/// A record as returned by list primitives: its key plus backend payload.
pub type KeyedRecord = (RecordId, Record);

/// Optional primitives and guarantees an adapter declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// [`Adapter::list_by_ids`] is implemented natively.
    pub multi_get: bool,
    /// [`Adapter::list_by_filter`] is implemented natively.
    pub native_filter: bool,
    /// The backend rejects a create on an existing key with
    /// [`StoreError::Conflict`]. Without it the coordinator checks with
    /// [`Adapter::exists`] first.
    pub unique_keys: bool,
    /// Writes hand back revision tokens.
    pub revisions: bool,
}

/// Everything the coordinator knows about one model, shared with its adapter.
#[derive(Debug, Clone)]
pub struct ModelScope {
    pub model: String,
    pub id_name: String,
    pub id_kind: PropertyKind,
    pub registry: Arc<dyn PropertyRegistry>,
    pub ids: Arc<dyn IdGenerator>,
}

impl ModelScope {
    pub fn new(model: &str, registry: Arc<dyn PropertyRegistry>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            model: model.to_string(),
            id_name: registry.id_name(model),
            id_kind: registry.id_kind(model),
            registry,
            ids,
        }
    }

    /// Returns a fresh identifier of the model's id kind.
    pub fn generate_id(&self) -> RecordId {
        self.ids.generate(self.id_kind)
    }

    /// Coerces a backend key to the model's id kind.
    pub fn coerce_id(&self, id: RecordId) -> StoreResult<RecordId> {
        id.coerce(self.id_kind)
    }

    /// Finishes a decoded record for the caller: re-injects the identifier
    /// and surfaces declared-but-absent properties as null.
    pub fn hydrate(&self, id: &RecordId, mut record: Record) -> Record {
        for property in self.registry.properties(&self.model) {
            if !record.contains_key(&property) {
                record.insert(property, Bson::Null);
            }
        }

        record.insert(self.id_name.clone(), id.to_bson());
        record
    }

    /// Drops the identifier field from a record about to be written.
    pub fn strip_id(&self, mut record: Record) -> Record {
        record.remove(&self.id_name);
        record
    }

    /// Reads the identifier field of a record, if it carries one.
    pub fn id_of(&self, record: &Record) -> Option<RecordId> {
        record
            .get(&self.id_name)
            .and_then(RecordId::from_bson)
    }
}

/// Construction context handed to [`Backend::adapter`].
pub struct AdapterContext<B: Backend> {
    pub scope: ModelScope,
    pub connection: ConnectionHandle<B>,
}

impl<B: Backend> Debug for AdapterContext<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterContext")
            .field("scope", &self.scope)
            .field("connection", &self.connection)
            .finish()
    }
}

/// A family of storage engines.
#[async_trait]
pub trait Backend: Send + Sync + Debug + Sized + 'static {
    /// Live link to the storage engine, shared by every adapter.
    type Connection: Send + Sync + 'static;
    /// Per-model gateway type.
    type Adapter: Adapter + 'static;

    /// Short name used in logs and error messages.
    fn name(&self) -> &'static str;

    /// Whether connecting requires a named database or namespace.
    fn requires_database(&self) -> bool;

    /// Establishes a connection.
    async fn connect(&self, settings: &ConnectionSettings) -> StoreResult<Self::Connection>;

    /// Releases a connection.
    async fn disconnect(&self, connection: Arc<Self::Connection>) -> StoreResult<()>;

    /// Builds the adapter for one model.
    fn adapter(&self, context: AdapterContext<Self>) -> Self::Adapter;
}

/// Per-model gateway to one backend.
///
/// Records passed to write primitives are already in the backend shape
/// (identifier stripped, [`for_db`](Adapter::for_db) applied). Records
/// returned by read primitives are in the backend shape too; the coordinator
/// runs [`from_db`](Adapter::from_db) on them.
///
/// Every primitive must report a missing record as [`StoreError::NotFound`].
#[async_trait]
pub trait Adapter: Send + Sync + Debug {
    /// The model this adapter serves.
    fn scope(&self) -> &ModelScope;

    fn capabilities(&self) -> Capabilities;

    /// Value types the backend stores natively.
    fn native_types(&self) -> NativeTypes {
        NativeTypes::DOCUMENT
    }

    /// Stores a new record under `id`.
    ///
    /// Adapters declaring [`Capabilities::unique_keys`] must fail with
    /// [`StoreError::Conflict`] when `id` exists; the others may assume the
    /// coordinator already checked.
    async fn create_with_id(&self, id: &RecordId, data: Record, options: &Options) -> StoreResult<WriteResult>;

    /// Stores a new record under a fresh identifier.
    async fn create_without_id(&self, data: Record, options: &Options) -> StoreResult<WriteResult> {
        let id = self.scope().generate_id();
        self.create_with_id(&id, data, options).await
    }

    /// Overwrites (or creates) the record stored under `id`.
    async fn upsert(&self, id: &RecordId, data: Record, options: &Options) -> StoreResult<WriteResult>;

    /// Deletes the record stored under `id`; `Ok(false)` when there was none.
    async fn delete(&self, id: &RecordId, options: &Options) -> StoreResult<bool>;

    /// Reads the record stored under `id`.
    async fn get(&self, id: &RecordId, options: &Options) -> StoreResult<Record>;

    /// Lists every record of the model.
    async fn list_all(&self, options: &Options) -> StoreResult<Vec<KeyedRecord>>;

    /// Lists the records stored under `ids`, skipping missing ones.
    ///
    /// Only called when [`Capabilities::multi_get`] is declared.
    async fn list_by_ids(&self, _ids: &[RecordId], _options: &Options) -> StoreResult<Vec<KeyedRecord>> {
        Err(StoreError::Unsupported(format!("list_by_ids on {}", self.scope().model)))
    }

    /// Lists the records whose model-level form matches `expr`.
    ///
    /// Only called when [`Capabilities::native_filter`] is declared.
    async fn list_by_filter(&self, _expr: &Expr, _options: &Options) -> StoreResult<Vec<KeyedRecord>> {
        Err(StoreError::Unsupported(format!("list_by_filter on {}", self.scope().model)))
    }

    /// Existence check: `get` with not-found mapped to `false`.
    async fn exists(&self, id: &RecordId, options: &Options) -> StoreResult<bool> {
        match self.get(id, options).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Converts a model-level payload to the backend representation.
    fn for_db(&self, data: Record) -> StoreResult<Record> {
        let scope = self.scope();
        Transcoder::new(scope.registry.as_ref(), &scope.model, self.native_types()).for_db(data)
    }

    /// Converts a backend payload to the model-level representation.
    fn from_db(&self, data: Record) -> StoreResult<Record> {
        let scope = self.scope();
        Ok(Transcoder::new(scope.registry.as_ref(), &scope.model, self.native_types()).from_db(data))
    }
}
