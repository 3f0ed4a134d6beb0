//! MongoDB backend family and per-model adapter.
//!
//! Each model maps onto one collection named after it, with the record id
//! stored as `_id`. MongoDB enforces unique keys, fetches many ids in one
//! `$in` query and evaluates predicates itself, so the coordinator emulates
//! none of those for this backend.

use async_trait::async_trait;
use bson::{Document, doc};
use futures::TryStreamExt;
use mongodb::{
    Client, Collection, Database,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{ClientOptions, Credential},
};
use std::sync::Arc;
use tracing::debug;

use storelayer_core::{
    backend::{Adapter, AdapterContext, Backend, Capabilities, KeyedRecord, ModelScope},
    config::ConnectionSettings,
    connection::ConnectionHandle,
    error::{StoreError, StoreResult},
    query::Expr,
    record::{Options, Record, RecordId, WriteResult},
    transcode::Transcoder,
};

use crate::{query::MongoQueryTranslator, sanitizer::KeySanitizer};

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 27017;
const DUPLICATE_KEY: i32 = 11000;

/// A connected MongoDB client bound to one database.
#[derive(Debug, Clone)]
pub struct MongoDbClient {
    client: Client,
    database: Database,
}

impl MongoDbClient {
    pub fn new(client: Client, database: &str) -> Self {
        Self {
            database: client.database(database),
            client,
        }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    fn collection(&self, model: &str) -> Collection<Document> {
        self.database
            .collection(&KeySanitizer::sanitize_key(model))
    }
}

/// Backend family for MongoDB. One collection per model, keyed by `_id`.
///
/// The connection string is taken from the `url` setting, or assembled from
/// `protocol`, `host` and `port` (defaulting to `mongodb://localhost:27017`).
#[derive(Debug, Clone, Default)]
pub struct MongoDbBackend;

impl MongoDbBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Backend for MongoDbBackend {
    type Connection = MongoDbClient;
    type Adapter = MongoDbAdapter;

    fn name(&self) -> &'static str {
        "mongodb"
    }

    fn requires_database(&self) -> bool {
        true
    }

    async fn connect(&self, settings: &ConnectionSettings) -> StoreResult<MongoDbClient> {
        let database = settings
            .database()
            .ok_or_else(|| StoreError::Connection("Database name must be specified".to_string()))?;
        let url = settings.url_or("mongodb", DEFAULT_HOST, DEFAULT_PORT);

        let mut options = ClientOptions::parse(&url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        if let Some(username) = &settings.username {
            options.credential = Some(
                Credential::builder()
                    .username(username.clone())
                    .password(settings.password.clone())
                    .build(),
            );
        }

        let client = Client::with_options(options).map_err(|e| StoreError::Connection(e.to_string()))?;

        Ok(MongoDbClient::new(client, database))
    }

    async fn disconnect(&self, connection: Arc<MongoDbClient>) -> StoreResult<()> {
        connection.client.clone().shutdown().await;

        Ok(())
    }

    fn adapter(&self, context: AdapterContext<Self>) -> MongoDbAdapter {
        MongoDbAdapter {
            scope: context.scope,
            connection: context.connection,
        }
    }
}

/// Per-model gateway to a MongoDB collection.
#[derive(Debug)]
pub struct MongoDbAdapter {
    scope: ModelScope,
    connection: ConnectionHandle<MongoDbBackend>,
}

impl MongoDbAdapter {
    async fn collection(&self) -> StoreResult<Collection<Document>> {
        Ok(self
            .connection
            .get()
            .await?
            .collection(&self.scope.model))
    }

    fn classify(&self, id: &RecordId, err: MongoError) -> StoreError {
        match err.kind.as_ref() {
            ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY => {
                StoreError::conflict(&self.scope.model, id)
            }
            _ => StoreError::backend(err),
        }
    }

    fn keyed(mut document: Document) -> Option<KeyedRecord> {
        let id = document
            .remove("_id")
            .as_ref()
            .and_then(RecordId::from_bson)?;

        Some((id, document))
    }

    async fn find(&self, filter: Document) -> StoreResult<Vec<KeyedRecord>> {
        let documents = self
            .collection()
            .await?
            .find(filter)
            .await
            .map_err(StoreError::backend)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(StoreError::backend)?;

        Ok(documents.into_iter().filter_map(Self::keyed).collect())
    }
}

#[async_trait]
impl Adapter for MongoDbAdapter {
    fn scope(&self) -> &ModelScope {
        &self.scope
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            multi_get: true,
            native_filter: true,
            unique_keys: true,
            revisions: false,
        }
    }

    async fn create_with_id(&self, id: &RecordId, mut data: Record, _options: &Options) -> StoreResult<WriteResult> {
        data.insert("_id", id.to_bson());

        self.collection()
            .await?
            .insert_one(data)
            .await
            .map_err(|err| self.classify(id, err))?;

        Ok(WriteResult::new(id.clone(), None))
    }

    async fn upsert(&self, id: &RecordId, mut data: Record, _options: &Options) -> StoreResult<WriteResult> {
        data.insert("_id", id.to_bson());

        self.collection()
            .await?
            .replace_one(doc! { "_id": id.to_bson() }, data)
            .upsert(true)
            .await
            .map_err(|err| self.classify(id, err))?;

        Ok(WriteResult::new(id.clone(), None))
    }

    async fn delete(&self, id: &RecordId, _options: &Options) -> StoreResult<bool> {
        let result = self
            .collection()
            .await?
            .delete_one(doc! { "_id": id.to_bson() })
            .await
            .map_err(StoreError::backend)?;

        Ok(result.deleted_count > 0)
    }

    async fn get(&self, id: &RecordId, _options: &Options) -> StoreResult<Record> {
        let mut document = self
            .collection()
            .await?
            .find_one(doc! { "_id": id.to_bson() })
            .await
            .map_err(StoreError::backend)?
            .ok_or_else(|| StoreError::not_found(&self.scope.model, id))?;

        document.remove("_id");
        Ok(document)
    }

    async fn list_all(&self, _options: &Options) -> StoreResult<Vec<KeyedRecord>> {
        self.find(doc! {}).await
    }

    async fn list_by_ids(&self, ids: &[RecordId], _options: &Options) -> StoreResult<Vec<KeyedRecord>> {
        let ids = ids.iter().map(RecordId::to_bson).collect::<Vec<_>>();

        self.find(doc! { "_id": { "$in": ids } }).await
    }

    async fn list_by_filter(&self, expr: &Expr, _options: &Options) -> StoreResult<Vec<KeyedRecord>> {
        let filter = MongoQueryTranslator::translate(&self.scope, expr)?;

        debug!(model = %self.scope.model, %filter, "native filter");

        self.find(filter).await
    }

    fn for_db(&self, data: Record) -> StoreResult<Record> {
        let scope = self.scope();
        let data = Transcoder::new(scope.registry.as_ref(), &scope.model, self.native_types()).for_db(data)?;

        Ok(KeySanitizer::sanitize_document(data))
    }

    fn from_db(&self, data: Record) -> StoreResult<Record> {
        let scope = self.scope();
        let data = KeySanitizer::restore_document(data);

        Ok(Transcoder::new(scope.registry.as_ref(), &scope.model, self.native_types()).from_db(data))
    }
}
