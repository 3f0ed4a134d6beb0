//! Document-store family: a revisioned key/document engine in the style of CouchDB.
//!
//! Every record is stored as a JSON-like document under `Model:id`. The
//! engine enforces unique keys itself: writing to an existing key requires
//! the current revision token, and a create without one is answered with a
//! 409. Reads hand back the bookkeeping fields `_id` and `_rev`, which the
//! adapter strips before records reach the model layer.

use async_trait::async_trait;
use bson::Document;
use std::{collections::BTreeMap, sync::Arc};
use tracing::debug;
use uuid::Uuid;

use storelayer_core::{
    backend::{Adapter, AdapterContext, Backend, Capabilities, KeyedRecord, ModelScope},
    config::ConnectionSettings,
    connection::ConnectionHandle,
    error::{StoreError, StoreResult},
    record::{Options, Record, RecordId, WriteResult},
    transcode::Transcoder,
};

use crate::server::{MemoryServer, Session};

const ID_FIELD: &str = "_id";
const REV_FIELD: &str = "_rev";

/// One document database: key to stored document, ordered by key.
#[derive(Debug, Default)]
pub struct DocumentDatabase {
    documents: BTreeMap<String, Document>,
}

impl DocumentDatabase {
    fn current_rev(&self, key: &str) -> Option<String> {
        self.documents
            .get(key)
            .and_then(|doc| doc.get_str(REV_FIELD).ok())
            .map(str::to_string)
    }

    fn next_rev(current: Option<&str>) -> String {
        let generation = current
            .and_then(|rev| rev.split('-').next())
            .and_then(|n| n.parse::<u64>().ok())
            .unwrap_or(0);

        format!("{}-{}", generation + 1, Uuid::new_v4().simple())
    }

    /// Writes `document` under `key`. `rev` must match the stored revision
    /// when the key exists.
    fn insert(&mut self, key: &str, mut document: Document, rev: Option<&str>) -> StoreResult<String> {
        let current = self.current_rev(key);

        if current.as_deref() != rev && (current.is_some() || rev.is_some()) {
            return Err(StoreError::backend_with_status(409, format!("Document update conflict on {key}")));
        }

        let rev = Self::next_rev(current.as_deref());

        document.insert(ID_FIELD, key);
        document.insert(REV_FIELD, rev.clone());
        self.documents.insert(key.to_string(), document);

        Ok(rev)
    }

    fn destroy(&mut self, key: &str, rev: &str) -> StoreResult<()> {
        match self.current_rev(key) {
            None => Err(StoreError::backend_with_status(404, format!("Missing document {key}"))),
            Some(current) if current != rev => {
                Err(StoreError::backend_with_status(409, format!("Document update conflict on {key}")))
            }
            Some(_) => {
                self.documents.remove(key);
                Ok(())
            }
        }
    }

    fn list(&self, prefix: &str) -> Vec<(String, Document)> {
        self.documents
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, doc)| (key.clone(), doc.clone()))
            .collect()
    }
}

/// Shared state of an in-memory document server.
pub type DocumentServer = MemoryServer<DocumentDatabase>;

/// Session on one document database.
pub type DocumentClient = Session<DocumentDatabase>;

/// Backend family for the in-memory document store. Requires a database name.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentBackend {
    server: DocumentServer,
}

impl MemoryDocumentBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects to an existing server instead of a private one.
    pub fn with_server(server: DocumentServer) -> Self {
        Self { server }
    }

    pub fn server(&self) -> &DocumentServer {
        &self.server
    }
}

#[async_trait]
impl Backend for MemoryDocumentBackend {
    type Connection = DocumentClient;
    type Adapter = MemoryDocumentAdapter;

    fn name(&self) -> &'static str {
        "memory-document"
    }

    fn requires_database(&self) -> bool {
        true
    }

    async fn connect(&self, settings: &ConnectionSettings) -> StoreResult<DocumentClient> {
        let database = settings
            .database()
            .ok_or_else(|| StoreError::Connection("Database name must be specified".to_string()))?;

        self.server.open(database).await
    }

    async fn disconnect(&self, connection: Arc<DocumentClient>) -> StoreResult<()> {
        connection.close();
        Ok(())
    }

    fn adapter(&self, context: AdapterContext<Self>) -> MemoryDocumentAdapter {
        MemoryDocumentAdapter {
            scope: context.scope,
            connection: context.connection,
        }
    }
}

/// Per-model gateway to the in-memory document store.
#[derive(Debug)]
pub struct MemoryDocumentAdapter {
    scope: ModelScope,
    connection: ConnectionHandle<MemoryDocumentBackend>,
}

impl MemoryDocumentAdapter {
    fn key(&self, id: &RecordId) -> String {
        format!("{}:{}", self.scope.model, id)
    }

    fn classify(&self, id: &RecordId, err: StoreError) -> StoreError {
        match err.status_code() {
            404 => StoreError::not_found(&self.scope.model, id),
            409 => StoreError::conflict(&self.scope.model, id),
            _ => err,
        }
    }

    /// Revision to write against: the `rev` option, else the stored one.
    async fn revision(&self, id: &RecordId, options: &Options) -> StoreResult<Option<String>> {
        if let Some(rev) = options.get_str("rev") {
            return Ok(Some(rev.to_string()));
        }

        let key = self.key(id);

        self.connection
            .get()
            .await?
            .read(|db| db.current_rev(&key))
            .await
    }

    fn strip_bookkeeping(mut data: Record) -> Record {
        data.remove(ID_FIELD);
        data.remove(REV_FIELD);
        data
    }
}

#[async_trait]
impl Adapter for MemoryDocumentAdapter {
    fn scope(&self) -> &ModelScope {
        &self.scope
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            unique_keys: true,
            revisions: true,
            ..Capabilities::default()
        }
    }

    async fn create_with_id(&self, id: &RecordId, data: Record, _options: &Options) -> StoreResult<WriteResult> {
        let key = self.key(id);

        let rev = self
            .connection
            .get()
            .await?
            .write(|db| db.insert(&key, data, None))
            .await?
            .map_err(|err| self.classify(id, err))?;

        Ok(WriteResult::new(id.clone(), Some(rev)))
    }

    async fn upsert(&self, id: &RecordId, data: Record, options: &Options) -> StoreResult<WriteResult> {
        let key = self.key(id);
        let rev = self.revision(id, options).await?;

        let rev = self
            .connection
            .get()
            .await?
            .write(|db| db.insert(&key, data, rev.as_deref()))
            .await?
            .map_err(|err| self.classify(id, err))?;

        Ok(WriteResult::new(id.clone(), Some(rev)))
    }

    async fn delete(&self, id: &RecordId, options: &Options) -> StoreResult<bool> {
        let Some(rev) = self.revision(id, options).await? else {
            return Ok(false);
        };
        let key = self.key(id);

        match self
            .connection
            .get()
            .await?
            .write(|db| db.destroy(&key, &rev))
            .await?
        {
            Ok(()) => Ok(true),
            Err(err) if err.status_code() == 404 => Ok(false),
            Err(err) => Err(self.classify(id, err)),
        }
    }

    async fn get(&self, id: &RecordId, _options: &Options) -> StoreResult<Record> {
        let key = self.key(id);

        self.connection
            .get()
            .await?
            .read(|db| db.documents.get(&key).cloned())
            .await?
            .ok_or_else(|| StoreError::not_found(&self.scope.model, id))
    }

    async fn list_all(&self, _options: &Options) -> StoreResult<Vec<KeyedRecord>> {
        let prefix = format!("{}:", self.scope.model);
        let rows = self
            .connection
            .get()
            .await?
            .read(|db| db.list(&prefix))
            .await?;

        debug!(model = %self.scope.model, rows = rows.len(), "listed documents");

        Ok(rows
            .into_iter()
            .map(|(key, doc)| (RecordId::Text(key[prefix.len()..].to_string()), doc))
            .collect())
    }

    fn for_db(&self, data: Record) -> StoreResult<Record> {
        let scope = self.scope();
        let data = Self::strip_bookkeeping(data);

        Transcoder::new(scope.registry.as_ref(), &scope.model, self.native_types())
            .for_db(data)
    }

    fn from_db(&self, data: Record) -> StoreResult<Record> {
        let scope = self.scope();
        let data = Self::strip_bookkeeping(data);

        Ok(Transcoder::new(scope.registry.as_ref(), &scope.model, self.native_types())
            .from_db(data))
    }
}
