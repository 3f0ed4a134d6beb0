//! Ordered key/value family in the style of LevelDB.
//!
//! Records are stored as documents under `Model:id` in one sorted keyspace.
//! Each stored document carries a `_type` tag naming its model so that range
//! scans can skip foreign keys that happen to share a prefix. The engine
//! supports batched reads and filtered scans, which the adapter exposes as
//! native multi-get and native filtering.

use async_trait::async_trait;
use bson::Document;
use std::{collections::BTreeMap, sync::Arc};
use tracing::{debug, warn};

use storelayer_core::{
    backend::{Adapter, AdapterContext, Backend, Capabilities, KeyedRecord, ModelScope},
    config::ConnectionSettings,
    connection::ConnectionHandle,
    error::{StoreError, StoreResult},
    filter::DocumentEvaluator,
    query::Expr,
    record::{Options, Record, RecordId, WriteResult},
    transcode::Transcoder,
};

use crate::server::{MemoryServer, Session};

const TYPE_FIELD: &str = "_type";

/// One sorted keyspace.
#[derive(Debug, Default)]
pub struct LogDatabase {
    entries: BTreeMap<String, Document>,
}

impl LogDatabase {
    pub fn put(&mut self, key: &str, value: Document) {
        self.entries.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<Document> {
        self.entries.get(key).cloned()
    }

    pub fn del(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Reads several keys at once; missing keys are skipped.
    pub fn get_many<'k>(&self, keys: impl IntoIterator<Item = &'k str>) -> Vec<(String, Document)> {
        keys.into_iter()
            .filter_map(|key| self.get(key).map(|value| (key.to_string(), value)))
            .collect()
    }

    /// Entries whose key starts with `prefix`, in key order.
    pub fn range(&self, prefix: &str) -> Vec<(String, Document)> {
        self.entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

pub type LogServer = MemoryServer<LogDatabase>;
pub type LogClient = Session<LogDatabase>;

/// Backend family for the in-memory ordered store. Requires a database name.
#[derive(Debug, Clone, Default)]
pub struct MemoryLogBackend {
    server: LogServer,
}

impl MemoryLogBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server(server: LogServer) -> Self {
        Self { server }
    }

    pub fn server(&self) -> &LogServer {
        &self.server
    }
}

#[async_trait]
impl Backend for MemoryLogBackend {
    type Connection = LogClient;
    type Adapter = MemoryLogAdapter;

    fn name(&self) -> &'static str {
        "memory-log"
    }

    fn requires_database(&self) -> bool {
        true
    }

    async fn connect(&self, settings: &ConnectionSettings) -> StoreResult<LogClient> {
        let database = settings
            .database()
            .ok_or_else(|| StoreError::Connection("Database name must be specified".to_string()))?;

        self.server.open(database).await
    }

    async fn disconnect(&self, connection: Arc<LogClient>) -> StoreResult<()> {
        connection.close();
        Ok(())
    }

    fn adapter(&self, context: AdapterContext<Self>) -> MemoryLogAdapter {
        MemoryLogAdapter {
            scope: context.scope,
            connection: context.connection,
        }
    }
}

#[derive(Debug)]
pub struct MemoryLogAdapter {
    scope: ModelScope,
    connection: ConnectionHandle<MemoryLogBackend>,
}

impl MemoryLogAdapter {
    fn prefix(&self) -> String {
        format!("{}:", self.scope.model)
    }

    fn key(&self, id: &RecordId) -> String {
        format!("{}{}", self.prefix(), id)
    }

    fn keyed(&self, rows: Vec<(String, Document)>) -> Vec<KeyedRecord> {
        let prefix = self.prefix();

        rows.into_iter()
            .filter(|(_, value)| value.get_str(TYPE_FIELD).ok() == Some(self.scope.model.as_str()))
            .map(|(key, value)| (RecordId::Text(key[prefix.len()..].to_string()), value))
            .collect()
    }

    fn transcoder(&self) -> Transcoder<'_> {
        Transcoder::new(self.scope.registry.as_ref(), &self.scope.model, self.native_types())
    }
}

#[async_trait]
impl Adapter for MemoryLogAdapter {
    fn scope(&self) -> &ModelScope {
        &self.scope
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            multi_get: true,
            native_filter: true,
            ..Capabilities::default()
        }
    }

    async fn create_with_id(&self, id: &RecordId, data: Record, _options: &Options) -> StoreResult<WriteResult> {
        let key = self.key(id);

        self.connection
            .get()
            .await?
            .write(|db| db.put(&key, data))
            .await?;

        Ok(WriteResult::new(id.clone(), None))
    }

    async fn upsert(&self, id: &RecordId, data: Record, options: &Options) -> StoreResult<WriteResult> {
        self.create_with_id(id, data, options).await
    }

    async fn delete(&self, id: &RecordId, _options: &Options) -> StoreResult<bool> {
        let key = self.key(id);
        let client = self.connection.get().await?;

        if client.read(|db| db.get(&key)).await?.is_none() {
            return Ok(false);
        }

        client.write(|db| db.del(&key)).await
    }

    async fn get(&self, id: &RecordId, _options: &Options) -> StoreResult<Record> {
        let key = self.key(id);

        self.connection
            .get()
            .await?
            .read(|db| db.get(&key))
            .await?
            .ok_or_else(|| StoreError::not_found(&self.scope.model, id))
    }

    async fn list_all(&self, _options: &Options) -> StoreResult<Vec<KeyedRecord>> {
        let prefix = self.prefix();
        let rows = self
            .connection
            .get()
            .await?
            .read(|db| db.range(&prefix))
            .await?;

        Ok(self.keyed(rows))
    }

    async fn list_by_ids(&self, ids: &[RecordId], _options: &Options) -> StoreResult<Vec<KeyedRecord>> {
        let keys = ids.iter().map(|id| self.key(id)).collect::<Vec<_>>();
        let rows = self
            .connection
            .get()
            .await?
            .read(|db| db.get_many(keys.iter().map(String::as_str)))
            .await?;

        Ok(self.keyed(rows))
    }

    async fn list_by_filter(&self, expr: &Expr, options: &Options) -> StoreResult<Vec<KeyedRecord>> {
        let mut matched = Vec::new();

        for (id, value) in self.list_all(options).await? {
            let Ok(key) = self.scope.coerce_id(id.clone()) else {
                warn!(model = %self.scope.model, id = %id, "filtered scan skipped record");
                continue;
            };
            let candidate = self.scope.hydrate(&key, self.from_db(value.clone())?);

            if DocumentEvaluator::matches(&candidate, expr)? {
                matched.push((id, value));
            }
        }

        debug!(model = %self.scope.model, matched = matched.len(), "filtered scan");

        Ok(matched)
    }

    fn for_db(&self, data: Record) -> StoreResult<Record> {
        let mut data = self.transcoder().for_db(data)?;
        data.insert(TYPE_FIELD, self.scope.model.as_str());

        Ok(data)
    }

    fn from_db(&self, mut data: Record) -> StoreResult<Record> {
        data.remove(TYPE_FIELD);

        Ok(self.transcoder().from_db(data))
    }
}
