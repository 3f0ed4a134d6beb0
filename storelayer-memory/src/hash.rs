//! Hash-store family: flat string maps under string keys, in the style of Redis.
//!
//! A record of model `Widget` with id `7` lives in the hash `Widget:7`.
//! The store has no notion of uniqueness, so creates rely on the
//! coordinator's existence check, and every field value is a string.

use async_trait::async_trait;
use bson::Bson;
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};
use tracing::trace;

use storelayer_core::{
    backend::{Adapter, AdapterContext, Backend, Capabilities, KeyedRecord, ModelScope},
    config::ConnectionSettings,
    connection::ConnectionHandle,
    error::{StoreError, StoreResult},
    record::{Options, Record, RecordId, WriteResult},
    transcode::NativeTypes,
};

use crate::server::{MemoryServer, Session};

/// Database used when the settings name none.
pub const DEFAULT_DATABASE: &str = "0";

type Hash = HashMap<String, String>;

/// One numbered hash database.
#[derive(Debug, Default)]
pub struct HashDatabase {
    keys: BTreeMap<String, Hash>,
}

impl HashDatabase {
    pub fn exists(&self, key: &str) -> bool {
        self.keys.contains_key(key)
    }

    /// Sets fields on a hash, creating it when missing.
    pub fn hset(&mut self, key: &str, fields: Hash) {
        self.keys
            .entry(key.to_string())
            .or_default()
            .extend(fields);
    }

    pub fn hgetall(&self, key: &str) -> Hash {
        self.keys.get(key).cloned().unwrap_or_default()
    }

    /// Replaces a hash wholesale.
    pub fn replace(&mut self, key: &str, fields: Hash) {
        self.keys.insert(key.to_string(), fields);
    }

    /// Removes keys, returning how many existed.
    pub fn del(&mut self, keys: &[&str]) -> usize {
        keys.iter()
            .filter(|key| self.keys.remove(**key).is_some())
            .count()
    }

    /// Keys starting with `prefix`, in order.
    pub fn scan(&self, prefix: &str) -> Vec<String> {
        self.keys
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect()
    }
}

pub type HashServer = MemoryServer<HashDatabase>;
pub type HashClient = Session<HashDatabase>;

/// Backend family for the in-memory hash store.
///
/// Connects to database `"0"` unless the settings name another one.
#[derive(Debug, Clone, Default)]
pub struct MemoryHashBackend {
    server: HashServer,
}

impl MemoryHashBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server(server: HashServer) -> Self {
        Self { server }
    }

    pub fn server(&self) -> &HashServer {
        &self.server
    }
}

#[async_trait]
impl Backend for MemoryHashBackend {
    type Connection = HashClient;
    type Adapter = MemoryHashAdapter;

    fn name(&self) -> &'static str {
        "memory-hash"
    }

    fn requires_database(&self) -> bool {
        false
    }

    async fn connect(&self, settings: &ConnectionSettings) -> StoreResult<HashClient> {
        self.server
            .open(settings.database().unwrap_or(DEFAULT_DATABASE))
            .await
    }

    async fn disconnect(&self, connection: Arc<HashClient>) -> StoreResult<()> {
        connection.close();
        Ok(())
    }

    fn adapter(&self, context: AdapterContext<Self>) -> MemoryHashAdapter {
        MemoryHashAdapter {
            scope: context.scope,
            connection: context.connection,
        }
    }
}

#[derive(Debug)]
pub struct MemoryHashAdapter {
    scope: ModelScope,
    connection: ConnectionHandle<MemoryHashBackend>,
}

impl MemoryHashAdapter {
    fn key(&self, id: &RecordId) -> String {
        format!("{}:{}", self.scope.model, id)
    }

    fn to_hash(data: Record) -> Hash {
        data.into_iter()
            .map(|(field, value)| {
                let value = match value {
                    Bson::String(text) => text,
                    other => other.to_string(),
                };
                (field, value)
            })
            .collect()
    }

    fn to_record(hash: Hash) -> Record {
        let mut fields = hash.into_iter().collect::<Vec<_>>();
        fields.sort_by(|a, b| a.0.cmp(&b.0));

        fields
            .into_iter()
            .map(|(field, value)| (field, Bson::String(value)))
            .collect()
    }
}

#[async_trait]
impl Adapter for MemoryHashAdapter {
    fn scope(&self) -> &ModelScope {
        &self.scope
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    fn native_types(&self) -> NativeTypes {
        NativeTypes::FLAT
    }

    async fn create_with_id(&self, id: &RecordId, data: Record, _options: &Options) -> StoreResult<WriteResult> {
        let key = self.key(id);
        let fields = Self::to_hash(data);

        self.connection
            .get()
            .await?
            .write(|db| db.hset(&key, fields))
            .await?;

        Ok(WriteResult::new(id.clone(), None))
    }

    async fn upsert(&self, id: &RecordId, data: Record, _options: &Options) -> StoreResult<WriteResult> {
        let key = self.key(id);
        let fields = Self::to_hash(data);

        self.connection
            .get()
            .await?
            .write(|db| db.replace(&key, fields))
            .await?;

        Ok(WriteResult::new(id.clone(), None))
    }

    async fn delete(&self, id: &RecordId, _options: &Options) -> StoreResult<bool> {
        let key = self.key(id);

        let removed = self
            .connection
            .get()
            .await?
            .write(|db| db.del(&[key.as_str()]))
            .await?;

        Ok(removed > 0)
    }

    async fn get(&self, id: &RecordId, _options: &Options) -> StoreResult<Record> {
        let key = self.key(id);

        let hash = self
            .connection
            .get()
            .await?
            .read(|db| db.exists(&key).then(|| db.hgetall(&key)))
            .await?
            .ok_or_else(|| StoreError::not_found(&self.scope.model, id))?;

        Ok(Self::to_record(hash))
    }

    async fn list_all(&self, _options: &Options) -> StoreResult<Vec<KeyedRecord>> {
        let prefix = format!("{}:", self.scope.model);
        let client = self.connection.get().await?;

        let rows = client
            .read(|db| {
                db.scan(&prefix)
                    .into_iter()
                    .map(|key| {
                        let hash = db.hgetall(&key);
                        (key, hash)
                    })
                    .collect::<Vec<_>>()
            })
            .await?;

        trace!(model = %self.scope.model, keys = rows.len(), "scanned hashes");

        Ok(rows
            .into_iter()
            .map(|(key, hash)| {
                let id = RecordId::Text(key[prefix.len()..].to_string());
                (id, Self::to_record(hash))
            })
            .collect())
    }
}
