//! Bulk operations against a backend whose writes fail for chosen records.

mod common;

use async_trait::async_trait;
use bson::{Bson, doc};
use std::{collections::BTreeMap, sync::Arc};
use storelayer::{
    connection::ConnectionHandle,
    memory::{MemoryServer, Session},
    prelude::*,
};

use common::{WIDGET, ids, opts, registry};

#[derive(Debug, Default)]
struct Table {
    rows: BTreeMap<i64, Record>,
}

/// Keeps records in memory and refuses to write or delete the ids in `failing`.
#[derive(Debug)]
struct FlakyBackend {
    server: MemoryServer<Table>,
    failing: Arc<Vec<i64>>,
}

impl FlakyBackend {
    fn failing_on(ids: &[i64]) -> Self {
        Self {
            server: MemoryServer::new(),
            failing: Arc::new(ids.to_vec()),
        }
    }
}

#[async_trait]
impl Backend for FlakyBackend {
    type Connection = Session<Table>;
    type Adapter = FlakyAdapter;

    fn name(&self) -> &'static str {
        "flaky"
    }

    fn requires_database(&self) -> bool {
        false
    }

    async fn connect(&self, _settings: &ConnectionSettings) -> StoreResult<Session<Table>> {
        self.server.open("flaky").await
    }

    async fn disconnect(&self, connection: Arc<Session<Table>>) -> StoreResult<()> {
        connection.close();
        Ok(())
    }

    fn adapter(&self, context: AdapterContext<Self>) -> FlakyAdapter {
        FlakyAdapter {
            scope: context.scope,
            connection: context.connection,
            failing: self.failing.clone(),
        }
    }
}

#[derive(Debug)]
struct FlakyAdapter {
    scope: ModelScope,
    connection: ConnectionHandle<FlakyBackend>,
    failing: Arc<Vec<i64>>,
}

impl FlakyAdapter {
    fn number(id: &RecordId) -> StoreResult<i64> {
        match id {
            RecordId::Number(n) => Ok(*n),
            other => Err(StoreError::InvalidRecord(format!("{other} is not numeric"))),
        }
    }

    fn check(&self, id: &RecordId) -> StoreResult<i64> {
        let n = Self::number(id)?;

        if self.failing.contains(&n) {
            return Err(StoreError::backend_with_status(500, format!("write to {n} refused")));
        }

        Ok(n)
    }
}

#[async_trait]
impl Adapter for FlakyAdapter {
    fn scope(&self) -> &ModelScope {
        &self.scope
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    async fn create_with_id(&self, id: &RecordId, data: Record, _options: &Options) -> StoreResult<WriteResult> {
        let n = Self::number(id)?;

        self.connection
            .get()
            .await?
            .write(|table| table.rows.insert(n, data))
            .await?;

        Ok(WriteResult::new(id.clone(), None))
    }

    async fn upsert(&self, id: &RecordId, data: Record, _options: &Options) -> StoreResult<WriteResult> {
        let n = self.check(id)?;

        self.connection
            .get()
            .await?
            .write(|table| table.rows.insert(n, data))
            .await?;

        Ok(WriteResult::new(id.clone(), None))
    }

    async fn delete(&self, id: &RecordId, _options: &Options) -> StoreResult<bool> {
        let n = self.check(id)?;

        self.connection
            .get()
            .await?
            .write(|table| table.rows.remove(&n).is_some())
            .await
    }

    async fn get(&self, id: &RecordId, _options: &Options) -> StoreResult<Record> {
        let n = Self::number(id)?;

        self.connection
            .get()
            .await?
            .read(|table| table.rows.get(&n).cloned())
            .await?
            .ok_or_else(|| StoreError::not_found(&self.scope.model, id))
    }

    async fn list_all(&self, _options: &Options) -> StoreResult<Vec<KeyedRecord>> {
        self.connection
            .get()
            .await?
            .read(|table| {
                table
                    .rows
                    .iter()
                    .map(|(n, record)| (RecordId::Number(*n), record.clone()))
                    .collect()
            })
            .await
    }
}

async fn seeded(failing: &[i64]) -> Coordinator<FlakyBackend> {
    let coordinator = Coordinator::builder(FlakyBackend::failing_on(failing))
        .registry(registry())
        .initialize()
        .await
        .unwrap();

    for id in 1..=5i64 {
        coordinator
            .create(WIDGET, doc! { "id": id, "name": "w", "weight": id }, &opts())
            .await
            .unwrap();
    }

    coordinator
}

#[tokio::test]
async fn update_counts_only_successful_writes() {
    let coordinator = seeded(&[2, 4]).await;

    let updated = coordinator
        .update(WIDGET, None, doc! { "name": "patched" }, &opts())
        .await
        .unwrap();

    assert_eq!(updated, Count::new(3));

    let patched = coordinator
        .find_by_filters(WIDGET, Some(&Filter::eq("name", "patched")), &opts())
        .await
        .unwrap();
    assert_eq!(ids(&patched), vec![1, 3, 5]);
}

#[tokio::test]
async fn destroy_all_counts_only_successful_deletes() {
    let coordinator = seeded(&[3]).await;

    let destroyed = coordinator
        .destroy_all(WIDGET, Some(&Filter::gte("weight", 2i64)), &opts())
        .await
        .unwrap();

    assert_eq!(destroyed, Count::new(3));
    assert_eq!(ids(&coordinator.find_all(WIDGET, &opts()).await.unwrap()), vec![1, 3]);
}

#[tokio::test]
async fn single_record_failures_surface() {
    let coordinator = seeded(&[1]).await;

    let err = coordinator
        .update_attributes(WIDGET, 1i64, doc! { "name": "x" }, &opts())
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 500);

    let record = coordinator.find_by_id(WIDGET, 1i64, &opts()).await.unwrap();
    assert_eq!(record.get("name"), Some(&Bson::String("w".into())));
}

#[tokio::test]
async fn existence_checks_keep_ids_unique_without_native_support() {
    let coordinator = seeded(&[]).await;

    let err = coordinator
        .create(WIDGET, doc! { "id": 3i64, "name": "dup" }, &opts())
        .await
        .unwrap_err();

    assert!(err.is_conflict());
}
