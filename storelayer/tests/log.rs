#[macro_use]
mod common;

use bson::doc;
use storelayer::{memory::MemoryLogBackend, prelude::*};

use common::{DATABASE, WIDGET, ids, opts, registry, seed, settings};

async fn coordinator() -> Coordinator<MemoryLogBackend> {
    Coordinator::builder(MemoryLogBackend::new())
        .settings(settings())
        .registry(registry())
        .initialize()
        .await
        .unwrap()
}

async fn sequenced_coordinator() -> Coordinator<MemoryLogBackend> {
    Coordinator::builder(MemoryLogBackend::new())
        .settings(settings())
        .registry(registry())
        .id_generator(SequenceIdGenerator::starting_at(42))
        .initialize()
        .await
        .unwrap()
}

shared_scenarios!(
    declared_kinds_round_trip,
    create_on_existing_id_conflicts,
    missing_records,
    destroy_removes_once,
    save_is_idempotent,
    find_by_ids_skips_missing,
    queries_filter_sort_and_page,
    id_predicates,
    repeated_ids_resolve_once,
    id_literals_of_another_kind_never_match,
    bulk_update_and_destroy,
    attribute_updates_and_replacement,
);

#[tokio::test]
async fn requires_a_database_name() {
    let err = Coordinator::builder(MemoryLogBackend::new())
        .initialize()
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::Connection(_)));
}

#[tokio::test]
async fn scans_skip_entries_of_other_models() {
    let backend = MemoryLogBackend::new();
    let server = backend.server().clone();
    let coordinator = Coordinator::builder(backend)
        .settings(settings())
        .registry(registry())
        .initialize()
        .await
        .unwrap();

    seed(&coordinator).await;

    server
        .open(DATABASE)
        .await
        .unwrap()
        .write(|db| db.put("Widget:9", doc! { "_type": "Gadget", "name": "stray" }))
        .await
        .unwrap();

    assert_eq!(ids(&coordinator.find_all(WIDGET, &opts()).await.unwrap()), vec![1, 2, 3]);
    assert_eq!(
        ids(&coordinator
            .find_by_ids(WIDGET, vec![RecordId::Number(1), RecordId::Number(9)], &opts())
            .await
            .unwrap()),
        vec![1]
    );
}

#[tokio::test]
async fn filtered_scans_skip_keys_that_are_not_ids() {
    let backend = MemoryLogBackend::new();
    let server = backend.server().clone();
    let coordinator = Coordinator::builder(backend)
        .settings(settings())
        .registry(registry())
        .initialize()
        .await
        .unwrap();

    seed(&coordinator).await;

    server
        .open(DATABASE)
        .await
        .unwrap()
        .write(|db| db.put("Widget:5f1d7a", doc! { "_type": "Widget", "name": "a" }))
        .await
        .unwrap();

    assert_eq!(ids(&coordinator.find_all(WIDGET, &opts()).await.unwrap()), vec![1, 2, 3]);

    let named = coordinator
        .find_by_filters(WIDGET, Some(&Filter::eq("name", "a")), &opts())
        .await
        .unwrap();
    assert_eq!(ids(&named), vec![1]);
}

#[tokio::test]
async fn native_filters_see_absent_properties_as_null() {
    let coordinator = coordinator().await;

    coordinator
        .create(WIDGET, doc! { "id": 1i64, "name": "a" }, &opts())
        .await
        .unwrap();
    coordinator
        .create(WIDGET, doc! { "id": 2i64, "name": "b", "weight": 3i64 }, &opts())
        .await
        .unwrap();

    let unweighed = coordinator
        .find_by_filters(WIDGET, Some(&Filter::not_exists("weight")), &opts())
        .await
        .unwrap();
    assert_eq!(ids(&unweighed), vec![1]);

    let null_weight = coordinator
        .find_by_filters(WIDGET, Some(&Filter::eq("weight", bson::Bson::Null)), &opts())
        .await
        .unwrap();
    assert_eq!(ids(&null_weight), vec![1]);
}
