#![allow(dead_code, unused_macros)]

use bson::{Bson, DateTime, bson, doc};
use storelayer::prelude::*;

pub const WIDGET: &str = "Widget";
pub const DATABASE: &str = "storelayer_test";

pub fn registry() -> ModelRegistry {
    ModelRegistry::new().define(
        ModelDefinition::new(WIDGET)
            .property("name", PropertyKind::Text)
            .property("weight", PropertyKind::Number)
            .property("active", PropertyKind::Boolean)
            .property("createdAt", PropertyKind::Date)
            .property("tags", PropertyKind::Opaque),
    )
}

pub fn settings() -> ConnectionSettings {
    ConnectionSettings::builder().database(DATABASE).build()
}

pub fn opts() -> Options {
    Options::new()
}

pub fn ids(records: &[Record]) -> Vec<i64> {
    let mut ids = records
        .iter()
        .map(|record| record.get_i64("id").unwrap())
        .collect::<Vec<_>>();
    ids.sort();
    ids
}

pub async fn seed<B: Backend>(coordinator: &Coordinator<B>) {
    for (id, name, weight, active) in [(1i64, "a", 1i64, true), (2, "b", 2, false), (3, "c", 3, true)] {
        coordinator
            .create(
                WIDGET,
                doc! { "id": id, "name": name, "weight": weight, "active": active },
                &opts(),
            )
            .await
            .unwrap();
    }
}

pub async fn declared_kinds_round_trip<B: Backend>(coordinator: &Coordinator<B>) {
    let created_at = DateTime::from_millis(1_700_000_000_123);

    let created = coordinator
        .create(
            WIDGET,
            doc! {
                "id": 1i64,
                "name": "a",
                "weight": 5i64,
                "active": true,
                "createdAt": created_at,
                "tags": ["red", "blue"],
            },
            &opts(),
        )
        .await
        .unwrap();

    assert_eq!(created.id, RecordId::Number(1));

    let widget = coordinator.find_by_id(WIDGET, 1i64, &opts()).await.unwrap();

    assert_eq!(widget.get("id"), Some(&Bson::Int64(1)));
    assert_eq!(widget.get("name"), Some(&Bson::String("a".into())));
    assert_eq!(widget.get("weight"), Some(&Bson::Int64(5)));
    assert_eq!(widget.get("active"), Some(&Bson::Boolean(true)));
    assert_eq!(widget.get("createdAt"), Some(&Bson::DateTime(created_at)));
    assert_eq!(widget.get("tags"), Some(&bson!(["red", "blue"])));
}

pub async fn generated_ids_and_absent_properties<B: Backend>(coordinator: &Coordinator<B>) {
    let created = coordinator
        .create(WIDGET, doc! { "name": "a" }, &opts())
        .await
        .unwrap();

    assert_eq!(created.id, RecordId::Number(42));

    let widget = coordinator.find_by_id(WIDGET, 42i64, &opts()).await.unwrap();

    assert_eq!(widget.get("id"), Some(&Bson::Int64(42)));
    assert_eq!(widget.get("name"), Some(&Bson::String("a".into())));
    assert_eq!(widget.get("createdAt"), Some(&Bson::Null));

    let next = coordinator
        .create(WIDGET, doc! { "name": "b" }, &opts())
        .await
        .unwrap();

    assert_eq!(next.id, RecordId::Number(43));
}

pub async fn create_on_existing_id_conflicts<B: Backend>(coordinator: &Coordinator<B>) {
    coordinator
        .create(WIDGET, doc! { "id": 7i64, "name": "first" }, &opts())
        .await
        .unwrap();

    let err = coordinator
        .create(WIDGET, doc! { "id": 7i64, "name": "second" }, &opts())
        .await
        .unwrap_err();

    assert!(err.is_conflict(), "unexpected error: {err:?}");
    assert_eq!(err.status_code(), 409);

    let kept = coordinator.find_by_id(WIDGET, 7i64, &opts()).await.unwrap();
    assert_eq!(kept.get_str("name").unwrap(), "first");
}

pub async fn missing_records<B: Backend>(coordinator: &Coordinator<B>) {
    let err = coordinator.find_by_id(WIDGET, 99i64, &opts()).await.unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {err:?}");
    assert_eq!(err.status_code(), 404);

    assert_eq!(coordinator.destroy(WIDGET, 99i64, &opts()).await.unwrap(), Count::new(0));
    assert!(!coordinator.exists(WIDGET, 99i64, &opts()).await.unwrap());

    let err = coordinator
        .update_attributes(WIDGET, 99i64, doc! { "name": "x" }, &opts())
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = coordinator
        .replace_by_id(WIDGET, 99i64, doc! { "name": "x" }, &opts())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

pub async fn destroy_removes_once<B: Backend>(coordinator: &Coordinator<B>) {
    seed(coordinator).await;

    assert_eq!(coordinator.destroy(WIDGET, 2i64, &opts()).await.unwrap(), Count::new(1));
    assert_eq!(coordinator.destroy(WIDGET, 2i64, &opts()).await.unwrap(), Count::new(0));
    assert!(coordinator.find_by_id(WIDGET, 2i64, &opts()).await.unwrap_err().is_not_found());
    assert_eq!(coordinator.count(WIDGET, None, &opts()).await.unwrap(), 2);
}

pub async fn save_is_idempotent<B: Backend>(coordinator: &Coordinator<B>) {
    let widget = doc! { "id": 5i64, "name": "x", "weight": 2i64 };

    coordinator.save(WIDGET, widget.clone(), &opts()).await.unwrap();
    let first = coordinator.find_by_id(WIDGET, 5i64, &opts()).await.unwrap();

    coordinator.save(WIDGET, widget, &opts()).await.unwrap();
    let second = coordinator.find_by_id(WIDGET, 5i64, &opts()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(coordinator.count(WIDGET, None, &opts()).await.unwrap(), 1);

    let err = coordinator
        .save(WIDGET, doc! { "name": "no id" }, &opts())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidRecord(_)));
}

pub async fn find_by_ids_skips_missing<B: Backend>(coordinator: &Coordinator<B>) {
    seed(coordinator).await;

    let found = coordinator
        .find_by_ids(
            WIDGET,
            vec![RecordId::Number(1), RecordId::Number(3), RecordId::Number(99)],
            &opts(),
        )
        .await
        .unwrap();

    assert_eq!(ids(&found), vec![1, 3]);
}

pub async fn queries_filter_sort_and_page<B: Backend>(coordinator: &Coordinator<B>) {
    seed(coordinator).await;

    let heavy = coordinator
        .all(
            WIDGET,
            &Query::builder()
                .filter(Filter::gte("weight", 2i64))
                .sort("weight", SortDirection::Desc)
                .build(),
            &opts(),
        )
        .await
        .unwrap();

    assert_eq!(
        heavy.iter().map(|w| w.get_i64("id").unwrap()).collect::<Vec<_>>(),
        vec![3, 2]
    );

    let page = coordinator
        .all(
            WIDGET,
            &Query::builder()
                .sort("name", SortDirection::Asc)
                .offset(1)
                .limit(1)
                .build(),
            &opts(),
        )
        .await
        .unwrap();

    assert_eq!(ids(&page), vec![2]);

    assert_eq!(
        coordinator.count(WIDGET, Some(&Filter::eq("active", true)), &opts()).await.unwrap(),
        2
    );
    assert_eq!(coordinator.count(WIDGET, None, &opts()).await.unwrap(), 3);

    let everything = coordinator.find_by_filters(WIDGET, None, &opts()).await.unwrap();
    assert_eq!(ids(&everything), vec![1, 2, 3]);

    let either = coordinator
        .find_by_filters(
            WIDGET,
            Some(&Filter::or([Filter::eq("name", "a"), Filter::starts_with("name", "c")])),
            &opts(),
        )
        .await
        .unwrap();
    assert_eq!(ids(&either), vec![1, 3]);
}

pub async fn id_predicates<B: Backend>(coordinator: &Coordinator<B>) {
    seed(coordinator).await;

    let one = coordinator
        .all(WIDGET, &Query::builder().filter(Filter::eq("id", 2i64)).build(), &opts())
        .await
        .unwrap();
    assert_eq!(ids(&one), vec![2]);

    let some = coordinator
        .all(
            WIDGET,
            &Query::builder().filter(Filter::any_of("id", vec![1i64, 3, 99])).build(),
            &opts(),
        )
        .await
        .unwrap();
    assert_eq!(ids(&some), vec![1, 3]);

    // A conjunction on the id still honours its other constraints.
    let none = coordinator
        .all(
            WIDGET,
            &Query::builder()
                .filter(Filter::eq("id", 2i64).and(Filter::eq("name", "zzz")))
                .build(),
            &opts(),
        )
        .await
        .unwrap();
    assert!(none.is_empty());
}

pub async fn repeated_ids_resolve_once<B: Backend>(coordinator: &Coordinator<B>) {
    seed(coordinator).await;

    let repeated = Filter::any_of("id", vec![1i64, 1, 3, 3, 3]);

    assert_eq!(coordinator.count(WIDGET, Some(&repeated), &opts()).await.unwrap(), 2);
    assert_eq!(
        ids(&coordinator
            .find_by_ids(WIDGET, vec![RecordId::Number(2), RecordId::Number(2)], &opts())
            .await
            .unwrap()),
        vec![2]
    );

    let updated = coordinator
        .update(WIDGET, Some(&repeated), doc! { "name": "z" }, &opts())
        .await
        .unwrap();
    assert_eq!(updated, Count::new(2));
}

pub async fn id_literals_of_another_kind_never_match<B: Backend>(coordinator: &Coordinator<B>) {
    seed(coordinator).await;

    let bare = Filter::eq("id", "2");
    let constrained = Filter::eq("id", "2").and(Filter::exists("name"));

    assert_eq!(coordinator.count(WIDGET, Some(&bare), &opts()).await.unwrap(), 0);
    assert_eq!(coordinator.count(WIDGET, Some(&constrained), &opts()).await.unwrap(), 0);
    assert_eq!(
        coordinator
            .count(WIDGET, Some(&Filter::any_of("id", vec!["1", "2"])), &opts())
            .await
            .unwrap(),
        0
    );
}

pub async fn bulk_update_and_destroy<B: Backend>(coordinator: &Coordinator<B>) {
    seed(coordinator).await;

    let updated = coordinator
        .update(WIDGET, Some(&Filter::eq("active", true)), doc! { "weight": 10i64 }, &opts())
        .await
        .unwrap();
    assert_eq!(updated, Count::new(2));

    let first = coordinator.find_by_id(WIDGET, 1i64, &opts()).await.unwrap();
    assert_eq!(first.get("weight"), Some(&Bson::Int64(10)));
    assert_eq!(first.get_str("name").unwrap(), "a");

    let destroyed = coordinator
        .destroy_all(WIDGET, Some(&Filter::lt("weight", 5i64)), &opts())
        .await
        .unwrap();
    assert_eq!(destroyed, Count::new(1));

    let remaining = coordinator.find_all(WIDGET, &opts()).await.unwrap();
    assert_eq!(ids(&remaining), vec![1, 3]);

    assert_eq!(coordinator.destroy_all(WIDGET, None, &opts()).await.unwrap(), Count::new(2));
    assert_eq!(coordinator.count(WIDGET, None, &opts()).await.unwrap(), 0);
}

pub async fn attribute_updates_and_replacement<B: Backend>(coordinator: &Coordinator<B>) {
    seed(coordinator).await;

    let merged = coordinator
        .update_attributes(WIDGET, 1i64, doc! { "name": "z", "id": 500i64 }, &opts())
        .await
        .unwrap();

    assert_eq!(merged.get_str("name").unwrap(), "z");
    assert_eq!(merged.get("weight"), Some(&Bson::Int64(1)));
    assert_eq!(merged.get("id"), Some(&Bson::Int64(1)));
    assert_eq!(coordinator.find_by_id(WIDGET, 1i64, &opts()).await.unwrap(), merged);

    let replaced = coordinator
        .replace_by_id(
            WIDGET,
            3i64,
            doc! { "name": "r", "createdAt": "2023-11-14T22:13:20.123Z" },
            &opts(),
        )
        .await
        .unwrap();

    assert_eq!(replaced.get_str("name").unwrap(), "r");
    assert_eq!(replaced.get("weight"), Some(&Bson::Null));
    assert_eq!(
        replaced.get("createdAt"),
        Some(&Bson::DateTime(DateTime::from_millis(1_700_000_000_123)))
    );

    let stored = coordinator.find_by_id(WIDGET, 3i64, &opts()).await.unwrap();
    assert_eq!(stored, replaced);
    assert_eq!(stored.get("id"), Some(&Bson::Int64(3)));
}

/// Expands to one `#[tokio::test]` per shared scenario. The calling file
/// must define `async fn coordinator()` and `async fn sequenced_coordinator()`.
macro_rules! shared_scenarios {
    ($($name:ident),* $(,)?) => {
        $(
            #[tokio::test]
            async fn $name() {
                let coordinator = coordinator().await;
                common::$name(&coordinator).await;
            }
        )*

        #[tokio::test]
        async fn generated_ids_and_absent_properties() {
            let coordinator = sequenced_coordinator().await;
            common::generated_ids_and_absent_properties(&coordinator).await;
        }
    };
}
