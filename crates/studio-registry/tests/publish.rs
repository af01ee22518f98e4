//! Publish workflow against an in-memory store

use pretty_assertions::assert_eq;
use std::sync::Arc;
use studio_registry::{PublishKind, Publisher, RegistryError, TransportError, ValidationError, WidgetDefinition, WidgetRegistry};
use studio_test_utils::{InMemoryStore, BROKEN_WIDGET, STABLE_WIDGET};

fn publisher() -> (Publisher, Arc<WidgetRegistry>, Arc<InMemoryStore>) {
    let registry = Arc::new(WidgetRegistry::new());
    let store = InMemoryStore::new();
    (Publisher::new(Arc::clone(&registry), store.clone()), registry, store)
}

#[tokio::test]
async fn republishing_overwrites_and_bumps_the_version() {
    let (publisher, registry, store) = publisher();
    let first = publisher
        .publish(WidgetDefinition::new("kpi1", STABLE_WIDGET).with_name("KPI"))
        .await
        .unwrap();
    assert_eq!(first.kind, PublishKind::Created);
    assert_eq!(first.created_by.as_deref(), Some("tester@example.com"));

    let second_source = "export default function Kpi() { return <b>43</b>; }";
    let second = publisher
        .publish(WidgetDefinition::new("kpi1", second_source).with_name("KPI"))
        .await
        .unwrap();
    assert_eq!(second.kind, PublishKind::Updated);
    assert!(second.version > first.version);

    assert_eq!(registry.len(), 1);
    let entry = registry.get("kpi1").unwrap();
    assert_eq!(entry.definition().source.text, second_source);
    assert_eq!(entry.revision(), 2);
    assert_eq!(store.get("kpi1").unwrap().source.text, second_source);
}

#[tokio::test]
async fn non_compiling_source_is_refused_before_any_write() {
    let (publisher, registry, store) = publisher();
    let before = registry.version();
    let err = publisher
        .publish(WidgetDefinition::new("broken", BROKEN_WIDGET))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Validation(ValidationError::Compile(_))));
    assert_eq!(registry.version(), before);
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn transport_failure_leaves_the_registry_untouched() {
    let (publisher, registry, store) = publisher();
    store.fail_next(TransportError::Status {
        url: "memory://custom".into(),
        status: 503,
        body: "maintenance".into(),
    });
    let before = registry.version();
    let err = publisher.publish(WidgetDefinition::new("kpi1", STABLE_WIDGET)).await.unwrap_err();
    assert!(err.is_transport());
    assert!(registry.is_empty());
    assert_eq!(registry.version(), before);
}

#[tokio::test]
async fn blank_ids_are_assigned() {
    let (publisher, registry, _store) = publisher();
    let receipt = publisher.publish(WidgetDefinition::new("  ", STABLE_WIDGET)).await.unwrap();
    assert!(!receipt.id.trim().is_empty());
    assert!(registry.contains(&receipt.id));
}

#[tokio::test]
async fn unpublish_removes_from_both_sides() {
    let (publisher, registry, store) = publisher();
    publisher.publish(WidgetDefinition::new("kpi1", STABLE_WIDGET)).await.unwrap();
    publisher.unpublish("kpi1").await.unwrap();
    assert!(!registry.contains("kpi1"));
    assert!(store.is_empty());

    let err = publisher.unpublish("kpi1").await.unwrap_err();
    assert_eq!(err, RegistryError::NotFound("kpi1".into()));
}

#[tokio::test]
async fn reload_replaces_contents_and_keeps_broken_widgets() {
    let store = InMemoryStore::with_widgets([
        WidgetDefinition::new("good", STABLE_WIDGET),
        WidgetDefinition::new("stale", BROKEN_WIDGET),
    ]);
    let registry = Arc::new(WidgetRegistry::new());
    registry.register(WidgetDefinition::new("local-only", STABLE_WIDGET)).unwrap();
    let publisher = Publisher::new(Arc::clone(&registry), store);

    let mut versions = registry.subscribe();
    let version = publisher.reload().await.unwrap();
    assert!(versions.has_changed().unwrap());
    assert_eq!(*versions.borrow_and_update(), version);

    let ids: Vec<String> = registry.list().iter().map(|e| e.id().to_string()).collect();
    assert_eq!(ids, vec!["good".to_string(), "stale".to_string()]);
    assert!(registry.get("good").unwrap().factory().is_some());
    assert!(registry.get("stale").unwrap().compile_error().is_some());
}
