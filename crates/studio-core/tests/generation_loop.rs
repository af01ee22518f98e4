//! End-to-end generation loop against scripted services

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use studio_core::{
    DataSourceProbe, ProbeResult, Role, Studio, StudioConfig, StudioError, StudioHandle, StudioServices,
    StudioSnapshot, StudioStatus,
};
use studio_lang::Capabilities;
use studio_registry::{DataSource, Publisher, TransportError, WidgetDefinition, WidgetRegistry};
use studio_runtime::{find_path, MountOutcome};
use studio_test_utils::{
    code_reply, service_error, InMemoryStore, ScriptedGenerator, BROKEN_WIDGET, COUNTER_WIDGET, STABLE_WIDGET,
    THROWING_HANDLER_WIDGET, THROWING_WIDGET,
};

fn config() -> StudioConfig {
    StudioConfig::new().with_debounce(Duration::from_millis(20))
}

fn spawn(generator: &Arc<ScriptedGenerator>) -> StudioHandle {
    Studio::spawn(config(), StudioServices::new(generator.clone(), Capabilities::default()))
}

async fn settle(studio: &StudioHandle, predicate: impl FnMut(&StudioSnapshot) -> bool) -> StudioSnapshot {
    tokio::time::timeout(Duration::from_secs(10), studio.wait_for(predicate))
        .await
        .expect("studio did not settle")
        .expect("studio stopped")
}

fn is_stable(snapshot: &StudioSnapshot) -> bool {
    snapshot.status.as_ref().is_some_and(StudioStatus::is_stable)
}

fn is_render_failed(snapshot: &StudioSnapshot) -> bool {
    matches!(snapshot.status, Some(StudioStatus::RenderFailed { .. }))
}

#[tokio::test]
async fn render_error_triggers_exactly_one_correction() {
    let generator = ScriptedGenerator::new();
    generator.push(code_reply(THROWING_WIDGET)).push(code_reply(THROWING_WIDGET));
    let studio = spawn(&generator);

    studio.submit_prompt("show total revenue").await.unwrap();
    let snapshot = settle(&studio, |s| s.revision == 2 && is_render_failed(s) && !s.generating).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let corrections = generator.corrections();
    assert_eq!(corrections.len(), 1);
    let error_log = corrections[0].error_log.as_deref().unwrap();
    assert!(error_log.contains("ReferenceError: Bogus is not defined"), "{error_log}");
    assert_eq!(corrections[0].current_code.as_deref(), Some(THROWING_WIDGET));
    assert!(snapshot.view[0].is_fallback());
    assert_eq!(studio.snapshot().corrections_in_streak, 1);
    studio.shutdown().await;
}

#[tokio::test]
async fn compile_error_is_corrected_into_a_stable_widget() {
    let generator = ScriptedGenerator::new();
    generator.push(code_reply(BROKEN_WIDGET)).push(code_reply(STABLE_WIDGET));
    let studio = spawn(&generator);

    studio.submit_prompt("a kpi card").await.unwrap();
    let snapshot = settle(&studio, |s| is_stable(s) && s.revision == 2).await;

    assert_eq!(snapshot.view[0].text_content(), "42");
    assert_eq!(snapshot.attempts.len(), 1);
    assert_eq!(snapshot.attempts[0].source_before, BROKEN_WIDGET);
    assert_eq!(snapshot.attempts[0].source_after.as_deref(), Some(STABLE_WIDGET));
    let roles: Vec<Role> = snapshot.conversation.iter().map(|t| t.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::System, Role::Assistant]);
    studio.shutdown().await;
}

#[tokio::test]
async fn hand_edit_discards_the_generation_in_flight() {
    let generator = ScriptedGenerator::new();
    generator.push_delayed(Duration::from_millis(300), code_reply(THROWING_WIDGET));
    let studio = spawn(&generator);

    studio.submit_prompt("something slow").await.unwrap();
    studio.edit_source(STABLE_WIDGET).await.unwrap();
    settle(&studio, is_stable).await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    let snapshot = studio.snapshot();
    assert_eq!(snapshot.source, STABLE_WIDGET);
    assert_eq!(snapshot.revision, 1);
    assert!(!snapshot.generating);
    assert!(is_stable(&snapshot));
    studio.shutdown().await;
}

#[tokio::test]
async fn service_errors_become_system_turns() {
    let generator = ScriptedGenerator::new();
    generator.push(service_error(502));
    let studio = spawn(&generator);

    studio.submit_prompt("a chart").await.unwrap();
    let snapshot = settle(&studio, |s| !s.generating && s.conversation.len() == 2).await;

    let last = snapshot.conversation.last().unwrap();
    assert_eq!(last.role, Role::System);
    assert!(last.content.contains("HTTP 502"), "{}", last.content);
    assert_eq!(snapshot.revision, 0);
    assert_eq!(snapshot.corrections_in_streak, 0);
    studio.shutdown().await;
}

#[tokio::test]
async fn events_update_the_preview() {
    let generator = ScriptedGenerator::new();
    let studio = spawn(&generator);
    studio.edit_source(COUNTER_WIDGET).await.unwrap();
    let snapshot = settle(&studio, is_stable).await;

    let path = find_path(&snapshot.view, "button").unwrap();
    let outcome = studio.dispatch(path, "click", serde_json::Value::Null).await.unwrap();
    assert_eq!(outcome, MountOutcome::Stable);
    let snapshot = settle(&studio, |s| s.view.first().is_some_and(|n| n.text_content() == "clicked 1")).await;
    assert!(is_stable(&snapshot));
    studio.shutdown().await;
}

#[tokio::test]
async fn failing_handler_requests_a_correction() {
    let generator = ScriptedGenerator::new();
    let studio = spawn(&generator);
    studio.edit_source(THROWING_HANDLER_WIDGET).await.unwrap();
    let snapshot = settle(&studio, is_stable).await;

    let path = find_path(&snapshot.view, "button").unwrap();
    let outcome = studio.dispatch(path, "click", serde_json::Value::Null).await.unwrap();
    assert!(!outcome.is_stable());
    let snapshot = settle(&studio, |s| s.corrections_in_streak == 1 && !s.generating).await;

    assert!(snapshot.view[0].is_fallback());
    let corrections = generator.corrections();
    assert_eq!(corrections.len(), 1);
    assert!(corrections[0].error_log.as_deref().unwrap().contains("boom"));
    studio.shutdown().await;
}

#[tokio::test]
async fn publishing_requires_stability_and_reaches_the_registry() {
    let generator = ScriptedGenerator::new();
    let registry = Arc::new(WidgetRegistry::new());
    let store = InMemoryStore::new();
    let services = StudioServices::new(generator.clone(), Capabilities::default())
        .with_publisher(Publisher::new(Arc::clone(&registry), store.clone()));
    let studio = Studio::spawn(config(), services);

    studio.edit_source(THROWING_WIDGET).await.unwrap();
    settle(&studio, is_render_failed).await;
    let err = studio.publish(WidgetDefinition::new("kpi1", "")).await.unwrap_err();
    assert!(matches!(err, StudioError::NotStable(ref reason) if reason.contains("Bogus")));

    studio.edit_source(STABLE_WIDGET).await.unwrap();
    settle(&studio, is_stable).await;
    let receipt = studio
        .publish(WidgetDefinition::new("kpi1", "").with_name("Revenue KPI"))
        .await
        .unwrap();
    assert_eq!(receipt.id, "kpi1");
    let entry = registry.get("kpi1").unwrap();
    assert_eq!(entry.definition().source.text, STABLE_WIDGET);
    assert_eq!(entry.definition().metadata.name, "Revenue KPI");
    assert_eq!(store.len(), 1);
    studio.shutdown().await;
}

#[tokio::test]
async fn reopening_a_published_widget_hydrates_the_conversation() {
    let generator = ScriptedGenerator::new();
    let studio = spawn(&generator);
    let definition = WidgetDefinition::new("kpi1", STABLE_WIDGET).with_explanation("Shows the answer.");
    studio.open(definition).await.unwrap();

    let snapshot = settle(&studio, is_stable).await;
    assert_eq!(snapshot.conversation.len(), 1);
    assert_eq!(snapshot.conversation[0].content, "Shows the answer.");

    studio.submit_prompt("make it blue").await.unwrap();
    settle(&studio, |s| !s.generating && s.conversation.len() == 3).await;
    let request = &generator.requests()[0];
    assert_eq!(request.history.len(), 1);
    assert_eq!(request.current_code, None);
    studio.shutdown().await;
}

struct FixedProbe;

#[async_trait]
impl DataSourceProbe for FixedProbe {
    async fn probe(&self, _source: &DataSource) -> Result<ProbeResult, TransportError> {
        Ok(ProbeResult {
            schema: serde_json::json!({ "region": "str", "revenue": "float" }),
            sample: serde_json::json!([]),
        })
    }
}

#[tokio::test]
async fn data_source_reaches_props_and_requests() {
    let generator = ScriptedGenerator::new();
    let services = StudioServices::new(generator.clone(), Capabilities::default()).with_probe(Arc::new(FixedProbe));
    let studio = Studio::spawn(config(), services);

    studio
        .edit_source("export default function W({ data }) { return <span>{data.dataSourceType ?? 'none'}</span>; }")
        .await
        .unwrap();
    settle(&studio, |s| is_stable(s) && s.view.first().is_some_and(|n| n.text_content() == "none")).await;

    studio.set_data_source(Some(DataSource::api("https://data.test/rows"))).await.unwrap();
    settle(&studio, |s| s.view.first().is_some_and(|n| n.text_content() == "api")).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    studio.submit_prompt("chart it").await.unwrap();
    settle(&studio, |s| !s.generating && s.conversation.len() == 2).await;
    let request = &generator.requests()[0];
    assert_eq!(request.data_source.as_deref(), Some("https://data.test/rows"));
    assert_eq!(request.data_source_type.as_deref(), Some("api"));
    assert_eq!(request.data_source_schema, Some(serde_json::json!({ "region": "str", "revenue": "float" })));
    studio.shutdown().await;
}
