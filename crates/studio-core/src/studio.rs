//! Studio actor
//!
//! One task owns a [`StudioSession`], the preview [`ContainmentBoundary`]
//! and everything in flight. A `tokio::select!` loop multiplexes commands
//! from [`StudioHandle`]s, the debounce deadline, compile completions,
//! generation completions, probe completions and preview events. Every
//! completion carries the revision or ticket it was started for and the
//! session drops the ones that were superseded meanwhile.

use crate::cache::CompileCache;
use crate::config::StudioConfig;
use crate::error::{StudioError, StudioResult};
use crate::generation::{GenerationResponse, GenerationService, HttpGenerationService};
use crate::probe::{DataSourceProbe, HttpProbe, ProbeResult};
use crate::session::{CompileOutcome, GenerationOutcome, GenerationTicket, StudioSession, StudioSnapshot};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use studio_lang::{Capabilities, CompilationResult, Value};
use studio_registry::{
    DataSource, HttpWidgetStore, PublishReceipt, Publisher, TransportError, WidgetDefinition, WidgetRegistry,
};
use studio_runtime::{ContainmentBoundary, MountOutcome};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;

const COMMAND_BUFFER: usize = 64;
const PREVIEW_LABEL: &str = "studio-preview";

/// External collaborators of a studio
#[derive(Clone)]
pub struct StudioServices {
    /// Generation service
    pub generator: Arc<dyn GenerationService>,
    /// Data-source probe
    pub probe: Option<Arc<dyn DataSourceProbe>>,
    /// Host capabilities for the preview
    pub capabilities: Capabilities,
    /// Publish path
    pub publisher: Option<Publisher>,
}

impl StudioServices {
    /// Services with a generator and nothing else
    pub fn new(generator: Arc<dyn GenerationService>, capabilities: Capabilities) -> Self {
        Self {
            generator,
            probe: None,
            capabilities,
            publisher: None,
        }
    }

    /// HTTP clients for every endpoint in `config`, publishing into the global registry
    ///
    /// # Errors
    ///
    /// [`StudioError::Client`] if an HTTP client cannot be built.
    pub fn from_config(config: &StudioConfig, capabilities: Capabilities) -> StudioResult<Self> {
        let timeout = config.request_timeout();
        let client_error = |e: TransportError| StudioError::Client(e.to_string());
        let generator = HttpGenerationService::new(&config.generation_url, timeout).map_err(client_error)?;
        let probe = HttpProbe::new(&config.probe_url, timeout).map_err(client_error)?;
        let store = HttpWidgetStore::new(&config.persistence_url, timeout).map_err(client_error)?;
        Ok(Self {
            generator: Arc::new(generator),
            probe: Some(Arc::new(probe)),
            capabilities,
            publisher: Some(Publisher::new(WidgetRegistry::global(), Arc::new(store))),
        })
    }

    /// With a data-source probe
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn DataSourceProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// With a publish path
    #[must_use]
    pub fn with_publisher(mut self, publisher: Publisher) -> Self {
        self.publisher = Some(publisher);
        self
    }
}

impl fmt::Debug for StudioServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StudioServices")
            .field("probe", &self.probe.is_some())
            .field("capabilities", &self.capabilities)
            .field("publisher", &self.publisher.is_some())
            .finish_non_exhaustive()
    }
}

enum Command {
    SubmitPrompt(String),
    EditSource(String),
    SetDataSource(Option<DataSource>),
    Open(Box<WidgetDefinition>),
    Dispatch {
        path: Vec<usize>,
        event: String,
        payload: Value,
        reply: oneshot::Sender<StudioResult<MountOutcome>>,
    },
    Broadcast {
        event: String,
        payload: Value,
    },
    Publish {
        template: Box<WidgetDefinition>,
        reply: oneshot::Sender<StudioResult<PublishReceipt>>,
    },
    Shutdown,
}

/// Cloneable handle to a running studio
#[derive(Debug, Clone)]
pub struct StudioHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<StudioSnapshot>,
}

impl StudioHandle {
    async fn send(&self, command: Command) -> StudioResult<()> {
        self.commands.send(command).await.map_err(|_| StudioError::Closed)
    }

    /// Start a generation from a user prompt
    ///
    /// # Errors
    ///
    /// [`StudioError::Closed`] if the studio stopped.
    pub async fn submit_prompt(&self, prompt: impl Into<String>) -> StudioResult<()> {
        self.send(Command::SubmitPrompt(prompt.into())).await
    }

    /// Replace the source by hand
    ///
    /// # Errors
    ///
    /// [`StudioError::Closed`] if the studio stopped.
    pub async fn edit_source(&self, text: impl Into<String>) -> StudioResult<()> {
        self.send(Command::EditSource(text.into())).await
    }

    /// Configure the data source used for generation and preview props
    ///
    /// # Errors
    ///
    /// [`StudioError::Closed`] if the studio stopped.
    pub async fn set_data_source(&self, data_source: Option<DataSource>) -> StudioResult<()> {
        self.send(Command::SetDataSource(data_source)).await
    }

    /// Reopen a published widget: its source, explanation and data source
    ///
    /// # Errors
    ///
    /// [`StudioError::Closed`] if the studio stopped.
    pub async fn open(&self, definition: WidgetDefinition) -> StudioResult<()> {
        self.send(Command::Open(Box::new(definition))).await
    }

    /// Route an event to a handler prop of the preview
    ///
    /// # Errors
    ///
    /// [`StudioError::Dispatch`] if nothing handles it, [`StudioError::Closed`]
    /// if the studio stopped.
    pub async fn dispatch(
        &self,
        path: Vec<usize>,
        event: impl Into<String>,
        payload: serde_json::Value,
    ) -> StudioResult<MountOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Dispatch {
            path,
            event: event.into(),
            payload: Value::from_json(&payload),
            reply,
        })
        .await?;
        rx.await.map_err(|_| StudioError::Closed)?
    }

    /// Deliver a host event to the preview's listeners
    ///
    /// # Errors
    ///
    /// [`StudioError::Closed`] if the studio stopped.
    pub async fn broadcast(&self, event: impl Into<String>, payload: serde_json::Value) -> StudioResult<()> {
        self.send(Command::Broadcast {
            event: event.into(),
            payload: Value::from_json(&payload),
        })
        .await
    }

    /// Publish the current source with the metadata of `template`
    ///
    /// # Errors
    ///
    /// [`StudioError::NotStable`] unless the preview is stable,
    /// [`StudioError::NoPublisher`] without a publish path,
    /// [`StudioError::Registry`] if validation or persistence fails.
    pub async fn publish(&self, template: WidgetDefinition) -> StudioResult<PublishReceipt> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Publish {
            template: Box::new(template),
            reply,
        })
        .await?;
        rx.await.map_err(|_| StudioError::Closed)?
    }

    /// Latest snapshot
    #[must_use]
    pub fn snapshot(&self) -> StudioSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Snapshot stream
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<StudioSnapshot> {
        self.snapshots.clone()
    }

    /// Wait until a snapshot satisfies `predicate`
    ///
    /// # Errors
    ///
    /// [`StudioError::Closed`] if the studio stopped first.
    pub async fn wait_for(&self, mut predicate: impl FnMut(&StudioSnapshot) -> bool) -> StudioResult<StudioSnapshot> {
        let mut rx = self.snapshots.clone();
        let snapshot = rx.wait_for(|s| predicate(s)).await.map_err(|_| StudioError::Closed)?;
        Ok(snapshot.clone())
    }

    /// Stop the studio and wait for its task to finish
    pub async fn shutdown(&self) {
        if self.commands.send(Command::Shutdown).await.is_ok() {
            self.commands.closed().await;
        }
    }

    /// Check if the studio task is gone
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

/// Studio entry point
#[derive(Debug)]
pub struct Studio;

impl Studio {
    /// Spawn a studio task on the current runtime
    #[must_use]
    pub fn spawn(config: StudioConfig, services: StudioServices) -> StudioHandle {
        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
        let (actor, snapshots) = StudioActor::new(&config, services);
        tokio::spawn(actor.run(rx));
        tracing::info!(debounce_ms = config.debounce_ms, "studio started");
        StudioHandle { commands, snapshots }
    }
}

type ProbeCompletion = (DataSource, Result<ProbeResult, TransportError>);

struct StudioActor {
    services: StudioServices,
    cache: CompileCache,
    debounce: Duration,
    max_corrections: u32,
    session: StudioSession,
    boundary: ContainmentBoundary,
    mounted_revision: Option<u64>,
    compile_due: Option<Instant>,
    compiles: JoinSet<(u64, CompilationResult)>,
    generations: JoinSet<(u64, Result<GenerationResponse, TransportError>)>,
    probes: JoinSet<ProbeCompletion>,
    snapshot_tx: watch::Sender<StudioSnapshot>,
}

impl StudioActor {
    fn new(config: &StudioConfig, services: StudioServices) -> (Self, watch::Receiver<StudioSnapshot>) {
        let session = StudioSession::new(config.max_corrections_per_streak);
        let (snapshot_tx, snapshots) = watch::channel(session.snapshot(Vec::new()));
        let actor = Self {
            cache: CompileCache::with_ttl(config.compile_cache_capacity, config.compile_cache_ttl()),
            debounce: config.debounce(),
            max_corrections: config.max_corrections_per_streak,
            services,
            session,
            boundary: ContainmentBoundary::new(PREVIEW_LABEL),
            mounted_revision: None,
            compile_due: None,
            compiles: JoinSet::new(),
            generations: JoinSet::new(),
            probes: JoinSet::new(),
            snapshot_tx,
        };
        (actor, snapshots)
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            let deadline = self.compile_due;
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                () = sleep_until(deadline), if deadline.is_some() => {
                    self.compile_due = None;
                    self.start_compile();
                }
                Some(joined) = self.compiles.join_next() => match joined {
                    Ok((revision, result)) => self.on_compiled(revision, &result),
                    Err(err) => log_join_error("compile", &err),
                },
                Some(joined) = self.generations.join_next() => match joined {
                    Ok((ticket, result)) => self.on_generated(ticket, result),
                    Err(err) => log_join_error("generation", &err),
                },
                Some(joined) = self.probes.join_next() => match joined {
                    Ok((source, result)) => self.on_probed(&source, result),
                    Err(err) => log_join_error("probe", &err),
                },
                outcome = self.boundary.next_event(), if self.mounted_revision.is_some() => {
                    self.on_mount_outcome(&outcome);
                }
            }
            self.publish_snapshot();
        }
        self.boundary.unmount();
        self.generations.abort_all();
        self.compiles.abort_all();
        self.probes.abort_all();
        tracing::info!("studio stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::SubmitPrompt(prompt) => {
                let ticket = self.session.submit_prompt(prompt);
                self.start_generation(ticket);
            }
            Command::EditSource(text) => {
                let revision = self.session.edit_source(text);
                tracing::debug!(revision, "source edited");
                self.schedule_compile();
            }
            Command::SetDataSource(data_source) => {
                self.session.set_data_source(data_source.clone());
                if let Some(data_source) = data_source {
                    self.start_probe(data_source);
                }
                if self.mounted_revision.is_some() {
                    let outcome = self.boundary.update(self.preview_props());
                    self.on_mount_outcome(&outcome);
                }
            }
            Command::Open(definition) => self.open(&definition),
            Command::Dispatch {
                path,
                event,
                payload,
                reply,
            } => {
                let result = self.boundary.dispatch(&path, &event, payload).map_err(StudioError::from);
                if let Ok(outcome) = &result {
                    self.on_mount_outcome(outcome);
                }
                let _ = reply.send(result);
            }
            Command::Broadcast { event, payload } => {
                let outcome = self.boundary.broadcast(&event, payload);
                self.on_mount_outcome(&outcome);
            }
            Command::Publish { template, reply } => self.publish(*template, reply),
            Command::Shutdown => {}
        }
    }

    fn open(&mut self, definition: &WidgetDefinition) {
        tracing::info!(widget = %definition.id, "opening published widget");
        // Tickets and revisions restart with the new session. Replacing the
        // sets drops finished outputs as well as running tasks.
        self.generations = JoinSet::new();
        self.compiles = JoinSet::new();
        self.probes = JoinSet::new();
        self.compile_due = None;
        self.boundary.unmount();
        self.mounted_revision = None;
        self.session = StudioSession::hydrate(definition, self.max_corrections);
        if let Some(data_source) = definition.data_source.clone() {
            self.start_probe(data_source);
        }
        self.schedule_compile();
    }

    fn publish(&mut self, template: WidgetDefinition, reply: oneshot::Sender<StudioResult<PublishReceipt>>) {
        let status = self.session.status();
        if !status.is_stable() {
            let reason = status.error_text().unwrap_or_else(|| "the preview has not mounted yet".to_string());
            let _ = reply.send(Err(StudioError::NotStable(reason)));
            return;
        }
        let Some(publisher) = self.services.publisher.clone() else {
            let _ = reply.send(Err(StudioError::NoPublisher));
            return;
        };
        let definition = self.session.draft(template);
        tokio::spawn(async move {
            let result = publisher.publish(definition).await.map_err(StudioError::from);
            match &result {
                Ok(receipt) => tracing::info!(widget = %receipt.id, version = receipt.version, "published widget"),
                Err(err) => tracing::warn!(error = %err, "publish failed"),
            }
            let _ = reply.send(result);
        });
    }

    fn schedule_compile(&mut self) {
        self.compile_due = Some(Instant::now() + self.debounce);
    }

    fn start_compile(&mut self) {
        let Some((revision, source)) = self.session.compile_input() else {
            self.boundary.unmount();
            self.mounted_revision = None;
            return;
        };
        tracing::debug!(revision, "compiling");
        let cache = self.cache.clone();
        self.compiles.spawn(async move { (revision, cache.get_or_compile(&source).await) });
    }

    fn on_compiled(&mut self, revision: u64, result: &CompilationResult) {
        match self.session.compile_finished(revision, result) {
            CompileOutcome::Stale => {}
            CompileOutcome::Mount => {
                let Ok(factory) = result else { return };
                match factory.instantiate(&self.services.capabilities) {
                    Ok(component) => {
                        self.mounted_revision = Some(revision);
                        let outcome = self.boundary.mount(Arc::new(component), self.preview_props());
                        self.on_mount_outcome(&outcome);
                    }
                    Err(error) => {
                        self.mounted_revision = None;
                        self.boundary.reject(&error);
                        if let Some(ticket) = self.session.instantiation_failed(revision, &error) {
                            self.start_generation(ticket);
                        }
                    }
                }
            }
            CompileOutcome::Failed { correction } => {
                if let Err(error) = result {
                    self.mounted_revision = None;
                    self.boundary.reject(error);
                }
                if let Some(ticket) = correction {
                    self.start_generation(ticket);
                }
            }
        }
    }

    fn on_mount_outcome(&mut self, outcome: &MountOutcome) {
        let Some(revision) = self.mounted_revision else { return };
        if let Some(ticket) = self.session.mount_finished(revision, outcome) {
            self.start_generation(ticket);
        }
    }

    fn on_generated(&mut self, ticket: u64, result: Result<GenerationResponse, TransportError>) {
        match self.session.generation_finished(ticket, result) {
            GenerationOutcome::Source { revision } => {
                tracing::debug!(ticket, revision, "applied generated source");
                self.schedule_compile();
            }
            GenerationOutcome::Failed { .. } | GenerationOutcome::NoCode | GenerationOutcome::Stale => {}
        }
    }

    fn on_probed(&mut self, source: &DataSource, result: Result<ProbeResult, TransportError>) {
        if self.session.data_source() != Some(source) {
            return;
        }
        match result {
            Ok(probe) => self.session.set_data_source_schema(probe.schema),
            Err(err) => tracing::warn!(error = %err, "data source probe failed"),
        }
    }

    fn start_generation(&mut self, ticket: GenerationTicket) {
        let generator = Arc::clone(&self.services.generator);
        let GenerationTicket { id, request } = ticket;
        self.generations.spawn(async move { (id, generator.generate(request).await) });
    }

    fn start_probe(&mut self, data_source: DataSource) {
        let Some(probe) = self.services.probe.clone() else { return };
        self.probes.spawn(async move {
            let result = probe.probe(&data_source).await;
            (data_source, result)
        });
    }

    fn preview_props(&self) -> Value {
        preview_props(self.session.data_source())
    }

    fn publish_snapshot(&self) {
        let next = self.session.snapshot(self.boundary.view().to_vec());
        self.snapshot_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

/// Props passed to the preview: `{ data: { dataSource, dataSourceType } }`
#[must_use]
pub fn preview_props(data_source: Option<&DataSource>) -> Value {
    let data = match data_source {
        Some(source) => serde_json::json!({
            "dataSource": source.source,
            "dataSourceType": source.kind.as_str(),
        }),
        None => serde_json::json!({}),
    };
    Value::from_json(&serde_json::json!({ "data": data }))
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn log_join_error(task: &str, err: &tokio::task::JoinError) {
    if err.is_panic() {
        tracing::error!(task, error = %err, "studio task panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Silent;

    #[async_trait]
    impl GenerationService for Silent {
        async fn generate(
            &self,
            _request: crate::generation::GenerationRequest,
        ) -> Result<GenerationResponse, TransportError> {
            Ok(GenerationResponse::default())
        }
    }

    struct Counting(std::sync::atomic::AtomicUsize);

    #[async_trait]
    impl GenerationService for Counting {
        async fn generate(
            &self,
            _request: crate::generation::GenerationRequest,
        ) -> Result<GenerationResponse, TransportError> {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(GenerationResponse::default())
        }
    }

    fn spawn() -> StudioHandle {
        let config = StudioConfig::new().with_debounce(Duration::from_millis(10));
        Studio::spawn(config, StudioServices::new(Arc::new(Silent), Capabilities::default()))
    }

    #[tokio::test]
    async fn edited_source_mounts_after_debounce() {
        let studio = spawn();
        studio
            .edit_source("export default function W() { return <b>hello</b>; }")
            .await
            .unwrap();
        let snapshot = tokio::time::timeout(
            Duration::from_secs(5),
            studio.wait_for(|s| s.status.as_ref().is_some_and(|st| st.is_stable())),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(snapshot.view[0].text_content(), "hello");
        studio.shutdown().await;
        assert!(studio.is_closed());
    }

    #[tokio::test]
    async fn publish_requires_a_stable_preview() {
        let studio = spawn();
        let err = studio.publish(WidgetDefinition::new("kpi1", "")).await.unwrap_err();
        assert!(matches!(err, StudioError::NotStable(_)));
        studio.shutdown().await;
    }

    #[tokio::test]
    async fn dispatch_without_mount_fails() {
        let studio = spawn();
        let err = studio.dispatch(vec![0], "click", serde_json::Value::Null).await.unwrap_err();
        assert!(matches!(err, StudioError::Dispatch(_)));
        studio.shutdown().await;
    }

    #[tokio::test]
    async fn reopening_discards_finished_work_of_the_previous_widget() {
        let generator = Arc::new(Counting(std::sync::atomic::AtomicUsize::new(0)));
        let services = StudioServices::new(generator.clone(), Capabilities::default());
        let (mut actor, _snapshots) = StudioActor::new(&StudioConfig::new(), services);

        actor.handle_command(Command::EditSource(
            "export default function W() { return Bogus(); }".to_string(),
        ));
        actor.start_compile();
        // Let the compile finish without joining it.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let stable = "export default function Kpi() { return <b>42</b>; }";
        actor.open(&WidgetDefinition::new("kpi1", stable));
        assert!(actor.compiles.is_empty());
        assert!(actor.compiles.join_next().await.is_none());

        actor.compile_due = None;
        actor.start_compile();
        let (revision, result) = actor.compiles.join_next().await.unwrap().unwrap();
        actor.on_compiled(revision, &result);

        assert!(actor.session.status().is_stable());
        assert_eq!(actor.session.source(), stable);
        assert_eq!(actor.boundary.view()[0].text_content(), "42");
        assert!(actor.generations.is_empty());
        assert_eq!(generator.0.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn preview_props_carry_the_data_source() {
        let props = preview_props(Some(&DataSource::api("https://example.test/rows")));
        assert_eq!(
            props.to_json(),
            serde_json::json!({ "data": { "dataSource": "https://example.test/rows", "dataSourceType": "api" } })
        );
    }
}
