//! Studio session state machine
//!
//! [`StudioSession`] owns the source artifact, the conversation and the
//! correction streak. It performs no IO: the caller runs the generation
//! requests and compilations it asks for and reports completions back with
//! the ticket or revision they were started for. Completions that no longer
//! match the current ticket or revision are dropped.
//!
//! ```text
//! submit_prompt ──► ticket ──► generation_finished ──► revision
//!                                                        │
//! edit_source ───────────────────────────────────────► revision
//!                                                        │ debounce
//!                                           compile_finished(revision)
//!                                              │ Ok            │ Err
//!                                   mount_finished(revision)   correction?
//!                                     │ Stable   │ RenderError
//!                                     done       correction?
//! ```

use crate::artifact::{CorrectionAttempt, SourceArtifact};
use crate::conversation::{ConversationState, Role, Turn};
use crate::correction::{CorrectionDecision, CorrectionTracker};
use crate::generation::{GenerationRequest, GenerationResponse};
use serde::Serialize;
use studio_lang::{CompilationResult, CompileError};
use studio_registry::{DataSource, TransportError, WidgetDefinition};
use studio_runtime::{MountOutcome, RenderError, ViewNode};

/// A generation the caller must run
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationTicket {
    /// Ticket id to report the completion with
    pub id: u64,
    /// Request body
    pub request: GenerationRequest,
}

/// Where the studio stands with the current source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StudioStatus {
    /// No source yet
    Empty,
    /// Source changed and has not been mounted yet
    Pending,
    /// The source does not compile, or its module body failed
    CompileFailed {
        /// Compiler error
        error: CompileError,
    },
    /// Mounted and rendering
    Stable,
    /// Mounted, then failed; the preview shows the fallback
    RenderFailed {
        /// Captured error
        error: RenderError,
    },
}

impl StudioStatus {
    /// Check if the preview is mounted and healthy
    #[inline]
    #[must_use]
    pub fn is_stable(&self) -> bool {
        matches!(self, Self::Stable)
    }

    /// Error text of a failed status
    #[must_use]
    pub fn error_text(&self) -> Option<String> {
        match self {
            Self::CompileFailed { error } => Some(error.raw_diagnostic.clone()),
            Self::RenderFailed { error } => Some(error.summary()),
            Self::Empty | Self::Pending | Self::Stable => None,
        }
    }
}

/// What a finished generation did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// Superseded by a later prompt or edit; ignored
    Stale,
    /// Service error, recorded as a system turn
    Failed {
        /// Error text
        message: String,
    },
    /// The reply had no code; the source is unchanged
    NoCode,
    /// New source was applied
    Source {
        /// Revision to compile
        revision: u64,
    },
}

/// What a finished compilation asks for next
#[derive(Debug, Clone, PartialEq)]
pub enum CompileOutcome {
    /// Superseded by a later revision; ignored
    Stale,
    /// Compiled; mount it
    Mount,
    /// Did not compile
    Failed {
        /// Correction to run, if one fires
        correction: Option<GenerationTicket>,
    },
}

/// Observable state of a studio
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StudioSnapshot {
    /// Source revision
    pub revision: u64,
    /// Source text
    pub source: String,
    /// Status of that revision
    pub status: Option<StudioStatus>,
    /// Whether a generation is in flight
    pub generating: bool,
    /// Conversation turns
    pub conversation: Vec<Turn>,
    /// Corrections fired since the last human intervention
    pub corrections_in_streak: u32,
    /// Corrections of the current streak
    pub attempts: Vec<CorrectionAttempt>,
    /// Preview content
    pub view: Vec<ViewNode>,
}

#[derive(Debug, Clone)]
struct InFlight {
    ticket: u64,
    /// Index into `attempts` and the error it is fixing
    correction: Option<(usize, String)>,
}

/// Sans-IO studio state
#[derive(Debug, Clone)]
pub struct StudioSession {
    artifact: SourceArtifact,
    conversation: ConversationState,
    tracker: CorrectionTracker,
    status: StudioStatus,
    attempts: Vec<CorrectionAttempt>,
    in_flight: Option<InFlight>,
    next_ticket: u64,
    data_source: Option<DataSource>,
    data_source_schema: Option<serde_json::Value>,
}

impl StudioSession {
    /// Fresh session allowing `max_corrections` corrections per streak
    #[must_use]
    pub fn new(max_corrections: u32) -> Self {
        Self {
            artifact: SourceArtifact::new(),
            conversation: ConversationState::new(),
            tracker: CorrectionTracker::new(max_corrections),
            status: StudioStatus::Empty,
            attempts: Vec::new(),
            in_flight: None,
            next_ticket: 0,
            data_source: None,
            data_source_schema: None,
        }
    }

    /// Session reopened on a published widget
    #[must_use]
    pub fn hydrate(definition: &WidgetDefinition, max_corrections: u32) -> Self {
        let mut session = Self::new(max_corrections);
        session.conversation = ConversationState::hydrate(definition);
        session.data_source.clone_from(&definition.data_source);
        session.edit_source(definition.source.text.clone());
        session
    }

    /// Current source revision
    #[inline]
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.artifact.revision()
    }

    /// Current source text
    #[inline]
    #[must_use]
    pub fn source(&self) -> &str {
        self.artifact.text()
    }

    /// Status of the current revision
    #[inline]
    #[must_use]
    pub fn status(&self) -> &StudioStatus {
        &self.status
    }

    /// Conversation so far
    #[inline]
    #[must_use]
    pub fn conversation(&self) -> &ConversationState {
        &self.conversation
    }

    /// Whether a generation is in flight
    #[inline]
    #[must_use]
    pub fn is_generating(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Corrections fired since the last human intervention
    #[inline]
    #[must_use]
    pub fn corrections_in_streak(&self) -> u32 {
        self.tracker.used()
    }

    /// Corrections of the current streak
    #[inline]
    #[must_use]
    pub fn attempts(&self) -> &[CorrectionAttempt] {
        &self.attempts
    }

    /// Configured data source
    #[inline]
    #[must_use]
    pub fn data_source(&self) -> Option<&DataSource> {
        self.data_source.as_ref()
    }

    /// Change the data source; the probed schema is dropped
    pub fn set_data_source(&mut self, data_source: Option<DataSource>) {
        self.data_source = data_source;
        self.data_source_schema = None;
    }

    /// Attach a probed schema
    pub fn set_data_source_schema(&mut self, schema: serde_json::Value) {
        self.data_source_schema = Some(schema);
    }

    /// Start a user-initiated generation
    ///
    /// Ends the correction streak and supersedes any generation in flight.
    pub fn submit_prompt(&mut self, prompt: impl Into<String>) -> GenerationTicket {
        self.human_intervention();
        let prompt = prompt.into();
        let history = self.conversation.turns().to_vec();
        self.conversation.push(Role::User, prompt.clone());
        let request = GenerationRequest {
            prompt: Some(prompt),
            history,
            current_code: None,
            error_log: None,
            ..self.data_source_fields()
        };
        self.issue(request, None)
    }

    /// Apply a hand edit; returns the new revision
    ///
    /// Ends the correction streak and supersedes any generation in flight.
    pub fn edit_source(&mut self, text: impl Into<String>) -> u64 {
        self.human_intervention();
        self.apply_source(text.into())
    }

    /// Report a generation completion
    pub fn generation_finished(
        &mut self,
        ticket: u64,
        result: Result<GenerationResponse, TransportError>,
    ) -> GenerationOutcome {
        if self.in_flight.as_ref().map(|f| f.ticket) != Some(ticket) {
            tracing::debug!(ticket, "discarding superseded generation");
            return GenerationOutcome::Stale;
        }
        let Some(in_flight) = self.in_flight.take() else {
            return GenerationOutcome::Stale;
        };
        let response = match result {
            Ok(response) => response.normalized(),
            Err(err) => {
                let message = err.to_string();
                tracing::warn!(ticket, error = %message, "generation failed");
                if let Some((index, error)) = in_flight.correction {
                    self.tracker.refund(&error);
                    self.attempts.truncate(index);
                }
                self.conversation.push(Role::System, format!("Generation failed: {message}"));
                return GenerationOutcome::Failed { message };
            }
        };

        let reply = if response.explanation.trim().is_empty() {
            response.raw.trim()
        } else {
            response.explanation.trim()
        };
        if !reply.is_empty() {
            self.conversation.push(Role::Assistant, reply);
        }
        let Some(code) = response.code else {
            return GenerationOutcome::NoCode;
        };
        if let Some((index, _)) = in_flight.correction {
            if let Some(attempt) = self.attempts.get_mut(index) {
                attempt.source_after = Some(code.clone());
            }
        }
        GenerationOutcome::Source {
            revision: self.apply_source(code),
        }
    }

    /// Revision and text to compile, unless the source is blank
    #[must_use]
    pub fn compile_input(&self) -> Option<(u64, String)> {
        (!self.artifact.text().trim().is_empty()).then(|| (self.artifact.revision(), self.artifact.text().to_string()))
    }

    /// Report a compilation of `revision`
    pub fn compile_finished(&mut self, revision: u64, result: &CompilationResult) -> CompileOutcome {
        if !self.artifact.is_current(revision) {
            tracing::debug!(revision, current = self.revision(), "discarding stale compilation");
            return CompileOutcome::Stale;
        }
        match result {
            Ok(_) => CompileOutcome::Mount,
            Err(error) => CompileOutcome::Failed {
                correction: self.compile_failed(revision, error),
            },
        }
    }

    /// Report that evaluating the module body of `revision` failed
    pub fn instantiation_failed(&mut self, revision: u64, error: &CompileError) -> Option<GenerationTicket> {
        if !self.artifact.is_current(revision) {
            return None;
        }
        self.compile_failed(revision, error)
    }

    /// Report a mount outcome of `revision`
    ///
    /// Later failures of the same mount (handlers, timers) come through here too.
    pub fn mount_finished(&mut self, revision: u64, outcome: &MountOutcome) -> Option<GenerationTicket> {
        if !self.artifact.is_current(revision) {
            tracing::debug!(revision, current = self.revision(), "discarding stale mount outcome");
            return None;
        }
        match outcome {
            MountOutcome::Stable => {
                if !self.status.is_stable() {
                    tracing::info!(revision, "widget is stable");
                }
                self.status = StudioStatus::Stable;
                None
            }
            MountOutcome::RenderError(error) => {
                self.status = StudioStatus::RenderFailed { error: error.clone() };
                self.maybe_correct(error.summary())
            }
        }
    }

    /// Definition of the current source, for publishing
    #[must_use]
    pub fn draft(&self, template: WidgetDefinition) -> WidgetDefinition {
        let mut definition = template;
        definition.source.text = self.artifact.text().to_string();
        definition.source.revision = self.artifact.revision();
        if definition.explanation.is_none() {
            definition.explanation = self.conversation.last_assistant().map(str::to_string);
        }
        if definition.data_source.is_none() {
            definition.data_source.clone_from(&self.data_source);
        }
        definition
    }

    /// Observable state with the given preview
    #[must_use]
    pub fn snapshot(&self, view: Vec<ViewNode>) -> StudioSnapshot {
        StudioSnapshot {
            revision: self.artifact.revision(),
            source: self.artifact.text().to_string(),
            status: Some(self.status.clone()),
            generating: self.is_generating(),
            conversation: self.conversation.turns().to_vec(),
            corrections_in_streak: self.tracker.used(),
            attempts: self.attempts.clone(),
            view,
        }
    }

    fn human_intervention(&mut self) {
        self.tracker.reset();
        self.attempts.clear();
        if let Some(superseded) = self.in_flight.take() {
            tracing::debug!(ticket = superseded.ticket, "superseding in-flight generation");
        }
    }

    fn apply_source(&mut self, text: String) -> u64 {
        self.status = if text.trim().is_empty() {
            StudioStatus::Empty
        } else {
            StudioStatus::Pending
        };
        self.artifact.set(text)
    }

    fn compile_failed(&mut self, revision: u64, error: &CompileError) -> Option<GenerationTicket> {
        tracing::debug!(revision, error = %error, "source does not compile");
        self.status = StudioStatus::CompileFailed { error: error.clone() };
        self.maybe_correct(error.raw_diagnostic.clone())
    }

    fn maybe_correct(&mut self, error: String) -> Option<GenerationTicket> {
        if self.in_flight.is_some() {
            tracing::debug!("generation in flight, not correcting");
            return None;
        }
        let attempt = match self.tracker.check_and_record(&error) {
            CorrectionDecision::Fire { attempt } => attempt,
            CorrectionDecision::AlreadyTried => {
                tracing::info!(error = %error, "error already sent for correction, waiting for the user");
                return None;
            }
            CorrectionDecision::StreakExhausted => {
                tracing::info!(max = self.tracker.max_per_streak(), "correction streak exhausted");
                return None;
            }
        };
        tracing::info!(attempt, "requesting automatic correction");

        let history = self.conversation.turns().to_vec();
        self.conversation.push(
            Role::System,
            format!(
                "The widget failed with: {error}\nRequesting an automatic fix (attempt {attempt} of {}).",
                self.tracker.max_per_streak()
            ),
        );
        let index = self.attempts.len();
        self.attempts.push(CorrectionAttempt {
            triggering_error: error.clone(),
            attempt_number: attempt,
            source_before: self.artifact.text().to_string(),
            source_after: None,
        });
        let request = GenerationRequest {
            prompt: None,
            history,
            current_code: Some(self.artifact.text().to_string()),
            error_log: Some(error.clone()),
            ..self.data_source_fields()
        };
        Some(self.issue(request, Some((index, error))))
    }

    fn issue(&mut self, request: GenerationRequest, correction: Option<(usize, String)>) -> GenerationTicket {
        self.next_ticket += 1;
        let id = self.next_ticket;
        self.in_flight = Some(InFlight { ticket: id, correction });
        GenerationTicket { id, request }
    }

    fn data_source_fields(&self) -> GenerationRequest {
        GenerationRequest {
            data_source_schema: self.data_source_schema.clone(),
            data_source: self.data_source.as_ref().map(|d| d.source.clone()),
            data_source_type: self.data_source.as_ref().map(|d| d.kind.as_str().to_string()),
            ..GenerationRequest::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use studio_lang::compile;
    use studio_runtime::RenderPhase;

    const GOOD: &str = "export default function W() { return <b>ok</b>; }";

    fn reply(code: &str) -> Result<GenerationResponse, TransportError> {
        Ok(GenerationResponse {
            code: Some(code.into()),
            explanation: "Here you go.".into(),
            raw: String::new(),
        })
    }

    fn render_failure(message: &str) -> MountOutcome {
        MountOutcome::RenderError(RenderError::runtime(message, RenderPhase::Mount, None))
    }

    #[test]
    fn prompt_request_carries_history_before_the_prompt() {
        let mut session = StudioSession::new(3);
        session.set_data_source(Some(DataSource::sql("SELECT 1")));
        let first = session.submit_prompt("a kpi card");
        assert!(first.request.history.is_empty());
        assert_eq!(first.request.current_code, None);
        assert_eq!(first.request.data_source_type.as_deref(), Some("sql"));

        session.generation_finished(first.id, reply(GOOD));
        let second = session.submit_prompt("make it red");
        assert_eq!(second.request.history.len(), 2);
        assert_eq!(second.request.history[0].role, Role::User);
        assert_eq!(second.request.history[1].content, "Here you go.");
    }

    #[test]
    fn superseded_generation_is_discarded() {
        let mut session = StudioSession::new(3);
        let first = session.submit_prompt("one");
        let second = session.submit_prompt("two");
        assert_eq!(session.generation_finished(first.id, reply(GOOD)), GenerationOutcome::Stale);
        assert_eq!(session.revision(), 0);
        assert!(matches!(session.generation_finished(second.id, reply(GOOD)), GenerationOutcome::Source { revision: 1 }));
    }

    #[test]
    fn hand_edit_supersedes_a_generation() {
        let mut session = StudioSession::new(3);
        let ticket = session.submit_prompt("one");
        session.edit_source(GOOD);
        assert_eq!(session.generation_finished(ticket.id, reply("x")), GenerationOutcome::Stale);
        assert_eq!(session.source(), GOOD);
    }

    #[test]
    fn stale_compilation_is_not_applied() {
        let mut session = StudioSession::new(3);
        let n = session.edit_source("export default function (");
        let n1 = session.edit_source(GOOD);
        assert_eq!(session.compile_finished(n, &compile("export default function (")), CompileOutcome::Stale);
        assert_eq!(session.status(), &StudioStatus::Pending);
        assert_eq!(session.compile_finished(n1, &compile(GOOD)), CompileOutcome::Mount);
    }

    #[test]
    fn compile_failure_requests_one_correction() {
        let mut session = StudioSession::new(3);
        let rev = session.edit_source("export default function W() { return <b>; }");
        let result = compile(session.source());
        let CompileOutcome::Failed { correction: Some(ticket) } = session.compile_finished(rev, &result) else {
            panic!("expected a correction");
        };
        assert!(ticket.request.is_correction());
        assert_eq!(ticket.request.current_code.as_deref(), Some(session.source()));
        assert_eq!(session.corrections_in_streak(), 1);
        assert_eq!(session.conversation().turns().last().map(|t| t.role), Some(Role::System));
    }

    #[test]
    fn repeated_error_is_corrected_once() {
        let mut session = StudioSession::new(3);
        let rev = session.edit_source(GOOD);
        let ticket = session.mount_finished(rev, &render_failure("ReferenceError: Bogus is not defined")).unwrap();
        let rev = match session.generation_finished(ticket.id, reply(GOOD)) {
            GenerationOutcome::Source { revision } => revision,
            other => panic!("unexpected {other:?}"),
        };
        assert!(session.mount_finished(rev, &render_failure("ReferenceError: Bogus is not defined")).is_none());
        assert_eq!(session.corrections_in_streak(), 1);
        assert_eq!(session.attempts()[0].source_after.as_deref(), Some(GOOD));

        let rev = session.edit_source(GOOD);
        assert_eq!(session.corrections_in_streak(), 0);
        assert!(session.mount_finished(rev, &render_failure("ReferenceError: Bogus is not defined")).is_some());
    }

    #[test]
    fn no_correction_while_generating() {
        let mut session = StudioSession::new(3);
        let rev = session.edit_source(GOOD);
        let _ticket = session.mount_finished(rev, &render_failure("TypeError: a")).unwrap();
        assert!(session.mount_finished(rev, &render_failure("TypeError: b")).is_none());
    }

    #[test]
    fn transport_failures_do_not_count() {
        let mut session = StudioSession::new(1);
        let rev = session.edit_source(GOOD);
        let ticket = session.mount_finished(rev, &render_failure("TypeError: a")).unwrap();
        let outcome = session.generation_finished(
            ticket.id,
            Err(TransportError::Status {
                url: "http://gen/generate".into(),
                status: 502,
                body: "bad gateway".into(),
            }),
        );
        assert!(matches!(outcome, GenerationOutcome::Failed { .. }));
        assert_eq!(session.corrections_in_streak(), 0);
        assert!(session.attempts().is_empty());
        assert!(session.conversation().turns().last().unwrap().content.starts_with("Generation failed"));
        assert!(session.mount_finished(rev, &render_failure("TypeError: a")).is_some());
    }

    #[test]
    fn reply_without_code_keeps_source() {
        let mut session = StudioSession::new(3);
        session.edit_source(GOOD);
        let ticket = session.submit_prompt("what does it do?");
        let outcome = session.generation_finished(
            ticket.id,
            Ok(GenerationResponse {
                code: None,
                explanation: String::new(),
                raw: "It shows a bold word.".into(),
            }),
        );
        assert_eq!(outcome, GenerationOutcome::NoCode);
        assert_eq!(session.source(), GOOD);
        assert_eq!(session.conversation().last_assistant(), Some("It shows a bold word."));
    }

    #[test]
    fn blank_source_is_not_compiled() {
        let mut session = StudioSession::new(3);
        session.edit_source("   ");
        assert_eq!(session.compile_input(), None);
        assert_eq!(session.status(), &StudioStatus::Empty);
    }

    #[test]
    fn draft_carries_source_and_explanation() {
        let mut session = StudioSession::new(3);
        let ticket = session.submit_prompt("kpi");
        session.generation_finished(ticket.id, reply(GOOD));
        let def = session.draft(WidgetDefinition::new("kpi1", "").with_name("KPI"));
        assert_eq!(def.source.text, GOOD);
        assert_eq!(def.source.revision, 1);
        assert_eq!(def.explanation.as_deref(), Some("Here you go."));
    }

    #[test]
    fn hydrated_session_starts_pending() {
        let def = WidgetDefinition::new("kpi1", GOOD).with_explanation("A card.");
        let session = StudioSession::hydrate(&def, 3);
        assert_eq!(session.revision(), 1);
        assert_eq!(session.status(), &StudioStatus::Pending);
        assert_eq!(session.conversation().len(), 1);
    }
}
