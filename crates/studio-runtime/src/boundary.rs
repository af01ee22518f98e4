//! Containment boundary
//!
//! A [`ContainmentBoundary`] owns one mount slot. Every entry into component
//! code (render, handlers, timers, listeners, script callbacks) runs under
//! `catch_unwind`; an error or panic moves the boundary to
//! [`BoundaryState::Failed`], releases the component's resources, shows the
//! fallback view and reports through the error sink.

use crate::error::{DispatchError, DispatchResult, MountOutcome, RenderError, RenderPhase};
use crate::resources::{HookSlots, MountEvent, MountHooks, MountResources};
use crate::view::{build_view, HandlerTable, ViewNode};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use studio_lang::{CompileError, ComponentId, ComponentValue, RuntimeError, Value};
use tokio::sync::mpsc;

/// Re-render passes allowed before a state loop is reported as an error
pub const MAX_RENDER_PASSES: usize = 25;

/// Callback receiving every captured [`RenderError`]
pub type ErrorSink = Arc<dyn Fn(&RenderError) + Send + Sync>;

/// Lifecycle of a boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryState {
    /// Nothing mounted
    Idle,
    /// Initial render in progress
    Mounting,
    /// Mounted and rendered
    Stable,
    /// Showing the fallback
    Failed,
}

struct ActiveMount {
    component: Arc<ComponentValue>,
    props: Value,
    slots: HookSlots,
    resources: MountResources,
    handlers: HandlerTable,
}

/// Failure-isolating mount slot
pub struct ContainmentBoundary {
    label: String,
    state: BoundaryState,
    active: Option<ActiveMount>,
    failed_identity: Option<ComponentId>,
    view: Vec<ViewNode>,
    last_error: Option<RenderError>,
    sink: Option<ErrorSink>,
    events_tx: mpsc::UnboundedSender<MountEvent>,
    events_rx: mpsc::UnboundedReceiver<MountEvent>,
}

fn panic_text(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn captured(
    result: std::thread::Result<Result<Value, RuntimeError>>,
    phase: RenderPhase,
    component: ComponentId,
) -> Result<(), RenderError> {
    match result {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(err)) => Err(RenderError::runtime(err.to_string(), phase, Some(component))),
        Err(panic) => Err(RenderError::panic(panic_text(&*panic), phase, Some(component))),
    }
}

impl ContainmentBoundary {
    /// Empty boundary; `label` identifies it in logs
    pub fn new(label: impl Into<String>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            label: label.into(),
            state: BoundaryState::Idle,
            active: None,
            failed_identity: None,
            view: Vec::new(),
            last_error: None,
            sink: None,
            events_tx,
            events_rx,
        }
    }

    /// Report captured errors to `sink`
    #[must_use]
    pub fn with_error_sink(mut self, sink: ErrorSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Current lifecycle state
    #[inline]
    #[must_use]
    pub fn state(&self) -> BoundaryState {
        self.state
    }

    /// Boundary label
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Rendered view (the fallback while failed)
    #[must_use]
    pub fn view(&self) -> &[ViewNode] {
        &self.view
    }

    /// Error that moved the boundary to `Failed`
    #[must_use]
    pub fn last_error(&self) -> Option<&RenderError> {
        self.last_error.as_ref()
    }

    /// Identity of the mounted component
    #[must_use]
    pub fn component_id(&self) -> Option<ComponentId> {
        self.active.as_ref().map(|m| m.component.id())
    }

    /// The mounted component
    #[must_use]
    pub fn component(&self) -> Option<&Arc<ComponentValue>> {
        self.active.as_ref().map(|m| &m.component)
    }

    /// Whether the fallback is showing
    #[must_use]
    pub fn shows_fallback(&self) -> bool {
        self.state == BoundaryState::Failed
    }

    /// Running interval timers
    #[must_use]
    pub fn active_timers(&self) -> usize {
        self.active.as_ref().map_or(0, |m| m.resources.active_timers())
    }

    /// Registered broadcast listeners
    #[must_use]
    pub fn active_listeners(&self) -> usize {
        self.active.as_ref().map_or(0, |m| m.resources.active_listeners())
    }

    /// Script loads still in flight
    #[must_use]
    pub fn pending_scripts(&self) -> usize {
        self.active.as_ref().map_or(0, |m| m.resources.pending_scripts())
    }

    /// Number of `ui.useState` slots held by the mount
    #[must_use]
    pub fn state_slots(&self) -> usize {
        self.active.as_ref().map_or(0, |m| m.slots.len())
    }

    fn current_outcome(&self) -> MountOutcome {
        match (&self.state, &self.last_error) {
            (BoundaryState::Failed, Some(err)) => MountOutcome::RenderError(err.clone()),
            _ => MountOutcome::Stable,
        }
    }

    /// Mount `component` with `props`
    ///
    /// Supplying the value that is already mounted is a props update.
    /// Supplying the value that last failed keeps the boundary failed; any
    /// other value resets it and mounts fresh.
    pub fn mount(&mut self, component: Arc<ComponentValue>, props: Value) -> MountOutcome {
        let id = component.id();
        if self.state == BoundaryState::Failed && self.failed_identity == Some(id) {
            tracing::debug!(boundary = %self.label, component = %id, "re-supplied failing component; staying failed");
            return self.current_outcome();
        }
        if self.component_id() == Some(id) {
            return self.update(props);
        }

        self.release();
        self.state = BoundaryState::Mounting;
        self.failed_identity = None;
        self.last_error = None;
        let resources = MountResources::new(id, self.events_tx.clone(), Arc::clone(&component.capabilities().scripts));
        self.active = Some(ActiveMount {
            component,
            props,
            slots: HookSlots::default(),
            resources,
            handlers: HandlerTable::new(),
        });
        let outcome = self.render(RenderPhase::Mount);
        if outcome.is_stable() {
            tracing::info!(boundary = %self.label, component = %id, "component mounted");
        }
        outcome
    }

    /// Re-render the mounted component with new props
    pub fn update(&mut self, props: Value) -> MountOutcome {
        match self.active.as_mut() {
            Some(active) => {
                active.props = props;
                self.render(RenderPhase::PropsUpdate)
            }
            None => self.current_outcome(),
        }
    }

    /// Show the fallback for a source that did not compile
    pub fn reject(&mut self, error: &CompileError) {
        tracing::warn!(boundary = %self.label, stage = %error.stage, error = %error.message, "rejected component source");
        self.release();
        self.state = BoundaryState::Failed;
        self.failed_identity = None;
        self.last_error = None;
        self.view = vec![ViewNode::fallback()];
    }

    /// Release the mounted component and return to `Idle`
    pub fn unmount(&mut self) {
        self.release();
        self.state = BoundaryState::Idle;
        self.failed_identity = None;
        self.last_error = None;
        self.view.clear();
    }

    /// Invoke the handler registered for `event` on the element at `path`
    ///
    /// # Errors
    ///
    /// [`DispatchError::NotMounted`] when nothing is mounted,
    /// [`DispatchError::NoHandler`] when the element has no such handler.
    pub fn dispatch(&mut self, path: &[usize], event: &str, payload: Value) -> DispatchResult<MountOutcome> {
        let active = self.active.as_ref().ok_or(DispatchError::NotMounted)?;
        let handler = active
            .handlers
            .get(&(path.to_vec(), event.to_string()))
            .cloned()
            .ok_or_else(|| DispatchError::NoHandler {
                path: path.to_vec(),
                event: event.to_string(),
            })?;
        Ok(self.run_callback(&handler, vec![payload], RenderPhase::Event))
    }

    /// Deliver a host broadcast to the component's `ui.on` listeners
    pub fn broadcast(&mut self, event: &str, payload: Value) -> MountOutcome {
        let listeners = match &self.active {
            Some(active) => active.resources.listeners_for(event),
            None => return self.current_outcome(),
        };
        for listener in listeners {
            if self.active.is_none() {
                break;
            }
            let outcome = self.run_callback(&listener, vec![payload.clone()], RenderPhase::Listener);
            if !outcome.is_stable() {
                return outcome;
            }
        }
        self.current_outcome()
    }

    /// Process every queued timer and script completion without waiting
    ///
    /// Returns how many events reached the mounted component.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            if self.handle_event(event).is_some() {
                handled += 1;
            }
        }
        handled
    }

    /// Wait for the next timer or script completion and process it
    ///
    /// Cancel safe: an event is only taken off the queue when it is handled.
    pub async fn next_event(&mut self) -> MountOutcome {
        loop {
            let Some(event) = self.events_rx.recv().await else {
                return std::future::pending().await;
            };
            if let Some(outcome) = self.handle_event(event) {
                return outcome;
            }
        }
    }

    fn handle_event(&mut self, event: MountEvent) -> Option<MountOutcome> {
        if self.component_id() != Some(event.owner()) {
            tracing::trace!(boundary = %self.label, "dropped event from a released component");
            return None;
        }
        let active = self.active.as_mut()?;
        match event {
            MountEvent::Timer { id, .. } => {
                let callback = active.resources.timer_callback(id)?;
                Some(self.run_callback(&callback, Vec::new(), RenderPhase::Timer))
            }
            MountEvent::ScriptLoaded { id, result, .. } => {
                let (url, on_load) = active.resources.complete_script(id, result.is_ok())?;
                if let Err(err) = result {
                    let component = active.component.id();
                    return Some(self.fail(RenderError::runtime(err.to_string(), RenderPhase::Script, Some(component))));
                }
                tracing::debug!(boundary = %self.label, %url, "script loaded");
                Some(match on_load {
                    Some(callback) => self.run_callback(&callback, Vec::new(), RenderPhase::Script),
                    None => MountOutcome::Stable,
                })
            }
        }
    }

    fn run_callback(&mut self, callback: &Value, args: Vec<Value>, phase: RenderPhase) -> MountOutcome {
        let Some(active) = self.active.as_mut() else {
            return self.current_outcome();
        };
        let component = Arc::clone(&active.component);
        let slots = &mut active.slots;
        let resources = &mut active.resources;
        let result = catch_unwind(AssertUnwindSafe(|| {
            let mut hooks = MountHooks::callback(slots, resources);
            component.invoke(callback, args, &mut hooks)
        }));
        if let Err(err) = captured(result, phase, component.id()) {
            return self.fail(err);
        }
        if active.slots.take_dirty() {
            return self.render(RenderPhase::StateUpdate);
        }
        MountOutcome::Stable
    }

    fn render(&mut self, phase: RenderPhase) -> MountOutcome {
        let Some(active) = self.active.as_mut() else {
            return self.current_outcome();
        };
        let component = Arc::clone(&active.component);
        for _ in 0..MAX_RENDER_PASSES {
            let props = &active.props;
            let slots = &mut active.slots;
            let resources = &mut active.resources;
            let result = catch_unwind(AssertUnwindSafe(|| {
                let mut hooks = MountHooks::rendering(slots, resources);
                component.render(props, &mut hooks)
            }));
            let nodes = match result {
                Ok(Ok(nodes)) => nodes,
                Ok(Err(err)) => return self.fail(RenderError::runtime(err.to_string(), phase, Some(component.id()))),
                Err(panic) => return self.fail(RenderError::panic(panic_text(&*panic), phase, Some(component.id()))),
            };
            if active.slots.take_dirty() {
                continue;
            }
            active.handlers.clear();
            self.view = build_view(&nodes, &mut active.handlers);
            self.state = BoundaryState::Stable;
            return MountOutcome::Stable;
        }
        self.fail(RenderError::runtime(
            "Error: Too many re-renders. State updates during render must settle",
            phase,
            Some(component.id()),
        ))
    }

    fn fail(&mut self, error: RenderError) -> MountOutcome {
        tracing::warn!(
            boundary = %self.label,
            phase = %error.phase,
            panicked = error.panicked,
            error = %error.message,
            "component failed; showing fallback"
        );
        self.failed_identity = self.component_id().or(error.component);
        self.release();
        self.state = BoundaryState::Failed;
        self.view = vec![ViewNode::fallback()];
        self.last_error = Some(error.clone());
        if let Some(sink) = &self.sink {
            sink(&error);
        }
        MountOutcome::RenderError(error)
    }

    fn release(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.resources.teardown();
        }
    }
}

impl Drop for ContainmentBoundary {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for ContainmentBoundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainmentBoundary")
            .field("label", &self.label)
            .field("state", &self.state)
            .field("component", &self.component_id())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use studio_lang::{compile, Capabilities};

    fn component(src: &str) -> Arc<ComponentValue> {
        Arc::new(compile(src).unwrap().instantiate(&Capabilities::default()).unwrap())
    }

    fn text(boundary: &ContainmentBoundary) -> String {
        boundary.view().iter().map(ViewNode::text_content).collect()
    }

    #[test]
    fn stable_mount_renders_view() {
        let mut boundary = ContainmentBoundary::new("preview");
        let outcome = boundary.mount(component("export default () => <p>ok</p>;"), Value::Undefined);
        assert!(outcome.is_stable());
        assert_eq!(boundary.state(), BoundaryState::Stable);
        assert_eq!(text(&boundary), "ok");
    }

    #[test]
    fn throwing_component_fails_and_keeps_failing_on_resupply() {
        let mut boundary = ContainmentBoundary::new("preview");
        let bad = component("export default function W(){ return Bogus(); }");
        let outcome = boundary.mount(Arc::clone(&bad), Value::Undefined);
        let err = outcome.error().unwrap();
        assert_eq!(err.message, "ReferenceError: Bogus is not defined");
        assert_eq!(err.phase, RenderPhase::Mount);
        assert!(boundary.view()[0].is_fallback());

        assert!(!boundary.mount(bad, Value::Undefined).is_stable());
        assert_eq!(boundary.state(), BoundaryState::Failed);

        assert!(boundary.mount(component("export default () => 'fixed';"), Value::Undefined).is_stable());
        assert_eq!(text(&boundary), "fixed");
    }

    #[test]
    fn click_handlers_update_state() {
        let src = r"
            export default function Counter() {
              const [n, setN] = ui.useState(0);
              return <button onClick={() => setN(n + 1)}>{`count ${n}`}</button>;
            }
        ";
        let mut boundary = ContainmentBoundary::new("counter");
        assert!(boundary.mount(component(src), Value::Undefined).is_stable());
        assert!(boundary.dispatch(&[0], "click", Value::Undefined).unwrap().is_stable());
        assert!(boundary.dispatch(&[0], "click", Value::Undefined).unwrap().is_stable());
        assert_eq!(text(&boundary), "count 2");
        assert_eq!(
            boundary.dispatch(&[0], "hover", Value::Undefined),
            Err(DispatchError::NoHandler {
                path: vec![0],
                event: "hover".to_string()
            })
        );
    }

    #[test]
    fn failing_handler_trips_the_boundary_and_reports() {
        let reported = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink_log = Arc::clone(&reported);
        let mut boundary = ContainmentBoundary::new("w").with_error_sink(Arc::new(move |err: &RenderError| {
            sink_log.lock().push(err.summary());
        }));
        let src = "export default () => <button onClick={() => { throw new Error('boom'); }}>x</button>;";
        boundary.mount(component(src), Value::Undefined);
        let outcome = boundary.dispatch(&[0], "click", Value::Undefined).unwrap();
        assert_eq!(outcome.error().map(|e| e.phase), Some(RenderPhase::Event));
        assert_eq!(reported.lock().len(), 1);
        assert!(reported.lock()[0].contains("boom"));
        assert_eq!(boundary.dispatch(&[0], "click", Value::Undefined), Err(DispatchError::NotMounted));
    }

    #[test]
    fn state_loop_during_render_is_an_error() {
        let src = r"
            export default function Loop() {
              const [n, setN] = ui.useState(0);
              setN(n + 1);
              return null;
            }
        ";
        let mut boundary = ContainmentBoundary::new("loop");
        let outcome = boundary.mount(component(src), Value::Undefined);
        assert!(outcome.error().unwrap().message.contains("Too many re-renders"));
    }

    #[test]
    fn settling_state_during_render_is_fine() {
        let src = r"
            export default function Once() {
              const [ready, setReady] = ui.useState(false);
              if (!ready) { setReady(true); }
              return ready ? 'ready' : 'waiting';
            }
        ";
        let mut boundary = ContainmentBoundary::new("once");
        assert!(boundary.mount(component(src), Value::Undefined).is_stable());
        assert_eq!(text(&boundary), "ready");
    }

    #[test]
    fn props_update_rerenders() {
        let mut boundary = ContainmentBoundary::new("props");
        let c = component("export default ({ name }) => <h1>{`Hi ${name}`}</h1>;");
        let props = |name: &str| Value::from_json(&serde_json::json!({ "name": name }));
        boundary.mount(Arc::clone(&c), props("a"));
        assert!(boundary.mount(c, props("b")).is_stable());
        assert_eq!(text(&boundary), "Hi b");
    }

    #[test]
    fn broadcast_reaches_listeners() {
        let src = r"
            export default function Live() {
              const [label, setLabel] = ui.useState('idle');
              ui.on('refresh', (payload) => setLabel(payload.label));
              return <span>{label}</span>;
            }
        ";
        let mut boundary = ContainmentBoundary::new("live");
        boundary.mount(component(src), Value::Undefined);
        assert_eq!(boundary.active_listeners(), 1);
        let payload = Value::from_json(&serde_json::json!({ "label": "fresh" }));
        assert!(boundary.broadcast("refresh", payload).is_stable());
        assert_eq!(text(&boundary), "fresh");
        assert_eq!(boundary.active_listeners(), 1);
    }

    #[test]
    fn rejection_shows_fallback_without_reporting() {
        let reported = Arc::new(parking_lot::Mutex::new(0usize));
        let count = Arc::clone(&reported);
        let mut boundary = ContainmentBoundary::new("grid").with_error_sink(Arc::new(move |_: &RenderError| {
            *count.lock() += 1;
        }));
        let err = compile("export default (").unwrap_err();
        boundary.reject(&err);
        assert!(boundary.shows_fallback());
        assert_eq!(*reported.lock(), 0);
    }

    #[test]
    fn unmount_returns_to_idle() {
        let mut boundary = ContainmentBoundary::new("x");
        boundary.mount(component("export default () => 'x';"), Value::Undefined);
        boundary.unmount();
        assert_eq!(boundary.state(), BoundaryState::Idle);
        assert!(boundary.view().is_empty());
        assert_eq!(boundary.component_id(), None);
    }
}
