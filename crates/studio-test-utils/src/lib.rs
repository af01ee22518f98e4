//! Testing utilities for the widget studio workspace
//!
//! Scripted fakes for the external services and source fixtures.

#![allow(missing_docs)]

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use studio_core::{GenerationRequest, GenerationResponse, GenerationService};
use studio_lang::{ScriptError, ScriptLoader};
use studio_registry::{CreatedWidget, TransportError, WidgetDefinition, WidgetStore};

/// Renders a bold label
pub const STABLE_WIDGET: &str = "export default function Kpi() { return <b>42</b>; }";

/// Compiles, then fails on first render
pub const THROWING_WIDGET: &str = "export default function W() { return Bogus(); }";

/// Does not compile
pub const BROKEN_WIDGET: &str = "export default function W() { return <div>; }";

/// Counter whose button increments state
pub const COUNTER_WIDGET: &str = r"
export default function Counter() {
  const [n, setN] = ui.useState(0);
  return <button onClick={() => setN(n + 1)}>{`clicked ${n}`}</button>;
}
";

/// Button whose handler throws
pub const THROWING_HANDLER_WIDGET: &str = r"
export default function W() {
  return <button onClick={() => { throw new Error('boom'); }}>press</button>;
}
";

/// `source` wrapped in a tsx fence, the way a model replies
pub fn fenced(source: &str) -> String {
    format!("Here is the widget.\n```tsx\n{source}\n```\nIt renders a value.")
}

/// Reply carrying `code`
pub fn code_reply(code: &str) -> Result<GenerationResponse, TransportError> {
    Ok(GenerationResponse {
        code: Some(code.to_string()),
        explanation: "Updated the widget.".to_string(),
        raw: fenced(code),
    })
}

/// HTTP failure as the generation service would report it
pub fn service_error(status: u16) -> Result<GenerationResponse, TransportError> {
    Err(TransportError::Status {
        url: "http://generation.test/generate".to_string(),
        status,
        body: "upstream model unavailable".to_string(),
    })
}

/// Generation service replaying queued replies
///
/// Records every request. When the queue runs dry it answers with a reply
/// that has no code.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<(Duration, Result<GenerationResponse, TransportError>)>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a reply delivered immediately
    pub fn push(&self, reply: Result<GenerationResponse, TransportError>) -> &Self {
        self.push_delayed(Duration::ZERO, reply)
    }

    /// Queue a reply delivered after `delay`
    pub fn push_delayed(&self, delay: Duration, reply: Result<GenerationResponse, TransportError>) -> &Self {
        self.replies.lock().push_back((delay, reply));
        self
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }

    /// Correction requests received so far
    pub fn corrections(&self) -> Vec<GenerationRequest> {
        self.requests().into_iter().filter(GenerationRequest::is_correction).collect()
    }
}

#[async_trait]
impl GenerationService for ScriptedGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, TransportError> {
        self.requests.lock().push(request);
        let next = self.replies.lock().pop_front();
        match next {
            Some((delay, reply)) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                reply
            }
            None => Ok(GenerationResponse {
                code: None,
                explanation: "I have nothing to add.".to_string(),
                raw: String::new(),
            }),
        }
    }
}

/// Widget store kept in memory
#[derive(Debug, Default)]
pub struct InMemoryStore {
    widgets: Mutex<IndexMap<String, WidgetDefinition>>,
    fail_next: Mutex<Option<TransportError>>,
    writes: Mutex<usize>,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Store pre-filled with `definitions`
    pub fn with_widgets(definitions: impl IntoIterator<Item = WidgetDefinition>) -> Arc<Self> {
        let store = Self::default();
        {
            let mut widgets = store.widgets.lock();
            for definition in definitions {
                widgets.insert(definition.id.clone(), definition);
            }
        }
        Arc::new(store)
    }

    /// Make the next call fail with `error`
    pub fn fail_next(&self, error: TransportError) {
        *self.fail_next.lock() = Some(error);
    }

    /// Stored widget
    pub fn get(&self, id: &str) -> Option<WidgetDefinition> {
        self.widgets.lock().get(id).cloned()
    }

    /// Number of stored widgets
    pub fn len(&self) -> usize {
        self.widgets.lock().len()
    }

    /// Check if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.widgets.lock().is_empty()
    }

    /// Successful create/update/delete calls
    pub fn writes(&self) -> usize {
        *self.writes.lock()
    }

    fn check(&self, url: &str) -> Result<(), TransportError> {
        match self.fail_next.lock().take() {
            Some(TransportError::Request { reason, .. }) => Err(TransportError::Request {
                url: url.to_string(),
                reason,
            }),
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn wrote(&self) {
        *self.writes.lock() += 1;
    }
}

#[async_trait]
impl WidgetStore for InMemoryStore {
    async fn list_published(&self) -> Result<Vec<WidgetDefinition>, TransportError> {
        self.check("memory://custom")?;
        Ok(self.widgets.lock().values().cloned().collect())
    }

    async fn create(&self, definition: &WidgetDefinition) -> Result<CreatedWidget, TransportError> {
        self.check("memory://custom")?;
        self.widgets.lock().insert(definition.id.clone(), definition.clone());
        self.wrote();
        Ok(CreatedWidget {
            id: definition.id.clone(),
            created_by: Some("tester@example.com".to_string()),
        })
    }

    async fn update(&self, id: &str, definition: &WidgetDefinition) -> Result<(), TransportError> {
        self.check(&format!("memory://custom/{id}"))?;
        let mut widgets = self.widgets.lock();
        if !widgets.contains_key(id) {
            return Err(TransportError::Status {
                url: format!("memory://custom/{id}"),
                status: 404,
                body: "Widget not found".to_string(),
            });
        }
        widgets.insert(id.to_string(), definition.clone());
        drop(widgets);
        self.wrote();
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), TransportError> {
        self.check(&format!("memory://custom/{id}"))?;
        self.widgets.lock().shift_remove(id);
        self.wrote();
        Ok(())
    }
}

/// Script loader recording requested URLs; listed URLs fail
#[derive(Debug, Default)]
pub struct RecordingLoader {
    failing: HashSet<String>,
    loaded: Mutex<Vec<String>>,
}

impl RecordingLoader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Loader on which `url` fails
    pub fn failing_on(url: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            failing: HashSet::from([url.into()]),
            loaded: Mutex::default(),
        })
    }

    /// URLs requested so far
    pub fn loaded(&self) -> Vec<String> {
        self.loaded.lock().clone()
    }
}

#[async_trait]
impl ScriptLoader for RecordingLoader {
    async fn load(&self, url: &str) -> Result<(), ScriptError> {
        self.loaded.lock().push(url.to_string());
        if self.failing.contains(url) {
            return Err(ScriptError {
                url: url.to_string(),
                reason: "404 Not Found".to_string(),
            });
        }
        Ok(())
    }
}
