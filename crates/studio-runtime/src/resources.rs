//! Per-mount resource scope
//!
//! Everything a mounted component acquires through its hooks (state slots,
//! interval timers, broadcast listeners, script loads) lives here and is
//! released by [`MountResources::teardown`].
//!
//! Calls made while rendering are keyed by call order: the n-th
//! `ui.setInterval` of a render reuses the timer created by the n-th call of
//! the previous render and only swaps in the newest callback. A changed period,
//! event name or URL replaces the earlier resource instead. Calls made from
//! handlers and callbacks always acquire a new resource.

use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use studio_lang::{ComponentId, RenderHooks, RuntimeError, ScriptError, ScriptLoader, Value};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Shortest accepted timer period
pub const MIN_TIMER_PERIOD: Duration = Duration::from_millis(10);

/// Longest accepted timer period
pub const MAX_TIMER_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Completion delivered from a mount's background tasks
#[derive(Debug)]
pub(crate) enum MountEvent {
    /// An interval elapsed
    Timer { owner: ComponentId, id: u64 },
    /// A script load finished
    ScriptLoaded {
        owner: ComponentId,
        id: u64,
        result: Result<(), ScriptError>,
    },
}

impl MountEvent {
    pub(crate) fn owner(&self) -> ComponentId {
        match self {
            Self::Timer { owner, .. } | Self::ScriptLoaded { owner, .. } => *owner,
        }
    }
}

/// `ui.useState` slots of one mount
#[derive(Debug, Default)]
pub(crate) struct HookSlots {
    values: Vec<Value>,
    cursor: usize,
    dirty: bool,
}

impl HookSlots {
    pub(crate) fn begin_render(&mut self) {
        self.cursor = 0;
    }

    /// Clear and return the pending re-render flag
    pub(crate) fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn len(&self) -> usize {
        self.values.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EffectKind {
    Interval,
    Listener,
    Script,
}

struct TimerEntry {
    callback: Value,
    period: Duration,
    task: JoinHandle<()>,
}

/// A `ui.on` subscription
#[derive(Debug, Clone)]
pub(crate) struct Listener {
    pub(crate) event: String,
    pub(crate) callback: Value,
}

struct ScriptEntry {
    url: String,
    on_load: Option<Value>,
    task: Option<JoinHandle<()>>,
}

/// Resources owned by one mounted component
pub(crate) struct MountResources {
    owner: ComponentId,
    events: UnboundedSender<MountEvent>,
    loader: Arc<dyn ScriptLoader>,
    next_id: u64,
    timers: HashMap<u64, TimerEntry>,
    listeners: IndexMap<u64, Listener>,
    scripts: HashMap<u64, ScriptEntry>,
    loaded: HashSet<String>,
    effects: Vec<(EffectKind, u64)>,
    effect_cursor: usize,
}

impl MountResources {
    pub(crate) fn new(owner: ComponentId, events: UnboundedSender<MountEvent>, loader: Arc<dyn ScriptLoader>) -> Self {
        Self {
            owner,
            events,
            loader,
            next_id: 1,
            timers: HashMap::new(),
            listeners: IndexMap::new(),
            scripts: HashMap::new(),
            loaded: HashSet::new(),
            effects: Vec::new(),
            effect_cursor: 0,
        }
    }

    pub(crate) fn begin_render(&mut self) {
        self.effect_cursor = 0;
    }

    fn allocate(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Resource claimed by the current render-phase call of `kind`, if it is still alive
    fn claim(&mut self, kind: EffectKind) -> Option<u64> {
        let slot = self.effect_cursor;
        self.effect_cursor += 1;
        let (slot_kind, id) = *self.effects.get(slot)?;
        let alive = match kind {
            EffectKind::Interval => self.timers.contains_key(&id),
            EffectKind::Listener => self.listeners.contains_key(&id),
            EffectKind::Script => self.scripts.contains_key(&id),
        };
        (slot_kind == kind && alive).then_some(id)
    }

    fn record(&mut self, kind: EffectKind, id: u64) {
        let slot = self.effect_cursor - 1;
        if slot < self.effects.len() {
            self.effects[slot] = (kind, id);
        } else {
            self.effects.push((kind, id));
        }
    }

    fn spawn_timer(&mut self, id: u64, period: Duration) -> Result<JoinHandle<()>, RuntimeError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| RuntimeError::Hook("ui.setInterval requires the host event loop".to_string()))?;
        let events = self.events.clone();
        let owner = self.owner;
        Ok(handle.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if events.send(MountEvent::Timer { owner, id }).is_err() {
                    break;
                }
            }
        }))
    }

    fn spawn_load(&self, id: u64, url: &str) -> Result<Option<JoinHandle<()>>, RuntimeError> {
        let owner = self.owner;
        if self.loaded.contains(url) {
            // Already available: complete on the next pump without fetching again.
            let _ = self.events.send(MountEvent::ScriptLoaded {
                owner,
                id,
                result: Ok(()),
            });
            return Ok(None);
        }
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| RuntimeError::Hook("loadScript requires the host event loop".to_string()))?;
        let events = self.events.clone();
        let loader = Arc::clone(&self.loader);
        let url = url.to_string();
        Ok(Some(handle.spawn(async move {
            let result = loader.load(&url).await;
            let _ = events.send(MountEvent::ScriptLoaded { owner, id, result });
        })))
    }

    /// Callback of a live timer
    pub(crate) fn timer_callback(&self, id: u64) -> Option<Value> {
        self.timers.get(&id).map(|timer| timer.callback.clone())
    }

    /// Mark a script load finished; returns its URL and `onLoad` callback
    pub(crate) fn complete_script(&mut self, id: u64, succeeded: bool) -> Option<(String, Option<Value>)> {
        let entry = self.scripts.get_mut(&id)?;
        entry.task = None;
        let url = entry.url.clone();
        let on_load = entry.on_load.take();
        if succeeded {
            self.loaded.insert(url.clone());
        }
        Some((url, on_load))
    }

    /// Listeners subscribed to `event`, in subscription order
    pub(crate) fn listeners_for(&self, event: &str) -> Vec<Value> {
        self.listeners
            .values()
            .filter(|l| l.event == event)
            .map(|l| l.callback.clone())
            .collect()
    }

    pub(crate) fn active_timers(&self) -> usize {
        self.timers.len()
    }

    pub(crate) fn active_listeners(&self) -> usize {
        self.listeners.len()
    }

    pub(crate) fn pending_scripts(&self) -> usize {
        self.scripts.values().filter(|s| s.task.is_some()).count()
    }

    /// Abort every timer and pending load, drop every listener
    pub(crate) fn teardown(&mut self) {
        let timers = self.timers.len();
        let scripts = self.pending_scripts();
        let listeners = self.listeners.len();
        for (_, timer) in self.timers.drain() {
            timer.task.abort();
        }
        for (_, script) in self.scripts.drain() {
            if let Some(task) = script.task {
                task.abort();
            }
        }
        self.listeners.clear();
        self.effects.clear();
        if timers + scripts + listeners > 0 {
            tracing::debug!(component = %self.owner, timers, scripts, listeners, "released mount resources");
        }
    }
}

impl Drop for MountResources {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// [`RenderHooks`] bound to one mount
pub(crate) struct MountHooks<'a> {
    slots: &'a mut HookSlots,
    resources: &'a mut MountResources,
    rendering: bool,
}

impl<'a> MountHooks<'a> {
    /// Hooks for a render pass
    pub(crate) fn rendering(slots: &'a mut HookSlots, resources: &'a mut MountResources) -> Self {
        slots.begin_render();
        resources.begin_render();
        Self {
            slots,
            resources,
            rendering: true,
        }
    }

    /// Hooks for a handler or callback invocation
    pub(crate) fn callback(slots: &'a mut HookSlots, resources: &'a mut MountResources) -> Self {
        Self {
            slots,
            resources,
            rendering: false,
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn timer_period(period_ms: f64) -> Duration {
    let ms = if period_ms.is_nan() { 0.0 } else { period_ms };
    let max = MAX_TIMER_PERIOD.as_millis() as f64;
    Duration::from_millis(ms.clamp(0.0, max) as u64).max(MIN_TIMER_PERIOD)
}

impl RenderHooks for MountHooks<'_> {
    fn use_state(&mut self, initial: Value) -> Result<(usize, Value), RuntimeError> {
        if !self.rendering {
            return Err(RuntimeError::Hook(
                "ui.useState can only be called while the component renders".to_string(),
            ));
        }
        let slot = self.slots.cursor;
        self.slots.cursor += 1;
        if let Some(current) = self.slots.values.get(slot) {
            return Ok((slot, current.clone()));
        }
        self.slots.values.push(initial.clone());
        Ok((slot, initial))
    }

    fn state(&self, slot: usize) -> Option<Value> {
        self.slots.values.get(slot).cloned()
    }

    fn set_state(&mut self, slot: usize, value: Value) -> Result<(), RuntimeError> {
        let current = self
            .slots
            .values
            .get_mut(slot)
            .ok_or_else(|| RuntimeError::Hook(format!("state slot {slot} does not belong to this mount")))?;
        if current.strict_eq(&value) {
            return Ok(());
        }
        *current = value;
        self.slots.dirty = true;
        Ok(())
    }

    fn set_interval(&mut self, callback: Value, period_ms: f64) -> Result<u64, RuntimeError> {
        let period = timer_period(period_ms);
        if self.rendering {
            if let Some(id) = self.resources.claim(EffectKind::Interval) {
                if let Some(timer) = self.resources.timers.get_mut(&id) {
                    if timer.period == period {
                        timer.callback = callback;
                        return Ok(id);
                    }
                }
                if let Some(superseded) = self.resources.timers.remove(&id) {
                    superseded.task.abort();
                }
            }
        }
        let id = self.resources.allocate();
        let task = self.resources.spawn_timer(id, period)?;
        self.resources.timers.insert(id, TimerEntry { callback, period, task });
        if self.rendering {
            self.resources.record(EffectKind::Interval, id);
        }
        Ok(id)
    }

    fn clear_interval(&mut self, id: u64) {
        if let Some(timer) = self.resources.timers.remove(&id) {
            timer.task.abort();
        }
    }

    fn listen(&mut self, event: &str, callback: Value) -> Result<u64, RuntimeError> {
        if self.rendering {
            if let Some(id) = self.resources.claim(EffectKind::Listener) {
                if let Some(listener) = self.resources.listeners.get_mut(&id) {
                    if listener.event == event {
                        listener.callback = callback;
                        return Ok(id);
                    }
                }
                self.resources.listeners.shift_remove(&id);
            }
        }
        let id = self.resources.allocate();
        self.resources.listeners.insert(
            id,
            Listener {
                event: event.to_string(),
                callback,
            },
        );
        if self.rendering {
            self.resources.record(EffectKind::Listener, id);
        }
        Ok(id)
    }

    fn unlisten(&mut self, id: u64) {
        self.resources.listeners.shift_remove(&id);
    }

    fn load_script(&mut self, url: &str, on_load: Option<Value>) -> Result<(), RuntimeError> {
        if self.rendering {
            if let Some(id) = self.resources.claim(EffectKind::Script) {
                if let Some(entry) = self.resources.scripts.get_mut(&id) {
                    if entry.url == url {
                        if entry.task.is_some() {
                            entry.on_load = on_load;
                        }
                        return Ok(());
                    }
                }
                if let Some(superseded) = self.resources.scripts.remove(&id) {
                    if let Some(task) = superseded.task {
                        task.abort();
                    }
                }
            }
        }
        let id = self.resources.allocate();
        let task = self.resources.spawn_load(id, url)?;
        self.resources.scripts.insert(
            id,
            ScriptEntry {
                url: url.to_string(),
                on_load,
                task,
            },
        );
        if self.rendering {
            self.resources.record(EffectKind::Script, id);
        }
        Ok(())
    }
}
