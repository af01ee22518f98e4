//! Host capabilities reachable from component code
//!
//! A component sees exactly three host names: `ui`, `loadScript` and
//! `charts`. Their behaviour comes from a [`Capabilities`] value supplied at
//! instantiation; stateful operations (state, timers, listeners, script
//! loads) are forwarded to the [`RenderHooks`] of whoever drives the
//! component at that moment.

use crate::interp::RuntimeError;
use crate::scope::Scope;
use crate::value::{Element, ElementTag, ObjectMap, Value};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

/// Names a component may reference without declaring them
pub const CAPABILITY_NAMES: &[&str] = &["ui", "loadScript", "charts"];

/// Element construction primitive
pub trait UiPrimitive: Send + Sync {
    /// Whether `tag` is a host element this primitive can render
    fn is_intrinsic(&self, tag: &str) -> bool;

    /// Build an element, rejecting unknown intrinsic tags
    fn create_element(
        &self,
        tag: ElementTag,
        props: ObjectMap,
        children: Vec<Value>,
    ) -> Result<Element, RuntimeError> {
        if let ElementTag::Intrinsic(name) = &tag {
            if !self.is_intrinsic(name) {
                return Err(RuntimeError::type_error(format!(
                    "<{name}> is not a supported element; custom components must start with an uppercase letter"
                )));
            }
        }
        Ok(Element {
            tag,
            props,
            children,
        })
    }
}

/// Script load failure
#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to load script {url}: {reason}")]
pub struct ScriptError {
    /// Requested URL
    pub url: String,
    /// Why it failed
    pub reason: String,
}

/// Remote script loader
#[async_trait]
pub trait ScriptLoader: Send + Sync {
    /// Fetch and activate the script at `url`
    async fn load(&self, url: &str) -> Result<(), ScriptError>;
}

/// Charting library handle
pub trait ChartLibrary: Send + Sync {
    /// Chart kinds exposed as `charts.<kind>`
    fn kinds(&self) -> Vec<String>;

    /// Validate props for `kind` and return the normalized chart spec
    fn build(&self, kind: &str, props: &serde_json::Value) -> Result<serde_json::Value, String>;
}

/// Concrete capability bindings for one instantiation
#[derive(Clone)]
pub struct Capabilities {
    /// `ui`
    pub ui: Arc<dyn UiPrimitive>,
    /// `loadScript`
    pub scripts: Arc<dyn ScriptLoader>,
    /// `charts`
    pub charts: Arc<dyn ChartLibrary>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            ui: Arc::new(HtmlPrimitive::default()),
            scripts: Arc::new(StaticScriptLoader::default()),
            charts: Arc::new(BasicCharts),
        }
    }
}

impl Capabilities {
    /// Replace the UI primitive
    #[must_use]
    pub fn with_ui(mut self, ui: Arc<dyn UiPrimitive>) -> Self {
        self.ui = ui;
        self
    }

    /// Replace the script loader
    #[must_use]
    pub fn with_scripts(mut self, scripts: Arc<dyn ScriptLoader>) -> Self {
        self.scripts = scripts;
        self
    }

    /// Replace the chart library
    #[must_use]
    pub fn with_charts(mut self, charts: Arc<dyn ChartLibrary>) -> Self {
        self.charts = charts;
        self
    }
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities")
            .field("charts", &self.charts.kinds())
            .finish_non_exhaustive()
    }
}

/// Stateful operations a component performs through `ui` and `loadScript`
pub trait RenderHooks {
    /// Claim the next state slot, seeding it with `initial` on first use.
    /// Returns the slot and its current value.
    fn use_state(&mut self, initial: Value) -> Result<(usize, Value), RuntimeError>;

    /// Current value of a state slot
    fn state(&self, slot: usize) -> Option<Value>;

    /// Replace a state slot's value and schedule a re-render
    fn set_state(&mut self, slot: usize, value: Value) -> Result<(), RuntimeError>;

    /// Start a repeating timer
    fn set_interval(&mut self, callback: Value, period_ms: f64) -> Result<u64, RuntimeError>;

    /// Stop a timer; unknown ids are ignored
    fn clear_interval(&mut self, id: u64);

    /// Subscribe to a host broadcast event
    fn listen(&mut self, event: &str, callback: Value) -> Result<u64, RuntimeError>;

    /// Drop a subscription; unknown ids are ignored
    fn unlisten(&mut self, id: u64);

    /// Request a remote script, calling `on_load` once it is available
    fn load_script(&mut self, url: &str, on_load: Option<Value>) -> Result<(), RuntimeError>;
}

/// Hooks for evaluation outside of any mount (module top level)
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedHooks;

fn detached(what: &str) -> RuntimeError {
    RuntimeError::Hook(format!("{what} can only be called while a component is mounted"))
}

impl RenderHooks for DetachedHooks {
    fn use_state(&mut self, _initial: Value) -> Result<(usize, Value), RuntimeError> {
        Err(detached("ui.useState"))
    }

    fn state(&self, _slot: usize) -> Option<Value> {
        None
    }

    fn set_state(&mut self, _slot: usize, _value: Value) -> Result<(), RuntimeError> {
        Err(detached("A state setter"))
    }

    fn set_interval(&mut self, _callback: Value, _period_ms: f64) -> Result<u64, RuntimeError> {
        Err(detached("ui.setInterval"))
    }

    fn clear_interval(&mut self, _id: u64) {}

    fn listen(&mut self, _event: &str, _callback: Value) -> Result<u64, RuntimeError> {
        Err(detached("ui.on"))
    }

    fn unlisten(&mut self, _id: u64) {}

    fn load_script(&mut self, _url: &str, _on_load: Option<Value>) -> Result<(), RuntimeError> {
        Err(detached("loadScript"))
    }
}

const HTML_TAGS: &[&str] = &[
    "a", "abbr", "article", "aside", "b", "blockquote", "br", "button", "caption", "code", "dd",
    "details", "div", "dl", "dt", "em", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6",
    "header", "hr", "i", "img", "input", "label", "li", "main", "nav", "ol", "option", "p", "pre",
    "progress", "section", "select", "small", "span", "strong", "sub", "summary", "sup", "table",
    "tbody", "td", "textarea", "tfoot", "th", "thead", "tr", "u", "ul", "svg", "g", "path",
    "circle", "rect", "line", "polyline", "polygon", "text", "ellipse", "defs", "linearGradient",
    "stop", "chart",
];

/// HTML and SVG element allow-list
#[derive(Debug, Clone)]
pub struct HtmlPrimitive {
    tags: HashSet<String>,
}

impl Default for HtmlPrimitive {
    fn default() -> Self {
        Self {
            tags: HTML_TAGS.iter().map(|t| (*t).to_string()).collect(),
        }
    }
}

impl HtmlPrimitive {
    /// Allow an extra host tag
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }
}

impl UiPrimitive for HtmlPrimitive {
    fn is_intrinsic(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// Loader that succeeds only for URLs it was told about
#[derive(Debug, Clone, Default)]
pub struct StaticScriptLoader {
    available: HashSet<String>,
}

impl StaticScriptLoader {
    /// Mark `url` as loadable
    #[must_use]
    pub fn with_script(mut self, url: impl Into<String>) -> Self {
        self.available.insert(url.into());
        self
    }
}

#[async_trait]
impl ScriptLoader for StaticScriptLoader {
    async fn load(&self, url: &str) -> Result<(), ScriptError> {
        if self.available.contains(url) {
            Ok(())
        } else {
            Err(ScriptError {
                url: url.to_string(),
                reason: "script is not available to widgets".to_string(),
            })
        }
    }
}

/// Line, bar, area and pie charts over a `data` array
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicCharts;

impl ChartLibrary for BasicCharts {
    fn kinds(&self) -> Vec<String> {
        ["line", "bar", "area", "pie"].iter().map(|k| (*k).to_string()).collect()
    }

    fn build(&self, kind: &str, props: &serde_json::Value) -> Result<serde_json::Value, String> {
        let data = props
            .get("data")
            .ok_or_else(|| format!("charts.{kind} requires a `data` array"))?;
        let rows = data
            .as_array()
            .ok_or_else(|| format!("charts.{kind}: `data` must be an array"))?;
        let (x_key, y_key) = if kind == "pie" {
            ("nameKey", "valueKey")
        } else {
            ("xKey", "yKey")
        };
        let mut spec = serde_json::Map::new();
        spec.insert("kind".to_string(), kind.into());
        spec.insert("points".to_string(), rows.len().into());
        for key in [x_key, y_key, "title", "color", "height"] {
            if let Some(v) = props.get(key) {
                spec.insert(key.to_string(), v.clone());
            }
        }
        spec.insert("data".to_string(), data.clone());
        Ok(serde_json::Value::Object(spec))
    }
}

fn first(args: &[Value]) -> Value {
    args.first().cloned().unwrap_or_default()
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn id_arg(args: &[Value]) -> Option<u64> {
    let n = first(args).to_number();
    (n.is_finite() && n >= 0.0).then_some(n as u64)
}

#[allow(clippy::cast_precision_loss)]
fn id_value(id: u64) -> Value {
    Value::Num(id as f64)
}

fn ui_object() -> Value {
    let mut ui = ObjectMap::new();
    ui.insert(
        "createElement".to_string(),
        Value::native("ui.createElement", |interp, args| {
            let mut args = args.into_iter();
            let tag = match args.next().unwrap_or_default() {
                Value::Str(name) => ElementTag::Intrinsic(name),
                f if f.is_callable() => ElementTag::Component(f),
                other => {
                    return Err(RuntimeError::type_error(format!(
                        "ui.createElement: invalid element type {}",
                        other.describe()
                    )))
                }
            };
            let props = match args.next() {
                Some(Value::Object(map)) => map.as_ref().clone(),
                _ => ObjectMap::new(),
            };
            let children = args.collect();
            let element = interp.capabilities().ui.create_element(tag, props, children)?;
            Ok(Value::Element(Arc::new(element)))
        }),
    );
    ui.insert(
        "useState".to_string(),
        Value::native("ui.useState", |interp, args| {
            let mut initial = first(&args);
            if initial.is_callable() {
                initial = interp.call(&initial, Vec::new())?;
            }
            let (slot, current) = interp.hooks().use_state(initial)?;
            let setter = Value::native("setState", move |interp, args| {
                let mut next = first(&args);
                if next.is_callable() {
                    let previous = interp.hooks().state(slot).unwrap_or_default();
                    next = interp.call(&next, vec![previous])?;
                }
                interp.hooks().set_state(slot, next)?;
                Ok(Value::Undefined)
            });
            Ok(Value::array(vec![current, setter]))
        }),
    );
    ui.insert(
        "setInterval".to_string(),
        Value::native("ui.setInterval", |interp, args| {
            let callback = first(&args);
            if !callback.is_callable() {
                return Err(RuntimeError::type_error("ui.setInterval expects a callback function"));
            }
            let period = args.get(1).map_or(0.0, Value::to_number);
            interp.hooks().set_interval(callback, period).map(id_value)
        }),
    );
    ui.insert(
        "clearInterval".to_string(),
        Value::native("ui.clearInterval", |interp, args| {
            if let Some(id) = id_arg(&args) {
                interp.hooks().clear_interval(id);
            }
            Ok(Value::Undefined)
        }),
    );
    ui.insert(
        "on".to_string(),
        Value::native("ui.on", |interp, args| {
            let event = first(&args).to_display_string();
            let callback = args.get(1).cloned().unwrap_or_default();
            if !callback.is_callable() {
                return Err(RuntimeError::type_error("ui.on expects an event name and a callback function"));
            }
            interp.hooks().listen(&event, callback).map(id_value)
        }),
    );
    ui.insert(
        "off".to_string(),
        Value::native("ui.off", |interp, args| {
            if let Some(id) = id_arg(&args) {
                interp.hooks().unlisten(id);
            }
            Ok(Value::Undefined)
        }),
    );
    Value::object(ui)
}

fn load_script_fn() -> Value {
    Value::native("loadScript", |interp, args| {
        let url = match first(&args) {
            Value::Str(url) => url,
            other => {
                return Err(RuntimeError::type_error(format!(
                    "loadScript expects a URL string, got {}",
                    other.describe()
                )))
            }
        };
        let on_load = args.get(1).filter(|v| v.is_callable()).cloned();
        interp.hooks().load_script(&url, on_load)?;
        Ok(Value::Undefined)
    })
}

fn charts_object(charts: &Arc<dyn ChartLibrary>) -> Value {
    let mut map = ObjectMap::new();
    for kind in charts.kinds() {
        let name = format!("charts.{kind}");
        let tag_kind = kind.clone();
        map.insert(
            kind,
            Value::native(name, move |interp, args| {
                let props = first(&args).to_json();
                let spec = interp
                    .capabilities()
                    .charts
                    .build(&tag_kind, &props)
                    .map_err(RuntimeError::Type)?;
                let mut attrs = ObjectMap::new();
                attrs.insert("kind".to_string(), Value::str(&tag_kind));
                attrs.insert("spec".to_string(), Value::from_json(&spec));
                Ok(Value::Element(Arc::new(Element {
                    tag: ElementTag::Intrinsic(Arc::from("chart")),
                    props: attrs,
                    children: Vec::new(),
                })))
            }),
        );
    }
    Value::object(map)
}

/// Bind the capability names into a component's globals
pub(crate) fn install(globals: &Scope, capabilities: &Capabilities) {
    globals.define("ui", ui_object());
    globals.define("loadScript", load_script_fn());
    globals.define("charts", charts_object(&capabilities.charts));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_loader_only_serves_known_scripts() {
        let loader = StaticScriptLoader::default().with_script("https://cdn/x.js");
        assert!(loader.load("https://cdn/x.js").await.is_ok());
        let err = loader.load("https://cdn/y.js").await.unwrap_err();
        assert!(err.to_string().contains("y.js"));
    }

    #[test]
    fn html_primitive_rejects_unknown_tags() {
        let ui = HtmlPrimitive::default();
        assert!(ui.create_element(ElementTag::Intrinsic(Arc::from("div")), ObjectMap::new(), vec![]).is_ok());
        let err = ui
            .create_element(ElementTag::Intrinsic(Arc::from("blink")), ObjectMap::new(), vec![])
            .unwrap_err();
        assert!(err.to_string().contains("<blink>"));
    }

    #[test]
    fn basic_charts_require_data() {
        let charts = BasicCharts;
        assert!(charts.build("line", &serde_json::json!({ "xKey": "t" })).is_err());
        let spec = charts
            .build("bar", &serde_json::json!({ "data": [{ "a": 1 }], "xKey": "a" }))
            .unwrap();
        assert_eq!(spec["points"], 1);
        assert_eq!(spec["kind"], "bar");
    }

    #[test]
    fn detached_hooks_refuse_state() {
        let mut hooks = DetachedHooks;
        let err = hooks.use_state(Value::Null).unwrap_err();
        assert!(err.to_string().contains("ui.useState"));
    }
}
