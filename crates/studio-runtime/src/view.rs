//! Host view tree
//!
//! Rendered component output is converted into plain [`ViewNode`]s (JSON
//! props, no function values). Handler props (`onClick`) are pulled out into
//! a [`HandlerTable`] keyed by element path and event name.

use serde::Serialize;
use std::collections::HashMap;
use studio_lang::{RenderNode, Value};

/// Text shown in place of a failed widget
pub const FALLBACK_MESSAGE: &str = "This widget failed to render.";

/// Element address: child indexes from the root list
pub type NodePath = Vec<usize>;

/// Event handlers of a rendered tree
pub type HandlerTable = HashMap<(NodePath, String), Value>;

/// A node of the host view
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewNode {
    /// Text content
    Text {
        /// The text
        text: String,
    },
    /// Host element
    Element {
        /// Tag name
        tag: String,
        /// Non-handler props as JSON
        props: serde_json::Map<String, serde_json::Value>,
        /// Events with a handler attached (`click`)
        events: Vec<String>,
        /// Children
        children: Vec<ViewNode>,
    },
}

impl ViewNode {
    /// Text node
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// The fixed fallback shown by a failed boundary
    #[must_use]
    pub fn fallback() -> Self {
        let mut props = serde_json::Map::new();
        props.insert("className".to_string(), "widget-fallback".into());
        props.insert("role".to_string(), "alert".into());
        Self::Element {
            tag: "div".to_string(),
            props,
            events: Vec::new(),
            children: vec![Self::text(FALLBACK_MESSAGE)],
        }
    }

    /// True if this is the fallback view
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        *self == Self::fallback()
    }

    /// Concatenated text of this subtree
    #[must_use]
    pub fn text_content(&self) -> String {
        match self {
            Self::Text { text } => text.clone(),
            Self::Element { children, .. } => children.iter().map(Self::text_content).collect(),
        }
    }

    /// Serialize as HTML (for previews and snapshots)
    #[must_use]
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        match self {
            Self::Text { text } => out.push_str(&escape(text)),
            Self::Element {
                tag,
                props,
                children,
                ..
            } => {
                out.push('<');
                out.push_str(tag);
                for (key, value) in props {
                    let name = if key == "className" { "class" } else { key.as_str() };
                    let value = match value {
                        serde_json::Value::String(s) => s.clone(),
                        serde_json::Value::Bool(true) => String::new(),
                        other => other.to_string(),
                    };
                    out.push_str(&format!(" {name}=\"{}\"", escape(&value)));
                }
                out.push('>');
                for child in children {
                    child.write_html(out);
                }
                out.push_str(&format!("</{tag}>"));
            }
        }
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// `onClick` → `click`
fn event_name(prop: &str) -> Option<String> {
    let rest = prop.strip_prefix("on")?;
    let first = rest.chars().next()?;
    first.is_uppercase().then(|| rest.to_lowercase())
}

/// Convert rendered nodes into view nodes, collecting handlers
#[must_use]
pub fn build_view(nodes: &[RenderNode], handlers: &mut HandlerTable) -> Vec<ViewNode> {
    let mut path = Vec::new();
    build_children(nodes, &mut path, handlers)
}

fn build_children(nodes: &[RenderNode], path: &mut NodePath, handlers: &mut HandlerTable) -> Vec<ViewNode> {
    let mut out = Vec::with_capacity(nodes.len());
    for (index, node) in nodes.iter().enumerate() {
        path.push(index);
        out.push(match node {
            RenderNode::Text(text) => ViewNode::text(text.clone()),
            RenderNode::Element {
                tag,
                attrs,
                children,
            } => {
                let mut props = serde_json::Map::new();
                let mut events = Vec::new();
                for (key, value) in attrs {
                    if value.is_callable() {
                        if let Some(event) = event_name(key) {
                            handlers.insert((path.clone(), event.clone()), value.clone());
                            events.push(event);
                        }
                        continue;
                    }
                    if key == "key" || matches!(value, Value::Undefined) {
                        continue;
                    }
                    props.insert(key.clone(), value.to_json());
                }
                ViewNode::Element {
                    tag: tag.clone(),
                    props,
                    events,
                    children: build_children(children, path, handlers),
                }
            }
        });
        path.pop();
    }
    out
}

/// Find the path of the first element with `tag` (depth-first)
#[must_use]
pub fn find_path(nodes: &[ViewNode], tag: &str) -> Option<NodePath> {
    for (index, node) in nodes.iter().enumerate() {
        if let ViewNode::Element {
            tag: node_tag,
            children,
            ..
        } = node
        {
            if node_tag == tag {
                return Some(vec![index]);
            }
            if let Some(mut rest) = find_path(children, tag) {
                rest.insert(0, index);
                return Some(rest);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use studio_lang::ObjectMap;

    fn element(tag: &str, attrs: Vec<(&str, Value)>, children: Vec<RenderNode>) -> RenderNode {
        RenderNode::Element {
            tag: tag.to_string(),
            attrs: attrs.into_iter().map(|(k, v)| (k.to_string(), v)).collect::<ObjectMap>(),
            children,
        }
    }

    #[test]
    fn handlers_are_extracted_by_path() {
        let click = Value::native("h", |_, _| Ok(Value::Undefined));
        let nodes = vec![element(
            "div",
            vec![("className", Value::str("root"))],
            vec![
                RenderNode::Text("hi".into()),
                element("button", vec![("onClick", click)], vec![RenderNode::Text("go".into())]),
            ],
        )];
        let mut handlers = HandlerTable::new();
        let view = build_view(&nodes, &mut handlers);
        assert!(handlers.contains_key(&(vec![0, 1], "click".to_string())));
        assert_eq!(find_path(&view, "button"), Some(vec![0, 1]));
        assert_eq!(view[0].to_html(), "<div class=\"root\">hi<button>go</button></div>");
    }

    #[test]
    fn fallback_is_recognisable() {
        let fallback = ViewNode::fallback();
        assert!(fallback.is_fallback());
        assert_eq!(fallback.text_content(), FALLBACK_MESSAGE);
        assert!(!ViewNode::text("x").is_fallback());
    }

    #[test]
    fn event_names_follow_handler_convention() {
        assert_eq!(event_name("onClick").as_deref(), Some("click"));
        assert_eq!(event_name("onMouseEnter").as_deref(), Some("mouseenter"));
        assert_eq!(event_name("one"), None);
        assert_eq!(event_name("on"), None);
    }

    #[test]
    fn html_escapes_text() {
        assert_eq!(ViewNode::text("a < b & c").to_html(), "a &lt; b &amp; c");
    }
}
