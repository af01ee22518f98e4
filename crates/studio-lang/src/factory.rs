//! Component factory: compiled program + capabilities → component value

use crate::builtins;
use crate::capability::{self, Capabilities, DetachedHooks, RenderHooks};
use crate::compile::{panic_message, CompileError, Factory, SourceFingerprint};
use crate::interp::{Interp, RenderNode, RuntimeError};
use crate::scope::{Scope, ScopeArena};
use crate::value::Value;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use ulid::Ulid;

/// Identity of one instantiation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(Ulid);

impl ComponentId {
    fn new() -> Self {
        Self(Ulid::new())
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmp_{}", self.0)
    }
}

/// Mountable component produced by [`Factory::instantiate`]
///
/// Owns the component's global scope. Dropping it clears every scope the
/// component created, so closures that captured their own scope are freed.
pub struct ComponentValue {
    id: ComponentId,
    fingerprint: SourceFingerprint,
    globals: Arc<Scope>,
    arena: ScopeArena,
    capabilities: Capabilities,
    export: Value,
}

impl Factory {
    /// Bind `capabilities` into a fresh global scope and evaluate the module body
    ///
    /// # Errors
    ///
    /// Runtime errors raised by top-level code, and a default export that is
    /// not a function, are reported as instantiation-stage [`CompileError`]s.
    pub fn instantiate(&self, capabilities: &Capabilities) -> Result<ComponentValue, CompileError> {
        catch_unwind(AssertUnwindSafe(|| self.instantiate_inner(capabilities)))
            .map_err(|panic| CompileError::internal(panic_message(&*panic)))?
    }

    fn instantiate_inner(&self, capabilities: &Capabilities) -> Result<ComponentValue, CompileError> {
        let host = Scope::root();
        builtins::install_prelude(&host);
        capability::install(&host, capabilities);
        let globals = Scope::child(Some(host));
        let arena = ScopeArena::new();

        let evaluated = {
            let mut hooks = DetachedHooks;
            let mut interp = Interp::new(&globals, &arena, capabilities, &mut hooks);
            interp.run_module(&self.module)
        };
        let export = match evaluated {
            Ok(export) => export,
            Err(err) => {
                arena.dispose();
                return Err(CompileError::instantiation(err.to_string()));
            }
        };
        if !export.is_callable() {
            arena.dispose();
            return Err(CompileError::instantiation(format!(
                "The default export must be a component function, found {}",
                export.type_of()
            )));
        }

        let component = ComponentValue {
            id: ComponentId::new(),
            fingerprint: self.fingerprint(),
            globals,
            arena,
            capabilities: capabilities.clone(),
            export,
        };
        tracing::debug!(component = %component.id, source = %component.fingerprint, "instantiated component");
        Ok(component)
    }
}

/// Free-function form of [`Factory::instantiate`]
///
/// # Errors
///
/// See [`Factory::instantiate`].
pub fn instantiate(factory: &Factory, capabilities: &Capabilities) -> Result<ComponentValue, CompileError> {
    factory.instantiate(capabilities)
}

impl ComponentValue {
    /// Identity of this instantiation
    #[inline]
    #[must_use]
    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// Hash of the source this component was built from
    #[inline]
    #[must_use]
    pub fn fingerprint(&self) -> SourceFingerprint {
        self.fingerprint
    }

    /// The default-exported component function
    #[inline]
    #[must_use]
    pub fn export(&self) -> &Value {
        &self.export
    }

    /// Capabilities bound at instantiation
    #[inline]
    #[must_use]
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Render with `props`, expanding nested components into host nodes
    ///
    /// # Errors
    ///
    /// Any [`RuntimeError`] raised by component code.
    pub fn render(&self, props: &Value, hooks: &mut dyn RenderHooks) -> Result<Vec<RenderNode>, RuntimeError> {
        let mut interp = Interp::new(&self.globals, &self.arena, &self.capabilities, hooks);
        let tree = interp.call(&self.export, vec![props.clone()])?;
        interp.render_value(&tree)
    }

    /// Call a function value owned by this component (event handler, timer or listener callback)
    ///
    /// # Errors
    ///
    /// Any [`RuntimeError`] raised by the callback.
    pub fn invoke(&self, callback: &Value, args: Vec<Value>, hooks: &mut dyn RenderHooks) -> Result<Value, RuntimeError> {
        let mut interp = Interp::new(&self.globals, &self.arena, &self.capabilities, hooks);
        interp.call(callback, args)
    }

    /// Number of evaluation scopes still alive
    #[must_use]
    pub fn live_scopes(&self) -> usize {
        self.arena.live()
    }
}

impl Drop for ComponentValue {
    fn drop(&mut self) {
        self.arena.dispose();
        self.globals.clear();
    }
}

impl fmt::Debug for ComponentValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentValue")
            .field("id", &self.id)
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile;
    use crate::value::ObjectMap;
    use pretty_assertions::assert_eq;

    fn text_of(nodes: &[RenderNode]) -> String {
        let mut out = String::new();
        for node in nodes {
            match node {
                RenderNode::Text(t) => out.push_str(t),
                RenderNode::Element { children, .. } => out.push_str(&text_of(children)),
            }
        }
        out
    }

    fn props(entries: &[(&str, Value)]) -> Value {
        Value::object(entries.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect::<ObjectMap>())
    }

    #[test]
    fn each_instantiation_has_a_fresh_identity() {
        let factory = compile("export default function W() { return null; }").unwrap();
        let caps = Capabilities::default();
        let a = factory.instantiate(&caps).unwrap();
        let b = factory.instantiate(&caps).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn renders_nested_components_with_props() {
        let src = r#"
            interface CardProps { title: string; children?: any }
            function Card({ title, children }: CardProps) {
              return <section><h2>{title}</h2>{children}</section>;
            }
            export default function Widget(props) {
              const rows = props.rows ?? [];
              return (
                <Card title="Sales">
                  {rows.map((r) => <p key={r.id}>{r.label}: {r.value.toLocaleString()}</p>)}
                </Card>
              );
            }
        "#;
        let factory = compile(src).unwrap();
        let component = factory.instantiate(&Capabilities::default()).unwrap();
        let rows = Value::from_json(&serde_json::json!([
            { "id": 1, "label": "EU", "value": 12500 },
            { "id": 2, "label": "US", "value": 980 }
        ]));
        let nodes = component.render(&props(&[("rows", rows)]), &mut DetachedHooks).unwrap();
        assert_eq!(text_of(&nodes), "SalesEU: 12,500US: 980");
        let RenderNode::Element { tag, .. } = &nodes[0] else {
            panic!("expected element");
        };
        assert_eq!(tag, "section");
    }

    #[test]
    fn top_level_error_is_reported_as_compile_error() {
        let factory = compile("const x = missing.value;\nexport default function W() { return x; }").unwrap();
        let err = factory.instantiate(&Capabilities::default()).unwrap_err();
        assert_eq!(err.stage, crate::compile::CompileStage::Instantiation);
        assert_eq!(err.message, "ReferenceError: missing is not defined");
    }

    #[test]
    fn non_function_export_is_rejected() {
        let factory = compile("export default 42;").unwrap();
        let err = factory.instantiate(&Capabilities::default()).unwrap_err();
        assert!(err.message.contains("found number"));
    }

    #[test]
    fn charts_capability_produces_chart_elements() {
        let src = "export default function W() { return charts.line({ data: [{ t: 1, v: 2 }], xKey: 't', yKey: 'v' }); }";
        let component = compile(src).unwrap().instantiate(&Capabilities::default()).unwrap();
        let nodes = component.render(&Value::Undefined, &mut DetachedHooks).unwrap();
        let RenderNode::Element { tag, attrs, .. } = &nodes[0] else {
            panic!("expected chart element");
        };
        assert_eq!(tag, "chart");
        assert_eq!(attrs.get("kind").map(Value::to_display_string).as_deref(), Some("line"));
    }

    #[test]
    fn recursive_component_hits_the_depth_guard() {
        let component = compile("export default function W() { return <W />; }")
            .unwrap()
            .instantiate(&Capabilities::default())
            .unwrap();
        let err = component.render(&Value::Undefined, &mut DetachedHooks).unwrap_err();
        assert!(matches!(err, RuntimeError::Range(_)));
    }

    #[test]
    fn compiling_twice_gives_equivalent_output() {
        let src = "export default ({ n }) => <b>{n * 2}</b>;";
        let render = || {
            let component = compile(src).unwrap().instantiate(&Capabilities::default()).unwrap();
            let nodes = component
                .render(&props(&[("n", Value::Num(21.0))]), &mut DetachedHooks)
                .unwrap();
            text_of(&nodes)
        };
        assert_eq!(render(), render());
        assert_eq!(render(), "42");
    }
}
