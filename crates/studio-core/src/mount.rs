//! Single mount entry point for the studio preview and grid cells

use crate::error::MountError;
use std::sync::Arc;
use studio_lang::{compile, Capabilities, Value};
use studio_registry::WidgetRegistry;
use studio_runtime::{ContainmentBoundary, MountOutcome};

/// What to mount
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountSource {
    /// A published widget, by id
    Widget(String),
    /// Unpublished source text
    Adhoc(String),
}

/// Mount `source` into `container` using the process-wide registry
///
/// # Errors
///
/// See [`mount_with`].
pub fn mount(
    source: &MountSource,
    capabilities: &Capabilities,
    container: &mut ContainmentBoundary,
    props: Value,
) -> Result<MountOutcome, MountError> {
    mount_with(&WidgetRegistry::global(), source, capabilities, container, props)
}

/// Mount `source` into `container` using `registry` for widget ids
///
/// Render failures are not errors: they come back as
/// [`MountOutcome::RenderError`] with the container showing the fallback.
///
/// Calling this again for a container that already shows the same source is
/// a props update: the mounted instance keeps its state, timers and the
/// capabilities it was instantiated with. A new source, or a container
/// showing the fallback, gets a fresh instance.
///
/// # Errors
///
/// - [`MountError::UnknownWidget`] if the id is not registered; the
///   container is left untouched
/// - [`MountError::Compile`] if the source does not compile or its module
///   body fails; the container shows the fallback
pub fn mount_with(
    registry: &WidgetRegistry,
    source: &MountSource,
    capabilities: &Capabilities,
    container: &mut ContainmentBoundary,
    props: Value,
) -> Result<MountOutcome, MountError> {
    let compiled = match source {
        MountSource::Widget(id) => {
            let entry = registry
                .get(id)
                .ok_or_else(|| MountError::UnknownWidget(id.clone()))?;
            entry.compiled().clone()
        }
        MountSource::Adhoc(text) => compile(text),
    };
    if let Ok(factory) = &compiled {
        let mounted = container
            .component()
            .is_some_and(|component| component.fingerprint() == factory.fingerprint());
        if mounted {
            return Ok(container.update(props));
        }
    }
    let component = compiled.and_then(|factory| factory.instantiate(capabilities));
    match component {
        Ok(component) => Ok(container.mount(Arc::new(component), props)),
        Err(error) => {
            container.reject(&error);
            Err(MountError::Compile(error))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use studio_registry::WidgetDefinition;
    use studio_runtime::BoundaryState;

    #[test]
    fn mounts_registered_widgets() {
        let registry = WidgetRegistry::new();
        registry
            .register(WidgetDefinition::new("kpi1", "export default ({ label }) => <b>{label}</b>;"))
            .unwrap();
        let mut cell = ContainmentBoundary::new("cell");
        let props = Value::from_json(&serde_json::json!({ "label": "Revenue" }));
        let outcome = mount_with(&registry, &MountSource::Widget("kpi1".into()), &Capabilities::default(), &mut cell, props).unwrap();
        assert!(outcome.is_stable());
        assert_eq!(cell.view()[0].text_content(), "Revenue");
    }

    #[test]
    fn remounting_the_same_widget_updates_props() {
        let registry = WidgetRegistry::new();
        registry
            .register(WidgetDefinition::new(
                "counter",
                r"export default function Counter({ label }) {
                    const [n, setN] = ui.useState(0);
                    return <button onClick={() => setN(n + 1)}>{`${label} ${n}`}</button>;
                }",
            ))
            .unwrap();
        let widget = MountSource::Widget("counter".into());
        let caps = Capabilities::default();
        let mut cell = ContainmentBoundary::new("cell");
        let props = |label: &str| Value::from_json(&serde_json::json!({ "label": label }));

        mount_with(&registry, &widget, &caps, &mut cell, props("a")).unwrap();
        let first = cell.component_id();
        cell.dispatch(&[0], "click", Value::Undefined).unwrap();

        let outcome = mount_with(&registry, &widget, &caps, &mut cell, props("b")).unwrap();
        assert!(outcome.is_stable());
        assert_eq!(cell.component_id(), first);
        assert_eq!(cell.view()[0].text_content(), "b 1");

        registry
            .update("counter", WidgetDefinition::new("counter", "export default () => <i>v2</i>;"))
            .unwrap();
        mount_with(&registry, &widget, &caps, &mut cell, props("c")).unwrap();
        assert_ne!(cell.component_id(), first);
        assert_eq!(cell.view()[0].text_content(), "v2");
    }

    #[test]
    fn unknown_widget_leaves_container_alone() {
        let registry = WidgetRegistry::new();
        let mut cell = ContainmentBoundary::new("cell");
        let err = mount_with(&registry, &MountSource::Widget("nope".into()), &Capabilities::default(), &mut cell, Value::Undefined)
            .unwrap_err();
        assert_eq!(err, MountError::UnknownWidget("nope".into()));
        assert_eq!(cell.state(), BoundaryState::Idle);
    }

    #[test]
    fn compile_failure_shows_fallback() {
        let mut cell = ContainmentBoundary::new("cell");
        let err = mount(
            &MountSource::Adhoc("export default function (".into()),
            &Capabilities::default(),
            &mut cell,
            Value::Undefined,
        )
        .unwrap_err();
        assert!(matches!(err, MountError::Compile(_)));
        assert!(cell.shows_fallback());
    }

    #[test]
    fn render_failure_is_an_outcome() {
        let mut cell = ContainmentBoundary::new("cell");
        let outcome = mount(
            &MountSource::Adhoc("export default function W() { return Bogus(); }".into()),
            &Capabilities::default(),
            &mut cell,
            Value::Undefined,
        )
        .unwrap();
        assert_eq!(outcome.error().map(|e| e.message.as_str()), Some("ReferenceError: Bogus is not defined"));
    }
}
