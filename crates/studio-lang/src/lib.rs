//! Studio Lang - component language for dynamically generated widgets
//!
//! Turns untrusted component source text (a TSX-like subset) into a
//! mountable component value without a host `eval`:
//!
//! - [`compile`]: source text to [`Factory`], or a structured [`CompileError`]
//! - [`Factory::instantiate`]: binds the host [`Capabilities`] and evaluates
//!   the module body into a [`ComponentValue`]
//! - [`ComponentValue::render`]: runs the component against a
//!   [`RenderHooks`] implementation supplied by the mount
//!
//! # Example
//!
//! ```rust,ignore
//! use studio_lang::{compile, Capabilities, DetachedHooks, Value};
//!
//! let factory = compile("export default function W() { return <b>hi</b>; }")?;
//! let component = factory.instantiate(&Capabilities::default())?;
//! let nodes = component.render(&Value::Undefined, &mut DetachedHooks)?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod ast;
mod builtins;
pub mod capability;
pub mod compile;
pub mod factory;
pub mod interp;
mod lexer;
mod parser;
pub mod scope;
pub mod value;

pub use builtins::PRELUDE_NAMES;
pub use capability::{
    BasicCharts, Capabilities, ChartLibrary, DetachedHooks, HtmlPrimitive, RenderHooks,
    ScriptError, ScriptLoader, StaticScriptLoader, UiPrimitive, CAPABILITY_NAMES,
};
pub use compile::{compile, CompilationResult, CompileError, CompileStage, Factory, SourceFingerprint};
pub use factory::{instantiate, ComponentId, ComponentValue};
pub use interp::{Interp, RenderNode, RuntimeError, MAX_CALL_DEPTH};
pub use lexer::Span;
pub use value::{Element, ElementTag, ObjectMap, Value};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with Studio Lang
    pub use crate::{
        compile, Capabilities, CompileError, ComponentValue, Factory, RenderHooks, RenderNode,
        RuntimeError, Value,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
