//! Compiler adapter: source text to [`Factory`]
//!
//! `compile` is pure over its input and never panics: parser panics (which
//! would be bugs) are caught and reported as internal compiler errors.

use crate::ast::{DefaultExport, Module, Stmt};
use crate::capability::CAPABILITY_NAMES;
use crate::lexer::Span;
use crate::parser::Parser;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Which step of the pipeline rejected the source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompileStage {
    /// Tokenizing or parsing
    Syntax,
    /// Module-level checks (exports, declarations, imports)
    Module,
    /// Evaluating the module body against the capabilities
    Instantiation,
    /// A bug in the compiler itself
    Internal,
}

impl fmt::Display for CompileStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Syntax => "SyntaxError",
            Self::Module => "ModuleError",
            Self::Instantiation => "EvaluationError",
            Self::Internal => "InternalCompilerError",
        })
    }
}

/// Structured compile failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize, serde::Deserialize)]
#[error("{stage}: {message}{}", location_suffix(.location.as_ref()))]
pub struct CompileError {
    /// One-line human readable message
    pub message: String,
    /// Full diagnostic: `line:column` and a caret excerpt when located
    pub raw_diagnostic: String,
    /// Pipeline stage
    pub stage: CompileStage,
    /// Position in the source, if known
    #[serde(skip)]
    pub location: Option<Span>,
}

fn location_suffix(location: Option<&Span>) -> String {
    location.map(|span| format!(" ({span})")).unwrap_or_default()
}

impl CompileError {
    /// Syntax error at `span` in `src`
    pub fn syntax(message: impl Into<String>, span: Span, src: &str) -> Self {
        Self::located(CompileStage::Syntax, message.into(), span, src)
    }

    /// Module-level error without a position
    pub fn module(message: impl Into<String>, _src: &str) -> Self {
        Self::unlocated(CompileStage::Module, message.into())
    }

    /// Module-level error at `span`
    pub fn module_at(message: impl Into<String>, span: Span, src: &str) -> Self {
        Self::located(CompileStage::Module, message.into(), span, src)
    }

    /// Failure while evaluating the module body
    pub fn instantiation(message: impl Into<String>) -> Self {
        Self::unlocated(CompileStage::Instantiation, message.into())
    }

    /// Compiler bug surfaced as an error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::unlocated(CompileStage::Internal, message.into())
    }

    fn unlocated(stage: CompileStage, message: String) -> Self {
        Self {
            raw_diagnostic: format!("{stage}: {message}"),
            message,
            stage,
            location: None,
        }
    }

    fn located(stage: CompileStage, message: String, span: Span, src: &str) -> Self {
        Self {
            raw_diagnostic: render_diagnostic(stage, &message, span, src),
            message,
            stage,
            location: Some(span),
        }
    }

    /// Rebuild the excerpt against `src` (used for errors raised inside template fragments)
    #[must_use]
    pub fn relocate(self, src: &str) -> Self {
        match self.location {
            Some(span) => Self::located(self.stage, self.message, span, src),
            None => self,
        }
    }

    /// True if the error was raised before evaluation started
    #[inline]
    #[must_use]
    pub fn is_static(&self) -> bool {
        matches!(self.stage, CompileStage::Syntax | CompileStage::Module)
    }
}

fn render_diagnostic(stage: CompileStage, message: &str, span: Span, src: &str) -> String {
    let line_text = src
        .lines()
        .nth(span.line.saturating_sub(1) as usize)
        .unwrap_or_default();
    let gutter = span.line.to_string();
    let pad = " ".repeat(gutter.len());
    let caret_col = line_text
        .chars()
        .take(span.column.saturating_sub(1) as usize)
        .map(|c| if c == '\t' { '\t' } else { ' ' })
        .collect::<String>();
    format!("{stage}: {message} ({span})\n{pad} |\n{gutter} | {line_text}\n{pad} | {caret_col}^")
}

/// Content hash of a source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceFingerprint(blake3::Hash);

impl SourceFingerprint {
    /// Hash `source`
    #[must_use]
    pub fn of(source: &str) -> Self {
        Self(blake3::hash(source.as_bytes()))
    }

    /// Hex encoding
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }
}

impl fmt::Display for SourceFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex()[..16])
    }
}

/// Compiled component program, ready to be instantiated
#[derive(Debug, Clone)]
pub struct Factory {
    pub(crate) module: Arc<Module>,
    fingerprint: SourceFingerprint,
}

impl Factory {
    /// Hash of the source this factory was compiled from
    #[inline]
    #[must_use]
    pub fn fingerprint(&self) -> SourceFingerprint {
        self.fingerprint
    }

    /// Number of top-level statements
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.module.items.len()
    }
}

/// Outcome of compiling a source text
pub type CompilationResult = Result<Factory, CompileError>;

/// Compile component source text
///
/// # Errors
///
/// Returns a [`CompileError`] for syntax errors, module imports, a missing
/// or duplicated default export, duplicate top-level declarations and
/// declarations that shadow a host capability.
pub fn compile(source: &str) -> CompilationResult {
    let fingerprint = SourceFingerprint::of(source);
    let parsed = catch_unwind(AssertUnwindSafe(|| Parser::new(source).parse_module()))
        .map_err(|panic| CompileError::internal(panic_message(&*panic)))?;
    let module = parsed?;
    check_module(&module, source)?;
    tracing::debug!(%fingerprint, items = module.items.len(), "compiled component source");
    Ok(Factory {
        module: Arc::new(module),
        fingerprint,
    })
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn check_module(module: &Module, src: &str) -> Result<(), CompileError> {
    let mut declared: HashMap<String, Span> = HashMap::new();
    for item in &module.items {
        let (names, span) = match item {
            Stmt::Let {
                declarators, span, ..
            } => {
                let mut names = Vec::new();
                for declarator in declarators {
                    declarator.pattern.bound_names(&mut names);
                }
                (names, *span)
            }
            Stmt::Function(decl) => (decl.name.iter().cloned().collect(), decl.span),
            _ => continue,
        };
        for name in names {
            if CAPABILITY_NAMES.contains(&name.as_str()) {
                return Err(CompileError::module_at(
                    format!("Identifier '{name}' is a host capability and cannot be redeclared"),
                    span,
                    src,
                ));
            }
            if declared.insert(name.clone(), span).is_some() {
                return Err(CompileError::syntax(
                    format!("Identifier '{name}' has already been declared"),
                    span,
                    src,
                ));
            }
        }
    }

    if let DefaultExport::Binding { name, span } = &module.default_export {
        if !declared.contains_key(name) {
            return Err(CompileError::module_at(
                format!("Default export '{name}' is not declared in this module"),
                *span,
                src,
            ));
        }
    }
    Ok(())
}
