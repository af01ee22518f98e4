//! Lexical scopes
//!
//! Function scopes may end up referencing themselves through the closures
//! they hold. Every scope created for a component is registered in its
//! [`ScopeArena`], and disposing the arena clears them all, which drops
//! those cycles when the component is torn down.

use crate::interp::RuntimeError;
use crate::value::Value;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::{Arc, Weak};

const PRUNE_THRESHOLD: usize = 4096;

struct Binding {
    value: Value,
    mutable: bool,
}

/// One lexical scope
pub struct Scope {
    parent: Option<Arc<Scope>>,
    vars: RwLock<HashMap<String, Binding>>,
}

impl Scope {
    /// Scope with no parent (the component's globals)
    #[must_use]
    pub fn root() -> Arc<Self> {
        Arc::new(Self {
            parent: None,
            vars: RwLock::new(HashMap::new()),
        })
    }

    pub(crate) fn child(parent: Option<Arc<Scope>>) -> Arc<Self> {
        Arc::new(Self {
            parent,
            vars: RwLock::new(HashMap::new()),
        })
    }

    pub(crate) fn parent(&self) -> Option<&Arc<Scope>> {
        self.parent.as_ref()
    }

    /// Declare a binding in this scope
    pub fn declare(&self, name: &str, value: Value, mutable: bool) -> Result<(), RuntimeError> {
        let mut vars = self.vars.write();
        if vars.contains_key(name) {
            return Err(RuntimeError::Syntax(format!(
                "Identifier '{name}' has already been declared"
            )));
        }
        vars.insert(name.to_string(), Binding { value, mutable });
        Ok(())
    }

    /// Declare or replace a binding (hoisted functions, host globals)
    pub(crate) fn define(&self, name: &str, value: Value) {
        self.vars.write().insert(
            name.to_string(),
            Binding {
                value,
                mutable: false,
            },
        );
    }

    /// Look up a binding declared directly in this scope
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.vars.read().get(name).map(|b| b.value.clone())
    }

    /// Assign to a binding declared directly in this scope; `None` if absent
    pub(crate) fn assign(&self, name: &str, value: Value) -> Option<Result<(), RuntimeError>> {
        let mut vars = self.vars.write();
        let binding = vars.get_mut(name)?;
        if !binding.mutable {
            return Some(Err(RuntimeError::Type(
                "Assignment to constant variable.".to_string(),
            )));
        }
        binding.value = value;
        Some(Ok(()))
    }

    /// Drop every binding
    pub fn clear(&self) {
        self.vars.write().clear();
    }
}

/// Registry of the scopes created on behalf of one component instance
#[derive(Default)]
pub struct ScopeArena {
    scopes: Mutex<Vec<Weak<Scope>>>,
}

impl ScopeArena {
    /// Empty arena
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn track(&self, scope: &Arc<Scope>) {
        let mut scopes = self.scopes.lock();
        if scopes.len() >= PRUNE_THRESHOLD {
            scopes.retain(|s| s.strong_count() > 0);
        }
        scopes.push(Arc::downgrade(scope));
    }

    /// Number of scopes still alive
    #[must_use]
    pub fn live(&self) -> usize {
        self.scopes.lock().iter().filter(|s| s.strong_count() > 0).count()
    }

    /// Clear every live scope, releasing closure cycles
    pub fn dispose(&self) {
        let scopes = std::mem::take(&mut *self.scopes.lock());
        for scope in scopes.iter().filter_map(Weak::upgrade) {
            scope.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redeclaration_is_rejected() {
        let scope = Scope::root();
        scope.declare("a", Value::Num(1.0), false).unwrap();
        let err = scope.declare("a", Value::Num(2.0), false).unwrap_err();
        assert_eq!(err.to_string(), "SyntaxError: Identifier 'a' has already been declared");
    }

    #[test]
    fn const_assignment_fails() {
        let scope = Scope::root();
        scope.declare("a", Value::Num(1.0), false).unwrap();
        scope.declare("b", Value::Num(1.0), true).unwrap();
        assert!(matches!(scope.assign("a", Value::Null), Some(Err(_))));
        assert!(matches!(scope.assign("b", Value::Null), Some(Ok(()))));
        assert!(scope.assign("c", Value::Null).is_none());
    }

    #[test]
    fn dispose_clears_tracked_scopes() {
        let arena = ScopeArena::new();
        let scope = Scope::child(None);
        arena.track(&scope);
        scope.declare("x", Value::Num(1.0), false).unwrap();
        assert_eq!(arena.live(), 1);
        arena.dispose();
        assert!(scope.get("x").is_none());
    }
}
