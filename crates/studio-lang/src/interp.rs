//! Tree-walking evaluator
//!
//! An [`Interp`] borrows the component's global scope, its scope arena, the
//! host capabilities and the render hooks of whoever is driving it (the
//! factory during instantiation, a mount during render and callbacks).

use crate::ast::{
    ArrayItem, BinaryOp, DefaultExport, Expr, FunctionBody, JsxAttr, JsxChild, JsxElement, JsxTag,
    Literal, LogicalOp, Module, ObjectProp, Pattern, PatternElem, Stmt, TemplateChunk, UnaryOp,
};
use crate::builtins;
use crate::capability::{Capabilities, RenderHooks};
use crate::scope::{Scope, ScopeArena};
use crate::value::{Closure, ElementTag, ObjectMap, Value};
use std::sync::Arc;

/// Maximum nesting of function calls and component renders
pub const MAX_CALL_DEPTH: usize = 64;

/// Error raised while evaluating component code
#[derive(Debug, Clone, thiserror::Error)]
pub enum RuntimeError {
    /// Unknown identifier
    #[error("ReferenceError: {0} is not defined")]
    Reference(String),

    /// Operation applied to the wrong kind of value
    #[error("TypeError: {0}")]
    Type(String),

    /// Call depth exceeded or numeric argument out of range
    #[error("RangeError: {0}")]
    Range(String),

    /// Malformed input to a runtime parser, or a redeclared binding
    #[error("SyntaxError: {0}")]
    Syntax(String),

    /// Value raised by a `throw` statement
    #[error("Uncaught {}", thrown_message(.0))]
    Thrown(Value),

    /// Hook misuse or a failure reported by the mount driving the render
    #[error("HookError: {0}")]
    Hook(String),
}

impl RuntimeError {
    /// Build a type error
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::Type(message.into())
    }

    /// Error for calling a value that is not a function
    #[must_use]
    pub fn not_a_function(what: &str) -> Self {
        Self::Type(format!("{what} is not a function"))
    }

    /// True if the error came from a user `throw`
    #[inline]
    #[must_use]
    pub fn is_thrown(&self) -> bool {
        matches!(self, Self::Thrown(_))
    }
}

fn thrown_message(value: &Value) -> String {
    if let Value::Object(map) = value {
        if let Some(message) = map.get("message") {
            let name = map
                .get("name")
                .map_or_else(|| "Error".to_string(), Value::to_display_string);
            return format!("{name}: {}", message.to_display_string());
        }
    }
    value.to_display_string()
}

type Env = Option<Arc<Scope>>;

enum Flow {
    Normal,
    Return(Value),
}

/// Host-facing output of rendering: markup with components expanded
#[derive(Debug, Clone)]
pub enum RenderNode {
    /// Text content
    Text(String),
    /// Host element
    Element {
        /// Intrinsic tag name
        tag: String,
        /// Props (handlers included)
        attrs: ObjectMap,
        /// Rendered children
        children: Vec<RenderNode>,
    },
}

/// Evaluator bound to one component instance and one driver
pub struct Interp<'a> {
    globals: &'a Arc<Scope>,
    arena: &'a ScopeArena,
    capabilities: &'a Capabilities,
    hooks: &'a mut dyn RenderHooks,
    depth: usize,
}

impl<'a> Interp<'a> {
    /// Create an evaluator
    pub fn new(
        globals: &'a Arc<Scope>,
        arena: &'a ScopeArena,
        capabilities: &'a Capabilities,
        hooks: &'a mut dyn RenderHooks,
    ) -> Self {
        Self {
            globals,
            arena,
            capabilities,
            hooks,
            depth: 0,
        }
    }

    /// Hooks of the current driver
    pub fn hooks(&mut self) -> &mut dyn RenderHooks {
        &mut *self.hooks
    }

    /// Host capabilities
    #[must_use]
    pub fn capabilities(&self) -> &Capabilities {
        self.capabilities
    }

    /// Call a function value
    pub fn call(&mut self, callee: &Value, args: Vec<Value>) -> Result<Value, RuntimeError> {
        match callee {
            Value::Function(closure) => {
                let closure = Arc::clone(closure);
                self.enter(|interp| interp.call_closure(&closure, args))
            }
            Value::Native(native) => {
                let native = Arc::clone(native);
                self.enter(|interp| native.invoke(interp, args))
            }
            other => Err(RuntimeError::not_a_function(&other.describe())),
        }
    }

    fn enter<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, RuntimeError>) -> Result<T, RuntimeError> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(RuntimeError::Range("Maximum call stack size exceeded".to_string()));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn new_scope(&self, parent: Env) -> Arc<Scope> {
        let scope = Scope::child(parent);
        self.arena.track(&scope);
        scope
    }

    fn call_closure(&mut self, closure: &Closure, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let scope = self.new_scope(closure.env.clone());
        let env = Some(scope);
        let mut args = args.into_iter();
        for param in &closure.decl.params {
            let arg = args.next().unwrap_or_default();
            self.bind_elem(param, arg, &env, true)?;
        }
        match &closure.decl.body {
            FunctionBody::Expr(expr) => self.eval(expr, &env),
            FunctionBody::Block(stmts) => match self.exec_stmts(stmts, &env)? {
                Flow::Return(value) => Ok(value),
                Flow::Normal => Ok(Value::Undefined),
            },
        }
    }

    // ---- module ----

    /// Evaluate the module body and return the default export
    pub(crate) fn run_module(&mut self, module: &Module) -> Result<Value, RuntimeError> {
        let env: Env = None;
        if let Flow::Return(_) = self.exec_stmts(&module.items, &env)? {
            return Err(RuntimeError::Syntax("Illegal return statement".to_string()));
        }
        match &module.default_export {
            DefaultExport::Binding { name, .. } => self.lookup(name, &env),
            DefaultExport::Expr(expr) => self.eval(expr, &env),
        }
    }

    // ---- bindings ----

    fn declare(&self, env: &Env, name: &str, value: Value, mutable: bool) -> Result<(), RuntimeError> {
        match env {
            Some(scope) => scope.declare(name, value, mutable),
            None => self.globals.declare(name, value, mutable),
        }
    }

    fn lookup(&self, name: &str, env: &Env) -> Result<Value, RuntimeError> {
        for start in [env.as_ref(), Some(self.globals)] {
            let mut current = start;
            while let Some(scope) = current {
                if let Some(value) = scope.get(name) {
                    return Ok(value);
                }
                current = scope.parent();
            }
        }
        Err(RuntimeError::Reference(name.to_string()))
    }

    fn assign(&self, name: &str, value: Value, env: &Env) -> Result<(), RuntimeError> {
        for start in [env.as_ref(), Some(self.globals)] {
            let mut current = start;
            while let Some(scope) = current {
                if let Some(result) = scope.assign(name, value.clone()) {
                    return result;
                }
                current = scope.parent();
            }
        }
        Err(RuntimeError::Reference(name.to_string()))
    }

    fn bind_elem(&mut self, elem: &PatternElem, value: Value, env: &Env, mutable: bool) -> Result<(), RuntimeError> {
        let value = match (&elem.default, value) {
            (Some(default), Value::Undefined) => self.eval(default, env)?,
            (_, value) => value,
        };
        self.bind_pattern(&elem.pattern, value, env, mutable)
    }

    fn bind_pattern(&mut self, pattern: &Pattern, value: Value, env: &Env, mutable: bool) -> Result<(), RuntimeError> {
        match pattern {
            Pattern::Ident(name) => self.declare(env, name, value, mutable),
            Pattern::Array(items) => {
                let values = match &value {
                    Value::Array(values) => values.as_ref().clone(),
                    Value::Str(s) => s.chars().map(|c| Value::str(c.to_string())).collect(),
                    other => {
                        return Err(RuntimeError::type_error(format!(
                            "{} is not iterable",
                            other.describe()
                        )))
                    }
                };
                for (index, item) in items.iter().enumerate() {
                    if let Some(elem) = item {
                        let v = values.get(index).cloned().unwrap_or_default();
                        self.bind_elem(elem, v, env, mutable)?;
                    }
                }
                Ok(())
            }
            Pattern::Object(props) => {
                if value.is_nullish() {
                    return Err(RuntimeError::type_error(format!(
                        "Cannot destructure '{}' as it is {}.",
                        value.to_display_string(),
                        value.to_display_string()
                    )));
                }
                for (key, elem) in props {
                    let v = builtins::get_property(&value, key)?;
                    self.bind_elem(elem, v, env, mutable)?;
                }
                Ok(())
            }
        }
    }

    // ---- statements ----

    fn exec_stmts(&mut self, stmts: &[Stmt], env: &Env) -> Result<Flow, RuntimeError> {
        for stmt in stmts {
            if let Stmt::Function(decl) = stmt {
                if let Some(name) = &decl.name {
                    let closure = Value::Function(Arc::new(Closure {
                        decl: Arc::clone(decl),
                        env: env.clone(),
                    }));
                    match env {
                        Some(scope) => scope.define(name, closure),
                        None => self.globals.define(name, closure),
                    }
                }
            }
        }
        for stmt in stmts {
            if let Flow::Return(value) = self.exec(stmt, env)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_block(&mut self, stmts: &[Stmt], env: &Env) -> Result<Flow, RuntimeError> {
        let inner = Some(self.new_scope(env.clone()));
        self.exec_stmts(stmts, &inner)
    }

    fn exec(&mut self, stmt: &Stmt, env: &Env) -> Result<Flow, RuntimeError> {
        match stmt {
            Stmt::Let {
                declarators,
                mutable,
                ..
            } => {
                for declarator in declarators {
                    let value = match &declarator.init {
                        Some(init) => self.eval(init, env)?,
                        None => Value::Undefined,
                    };
                    self.bind_pattern(&declarator.pattern, value, env, *mutable)?;
                }
                Ok(Flow::Normal)
            }
            Stmt::Function(_) => Ok(Flow::Normal),
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, env)?,
                    None => Value::Undefined,
                };
                Ok(Flow::Return(value))
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                if self.eval(cond, env)?.truthy() {
                    self.exec_block(then_branch, env)
                } else if let Some(else_branch) = else_branch {
                    self.exec_block(else_branch, env)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::ForOf {
                pattern,
                iterable,
                body,
            } => {
                let items = match self.eval(iterable, env)? {
                    Value::Array(items) => items,
                    Value::Str(s) => Arc::new(s.chars().map(|c| Value::str(c.to_string())).collect()),
                    other => {
                        return Err(RuntimeError::type_error(format!(
                            "{} is not iterable",
                            other.describe()
                        )))
                    }
                };
                for item in items.iter() {
                    let inner = Some(self.new_scope(env.clone()));
                    self.bind_pattern(pattern, item.clone(), &inner, true)?;
                    if let Flow::Return(value) = self.exec_stmts(body, &inner)? {
                        return Ok(Flow::Return(value));
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Throw(expr) => Err(RuntimeError::Thrown(self.eval(expr, env)?)),
            Stmt::Expr(expr) => {
                self.eval(expr, env)?;
                Ok(Flow::Normal)
            }
            Stmt::Block(stmts) => self.exec_block(stmts, env),
        }
    }

    // ---- expressions ----

    fn eval(&mut self, expr: &Expr, env: &Env) -> Result<Value, RuntimeError> {
        Ok(self.eval_chain(expr, env)?.unwrap_or_default())
    }

    /// Evaluate, returning `None` when an optional chain short-circuits
    fn eval_chain(&mut self, expr: &Expr, env: &Env) -> Result<Option<Value>, RuntimeError> {
        let value = match expr {
            Expr::Member {
                object,
                property,
                optional,
                ..
            } => {
                let Some(target) = self.eval_chain(object, env)? else {
                    return Ok(None);
                };
                if *optional && target.is_nullish() {
                    return Ok(None);
                }
                builtins::get_property(&target, property)?
            }
            Expr::Index {
                object,
                index,
                optional,
                ..
            } => {
                let Some(target) = self.eval_chain(object, env)? else {
                    return Ok(None);
                };
                if *optional && target.is_nullish() {
                    return Ok(None);
                }
                let key = self.eval(index, env)?;
                builtins::get_index(&target, &key)?
            }
            Expr::Call {
                callee,
                args,
                optional,
                ..
            } => return self.eval_call(callee, args, *optional, env),
            other => self.eval_simple(other, env)?,
        };
        Ok(Some(value))
    }

    fn eval_args(&mut self, args: &[Expr], env: &Env) -> Result<Vec<Value>, RuntimeError> {
        args.iter().map(|arg| self.eval(arg, env)).collect()
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Expr], optional: bool, env: &Env) -> Result<Option<Value>, RuntimeError> {
        // Method calls dispatch on the receiver so builtins on arrays and strings resolve.
        let (receiver, name, member_optional) = match callee {
            Expr::Member {
                object,
                property,
                optional,
                ..
            } => (object, Some(property.clone()), *optional),
            _ => {
                let Some(function) = self.eval_chain(callee, env)? else {
                    return Ok(None);
                };
                if optional && function.is_nullish() {
                    return Ok(None);
                }
                if !function.is_callable() {
                    return Err(RuntimeError::not_a_function(&callee.describe()));
                }
                let args = self.eval_args(args, env)?;
                return self.call(&function, args).map(Some);
            }
        };

        let Some(target) = self.eval_chain(receiver, env)? else {
            return Ok(None);
        };
        if member_optional && target.is_nullish() {
            return Ok(None);
        }
        let name = name.unwrap_or_default();
        if target.is_nullish() {
            return Err(RuntimeError::type_error(format!(
                "Cannot read properties of {} (reading '{name}')",
                target.to_display_string()
            )));
        }
        if let Value::Object(map) = &target {
            let Some(function) = map.get(&name).cloned() else {
                if optional {
                    return Ok(None);
                }
                return Err(RuntimeError::not_a_function(&callee.describe()));
            };
            if optional && function.is_nullish() {
                return Ok(None);
            }
            if !function.is_callable() {
                return Err(RuntimeError::not_a_function(&callee.describe()));
            }
            let args = self.eval_args(args, env)?;
            return self.call(&function, args).map(Some);
        }
        let args = self.eval_args(args, env)?;
        match builtins::call_method(self, &target, &name, args)? {
            Some(value) => Ok(Some(value)),
            None if optional => Ok(None),
            None => Err(RuntimeError::not_a_function(&callee.describe())),
        }
    }

    fn eval_simple(&mut self, expr: &Expr, env: &Env) -> Result<Value, RuntimeError> {
        match expr {
            Expr::Literal(literal) => Ok(match literal {
                Literal::Num(n) => Value::Num(*n),
                Literal::Str(s) => Value::str(s),
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Null => Value::Null,
                Literal::Undefined => Value::Undefined,
            }),
            Expr::Template(chunks) => {
                let mut out = String::new();
                for chunk in chunks {
                    match chunk {
                        TemplateChunk::Text(text) => out.push_str(text),
                        TemplateChunk::Expr(expr) => out.push_str(&self.eval(expr, env)?.to_display_string()),
                    }
                }
                Ok(Value::from(out))
            }
            Expr::Ident(name, _) => self.lookup(name, env),
            Expr::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        ArrayItem::Item(expr) => out.push(self.eval(expr, env)?),
                        ArrayItem::Spread(expr) => match self.eval(expr, env)? {
                            Value::Array(values) => out.extend(values.iter().cloned()),
                            Value::Str(s) => out.extend(s.chars().map(|c| Value::str(c.to_string()))),
                            other => {
                                return Err(RuntimeError::type_error(format!(
                                    "{} is not iterable",
                                    other.describe()
                                )))
                            }
                        },
                    }
                }
                Ok(Value::array(out))
            }
            Expr::Object(props) => {
                let mut map = ObjectMap::new();
                for prop in props {
                    match prop {
                        ObjectProp::Named(key, expr) => {
                            let value = self.eval(expr, env)?;
                            map.insert(key.clone(), value);
                        }
                        ObjectProp::Spread(expr) => {
                            let value = self.eval(expr, env)?;
                            spread_into(&mut map, &value);
                        }
                    }
                }
                Ok(Value::object(map))
            }
            Expr::Function(decl) => Ok(Value::Function(Arc::new(Closure {
                decl: Arc::clone(decl),
                env: env.clone(),
            }))),
            Expr::Unary { op, operand } => {
                if *op == UnaryOp::TypeOf {
                    if let Expr::Ident(name, _) = operand.as_ref() {
                        return Ok(self
                            .lookup(name, env)
                            .map_or(Value::str("undefined"), |v| Value::str(v.type_of())));
                    }
                }
                let value = self.eval(operand, env)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!value.truthy()),
                    UnaryOp::Neg => Value::Num(-value.to_number()),
                    UnaryOp::Plus => Value::Num(value.to_number()),
                    UnaryOp::TypeOf => Value::str(value.type_of()),
                })
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs, env)?;
                let rhs = self.eval(rhs, env)?;
                Ok(binary(*op, &lhs, &rhs))
            }
            Expr::Logical { op, lhs, rhs } => {
                let lhs = self.eval(lhs, env)?;
                let short_circuit = match op {
                    LogicalOp::And => !lhs.truthy(),
                    LogicalOp::Or => lhs.truthy(),
                    LogicalOp::Nullish => !lhs.is_nullish(),
                };
                if short_circuit {
                    Ok(lhs)
                } else {
                    self.eval(rhs, env)
                }
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, env)?.truthy() {
                    self.eval(consequent, env)
                } else {
                    self.eval(alternate, env)
                }
            }
            Expr::Assign { target, value, .. } => {
                let value = self.eval(value, env)?;
                self.assign(target, value.clone(), env)?;
                Ok(value)
            }
            Expr::Element(element) => self.eval_element(element, env),
            Expr::Member { .. } | Expr::Index { .. } | Expr::Call { .. } => self.eval(expr, env),
        }
    }

    fn eval_element(&mut self, element: &JsxElement, env: &Env) -> Result<Value, RuntimeError> {
        let tag = match &element.tag {
            JsxTag::Intrinsic(name) => ElementTag::Intrinsic(Arc::from(name.as_str())),
            JsxTag::Fragment => ElementTag::Fragment,
            JsxTag::Component(expr) => {
                let component = self.eval(expr, env)?;
                if !component.is_callable() {
                    return Err(RuntimeError::type_error(format!(
                        "Element type is invalid: expected a component function but got {} for <{}>",
                        component.type_of(),
                        expr.describe()
                    )));
                }
                ElementTag::Component(component)
            }
        };

        let mut props = ObjectMap::new();
        for attr in &element.attrs {
            match attr {
                JsxAttr::Named(name, expr) => {
                    let value = self.eval(expr, env)?;
                    props.insert(name.clone(), value);
                }
                JsxAttr::Spread(expr) => {
                    let value = self.eval(expr, env)?;
                    spread_into(&mut props, &value);
                }
            }
        }

        let mut children = Vec::with_capacity(element.children.len());
        for child in &element.children {
            children.push(match child {
                JsxChild::Text(text) => Value::str(text),
                JsxChild::Expr(expr) => self.eval(expr, env)?,
                JsxChild::Element(el) => self.eval_element(el, env)?,
            });
        }

        let element = self.capabilities.ui.create_element(tag, props, children)?;
        Ok(Value::Element(Arc::new(element)))
    }

    // ---- rendering ----

    /// Expand components in `value` into host nodes
    pub fn render_value(&mut self, value: &Value) -> Result<Vec<RenderNode>, RuntimeError> {
        let mut out = Vec::new();
        self.render_into(value, &mut out)?;
        Ok(out)
    }

    fn render_into(&mut self, value: &Value, out: &mut Vec<RenderNode>) -> Result<(), RuntimeError> {
        match value {
            Value::Undefined | Value::Null | Value::Bool(_) | Value::Function(_) | Value::Native(_) => Ok(()),
            Value::Num(_) | Value::Str(_) => {
                out.push(RenderNode::Text(value.to_display_string()));
                Ok(())
            }
            Value::Array(items) => {
                for item in items.iter() {
                    self.render_into(item, out)?;
                }
                Ok(())
            }
            Value::Object(_) => Err(RuntimeError::type_error(
                "Objects are not valid as a child (found: object with keys); render an element or a string instead",
            )),
            Value::Element(element) => match &element.tag {
                ElementTag::Fragment => {
                    for child in &element.children {
                        self.render_into(child, out)?;
                    }
                    Ok(())
                }
                ElementTag::Intrinsic(tag) => {
                    let mut children = Vec::new();
                    for child in &element.children {
                        self.render_into(child, &mut children)?;
                    }
                    out.push(RenderNode::Element {
                        tag: tag.to_string(),
                        attrs: element.props.clone(),
                        children,
                    });
                    Ok(())
                }
                ElementTag::Component(component) => {
                    let mut props = element.props.clone();
                    match element.children.as_slice() {
                        [] => {}
                        [single] => {
                            props.insert("children".to_string(), single.clone());
                        }
                        many => {
                            props.insert("children".to_string(), Value::array(many.to_vec()));
                        }
                    }
                    let component = component.clone();
                    self.enter(|interp| {
                        let rendered = interp.call(&component, vec![Value::object(props)])?;
                        interp.render_into(&rendered, out)
                    })
                }
            },
        }
    }
}

fn spread_into(map: &mut ObjectMap, value: &Value) {
    match value {
        Value::Object(source) => {
            for (k, v) in source.iter() {
                map.insert(k.clone(), v.clone());
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                map.insert(i.to_string(), v.clone());
            }
        }
        _ => {}
    }
}

fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Value {
    match op {
        BinaryOp::Add => {
            let stringy = |v: &Value| matches!(v, Value::Str(_) | Value::Array(_) | Value::Object(_) | Value::Element(_));
            if stringy(lhs) || stringy(rhs) {
                Value::from(format!("{}{}", lhs.to_display_string(), rhs.to_display_string()))
            } else {
                Value::Num(lhs.to_number() + rhs.to_number())
            }
        }
        BinaryOp::Sub => Value::Num(lhs.to_number() - rhs.to_number()),
        BinaryOp::Mul => Value::Num(lhs.to_number() * rhs.to_number()),
        BinaryOp::Div => Value::Num(lhs.to_number() / rhs.to_number()),
        BinaryOp::Rem => Value::Num(lhs.to_number() % rhs.to_number()),
        BinaryOp::Eq => Value::Bool(lhs.loose_eq(rhs)),
        BinaryOp::NotEq => Value::Bool(!lhs.loose_eq(rhs)),
        BinaryOp::StrictEq => Value::Bool(lhs.strict_eq(rhs)),
        BinaryOp::StrictNotEq => Value::Bool(!lhs.strict_eq(rhs)),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            let ordering = match (lhs, rhs) {
                (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                _ => lhs.to_number().partial_cmp(&rhs.to_number()),
            };
            let Some(ordering) = ordering else {
                return Value::Bool(false);
            };
            Value::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::LtEq => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::capability::{Capabilities, DetachedHooks};
    use crate::compile::compile;
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    fn eval_str(expr_src: &str) -> String {
        run(&format!("return {expr_src};"))
            .expect("evaluates")
            .to_display_string()
    }

    fn run(body: &str) -> Result<Value, String> {
        let src = format!("export default function W(props) {{ {body} }}");
        let factory = compile(&src).map_err(|e| e.to_string())?;
        let component = factory
            .instantiate(&Capabilities::default())
            .map_err(|e| e.to_string())?;
        component
            .invoke(component.export(), vec![Value::Undefined], &mut DetachedHooks)
            .map_err(|e| e.to_string())
    }

    #[test]
    fn arithmetic_and_strings() {
        assert_eq!(eval_str("1 + 2 * 3"), "7");
        assert_eq!(eval_str("'a' + 1"), "a1");
        assert_eq!(eval_str("`x=${1 + 1}`"), "x=2");
        assert_eq!(eval_str("10 % 4"), "2");
    }

    #[test]
    fn logical_operators_short_circuit() {
        assert_eq!(eval_str("null ?? 'd'"), "d");
        assert_eq!(eval_str("0 || 'x'"), "x");
        assert_eq!(eval_str("0 && missing"), "0");
    }

    #[test]
    fn optional_chain_short_circuits_whole_chain() {
        assert_eq!(run("const a = undefined; return a?.b.c;").unwrap().type_of(), "undefined");
    }

    #[test]
    fn destructuring_with_defaults() {
        let v = run("const { a = 1, b: [x, y = 3] = [] } = { b: [2] }; return a + x + y;").unwrap();
        assert_eq!(v.to_display_string(), "6");
    }

    #[test]
    fn closures_capture_their_scope() {
        let v = run("let n = 1; const inc = () => { n += 1; return n; }; inc(); return inc();").unwrap();
        assert_eq!(v.to_display_string(), "3");
    }

    #[test]
    fn for_of_and_if() {
        let v = run(
            "let total = 0; for (const x of [1, 2, 3, 4]) { if (x % 2 === 0) { total += x; } } return total;",
        )
        .unwrap();
        assert_eq!(v.to_display_string(), "6");
    }

    #[test]
    fn undeclared_identifier_is_reference_error() {
        let err = run("return Bogus();").unwrap_err();
        assert_eq!(err, "ReferenceError: Bogus is not defined");
    }

    #[test]
    fn const_reassignment_is_type_error() {
        let err = run("const a = 1; a = 2; return a;").unwrap_err();
        assert_eq!(err, "TypeError: Assignment to constant variable.");
    }

    #[test]
    fn runaway_recursion_is_range_error() {
        let err = run("const f = (n) => f(n + 1); return f(0);").unwrap_err();
        assert_eq!(err, "RangeError: Maximum call stack size exceeded");
    }

    #[test]
    fn thrown_errors_render_like_javascript() {
        let err = run("throw new Error('boom');").unwrap_err();
        assert_eq!(err, "Uncaught Error: boom");
    }

    #[test]
    fn calling_a_non_function_names_the_callee() {
        let err = run("const data = { rows: 1 }; return data.rows.map((r) => r);").unwrap_err();
        assert_eq!(err, "TypeError: data.rows.map is not a function");
    }

    #[test]
    fn reading_from_undefined_is_type_error() {
        let err = run("const d = undefined; return d.x;").unwrap_err();
        assert_eq!(err, "TypeError: Cannot read properties of undefined (reading 'x')");
    }
}
