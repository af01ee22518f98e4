//! Runtime values of the component language
//!
//! Values are immutable once constructed: arrays and objects are shared
//! behind `Arc` and every "mutating" builtin returns a new value.

use crate::ast::FunctionDecl;
use crate::interp::{Interp, RuntimeError};
use crate::scope::Scope;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Object property map (insertion ordered, like JavaScript objects)
pub type ObjectMap = IndexMap<String, Value>;

/// Signature of host-implemented functions
pub type NativeImpl = dyn Fn(&mut Interp<'_>, Vec<Value>) -> Result<Value, RuntimeError> + Send + Sync;

/// A runtime value
#[derive(Clone, Default)]
pub enum Value {
    /// `undefined`
    #[default]
    Undefined,
    /// `null`
    Null,
    /// Boolean
    Bool(bool),
    /// IEEE-754 double
    Num(f64),
    /// String
    Str(Arc<str>),
    /// Array
    Array(Arc<Vec<Value>>),
    /// Plain object
    Object(Arc<ObjectMap>),
    /// Function defined in component source
    Function(Arc<Closure>),
    /// Function implemented by the host
    Native(Arc<NativeFn>),
    /// Markup element produced by JSX or `ui.createElement`
    Element(Arc<Element>),
}

/// Function value closing over its defining scope
pub struct Closure {
    pub(crate) decl: Arc<FunctionDecl>,
    /// `None` means the component's global scope
    pub(crate) env: Option<Arc<Scope>>,
}

impl Closure {
    /// Declared name, if any
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.decl.name.as_deref()
    }
}

/// Host function exposed to component code
pub struct NativeFn {
    name: String,
    func: Box<NativeImpl>,
}

impl NativeFn {
    /// Wrap a host closure
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&mut Interp<'_>, Vec<Value>) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }

    /// Function name used in diagnostics
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn invoke(&self, interp: &mut Interp<'_>, args: Vec<Value>) -> Result<Value, RuntimeError> {
        (self.func)(interp, args)
    }
}

/// Element tag
#[derive(Clone, Debug)]
pub enum ElementTag {
    /// Host element such as `div`
    Intrinsic(Arc<str>),
    /// Component function invoked with the element's props
    Component(Value),
    /// Children without a wrapper
    Fragment,
}

/// Unrendered markup element
#[derive(Clone, Debug)]
pub struct Element {
    /// Tag
    pub tag: ElementTag,
    /// Props excluding children
    pub props: ObjectMap,
    /// Children in source order
    pub children: Vec<Value>,
}

impl Value {
    /// Build a string value
    #[inline]
    pub fn str(s: impl AsRef<str>) -> Self {
        Self::Str(Arc::from(s.as_ref()))
    }

    /// Build an array value
    #[inline]
    #[must_use]
    pub fn array(items: Vec<Value>) -> Self {
        Self::Array(Arc::new(items))
    }

    /// Build an object value
    #[inline]
    #[must_use]
    pub fn object(map: ObjectMap) -> Self {
        Self::Object(Arc::new(map))
    }

    /// Wrap a host function
    pub fn native(
        name: impl Into<String>,
        func: impl Fn(&mut Interp<'_>, Vec<Value>) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    ) -> Self {
        Self::Native(Arc::new(NativeFn::new(name, func)))
    }

    /// `true` for `null` and `undefined`
    #[inline]
    #[must_use]
    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    /// `true` for functions of either kind
    #[inline]
    #[must_use]
    pub fn is_callable(&self) -> bool {
        matches!(self, Self::Function(_) | Self::Native(_))
    }

    /// JavaScript truthiness
    #[must_use]
    pub fn truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Num(n) => *n != 0.0 && !n.is_nan(),
            Self::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Result of the `typeof` operator
    #[must_use]
    pub fn type_of(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Bool(_) => "boolean",
            Self::Num(_) => "number",
            Self::Str(_) => "string",
            Self::Function(_) | Self::Native(_) => "function",
            Self::Null | Self::Array(_) | Self::Object(_) | Self::Element(_) => "object",
        }
    }

    /// Numeric conversion (`Number(x)`)
    #[must_use]
    pub fn to_number(&self) -> f64 {
        match self {
            Self::Null => 0.0,
            Self::Bool(b) => f64::from(u8::from(*b)),
            Self::Num(n) => *n,
            Self::Str(s) => {
                let t = s.trim();
                if t.is_empty() {
                    0.0
                } else {
                    t.parse().unwrap_or(f64::NAN)
                }
            }
            Self::Array(items) => match items.as_slice() {
                [] => 0.0,
                [single] => single.to_number(),
                _ => f64::NAN,
            },
            _ => f64::NAN,
        }
    }

    /// String conversion (`String(x)`)
    #[must_use]
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_string(),
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Num(n) => format_number(*n),
            Self::Str(s) => s.to_string(),
            Self::Array(items) => items
                .iter()
                .map(|v| if v.is_nullish() { String::new() } else { v.to_display_string() })
                .collect::<Vec<_>>()
                .join(","),
            Self::Object(_) | Self::Element(_) => "[object Object]".to_string(),
            Self::Function(c) => format!("function {}() {{ [code] }}", c.name().unwrap_or("")),
            Self::Native(n) => format!("function {}() {{ [native code] }}", n.name()),
        }
    }

    /// Short description used in error messages
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Str(s) => format!("\"{s}\""),
            Self::Array(_) => "array".to_string(),
            Self::Object(_) => "object".to_string(),
            Self::Element(_) => "element".to_string(),
            Self::Function(_) | Self::Native(_) => "function".to_string(),
            other => other.to_display_string(),
        }
    }

    /// `===`
    #[must_use]
    pub fn strict_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            #[allow(clippy::float_cmp)]
            (Self::Num(a), Self::Num(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => Arc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => Arc::ptr_eq(a, b),
            (Self::Native(a), Self::Native(b)) => Arc::ptr_eq(a, b),
            (Self::Element(a), Self::Element(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// `==`
    #[must_use]
    pub fn loose_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Self::Num(_) | Self::Bool(_), Self::Str(_) | Self::Bool(_))
            | (Self::Str(_) | Self::Bool(_), Self::Num(_)) => {
                #[allow(clippy::float_cmp)]
                let eq = self.to_number() == other.to_number();
                eq
            }
            _ => self.strict_eq(other),
        }
    }

    /// Property key conversion for `obj[key]`
    #[must_use]
    pub fn to_property_key(&self) -> String {
        self.to_display_string()
    }

    /// Convert to JSON (`JSON.stringify` semantics: functions and `undefined` drop out of objects)
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as J;
        match self {
            Self::Undefined | Self::Null | Self::Function(_) | Self::Native(_) => J::Null,
            Self::Bool(b) => J::Bool(*b),
            Self::Num(n) => serde_json::Number::from_f64(*n).map_or(J::Null, J::Number),
            Self::Str(s) => J::String(s.to_string()),
            Self::Array(items) => J::Array(items.iter().map(Self::to_json).collect()),
            Self::Object(map) => J::Object(
                map.iter()
                    .filter(|(_, v)| !matches!(v, Self::Undefined | Self::Function(_) | Self::Native(_)))
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Self::Element(el) => {
                let mut obj = serde_json::Map::new();
                let tag = match &el.tag {
                    ElementTag::Intrinsic(name) => name.to_string(),
                    ElementTag::Component(_) => "component".to_string(),
                    ElementTag::Fragment => "fragment".to_string(),
                };
                obj.insert("type".to_string(), J::String(tag));
                J::Object(obj)
            }
        }
    }

    /// Convert from JSON
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Self {
        use serde_json::Value as J;
        match json {
            J::Null => Self::Null,
            J::Bool(b) => Self::Bool(*b),
            J::Number(n) => Self::Num(n.as_f64().unwrap_or(f64::NAN)),
            J::String(s) => Self::str(s),
            J::Array(items) => Self::array(items.iter().map(Self::from_json).collect()),
            J::Object(map) => Self::object(map.iter().map(|(k, v)| (k.clone(), Self::from_json(v))).collect()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Array(items) => f.debug_list().entries(items.iter()).finish(),
            Self::Object(map) => f.debug_map().entries(map.iter()).finish(),
            Self::Function(c) => write!(f, "[Function {}]", c.name().unwrap_or("(anonymous)")),
            Self::Native(n) => write!(f, "[Function {}]", n.name()),
            Self::Element(el) => write!(f, "<{:?}>", el.tag),
            other => f.write_str(&other.to_display_string()),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Num(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(Arc::from(s))
    }
}

/// Format a number the way JavaScript's `String(n)` does for everyday values
#[must_use]
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n.fract() == 0.0 && n.abs() < 1e21 {
        #[allow(clippy::cast_possible_truncation)]
        return format!("{}", n as i128);
    }
    format!("{n}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn numbers_format_like_javascript() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn truthiness() {
        assert!(!Value::str("").truthy());
        assert!(Value::str("0").truthy());
        assert!(!Value::Num(f64::NAN).truthy());
        assert!(Value::array(vec![]).truthy());
    }

    #[test]
    fn loose_and_strict_equality() {
        assert!(Value::Num(1.0).loose_eq(&Value::str("1")));
        assert!(!Value::Num(1.0).strict_eq(&Value::str("1")));
        assert!(Value::Null.loose_eq(&Value::Undefined));
        assert!(!Value::Null.strict_eq(&Value::Undefined));
    }

    #[test]
    fn json_conversion_drops_functions() {
        let mut map = ObjectMap::new();
        map.insert("a".into(), Value::Num(1.0));
        map.insert("f".into(), Value::native("f", |_, _| Ok(Value::Undefined)));
        let json = Value::object(map).to_json();
        assert_eq!(json, serde_json::json!({ "a": 1.0 }));
    }

    #[test]
    fn array_display_joins_with_commas() {
        let v = Value::array(vec![Value::Num(1.0), Value::Null, Value::str("x")]);
        assert_eq!(v.to_display_string(), "1,,x");
    }
}
