//! Prelude globals and builtin methods on primitive values

use crate::interp::{Interp, RuntimeError};
use crate::scope::Scope;
use crate::value::{format_number, ObjectMap, Value};
use std::cmp::Ordering;
use std::sync::Arc;

/// Names bound in every component's global scope besides the capabilities
pub const PRELUDE_NAMES: &[&str] = &[
    "Math", "JSON", "Object", "Array", "String", "Number", "Boolean", "Date", "Error", "isNaN", "console",
    "NaN", "Infinity",
];

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

fn num_arg(args: &[Value], index: usize) -> f64 {
    args.get(index).map_or(f64::NAN, Value::to_number)
}

fn object(entries: Vec<(&str, Value)>) -> Value {
    Value::object(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
}

fn math_fn(name: &'static str, f: fn(f64) -> f64) -> (&'static str, Value) {
    (name, Value::native(format!("Math.{name}"), move |_, args| Ok(Value::Num(f(num_arg(&args, 0))))))
}

/// Bind the prelude into `globals`
pub(crate) fn install_prelude(globals: &Scope) {
    globals.define("NaN", Value::Num(f64::NAN));
    globals.define("Infinity", Value::Num(f64::INFINITY));

    let mut math = vec![
        ("PI", Value::Num(std::f64::consts::PI)),
        ("E", Value::Num(std::f64::consts::E)),
        math_fn("floor", f64::floor),
        math_fn("ceil", f64::ceil),
        math_fn("abs", f64::abs),
        math_fn("sqrt", f64::sqrt),
        math_fn("trunc", f64::trunc),
        math_fn("round", |n| (n + 0.5).floor()),
        math_fn("sign", |n| if n == 0.0 || n.is_nan() { n } else { n.signum() }),
    ];
    math.push((
        "pow",
        Value::native("Math.pow", |_, args| Ok(Value::Num(num_arg(&args, 0).powf(num_arg(&args, 1))))),
    ));
    math.push((
        "min",
        Value::native("Math.min", |_, args| {
            Ok(Value::Num(args.iter().map(Value::to_number).fold(f64::INFINITY, |a, b| {
                if a.is_nan() || b.is_nan() { f64::NAN } else { a.min(b) }
            })))
        }),
    ));
    math.push((
        "max",
        Value::native("Math.max", |_, args| {
            Ok(Value::Num(args.iter().map(Value::to_number).fold(f64::NEG_INFINITY, |a, b| {
                if a.is_nan() || b.is_nan() { f64::NAN } else { a.max(b) }
            })))
        }),
    ));
    math.push(("random", Value::native("Math.random", |_, _| Ok(Value::Num(rand::random::<f64>())))));
    globals.define("Math", object(math));

    globals.define(
        "JSON",
        object(vec![
            (
                "stringify",
                Value::native("JSON.stringify", |_, args| {
                    let value = arg(&args, 0);
                    if matches!(value, Value::Undefined | Value::Function(_) | Value::Native(_)) {
                        return Ok(Value::Undefined);
                    }
                    let json = value.to_json();
                    let indent = args.get(2).map(Value::to_number).filter(|n| *n > 0.0);
                    let text = if indent.is_some() {
                        serde_json::to_string_pretty(&json)
                    } else {
                        serde_json::to_string(&json)
                    };
                    text.map(Value::from)
                        .map_err(|e| RuntimeError::type_error(format!("Converting to JSON failed: {e}")))
                }),
            ),
            (
                "parse",
                Value::native("JSON.parse", |_, args| {
                    let text = arg(&args, 0).to_display_string();
                    serde_json::from_str::<serde_json::Value>(&text)
                        .map(|json| Value::from_json(&json))
                        .map_err(|e| RuntimeError::Syntax(format!("JSON.parse: {e}")))
                }),
            ),
        ]),
    );

    globals.define(
        "Object",
        object(vec![
            (
                "keys",
                Value::native("Object.keys", |_, args| {
                    Ok(Value::array(entries(&arg(&args, 0)).into_iter().map(|(k, _)| Value::from(k)).collect()))
                }),
            ),
            (
                "values",
                Value::native("Object.values", |_, args| {
                    Ok(Value::array(entries(&arg(&args, 0)).into_iter().map(|(_, v)| v).collect()))
                }),
            ),
            (
                "entries",
                Value::native("Object.entries", |_, args| {
                    Ok(Value::array(
                        entries(&arg(&args, 0))
                            .into_iter()
                            .map(|(k, v)| Value::array(vec![Value::from(k), v]))
                            .collect(),
                    ))
                }),
            ),
            (
                "assign",
                Value::native("Object.assign", |_, args| {
                    let mut map = ObjectMap::new();
                    for source in &args {
                        map.extend(entries(source));
                    }
                    Ok(Value::object(map))
                }),
            ),
        ]),
    );

    globals.define(
        "Array",
        object(vec![
            (
                "isArray",
                Value::native("Array.isArray", |_, args| Ok(Value::Bool(matches!(arg(&args, 0), Value::Array(_))))),
            ),
        ]),
    );

    globals.define(
        "String",
        Value::native("String", |_, args| {
            Ok(Value::from(args.first().map_or_else(String::new, Value::to_display_string)))
        }),
    );
    globals.define(
        "Number",
        Value::native("Number", |_, args| Ok(Value::Num(args.first().map_or(0.0, Value::to_number)))),
    );
    globals.define(
        "Boolean",
        Value::native("Boolean", |_, args| Ok(Value::Bool(arg(&args, 0).truthy()))),
    );
    globals.define(
        "isNaN",
        Value::native("isNaN", |_, args| Ok(Value::Bool(num_arg(&args, 0).is_nan()))),
    );
    globals.define(
        "Error",
        Value::native("Error", |_, args| {
            Ok(object(vec![
                ("name", Value::str("Error")),
                ("message", Value::from(args.first().map_or_else(String::new, Value::to_display_string))),
            ]))
        }),
    );
    globals.define(
        "Date",
        object(vec![("now", Value::native("Date.now", |_, _| Ok(Value::Num(now_millis()))))]),
    );
    globals.define("console", console());
}

fn console() -> Value {
    fn line(args: &[Value]) -> String {
        args.iter().map(Value::to_display_string).collect::<Vec<_>>().join(" ")
    }
    object(vec![
        (
            "log",
            Value::native("console.log", |_, args| {
                tracing::info!(target: "widget", "{}", line(&args));
                Ok(Value::Undefined)
            }),
        ),
        (
            "warn",
            Value::native("console.warn", |_, args| {
                tracing::warn!(target: "widget", "{}", line(&args));
                Ok(Value::Undefined)
            }),
        ),
        (
            "error",
            Value::native("console.error", |_, args| {
                tracing::warn!(target: "widget", "{}", line(&args));
                Ok(Value::Undefined)
            }),
        ),
    ])
}

#[allow(clippy::cast_precision_loss)]
fn now_millis() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64
}

#[allow(clippy::cast_precision_loss)]
fn index_value(i: usize) -> Value {
    Value::Num(i as f64)
}

fn entries(value: &Value) -> Vec<(String, Value)> {
    match value {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        Value::Array(items) => items.iter().enumerate().map(|(i, v)| (i.to_string(), v.clone())).collect(),
        Value::Str(s) => s.chars().enumerate().map(|(i, c)| (i.to_string(), Value::str(c.to_string()))).collect(),
        _ => Vec::new(),
    }
}

/// `value.key`
pub fn get_property(value: &Value, key: &str) -> Result<Value, RuntimeError> {
    match value {
        Value::Undefined | Value::Null => Err(RuntimeError::type_error(format!(
            "Cannot read properties of {} (reading '{key}')",
            value.to_display_string()
        ))),
        Value::Object(map) => Ok(map.get(key).cloned().unwrap_or_default()),
        Value::Array(items) => Ok(match key {
            "length" => index_value(items.len()),
            _ => key
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get(i).cloned())
                .unwrap_or_default(),
        }),
        Value::Str(s) => Ok(match key {
            "length" => index_value(s.encode_utf16().count()),
            _ => key
                .parse::<usize>()
                .ok()
                .and_then(|i| s.chars().nth(i))
                .map_or(Value::Undefined, |c| Value::str(c.to_string())),
        }),
        Value::Element(element) => Ok(match key {
            "props" => Value::object(element.props.clone()),
            _ => Value::Undefined,
        }),
        Value::Function(closure) => Ok(match key {
            "name" => Value::str(closure.name().unwrap_or("")),
            _ => Value::Undefined,
        }),
        _ => Ok(Value::Undefined),
    }
}

/// `value[key]`
pub fn get_index(value: &Value, key: &Value) -> Result<Value, RuntimeError> {
    if let (Value::Array(items), Value::Num(n)) = (value, key) {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let found = (*n >= 0.0 && n.fract() == 0.0).then(|| items.get(*n as usize).cloned()).flatten();
        return Ok(found.unwrap_or_default());
    }
    get_property(value, &key.to_property_key())
}

/// Builtin method on a primitive, array or element; `None` if there is no such method
pub(crate) fn call_method(
    interp: &mut Interp<'_>,
    target: &Value,
    name: &str,
    args: Vec<Value>,
) -> Result<Option<Value>, RuntimeError> {
    match target {
        Value::Array(items) => array_method(interp, items, name, args),
        Value::Str(s) => string_method(s, name, &args),
        Value::Num(n) => number_method(*n, name, &args),
        Value::Bool(_) if name == "toString" => Ok(Some(Value::from(target.to_display_string()))),
        _ => Ok(None),
    }
}

fn callback(args: &[Value], method: &str) -> Result<Value, RuntimeError> {
    let f = arg(args, 0);
    if f.is_callable() {
        Ok(f)
    } else {
        Err(RuntimeError::type_error(format!("{} is not a function (in Array.prototype.{method})", f.describe())))
    }
}

fn relative_index(raw: &Value, len: usize, default: usize) -> usize {
    if matches!(raw, Value::Undefined) {
        return default;
    }
    let n = raw.to_number();
    if n.is_nan() {
        return 0;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let index = if n < 0.0 {
        (len as f64 + n.trunc()).max(0.0) as usize
    } else {
        n.trunc().min(len as f64) as usize
    };
    index
}

#[allow(clippy::too_many_lines)]
fn array_method(
    interp: &mut Interp<'_>,
    items: &Arc<Vec<Value>>,
    name: &str,
    args: Vec<Value>,
) -> Result<Option<Value>, RuntimeError> {
    let value = match name {
        "map" | "filter" | "forEach" | "find" | "findIndex" | "some" | "every" => {
            let f = callback(&args, name)?;
            let mut mapped = Vec::new();
            for (i, item) in items.iter().enumerate() {
                let result = interp.call(&f, vec![item.clone(), index_value(i), Value::Array(Arc::clone(items))])?;
                match name {
                    "map" => mapped.push(result),
                    "filter" if result.truthy() => mapped.push(item.clone()),
                    "find" if result.truthy() => return Ok(Some(item.clone())),
                    "findIndex" if result.truthy() => return Ok(Some(index_value(i))),
                    "some" if result.truthy() => return Ok(Some(Value::Bool(true))),
                    "every" if !result.truthy() => return Ok(Some(Value::Bool(false))),
                    _ => {}
                }
            }
            match name {
                "map" | "filter" => Value::array(mapped),
                "find" | "forEach" => Value::Undefined,
                "findIndex" => Value::Num(-1.0),
                "some" => Value::Bool(false),
                _ => Value::Bool(true),
            }
        }
        "reduce" => {
            let f = callback(&args, name)?;
            let mut iter = items.iter().enumerate();
            let mut acc = match args.get(1) {
                Some(initial) => initial.clone(),
                None => match iter.next() {
                    Some((_, first)) => first.clone(),
                    None => {
                        return Err(RuntimeError::type_error("Reduce of empty array with no initial value"))
                    }
                },
            };
            for (i, item) in iter {
                acc = interp.call(&f, vec![acc, item.clone(), index_value(i)])?;
            }
            acc
        }
        "join" => {
            let sep = match args.first() {
                None | Some(Value::Undefined) => ",".to_string(),
                Some(sep) => sep.to_display_string(),
            };
            Value::from(
                items
                    .iter()
                    .map(|v| if v.is_nullish() { String::new() } else { v.to_display_string() })
                    .collect::<Vec<_>>()
                    .join(&sep),
            )
        }
        "slice" => {
            let start = relative_index(&arg(&args, 0), items.len(), 0);
            let end = relative_index(&arg(&args, 1), items.len(), items.len());
            Value::array(items.get(start..end.max(start)).map(<[Value]>::to_vec).unwrap_or_default())
        }
        "includes" => {
            let needle = arg(&args, 0);
            Value::Bool(items.iter().any(|v| v.strict_eq(&needle) || both_nan(v, &needle)))
        }
        "indexOf" => {
            let needle = arg(&args, 0);
            items
                .iter()
                .position(|v| v.strict_eq(&needle))
                .map_or(Value::Num(-1.0), index_value)
        }
        "reverse" => Value::array(items.iter().rev().cloned().collect()),
        "sort" => {
            let mut out = items.as_ref().clone();
            let comparator = arg(&args, 0);
            if comparator.is_callable() {
                let mut failure = None;
                out.sort_by(|a, b| {
                    if failure.is_some() {
                        return Ordering::Equal;
                    }
                    match interp.call(&comparator, vec![a.clone(), b.clone()]) {
                        Ok(v) => v.to_number().partial_cmp(&0.0).unwrap_or(Ordering::Equal),
                        Err(e) => {
                            failure = Some(e);
                            Ordering::Equal
                        }
                    }
                });
                if let Some(err) = failure {
                    return Err(err);
                }
            } else {
                out.sort_by_key(Value::to_display_string);
            }
            Value::array(out)
        }
        "push" | "pop" | "shift" | "unshift" | "splice" | "fill" => {
            return Err(RuntimeError::type_error(format!(
                "Array.prototype.{name} is not supported: arrays are immutable, build a new array instead (e.g. [...items, next])"
            )))
        }
        "toString" => Value::from(Value::Array(Arc::clone(items)).to_display_string()),
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn both_nan(a: &Value, b: &Value) -> bool {
    matches!((a, b), (Value::Num(x), Value::Num(y)) if x.is_nan() && y.is_nan())
}

fn string_method(s: &str, name: &str, args: &[Value]) -> Result<Option<Value>, RuntimeError> {
    let text = |i: usize| arg(args, i).to_display_string();
    let chars: Vec<char> = s.chars().collect();
    let value = match name {
        "toUpperCase" => Value::from(s.to_uppercase()),
        "toLowerCase" => Value::from(s.to_lowercase()),
        "trim" => Value::str(s.trim()),
        "toString" => Value::str(s),
        "includes" => Value::Bool(s.contains(text(0).as_str())),
        "startsWith" => Value::Bool(s.starts_with(text(0).as_str())),
        "endsWith" => Value::Bool(s.ends_with(text(0).as_str())),
        "indexOf" => s
            .find(text(0).as_str())
            .map_or(Value::Num(-1.0), |byte| index_value(s[..byte].chars().count())),
        "slice" | "substring" => {
            let start = relative_index(&arg(args, 0), chars.len(), 0);
            let end = relative_index(&arg(args, 1), chars.len(), chars.len());
            let (start, end) = if name == "substring" && start > end { (end, start) } else { (start, end) };
            Value::from(chars.get(start..end.max(start)).map(|c| c.iter().collect::<String>()).unwrap_or_default())
        }
        "split" => {
            let parts: Vec<Value> = match args.first() {
                None | Some(Value::Undefined) => vec![Value::str(s)],
                Some(sep) => {
                    let sep = sep.to_display_string();
                    if sep.is_empty() {
                        chars.iter().map(|c| Value::str(c.to_string())).collect()
                    } else {
                        s.split(sep.as_str()).map(Value::str).collect()
                    }
                }
            };
            Value::array(parts)
        }
        "replace" => Value::from(s.replacen(text(0).as_str(), &text(1), 1)),
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn number_method(n: f64, name: &str, args: &[Value]) -> Result<Option<Value>, RuntimeError> {
    let value = match name {
        "toFixed" => {
            let digits = fraction_digits(&arg(args, 0), 0)?;
            Value::from(to_fixed(n, digits))
        }
        "toString" => Value::from(format_number(n)),
        "toLocaleString" => {
            let options = arg(args, 1);
            let min = fraction_digits(&get_option(&options, "minimumFractionDigits"), 0)?;
            let max = fraction_digits(&get_option(&options, "maximumFractionDigits"), min.max(3))?;
            Value::from(to_locale_string(n, min, max.max(min)))
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn get_option(options: &Value, key: &str) -> Value {
    match options {
        Value::Object(map) => map.get(key).cloned().unwrap_or_default(),
        _ => Value::Undefined,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn fraction_digits(raw: &Value, default: usize) -> Result<usize, RuntimeError> {
    if raw.is_nullish() {
        return Ok(default);
    }
    let n = raw.to_number();
    if !(0.0..=100.0).contains(&n) {
        return Err(RuntimeError::Range("toFixed() digits argument must be between 0 and 100".to_string()));
    }
    Ok(n as usize)
}

fn to_fixed(n: f64, digits: usize) -> String {
    if !n.is_finite() {
        return format_number(n);
    }
    format!("{n:.digits$}")
}

/// `Number.prototype.toLocaleString` for the `en-US` locale
fn to_locale_string(n: f64, min_digits: usize, max_digits: usize) -> String {
    if !n.is_finite() {
        return if n.is_nan() { "NaN".to_string() } else if n > 0.0 { "∞".to_string() } else { "-∞".to_string() };
    }
    let fixed = format!("{:.max_digits$}", n.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let mut frac = frac_part.trim_end_matches('0').to_string();
    while frac.len() < min_digits {
        frac.push('0');
    }
    let mut grouped = String::new();
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let sign = if n < 0.0 && (int_part != "0" || !frac.is_empty()) { "-" } else { "" };
    if frac.is_empty() {
        format!("{sign}{grouped}")
    } else {
        format!("{sign}{grouped}.{frac}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn locale_string_groups_thousands() {
        assert_eq!(to_locale_string(1_234_567.891, 0, 3), "1,234,567.891");
        assert_eq!(to_locale_string(-1000.0, 0, 3), "-1,000");
        assert_eq!(to_locale_string(12.5, 2, 2), "12.50");
        assert_eq!(to_locale_string(0.0004, 0, 3), "0");
    }

    #[test]
    fn property_access_on_primitives() {
        let arr = Value::array(vec![Value::Num(1.0), Value::Num(2.0)]);
        assert_eq!(get_property(&arr, "length").unwrap().to_number(), 2.0);
        assert_eq!(get_index(&arr, &Value::Num(1.0)).unwrap().to_number(), 2.0);
        assert_eq!(get_property(&Value::str("héllo"), "length").unwrap().to_number(), 5.0);
        assert!(get_property(&Value::Null, "x").is_err());
    }

    #[test]
    fn string_methods() {
        let split = string_method("a,b,c", "split", &[Value::str(",")]).unwrap().unwrap();
        assert_eq!(split.to_display_string(), "a,b,c");
        let sliced = string_method("héllo", "slice", &[Value::Num(1.0), Value::Num(-1.0)]).unwrap().unwrap();
        assert_eq!(sliced.to_display_string(), "éll");
        assert!(string_method("x", "nope", &[]).unwrap().is_none());
    }

    #[test]
    fn number_methods() {
        let fixed = number_method(3.14159, "toFixed", &[Value::Num(2.0)]).unwrap().unwrap();
        assert_eq!(fixed.to_display_string(), "3.14");
        assert!(number_method(1.0, "toFixed", &[Value::Num(200.0)]).is_err());
    }
}
