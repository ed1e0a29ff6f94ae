/*
 * value/mod.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Runtime values.
//!
//! [`Value`] is a closed set of variants. Conversions between variants never
//! fail: anything that cannot be coerced resolves to nil, false, zero or the
//! empty string. The only fallible operations are member and index lookups on
//! host objects, which defer to the configured member access strategy.

mod object;
pub mod ops;

use std::any::Any;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use hashlink::LinkedHashMap;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;

use crate::context::TemplateContext;
use crate::error::RenderResult;

pub use object::{ObjectValue, Projection};

/// Insertion-ordered string-keyed map.
pub type Dictionary = LinkedHashMap<String, Value>;

/// A template runtime value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Explicit `nil` / `null`, and the result of failed coercions.
    #[default]
    Nil,

    /// A variable that was never defined. Behaves like `Nil`.
    Undefined,

    Boolean(bool),

    Number(Decimal),

    String(Arc<str>),

    Array(Arc<[Value]>),

    Dictionary(Arc<Dictionary>),

    /// Host value, reachable through the member access strategy.
    Object(ObjectValue),

    DateTime(DateTime<FixedOffset>),

    /// The `empty` literal: equal to any zero-length string or collection.
    Empty,

    /// The `blank` literal: like `Empty`, but also equal to nil, false and
    /// whitespace-only strings.
    Blank,
}

impl Value {
    /// Build an array value.
    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Array(items.into_iter().collect())
    }

    /// Build a dictionary value, keeping the order of `entries`.
    pub fn dictionary<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        let map: Dictionary = entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Value::Dictionary(Arc::new(map))
    }

    /// Wrap a host value; its serialized fields are readable by permissive
    /// member access and by types registered with the safe policy.
    pub fn object<T: Any + Send + Sync + Serialize>(value: T) -> Self {
        Value::Object(ObjectValue::serializable(value))
    }

    /// Wrap a host value reachable only through registered member accessors.
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        Value::Object(ObjectValue::new(value))
    }

    /// Classify a dynamically typed host value.
    pub fn from_any(value: Arc<dyn Any + Send + Sync>) -> Self {
        macro_rules! number {
            ($($t:ty),*) => {
                $(
                    if let Some(n) = value.downcast_ref::<$t>() {
                        return Value::Number(Decimal::from(*n));
                    }
                )*
            };
        }

        let any: &(dyn Any + Send + Sync) = &*value;
        if let Some(v) = any.downcast_ref::<Value>() {
            return v.clone();
        }
        if let Some(b) = any.downcast_ref::<bool>() {
            return Value::Boolean(*b);
        }
        number!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);
        if let Some(d) = any.downcast_ref::<Decimal>() {
            return Value::Number(*d);
        }
        if let Some(f) = any.downcast_ref::<f64>() {
            return Value::from(*f);
        }
        if let Some(f) = any.downcast_ref::<f32>() {
            return Value::from(f64::from(*f));
        }
        if let Some(s) = any.downcast_ref::<String>() {
            return Value::from(s.as_str());
        }
        if let Some(s) = any.downcast_ref::<&'static str>() {
            return Value::from(*s);
        }
        if let Some(s) = any.downcast_ref::<Arc<str>>() {
            return Value::String(Arc::clone(s));
        }
        if let Some(d) = any.downcast_ref::<DateTime<FixedOffset>>() {
            return Value::DateTime(*d);
        }
        if let Some(d) = any.downcast_ref::<DateTime<chrono::Utc>>() {
            return Value::DateTime(d.fixed_offset());
        }
        if any.downcast_ref::<()>().is_some() {
            return Value::Nil;
        }
        Value::Object(ObjectValue::from_arc(value))
    }

    /// Convert a serializable host value by way of its JSON form.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Self {
        serde_json::to_value(value)
            .map(|json| Value::from_json(&json))
            .unwrap_or(Value::Nil)
    }

    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Nil,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Number(Decimal::from(i))
                } else if let Some(u) = n.as_u64() {
                    Value::Number(Decimal::from(u))
                } else {
                    parse_decimal(&n.to_string()).map_or(Value::Nil, Value::Number)
                }
            }
            serde_json::Value::String(s) => Value::from(s.as_str()),
            serde_json::Value::Array(items) => Value::array(items.iter().map(Value::from_json)),
            serde_json::Value::Object(map) => {
                Value::dictionary(map.iter().map(|(k, v)| (k.clone(), Value::from_json(v))))
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Nil | Value::Undefined | Value::Empty | Value::Blank => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Array(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Dictionary(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Object(object) => object.project().cloned().unwrap_or(serde_json::Value::Null),
            Value::DateTime(d) => serde_json::Value::String(d.to_rfc3339()),
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil | Value::Undefined)
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Zero-length string, array or dictionary, or the `empty` literal.
    pub fn is_empty_like(&self) -> bool {
        match self {
            Value::String(s) => s.is_empty(),
            Value::Array(items) => items.is_empty(),
            Value::Dictionary(map) => map.is_empty(),
            Value::Empty => true,
            _ => false,
        }
    }

    /// Truthiness used by conditions.
    pub fn to_boolean(&self) -> bool {
        match self {
            Value::Nil | Value::Undefined | Value::Empty | Value::Blank => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => !n.is_zero(),
            Value::String(_) | Value::Array(_) | Value::Dictionary(_) => !self.is_empty_like(),
            Value::Object(_) | Value::DateTime(_) => true,
        }
    }

    /// Numeric coercion; non-numeric values become zero.
    pub fn to_number(&self) -> Decimal {
        match self {
            Value::Number(n) => *n,
            Value::Boolean(true) => Decimal::ONE,
            Value::String(s) => parse_decimal(s.trim()).unwrap_or(Decimal::ZERO),
            Value::DateTime(d) => Decimal::from(d.timestamp()),
            _ => Decimal::ZERO,
        }
    }

    /// Integer part of [`Value::to_number`], saturating on overflow.
    pub fn to_integer(&self) -> i64 {
        let n = self.to_number().trunc();
        n.to_i64()
            .unwrap_or(if n.is_sign_negative() { i64::MIN } else { i64::MAX })
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    /// Number of elements (arrays, dictionaries) or characters (strings).
    pub fn size(&self) -> usize {
        match self {
            Value::String(s) => s.chars().count(),
            Value::Array(items) => items.len(),
            Value::Dictionary(map) => map.len(),
            _ => 0,
        }
    }

    /// The elements a `for` loop or array filter sees.
    ///
    /// Dictionaries yield `[key, value]` pairs; a non-empty string yields
    /// itself once; scalars yield nothing.
    pub fn enumerate(&self) -> Vec<Value> {
        match self {
            Value::Array(items) => items.to_vec(),
            Value::Dictionary(map) => map
                .iter()
                .map(|(k, v)| Value::array([Value::from(k.as_str()), v.clone()]))
                .collect(),
            Value::String(s) if !s.is_empty() => vec![self.clone()],
            Value::Object(object) => match object.project() {
                Some(serde_json::Value::Array(items)) => items.iter().map(Value::from_json).collect(),
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    /// `value.name`
    pub fn get_value(&self, name: &str, ctx: &TemplateContext) -> RenderResult<Value> {
        Ok(match self {
            Value::Dictionary(map) => match map.get(name) {
                Some(value) => value.clone(),
                None if name == "size" => Value::from(map.len()),
                None => Value::Nil,
            },
            Value::Array(items) => match name {
                "size" => Value::from(items.len()),
                "first" => items.first().cloned().unwrap_or_default(),
                "last" => items.last().cloned().unwrap_or_default(),
                _ => Value::Nil,
            },
            Value::String(s) => match name {
                "size" => Value::from(s.chars().count()),
                "first" => s.chars().next().map(Value::from).unwrap_or_default(),
                "last" => s.chars().next_back().map(Value::from).unwrap_or_default(),
                _ => Value::Nil,
            },
            Value::Object(object) => {
                let strategy = &ctx.options().member_access;
                match strategy.get_accessor(object, name)? {
                    Some(accessor) => accessor.get(object, ctx)?,
                    None => Value::Nil,
                }
            }
            _ => Value::Nil,
        })
    }

    /// `value[index]`
    pub fn get_index(&self, index: &Value, ctx: &TemplateContext) -> RenderResult<Value> {
        Ok(match self {
            Value::Array(items) => {
                if !index.is_number() {
                    return self.get_value(&index.to_string(), ctx);
                }
                resolve_index(index.to_integer(), items.len())
                    .and_then(|i| items.get(i).cloned())
                    .unwrap_or_default()
            }
            Value::String(s) if index.is_number() => {
                let count = s.chars().count();
                resolve_index(index.to_integer(), count)
                    .and_then(|i| s.chars().nth(i))
                    .map(Value::from)
                    .unwrap_or_default()
            }
            Value::Dictionary(_) | Value::String(_) | Value::Object(_) => {
                return self.get_value(&index.to_string(), ctx);
            }
            _ => Value::Nil,
        })
    }
}

/// Map a possibly negative index onto `0..len`.
fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let resolved = if index < 0 { len + index } else { index };
    if (0..len).contains(&resolved) {
        usize::try_from(resolved).ok()
    } else {
        None
    }
}

/// Parse a decimal from plain or scientific notation.
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    if text.is_empty() {
        return None;
    }
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

fn number_to_json(n: Decimal) -> serde_json::Value {
    if n.scale() == 0
        && let Some(i) = n.to_i64()
    {
        return serde_json::Value::from(i);
    }
    n.to_f64()
        .and_then(serde_json::Number::from_f64)
        .map_or(serde_json::Value::Null, serde_json::Value::Number)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil | Value::Undefined | Value::Empty | Value::Blank | Value::Dictionary(_) => Ok(()),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => f.write_str(s),
            Value::Array(items) => items.iter().try_for_each(|item| write!(f, "{}", item)),
            Value::Object(object) => f.write_str(object.short_type_name()),
            Value::DateTime(d) => write!(f, "{}", d.format("%Y-%m-%d %H:%M:%S %z")),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        ops::equals(self, other)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

macro_rules! impl_from_integer {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(n: $t) -> Self {
                    Value::Number(Decimal::from(n))
                }
            }
        )*
    };
}

impl_from_integer!(i32, i64, u32, u64, usize);

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Decimal::try_from(f).map_or(Value::Nil, |d| Value::Number(d.normalize()))
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Value::Number(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<char> for Value {
    fn from(c: char) -> Self {
        Value::String(Arc::from(c.to_string()))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(Arc::from(items))
    }
}

impl From<Dictionary> for Value {
    fn from(map: Dictionary) -> Self {
        Value::Dictionary(Arc::new(map))
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(d: DateTime<FixedOffset>) -> Self {
        Value::DateTime(d)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Nil, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ctx() -> TemplateContext {
        TemplateContext::new()
    }

    // ========================================================================
    // Truthiness
    // ========================================================================

    #[test]
    fn test_to_boolean() {
        assert!(!Value::Nil.to_boolean());
        assert!(!Value::Undefined.to_boolean());
        assert!(!Value::from(0).to_boolean());
        assert!(Value::from(-1).to_boolean());
        assert!(Value::from("false").to_boolean());
        assert!(!Value::from("").to_boolean());
        assert!(!Value::array([]).to_boolean());
        assert!(Value::array([Value::Nil]).to_boolean());
        assert!(!Value::Empty.to_boolean());
        assert!(!Value::Blank.to_boolean());
        assert!(Value::opaque(3u8).to_boolean());
    }

    // ========================================================================
    // String conversion
    // ========================================================================

    #[test]
    fn test_display() {
        assert_eq!(Value::Nil.to_string(), "");
        assert_eq!(Value::from(true).to_string(), "true");
        assert_eq!(Value::from(42).to_string(), "42");
        assert_eq!(Value::Number(Decimal::new(150, 2)).to_string(), "1.50");
        assert_eq!(Value::from(2.5).to_string(), "2.5");
        assert_eq!(
            Value::array([Value::from("a"), Value::from(1), Value::Nil]).to_string(),
            "a1"
        );
        assert_eq!(Value::dictionary([("a", Value::from(1))]).to_string(), "");
    }

    #[test]
    fn test_to_number() {
        assert_eq!(Value::from(" 12.5 ").to_number(), Decimal::new(125, 1));
        assert_eq!(Value::from("abc").to_number(), Decimal::ZERO);
        assert_eq!(Value::from(true).to_number(), Decimal::ONE);
        assert_eq!(Value::from("1e3").to_integer(), 1000);
    }

    // ========================================================================
    // Host conversions
    // ========================================================================

    #[test]
    fn test_from_any_classifies() {
        assert_eq!(Value::from_any(Arc::new(5i64)), Value::from(5));
        assert_eq!(Value::from_any(Arc::new("hi".to_string())), Value::from("hi"));
        assert_eq!(Value::from_any(Arc::new(true)), Value::from(true));
        assert!(Value::from_any(Arc::new(())).is_nil());
        assert!(matches!(
            Value::from_any(Arc::new(vec![1u8])),
            Value::Object(_)
        ));
    }

    #[test]
    fn test_json_roundtrip_keeps_order() {
        let json = serde_json::json!({"z": 1, "a": [true, null, "x"], "m": 1.5});
        let value = Value::from_json(&json);
        let Value::Dictionary(map) = &value else {
            panic!("expected dictionary");
        };
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
        assert_eq!(value.to_json(), json);
    }

    // ========================================================================
    // Member and index access
    // ========================================================================

    #[test]
    fn test_get_value_builtins() {
        let ctx = ctx();
        let array = Value::array([Value::from(1), Value::from(2), Value::from(3)]);
        assert_eq!(array.get_value("size", &ctx).unwrap(), Value::from(3));
        assert_eq!(array.get_value("first", &ctx).unwrap(), Value::from(1));
        assert_eq!(array.get_value("last", &ctx).unwrap(), Value::from(3));
        assert!(array.get_value("nope", &ctx).unwrap().is_nil());

        let dict = Value::dictionary([("size", Value::from("big")), ("a", Value::from(1))]);
        assert_eq!(dict.get_value("size", &ctx).unwrap(), Value::from("big"));
        let dict = Value::dictionary([("a", Value::from(1))]);
        assert_eq!(dict.get_value("size", &ctx).unwrap(), Value::from(1));

        assert_eq!(Value::from("héllo").get_value("size", &ctx).unwrap(), Value::from(5));
        assert!(Value::from(5).get_value("size", &ctx).unwrap().is_nil());
    }

    #[test]
    fn test_get_index() {
        let ctx = ctx();
        let array = Value::array([Value::from("a"), Value::from("b"), Value::from("c")]);
        assert_eq!(array.get_index(&Value::from(0), &ctx).unwrap(), Value::from("a"));
        assert_eq!(array.get_index(&Value::from(-1), &ctx).unwrap(), Value::from("c"));
        assert!(array.get_index(&Value::from(3), &ctx).unwrap().is_nil());
        assert!(array.get_index(&Value::from(-4), &ctx).unwrap().is_nil());

        let dict = Value::dictionary([("1", Value::from("one"))]);
        assert_eq!(dict.get_index(&Value::from(1), &ctx).unwrap(), Value::from("one"));
    }

    #[test]
    fn test_enumerate() {
        let dict = Value::dictionary([("a", Value::from(1))]);
        assert_eq!(
            dict.enumerate(),
            vec![Value::array([Value::from("a"), Value::from(1)])]
        );
        assert_eq!(Value::from("abc").enumerate(), vec![Value::from("abc")]);
        assert!(Value::from(3).enumerate().is_empty());
    }
}
