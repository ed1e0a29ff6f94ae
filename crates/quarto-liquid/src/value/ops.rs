/*
 * value/ops.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Equality, ordering and arithmetic between values.

use std::cmp::Ordering;

use rust_decimal::Decimal;

use super::Value;
use crate::ast::BinaryOp;

/// Structural equality with the `empty` and `blank` sentinels.
pub fn equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Blank, other) | (other, Value::Blank) => is_blank(other),
        (Value::Empty, other) | (other, Value::Empty) => other.is_empty_like(),
        (l, r) if l.is_nil() || r.is_nil() => l.is_nil() && r.is_nil(),
        (Value::Boolean(a), Value::Boolean(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| equals(x, y))
        }
        (Value::Dictionary(a), Value::Dictionary(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(key, value)| b.get(key).is_some_and(|other| equals(value, other)))
        }
        (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
        (Value::DateTime(a), Value::DateTime(b)) => a == b,
        _ => false,
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Nil | Value::Undefined | Value::Empty | Value::Blank | Value::Boolean(false) => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(_) | Value::Dictionary(_) => value.is_empty_like(),
        _ => false,
    }
}

fn ordering(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Some(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
        _ => None,
    }
}

/// `<`, `<=`, `>` and `>=`.
///
/// Strict comparisons with a nil operand are false. Non-strict comparisons
/// hold between two nils and fail between nil and anything else.
pub fn compare(op: BinaryOp, left: &Value, right: &Value) -> bool {
    let strict = matches!(op, BinaryOp::Less | BinaryOp::Greater);
    match (left.is_nil(), right.is_nil()) {
        (true, true) => return !strict,
        (true, false) | (false, true) => return false,
        (false, false) => {}
    }
    let Some(order) = ordering(left, right) else {
        return false;
    };
    match op {
        BinaryOp::Less => order == Ordering::Less,
        BinaryOp::LessOrEqual => order != Ordering::Greater,
        BinaryOp::Greater => order == Ordering::Greater,
        BinaryOp::GreaterOrEqual => order != Ordering::Less,
        _ => false,
    }
}

/// `left contains right`
pub fn contains(left: &Value, right: &Value) -> bool {
    match left {
        Value::String(s) => s.contains(right.to_string().as_str()),
        Value::Array(items) => items.iter().any(|item| equals(item, right)),
        Value::Dictionary(map) => map.contains_key(right.to_string().as_str()),
        _ => false,
    }
}

pub fn starts_with(left: &Value, right: &Value) -> bool {
    match left {
        Value::String(s) => s.starts_with(right.to_string().as_str()),
        Value::Array(items) => items.first().is_some_and(|first| equals(first, right)),
        _ => false,
    }
}

pub fn ends_with(left: &Value, right: &Value) -> bool {
    match left {
        Value::String(s) => s.ends_with(right.to_string().as_str()),
        Value::Array(items) => items.last().is_some_and(|last| equals(last, right)),
        _ => false,
    }
}

/// Arithmetic operators. Mismatched operands, overflow and division by zero
/// produce nil.
pub fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => number_op(op, *a, *b).map_or(Value::Nil, Value::Number),
        (Value::String(a), Value::String(b)) if op == BinaryOp::Add => {
            let mut joined = String::with_capacity(a.len() + b.len());
            joined.push_str(a);
            joined.push_str(b);
            Value::from(joined)
        }
        _ => Value::Nil,
    }
}

/// Number arithmetic; integer operands divide with flooring.
pub fn number_op(op: BinaryOp, a: Decimal, b: Decimal) -> Option<Decimal> {
    match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Subtract => a.checked_sub(b),
        BinaryOp::Multiply => a.checked_mul(b),
        BinaryOp::Divide => {
            let quotient = a.checked_div(b)?;
            if a.scale() == 0 && b.scale() == 0 {
                Some(quotient.floor())
            } else {
                Some(quotient)
            }
        }
        BinaryOp::Modulo => a.checked_rem(b),
        _ => None,
    }
}

/// Evaluate any non-logical binary operator on two already evaluated operands.
pub fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOp::Equal => Value::Boolean(equals(left, right)),
        BinaryOp::NotEqual => Value::Boolean(!equals(left, right)),
        BinaryOp::Less | BinaryOp::LessOrEqual | BinaryOp::Greater | BinaryOp::GreaterOrEqual => {
            Value::Boolean(compare(op, left, right))
        }
        BinaryOp::Contains => Value::Boolean(contains(left, right)),
        BinaryOp::StartsWith => Value::Boolean(starts_with(left, right)),
        BinaryOp::EndsWith => Value::Boolean(ends_with(left, right)),
        BinaryOp::And => Value::Boolean(left.to_boolean() && right.to_boolean()),
        BinaryOp::Or => Value::Boolean(left.to_boolean() || right.to_boolean()),
        BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => {
            arithmetic(op, left, right)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn n(v: i64) -> Value {
        Value::from(v)
    }

    // ========================================================================
    // Equality
    // ========================================================================

    #[test]
    fn test_nil_equality() {
        assert!(equals(&Value::Nil, &Value::Undefined));
        assert!(!equals(&Value::Nil, &n(0)));
        assert!(!equals(&Value::Nil, &Value::from("")));
    }

    #[test]
    fn test_empty_equality() {
        assert!(equals(&Value::Empty, &Value::from("")));
        assert!(equals(&Value::array([]), &Value::Empty));
        assert!(equals(&Value::dictionary::<&str>([]), &Value::Empty));
        assert!(!equals(&Value::Empty, &Value::Nil));
        assert!(!equals(&Value::Empty, &Value::from(" ")));
    }

    #[test]
    fn test_blank_equality() {
        assert!(equals(&Value::Blank, &Value::Nil));
        assert!(equals(&Value::Blank, &Value::from(false)));
        assert!(equals(&Value::from("  \n"), &Value::Blank));
        assert!(equals(&Value::Blank, &Value::Empty));
        assert!(!equals(&Value::Blank, &Value::from("x")));
        assert!(!equals(&Value::Blank, &n(0)));
    }

    #[test]
    fn test_structural_equality() {
        let a = Value::array([n(1), Value::from("x")]);
        let b = Value::array([n(1), Value::from("x")]);
        assert!(equals(&a, &b));
        assert!(!equals(&a, &Value::array([Value::from("x"), n(1)])));

        let d1 = Value::dictionary([("a", n(1)), ("b", n(2))]);
        let d2 = Value::dictionary([("b", n(2)), ("a", n(1))]);
        assert!(equals(&d1, &d2));
        assert!(!equals(&d1, &Value::dictionary([("a", n(1))])));
    }

    #[test]
    fn test_number_equality_ignores_scale() {
        assert!(equals(&Value::Number(Decimal::new(10, 1)), &n(1)));
    }

    // ========================================================================
    // Comparison
    // ========================================================================

    #[test]
    fn test_nil_comparison_asymmetry() {
        assert!(!compare(BinaryOp::Less, &Value::Nil, &Value::Nil));
        assert!(!compare(BinaryOp::Greater, &Value::Nil, &Value::Nil));
        assert!(compare(BinaryOp::LessOrEqual, &Value::Nil, &Value::Nil));
        assert!(compare(BinaryOp::GreaterOrEqual, &Value::Nil, &Value::Undefined));
        assert!(!compare(BinaryOp::LessOrEqual, &Value::Nil, &n(1)));
        assert!(!compare(BinaryOp::Less, &n(1), &Value::Nil));
    }

    #[test]
    fn test_ordering() {
        assert!(compare(BinaryOp::Less, &n(1), &n(2)));
        assert!(compare(BinaryOp::GreaterOrEqual, &n(2), &n(2)));
        assert!(compare(BinaryOp::Less, &Value::from("B"), &Value::from("a")));
        assert!(!compare(BinaryOp::Less, &n(1), &Value::from("2")));
        assert!(!compare(BinaryOp::LessOrEqual, &Value::from(true), &Value::from(true)));
    }

    #[test]
    fn test_contains() {
        assert!(contains(&Value::from("hello"), &Value::from("ell")));
        assert!(contains(&Value::array([n(1), n(2)]), &n(2)));
        assert!(contains(&Value::dictionary([("k", n(1))]), &Value::from("k")));
        assert!(!contains(&n(12), &n(1)));
    }

    // ========================================================================
    // Arithmetic
    // ========================================================================

    #[test]
    fn test_arithmetic() {
        assert_eq!(arithmetic(BinaryOp::Add, &n(1), &n(2)), n(3));
        assert_eq!(arithmetic(BinaryOp::Divide, &n(7), &n(2)), n(3));
        assert_eq!(arithmetic(BinaryOp::Divide, &n(-7), &n(2)), n(-4));
        assert_eq!(
            arithmetic(BinaryOp::Divide, &Value::Number(Decimal::new(70, 1)), &n(2)).to_string(),
            "3.5"
        );
        assert!(arithmetic(BinaryOp::Divide, &n(1), &n(0)).is_nil());
        assert!(arithmetic(BinaryOp::Modulo, &n(1), &n(0)).is_nil());
        assert_eq!(
            arithmetic(BinaryOp::Add, &Value::from("a"), &Value::from("b")),
            Value::from("ab")
        );
        assert!(arithmetic(BinaryOp::Subtract, &Value::from("a"), &n(1)).is_nil());
    }

    // ========================================================================
    // Properties
    // ========================================================================

    fn scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Nil),
            Just(Value::Empty),
            Just(Value::Blank),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-c ]{0,3}".prop_map(Value::from),
        ]
    }

    fn value() -> impl Strategy<Value = Value> {
        scalar().prop_recursive(3, 16, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::from),
                prop::collection::vec(("[a-c]", inner), 0..3).prop_map(|entries| Value::dictionary(entries)),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_to_boolean_is_total(v in value()) {
            let truthy = v.to_boolean();
            if v.is_nil() || equals(&v, &Value::Empty) {
                prop_assert!(!truthy);
            }
        }

        #[test]
        fn prop_equality_is_reflexive(v in value()) {
            prop_assert!(equals(&v, &v));
        }

        #[test]
        fn prop_equality_is_symmetric(a in value(), b in value()) {
            prop_assert_eq!(equals(&a, &b), equals(&b, &a));
        }

        #[test]
        fn prop_nonzero_numbers_are_truthy(n in any::<i64>()) {
            prop_assert_eq!(Value::from(n).to_boolean(), n != 0);
        }
    }
}
