/*
 * eval/loops.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! `for` loop sequences and the `forloop` object.

use crate::context::{ScopeKind, TemplateContext};
use crate::error::RenderResult;
use crate::output::RenderOutput;
use crate::value::{Dictionary, Value};

use super::Completion;

#[derive(Debug, Clone)]
enum Items {
    /// `(start..end)`, never materialized.
    Range { start: i64, len: usize },
    Values(Vec<Value>),
}

/// The elements a loop visits after `offset`, `limit` and `reversed`.
///
/// `offset` is applied first, then `limit`, then the order is reversed, so
/// `forloop` always describes the subsequence actually visited.
#[derive(Debug, Clone)]
pub struct LoopSequence {
    items: Items,
    reversed: bool,
}

impl LoopSequence {
    /// Loop over an evaluated collection.
    pub fn from_value(source: &Value) -> Self {
        Self {
            items: Items::Values(source.enumerate()),
            reversed: false,
        }
    }

    /// Loop over an inclusive integer range.
    pub fn from_range(start: &Value, end: &Value) -> Self {
        let start = start.to_integer();
        let end = end.to_integer();
        let len = if end < start {
            0
        } else {
            usize::try_from(end.abs_diff(start)).map_or(usize::MAX, |d| d.saturating_add(1))
        };
        Self {
            items: Items::Range { start, len },
            reversed: false,
        }
    }

    /// Apply loop options. Nil options are ignored; negative ones count as zero.
    pub fn window(mut self, offset: &Value, limit: &Value, reversed: bool) -> Self {
        let skip = if offset.is_nil() { 0 } else { clamp_count(offset) };
        let take = if limit.is_nil() { usize::MAX } else { clamp_count(limit) };
        self.items = match self.items {
            Items::Range { start, len } => {
                let skip = skip.min(len);
                Items::Range {
                    start: start.saturating_add(i64::try_from(skip).unwrap_or(i64::MAX)),
                    len: (len - skip).min(take),
                }
            }
            Items::Values(values) => Items::Values(values.into_iter().skip(skip).take(take).collect()),
        };
        self.reversed = reversed;
        self
    }

    pub fn len(&self) -> usize {
        match &self.items {
            Items::Range { len, .. } => *len,
            Items::Values(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element `index` in visiting order.
    pub fn get(&self, index: usize) -> Value {
        let position = if self.reversed {
            self.len().saturating_sub(index + 1)
        } else {
            index
        };
        match &self.items {
            Items::Range { start, .. } => {
                Value::from(start.saturating_add(i64::try_from(position).unwrap_or(i64::MAX)))
            }
            Items::Values(values) => values.get(position).cloned().unwrap_or_default(),
        }
    }
}

fn clamp_count(value: &Value) -> usize {
    usize::try_from(value.to_integer().max(0)).unwrap_or(usize::MAX)
}

/// The `forloop` object for iteration `index0` of `length`.
pub fn forloop_value(index0: usize, length: usize, parent: Option<Value>) -> Value {
    let mut forloop = Dictionary::new();
    forloop.insert("index".to_string(), Value::from(index0 + 1));
    forloop.insert("index0".to_string(), Value::from(index0));
    forloop.insert("rindex".to_string(), Value::from(length - index0));
    forloop.insert("rindex0".to_string(), Value::from(length - index0 - 1));
    forloop.insert("first".to_string(), Value::from(index0 == 0));
    forloop.insert("last".to_string(), Value::from(index0 + 1 == length));
    forloop.insert("length".to_string(), Value::from(length));
    if let Some(parent) = parent {
        forloop.insert("parentloop".to_string(), parent);
    }
    Value::from(forloop)
}

/// Run a loop body once per element inside a loop scope.
///
/// `Break` ends the loop, `Continue` moves to the next element, `Return`
/// propagates to the caller.
pub fn drive_loop(
    ctx: &mut TemplateContext,
    out: &mut RenderOutput<'_>,
    variable: &str,
    sequence: &LoopSequence,
    mut body: impl FnMut(&mut TemplateContext, &mut RenderOutput<'_>) -> RenderResult<Completion>,
) -> RenderResult<Completion> {
    let parent = ctx.try_get_value("forloop").cloned();
    let length = sequence.len();
    let mut scope = ctx.enter_child_scope(ScopeKind::Loop);
    for index in 0..length {
        scope.increment_steps()?;
        scope.set_own_value(variable, sequence.get(index));
        scope.set_own_value("forloop", forloop_value(index, length, parent.clone()));
        match body(&mut scope, out)? {
            Completion::Break => break,
            Completion::Normal | Completion::Continue => {}
            Completion::Return => return Ok(Completion::Return),
        }
    }
    Ok(Completion::Normal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn visited(sequence: &LoopSequence) -> Vec<i64> {
        (0..sequence.len()).map(|i| sequence.get(i).to_integer()).collect()
    }

    #[test]
    fn test_range_window() {
        let sequence = LoopSequence::from_range(&Value::from(1), &Value::from(5));
        assert_eq!(visited(&sequence), vec![1, 2, 3, 4, 5]);

        let windowed = sequence
            .clone()
            .window(&Value::from(1), &Value::from(2), false);
        assert_eq!(visited(&windowed), vec![2, 3]);

        let reversed = sequence.window(&Value::from(1), &Value::from(2), true);
        assert_eq!(visited(&reversed), vec![3, 2]);
    }

    #[test]
    fn test_values_window() {
        let source = Value::array((1..=4).map(Value::from));
        let sequence = LoopSequence::from_value(&source).window(&Value::from(3), &Value::Nil, false);
        assert_eq!(visited(&sequence), vec![4]);

        let past_end = LoopSequence::from_value(&source).window(&Value::from(10), &Value::Nil, false);
        assert!(past_end.is_empty());
    }

    #[test]
    fn test_empty_and_inverted_ranges() {
        assert!(LoopSequence::from_range(&Value::from(3), &Value::from(1)).is_empty());
        assert_eq!(LoopSequence::from_range(&Value::from(2), &Value::from(2)).len(), 1);
    }

    #[test]
    fn test_huge_range_is_not_materialized() {
        let sequence = LoopSequence::from_range(&Value::from(1), &Value::from(i64::MAX))
            .window(&Value::Nil, &Value::from(2), false);
        assert_eq!(visited(&sequence), vec![1, 2]);
    }

    #[test]
    fn test_forloop_value() {
        let ctx = TemplateContext::new();
        let forloop = forloop_value(1, 2, None);
        assert_eq!(forloop.get_value("index", &ctx).unwrap(), Value::from(2));
        assert_eq!(forloop.get_value("rindex0", &ctx).unwrap(), Value::from(0));
        assert_eq!(forloop.get_value("last", &ctx).unwrap(), Value::from(true));
        assert_eq!(forloop.get_value("first", &ctx).unwrap(), Value::from(false));
    }
}
