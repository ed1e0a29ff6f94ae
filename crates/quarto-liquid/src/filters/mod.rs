/*
 * filters/mod.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Filter registry and built-in filters.
//!
//! A filter receives the piped input, its positional and named arguments, and
//! the render context. Misuse is reported as
//! [`RenderError::InvalidFilterArgs`] naming the filter. Nil input is never an
//! error on its own: string filters see the empty string, number filters see
//! zero and array filters see an empty array.
//!
//! Filters that perform host I/O implement [`AsyncFilter`]; the evaluator
//! drives them to completion at the call site.

mod array;
mod date;
mod misc;
mod number;
mod string;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::TemplateContext;
use crate::error::{RenderError, RenderResult};
use crate::value::Value;

pub use date::parse_date;

static NIL: Value = Value::Nil;

/// Evaluated filter arguments.
#[derive(Debug, Clone, Default)]
pub struct FilterArguments {
    positional: Vec<Value>,
    named: Vec<(String, Value)>,
}

impl FilterArguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_positional(values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            positional: values.into_iter().collect(),
            named: Vec::new(),
        }
    }

    pub fn push(&mut self, value: Value) {
        self.positional.push(value);
    }

    pub fn push_named(&mut self, name: impl Into<String>, value: Value) {
        self.named.push((name.into(), value));
    }

    /// Positional argument `index`, or nil.
    pub fn at(&self, index: usize) -> &Value {
        self.positional.get(index).unwrap_or(&NIL)
    }

    pub fn named(&self, name: &str) -> Option<&Value> {
        self.named
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }

    /// Named argument `name`, else positional argument `index`, else nil.
    pub fn get(&self, name: &str, index: usize) -> &Value {
        self.named(name).unwrap_or_else(|| self.at(index))
    }

    pub fn positional(&self) -> &[Value] {
        &self.positional
    }

    pub fn named_arguments(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.named.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of positional arguments.
    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }
}

/// A required argument; missing or nil is an error naming the filter.
pub(crate) fn required<'a>(
    filter: &str,
    arguments: &'a FilterArguments,
    index: usize,
    kind: &str,
) -> RenderResult<&'a Value> {
    let value = arguments.at(index);
    if value.is_nil() {
        return Err(RenderError::invalid_filter_args(
            filter,
            format!("a {} argument is required", kind),
        ));
    }
    Ok(value)
}

pub type SyncFilter = Arc<dyn Fn(Value, &FilterArguments, &mut TemplateContext) -> RenderResult<Value> + Send + Sync>;

/// A filter that awaits host I/O.
#[async_trait]
pub trait AsyncFilter: Send + Sync {
    async fn invoke(
        &self,
        input: Value,
        arguments: &FilterArguments,
        ctx: &mut TemplateContext,
    ) -> RenderResult<Value>;
}

#[derive(Clone)]
pub enum Filter {
    Sync(SyncFilter),
    Async(Arc<dyn AsyncFilter>),
}

impl Filter {
    pub fn invoke(&self, input: Value, arguments: &FilterArguments, ctx: &mut TemplateContext) -> RenderResult<Value> {
        match self {
            Filter::Sync(filter) => filter(input, arguments, ctx),
            Filter::Async(filter) => pollster::block_on(filter.invoke(input, arguments, ctx)),
        }
    }
}

/// Filters by name. Populated before rendering, read-only afterwards.
#[derive(Clone, Default)]
pub struct FilterRegistry {
    filters: HashMap<String, Filter>,
}

impl FilterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in filter.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        string::register(&mut registry);
        array::register(&mut registry);
        number::register(&mut registry);
        date::register(&mut registry);
        misc::register(&mut registry);
        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, filter: F) -> &mut Self
    where
        F: Fn(Value, &FilterArguments, &mut TemplateContext) -> RenderResult<Value> + Send + Sync + 'static,
    {
        self.filters.insert(name.into(), Filter::Sync(Arc::new(filter)));
        self
    }

    pub fn register_async(&mut self, name: impl Into<String>, filter: impl AsyncFilter + 'static) -> &mut Self {
        self.filters.insert(name.into(), Filter::Async(Arc::new(filter)));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Filter> {
        self.filters.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.filters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterRegistry")
            .field("filters", &self.names())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Apply a built-in filter outside of a template.
    pub fn apply(name: &str, input: Value, arguments: Vec<Value>) -> RenderResult<Value> {
        apply_named(name, input, arguments, Vec::new())
    }

    pub fn apply_named(
        name: &str,
        input: Value,
        arguments: Vec<Value>,
        named: Vec<(&str, Value)>,
    ) -> RenderResult<Value> {
        let registry = FilterRegistry::with_builtins();
        let mut args = FilterArguments::from_positional(arguments);
        for (key, value) in named {
            args.push_named(key, value);
        }
        let mut ctx = TemplateContext::new();
        match registry.get(name) {
            Some(filter) => filter.invoke(input, &args, &mut ctx),
            None => Err(RenderError::UnknownFilter {
                name: name.to_string(),
            }),
        }
    }
}
