/*
 * context.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Per-render evaluation state.
//!
//! A [`TemplateContext`] owns the variable scope chain, the ambient values
//! extension tags use to talk to each other, the step counter and the
//! include depth. Each render gets its own context; contexts are never
//! shared between concurrent renders.
//!
//! Scopes are entered through guards. Dropping a [`ScopeGuard`] pops its
//! scope, so a scope is released exactly once even when evaluation unwinds
//! with an error.

use std::any::Any;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{RenderError, RenderResult};
use crate::file_provider::FileProvider;
use crate::member_access::MemberAccessStrategy;
use crate::options::TemplateOptions;
use crate::value::Value;

/// Ambient key holding the `Arc<dyn FileProvider>` used by include and render.
pub const FILE_PROVIDER: &str = "quarto_liquid.file_provider";

/// Ambient key holding the path of the template being rendered.
pub const CURRENT_PATH: &str = "quarto_liquid.current_path";

/// Ambient key holding the rendered body of a page inside its layout.
pub const LAYOUT_BODY: &str = "quarto_liquid.layout_body";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// The outermost scope of a render.
    Root,
    /// A block scope; reads and writes fall through to the parent.
    Block,
    /// A loop body; new names are written to the nearest enclosing non-loop
    /// scope so that `assign` inside a loop survives the loop.
    Loop,
    /// An `include` body; like a loop, new names land in the caller's scope.
    Include,
    /// A `render` scope; enclosing scopes are invisible.
    Isolated,
}

#[derive(Debug)]
struct Scope {
    kind: ScopeKind,
    values: HashMap<String, Value>,
}

impl Scope {
    fn new(kind: ScopeKind) -> Self {
        Self {
            kind,
            values: HashMap::new(),
        }
    }
}

/// The evaluation environment of one render.
pub struct TemplateContext {
    scopes: Vec<Scope>,
    ambient: HashMap<String, Arc<dyn Any + Send + Sync>>,
    steps: u64,
    depth: usize,
    counters: HashMap<String, i64>,
    cycles: HashMap<String, usize>,
    options: Arc<TemplateOptions>,
    cancellation: CancellationToken,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::with_options(Arc::new(TemplateOptions::default()))
    }

    pub fn with_options(options: Arc<TemplateOptions>) -> Self {
        Self {
            scopes: vec![Scope::new(ScopeKind::Root)],
            ambient: HashMap::new(),
            steps: 0,
            depth: 0,
            counters: HashMap::new(),
            cycles: HashMap::new(),
            options,
            cancellation: CancellationToken::new(),
        }
    }

    /// Create a context whose root scope holds the fields of a JSON object.
    pub fn from_json(json: &serde_json::Value, options: Arc<TemplateOptions>) -> Self {
        let mut ctx = Self::with_options(options);
        if let serde_json::Value::Object(map) = json {
            for (name, value) in map {
                ctx.set_value(name.clone(), Value::from_json(value));
            }
        }
        ctx
    }

    /// Create a context whose root scope holds the fields of a serializable model.
    pub fn from_model<T: Serialize + ?Sized>(model: &T, options: Arc<TemplateOptions>) -> Self {
        match serde_json::to_value(model) {
            Ok(json) => Self::from_json(&json, options),
            Err(_) => Self::with_options(options),
        }
    }

    /// Replace the member access strategy for this context only.
    pub fn with_member_access(mut self, strategy: Arc<dyn MemberAccessStrategy>) -> Self {
        let mut options = (*self.options).clone();
        options.member_access = strategy;
        self.options = Arc::new(options);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn options(&self) -> &TemplateOptions {
        &self.options
    }

    pub fn options_arc(&self) -> &Arc<TemplateOptions> {
        &self.options
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    // ------------------------------------------------------------------
    // Variables
    // ------------------------------------------------------------------

    /// Scopes visible from the top, innermost first, stopping after the
    /// nearest isolated scope.
    fn visible_scopes(&self) -> impl Iterator<Item = (usize, &Scope)> {
        let boundary = self
            .scopes
            .iter()
            .rposition(|s| matches!(s.kind, ScopeKind::Isolated | ScopeKind::Root))
            .unwrap_or(0);
        self.scopes.iter().enumerate().skip(boundary).rev()
    }

    /// Look a variable up through the scope chain, then the globals.
    pub fn try_get_value(&self, name: &str) -> Option<&Value> {
        self.visible_scopes()
            .find_map(|(_, scope)| scope.values.get(name))
            .or_else(|| self.options.globals.get(name))
    }

    /// Like [`Self::try_get_value`], yielding `Undefined` for unknown names.
    pub fn get_value(&self, name: &str) -> Value {
        self.try_get_value(name).cloned().unwrap_or(Value::Undefined)
    }

    /// Assign a variable.
    ///
    /// An existing binding in a visible scope is updated in place; otherwise
    /// the variable is created in the innermost non-loop scope.
    pub fn set_value(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();

        let existing = self
            .visible_scopes()
            .find(|(_, scope)| scope.values.contains_key(&name))
            .map(|(index, _)| index);
        let target = existing.or_else(|| {
            self.visible_scopes()
                .find(|(_, scope)| !matches!(scope.kind, ScopeKind::Loop | ScopeKind::Include))
                .map(|(index, _)| index)
        });

        let index = target.unwrap_or(self.scopes.len() - 1);
        self.scopes[index].values.insert(name, value);
    }

    /// Bind a variable in the innermost scope, shadowing outer bindings.
    pub fn set_own_value(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.values.insert(name.into(), value.into());
        }
    }

    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    /// Push a scope; it is popped when the guard drops.
    pub fn enter_child_scope(&mut self, kind: ScopeKind) -> ScopeGuard<'_> {
        self.scopes.push(Scope::new(kind));
        ScopeGuard {
            ctx: self,
            nested: false,
        }
    }

    /// Push a scope that hides every enclosing scope.
    pub fn enter_isolated_scope(&mut self) -> ScopeGuard<'_> {
        self.enter_child_scope(ScopeKind::Isolated)
    }

    /// Enter an included template, enforcing the recursion limit.
    pub fn enter_nested_template(&mut self, template: &str, kind: ScopeKind) -> RenderResult<ScopeGuard<'_>> {
        if self.depth >= self.options.max_recursion {
            return Err(RenderError::RecursionLimitExceeded {
                template: template.to_string(),
                max_depth: self.options.max_recursion,
            });
        }
        self.depth += 1;
        self.scopes.push(Scope::new(kind));
        Ok(ScopeGuard {
            ctx: self,
            nested: true,
        })
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    // ------------------------------------------------------------------
    // Budget and cancellation
    // ------------------------------------------------------------------

    /// Count one evaluation step.
    pub fn increment_steps(&mut self) -> RenderResult<()> {
        self.steps += 1;
        if let Some(max_steps) = self.options.max_steps
            && self.steps > max_steps
        {
            return Err(RenderError::StepBudgetExceeded { max_steps });
        }
        if self.cancellation.is_cancelled() {
            return Err(RenderError::Cancelled);
        }
        Ok(())
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    // ------------------------------------------------------------------
    // Ambient values
    // ------------------------------------------------------------------

    pub fn set_ambient<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.ambient.insert(key.into(), Arc::new(value));
    }

    pub fn ambient<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.ambient
            .get(key)
            .and_then(|value| Arc::clone(value).downcast::<T>().ok())
    }

    pub fn has_ambient(&self, key: &str) -> bool {
        self.ambient.contains_key(key)
    }

    pub fn remove_ambient(&mut self, key: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.ambient.remove(key)
    }

    /// Put back a value previously taken with [`Self::remove_ambient`].
    pub fn restore_ambient(&mut self, key: impl Into<String>, value: Option<Arc<dyn Any + Send + Sync>>) {
        let key = key.into();
        match value {
            Some(value) => {
                self.ambient.insert(key, value);
            }
            None => {
                self.ambient.remove(&key);
            }
        }
    }

    pub fn set_file_provider(&mut self, provider: Arc<dyn FileProvider>) {
        self.set_ambient(FILE_PROVIDER, provider);
    }

    pub fn file_provider(&self) -> Option<Arc<dyn FileProvider>> {
        self.ambient::<Arc<dyn FileProvider>>(FILE_PROVIDER)
            .map(|provider| Arc::clone(provider.as_ref()))
    }

    // ------------------------------------------------------------------
    // Tag state
    // ------------------------------------------------------------------

    /// `{% increment %}`: returns the current value, then adds one.
    pub fn increment_counter(&mut self, name: &str) -> i64 {
        let counter = self.counters.entry(name.to_string()).or_insert(0);
        let current = *counter;
        *counter += 1;
        current
    }

    /// `{% decrement %}`: subtracts one, then returns the new value.
    pub fn decrement_counter(&mut self, name: &str) -> i64 {
        let counter = self.counters.entry(name.to_string()).or_insert(0);
        *counter -= 1;
        *counter
    }

    /// Next position of a `{% cycle %}` group with `len` values.
    pub fn next_cycle(&mut self, group: &str, len: usize) -> usize {
        let position = self.cycles.entry(group.to_string()).or_insert(0);
        let current = *position % len.max(1);
        *position = current + 1;
        current
    }
}

impl Default for TemplateContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TemplateContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateContext")
            .field("scopes", &self.scopes)
            .field("ambient", &self.ambient.keys().collect::<Vec<_>>())
            .field("steps", &self.steps)
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}

/// Releases a scope on drop.
pub struct ScopeGuard<'a> {
    ctx: &'a mut TemplateContext,
    nested: bool,
}

impl Deref for ScopeGuard<'_> {
    type Target = TemplateContext;

    fn deref(&self) -> &TemplateContext {
        self.ctx
    }
}

impl DerefMut for ScopeGuard<'_> {
    fn deref_mut(&mut self) -> &mut TemplateContext {
        self.ctx
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        // the root scope is never popped
        if self.ctx.scopes.len() > 1 {
            self.ctx.scopes.pop();
        }
        if self.nested {
            self.ctx.depth -= 1;
        }
    }
}
