/*
 * member_access.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Member access on host objects.
//!
//! Templates never reach into host data on their own. Every `object.member`
//! read on a [`Value::Object`] goes through a [`MemberAccessStrategy`], which
//! returns an accessor for the member or reports that it does not exist.
//!
//! [`MemberAccessRegistry`] is the built-in strategy. Its safe policy only
//! exposes types and members the host registered; its permissive policy also
//! exposes the serialized fields of any object created with
//! [`Value::object`]. Resolved accessors are cached per `(type, member)` for
//! the lifetime of the registry.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::context::TemplateContext;
use crate::error::{RenderError, RenderResult};
use crate::value::{ObjectValue, Value};

/// Accessor computing a member from the object and the render context.
pub type SyncMemberAccessor = Arc<dyn Fn(&ObjectValue, &TemplateContext) -> RenderResult<Value> + Send + Sync>;

/// A member accessor that performs host I/O.
#[async_trait]
pub trait AsyncMemberAccessor: Send + Sync {
    async fn get(&self, object: &ObjectValue, ctx: &TemplateContext) -> RenderResult<Value>;
}

/// A resolved member accessor.
#[derive(Clone)]
pub enum MemberAccessor {
    Sync(SyncMemberAccessor),
    Async(Arc<dyn AsyncMemberAccessor>),
}

impl MemberAccessor {
    /// Read the member; asynchronous accessors are driven to completion here.
    pub fn get(&self, object: &ObjectValue, ctx: &TemplateContext) -> RenderResult<Value> {
        match self {
            MemberAccessor::Sync(accessor) => accessor(object, ctx),
            MemberAccessor::Async(accessor) => pollster::block_on(accessor.get(object, ctx)),
        }
    }
}

impl std::fmt::Debug for MemberAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemberAccessor::Sync(_) => f.write_str("MemberAccessor::Sync"),
            MemberAccessor::Async(_) => f.write_str("MemberAccessor::Async"),
        }
    }
}

/// Resolves member names on host objects.
pub trait MemberAccessStrategy: Send + Sync {
    /// `Ok(None)` means the member does not exist.
    fn get_accessor(&self, object: &ObjectValue, name: &str) -> RenderResult<Option<MemberAccessor>>;
}

/// How host member names appear in templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemberNameStrategy {
    /// As registered.
    #[default]
    Default,
    /// `first_name` is read as `firstName`.
    CamelCase,
    /// `firstName` is read as `first_name`.
    SnakeCase,
}

impl MemberNameStrategy {
    pub fn apply(self, name: &str) -> String {
        match self {
            MemberNameStrategy::Default => name.to_string(),
            MemberNameStrategy::CamelCase => to_camel_case(name),
            MemberNameStrategy::SnakeCase => to_snake_case(name),
        }
    }
}

fn to_camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for (i, c) in name.chars().enumerate() {
        if c == '_' || c == '-' {
            upper_next = i > 0;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else if i == 0 {
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else if c == '-' {
            out.push('_');
        } else {
            out.push(c);
        }
    }
    out
}

/// What happens when a template reads a member that does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingMemberPolicy {
    /// The read yields nil.
    #[default]
    Nil,
    /// The read fails with [`RenderError::MemberAccess`].
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccessPolicy {
    Safe,
    Permissive,
}

struct TypeEntry {
    expose_fields: bool,
    members: HashMap<String, MemberAccessor>,
}

/// Registration table and cache for host member access.
pub struct MemberAccessRegistry {
    policy: AccessPolicy,
    naming: MemberNameStrategy,
    ignore_case: bool,
    missing: MissingMemberPolicy,
    types: HashMap<TypeId, TypeEntry>,
    cache: DashMap<(TypeId, String), Option<MemberAccessor>>,
}

impl MemberAccessRegistry {
    fn with_policy(policy: AccessPolicy) -> Self {
        Self {
            policy,
            naming: MemberNameStrategy::Default,
            ignore_case: false,
            missing: MissingMemberPolicy::Nil,
            types: HashMap::new(),
            cache: DashMap::new(),
        }
    }

    /// Only registered types and members are visible.
    pub fn safe() -> Self {
        Self::with_policy(AccessPolicy::Safe)
    }

    /// Registered members plus the serialized fields of any object.
    pub fn permissive() -> Self {
        Self::with_policy(AccessPolicy::Permissive)
    }

    pub fn with_naming(mut self, naming: MemberNameStrategy) -> Self {
        self.naming = naming;
        self.cache.clear();
        self
    }

    pub fn with_ignore_case(mut self, ignore_case: bool) -> Self {
        self.ignore_case = ignore_case;
        self.cache.clear();
        self
    }

    pub fn with_missing_member_policy(mut self, missing: MissingMemberPolicy) -> Self {
        self.missing = missing;
        self
    }

    fn entry<T: Any>(&mut self) -> &mut TypeEntry {
        self.cache.clear();
        self.types.entry(TypeId::of::<T>()).or_insert_with(|| TypeEntry {
            expose_fields: false,
            members: HashMap::new(),
        })
    }

    /// Expose every serialized field of `T`.
    pub fn register_type<T: Any>(&mut self) -> &mut Self {
        self.entry::<T>().expose_fields = true;
        self
    }

    /// Expose a computed member of `T`.
    pub fn register_member<T, F>(&mut self, name: impl Into<String>, accessor: F) -> &mut Self
    where
        T: Any,
        F: Fn(&T) -> Value + Send + Sync + 'static,
    {
        let accessor: SyncMemberAccessor = Arc::new(move |object: &ObjectValue, _ctx: &TemplateContext| {
            Ok(object.downcast_ref::<T>().map_or(Value::Nil, &accessor))
        });
        self.entry::<T>()
            .members
            .insert(name.into(), MemberAccessor::Sync(accessor));
        self
    }

    /// Expose a member of `T` whose value is fetched asynchronously.
    pub fn register_async_member<T: Any>(
        &mut self,
        name: impl Into<String>,
        accessor: impl AsyncMemberAccessor + 'static,
    ) -> &mut Self {
        self.entry::<T>()
            .members
            .insert(name.into(), MemberAccessor::Async(Arc::new(accessor)));
        self
    }

    fn matches(&self, exposed: &str, requested: &str) -> bool {
        if self.ignore_case {
            exposed.eq_ignore_ascii_case(requested)
        } else {
            exposed == requested
        }
    }

    fn resolve(&self, object: &ObjectValue, name: &str) -> Option<MemberAccessor> {
        let entry = self.types.get(&object.type_id());

        if let Some(entry) = entry {
            for (member, accessor) in &entry.members {
                if self.matches(&self.naming.apply(member), name) {
                    return Some(accessor.clone());
                }
            }
        }

        let fields_visible = match self.policy {
            AccessPolicy::Permissive => true,
            AccessPolicy::Safe => entry.is_some_and(|e| e.expose_fields),
        };
        if !fields_visible {
            return None;
        }

        let Some(serde_json::Value::Object(fields)) = object.project() else {
            return None;
        };
        let field = fields
            .keys()
            .find(|field| self.matches(&self.naming.apply(field), name))?
            .clone();

        let accessor: SyncMemberAccessor = Arc::new(move |object: &ObjectValue, _ctx: &TemplateContext| {
            Ok(object
                .project()
                .and_then(|json| json.get(&field))
                .map_or(Value::Nil, Value::from_json))
        });
        Some(MemberAccessor::Sync(accessor))
    }

    fn found_or_missing(
        &self,
        accessor: Option<MemberAccessor>,
        object: &ObjectValue,
        name: &str,
    ) -> RenderResult<Option<MemberAccessor>> {
        match (accessor, self.missing) {
            (None, MissingMemberPolicy::Error) => Err(RenderError::MemberAccess {
                type_name: object.short_type_name().to_string(),
                member: name.to_string(),
            }),
            (accessor, _) => Ok(accessor),
        }
    }
}

impl MemberAccessStrategy for MemberAccessRegistry {
    fn get_accessor(&self, object: &ObjectValue, name: &str) -> RenderResult<Option<MemberAccessor>> {
        let key = (object.type_id(), name.to_string());
        if let Some(cached) = self.cache.get(&key) {
            let accessor = cached.value().clone();
            drop(cached);
            return self.found_or_missing(accessor, object, name);
        }

        let accessor = self.resolve(object, name);
        tracing::trace!(
            type_name = object.type_name(),
            member = name,
            found = accessor.is_some(),
            "resolved member accessor"
        );
        // misses on projected objects depend on the instance (maps), so only hits are cached for them
        if accessor.is_some() || !object.is_projectable() {
            self.cache.insert(key, accessor.clone());
        }
        self.found_or_missing(accessor, object, name)
    }
}

impl Default for MemberAccessRegistry {
    fn default() -> Self {
        Self::safe()
    }
}
