/*
 * options.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Render configuration.
//!
//! [`TemplateOptions`] holds everything a render reads but never writes:
//! budgets, strictness flags, the filter registry, the member access
//! strategy, global variables and the parser used for included templates.
//! Options are shared behind an `Arc` by every context created from them.
//!
//! [`EngineSettings`] is the serializable subset, loaded from YAML by the CLI.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use once_cell::sync::Lazy;
use serde::Deserialize;
use thiserror::Error;

use crate::filters::FilterRegistry;
use crate::member_access::{MemberAccessRegistry, MemberAccessStrategy, MemberNameStrategy, MissingMemberPolicy};
use crate::parser::LiquidParser;
use crate::value::Value;

/// Default bound on include/render nesting.
pub const DEFAULT_MAX_RECURSION: usize = 100;

static BUILTIN_FILTERS: Lazy<Arc<FilterRegistry>> = Lazy::new(|| Arc::new(FilterRegistry::with_builtins()));

/// Time settings used by the `date` filter.
#[derive(Debug, Clone)]
pub struct FormatOptions {
    /// Offset applied to dates that carry no offset of their own, and to `now`.
    pub time_zone: FixedOffset,
    /// Fixed value for `now`/`today`; the system clock when unset.
    pub now: Option<DateTime<FixedOffset>>,
}

impl FormatOptions {
    pub fn now(&self) -> DateTime<FixedOffset> {
        self.now
            .unwrap_or_else(|| Utc::now().with_timezone(&self.time_zone))
    }
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            time_zone: Utc.fix(),
            now: None,
        }
    }
}

/// Options shared by all renders of a context.
#[derive(Clone)]
pub struct TemplateOptions {
    /// Statements, expressions and loop iterations allowed per render.
    pub max_steps: Option<u64>,
    /// Maximum include/render nesting depth.
    pub max_recursion: usize,
    /// Reading an undefined variable is an error.
    pub strict_variables: bool,
    /// Calling an unregistered filter is an error.
    pub strict_filters: bool,
    pub format: FormatOptions,
    pub filters: Arc<FilterRegistry>,
    pub member_access: Arc<dyn MemberAccessStrategy>,
    /// Variables visible below every scope.
    pub globals: HashMap<String, Value>,
    /// Parser for included templates.
    pub parser: Arc<LiquidParser>,
}

impl TemplateOptions {
    pub fn new() -> Self {
        Self {
            max_steps: None,
            max_recursion: DEFAULT_MAX_RECURSION,
            strict_variables: false,
            strict_filters: false,
            format: FormatOptions::default(),
            filters: Arc::clone(&BUILTIN_FILTERS),
            member_access: Arc::new(MemberAccessRegistry::safe()),
            globals: HashMap::new(),
            parser: Arc::new(LiquidParser::new()),
        }
    }

    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    pub fn with_max_recursion(mut self, max_recursion: usize) -> Self {
        self.max_recursion = max_recursion;
        self
    }

    pub fn with_strict_variables(mut self, strict: bool) -> Self {
        self.strict_variables = strict;
        self
    }

    pub fn with_strict_filters(mut self, strict: bool) -> Self {
        self.strict_filters = strict;
        self
    }

    pub fn with_time_zone(mut self, time_zone: FixedOffset) -> Self {
        self.format.time_zone = time_zone;
        self
    }

    pub fn with_now(mut self, now: DateTime<FixedOffset>) -> Self {
        self.format.now = Some(now);
        self
    }

    pub fn with_filters(mut self, filters: FilterRegistry) -> Self {
        self.filters = Arc::new(filters);
        self
    }

    pub fn with_member_access(mut self, strategy: Arc<dyn MemberAccessStrategy>) -> Self {
        self.member_access = strategy;
        self
    }

    pub fn with_global(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.globals.insert(name.into(), value.into());
        self
    }

    pub fn with_parser(mut self, parser: LiquidParser) -> Self {
        self.parser = Arc::new(parser);
        self
    }
}

impl Default for TemplateOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TemplateOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateOptions")
            .field("max_steps", &self.max_steps)
            .field("max_recursion", &self.max_recursion)
            .field("strict_variables", &self.strict_variables)
            .field("strict_filters", &self.strict_filters)
            .field("format", &self.format)
            .field("globals", &self.globals.len())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid time zone offset '{0}' (expected e.g. '+02:00')")]
    InvalidTimeZone(String),

    #[error("invalid date '{0}' for `now` (expected RFC 3339)")]
    InvalidNow(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MemberAccessSetting {
    #[default]
    Safe,
    Permissive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MemberNamingSetting {
    #[default]
    Default,
    CamelCase,
    SnakeCase,
}

/// Engine configuration as written in a settings file.
///
/// ```yaml
/// max-steps: 100000
/// strict-filters: true
/// time-zone: "+02:00"
/// member-access: permissive
/// globals:
///   site: { title: Example }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EngineSettings {
    pub max_steps: Option<u64>,
    pub max_recursion: Option<usize>,
    pub strict_variables: bool,
    pub strict_filters: bool,
    pub time_zone: Option<String>,
    pub now: Option<String>,
    pub member_access: MemberAccessSetting,
    pub member_naming: MemberNamingSetting,
    pub ignore_case: bool,
    pub error_on_missing_member: bool,
    pub globals: HashMap<String, serde_json::Value>,
}

impl EngineSettings {
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    /// Apply these settings on top of `options`.
    pub fn apply(&self, mut options: TemplateOptions) -> Result<TemplateOptions, SettingsError> {
        options.max_steps = self.max_steps.or(options.max_steps);
        if let Some(max_recursion) = self.max_recursion {
            options.max_recursion = max_recursion;
        }
        options.strict_variables |= self.strict_variables;
        options.strict_filters |= self.strict_filters;

        if let Some(zone) = &self.time_zone {
            options.format.time_zone = zone
                .parse::<FixedOffset>()
                .map_err(|_| SettingsError::InvalidTimeZone(zone.clone()))?;
        }
        if let Some(now) = &self.now {
            options.format.now = Some(
                DateTime::parse_from_rfc3339(now).map_err(|_| SettingsError::InvalidNow(now.clone()))?,
            );
        }

        let registry = match self.member_access {
            MemberAccessSetting::Safe => MemberAccessRegistry::safe(),
            MemberAccessSetting::Permissive => MemberAccessRegistry::permissive(),
        };
        let naming = match self.member_naming {
            MemberNamingSetting::Default => MemberNameStrategy::Default,
            MemberNamingSetting::CamelCase => MemberNameStrategy::CamelCase,
            MemberNamingSetting::SnakeCase => MemberNameStrategy::SnakeCase,
        };
        let missing = if self.error_on_missing_member {
            MissingMemberPolicy::Error
        } else {
            MissingMemberPolicy::Nil
        };
        options.member_access = Arc::new(
            registry
                .with_naming(naming)
                .with_ignore_case(self.ignore_case)
                .with_missing_member_policy(missing),
        );

        for (name, value) in &self.globals {
            options.globals.insert(name.clone(), Value::from_json(value));
        }
        Ok(options)
    }
}
