/*
 * eval/include.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! `include` and `render`.
//!
//! Partials are loaded through the render's [`crate::FileProvider`], parsed
//! with the options' parser and cached for the rest of the render. Names
//! resolve relative to the template currently rendering, which is tracked
//! in the `CURRENT_PATH` ambient value.

use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::ast::IncludeMode;
use crate::context::{CURRENT_PATH, FILE_PROVIDER, ScopeKind, TemplateContext};
use crate::error::{RenderError, RenderResult};
use crate::file_provider::resolve_partial_path;
use crate::output::RenderOutput;
use crate::template::Template;
use crate::value::Value;

use super::Completion;

/// Ambient key of the per-render partial cache.
const PARTIALS: &str = "quarto_liquid.partials";

type PartialCache = DashMap<String, Arc<Template>>;

/// An `include` or `render` with its arguments already evaluated in the
/// caller's scope.
#[derive(Debug)]
pub(crate) struct PartialRequest {
    pub mode: IncludeMode,
    pub name: String,
    pub with_value: Option<Value>,
    pub alias: Option<String>,
    pub arguments: Vec<(String, Value)>,
}

impl PartialRequest {
    fn tag(&self) -> &'static str {
        match self.mode {
            IncludeMode::Include => "include",
            IncludeMode::Render => "render",
        }
    }

    /// `with` binds under the alias, or the partial's file stem.
    fn binding_name(&self) -> String {
        match &self.alias {
            Some(alias) => alias.clone(),
            None => Path::new(&self.name)
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or(&self.name)
                .to_string(),
        }
    }
}

/// Load and render a partial.
///
/// `render_partial` runs the loaded template inside the partial's scope, so
/// the interpreter and the compiler share loading, scoping and path
/// tracking. A partial ending early returns normally; `break` and
/// `continue` reach the caller's loop from `include` but not from `render`.
pub(crate) fn render_include(
    ctx: &mut TemplateContext,
    out: &mut RenderOutput<'_>,
    request: PartialRequest,
    render_partial: impl FnOnce(&Template, &mut TemplateContext, &mut RenderOutput<'_>) -> RenderResult<Completion>,
) -> RenderResult<Completion> {
    let path = {
        let current = ctx.ambient::<String>(CURRENT_PATH);
        resolve_partial_path(&request.name, current.as_deref().map(String::as_str))
    };
    let template = load_partial(ctx, &request, &path)?;
    debug!(path = %path, tag = request.tag(), depth = ctx.depth(), "rendering partial");

    let previous = ctx.remove_ambient(CURRENT_PATH);
    ctx.set_ambient(CURRENT_PATH, path.clone());
    let result = render_nested(ctx, out, &request, &path, &template, render_partial);
    ctx.restore_ambient(CURRENT_PATH, previous);

    Ok(match result? {
        Completion::Return => Completion::Normal,
        Completion::Break | Completion::Continue if request.mode == IncludeMode::Render => Completion::Normal,
        completion => completion,
    })
}

fn render_nested(
    ctx: &mut TemplateContext,
    out: &mut RenderOutput<'_>,
    request: &PartialRequest,
    path: &str,
    template: &Template,
    render_partial: impl FnOnce(&Template, &mut TemplateContext, &mut RenderOutput<'_>) -> RenderResult<Completion>,
) -> RenderResult<Completion> {
    let kind = match request.mode {
        IncludeMode::Include => ScopeKind::Include,
        IncludeMode::Render => ScopeKind::Isolated,
    };
    let mut scope = ctx.enter_nested_template(path, kind)?;
    if let Some(value) = &request.with_value {
        scope.set_own_value(request.binding_name(), value.clone());
    }
    for (name, value) in &request.arguments {
        scope.set_own_value(name.as_str(), value.clone());
    }
    render_partial(template, &mut scope, out)
}

fn load_partial(ctx: &mut TemplateContext, request: &PartialRequest, path: &str) -> RenderResult<Arc<Template>> {
    if !ctx.has_ambient(PARTIALS) {
        ctx.set_ambient(PARTIALS, PartialCache::default());
    }
    let provider = ctx.file_provider().ok_or_else(|| RenderError::MissingAmbientValue {
        tag: request.tag().to_string(),
        key: FILE_PROVIDER.to_string(),
    })?;
    let parser = Arc::clone(&ctx.options().parser);

    let read = || -> RenderResult<Arc<Template>> {
        if !provider.exists(path) {
            return Err(RenderError::TemplateNotFound { path: path.to_string() });
        }
        let source = provider.read(path)?;
        let template = parser
            .parse_named(path, &source)
            .into_result()
            .map_err(|errors| RenderError::PartialParse {
                path: path.to_string(),
                message: errors.to_string(),
            })?;
        Ok(Arc::new(template))
    };

    match ctx.ambient::<PartialCache>(PARTIALS) {
        Some(cache) => {
            let entry = cache.entry(path.to_string()).or_try_insert_with(read)?;
            Ok(Arc::clone(entry.value()))
        }
        None => read(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::render_statements;
    use super::*;
    use crate::file_provider::{FileProvider, MemoryFileProvider};
    use crate::options::TemplateOptions;
    use crate::output::NullEncoder;
    use crate::parser::LiquidParser;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn context(files: &[(&str, &str)]) -> TemplateContext {
        let options = TemplateOptions::default().with_max_recursion(8);
        let mut ctx = TemplateContext::with_options(Arc::new(options));
        let provider: Arc<dyn FileProvider> = Arc::new(MemoryFileProvider::with_files(files.iter().copied()));
        ctx.set_file_provider(provider);
        ctx
    }

    fn render(source: &str, ctx: &mut TemplateContext) -> RenderResult<String> {
        let template = LiquidParser::new().parse(source).into_result().unwrap();
        let mut sink = String::new();
        {
            let mut out = RenderOutput::new(&mut sink, &NullEncoder);
            render_statements(&template.statements, ctx, &mut out)?;
        }
        Ok(sink)
    }

    #[test]
    fn test_include_shares_scope() {
        let mut ctx = context(&[("p.liquid", "{{ x }}{% assign y = 2 %}")]);
        let out = render("{% assign x = 1 %}{% include 'p' %}{{ y }}", &mut ctx).unwrap();
        assert_eq!(out, "12");
    }

    #[test]
    fn test_render_is_isolated() {
        let mut ctx = context(&[("p.liquid", "[{{ x }}{{ a }}]{% assign leaked = 1 %}")]);
        let out = render("{% assign x = 1 %}{% render 'p', a: 3 %}{{ leaked }}", &mut ctx).unwrap();
        assert_eq!(out, "[3]");
    }

    #[test]
    fn test_with_binding_and_alias() {
        let mut ctx = context(&[
            ("card.liquid", "{{ card.title }}"),
            ("item.liquid", "{{ entry.title }}"),
        ]);
        ctx.set_value("page", Value::dictionary([("title", Value::from("Home"))]));
        let out = render(
            "{% include 'card' with page %}/{% render 'item' with page as entry %}",
            &mut ctx,
        )
        .unwrap();
        assert_eq!(out, "Home/Home");
    }

    #[test]
    fn test_names_resolve_relative_to_current_partial() {
        let mut ctx = context(&[
            ("partials/outer.liquid", "<{% include 'inner' %}>"),
            ("partials/inner.liquid", "in"),
        ]);
        assert_eq!(render("{% include 'partials/outer' %}", &mut ctx).unwrap(), "<in>");
        assert!(ctx.ambient::<String>(CURRENT_PATH).is_none());
    }

    #[test]
    fn test_break_reaches_caller_loop_from_include() {
        let mut ctx = context(&[("stop.liquid", "{% if i == 2 %}{% break %}{% endif %}")]);
        let out = render("{% for i in (1..3) %}{{ i }}{% include 'stop' %}{% endfor %}", &mut ctx).unwrap();
        assert_eq!(out, "12");
    }

    #[test]
    fn test_missing_partial() {
        let mut ctx = context(&[]);
        let err = render("{% include 'nope' %}", &mut ctx).unwrap_err();
        assert_eq!(err.to_string(), "Template not found: nope.liquid");
    }

    #[test]
    fn test_partial_parse_error() {
        let mut ctx = context(&[("bad.liquid", "{% if %}")]);
        let err = render("{% render 'bad' %}", &mut ctx).unwrap_err();
        assert!(matches!(err, RenderError::PartialParse { ref path, .. } if path == "bad.liquid"));
    }

    #[test]
    fn test_self_include_hits_recursion_limit() {
        let mut ctx = context(&[("loop.liquid", "x{% include 'loop' %}")]);
        let err = render("{% include 'loop' %}", &mut ctx).unwrap_err();
        assert!(matches!(err, RenderError::RecursionLimitExceeded { max_depth: 8, .. }));
        assert_eq!(ctx.depth(), 0);
        assert_eq!(ctx.scope_depth(), 1);
    }

    struct CountingProvider {
        files: MemoryFileProvider,
        reads: AtomicUsize,
    }

    impl FileProvider for CountingProvider {
        fn exists(&self, path: &str) -> bool {
            self.files.exists(path)
        }

        fn read(&self, path: &str) -> Result<String, crate::error::FileProviderError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.files.read(path)
        }

        fn watch(&self, pattern: &str) -> crate::file_provider::ChangeToken {
            self.files.watch(pattern)
        }
    }

    #[test]
    fn test_partial_is_loaded_once_per_render() {
        let provider = Arc::new(CountingProvider {
            files: MemoryFileProvider::with_files([("p.liquid", "<{{ i }}>")]),
            reads: AtomicUsize::new(0),
        });
        let mut ctx = TemplateContext::new();
        ctx.set_file_provider(Arc::clone(&provider) as Arc<dyn FileProvider>);
        let out = render(
            "{% for i in (1..3) %}{% include 'p' %}{% endfor %}{% render 'p', i: 9 %}",
            &mut ctx,
        )
        .unwrap();
        assert_eq!(out, "<1><2><3><9>");
        assert_eq!(provider.reads.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.ambient::<PartialCache>(PARTIALS).map(|cache| cache.len()), Some(1));
    }

    #[test]
    fn test_missing_file_provider() {
        let err = render("{% include 'p' %}", &mut TemplateContext::new()).unwrap_err();
        assert!(matches!(
            err,
            RenderError::MissingAmbientValue { ref tag, .. } if tag == "include"
        ));
    }
}
