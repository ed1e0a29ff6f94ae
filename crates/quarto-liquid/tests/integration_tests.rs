/*
 * integration_tests.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Integration tests for quarto-liquid using test fixtures.
 */

use std::path::{Path, PathBuf};
use std::sync::Arc;

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use quarto_liquid::{
    FileProvider, FileSystemProvider, HtmlEncoder, LiquidParser, MemoryFileProvider, RenderError, Template,
    TemplateContext, TemplateOptions, Value, WriterSink,
};
use tokio_util::sync::CancellationToken;

/// Helper to get the path to test fixtures
fn fixture_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("test-fixtures")
}

/// Helper to load a template from fixtures
fn load_template(name: &str) -> Template {
    let source = std::fs::read_to_string(fixture_dir().join(name))
        .unwrap_or_else(|_| panic!("Failed to read fixture: {}", name));
    LiquidParser::new()
        .parse_named(name, &source)
        .into_result()
        .unwrap_or_else(|e| panic!("Failed to parse fixture {}: {}", name, e))
}

/// A context whose partials resolve against the fixture directory.
fn fixture_context(data: serde_json::Value) -> TemplateContext {
    let mut ctx = TemplateContext::from_json(&data, Arc::new(TemplateOptions::new()));
    let provider: Arc<dyn FileProvider> = Arc::new(FileSystemProvider::new(fixture_dir()));
    ctx.set_file_provider(provider);
    ctx
}

fn render_source(source: &str) -> String {
    let template = quarto_liquid::parse(source).unwrap();
    template.render(&mut TemplateContext::new()).unwrap()
}

// ============================================================================
// Basic scenarios
// ============================================================================

#[test]
fn test_basic_scenarios() {
    assert_eq!(render_source(r#"{{ "abc" | upcase }}"#), "ABC");
    assert_eq!(render_source("{% assign x = 1 %}{{ x }}"), "1");
    assert_eq!(render_source("{% for i in (1..3) %}{{ i }}{% endfor %}"), "123");
    assert_eq!(render_source("{% if true %}a{% else %}b{% endif %}"), "a");
}

#[test]
fn test_remove_without_argument_is_a_filter_error() {
    let template = quarto_liquid::parse("{{ 0 | remove }}").unwrap();
    let err = template.render(&mut TemplateContext::new()).unwrap_err();
    assert!(matches!(&err, RenderError::InvalidFilterArgs { filter, .. } if filter == "remove"));
    let message = err.to_string();
    assert!(message.contains("remove"), "{}", message);
    assert!(message.contains("a string argument is required"), "{}", message);
}

#[test]
fn test_simple_interpolation() {
    let template = load_template("greeting.liquid");
    let mut ctx = fixture_context(serde_json::json!({ "name": "world" }));
    assert_eq!(template.render(&mut ctx).unwrap(), "Hello, World!");
}

// ============================================================================
// Loops and scopes
// ============================================================================

#[test]
fn test_forloop_metadata() {
    let template = load_template("forloop.liquid");
    let mut ctx = fixture_context(serde_json::json!({ "items": ["a", "b", "c"] }));
    assert_eq!(template.render(&mut ctx).unwrap(), "1/3 a, 2/3 b, 3/3 c");
}

#[test]
fn test_forloop_window() {
    assert_eq!(
        render_source("{% for i in (1..5) offset:1 limit:2 %}{{ forloop.index }}:{{ forloop.last }}{% endfor %}"),
        "1:false2:true"
    );
    assert_eq!(
        render_source("{% for i in (1..5) offset:1 limit:3 reversed %}{{ i }}{% endfor %}"),
        "432"
    );
}

#[test]
fn test_for_else_on_empty_collection() {
    let template = quarto_liquid::parse("{% for x in items %}{{ x }}{% else %}none{% endfor %}").unwrap();
    let mut ctx = TemplateContext::new();
    ctx.set_value("items", Value::array(Vec::new()));
    assert_eq!(template.render(&mut ctx).unwrap(), "none");
}

#[test]
fn test_capture_scope() {
    let template = load_template("capture.liquid");
    let mut ctx = fixture_context(serde_json::json!({ "name": "ana" }));
    assert_eq!(template.render(&mut ctx).unwrap(), "HI ANA[]");
}

#[test]
fn test_outer_variables_are_mutable_from_loops() {
    assert_eq!(
        render_source("{% assign total = 0 %}{% for i in (1..4) %}{% assign total = total | plus: i %}{% endfor %}{{ total }}"),
        "10"
    );
}

#[test]
fn test_case_and_nil_comparisons() {
    assert_eq!(
        render_source("{% assign x = 2 %}{% case x %}{% when 1, 2 %}low{% when 2 %}two{% else %}high{% endcase %}"),
        "low"
    );
    assert_eq!(render_source("{% if missing == nil %}nil{% endif %}"), "nil");
    assert_eq!(render_source("{% if missing < 1 %}lt{% else %}no{% endif %}"), "no");
}

// ============================================================================
// Partials and layouts
// ============================================================================

#[test]
fn test_include_shares_scope_and_render_isolates_it() {
    let template = load_template("page.liquid");
    let mut ctx = fixture_context(serde_json::json!({
        "cards": [{ "name": "x" }, { "name": "y" }]
    }));
    assert_eq!(template.render(&mut ctx).unwrap(), "<h1>Report</h1><p>x</p><p>y</p>");
}

#[test]
fn test_layout_wraps_body() {
    let page = load_template("page.liquid");
    let layout = load_template("layout.liquid");
    let mut ctx = fixture_context(serde_json::json!({ "cards": [{ "name": "x" }] }));
    assert_eq!(
        page.render_with_layout(&layout, &mut ctx).unwrap(),
        "<main>Report|<h1>Report</h1><p>x</p></main>"
    );
}

#[test]
fn test_missing_partial() {
    let template = quarto_liquid::parse("{% include 'missing' %}").unwrap();
    let mut ctx = fixture_context(serde_json::Value::Null);
    let err = template.render(&mut ctx).unwrap_err();
    assert_eq!(err.to_string(), "Template not found: missing.liquid");
}

#[test]
fn test_self_including_partial_hits_recursion_limit() {
    let provider = MemoryFileProvider::with_files([("loop.liquid", "x{% include 'loop' %}")]);
    let options = TemplateOptions::new().with_max_recursion(5);
    let mut ctx = TemplateContext::with_options(Arc::new(options));
    ctx.set_file_provider(Arc::new(provider));
    let template = quarto_liquid::parse("{% include 'loop' %}").unwrap();
    let err = template.render(&mut ctx).unwrap_err();
    assert!(matches!(err, RenderError::RecursionLimitExceeded { max_depth: 5, .. }), "{}", err);
}

// ============================================================================
// Output encoding
// ============================================================================

#[test]
fn test_html_encoding_skips_raw_filter() {
    let template = quarto_liquid::parse("{{ body }}|{{ body | raw }}").unwrap();
    let mut ctx = TemplateContext::new();
    ctx.set_value("body", "<b>&</b>");

    let mut sink = WriterSink::new(Vec::new());
    template.render_to(&mut sink, &HtmlEncoder, &mut ctx).unwrap();
    let bytes = sink.finish().unwrap();
    assert_eq!(String::from_utf8(bytes).unwrap(), "&lt;b&gt;&amp;&lt;/b&gt;|<b>&</b>");
}

// ============================================================================
// Diagnostics
// ============================================================================

#[test]
fn test_parser_reports_every_error() {
    let source = std::fs::read_to_string(fixture_dir().join("broken.liquid")).unwrap();
    let outcome = LiquidParser::new().parse_named("broken.liquid", &source);
    assert!(!outcome.is_success());

    let codes: Vec<&str> = outcome.diagnostics.iter().filter_map(|d| d.code.as_deref()).collect();
    assert!(codes.contains(&"L-1-2"), "{:?}", codes);
    assert!(codes.contains(&"L-1-4"), "{:?}", codes);
    assert!(codes.contains(&"L-1-5"), "{:?}", codes);

    let unknown = outcome
        .diagnostics
        .iter()
        .find(|d| d.code.as_deref() == Some("L-1-2"))
        .unwrap();
    assert_eq!(unknown.line, 2);
    assert_eq!(unknown.column, 1);

    let errors = outcome.into_result().unwrap_err();
    assert!(errors.render().contains("broken.liquid"));
}

#[test]
fn test_verbatim_blocks_close_on_their_own_end_tag() {
    assert_eq!(render_source("{% raw %}a{% endcomment %}b{% endraw %}"), "a{% endcomment %}b");
    assert_eq!(render_source("x{% comment %}{% endraw %}{{ y }}{% endcomment %}z"), "xz");
}

#[test]
fn test_trim_markers_apply_to_raw_bodies() {
    assert_eq!(render_source("{% raw -%}  x  {%- endraw %}"), "x");
    assert_eq!(render_source("[ {%- raw -%} \n{{ a }}\n {%- endraw -%} ]"), "[{{ a }}]");
}

#[test]
fn test_deeply_nested_expression_is_a_diagnostic() {
    let depth = 10_000;
    let source = format!("{{{{ {}1{} }}}}", "(".repeat(depth), ")".repeat(depth));
    let outcome = LiquidParser::new().parse(&source);
    assert!(!outcome.is_success());
    let diagnostic = &outcome.diagnostics[0];
    assert_eq!(diagnostic.code.as_deref(), Some("L-1-5"));
    assert!(diagnostic.message.contains("nesting too deep"), "{}", diagnostic.message);

    let shallow = format!("{{{{ {}1{} }}}}", "(".repeat(50), ")".repeat(50));
    assert_eq!(render_source(&shallow), "1");
}

// ============================================================================
// Budgets and cancellation
// ============================================================================

#[test]
fn test_step_budget_exhaustion() {
    let template = quarto_liquid::parse("{% for i in (1..1000) %}{{ i }}{% endfor %}").unwrap();
    let options = TemplateOptions::new().with_max_steps(50);
    let mut ctx = TemplateContext::with_options(Arc::new(options));
    let err = template.render(&mut ctx).unwrap_err();
    assert!(matches!(err, RenderError::StepBudgetExceeded { max_steps: 50 }), "{}", err);
}

#[test]
fn test_cancelled_render() {
    let token = CancellationToken::new();
    token.cancel();
    let template = quarto_liquid::parse("{{ 1 }}").unwrap();
    let mut ctx = TemplateContext::new().with_cancellation(token);
    assert!(matches!(template.render(&mut ctx), Err(RenderError::Cancelled)));
}

// ============================================================================
// Compiler
// ============================================================================

#[test]
fn test_compiled_fixtures_match_interpreter() {
    let cases = [
        ("greeting.liquid", serde_json::json!({ "name": "world" })),
        ("forloop.liquid", serde_json::json!({ "items": [1, 2, 3, 4] })),
        ("capture.liquid", serde_json::json!({ "name": "ana" })),
        ("page.liquid", serde_json::json!({ "cards": [{ "name": "x" }] })),
    ];
    for (name, data) in cases {
        let template = load_template(name);
        let compiled = template.compile().unwrap();

        let mut interpreted_ctx = fixture_context(data.clone());
        let mut compiled_ctx = fixture_context(data);
        let interpreted = template.render(&mut interpreted_ctx).unwrap();
        let lowered = compiled.render(&mut compiled_ctx).unwrap();

        assert_eq!(interpreted, lowered, "output differs for {}", name);
        assert_eq!(interpreted_ctx.steps(), compiled_ctx.steps(), "steps differ for {}", name);
    }
}

#[test]
fn test_concurrent_renders_share_one_template() {
    let template = Arc::new(quarto_liquid::parse("{% for i in (1..n) %}{{ i }}{% endfor %}").unwrap());
    std::thread::scope(|scope| {
        let handles: Vec<_> = (1..=4)
            .map(|n| {
                let template = Arc::clone(&template);
                scope.spawn(move || {
                    let mut ctx = TemplateContext::new();
                    ctx.set_value("n", n);
                    template.render(&mut ctx).unwrap()
                })
            })
            .collect();
        let outputs: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(outputs, vec!["1", "12", "123", "1234"]);
    });
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_numbers_are_truthy_unless_zero(n in any::<i64>()) {
        prop_assert_eq!(Value::from(n).to_boolean(), n != 0);
    }

    #[test]
    fn prop_rendering_is_deterministic(items in proptest::collection::vec(any::<i32>(), 0..12)) {
        let template = quarto_liquid::parse("{% for x in items reversed %}{{ x }},{% endfor %}{{ items | size }}").unwrap();
        let render = || {
            let mut ctx = TemplateContext::new();
            ctx.set_value("items", Value::array(items.iter().map(|&x| Value::from(x))));
            template.render(&mut ctx).unwrap()
        };
        let expected: String = items
            .iter()
            .rev()
            .map(|x| format!("{},", x))
            .chain(std::iter::once(items.len().to_string()))
            .collect();
        prop_assert_eq!(render(), expected.clone());
        prop_assert_eq!(render(), expected);
    }

    #[test]
    fn prop_array_equality_is_reflexive_and_symmetric(
        left in proptest::collection::vec(any::<i32>(), 0..6),
        right in proptest::collection::vec(any::<i32>(), 0..6),
    ) {
        let a = Value::array(left.iter().map(|&x| Value::from(x)));
        let b = Value::array(right.iter().map(|&x| Value::from(x)));
        prop_assert!(a == a.clone());
        prop_assert_eq!(a == b, b == a);
        prop_assert_eq!(a == b, left == right);
        prop_assert_eq!(a == Value::Empty, left.is_empty());
    }
}
