/*
 * render.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Render command implementation.
//!
//! Renders one template to stdout. Partials (`include`, `render`) resolve
//! against the directory of the input template. Template variables come
//! from the top-level fields of the `--data` JSON file; engine settings
//! (budgets, strictness, time zone, member access) from `--config`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use quarto_liquid::{
    EngineSettings, FileProvider, FileSystemProvider, HtmlEncoder, NullEncoder, Template, TemplateContext,
    TemplateOptions, TextEncoder, TextSink, WriterSink,
};

/// Arguments for the render command
#[derive(Debug)]
pub struct RenderArgs {
    /// Template file
    pub input: PathBuf,
    /// JSON data file
    pub data: Option<PathBuf>,
    /// YAML settings file
    pub config: Option<PathBuf>,
    /// Layout template
    pub layout: Option<PathBuf>,
    /// HTML-encode output values
    pub html: bool,
    /// Use the closure compiler
    pub compiled: bool,
}

/// Execute the render command
pub fn execute(args: RenderArgs) -> Result<()> {
    let options = load_options(&args)?;
    let parser = Arc::clone(&options.parser);
    let (file, template) = super::load_template(&args.input, &parser)?;

    let data = match &args.data {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read data file: {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))?
        }
        None => serde_json::Value::Null,
    };
    let mut ctx = TemplateContext::from_json(&data, Arc::new(options));
    let provider: Arc<dyn FileProvider> = Arc::new(FileSystemProvider::new(&file.root));
    ctx.set_file_provider(provider);

    let encoder: &dyn TextEncoder = if args.html { &HtmlEncoder } else { &NullEncoder };
    let mut sink = WriterSink::new(std::io::stdout());

    debug!(
        template = %file.name,
        root = %file.root.display(),
        compiled = args.compiled,
        html = args.html,
        "rendering"
    );

    match &args.layout {
        Some(layout_path) => {
            let (_, layout) = super::load_template(layout_path, &parser)?;
            render_with_layout(&template, &layout, &mut sink, encoder, &mut ctx)?;
        }
        None if args.compiled => {
            let compiled = template.compile().context("Template cannot be compiled")?;
            compiled
                .render_to(&mut sink, encoder, &mut ctx)
                .with_context(|| format!("Failed to render {}", file.name))?;
        }
        None => template
            .render_to(&mut sink, encoder, &mut ctx)
            .with_context(|| format!("Failed to render {}", file.name))?,
    }

    sink.finish().context("Failed to write output")?;
    Ok(())
}

fn render_with_layout(
    template: &Template,
    layout: &Template,
    sink: &mut dyn TextSink,
    encoder: &dyn TextEncoder,
    ctx: &mut TemplateContext,
) -> Result<()> {
    template
        .render_with_layout_to(layout, sink, encoder, ctx)
        .with_context(|| format!("Failed to render {} in layout {}", template.name(), layout.name()))
}

fn load_options(args: &RenderArgs) -> Result<TemplateOptions> {
    let options = TemplateOptions::new();
    let Some(path) = &args.config else {
        return Ok(options);
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let settings =
        EngineSettings::from_yaml(&text).with_context(|| format!("Invalid settings in {}", path.display()))?;
    debug!(?settings, "loaded engine settings");
    settings
        .apply(options)
        .with_context(|| format!("Invalid settings in {}", path.display()))
}
