/*
 * mod.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Command implementations for the quarto-liquid CLI
//!
//! Each command module handles the CLI interface and delegates to
//! quarto-liquid for the actual work.

pub mod check;
pub mod compile;
pub mod render;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use quarto_liquid::{LiquidParser, ParseErrors, ParseOutcome, Template};

/// A template file split into the directory partials resolve against and
/// its name below that directory.
pub struct TemplateFile {
    pub root: PathBuf,
    pub name: String,
    pub source: String,
}

impl TemplateFile {
    pub fn read(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read template: {}", path.display()))?;
        let root = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { root, name, source })
    }

    pub fn parse(&self, parser: &LiquidParser) -> ParseOutcome {
        parser.parse_named(&self.name, &self.source)
    }
}

/// Parse, printing diagnostics as source snippets and failing on errors.
pub fn load_template(path: &Path, parser: &LiquidParser) -> Result<(TemplateFile, Template)> {
    let file = TemplateFile::read(path)?;
    let outcome = file.parse(parser);
    let template = report(outcome)?;
    Ok((file, template))
}

/// Print every diagnostic of `outcome` to stderr; fail if any is an error.
pub fn report(outcome: ParseOutcome) -> Result<Template> {
    if outcome.diagnostics.is_empty() {
        return Ok(outcome.template);
    }
    let success = outcome.is_success();
    let template = outcome.template;
    let diagnostics = ParseErrors::new(outcome.diagnostics, template.name(), template.source_arc());
    eprintln!("{}", diagnostics.render());
    if success {
        Ok(template)
    } else {
        Err(anyhow::Error::new(diagnostics).context("Template has errors"))
    }
}
