/*
 * check.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! `quarto-liquid check`: parse a template and report its diagnostics.

use std::path::Path;

use anyhow::Result;
use quarto_liquid::LiquidParser;
use tracing::info;

pub fn execute(input: &Path) -> Result<()> {
    let (file, template) = super::load_template(input, &LiquidParser::new())?;
    info!(template = %file.name, statements = template.statements.len(), "template is valid");
    println!("{}: ok", input.display());
    Ok(())
}
