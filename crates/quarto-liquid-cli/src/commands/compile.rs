/*
 * compile.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! `quarto-liquid compile`: check that a template lowers to closures.

use std::path::Path;

use anyhow::{Context, Result};
use quarto_liquid::LiquidParser;

pub fn execute(input: &Path) -> Result<()> {
    let (_, template) = super::load_template(input, &LiquidParser::new())?;
    let compiled = template
        .compile()
        .with_context(|| format!("Failed to compile {}", input.display()))?;
    println!("{}: compiled", compiled.name());
    Ok(())
}
