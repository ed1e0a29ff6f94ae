/*
 * main.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! quarto-liquid CLI - Main entry point

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "quarto-liquid")]
#[command(version)]
#[command(about = "Parse, check, render and compile Liquid templates", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a template and print its diagnostics
    Check {
        /// Template file
        input: PathBuf,
    },

    /// Render a template to stdout
    Render {
        /// Template file
        input: PathBuf,

        /// JSON file whose top-level fields become template variables
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// YAML file with engine settings
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Layout template; the input is placed at `{% renderbody %}`
        #[arg(short, long)]
        layout: Option<PathBuf>,

        /// HTML-encode output values
        #[arg(long)]
        html: bool,

        /// Render with the closure compiler instead of the interpreter
        #[arg(long)]
        compiled: bool,
    },

    /// Check that a template can be compiled
    Compile {
        /// Template file
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quarto_liquid=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check { input } => commands::check::execute(&input),
        Commands::Render {
            input,
            data,
            config,
            layout,
            html,
            compiled,
        } => commands::render::execute(commands::render::RenderArgs {
            input,
            data,
            config,
            layout,
            html,
            compiled,
        }),
        Commands::Compile { input } => commands::compile::execute(&input),
    }
}
