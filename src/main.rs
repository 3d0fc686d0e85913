//! bubbleview - hosts a JUnit bubble-report viewer in an embedded browser view.

#![allow(dead_code)]

mod actor;
mod bridge;
mod cli;
mod config;
mod core;
mod export;
mod logger;
mod report;
mod resolve;
mod serve;
mod watch;

use std::sync::Arc;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use config::BubbleConfig;

fn main() -> Result<()> {
    // Setup global Ctrl+C handler (before any blocking operations)
    core::setup_shutdown_handler()?;

    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }

    logger::set_verbose(cli.verbose);

    let mut config = BubbleConfig::load(&cli)?;

    match &cli.command {
        Commands::Serve { interface, port } => {
            if let Some(interface) = interface {
                config.serve.interface = *interface;
            }
            if let Some(port) = port {
                config.serve.port = *port;
            }
            serve::run(Arc::new(config))
        }
        Commands::Render { output, export } => {
            cli::render::run(Arc::new(config), output.clone(), *export)
        }
    }
}
