//! Command-line interface definitions.

pub mod render;

use clap::{ColorChoice, Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;

/// Bubble Units report viewer host CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Project root directory (default: current directory)
    #[arg(short, long, global = true, value_hint = clap::ValueHint::DirPath)]
    pub root: Option<PathBuf>,

    /// Config file path, relative to the project root
    #[arg(short = 'C', long, global = true, default_value = "bubbleview.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Enable verbose output for debugging
    #[arg(short = 'V', long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Serve the report viewer with live reload and the export bridge
    #[command(visible_alias = "s")]
    Serve {
        /// Network interface to bind (e.g., 127.0.0.1, 0.0.0.0)
        #[arg(short, long)]
        interface: Option<IpAddr>,

        /// Port number to listen on (bridge socket binds port + 1)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Resolve and render the current document once
    #[command(visible_alias = "r")]
    Render {
        /// Write the rendered HTML document to this file
        #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
        output: Option<PathBuf>,

        /// Also materialize the effective target into the export directory
        /// for opening in an external browser
        #[arg(short, long)]
        export: bool,
    },
}
