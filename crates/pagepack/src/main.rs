//! pagepack CLI - multi-page static site bundler.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use pagepack_descriptor::Mode;
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "pagepack")]
#[command(about = "Bundle a handful of HTML pages with their scripts, styles and images")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to pagepack.toml config file
    #[arg(short, long, default_value = "pagepack.toml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Scaffold a pagepack project in the current directory
    Init {
        /// Overwrite existing files
        #[arg(short, long)]
        yes: bool,
    },

    /// Serve the build from memory, with live reload in development mode
    Dev {
        /// Port to listen on (defaults to config or 4200)
        #[arg(short, long)]
        port: Option<u16>,

        /// Open a browser once the server is up
        #[arg(long)]
        open: bool,
    },

    /// Build the site into the output directory
    Build {
        /// Output directory (defaults to config or "docs")
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Build mode; overrides NODE_ENV
        #[arg(short, long)]
        mode: Option<Mode>,
    },

    /// Preview a built output directory
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "4000")]
        port: u16,

        /// Directory to serve (defaults to the configured output directory)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt().with_env_filter(filter).with_target(false).init();

    match cli.command {
        Commands::Init { yes } => {
            commands::init::run(yes).await?;
        }
        Commands::Dev { port, open } => {
            commands::dev::run(&cli.config, port, open).await?;
        }
        Commands::Build { output, mode } => {
            commands::build::run(&cli.config, output, mode).await?;
        }
        Commands::Serve { port, dir } => {
            commands::serve::run(&cli.config, port, dir).await?;
        }
    }

    Ok(())
}
