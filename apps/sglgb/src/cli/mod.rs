//! # Portal CLI Module
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `init` - Create the database and seed the governance areas
//! - `status` - Show record counts
//! - `import` - Publish an indicator tree from a JSON outline, or load a bundle
//! - `export` - Write every area and indicator to a bundle file
//! - `validate-schema` - Lint a form schema (and optionally a calculation schema)
//! - `evaluate` - Dry-run a calculation schema against sample values

mod commands;

use crate::config::PortalConfig;
use clap::{Parser, Subcommand};
use sglgb_core::PortalError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// SGLGB assessment portal
///
/// Indicator authoring, BLGU submissions, review and validation.
#[derive(Parser, Debug)]
#[command(name = "sglgb")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file (default: sglgb.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the redb database, overriding the configuration
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show record counts
    Status,

    /// Create the database and seed the six governance areas
    Init {
        /// Delete an existing database first
        #[arg(short, long)]
        force: bool,
    },

    /// Publish an indicator tree from a JSON outline
    Import {
        /// Outline file, or a bundle with --bundle
        input: PathBuf,

        /// Governance area receiving the tree
        #[arg(short, long, required_unless_present = "bundle")]
        area: Option<u64>,

        /// Treat the input as an exported bundle
        #[arg(long)]
        bundle: bool,
    },

    /// Export every area and indicator as a bundle
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Lint a form schema file
    ValidateSchema {
        /// Form schema JSON
        file: PathBuf,

        /// Calculation schema JSON checked against the form
        #[arg(long)]
        calculation: Option<PathBuf>,
    },

    /// Evaluate a calculation schema against sample values
    Evaluate {
        /// Calculation schema JSON
        #[arg(short, long)]
        schema: PathBuf,

        /// Form schema JSON; rules are linted against it first
        #[arg(short, long)]
        form: Option<PathBuf>,

        /// Response values JSON object
        #[arg(long)]
        values: PathBuf,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Resolve the configuration: file, then environment, then CLI flags.
pub fn resolve_config(cli: &Cli) -> Result<PortalConfig, PortalError> {
    let mut config = PortalConfig::load(cli.config.as_deref())?.with_env();
    if let Some(db) = &cli.database {
        config.database = db.clone();
    }
    config.validate()?;
    Ok(config)
}

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), PortalError> {
    let mut config = resolve_config(&cli)?;
    let json_mode = cli.json_mode;
    if cli.verbose {
        tracing::debug!(?config, "Resolved configuration");
    }

    match cli.command {
        Some(Commands::Server { host, port }) => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            cmd_server(config).await
        }
        Some(Commands::Status) => cmd_status(&config, json_mode),
        Some(Commands::Init { force }) => cmd_init(&config, force),
        Some(Commands::Import {
            input,
            area,
            bundle,
        }) => cmd_import(&config, &input, area, bundle, json_mode),
        Some(Commands::Export { output }) => cmd_export(&config, &output),
        Some(Commands::ValidateSchema { file, calculation }) => {
            cmd_validate_schema(&file, calculation.as_deref(), json_mode)
        }
        Some(Commands::Evaluate {
            schema,
            form,
            values,
        }) => cmd_evaluate(&schema, form.as_deref(), &values, json_mode),
        None => cmd_status(&config, json_mode),
    }
}
