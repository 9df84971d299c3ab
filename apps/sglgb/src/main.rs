//! # SGLGB Portal Server
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                 apps/sglgb (THE BINARY)               │
//! │                                                       │
//! │   ┌─────────────┐   ┌─────────────┐   ┌───────────┐   │
//! │   │    CLI      │   │  HTTP API   │   │  Config   │   │
//! │   │   (clap)    │   │   (axum)    │   │  (toml)   │   │
//! │   └──────┬──────┘   └──────┬──────┘   └─────┬─────┘   │
//! │          └─────────────────┼────────────────┘         │
//! │                            ▼                          │
//! │                    ┌───────────────┐                  │
//! │                    │  sglgb-core   │                  │
//! │                    └───────────────┘                  │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! sglgb init
//! sglgb import fas.json --area 1
//! sglgb server --host 0.0.0.0 --port 8080
//! ```

use clap::Parser;
use sglgb::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // SGLGB_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("SGLGB_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "sglgb=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

fn print_banner() {
    println!(
        r#"
  ███████╗ ██████╗ ██╗      ██████╗ ██████╗
  ██╔════╝██╔════╝ ██║     ██╔════╝ ██╔══██╗
  ███████╗██║  ███╗██║     ██║  ███╗██████╔╝
  ╚════██║██║   ██║██║     ██║   ██║██╔══██╗
  ███████║╚██████╔╝███████╗╚██████╔╝██████╔╝
  ╚══════╝ ╚═════╝ ╚══════╝ ╚═════╝ ╚═════╝

  Assessment Portal v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
