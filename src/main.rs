//! Priority-shaping reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                     PRIORITY PROXY                   │
//!                 │                                                      │
//!   Client bytes  │  ┌──────────┐   ┌──────────────┐   ┌─────────────┐   │
//!   ──────────────┼─▶│   net    │──▶│ proxy        │──▶│ shaping     │───┼──▶ Backend
//!                 │  │ listener │   │ session      │   │ detect +    │   │
//!                 │  └──────────┘   │ (reassemble) │   │ rewrite     │   │
//!                 │                 └──────┬───────┘   └──────┬──────┘   │
//!   Replies       │                        │                  │ owner    │
//!   ◀─────────────┼────────────────────────┘ verbatim         ▼ lookup   │
//!                 │                                   ┌─────────────┐    │
//!                 │                                   │ cache       │    │
//!                 │                                   │ local/remote│    │
//!                 │                                   └─────────────┘    │
//!                 │  config · observability (tracing, metrics) · lifecycle│
//!                 └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use priority_proxy::config::loader::load_config;
use priority_proxy::lifecycle::startup;
use priority_proxy::observability::logging;

#[derive(Parser, Debug)]
#[command(name = "priority-proxy", version, about = "Priority-shaping reverse proxy")]
struct Cli {
    /// Optional TOML config file; environment variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    logging::init(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.listener.bind_address(),
        backend = %config.backend.address(),
        "priority-proxy starting"
    );

    startup::run(config).await?;
    Ok(())
}
