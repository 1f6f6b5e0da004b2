// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
use anyhow::Context;
use clap::Parser;
use convd_daemon::config::{self, ConverterConfig, DaemonConfig};
use convd_daemon::{AppState, build_app};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Exit code for runtime errors.
const EXIT_RUNTIME_ERROR: i32 = 1;

#[derive(Parser, Debug)]
#[command(name = "convertd", version, about = "Document conversion service")]
struct Cli {
    /// Path to a TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address (overrides the config file).
    #[arg(long)]
    bind: Option<String>,

    /// Cache directory (overrides the config file).
    #[arg(long = "cachedir")]
    cachedir: Option<PathBuf>,

    /// Use the deterministic mock converter instead of the office engine.
    #[arg(long)]
    mock: bool,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("convd_cache=debug,convd_convert=debug,convd_daemon=debug,convertd=debug")
    } else {
        EnvFilter::new("convd_cache=info,convd_convert=info,convd_daemon=info,convertd=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(cli).await {
        eprintln!("error: {e:#}");
        std::process::exit(EXIT_RUNTIME_ERROR);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut cfg = match cli.config {
        Some(ref path) => config::load_config(path)?,
        None => DaemonConfig::default(),
    };
    if let Some(bind) = cli.bind {
        cfg.bind = bind;
    }
    if let Some(cachedir) = cli.cachedir {
        cfg.cache_dir = Some(cachedir);
    }
    if cli.mock {
        cfg.converter = ConverterConfig::Mock;
    }
    if let Err(errors) = config::validate_config(&cfg) {
        for e in &errors {
            warn!("config: {e}");
        }
        anyhow::bail!("invalid configuration");
    }

    let state = Arc::new(AppState::new(cfg.converter.build(), cfg.cache_dir.clone()));
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(&cfg.bind)
        .await
        .with_context(|| format!("bind {}", cfg.bind))?;
    info!(
        bind = %cfg.bind,
        cache = ?cfg.cache_dir,
        "convertd listening"
    );
    axum::serve(listener, app).await.context("serve")?;
    Ok(())
}
