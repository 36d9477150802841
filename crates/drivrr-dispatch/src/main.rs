//! # drivrr-dispatch
//!
//! Dispatch server binary. Loads settings, applies CLI overrides, starts the
//! HTTP/WebSocket server, and drains sessions on Ctrl-C or SIGTERM.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use drivrr_core::logging::{LogFormat, init_subscriber};
use drivrr_server::config::ServerConfig;
use drivrr_server::server::DispatchServer;
use drivrr_settings::DispatchSettings;

/// Real-time ride dispatch server.
#[derive(Parser, Debug)]
#[command(name = "drivrr-dispatch", version = drivrr_core::constants::VERSION, about = "Ride dispatch server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Path to a settings file (default `~/.drivrr/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log filter when `RUST_LOG` is unset (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn load_settings(&self) -> Result<DispatchSettings> {
        let mut settings = match &self.settings {
            Some(path) => drivrr_settings::load_settings_from_path(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => drivrr_settings::load_settings().context("Failed to load settings")?,
        };
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.log_json {
            settings.logging.json = true;
        }
        Ok(settings)
    }
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.context("Failed to listen for ctrl-c")?,
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = args.load_settings()?;

    let format = if settings.logging.json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    init_subscriber(&settings.logging.level, format);

    let mut server = DispatchServer::new(ServerConfig::from_settings(&settings));
    match drivrr_server::metrics::install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(error) => tracing::warn!(%error, "metrics recorder unavailable, /metrics disabled"),
    }

    let (addr, handle) = server
        .listen()
        .await
        .context("Failed to bind server")?;
    tracing::info!(
        version = drivrr_core::constants::VERSION,
        max_connections = server.config().max_connections,
        "drivrr dispatch listening on http://{addr}"
    );

    shutdown_signal().await?;

    tracing::info!("Shutting down...");
    server
        .shutdown()
        .graceful_shutdown(vec![handle], None)
        .await;
    tracing::info!("Shutdown complete");
    Ok(())
}
