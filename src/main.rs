//! # jamroom
//!
//! Session signaling relay and session directory server binary.

#![deny(unsafe_code)]

mod settings;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use jamroom_server::AppContext;
use jamroom_store::SessionDirectory;
use jamroom_telemetry::LogFormat;

use crate::settings::Settings;

/// Jamroom signaling server.
#[derive(Parser, Debug)]
#[command(name = "jamroom", about = "Session signaling relay and directory")]
struct Cli {
    /// Settings file (defaults to `~/.jamroom/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the `SQLite` database. Omit everywhere for in-memory.
    #[arg(long)]
    database: Option<PathBuf>,

    /// Human-readable logs instead of JSON.
    #[arg(long)]
    pretty_logs: bool,
}

impl Cli {
    fn settings(&self) -> Result<Settings> {
        let path = match &self.config {
            Some(path) if !path.exists() => bail!("settings file not found: {}", path.display()),
            Some(path) => path.clone(),
            None => settings::settings_path(),
        };
        let mut settings = Settings::load(&path)
            .with_context(|| format!("invalid settings ({})", path.display()))?;

        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(database) = &self.database {
            settings.store.database_path = Some(database.clone());
        }
        if self.pretty_logs {
            settings.telemetry.format = LogFormat::Pretty;
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Cli::parse().settings()?;
    jamroom_telemetry::init_telemetry(&settings.telemetry)?;

    let directory = SessionDirectory::open(&settings.store).context("Failed to open session store")?;
    if settings.store.database_path.is_none() {
        tracing::warn!("no database path configured; sessions are kept in memory");
    }

    let ctx = AppContext::new(settings.server, settings.relay, directory);
    let handle = jamroom_server::start(ctx).await.context("Failed to start server")?;
    tracing::info!(port = handle.port(), "jamroom server ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;

    handle.shutdown().await.context("Failed to close session store")?;
    Ok(())
}
