//! # squares-app
//!
//! Squares realtime server binary: loads settings, wires the bus, token
//! verifier and contest gate into the server, and serves until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use squares_bus::{Bus, LocalBus, RedisBus};
use squares_core::logging::{LogFormat, init_subscriber};
use squares_server::config::ServerConfig;
use squares_server::{JwtVerifier, OpenGate, SquaresServer};
use squares_settings::SquaresSettings;

/// Squares realtime update server.
#[derive(Parser, Debug)]
#[command(name = "squares-server", about = "Squares realtime update server")]
struct Cli {
    /// Settings file (defaults to `~/.squares/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Redis URL of the shared bus (overrides settings).
    #[arg(long)]
    bus_url: Option<String>,

    /// Maximum concurrent sessions (overrides settings).
    #[arg(long)]
    max_connections: Option<usize>,

    /// Log filter directive, e.g. `debug` or `squares_server=trace`.
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    /// Load settings from `--config` or the default path, then apply flags.
    fn load_settings(&self) -> Result<SquaresSettings> {
        let path = self
            .config
            .clone()
            .unwrap_or_else(squares_settings::settings_path);
        let mut settings = squares_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        self.apply(&mut settings);
        settings.validate().context("Invalid command-line override")?;
        Ok(settings)
    }

    fn apply(&self, settings: &mut SquaresSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(url) = &self.bus_url {
            settings.realtime.bus_url = Some(url.clone());
        }
        if let Some(max) = self.max_connections {
            settings.server.max_connections = max;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.log_json {
            settings.logging.json = true;
        }
    }
}

/// Redis when a bus URL is configured, otherwise the in-process bus.
async fn build_bus(settings: &SquaresSettings) -> Result<Arc<dyn Bus>> {
    match &settings.realtime.bus_url {
        Some(url) => {
            let bus = RedisBus::connect(url)
                .await
                .context("Failed to connect to the Redis bus")?;
            Ok(Arc::new(bus))
        }
        None => {
            tracing::warn!("no bus URL configured, updates only reach viewers of this process");
            Ok(Arc::new(LocalBus::new(settings.realtime.bus_capacity)))
        }
    }
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

    let metrics = squares_server::metrics::install_recorder()
        .context("Failed to install Prometheus recorder")?;

    let verifier = JwtVerifier::from_settings(&settings.auth)
        .context("No JWT secret configured (set auth.jwtSecret or SQUARES_JWT_SECRET)")?;
    let bus = build_bus(&settings).await?;

    let server = SquaresServer::new(
        ServerConfig::from(&settings),
        Arc::clone(&bus),
        Arc::new(verifier),
        Arc::new(OpenGate),
        metrics,
    );

    let (addr, handle) = server
        .listen()
        .await
        .context("Failed to bind server")?;
    tracing::info!("squares realtime listening on ws://{addr}/ws/contests/{{contestId}}");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let clean = server
        .shutdown()
        .graceful_shutdown(server.registry(), vec![handle], None)
        .await;
    bus.close();
    if !clean {
        tracing::warn!("sessions still open at exit");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_leave_settings_alone() {
        let cli = Cli::parse_from(["squares-server"]);
        assert!(cli.config.is_none());
        assert!(cli.port.is_none());
        assert!(!cli.log_json);

        let mut settings = SquaresSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn cli_flags_override_settings() {
        let cli = Cli::parse_from([
            "squares-server",
            "--host",
            "127.0.0.1",
            "--port",
            "9000",
            "--max-connections",
            "5",
            "--bus-url",
            "redis://bus:6379/",
            "--log-level",
            "debug",
            "--log-json",
        ]);
        let mut settings = SquaresSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.max_connections, 5);
        assert_eq!(settings.realtime.bus_url.as_deref(), Some("redis://bus:6379/"));
        assert_eq!(settings.logging.level, "debug");
        assert!(settings.logging.json);
    }

    #[test]
    fn cli_config_path() {
        let cli = Cli::parse_from(["squares-server", "--config", "/tmp/squares.json"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/squares.json")));
    }

    #[test]
    fn config_file_is_loaded_then_overridden() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 7000, "maxConnections": 50}, "auth": {"jwtSecret": "s"}}"#,
        )
        .unwrap();

        let path_arg = path.to_string_lossy().into_owned();
        let cli = Cli::parse_from(["squares-server", "--config", &path_arg, "--port", "7001"]);
        let settings = cli.load_settings().unwrap();
        assert_eq!(settings.server.port, 7001);
        assert_eq!(settings.server.max_connections, 50);
        assert_eq!(settings.auth.jwt_secret.as_deref(), Some("s"));
    }

    #[test]
    fn zero_max_connections_flag_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path_arg = dir.path().join("missing.json").to_string_lossy().into_owned();
        let cli = Cli::parse_from([
            "squares-server",
            "--config",
            &path_arg,
            "--max-connections",
            "0",
        ]);
        assert!(cli.load_settings().is_err());
    }

    #[tokio::test]
    async fn no_bus_url_runs_in_process() {
        let settings = SquaresSettings::default();
        assert!(build_bus(&settings).await.is_ok());
    }

    #[tokio::test]
    async fn unreachable_bus_url_fails_startup() {
        let mut settings = SquaresSettings::default();
        settings.realtime.bus_url = Some("redis://127.0.0.1:1/".into());
        let err = build_bus(&settings).await.err().unwrap();
        assert!(err.to_string().contains("Redis bus"));
    }
}
