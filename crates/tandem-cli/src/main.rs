//! # tandem
//!
//! Command-line front end for the tandem RPC protocol.
//!
//! - `tandem serve`: host the echo interface over WebSocket
//! - `tandem call`: connect to a host, send one call, print the callbacks

#![deny(unsafe_code)]

mod call;
mod echo;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tandem_server::{ServerConfig, TandemServer};
use tandem_settings::{TandemSettings, load_settings, load_settings_from_path};
use tracing::{info, warn};

/// tandem bidirectional RPC over WebSocket.
#[derive(Parser, Debug)]
#[command(name = "tandem", version, about = "tandem bidirectional RPC over WebSocket")]
struct Cli {
    /// Settings file (default `~/.tandem/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log filter, overriding the settings file (`debug`, `tandem_endpoint=trace`, ...).
    #[arg(long, global = true)]
    log: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Host the echo interface.
    Serve {
        /// Host to bind.
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (0 for auto-assign).
        #[arg(long)]
        port: Option<u16>,
        /// WebSocket upgrade path.
        #[arg(long)]
        path: Option<String>,
        /// Maximum concurrent connections.
        #[arg(long)]
        max_connections: Option<usize>,
    },
    /// Send one call and print inbound calls until the wait elapses.
    Call {
        /// Endpoint URL (default: resolved from settings).
        #[arg(long)]
        url: Option<String>,
        /// How long to wait for callbacks, in milliseconds.
        #[arg(long, default_value_t = 1000)]
        wait_ms: u64,
        /// Method to call.
        method: String,
        /// Arguments, each parsed as JSON (bare words become strings).
        args: Vec<String>,
    },
}

fn load(path: Option<&PathBuf>) -> Result<TandemSettings> {
    match path {
        Some(path) => load_settings_from_path(path)
            .with_context(|| format!("failed to load settings from {}", path.display())),
        None => load_settings().context("failed to load settings"),
    }
}

/// Publish `settings` as the process-wide settings and return them.
fn install(settings: TandemSettings) -> &'static TandemSettings {
    if tandem_settings::init_settings(settings).is_err() {
        warn!("settings already initialized, keeping the first value");
    }
    tandem_settings::get_settings()
}

fn init_logging(settings: &TandemSettings, override_level: Option<&str>) {
    let level = override_level.unwrap_or(&settings.logging.level);
    if settings.logging.json {
        tandem_logging::init_json_subscriber(level);
    } else {
        tandem_logging::init_subscriber(level);
    }
}

/// Settings-derived server config with command-line overrides applied.
fn server_config(
    settings: &TandemSettings,
    host: Option<String>,
    port: Option<u16>,
    path: Option<String>,
    max_connections: Option<usize>,
) -> ServerConfig {
    let mut config = ServerConfig::from_settings(settings);
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(path) = path {
        config.path = if path.starts_with('/') { path } else { format!("/{path}") };
    }
    if let Some(max) = max_connections {
        config.max_connections = max;
    }
    config
}

async fn serve(config: ServerConfig) -> Result<()> {
    let table = Arc::new(echo::echo_table()?);
    let path = config.path.clone();
    let server = TandemServer::new(config, table, echo::Echo::new);

    let (addr, handle) = server.listen().await.context("failed to bind server")?;
    info!("tandem echo host listening on ws://{addr}{path}");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    info!("shutting down");
    server.shutdown().graceful_shutdown(vec![handle], None).await;
    info!("shutdown complete");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = install(load(cli.settings.as_ref())?);
    init_logging(settings, cli.log.as_deref());

    match cli.command {
        Command::Serve {
            host,
            port,
            path,
            max_connections,
        } => serve(server_config(settings, host, port, path, max_connections)).await,
        Command::Call {
            url,
            wait_ms,
            method,
            args,
        } => {
            let args = call::parse_args(&args);
            call::run(settings, url, &method, args, Duration::from_millis(wait_ms)).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn serve_defaults() {
        let cli = Cli::parse_from(["tandem", "serve"]);
        assert!(matches!(
            cli.command,
            Command::Serve {
                host: None,
                port: None,
                path: None,
                max_connections: None
            }
        ));
    }

    #[test]
    fn call_parses_method_and_args() {
        let cli = Cli::parse_from([
            "tandem", "call", "--url", "ws://x/tandem", "--wait-ms", "50", "echo", "hi", "2",
        ]);
        let Command::Call {
            url,
            wait_ms,
            method,
            args,
        } = cli.command
        else {
            panic!("expected call");
        };
        assert_eq!(url.as_deref(), Some("ws://x/tandem"));
        assert_eq!(wait_ms, 50);
        assert_eq!(method, "echo");
        assert_eq!(args, vec!["hi", "2"]);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["tandem", "serve", "--log", "debug", "--settings", "/tmp/s.json"]);
        assert_eq!(cli.log.as_deref(), Some("debug"));
        assert_eq!(cli.settings, Some(PathBuf::from("/tmp/s.json")));
    }

    #[test]
    fn call_requires_method() {
        assert!(Cli::try_parse_from(["tandem", "call"]).is_err());
    }

    #[test]
    fn server_config_uses_settings_then_flags() {
        let settings = TandemSettings::default();
        let config = server_config(&settings, None, None, None, None);
        assert_eq!(config.port, 9797);
        assert_eq!(config.path, "/tandem");

        let config = server_config(
            &settings,
            Some("0.0.0.0".into()),
            Some(0),
            Some("rpc".into()),
            Some(4),
        );
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 0);
        assert_eq!(config.path, "/rpc");
        assert_eq!(config.max_connections, 4);
    }

    #[test]
    fn install_publishes_the_first_settings() {
        let mut first = TandemSettings::default();
        first.server.port = 7100;
        let installed = install(first);
        assert_eq!(installed.server.port, 7100);

        let mut second = TandemSettings::default();
        second.server.port = 7200;
        assert_eq!(install(second).server.port, 7100);
        assert!(std::ptr::eq(installed, tandem_settings::get_settings()));
    }

    #[test]
    fn load_reads_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"server": {{"port": 7001}}}}"#).unwrap();
        let settings = load(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(settings.server.port, 7001);
    }
}
