//! TLS-terminating HTTP CONNECT proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────┐
//!                      │                  CONNECT PROXY                        │
//!                      │                                                       │
//!   CONNECT host:port  │  ┌─────────┐   ┌────────┐   ┌────────┐   ┌────────┐   │
//!   ───────────────────┼─▶│   tls   │──▶│validate│──▶│  dial  │──▶│ hijack │   │
//!                      │  │listener │   └────────┘   └────────┘   └───┬────┘   │
//!                      │  └─────────┘                                 │        │
//!                      │                                              ▼        │
//!   raw bytes          │                 ┌──────────────────────────────┐      │
//!   ◀──────────────────┼────────────────▶│        duplex relay          │◀─────┼───▶ Target
//!                      │                 └──────────────────────────────┘      │
//!                      │                                                       │
//!                      │  config · observability · lifecycle                   │
//!                      └──────────────────────────────────────────────────────┘
//! ```

use std::path::{Path, PathBuf};

use axum_server::Handle;
use clap::Parser;

use tls_connect_proxy::config::{read_config, validate_config, ConfigError, LogFormat, ProxyConfig};
use tls_connect_proxy::http::ProxyServer;
use tls_connect_proxy::lifecycle::{signals, Shutdown};
use tls_connect_proxy::net::tls::load_tls_config;
use tls_connect_proxy::observability::logging::init_logging;

#[derive(Parser, Debug)]
#[command(name = "tls-connect-proxy")]
#[command(version, about = "TLS-terminating HTTP CONNECT proxy", long_about = None)]
struct Cli {
    /// TOML configuration file; built-in defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides listener.bind_address)
    #[arg(long)]
    listen: Option<String>,

    /// PEM certificate chain (overrides listener.tls.cert_path)
    #[arg(long)]
    cert: Option<String>,

    /// PEM private key (overrides listener.tls.key_path)
    #[arg(long)]
    key: Option<String>,

    /// Target dial timeout in seconds (overrides timeouts.dial_secs)
    #[arg(long)]
    dial_timeout_secs: Option<u64>,

    /// Log level (overrides observability.log_level)
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn apply(&self, config: &mut ProxyConfig) {
        if let Some(listen) = &self.listen {
            config.listener.bind_address = listen.clone();
        }
        if let Some(cert) = &self.cert {
            config.listener.tls.cert_path = cert.clone();
        }
        if let Some(key) = &self.key {
            config.listener.tls.key_path = key.clone();
        }
        if let Some(secs) = self.dial_timeout_secs {
            config.timeouts.dial_secs = secs;
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
        if self.json_logs {
            config.observability.log_format = LogFormat::Json;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => ProxyConfig::default(),
    };
    cli.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    init_logging(&config.observability);

    tracing::info!("tls-connect-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        dial_timeout_secs = config.timeouts.dial_secs,
        "Configuration loaded"
    );

    let tls = load_tls_config(
        Path::new(&config.listener.tls.cert_path),
        Path::new(&config.listener.tls.key_path),
    )?;

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    let grace = config.timeouts.shutdown_grace();
    let server = ProxyServer::new(config);
    let tracker = server.tracker();

    let handle = Handle::new();
    let listening = handle.clone();
    tokio::spawn(async move {
        if let Some(addr) = listening.listening().await {
            tracing::info!(address = %addr, "HTTPS proxy listening for requests");
        }
    });

    server.run(tls, handle, shutdown.subscribe()).await?;

    if tracker.active_count() > 0 {
        tracing::info!(
            active_tunnels = tracker.active_count(),
            grace_secs = grace.as_secs(),
            "Waiting for open tunnels to close"
        );
        if tokio::time::timeout(grace, tracker.wait_for_drain()).await.is_err() {
            tracing::warn!(
                active_tunnels = tracker.active_count(),
                "Tunnels still open after grace period, exiting anyway"
            );
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
