use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

use crate::error::ConfigError;

/// Layered proxy configuration: defaults, overridden by a TOML file,
/// overridden by `RELAY_*` environment variables, overridden by CLI flags.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    pub store_root: PathBuf,
    pub upstreams: Vec<String>,
    pub failed_path_cache_minutes: u64,
    pub port: u16,
    pub bind_host: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            store_root: PathBuf::from("./store"),
            upstreams: Vec::new(),
            failed_path_cache_minutes: 5,
            port: 8080,
            bind_host: "0.0.0.0".to_string(),
        }
    }
}

impl RelayConfig {
    pub fn failed_path_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.failed_path_cache_minutes * 60)
    }

    pub fn bind_address(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_host, self.port)
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress {
                host: self.bind_host.clone(),
                port: self.port,
            })
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "relaycache",
    about = "Caching forward proxy for Maven-style artifact repositories"
)]
pub struct Cli {
    /// Path to a TOML configuration file. Missing is fine; defaults and env
    /// vars still apply.
    #[arg(long, default_value = "relaycache.toml")]
    pub config: PathBuf,

    /// Override the configured store root.
    #[arg(long)]
    pub store_root: Option<PathBuf>,

    /// Override the configured listen port.
    #[arg(long)]
    pub port: Option<u16>,
}

/// Loads configuration from defaults, `cli.config`, `RELAY_*` environment
/// variables (in that order of increasing precedence), then applies any CLI
/// overrides on top.
pub fn load(cli: &Cli) -> Result<RelayConfig, ConfigError> {
    let builder = config::Config::builder()
        .set_default("store_root", "./store")?
        .set_default("upstreams", Vec::<String>::new())?
        .set_default("failed_path_cache_minutes", 5_i64)?
        .set_default("port", 8080_i64)?
        .set_default("bind_host", "0.0.0.0")?
        .add_source(config::File::from(cli.config.clone()).required(false))
        .add_source(config::Environment::with_prefix("RELAY").separator("_"));

    let mut cfg: RelayConfig = builder.build()?.try_deserialize()?;

    if let Some(store_root) = &cli.store_root {
        cfg.store_root = store_root.clone();
    }
    if let Some(port) = cli.port {
        cfg.port = port;
    }

    if cfg.upstreams.is_empty() {
        return Err(ConfigError::NoUpstreams);
    }

    Ok(cfg)
}
