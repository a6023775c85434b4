//! CLI argument definitions for the Murmur backend.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

/// Murmur - real-time backend for a live sales-call copilot.
#[derive(Parser, Debug)]
#[command(name = "murmur", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Server port.
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > MURMUR_CONFIG env var > ./murmur.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref path) = self.config {
            return path.clone();
        }
        if let Ok(path) = std::env::var("MURMUR_CONFIG") {
            return PathBuf::from(path);
        }
        PathBuf::from("murmur.toml")
    }

    /// Resolve the server port.
    ///
    /// Priority: --port flag > MURMUR_PORT env var > config file value.
    pub fn resolve_port(&self, config_port: u16) -> u16 {
        if let Some(port) = self.port {
            return port;
        }
        if let Ok(value) = std::env::var("MURMUR_PORT") {
            if let Ok(port) = value.parse::<u16>() {
                return port;
            }
        }
        config_port
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }
}
