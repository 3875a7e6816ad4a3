//! Server configuration from environment variables

use anyhow::Context;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for the API server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directory holding `rules.json`
    pub data_dir: PathBuf,
    /// How often the schedule ticker fires
    pub tick_interval: Duration,
    pub bind_addr: SocketAddr,
    /// Install the default rule set when the registry is empty
    pub default_rules: bool,
}

impl ServerConfig {
    /// Read `AUTOMATION_*` variables from the process environment
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let data_dir = lookup("AUTOMATION_DATA_DIR").unwrap_or_else(|| "data".to_string());

        let tick_secs = match lookup("AUTOMATION_TICK_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("AUTOMATION_TICK_SECS is not a number: {raw}"))?,
            None => 60,
        };

        let bind_addr = lookup("AUTOMATION_BIND")
            .unwrap_or_else(|| "0.0.0.0:3000".to_string())
            .parse::<SocketAddr>()
            .context("AUTOMATION_BIND is not a socket address")?;

        let default_rules = match lookup("AUTOMATION_DEFAULT_RULES").as_deref() {
            None => true,
            Some("1" | "true" | "yes") => true,
            Some("0" | "false" | "no") => false,
            Some(other) => anyhow::bail!("AUTOMATION_DEFAULT_RULES must be a boolean, got {other}"),
        };

        Ok(Self {
            data_dir: PathBuf::from(data_dir),
            tick_interval: Duration::from_secs(tick_secs.max(1)),
            bind_addr,
            default_rules,
        })
    }
}
