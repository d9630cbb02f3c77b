//! Daemon configuration
//!
//! Defaults, overridden by `CADENCE_*` environment variables
//! (e.g. `CADENCE_RPC_PORT=9600`).

use anyhow::{bail, Context, Result};
use config::{Config, Environment};
use serde::Deserialize;
use std::time::Duration;

const ENV_PREFIX: &str = "CADENCE";

const DEFAULT_DB_PATH: &str = "~/.cadence/schedules.db";
const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: i64 = 9537;
const DEFAULT_SWEEP_INTERVAL_SECS: i64 = 60;
const DEFAULT_LOOKAHEAD_SECS: i64 = 55;
const DEFAULT_MAX_CONCURRENT_NOTIFICATIONS: i64 = 16;
const DEFAULT_NOTIFY_TIMEOUT_SECS: i64 = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    pub db_path: String,
    pub rpc_host: String,
    pub rpc_port: u16,
    pub sweep_interval_secs: u64,
    pub lookahead_secs: u64,
    pub max_concurrent_notifications: usize,
    pub notify_timeout_secs: u64,
}

impl DaemonConfig {
    /// Load from the process environment
    pub fn load() -> Result<Self> {
        Self::load_from(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
    }

    fn load_from(env: Environment) -> Result<Self> {
        let raw = Config::builder()
            .set_default("db_path", DEFAULT_DB_PATH)?
            .set_default("rpc_host", DEFAULT_RPC_HOST)?
            .set_default("rpc_port", DEFAULT_RPC_PORT)?
            .set_default("sweep_interval_secs", DEFAULT_SWEEP_INTERVAL_SECS)?
            .set_default("lookahead_secs", DEFAULT_LOOKAHEAD_SECS)?
            .set_default(
                "max_concurrent_notifications",
                DEFAULT_MAX_CONCURRENT_NOTIFICATIONS,
            )?
            .set_default("notify_timeout_secs", DEFAULT_NOTIFY_TIMEOUT_SECS)?
            .add_source(env)
            .build()
            .context("Failed to read configuration")?;

        let mut config: DaemonConfig = raw
            .try_deserialize()
            .context("Invalid configuration value")?;
        config.db_path = shellexpand::tilde(&config.db_path).into_owned();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.sweep_interval_secs == 0 {
            bail!("CADENCE_SWEEP_INTERVAL_SECS must be greater than 0");
        }
        if self.max_concurrent_notifications == 0 {
            bail!("CADENCE_MAX_CONCURRENT_NOTIFICATIONS must be greater than 0");
        }
        if self.notify_timeout_secs == 0 {
            bail!("CADENCE_NOTIFY_TIMEOUT_SECS must be greater than 0");
        }
        if self.db_path.trim().is_empty() {
            bail!("CADENCE_DB_PATH cannot be empty");
        }
        Ok(())
    }

    /// sqlx connection URL for `db_path`
    pub fn database_url(&self) -> String {
        if self.db_path.starts_with("sqlite:") {
            self.db_path.clone()
        } else {
            format!("sqlite://{}", self.db_path)
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn lookahead(&self) -> Duration {
        Duration::from_secs(self.lookahead_secs)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs)
    }
}
