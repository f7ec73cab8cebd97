//! Daemon configuration from the config file and environment variables

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use weewx_config::AppConfig;

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// SQLite database file; `DATABASE_PATH` overrides `[database] path`
    pub database_path: PathBuf,

    /// Seconds between catch-up passes over the archive (default: 60)
    pub poll_interval: u64,

    pub app: AppConfig,
}

impl DaemonConfig {
    /// Load the config file named by WEEWX_CONFIG, then apply environment overrides
    pub fn from_env() -> Result<Self> {
        let app = AppConfig::load().context("Failed to load configuration")?;
        Self::with_app(app)
    }

    fn with_app(app: AppConfig) -> Result<Self> {
        let database_path = env::var("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| app.database.path.clone());

        let poll_interval = env::var("POLL_INTERVAL")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .context("Invalid POLL_INTERVAL")?;

        Ok(Self {
            database_path,
            poll_interval,
            app,
        })
    }

    pub fn poll(&self) -> Duration {
        Duration::from_secs(self.poll_interval.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_and_overrides() {
        env::remove_var("DATABASE_PATH");
        env::remove_var("POLL_INTERVAL");
        let config = DaemonConfig::with_app(AppConfig::default()).unwrap();
        assert_eq!(config.database_path, PathBuf::from("weewx.sdb"));
        assert_eq!(config.poll(), Duration::from_secs(60));

        env::set_var("DATABASE_PATH", "/var/lib/weewx/weewx.sdb");
        env::set_var("POLL_INTERVAL", "15");
        let config = DaemonConfig::with_app(AppConfig::default()).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/var/lib/weewx/weewx.sdb"));
        assert_eq!(config.poll_interval, 15);

        env::set_var("POLL_INTERVAL", "soon");
        assert!(DaemonConfig::with_app(AppConfig::default()).is_err());

        env::remove_var("DATABASE_PATH");
        env::remove_var("POLL_INTERVAL");
    }
}
