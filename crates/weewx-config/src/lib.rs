use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use weex_aggregate::{DegreeDayConfig, ResolverConfig};
use weex_core::{CoreError, DayClock, ObsSchema, UnitSystem};
use weex_daysum::{StoreConfig, DEFAULT_TRANS_DAYS};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StationConfig {
    /// IANA zone whose midnights bound the archive days (default UTC)
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub archive_table: String,
    /// `US`, `METRIC`, `METRICWX` or the numeric code; reported until the
    /// first record fixes the store's unit system
    pub unit_system: String,
    pub busy_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("weewx.sdb"),
            archive_table: "archive".to_string(),
            unit_system: "US".to_string(),
            busy_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummariesConfig {
    pub trans_days: usize,
    pub page_size: usize,
    /// Observation types kept in the archive but not summarized
    pub exclude: Vec<String>,
}

impl Default for SummariesConfig {
    fn default() -> Self {
        Self {
            trans_days: DEFAULT_TRANS_DAYS,
            page_size: 1000,
            exclude: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// `EnvFilter` directives; `RUST_LOG` still wins when set
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub station: StationConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub summaries: SummariesConfig,
    #[serde(default)]
    pub degree_days: DegreeDayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid setting: {0}")]
    Invalid(#[from] CoreError),
}

impl AppConfig {
    /// Load configuration from WEEWX_CONFIG path (TOML) if present, with reasonable defaults
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("WEEWX_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
        Self::from_path(path)
    }

    /// Parse `path`, falling back to defaults when the file does not exist
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(AppConfig::default());
        }
        let s = fs::read_to_string(path)?;
        Ok(toml::from_str::<AppConfig>(&s)?)
    }

    pub fn clock(&self) -> Result<DayClock, ConfigError> {
        match self.station.timezone.as_deref() {
            Some(name) => Ok(DayClock::from_name(name)?),
            None => Ok(DayClock::utc()),
        }
    }

    pub fn unit_system(&self) -> Result<UnitSystem, ConfigError> {
        Ok(self.database.unit_system.parse()?)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_secs(self.database.busy_timeout_secs)
    }

    /// Settings for opening the daily-summary store
    pub fn store_config(&self) -> Result<StoreConfig, ConfigError> {
        let mut schema = ObsSchema::standard();
        for name in &self.summaries.exclude {
            schema.unsummarize(name)?;
        }
        Ok(StoreConfig {
            archive_table: self.database.archive_table.clone(),
            clock: self.clock()?,
            schema,
            default_unit_system: self.unit_system()?,
            page_size: self.summaries.page_size.max(1),
        })
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            degree_days: self.degree_days.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        let cfg = AppConfig::from_path("/nonexistent/weewx.toml").unwrap();
        assert_eq!(cfg.database.path, PathBuf::from("weewx.sdb"));
        assert_eq!(cfg.summaries.trans_days, 5);
        assert_eq!(cfg.logging.format, LogFormat::Json);
        assert_eq!(cfg.degree_days.heating_base, 65.0);

        let store = cfg.store_config().unwrap();
        assert_eq!(store.archive_table, "archive");
        assert_eq!(store.default_unit_system, UnitSystem::Us);
    }

    #[test]
    fn partial_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weewx.toml");
        fs::write(
            &path,
            r#"
[station]
timezone = "Europe/Berlin"

[database]
unit_system = "METRICWX"

[summaries]
exclude = ["rxCheckPercent"]

[degree_days]
heating_base = 18.0
cooling_base = 18.0
growing_base = 10.0
unit = "degree_C"

[logging]
format = "pretty"
"#,
        )
        .unwrap();

        let cfg = AppConfig::from_path(&path).unwrap();
        assert_eq!(cfg.database.archive_table, "archive");
        assert_eq!(cfg.unit_system().unwrap(), UnitSystem::MetricWx);
        assert_eq!(cfg.logging.format, LogFormat::Pretty);
        assert_eq!(cfg.resolver_config().degree_days.unit, "degree_C");

        let store = cfg.store_config().unwrap();
        assert_eq!(store.clock.timezone().name(), "Europe/Berlin");
        let id = store.schema.id("rxCheckPercent").unwrap();
        assert!(!store.schema.def(id).is_summarized());
    }

    #[test]
    fn bad_values_are_reported() {
        let cfg: AppConfig = toml::from_str("[station]\ntimezone = \"Mars/Olympus\"").unwrap();
        assert!(matches!(cfg.store_config(), Err(ConfigError::Invalid(_))));

        let cfg: AppConfig = toml::from_str("[database]\nunit_system = \"imperial\"").unwrap();
        assert!(matches!(cfg.unit_system(), Err(ConfigError::Invalid(_))));

        assert!(matches!(
            toml::from_str::<AppConfig>("[summaries]\ntrans_days = \"many\""),
            Err(_)
        ));
    }
}
