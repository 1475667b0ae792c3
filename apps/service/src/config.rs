use std::time::Duration;
use std::{env, fmt, fs, io, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    ReadFailed { path: path::PathBuf, source: io::Error },
    #[error("failed to write {path}: {source}")]
    WriteFailed { path: path::PathBuf, source: io::Error },
    #[error("failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("no config directory: neither XDG_CONFIG_HOME nor HOME is set")]
    ConfigPathUnavailable,
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
    #[error("no check interval configured (set checks.interval_seconds or CHECK_INTERVAL)")]
    MissingInterval,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub checks: ChecksConfig,
    pub alerts: AlertsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: path::PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChecksConfig {
    /// Seconds slept between the end of one cycle and the start of the next
    pub interval_seconds: Option<u64>,
    /// Per-probe execution timeout
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub webhook_url: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "pochta.db".into() }
    }
}

impl Default for ChecksConfig {
    fn default() -> Self {
        Self { interval_seconds: None, timeout_seconds: 30 }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            checks: ChecksConfig::default(),
            alerts: AlertsConfig::default(),
        }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/pochta/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("pochta/config.toml"))
}

fn parse_seconds(key: &'static str, raw: &str) -> Result<u64, Error> {
    let seconds: u64 = raw
        .trim()
        .parse()
        .map_err(|e| Error::InvalidValue { key, reason: format!("{raw:?}: {e}") })?;
    if seconds == 0 {
        return Err(Error::InvalidValue { key, reason: "must be greater than zero".into() });
    }
    Ok(seconds)
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        let interval = match self.checks.interval_seconds {
            Some(seconds) => format!("{seconds}s"),
            None => "(not set)".into(),
        };

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path.display())?;
        write_title_1(f, "Checks")?;
        write_1(f, "Interval", &interval)?;
        write_1(f, "Timeout", &format!("{}s", self.checks.timeout_seconds))?;
        write_title_1(f, "Alerts")?;
        write_1(f, "Webhook URL", &self.alerts.webhook_url.as_deref().unwrap_or("(none, log only)"))?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/pochta/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```rust,ignore
    /// let cfg = config::Config::from_config(None::<&path::Path>)?;
    /// println!("{}", cfg);
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| Error::ReadFailed { path: config_path.clone(), source })?;
            Ok(toml::from_str(raw_string.as_str())?)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Load the file, then apply process environment overrides and validate
    pub fn load(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let mut config = Self::from_config(optional_path)?;
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override file values from `DATABASE_PATH`, `CHECK_INTERVAL`,
    /// `CHECK_TIMEOUT` and `WEBHOOK_URL`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), Error> {
        if let Some(path) = lookup("DATABASE_PATH") {
            self.database.path = path.into();
        }
        if let Some(raw) = lookup("CHECK_INTERVAL") {
            self.checks.interval_seconds = Some(parse_seconds("CHECK_INTERVAL", &raw)?);
        }
        if let Some(raw) = lookup("CHECK_TIMEOUT") {
            self.checks.timeout_seconds = parse_seconds("CHECK_TIMEOUT", &raw)?;
        }
        if let Some(url) = lookup("WEBHOOK_URL") {
            self.alerts.webhook_url = Some(url).filter(|url| !url.trim().is_empty());
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.checks.interval_seconds == Some(0) {
            return Err(Error::InvalidValue {
                key: "checks.interval_seconds",
                reason: "must be greater than zero".into(),
            });
        }
        if self.checks.timeout_seconds == 0 {
            return Err(Error::InvalidValue {
                key: "checks.timeout_seconds",
                reason: "must be greater than zero".into(),
            });
        }
        if let Some(webhook) = &self.alerts.webhook_url {
            let url = url::Url::parse(webhook)
                .map_err(|e| Error::InvalidValue { key: "alerts.webhook_url", reason: e.to_string() })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(Error::InvalidValue {
                    key: "alerts.webhook_url",
                    reason: format!("unsupported scheme {:?}", url.scheme()),
                });
            }
        }
        Ok(())
    }

    /// Interval between cycles; required to run the scheduler
    pub fn check_interval(&self) -> Result<Duration, Error> {
        self.checks.interval_seconds.map(Duration::from_secs).ok_or(Error::MissingInterval)
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.checks.timeout_seconds)
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &std::path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| Error::WriteFailed { path: parent.to_path_buf(), source })?;
        }

        fs::write(path, config_str).map_err(|source| Error::WriteFailed { path: path.to_path_buf(), source })
    }
}
