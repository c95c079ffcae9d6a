use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::fetcher::FetchSettings;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_TRAINING_PATH: &str = "/api/ai/training-data";
const STATE_FILE: &str = "model.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {key}: {value}")]
    Invalid { key: &'static str, value: String },
    #[error("invalid WKI_BIND: {0}")]
    InvalidBind(String),
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Optional TOML overlay; every key mirrors a `WKI_*` variable.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    backend_url: Option<String>,
    bind: Option<String>,
    port: Option<u16>,
    training_interval_minutes: Option<u64>,
    training_limit: Option<i64>,
    training_lookback_days: Option<u32>,
    training_max_retries: Option<u32>,
    backoff_initial_secs: Option<u64>,
    backoff_max_secs: Option<u64>,
    backend_timeout_secs: Option<u64>,
    training_path: Option<String>,
    discovery_enabled: Option<bool>,
    backend_discovery_enabled: Option<bool>,
    state_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub backend_url: Option<String>,
    pub addr: SocketAddr,
    pub training_interval: Duration,
    pub training_limit: i64,
    pub lookback_days: u32,
    pub max_retries: u32,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    pub backend_timeout: Duration,
    pub training_path: String,
    pub discovery_enabled: bool,
    pub backend_discovery_enabled: bool,
    pub state_dir: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            backend_url: None,
            addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            training_interval: Duration::from_secs(1440 * 60),
            training_limit: 0,
            lookback_days: 14,
            max_retries: 5,
            backoff_initial: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
            backend_timeout: Duration::from_secs(5),
            training_path: DEFAULT_TRAINING_PATH.to_string(),
            discovery_enabled: true,
            backend_discovery_enabled: true,
            state_dir: PathBuf::from("data"),
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults, then the file named by `WKI_CONFIG`, then `WKI_*` variables.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let file = match lookup("WKI_CONFIG") {
            Some(path) => read_file(Path::new(path.trim()))?,
            None => FileConfig::default(),
        };

        let defaults = Self::default();
        let backend_url = lookup("WKI_BACKEND_URL")
            .or(file.backend_url)
            .filter(|url| !url.trim().is_empty());

        let bind = lookup("WKI_BIND")
            .or(file.bind)
            .unwrap_or_else(|| defaults.addr.ip().to_string());
        let ip: IpAddr = bind
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidBind(bind.clone()))?;
        let port = parse_or(&lookup, "WKI_PORT", file.port, defaults.addr.port())?;

        let interval_minutes = parse_or(
            &lookup,
            "WKI_TRAINING_INTERVAL_MINUTES",
            file.training_interval_minutes,
            1440,
        )?
        .max(1);
        let backoff_initial = parse_or(
            &lookup,
            "WKI_TRAINING_BACKOFF_INITIAL_SECS",
            file.backoff_initial_secs,
            5,
        )?;
        let backoff_max = parse_or(
            &lookup,
            "WKI_TRAINING_BACKOFF_MAX_SECS",
            file.backoff_max_secs,
            300,
        )?
        .max(backoff_initial);

        Ok(Self {
            backend_url,
            addr: SocketAddr::new(ip, port),
            training_interval: Duration::from_secs(interval_minutes.saturating_mul(60)),
            training_limit: parse_or(&lookup, "WKI_TRAINING_LIMIT", file.training_limit, 0)?,
            lookback_days: parse_or(
                &lookup,
                "WKI_TRAINING_LOOKBACK_DAYS",
                file.training_lookback_days,
                defaults.lookback_days,
            )?,
            max_retries: parse_or(
                &lookup,
                "WKI_TRAINING_MAX_RETRIES",
                file.training_max_retries,
                defaults.max_retries,
            )?
            .max(1),
            backoff_initial: Duration::from_secs(backoff_initial),
            backoff_max: Duration::from_secs(backoff_max),
            backend_timeout: Duration::from_secs(
                parse_or(
                    &lookup,
                    "WKI_BACKEND_TIMEOUT_SECS",
                    file.backend_timeout_secs,
                    5,
                )?
                .max(1),
            ),
            training_path: lookup("WKI_TRAINING_PATH")
                .or(file.training_path)
                .map(|path| normalize_path(&path))
                .unwrap_or(defaults.training_path),
            discovery_enabled: flag_or(
                &lookup,
                "WKI_DISCOVERY",
                file.discovery_enabled,
                true,
            )?,
            backend_discovery_enabled: flag_or(
                &lookup,
                "WKI_BACKEND_DISCOVERY",
                file.backend_discovery_enabled,
                true,
            )?,
            state_dir: lookup("WKI_STATE_DIR")
                .map(PathBuf::from)
                .or(file.state_dir)
                .unwrap_or(defaults.state_dir),
        })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_dir.join(STATE_FILE)
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            path: self.training_path.clone(),
            limit: self.training_limit,
            lookback_days: self.lookback_days,
            max_attempts: self.max_retries,
            backoff_initial: self.backoff_initial,
            backoff_max: self.backoff_max,
            timeout: self.backend_timeout,
        }
    }
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    file: Option<T>,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(file.unwrap_or(default)),
    }
}

fn flag_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    file: Option<bool>,
    default: bool,
) -> Result<bool, ConfigError> {
    let Some(raw) = lookup(key) else {
        return Ok(file.unwrap_or(default));
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid { key, value: raw }),
    }
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let cfg = ServiceConfig::from_lookup(env(&[])).expect("config");
        assert_eq!(cfg.backend_url, None);
        assert_eq!(cfg.addr, "0.0.0.0:5000".parse().unwrap());
        assert_eq!(cfg.training_interval, Duration::from_secs(86_400));
        assert_eq!(cfg.training_limit, 0);
        assert_eq!(cfg.lookback_days, 14);
        assert_eq!(cfg.max_retries, 5);
        assert_eq!(cfg.backoff_initial, Duration::from_secs(5));
        assert_eq!(cfg.backoff_max, Duration::from_secs(300));
        assert_eq!(cfg.backend_timeout, Duration::from_secs(5));
        assert_eq!(cfg.training_path, DEFAULT_TRAINING_PATH);
        assert!(cfg.discovery_enabled);
        assert!(cfg.backend_discovery_enabled);
        assert_eq!(cfg.state_path(), PathBuf::from("data").join("model.json"));
    }

    #[test]
    fn env_overrides_apply() {
        let cfg = ServiceConfig::from_lookup(env(&[
            ("WKI_BACKEND_URL", "http://werkstatt:3001"),
            ("WKI_BIND", "127.0.0.1"),
            ("WKI_PORT", "5055"),
            ("WKI_TRAINING_INTERVAL_MINUTES", "30"),
            ("WKI_TRAINING_LIMIT", "500"),
            ("WKI_TRAINING_LOOKBACK_DAYS", "0"),
            ("WKI_DISCOVERY", "0"),
            ("WKI_BACKEND_DISCOVERY", "false"),
            ("WKI_TRAINING_PATH", "training-data/"),
        ]))
        .expect("config");
        assert_eq!(cfg.backend_url.as_deref(), Some("http://werkstatt:3001"));
        assert_eq!(cfg.addr, "127.0.0.1:5055".parse().unwrap());
        assert_eq!(cfg.training_interval, Duration::from_secs(1800));
        assert_eq!(cfg.training_limit, 500);
        assert_eq!(cfg.lookback_days, 0);
        assert!(!cfg.discovery_enabled);
        assert!(!cfg.backend_discovery_enabled);
        assert_eq!(cfg.training_path, "/training-data");
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = ServiceConfig::from_lookup(env(&[("WKI_PORT", "fivethousand")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "WKI_PORT", .. }));

        let err = ServiceConfig::from_lookup(env(&[("WKI_BIND", "not-an-ip")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBind(_)));

        let err = ServiceConfig::from_lookup(env(&[("WKI_DISCOVERY", "maybe")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "WKI_DISCOVERY", .. }));
    }

    #[test]
    fn retries_and_backoff_are_sane() {
        let cfg = ServiceConfig::from_lookup(env(&[
            ("WKI_TRAINING_MAX_RETRIES", "0"),
            ("WKI_TRAINING_BACKOFF_INITIAL_SECS", "30"),
            ("WKI_TRAINING_BACKOFF_MAX_SECS", "10"),
        ]))
        .expect("config");
        assert_eq!(cfg.max_retries, 1);
        assert_eq!(cfg.backoff_max, Duration::from_secs(30));
    }

    #[test]
    fn file_layer_sits_under_env() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("wki.toml");
        std::fs::write(
            &path,
            "backend_url = \"http://from-file:3001\"\nport = 6000\nstate_dir = \"/var/lib/wki\"\n",
        )
        .expect("write");
        let path_str = path.display().to_string();
        let path_str = path_str.as_str();

        let cfg = ServiceConfig::from_lookup(env(&[("WKI_CONFIG", path_str)])).expect("config");
        assert_eq!(cfg.backend_url.as_deref(), Some("http://from-file:3001"));
        assert_eq!(cfg.port(), 6000);
        assert_eq!(cfg.state_dir, PathBuf::from("/var/lib/wki"));

        let cfg = ServiceConfig::from_lookup(env(&[("WKI_CONFIG", path_str), ("WKI_PORT", "7000")]))
            .expect("config");
        assert_eq!(cfg.port(), 7000);
    }

    #[test]
    fn unknown_file_keys_fail() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("wki.toml");
        std::fs::write(&path, "prot = 5000\n").expect("write");
        let path_str = path.display().to_string();
        let err = ServiceConfig::from_lookup(env(&[("WKI_CONFIG", path_str.as_str())])).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
