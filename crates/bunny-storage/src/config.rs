use crate::retry::Backoff;
use crate::StorageError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_INITIAL_BACKOFF_MS: u64 = 100;
const DEFAULT_MAX_BACKOFF_MS: u64 = 2_000;

pub const ENV_ENDPOINT: &str = "BUNNY_ENDPOINT";
pub const ENV_ACCESS_KEY: &str = "BUNNY_ACCESS_KEY";
pub const ENV_MAX_ATTEMPTS: &str = "BUNNY_MAX_ATTEMPTS";

/// Storage zone password. Never printed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessKey(String);

impl AccessKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessKey(***)")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Zone URL, e.g. `https://la.storage.bunnycdn.com/myzone`. No trailing slash.
    pub endpoint: String,
    pub access_key: AccessKey,
    /// Total attempts per request, the first included. Zero behaves as one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_initial_backoff_ms() -> u64 {
    DEFAULT_INITIAL_BACKOFF_MS
}

fn default_max_backoff_ms() -> u64 {
    DEFAULT_MAX_BACKOFF_MS
}

impl ClientConfig {
    pub fn new(endpoint: &str, access_key: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_owned(),
            access_key: AccessKey::new(access_key),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            timeout_ms: None,
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.initial_backoff_ms = backoff.initial.as_millis() as u64;
        self.max_backoff_ms = backoff.max.as_millis() as u64;
        self
    }

    /// Sub-millisecond remainders round up, so a non-zero timeout never becomes zero.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let mut ms = timeout.as_millis() as u64;
        if Duration::from_millis(ms) < timeout {
            ms += 1;
        }
        self.timeout_ms = Some(ms);
        self
    }

    pub fn backoff(&self) -> Backoff {
        Backoff {
            initial: Duration::from_millis(self.initial_backoff_ms),
            max: Duration::from_millis(self.max_backoff_ms),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<(), StorageError> {
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(StorageError::Config(format!(
                "endpoint must be an http(s) URL, got '{}'",
                self.endpoint
            )));
        }
        if self.access_key.expose().is_empty() {
            return Err(StorageError::Config("access key is empty".to_owned()));
        }
        if self.timeout_ms == Some(0) {
            return Err(StorageError::Config("timeout must be non-zero".to_owned()));
        }
        Ok(())
    }

    /// Load config from `~/.config/bunny-storage/client.json`.
    pub fn load_default() -> Result<Self, StorageError> {
        let path = default_config_path()?;
        Self::load(&path)
    }

    pub fn load(path: &Path) -> Result<Self, StorageError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&content)
            .map_err(|e| StorageError::Config(format!("invalid client config: {e}")))?;
        config.endpoint = config.endpoint.trim_end_matches('/').to_owned();
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Build from `BUNNY_ENDPOINT`, `BUNNY_ACCESS_KEY` and optionally `BUNNY_MAX_ATTEMPTS`.
    pub fn from_env() -> Result<Self, StorageError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, StorageError> {
        let endpoint = lookup(ENV_ENDPOINT)
            .ok_or_else(|| StorageError::Config(format!("{ENV_ENDPOINT} not set")))?;
        let access_key = lookup(ENV_ACCESS_KEY)
            .ok_or_else(|| StorageError::Config(format!("{ENV_ACCESS_KEY} not set")))?;
        let mut config = Self::new(&endpoint, &access_key);
        if let Some(raw) = lookup(ENV_MAX_ATTEMPTS) {
            config.max_attempts = raw.trim().parse().map_err(|e| {
                StorageError::Config(format!("invalid {ENV_MAX_ATTEMPTS} '{raw}': {e}"))
            })?;
        }
        Ok(config)
    }
}

fn default_config_path() -> Result<PathBuf, StorageError> {
    let home =
        std::env::var("HOME").map_err(|_| StorageError::Config("HOME not set".to_owned()))?;
    Ok(PathBuf::from(home).join(".config/bunny-storage/client.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("client.json");

        let config = ClientConfig::new("https://la.storage.example.com/zone", "secret123")
            .with_max_attempts(7)
            .with_timeout(Duration::from_secs(30));
        config.save(&path).unwrap();

        let loaded = ClientConfig::load(&path).unwrap();
        assert_eq!(loaded.endpoint, "https://la.storage.example.com/zone");
        assert_eq!(loaded.access_key.expose(), "secret123");
        assert_eq!(loaded.max_attempts, 7);
        assert_eq!(loaded.timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn config_defaults_when_fields_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.json");
        std::fs::write(
            &path,
            r#"{"endpoint":"https://example.com/zone/","access_key":"k"}"#,
        )
        .unwrap();

        let loaded = ClientConfig::load(&path).unwrap();
        assert_eq!(loaded.endpoint, "https://example.com/zone");
        assert_eq!(loaded.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(loaded.backoff().initial, Duration::from_millis(100));
        assert_eq!(loaded.backoff().max, Duration::from_secs(2));
        assert!(loaded.timeout().is_none());
    }

    #[test]
    fn config_invalid_json_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            ClientConfig::load(&path),
            Err(StorageError::Config(_))
        ));
    }

    #[test]
    fn config_strips_trailing_slash() {
        let config = ClientConfig::new("https://example.com/zone/", "k");
        assert_eq!(config.endpoint, "https://example.com/zone");
    }

    #[test]
    fn access_key_never_in_debug_output() {
        let config = ClientConfig::new("https://example.com/zone", "super-secret");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("AccessKey(***)"));
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(ClientConfig::new("ftp://example.com/zone", "k")
            .validate()
            .is_err());
        assert!(ClientConfig::new("https://example.com/zone", "")
            .validate()
            .is_err());
        assert!(ClientConfig::new("https://example.com/zone", "k")
            .with_timeout(Duration::ZERO)
            .validate()
            .is_err());
        assert!(ClientConfig::new("http://127.0.0.1:1/zone", "k")
            .validate()
            .is_ok());
    }

    #[test]
    fn timeout_keeps_millisecond_precision() {
        let config = ClientConfig::new("https://example.com/zone", "k");
        assert_eq!(
            config.clone().with_timeout(Duration::from_millis(500)).timeout(),
            Some(Duration::from_millis(500))
        );
        assert_eq!(
            config.clone().with_timeout(Duration::from_millis(2_750)).timeout(),
            Some(Duration::from_millis(2_750))
        );
        assert_eq!(
            config.with_timeout(Duration::from_micros(10)).timeout(),
            Some(Duration::from_millis(1))
        );
    }

    #[test]
    fn sub_second_timeout_survives_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.json");
        ClientConfig::new("https://example.com/zone", "k")
            .with_timeout(Duration::from_millis(900))
            .save(&path)
            .unwrap();
        let loaded = ClientConfig::load(&path).unwrap();
        assert_eq!(loaded.timeout(), Some(Duration::from_millis(900)));
        assert!(loaded.validate().is_ok());
    }

    #[test]
    fn zero_attempts_is_accepted_as_one() {
        let config = ClientConfig::new("https://example.com/zone", "k").with_max_attempts(0);
        assert!(config.validate().is_ok());
        let client = crate::Client::from_config(config).unwrap();
        assert_eq!(client.retry_policy().max_attempts(), 1);
    }

    #[test]
    fn from_lookup_reads_variables() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_ENDPOINT, "https://ny.storage.example.com/zone/"),
            (ENV_ACCESS_KEY, "pw"),
            (ENV_MAX_ATTEMPTS, "3"),
        ]);
        let config =
            ClientConfig::from_lookup(|k| vars.get(k).map(|v| (*v).to_owned())).unwrap();
        assert_eq!(config.endpoint, "https://ny.storage.example.com/zone");
        assert_eq!(config.access_key.expose(), "pw");
        assert_eq!(config.max_attempts, 3);
    }

    #[test]
    fn from_lookup_missing_key_fails() {
        let err = ClientConfig::from_lookup(|k| {
            (k == ENV_ENDPOINT).then(|| "https://example.com/zone".to_owned())
        })
        .unwrap_err();
        assert!(err.to_string().contains(ENV_ACCESS_KEY));
    }

    #[test]
    fn from_lookup_bad_attempts_fails() {
        let err = ClientConfig::from_lookup(|k| match k {
            ENV_ENDPOINT => Some("https://example.com/zone".to_owned()),
            ENV_ACCESS_KEY => Some("k".to_owned()),
            _ => Some("many".to_owned()),
        })
        .unwrap_err();
        assert!(matches!(err, StorageError::Config(_)));
    }
}
