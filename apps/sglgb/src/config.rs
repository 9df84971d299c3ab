//! # Configuration
//!
//! [`PortalConfig`] is read from a TOML file and then overridden by
//! environment variables:
//!
//! - `SGLGB_API_KEY`: If set, requires Bearer token authentication
//! - `SGLGB_RATE_LIMIT`: Requests per second (default: 100, 0 to disable)
//! - `SGLGB_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all
//! - `SGLGB_LOCK_TTL_MINUTES`: Draft lock lifetime (default: 30)
//! - `SGLGB_MAX_MOV_BYTES`: Largest accepted MOV upload (default: 50 MiB)
//!
//! ```toml
//! database = "/var/lib/sglgb/portal.redb"
//! host = "0.0.0.0"
//! port = 8080
//! rate_limit = 50
//! cors_origins = "https://portal.example.gov.ph"
//! ```

use chrono::Duration;
use serde::{Deserialize, Serialize};
use sglgb_core::PortalError;
use sglgb_core::PortalSettings;
use sglgb_core::primitives::{
    DEFAULT_LOCK_TTL_MINUTES, DEFAULT_MAX_MOV_BYTES, MAX_LOCK_TTL_MINUTES,
};
use std::path::{Path, PathBuf};

/// File read when no `--config` is given, if it exists.
pub const DEFAULT_CONFIG_FILE: &str = "sglgb.toml";

/// Default rate limit in requests per second.
pub const DEFAULT_RATE_LIMIT: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PortalConfig {
    /// Path to the redb database.
    pub database: PathBuf,
    pub host: String,
    pub port: u16,
    /// Bearer key required on every endpoint except `/health`.
    pub api_key: Option<String>,
    /// Requests per second; 0 disables rate limiting.
    pub rate_limit: u32,
    /// Comma-separated origins, or "*". Unset means localhost only.
    pub cors_origins: Option<String>,
    pub lock_ttl_minutes: i64,
    pub max_mov_bytes: u64,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("sglgb.redb"),
            host: "127.0.0.1".to_string(),
            port: 8080,
            api_key: None,
            rate_limit: DEFAULT_RATE_LIMIT,
            cors_origins: None,
            lock_ttl_minutes: DEFAULT_LOCK_TTL_MINUTES,
            max_mov_bytes: DEFAULT_MAX_MOV_BYTES,
        }
    }
}

impl PortalConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, PortalError> {
        toml::from_str(s).map_err(|e| PortalError::SerializationError(format!("Config: {}", e)))
    }

    /// Load `path`, or [`DEFAULT_CONFIG_FILE`] when it exists, or defaults.
    /// An explicit path that cannot be read is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, PortalError> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };
        if !explicit && !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path).map_err(|e| {
            PortalError::IoError(format!("Read config '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Apply `SGLGB_*` environment variables.
    #[must_use]
    pub fn with_env(mut self) -> Self {
        self.apply_overrides(|name| std::env::var(name).ok());
        self
    }

    /// Apply overrides from `lookup`. Unparseable numbers are ignored with a
    /// warning; an empty API key disables authentication.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("SGLGB_API_KEY") {
            self.api_key = Some(key).filter(|k| !k.is_empty());
        }
        if let Some(origins) = lookup("SGLGB_CORS_ORIGINS") {
            self.cors_origins = Some(origins);
        }
        if let Some(v) = parse_var(&lookup, "SGLGB_RATE_LIMIT") {
            self.rate_limit = v;
        }
        if let Some(v) = parse_var(&lookup, "SGLGB_LOCK_TTL_MINUTES") {
            self.lock_ttl_minutes = v;
        }
        if let Some(v) = parse_var(&lookup, "SGLGB_MAX_MOV_BYTES") {
            self.max_mov_bytes = v;
        }
    }

    /// Reject values the portal cannot run with.
    pub fn validate(&self) -> Result<(), PortalError> {
        if self.lock_ttl_minutes <= 0 {
            return Err(PortalError::SerializationError(
                "lock_ttl_minutes must be positive".to_string(),
            ));
        }
        if self.lock_ttl_minutes > MAX_LOCK_TTL_MINUTES {
            return Err(PortalError::SerializationError(format!(
                "lock_ttl_minutes must be at most {}",
                MAX_LOCK_TTL_MINUTES
            )));
        }
        if self.max_mov_bytes == 0 {
            return Err(PortalError::SerializationError(
                "max_mov_bytes must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn settings(&self) -> Result<PortalSettings, PortalError> {
        let lock_ttl = Duration::try_minutes(self.lock_ttl_minutes).ok_or_else(|| {
            PortalError::SerializationError("lock_ttl_minutes out of range".to_string())
        })?;
        Ok(PortalSettings {
            lock_ttl,
            max_mov_bytes: self.max_mov_bytes,
        })
    }

    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "Ignoring unparseable setting");
            None
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn toml_fills_missing_fields_with_defaults() {
        let config = PortalConfig::from_toml_str("port = 9000\nrate_limit = 5\n").expect("parse");
        assert_eq!(config.port, 9000);
        assert_eq!(config.rate_limit, 5);
        assert_eq!(config.lock_ttl_minutes, DEFAULT_LOCK_TTL_MINUTES);
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(PortalConfig::from_toml_str("prot = 1").is_err());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = PortalConfig::from_toml_str("rate_limit = 5").expect("parse");
        config.apply_overrides(env(&[
            ("SGLGB_RATE_LIMIT", "0"),
            ("SGLGB_API_KEY", "secret"),
            ("SGLGB_LOCK_TTL_MINUTES", "abc"),
        ]));
        assert_eq!(config.rate_limit, 0);
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.lock_ttl_minutes, DEFAULT_LOCK_TTL_MINUTES);
    }

    #[test]
    fn empty_api_key_disables_auth() {
        let mut config = PortalConfig {
            api_key: Some("old".into()),
            ..PortalConfig::default()
        };
        config.apply_overrides(env(&[("SGLGB_API_KEY", "")]));
        assert!(config.api_key.is_none());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(PortalConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn settings_follow_config() {
        let config = PortalConfig {
            lock_ttl_minutes: 5,
            max_mov_bytes: 1024,
            ..PortalConfig::default()
        };
        assert!(config.validate().is_ok());
        let settings = config.settings().expect("settings");
        assert_eq!(settings.lock_ttl, Duration::minutes(5));
        assert_eq!(settings.max_mov_bytes, 1024);
        assert!(
            PortalConfig {
                lock_ttl_minutes: 0,
                ..config
            }
            .validate()
            .is_err()
        );
    }

    #[test]
    fn lock_ttl_is_capped_at_a_week() {
        let week = PortalConfig {
            lock_ttl_minutes: MAX_LOCK_TTL_MINUTES,
            ..PortalConfig::default()
        };
        assert!(week.validate().is_ok());
        assert_eq!(week.settings().expect("settings").lock_ttl, Duration::weeks(1));

        let mut config = PortalConfig::default();
        config.apply_overrides(env(&[("SGLGB_LOCK_TTL_MINUTES", "9223372036854775807")]));
        assert_eq!(config.lock_ttl_minutes, i64::MAX);
        assert!(config.validate().is_err());
        assert!(config.settings().is_err());
    }
}
