//! Environment configuration
//!
//! | Variable | Default |
//! |---|---|
//! | `MINTGATE_STORE` | `mintgate_keys.json` |
//! | `MINTGATE_LOCATION` | `https://example.com` |
//! | `MINTGATE_DEFAULT_TTL_SECS` | `60` (`0` disables the default expiry) |
//! | `MINTGATE_DEFAULT_METHODS` | `create,solve,close` |

use crate::auth::defaults::{DEFAULT_LOCATION, DEFAULT_OPERATIONS, DEFAULT_TTL_SECS};
use crate::auth::IssuerConfig;
use crate::storage::{FileStoreConfig, DEFAULT_STORE_PATH};
use chrono::Duration;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct GateConfig {
    pub store_path: PathBuf,
    pub location: String,
    /// `None` issues tokens without a default expiry
    pub default_ttl: Option<Duration>,
    pub default_operations: Vec<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            location: DEFAULT_LOCATION.to_string(),
            default_ttl: Some(Duration::seconds(DEFAULT_TTL_SECS)),
            default_operations: DEFAULT_OPERATIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl GateConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source; unset variables keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("MINTGATE_STORE") {
            config.store_path = PathBuf::from(path);
        }

        if let Some(location) = lookup("MINTGATE_LOCATION") {
            config.location = location;
        }

        if let Some(ttl) = lookup("MINTGATE_DEFAULT_TTL_SECS") {
            config.default_ttl = parse_ttl(&ttl).map_err(|reason| ConfigError::Invalid {
                var: "MINTGATE_DEFAULT_TTL_SECS",
                reason,
            })?;
        }

        if let Some(methods) = lookup("MINTGATE_DEFAULT_METHODS") {
            config.default_operations = split_operations(&methods);
        }

        Ok(config)
    }

    pub fn store_config(&self) -> FileStoreConfig {
        FileStoreConfig::new(self.store_path.clone())
    }

    pub fn issuer_config(&self) -> IssuerConfig {
        IssuerConfig {
            location: self.location.clone(),
            default_ttl: self.default_ttl,
            default_operations: self.default_operations.clone(),
        }
    }
}

/// Seconds; `0` means no default expiry
pub fn parse_ttl(s: &str) -> Result<Option<Duration>, String> {
    let secs: i64 = s.trim().parse().map_err(|e| format!("'{}': {}", s, e))?;

    match secs {
        0 => Ok(None),
        n if n < 0 => Err(format!("'{}': must not be negative", s)),
        n => Ok(Some(Duration::seconds(n))),
    }
}

/// Comma-separated operation list, blanks dropped
pub fn split_operations(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|op| !op.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = GateConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.store_path, PathBuf::from("mintgate_keys.json"));
        assert_eq!(config.location, "https://example.com");
        assert_eq!(config.default_ttl, Some(Duration::seconds(60)));
        assert_eq!(config.default_operations, vec!["create", "solve", "close"]);
    }

    #[test]
    fn test_overrides() {
        let config = GateConfig::from_lookup(lookup(&[
            ("MINTGATE_STORE", "/var/lib/mintgate/keys.json"),
            ("MINTGATE_LOCATION", "https://issuer.internal"),
            ("MINTGATE_DEFAULT_TTL_SECS", "0"),
            ("MINTGATE_DEFAULT_METHODS", "create, solve,"),
        ]))
        .unwrap();

        assert_eq!(config.store_path, PathBuf::from("/var/lib/mintgate/keys.json"));
        assert_eq!(config.location, "https://issuer.internal");
        assert_eq!(config.default_ttl, None);
        assert_eq!(config.default_operations, vec!["create", "solve"]);

        let issuer = config.issuer_config();
        assert_eq!(issuer.location, "https://issuer.internal");
        assert_eq!(issuer.default_ttl, None);
    }

    #[test]
    fn test_bad_ttl() {
        assert!(GateConfig::from_lookup(lookup(&[("MINTGATE_DEFAULT_TTL_SECS", "soon")])).is_err());
        assert!(GateConfig::from_lookup(lookup(&[("MINTGATE_DEFAULT_TTL_SECS", "-5")])).is_err());
    }
}
