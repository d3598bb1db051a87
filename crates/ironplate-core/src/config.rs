//! ============================================================================
//! Configuration - environment driven settings
//! ============================================================================
//! Values come from the process environment (a `.env` file is loaded by the
//! binary before this runs):
//! - IRONPLATE_DB_PATH             local store location
//! - IRONPLATE_BACKEND_URL         backend base URL
//! - IRONPLATE_API_KEY             project key sent with every request
//! - IRONPLATE_ACCESS_TOKEN        signed-in user's bearer token
//! - IRONPLATE_PROBE_URL           reachability check target
//! - IRONPLATE_SYNC_INTERVAL_SECS  background sync period
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::remote::{BackendError, RestBackend};
use crate::sync::{SyncConfig, DEFAULT_SYNC_INTERVAL};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IronplateConfig {
    pub db_path: Option<String>,
    pub backend_url: Option<String>,
    pub api_key: Option<String>,
    pub access_token: Option<String>,
    pub probe_url: Option<String>,
    pub sync_interval_secs: u64,
}

impl Default for IronplateConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            backend_url: None,
            api_key: None,
            access_token: None,
            probe_url: None,
            sync_interval_secs: DEFAULT_SYNC_INTERVAL.as_secs(),
        }
    }
}

impl IronplateConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let sync_interval_secs = match get("IRONPLATE_SYNC_INTERVAL_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    warn!("Ignoring invalid IRONPLATE_SYNC_INTERVAL_SECS={:?}", raw);
                    defaults.sync_interval_secs
                }
            },
            None => defaults.sync_interval_secs,
        };

        Self {
            db_path: get("IRONPLATE_DB_PATH"),
            backend_url: get("IRONPLATE_BACKEND_URL"),
            api_key: get("IRONPLATE_API_KEY"),
            access_token: get("IRONPLATE_ACCESS_TOKEN"),
            probe_url: get("IRONPLATE_PROBE_URL"),
            sync_interval_secs,
        }
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            interval: Duration::from_secs(self.sync_interval_secs),
            ..SyncConfig::default()
        }
    }

    /// REST client for the configured backend
    pub fn backend(&self) -> Result<RestBackend, BackendError> {
        let url = self.backend_url.as_deref().ok_or(BackendError::NotConfigured)?;
        Ok(RestBackend::new(
            url,
            self.api_key.clone().unwrap_or_default(),
            self.access_token.clone(),
        ))
    }

    /// Reachability target, falling back to the backend's health endpoint
    pub fn probe_target(&self) -> Option<String> {
        self.probe_url.clone().or_else(|| {
            self.backend_url
                .as_deref()
                .map(|url| format!("{}/auth/v1/health", url.trim_end_matches('/')))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> IronplateConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        IronplateConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = config(&[]);
        assert!(config.db_path.is_none());
        assert_eq!(config.sync_interval_secs, 30);
        assert_eq!(config.sync_config().interval, Duration::from_secs(30));
        assert_eq!(config.sync_config().success_reset, Duration::from_secs(2));
        assert!(matches!(config.backend(), Err(BackendError::NotConfigured)));
        assert!(config.probe_target().is_none());
    }

    #[test]
    fn test_reads_all_keys() {
        let config = config(&[
            ("IRONPLATE_DB_PATH", "/tmp/cache.redb"),
            ("IRONPLATE_BACKEND_URL", "https://db.example.com/"),
            ("IRONPLATE_API_KEY", "anon"),
            ("IRONPLATE_ACCESS_TOKEN", "token"),
            ("IRONPLATE_SYNC_INTERVAL_SECS", "45"),
        ]);
        assert_eq!(config.db_path.as_deref(), Some("/tmp/cache.redb"));
        assert_eq!(config.access_token.as_deref(), Some("token"));
        assert_eq!(config.sync_config().interval, Duration::from_secs(45));
        assert!(config.backend().is_ok());
        assert_eq!(
            config.probe_target().as_deref(),
            Some("https://db.example.com/auth/v1/health")
        );
    }

    #[test]
    fn test_invalid_interval_and_blank_values_ignored() {
        let config = config(&[
            ("IRONPLATE_SYNC_INTERVAL_SECS", "soon"),
            ("IRONPLATE_ACCESS_TOKEN", "  "),
            ("IRONPLATE_PROBE_URL", "http://probe.local/ok"),
        ]);
        assert_eq!(config.sync_interval_secs, 30);
        assert!(config.access_token.is_none());
        assert_eq!(config.probe_target().as_deref(), Some("http://probe.local/ok"));
    }
}
