use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use chrono::TimeDelta;
use serde::Deserialize;

use crate::catalog::{Credentials, DEFAULT_BASE_URL};
use crate::domain::{CatalogId, OwnerId, TrackedObject};
use crate::error::TleError;
use crate::session::SessionPolicy;
use crate::sync::SyncPolicy;

pub const DEFAULT_CONFIG_FILE: &str = "tle-sync.json";
pub const USERNAME_ENV: &str = "SPACETRACK_USERNAME";
pub const PASSWORD_ENV: &str = "SPACETRACK_PASSWORD";

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub catalog: CatalogSection,
    #[serde(default)]
    pub credentials: Option<Credentials>,
    #[serde(default)]
    pub store: Option<String>,
    #[serde(default)]
    pub sync: SyncSection,
    #[serde(default)]
    pub tracked: Vec<TrackedEntry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CatalogSection {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SyncSection {
    #[serde(default)]
    pub pacing_ms: Option<u64>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub retry_backoff_secs: Option<u64>,
    #[serde(default)]
    pub interval_hours: Option<u64>,
    #[serde(default)]
    pub session_ttl_secs: Option<u64>,
    #[serde(default)]
    pub cooldown_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TrackedEntry {
    Shorthand(String),
    Detailed(TrackedEntryObject),
}

#[derive(Debug, Deserialize)]
pub struct TrackedEntryObject {
    pub catalog_id: u32,
    pub owner: String,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub base_url: String,
    pub request_timeout: Duration,
    pub credentials: Option<Credentials>,
    pub store_path: Option<Utf8PathBuf>,
    pub session: SessionPolicy,
    pub sync: SyncPolicy,
    pub interval: Duration,
    pub tracked: Vec<TrackedObject>,
}

impl ResolvedConfig {
    pub fn credentials(&self) -> Result<Credentials, TleError> {
        self.credentials.clone().ok_or(TleError::MissingCredentials)
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        if credentials.is_some() {
            self.credentials = credentials;
        }
        self
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, TleError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let config = if path.is_none() && !config_path.exists() {
            Config::default()
        } else {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| TleError::ConfigRead(config_path.clone()))?;
            serde_json::from_str(&content).map_err(|err| TleError::ConfigParse(err.to_string()))?
        };

        Ok(Self::resolve_config(config)?.with_credentials(credentials_from_env()))
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, TleError> {
        let schema_version = config.schema_version.unwrap_or(1);
        let session_defaults = SessionPolicy::default();
        let sync_defaults = SyncPolicy::default();

        let session = SessionPolicy {
            ttl: match config.sync.session_ttl_secs {
                Some(secs) => seconds(secs, "session_ttl_secs")?,
                None => session_defaults.ttl,
            },
            cooldown: match config.sync.cooldown_secs {
                Some(secs) => seconds(secs, "cooldown_secs")?,
                None => session_defaults.cooldown,
            },
        };

        let max_attempts = config.sync.max_attempts.unwrap_or(sync_defaults.max_attempts);
        if max_attempts == 0 {
            return Err(TleError::ConfigParse(
                "sync.max_attempts must be at least 1".to_string(),
            ));
        }
        let sync = SyncPolicy {
            pacing: config
                .sync
                .pacing_ms
                .map(Duration::from_millis)
                .unwrap_or(sync_defaults.pacing),
            max_attempts,
            retry_backoff: config
                .sync
                .retry_backoff_secs
                .map(Duration::from_secs)
                .unwrap_or(sync_defaults.retry_backoff),
        };

        let interval = config
            .sync
            .interval_hours
            .unwrap_or(12)
            .checked_mul(3600)
            .map(Duration::from_secs)
            .ok_or_else(|| TleError::ConfigParse("sync.interval_hours out of range".to_string()))?;

        let tracked = config
            .tracked
            .into_iter()
            .map(|entry| match entry {
                TrackedEntry::Shorthand(value) => value.parse::<TrackedObject>(),
                TrackedEntry::Detailed(obj) => Ok(TrackedObject::new(
                    CatalogId::new(obj.catalog_id)?,
                    obj.owner.parse::<OwnerId>()?,
                )),
            })
            .collect::<Result<Vec<_>, TleError>>()?;

        let credentials = config
            .credentials
            .filter(|creds| !creds.username.trim().is_empty() && !creds.password.is_empty());

        Ok(ResolvedConfig {
            schema_version,
            base_url: config
                .catalog
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            request_timeout: Duration::from_secs(config.catalog.request_timeout_secs.unwrap_or(30)),
            credentials,
            store_path: config.store.map(Utf8PathBuf::from),
            session,
            sync,
            interval,
            tracked,
        })
    }
}

pub fn credentials_from_env() -> Option<Credentials> {
    let username = std::env::var(USERNAME_ENV).ok()?;
    let password = std::env::var(PASSWORD_ENV).ok()?;
    if username.trim().is_empty() || password.is_empty() {
        return None;
    }
    Some(Credentials {
        username: username.trim().to_string(),
        password,
    })
}

fn seconds(value: u64, name: &str) -> Result<TimeDelta, TleError> {
    i64::try_from(value)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .ok_or_else(|| TleError::ConfigParse(format!("sync.{name} out of range")))
}
