use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::detector::{default_channels, ChannelConfig};

pub const CONFIG_PATH_ENV: &str = "SOS_RELAY_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "sos-relay.json";
pub const BIND_ENV: &str = "SOS_RELAY_BIND";
pub const DATABASE_ENV: &str = "SOS_RELAY_DB";
pub const PROJECT_ID_ENV: &str = "FCM_PROJECT_ID";
pub const ACCESS_TOKEN_ENV: &str = "FCM_ACCESS_TOKEN";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    #[default]
    DryRun,
    Fcm,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransportSettings {
    pub kind: TransportKind,
    pub project_id: Option<String>,
    /// Full send URL; overrides the one derived from `project_id`.
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            kind: TransportKind::DryRun,
            project_id: None,
            endpoint: None,
            timeout_secs: 10,
        }
    }
}

impl TransportSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectorSettings {
    pub channels: Vec<ChannelConfig>,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            channels: default_channels(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmergencySettings {
    pub sender_name: String,
    /// Recipient ids alerted when an emergency pattern fires.
    pub contacts: Vec<String>,
}

impl Default for EmergencySettings {
    fn default() -> Self {
        Self {
            sender_name: "SOS contact".into(),
            contacts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RelaySettings {
    pub bind_addr: String,
    pub database_path: PathBuf,
    pub transport: TransportSettings,
    pub batch_concurrency: usize,
    pub delivery_log_enabled: bool,
    pub detector: DetectorSettings,
    pub emergency: EmergencySettings,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".into(),
            database_path: PathBuf::from("sos-relay.sqlite3"),
            transport: TransportSettings::default(),
            batch_concurrency: 4,
            delivery_log_enabled: true,
            detector: DetectorSettings::default(),
            emergency: EmergencySettings::default(),
        }
    }
}

impl RelaySettings {
    /// Reads the file named by `SOS_RELAY_CONFIG` and applies env overrides.
    pub fn load() -> Self {
        let path = env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        let mut settings = Self::from_file(Path::new(&path));
        settings.apply_overrides(|key| env::var(key).ok());
        settings
    }

    /// A missing file yields defaults; an unreadable or invalid one is logged
    /// and also yields defaults.
    pub fn from_file(path: &Path) -> Self {
        if !path.exists() {
            info!("No settings at {}; using defaults", path.display());
            return Self::default();
        }
        match Self::read(path) {
            Ok(settings) => settings,
            Err(err) => {
                warn!("Ignoring settings file: {err:#}");
                Self::default()
            }
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings in {}", path.display()))
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(bind) = non_empty(BIND_ENV) {
            self.bind_addr = bind;
        }
        if let Some(db) = non_empty(DATABASE_ENV) {
            self.database_path = PathBuf::from(db);
        }
        if let Some(project_id) = non_empty(PROJECT_ID_ENV) {
            self.transport.project_id = Some(project_id);
        }
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }
}

/// The push credential only ever comes from the environment.
pub fn access_token_from_env() -> Option<String> {
    env::var(ACCESS_TOKEN_ENV)
        .ok()
        .filter(|token| !token.trim().is_empty())
}
