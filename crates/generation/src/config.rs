/// Generator and poller configuration
///
/// Credentials, the history file location and the polling constants.
/// The poller defaults (5 s interval, 10 min deadline, 5 consecutive
/// failures) match the behavior the mobile client shipped with; they
/// are configuration here, not constants.
use anyhow::Result;
use history::HistoryStore;
use providers::{FalProvider, KlingProvider, ProviderRegistry, VeoProvider};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Polling constants
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Milliseconds between poll ticks
    pub interval_ms: u64,

    /// Wall-clock deadline per job in seconds, measured from submission
    pub job_timeout_secs: u64,

    /// Whole-batch consecutive failures before the poller gives up
    pub max_consecutive_failures: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            job_timeout_secs: 600,
            max_consecutive_failures: 5,
        }
    }
}

impl PollerConfig {
    /// With tick interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval_ms = interval.as_millis() as u64;
        self
    }

    /// With per-job deadline
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout_secs = timeout.as_secs();
        self
    }

    /// With give-up threshold
    pub fn with_max_consecutive_failures(mut self, max: u32) -> Self {
        self.max_consecutive_failures = max;
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Kling API key
    pub kling_api_key: Option<String>,

    /// Google API key for Veo
    pub google_api_key: Option<String>,

    /// Fal AI key
    pub fal_api_key: Option<String>,

    /// History file location; per-user default when absent
    pub history_path: Option<PathBuf>,

    /// Polling constants
    #[serde(default)]
    pub poller: PollerConfig,
}

impl GeneratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick up credentials from the environment
    /// (`KLING_API_KEY`, `GOOGLE_API_KEY`, `FAL_API_KEY`)
    pub fn from_env() -> Self {
        Self {
            kling_api_key: std::env::var("KLING_API_KEY").ok(),
            google_api_key: std::env::var("GOOGLE_API_KEY").ok(),
            fal_api_key: std::env::var("FAL_API_KEY").ok(),
            history_path: None,
            poller: PollerConfig::default(),
        }
    }

    /// With Kling credentials
    pub fn with_kling_api_key(mut self, key: impl Into<String>) -> Self {
        self.kling_api_key = Some(key.into());
        self
    }

    /// With Google credentials
    pub fn with_google_api_key(mut self, key: impl Into<String>) -> Self {
        self.google_api_key = Some(key.into());
        self
    }

    /// With Fal credentials
    pub fn with_fal_api_key(mut self, key: impl Into<String>) -> Self {
        self.fal_api_key = Some(key.into());
        self
    }

    /// With explicit history file
    pub fn with_history_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.history_path = Some(path.into());
        self
    }

    /// With polling constants
    pub fn with_poller(mut self, poller: PollerConfig) -> Self {
        self.poller = poller;
        self
    }

    /// Build a registry with an adapter per configured credential
    pub fn registry(&self) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        if let Some(key) = &self.kling_api_key {
            registry.register(Arc::new(KlingProvider::new(key.clone())));
        }
        if let Some(key) = &self.google_api_key {
            registry.register(Arc::new(VeoProvider::new(key.clone())));
        }
        if let Some(key) = &self.fal_api_key {
            registry.register(Arc::new(FalProvider::new(key.clone())));
        }
        registry
    }

    /// History store at the configured (or default) location
    pub fn history_store(&self) -> HistoryStore {
        match &self.history_path {
            Some(path) => HistoryStore::new(path.clone()),
            None => HistoryStore::new(HistoryStore::default_path()),
        }
    }

    /// Save configuration to JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from JSON
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&json)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poller_defaults() {
        let poller = PollerConfig::default();
        assert_eq!(poller.interval_ms, 5_000);
        assert_eq!(poller.job_timeout_secs, 600);
        assert_eq!(poller.max_consecutive_failures, 5);
    }

    #[test]
    fn test_registry_per_credential() {
        let config = GeneratorConfig::new().with_kling_api_key("k");
        let registry = config.registry();
        assert!(registry.resolve("kling-2.5-turbo").is_ok());
        assert!(registry.resolve("fal-ai/minimax-video").is_err());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        let config = GeneratorConfig::new()
            .with_fal_api_key("fal-key")
            .with_poller(PollerConfig::default().with_max_consecutive_failures(3));
        config.save(&path).unwrap();

        let loaded = GeneratorConfig::load(&path).unwrap();
        assert_eq!(loaded.fal_api_key.as_deref(), Some("fal-key"));
        assert_eq!(loaded.poller.max_consecutive_failures, 3);
        assert_eq!(loaded.poller.interval_ms, 5_000);
    }
}
