//! Engine and settings configuration.
//!
//! `EngineConfig` describes one collection kind. `SyncSettings` is the
//! on-disk document listing every collection a client keeps in sync, shared
//! by the CLI and any other composition root.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::storage::CacheKeys;
use crate::util::normalize_text_option;

const SETTINGS_SCHEMA_VERSION: u32 = 1;

/// Prefix shared by every cache slot the engine writes.
pub const DEFAULT_STORAGE_PREFIX: &str = "repair_tracking_";
/// Scope used before a signed-in user is known.
pub const DEFAULT_SCOPE: &str = "unknown";
/// Environment variable overriding the cache scope.
pub const SCOPE_ENV: &str = "REPAIRSYNC_SCOPE";

const DEFAULT_RESUME_EPSILON_MS: u64 = 2_000;
const DEFAULT_SAVE_DEBOUNCE_MS: u64 = 1_500;
const DEFAULT_MIN_SAVE_DELAY_MS: u64 = 250;

/// Configuration for one collection engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    /// Collection kind, e.g. `repairs`
    pub kind: String,
    /// Remote path; defaults to `kind`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Per-user cache scope
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default = "default_storage_prefix")]
    pub storage_prefix: String,
    /// Backward shift applied to the resume point
    #[serde(default = "default_resume_epsilon_ms")]
    pub resume_epsilon_ms: u64,
    #[serde(default = "default_save_debounce_ms")]
    pub save_debounce_ms: u64,
    #[serde(default = "default_min_save_delay_ms")]
    pub min_save_delay_ms: u64,
    /// A cache older than this forces a full load
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_max_age_ms: Option<u64>,
    /// Foreign-key fields to index, e.g. `repairId`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub index_fields: Vec<String>,
}

fn default_scope() -> String {
    DEFAULT_SCOPE.to_string()
}

fn default_storage_prefix() -> String {
    DEFAULT_STORAGE_PREFIX.to_string()
}

const fn default_resume_epsilon_ms() -> u64 {
    DEFAULT_RESUME_EPSILON_MS
}

const fn default_save_debounce_ms() -> u64 {
    DEFAULT_SAVE_DEBOUNCE_MS
}

const fn default_min_save_delay_ms() -> u64 {
    DEFAULT_MIN_SAVE_DELAY_MS
}

const fn default_settings_version() -> u32 {
    SETTINGS_SCHEMA_VERSION
}

impl EngineConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            path: None,
            scope: default_scope(),
            storage_prefix: default_storage_prefix(),
            resume_epsilon_ms: DEFAULT_RESUME_EPSILON_MS,
            save_debounce_ms: DEFAULT_SAVE_DEBOUNCE_MS,
            min_save_delay_ms: DEFAULT_MIN_SAVE_DELAY_MS,
            cache_max_age_ms: None,
            index_fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    #[must_use]
    pub fn with_index_field(mut self, field: impl Into<String>) -> Self {
        self.index_fields.push(field.into());
        self
    }

    #[must_use]
    pub fn with_cache_max_age(mut self, max_age: Duration) -> Self {
        self.cache_max_age_ms = Some(duration_millis(max_age));
        self
    }

    #[must_use]
    pub fn with_save_debounce(mut self, debounce: Duration) -> Self {
        self.save_debounce_ms = duration_millis(debounce);
        self
    }

    #[must_use]
    pub fn with_resume_epsilon(mut self, epsilon: Duration) -> Self {
        self.resume_epsilon_ms = duration_millis(epsilon);
        self
    }

    pub fn remote_path(&self) -> &str {
        self.path
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .unwrap_or(self.kind.as_str())
    }

    pub const fn resume_epsilon(&self) -> Duration {
        Duration::from_millis(self.resume_epsilon_ms)
    }

    pub const fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }

    pub const fn min_save_delay(&self) -> Duration {
        Duration::from_millis(self.min_save_delay_ms)
    }

    pub fn cache_max_age(&self) -> Option<Duration> {
        self.cache_max_age_ms.map(Duration::from_millis)
    }

    pub fn cache_keys(&self) -> CacheKeys {
        CacheKeys::new(&self.storage_prefix, &self.kind, &self.scope)
    }

    /// Reject configurations an engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.kind.trim().is_empty() {
            return Err(Error::Config("collection kind must not be empty".to_string()));
        }
        if self.kind.trim() != self.kind {
            return Err(Error::Config(format!(
                "collection kind '{}' has surrounding whitespace",
                self.kind
            )));
        }
        if self.path.as_deref().is_some_and(|path| path.trim().is_empty()) {
            return Err(Error::Config(format!(
                "remote path for '{}' must not be empty",
                self.kind
            )));
        }
        if self.scope.trim().is_empty() {
            return Err(Error::Config(format!("scope for '{}' must not be empty", self.kind)));
        }

        let mut seen = HashSet::new();
        for field in &self.index_fields {
            if field.trim().is_empty() {
                return Err(Error::Config(format!(
                    "index field for '{}' must not be empty",
                    self.kind
                )));
            }
            if !seen.insert(field.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate index field '{field}' for '{}'",
                    self.kind
                )));
            }
        }
        Ok(())
    }

    fn normalize(&mut self) {
        self.kind = self.kind.trim().to_string();
        self.path = normalize_text_option(self.path.take());
        self.scope = normalize_text_option(Some(std::mem::take(&mut self.scope)))
            .unwrap_or_else(default_scope);
        self.index_fields = std::mem::take(&mut self.index_fields)
            .into_iter()
            .filter_map(|field| normalize_text_option(Some(field)))
            .collect();
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn duration_millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

/// The settings document: which collections to sync and where to cache them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncSettings {
    #[serde(default = "default_settings_version")]
    pub version: u32,
    /// Cache scope, usually the signed-in user id
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub storage_prefix: Option<String>,
    #[serde(default)]
    pub collections: Vec<EngineConfig>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        const MINUTE_MS: u64 = 60 * 1_000;
        const DAY_MS: u64 = 24 * 60 * MINUTE_MS;

        let mut repairs = EngineConfig::new("repairs");
        repairs.cache_max_age_ms = Some(5 * MINUTE_MS);
        let mut quotes = EngineConfig::new("quotes").with_index_field("repairId");
        quotes.cache_max_age_ms = Some(7 * DAY_MS);

        Self {
            version: SETTINGS_SCHEMA_VERSION,
            scope: None,
            storage_prefix: None,
            collections: vec![
                repairs,
                quotes,
                EngineConfig::new("customers"),
                EngineConfig::new("parts").with_index_field("repairId"),
                EngineConfig::new("worklogs").with_index_field("repairId"),
            ],
        }
    }
}

impl SyncSettings {
    /// Load settings from `path`, falling back to the built-in defaults when
    /// the file does not exist.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|error| {
            Error::Config(format!("Failed to read settings at {}: {error}", path.display()))
        })?;
        let mut settings = serde_json::from_str::<Self>(&raw).map_err(|error| {
            Error::Config(format!("Failed to parse settings at {}: {error}", path.display()))
        })?;
        settings.normalize();
        Ok(settings)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                Error::Config(format!(
                    "Failed to create settings directory {}: {error}",
                    parent.display()
                ))
            })?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        let serialized = serde_json::to_string_pretty(&normalized)?;
        std::fs::write(path, serialized).map_err(|error| {
            Error::Config(format!("Failed to write settings at {}: {error}", path.display()))
        })
    }

    /// Explicit value, then `REPAIRSYNC_SCOPE`, then the stored scope.
    pub fn resolve_scope(&self, explicit: Option<&str>) -> String {
        normalize_text_option(explicit.map(str::to_string))
            .or_else(|| normalize_text_option(std::env::var(SCOPE_ENV).ok()))
            .or_else(|| self.scope.clone())
            .unwrap_or_else(default_scope)
    }

    /// Per-collection configs with the document-level scope and prefix
    /// applied.
    pub fn engine_configs(&self, scope: &str) -> Vec<EngineConfig> {
        self.collections
            .iter()
            .cloned()
            .map(|mut config| {
                config.scope = scope.to_string();
                if let Some(prefix) = &self.storage_prefix {
                    config.storage_prefix.clone_from(prefix);
                }
                config
            })
            .collect()
    }

    pub fn collection(&self, kind: &str) -> Option<&EngineConfig> {
        self.collections.iter().find(|config| config.kind == kind)
    }

    /// Validate every collection and reject duplicate kinds.
    pub fn validate(&self) -> Result<()> {
        let mut kinds = HashSet::new();
        for config in &self.collections {
            config.validate()?;
            if !kinds.insert(config.kind.as_str()) {
                return Err(Error::Config(format!(
                    "collection '{}' is configured twice",
                    config.kind
                )));
            }
        }
        Ok(())
    }

    fn normalize(&mut self) {
        self.scope = normalize_text_option(self.scope.take());
        self.storage_prefix = normalize_text_option(self.storage_prefix.take());
        for config in &mut self.collections {
            config.normalize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn engine_config_defaults_from_minimal_json() {
        let config: EngineConfig = serde_json::from_str(r#"{ "kind": "repairs" }"#).unwrap();
        assert_eq!(config, EngineConfig::new("repairs"));
        assert_eq!(config.remote_path(), "repairs");
        assert_eq!(config.resume_epsilon(), Duration::from_secs(2));
        assert_eq!(config.cache_max_age(), None);
        assert_eq!(
            config.cache_keys(),
            CacheKeys {
                records: "repair_tracking_repairs_unknown".to_string(),
                meta: "repair_tracking_repairs_meta_unknown".to_string(),
            }
        );
    }

    #[test]
    fn builders_override_timings() {
        let config = EngineConfig::new("worklogs")
            .with_resume_epsilon(Duration::from_secs(10))
            .with_save_debounce(Duration::from_millis(400))
            .with_cache_max_age(Duration::from_secs(60));
        assert_eq!(config.resume_epsilon_ms, 10_000);
        assert_eq!(config.resume_epsilon(), Duration::from_secs(10));
        assert_eq!(config.save_debounce(), Duration::from_millis(400));
        assert_eq!(config.cache_max_age(), Some(Duration::from_secs(60)));
        assert_eq!(config.min_save_delay(), Duration::from_millis(250));
    }

    #[test]
    fn validate_rejects_bad_configs() {
        assert!(EngineConfig::new(" ").validate().is_err());
        assert!(EngineConfig::new("quotes").with_path("  ").validate().is_err());
        assert!(EngineConfig::new("quotes")
            .with_index_field("repairId")
            .with_index_field("repairId")
            .validate()
            .is_err());
        assert!(EngineConfig::new("quotes")
            .with_index_field("repairId")
            .validate()
            .is_ok());
    }

    #[test]
    fn default_settings_cover_every_collection() {
        let settings = SyncSettings::default();
        settings.validate().unwrap();
        let kinds: Vec<&str> = settings
            .collections
            .iter()
            .map(|config| config.kind.as_str())
            .collect();
        assert_eq!(kinds, vec!["repairs", "quotes", "customers", "parts", "worklogs"]);
        assert_eq!(
            settings.collection("quotes").map(|c| c.index_fields.clone()),
            Some(vec!["repairId".to_string()])
        );
    }

    #[test]
    fn duplicate_kinds_are_rejected() {
        let settings = SyncSettings {
            collections: vec![EngineConfig::new("parts"), EngineConfig::new("parts")],
            ..SyncSettings::default()
        };
        assert!(matches!(settings.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn settings_roundtrip_normalizes_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut settings = SyncSettings {
            scope: Some("  user-1 ".to_string()),
            storage_prefix: Some("   ".to_string()),
            ..SyncSettings::default()
        };
        settings.collections[0].path = Some(" repairs_v2 ".to_string());
        settings.save_to_path(&path).unwrap();

        let loaded = SyncSettings::load_from_path(&path).unwrap();
        assert_eq!(loaded.scope.as_deref(), Some("user-1"));
        assert_eq!(loaded.storage_prefix, None);
        assert_eq!(loaded.collections[0].remote_path(), "repairs_v2");
        assert_eq!(loaded.resolve_scope(Some(" explicit ")), "explicit");
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = SyncSettings::load_from_path(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded, SyncSettings::default());
    }

    #[test]
    fn engine_configs_apply_scope_and_prefix() {
        let settings = SyncSettings {
            storage_prefix: Some("shop_".to_string()),
            ..SyncSettings::default()
        };
        let configs = settings.engine_configs("u42");
        assert!(configs.iter().all(|config| config.scope == "u42"));
        assert_eq!(configs[0].cache_keys().records, "shop_repairs_u42");
    }
}
