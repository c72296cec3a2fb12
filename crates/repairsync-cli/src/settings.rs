//! Settings file and cache directory resolution.

use std::env;
use std::path::PathBuf;

use repairsync_core::{EngineConfig, SyncSettings};

use crate::error::CliError;

const APP_DIR: &str = "repairsync";
const CONFIG_FILE_NAME: &str = "config.json";
const CACHE_DIR_NAME: &str = "cache";

/// Overrides the settings file location.
pub const CONFIG_ENV: &str = "REPAIRSYNC_CONFIG";
/// Overrides the cache directory.
pub const CACHE_DIR_ENV: &str = "REPAIRSYNC_CACHE_DIR";

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join(CONFIG_FILE_NAME)
}

pub fn default_cache_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::cache_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join(CACHE_DIR_NAME)
}

pub fn resolve_config_path(cli_path: Option<PathBuf>) -> PathBuf {
    cli_path
        .or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(default_config_path)
}

pub fn resolve_cache_dir(cli_dir: Option<PathBuf>) -> PathBuf {
    cli_dir
        .or_else(|| env::var_os(CACHE_DIR_ENV).map(PathBuf::from))
        .unwrap_or_else(default_cache_dir)
}

/// Everything a command needs to know about where things live.
#[derive(Debug, Clone)]
pub struct Context {
    pub config_path: PathBuf,
    pub cache_dir: PathBuf,
    pub settings: SyncSettings,
    pub scope: String,
}

impl Context {
    pub fn load(
        config_path: PathBuf,
        cache_dir: PathBuf,
        scope: Option<&str>,
    ) -> Result<Self, CliError> {
        let settings = SyncSettings::load_from_path(&config_path)?;
        settings.validate()?;
        let scope = settings.resolve_scope(scope);
        tracing::debug!(
            config = %config_path.display(),
            cache_dir = %cache_dir.display(),
            scope = %scope,
            "Resolved CLI context"
        );
        Ok(Self {
            config_path,
            cache_dir,
            settings,
            scope,
        })
    }

    /// Engine configs for every collection, or just `kind` when given.
    pub fn engine_configs(&self, kind: Option<&str>) -> Result<Vec<EngineConfig>, CliError> {
        select_configs(self.settings.engine_configs(&self.scope), kind)
    }
}

pub fn select_configs(
    configs: Vec<EngineConfig>,
    kind: Option<&str>,
) -> Result<Vec<EngineConfig>, CliError> {
    let Some(kind) = kind.map(str::trim).filter(|kind| !kind.is_empty()) else {
        return Ok(configs);
    };
    let selected: Vec<EngineConfig> = configs
        .into_iter()
        .filter(|config| config.kind == kind)
        .collect();
    if selected.is_empty() {
        return Err(repairsync_core::Error::UnknownCollection(kind.to_string()).into());
    }
    Ok(selected)
}
