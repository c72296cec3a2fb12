use std::path::Path;

use repairsync_core::config::DEFAULT_SCOPE;
use repairsync_core::SyncSettings;

use crate::cli::ConfigCommands;
use crate::error::CliError;
use crate::settings::Context;

pub fn run_config(command: ConfigCommands, context: &Context) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init { force } => {
            let settings = initial_settings(&context.scope);
            run_config_init(&context.config_path, &settings, force)
        }
        ConfigCommands::Show => {
            println!("# {}", context.config_path.display());
            println!("# scope: {}", context.scope);
            println!("{}", serde_json::to_string_pretty(&context.settings)?);
            Ok(())
        }
    }
}

/// Built-in collections, keeping the resolved scope unless it is the
/// placeholder.
pub fn initial_settings(scope: &str) -> SyncSettings {
    SyncSettings {
        scope: (scope != DEFAULT_SCOPE).then(|| scope.to_string()),
        ..SyncSettings::default()
    }
}

pub fn run_config_init(path: &Path, settings: &SyncSettings, force: bool) -> Result<(), CliError> {
    if path.exists() && !force {
        return Err(CliError::SettingsExist(path.to_path_buf()));
    }
    settings.validate()?;
    settings.save_to_path(path)?;
    println!(
        "Settings with {} collection(s) written to {}",
        settings.collections.len(),
        path.display()
    );
    Ok(())
}
