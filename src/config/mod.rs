pub mod merge;
pub mod schema;

pub use schema::*;

use crate::cli::{Cli, Commands};
use crate::error::ConfigError;
use anyhow::Context;
use std::path::Path;

/// Load configuration by merging global, local, and CLI sources.
/// Precedence: CLI > local config > global config > defaults.
///
/// Missing config files are handled gracefully (defaults apply), except an
/// explicitly-passed --config path, which must exist and parse.
pub fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    // Layer 1: Global config (~/.config/drover/drover.toml or platform equivalent)
    let global = load_global_config();

    // Layer 2: Local config (./drover.toml or explicit --config path)
    let local = match cli_config_path(cli) {
        Some(path) => load_required(&path)?,
        None => load_toml_file(Path::new("drover.toml")).unwrap_or_default(),
    };

    // Layer 3: CLI args (converted to PartialConfig)
    let cli_partial = cli_to_partial(cli);

    // Merge: CLI > local > global > defaults
    Ok(cli_partial.with_fallback(local).with_fallback(global).finalize())
}

/// Load global config from the platform-specific config directory.
/// Returns empty PartialConfig if file not found.
fn load_global_config() -> PartialConfig {
    match global_config_path() {
        Some(p) => load_toml_file(&p).unwrap_or_default(),
        None => {
            tracing::debug!("Could not determine global config directory");
            PartialConfig::default()
        }
    }
}

/// Load an explicitly-requested config file. Unlike the search-path
/// layers, a missing or unparseable file here is an error.
fn load_required(path: &Path) -> Result<PartialConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config_file: ConfigFile =
        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    Ok(config_file.to_partial())
}

/// Load and parse a TOML config file into a PartialConfig.
/// Missing files yield None; parse errors are logged and ignored.
fn load_toml_file(path: &Path) -> Option<PartialConfig> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            match toml::from_str::<ConfigFile>(&contents)
                .context(format!("Failed to parse {}", path.display()))
            {
                Ok(config_file) => {
                    tracing::info!("Loaded config from {}", path.display());
                    Some(config_file.to_partial())
                }
                Err(e) => {
                    tracing::warn!("Config parse error: {:#}", e);
                    None
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config file at {}, using defaults", path.display());
            None
        }
        Err(e) => {
            tracing::warn!("Failed to read config at {}: {}", path.display(), e);
            None
        }
    }
}

/// Resolve the platform-specific global config path.
/// Linux: ~/.config/drover/drover.toml
fn global_config_path() -> Option<std::path::PathBuf> {
    directories::ProjectDirs::from("", "", "drover")
        .map(|dirs| dirs.config_dir().join("drover.toml"))
}

/// Explicit --config path from CLI args, if given.
fn cli_config_path(cli: &Cli) -> Option<std::path::PathBuf> {
    match &cli.command {
        Commands::Run { config, .. } => config.clone(),
        Commands::Check { config } => config.clone(),
    }
}

/// Convert CLI arguments to a PartialConfig for merging.
fn cli_to_partial(cli: &Cli) -> PartialConfig {
    match &cli.command {
        Commands::Run {
            model,
            iteration_ceiling,
            adjustment_timeout,
            ..
        } => PartialConfig {
            model: model.clone(),
            iteration_ceiling: *iteration_ceiling,
            adjustment_timeout_secs: *adjustment_timeout,
            ..Default::default()
        },
        Commands::Check { .. } => PartialConfig::default(),
    }
}
