pub use tm_core::config::*;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Default config locations, in lookup order.
pub const DEFAULT_PATHS: &[&str] = &["./trackmix.toml", "~/.config/trackmix/config.toml"];

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    expand_paths(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    for path_str in DEFAULT_PATHS {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file: {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Expand `~` in every configured path.
fn expand_paths(config: &mut Config) {
    for path in [
        &mut config.tools.ffprobe_path,
        &mut config.tools.mkvmerge_path,
        &mut config.queue.state_path,
    ]
    .into_iter()
    .flatten()
    {
        *path = expand(path);
    }
}

fn expand(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref())
}

/// Validate configuration
fn validate_config(config: &Config) -> Result<()> {
    let warnings = config.validate()?;
    for warning in warnings {
        tracing::warn!("{}", warning);
    }
    Ok(())
}
