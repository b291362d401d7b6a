//! Shared user config file location and loading.

use std::fs;
use std::path::PathBuf;
use std::sync::LazyLock;

use anyhow::{Result, anyhow};

const PROJECT_NAME: &str = env!("CARGO_PKG_NAME");

/// Path to the user config file: `$HOME/.config/mydata-tools.toml`
///
/// Returns `None` if the home directory cannot be determined.
pub static CONFIG_PATH: LazyLock<Option<PathBuf>> = LazyLock::new(|| {
    let home_dir = dirs::home_dir()?;
    Some(home_dir.join(".config").join(format!("{PROJECT_NAME}.toml")))
});

/// Read the user config file contents.
///
/// Returns `None` when the home directory is unknown or the file does not exist,
/// so callers can fall back to their defaults.
///
/// # Errors
/// Returns an error if the config file exists but cannot be read.
pub fn read_user_config() -> Result<Option<String>> {
    let Some(path) = CONFIG_PATH.as_deref() else {
        return Ok(None);
    };

    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(anyhow!("Failed to read config file {}: {error}", path.display())),
    }
}
