use crate::error::{Error, Result};
use std::env;
use std::path::PathBuf;

/// Environment variable that points at an alternative rollout.json.
pub const CONFIG_ENV: &str = "ROLLOUT_CONFIG";

/// Base rollout config directory (~/.config/rollout/ on all platforms)
pub fn rollout() -> Result<PathBuf> {
    #[cfg(windows)]
    {
        let appdata = env::var("APPDATA").map_err(|_| {
            Error::internal_unexpected(
                "APPDATA environment variable not set on Windows".to_string(),
            )
        })?;
        Ok(PathBuf::from(appdata).join("rollout"))
    }

    #[cfg(not(windows))]
    {
        let home = env::var("HOME").map_err(|_| {
            Error::internal_unexpected(
                "HOME environment variable not set on Unix-like system".to_string(),
            )
        })?;
        Ok(PathBuf::from(home).join(".config").join("rollout"))
    }
}

/// Global rollout.json config file path
pub fn rollout_json() -> Result<PathBuf> {
    match env::var(CONFIG_ENV) {
        Ok(path) if !path.trim().is_empty() => {
            Ok(PathBuf::from(shellexpand::tilde(&path).to_string()))
        }
        _ => Ok(rollout()?.join("rollout.json")),
    }
}
