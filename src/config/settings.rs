//! Application settings
//!
//! Defines the openssl binary location and prompting behavior. Settings are
//! optional: defaults always work, and a TOML file (given explicitly with
//! `--config` or via `CERTKIT_CONFIG`) can override them.

use crate::error::{EngineError, Result};
use serde::Deserialize;
use std::path::Path;

/// Runtime settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// openssl binary to drive; resolved through PATH when not absolute.
    #[serde(default = "default_openssl_path")]
    pub openssl_path: String,

    /// How many times to re-prompt for a rejected PKCS#12 password.
    #[serde(default = "default_prompt_attempts")]
    pub password_prompt_attempts: u32,
}

fn default_openssl_path() -> String {
    "openssl".to_string()
}

fn default_prompt_attempts() -> u32 {
    3
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            openssl_path: default_openssl_path(),
            password_prompt_attempts: default_prompt_attempts(),
        }
    }
}

impl Settings {
    /// Load settings from `CERTKIT_CONFIG` when set, else defaults.
    pub fn load_default() -> Result<Self> {
        match std::env::var_os("CERTKIT_CONFIG") {
            Some(path) => Self::load_from_file(Path::new(&path)),
            None => Ok(Settings::default()),
        }
    }

    /// Load settings from a specific TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| EngineError::Parse(format!("invalid config {}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.openssl_path, "openssl");
        assert_eq!(settings.password_prompt_attempts, 3);
    }

    #[test]
    fn test_load_from_file_with_partial_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "openssl_path = \"/opt/openssl/bin/openssl\"").unwrap();

        let settings = Settings::load_from_file(file.path()).unwrap();
        assert_eq!(settings.openssl_path, "/opt/openssl/bin/openssl");
        assert_eq!(settings.password_prompt_attempts, 3);
    }

    #[test]
    fn test_load_rejects_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "openssl_path = [not toml").unwrap();
        assert!(Settings::load_from_file(file.path()).is_err());
    }
}
