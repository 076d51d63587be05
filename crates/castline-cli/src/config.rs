//! CLI configuration
//!
//! Values come from an optional TOML file; command line flags win.
//!
//! ```toml
//! address = "ws://localhost:4455"
//! password = "hunter2"
//! request_timeout_ms = 5000
//! connect_timeout_ms = 3000
//! ```

use anyhow::{Context, Result};
use castline_client::SessionConfig;
use castline_core::{ConnectionTarget, DEFAULT_PRIMARY_ADDRESS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Contents of the config file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub address: Option<String>,
    pub password: Option<String>,
    pub request_timeout_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
}

impl FileConfig {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("Invalid configuration")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("In config file: {}", path.display()))
    }

    /// Load `~/.config/castline/config.toml` if it exists
    pub fn load_default() -> Result<Self> {
        match default_config_file() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }
}

pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("castline").join("config.toml"))
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub address: Option<String>,
    pub password: Option<String>,
    pub timeout_ms: Option<u64>,
}

/// Everything needed to open a session
#[derive(Debug, Clone)]
pub struct Settings {
    pub target: ConnectionTarget,
    pub session: SessionConfig,
}

impl Settings {
    pub fn resolve(file: FileConfig, overrides: Overrides) -> Self {
        let address = overrides.address.or(file.address);
        let password = overrides.password.or(file.password);

        let address = address.as_deref().unwrap_or(DEFAULT_PRIMARY_ADDRESS);
        let target = ConnectionTarget::new(address, password.as_deref());

        let session = SessionConfig {
            request_timeout: overrides
                .timeout_ms
                .or(file.request_timeout_ms)
                .map(Duration::from_millis),
            connect_timeout: file.connect_timeout_ms.map(Duration::from_millis),
        };

        Self { target, session }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_file() {
        let config = FileConfig::parse(
            r#"
            address = "ws://192.168.1.20:4455"
            password = "hunter2"
            request_timeout_ms = 5000
            connect_timeout_ms = 3000
            "#,
        )
        .unwrap();

        assert_eq!(config.address.as_deref(), Some("ws://192.168.1.20:4455"));
        assert_eq!(config.password.as_deref(), Some("hunter2"));
        assert_eq!(config.request_timeout_ms, Some(5000));
        assert_eq!(config.connect_timeout_ms, Some(3000));
    }

    #[test]
    fn test_parse_empty_file() {
        assert_eq!(FileConfig::parse("").unwrap(), FileConfig::default());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(FileConfig::parse("adress = \"ws://localhost:4455\"").is_err());
    }

    #[test]
    fn test_defaults_without_anything() {
        let settings = Settings::resolve(FileConfig::default(), Overrides::default());

        assert_eq!(settings.target.address, DEFAULT_PRIMARY_ADDRESS);
        assert!(settings.target.is_default_primary());
        assert_eq!(settings.target.password, None);
        assert_eq!(settings.session, SessionConfig::default());
    }

    #[test]
    fn test_flags_override_file() {
        let file = FileConfig {
            address: Some("ws://10.0.0.5:4455".to_string()),
            password: Some("from-file".to_string()),
            request_timeout_ms: Some(5000),
            connect_timeout_ms: Some(3000),
        };
        let overrides = Overrides {
            address: None,
            password: Some("from-flag".to_string()),
            timeout_ms: Some(750),
        };

        let settings = Settings::resolve(file, overrides);

        assert_eq!(settings.target.address, "ws://10.0.0.5:4455");
        assert_eq!(settings.target.password.as_deref(), Some("from-flag"));
        assert_eq!(
            settings.session.request_timeout,
            Some(Duration::from_millis(750))
        );
        assert_eq!(
            settings.session.connect_timeout,
            Some(Duration::from_millis(3000))
        );
    }

    #[test]
    fn test_password_without_address_keeps_default() {
        let settings = Settings::resolve(
            FileConfig {
                password: Some("pw".to_string()),
                ..Default::default()
            },
            Overrides::default(),
        );

        assert!(settings.target.is_default_primary());
        assert_eq!(settings.target.password.as_deref(), Some("pw"));
    }
}
