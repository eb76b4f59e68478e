//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let config: ProxyConfig = toml::from_str(&content).map_err(ConfigError::Parse)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{AuthMode, CredentialsConfig, TlsModeConfig};

    #[test]
    fn test_parse_full_config() {
        let toml_src = r#"
            [server]
            bind_address = "127.0.0.1:5000"
            request_timeout_secs = 45

            [auth]
            mode = "basic"
            realm = "bmc-fleet"
            callers = [
                { caller = "telemetry", secret_hash = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08" },
            ]

            [[targets]]
            id = "bmc-42"
            address = "10.1.2.42"
            credentials = { kind = "basic", username = "root", secret = "calvin" }

            [[targets]]
            id = "bmc-43"
            address = "10.1.2.43:8443"
            credentials = { kind = "session", username = "root", secret = "calvin" }
            tls = { mode = "insecure_skip_verify" }
        "#;

        let config: ProxyConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(config.auth.mode, AuthMode::Basic);
        assert_eq!(config.server.request_timeout_secs, 45);
        assert_eq!(config.targets.len(), 2);
        assert!(matches!(
            config.targets[0].credentials,
            CredentialsConfig::Basic { .. }
        ));
        assert_eq!(
            config.targets[1].tls.mode,
            TlsModeConfig::InsecureSkipVerify
        );
        assert!(config.targets[1].enabled);
    }

    #[test]
    fn test_missing_auth_section_is_an_error() {
        let toml_src = r#"
            [server]
            bind_address = "127.0.0.1:5000"
        "#;

        let err = toml::from_str::<ProxyConfig>(toml_src).unwrap_err();
        assert!(err.to_string().contains("auth"));
    }

    #[test]
    fn test_missing_auth_mode_is_an_error() {
        let toml_src = r#"
            [auth]
            realm = "bmc-fleet"
        "#;

        assert!(toml::from_str::<ProxyConfig>(toml_src).is_err());
    }
}
