//! Configuration validation logic.

use crate::config::schema::{AuthMode, ProxyConfig, TlsModeConfig};
use std::collections::HashSet;

/// Error type for configuration validation failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Validation error: {}", self.0)
    }
}

/// Validate a ProxyConfig for semantic correctness.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    // 1. Target ids must be unique and usable as a path segment
    let mut seen: HashSet<&str> = HashSet::new();
    for target in &config.targets {
        if target.id.is_empty() {
            errors.push(ValidationError("target id must not be empty".to_string()));
        }
        if target.id.contains('/') || target.id.contains('?') || target.id.contains('#') {
            errors.push(ValidationError(format!(
                "target '{}' id contains characters not usable in a path segment",
                target.id
            )));
        }
        if !seen.insert(target.id.as_str()) {
            errors.push(ValidationError(format!(
                "duplicate target id '{}'",
                target.id
            )));
        }
        if target.address.is_empty() {
            errors.push(ValidationError(format!(
                "target '{}' has an empty address",
                target.id
            )));
        }

        // 2. TLS mode / material cross-checks
        match target.tls.mode {
            TlsModeConfig::CustomCa if target.tls.ca_bundle.is_none() => {
                errors.push(ValidationError(format!(
                    "target '{}' uses custom_ca but sets no ca_bundle",
                    target.id
                )));
            }
            _ => {}
        }
        if target.tls.client_cert.is_some() != target.tls.client_key.is_some() {
            errors.push(ValidationError(format!(
                "target '{}' must set client_cert and client_key together",
                target.id
            )));
        }
    }

    // 3. Auth mode parameters
    match config.auth.mode {
        AuthMode::Basic => {
            if config.auth.callers.is_empty() {
                errors.push(ValidationError(
                    "auth.mode = basic requires at least one caller".to_string(),
                ));
            }
            for caller in &config.auth.callers {
                if caller.secret_hash.len() != 64
                    || !caller.secret_hash.bytes().all(|b| b.is_ascii_hexdigit())
                {
                    errors.push(ValidationError(format!(
                        "caller '{}' secret_hash is not a hex-encoded SHA-256",
                        caller.caller
                    )));
                }
            }
        }
        AuthMode::HeaderDelegation => {
            if config.auth.trusted_header.is_empty() {
                errors.push(ValidationError(
                    "auth.mode = header_delegation requires trusted_header".to_string(),
                ));
            }
        }
        AuthMode::None => {
            tracing::warn!("front-side authentication is disabled (auth.mode = none)");
        }
        AuthMode::MutualTls => {}
    }

    // 4. Admin surface
    if config.admin.enabled && config.admin.api_key.is_empty() {
        errors.push(ValidationError(
            "admin.enabled requires a non-empty admin.api_key".to_string(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::*;

    fn target(id: &str) -> TargetConfig {
        TargetConfig {
            id: id.into(),
            address: "10.0.0.1".into(),
            scheme: UpstreamScheme::Https,
            enabled: true,
            credentials: CredentialsConfig::Basic {
                username: "root".into(),
                secret: "calvin".into(),
            },
            tls: TargetTlsConfig::default(),
            timeouts: TargetTimeoutConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let mut config = ProxyConfig::default();
        config.targets.push(target("bmc-1"));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_duplicate_target_id() {
        let mut config = ProxyConfig::default();
        config.targets.push(target("bmc-1"));
        config.targets.push(target("bmc-1"));

        let errs = validate_config(&config).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert!(errs[0].0.contains("duplicate target id 'bmc-1'"));
    }

    #[test]
    fn test_id_with_slash_rejected() {
        let mut config = ProxyConfig::default();
        config.targets.push(target("rack/bmc"));

        let errs = validate_config(&config).unwrap_err();
        assert!(errs[0].0.contains("path segment"));
    }

    #[test]
    fn test_custom_ca_requires_bundle() {
        let mut config = ProxyConfig::default();
        let mut t = target("bmc-1");
        t.tls.mode = TlsModeConfig::CustomCa;
        config.targets.push(t);

        let errs = validate_config(&config).unwrap_err();
        assert!(errs[0].0.contains("ca_bundle"));
    }

    #[test]
    fn test_basic_mode_requires_callers() {
        let mut config = ProxyConfig::default();
        config.auth.mode = AuthMode::Basic;

        let errs = validate_config(&config).unwrap_err();
        assert!(errs[0].0.contains("at least one caller"));
    }

    #[test]
    fn test_basic_mode_rejects_bad_hash() {
        let mut config = ProxyConfig::default();
        config.auth.mode = AuthMode::Basic;
        config.auth.callers.push(CallerConfig {
            caller: "admin".into(),
            secret_hash: "not-hex".into(),
        });

        let errs = validate_config(&config).unwrap_err();
        assert!(errs[0].0.contains("hex-encoded SHA-256"));
    }
}
