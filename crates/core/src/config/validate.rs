use super::{types::Config, AuthMethod, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Auth section exists (enforced by serde)
/// - Server port is not 0
/// - api_keys method carries at least one usable credential
/// - Signing secret, when set, is not empty
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    // Auth validation
    if matches!(config.auth.method, AuthMethod::ApiKeys) {
        if config.auth.api_keys.is_empty() {
            return Err(ConfigError::ValidationError(
                "auth.api_keys must list at least one key when method = \"api_keys\"".to_string(),
            ));
        }
        for entry in &config.auth.api_keys {
            if entry.scanner_id.trim().is_empty() || entry.key.is_empty() {
                return Err(ConfigError::ValidationError(
                    "auth.api_keys entries need a non-empty scanner_id and key".to_string(),
                ));
            }
        }
    }

    // Redemption validation
    if let Some(ref secret) = config.redemption.signing_secret {
        if secret.is_empty() {
            return Err(ConfigError::ValidationError(
                "redemption.signing_secret cannot be empty when set".to_string(),
            ));
        }
    }

    Ok(())
}
