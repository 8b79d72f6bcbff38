use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub auth: AuthConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redemption: RedemptionConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}

fn default_port() -> u16 {
    8080
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub method: AuthMethod,
    /// Per-scanner API keys (required when method = "api_keys")
    #[serde(default)]
    pub api_keys: Vec<ScannerKey>,
}

/// A single scanner device credential.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScannerKey {
    /// Identity recorded on every scan performed with this key.
    pub scanner_id: String,
    pub key: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    None,
    ApiKeys,
    // Future: Oidc, MutualTls
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("turnstile.db")
}

/// Redemption behavior configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RedemptionConfig {
    /// Secret for verifying signed QR payloads.
    /// When unset, only opaque-token payloads are accepted.
    #[serde(default)]
    pub signing_secret: Option<String>,
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub auth: SanitizedAuthConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redemption: SanitizedRedemptionConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedAuthConfig {
    pub method: String,
    /// Scanner identities only; the keys themselves are never exposed.
    pub scanner_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedRedemptionConfig {
    pub signing_secret_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            auth: SanitizedAuthConfig {
                method: match config.auth.method {
                    AuthMethod::None => "none".to_string(),
                    AuthMethod::ApiKeys => "api_keys".to_string(),
                },
                scanner_ids: config
                    .auth
                    .api_keys
                    .iter()
                    .map(|k| k.scanner_id.clone())
                    .collect(),
            },
            server: config.server.clone(),
            database: config.database.clone(),
            redemption: SanitizedRedemptionConfig {
                signing_secret_configured: config
                    .redemption
                    .signing_secret
                    .as_ref()
                    .is_some_and(|s| !s.is_empty()),
            },
        }
    }
}
