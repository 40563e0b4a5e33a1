//! Authentication configuration.

use std::fmt;

use serde::Deserialize;

/// Deployment environment. The development bypass is never honoured in
/// `Production`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Environment::Development => "development",
            Environment::Test => "test",
            Environment::Production => "production",
        })
    }
}

/// Development bypass settings. Only consulted when the crate is built
/// with the `dev-bypass` feature.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DevBypassConfig {
    /// Hex SHA-256 of the accepted bypass token. `None` disables the path.
    pub token_sha256: Option<String>,
    /// E-mail of the user the bypass signs in as.
    pub user_email: Option<String>,
}

/// Configuration for the authentication service.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// PEM-encoded Ed25519 private key for token signing.
    pub jwt_private_key_pem: String,
    /// PEM-encoded Ed25519 public key for token verification.
    pub jwt_public_key_pem: String,
    /// Session token lifetime in seconds (default: 3600).
    pub session_lifetime_secs: u64,
    /// Token issuer (`iss` claim).
    pub jwt_issuer: String,
    /// Optional pepper prepended to passwords before Argon2id verification.
    pub pepper: Option<String>,
    pub environment: Environment,
    pub dev_bypass: DevBypassConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_private_key_pem: String::new(),
            jwt_public_key_pem: String::new(),
            session_lifetime_secs: 3600,
            jwt_issuer: "comply".into(),
            pepper: None,
            environment: Environment::default(),
            dev_bypass: DevBypassConfig::default(),
        }
    }
}

impl AuthConfig {
    /// Whether the bypass header may be honoured at all.
    pub fn dev_bypass_enabled(&self) -> bool {
        cfg!(feature = "dev-bypass")
            && self.environment != Environment::Production
            && self.dev_bypass.token_sha256.is_some()
    }
}
