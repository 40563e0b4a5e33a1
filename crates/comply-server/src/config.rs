//! Server configuration, read from a TOML file.
//!
//! Every section is optional and falls back to its `Default`. Signing keys
//! may be given inline (`[auth] jwt_private_key_pem`) or as file paths
//! under `[keys]`; file paths win.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use comply_auth::AuthConfig;
use comply_core::engagement::InvitePolicy;
use comply_db::DbConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub log_filter: String,
    pub database: DbConfig,
    pub auth: AuthConfig,
    pub keys: KeyFiles,
    pub invites: InvitePolicy,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KeyFiles {
    pub private_key_file: Option<PathBuf>,
    pub public_key_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_filter: "comply=info".into(),
            database: DbConfig::default(),
            auth: AuthConfig::default(),
            keys: KeyFiles::default(),
            invites: InvitePolicy::default(),
        }
    }
}

impl ServerConfig {
    /// Load from `path`, or defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let mut config = Self::parse(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        config.load_keys()?;
        Ok(config)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    fn load_keys(&mut self) -> Result<()> {
        if let Some(path) = &self.keys.private_key_file {
            self.auth.jwt_private_key_pem = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read private key {}", path.display()))?;
        }
        if let Some(path) = &self.keys.public_key_file {
            self.auth.jwt_public_key_pem = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read public key {}", path.display()))?;
        }
        Ok(())
    }
}
