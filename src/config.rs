// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment once at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Directory holding `ledger.redb` | `/data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `SESSION_IDLE_TIMEOUT_SECS` | Idle time before a session expires | `300` |
//! | `SESSION_SWEEP_INTERVAL_SECS` | Period of the expired-session sweep | `60` |
//! | `CREDENTIAL_LOOKUP_TIMEOUT_SECS` | Credential lookup timeout | `5` |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | PEM files; HTTPS when both are set | unset |
//! | `SUPER_GROUP_PUBLIC_KEY` | Base64 supergroup public key (first start) | unset |
//! | `SUPER_GROUP_SEALED_KEY` | Base64 supergroup private key, sealed by its creator | unset |
//! | `BOOTSTRAP_ADMIN_NAME` | First super-administrator | unset |
//! | `BOOTSTRAP_ADMIN_PASSWORD` | Its password | unset |
//! | `BOOTSTRAP_ADMIN_PUBLIC_KEY` | Its base64 public key | unset |
//! | `BOOTSTRAP_ADMIN_GROUP_KEY` | Supergroup private key sealed for it | unset |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;
use zeroize::Zeroizing;

use crate::auth::Role;
use crate::crypto::{hash_password, CryptoResult};
use crate::models::decode;
use crate::session::SessionConfig;
use crate::storage::{paths::DATA_ROOT, Bootstrap, BootstrapAdmin, NewPrincipal};

/// Environment variable name for the data directory path.
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const SESSION_IDLE_TIMEOUT_ENV: &str = "SESSION_IDLE_TIMEOUT_SECS";
pub const SESSION_SWEEP_INTERVAL_ENV: &str = "SESSION_SWEEP_INTERVAL_SECS";
pub const CREDENTIAL_LOOKUP_TIMEOUT_ENV: &str = "CREDENTIAL_LOOKUP_TIMEOUT_SECS";
pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";
pub const SUPER_GROUP_PUBLIC_KEY_ENV: &str = "SUPER_GROUP_PUBLIC_KEY";
pub const SUPER_GROUP_SEALED_KEY_ENV: &str = "SUPER_GROUP_SEALED_KEY";
pub const BOOTSTRAP_ADMIN_NAME_ENV: &str = "BOOTSTRAP_ADMIN_NAME";
pub const BOOTSTRAP_ADMIN_PASSWORD_ENV: &str = "BOOTSTRAP_ADMIN_PASSWORD";
pub const BOOTSTRAP_ADMIN_PUBLIC_KEY_ENV: &str = "BOOTSTRAP_ADMIN_PUBLIC_KEY";
pub const BOOTSTRAP_ADMIN_GROUP_KEY_ENV: &str = "BOOTSTRAP_ADMIN_GROUP_KEY";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be base64")]
    NotBase64(&'static str),

    #[error("{0} is required when {1} is set")]
    Missing(&'static str, &'static str),
}

/// Certificate and key for HTTPS.
#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// First super-administrator, created on first start.
pub struct AdminSettings {
    pub name: String,
    pub password: Zeroizing<String>,
    pub public_key: Vec<u8>,
    pub group_key: Vec<u8>,
}

impl std::fmt::Debug for AdminSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminSettings")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Supergroup key material supplied by the operator.
#[derive(Debug)]
pub struct BootstrapSettings {
    pub super_public_key: Vec<u8>,
    pub super_sealed_key: Vec<u8>,
    pub admin: Option<AdminSettings>,
}

impl BootstrapSettings {
    /// Hash the admin password and build the ledger bootstrap input.
    pub fn into_bootstrap(self) -> CryptoResult<Bootstrap> {
        let admin = match self.admin {
            Some(admin) => Some(BootstrapAdmin {
                principal: NewPrincipal {
                    name: admin.name,
                    kind: Role::Admin,
                    public_key: admin.public_key,
                    password_hash: hash_password(admin.password.as_bytes())?,
                },
                sealed_group_key: admin.group_key,
            }),
            None => None,
        };
        Ok(Bootstrap {
            super_public_key: self.super_public_key,
            super_sealed_private_key: self.super_sealed_key,
            admin,
        })
    }
}

#[derive(Debug)]
pub struct Config {
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub session: SessionConfig,
    pub tls: Option<TlsPaths>,
    pub bootstrap: Option<BootstrapSettings>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let defaults = SessionConfig::default();
        let session = SessionConfig {
            idle_timeout: seconds(&var, SESSION_IDLE_TIMEOUT_ENV, defaults.idle_timeout),
            sweep_interval: seconds(&var, SESSION_SWEEP_INTERVAL_ENV, defaults.sweep_interval),
            lookup_timeout: seconds(&var, CREDENTIAL_LOOKUP_TIMEOUT_ENV, defaults.lookup_timeout),
        };

        let port = match var(PORT_ENV) {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!(value = %raw, default = DEFAULT_PORT, "Invalid PORT, using default");
                DEFAULT_PORT
            }),
            None => DEFAULT_PORT,
        };

        let tls = match (var(TLS_CERT_PATH_ENV), var(TLS_KEY_PATH_ENV)) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            (Some(_), None) => return Err(ConfigError::Missing(TLS_KEY_PATH_ENV, TLS_CERT_PATH_ENV)),
            (None, Some(_)) => return Err(ConfigError::Missing(TLS_CERT_PATH_ENV, TLS_KEY_PATH_ENV)),
            (None, None) => None,
        };

        Ok(Self {
            data_dir: var(DATA_DIR_ENV).unwrap_or_else(|| DATA_ROOT.to_string()).into(),
            host: var(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            session,
            tls,
            bootstrap: bootstrap_settings(&var)?,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn seconds(var: &impl Fn(&str) -> Option<String>, name: &'static str, default: Duration) -> Duration {
    let Some(raw) = var(name) else {
        return default;
    };
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Duration::from_secs(secs),
        _ => {
            warn!(variable = name, value = %raw, default_secs = default.as_secs(), "Invalid duration, using default");
            default
        }
    }
}

fn base64_var(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<Vec<u8>>, ConfigError> {
    match var(name) {
        Some(raw) => decode(raw.trim())
            .map(Some)
            .ok_or(ConfigError::NotBase64(name)),
        None => Ok(None),
    }
}

fn bootstrap_settings(
    var: &impl Fn(&str) -> Option<String>,
) -> Result<Option<BootstrapSettings>, ConfigError> {
    let Some(super_public_key) = base64_var(var, SUPER_GROUP_PUBLIC_KEY_ENV)? else {
        return Ok(None);
    };
    let super_sealed_key = base64_var(var, SUPER_GROUP_SEALED_KEY_ENV)?.ok_or(
        ConfigError::Missing(SUPER_GROUP_SEALED_KEY_ENV, SUPER_GROUP_PUBLIC_KEY_ENV),
    )?;

    let admin = match var(BOOTSTRAP_ADMIN_NAME_ENV) {
        Some(name) => {
            let password = var(BOOTSTRAP_ADMIN_PASSWORD_ENV).ok_or(ConfigError::Missing(
                BOOTSTRAP_ADMIN_PASSWORD_ENV,
                BOOTSTRAP_ADMIN_NAME_ENV,
            ))?;
            let public_key = base64_var(var, BOOTSTRAP_ADMIN_PUBLIC_KEY_ENV)?.ok_or(
                ConfigError::Missing(BOOTSTRAP_ADMIN_PUBLIC_KEY_ENV, BOOTSTRAP_ADMIN_NAME_ENV),
            )?;
            let group_key = base64_var(var, BOOTSTRAP_ADMIN_GROUP_KEY_ENV)?.ok_or(
                ConfigError::Missing(BOOTSTRAP_ADMIN_GROUP_KEY_ENV, BOOTSTRAP_ADMIN_NAME_ENV),
            )?;
            Some(AdminSettings {
                name,
                password: Zeroizing::new(password),
                public_key,
                group_key,
            })
        }
        None => None,
    };

    Ok(Some(BootstrapSettings {
        super_public_key,
        super_sealed_key,
        admin,
    }))
}
