// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger rows.
//!
//! Every byte field holds either a public key, a password hash, or
//! ciphertext prepared by a client. None of them can be opened server-side.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::Role;

/// An administrator or client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrincipalRecord {
    pub name: String,
    pub kind: Role,
    pub public_key: Vec<u8>,
    pub group: String,
    /// The group's private key sealed under this principal's public key.
    /// Always `None` in the default group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sealed_group_key: Option<Vec<u8>>,
    pub password_hash: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// A named set of principals sharing a key pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupRecord {
    pub name: String,
    pub kind: Role,
    pub public_key: Vec<u8>,
    /// Private key sealed under the supergroup's public key.
    pub sealed_private_key: Vec<u8>,
    pub builtin: bool,
    pub created_at: DateTime<Utc>,
}

/// A secret's ciphertext. The per-secret key only exists inside wraps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecretRecord {
    pub name: String,
    pub payload: Vec<u8>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Who a wrap is sealed for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "type", content = "name", rename_all = "lowercase")]
pub enum Recipient {
    Principal(String),
    Group(String),
}

impl std::fmt::Display for Recipient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recipient::Principal(name) => write!(f, "principal {name}"),
            Recipient::Group(name) => write!(f, "group {name}"),
        }
    }
}

/// A per-secret key sealed for one recipient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WrapRecord {
    pub secret: String,
    pub recipient: Recipient,
    pub sealed_key: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WrapRecord {
    pub fn new(
        secret: impl Into<String>,
        recipient: Recipient,
        sealed_key: Vec<u8>,
        path: Option<String>,
    ) -> Self {
        Self {
            secret: secret.into(),
            recipient,
            sealed_key,
            path,
            created_at: Utc::now(),
        }
    }
}

/// One secret as delivered to a principal: ciphertext plus a wrap it can open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessibleSecret {
    pub name: String,
    pub payload: Vec<u8>,
    pub sealed_key: Vec<u8>,
    pub path: Option<String>,
    pub via: Recipient,
}

/// Admin view of a secret and the recipients it is wrapped for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretSummary {
    pub name: String,
    pub created_by: String,
    pub recipients: Vec<Recipient>,
}

/// Input to `Ledger::create_secret`.
#[derive(Debug, Clone, Default)]
pub struct NewSecret {
    pub name: String,
    pub payload: Vec<u8>,
    pub super_key: Vec<u8>,
    pub creator_key: Option<Vec<u8>>,
    pub path: Option<String>,
}

/// Input to `Ledger::register_principal`.
#[derive(Debug, Clone)]
pub struct NewPrincipal {
    pub name: String,
    pub kind: Role,
    pub public_key: Vec<u8>,
    pub password_hash: Vec<u8>,
}

/// Key material for the built-in supergroup and an optional first admin.
#[derive(Debug, Clone)]
pub struct Bootstrap {
    pub super_public_key: Vec<u8>,
    pub super_sealed_private_key: Vec<u8>,
    pub admin: Option<BootstrapAdmin>,
}

/// First super-administrator, created with its sealed copy of the supergroup key.
#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub principal: NewPrincipal,
    pub sealed_group_key: Vec<u8>,
}
