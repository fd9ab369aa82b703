// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Principal and group kinds.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Kind of a principal or group.
///
/// ## Role Hierarchy
///
/// - `Admin` - Manages principals, grants and revocations
/// - `Client` - Holds and fetches the secrets granted to it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Administrator
    Admin,
    /// Client principal (service, host, or user)
    Client,
}

impl Role {
    pub fn from_admin_flag(admin: bool) -> Self {
        if admin {
            Role::Admin
        } else {
            Role::Client
        }
    }

    pub fn is_admin(&self) -> bool {
        *self == Role::Admin
    }
}

impl Default for Role {
    /// Default role is Client (least privilege).
    fn default() -> Self {
        Role::Client
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Client => write!(f, "client"),
        }
    }
}
