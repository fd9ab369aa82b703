// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-route authorization policies.

use axum::http::Method;

use crate::session::Identity;
use crate::storage::{Ledger, LedgerResult};

/// What the authorizer checks before a handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Policy {
    pub auth_required: bool,
    pub admin_only: bool,
    pub super_only: bool,
    pub acl: Option<AclRule>,
}

impl Policy {
    pub const PUBLIC: Policy = Policy {
        auth_required: false,
        admin_only: false,
        super_only: false,
        acl: None,
    };

    pub const AUTHENTICATED: Policy = Policy {
        auth_required: true,
        ..Policy::PUBLIC
    };

    pub const ADMIN: Policy = Policy {
        admin_only: true,
        ..Policy::AUTHENTICATED
    };

    pub const SUPER: Policy = Policy {
        super_only: true,
        ..Policy::AUTHENTICATED
    };

    pub const fn with_acl(self, rule: AclRule) -> Policy {
        Policy {
            acl: Some(rule),
            ..self
        }
    }
}

/// Access predicates evaluated against the ledger's current relationships.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclRule {
    /// The caller holds a wrap of the secret named in the path.
    SecretReadable,
}

impl AclRule {
    pub fn permits(&self, ledger: &Ledger, caller: &Identity, target: &str) -> LedgerResult<bool> {
        match self {
            AclRule::SecretReadable => ledger.can_read(&caller.name, target),
        }
    }
}

/// Policy for a matched route. Unlisted routes require a session.
pub fn policy_for(method: &Method, route: &str) -> Policy {
    let readable = Policy::AUTHENTICATED.with_acl(AclRule::SecretReadable);

    match (method.as_str(), route) {
        ("POST", "/v1/auth") => Policy::PUBLIC,

        ("GET", "/v1/keys/{name}") => readable,
        ("PUT", "/v1/keys/{name}/users/{user}") => readable,
        ("DELETE", "/v1/keys/{name}") => Policy::ADMIN,
        ("PUT" | "DELETE", "/v1/keys/{name}/groups/{group}") => Policy::ADMIN,
        ("DELETE", "/v1/keys/{name}/users/{user}") => Policy::ADMIN,
        ("GET", "/v1/admin/keys") => Policy::ADMIN,

        ("POST", "/v1/groups") => Policy::SUPER,
        ("DELETE", "/v1/groups/{name}") => Policy::SUPER,

        ("POST", "/v1/users") => Policy::ADMIN,
        ("DELETE", "/v1/users/{name}") => Policy::ADMIN,
        ("PUT", "/v1/users/{name}/group") => Policy::SUPER,

        _ => Policy::AUTHENTICATED,
    }
}
