// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Credential lookup capability injected into the session manager.

use std::future::Future;

use super::Identity;

/// What the verifier knows about a principal.
///
/// The session manager only ever sees the password hash, never a stored
/// password.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub name: String,
    pub group: String,
    pub admin: bool,
    pub password_hash: Vec<u8>,
}

impl Credentials {
    pub fn identity(&self) -> Identity {
        Identity::new(self.name.clone(), self.group.clone(), self.admin)
    }
}

/// Looks up a principal's credentials by name.
///
/// `Ok(None)` means the principal does not exist. `Err` means the lookup
/// itself failed and the caller may retry.
pub trait CredentialVerifier: Send + Sync {
    type Error: std::fmt::Display + Send;

    fn lookup(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<Credentials>, Self::Error>> + Send;
}
