// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Session Manager
//!
//! Challenge-response sessions with a symmetric key that rotates on every
//! authenticated round trip.
//!
//! ## Lifecycle
//!
//! ```text
//! Unauthenticated --authenticate--> Active(K0) --request--> Active(K1) --> ...
//!                                      |
//!                     idle timeout / sweep / logout
//!                                      v
//!                                   Removed
//! ```
//!
//! A successful `validate` retires the current key immediately. Until
//! `next_key` installs its successor, no other request on the same session can
//! be validated, so rotations within one session are strictly ordered.

pub mod credentials;
pub mod manager;
pub mod sweeper;

pub use credentials::{CredentialVerifier, Credentials};
pub use manager::{NewSession, SessionConfig, SessionId, SessionKey, SessionManager};
pub use sweeper::SessionSweeper;

use serde::Serialize;

use crate::models::SUPER_GROUP;

/// Attributes of the authenticated principal, cached for the session's life.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub name: String,
    pub group: String,
    pub admin: bool,
    pub superuser: bool,
}

impl Identity {
    pub fn new(name: impl Into<String>, group: impl Into<String>, admin: bool) -> Self {
        let group = group.into();
        let superuser = group == SUPER_GROUP;
        Self {
            name: name.into(),
            group,
            admin,
            superuser,
        }
    }
}

/// Session failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Unknown principal or wrong password. Deliberately indistinguishable.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Unknown session, expired session, or MAC mismatch.
    #[error("session invalid")]
    SessionInvalid,

    /// The credential verifier timed out or failed. Safe to retry.
    #[error("credential verifier unavailable")]
    CredentialsUnavailable,
}

pub type SessionResult<T> = Result<T, SessionError>;
