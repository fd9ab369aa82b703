// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Request Authorizer
//!
//! Session-MAC authentication and per-route authorization for the HTTP API.
//!
//! ## Auth Flow
//!
//! 1. Client posts `Auth{name, password}` to `/v1/auth` and receives a
//!    `Session-ID` and the first session key in `X-AUTH-KEY`
//! 2. Every later request carries `Session-ID` and
//!    `X-AUTH-MAC = HMAC(key, path_and_query, body)`
//! 3. The authorizer validates the MAC, applies the route's `Policy`, runs the
//!    handler and returns the next key in `X-AUTH-KEY`
//!
//! ## Security
//!
//! - Each key authenticates exactly one request
//! - Session attributes are cached at login; group changes apply at next login
//! - ACL predicates read the ledger's current wraps, not the cached attributes

pub mod error;
pub mod middleware;
pub mod policy;
pub mod roles;

pub use error::AuthError;
pub use middleware::{authorize, Caller, AUTH_KEY_HEADER, AUTH_MAC_HEADER, SESSION_ID_HEADER};
pub use policy::{policy_for, AclRule, Policy};
pub use roles::Role;
