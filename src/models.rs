// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Wire Messages
//!
//! Request and reply messages exchanged with clients. Every field is optional
//! on the wire; an absent field deserializes to its empty value and the
//! handler decides whether it was required.
//!
//! Binary values (public keys, envelopes) travel as standard base64 strings.
//! Replies are a stream of these objects concatenated back to back.

use base64ct::{Base64, Encoding};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Zero-privilege group every new principal starts in.
pub const DEFAULT_GROUP: &str = "default";

/// Highest-privilege group; its key escrows every other group's private key.
pub const SUPER_GROUP: &str = "super";

/// Names that can never be created, deleted or reused by clients.
pub const RESERVED_NAMES: [&str; 2] = [DEFAULT_GROUP, SUPER_GROUP];

pub fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

// =============================================================================
// Requests
// =============================================================================

/// Login request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct Auth {
    pub name: String,
    pub password: String,
}

/// Secret and group key material.
///
/// Depending on the route this carries a new secret, a wrap for an existing
/// secret, or a group's key pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct Key {
    /// Secret or group name.
    pub name: String,
    /// Secret payload sealed under the per-secret key.
    pub secret: String,
    /// Per-secret key sealed for the supergroup, or for the recipient of a grant.
    pub key: String,
    /// Per-secret key sealed for the creating principal.
    pub user_key: String,
    /// Group public key.
    pub group_pub: String,
    /// Group private key, sealed for the supergroup or for a principal.
    pub group_priv: String,
    /// Optional client-side path metadata.
    pub path: String,
}

/// Principal profile. Also used to register administrators and clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct User {
    pub name: String,
    pub admin: bool,
    pub group: String,
    /// Only ever present in registration requests.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub password: String,
    /// Principal public key.
    pub key: String,
}

// =============================================================================
// Replies
// =============================================================================

/// Plain status message, used for acknowledgements and errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct Response {
    pub string: String,
}

impl Response {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            string: message.into(),
        }
    }
}

/// Admin view of one secret and who it is wrapped for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct Listing {
    pub name: String,
    pub created_by: String,
    pub groups: Vec<String>,
    pub users: Vec<String>,
}

// =============================================================================
// Binary field encoding
// =============================================================================

pub fn encode(bytes: &[u8]) -> String {
    Base64::encode_string(bytes)
}

/// Decode a base64 field. `None` when the text is not valid base64.
pub fn decode(text: &str) -> Option<Vec<u8>> {
    Base64::decode_vec(text).ok()
}
