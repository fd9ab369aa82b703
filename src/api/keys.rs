// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Secret endpoints.
//!
//! Every byte field is client-prepared ciphertext. The server only decodes the
//! base64 and stores or returns it.

use axum::{
    extract::{Path, State},
    Extension, Json,
};

use super::{optional_bytes, optional_text, required_bytes, Messages};
use crate::{
    auth::Caller,
    error::ApiError,
    models::{encode, Key, Listing, Response},
    state::AppState,
    storage::{AccessibleSecret, NewSecret, Recipient, SecretSummary},
};

impl From<AccessibleSecret> for Key {
    fn from(secret: AccessibleSecret) -> Self {
        Self {
            name: secret.name,
            secret: encode(&secret.payload),
            key: encode(&secret.sealed_key),
            path: secret.path.unwrap_or_default(),
            ..Key::default()
        }
    }
}

impl From<SecretSummary> for Listing {
    fn from(summary: SecretSummary) -> Self {
        let mut listing = Listing {
            name: summary.name,
            created_by: summary.created_by,
            ..Listing::default()
        };
        for recipient in summary.recipients {
            match recipient {
                Recipient::Group(name) => listing.groups.push(name),
                Recipient::Principal(name) => listing.users.push(name),
            }
        }
        listing
    }
}

/// Every secret the caller can open, one message per wrap.
#[utoipa::path(
    get,
    path = "/v1/keys",
    tag = "Keys",
    responses((status = 200, body = [Key]), (status = 401, body = Response))
)]
pub async fn list_accessible(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<Messages<Key>, ApiError> {
    let secrets = state.ledger.fetch_accessible(&caller.identity.name)?;
    Ok(Messages(secrets.into_iter().map(Key::from).collect()))
}

/// Store a new secret.
///
/// `secret` is the sealed payload, `key` the per-secret key sealed for the
/// supergroup and `userKey` the same key sealed for the caller. `userKey` may
/// only be omitted by supergroup members.
#[utoipa::path(
    post,
    path = "/v1/keys",
    request_body = Key,
    tag = "Keys",
    responses(
        (status = 200, body = Response),
        (status = 400, body = Response),
        (status = 409, body = Response)
    )
)]
pub async fn create_secret(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<Key>,
) -> Result<Messages<Response>, ApiError> {
    let secret = NewSecret {
        payload: required_bytes(&request.secret, "secret")?,
        super_key: required_bytes(&request.key, "key")?,
        creator_key: optional_bytes(&request.user_key, "userKey")?,
        path: optional_text(&request.path),
        name: request.name,
    };
    let name = secret.name.clone();
    state.ledger.create_secret(&caller.identity, secret)?;
    Ok(Messages::one(Response::new(format!("secret {name} created"))))
}

/// One secret, if the caller holds a wrap of it.
#[utoipa::path(
    get,
    path = "/v1/keys/{name}",
    params(("name" = String, Path, description = "Secret name")),
    tag = "Keys",
    responses(
        (status = 200, body = [Key]),
        (status = 403, description = "Caller holds no wrap of this secret", body = Response)
    )
)]
pub async fn fetch_secret(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(name): Path<String>,
) -> Result<Messages<Key>, ApiError> {
    let secrets = state.ledger.fetch_secret(&caller.identity.name, &name)?;
    Ok(Messages(secrets.into_iter().map(Key::from).collect()))
}

#[utoipa::path(
    delete,
    path = "/v1/keys/{name}",
    params(("name" = String, Path, description = "Secret name")),
    tag = "Keys",
    responses((status = 200, body = Response), (status = 404, body = Response))
)]
pub async fn delete_secret(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Messages<Response>, ApiError> {
    state.ledger.delete_secret(&name)?;
    Ok(Messages::one(Response::new(format!("secret {name} deleted"))))
}

/// Grant a group access. `key` is the per-secret key sealed for the group.
#[utoipa::path(
    put,
    path = "/v1/keys/{name}/groups/{group}",
    params(
        ("name" = String, Path, description = "Secret name"),
        ("group" = String, Path, description = "Group name")
    ),
    request_body = Key,
    tag = "Keys",
    responses((status = 200, body = Response), (status = 404, body = Response))
)]
pub async fn assign_to_group(
    State(state): State<AppState>,
    Path((name, group)): Path<(String, String)>,
    Json(request): Json<Key>,
) -> Result<Messages<Response>, ApiError> {
    let sealed_key = required_bytes(&request.key, "key")?;
    state
        .ledger
        .assign_to_group(&name, &group, sealed_key, optional_text(&request.path))?;
    Ok(Messages::one(Response::new(format!(
        "secret {name} granted to group {group}"
    ))))
}

#[utoipa::path(
    delete,
    path = "/v1/keys/{name}/groups/{group}",
    params(
        ("name" = String, Path, description = "Secret name"),
        ("group" = String, Path, description = "Group name")
    ),
    tag = "Keys",
    responses((status = 200, body = Response), (status = 404, body = Response))
)]
pub async fn revoke_from_group(
    State(state): State<AppState>,
    Path((name, group)): Path<(String, String)>,
) -> Result<Messages<Response>, ApiError> {
    state.ledger.revoke_from_group(&name, &group)?;
    Ok(Messages::one(Response::new(format!(
        "secret {name} revoked from group {group}"
    ))))
}

/// Grant one principal access. Any holder of the secret may share it.
#[utoipa::path(
    put,
    path = "/v1/keys/{name}/users/{user}",
    params(
        ("name" = String, Path, description = "Secret name"),
        ("user" = String, Path, description = "Principal name")
    ),
    request_body = Key,
    tag = "Keys",
    responses((status = 200, body = Response), (status = 403, body = Response))
)]
pub async fn assign_to_principal(
    State(state): State<AppState>,
    Path((name, user)): Path<(String, String)>,
    Json(request): Json<Key>,
) -> Result<Messages<Response>, ApiError> {
    let sealed_key = required_bytes(&request.key, "key")?;
    state
        .ledger
        .assign_to_principal(&name, &user, sealed_key, optional_text(&request.path))?;
    Ok(Messages::one(Response::new(format!(
        "secret {name} granted to {user}"
    ))))
}

#[utoipa::path(
    delete,
    path = "/v1/keys/{name}/users/{user}",
    params(
        ("name" = String, Path, description = "Secret name"),
        ("user" = String, Path, description = "Principal name")
    ),
    tag = "Keys",
    responses((status = 200, body = Response), (status = 404, body = Response))
)]
pub async fn revoke_from_principal(
    State(state): State<AppState>,
    Path((name, user)): Path<(String, String)>,
) -> Result<Messages<Response>, ApiError> {
    state.ledger.revoke_from_principal(&name, &user)?;
    Ok(Messages::one(Response::new(format!(
        "secret {name} revoked from {user}"
    ))))
}

/// Every secret and its recipients.
#[utoipa::path(
    get,
    path = "/v1/admin/keys",
    tag = "Keys",
    responses((status = 200, body = [Listing]), (status = 403, body = Response))
)]
pub async fn list_secrets(State(state): State<AppState>) -> Result<Messages<Listing>, ApiError> {
    let summaries = state.ledger.list_secrets()?;
    Ok(Messages(summaries.into_iter().map(Listing::from).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessible_secret_becomes_key_message() {
        let key = Key::from(AccessibleSecret {
            name: "db".into(),
            payload: vec![1, 2, 3],
            sealed_key: vec![4, 5],
            path: None,
            via: Recipient::Group("ops".into()),
        });
        assert_eq!(key.name, "db");
        assert_eq!(key.secret, encode(&[1, 2, 3]));
        assert_eq!(key.key, encode(&[4, 5]));
        assert!(key.path.is_empty());
        assert!(key.user_key.is_empty());
    }

    #[test]
    fn summary_splits_recipients() {
        let listing = Listing::from(SecretSummary {
            name: "db".into(),
            created_by: "admin".into(),
            recipients: vec![
                Recipient::Group("super".into()),
                Recipient::Principal("alice".into()),
                Recipient::Group("ops".into()),
            ],
        });
        assert_eq!(listing.groups, vec!["super", "ops"]);
        assert_eq!(listing.users, vec!["alice"]);
    }
}
