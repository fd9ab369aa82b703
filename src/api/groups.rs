// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Group endpoints.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use super::{required_bytes, Messages};
use crate::{
    auth::{Caller, Role},
    error::ApiError,
    models::{encode, Key, Response},
    state::AppState,
    storage::GroupRecord,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(default)]
pub struct CreateGroupQuery {
    /// Create an administrator group.
    pub admin: bool,
}

fn public_view(group: &GroupRecord) -> Key {
    Key {
        name: group.name.clone(),
        group_pub: encode(&group.public_key),
        ..Key::default()
    }
}

/// Group names and public keys.
#[utoipa::path(
    get,
    path = "/v1/groups",
    tag = "Groups",
    responses((status = 200, body = [Key]))
)]
pub async fn list_groups(State(state): State<AppState>) -> Result<Messages<Key>, ApiError> {
    let groups = state.ledger.list_groups()?;
    Ok(Messages(groups.iter().map(public_view).collect()))
}

/// A group's public key.
///
/// `groupPriv` holds the group private key sealed for the caller when the
/// caller is a member, or sealed for the supergroup when the caller is a
/// supergroup member. Everyone else only sees the public key.
#[utoipa::path(
    get,
    path = "/v1/groups/{name}",
    params(("name" = String, Path, description = "Group name")),
    tag = "Groups",
    responses((status = 200, body = Key), (status = 404, body = Response))
)]
pub async fn get_group(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(name): Path<String>,
) -> Result<Messages<Key>, ApiError> {
    let group = state.ledger.get_group(&name)?;
    let member = state.ledger.get_principal(&caller.identity.name)?;

    let mut view = public_view(&group);
    if member.group == group.name {
        if let Some(sealed) = &member.sealed_group_key {
            view.group_priv = encode(sealed);
        }
    } else if caller.identity.superuser {
        view.group_priv = encode(&group.sealed_private_key);
    }
    Ok(Messages::one(view))
}

/// Create a group from a client-generated key pair.
///
/// `groupPub` is the public key, `groupPriv` the private key sealed for the
/// supergroup.
#[utoipa::path(
    post,
    path = "/v1/groups",
    params(CreateGroupQuery),
    request_body = Key,
    tag = "Groups",
    responses(
        (status = 200, body = Response),
        (status = 400, body = Response),
        (status = 409, body = Response)
    )
)]
pub async fn create_group(
    State(state): State<AppState>,
    Query(query): Query<CreateGroupQuery>,
    Json(request): Json<Key>,
) -> Result<Messages<Response>, ApiError> {
    let public_key = required_bytes(&request.group_pub, "groupPub")?;
    let sealed_private_key = required_bytes(&request.group_priv, "groupPriv")?;
    let kind = Role::from_admin_flag(query.admin);

    state
        .ledger
        .create_group(&request.name, kind, public_key, sealed_private_key)?;
    Ok(Messages::one(Response::new(format!(
        "group {} created",
        request.name
    ))))
}

#[utoipa::path(
    delete,
    path = "/v1/groups/{name}",
    params(("name" = String, Path, description = "Group name")),
    tag = "Groups",
    responses(
        (status = 200, body = Response),
        (status = 403, description = "Built-in group", body = Response),
        (status = 404, body = Response)
    )
)]
pub async fn delete_group(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Messages<Response>, ApiError> {
    state.ledger.delete_group(&name)?;
    Ok(Messages::one(Response::new(format!("group {name} deleted"))))
}
