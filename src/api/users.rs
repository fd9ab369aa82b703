// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Principal endpoints.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use tracing::error;
use zeroize::Zeroizing;

use super::{optional_bytes, required_bytes, Messages};
use crate::{
    auth::{Caller, Role},
    crypto::hash_password,
    error::ApiError,
    models::{encode, Key, Response, User},
    state::AppState,
    storage::{validate_name, NewPrincipal, PrincipalRecord},
};

impl From<PrincipalRecord> for User {
    fn from(record: PrincipalRecord) -> Self {
        Self {
            name: record.name,
            admin: record.kind.is_admin(),
            group: record.group,
            password: String::new(),
            key: encode(&record.public_key),
        }
    }
}

/// Register an administrator or client. New principals join `default`.
#[utoipa::path(
    post,
    path = "/v1/users",
    request_body = User,
    tag = "Users",
    responses(
        (status = 200, body = Response),
        (status = 400, body = Response),
        (status = 409, body = Response)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<User>,
) -> Result<Messages<Response>, ApiError> {
    validate_name("principal", &request.name)?;
    if request.password.is_empty() {
        return Err(ApiError::bad_request("password is required"));
    }
    let public_key = required_bytes(&request.key, "key")?;

    let password = Zeroizing::new(request.password.into_bytes());
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| {
            error!(error = %e, "Password hashing task failed");
            ApiError::internal()
        })??;

    let kind = Role::from_admin_flag(request.admin);
    state.ledger.register_principal(NewPrincipal {
        name: request.name.clone(),
        kind,
        public_key,
        password_hash,
    })?;
    Ok(Messages::one(Response::new(format!(
        "{kind} {} registered",
        request.name
    ))))
}

/// A principal's profile and public key.
#[utoipa::path(
    get,
    path = "/v1/users/{name}",
    params(("name" = String, Path, description = "Principal name")),
    tag = "Users",
    responses((status = 200, body = User), (status = 404, body = Response))
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Messages<User>, ApiError> {
    let record = state.ledger.get_principal(&name)?;
    Ok(Messages::one(User::from(record)))
}

/// Delete a principal and its direct wraps. Callers cannot delete themselves.
#[utoipa::path(
    delete,
    path = "/v1/users/{name}",
    params(("name" = String, Path, description = "Principal name")),
    tag = "Users",
    responses(
        (status = 200, body = Response),
        (status = 403, body = Response),
        (status = 404, body = Response)
    )
)]
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(name): Path<String>,
) -> Result<Messages<Response>, ApiError> {
    if caller.identity.name == name {
        return Err(ApiError::forbidden("principals cannot delete themselves"));
    }
    state.ledger.delete_principal(&name)?;
    Ok(Messages::one(Response::new(format!("{name} deleted"))))
}

/// Move a principal to another group.
///
/// `name` is the target group and `groupPriv` the group private key sealed
/// for the principal. `groupPriv` is ignored for `default`.
#[utoipa::path(
    put,
    path = "/v1/users/{name}/group",
    params(("name" = String, Path, description = "Principal name")),
    request_body = Key,
    tag = "Users",
    responses(
        (status = 200, body = Response),
        (status = 400, body = Response),
        (status = 404, body = Response)
    )
)]
pub async fn reassign(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<Key>,
) -> Result<Messages<Response>, ApiError> {
    if request.name.is_empty() {
        return Err(ApiError::bad_request("group name is required"));
    }
    let sealed_group_key = optional_bytes(&request.group_priv, "groupPriv")?;
    state
        .ledger
        .reassign_principal(&name, &request.name, sealed_group_key)?;
    Ok(Messages::one(Response::new(format!(
        "{name} moved to group {}",
        request.name
    ))))
}
