// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session endpoints.

use axum::{extract::State, response::IntoResponse, Extension, Json};
use zeroize::Zeroizing;

use super::Messages;
use crate::{
    auth::{Caller, AUTH_KEY_HEADER, SESSION_ID_HEADER},
    error::ApiError,
    models::{encode, Auth, Response},
    state::AppState,
};

/// Open a session.
///
/// The reply carries the session id in `Session-ID` and the first session key
/// in `X-AUTH-KEY`. Unknown principals and wrong passwords are reported
/// identically.
#[utoipa::path(
    post,
    path = "/v1/auth",
    request_body = Auth,
    tag = "Session",
    responses(
        (status = 200, description = "Session opened", body = Response),
        (status = 400, description = "Name or password missing", body = Response),
        (status = 401, description = "Authentication failed", body = Response),
        (status = 503, description = "Credential lookup unavailable", body = Response)
    )
)]
pub async fn authenticate(
    State(state): State<AppState>,
    Json(request): Json<Auth>,
) -> Result<impl IntoResponse, ApiError> {
    if request.name.is_empty() || request.password.is_empty() {
        return Err(ApiError::bad_request("name and password are required"));
    }

    let password = Zeroizing::new(request.password.into_bytes());
    let session = state
        .sessions
        .authenticate(&request.name, &password, &state.ledger)
        .await?;

    let headers = [
        (SESSION_ID_HEADER, session.id.to_string()),
        (AUTH_KEY_HEADER, encode(session.key.as_bytes())),
    ];
    Ok((headers, Messages::one(Response::new("authenticated"))))
}

/// Close the caller's session immediately.
#[utoipa::path(
    post,
    path = "/v1/logout",
    tag = "Session",
    responses((status = 200, body = Response), (status = 401, body = Response))
)]
pub async fn logout(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Messages<Response> {
    state.sessions.logout(caller.session_id);
    Messages::one(Response::new("logged out"))
}
