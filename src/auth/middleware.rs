// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request authorizer middleware for Axum.
//!
//! Installed with `route_layer`, so the matched route is known and its
//! `Policy` can be looked up. For routes that require a session:
//!
//! 1. `Session-ID` and `X-AUTH-MAC` are read and the MAC is checked against the
//!    session's current key over `(path_and_query, body)`
//! 2. Role flags and the route's ACL predicate are evaluated
//! 3. The handler runs with a [`Caller`] extension
//! 4. The session key is rotated and returned in `X-AUTH-KEY`
//!
//! Once a MAC has been accepted the key is always rotated, so a 403 still
//! hands the client its next key.

use axum::{
    body::{to_bytes, Body},
    extract::{MatchedPath, RawPathParams, Request, State},
    http::{request::Parts, HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, error, info};

use super::policy::{policy_for, Policy};
use super::AuthError;
use crate::models;
use crate::session::{Identity, SessionId, SessionManager};
use crate::state::AppState;
use crate::storage::Ledger;

pub const SESSION_ID_HEADER: HeaderName = HeaderName::from_static("session-id");
pub const AUTH_MAC_HEADER: HeaderName = HeaderName::from_static("x-auth-mac");
pub const AUTH_KEY_HEADER: HeaderName = HeaderName::from_static("x-auth-key");

/// Largest request body the authorizer will buffer for MAC verification.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// The authenticated session behind a request.
#[derive(Debug, Clone)]
pub struct Caller {
    pub session_id: SessionId,
    pub identity: Identity,
}

/// Authorization middleware function.
pub async fn authorize(
    State(state): State<AppState>,
    matched: MatchedPath,
    params: RawPathParams,
    request: Request,
    next: Next,
) -> Response {
    let policy = policy_for(request.method(), matched.as_str());
    if !policy.auth_required {
        return next.run(request).await;
    }

    let (mut parts, body) = request.into_parts();
    let (session_id, identity, body) = match authenticate(&state.sessions, &parts, body).await {
        Ok(authenticated) => authenticated,
        Err(e) => {
            debug!(route = matched.as_str(), code = e.error_code(), "Request not authenticated");
            return e.into_response();
        }
    };

    let response = match permit(&state.ledger, &policy, &identity, &params) {
        Ok(()) => {
            parts.extensions.insert(Caller {
                session_id,
                identity,
            });
            next.run(Request::from_parts(parts, Body::from(body))).await
        }
        Err(e) => {
            info!(
                principal = %identity.name,
                route = matched.as_str(),
                code = e.error_code(),
                "Request denied"
            );
            e.into_response()
        }
    };

    rotate_key(&state.sessions, session_id, response)
}

/// Parse the session id header.
pub fn session_id_from(headers: &HeaderMap) -> Result<SessionId, AuthError> {
    let value = headers
        .get(&SESSION_ID_HEADER)
        .ok_or(AuthError::MissingSession)?;
    value
        .to_str()
        .ok()
        .and_then(|s| s.trim().parse::<SessionId>().ok())
        .ok_or(AuthError::InvalidSessionHeader)
}

fn mac_from(headers: &HeaderMap) -> Result<Vec<u8>, AuthError> {
    headers
        .get(&AUTH_MAC_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| models::decode(s.trim()))
        .ok_or(AuthError::InvalidMac)
}

/// Validate the MAC and hand back the buffered body for the handler.
async fn authenticate(
    sessions: &SessionManager,
    parts: &Parts,
    body: Body,
) -> Result<(SessionId, Identity, axum::body::Bytes), AuthError> {
    let session_id = session_id_from(&parts.headers)?;
    let mac = mac_from(&parts.headers)?;
    let body = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| AuthError::InvalidBody)?;

    let context = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| parts.uri.path());
    let identity = sessions.validate(session_id, &mac, context.as_bytes(), &body)?;
    Ok((session_id, identity, body))
}

fn permit(
    ledger: &Ledger,
    policy: &Policy,
    caller: &Identity,
    params: &RawPathParams,
) -> Result<(), AuthError> {
    if policy.admin_only && !caller.admin {
        return Err(AuthError::AdminRequired);
    }
    if policy.super_only && !caller.superuser {
        return Err(AuthError::SuperRequired);
    }
    if let Some(rule) = policy.acl {
        let target = params
            .iter()
            .find(|(key, _)| *key == "name")
            .map(|(_, value)| value)
            .ok_or(AuthError::AccessDenied)?;
        match rule.permits(ledger, caller, target) {
            Ok(true) => {}
            Ok(false) => return Err(AuthError::AccessDenied),
            Err(e) => {
                error!(error = %e, "ACL evaluation failed");
                return Err(AuthError::InternalError);
            }
        }
    }
    Ok(())
}

fn rotate_key(sessions: &SessionManager, session_id: SessionId, mut response: Response) -> Response {
    match sessions.next_key(session_id) {
        Ok(key) => {
            if let Ok(value) = HeaderValue::from_str(&models::encode(key.as_bytes())) {
                response.headers_mut().insert(AUTH_KEY_HEADER, value);
            }
        }
        // Logged out by the handler itself.
        Err(_) => debug!(session_id, "Session closed before key rotation"),
    }
    response
}
