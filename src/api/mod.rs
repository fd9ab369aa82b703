// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::header::CONTENT_TYPE,
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::error;
use utoipa::OpenApi;

use crate::{
    auth::{authorize, Role},
    error::ApiError,
    models::{decode, Auth, Key, Listing, Response, User},
    state::AppState,
};

pub mod groups;
pub mod health;
pub mod keys;
pub mod session;
pub mod users;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/v1/auth", post(session::authenticate))
        .route("/v1/logout", post(session::logout))
        .route(
            "/v1/keys",
            get(keys::list_accessible).post(keys::create_secret),
        )
        .route(
            "/v1/keys/{name}",
            get(keys::fetch_secret).delete(keys::delete_secret),
        )
        .route(
            "/v1/keys/{name}/groups/{group}",
            put(keys::assign_to_group).delete(keys::revoke_from_group),
        )
        .route(
            "/v1/keys/{name}/users/{user}",
            put(keys::assign_to_principal).delete(keys::revoke_from_principal),
        )
        .route("/v1/admin/keys", get(keys::list_secrets))
        .route(
            "/v1/groups",
            get(groups::list_groups).post(groups::create_group),
        )
        .route(
            "/v1/groups/{name}",
            get(groups::get_group).delete(groups::delete_group),
        )
        .route("/v1/users", post(users::register))
        .route(
            "/v1/users/{name}",
            get(users::get_user).delete(users::delete_user),
        )
        .route("/v1/users/{name}/group", put(users::reassign))
        .route_layer(middleware::from_fn_with_state(state.clone(), authorize))
        .with_state(state.clone());

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state);

    Router::new()
        .merge(v1_routes)
        .merge(health_routes)
        .route("/api-doc/openapi.json", get(openapi_json))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .layer(CorsLayer::permissive())
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Reply body made of JSON objects written back to back, one per message.
#[derive(Debug)]
pub struct Messages<T>(pub Vec<T>);

impl<T> Messages<T> {
    pub fn one(message: T) -> Self {
        Self(vec![message])
    }
}

impl<T: Serialize> IntoResponse for Messages<T> {
    fn into_response(self) -> axum::response::Response {
        let mut body = Vec::new();
        for message in &self.0 {
            if let Err(e) = serde_json::to_writer(&mut body, message) {
                error!(error = %e, "Failed to serialize reply");
                return ApiError::internal().into_response();
            }
        }
        ([(CONTENT_TYPE, "application/json")], body).into_response()
    }
}

/// Decode a required base64 field.
pub(crate) fn required_bytes(value: &str, field: &str) -> Result<Vec<u8>, ApiError> {
    optional_bytes(value, field)?.ok_or_else(|| ApiError::bad_request(format!("{field} is required")))
}

/// Decode an optional base64 field. Empty means absent.
pub(crate) fn optional_bytes(value: &str, field: &str) -> Result<Option<Vec<u8>>, ApiError> {
    if value.is_empty() {
        return Ok(None);
    }
    match decode(value) {
        Some(bytes) if !bytes.is_empty() => Ok(Some(bytes)),
        Some(_) => Ok(None),
        None => Err(ApiError::bad_request(format!("{field} must be base64"))),
    }
}

pub(crate) fn optional_text(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        session::authenticate,
        session::logout,
        keys::list_accessible,
        keys::create_secret,
        keys::fetch_secret,
        keys::delete_secret,
        keys::assign_to_group,
        keys::revoke_from_group,
        keys::assign_to_principal,
        keys::revoke_from_principal,
        keys::list_secrets,
        groups::list_groups,
        groups::get_group,
        groups::create_group,
        groups::delete_group,
        users::register,
        users::get_user,
        users::delete_user,
        users::reassign,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            Auth,
            Key,
            User,
            Response,
            Listing,
            Role,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Session", description = "Login and logout"),
        (name = "Keys", description = "Secret storage, grants and revocations"),
        (name = "Groups", description = "Group key pairs"),
        (name = "Users", description = "Principal administration"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
struct ApiDoc;
