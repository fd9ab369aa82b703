// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authorization errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;
use crate::session::SessionError;

/// Failures raised by the request authorizer before a handler runs.
#[derive(Debug)]
pub enum AuthError {
    /// No `Session-ID` header present
    MissingSession,
    /// `Session-ID` is not a decimal session id
    InvalidSessionHeader,
    /// No `X-AUTH-MAC` header, or it is not base64
    InvalidMac,
    /// Unknown or expired session, or MAC mismatch
    SessionInvalid,
    /// Request body could not be read
    InvalidBody,
    /// Route requires an administrator
    AdminRequired,
    /// Route requires a supergroup member
    SuperRequired,
    /// Access predicate denied the targeted entity
    AccessDenied,
    /// Internal error
    InternalError,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingSession => "missing_session",
            AuthError::InvalidSessionHeader => "invalid_session_header",
            AuthError::InvalidMac => "invalid_mac",
            AuthError::SessionInvalid => "session_invalid",
            AuthError::InvalidBody => "invalid_body",
            AuthError::AdminRequired => "admin_required",
            AuthError::SuperRequired => "super_required",
            AuthError::AccessDenied => "access_denied",
            AuthError::InternalError => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingSession
            | AuthError::InvalidSessionHeader
            | AuthError::InvalidMac
            | AuthError::SessionInvalid => StatusCode::UNAUTHORIZED,
            AuthError::InvalidBody => StatusCode::BAD_REQUEST,
            AuthError::AdminRequired | AuthError::SuperRequired | AuthError::AccessDenied => {
                StatusCode::FORBIDDEN
            }
            AuthError::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingSession => write!(f, "Session-ID header is required"),
            AuthError::InvalidSessionHeader => write!(f, "Session-ID header is malformed"),
            AuthError::InvalidMac => write!(f, "X-AUTH-MAC header is missing or malformed"),
            AuthError::SessionInvalid => write!(f, "session invalid"),
            AuthError::InvalidBody => write!(f, "request body could not be read"),
            AuthError::AdminRequired => write!(f, "administrator privileges required"),
            AuthError::SuperRequired => write!(f, "supergroup membership required"),
            AuthError::AccessDenied => write!(f, "access denied"),
            AuthError::InternalError => write!(f, "internal error"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<SessionError> for AuthError {
    fn from(_: SessionError) -> Self {
        AuthError::SessionInvalid
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::new(self.status_code(), self.to_string()).into_response()
    }
}
