// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use crate::crypto::CryptoError;
use crate::models;
use crate::session::SessionError;
use crate::storage::LedgerError;

/// HTTP boundary error. The body is a single wire `Response` message.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    /// Generic 500. Details belong in the log, never in the body.
    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(models::Response::new(self.message));
        (self.status, body).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InvalidInput(msg) => Self::bad_request(msg),
            LedgerError::NotFound(what) => Self::not_found(format!("{what} not found")),
            LedgerError::DuplicateName(what) => {
                Self::new(StatusCode::CONFLICT, format!("{what} already exists"))
            }
            LedgerError::Forbidden(msg) => Self::forbidden(msg),
            storage => {
                error!(error = %storage, "Ledger storage failure");
                Self::internal()
            }
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::AuthenticationFailed | SessionError::SessionInvalid => {
                Self::unauthorized(e.to_string())
            }
            SessionError::CredentialsUnavailable => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
            }
        }
    }
}

impl From<CryptoError> for ApiError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::InvalidInput(_) | CryptoError::DecryptionFailed => {
                Self::bad_request(e.to_string())
            }
            CryptoError::CryptoFailure(_) => {
                error!(error = %e, "Crypto failure");
                Self::internal()
            }
        }
    }
}
