// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Keyhaven - Zero-Knowledge Secret Distribution Service
//!
//! Administrators and clients share secrets through groups without the server
//! ever holding a plaintext secret or a private key. The server routes
//! ciphertext and enforces access policy.
//!
//! ## Modules
//!
//! - `crypto` - Sealed boxes, password hashing, request MACs, zeroing
//! - `session` - Challenge-response sessions with per-request key rotation
//! - `storage` - Secret distribution ledger (redb)
//! - `auth` - Request authorizer (session MAC, roles, ACL)
//! - `api` - HTTP API handlers (Axum)

pub mod api;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod models;
pub mod session;
pub mod state;
pub mod storage;
