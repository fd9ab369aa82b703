// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Envelope Crypto Engine
//!
//! Primitives shared by the session layer and by client tooling:
//!
//! - `envelope` - X25519 sealed boxes (`nonce ‖ sender_pub ‖ ciphertext`)
//! - `password` - Argon2id password hashing (`salt ‖ derived_key`)
//! - `mac` - HMAC-SHA256 over a canonical `(context, body)` tuple
//! - `zero` - secure zeroing and scoped wipe guards
//!
//! The server itself never opens an envelope. `open` exists for clients and
//! for tests that prove a wrap round-trips.

pub mod envelope;
pub mod mac;
pub mod password;
pub mod zero;

pub use envelope::{open, seal, KeyPair, PublicKey, MIN_ENVELOPE_LEN, PUBLIC_KEY_LEN};
pub use mac::{compute_mac, verify_mac, MAC_LEN};
pub use password::{hash_password, verify_password, PASSWORD_HASH_LEN};
pub use zero::{secure_zero, WipeOnDrop};

/// Errors raised by the crypto engine.
///
/// Crypto code never panics on bad input; callers get one of these instead so
/// "not authenticated" can be told apart from "corrupted data".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("crypto failure: {0}")]
    CryptoFailure(&'static str),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
