// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Argon2id password hashing.
//!
//! The stored hash is raw bytes: `salt (16) ‖ derived key (32)`. Cost
//! parameters are fixed, so nothing else needs to be encoded.
//!
//! Test builds use a deliberately cheap parameter set. Production builds use
//! the Argon2 defaults (19 MiB, 2 passes, 1 lane).

use argon2::{Algorithm, Argon2, Params, Version};
use rand::{rngs::OsRng, RngCore};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use super::{CryptoError, CryptoResult};

pub const SALT_LEN: usize = 16;
pub const DERIVED_KEY_LEN: usize = 32;
pub const PASSWORD_HASH_LEN: usize = SALT_LEN + DERIVED_KEY_LEN;

#[cfg(not(test))]
const MEMORY_KIB: u32 = Params::DEFAULT_M_COST;
#[cfg(not(test))]
const ITERATIONS: u32 = Params::DEFAULT_T_COST;

// Fast, insecure parameters for tests ONLY.
#[cfg(test)]
const MEMORY_KIB: u32 = 1024;
#[cfg(test)]
const ITERATIONS: u32 = 1;

fn argon2_instance() -> CryptoResult<Argon2<'static>> {
    let params = Params::new(MEMORY_KIB, ITERATIONS, 1, Some(DERIVED_KEY_LEN))
        .map_err(|_| CryptoError::CryptoFailure("invalid argon2 parameters"))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

fn derive(password: &[u8], salt: &[u8]) -> CryptoResult<Zeroizing<[u8; DERIVED_KEY_LEN]>> {
    let mut derived = Zeroizing::new([0u8; DERIVED_KEY_LEN]);
    argon2_instance()?
        .hash_password_into(password, salt, derived.as_mut())
        .map_err(|_| CryptoError::CryptoFailure("password derivation failed"))?;
    Ok(derived)
}

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &[u8]) -> CryptoResult<Vec<u8>> {
    if password.is_empty() {
        return Err(CryptoError::InvalidInput("password is empty"));
    }

    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let derived = derive(password, &salt)?;

    let mut hash = Vec::with_capacity(PASSWORD_HASH_LEN);
    hash.extend_from_slice(&salt);
    hash.extend_from_slice(derived.as_ref());
    Ok(hash)
}

/// Check `password` against a stored hash in constant time.
///
/// A hash of the wrong length is reported as `InvalidInput`. Callers must
/// treat any `Err` as a denial, exactly like `Ok(false)`.
pub fn verify_password(password: &[u8], hash: &[u8]) -> CryptoResult<bool> {
    if hash.len() != PASSWORD_HASH_LEN {
        return Err(CryptoError::InvalidInput("malformed password hash"));
    }

    let (salt, expected) = hash.split_at(SALT_LEN);
    let derived = derive(password, salt)?;
    Ok(derived.as_ref().ct_eq(expected).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_password_verifies() {
        let hash = hash_password(b"password").unwrap();
        assert_eq!(hash.len(), PASSWORD_HASH_LEN);
        assert!(verify_password(b"password", &hash).unwrap());
    }

    #[test]
    fn altered_password_is_rejected() {
        let hash = hash_password(b"password").unwrap();
        assert!(!verify_password(b"passwore", &hash).unwrap());
        assert!(!verify_password(b"Password", &hash).unwrap());
        assert!(!verify_password(b"password ", &hash).unwrap());
    }

    #[test]
    fn salts_differ_between_hashes() {
        let a = hash_password(b"password").unwrap();
        let b = hash_password(b"password").unwrap();
        assert_ne!(a[..SALT_LEN], b[..SALT_LEN]);
    }

    #[test]
    fn malformed_hash_is_an_error() {
        let result = verify_password(b"password", &[0u8; PASSWORD_HASH_LEN - 1]);
        assert!(matches!(result, Err(CryptoError::InvalidInput(_))));
        assert!(verify_password(b"password", &[]).is_err());
    }

    #[test]
    fn empty_password_is_rejected_at_hash_time() {
        assert!(matches!(hash_password(b""), Err(CryptoError::InvalidInput(_))));
    }
}
