// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Sealed-box envelopes.
//!
//! ## Format
//!
//! ```text
//! nonce (24) ‖ sender public key (32) ‖ XChaCha20-Poly1305 ciphertext + tag (16)
//! ```
//!
//! The AEAD key is HKDF-SHA256 over the X25519 shared secret, bound to both
//! public keys through the HKDF info string. Flipping any bit of the envelope,
//! including the embedded sender key, makes `open` fail.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    Key, XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use x25519_dalek::StaticSecret;
use zeroize::Zeroizing;

pub use x25519_dalek::PublicKey;

use super::{CryptoError, CryptoResult, WipeOnDrop};

/// Length of an X25519 public or private key.
pub const PUBLIC_KEY_LEN: usize = 32;

/// XChaCha20 nonce length.
pub const NONCE_LEN: usize = 24;

/// Poly1305 tag length.
const TAG_LEN: usize = 16;

/// Smallest well-formed envelope (one byte of payload would add one more).
pub const MIN_ENVELOPE_LEN: usize = NONCE_LEN + PUBLIC_KEY_LEN + TAG_LEN;

const ENVELOPE_INFO: &[u8] = b"keyhaven-envelope-v1";

/// X25519 key pair used for sealing and opening envelopes.
#[derive(Clone)]
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a fresh key pair from the OS RNG.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Rebuild a key pair from raw private key bytes. The input is wiped.
    pub fn from_secret_bytes(bytes: &mut [u8]) -> CryptoResult<Self> {
        let bytes = WipeOnDrop::new(bytes);
        let raw: [u8; PUBLIC_KEY_LEN] = bytes[..]
            .try_into()
            .map_err(|_| CryptoError::InvalidInput("private key must be 32 bytes"))?;
        let secret = StaticSecret::from(raw);
        let public = PublicKey::from(&secret);
        Ok(Self { secret, public })
    }

    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    /// Raw private key bytes, wiped when dropped.
    pub fn secret_bytes(&self) -> Zeroizing<[u8; PUBLIC_KEY_LEN]> {
        Zeroizing::new(self.secret.to_bytes())
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", self.public.as_bytes())
            .finish_non_exhaustive()
    }
}

/// Parse a public key received over the wire.
pub fn public_key_from_slice(bytes: &[u8]) -> CryptoResult<PublicKey> {
    let raw: [u8; PUBLIC_KEY_LEN] = bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidInput("public key must be 32 bytes"))?;
    Ok(PublicKey::from(raw))
}

/// Derive the per-envelope AEAD key. `None` when the peer key is low-order.
fn envelope_key(
    secret: &StaticSecret,
    peer: &PublicKey,
    sender: &PublicKey,
    recipient: &PublicKey,
) -> Option<Zeroizing<[u8; 32]>> {
    let shared = secret.diffie_hellman(peer);
    if !shared.was_contributory() {
        return None;
    }

    let hkdf = Hkdf::<Sha256>::new(None, shared.as_bytes());
    let mut info = Vec::with_capacity(ENVELOPE_INFO.len() + 2 * PUBLIC_KEY_LEN);
    info.extend_from_slice(ENVELOPE_INFO);
    info.extend_from_slice(sender.as_bytes());
    info.extend_from_slice(recipient.as_bytes());

    let mut key = Zeroizing::new([0u8; 32]);
    hkdf.expand(&info, key.as_mut()).ok()?;
    Some(key)
}

/// Seal `payload` from `sender` to `recipient`.
///
/// The payload buffer is zeroed before this returns, on success and on error.
pub fn seal(payload: &mut [u8], sender: &KeyPair, recipient: &PublicKey) -> CryptoResult<Vec<u8>> {
    let payload = WipeOnDrop::new(payload);
    if payload.is_empty() {
        return Err(CryptoError::InvalidInput("payload is empty"));
    }

    let key = envelope_key(&sender.secret, recipient, &sender.public, recipient)
        .ok_or(CryptoError::CryptoFailure("recipient key is not usable"))?;

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_ref()));
    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), &payload[..])
        .map_err(|_| CryptoError::CryptoFailure("encryption failed"))?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + PUBLIC_KEY_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(sender.public.as_bytes());
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Open an envelope addressed to `recipient`.
pub fn open(sealed: &[u8], recipient: &KeyPair) -> CryptoResult<Zeroizing<Vec<u8>>> {
    if sealed.len() < MIN_ENVELOPE_LEN {
        return Err(CryptoError::InvalidInput("envelope is too short"));
    }

    let (nonce, rest) = sealed.split_at(NONCE_LEN);
    let (sender, ciphertext) = rest.split_at(PUBLIC_KEY_LEN);
    let sender = public_key_from_slice(sender)?;

    let key = envelope_key(&recipient.secret, &sender, &sender, &recipient.public)
        .ok_or(CryptoError::DecryptionFailed)?;

    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_ref()));
    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_then_open_round_trips() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();

        let mut payload = b"database password".to_vec();
        let sealed = seal(&mut payload, &alice, bob.public()).unwrap();

        let opened = open(&sealed, &bob).unwrap();
        assert_eq!(opened.as_slice(), b"database password");
        assert_eq!(&sealed[NONCE_LEN..NONCE_LEN + PUBLIC_KEY_LEN], alice.public().as_bytes());
        assert_eq!(sealed.len(), MIN_ENVELOPE_LEN + 17);
    }

    #[test]
    fn seal_zeroes_caller_buffer() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();

        let mut payload = b"per-secret key material".to_vec();
        seal(&mut payload, &alice, bob.public()).unwrap();
        assert!(payload.iter().all(|&b| b == 0));
    }

    #[test]
    fn empty_payload_is_invalid() {
        let alice = KeyPair::generate();
        let result = seal(&mut [], &alice, alice.public());
        assert!(matches!(result, Err(CryptoError::InvalidInput(_))));
    }

    #[test]
    fn wrong_recipient_fails_decryption() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let eve = KeyPair::generate();

        let sealed = seal(&mut b"payload".to_vec(), &alice, bob.public()).unwrap();
        assert_eq!(open(&sealed, &eve).unwrap_err(), CryptoError::DecryptionFailed);
    }

    #[test]
    fn any_bit_flip_is_detected() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let sealed = seal(&mut b"tamper evident".to_vec(), &alice, bob.public()).unwrap();

        // One position in each region: nonce, sender key, ciphertext, tag.
        for index in [0, NONCE_LEN + 3, NONCE_LEN + PUBLIC_KEY_LEN + 1, sealed.len() - 1] {
            let mut tampered = sealed.clone();
            tampered[index] ^= 0x01;
            assert!(open(&tampered, &bob).is_err(), "flip at {index} went unnoticed");
        }
    }

    #[test]
    fn short_envelope_is_invalid_input() {
        let bob = KeyPair::generate();
        let result = open(&[0u8; MIN_ENVELOPE_LEN - 1], &bob);
        assert!(matches!(result, Err(CryptoError::InvalidInput(_))));
    }

    #[test]
    fn nonces_are_fresh_per_call() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let a = seal(&mut b"same".to_vec(), &alice, bob.public()).unwrap();
        let b = seal(&mut b"same".to_vec(), &alice, bob.public()).unwrap();
        assert_ne!(a[..NONCE_LEN], b[..NONCE_LEN]);
        assert_ne!(a, b);
    }

    #[test]
    fn key_pair_restores_from_secret_bytes() {
        let original = KeyPair::generate();
        let mut raw = *original.secret_bytes();
        let restored = KeyPair::from_secret_bytes(&mut raw).unwrap();
        assert_eq!(restored.public(), original.public());
        assert_eq!(raw, [0u8; 32]);
    }
}
