// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The session table.
//!
//! One `std::sync::Mutex` guards the whole table. Every critical section is
//! short and synchronous; credential lookups and password hashing happen
//! before the lock is taken.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::{rngs::OsRng, RngCore};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::{CredentialVerifier, Identity, SessionError, SessionResult};
use crate::crypto::{verify_mac, verify_password, PASSWORD_HASH_LEN};

/// Opaque numeric session identifier.
pub type SessionId = u64;

pub const SESSION_KEY_LEN: usize = 32;

/// Hash used when the principal does not exist, so a miss costs the same
/// Argon2 work as a wrong password.
const DECOY_HASH: [u8; PASSWORD_HASH_LEN] = [0x5a; PASSWORD_HASH_LEN];

/// Symmetric per-session MAC key.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; SESSION_KEY_LEN]);

impl SessionKey {
    fn random() -> Self {
        let mut key = [0u8; SESSION_KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; SESSION_KEY_LEN]> for SessionKey {
    fn from(bytes: [u8; SESSION_KEY_LEN]) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// Timing knobs for sessions.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Idle time after which a session is expired.
    pub idle_timeout: Duration,
    /// Period of the background sweep.
    pub sweep_interval: Duration,
    /// Upper bound on a credential lookup.
    pub lookup_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
            lookup_timeout: Duration::from_secs(5),
        }
    }
}

/// Result of a successful `authenticate`.
#[derive(Debug)]
pub struct NewSession {
    pub id: SessionId,
    pub key: SessionKey,
    pub identity: Identity,
}

struct Session {
    identity: Identity,
    /// `None` between a validated request and the following `next_key`.
    key: Option<SessionKey>,
    /// Key consumed by the last validated request.
    retired: Option<SessionKey>,
    last_active: Instant,
}

impl Session {
    fn is_expired(&self, now: Instant, idle_timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_active) >= idle_timeout
    }

    /// Install a fresh key that differs from both the live and the retired key.
    fn rotate(&mut self) -> SessionKey {
        let key = loop {
            let candidate = SessionKey::random();
            if self.key.as_ref() != Some(&candidate) && self.retired.as_ref() != Some(&candidate) {
                break candidate;
            }
        };
        self.retired = self.key.take().or_else(|| self.retired.take());
        self.key = Some(key.clone());
        self.last_active = Instant::now();
        key
    }
}

/// Shared session table.
pub struct SessionManager {
    sessions: Mutex<HashMap<SessionId, Session>>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn table(&self) -> MutexGuard<'_, HashMap<SessionId, Session>> {
        // Critical sections never panic mid-update, so a poisoned table is
        // still consistent.
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Authenticate `name`/`password` and open a session.
    ///
    /// Unknown principals and wrong passwords both yield
    /// `AuthenticationFailed`. A slow or failing verifier yields
    /// `CredentialsUnavailable` and no session is created.
    pub async fn authenticate<V: CredentialVerifier>(
        &self,
        name: &str,
        password: &[u8],
        verifier: &V,
    ) -> SessionResult<NewSession> {
        let lookup = tokio::time::timeout(self.config.lookup_timeout, verifier.lookup(name))
            .await
            .map_err(|_| {
                warn!(principal = %name, "Credential lookup timed out");
                SessionError::CredentialsUnavailable
            })?
            .map_err(|e| {
                warn!(principal = %name, error = %e, "Credential lookup failed");
                SessionError::CredentialsUnavailable
            })?;

        let (identity, hash) = match lookup {
            Some(credentials) => (Some(credentials.identity()), credentials.password_hash),
            None => (None, DECOY_HASH.to_vec()),
        };

        let password = Zeroizing::new(password.to_vec());
        let verified = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|_| SessionError::CredentialsUnavailable)?;

        let identity = match (identity, verified) {
            (Some(identity), Ok(true)) => identity,
            _ => {
                info!(principal = %name, "Authentication failed");
                return Err(SessionError::AuthenticationFailed);
            }
        };

        let mut table = self.table();
        let id = loop {
            let candidate = OsRng.next_u64();
            if candidate != 0 && !table.contains_key(&candidate) {
                break candidate;
            }
        };

        let mut session = Session {
            identity: identity.clone(),
            key: None,
            retired: None,
            last_active: Instant::now(),
        };
        let key = session.rotate();
        table.insert(id, session);
        drop(table);

        info!(principal = %identity.name, session_id = id, "Session opened");
        Ok(NewSession { id, key, identity })
    }

    /// Rotate the session key. Also resets the idle timer.
    pub fn next_key(&self, id: SessionId) -> SessionResult<SessionKey> {
        let mut table = self.table();
        let session = table.get_mut(&id).ok_or(SessionError::SessionInvalid)?;
        Ok(session.rotate())
    }

    /// Check a request MAC against the session's current key.
    ///
    /// On success the key is retired; the caller must follow up with
    /// `next_key` to keep the session usable.
    pub fn validate(
        &self,
        id: SessionId,
        mac: &[u8],
        context: &[u8],
        body: &[u8],
    ) -> SessionResult<Identity> {
        let now = Instant::now();
        let mut table = self.table();

        let expired = {
            let session = table.get(&id).ok_or(SessionError::SessionInvalid)?;
            let mac_ok = session
                .key
                .as_ref()
                .is_some_and(|key| verify_mac(key.as_bytes(), mac, context, body));
            if !mac_ok {
                debug!(session_id = id, "Request MAC rejected");
                return Err(SessionError::SessionInvalid);
            }
            session.is_expired(now, self.config.idle_timeout)
        };

        if expired {
            table.remove(&id);
            info!(session_id = id, "Session expired");
            return Err(SessionError::SessionInvalid);
        }

        let session = table.get_mut(&id).ok_or(SessionError::SessionInvalid)?;
        session.retired = session.key.take();
        session.last_active = now;
        Ok(session.identity.clone())
    }

    /// Drop the session immediately. Returns whether it existed.
    pub fn logout(&self, id: SessionId) -> bool {
        let removed = self.table().remove(&id).is_some();
        if removed {
            info!(session_id = id, "Session closed");
        }
        removed
    }

    /// Remove every expired session. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let idle_timeout = self.config.idle_timeout;
        let mut table = self.table();
        let before = table.len();
        table.retain(|_, session| !session.is_expired(now, idle_timeout));
        before - table.len()
    }

    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::crypto::{compute_mac, hash_password};
    use crate::session::Credentials;

    /// Verifier backed by a fixed map.
    pub(crate) struct StaticVerifier(pub HashMap<String, Credentials>);

    impl StaticVerifier {
        pub(crate) fn with(name: &str, group: &str, admin: bool, password: &str) -> Self {
            let credentials = Credentials {
                name: name.to_string(),
                group: group.to_string(),
                admin,
                password_hash: hash_password(password.as_bytes()).unwrap(),
            };
            Self(HashMap::from([(name.to_string(), credentials)]))
        }
    }

    impl CredentialVerifier for StaticVerifier {
        type Error = String;

        async fn lookup(&self, name: &str) -> Result<Option<Credentials>, String> {
            Ok(self.0.get(name).cloned())
        }
    }

    struct SlowVerifier;

    impl CredentialVerifier for SlowVerifier {
        type Error = String;

        async fn lookup(&self, _name: &str) -> Result<Option<Credentials>, String> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(None)
        }
    }

    fn manager() -> SessionManager {
        SessionManager::new(SessionConfig {
            idle_timeout: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(10),
            lookup_timeout: Duration::from_secs(1),
        })
    }

    fn sign(key: &SessionKey, context: &str, body: &[u8]) -> [u8; 32] {
        compute_mac(key.as_bytes(), context.as_bytes(), body)
    }

    #[tokio::test]
    async fn authenticate_opens_session_with_identity() {
        let sessions = manager();
        let verifier = StaticVerifier::with("admin", "super", true, "password");

        let session = sessions.authenticate("admin", b"password", &verifier).await.unwrap();
        assert_ne!(session.id, 0);
        assert!(session.identity.admin);
        assert!(session.identity.superuser);
        assert_eq!(sessions.len(), 1);
    }

    #[tokio::test]
    async fn unknown_principal_and_wrong_password_fail_identically() {
        let sessions = manager();
        let verifier = StaticVerifier::with("admin", "super", true, "password");

        let unknown = sessions.authenticate("nobody", b"password", &verifier).await;
        let wrong = sessions.authenticate("admin", b"passw0rd", &verifier).await;
        assert_eq!(unknown.unwrap_err(), SessionError::AuthenticationFailed);
        assert_eq!(wrong.unwrap_err(), SessionError::AuthenticationFailed);
        assert!(sessions.is_empty());
    }

    #[tokio::test]
    async fn malformed_stored_hash_denies_login() {
        let sessions = manager();
        let mut verifier = StaticVerifier::with("alice", "default", false, "pw");
        if let Some(credentials) = verifier.0.get_mut("alice") {
            credentials.password_hash.truncate(8);
        }

        let result = sessions.authenticate("alice", b"pw", &verifier).await;
        assert_eq!(result.unwrap_err(), SessionError::AuthenticationFailed);
        assert!(sessions.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_verifier_times_out_without_session() {
        let sessions = manager();
        let result = sessions.authenticate("admin", b"password", &SlowVerifier).await;
        assert_eq!(result.unwrap_err(), SessionError::CredentialsUnavailable);
        assert!(sessions.is_empty());
    }

    #[tokio::test]
    async fn next_key_always_changes_the_key() {
        let sessions = manager();
        let verifier = StaticVerifier::with("alice", "default", false, "pw");
        let session = sessions.authenticate("alice", b"pw", &verifier).await.unwrap();

        let mut previous = session.key.clone();
        for _ in 0..32 {
            let next = sessions.next_key(session.id).unwrap();
            assert_ne!(next, previous);
            previous = next;
        }
    }

    #[test]
    fn next_key_on_unknown_session_is_invalid() {
        assert_eq!(manager().next_key(42).unwrap_err(), SessionError::SessionInvalid);
    }

    #[tokio::test]
    async fn validate_accepts_current_key_once() {
        let sessions = manager();
        let verifier = StaticVerifier::with("alice", "default", false, "pw");
        let session = sessions.authenticate("alice", b"pw", &verifier).await.unwrap();

        let mac = sign(&session.key, "/v1/keys", b"");
        let identity = sessions.validate(session.id, &mac, b"/v1/keys", b"").unwrap();
        assert_eq!(identity.name, "alice");

        // K0 is spent; replay fails even before rotation.
        assert_eq!(
            sessions.validate(session.id, &mac, b"/v1/keys", b"").unwrap_err(),
            SessionError::SessionInvalid
        );

        let k1 = sessions.next_key(session.id).unwrap();
        assert_ne!(k1, session.key);
        assert!(sessions.validate(session.id, &mac, b"/v1/keys", b"").is_err());
        let mac = sign(&k1, "/v1/keys", b"");
        assert!(sessions.validate(session.id, &mac, b"/v1/keys", b"").is_ok());
    }

    #[tokio::test]
    async fn bad_mac_does_not_consume_the_key() {
        let sessions = manager();
        let verifier = StaticVerifier::with("alice", "default", false, "pw");
        let session = sessions.authenticate("alice", b"pw", &verifier).await.unwrap();

        assert!(sessions.validate(session.id, &[0u8; 32], b"/v1/keys", b"").is_err());
        let mac = sign(&session.key, "/v1/keys", b"");
        assert!(sessions.validate(session.id, &mac, b"/v1/keys", b"").is_ok());
    }

    #[test]
    fn validate_unknown_session_is_invalid() {
        let result = manager().validate(7, &[0u8; 32], b"ctx", b"");
        assert_eq!(result.unwrap_err(), SessionError::SessionInvalid);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_session_rejects_correct_mac() {
        let sessions = manager();
        let verifier = StaticVerifier::with("alice", "default", false, "pw");
        let session = sessions.authenticate("alice", b"pw", &verifier).await.unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;

        let mac = sign(&session.key, "/v1/keys", b"");
        assert_eq!(
            sessions.validate(session.id, &mac, b"/v1/keys", b"").unwrap_err(),
            SessionError::SessionInvalid
        );
        // Removed lazily, without waiting for a sweep.
        assert!(sessions.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn activity_resets_idle_timer() {
        let sessions = manager();
        let verifier = StaticVerifier::with("alice", "default", false, "pw");
        let session = sessions.authenticate("alice", b"pw", &verifier).await.unwrap();

        tokio::time::advance(Duration::from_secs(45)).await;
        let mac = sign(&session.key, "/a", b"");
        sessions.validate(session.id, &mac, b"/a", b"").unwrap();
        let key = sessions.next_key(session.id).unwrap();

        tokio::time::advance(Duration::from_secs(45)).await;
        let mac = sign(&key, "/b", b"");
        assert!(sessions.validate(session.id, &mac, b"/b", b"").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_only_expired_sessions() {
        let sessions = manager();
        let verifier = StaticVerifier::with("alice", "default", false, "pw");
        sessions.authenticate("alice", b"pw", &verifier).await.unwrap();

        tokio::time::advance(Duration::from_secs(30)).await;
        sessions.authenticate("alice", b"pw", &verifier).await.unwrap();
        assert_eq!(sessions.sweep(), 0);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(sessions.sweep(), 1);
        assert_eq!(sessions.len(), 1);
    }

    #[tokio::test]
    async fn logout_removes_session() {
        let sessions = manager();
        let verifier = StaticVerifier::with("alice", "default", false, "pw");
        let session = sessions.authenticate("alice", b"pw", &verifier).await.unwrap();

        assert!(sessions.logout(session.id));
        assert!(!sessions.logout(session.id));
        let mac = sign(&session.key, "/v1/keys", b"");
        assert!(sessions.validate(session.id, &mac, b"/v1/keys", b"").is_err());
    }
}
