// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Secret distribution ledger backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `principals`: name → serialized PrincipalRecord
//! - `groups`: name → serialized GroupRecord
//! - `secrets`: name → serialized SecretRecord
//! - `wraps`: composite key (secret|0x00|sequence_be) → serialized WrapRecord
//! - `meta`: key → u64 (wrap sequence counter)
//!
//! Every mutation runs in a single write transaction. Returning early with an
//! error drops the transaction uncommitted, which rolls back every row it
//! touched.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{info, warn};

use super::records::{
    AccessibleSecret, Bootstrap, GroupRecord, NewPrincipal, NewSecret, PrincipalRecord, Recipient,
    SecretRecord, SecretSummary, WrapRecord,
};
use super::{LedgerError, LedgerResult};
use crate::auth::Role;
use crate::crypto::PUBLIC_KEY_LEN;
use crate::models::{is_reserved, DEFAULT_GROUP, SUPER_GROUP};
use crate::session::{CredentialVerifier, Credentials, Identity};

// =============================================================================
// Table Definitions
// =============================================================================

const PRINCIPALS: TableDefinition<&str, &[u8]> = TableDefinition::new("principals");

const GROUPS: TableDefinition<&str, &[u8]> = TableDefinition::new("groups");

const SECRETS: TableDefinition<&str, &[u8]> = TableDefinition::new("secrets");

/// Key format: `secret | 0x00 | sequence_be` so all wraps of one secret are a
/// contiguous range.
const WRAPS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("wraps");

const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const WRAP_SEQUENCE: &str = "wrap_sequence";

const MAX_NAME_LEN: usize = 255;

// =============================================================================
// Key & Row Helpers
// =============================================================================

fn wrap_key(secret: &str, sequence: u64) -> Vec<u8> {
    let mut key = wrap_prefix(secret);
    key.extend_from_slice(&sequence.to_be_bytes());
    key
}

fn wrap_prefix(secret: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(secret.len() + 9);
    prefix.extend_from_slice(secret.as_bytes());
    prefix.push(0x00);
    prefix
}

/// Exclusive upper bound for a secret's wrap range. Names never contain
/// control characters, so no other secret's keys fall inside it.
fn wrap_prefix_end(secret: &str) -> Vec<u8> {
    let mut end = Vec::with_capacity(secret.len() + 1);
    end.extend_from_slice(secret.as_bytes());
    end.push(0x01);
    end
}

fn encode_row<T: Serialize>(row: &T) -> LedgerResult<Vec<u8>> {
    Ok(serde_json::to_vec(row)?)
}

fn decode_row<T: DeserializeOwned>(bytes: &[u8]) -> LedgerResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

fn get_row<T, Tbl>(table: &Tbl, name: &str) -> LedgerResult<Option<T>>
where
    T: DeserializeOwned,
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(name)? {
        Some(value) => Ok(Some(decode_row(value.value())?)),
        None => Ok(None),
    }
}

/// All wraps, or only those of `secret`, with their table keys.
fn scan_wraps<Tbl>(table: &Tbl, secret: Option<&str>) -> LedgerResult<Vec<(Vec<u8>, WrapRecord)>>
where
    Tbl: ReadableTable<&'static [u8], &'static [u8]>,
{
    let start = secret.map(wrap_prefix);
    let end = secret.map(wrap_prefix_end);
    let entries = match (&start, &end) {
        (Some(start), Some(end)) => table.range(start.as_slice()..end.as_slice())?,
        _ => table.iter()?,
    };

    let mut wraps = Vec::new();
    for entry in entries {
        let (key, value) = entry?;
        let wrap: WrapRecord = decode_row(value.value())?;
        if secret.is_some_and(|name| wrap.secret != name) {
            continue;
        }
        wraps.push((key.value().to_vec(), wrap));
    }
    Ok(wraps)
}

fn insert_wrap(txn: &WriteTransaction, wrap: &WrapRecord) -> LedgerResult<()> {
    let sequence = {
        let mut meta = txn.open_table(META)?;
        let next = meta.get(WRAP_SEQUENCE)?.map(|v| v.value()).unwrap_or(0) + 1;
        meta.insert(WRAP_SEQUENCE, next)?;
        next
    };

    let mut wraps = txn.open_table(WRAPS)?;
    wraps.insert(
        wrap_key(&wrap.secret, sequence).as_slice(),
        encode_row(wrap)?.as_slice(),
    )?;
    Ok(())
}

/// Remove every wrap matching `predicate`. Returns how many were removed.
fn remove_wraps(
    txn: &WriteTransaction,
    secret: Option<&str>,
    predicate: impl Fn(&WrapRecord) -> bool,
) -> LedgerResult<usize> {
    let mut wraps = txn.open_table(WRAPS)?;
    let doomed: Vec<Vec<u8>> = scan_wraps(&wraps, secret)?
        .into_iter()
        .filter(|(_, wrap)| predicate(wrap))
        .map(|(key, _)| key)
        .collect();

    for key in &doomed {
        wraps.remove(key.as_slice())?;
    }
    Ok(doomed.len())
}

fn ensure_recipient(txn: &WriteTransaction, recipient: &Recipient) -> LedgerResult<()> {
    let (definition, name) = match recipient {
        Recipient::Principal(name) => (PRINCIPALS, name),
        Recipient::Group(name) => (GROUPS, name),
    };
    let table = txn.open_table(definition)?;
    if table.get(name.as_str())?.is_none() {
        return Err(LedgerError::NotFound(recipient.to_string()));
    }
    Ok(())
}

/// Names are non-empty, bounded, and free of control characters and `/`.
pub fn validate_name(what: &str, name: &str) -> LedgerResult<()> {
    if name.is_empty() {
        return Err(LedgerError::InvalidInput(format!("{what} name is required")));
    }
    if name.len() > MAX_NAME_LEN || name.chars().any(|c| c.is_control() || c == '/') {
        return Err(LedgerError::InvalidInput(format!("{what} name is not allowed")));
    }
    Ok(())
}

fn validate_public_key(what: &str, key: &[u8]) -> LedgerResult<()> {
    if key.len() != PUBLIC_KEY_LEN {
        return Err(LedgerError::InvalidInput(format!(
            "{what} public key must be {PUBLIC_KEY_LEN} bytes"
        )));
    }
    Ok(())
}

fn non_empty(value: Option<Vec<u8>>) -> Option<Vec<u8>> {
    value.filter(|v| !v.is_empty())
}

// =============================================================================
// Ledger
// =============================================================================

/// Persistent model of principals, groups, secrets and their wraps.
///
/// Operations trust the caller attributes handed in by the authorizer and do
/// not re-authenticate.
pub struct Ledger {
    db: Database,
}

impl Ledger {
    /// Open (or create) the ledger at the given path.
    pub fn open(path: &Path) -> LedgerResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(PRINCIPALS)?;
            let _ = write_txn.open_table(GROUPS)?;
            let _ = write_txn.open_table(SECRETS)?;
            let _ = write_txn.open_table(WRAPS)?;
            let _ = write_txn.open_table(META)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Whether the built-in supergroup exists.
    pub fn is_initialized(&self) -> LedgerResult<bool> {
        let read_txn = self.db.begin_read()?;
        let groups = read_txn.open_table(GROUPS)?;
        Ok(groups.get(SUPER_GROUP)?.is_some())
    }

    /// Create the built-in groups and, optionally, the first super-admin.
    ///
    /// Rows that already exist are left untouched.
    pub fn bootstrap(&self, setup: &Bootstrap) -> LedgerResult<()> {
        validate_public_key("supergroup", &setup.super_public_key)?;
        if setup.super_sealed_private_key.is_empty() {
            return Err(LedgerError::InvalidInput(
                "sealed supergroup private key is required".to_string(),
            ));
        }

        let now = Utc::now();
        let write_txn = self.db.begin_write()?;
        {
            let mut groups = write_txn.open_table(GROUPS)?;
            if groups.get(DEFAULT_GROUP)?.is_none() {
                let default = GroupRecord {
                    name: DEFAULT_GROUP.to_string(),
                    kind: Role::Client,
                    public_key: Vec::new(),
                    sealed_private_key: Vec::new(),
                    builtin: true,
                    created_at: now,
                };
                groups.insert(DEFAULT_GROUP, encode_row(&default)?.as_slice())?;
            }
            if groups.get(SUPER_GROUP)?.is_none() {
                let supergroup = GroupRecord {
                    name: SUPER_GROUP.to_string(),
                    kind: Role::Admin,
                    public_key: setup.super_public_key.clone(),
                    sealed_private_key: setup.super_sealed_private_key.clone(),
                    builtin: true,
                    created_at: now,
                };
                groups.insert(SUPER_GROUP, encode_row(&supergroup)?.as_slice())?;
            }
        }

        if let Some(admin) = &setup.admin {
            let principal = &admin.principal;
            validate_name("principal", &principal.name)?;
            validate_public_key("principal", &principal.public_key)?;

            let mut principals = write_txn.open_table(PRINCIPALS)?;
            if principals.get(principal.name.as_str())?.is_none() {
                let record = PrincipalRecord {
                    name: principal.name.clone(),
                    kind: Role::Admin,
                    public_key: principal.public_key.clone(),
                    group: SUPER_GROUP.to_string(),
                    sealed_group_key: non_empty(Some(admin.sealed_group_key.clone())),
                    password_hash: principal.password_hash.clone(),
                    created_at: now,
                };
                principals.insert(principal.name.as_str(), encode_row(&record)?.as_slice())?;
                info!(principal = %principal.name, "Bootstrap administrator created");
            }
        }

        write_txn.commit()?;
        info!("Ledger bootstrapped");
        Ok(())
    }

    // =========================================================================
    // Secrets
    // =========================================================================

    /// Store a new secret together with its supergroup wrap and, when given,
    /// the creator's own wrap.
    ///
    /// Callers outside the supergroup must supply a creator wrap, otherwise
    /// they could create a secret they can never read back.
    pub fn create_secret(&self, caller: &Identity, secret: NewSecret) -> LedgerResult<()> {
        let NewSecret {
            name,
            payload,
            super_key,
            creator_key,
            path,
        } = secret;

        validate_name("secret", &name)?;
        if is_reserved(&name) {
            return Err(LedgerError::InvalidInput(format!("secret name {name} is reserved")));
        }
        if payload.is_empty() {
            return Err(LedgerError::InvalidInput("secret payload is required".to_string()));
        }
        if super_key.is_empty() {
            return Err(LedgerError::InvalidInput("supergroup key is required".to_string()));
        }
        let creator_key = non_empty(creator_key);
        if !caller.superuser && creator_key.is_none() {
            return Err(LedgerError::InvalidInput("creator key is required".to_string()));
        }

        let write_txn = self.db.begin_write()?;
        {
            let mut secrets = write_txn.open_table(SECRETS)?;
            if secrets.get(name.as_str())?.is_some() {
                return Err(LedgerError::DuplicateName(format!("secret {name}")));
            }
            let record = SecretRecord {
                name: name.clone(),
                payload,
                created_by: caller.name.clone(),
                created_at: Utc::now(),
            };
            secrets.insert(name.as_str(), encode_row(&record)?.as_slice())?;
        }

        let supergroup = Recipient::Group(SUPER_GROUP.to_string());
        insert_wrap(&write_txn, &WrapRecord::new(&name, supergroup, super_key, path.clone()))?;
        if let Some(key) = creator_key {
            let creator = Recipient::Principal(caller.name.clone());
            insert_wrap(&write_txn, &WrapRecord::new(&name, creator, key, path))?;
        }
        write_txn.commit()?;

        info!(secret = %name, creator = %caller.name, "Secret created");
        Ok(())
    }

    /// Grant a group access to a secret.
    pub fn assign_to_group(
        &self,
        secret: &str,
        group: &str,
        sealed_key: Vec<u8>,
        path: Option<String>,
    ) -> LedgerResult<()> {
        if group == DEFAULT_GROUP {
            return Err(LedgerError::InvalidInput(
                "the default group cannot hold secrets".to_string(),
            ));
        }
        self.assign(secret, Recipient::Group(group.to_string()), sealed_key, path)
    }

    /// Grant a single principal access to a secret.
    pub fn assign_to_principal(
        &self,
        secret: &str,
        principal: &str,
        sealed_key: Vec<u8>,
        path: Option<String>,
    ) -> LedgerResult<()> {
        self.assign(secret, Recipient::Principal(principal.to_string()), sealed_key, path)
    }

    /// Grants are append-only: a second grant to the same recipient adds a
    /// second wrap rather than replacing the first.
    fn assign(
        &self,
        secret: &str,
        recipient: Recipient,
        sealed_key: Vec<u8>,
        path: Option<String>,
    ) -> LedgerResult<()> {
        if sealed_key.is_empty() {
            return Err(LedgerError::InvalidInput("sealed key is required".to_string()));
        }

        let write_txn = self.db.begin_write()?;
        {
            let secrets = write_txn.open_table(SECRETS)?;
            if secrets.get(secret)?.is_none() {
                return Err(LedgerError::NotFound(format!("secret {secret}")));
            }
        }
        ensure_recipient(&write_txn, &recipient)?;
        insert_wrap(&write_txn, &WrapRecord::new(secret, recipient.clone(), sealed_key, path))?;
        write_txn.commit()?;

        info!(secret = %secret, recipient = %recipient, "Secret granted");
        Ok(())
    }

    /// Remove a group's wraps of a secret. The supergroup wrap is permanent.
    pub fn revoke_from_group(&self, secret: &str, group: &str) -> LedgerResult<usize> {
        if group == SUPER_GROUP {
            return Err(LedgerError::Forbidden(
                "the supergroup wrap cannot be revoked".to_string(),
            ));
        }
        self.revoke(secret, &Recipient::Group(group.to_string()))
    }

    /// Remove a principal's direct wraps of a secret.
    pub fn revoke_from_principal(&self, secret: &str, principal: &str) -> LedgerResult<usize> {
        self.revoke(secret, &Recipient::Principal(principal.to_string()))
    }

    fn revoke(&self, secret: &str, recipient: &Recipient) -> LedgerResult<usize> {
        validate_name("secret", secret)?;

        let write_txn = self.db.begin_write()?;
        if write_txn.open_table(SECRETS)?.get(secret)?.is_none() {
            return Err(LedgerError::NotFound(format!("secret {secret}")));
        }
        let removed = remove_wraps(&write_txn, Some(secret), |wrap| {
            wrap.secret == secret && wrap.recipient == *recipient
        })?;
        if removed == 0 {
            return Err(LedgerError::NotFound(format!(
                "wrap of secret {secret} for {recipient}"
            )));
        }
        write_txn.commit()?;

        info!(secret = %secret, recipient = %recipient, removed, "Secret revoked");
        Ok(removed)
    }

    /// Delete a secret and every wrap of it in one transaction.
    pub fn delete_secret(&self, name: &str) -> LedgerResult<()> {
        self.delete_secret_with(name, |_| Ok(()))
    }

    /// `delete_secret` with a hook run after each wrap removal. An error from
    /// the hook aborts the whole deletion.
    fn delete_secret_with(
        &self,
        name: &str,
        mut after_wrap_removed: impl FnMut(&WrapRecord) -> LedgerResult<()>,
    ) -> LedgerResult<()> {
        if is_reserved(name) {
            return Err(LedgerError::Forbidden(format!("secret name {name} is reserved")));
        }

        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut secrets = write_txn.open_table(SECRETS)?;
            if secrets.get(name)?.is_none() {
                return Err(LedgerError::NotFound(format!("secret {name}")));
            }

            let mut wraps = write_txn.open_table(WRAPS)?;
            let doomed = scan_wraps(&wraps, Some(name))?;
            for (key, wrap) in &doomed {
                wraps.remove(key.as_slice())?;
                after_wrap_removed(wrap)?;
            }
            secrets.remove(name)?;
            doomed.len()
        };
        write_txn.commit()?;

        info!(secret = %name, wraps = removed, "Secret deleted");
        Ok(())
    }

    /// Every secret the principal can open: wraps addressed to it directly,
    /// plus wraps addressed to its group unless that group is `default`.
    pub fn fetch_accessible(&self, principal: &str) -> LedgerResult<Vec<AccessibleSecret>> {
        self.collect_accessible(principal, None)
    }

    /// The single-secret form of `fetch_accessible`.
    pub fn fetch_secret(&self, principal: &str, secret: &str) -> LedgerResult<Vec<AccessibleSecret>> {
        self.collect_accessible(principal, Some(secret))
    }

    /// Whether the principal holds at least one wrap of the secret.
    pub fn can_read(&self, principal: &str, secret: &str) -> LedgerResult<bool> {
        match self.collect_accessible(principal, Some(secret)) {
            Ok(found) => Ok(!found.is_empty()),
            Err(LedgerError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn collect_accessible(
        &self,
        principal: &str,
        secret: Option<&str>,
    ) -> LedgerResult<Vec<AccessibleSecret>> {
        let read_txn = self.db.begin_read()?;
        let principals = read_txn.open_table(PRINCIPALS)?;
        let secrets = read_txn.open_table(SECRETS)?;
        let wraps = read_txn.open_table(WRAPS)?;

        let record: PrincipalRecord = get_row(&principals, principal)?
            .ok_or_else(|| LedgerError::NotFound(format!("principal {principal}")))?;
        if let Some(name) = secret {
            if secrets.get(name)?.is_none() {
                return Err(LedgerError::NotFound(format!("secret {name}")));
            }
        }

        let direct = Recipient::Principal(record.name.clone());
        let group = (record.group != DEFAULT_GROUP).then(|| Recipient::Group(record.group.clone()));

        let mut accessible = Vec::new();
        for (_, wrap) in scan_wraps(&wraps, secret)? {
            if wrap.recipient != direct && Some(&wrap.recipient) != group.as_ref() {
                continue;
            }
            let Some(stored) = get_row::<SecretRecord, _>(&secrets, &wrap.secret)? else {
                warn!(secret = %wrap.secret, "Wrap references a missing secret");
                continue;
            };
            accessible.push(AccessibleSecret {
                name: stored.name,
                payload: stored.payload,
                sealed_key: wrap.sealed_key,
                path: wrap.path,
                via: wrap.recipient,
            });
        }
        Ok(accessible)
    }

    /// Every secret with the recipients it is wrapped for.
    pub fn list_secrets(&self) -> LedgerResult<Vec<SecretSummary>> {
        let read_txn = self.db.begin_read()?;
        let secrets = read_txn.open_table(SECRETS)?;
        let wraps = read_txn.open_table(WRAPS)?;

        let mut summaries = Vec::new();
        for entry in secrets.iter()? {
            let (_, value) = entry?;
            let record: SecretRecord = decode_row(value.value())?;
            let recipients = scan_wraps(&wraps, Some(&record.name))?
                .into_iter()
                .map(|(_, wrap)| wrap.recipient)
                .collect();
            summaries.push(SecretSummary {
                name: record.name,
                created_by: record.created_by,
                recipients,
            });
        }
        Ok(summaries)
    }

    // =========================================================================
    // Groups
    // =========================================================================

    /// Create a group from a client-generated key pair.
    pub fn create_group(
        &self,
        name: &str,
        kind: Role,
        public_key: Vec<u8>,
        sealed_private_key: Vec<u8>,
    ) -> LedgerResult<()> {
        validate_name("group", name)?;
        validate_public_key("group", &public_key)?;
        if sealed_private_key.is_empty() {
            return Err(LedgerError::InvalidInput(
                "sealed group private key is required".to_string(),
            ));
        }

        let write_txn = self.db.begin_write()?;
        {
            let mut groups = write_txn.open_table(GROUPS)?;
            if is_reserved(name) || groups.get(name)?.is_some() {
                return Err(LedgerError::DuplicateName(format!("group {name}")));
            }
            let record = GroupRecord {
                name: name.to_string(),
                kind,
                public_key,
                sealed_private_key,
                builtin: false,
                created_at: Utc::now(),
            };
            groups.insert(name, encode_row(&record)?.as_slice())?;
        }
        write_txn.commit()?;

        info!(group = %name, kind = %kind, "Group created");
        Ok(())
    }

    /// Delete a group, its wraps, and move its members back to `default`.
    pub fn delete_group(&self, name: &str) -> LedgerResult<()> {
        if is_reserved(name) {
            return Err(LedgerError::Forbidden(format!("group {name} is built in")));
        }

        let write_txn = self.db.begin_write()?;
        {
            let mut groups = write_txn.open_table(GROUPS)?;
            if groups.get(name)?.is_none() {
                return Err(LedgerError::NotFound(format!("group {name}")));
            }
            groups.remove(name)?;
        }

        let group = Recipient::Group(name.to_string());
        let wraps = remove_wraps(&write_txn, None, |wrap| wrap.recipient == group)?;

        let members = {
            let mut principals = write_txn.open_table(PRINCIPALS)?;
            let mut members: Vec<PrincipalRecord> = Vec::new();
            for entry in principals.iter()? {
                let (_, value) = entry?;
                let record: PrincipalRecord = decode_row(value.value())?;
                if record.group == name {
                    members.push(record);
                }
            }
            for mut member in members.iter().cloned() {
                member.group = DEFAULT_GROUP.to_string();
                member.sealed_group_key = None;
                principals.insert(member.name.as_str(), encode_row(&member)?.as_slice())?;
            }
            members.len()
        };
        write_txn.commit()?;

        info!(group = %name, wraps, members, "Group deleted");
        Ok(())
    }

    pub fn get_group(&self, name: &str) -> LedgerResult<GroupRecord> {
        let read_txn = self.db.begin_read()?;
        let groups = read_txn.open_table(GROUPS)?;
        get_row(&groups, name)?.ok_or_else(|| LedgerError::NotFound(format!("group {name}")))
    }

    pub fn list_groups(&self) -> LedgerResult<Vec<GroupRecord>> {
        let read_txn = self.db.begin_read()?;
        let groups = read_txn.open_table(GROUPS)?;
        let mut records = Vec::new();
        for entry in groups.iter()? {
            let (_, value) = entry?;
            records.push(decode_row(value.value())?);
        }
        Ok(records)
    }

    // =========================================================================
    // Principals
    // =========================================================================

    /// Register a principal. New principals always start in `default`.
    pub fn register_principal(&self, principal: NewPrincipal) -> LedgerResult<()> {
        validate_name("principal", &principal.name)?;
        validate_public_key("principal", &principal.public_key)?;
        if principal.password_hash.is_empty() {
            return Err(LedgerError::InvalidInput("password is required".to_string()));
        }

        let write_txn = self.db.begin_write()?;
        {
            let mut principals = write_txn.open_table(PRINCIPALS)?;
            if principals.get(principal.name.as_str())?.is_some() {
                return Err(LedgerError::DuplicateName(format!("principal {}", principal.name)));
            }
            let record = PrincipalRecord {
                name: principal.name.clone(),
                kind: principal.kind,
                public_key: principal.public_key,
                group: DEFAULT_GROUP.to_string(),
                sealed_group_key: None,
                password_hash: principal.password_hash,
                created_at: Utc::now(),
            };
            principals.insert(principal.name.as_str(), encode_row(&record)?.as_slice())?;
        }
        write_txn.commit()?;

        info!(principal = %principal.name, kind = %principal.kind, "Principal registered");
        Ok(())
    }

    /// Move a principal to another group.
    ///
    /// Outside `default` the principal needs its own sealed copy of the group
    /// private key. Only its presence can be checked here; whether it actually
    /// opens to the group key is up to the client that sealed it.
    pub fn reassign_principal(
        &self,
        principal: &str,
        group: &str,
        sealed_group_key: Option<Vec<u8>>,
    ) -> LedgerResult<()> {
        let sealed_group_key = if group == DEFAULT_GROUP {
            None
        } else {
            Some(non_empty(sealed_group_key).ok_or_else(|| {
                LedgerError::InvalidInput("sealed group key is required".to_string())
            })?)
        };

        let write_txn = self.db.begin_write()?;
        {
            let groups = write_txn.open_table(GROUPS)?;
            if groups.get(group)?.is_none() {
                return Err(LedgerError::NotFound(format!("group {group}")));
            }
        }
        {
            let mut principals = write_txn.open_table(PRINCIPALS)?;
            let mut record: PrincipalRecord = get_row(&principals, principal)?
                .ok_or_else(|| LedgerError::NotFound(format!("principal {principal}")))?;
            record.group = group.to_string();
            record.sealed_group_key = sealed_group_key;
            principals.insert(principal, encode_row(&record)?.as_slice())?;
        }
        write_txn.commit()?;

        info!(principal = %principal, group = %group, "Principal reassigned");
        Ok(())
    }

    /// Delete a principal and every wrap addressed directly to it.
    pub fn delete_principal(&self, name: &str) -> LedgerResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut principals = write_txn.open_table(PRINCIPALS)?;
            if principals.remove(name)?.is_none() {
                return Err(LedgerError::NotFound(format!("principal {name}")));
            }
        }
        let direct = Recipient::Principal(name.to_string());
        let wraps = remove_wraps(&write_txn, None, |wrap| wrap.recipient == direct)?;
        write_txn.commit()?;

        info!(principal = %name, wraps, "Principal deleted");
        Ok(())
    }

    pub fn get_principal(&self, name: &str) -> LedgerResult<PrincipalRecord> {
        let read_txn = self.db.begin_read()?;
        let principals = read_txn.open_table(PRINCIPALS)?;
        get_row(&principals, name)?.ok_or_else(|| LedgerError::NotFound(format!("principal {name}")))
    }

    #[cfg(test)]
    fn wrap_count(&self) -> usize {
        let read_txn = self.db.begin_read().unwrap();
        let wraps = read_txn.open_table(WRAPS).unwrap();
        scan_wraps(&wraps, None).unwrap().len()
    }
}

/// Lookups run on the blocking pool so the caller's timeout can still fire
/// while redb reads.
impl CredentialVerifier for Arc<Ledger> {
    type Error = LedgerError;

    async fn lookup(&self, name: &str) -> Result<Option<Credentials>, LedgerError> {
        let ledger = Arc::clone(self);
        let name = name.to_string();
        tokio::task::spawn_blocking(move || match ledger.get_principal(&name) {
            Ok(record) => Ok(Some(Credentials {
                name: record.name,
                group: record.group,
                admin: record.kind.is_admin(),
                password_hash: record.password_hash,
            })),
            Err(LedgerError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        })
        .await?
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::storage::records::BootstrapAdmin;

    pub(crate) fn temp_ledger() -> (Ledger, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(&dir.path().join("ledger.redb")).unwrap();
        ledger
            .bootstrap(&Bootstrap {
                super_public_key: vec![9; 32],
                super_sealed_private_key: vec![8; 80],
                admin: Some(BootstrapAdmin {
                    principal: NewPrincipal {
                        name: "admin".to_string(),
                        kind: Role::Admin,
                        public_key: vec![1; 32],
                        password_hash: crate::crypto::hash_password(b"password").unwrap(),
                    },
                    sealed_group_key: vec![7; 80],
                }),
            })
            .unwrap();
        (ledger, dir)
    }

    pub(crate) fn register(ledger: &Ledger, name: &str, kind: Role) {
        ledger
            .register_principal(NewPrincipal {
                name: name.to_string(),
                kind,
                public_key: vec![2; 32],
                password_hash: vec![3; 48],
            })
            .unwrap();
    }

    fn client(name: &str, group: &str) -> Identity {
        Identity::new(name, group, false)
    }

    fn superuser() -> Identity {
        Identity::new("admin", SUPER_GROUP, true)
    }

    fn new_secret(name: &str, creator_key: Option<&[u8]>) -> NewSecret {
        NewSecret {
            name: name.to_string(),
            payload: b"ciphertext".to_vec(),
            super_key: b"sealed-for-super".to_vec(),
            creator_key: creator_key.map(<[u8]>::to_vec),
            path: Some("/etc/app/db.conf".to_string()),
        }
    }

    fn setup_group(ledger: &Ledger, name: &str) {
        ledger
            .create_group(name, Role::Client, vec![4; 32], vec![5; 80])
            .unwrap();
    }

    #[test]
    fn bootstrap_creates_builtin_groups_once() {
        let (ledger, _dir) = temp_ledger();
        assert!(ledger.is_initialized().unwrap());

        let groups = ledger.list_groups().unwrap();
        assert_eq!(groups.len(), 2);
        assert!(groups.iter().all(|g| g.builtin));

        let admin = ledger.get_principal("admin").unwrap();
        assert_eq!(admin.group, SUPER_GROUP);
        assert_eq!(admin.kind, Role::Admin);
    }

    #[test]
    fn create_secret_as_super_writes_supergroup_wrap() {
        let (ledger, _dir) = temp_ledger();
        ledger.create_secret(&superuser(), new_secret("db", None)).unwrap();

        let summaries = ledger.list_secrets().unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].recipients, vec![Recipient::Group(SUPER_GROUP.to_string())]);
    }

    #[test]
    fn create_secret_by_client_requires_creator_wrap() {
        let (ledger, _dir) = temp_ledger();
        register(&ledger, "alice", Role::Client);

        let result = ledger.create_secret(&client("alice", DEFAULT_GROUP), new_secret("db", None));
        assert!(matches!(result, Err(LedgerError::InvalidInput(_))));
        assert!(ledger.list_secrets().unwrap().is_empty());
        assert_eq!(ledger.wrap_count(), 0);

        ledger
            .create_secret(&client("alice", DEFAULT_GROUP), new_secret("db", Some(b"for-alice")))
            .unwrap();
        let fetched = ledger.fetch_accessible("alice").unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].sealed_key, b"for-alice");
        assert_eq!(fetched[0].path.as_deref(), Some("/etc/app/db.conf"));
    }

    #[test]
    fn duplicate_secret_name_is_rejected() {
        let (ledger, _dir) = temp_ledger();
        ledger.create_secret(&superuser(), new_secret("db", None)).unwrap();
        let result = ledger.create_secret(&superuser(), new_secret("db", None));
        assert!(matches!(result, Err(LedgerError::DuplicateName(_))));
        assert_eq!(ledger.wrap_count(), 1);
    }

    #[test]
    fn reserved_and_malformed_secret_names_are_rejected() {
        let (ledger, _dir) = temp_ledger();
        for name in ["", "super", "a/b", "tab\there"] {
            let result = ledger.create_secret(&superuser(), new_secret(name, None));
            assert!(matches!(result, Err(LedgerError::InvalidInput(_))), "{name:?}");
        }
    }

    #[test]
    fn assign_to_missing_secret_leaves_wraps_unchanged() {
        let (ledger, _dir) = temp_ledger();
        setup_group(&ledger, "ops");
        ledger.create_secret(&superuser(), new_secret("db", None)).unwrap();
        let before = ledger.wrap_count();

        let result = ledger.assign_to_group("nope", "ops", b"k".to_vec(), None);
        assert!(matches!(result, Err(LedgerError::NotFound(_))));
        assert_eq!(ledger.wrap_count(), before);

        let result = ledger.assign_to_group("db", "nope", b"k".to_vec(), None);
        assert!(matches!(result, Err(LedgerError::NotFound(_))));
        assert_eq!(ledger.wrap_count(), before);
    }

    #[test]
    fn assign_requires_sealed_key() {
        let (ledger, _dir) = temp_ledger();
        register(&ledger, "alice", Role::Client);
        ledger.create_secret(&superuser(), new_secret("db", None)).unwrap();

        let result = ledger.assign_to_principal("db", "alice", Vec::new(), None);
        assert!(matches!(result, Err(LedgerError::InvalidInput(_))));
    }

    #[test]
    fn duplicate_grants_are_appended() {
        let (ledger, _dir) = temp_ledger();
        register(&ledger, "alice", Role::Client);
        ledger.create_secret(&superuser(), new_secret("db", None)).unwrap();

        ledger.assign_to_principal("db", "alice", b"k1".to_vec(), None).unwrap();
        ledger.assign_to_principal("db", "alice", b"k2".to_vec(), None).unwrap();
        assert_eq!(ledger.fetch_accessible("alice").unwrap().len(), 2);

        // One revoke removes every copy.
        assert_eq!(ledger.revoke_from_principal("db", "alice").unwrap(), 2);
        assert!(ledger.fetch_accessible("alice").unwrap().is_empty());
    }

    #[test]
    fn revoke_touches_only_matching_wraps() {
        let (ledger, _dir) = temp_ledger();
        setup_group(&ledger, "ops");
        register(&ledger, "alice", Role::Client);
        ledger.create_secret(&superuser(), new_secret("db", None)).unwrap();
        ledger.create_secret(&superuser(), new_secret("api", None)).unwrap();
        ledger.assign_to_group("db", "ops", b"g".to_vec(), None).unwrap();
        ledger.assign_to_group("api", "ops", b"g".to_vec(), None).unwrap();
        ledger.assign_to_principal("db", "alice", b"p".to_vec(), None).unwrap();

        ledger.revoke_from_group("db", "ops").unwrap();

        let summaries = ledger.list_secrets().unwrap();
        let db = summaries.iter().find(|s| s.name == "db").unwrap();
        assert_eq!(
            db.recipients,
            vec![
                Recipient::Group(SUPER_GROUP.to_string()),
                Recipient::Principal("alice".to_string())
            ]
        );
        let api = summaries.iter().find(|s| s.name == "api").unwrap();
        assert_eq!(api.recipients.len(), 2);

        let again = ledger.revoke_from_group("db", "ops");
        assert!(matches!(again, Err(LedgerError::NotFound(_))));
    }

    #[test]
    fn revoke_of_unknown_secret_leaves_neighbours_alone() {
        let (ledger, _dir) = temp_ledger();
        register(&ledger, "alice", Role::Client);
        ledger.create_secret(&superuser(), new_secret("a", None)).unwrap();
        ledger.assign_to_principal("a", "alice", b"p".to_vec(), None).unwrap();

        // "a\0" shares its key prefix with the wraps of "a".
        let result = ledger.revoke_from_principal("a\0", "alice");
        assert!(matches!(result, Err(LedgerError::InvalidInput(_))));
        let result = ledger.revoke_from_principal("b", "alice");
        assert!(matches!(result, Err(LedgerError::NotFound(_))));

        assert_eq!(ledger.fetch_accessible("alice").unwrap().len(), 1);
    }

    #[test]
    fn wrap_scan_ignores_rows_of_other_secrets() {
        let (ledger, _dir) = temp_ledger();
        register(&ledger, "alice", Role::Client);
        ledger.create_secret(&superuser(), new_secret("a", None)).unwrap();
        ledger.assign_to_principal("a", "alice", b"p".to_vec(), None).unwrap();

        let read_txn = ledger.db.begin_read().unwrap();
        let wraps = read_txn.open_table(WRAPS).unwrap();
        assert!(scan_wraps(&wraps, Some("a\0")).unwrap().is_empty());
        assert_eq!(scan_wraps(&wraps, Some("a")).unwrap().len(), 2);
    }

    #[test]
    fn supergroup_wrap_cannot_be_revoked() {
        let (ledger, _dir) = temp_ledger();
        ledger.create_secret(&superuser(), new_secret("db", None)).unwrap();
        let result = ledger.revoke_from_group("db", SUPER_GROUP);
        assert!(matches!(result, Err(LedgerError::Forbidden(_))));
    }

    #[test]
    fn delete_secret_removes_all_wraps() {
        let (ledger, _dir) = temp_ledger();
        setup_group(&ledger, "ops");
        register(&ledger, "alice", Role::Client);
        ledger.create_secret(&superuser(), new_secret("db", None)).unwrap();
        ledger.create_secret(&superuser(), new_secret("api", None)).unwrap();
        ledger.assign_to_group("db", "ops", b"g".to_vec(), None).unwrap();
        ledger.assign_to_principal("db", "alice", b"p".to_vec(), None).unwrap();

        ledger.delete_secret("db").unwrap();
        assert_eq!(ledger.wrap_count(), 1);
        assert_eq!(ledger.list_secrets().unwrap().len(), 1);

        assert!(matches!(ledger.delete_secret("db"), Err(LedgerError::NotFound(_))));
        assert!(matches!(ledger.delete_secret("super"), Err(LedgerError::Forbidden(_))));
    }

    #[test]
    fn failed_wrap_deletion_rolls_back_everything() {
        let (ledger, _dir) = temp_ledger();
        setup_group(&ledger, "ops");
        register(&ledger, "alice", Role::Client);
        ledger.create_secret(&superuser(), new_secret("db", None)).unwrap();
        ledger.assign_to_group("db", "ops", b"g".to_vec(), None).unwrap();
        ledger.assign_to_principal("db", "alice", b"p".to_vec(), None).unwrap();

        let mut seen = 0;
        let result = ledger.delete_secret_with("db", |_| {
            seen += 1;
            if seen == 3 {
                Err(LedgerError::InvalidInput("injected failure".to_string()))
            } else {
                Ok(())
            }
        });
        assert!(result.is_err());
        assert_eq!(seen, 3);

        assert_eq!(ledger.wrap_count(), 3);
        assert_eq!(ledger.fetch_secret("alice", "db").unwrap().len(), 1);
    }

    #[test]
    fn default_group_members_only_see_direct_wraps() {
        let (ledger, _dir) = temp_ledger();
        register(&ledger, "alice", Role::Client);
        ledger.create_secret(&superuser(), new_secret("db", None)).unwrap();
        ledger.assign_to_principal("db", "alice", b"p".to_vec(), None).unwrap();

        let fetched = ledger.fetch_accessible("alice").unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].via, Recipient::Principal("alice".to_string()));
    }

    #[test]
    fn named_group_members_see_union_of_wraps() {
        let (ledger, _dir) = temp_ledger();
        setup_group(&ledger, "ops");
        register(&ledger, "alice", Role::Client);
        ledger.reassign_principal("alice", "ops", Some(b"ops-key-for-alice".to_vec())).unwrap();
        ledger.create_secret(&superuser(), new_secret("db", None)).unwrap();
        ledger.create_secret(&superuser(), new_secret("api", None)).unwrap();
        ledger.create_secret(&superuser(), new_secret("other", None)).unwrap();
        ledger.assign_to_group("db", "ops", b"g".to_vec(), None).unwrap();
        ledger.assign_to_principal("api", "alice", b"p".to_vec(), None).unwrap();

        let mut names: Vec<String> = ledger
            .fetch_accessible("alice")
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["api", "db"]);
        assert!(ledger.can_read("alice", "db").unwrap());
        assert!(!ledger.can_read("alice", "other").unwrap());
        assert!(!ledger.can_read("alice", "missing").unwrap());
    }

    #[test]
    fn supergroup_members_see_everything() {
        let (ledger, _dir) = temp_ledger();
        ledger.create_secret(&superuser(), new_secret("db", None)).unwrap();
        ledger.create_secret(&superuser(), new_secret("api", None)).unwrap();
        assert_eq!(ledger.fetch_accessible("admin").unwrap().len(), 2);
    }

    #[test]
    fn group_creation_rules() {
        let (ledger, _dir) = temp_ledger();
        setup_group(&ledger, "ops");

        let dup = ledger.create_group("ops", Role::Client, vec![4; 32], vec![5; 80]);
        assert!(matches!(dup, Err(LedgerError::DuplicateName(_))));
        let builtin = ledger.create_group("default", Role::Client, vec![4; 32], vec![5; 80]);
        assert!(matches!(builtin, Err(LedgerError::DuplicateName(_))));
        let short_key = ledger.create_group("dev", Role::Client, vec![4; 31], vec![5; 80]);
        assert!(matches!(short_key, Err(LedgerError::InvalidInput(_))));
    }

    #[test]
    fn delete_group_cascades_and_moves_members() {
        let (ledger, _dir) = temp_ledger();
        setup_group(&ledger, "ops");
        register(&ledger, "alice", Role::Client);
        ledger.reassign_principal("alice", "ops", Some(b"k".to_vec())).unwrap();
        ledger.create_secret(&superuser(), new_secret("db", None)).unwrap();
        ledger.assign_to_group("db", "ops", b"g".to_vec(), None).unwrap();

        ledger.delete_group("ops").unwrap();

        let alice = ledger.get_principal("alice").unwrap();
        assert_eq!(alice.group, DEFAULT_GROUP);
        assert!(alice.sealed_group_key.is_none());
        assert_eq!(ledger.wrap_count(), 1);
        assert!(matches!(ledger.get_group("ops"), Err(LedgerError::NotFound(_))));
        assert!(matches!(ledger.delete_group("super"), Err(LedgerError::Forbidden(_))));
        assert!(matches!(ledger.delete_group("default"), Err(LedgerError::Forbidden(_))));
    }

    #[test]
    fn reassign_to_default_clears_group_key() {
        let (ledger, _dir) = temp_ledger();
        setup_group(&ledger, "ops");
        register(&ledger, "alice", Role::Client);

        let missing_key = ledger.reassign_principal("alice", "ops", None);
        assert!(matches!(missing_key, Err(LedgerError::InvalidInput(_))));

        ledger.reassign_principal("alice", "ops", Some(b"k".to_vec())).unwrap();
        assert_eq!(ledger.get_principal("alice").unwrap().sealed_group_key, Some(b"k".to_vec()));

        ledger.reassign_principal("alice", DEFAULT_GROUP, Some(b"ignored".to_vec())).unwrap();
        let alice = ledger.get_principal("alice").unwrap();
        assert_eq!(alice.group, DEFAULT_GROUP);
        assert!(alice.sealed_group_key.is_none());

        let unknown = ledger.reassign_principal("bob", "ops", Some(b"k".to_vec()));
        assert!(matches!(unknown, Err(LedgerError::NotFound(_))));
    }

    #[test]
    fn delete_principal_removes_direct_wraps() {
        let (ledger, _dir) = temp_ledger();
        register(&ledger, "alice", Role::Client);
        ledger.create_secret(&superuser(), new_secret("db", None)).unwrap();
        ledger.assign_to_principal("db", "alice", b"p".to_vec(), None).unwrap();

        ledger.delete_principal("alice").unwrap();
        assert_eq!(ledger.wrap_count(), 1);
        assert!(matches!(ledger.delete_principal("alice"), Err(LedgerError::NotFound(_))));
    }

    #[test]
    fn register_rejects_duplicates() {
        let (ledger, _dir) = temp_ledger();
        register(&ledger, "alice", Role::Client);
        let result = ledger.register_principal(NewPrincipal {
            name: "alice".to_string(),
            kind: Role::Admin,
            public_key: vec![2; 32],
            password_hash: vec![3; 48],
        });
        assert!(matches!(result, Err(LedgerError::DuplicateName(_))));
    }

    #[tokio::test]
    async fn ledger_serves_as_credential_verifier() {
        let (ledger, _dir) = temp_ledger();
        let ledger = Arc::new(ledger);
        let admin = ledger.lookup("admin").await.unwrap().unwrap();
        assert!(admin.admin);
        assert!(admin.identity().superuser);
        assert!(ledger.lookup("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn credential_lookup_runs_under_session_timeout() {
        let (ledger, _dir) = temp_ledger();
        let ledger = Arc::new(ledger);
        let sessions = crate::session::SessionManager::new(crate::session::SessionConfig::default());

        let session = sessions.authenticate("admin", b"password", &ledger).await.unwrap();
        assert!(session.identity.superuser);
        let result = sessions.authenticate("ghost", b"password", &ledger).await;
        assert_eq!(result.unwrap_err(), crate::session::SessionError::AuthenticationFailed);
    }
}
