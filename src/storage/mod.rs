// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Secret Distribution Ledger
//!
//! Persistent storage for principals, groups, secrets and the wraps that tie
//! them together, kept in a single redb database under the data directory.
//!
//! ## Security Model
//!
//! - The server only ever stores ciphertext and public keys
//! - A secret is readable by a principal iff a wrap addresses the principal
//!   directly, or addresses its group and that group is not `default`
//! - Every secret carries a wrap for the supergroup, which cannot be revoked
//!
//! ## Storage Layout
//!
//! ```text
//! /data/
//!   ledger.redb     # principals, groups, secrets, wraps, meta
//! ```

pub mod ledger;
pub mod paths;
pub mod records;

pub use ledger::{validate_name, Ledger};
pub use paths::StoragePaths;
pub use records::{
    AccessibleSecret, Bootstrap, BootstrapAdmin, GroupRecord, NewPrincipal, NewSecret,
    PrincipalRecord, Recipient, SecretRecord, SecretSummary, WrapRecord,
};

/// Ledger errors.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    DuplicateName(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("blocking task failed: {0}")]
    Blocking(#[from] tokio::task::JoinError),
}

pub type LedgerResult<T> = Result<T, LedgerError>;
