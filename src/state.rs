// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::session::{SessionConfig, SessionManager};
use crate::storage::Ledger;

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
    pub sessions: Arc<SessionManager>,
}

impl AppState {
    pub fn new(ledger: Ledger, session_config: SessionConfig) -> Self {
        Self {
            ledger: Arc::new(ledger),
            sessions: Arc::new(SessionManager::new(session_config)),
        }
    }
}
