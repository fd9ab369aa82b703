// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Idle Session Sweeper
//!
//! Background task that prunes expired sessions on a fixed interval. `validate`
//! already rejects stale sessions inline; the sweep only bounds how long dead
//! entries occupy the table.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::SessionManager;

pub struct SessionSweeper {
    sessions: Arc<SessionManager>,
    interval: Duration,
}

impl SessionSweeper {
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        let interval = sessions.config().sweep_interval;
        Self { sessions, interval }
    }

    /// Run the sweep loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(sweeper.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Session sweeper starting"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Session sweeper shutting down");
                    return;
                }
            }

            let removed = self.sessions.sweep();
            if removed > 0 {
                debug!(removed, remaining = self.sessions.len(), "Swept expired sessions");
            }
        }
    }
}
