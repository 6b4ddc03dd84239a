// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Periodic sweep loop for the daemon.
//!
//! Each iteration reclaims stuck runs, revalidates due credentials and
//! then triggers a scheduled sync run for every user with a valid
//! credential. A user whose previous run is still live is skipped; the
//! per-user run lock makes that a normal, quiet outcome.

use std::sync::Arc;

use tokio::time::MissedTickBehavior;

use crate::config::Config;
use crate::error::SyncError;
use crate::models::RunKind;
use crate::services::reconcile::ReconcileService;
use crate::services::sync::SyncOrchestrator;
use crate::store::CredentialTracker;

pub struct SweepScheduler {
    orchestrator: Arc<SyncOrchestrator>,
    reconcile: Arc<ReconcileService>,
    credentials: Arc<dyn CredentialTracker>,
    config: Config,
}

impl SweepScheduler {
    pub fn new(
        orchestrator: Arc<SyncOrchestrator>,
        reconcile: Arc<ReconcileService>,
        credentials: Arc<dyn CredentialTracker>,
        config: Config,
    ) -> Self {
        Self {
            orchestrator,
            reconcile,
            credentials,
            config,
        }
    }

    /// Run sweep iterations forever at the configured interval.
    pub async fn run(&self) {
        let period = self
            .config
            .sweep_interval
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(300));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(period_secs = period.as_secs(), "Sweep scheduler started");
        loop {
            ticker.tick().await;
            self.sweep_once().await;
        }
    }

    /// One sweep iteration. Failures are logged, never fatal; the next
    /// iteration gets another chance.
    pub async fn sweep_once(&self) {
        if let Err(err) = self.reconcile.reconcile_stuck_runs().await {
            tracing::error!(error = %err, "Stuck-run reconciliation failed");
        }

        if let Err(err) = self.reconcile.revalidate_due_credentials().await {
            tracing::error!(error = %err, "Credential revalidation failed");
        }

        let users = match self.credentials.list_valid().await {
            Ok(records) => records,
            Err(err) => {
                tracing::error!(error = %err, "Could not list valid credentials");
                return;
            }
        };

        for record in users {
            match self
                .orchestrator
                .start_run(record.user_id, RunKind::Scheduled, None)
                .await
            {
                Ok(run) => {
                    tracing::debug!(
                        user_id = record.user_id,
                        run_id = %run.id,
                        state = %run.state,
                        "Scheduled sync finished"
                    );
                }
                Err(SyncError::RunAlreadyInProgress(_)) => {
                    tracing::debug!(
                        user_id = record.user_id,
                        "Skipping scheduled sync: run already in progress"
                    );
                }
                Err(SyncError::CredentialInvalid(_)) => {
                    // Credential went invalid between listing and start
                    tracing::debug!(
                        user_id = record.user_id,
                        "Skipping scheduled sync: credential no longer valid"
                    );
                }
                Err(err) => {
                    tracing::error!(
                        user_id = record.user_id,
                        error = %err,
                        "Scheduled sync failed to start"
                    );
                }
            }
        }
    }
}
