// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Reconciliation: stuck-run reclamation and credential revalidation.
//!
//! Both operations are periodic sweeps driven by an external trigger
//! (the daemon's interval loop, or anything else that calls them).
//! Both are idempotent: a reclaimed run is terminal and never
//! re-selected, and a freshly confirmed credential is no longer due.

use std::sync::Arc;

use chrono::Utc;
use futures_util::{stream, StreamExt};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::models::RunState;
use crate::services::provider::ProviderClient;
use crate::store::{CredentialTracker, SyncRunLedger};
use crate::time_utils::format_utc_rfc3339;

/// Error message recorded on runs reclaimed by the sweep.
pub const STUCK_RUN_MESSAGE: &str = "stuck run reclaimed";

/// Upper bound on concurrent credential probes per sweep.
const MAX_CONCURRENT_PROBES: usize = 8;

/// Result of one credential revalidation sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RevalidationSummary {
    /// Credentials that were due and got probed.
    pub probed: u32,
    /// Probes that confirmed the credential.
    pub confirmed: u32,
    /// Probes that failed; credential marked invalid.
    pub invalidated: u32,
}

/// Periodic reconciliation over the run ledger and credential tracker.
pub struct ReconcileService {
    ledger: Arc<dyn SyncRunLedger>,
    credentials: Arc<dyn CredentialTracker>,
    provider: Arc<dyn ProviderClient>,
    config: Config,
}

impl ReconcileService {
    pub fn new(
        ledger: Arc<dyn SyncRunLedger>,
        credentials: Arc<dyn CredentialTracker>,
        provider: Arc<dyn ProviderClient>,
        config: Config,
    ) -> Self {
        Self {
            ledger,
            credentials,
            provider,
            config,
        }
    }

    /// Forcibly fail runs left in a non-terminal state past the stuck
    /// threshold. Returns the ids of the runs reclaimed by this call.
    ///
    /// Safe to run concurrently with itself and with live orchestrators:
    /// a run another sweep already closed loses the transition race and
    /// is simply not counted again.
    pub async fn reconcile_stuck_runs(&self) -> Result<Vec<Uuid>> {
        let cutoff = Utc::now() - self.config.stuck_run_threshold;
        let stuck = self.ledger.find_stuck(cutoff).await?;

        let mut reclaimed = Vec::new();
        for run in stuck {
            match self
                .ledger
                .transition(run.id, RunState::Failed, Some(STUCK_RUN_MESSAGE.to_string()))
                .await
            {
                Ok(_) => {
                    tracing::warn!(
                        run_id = %run.id,
                        user_id = run.user_id,
                        started_at = %format_utc_rfc3339(run.started_at),
                        "Reclaimed stuck run"
                    );
                    reclaimed.push(run.id);
                }
                // Lost the race against another sweep or the run's own
                // terminal transition; nothing left to do.
                Err(SyncError::InvalidTransition { .. }) => {}
                Err(other) => return Err(other),
            }
        }

        if !reclaimed.is_empty() {
            tracing::info!(count = reclaimed.len(), "Stuck-run reconciliation complete");
        }
        Ok(reclaimed)
    }

    /// Probe every valid credential whose last confirmation is older
    /// than the revalidation interval. Probe success refreshes
    /// `last_validated_at`; probe failure marks the credential invalid
    /// with the returned error.
    pub async fn revalidate_due_credentials(&self) -> Result<RevalidationSummary> {
        let cutoff = Utc::now() - self.config.credential_revalidation_interval;
        let due = self.credentials.find_due_for_validation(cutoff).await?;

        let mut summary = RevalidationSummary {
            probed: due.len() as u32,
            ..Default::default()
        };
        if due.is_empty() {
            return Ok(summary);
        }

        let probes = stream::iter(due)
            .map(|record| {
                let provider = Arc::clone(&self.provider);
                async move {
                    let outcome = provider.validate_credential(record.user_id).await;
                    (record, outcome)
                }
            })
            .buffer_unordered(MAX_CONCURRENT_PROBES)
            .collect::<Vec<_>>()
            .await;

        for (record, outcome) in probes {
            match outcome {
                Ok(()) => {
                    self.credentials
                        .mark_valid(record.user_id, Utc::now())
                        .await?;
                    summary.confirmed += 1;
                    tracing::debug!(user_id = record.user_id, "Credential confirmed");
                }
                Err(err) => {
                    self.credentials
                        .mark_invalid(record.user_id, &err.to_string())
                        .await?;
                    summary.invalidated += 1;
                    tracing::warn!(
                        user_id = record.user_id,
                        username = %record.garmin_username,
                        error = %err,
                        "Credential validation failed, marked invalid"
                    );
                }
            }
        }

        tracing::info!(
            probed = summary.probed,
            confirmed = summary.confirmed,
            invalidated = summary.invalidated,
            "Credential revalidation sweep complete"
        );
        Ok(summary)
    }
}
