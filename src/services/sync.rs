// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Synchronization orchestrator.
//!
//! Coordinates a single sync run for one user:
//! 1. Check the credential and open a ledger entry (the per-user run
//!    lock is taken atomically with the open)
//! 2. Discover activities from the provider's list endpoint; unseen
//!    external ids become `Pending` records
//! 3. Select candidates for the run kind
//! 4. Fetch detail per candidate and apply the idempotent upsert
//! 5. Close the ledger entry with a terminal state
//!
//! Failure policy: one bad candidate never aborts the run, except an
//! authentication failure, which always does (and invalidates the
//! credential). Store write failures abort. Between candidates the
//! orchestrator re-checks its ledger entry so a reclaimed or cancelled
//! run stops without further mutation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{ProviderError, Result, SyncError};
use crate::models::{Activity, CounterDelta, DateRange, RunKind, RunState, SyncRun, SyncState};
use crate::services::provider::ProviderClient;
use crate::store::{ActivityStore, CredentialTracker, SyncRunLedger, UpsertOutcome};

/// Why candidate processing stopped early.
enum CandidateAbort {
    /// Provider rejected the credential; the whole run aborts.
    Auth(String),
    /// Unrecoverable error (store write, ledger inconsistency).
    Fatal(SyncError),
}

/// The synchronization orchestrator. One instance serves all users;
/// each run executes as one sequential task.
pub struct SyncOrchestrator {
    provider: Arc<dyn ProviderClient>,
    activities: Arc<dyn ActivityStore>,
    ledger: Arc<dyn SyncRunLedger>,
    credentials: Arc<dyn CredentialTracker>,
    config: Config,
    /// Cooperative cancellation flags for live runs, checked between
    /// candidates.
    cancel_flags: DashMap<Uuid, Arc<AtomicBool>>,
}

impl SyncOrchestrator {
    pub fn new(
        provider: Arc<dyn ProviderClient>,
        activities: Arc<dyn ActivityStore>,
        ledger: Arc<dyn SyncRunLedger>,
        credentials: Arc<dyn CredentialTracker>,
        config: Config,
    ) -> Self {
        Self {
            provider,
            activities,
            ledger,
            credentials,
            config,
            cancel_flags: DashMap::new(),
        }
    }

    /// Execute a sync run for one user and return the final ledger
    /// record.
    ///
    /// Errors are returned only when no run was opened
    /// (`CredentialInvalid`, `RunAlreadyInProgress`, missing range for a
    /// partial run). Once a ledger entry exists, the outcome (including
    /// aborts) is reported through the returned run's terminal state
    /// and `error_message`.
    ///
    /// `window` is required for [`RunKind::Partial`] and ignored for
    /// every other kind.
    #[tracing::instrument(name = "Sync run", skip(self, kind, window), fields(kind = ?kind))]
    pub async fn start_run(
        &self,
        user_id: u64,
        kind: RunKind,
        window: Option<DateRange>,
    ) -> Result<SyncRun> {
        if kind == RunKind::Partial && window.is_none() {
            return Err(SyncError::Internal(anyhow::anyhow!(
                "partial run requires a date range"
            )));
        }

        if !self.credentials.is_valid(user_id).await? {
            tracing::warn!(user_id, "Refusing sync run: credential not valid");
            return Err(SyncError::CredentialInvalid(user_id));
        }

        let run = self.ledger.create(user_id, kind).await?;
        tracing::info!(user_id, run_id = %run.id, "Sync run opened");

        let cancel_flag = Arc::new(AtomicBool::new(false));
        self.cancel_flags.insert(run.id, cancel_flag.clone());

        let outcome = match self.drive(&run, window, &cancel_flag).await {
            Ok(final_run) => Ok(final_run),
            Err(err) => self.fail_run(run.id, &err).await,
        };
        self.cancel_flags.remove(&run.id);

        if let Ok(final_run) = &outcome {
            tracing::info!(
                user_id,
                run_id = %final_run.id,
                state = %final_run.state,
                processed = final_run.processed,
                synced = final_run.synced,
                skipped = final_run.skipped,
                failed = final_run.failed,
                "Sync run finished"
            );
        }
        outcome
    }

    /// Cooperatively cancel a live run: the ledger entry moves to
    /// `Cancelled` immediately (counters stay as recorded) and the
    /// executing task stops at the next between-candidates check.
    pub async fn cancel_run(&self, run_id: Uuid) -> Result<SyncRun> {
        let cancelled = self
            .ledger
            .transition(run_id, RunState::Cancelled, None)
            .await?;
        if let Some(flag) = self.cancel_flags.get(&run_id) {
            flag.store(true, Ordering::Relaxed);
        }
        tracing::info!(run_id = %run_id, "Sync run cancelled");
        Ok(cancelled)
    }

    /// Current ledger record for a run.
    pub async fn run_status(&self, run_id: Uuid) -> Result<SyncRun> {
        self.ledger
            .get_run(run_id)
            .await?
            .ok_or(SyncError::RunNotFound(run_id))
    }

    /// Drive an opened run to a terminal state.
    async fn drive(
        &self,
        run: &SyncRun,
        window: Option<DateRange>,
        cancel: &AtomicBool,
    ) -> Result<SyncRun> {
        let user_id = run.user_id;
        let now = Utc::now();

        let discovery_window = match (run.kind, window) {
            (RunKind::Partial, Some(range)) => range,
            (RunKind::Partial, None) => {
                return Err(SyncError::Internal(anyhow::anyhow!(
                    "partial run requires a date range"
                )))
            }
            (RunKind::FullResync, _) => DateRange::new(DateTime::<Utc>::MIN_UTC, now),
            (RunKind::Manual | RunKind::Scheduled, _) => {
                DateRange::new(now - self.config.sync_lookback, now)
            }
        };

        self.ledger
            .transition(run.id, RunState::InProgress, None)
            .await?;

        if run.kind == RunKind::FullResync {
            let reset = self.activities.reset_all_to_pending(user_id).await?;
            tracing::info!(user_id, reset, "Reset activities for full resync");
        }

        match self
            .provider
            .fetch_activity_list(user_id, discovery_window)
            .await
        {
            Ok(summaries) => {
                let mut discovered = 0u32;
                for summary in summaries {
                    let stub = Activity::pending(
                        user_id,
                        summary.external_id,
                        summary.name,
                        summary.activity_type,
                        summary.start_time,
                        Utc::now(),
                    );
                    if self.activities.insert_pending(stub).await? {
                        discovered += 1;
                    }
                }
                tracing::debug!(user_id, discovered, "Discovery complete");
            }
            Err(err) => return self.abort_for_provider(run.id, user_id, err).await,
        }

        let candidates = self
            .select_candidates(user_id, run.kind, discovery_window)
            .await?;
        tracing::info!(
            user_id,
            run_id = %run.id,
            candidates = candidates.len(),
            "Candidates selected"
        );

        for candidate in candidates {
            if cancel.load(Ordering::Relaxed) {
                tracing::info!(run_id = %run.id, "Cancellation observed between candidates");
                return self.run_status(run.id).await;
            }

            // Fail fast if the reconciliation sweep reclaimed this run
            // (or it was cancelled from outside): no further mutations.
            let current = self.run_status(run.id).await?;
            if current.state != RunState::InProgress {
                tracing::warn!(
                    run_id = %run.id,
                    state = %current.state,
                    "Run no longer in progress, abandoning continuation"
                );
                return Ok(current);
            }

            if Utc::now() - current.started_at > self.config.run_timeout {
                tracing::warn!(run_id = %run.id, "Run timeout exceeded");
                return self
                    .ledger
                    .transition(
                        run.id,
                        RunState::Failed,
                        Some("run timeout exceeded".to_string()),
                    )
                    .await;
            }

            match self.process_candidate(user_id, &candidate).await {
                Ok(delta) => self.ledger.append_progress(run.id, delta).await?,
                Err(CandidateAbort::Auth(reason)) => {
                    // Invalidate first: the credential invariant holds
                    // even if the ledger writes below lose a race
                    // against cancellation or reclamation.
                    self.credentials.mark_invalid(user_id, &reason).await?;
                    self.ledger
                        .append_progress(run.id, CounterDelta::failed())
                        .await?;
                    tracing::error!(
                        user_id,
                        run_id = %run.id,
                        error = %reason,
                        "Authentication failure, aborting run"
                    );
                    return self
                        .ledger
                        .transition(
                            run.id,
                            RunState::Failed,
                            Some(format!("provider authentication failure: {}", reason)),
                        )
                        .await;
                }
                Err(CandidateAbort::Fatal(err)) => return Err(err),
            }
        }

        self.ledger
            .transition(run.id, RunState::Completed, None)
            .await
    }

    /// Process one candidate. Per-item provider failures are absorbed
    /// into the returned counter delta; only auth and store failures
    /// abort.
    async fn process_candidate(
        &self,
        user_id: u64,
        candidate: &Activity,
    ) -> std::result::Result<CounterDelta, CandidateAbort> {
        let external_id = candidate.external_id.as_str();
        let was_failed = candidate.sync_state == SyncState::Failed;

        self.activities
            .mark_sync_state(user_id, external_id, SyncState::InProgress, None)
            .await
            .map_err(CandidateAbort::Fatal)?;

        match self
            .provider
            .fetch_activity_detail(user_id, external_id)
            .await
        {
            Ok(detail) => {
                let outcome = self
                    .activities
                    .upsert(user_id, external_id, detail.into_update())
                    .await
                    .map_err(CandidateAbort::Fatal)?;

                // Unchanged content is skipped, unless this attempt is
                // the retry of a failed record, which never completed
                // before.
                let (state, delta) = match outcome {
                    UpsertOutcome::Inserted | UpsertOutcome::Updated => {
                        (SyncState::Completed, CounterDelta::synced())
                    }
                    UpsertOutcome::Unchanged if was_failed => {
                        (SyncState::Completed, CounterDelta::synced())
                    }
                    UpsertOutcome::Unchanged => (SyncState::Skipped, CounterDelta::skipped()),
                };

                self.activities
                    .mark_sync_state(user_id, external_id, state, None)
                    .await
                    .map_err(CandidateAbort::Fatal)?;

                tracing::debug!(user_id, external_id, state = %state, "Candidate processed");
                Ok(delta)
            }
            Err(ProviderError::Auth(reason)) => {
                self.activities
                    .mark_sync_state(
                        user_id,
                        external_id,
                        SyncState::Failed,
                        Some(format!("provider authentication failure: {}", reason)),
                    )
                    .await
                    .map_err(CandidateAbort::Fatal)?;
                Err(CandidateAbort::Auth(reason))
            }
            Err(err) => {
                // Transient and permanent item errors: record and move on.
                tracing::warn!(
                    user_id,
                    external_id,
                    error = %err,
                    "Candidate fetch failed"
                );
                self.activities
                    .mark_sync_state(user_id, external_id, SyncState::Failed, Some(err.to_string()))
                    .await
                    .map_err(CandidateAbort::Fatal)?;
                Ok(CounterDelta::failed())
            }
        }
    }

    /// Candidates for one run, oldest activity date first.
    async fn select_candidates(
        &self,
        user_id: u64,
        kind: RunKind,
        window: DateRange,
    ) -> Result<Vec<Activity>> {
        match kind {
            // Everything was reset to pending already
            RunKind::FullResync => self.activities.query(user_id, None, None).await,
            RunKind::Manual | RunKind::Scheduled => {
                self.pending_plus_retries(user_id, None).await
            }
            RunKind::Partial => self.pending_plus_retries(user_id, Some(window)).await,
        }
    }

    /// Pending activities plus failed ones past the retry cutoff.
    async fn pending_plus_retries(
        &self,
        user_id: u64,
        range: Option<DateRange>,
    ) -> Result<Vec<Activity>> {
        let mut candidates = self
            .activities
            .query(user_id, Some(&[SyncState::Pending]), range)
            .await?;

        let cutoff = Utc::now() - self.config.retry_cutoff;
        let retries = self
            .activities
            .query(user_id, Some(&[SyncState::Failed]), range)
            .await?
            .into_iter()
            .filter(|activity| activity.last_sync_attempt.map_or(true, |at| at < cutoff));
        candidates.extend(retries);

        Ok(candidates)
    }

    /// A run-level provider failure: invalidate the credential on auth
    /// rejection, then fail the run with the error message.
    async fn abort_for_provider(
        &self,
        run_id: Uuid,
        user_id: u64,
        err: ProviderError,
    ) -> Result<SyncRun> {
        if err.is_auth() {
            self.credentials.mark_invalid(user_id, &err.to_string()).await?;
        }
        tracing::error!(user_id, run_id = %run_id, error = %err, "Activity list fetch failed");
        self.ledger
            .transition(run_id, RunState::Failed, Some(err.to_string()))
            .await
    }

    /// Close a run after an internal error, tolerating the case where
    /// it already reached a terminal state (reclaimed or cancelled).
    async fn fail_run(&self, run_id: Uuid, err: &SyncError) -> Result<SyncRun> {
        tracing::error!(run_id = %run_id, error = %err, "Sync run aborted");
        match self
            .ledger
            .transition(run_id, RunState::Failed, Some(err.to_string()))
            .await
        {
            Ok(run) => Ok(run),
            Err(SyncError::InvalidTransition { .. }) => self.run_status(run_id).await,
            Err(other) => Err(other),
        }
    }
}
