// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Storage contracts the orchestrator depends on.
//!
//! Three seams: activity records, the run ledger, and credential
//! validity. The orchestrator only ever talks to these traits; the
//! in-memory implementation in [`memory`] backs the daemon and the
//! test-suite, and a database-backed adapter can slot in behind the
//! same contracts.

pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Activity, ActivityUpdate, CounterDelta, CredentialRecord, DateRange, RunKind, RunState,
    SyncRun, SyncState,
};

/// Outcome of an idempotent activity upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No record existed for this (`user_id`, `external_id`) pair
    Inserted,
    /// Record existed and its content hash changed
    Updated,
    /// Record existed with identical content
    Unchanged,
}

/// Durable keyed storage for activity records.
///
/// Implementations must serialize writes per (`user_id`, `external_id`)
/// key so racing upserts never produce duplicate records.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn get_activity(&self, user_id: u64, external_id: &str) -> Result<Option<Activity>>;

    /// Create a `Pending` stub for a newly discovered external id.
    /// Returns `false` (and leaves the record alone) if the id is
    /// already known.
    async fn insert_pending(&self, activity: Activity) -> Result<bool>;

    /// Apply fetched detail fields by external id: insert if absent,
    /// otherwise overwrite metric fields and recompute the content
    /// hash. Content-identical payloads report [`UpsertOutcome::Unchanged`]
    /// and leave the record untouched.
    async fn upsert(
        &self,
        user_id: u64,
        external_id: &str,
        update: ActivityUpdate,
    ) -> Result<UpsertOutcome>;

    /// Advance an activity's sync state. Marking `InProgress` stamps
    /// `last_sync_attempt`; the error message is recorded on `Failed`
    /// and cleared on `Completed`/`Skipped`. Transitions the state
    /// machine forbids are store errors.
    async fn mark_sync_state(
        &self,
        user_id: u64,
        external_id: &str,
        state: SyncState,
        error: Option<String>,
    ) -> Result<()>;

    /// Activities for one owner, optionally filtered by state and by
    /// activity date, ordered oldest-activity-date-first. The returned
    /// sequence is finite and restartable (a fresh query re-reads the
    /// store).
    async fn query(
        &self,
        user_id: u64,
        states: Option<&[SyncState]>,
        range: Option<DateRange>,
    ) -> Result<Vec<Activity>>;

    /// Reset every activity of one owner to `Pending` (full-resync
    /// preparation). Returns how many records were reset.
    async fn reset_all_to_pending(&self, user_id: u64) -> Result<u32>;
}

/// Durable log of synchronization runs.
#[async_trait]
pub trait SyncRunLedger: Send + Sync {
    /// Open a ledger entry in state `Started`.
    ///
    /// This is the concurrency guard: the per-user run lock is taken
    /// atomically with the check, so of two racing `create` calls
    /// exactly one wins and the other gets
    /// [`crate::error::SyncError::RunAlreadyInProgress`].
    async fn create(&self, user_id: u64, kind: RunKind) -> Result<SyncRun>;

    async fn get_run(&self, run_id: Uuid) -> Result<Option<SyncRun>>;

    /// Add counter increments to a live run. Appending to a terminal
    /// run is rejected; recorded counters are final.
    async fn append_progress(&self, run_id: Uuid, delta: CounterDelta) -> Result<()>;

    /// Move a run to a new state. Terminal transitions set
    /// `completed_at` and release the owner's run lock; transitions out
    /// of a terminal state are rejected.
    async fn transition(
        &self,
        run_id: Uuid,
        next: RunState,
        error: Option<String>,
    ) -> Result<SyncRun>;

    /// Non-terminal runs started before `cutoff` (candidates for
    /// stuck-run reclamation).
    async fn find_stuck(&self, cutoff: DateTime<Utc>) -> Result<Vec<SyncRun>>;
}

/// Tracks whether each user's provider credential is currently usable.
#[async_trait]
pub trait CredentialTracker: Send + Sync {
    /// Store or replace a user's credential record (enrollment).
    async fn put(&self, record: CredentialRecord) -> Result<()>;

    async fn get_credential(&self, user_id: u64) -> Result<Option<CredentialRecord>>;

    /// `false` for unknown users.
    async fn is_valid(&self, user_id: u64) -> Result<bool>;

    async fn mark_invalid(&self, user_id: u64, reason: &str) -> Result<()>;

    /// Record an explicit successful validation at `validated_at`.
    async fn mark_valid(&self, user_id: u64, validated_at: DateTime<Utc>) -> Result<()>;

    /// Valid credentials whose last confirmation is older than `cutoff`
    /// (or that were never confirmed).
    async fn find_due_for_validation(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<CredentialRecord>>;

    /// All currently valid credentials (sweep input).
    async fn list_valid(&self) -> Result<Vec<CredentialRecord>>;
}
