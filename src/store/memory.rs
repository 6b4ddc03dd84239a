// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory reference implementation of the storage contracts.
//!
//! Backed by concurrent maps; writes to one activity go through that
//! key's map entry, which serializes racing upserts the way a per-key
//! transaction would. The per-user run lock is a separate map whose
//! entry is reserved atomically with the `create` check.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use async_trait::async_trait;

use crate::error::{Result, SyncError};
use crate::models::{
    payload_hash, Activity, ActivityUpdate, CounterDelta, CredentialRecord, DateRange, RunKind,
    RunState, SyncRun, SyncState,
};
use crate::store::{ActivityStore, CredentialTracker, SyncRunLedger, UpsertOutcome};

/// In-memory store implementing all three storage contracts.
#[derive(Default)]
pub struct MemoryStore {
    activities: DashMap<(u64, String), Activity>,
    runs: DashMap<Uuid, SyncRun>,
    /// Run lock: owner -> id of the active (non-terminal) run.
    active_runs: DashMap<u64, Uuid>,
    credentials: DashMap<u64, CredentialRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a fully-formed activity record in place, replacing any
    /// existing record for its key. Restore/seeding helper; normal
    /// ingestion goes through `insert_pending` + `upsert`.
    pub fn seed_activity(&self, activity: Activity) {
        self.activities
            .insert((activity.user_id, activity.external_id.clone()), activity);
    }

    fn apply_update(activity: &mut Activity, update: ActivityUpdate, hash: String) {
        activity.name = update.name;
        activity.activity_type = update.activity_type;
        activity.start_time = update.start_time;
        activity.duration_secs = update.duration_secs;
        activity.distance_meters = update.distance_meters;
        activity.calories = update.calories;
        activity.average_heart_rate = update.average_heart_rate;
        activity.max_heart_rate = update.max_heart_rate;
        activity.elevation_gain_meters = update.elevation_gain_meters;
        activity.average_speed_kmh = update.average_speed_kmh;
        activity.raw_payload = update.raw_payload;
        activity.content_hash = Some(hash);
        activity.updated_at = Utc::now();
    }
}

#[async_trait]
impl ActivityStore for MemoryStore {
    async fn get_activity(&self, user_id: u64, external_id: &str) -> Result<Option<Activity>> {
        Ok(self
            .activities
            .get(&(user_id, external_id.to_string()))
            .map(|entry| entry.value().clone()))
    }

    async fn insert_pending(&self, activity: Activity) -> Result<bool> {
        match self
            .activities
            .entry((activity.user_id, activity.external_id.clone()))
        {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(vacant) => {
                vacant.insert(activity);
                Ok(true)
            }
        }
    }

    async fn upsert(
        &self,
        user_id: u64,
        external_id: &str,
        update: ActivityUpdate,
    ) -> Result<UpsertOutcome> {
        let hash = payload_hash(&update.raw_payload);
        match self.activities.entry((user_id, external_id.to_string())) {
            Entry::Occupied(mut occupied) => {
                let activity = occupied.get_mut();
                if activity.content_hash.as_deref() == Some(hash.as_str()) {
                    return Ok(UpsertOutcome::Unchanged);
                }
                Self::apply_update(activity, update, hash);
                Ok(UpsertOutcome::Updated)
            }
            Entry::Vacant(vacant) => {
                let now = Utc::now();
                let mut activity = Activity::pending(
                    user_id,
                    external_id.to_string(),
                    update.name.clone(),
                    update.activity_type.clone(),
                    update.start_time,
                    now,
                );
                // The record is born mid-attempt; the caller advances it
                // to its per-pass outcome.
                activity.sync_state = SyncState::InProgress;
                activity.last_sync_attempt = Some(now);
                Self::apply_update(&mut activity, update, hash);
                vacant.insert(activity);
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn mark_sync_state(
        &self,
        user_id: u64,
        external_id: &str,
        state: SyncState,
        error: Option<String>,
    ) -> Result<()> {
        let mut entry = self
            .activities
            .get_mut(&(user_id, external_id.to_string()))
            .ok_or_else(|| {
                SyncError::Store(format!(
                    "activity {} not found for user {}",
                    external_id, user_id
                ))
            })?;
        let activity = entry.value_mut();

        if !activity.sync_state.can_transition_to(state) {
            return Err(SyncError::Store(format!(
                "illegal activity transition {} -> {} for {}",
                activity.sync_state, state, external_id
            )));
        }

        activity.sync_state = state;
        activity.updated_at = Utc::now();
        match state {
            SyncState::InProgress => {
                activity.last_sync_attempt = Some(Utc::now());
            }
            SyncState::Completed | SyncState::Skipped => {
                activity.sync_error = None;
            }
            SyncState::Failed => {
                activity.sync_error = error;
            }
            SyncState::Pending => {}
        }
        Ok(())
    }

    async fn query(
        &self,
        user_id: u64,
        states: Option<&[SyncState]>,
        range: Option<DateRange>,
    ) -> Result<Vec<Activity>> {
        let mut results: Vec<Activity> = self
            .activities
            .iter()
            .filter(|entry| entry.key().0 == user_id)
            .map(|entry| entry.value().clone())
            .filter(|activity| match states {
                Some(wanted) => wanted.contains(&activity.sync_state),
                None => true,
            })
            .filter(|activity| match range {
                Some(window) => window.contains(activity.start_time),
                None => true,
            })
            .collect();

        results.sort_by_key(|activity| activity.start_time);
        Ok(results)
    }

    async fn reset_all_to_pending(&self, user_id: u64) -> Result<u32> {
        let mut reset = 0;
        for mut entry in self.activities.iter_mut() {
            if entry.key().0 != user_id {
                continue;
            }
            let activity = entry.value_mut();
            if activity.sync_state != SyncState::Pending {
                activity.sync_state = SyncState::Pending;
                activity.updated_at = Utc::now();
                reset += 1;
            }
        }
        Ok(reset)
    }
}

#[async_trait]
impl SyncRunLedger for MemoryStore {
    async fn create(&self, user_id: u64, kind: RunKind) -> Result<SyncRun> {
        let run = SyncRun::new(user_id, kind, Utc::now());

        // Reserve the run lock first; the entry guard is the atomic
        // check-and-set. Dropped before touching the runs map so the
        // two maps are never locked together.
        match self.active_runs.entry(user_id) {
            Entry::Occupied(_) => return Err(SyncError::RunAlreadyInProgress(user_id)),
            Entry::Vacant(vacant) => {
                vacant.insert(run.id);
            }
        }

        self.runs.insert(run.id, run.clone());
        Ok(run)
    }

    async fn get_run(&self, run_id: Uuid) -> Result<Option<SyncRun>> {
        Ok(self.runs.get(&run_id).map(|entry| entry.value().clone()))
    }

    async fn append_progress(&self, run_id: Uuid, delta: CounterDelta) -> Result<()> {
        let mut entry = self
            .runs
            .get_mut(&run_id)
            .ok_or(SyncError::RunNotFound(run_id))?;
        let run = entry.value_mut();

        if run.state.is_terminal() {
            return Err(SyncError::InvalidTransition {
                run_id,
                detail: format!("cannot append progress to {} run", run.state),
            });
        }

        run.apply_delta(delta);
        Ok(())
    }

    async fn transition(
        &self,
        run_id: Uuid,
        next: RunState,
        error: Option<String>,
    ) -> Result<SyncRun> {
        let (snapshot, release_lock) = {
            let mut entry = self
                .runs
                .get_mut(&run_id)
                .ok_or(SyncError::RunNotFound(run_id))?;
            let run = entry.value_mut();

            if !run.state.can_transition_to(next) {
                return Err(SyncError::InvalidTransition {
                    run_id,
                    detail: format!("{} -> {}", run.state, next),
                });
            }

            run.state = next;
            if let Some(message) = error {
                run.error_message = Some(message);
            }
            let release = next.is_terminal();
            if release {
                run.completed_at = Some(Utc::now());
            }
            (run.clone(), release)
        };

        if release_lock {
            // Guarded removal: never clobber a newer run's lock.
            self.active_runs
                .remove_if(&snapshot.user_id, |_, active| *active == run_id);
        }

        Ok(snapshot)
    }

    async fn find_stuck(&self, cutoff: DateTime<Utc>) -> Result<Vec<SyncRun>> {
        Ok(self
            .runs
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|run| !run.state.is_terminal() && run.started_at < cutoff)
            .collect())
    }
}

#[async_trait]
impl CredentialTracker for MemoryStore {
    async fn put(&self, record: CredentialRecord) -> Result<()> {
        self.credentials.insert(record.user_id, record);
        Ok(())
    }

    async fn get_credential(&self, user_id: u64) -> Result<Option<CredentialRecord>> {
        Ok(self
            .credentials
            .get(&user_id)
            .map(|entry| entry.value().clone()))
    }

    async fn is_valid(&self, user_id: u64) -> Result<bool> {
        Ok(self
            .credentials
            .get(&user_id)
            .map(|entry| entry.value().is_valid)
            .unwrap_or(false))
    }

    async fn mark_invalid(&self, user_id: u64, reason: &str) -> Result<()> {
        let mut entry = self.credentials.get_mut(&user_id).ok_or_else(|| {
            SyncError::Store(format!("no credential record for user {}", user_id))
        })?;
        let record = entry.value_mut();
        record.is_valid = false;
        record.validation_error = Some(reason.to_string());
        Ok(())
    }

    async fn mark_valid(&self, user_id: u64, validated_at: DateTime<Utc>) -> Result<()> {
        let mut entry = self.credentials.get_mut(&user_id).ok_or_else(|| {
            SyncError::Store(format!("no credential record for user {}", user_id))
        })?;
        let record = entry.value_mut();
        record.is_valid = true;
        record.last_validated_at = Some(validated_at);
        record.validation_error = None;
        Ok(())
    }

    async fn find_due_for_validation(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<CredentialRecord>> {
        Ok(self
            .credentials
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|record| record.needs_validation(cutoff))
            .collect())
    }

    async fn list_valid(&self) -> Result<Vec<CredentialRecord>> {
        Ok(self
            .credentials
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|record| record.is_valid)
            .collect())
    }
}
