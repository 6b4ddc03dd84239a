// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared test fixtures: a scripted provider and world-building helpers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tokio::sync::{mpsc, Semaphore};

use garmin_bridge::config::Config;
use garmin_bridge::error::ProviderError;
use garmin_bridge::models::{Activity, CredentialRecord, DateRange, SyncState};
use garmin_bridge::services::provider::{ActivityDetail, ActivitySummary, ProviderClient};
use garmin_bridge::services::{ReconcileService, SyncOrchestrator};
use garmin_bridge::store::MemoryStore;

/// Scripted stand-in for the Garmin bridge.
///
/// Serves a fixed set of activities per user and lets tests inject
/// failures per external id, per list call, or per validation probe.
/// The optional gate blocks `fetch_activity_list` until released so
/// tests can hold a run open deterministically.
pub struct FakeProvider {
    activities: Mutex<Vec<(u64, ActivityDetail)>>,
    detail_failures: Mutex<HashMap<String, ProviderError>>,
    list_failure: Mutex<Option<ProviderError>>,
    validate_failures: Mutex<HashMap<u64, ProviderError>>,
    /// User ids probed via `validate_credential`, in call order.
    probed_users: Mutex<Vec<u64>>,
    /// External ids fetched via `fetch_activity_detail`, in call order.
    detail_log: Mutex<Vec<String>>,
    gated: AtomicBool,
    gate: Semaphore,
    entered_tx: Mutex<Option<mpsc::UnboundedSender<u64>>>,
}

#[allow(dead_code)]
impl FakeProvider {
    pub fn new() -> Self {
        Self {
            activities: Mutex::new(Vec::new()),
            detail_failures: Mutex::new(HashMap::new()),
            list_failure: Mutex::new(None),
            validate_failures: Mutex::new(HashMap::new()),
            probed_users: Mutex::new(Vec::new()),
            detail_log: Mutex::new(Vec::new()),
            gated: AtomicBool::new(false),
            gate: Semaphore::new(0),
            entered_tx: Mutex::new(None),
        }
    }

    pub fn add_activity(&self, user_id: u64, detail: ActivityDetail) {
        self.activities.lock().unwrap().push((user_id, detail));
    }

    /// Replace an activity's payload (e.g. to simulate edited content).
    pub fn replace_activity(&self, user_id: u64, detail: ActivityDetail) {
        let mut activities = self.activities.lock().unwrap();
        activities.retain(|(uid, d)| !(*uid == user_id && d.external_id == detail.external_id));
        activities.push((user_id, detail));
    }

    pub fn fail_detail(&self, external_id: &str, error: ProviderError) {
        self.detail_failures
            .lock()
            .unwrap()
            .insert(external_id.to_string(), error);
    }

    pub fn fail_list(&self, error: ProviderError) {
        *self.list_failure.lock().unwrap() = Some(error);
    }

    pub fn fail_validation(&self, user_id: u64, error: ProviderError) {
        self.validate_failures.lock().unwrap().insert(user_id, error);
    }

    pub fn probed_users(&self) -> Vec<u64> {
        self.probed_users.lock().unwrap().clone()
    }

    pub fn detail_log(&self) -> Vec<String> {
        self.detail_log.lock().unwrap().clone()
    }

    /// Block list fetches on the gate; returns a receiver that yields
    /// the user id once a fetch is waiting.
    pub fn enable_gate(&self) -> mpsc::UnboundedReceiver<u64> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.entered_tx.lock().unwrap() = Some(tx);
        self.gated.store(true, Ordering::SeqCst);
        rx
    }

    /// Release every blocked (and future) list fetch.
    pub fn release_gate(&self) {
        self.gated.store(false, Ordering::SeqCst);
        self.gate.add_permits(1024);
    }
}

#[async_trait]
impl ProviderClient for FakeProvider {
    async fn fetch_activity_list(
        &self,
        user_id: u64,
        window: DateRange,
    ) -> Result<Vec<ActivitySummary>, ProviderError> {
        if self.gated.load(Ordering::SeqCst) {
            if let Some(tx) = self.entered_tx.lock().unwrap().as_ref() {
                let _ = tx.send(user_id);
            }
            self.gate.acquire().await.expect("gate closed").forget();
        }

        if let Some(err) = self.list_failure.lock().unwrap().clone() {
            return Err(err);
        }

        Ok(self
            .activities
            .lock()
            .unwrap()
            .iter()
            .filter(|(uid, detail)| *uid == user_id && window.contains(detail.start_time))
            .map(|(_, detail)| ActivitySummary {
                external_id: detail.external_id.clone(),
                name: detail.name.clone(),
                activity_type: detail.activity_type.clone(),
                start_time: detail.start_time,
            })
            .collect())
    }

    async fn fetch_activity_detail(
        &self,
        user_id: u64,
        external_id: &str,
    ) -> Result<ActivityDetail, ProviderError> {
        self.detail_log.lock().unwrap().push(external_id.to_string());

        if let Some(err) = self.detail_failures.lock().unwrap().get(external_id) {
            return Err(err.clone());
        }

        self.activities
            .lock()
            .unwrap()
            .iter()
            .find(|(uid, detail)| *uid == user_id && detail.external_id == external_id)
            .map(|(_, detail)| detail.clone())
            .ok_or_else(|| ProviderError::Permanent(format!("unknown activity {}", external_id)))
    }

    async fn validate_credential(&self, user_id: u64) -> Result<(), ProviderError> {
        self.probed_users.lock().unwrap().push(user_id);
        match self.validate_failures.lock().unwrap().get(&user_id) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Test configuration: fixture dates are fixed points in the past, so
/// the discovery lookback stays wide open.
#[allow(dead_code)]
pub fn test_config() -> Config {
    Config {
        sync_lookback: Duration::days(36_500),
        ..Config::default()
    }
}

/// Everything a scenario test needs, wired over one in-memory store.
#[allow(dead_code)]
pub struct TestWorld {
    pub store: Arc<MemoryStore>,
    pub provider: Arc<FakeProvider>,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub reconcile: Arc<ReconcileService>,
    pub config: Config,
}

#[allow(dead_code)]
pub fn build_world(config: Config) -> TestWorld {
    let store = Arc::new(MemoryStore::new());
    let provider = Arc::new(FakeProvider::new());

    let orchestrator = Arc::new(SyncOrchestrator::new(
        provider.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        config.clone(),
    ));
    let reconcile = Arc::new(ReconcileService::new(
        store.clone(),
        store.clone(),
        provider.clone(),
        config.clone(),
    ));

    TestWorld {
        store,
        provider,
        orchestrator,
        reconcile,
        config,
    }
}

/// Enroll a user with a freshly validated credential.
#[allow(dead_code)]
pub async fn enroll_user(world: &TestWorld, user_id: u64) {
    use garmin_bridge::store::CredentialTracker;

    let now = Utc::now();
    let mut record = CredentialRecord::new(user_id, format!("user{}@example.com", user_id), now);
    record.is_valid = true;
    record.last_validated_at = Some(now);
    world.store.put(record).await.expect("enroll user");
}

/// Build an activity detail with a payload derived from its fields, so
/// identical fields mean identical content hashes.
#[allow(dead_code)]
pub fn detail(external_id: &str, name: &str, start_time: &str, distance: f64) -> ActivityDetail {
    let start: DateTime<Utc> = start_time.parse().expect("valid timestamp");
    ActivityDetail {
        external_id: external_id.to_string(),
        name: name.to_string(),
        activity_type: Some("running".to_string()),
        start_time: start,
        duration_secs: Some(1800),
        distance_meters: Some(distance),
        calories: Some(300),
        average_heart_rate: Some(150),
        max_heart_rate: Some(170),
        elevation_gain_meters: Some(25.0),
        average_speed_kmh: Some(10.0),
        raw_payload: json!({
            "activityId": external_id,
            "activityName": name,
            "startTimeGMT": start_time,
            "distance": distance,
        }),
    }
}

/// Seed a previously-failed activity whose last attempt was `age` ago.
/// The content hash matches what `detail(...)` with the same fields
/// would produce.
#[allow(dead_code)]
pub fn seed_failed_activity(
    world: &TestWorld,
    user_id: u64,
    source: &ActivityDetail,
    age: Duration,
) {
    let now = Utc::now();
    let mut activity = Activity::pending(
        user_id,
        source.external_id.clone(),
        source.name.clone(),
        source.activity_type.clone(),
        source.start_time,
        now - age,
    );
    activity.sync_state = SyncState::Failed;
    activity.sync_error = Some("transient provider error: timeout".to_string());
    activity.last_sync_attempt = Some(now - age);
    activity.content_hash = Some(garmin_bridge::models::payload_hash(&source.raw_payload));
    activity.raw_payload = source.raw_payload.clone();
    world.store.seed_activity(activity);
}
