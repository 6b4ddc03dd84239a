// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Activity model: one external fitness record mirrored locally.
//!
//! The (`user_id`, `external_id`) pair is the idempotency key; the
//! store never holds two records for the same pair, and re-ingesting an
//! external id updates the existing record in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Per-activity synchronization state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl SyncState {
    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// Moving to `Pending` is always legal; that is the full-resync
    /// reset path. A sync attempt (`InProgress`) only starts from
    /// `Pending` or `Failed`; the per-pass outcomes only follow an
    /// attempt.
    pub fn can_transition_to(self, next: SyncState) -> bool {
        match next {
            SyncState::Pending => true,
            SyncState::InProgress => matches!(self, SyncState::Pending | SyncState::Failed),
            SyncState::Completed | SyncState::Failed | SyncState::Skipped => {
                self == SyncState::InProgress
            }
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncState::Pending => "pending",
            SyncState::InProgress => "in_progress",
            SyncState::Completed => "completed",
            SyncState::Failed => "failed",
            SyncState::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Closed UTC interval used for partial runs and discovery windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }
}

/// Stored activity record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    /// Provider's stable activity ID (the idempotency key)
    pub external_id: String,
    /// Owning user
    pub user_id: u64,
    /// Activity name/title
    pub name: String,
    /// Activity type (running, cycling, ...)
    pub activity_type: Option<String>,
    /// When the activity happened
    pub start_time: DateTime<Utc>,
    /// Duration in seconds
    pub duration_secs: Option<u32>,
    /// Distance in meters
    pub distance_meters: Option<f64>,
    pub calories: Option<u32>,
    pub average_heart_rate: Option<u32>,
    pub max_heart_rate: Option<u32>,
    pub elevation_gain_meters: Option<f64>,
    pub average_speed_kmh: Option<f64>,
    /// Raw provider payload snapshot, kept for audit/replay
    pub raw_payload: serde_json::Value,
    /// SHA-256 over the raw payload; `None` until the first detail fetch
    pub content_hash: Option<String>,
    pub sync_state: SyncState,
    pub last_sync_attempt: Option<DateTime<Utc>>,
    pub sync_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Activity {
    /// Build the stub record created when discovery first sees an
    /// external id. Metric fields stay empty until a detail fetch.
    pub fn pending(
        user_id: u64,
        external_id: String,
        name: String,
        activity_type: Option<String>,
        start_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            external_id,
            user_id,
            name,
            activity_type,
            start_time,
            duration_secs: None,
            distance_meters: None,
            calories: None,
            average_heart_rate: None,
            max_heart_rate: None,
            elevation_gain_meters: None,
            average_speed_kmh: None,
            raw_payload: serde_json::Value::Null,
            content_hash: None,
            sync_state: SyncState::Pending,
            last_sync_attempt: None,
            sync_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Metric fields applied by an upsert after a successful detail fetch.
#[derive(Debug, Clone)]
pub struct ActivityUpdate {
    pub name: String,
    pub activity_type: Option<String>,
    pub start_time: DateTime<Utc>,
    pub duration_secs: Option<u32>,
    pub distance_meters: Option<f64>,
    pub calories: Option<u32>,
    pub average_heart_rate: Option<u32>,
    pub max_heart_rate: Option<u32>,
    pub elevation_gain_meters: Option<f64>,
    pub average_speed_kmh: Option<f64>,
    pub raw_payload: serde_json::Value,
}

/// SHA-256 hex digest over a raw provider payload.
///
/// `serde_json::Value` objects iterate in key order, so two payloads
/// with the same fields hash identically regardless of how the JSON
/// was keyed on the wire.
pub fn payload_hash(payload: &serde_json::Value) -> String {
    let bytes = serde_json::to_vec(payload).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attempt_starts_from_pending_or_failed() {
        assert!(SyncState::Pending.can_transition_to(SyncState::InProgress));
        assert!(SyncState::Failed.can_transition_to(SyncState::InProgress));

        assert!(!SyncState::Completed.can_transition_to(SyncState::InProgress));
        assert!(!SyncState::Skipped.can_transition_to(SyncState::InProgress));
    }

    #[test]
    fn test_outcomes_only_follow_an_attempt() {
        for outcome in [SyncState::Completed, SyncState::Failed, SyncState::Skipped] {
            assert!(SyncState::InProgress.can_transition_to(outcome));
            assert!(!SyncState::Pending.can_transition_to(outcome));
            assert!(!SyncState::Completed.can_transition_to(outcome));
        }
    }

    #[test]
    fn test_reset_to_pending_always_allowed() {
        for state in [
            SyncState::Pending,
            SyncState::InProgress,
            SyncState::Completed,
            SyncState::Failed,
            SyncState::Skipped,
        ] {
            assert!(state.can_transition_to(SyncState::Pending));
        }
    }

    #[test]
    fn test_payload_hash_key_order_independent() {
        let a = json!({"distance": 5000.0, "name": "Morning Run"});
        let b = json!({"name": "Morning Run", "distance": 5000.0});

        assert_eq!(payload_hash(&a), payload_hash(&b));
    }

    #[test]
    fn test_payload_hash_detects_changes() {
        let a = json!({"name": "Morning Run", "distance": 5000.0});
        let b = json!({"name": "Morning Run", "distance": 5001.0});

        assert_ne!(payload_hash(&a), payload_hash(&b));
    }

    #[test]
    fn test_date_range_contains_is_inclusive() {
        let start = "2024-03-01T00:00:00Z".parse().unwrap();
        let end = "2024-03-31T23:59:59Z".parse().unwrap();
        let range = DateRange::new(start, end);

        assert!(range.contains(start));
        assert!(range.contains(end));
        assert!(range.contains("2024-03-15T12:00:00Z".parse().unwrap()));
        assert!(!range.contains("2024-04-01T00:00:00Z".parse().unwrap()));
    }
}
