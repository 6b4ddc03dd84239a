// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Provider client contract.
//!
//! The orchestrator only sees this trait; the reqwest-backed bridge
//! client in [`crate::services::garmin`] is the production
//! implementation, and tests script their own.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ProviderError;
use crate::models::{ActivityUpdate, DateRange};

/// One activity as returned by the provider's list endpoint.
#[derive(Debug, Clone)]
pub struct ActivitySummary {
    pub external_id: String,
    pub name: String,
    pub activity_type: Option<String>,
    pub start_time: DateTime<Utc>,
}

/// Full activity detail from the provider, with the raw payload kept
/// for audit/replay.
#[derive(Debug, Clone)]
pub struct ActivityDetail {
    pub external_id: String,
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

impl ActivityDetail {
    /// The store-facing update carrying this detail's fields.
    pub fn into_update(self) -> ActivityUpdate {
        ActivityUpdate {
            name: self.name,
            activity_type: self.activity_type,
            start_time: self.start_time,
            duration_secs: self.duration_secs,
            distance_meters: self.distance_meters,
            calories: self.calories,
            average_heart_rate: self.average_heart_rate,
            max_heart_rate: self.max_heart_rate,
            elevation_gain_meters: self.elevation_gain_meters,
            average_speed_kmh: self.average_speed_kmh,
            raw_payload: self.raw_payload,
        }
    }
}

/// Fetches activity data from the external provider on behalf of one
/// user. Errors carry the transient/auth/permanent classification the
/// orchestrator's policy is built on.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Activity summaries for `user_id` whose start time falls inside
    /// `window`.
    async fn fetch_activity_list(
        &self,
        user_id: u64,
        window: DateRange,
    ) -> Result<Vec<ActivitySummary>, ProviderError>;

    /// Full detail for one activity.
    async fn fetch_activity_detail(
        &self,
        user_id: u64,
        external_id: &str,
    ) -> Result<ActivityDetail, ProviderError>;

    /// Probe whether the user's credential is still accepted by the
    /// provider. `Ok(())` means confirmed valid.
    async fn validate_credential(&self, user_id: u64) -> Result<(), ProviderError>;
}
