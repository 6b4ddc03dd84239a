// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! HTTP client for the Garmin bridge service.
//!
//! The bridge wraps Garmin Connect's session handling and exposes a
//! small JSON API:
//! - `GET /garmin/activities?start&limit`: paged summaries, newest first
//! - `GET /garmin/activity_detail/{id}`: one activity's full payload
//! - `GET /garmin/status`: credential probe
//!
//! Responses are classified into the transient/auth/permanent taxonomy
//! here, so the orchestrator never looks at HTTP statuses.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::error::ProviderError;
use crate::models::DateRange;
use crate::services::provider::{ActivityDetail, ActivitySummary, ProviderClient};

/// Garmin bridge API client.
#[derive(Clone)]
pub struct GarminClient {
    http: reqwest::Client,
    base_url: String,
    page_size: u32,
}

impl GarminClient {
    pub fn new(base_url: String, page_size: u32) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            page_size,
        }
    }

    /// Generic GET request with JSON response.
    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        user_id: u64,
    ) -> Result<T, ProviderError> {
        let response = self
            .http
            .get(url)
            .query(&[("user", user_id.to_string())])
            .send()
            .await
            .map_err(|e| ProviderError::Transient(format!("request failed: {}", e)))?;

        let response = check_response(response).await?;

        response
            .json()
            .await
            .map_err(|e| ProviderError::Permanent(format!("JSON parse error: {}", e)))
    }
}

/// Map an HTTP response onto the error taxonomy.
async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();

    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(ProviderError::Auth(format!("HTTP {}: {}", status, body)));
    }
    if status.as_u16() == 429 {
        tracing::warn!("Garmin bridge rate limit hit (429)");
        return Err(ProviderError::Transient(format!("HTTP {}: {}", status, body)));
    }
    if status.is_server_error() {
        return Err(ProviderError::Transient(format!("HTTP {}: {}", status, body)));
    }

    Err(ProviderError::Permanent(format!("HTTP {}: {}", status, body)))
}

#[async_trait]
impl ProviderClient for GarminClient {
    async fn fetch_activity_list(
        &self,
        user_id: u64,
        window: DateRange,
    ) -> Result<Vec<ActivitySummary>, ProviderError> {
        let url = format!("{}/garmin/activities", self.base_url);
        let mut summaries = Vec::new();
        let mut start = 0u32;

        loop {
            let response = self
                .http
                .get(&url)
                .query(&[
                    ("user", user_id.to_string()),
                    ("start", start.to_string()),
                    ("limit", self.page_size.to_string()),
                ])
                .send()
                .await
                .map_err(|e| ProviderError::Transient(format!("request failed: {}", e)))?;

            let response = check_response(response).await?;
            let page: Vec<GarminActivity> = response
                .json()
                .await
                .map_err(|e| ProviderError::Permanent(format!("JSON parse error: {}", e)))?;

            let fetched = page.len();
            let mut page_exhausts_window = false;

            for wire in page {
                let summary = wire.into_summary()?;
                if window.contains(summary.start_time) {
                    summaries.push(summary);
                } else if summary.start_time < window.start {
                    // Pages arrive newest-first; once an activity
                    // predates the window, the rest of the history does
                    // too.
                    page_exhausts_window = true;
                }
            }

            if page_exhausts_window || fetched < self.page_size as usize {
                break;
            }
            start += self.page_size;
        }

        tracing::debug!(
            user_id,
            count = summaries.len(),
            "Fetched activity summaries from bridge"
        );
        Ok(summaries)
    }

    async fn fetch_activity_detail(
        &self,
        user_id: u64,
        external_id: &str,
    ) -> Result<ActivityDetail, ProviderError> {
        let url = format!("{}/garmin/activity_detail/{}", self.base_url, external_id);

        // Fetch the raw payload first; the typed view is parsed out of
        // it so the stored snapshot is exactly what came off the wire.
        let payload: serde_json::Value = self.get_json(&url, user_id).await?;

        let wire: GarminActivity = serde_json::from_value(payload.clone())
            .map_err(|e| ProviderError::Permanent(format!("unexpected detail shape: {}", e)))?;

        wire.into_detail(payload)
    }

    async fn validate_credential(&self, user_id: u64) -> Result<(), ProviderError> {
        let url = format!("{}/garmin/status", self.base_url);
        let status: BridgeStatus = self.get_json(&url, user_id).await?;

        if status.status == "logged_in" {
            Ok(())
        } else {
            Err(ProviderError::Auth(format!(
                "bridge session state: {}",
                status.status
            )))
        }
    }
}

/// Session status response from the bridge.
#[derive(Debug, Deserialize)]
struct BridgeStatus {
    status: String,
}

/// Activity as serialized by the bridge (Garmin Connect field names).
#[derive(Debug, Clone, Deserialize)]
pub struct GarminActivity {
    #[serde(rename = "activityId")]
    pub activity_id: u64,
    #[serde(rename = "activityName", default)]
    pub activity_name: Option<String>,
    #[serde(rename = "activityType", default)]
    pub activity_type: Option<GarminActivityType>,
    #[serde(rename = "startTimeGMT")]
    pub start_time_gmt: String,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub calories: Option<f64>,
    #[serde(rename = "averageHR", default)]
    pub average_hr: Option<f64>,
    #[serde(rename = "maxHR", default)]
    pub max_hr: Option<f64>,
    #[serde(rename = "elevationGain", default)]
    pub elevation_gain: Option<f64>,
    /// Meters per second on the wire
    #[serde(rename = "averageSpeed", default)]
    pub average_speed: Option<f64>,
}

/// Nested activity type object (`{"typeKey": "running"}`).
#[derive(Debug, Clone, Deserialize)]
pub struct GarminActivityType {
    #[serde(rename = "typeKey")]
    pub type_key: String,
}

impl GarminActivity {
    fn parsed_start_time(&self) -> Result<DateTime<Utc>, ProviderError> {
        // Garmin serializes GMT timestamps without a zone suffix.
        NaiveDateTime::parse_from_str(&self.start_time_gmt, "%Y-%m-%d %H:%M:%S")
            .map(|naive| naive.and_utc())
            .map_err(|e| {
                ProviderError::Permanent(format!(
                    "unparseable startTimeGMT {:?}: {}",
                    self.start_time_gmt, e
                ))
            })
    }

    fn display_name(&self) -> String {
        match self.activity_name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("Activity {}", self.activity_id),
        }
    }

    fn into_summary(self) -> Result<ActivitySummary, ProviderError> {
        let start_time = self.parsed_start_time()?;
        Ok(ActivitySummary {
            external_id: self.activity_id.to_string(),
            name: self.display_name(),
            activity_type: self.activity_type.map(|t| t.type_key),
            start_time,
        })
    }

    fn into_detail(self, raw_payload: serde_json::Value) -> Result<ActivityDetail, ProviderError> {
        let start_time = self.parsed_start_time()?;
        Ok(ActivityDetail {
            external_id: self.activity_id.to_string(),
            name: self.display_name(),
            activity_type: self.activity_type.map(|t| t.type_key),
            start_time,
            duration_secs: self.duration.map(|secs| secs.round() as u32),
            distance_meters: self.distance,
            calories: self.calories.map(|c| c.round() as u32),
            average_heart_rate: self.average_hr.map(|hr| hr.round() as u32),
            max_heart_rate: self.max_hr.map(|hr| hr.round() as u32),
            elevation_gain_meters: self.elevation_gain,
            average_speed_kmh: self.average_speed.map(|mps| mps * 3.6),
            raw_payload,
        })
    }
}
