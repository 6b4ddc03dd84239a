// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sync run ledger record: one attempt to bring a user's activities up
//! to date, with progress counters and a terminal outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What triggered a run and which candidates it selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Manual,
    Scheduled,
    Partial,
    FullResync,
}

/// Run lifecycle state. Terminal states are final; a run record is
/// never reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Started,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Failed | RunState::Cancelled
        )
    }

    /// Whether the run state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: RunState) -> bool {
        match self {
            RunState::Started => matches!(
                next,
                RunState::InProgress | RunState::Failed | RunState::Cancelled
            ),
            RunState::InProgress => next.is_terminal(),
            // Terminal states are final
            RunState::Completed | RunState::Failed | RunState::Cancelled => false,
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunState::Started => "started",
            RunState::InProgress => "in_progress",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
            RunState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Counter increments appended to a run as candidates are processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterDelta {
    pub processed: u32,
    pub synced: u32,
    pub skipped: u32,
    pub failed: u32,
}

impl CounterDelta {
    /// One candidate fetched and stored with fresh content.
    pub fn synced() -> Self {
        Self {
            processed: 1,
            synced: 1,
            ..Self::default()
        }
    }

    /// One candidate whose content was unchanged.
    pub fn skipped() -> Self {
        Self {
            processed: 1,
            skipped: 1,
            ..Self::default()
        }
    }

    /// One candidate that failed.
    pub fn failed() -> Self {
        Self {
            processed: 1,
            failed: 1,
            ..Self::default()
        }
    }
}

/// One synchronization attempt for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: Uuid,
    pub user_id: u64,
    pub kind: RunKind,
    pub state: RunState,
    /// Candidates attempted
    pub processed: u32,
    /// Stored with fresh content
    pub synced: u32,
    /// Content unchanged
    pub skipped: u32,
    /// Attempt failed, left for retry
    pub failed: u32,
    pub started_at: DateTime<Utc>,
    /// Set exactly once, when the run reaches a terminal state
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl SyncRun {
    pub fn new(user_id: u64, kind: RunKind, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            kind,
            state: RunState::Started,
            processed: 0,
            synced: 0,
            skipped: 0,
            failed: 0,
            started_at: now,
            completed_at: None,
            error_message: None,
        }
    }

    pub fn apply_delta(&mut self, delta: CounterDelta) {
        self.processed += delta.processed;
        self.synced += delta.synced;
        self.skipped += delta.skipped;
        self.failed += delta.failed;
    }

    /// Ledger invariant: every outcome was counted against an attempted
    /// candidate, and `completed_at` is set iff the run is terminal.
    pub fn invariants_hold(&self) -> bool {
        let counters_ok = self.synced + self.skipped + self.failed <= self.processed;
        let completion_ok = self.completed_at.is_some() == self.state.is_terminal();
        counters_ok && completion_ok
    }
}
