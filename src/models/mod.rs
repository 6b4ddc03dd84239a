// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the synchronization core.

pub mod activity;
pub mod credential;
pub mod sync_run;

pub use activity::{payload_hash, Activity, ActivityUpdate, DateRange, SyncState};
pub use credential::CredentialRecord;
pub use sync_run::{CounterDelta, RunKind, RunState, SyncRun};
