// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Error types for the synchronization core.
//!
//! Two layers:
//! - [`ProviderError`]: classified failures from the Garmin bridge
//!   (transient vs. auth vs. permanent): the classification drives the
//!   orchestrator's retry/abort policy.
//! - [`SyncError`]: everything the orchestrator and stores surface to
//!   callers.

use uuid::Uuid;

/// A failure reported by the provider client, classified by how the
/// orchestrator must react to it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// Retryable on a later run (network trouble, rate limiting, 5xx).
    #[error("transient provider error: {0}")]
    Transient(String),

    /// The user's credential was rejected. Aborts the run and
    /// invalidates the credential.
    #[error("provider authentication failure: {0}")]
    Auth(String),

    /// Not retryable (malformed data, 4xx other than auth/rate limit).
    #[error("permanent provider error: {0}")]
    Permanent(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ProviderError::Auth(_))
    }
}

/// Application error type for the synchronization core.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Precondition failure: no run is opened.
    #[error("credential is not valid for user {0}")]
    CredentialInvalid(u64),

    /// Concurrency guard: another run is already active for this user.
    #[error("a sync run is already in progress for user {0}")]
    RunAlreadyInProgress(u64),

    #[error("sync run not found: {0}")]
    RunNotFound(Uuid),

    /// A transition the run state machine does not allow, e.g. reopening
    /// a terminal run.
    #[error("invalid run transition for {run_id}: {detail}")]
    InvalidTransition { run_id: Uuid, detail: String },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Unrecoverable store failure; aborts the run it occurs in.
    #[error("store error: {0}")]
    Store(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, SyncError>;
