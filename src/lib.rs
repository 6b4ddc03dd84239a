// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Garmin-Bridge: mirror Garmin Connect activities into a local store.
//!
//! This crate is the synchronization core: for each user it decides
//! which external activities need to be fetched or retried, tracks
//! per-activity and per-run state transitions, reclaims stuck runs, and
//! keeps upserts idempotent on the provider's activity id. Storage and
//! the provider API sit behind traits (see [`store`] and
//! [`services::provider`]); the daemon in `main.rs` wires the in-memory
//! store and the reqwest bridge client together.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod store;
pub mod time_utils;

pub use error::{ProviderError, Result, SyncError};
pub use services::{ReconcileService, SweepScheduler, SyncOrchestrator};
