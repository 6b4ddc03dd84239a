// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Stuck-run reclamation and credential revalidation sweeps.

mod common;

use chrono::{Duration, Utc};
use common::{build_world, test_config};
use garmin_bridge::config::Config;
use garmin_bridge::error::ProviderError;
use garmin_bridge::models::{CredentialRecord, RunKind, RunState};
use garmin_bridge::services::STUCK_RUN_MESSAGE;
use garmin_bridge::store::{CredentialTracker, SyncRunLedger};

/// Config whose stuck threshold is zero, so any live run counts as
/// stuck the moment the sweep looks at it.
fn reclaim_everything_config() -> Config {
    Config {
        stuck_run_threshold: Duration::zero(),
        ..test_config()
    }
}

async fn enroll(world: &common::TestWorld, user_id: u64, validated_ago: Duration, valid: bool) {
    let now = Utc::now();
    let mut record = CredentialRecord::new(user_id, format!("user{}@example.com", user_id), now);
    record.is_valid = valid;
    record.last_validated_at = Some(now - validated_ago);
    world.store.put(record).await.unwrap();
}

#[tokio::test]
async fn test_stuck_run_is_reclaimed_and_sweep_is_idempotent() {
    let world = build_world(reclaim_everything_config());

    // A run that went live and then lost its orchestrator
    let run = world.store.create(7, RunKind::Scheduled).await.unwrap();
    world
        .store
        .transition(run.id, RunState::InProgress, None)
        .await
        .unwrap();

    let reclaimed = world.reconcile.reconcile_stuck_runs().await.unwrap();
    assert_eq!(reclaimed, vec![run.id]);

    let record = world.store.get_run(run.id).await.unwrap().unwrap();
    assert_eq!(record.state, RunState::Failed);
    assert_eq!(record.error_message.as_deref(), Some(STUCK_RUN_MESSAGE));
    assert!(record.completed_at.is_some());
    assert!(record.invariants_hold());

    // Second sweep: the run is terminal, nothing is selected
    let again = world.reconcile.reconcile_stuck_runs().await.unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
async fn test_reclamation_releases_the_run_lock() {
    let world = build_world(reclaim_everything_config());

    let run = world.store.create(7, RunKind::Scheduled).await.unwrap();
    world
        .store
        .transition(run.id, RunState::InProgress, None)
        .await
        .unwrap();

    world.reconcile.reconcile_stuck_runs().await.unwrap();

    // The user can start a new run immediately
    world.store.create(7, RunKind::Manual).await.unwrap();
}

#[tokio::test]
async fn test_runs_in_started_state_are_also_reclaimed() {
    let world = build_world(reclaim_everything_config());

    // Crashed before ever reaching in_progress
    let run = world.store.create(7, RunKind::Manual).await.unwrap();

    let reclaimed = world.reconcile.reconcile_stuck_runs().await.unwrap();
    assert_eq!(reclaimed, vec![run.id]);
}

#[tokio::test]
async fn test_fresh_runs_are_not_reclaimed() {
    // Default threshold (2 hours): a run started moments ago is live,
    // not stuck.
    let world = build_world(test_config());

    let run = world.store.create(7, RunKind::Scheduled).await.unwrap();
    world
        .store
        .transition(run.id, RunState::InProgress, None)
        .await
        .unwrap();

    let reclaimed = world.reconcile.reconcile_stuck_runs().await.unwrap();
    assert!(reclaimed.is_empty());

    let record = world.store.get_run(run.id).await.unwrap().unwrap();
    assert_eq!(record.state, RunState::InProgress);
}

#[tokio::test]
async fn test_only_due_credentials_are_probed() {
    let world = build_world(test_config());

    enroll(&world, 1, Duration::hours(48), true).await; // due
    enroll(&world, 2, Duration::hours(1), true).await; // fresh
    enroll(&world, 3, Duration::hours(48), false).await; // invalid, not swept

    let summary = world.reconcile.revalidate_due_credentials().await.unwrap();

    assert_eq!(summary.probed, 1);
    assert_eq!(summary.confirmed, 1);
    assert_eq!(summary.invalidated, 0);
    assert_eq!(world.provider.probed_users(), vec![1]);

    // The due credential's confirmation timestamp moved forward
    let record = world.store.get_credential(1).await.unwrap().unwrap();
    assert!(record.last_validated_at.unwrap() > Utc::now() - Duration::minutes(5));
}

#[tokio::test]
async fn test_probe_failure_marks_credential_invalid() {
    let world = build_world(test_config());

    enroll(&world, 1, Duration::hours(48), true).await;
    world
        .provider
        .fail_validation(1, ProviderError::Auth("password changed".to_string()));

    let summary = world.reconcile.revalidate_due_credentials().await.unwrap();
    assert_eq!(summary.probed, 1);
    assert_eq!(summary.invalidated, 1);

    let record = world.store.get_credential(1).await.unwrap().unwrap();
    assert!(!record.is_valid);
    assert!(record
        .validation_error
        .as_deref()
        .unwrap()
        .contains("password changed"));
}

#[tokio::test]
async fn test_never_validated_credential_is_due() {
    let world = build_world(test_config());

    let record = {
        let mut r = CredentialRecord::new(5, "user5@example.com".to_string(), Utc::now());
        r.is_valid = true;
        r // enrolled but never probed
    };
    world.store.put(record).await.unwrap();

    let summary = world.reconcile.revalidate_due_credentials().await.unwrap();
    assert_eq!(summary.probed, 1);
    assert_eq!(summary.confirmed, 1);
}

#[tokio::test]
async fn test_empty_sweep_probes_nothing() {
    let world = build_world(test_config());

    let summary = world.reconcile.revalidate_due_credentials().await.unwrap();
    assert_eq!(summary.probed, 0);
    assert!(world.provider.probed_users().is_empty());
}
