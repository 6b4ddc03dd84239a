// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Garmin-Bridge sync daemon
//!
//! Periodically synchronizes each enrolled user's Garmin Connect
//! activities into the local store, reclaims stuck runs and revalidates
//! credentials that have not been confirmed recently.

use std::sync::Arc;

use garmin_bridge::{
    config::Config,
    services::{GarminClient, ReconcileService, SweepScheduler, SyncOrchestrator},
    store::MemoryStore,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(bridge = %config.bridge_base_url, "Starting Garmin-Bridge sync daemon");

    // The reference store keeps everything in memory; the mirror is
    // rebuilt from the provider after a restart.
    let store = Arc::new(MemoryStore::new());

    let provider = Arc::new(GarminClient::new(
        config.bridge_base_url.clone(),
        config.provider_page_size,
    ));
    tracing::info!("Garmin bridge client initialized");

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
        provider,
        config.clone(),
    ));

    let scheduler = SweepScheduler::new(orchestrator, reconcile, store, config);
    scheduler.run().await;

    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("garmin_bridge=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
