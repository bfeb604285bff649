//! Tagged Cache - demo driver
//!
//! Builds an engine from the environment, runs a small tagged workload through
//! a shared handle and prints the final snapshot as JSON on shutdown.

use std::time::Duration;

use anyhow::Context;
use chrono::{TimeZone, Utc};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tagged_cache::{CacheConfig, CacheEngine, CacheEvent, EventKind, SetOptions, SharedCache};

/// Main entry point for the demo.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the engine and register logging listeners
/// 4. Wrap it in a shared handle (starts auto-prune when configured)
/// 5. Seed a workload and log counters
/// 6. Wait for SIGINT/SIGTERM, then print the snapshot
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" for this crate, can be overridden with RUST_LOG
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tagged_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting tagged cache demo");

    let config = CacheConfig::from_env().context("invalid cache configuration")?;
    info!(
        "Configuration loaded: limit={}, strategy={}, default_ttl={:?}, auto_prune={:?}",
        config.limit, config.strategy, config.default_ttl, config.auto_prune_interval
    );

    let engine: CacheEngine = CacheEngine::new(config).context("failed to build cache engine")?;
    register_listeners(&engine);

    let cache = SharedCache::new(engine);
    if cache.is_auto_pruning() {
        info!("Auto-prune task started");
    }

    seed(&cache).await?;

    shutdown_signal().await;

    if cache.stop_auto_prune() {
        warn!("Auto-prune task stopped");
    }
    let snapshot = cache
        .read()
        .await
        .export_json()
        .context("failed to export snapshot")?;
    println!("{}", snapshot);

    info!("Demo shutdown complete");
    Ok(())
}

fn register_listeners(engine: &CacheEngine) {
    engine.on(EventKind::Set, |event| {
        if let CacheEvent::Set { key, ttl, tags, .. } = event {
            info!(key = %key, ttl = ?ttl, tags = ?tags, "set");
        }
        Ok(())
    });
    engine.on(EventKind::Delete, |event| {
        if let CacheEvent::Delete { key, success } = event {
            info!(key = %key, success, "delete");
        }
        Ok(())
    });
    engine.on(EventKind::AutoPrune, |event| {
        if let CacheEvent::AutoPrune { count } = event {
            if *count > 0 {
                info!(count, "auto-prune pass");
            }
        }
        Ok(())
    });
}

/// Writes a few tagged, prioritized and expiring entries and reads some back.
async fn seed(cache: &SharedCache) -> anyhow::Result<()> {
    let mut engine = cache.write().await;

    engine.set(
        "user:1".to_string(),
        "alice".to_string(),
        SetOptions::new().with_tags(["users", "active"]).with_priority(1),
    )?;
    engine.set(
        "user:2".to_string(),
        "bob".to_string(),
        SetOptions::new().with_tags(["users"]),
    )?;
    engine.set(
        "session:1".to_string(),
        "token".to_string(),
        SetOptions::new()
            .with_ttl(Duration::from_secs(30))
            .with_tags(["sessions"]),
    )?;
    engine
        .namespace("reports")?
        .set("daily".to_string(), "ok".to_string(), SetOptions::default())?;

    if let Some(deadline) = engine
        .peek_entry("session:1")
        .and_then(|entry| entry.expires_at)
    {
        if let Some(at) = Utc.timestamp_millis_opt(deadline as i64).single() {
            info!("session:1 expires at {}", at.to_rfc3339());
        }
    }

    let users = engine.by_tag("users").len();
    engine.get("user:3");
    let stats = engine.stats();
    info!(
        "Seeded: entries={}, users={}, tags={:?}, namespaces={:?}, hits={}, misses={}, hit_rate={:.2}",
        engine.len(),
        users,
        engine.list_tags(),
        engine.namespace_names(),
        stats.hits,
        stats.misses,
        stats.hit_rate()
    );
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}
