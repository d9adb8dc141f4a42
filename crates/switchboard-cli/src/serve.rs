//! `switchboard serve` — keep the router's background work running.
//!
//! Startup sequence:
//! 1. Load config, build the router, restore pending tasks
//! 2. Start the health monitor
//! 3. Replay pending tasks every `router.pendingSweepIntervalS`
//! 4. Ctrl+C stops the monitor and exits

use std::time::Duration;

use anyhow::Result;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use switchboard_core::config::load_config;
use switchboard_providers::{RetryOutcome, Router};

use crate::helpers;

/// Run until Ctrl+C.
pub async fn run() -> Result<()> {
    println!();
    helpers::print_banner();
    println!("  Mode: Serve");
    println!();

    let config = load_config(None);
    let sweep_every = sweep_interval(config.router.pending_sweep_interval_s);
    let router = crate::build_router().await?;

    let stats = router.provider_stats().await;
    info!(
        providers = stats.len(),
        pending = router.pending_count().await,
        sweep_s = sweep_every.as_secs(),
        "serve starting"
    );

    println!("  Providers: {} registered", stats.len());
    if config.health.enabled {
        println!("  Health:    every {}s", config.health.interval_s);
    } else {
        println!("  Health:    disabled");
    }
    println!("  Replay:    every {}s", sweep_every.as_secs());
    println!("  Pending:   {}", router.pending_count().await);
    println!();
    if stats.is_empty() {
        println!("  ⚠  No providers have an API key. Requests will be queued");
        println!("     until one is configured in ~/.switchboard/config.json");
        println!();
    }
    println!("  Ctrl+C to stop");
    println!();

    router.start().await;

    let mut sweep = tokio::time::interval(sweep_every);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it so startup doesn't replay.
    sweep.tick().await;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = sweep.tick() => {
                sweep_pending(&router).await;
            }
            result = &mut shutdown => {
                if let Err(e) = result {
                    error!(error = %e, "failed to listen for Ctrl+C");
                }
                println!();
                println!("  Shutting down...");
                info!("received Ctrl+C, shutting down");
                break;
            }
        }
    }

    router.stop().await;
    println!("  Stopped. Goodbye!");
    Ok(())
}

/// One replay sweep with a log line per outcome.
async fn sweep_pending(router: &Router) {
    if router.pending_count().await == 0 {
        return;
    }

    let outcomes = router.retry_pending().await;
    let (delivered, failed, dropped) = tally(&outcomes);
    info!(delivered, failed, dropped, "pending sweep finished");
}

fn tally(outcomes: &[RetryOutcome]) -> (usize, usize, usize) {
    outcomes
        .iter()
        .fold((0, 0, 0), |(ok, failed, dropped), outcome| match outcome {
            RetryOutcome::Success { .. } => (ok + 1, failed, dropped),
            RetryOutcome::Failed { .. } => (ok, failed + 1, dropped),
            RetryOutcome::Dropped { .. } => (ok, failed, dropped + 1),
        })
}

fn sweep_interval(seconds: u64) -> Duration {
    Duration::from_secs(seconds.max(1))
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
