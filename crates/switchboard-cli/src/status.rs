//! `switchboard status` and `switchboard probe` — configuration and provider health.

use anyhow::Result;
use colored::Colorize;

use switchboard_core::config::{get_config_path, load_config, Config};
use switchboard_providers::{ProbeResult, Router};

use crate::helpers;

/// Run the status command.
pub async fn run(json: bool) -> Result<()> {
    let config = load_config(None);
    let router = Router::from_config(&config);
    let stats = router.provider_stats().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let pending = match router.load_pending().await {
        Ok(_) => router.pending_count().await.to_string(),
        Err(e) => format!("{} ({e})", "unreadable".red()),
    };

    println!();
    println!("{}", "Switchboard Status".cyan().bold());
    println!();
    print_config_summary(&config);
    println!("  {:<18} {}", "Pending:".bold(), pending);

    println!();
    println!("  {}", "Providers:".bold());
    print_key_status(&config);

    println!();
    helpers::print_provider_table(&stats);
    println!();

    Ok(())
}

/// Run the probe command: one health sweep, then the table.
pub async fn probe() -> Result<()> {
    let config = load_config(None);
    let router = Router::from_config(&config);

    println!();
    println!("{}", "Probing providers...".cyan().bold());
    println!();

    let results = router.check_health().await;
    if results.is_empty() {
        println!("  {}", "nothing to probe".dimmed());
    }
    for result in &results {
        println!("  {}", probe_line(result));
    }

    println!();
    helpers::print_provider_table(&router.provider_stats().await);
    println!();

    Ok(())
}

fn print_config_summary(config: &Config) {
    let config_path = get_config_path();
    println!(
        "  {:<18} {} {}",
        "Config:".bold(),
        config_path.display(),
        if config_path.exists() {
            "✓".green().to_string()
        } else {
            "(not found, using defaults)".red().to_string()
        }
    );

    let router = &config.router;
    println!(
        "  {:<18} {} | {}",
        "Failover:".bold(),
        format!("{} attempts/provider", router.max_attempts_per_provider).dimmed(),
        format!("backoff {}ms × attempt", router.retry_delay_ms).dimmed(),
    );

    let health = if config.health.enabled {
        format!("every {}s", config.health.interval_s)
    } else {
        "disabled".to_string()
    };
    println!("  {:<18} {}", "Health checks:".bold(), health);
}

/// Key status for every configured provider, including ones left out of the
/// registry for lack of a key.
fn print_key_status(config: &Config) {
    for provider in &config.providers {
        let status = if provider.is_configured() {
            format!("{} (key set)", "✓".green())
        } else {
            format!("{}", "· no API key".dimmed())
        };
        println!("    {:<14} {}", provider.name, status);
    }
}

fn probe_line(result: &ProbeResult) -> String {
    if result.healthy {
        format!(
            "{} {:<14} {}",
            "✓".green(),
            result.provider,
            helpers::format_latency(result.latency_ms).dimmed()
        )
    } else {
        format!(
            "{} {:<14} {}",
            "✗".red(),
            result.provider,
            result.error.as_deref().unwrap_or("unknown error").red()
        )
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
