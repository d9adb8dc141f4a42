//! `switchboard pending` and `switchboard retry` — the replay queue.

use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::Colorize;

use switchboard_core::utils::truncate_string;
use switchboard_providers::{PendingTask, RetryOutcome};

/// List queued requests, oldest first.
pub async fn list() -> Result<()> {
    let router = crate::build_router().await?;
    let tasks = router.pending_tasks().await;

    println!();
    if tasks.is_empty() {
        println!("  {}", "No pending requests.".dimmed());
        println!();
        return Ok(());
    }

    println!("  {} {}", "Pending requests:".bold(), tasks.len());
    println!();
    println!(
        "    {:<12}  {:>8}  {:>8}  {:<10}  {}",
        "ID".bold(),
        "AGE".bold(),
        "ATTEMPTS".bold(),
        "MODEL".bold(),
        "PREVIEW".bold()
    );
    let now = Utc::now();
    for task in &tasks {
        println!("    {}", task_row(task, now));
        if let Some(ref err) = task.last_error {
            println!("    {}", format!("└ {}", truncate_string(err, 72)).dimmed());
        }
    }
    println!();

    Ok(())
}

/// Replay every queued request once and report what happened.
pub async fn retry() -> Result<()> {
    let router = crate::build_router().await?;
    let queued = router.pending_count().await;

    println!();
    if queued == 0 {
        println!("  {}", "Nothing to retry.".dimmed());
        println!();
        return Ok(());
    }

    println!("  {} {} pending request(s)", "Retrying".cyan().bold(), queued);
    println!();

    let outcomes = router.retry_pending().await;
    for outcome in &outcomes {
        println!("    {}", describe_outcome(outcome));
    }

    let delivered = outcomes.iter().filter(|o| o.is_success()).count();
    println!();
    println!(
        "  {} delivered, {} still pending",
        delivered,
        router.pending_count().await
    );
    println!();

    Ok(())
}

fn task_row(task: &PendingTask, now: DateTime<Utc>) -> String {
    format!(
        "{:<12}  {:>8}  {:>8}  {:<10}  {}",
        task.id,
        format_age(now - task.created_at),
        task.attempts,
        truncate_string(task.request.model_alias(), 10),
        truncate_string(task.request.first_content(), 40)
    )
}

fn format_age(age: chrono::Duration) -> String {
    let secs = age.num_seconds().max(0);
    match secs {
        s if s < 60 => format!("{s}s"),
        s if s < 3600 => format!("{}m", s / 60),
        s if s < 86_400 => format!("{}h", s / 3600),
        s => format!("{}d", s / 86_400),
    }
}

fn describe_outcome(outcome: &RetryOutcome) -> String {
    match outcome {
        RetryOutcome::Success { task_id, response } => format!(
            "{} {task_id} delivered via {}",
            "✓".green(),
            response.provider
        ),
        RetryOutcome::Failed {
            task_id,
            error,
            attempts,
        } => format!(
            "{} {task_id} failed (attempt {attempts}): {}",
            "·".yellow(),
            truncate_string(error, 60)
        ),
        RetryOutcome::Dropped {
            task_id,
            error,
            attempts,
        } => format!(
            "{} {task_id} dropped after {attempts} attempts: {}",
            "✗".red(),
            truncate_string(error, 60)
        ),
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
