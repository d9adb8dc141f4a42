//! Shared CLI helpers — path expansion, response printing, provider table.

use std::path::PathBuf;

use colored::{ColoredString, Colorize};

use switchboard_core::types::ChatResponse;
use switchboard_core::utils::truncate_string;
use switchboard_providers::{HealthStatus, ProviderStats, RouterError};

/// Expand `~` at the start of a path to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_next::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs_next::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

pub fn dim(text: &str) -> ColoredString {
    text.dimmed()
}

/// Print a chat response to stdout, with the answering provider underneath.
pub fn print_response(response: &ChatResponse) {
    println!();
    if response.content.is_empty() {
        println!("{}", "(no response)".dimmed());
    } else {
        println!("{}", response.content);
    }
    println!(
        "{}",
        format!(
            "  via {} · {} · {}",
            response.provider,
            response.model,
            format_latency(response.latency_ms)
        )
        .dimmed()
    );
    println!();
}

/// Print a router error the way an end user should see it.
pub fn print_router_error(err: &RouterError) {
    eprintln!();
    eprintln!("{} {}", "✗".red(), err.user_message());
    if let Some(task_id) = err.task_id() {
        eprintln!(
            "{}",
            format!("  run `switchboard retry` to replay task {task_id}").dimmed()
        );
    }
    tracing::debug!(error = %err, "router error");
    eprintln!();
}

/// Print the banner shown at REPL start.
pub fn print_banner() {
    let version = env!("CARGO_PKG_VERSION");
    println!();
    println!("{}  v{}", "Switchboard".cyan().bold(), version.dimmed());
    println!("{}", "Type a message, or \"exit\" to quit.".dimmed());
    println!();
}

/// Print a "thinking" spinner placeholder (for non-log mode).
pub fn print_thinking() {
    eprint!("{}", "⠿ thinking...".dimmed());
}

/// Clear the "thinking" placeholder.
pub fn clear_thinking() {
    eprint!("\r{}\r", " ".repeat(40));
}

pub fn format_latency(latency_ms: f64) -> String {
    if latency_ms <= 0.0 {
        "-".to_string()
    } else if latency_ms < 1000.0 {
        format!("{latency_ms:.0}ms")
    } else {
        format!("{:.2}s", latency_ms / 1000.0)
    }
}

/// Print providers in priority order.
pub fn print_provider_table(stats: &[ProviderStats]) {
    if stats.is_empty() {
        println!(
            "    {}",
            "no providers configured (set an API key, see `switchboard init`)".dimmed()
        );
        return;
    }

    println!(
        "    {:<14} {:>4}  {:<9} {:>6} {:>8}  {}",
        "NAME".bold(),
        "PRIO".bold(),
        "STATUS".bold(),
        "ERRORS".bold(),
        "LATENCY".bold(),
        "LAST ERROR".bold()
    );
    for s in stats {
        // Pad before colouring so escape codes don't break alignment.
        let status = status_badge(s.status);
        println!(
            "    {:<14} {:>4}  {} {:>6} {:>8}  {}",
            s.name,
            s.priority,
            status,
            s.error_count,
            format_latency(s.latency_ms),
            s.last_error
                .as_deref()
                .map(|e| truncate_string(e, 48))
                .unwrap_or_default()
                .dimmed()
        );
    }
}

fn status_badge(status: HealthStatus) -> ColoredString {
    let padded = format!("{:<9}", status.as_str());
    match status {
        HealthStatus::Healthy => padded.green(),
        HealthStatus::Degraded => padded.yellow(),
        HealthStatus::Down => padded.red(),
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
