//! `switchboard init` — write a default configuration.
//!
//! Creates `~/.switchboard/config.json` with the built-in provider list (keys
//! empty) and the history directory used by the REPL.

use std::path::{Path, PathBuf};

use anyhow::Result;
use colored::Colorize;

use switchboard_core::config::{get_config_path, save_config, Config};
use switchboard_core::utils::get_data_path;

/// Run the init command. `path` overrides the default config location.
pub fn run(path: Option<&Path>, force: bool) -> Result<()> {
    println!();
    println!("{}", "Switchboard — Setup".cyan().bold());
    println!();

    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);
    let written = write_default_config(&config_path, force)?;
    if written {
        println!(
            "  {} created config at {}",
            "✓".green(),
            config_path.display()
        );
    } else {
        println!(
            "  {} config already exists at {} (use --force to overwrite)",
            "✓".green(),
            config_path.display()
        );
    }

    if path.is_none() {
        let history_dir = get_data_path().join("history");
        std::fs::create_dir_all(&history_dir)?;
        println!("  {} history dir at {}", "✓".green(), history_dir.display());
    }

    println!();
    println!("  Next: add an API key to a provider in the config, or export one of");
    println!(
        "  {}",
        "GROQ_API_KEY, OPENROUTER_API_KEY, ANTHROPIC_API_KEY, OPENAI_API_KEY".dimmed()
    );
    println!();
    println!(
        "{}",
        "  Setup complete! Run `switchboard chat` to start.".green()
    );
    println!();

    Ok(())
}

/// Returns whether the file was written.
fn write_default_config(path: &Path, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    // Plain defaults: keys picked up from the environment stay out of the file.
    save_config(&Config::default(), Some(path))?;
    Ok(true)
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
