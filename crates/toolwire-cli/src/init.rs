//! `toolwire init`: write a default configuration file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;

use toolwire_core::config::{get_config_path, save_config, Config};
use toolwire_core::utils::get_history_path;

use crate::helpers::display_path;

/// Run the init command.
pub fn run(config_path: Option<&Path>, force: bool) -> Result<()> {
    println!();
    println!("{}", "🔧 Toolwire — Setup".cyan().bold());
    println!();

    let path = config_path.map(PathBuf::from).unwrap_or_else(get_config_path);
    if write_default_config(&path, force)? {
        println!("  {} created config at {}", "✓".green(), display_path(&path));
    } else {
        println!(
            "  {} config already exists at {} (use --force to overwrite)",
            "✓".green(),
            display_path(&path)
        );
    }

    let history = get_history_path();
    if let Some(dir) = history.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    println!();
    println!("{}", "Next steps:".bold());
    println!("  1. Add an API key under \"providers\" (or export ANTHROPIC_API_KEY, …)");
    println!("  2. Point \"server.command\" at your tool backend (default: toolwire-github)");
    println!("  3. Optionally set GITHUB_PAT for higher GitHub rate limits");
    println!("  4. Run {}", "toolwire chat".cyan());
    println!();
    Ok(())
}

/// Write `Config::default()` to `path`. Returns `false` when a file already
/// exists and `force` is not set.
fn write_default_config(path: &Path, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    save_config(&Config::default(), Some(path))
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(true)
}
