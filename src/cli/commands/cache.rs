//! Cache command - inspect and manage the artifact cache

use crate::audit::{events, AuditLog};
use crate::cache::{format_bytes, CacheEntry, CacheStore};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::{Config, ConfigManager};
use crate::error::PlugdepsResult;
use crate::model::Coordinate;
use console::style;
use std::io::{self, Write};

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> PlugdepsResult<()> {
    let store = CacheStore::new(ConfigManager::cache_dir(config));

    match args.action {
        CacheAction::List { format } => list_entries(&store, format).await,
        CacheAction::Path => {
            println!("{}", store.root().display());
            Ok(())
        }
        CacheAction::Invalidate { coordinate } => {
            invalidate(&store, &AuditLog::new(config), &coordinate).await
        }
        CacheAction::Clear { yes } => clear_cache(&store, yes).await,
    }
}

/// List cached artifacts
async fn list_entries(store: &CacheStore, format: OutputFormat) -> PlugdepsResult<()> {
    let entries = store.list().await?;

    if entries.is_empty() && !matches!(format, OutputFormat::Json) {
        println!("Cache is empty.");
        return Ok(());
    }

    match format {
        OutputFormat::Table => print_entry_table(&entries),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Plain => {
            for entry in &entries {
                println!("{}", entry.path);
            }
        }
    }

    Ok(())
}

fn print_entry_table(entries: &[CacheEntry]) {
    println!(
        "{:<70} {:<18} {:>10} {:<20}",
        "PATH", "RELOCATION", "SIZE", "MODIFIED"
    );
    println!("{}", "-".repeat(120));

    for entry in entries {
        let relocation = match &entry.relocation {
            Some(hash) => style(hash.clone()).cyan().to_string(),
            None => style("original").dim().to_string(),
        };
        let modified = entry
            .modified
            .map(|m| m.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();

        println!(
            "{:<70} {:<18} {:>10} {:<20}",
            entry.path,
            relocation,
            format_bytes(entry.size_bytes),
            modified
        );
    }

    let total: u64 = entries.iter().map(|e| e.size_bytes).sum();
    println!();
    println!(
        "Total: {} artifact(s), {}",
        entries.len(),
        format_bytes(total)
    );
}

/// Remove one coordinate in every form
async fn invalidate(store: &CacheStore, audit: &AuditLog, raw: &str) -> PlugdepsResult<()> {
    let coordinate: Coordinate = raw.parse()?;
    let removed = store.invalidate(&coordinate).await?;

    audit
        .log(
            events::INVALIDATED,
            &serde_json::json!({
                "coordinate": coordinate.to_string(),
                "files_removed": removed,
            }),
        )
        .await;

    if removed == 0 {
        println!("Nothing cached for {}", coordinate);
    } else {
        println!(
            "{} removed {} file(s) for {}",
            style("✓").green(),
            removed,
            coordinate
        );
    }
    Ok(())
}

/// Clear the whole cache
async fn clear_cache(store: &CacheStore, skip_confirm: bool) -> PlugdepsResult<()> {
    let size = store.total_size().await?;
    if size == 0 {
        println!("Cache is already empty.");
        return Ok(());
    }

    println!(
        "This will remove {} from {}",
        format_bytes(size),
        store.root().display()
    );

    if !skip_confirm {
        print!("Are you sure? [y/N] ");
        let _ = io::stdout().flush();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            println!("Failed to read input, aborting.");
            return Ok(());
        }

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    let freed = store.clear().await?;
    println!("{} freed {}", style("✓").green(), format_bytes(freed));

    Ok(())
}
