//! Config command - show or edit configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::{PlugdepsError, PlugdepsResult};
use crate::model::Repository;
use crate::resolve::MediationPolicy;
use console::style;
use std::path::PathBuf;

/// Keys accepted by `config set`
const KEYS: &[&str] = &[
    "general.log_format",
    "general.audit_log",
    "general.audit_log_path",
    "cache.dir",
    "cache.failure_ttl_secs",
    "download.max_concurrent",
    "download.attempt_timeout_secs",
    "download.max_retries",
    "download.backoff_base_ms",
    "download.backoff_max_ms",
    "download.max_artifact_bytes",
    "download.user_agent",
    "repositories.default",
    "resolve.mediation",
    "resolve.max_depth",
];

/// Execute the config command
pub async fn execute(args: ConfigArgs, manager: &ConfigManager, config: &Config) -> PlugdepsResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
        Some(ConfigAction::Set { key, value }) => {
            let mut config = config.clone();
            set_value(&mut config, &key, &value)?;
            manager.save(&config).await?;
            println!("{} Set {} = {}", style("✓").green(), key, value);
        }
    }

    Ok(())
}

fn show_config(config: &Config) -> PlugdepsResult<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

async fn init_config(manager: &ConfigManager, force: bool) -> PlugdepsResult<()> {
    let path = manager.path();

    if path.exists() && !force {
        println!(
            "{} Config already exists at {}",
            style("!").yellow(),
            path.display()
        );
        println!("  Use --force to overwrite");
        return Ok(());
    }

    manager.save(&Config::default()).await?;
    println!(
        "{} Configuration initialized at {}",
        style("✓").green(),
        path.display()
    );

    Ok(())
}

/// Apply one dot-separated key to `config`
fn set_value(config: &mut Config, key: &str, value: &str) -> PlugdepsResult<()> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["general", "log_format"] => match value {
            "text" | "json" => config.general.log_format = value.to_string(),
            _ => return Err(invalid(key, "expected text or json")),
        },
        ["general", "audit_log"] => config.general.audit_log = parse_bool(key, value)?,
        ["general", "audit_log_path"] => {
            config.general.audit_log_path = Some(PathBuf::from(value))
        }

        ["cache", "dir"] => config.cache.dir = Some(PathBuf::from(value)),
        ["cache", "failure_ttl_secs"] => config.cache.failure_ttl_secs = parse_num(key, value)?,

        ["download", "max_concurrent"] => {
            config.download.max_concurrent = parse_num(key, value)?;
            if config.download.max_concurrent == 0 {
                return Err(invalid(key, "must be at least 1"));
            }
        }
        ["download", "attempt_timeout_secs"] => {
            config.download.attempt_timeout_secs = parse_num(key, value)?;
            if config.download.attempt_timeout_secs == 0 {
                return Err(invalid(key, "must be at least 1"));
            }
        }
        ["download", "max_retries"] => config.download.max_retries = parse_num(key, value)?,
        ["download", "backoff_base_ms"] => config.download.backoff_base_ms = parse_num(key, value)?,
        ["download", "backoff_max_ms"] => config.download.backoff_max_ms = parse_num(key, value)?,
        ["download", "max_artifact_bytes"] => {
            config.download.max_artifact_bytes = parse_num(key, value)?
        }
        ["download", "user_agent"] => config.download.user_agent = value.to_string(),

        ["repositories", "default"] => {
            config.repositories.default = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(Repository::new)
                .collect::<PlugdepsResult<Vec<_>>>()?;
        }

        ["resolve", "mediation"] => {
            config.resolve.mediation = match value {
                "nearest-wins" => MediationPolicy::NearestWins,
                "highest-version" => MediationPolicy::HighestVersion,
                "strict" => MediationPolicy::Strict,
                _ => {
                    return Err(invalid(
                        key,
                        "expected nearest-wins, highest-version or strict",
                    ))
                }
            }
        }
        ["resolve", "max_depth"] => config.resolve.max_depth = parse_num(key, value)?,

        _ => {
            return Err(PlugdepsError::InvalidRequest(format!(
                "Unknown config key: {} (valid keys: {})",
                key,
                KEYS.join(", ")
            )))
        }
    }

    Ok(())
}

fn invalid(key: &str, reason: &str) -> PlugdepsError {
    PlugdepsError::InvalidRequest(format!("{}: {}", key, reason))
}

fn parse_bool(key: &str, value: &str) -> PlugdepsResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(invalid(key, "expected true/false")),
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> PlugdepsResult<T> {
    value
        .parse()
        .map_err(|_| invalid(key, &format!("invalid number '{}'", value)))
}
