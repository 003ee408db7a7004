//! Resolve command - turn a request file into local paths

use crate::cli::args::{OutputFormat, ResolveArgs};
use crate::config::Config;
use crate::error::PlugdepsResult;
use crate::loader::{Classpath, ClasspathLoader};
use crate::model::ResolveRequest;
use crate::resolve::{Resolution, Resolver};
use console::style;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Execute the resolve command
pub async fn execute(args: ResolveArgs, config: &Config) -> PlugdepsResult<()> {
    let mut request = ResolveRequest::from_file(&args.request).await?;
    if let Some(secs) = args.timeout {
        request = request.timeout(Duration::from_secs(secs));
    }
    debug!(
        "Request {} has {} dependencies",
        args.request.display(),
        request.dependencies.len()
    );

    let resolver = Resolver::from_config(config);
    let resolution = run(&resolver, &request, args.classpath_file.as_deref()).await?;
    print_resolution(&resolution, args.format)
}

/// Resolve, and write an argfile when asked to
pub(crate) async fn run(
    resolver: &Resolver,
    request: &ResolveRequest,
    classpath_file: Option<&Path>,
) -> PlugdepsResult<Resolution> {
    let Some(argfile) = classpath_file else {
        return resolver.resolve(request).await;
    };

    let classpath = Classpath::new();
    let resolution = resolver
        .load(request, &ClasspathLoader, &classpath)
        .await?;
    classpath.write_argfile(argfile).await?;
    eprintln!(
        "{} wrote classpath ({} entries) to {}",
        style("✓").green(),
        classpath.len(),
        argfile.display()
    );
    Ok(resolution)
}

pub(crate) fn print_resolution(resolution: &Resolution, format: OutputFormat) -> PlugdepsResult<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(resolution)?),
        OutputFormat::Plain => {
            for artifact in &resolution.artifacts {
                println!("{}", artifact.path.display());
            }
        }
        OutputFormat::Table => print_table(resolution),
    }

    for skipped in &resolution.skipped {
        eprintln!(
            "{} skipped optional {}: {}",
            style("!").yellow(),
            skipped.coordinate,
            skipped.reason
        );
    }
    Ok(())
}

fn print_table(resolution: &Resolution) {
    println!(
        "{:<50} {:<10} {:<12} {}",
        "COORDINATE", "SOURCE", "VERIFIED", "PATH"
    );
    println!("{}", "-".repeat(100));

    for artifact in &resolution.artifacts {
        let source = if artifact.from_cache {
            style("cache").dim().to_string()
        } else {
            style("download").green().to_string()
        };
        let verified = match &artifact.verification {
            Some(v) if v.is_verified() => style(v.to_string()).green().to_string(),
            Some(v) => style(v.to_string()).yellow().to_string(),
            None => "-".to_string(),
        };
        println!(
            "{:<50} {:<10} {:<12} {}",
            artifact.coordinate.to_string(),
            source,
            verified,
            artifact.path.display()
        );
    }

    println!();
    println!(
        "Total: {} artifact(s), {} skipped",
        resolution.artifacts.len(),
        resolution.skipped.len()
    );
}
