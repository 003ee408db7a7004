//! Fetch command - resolve coordinates given as arguments

use crate::cli::args::FetchArgs;
use crate::cli::commands::resolve::{print_resolution, run};
use crate::config::Config;
use crate::error::{PlugdepsError, PlugdepsResult};
use crate::model::{Coordinate, DependencySpec, RelocationRule, Repository, ResolveRequest};
use crate::resolve::Resolver;

/// Execute the fetch command
pub async fn execute(args: FetchArgs, config: &Config) -> PlugdepsResult<()> {
    let request = build_request(&args)?;
    let resolver = Resolver::from_config(config);
    let resolution = run(&resolver, &request, None).await?;
    print_resolution(&resolution, args.format)
}

fn build_request(args: &FetchArgs) -> PlugdepsResult<ResolveRequest> {
    if args.checksum.is_some() && args.coordinates.len() != 1 {
        return Err(PlugdepsError::InvalidRequest(
            "--checksum needs exactly one coordinate".to_string(),
        ));
    }

    let mut request = ResolveRequest::new();
    for url in &args.repository {
        request = request.repository(Repository::new(url.as_str())?);
    }
    for raw in &args.coordinates {
        let coordinate: Coordinate = raw.parse()?;
        let mut dependency = DependencySpec::new(coordinate).transitive(args.transitive);
        if let Some(checksum) = &args.checksum {
            dependency = dependency.checksum(checksum.as_str());
        }
        request = request.dependency(dependency);
    }
    for (from, to) in &args.relocate {
        request = request.relocate(RelocationRule::new(from.as_str(), to.as_str())?);
    }
    request.validated()
}
