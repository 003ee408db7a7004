//! Coordinate & repository model
//!
//! Immutable value types describing what to fetch and from where. Nothing in
//! here performs I/O; malformed input is rejected with a configuration error
//! before any network or disk access happens.

pub mod artifact;
pub mod coordinate;
pub mod relocation;
pub mod repository;
pub mod request;

pub use artifact::ResolvedArtifact;
pub use coordinate::{Coordinate, ModuleId};
pub use relocation::{RelocationRule, RelocationRuleSet, NO_RULES};
pub use repository::{known, Credentials, Repository};
pub use request::{merge_repositories, DependencySpec, ResolveRequest};
