//! plugdeps - runtime dependency loader for plugins
//!
//! Fetches Maven artifacts from an ordered list of mirrors, verifies them,
//! keeps them in a local cache, optionally relocates their packages, and
//! hands the final paths to a host-provided loader.
//!
//! ```rust,ignore
//! use plugdeps::config::Config;
//! use plugdeps::loader::{Classpath, ClasspathLoader};
//! use plugdeps::model::{DependencySpec, Repository, ResolveRequest};
//! use plugdeps::resolve::Resolver;
//!
//! let request = ResolveRequest::new()
//!     .repository(Repository::new("https://mirror.example/maven2")?)
//!     .repository(Repository::maven_central())
//!     .dependency(DependencySpec::new("org.apache.commons:commons-lang3:3.14.0".parse()?));
//!
//! let classpath = Classpath::new();
//! let resolution = Resolver::from_config(&Config::default())
//!     .load(&request, &ClasspathLoader, &classpath)
//!     .await?;
//! ```

pub mod audit;
pub mod cache;
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod integrity;
pub mod loader;
pub mod model;
pub mod relocate;
pub mod resolve;

pub use error::{PlugdepsError, PlugdepsResult};
