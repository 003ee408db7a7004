//! Artifact downloads
//!
//! Repositories are tried strictly in order for each coordinate. Within a
//! repository, transient failures (timeouts, refused connections, HTTP 5xx
//! and 429) are retried with exponential backoff; anything else, including a
//! failed checksum, moves on to the next repository.

pub mod orchestrator;
pub mod retry;
pub mod single_flight;
pub mod transport;

pub use orchestrator::{Downloader, DownloaderOptions, FetchScope};
pub use retry::RetryConfig;
pub use single_flight::SingleFlight;
pub use transport::{HttpTransport, Transport};
