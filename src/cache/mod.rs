//! Local artifact cache
//!
//! Artifacts are stored by coordinate path; relocated artifacts live under
//! `relocated/{rule-set hash}/` so they never collide with their source.
//!
//! # Cache States
//!
//! | State | On disk | Description |
//! |-------|---------|-------------|
//! | Absent | nothing | Fetch on demand |
//! | InFlight | `.part` file | Download running (in memory only) |
//! | Verifying | `.part` file | Digest check running (in memory only) |
//! | Ready | final file | Complete and verified, read-only from here on |
//! | Failed | `.failed` marker | Not retried until the failure TTL expires |

pub mod entry;
pub mod store;

pub use entry::{format_bytes, CacheEntry, CacheKey, CacheState, RELOCATED_DIR};
pub use store::{CacheStore, CacheWrite};
