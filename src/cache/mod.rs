//! Versioned response cache for offline support.
//!
//! This module provides:
//! - Named stores of request/response snapshots, one per cache version
//! - Install-time seeding of shell assets and activation-time eviction of old versions
//! - The fetch interception policy (cache-first, offline document for navigations)

mod lifecycle;
mod policy;
mod storage;
mod traits;

pub use lifecycle::{evict_stale, precache, PrecacheReport};
pub use policy::{FetchOutcome, FetchPolicy};
pub use storage::SqliteStorage;
pub use traits::{CacheStorage, RequestKey};
