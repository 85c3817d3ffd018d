//! Brezza compile cache.
//!
//! Memoizes compile query output in memory, keyed by the structural content
//! of the query and invalidated against the source file's modification time.
//!
//! ## Configuration
//!
//! Caching is gated via `brezza.toml`:
//!
//! ```toml
//! [cache]
//! enabled = true
//! ```

mod config;
mod executor;
mod freshness;
mod keys;
mod lock;
mod store;

pub use config::CacheConfig;
pub use executor::{
    ErrorEnvelope, ExecuteError, ExecutorConfig, HandlerError, QueryExecutor, QueryHandler,
    ResponseEnvelope, SourceQuery,
};
pub use freshness::last_modified;
pub use keys::{KeyError, query_key};
pub use store::{ArtifactStore, CachedArtifact, MemoryStore};
