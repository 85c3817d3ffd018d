//! Brezza: a small development file server with a memoizing compile cache.
//!
//! Requests for preprocessed sources run through a compile handler and the
//! output is cached in memory, keyed by the structural content of the query
//! and invalidated against the source file's modification time. Plain files
//! and directory listings are served straight from the configured root.

pub mod application;
pub mod cache;
pub mod config;
pub mod infra;
pub mod presentation;
