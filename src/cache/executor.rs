//! Cacheable query execution.
//!
//! Decides hit vs. miss per query using the freshness of the source file,
//! delegates misses to the caller-supplied handler, and writes results back
//! to the injected store. Handler faults are not converted here; they
//! propagate to the transport layer through [`ExecuteError`].

use std::error::Error as StdError;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use metrics::counter;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use super::config::CacheConfig;
use super::freshness::last_modified;
use super::keys::{KeyError, query_key};
use super::store::{ArtifactStore, CachedArtifact};

/// A query for compiled output.
///
/// Every query names the source file its result depends on; all fields must
/// be JSON-representable since they feed the cache key.
pub trait SourceQuery: Serialize + Send + Sync {
    fn source_path(&self) -> &Path;
}

/// A handler fault raised while computing query output.
#[derive(Debug, Error)]
#[error("query handler failed: {message}")]
pub struct HandlerError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Computes the artifact bytes for a query on a cache miss.
///
/// Must be pure with respect to the content of `query.source_path()` at call
/// time; the cache assumes the same source produces the same output.
/// `Ok(None)` means the handler produced no output, which the executor turns
/// into its configured error envelope.
#[async_trait]
pub trait QueryHandler<Q>: Send + Sync {
    async fn handle(&self, query: &Q) -> Result<Option<Bytes>, HandlerError>;
}

#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Handler(#[from] HandlerError),
}

/// What the transport layer sends back: body, status, headers.
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    pub body: Bytes,
    pub status: StatusCode,
    pub headers: HeaderMap,
}

/// The envelope returned when the handler yields no output.
#[derive(Debug, Clone)]
pub struct ErrorEnvelope {
    pub body: String,
    pub status: StatusCode,
}

impl Default for ErrorEnvelope {
    fn default() -> Self {
        Self {
            body: "no output was produced".to_string(),
            status: StatusCode::NOT_FOUND,
        }
    }
}

/// Executor configuration: the injected cache gate, headers attached to
/// successful responses, and the no-output error envelope.
#[derive(Debug, Clone, Default)]
pub struct ExecutorConfig {
    pub cache: CacheConfig,
    pub headers: HeaderMap,
    pub error_response: ErrorEnvelope,
}

/// Memoizing query executor.
///
/// The store is injected, never created here, so callers decide whether
/// executors share or isolate their caches. There is no deduplication of
/// in-flight identical queries: two concurrent executes for one key may both
/// miss and both run the handler, and the last store write wins. Worst case
/// is duplicated handler work, not corruption, because `set` is a plain
/// overwrite.
pub struct QueryExecutor<Q> {
    handler: Arc<dyn QueryHandler<Q>>,
    store: Arc<dyn ArtifactStore>,
    config: ExecutorConfig,
}

impl<Q: SourceQuery> QueryExecutor<Q> {
    pub fn new(
        handler: Arc<dyn QueryHandler<Q>>,
        store: Arc<dyn ArtifactStore>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            handler,
            store,
            config,
        }
    }

    /// Execute one query: hit test, handler on miss, store write-back,
    /// response envelope.
    pub async fn execute(&self, query: &Q) -> Result<ResponseEnvelope, ExecuteError> {
        let key = query_key(query)?;
        let fresh_time = last_modified(query.source_path()).await;
        let cache_enabled = self.config.cache.enabled;

        let mut cached_bytes = None;
        if cache_enabled
            && let Some(artifact) = self.store.get(&key)
            && artifact.mtime >= fresh_time
        {
            debug!(
                cache = "query",
                outcome = "hit",
                key = %key,
                path = %query.source_path().display(),
                "serving cached query"
            );
            counter!("brezza_query_cache_hit_total").increment(1);
            cached_bytes = Some(artifact.contents);
        }

        let file_bytes = match cached_bytes {
            Some(bytes) => Some(bytes),
            None => {
                if cache_enabled {
                    counter!("brezza_query_cache_miss_total").increment(1);
                }
                self.handler.handle(query).await?
            }
        };

        let Some(bytes) = file_bytes else {
            return Ok(ResponseEnvelope {
                body: Bytes::from(self.config.error_response.body.clone()),
                status: self.config.error_response.status,
                headers: HeaderMap::new(),
            });
        };

        if cache_enabled {
            // Re-stamping a hit-served entry with the same fresh_time is a
            // harmless overwrite.
            self.store.set(
                key,
                CachedArtifact {
                    contents: bytes.clone(),
                    mtime: fresh_time,
                },
            );
        }

        Ok(ResponseEnvelope {
            body: bytes,
            status: StatusCode::OK,
            headers: self.config.headers.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde::Serialize;
    use time::OffsetDateTime;

    use super::*;
    use crate::cache::MemoryStore;

    #[derive(Serialize)]
    struct FileQuery {
        path: PathBuf,
        mode: &'static str,
    }

    impl SourceQuery for FileQuery {
        fn source_path(&self) -> &Path {
            &self.path
        }
    }

    struct CountingHandler {
        calls: AtomicUsize,
        output: Option<&'static [u8]>,
    }

    impl CountingHandler {
        fn returning(output: &'static [u8]) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                output: Some(output),
            }
        }

        fn empty() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                output: None,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl QueryHandler<FileQuery> for CountingHandler {
        async fn handle(&self, _query: &FileQuery) -> Result<Option<Bytes>, HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.output.map(Bytes::from_static))
        }
    }

    struct FaultingHandler;

    #[async_trait]
    impl QueryHandler<FileQuery> for FaultingHandler {
        async fn handle(&self, _query: &FileQuery) -> Result<Option<Bytes>, HandlerError> {
            Err(HandlerError::new("compiler crashed"))
        }
    }

    fn query(path: &str) -> FileQuery {
        FileQuery {
            path: PathBuf::from(path),
            mode: "js",
        }
    }

    fn executor_with(
        handler: Arc<dyn QueryHandler<FileQuery>>,
        store: Arc<MemoryStore>,
        enabled: bool,
    ) -> QueryExecutor<FileQuery> {
        QueryExecutor::new(
            handler,
            store,
            ExecutorConfig {
                cache: CacheConfig { enabled },
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn fresh_entry_is_served_without_invoking_the_handler() {
        // A nonexistent source resolves freshness to "now", so the stored
        // stamp must sit in the future for the entry to count as fresh.
        let handler = Arc::new(CountingHandler::returning(b"recomputed"));
        let store = Arc::new(MemoryStore::new());
        let q = query("/nonexistent/a.ts");
        store.set(
            query_key(&q).unwrap(),
            CachedArtifact {
                contents: Bytes::from_static(b"cached"),
                mtime: OffsetDateTime::now_utc() + time::Duration::hours(1),
            },
        );

        let executor = executor_with(handler.clone(), store, true);
        let response = executor.execute(&q).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body.as_ref(), b"cached");
        assert_eq!(handler.calls(), 0);
    }

    #[tokio::test]
    async fn miss_invokes_handler_once_and_populates_the_store() {
        let handler = Arc::new(CountingHandler::returning(b"\x01\x02\x03"));
        let store = Arc::new(MemoryStore::new());
        let q = query("/nonexistent/a.ts");

        let executor = executor_with(handler.clone(), store.clone(), true);
        let response = executor.execute(&q).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body.as_ref(), b"\x01\x02\x03");
        assert_eq!(handler.calls(), 1);

        let stored = store.get(&query_key(&q).unwrap()).expect("stored entry");
        assert_eq!(stored.contents.as_ref(), b"\x01\x02\x03");
    }

    #[tokio::test]
    async fn stale_entry_forces_a_miss() {
        let handler = Arc::new(CountingHandler::returning(b"fresh output"));
        let store = Arc::new(MemoryStore::new());
        let q = query("/nonexistent/a.ts");
        // Freshness resolves to "now"; a past stamp is strictly older.
        store.set(
            query_key(&q).unwrap(),
            CachedArtifact {
                contents: Bytes::from_static(b"stale output"),
                mtime: OffsetDateTime::now_utc() - time::Duration::hours(1),
            },
        );

        let executor = executor_with(handler.clone(), store.clone(), true);
        let response = executor.execute(&q).await.unwrap();

        assert_eq!(response.body.as_ref(), b"fresh output");
        assert_eq!(handler.calls(), 1);
        assert_eq!(
            store.get(&query_key(&q).unwrap()).unwrap().contents.as_ref(),
            b"fresh output"
        );
    }

    #[tokio::test]
    async fn disabled_cache_bypasses_reads_and_writes() {
        let handler = Arc::new(CountingHandler::returning(b"computed"));
        let store = Arc::new(MemoryStore::new());
        let q = query("/nonexistent/a.ts");
        store.set(
            query_key(&q).unwrap(),
            CachedArtifact {
                contents: Bytes::from_static(b"cached"),
                mtime: OffsetDateTime::now_utc() + time::Duration::hours(1),
            },
        );

        let executor = executor_with(handler.clone(), store.clone(), false);
        let first = executor.execute(&q).await.unwrap();
        let second = executor.execute(&q).await.unwrap();

        assert_eq!(first.body.as_ref(), b"computed");
        assert_eq!(second.body.as_ref(), b"computed");
        assert_eq!(handler.calls(), 2);
        // The pre-seeded entry is untouched: no write-back happened.
        assert_eq!(
            store.get(&query_key(&q).unwrap()).unwrap().contents.as_ref(),
            b"cached"
        );
    }

    #[tokio::test]
    async fn no_output_yields_the_error_envelope_and_no_store_write() {
        let handler = Arc::new(CountingHandler::empty());
        let store = Arc::new(MemoryStore::new());
        let q = query("/nonexistent/a.ts");

        let executor = executor_with(handler, store.clone(), true);
        let response = executor.execute(&q).await.unwrap();

        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.body.as_ref(), b"no output was produced");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn configured_error_envelope_is_honored() {
        let handler = Arc::new(CountingHandler::empty());
        let store = Arc::new(MemoryStore::new());
        let executor = QueryExecutor::new(
            handler,
            store,
            ExecutorConfig {
                error_response: ErrorEnvelope {
                    body: "transpile failed".to_string(),
                    status: StatusCode::SERVICE_UNAVAILABLE,
                },
                ..Default::default()
            },
        );

        let response = executor.execute(&query("/nonexistent/a.ts")).await.unwrap();
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.body.as_ref(), b"transpile failed");
    }

    #[tokio::test]
    async fn handler_faults_propagate() {
        let store = Arc::new(MemoryStore::new());
        let executor = executor_with(Arc::new(FaultingHandler), store.clone(), true);

        let result = executor.execute(&query("/nonexistent/a.ts")).await;
        assert!(matches!(result, Err(ExecuteError::Handler(_))));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn configured_headers_ride_along_on_success() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "text/javascript".parse().unwrap());
        let executor = QueryExecutor::new(
            Arc::new(CountingHandler::returning(b"out")),
            Arc::new(MemoryStore::new()),
            ExecutorConfig {
                headers,
                ..Default::default()
            },
        );

        let response = executor.execute(&query("/nonexistent/a.ts")).await.unwrap();
        assert_eq!(response.headers["content-type"], "text/javascript");
    }
}
