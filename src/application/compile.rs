//! On-demand source compilation via the esbuild CLI.
//!
//! Preprocessed sources keep the mime type of their compiled counterparts,
//! so a `.ts` request is answered with `text/javascript` bytes produced by
//! a bundling pass over the requested entry file.

use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::cache::{HandlerError, QueryHandler, SourceQuery};

/// Loader inferred from the requested file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Loader {
    Ts,
    Tsx,
    Jsx,
}

impl Loader {
    /// Map a request extension to its loader, `None` for plain assets.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "ts" => Some(Self::Ts),
            "tsx" => Some(Self::Tsx),
            "jsx" => Some(Self::Jsx),
            _ => None,
        }
    }
}

/// One compile request. Structural content feeds the cache key, so every
/// field that changes the output must live here.
#[derive(Debug, Clone, Serialize)]
pub struct CompileQuery {
    pub path: PathBuf,
    pub loader: Loader,
    pub minify: bool,
}

impl SourceQuery for CompileQuery {
    fn source_path(&self) -> &Path {
        &self.path
    }
}

/// Shells out to the esbuild binary and captures the bundled output from
/// stdout.
pub struct EsbuildCompiler {
    binary: PathBuf,
}

impl EsbuildCompiler {
    pub fn new(binary: PathBuf) -> Self {
        Self { binary }
    }
}

#[async_trait]
impl QueryHandler<CompileQuery> for EsbuildCompiler {
    async fn handle(&self, query: &CompileQuery) -> Result<Option<Bytes>, HandlerError> {
        let started = Instant::now();

        let mut command = Command::new(&self.binary);
        command.arg(&query.path).arg("--bundle");
        if query.minify {
            command.arg("--minify");
        }

        // Not being able to start the compiler at all is a fault; the
        // compiler rejecting the input is a designed no-output outcome.
        let output = command.output().await.map_err(|err| {
            HandlerError::with_source(
                format!("failed to run compiler `{}`", self.binary.display()),
                err,
            )
        })?;

        if !output.status.success() {
            warn!(
                path = %query.path.display(),
                exit = output.status.code().unwrap_or(-1),
                stderr = %String::from_utf8_lossy(&output.stderr),
                "compiler error"
            );
            return Ok(None);
        }

        if !output.stderr.is_empty() {
            debug!(
                path = %query.path.display(),
                stderr = %String::from_utf8_lossy(&output.stderr),
                "compiler diagnostics"
            );
        }

        info!(
            path = %query.path.display(),
            bytes = output.stdout.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "compiled source"
        );

        Ok(Some(Bytes::from(output.stdout)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::query_key;

    #[test]
    fn loader_maps_preprocessed_extensions_only() {
        assert_eq!(Loader::from_extension("ts"), Some(Loader::Ts));
        assert_eq!(Loader::from_extension("tsx"), Some(Loader::Tsx));
        assert_eq!(Loader::from_extension("jsx"), Some(Loader::Jsx));
        assert_eq!(Loader::from_extension("js"), None);
        assert_eq!(Loader::from_extension("css"), None);
    }

    #[test]
    fn query_key_changes_with_minify_flag() {
        let base = CompileQuery {
            path: PathBuf::from("src/app.ts"),
            loader: Loader::Ts,
            minify: false,
        };
        let minified = CompileQuery {
            minify: true,
            ..base.clone()
        };
        assert_ne!(query_key(&base).unwrap(), query_key(&minified).unwrap());
        assert_eq!(query_key(&base).unwrap(), query_key(&base.clone()).unwrap());
    }
}
