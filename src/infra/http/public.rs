//! Public routes: compiled sources, plain files, directory listings, and the
//! cache admin endpoints.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{Path as UrlPath, State},
    http::{StatusCode, header::CONTENT_TYPE},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use tracing::info;

use crate::{
    application::{
        compile::{CompileQuery, Loader},
        error::{ErrorReport, HttpError},
    },
    cache::{MemoryStore, QueryExecutor, ResponseEnvelope},
    infra::fs::{Resolved, classify, content_type, list_directory, read_file, resolve_request_path},
    presentation::views::{DirectoryEntryView, DirectoryIndexTemplate, render_template_response},
};

use super::{log_responses, set_request_context};

#[derive(Clone)]
pub struct HttpState {
    pub root: Arc<PathBuf>,
    pub compiler: Arc<QueryExecutor<CompileQuery>>,
    pub store: Arc<MemoryStore>,
    pub minify: bool,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/_cache/list", get(cache_list))
        .route("/_cache/clear", get(cache_clear))
        .route("/_cache/dirty", get(cache_dirty))
        .route("/", get(serve_root))
        .route("/{*path}", get(serve_path))
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
        .with_state(state)
}

async fn serve_root(State(state): State<HttpState>) -> Response {
    serve_request(&state, "").await
}

async fn serve_path(State(state): State<HttpState>, UrlPath(path): UrlPath<String>) -> Response {
    serve_request(&state, &path).await
}

/// Catch-all: preprocessed sources go through the compile cache, everything
/// else is served straight from the root directory. `request_path` is
/// root-relative with no leading slash.
async fn serve_request(state: &HttpState, request_path: &str) -> Response {
    let Some(resolved) = resolve_request_path(&state.root, request_path) else {
        return rejected_response(request_path);
    };

    let loader = Path::new(request_path)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(Loader::from_extension);
    if let Some(loader) = loader {
        return compile_response(state, resolved, loader).await;
    }

    match classify(&resolved).await {
        Resolved::File(path) => serve_file(&path).await,
        Resolved::Directory(path) => serve_directory(&path, request_path).await,
        Resolved::Missing => not_found_response(request_path),
    }
}

async fn compile_response(state: &HttpState, path: PathBuf, loader: Loader) -> Response {
    let query = CompileQuery {
        path,
        loader,
        minify: state.minify,
    };
    match state.compiler.execute(&query).await {
        Ok(envelope) => envelope_response(envelope),
        Err(err) => HttpError::from(err).into_response(),
    }
}

fn envelope_response(envelope: ResponseEnvelope) -> Response {
    let mut response = Response::builder().status(envelope.status);
    if let Some(headers) = response.headers_mut() {
        headers.extend(envelope.headers);
    }
    response
        .body(Body::from(envelope.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

async fn serve_file(path: &Path) -> Response {
    match read_file(path).await {
        Ok(bytes) => ([(CONTENT_TYPE, content_type(path).to_string())], bytes).into_response(),
        Err(err) => {
            let mut response = (
                StatusCode::NOT_FOUND,
                format!("the following file was not found:\n\t{}", path.display()),
            )
                .into_response();
            ErrorReport::from_error("infra::http::serve_file", StatusCode::NOT_FOUND, &err)
                .attach(&mut response);
            response
        }
    }
}

async fn serve_directory(path: &Path, request_path: &str) -> Response {
    let index = path.join("index.html");
    if matches!(classify(&index).await, Resolved::File(_)) {
        return serve_file(&index).await;
    }

    let entries = match list_directory(path).await {
        Ok(entries) => entries,
        Err(err) => {
            let mut response = (
                StatusCode::NOT_FOUND,
                format!(
                    "the following directory was not found:\n\t{}",
                    path.display()
                ),
            )
                .into_response();
            ErrorReport::from_error("infra::http::serve_directory", StatusCode::NOT_FOUND, &err)
                .attach(&mut response);
            return response;
        }
    };

    let heading = format!("/{}", request_path.trim_end_matches('/'));
    let base = if heading == "/" { String::new() } else { heading.clone() };
    let template = DirectoryIndexTemplate {
        heading,
        entries: entries
            .into_iter()
            .map(|entry| DirectoryEntryView {
                href: format!("{base}/{}", entry.href),
                label: entry.label,
            })
            .collect(),
    };
    render_template_response(template, StatusCode::OK)
}

async fn cache_list(State(state): State<HttpState>) -> Json<Vec<String>> {
    Json(state.store.keys())
}

async fn cache_clear(State(state): State<HttpState>) -> Json<serde_json::Value> {
    let evicted = state.store.clear();
    info!(evicted, "cleared compile cache");
    Json(serde_json::json!({ "evicted": evicted }))
}

async fn cache_dirty(State(state): State<HttpState>) -> Json<serde_json::Value> {
    let dirtied = state.store.dirty();
    info!(dirtied, "marked compile cache dirty");
    Json(serde_json::json!({ "dirtied": dirtied }))
}

fn not_found_response(request_path: &str) -> Response {
    let mut response = (
        StatusCode::NOT_FOUND,
        format!("the following path was not found:\n\t/{request_path}"),
    )
        .into_response();
    ErrorReport::from_message(
        "infra::http::serve_path",
        StatusCode::NOT_FOUND,
        "path not found",
    )
    .attach(&mut response);
    response
}

fn rejected_response(request_path: &str) -> Response {
    let mut response = StatusCode::NOT_FOUND.into_response();
    ErrorReport::from_message(
        "infra::http::serve_path",
        StatusCode::NOT_FOUND,
        format!("rejected path: /{request_path}"),
    )
    .attach(&mut response);
    response
}
