use std::{process, sync::Arc};

use axum::http::{HeaderMap, HeaderValue, header::CONTENT_TYPE};
use brezza::{
    application::{compile::EsbuildCompiler, error::AppError},
    cache::{CacheConfig, ExecutorConfig, MemoryStore, QueryExecutor},
    config,
    infra::{
        error::InfraError,
        http::{self, HttpState},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let store = Arc::new(MemoryStore::new());

    // Compiled sources answer with the mime type of their output.
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/javascript"));

    let compiler = Arc::new(QueryExecutor::new(
        Arc::new(EsbuildCompiler::new(settings.compile.esbuild_path.clone())),
        store.clone(),
        ExecutorConfig {
            cache: CacheConfig::from(&settings.cache),
            headers,
            ..Default::default()
        },
    ));

    let state = HttpState {
        root: Arc::new(settings.files.root.clone()),
        compiler,
        store,
        minify: settings.compile.minify,
    };
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        addr = %settings.server.addr,
        root = %settings.files.root.display(),
        cache_enabled = settings.cache.enabled,
        "brezza listening"
    );

    let grace = settings.server.graceful_shutdown;
    let shutdown = async move {
        let _ = tokio::signal::ctrl_c().await;
        info!(
            grace_secs = grace.as_secs(),
            "shutdown signal received, draining connections"
        );
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            warn!("grace period elapsed before connections drained, exiting");
            process::exit(0);
        });
    };

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}
