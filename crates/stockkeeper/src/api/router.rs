use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    response::IntoResponse,
    routing::{delete, get, post},
};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    compression::CompressionLayer,
    timeout::TimeoutLayer,
    trace::{self, TraceLayer},
};

use crate::{
    CONFIG, CancellationToken,
    api::{data, files, noos, params, tasks},
    service::State as ServiceState,
};

/// Builds the full application router on top of the service graph.
pub fn new_router(state: ServiceState) -> Router {
    Router::new()
        .route("/api/file/upload/{kind}", post(files::upload_sync))
        .route("/api/file/upload/{kind}/async", post(files::upload_async))
        .route("/api/file/download/{kind}", get(files::download_sync))
        .route(
            "/api/file/download/{kind}/async",
            post(files::download_async),
        )
        .route("/api/tasks", get(tasks::list_tasks))
        .route("/api/tasks/stats", get(tasks::stats))
        .route("/api/tasks/stats/{kind}", get(tasks::stats_by_kind))
        .route("/api/tasks/status/{status}", get(tasks::list_by_status))
        .route("/api/tasks/{id}", get(tasks::get_task))
        .route("/api/tasks/{id}/cancel", post(tasks::cancel_task))
        .route("/api/tasks/{id}/result", get(tasks::get_result))
        .route("/api/run/noos/async", post(noos::run_async))
        .route("/api/results/noos", get(noos::list_results))
        .route("/api/results/noos/summary", get(noos::summary))
        .route("/api/results/noos/{type}", get(noos::list_by_type))
        .route("/api/algo/parameters", get(params::list))
        .route(
            "/api/algo/parameters/{name}",
            get(params::get).put(params::put),
        )
        .route(
            "/api/algo/parameters/{name}/activate",
            post(params::activate),
        )
        .route("/api/data/clear-all", delete(data::clear_all))
        .route("/api/audit", get(data::list_audit))
        .layer(DefaultBodyLimit::max(CONFIG.max_request_body_size))
        // Health stays outside the body limit and is never instrumented
        // away by middleware below.
        .route("/health", get(health))
        .layer(
            ServiceBuilder::new()
                .layer(CatchPanicLayer::new())
                .layer(CompressionLayer::new())
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace::DefaultMakeSpan::new().level(tracing::Level::INFO))
                        .on_response(trace::DefaultOnResponse::new().level(tracing::Level::DEBUG)),
                )
                .layer(TimeoutLayer::new(CONFIG.max_request_time())),
        )
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Serve the given router on the given listener.
///
/// # Errors
/// Fails if the webserver panics.
pub async fn serve(
    listener: tokio::net::TcpListener,
    router: Router,
    cancellation_token: CancellationToken,
) -> anyhow::Result<()> {
    let cancellation_future = async move {
        cancellation_token.cancelled().await;
        tracing::info!("HTTP server shutdown requested (cancellation token)");
    };
    axum::serve(listener, router)
        .with_graceful_shutdown(cancellation_future)
        .await
        .map_err(|e| anyhow::anyhow!(e).context("error running HTTP server"))
}
