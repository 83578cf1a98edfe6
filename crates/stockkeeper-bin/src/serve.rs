use std::sync::Arc;

use anyhow::anyhow;
use stockkeeper::{
    CONFIG, CancellationToken,
    api::router::{new_router, serve as service_serve},
    implementations::postgres::{self, PostgresStore},
    service::{
        RetailStore, State, TaskScheduler, TaskStore, recover_interrupted,
        seed_default_parameters, tasks::WorkerPools,
    },
    tokio, tracing,
};

pub(crate) async fn serve(bind_addr: std::net::SocketAddr) -> Result<(), anyhow::Error> {
    let read_pool = postgres::get_pool(&CONFIG.pg).await?;
    let write_pool = postgres::get_pool(&CONFIG.pg).await?;
    let store = Arc::new(PostgresStore::from_pools(read_pool, write_pool));

    let tasks: Arc<dyn TaskStore> = store.clone();
    let retail: Arc<dyn RetailStore> = store;

    // Tasks left over from a previous process would look alive forever;
    // fail them before the pools accept new work.
    recover_interrupted(&tasks).await?;
    seed_default_parameters(retail.as_ref()).await?;

    let scheduler = Arc::new(TaskScheduler::new(tasks.clone(), WorkerPools::from_config()));
    let state = State::new(tasks, retail, scheduler);
    let router = new_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .map_err(|e| anyhow!(e).context(format!("Failed to bind to address: {bind_addr}")))?;

    let cancellation_token = CancellationToken::new();
    let shutdown_token = cancellation_token.clone();
    tokio::task::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal");
            shutdown_token.cancel();
        }
    });

    service_serve(listener, router, cancellation_token).await
}
