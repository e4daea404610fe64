//! Clothing-loop coordinator HTTP service entry point.
//!
//! # Purpose
//! Wires configuration, storage, notifications and the HTTP router, then
//! serves the API and the Prometheus endpoint until shutdown.
use anyhow::Context;
use coordinator::app::{AppState, build_router};
use coordinator::config::{CoordinatorConfig, StorageBackend};
use coordinator::notify::LogNotifier;
use coordinator::observability;
use coordinator::store::{CoordinatorStore, memory::InMemoryStore, postgres::PostgresStore};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CoordinatorConfig::from_env_or_yaml().context("coordinator config")?;
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("bind {}", config.bind_addr))?;
    serve(config, listener, async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "ctrl-c handler unavailable");
        }
    })
    .await
}

/// Serves the API on `listener` until `shutdown` resolves.
async fn serve<F>(config: CoordinatorConfig, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let metrics = observability::init_observability("loop-coordinator")
        .map(|handle| tokio::spawn(observability::serve_metrics(handle, config.metrics_bind)));

    let state = build_state(&config).await?;
    tracing::info!(
        addr = %listener.local_addr().context("listener address")?,
        backend = state.store.backend_name(),
        durable = state.store.is_durable(),
        "coordinator listening"
    );
    let served = axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("http server");

    if let Some(task) = metrics {
        task.abort();
    }
    tracing::info!("coordinator stopped");
    served
}

async fn build_state(config: &CoordinatorConfig) -> anyhow::Result<AppState> {
    let store: Arc<dyn CoordinatorStore + Send + Sync> = match config.storage {
        StorageBackend::Memory => Arc::new(InMemoryStore::new()),
        StorageBackend::Postgres => {
            let pg = config
                .postgres
                .as_ref()
                .context("postgres configuration missing")?;
            let store = PostgresStore::connect(pg)
                .await
                .context("connect to postgres")?;
            Arc::new(store)
        }
    };
    Ok(AppState {
        store,
        notifier: Arc::new(LogNotifier),
        credentials: config.credential_policy(),
    })
}
