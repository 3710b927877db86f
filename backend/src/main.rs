use privacy_backend::api;
use privacy_backend::config::Config;
use privacy_backend::db::{self, SqliteRecordStore, SqliteSessionStore};
use privacy_backend::errors::PrivacyError;
use privacy_backend::state::AppState;
use privacy_backend::store::{RecordStore, SessionStore};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), PrivacyError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    // Store local state under backend/data (ignored by git).
    std::fs::create_dir_all(&config.data_dir).map_err(|e| {
        tracing::error!(error = %e, dir = %config.data_dir.display(), "cannot create data dir");
        PrivacyError::Internal
    })?;

    let db = db::connect(&config.database_url, 5).await?;
    db::init_schema(&db).await?;
    let sessions: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::new(db.clone()));
    let records: Arc<dyn RecordStore> = Arc::new(SqliteRecordStore::new(db));

    if config.validators.is_empty() {
        tracing::warn!("VALIDATORS is empty; access requests will fail until validators are configured");
    }

    let state = AppState::from_config(config, sessions, records);
    spawn_sweeper(state.clone());

    let app = api::router(state.clone());
    let addr = state.config.addr.clone();

    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        tracing::error!(error = %e, %addr, "bind failed");
        PrivacyError::Internal
    })?;

    tracing::info!(%addr, prover = ?state.config.prover, "backend listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|_| PrivacyError::Internal)?;

    Ok(())
}

/// Periodically expire sessions nobody touched after their deadline.
fn spawn_sweeper(state: AppState) {
    let period = Duration::from_secs(state.config.sweep_interval_secs);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(e) = state.orchestrator.access().sweep_expired().await {
                tracing::warn!(error = %e, "expiry sweep failed");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
