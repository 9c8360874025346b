//! Wiring shared by the `serve`, `run` and `totp` commands.

use crate::config::Config;
use crate::db::{KvStore, MemoryKvStore, PluginData, SqliteKvStore};
use crate::error::PilotError;
use crate::notify;
use crate::plugins::{self, totp};
use crate::server::{AppState, pilot_router};
use crate::service::{PluginRegistry, RuntimeDeps, Scheduler};
use crate::site::SiteRegistry;
use crate::types::{RunOutcome, TriggerSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub async fn open_store(cfg: &Config) -> Result<Arc<dyn KvStore>, PilotError> {
    let store = SqliteKvStore::connect(&cfg.basic.database_url).await?;
    Ok(Arc::new(store))
}

pub fn runtime_deps(cfg: &Config, store: Arc<dyn KvStore>) -> Result<RuntimeDeps, PilotError> {
    Ok(RuntimeDeps {
        store,
        sites: Arc::new(SiteRegistry::new(cfg.sites.clone())),
        proxy: cfg.basic.proxy.clone(),
        notifier: notify::from_config(&cfg.notify, cfg.basic.proxy.as_ref())?,
    })
}

/// Scheduler plus HTTP API until ctrl-c / SIGTERM, then a graceful drain.
pub async fn serve(cfg: Config) -> Result<(), PilotError> {
    cfg.validate_serve()?;
    let tz = cfg.timezone()?;
    let store = open_store(&cfg).await?;
    let deps = runtime_deps(&cfg, store.clone())?;

    let registry = PluginRegistry::spawn_all(plugins::build_all(&cfg), &deps).await?;
    if registry.is_empty() {
        warn!("no plugin is enabled; only the HTTP API will run");
    }
    let scheduler = Scheduler::start(&registry, tz).await?;
    info!(loops = scheduler.task_count(), %tz, "scheduler started");

    let state = AppState::new(registry.clone(), store, Arc::from(cfg.basic.api_key.as_str()));
    let app = pilot_router(state);

    let listener = TcpListener::bind(&cfg.basic.listen_addr).await?;
    info!("HTTP server listening on {}", cfg.basic.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutdown requested; draining plugin runs");
    scheduler.stop().await;
    registry
        .shutdown_all(Duration::from_secs(cfg.basic.shutdown_grace_secs))
        .await;
    Ok(())
}

/// One run of one enabled plugin, outside the scheduler.
pub async fn run_once(cfg: &Config, plugin_id: &str, dry: bool) -> Result<RunOutcome, PilotError> {
    let plugin = plugins::build_all(cfg)
        .into_iter()
        .find(|p| p.id() == plugin_id)
        .ok_or_else(|| PilotError::UnknownPlugin(plugin_id.to_string()))?;

    let store: Arc<dyn KvStore> = if dry {
        Arc::new(MemoryKvStore::new())
    } else {
        open_store(cfg).await?
    };
    let runtime = runtime_deps(cfg, store)?.runtime(plugin);
    Ok(runtime.run_once(TriggerSource::Cli).await)
}

/// Current codes for the stored secrets merged with the configured ones; nothing is written.
pub async fn totp_sheet(cfg: &Config) -> Result<totp::CodeSheet, PilotError> {
    let store = open_store(cfg).await?;
    let mut secrets = totp::stored_secrets(&PluginData::new(store, totp::ID)).await?;
    if let Some(tc) = cfg.plugins.totp.clone() {
        let configured = totp::TotpPlugin::new(tc).configured_secrets()?;
        totp::merge_secrets(&mut secrets, configured);
    }
    Ok(totp::current_codes(&secrets))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
