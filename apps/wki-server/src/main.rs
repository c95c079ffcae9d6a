use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use tracing::{error, info, warn};
use wki_model::ModelStore;

mod api;
mod app_state;
mod config;
mod discovery;
mod fetcher;
mod gate;
mod http_client;
mod orchestrator;
mod router;
mod scheduler;
mod tasks;

pub(crate) use app_state::AppState;

use config::ServiceConfig;
use discovery::{BackendLocator, Browser, MdnsDiscovery, Registrar, SelfAdvertiser, ServiceAnnouncement};
use fetcher::TrainingDataFetcher;
use orchestrator::TrainingOrchestrator;
use tasks::TaskManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    wki_otel::init();

    let config = match ServiceConfig::from_env() {
        Ok(config) => Arc::new(config),
        Err(err) => {
            eprintln!("wki-server: {err}");
            std::process::exit(2);
        }
    };
    let device = discovery::net::device_name();

    let mdns = if config.discovery_enabled || config.backend_discovery_enabled {
        match MdnsDiscovery::new() {
            Ok(mdns) => Some(Arc::new(mdns)),
            Err(err) => {
                warn!(target: "wki::discovery", %err, "mdns unavailable; discovery disabled");
                None
            }
        }
    } else {
        None
    };

    let browser = mdns.clone().map(|m| m as Arc<dyn Browser>);
    let locator = Arc::new(BackendLocator::new(
        config.backend_url.as_deref(),
        config.backend_discovery_enabled,
        browser,
    ));
    let fetcher = TrainingDataFetcher::new(locator.clone(), config.fetch_settings())
        .context("build backend http client")?;
    let store = Arc::new(ModelStore::new());
    let orchestrator = Arc::new(TrainingOrchestrator::new(
        locator.clone(),
        fetcher,
        store,
        Some(config.state_path()),
    ));
    if let Err(err) = orchestrator.restore() {
        warn!(target: "wki::store", %err, "persisted state ignored");
    }

    let advertiser = Arc::new(SelfAdvertiser::new(
        if config.discovery_enabled {
            mdns.clone().map(|m| m as Arc<dyn Registrar>)
        } else {
            None
        },
        ServiceAnnouncement::for_device(&device, discovery::net::local_ipv4(), config.port()),
    ));
    advertiser.publish();
    locator.ensure_discovery();

    info!(
        device = %device,
        backend = ?locator.resolve(),
        backend_fixed = locator.is_fixed(),
        interval_secs = config.training_interval.as_secs(),
        "starting wki-server"
    );

    let mut background_tasks = TaskManager::new();
    background_tasks.push(scheduler::start(
        orchestrator.clone(),
        locator.clone(),
        config.training_interval,
    ));

    let state = AppState::new(config.clone(), device, orchestrator);
    let app = router::attach_http_layers(router::build(state));

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("bind {}", config.addr))?;
    info!("wki-server listening on http://{}", config.addr);

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    if let Err(err) = server.await {
        error!("http server exited with error: {err}");
    }

    info!("shutting down background tasks");
    if advertiser.is_published() {
        let withdraw = advertiser.clone();
        if let Err(err) = tokio::task::spawn_blocking(move || withdraw.unpublish()).await {
            warn!(target: "wki::discovery", %err, "service withdrawal task failed");
        }
    }
    locator.stop();
    if let Some(mdns) = &mdns {
        mdns.shutdown();
    }
    background_tasks
        .shutdown_with_grace(Duration::from_secs(5))
        .await;
    Ok(())
}

async fn shutdown_signal() {
    info!("shutdown signal listener active");
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(%err, "SIGTERM handler unavailable; waiting for ctrl-c");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("shutdown signal received");
}
