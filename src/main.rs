//! Outpost - unified application entry point
//!
//! Wires configuration, the database, indexer and download-client
//! gateways, the acquisition services and the scheduler, then runs until
//! a shutdown signal arrives.

use outpost_acquisition::{
    AutoApprovalRules, DownloadTracker, ImportService, ReleaseSelector, RequestLifecycle,
    Scheduler, SchedulerConfig, SelectorConfig, TrackerConfig,
};
use outpost_core::models::{MediaKind, QualityProfile};
use outpost_core::repositories::{
    BlocklistRepository, DownloadRepository, HistoryRepository, PendingGrabRepository,
    ProfileRepository, RequestRepository, SettingsRepository, WantedRepository,
};
use outpost_core::{BlocklistService, EventBus, OutpostError, Result, StoragePause};
use outpost_decision::DecisionEngine;
use outpost_downloaders::{ClientDefinition, ClientRouter, DownloadClient};
use outpost_import::{Importer, Library};
use outpost_indexers::{IndexerClient, IndexerDefinition, IndexerGateway, IndexerKind};
use outpost_infrastructure::{
    create_pool, DatabasePool, HealthService, SqliteBlocklistRepository,
    SqliteDownloadRepository, SqliteHistoryRepository, SqlitePendingGrabRepository,
    SqliteProfileRepository, SqliteRequestRepository, SqliteSettingsRepository,
    SqliteWantedRepository, SysinfoDiskProbe,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

mod config;

use config::AppConfig;

/// Settings keys the binary reads at startup.
const KEY_DEFAULT_PROFILE: &str = "default_profile_id";
const KEY_INDEXERS: &str = "indexers";
const KEY_DOWNLOAD_CLIENTS: &str = "download_clients";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    info!("starting Outpost");
    let config = AppConfig::from_env()?;

    tokio::fs::create_dir_all(&config.data_path)
        .await
        .map_err(|e| OutpostError::FilesystemIO {
            path: config.data_path.display().to_string(),
            error: e.to_string(),
        })?;

    let pool = create_pool(&config.db_path).await?;
    info!("database migrated");

    let services = build_services(&config, pool.clone()).await?;
    info!("services wired");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut handles = Vec::new();
    handles.push(tokio::spawn(
        services.lifecycle.clone().run(shutdown_rx.clone()),
    ));
    handles.push(tokio::spawn(
        services.import_service.clone().run(shutdown_rx.clone()),
    ));
    handles.extend(services.scheduler.clone().start(shutdown_rx.clone()));
    handles.push(spawn_health_loop(
        services.health.clone(),
        shutdown_rx.clone(),
    ));

    info!(host = %config.host, port = config.port, "Outpost is running");

    shutdown_signal().await;
    info!("shutdown signal received, stopping loops");
    let _ = shutdown_tx.send(true);

    // Give loops a moment to finish their current work.
    let drain = async {
        for handle in handles {
            let _ = handle.await;
        }
    };
    if tokio::time::timeout(Duration::from_secs(30), drain)
        .await
        .is_err()
    {
        warn!("shutdown drain timed out");
    }

    info!("Outpost stopped");
    Ok(())
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,sqlx=warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Everything main spawns or keeps alive.
struct AppServices {
    lifecycle: Arc<RequestLifecycle>,
    import_service: Arc<ImportService>,
    scheduler: Arc<Scheduler>,
    health: Arc<HealthService>,
}

async fn build_services(config: &AppConfig, pool: DatabasePool) -> Result<AppServices> {
    // Repositories
    let wanted: Arc<dyn WantedRepository> = Arc::new(SqliteWantedRepository::new(pool.clone()));
    let profiles: Arc<dyn ProfileRepository> =
        Arc::new(SqliteProfileRepository::new(pool.clone()));
    let downloads: Arc<dyn DownloadRepository> =
        Arc::new(SqliteDownloadRepository::new(pool.clone()));
    let requests: Arc<dyn RequestRepository> =
        Arc::new(SqliteRequestRepository::new(pool.clone()));
    let blocklist_repo: Arc<dyn BlocklistRepository> =
        Arc::new(SqliteBlocklistRepository::new(pool.clone()));
    let history: Arc<dyn HistoryRepository> =
        Arc::new(SqliteHistoryRepository::new(pool.clone()));
    let pending: Arc<dyn PendingGrabRepository> =
        Arc::new(SqlitePendingGrabRepository::new(pool.clone()));
    let settings: Arc<dyn SettingsRepository> =
        Arc::new(SqliteSettingsRepository::new(pool.clone()));

    let default_profile_id = ensure_default_profile(&*profiles, &*settings).await?;

    // Libraries
    let (movies_root, tv_root) = config.default_library_roots();
    let libraries = vec![
        Library {
            name: "movies".to_string(),
            kind: MediaKind::Movie,
            root: movies_root,
        },
        Library {
            name: "tv".to_string(),
            kind: MediaKind::Show,
            root: tv_root,
        },
    ];
    for library in &libraries {
        tokio::fs::create_dir_all(&library.root)
            .await
            .map_err(|e| OutpostError::FilesystemIO {
                path: library.root.display().to_string(),
                error: e.to_string(),
            })?;
    }

    // Indexers: persisted definitions plus the Prowlarr instance from the
    // environment.
    let mut indexer_defs: Vec<IndexerDefinition> = match settings.get(KEY_INDEXERS).await? {
        Some(raw) => serde_json::from_str(&raw).map_err(|e| OutpostError::NotConfigured {
            what: KEY_INDEXERS.to_string(),
            message: e.to_string(),
        })?,
        None => Vec::new(),
    };
    if let (Some(url), Some(key)) = (&config.prowlarr_url, &config.prowlarr_api_key) {
        let next_id = indexer_defs.iter().map(|d| d.id).max().unwrap_or(0) + 1;
        let mut def = IndexerDefinition::new(next_id, "prowlarr", IndexerKind::Prowlarr, url);
        def.api_key = key.clone();
        indexer_defs.push(def);
    }
    let mut indexer_clients: Vec<Arc<dyn IndexerClient>> = Vec::new();
    for def in indexer_defs {
        match outpost_indexers::build_client(def) {
            Ok(client) => indexer_clients.push(client),
            Err(e) => warn!(error = %e, "skipping misconfigured indexer"),
        }
    }
    if indexer_clients.is_empty() {
        warn!("no indexers configured; searches will return nothing");
    }
    let gateway = Arc::new(IndexerGateway::new(indexer_clients.clone()));

    // Download clients from settings.
    let client_defs: Vec<ClientDefinition> = match settings.get(KEY_DOWNLOAD_CLIENTS).await? {
        Some(raw) => serde_json::from_str(&raw).map_err(|e| OutpostError::NotConfigured {
            what: KEY_DOWNLOAD_CLIENTS.to_string(),
            message: e.to_string(),
        })?,
        None => Vec::new(),
    };
    let mut download_clients: Vec<Arc<dyn DownloadClient>> = Vec::new();
    for def in client_defs {
        match outpost_downloaders::build_client(def) {
            Ok(client) => download_clients.push(client),
            Err(e) => warn!(error = %e, "skipping misconfigured download client"),
        }
    }
    if download_clients.is_empty() {
        warn!("no download clients configured; grabs will fail");
    }
    let router = Arc::new(ClientRouter::new(download_clients.clone()));

    // Shared plumbing
    let events = Arc::new(EventBus::new());
    let pause = Arc::new(StoragePause::new());
    let blocklist: Arc<BlocklistService<dyn BlocklistRepository>> =
        Arc::new(BlocklistService::new(blocklist_repo));
    let engine = Arc::new(DecisionEngine::new(profiles.list_formats().await?));

    // Services
    let tracker = Arc::new(DownloadTracker::new(
        downloads.clone(),
        blocklist.clone(),
        router.clone(),
        events.clone(),
        TrackerConfig::default(),
    ));

    let selector = Arc::new(ReleaseSelector::new(
        gateway.clone(),
        router.clone(),
        engine,
        wanted.clone(),
        profiles.clone(),
        downloads.clone(),
        pending,
        settings.clone(),
        blocklist,
        pause.clone(),
        events.clone(),
        SelectorConfig {
            release_delay: config.scheduler.release_delay,
        },
    ));

    let importer = Arc::new(Importer::new(
        settings.naming_settings().await?,
        settings.format_settings().await?,
        libraries.clone(),
    ));
    let import_service = Arc::new(ImportService::new(
        tracker.clone(),
        importer,
        wanted.clone(),
        profiles.clone(),
        history,
        events.clone(),
    ));

    let lifecycle = Arc::new(RequestLifecycle::new(
        requests,
        wanted.clone(),
        events.clone(),
        AutoApprovalRules::default(),
        default_profile_id,
    ));

    let disk = Arc::new(SysinfoDiskProbe::new());
    let scheduler = Arc::new(Scheduler::new(
        tracker,
        selector,
        gateway,
        wanted,
        libraries.clone(),
        disk.clone(),
        pause,
        events.clone(),
        SchedulerConfig {
            tracker_interval: config.scheduler.tracker,
            search_interval: config.scheduler.search,
            rss_interval: config.scheduler.rss,
            storage_interval: config.scheduler.storage,
            min_free_bytes: config.scheduler.min_free_bytes,
        },
    ));

    let health = Arc::new(HealthService::new(
        pool,
        download_clients,
        indexer_clients,
        libraries,
        disk,
        config.scheduler.min_free_bytes,
    ));

    Ok(AppServices {
        lifecycle,
        import_service,
        scheduler,
        health,
    })
}

/// Create the standard profile on first run and remember its id.
async fn ensure_default_profile(
    profiles: &dyn ProfileRepository,
    settings: &dyn SettingsRepository,
) -> Result<Uuid> {
    if let Some(raw) = settings.get(KEY_DEFAULT_PROFILE).await? {
        if let Ok(id) = raw.parse::<Uuid>() {
            if profiles.get_profile(id).await?.is_some() {
                return Ok(id);
            }
        }
    }

    let profile = QualityProfile::new("Standard");
    profiles.upsert_profile(&profile).await?;
    settings
        .set(KEY_DEFAULT_PROFILE, &profile.id.to_string())
        .await?;
    info!(profile = %profile.name, "created default quality profile");
    Ok(profile.id)
}

fn spawn_health_loop(
    health: Arc<HealthService>,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(15 * 60));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = health.check_all().await {
                        warn!(error = %e, "health check pass failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
