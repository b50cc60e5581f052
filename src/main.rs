use {
    donation_sync::{
        AppState,
        adapters::notifier::LogNotifier,
        config::{AppConfig, Storage},
        domain::{donation::Campaign, job::RetryPolicy},
        infra::{Stores, memory::MemoryStore, postgres::PgStore},
        services::{
            donations::DonationService,
            reconciliation::Reconciler,
            worker::{WorkerConfig, run_reaper, run_worker},
        },
    },
    sqlx::postgres::PgPoolOptions,
    std::{sync::Arc, time::Duration},
    tokio::{signal, sync::watch},
};

const INTENT_TIMEOUT: Duration = Duration::from_secs(10);
const MIN_STALE_JOB_AFTER: Duration = Duration::from_secs(120);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    dotenvy::dotenv().ok();
    let config = AppConfig::from_env().expect("invalid configuration");

    let stores = match &config.storage {
        Storage::Postgres { database_url } => {
            let pool = PgPoolOptions::new()
                .max_connections(20)
                .acquire_timeout(Duration::from_secs(3))
                .connect(database_url)
                .await
                .expect("failed to connect to database");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .expect("failed to run migrations");
            Stores::from_store(Arc::new(PgStore::new(pool)))
        }
        Storage::Memory => {
            let store = MemoryStore::new();
            let campaign = Campaign {
                id: uuid::Uuid::now_v7(),
                title: "Local campaign".into(),
                accepting_donations: true,
            };
            tracing::warn!(campaign_id = %campaign.id, "in-memory storage, state is lost on restart");
            store.insert_campaign(campaign).await;
            Stores::from_store(Arc::new(store))
        }
    };

    let gateways = Arc::new(config.gateway_registry());
    for gateway in gateways.descriptors() {
        tracing::info!(
            gateway = %gateway.name,
            priority = gateway.priority,
            test_mode = gateway.test_mode,
            "gateway enabled"
        );
    }

    let reconciler = Arc::new(Reconciler::new(
        stores.donations.clone(),
        gateways.clone(),
        Arc::new(LogNotifier),
        config.large_donation_threshold,
    ));

    let worker_config = WorkerConfig {
        batch_size: config.worker_batch_size,
        job_timeout: config.job_timeout,
        poll_interval: Duration::from_secs(1),
        retry: RetryPolicy::default(),
    };
    let stale_after = worker_config.stale_after(MIN_STALE_JOB_AFTER);
    tracing::info!(stale_after_secs = stale_after.as_secs(), "stale job cutoff");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = tokio::spawn(run_worker(
        stores.jobs.clone(),
        reconciler,
        worker_config,
        shutdown_rx.clone(),
    ));
    let reaper = tokio::spawn(run_reaper(stores.jobs.clone(), stale_after, shutdown_rx));

    let state = AppState {
        gateways: gateways.clone(),
        jobs: stores.jobs.clone(),
        attempts: stores.attempts.clone(),
        donations: Arc::new(DonationService::new(
            stores.donations.clone(),
            stores.attempts.clone(),
            gateways,
            INTENT_TIMEOUT,
        )),
    };
    let app = donation_sync::app(state, config.request_timeout);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await.unwrap();
    tracing::info!("listening on {}", config.bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    // HTTP is drained; let the background tasks finish their current batch.
    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(worker, reaper);
    tracing::info!("shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl+c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
