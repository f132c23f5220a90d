use std::sync::Arc;

use anyhow::Context as _;
use radar_client::{ClientConfig, EdgeFunctionsClient, RealtimeFeed, RefreshingSession};
use radar_core::ports::SessionProvider;
use radar_engine::{Collaborators, EngineConfig, RadarEngine};
use radar_events::EventBus;
use radar_worker::config::WorkerConfig;
use radar_worker::monitor;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let worker = WorkerConfig::from_env().context("invalid worker configuration")?;
    let client_config = ClientConfig::from_env().context("invalid client configuration")?;
    let engine_config = EngineConfig::from_env().context("invalid engine configuration")?;

    tracing::info!(project_id = %worker.project_id, "Radar worker starting");

    let pool = radar_db::create_pool(&worker.database_url)
        .await
        .context("failed to connect to the database")?;
    radar_db::health_check(&pool).await?;
    radar_db::run_migrations(&pool)
        .await
        .context("failed to run migrations")?;
    tracing::info!("Database ready");

    let http = reqwest::Client::builder()
        .timeout(client_config.http_timeout)
        .build()
        .context("failed to build HTTP client")?;

    let session: Arc<dyn SessionProvider> = Arc::new(RefreshingSession::new(
        http.clone(),
        &client_config.api_url,
        client_config.anon_key.clone(),
        client_config.refresh_token.clone(),
        worker.user_id,
    ));
    let collaborators = Collaborators {
        functions: Arc::new(EdgeFunctionsClient::with_client(
            http,
            client_config.api_url.clone(),
            client_config.anon_key.clone(),
        )),
        feed: Arc::new(RealtimeFeed::new(
            client_config.realtime_url.clone(),
            session.clone(),
            client_config.heartbeat_interval,
        )),
        store: Arc::new(radar_db::PgStore::new(pool)),
        session,
    };

    let bus = Arc::new(EventBus::default());
    let engine = RadarEngine::new(engine_config, worker.project_id, collaborators, bus);
    let mut events = engine.subscribe();

    let mut watching = engine.recover().await?.is_some();
    if !watching && worker.auto_scan {
        let plan = engine.compile(worker.force_analyze).await?;
        tracing::info!(queries = ?plan.queries, degraded = plan.degraded, "Strategy compiled");
        engine.dispatch(plan.queries).await?;
        watching = true;
    }

    if !watching {
        tracing::info!("No scan in progress and auto-scan disabled, exiting");
        return Ok(());
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, cancelling scan");
                engine.cancel().await;
                break;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    monitor::log_event(&event);
                    if monitor::ends_scan(&event) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event consumer lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    let snapshot = engine.snapshot();
    tracing::info!(
        status = ?snapshot.job.as_ref().map(|job| job.status),
        records = snapshot.records.len(),
        "Scan finished",
    );
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    engine.shutdown().await;
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "radar_worker=debug,radar_engine=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
