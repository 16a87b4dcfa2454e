use anyhow::Context;
use busline_api::{app, state::AppState, worker};
use busline_core::{Clock, EventSink, NotificationDispatcher, Store, SystemClock};
use busline_store::{app_config::Config, dispatcher_from_config, DbClient, EventProducer, KafkaEventSink, MemoryStore, RedisClient};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "busline_api=debug,busline_order=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Busline API on port {}", config.server.port);

    // Storage
    let store: Arc<dyn Store> = if config.database.use_memory {
        tracing::warn!("Using in-memory store, data will not survive a restart");
        Arc::new(MemoryStore::new())
    } else {
        let db = DbClient::new(&config.database.url, config.database.max_connections)
            .await
            .context("Failed to connect to Postgres")?;
        db.migrate().await.context("Failed to run migrations")?;
        Arc::new(db.booking_repository())
    };

    // Redis Connection (rate limiting only)
    let redis = match &config.redis.url {
        Some(url) => Some(Arc::new(RedisClient::new(url).await.context("Failed to connect to Redis")?)),
        None => None,
    };

    // Kafka Connection
    let mut sinks: Vec<Arc<dyn EventSink>> = Vec::new();
    if let Some(brokers) = &config.kafka.brokers {
        let producer = EventProducer::new(brokers).context("Failed to create Kafka producer")?;
        sinks.push(Arc::new(KafkaEventSink::new(producer, config.kafka.topic.clone())));
        tracing::info!(topic = %config.kafka.topic, "Publishing booking events to Kafka");
    }

    let dispatcher: Arc<dyn NotificationDispatcher> =
        Arc::from(dispatcher_from_config(&config.notifications).context("Failed to build notification dispatcher")?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let (app_state, workers) = AppState::assemble(&config, store, clock, dispatcher, sinks, redis)?;
    let _workers = worker::spawn(
        workers,
        app_state.sweeper.clone(),
        Duration::from_secs(config.booking_rules.sweep_interval_seconds),
    );

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
