use std::sync::Arc;
use std::net::SocketAddr;
use anyhow::Context;
use carpool_api::{app, state::{AppState, Backends, Settings}};
use carpool_core::TripCache;
use carpool_store::{
    memory::MemoryTripCache, DbClient, RedisClient, RedisTripCache, StoreMatchRepository,
    StoreNotificationRepository, StoreTripRepository, StoreUserDirectory,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "carpool_api=debug,carpool_match=debug,carpool_trip=debug,carpool_hub=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = carpool_store::app_config::Config::load().context("Failed to load config")?;
    tracing::info!("Starting Carpool API on port {}", config.server.port);

    // Postgres Connection
    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    // Redis Connection; the cache is advisory so an outage only costs latency
    let cache: Arc<dyn TripCache> = if !config.cache.enabled {
        tracing::info!("Trip cache disabled, using in-process cache");
        Arc::new(MemoryTripCache::new())
    } else {
        match connect_redis(&config.redis.url).await {
            Ok(redis) => Arc::new(RedisTripCache::new(redis)),
            Err(e) => {
                tracing::warn!("Redis unavailable ({}), using in-process cache", e);
                Arc::new(MemoryTripCache::new())
            }
        }
    };

    let app_state = AppState::assemble(
        Backends {
            trips: Arc::new(StoreTripRepository::new(db.pool.clone())),
            matches: Arc::new(StoreMatchRepository::new(db.pool.clone())),
            notifications: Arc::new(StoreNotificationRepository::new(db.pool.clone())),
            users: Arc::new(StoreUserDirectory::new(db.pool.clone())),
            cache,
        },
        Settings::from_config(&config),
    );

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>()
    ).await?;
    Ok(())
}

async fn connect_redis(url: &str) -> anyhow::Result<RedisClient> {
    let redis = RedisClient::new(url).await?;
    redis.ping().await?;
    Ok(redis)
}
