use std::sync::Arc;

use group_chat_service::broker::BrokerGateway;
use group_chat_service::services::{GroupService, MessageCipher, MessagePipeline};
use group_chat_service::state::AppState;
use group_chat_service::store::{PgGroupStore, PgMessageStore};
use group_chat_service::websocket::subscription::SubscriptionMap;
use group_chat_service::websocket::{pubsub, RoomRegistry};
use group_chat_service::{config, db, error, logging, routes};

#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    logging::init_tracing();
    let cfg = Arc::new(config::Config::from_env()?);

    let pool = db::init_pool(&cfg.database_url)
        .await
        .map_err(|e| error::AppError::StartServer(format!("db: {e}")))?;

    // Migrations are embedded and idempotent; a schema mismatch is fatal.
    db::run_migrations(&pool)
        .await
        .map_err(|e| error::AppError::StartServer(format!("database migrations failed: {e}")))?;

    let gateway = Arc::new(BrokerGateway::connect(&cfg.redis_url).await?);

    let registry = RoomRegistry::new();
    let (subscriptions, bind_rx) = SubscriptionMap::new();

    // Broker consumer: bridges fan-out and group-topic events into rooms.
    tokio::spawn(pubsub::start_consumer(
        gateway.client(),
        registry.clone(),
        subscriptions.clone(),
        bind_rx,
    ));

    let groups_store = Arc::new(PgGroupStore::new(pool.clone()));
    let messages_store = Arc::new(PgMessageStore::new(pool.clone()));
    let pipeline = Arc::new(MessagePipeline::new(
        groups_store.clone(),
        messages_store,
        MessageCipher::new(cfg.encryption_master_key),
        gateway.clone(),
    ));

    let state = AppState {
        config: cfg.clone(),
        groups: GroupService::new(groups_store),
        pipeline,
        registry,
        subscriptions,
    };

    let app = logging::add_tracing(routes::build_router(state));

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, "starting group-chat-service");

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| error::AppError::StartServer(format!("bind {bind_addr}: {e}")))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| error::AppError::StartServer(format!("serve: {e}")))?;

    Ok(())
}
