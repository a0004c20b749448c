//! OpenSASE Orders - order lifecycle and stock reservation service

use anyhow::Result;
use opensase_orders::api::{self, AppState};
use opensase_orders::config::Config;
use opensase_orders::notify::{EmailNotifier, HttpMailer, LogMailer, LogNotifier, NatsNotifier, NotificationDispatcher, RealtimeNotifier};
use opensase_orders::store::{CatalogStore, MemoryStore, OrderStore, PgStore, UserDirectory};
use opensase_orders::OrderService;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

struct Stores { catalog: Arc<dyn CatalogStore>, orders: Arc<dyn OrderStore>, users: Arc<dyn UserDirectory> }

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = Config::from_env()?;

    let stores = match &config.database_url {
        Some(url) => {
            let db = PgPoolOptions::new().max_connections(config.database_max_connections).connect(url).await?;
            sqlx::migrate!("./migrations").run(&db).await?;
            let store = PgStore::new(db);
            Stores { catalog: Arc::new(store.clone()), orders: Arc::new(store.clone()), users: Arc::new(store) }
        }
        None => {
            tracing::warn!("DATABASE_URL not set, orders are kept in memory and lost on restart");
            let store = MemoryStore::new();
            Stores { catalog: Arc::new(store.clone()), orders: Arc::new(store.clone()), users: Arc::new(store) }
        }
    };

    let realtime: Arc<dyn RealtimeNotifier> = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Arc::new(NatsNotifier::new(client, config.nats_subject_prefix.clone())),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, real-time events will only be logged");
                Arc::new(LogNotifier)
            }
        },
        None => Arc::new(LogNotifier),
    };
    let email: Arc<dyn EmailNotifier> = match &config.mail_relay_url {
        Some(url) => Arc::new(HttpMailer::new(url.clone(), config.mail_relay_token.clone(), config.mail_from.clone())),
        None => Arc::new(LogMailer),
    };

    let notifications = NotificationDispatcher::new(realtime, email, stores.users);
    let orders = OrderService::new(stores.catalog, stores.orders, notifications);
    let app = api::router(AppState { orders: Arc::new(orders) });

    tracing::info!("🚀 OpenSASE Orders listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}
