//! OpenSASE Orders - order engine service

use std::sync::Arc;

use anyhow::Result;
use opensase_orders::api::{self, AppState};
use opensase_orders::config::{Config, LogFormat};
use opensase_orders::notify::{LogNotifier, NatsNotifier, Notifier};
use opensase_orders::payment::JsonCallbackGateway;
use opensase_orders::store::{MemoryStore, PgStore, Store};
use opensase_orders::OrderServices;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer()).init(),
    }

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let pg = PgStore::connect(url, config.db_max_connections).await?;
            pg.migrate().await?;
            Arc::new(pg)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let notifier: Arc<dyn Notifier> = match &config.nats_url {
        Some(url) => match NatsNotifier::connect(url).await {
            Ok(nats) => Arc::new(nats),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, notifications will only be logged");
                Arc::new(LogNotifier)
            }
        },
        None => Arc::new(LogNotifier),
    };

    let services = OrderServices::new(store, notifier, config.engine.clone());
    let state = AppState { services, gateway: Arc::new(JsonCallbackGateway) };
    let app = api::router(state, config.is_development());

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("🚀 OpenSASE Orders listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(&addr).await?, app).await?;
    Ok(())
}
