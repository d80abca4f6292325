//! OpenSASE Channels - Self-hosted multi-channel marketplace integration

use std::sync::Arc;

use anyhow::Result;
use opensase_channels::{
    adapters::ChannelHttp,
    api::{self, AppState},
    publisher::EventPublisher,
    store::{ChannelStore, InMemoryChannelStore, PgChannelStore},
    AppConfig, ChannelRegistry, ChannelService,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = AppConfig::from_env();

    let store: Arc<dyn ChannelStore> = match &config.database_url {
        Some(url) => {
            let db = PgPoolOptions::new().max_connections(10).connect(url).await?;
            sqlx::migrate!("./migrations").run(&db).await?;
            Arc::new(PgChannelStore::new(db))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, channel state is kept in memory only");
            Arc::new(InMemoryChannelStore::new())
        }
    };

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, channel events will not be published");
                None
            }
        },
        None => None,
    };

    let http = ChannelHttp::new(config.endpoints.clone(), config.timeouts)?;
    let registry = Arc::new(ChannelRegistry::new(http));
    let service = ChannelService::new(store, registry, EventPublisher::new(nats), config.naver_redirect_uri.clone());
    service.initialize_default_channels().await?;

    let app = api::router(AppState { service: Arc::new(service) })
        .layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive());

    tracing::info!("🚀 OpenSASE Channels listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}
