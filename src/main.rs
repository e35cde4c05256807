//! Storefront Orders - cart, checkout and order companion service

use anyhow::{Context, Result};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront_orders::api::HttpStorefrontApi;
use storefront_orders::config::Config;
use storefront_orders::services::connect_nats;
use storefront_orders::storage::{Credentials, SqliteStorage};
use storefront_orders::web::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();

    let storage = Arc::new(SqliteStorage::connect(&config.storage_url).await.context("opening session storage")?);
    let api = Arc::new(HttpStorefrontApi::new(&config.api_url, Credentials::new(storage.clone()), config.http_timeout)?);
    let state = AppState::new(api, storage.clone());

    if let Err(e) = state.cart.refresh().await {
        tracing::warn!(error = %e, "initial cart load failed");
    }

    if let Some(url) = config.nats_url.as_deref() {
        match connect_nats(url, &config.notification_subject).await {
            Ok(payloads) => {
                let bridge = state.bridge.clone();
                tokio::spawn(async move { bridge.run(payloads).await });
            }
            Err(e) => tracing::warn!(error = %e, "notification bridge disabled"),
        }
    }

    let app = web::router(state).layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive());

    tracing::info!("🚀 Storefront Orders listening on {} (api {})", config.bind_addr(), config.api_url);
    axum::serve(tokio::net::TcpListener::bind(config.bind_addr()).await?, app).await?;
    storage.close().await;
    Ok(())
}
