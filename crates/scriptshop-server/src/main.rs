//! # scriptshop-server
//!
//! Storefront backend for game-server scripts and assets.
//!
//! This binary provides:
//! - **Function endpoints** for payment sessions, gated download links,
//!   release broadcasts, download thank-yous and ad cleanup
//! - **Catalog and account REST API** (axum) backing the storefront UI
//! - **Bucket storage** for preview images (public) and archives (signed
//!   links only)
//! - **Admin management** of items, ads and manual payment settlement
//! - **Per-IP rate limiting** to protect against abuse

mod api;
mod auth;
mod blob_store;
mod config;
mod downloads;
mod error;
mod gate;
mod jobs;
mod notify;
mod payments;
mod rate_limit;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use scriptshop_store::Database;

use crate::api::AppState;
use crate::auth::IdentityProvider;
use crate::blob_store::BlobStore;
use crate::config::ServerConfig;
use crate::notify::Notifier;
use crate::rate_limit::RateLimiter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,scriptshop_server=debug,scriptshop_store=info")
        }))
        .init();

    info!("Starting scriptshop server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(
        http_addr = %config.http_addr,
        database = %config.database_path.display(),
        storage = %config.storage_path.display(),
        public_base_url = %config.public_base_url,
        admins = config.admin_emails.len(),
        payments_enabled = config.payment.has_credentials(),
        service_token = config.service_token.is_some(),
        "Loaded configuration"
    );

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    let db = Database::open_at(&config.database_path)?;
    let seeded = db.seed_categories()?;
    if seeded > 0 {
        info!(seeded, "Seeded catalog categories");
    }
    let db = Arc::new(Mutex::new(db));

    // Bucket store (creates bucket directories if missing)
    let blob_store = Arc::new(
        BlobStore::new(
            config.storage_path.clone(),
            &config.public_base_url,
            config.signing_key,
        )
        .await?,
    );

    let identity = Arc::new(IdentityProvider::from_config(&config).await?);
    let notifier = Arc::new(Notifier::new(config.notify.clone())?);
    let rate_limiter = RateLimiter::new(config.rate_limit_per_sec, config.rate_limit_burst);

    let app_state = AppState {
        db: db.clone(),
        blob_store,
        identity,
        notifier,
        rate_limiter: rate_limiter.clone(),
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------
    jobs::spawn_rate_limit_purge(rate_limiter);
    jobs::spawn_ad_cleanup(db, config.ad_cleanup_interval_secs);

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
