//! HTTP surface: the serverless-style function endpoints, the catalog and
//! account routes used by the storefront UI, admin management, and the
//! bucket object routes.

mod account;
mod admin;
mod catalog;
mod engagement;
mod functions;
mod storage;

#[cfg(test)]
pub(crate) mod test_support;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderMap, HeaderName, Method},
    middleware, Router,
};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use scriptshop_shared::Identity;
use scriptshop_store::Database;

use crate::auth::{authenticate, bearer_token, IdentityProvider};
use crate::blob_store::BlobStore;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::notify::Notifier;
use crate::rate_limit::{rate_limit_middleware, RateLimiter};

/// Multipart framing on top of the file payload.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub blob_store: Arc<BlobStore>,
    pub identity: Arc<IdentityProvider>,
    pub notifier: Arc<Notifier>,
    pub rate_limiter: RateLimiter,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Authenticate the caller and mirror them into `profiles` on first
    /// sight. A failed mirror does not fail the request.
    pub async fn require_user(&self, headers: &HeaderMap) -> Result<Identity, ServerError> {
        let identity = authenticate(&self.identity, headers).await?;
        let mirrored = {
            let db = self.db.lock().await;
            db.ensure_profile(&identity)
        };
        if let Err(e) = mirrored {
            warn!(user = %identity.id, error = %e, "Failed to mirror profile");
        }
        Ok(identity)
    }

    /// Like [`require_user`](Self::require_user), but a request without a
    /// token is anonymous rather than rejected.
    pub async fn optional_user(&self, headers: &HeaderMap) -> Result<Option<Identity>, ServerError> {
        if bearer_token(headers).is_none() {
            return Ok(None);
        }
        self.require_user(headers).await.map(Some)
    }

    pub async fn require_admin(&self, headers: &HeaderMap) -> Result<Identity, ServerError> {
        let identity = self.require_user(headers).await?;
        if !self.config.is_admin_email(identity.email.as_deref()) {
            warn!(user = %identity.id, "Non-administrator attempted an admin action");
            return Err(ServerError::Forbidden(
                "Administrator access required".into(),
            ));
        }
        Ok(identity)
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
        ]);

    let body_limit = state.config.max_upload_size.saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .merge(functions::routes())
        .merge(catalog::routes())
        .merge(engagement::routes())
        .merge(account::routes())
        .merge(admin::routes())
        .merge(storage::routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until the listener fails. Connection info is kept so the rate
/// limiter can fall back to the peer address.
pub async fn serve(state: AppState) -> std::io::Result<()> {
    let addr = state.config.http_addr;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP API listening");
    axum::serve(
        listener,
        build_router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}
