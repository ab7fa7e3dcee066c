//! `/functions/v1/*`: stateless JSON endpoints called by the UI, the
//! admin panel and the scheduler.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use tracing::{info, warn};

use scriptshop_shared::protocol::{
    CleanupResponse, CreatePaymentSessionRequest, DownloadThanksRequest, DownloadUrlRequest,
    DownloadUrlResponse, NotifyNewReleaseRequest, NotifyNewReleaseResponse,
    PaymentSessionResponse, SuccessResponse,
};
use scriptshop_shared::AuthProvider;

use super::AppState;
use crate::auth::verify_service_token;
use crate::error::ServerError;
use crate::{downloads, jobs, payments};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/functions/v1/create-payment-session",
            post(create_payment_session),
        )
        .route("/functions/v1/get-download-url", post(get_download_url))
        .route("/functions/v1/notify-new-release", post(notify_new_release))
        .route("/functions/v1/send-download-thanks", post(send_download_thanks))
        .route("/functions/v1/cleanup-expired-ads", post(cleanup_expired_ads))
}

async fn create_payment_session(
    headers: HeaderMap,
    State(state): State<AppState>,
    payload: Result<Json<CreatePaymentSessionRequest>, JsonRejection>,
) -> Result<Json<PaymentSessionResponse>, ServerError> {
    let identity = state.require_user(&headers).await?;
    let Json(req) = payload?;

    let db = state.db.lock().await;
    let session = payments::create_session(&db, &state.config.payment, &identity, &req)?;
    Ok(Json(session))
}

async fn get_download_url(
    headers: HeaderMap,
    State(state): State<AppState>,
    payload: Result<Json<DownloadUrlRequest>, JsonRejection>,
) -> Result<Json<DownloadUrlResponse>, ServerError> {
    let identity = state.require_user(&headers).await?;
    let Json(req) = payload?;
    let response = downloads::authorize(&state, &identity, &req).await?;
    Ok(Json(response))
}

async fn notify_new_release(
    headers: HeaderMap,
    State(state): State<AppState>,
    payload: Result<Json<NotifyNewReleaseRequest>, JsonRejection>,
) -> Result<Json<NotifyNewReleaseResponse>, ServerError> {
    state.require_admin(&headers).await?;
    let Json(req) = payload?;
    let item_name = req
        .item_name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| ServerError::BadRequest("Missing item_name".into()))?;

    let webhooks = {
        let db = state.db.lock().await;
        db.webhook_urls()?
    };
    Ok(Json(
        state
            .notifier
            .broadcast_new_release(&item_name, &webhooks)
            .await,
    ))
}

/// Internal trigger for the thank-you message. Delivery failures are logged
/// and the call still succeeds.
async fn send_download_thanks(
    headers: HeaderMap,
    State(state): State<AppState>,
    payload: Result<Json<DownloadThanksRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>, ServerError> {
    verify_service_token(&headers, &state.config, true)?;
    let Json(req) = payload?;
    let (Some(user_id), Some(item_name)) = (req.user_id, req.item_name.as_deref()) else {
        return Err(ServerError::BadRequest("Missing required fields".into()));
    };

    let mut identity = match state.identity.lookup_user(user_id).await {
        Ok(Some(identity)) => identity,
        Ok(None) => return Err(ServerError::NotFound("User not found".into())),
        Err(e) => {
            warn!(user = %user_id, error = %e, "User lookup failed");
            return Err(ServerError::ServiceUnavailable(
                "Identity service unavailable".into(),
            ));
        }
    };
    if req.auth_provider == Some(AuthProvider::Discord) {
        identity.provider = AuthProvider::Discord;
    }

    match state
        .notifier
        .send_download_thanks(&identity, item_name, req.item_image_url.as_deref())
        .await
    {
        Ok(channel) => info!(user = %user_id, ?channel, "Thank-you sent"),
        Err(e) => warn!(user = %user_id, error = %e, "Thank-you not delivered"),
    }

    Ok(Json(SuccessResponse {
        success: true,
        message: None,
    }))
}

async fn cleanup_expired_ads(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<CleanupResponse>, ServerError> {
    verify_service_token(&headers, &state.config, false)?;
    let removed = {
        let db = state.db.lock().await;
        jobs::cleanup_expired_ads(&db)?
    };
    Ok(Json(CleanupResponse {
        success: true,
        message: format!("Removed {removed} expired ads"),
        removed,
    }))
}
