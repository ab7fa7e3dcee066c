//! The signed-in user's own profile and history.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, warn};

use scriptshop_shared::constants::RECENT_DOWNLOADS_LIMIT;
use scriptshop_shared::protocol::{DeliveryResult, ProfileUpdateRequest};
use scriptshop_store::{DownloadEntry, FavoriteEntry, Profile, ProfileChanges};

use super::AppState;
use crate::error::ServerError;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/me/profile", get(get_profile).patch(update_profile))
        .route("/api/me/profile/webhook/test", post(test_webhook))
        .route("/api/me/downloads", get(recent_downloads))
        .route("/api/me/favorites", get(favorites))
}

async fn get_profile(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<Profile>, ServerError> {
    let identity = state.require_user(&headers).await?;
    let db = state.db.lock().await;
    Ok(Json(db.get_profile(identity.id)?))
}

async fn update_profile(
    headers: HeaderMap,
    State(state): State<AppState>,
    payload: Result<Json<ProfileUpdateRequest>, JsonRejection>,
) -> Result<Json<Profile>, ServerError> {
    let identity = state.require_user(&headers).await?;
    let Json(req) = payload?;

    if let Some(url) = req.discord_webhook_url.as_deref().filter(|u| !u.trim().is_empty()) {
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(ServerError::BadRequest("Webhook URL must be http(s)".into()));
        }
    }

    let changes = ProfileChanges {
        username: req.username,
        discord_webhook_url: req
            .discord_webhook_url
            .map(|u| Some(u.trim().to_string()).filter(|u| !u.is_empty())),
    };
    let profile = {
        let db = state.db.lock().await;
        db.update_profile(identity.id, &changes)?
    };
    info!(user = %identity.id, webhook = profile.discord_webhook_url.is_some(), "Profile updated");
    Ok(Json(profile))
}

/// Send a test embed to the caller's saved webhook and report how it went.
async fn test_webhook(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<DeliveryResult>, ServerError> {
    let identity = state.require_user(&headers).await?;
    let webhook = {
        let db = state.db.lock().await;
        db.get_profile(identity.id)?.discord_webhook_url
    }
    .ok_or_else(|| ServerError::BadRequest("No webhook URL saved".into()))?;

    let result = match state.notifier.send_webhook_test(&webhook).await {
        Ok(()) => DeliveryResult {
            success: true,
            webhook,
            error: None,
        },
        Err(e) => {
            warn!(user = %identity.id, error = %e, "Webhook test failed");
            DeliveryResult {
                success: false,
                webhook,
                error: Some(format!("Webhook test failed: {e}")),
            }
        }
    };
    Ok(Json(result))
}

async fn recent_downloads(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<Vec<DownloadEntry>>, ServerError> {
    let identity = state.require_user(&headers).await?;
    let db = state.db.lock().await;
    Ok(Json(db.recent_downloads(identity.id, RECENT_DOWNLOADS_LIMIT)?))
}

async fn favorites(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<Vec<FavoriteEntry>>, ServerError> {
    let identity = state.require_user(&headers).await?;
    let db = state.db.lock().await;
    Ok(Json(db.list_favorites(identity.id)?))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use super::super::test_support::*;

    #[tokio::test]
    async fn first_request_creates_profile() {
        let (state, _dir) = test_state().await;
        let (status, body) = send(&state, "GET", "/api/me/profile", Some(BUYER_TOKEN), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], "buyer");
        assert!(body["discord_webhook_url"].is_null());
    }

    #[tokio::test]
    async fn webhook_can_be_set_and_cleared() {
        let (state, _dir) = test_state().await;
        let (status, body) = send(
            &state,
            "PATCH",
            "/api/me/profile",
            Some(BUYER_TOKEN),
            Some(json!({ "discord_webhook_url": "https://hooks.example/abc" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["discord_webhook_url"], "https://hooks.example/abc");

        let (_, body) = send(
            &state,
            "PATCH",
            "/api/me/profile",
            Some(BUYER_TOKEN),
            Some(json!({ "discord_webhook_url": "" })),
        )
        .await;
        assert!(body["discord_webhook_url"].is_null());

        let (status, _) = send(
            &state,
            "PATCH",
            "/api/me/profile",
            Some(BUYER_TOKEN),
            Some(json!({ "discord_webhook_url": "ftp://nope" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn webhook_test_needs_a_saved_webhook() {
        let (state, _dir) = test_state().await;
        let (status, body) = send(
            &state,
            "POST",
            "/api/me/profile/webhook/test",
            Some(BUYER_TOKEN),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No webhook URL saved");
    }

    #[tokio::test]
    async fn webhook_test_reports_delivery() {
        let sink = spawn_webhook_sink().await;
        let (state, _dir) = test_state().await;

        for (path, delivered) in [("ok/me", true), ("fail/me", false)] {
            send(
                &state,
                "PATCH",
                "/api/me/profile",
                Some(BUYER_TOKEN),
                Some(json!({ "discord_webhook_url": format!("{sink}/{path}") })),
            )
            .await;
            let (status, body) = send(
                &state,
                "POST",
                "/api/me/profile/webhook/test",
                Some(BUYER_TOKEN),
                None,
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["success"], delivered);
            assert_eq!(body["webhook"], format!("{sink}/{path}"));
            assert_eq!(body["error"].is_null(), delivered);
        }

        let seen = sink.deliveries();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].path, "/ok/me");
        assert_eq!(seen[0].body["embeds"][0]["title"], "🧪 Test Notification");
    }

    #[tokio::test]
    async fn favorites_list_follows_toggles() {
        let (state, _dir) = test_state().await;
        let item = upload_item(&state, "Hangar", 0.0).await;
        send(
            &state,
            "POST",
            &format!("/api/items/{}/favorite", item.id),
            Some(BUYER_TOKEN),
            None,
        )
        .await;

        let (_, body) = send(&state, "GET", "/api/me/favorites", Some(BUYER_TOKEN), None).await;
        let entries = body.as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["item"]["name"], "Hangar");

        let (_, body) = send(&state, "GET", "/api/me/downloads", Some(BUYER_TOKEN), None).await;
        assert!(body.as_array().unwrap().is_empty());
    }
}
