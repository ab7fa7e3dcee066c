//! Favorites and ratings on a single item.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use tracing::debug;
use uuid::Uuid;

use scriptshop_shared::protocol::{FavoriteResponse, RatingRequest, RatingSummary};

use super::AppState;
use crate::error::{missing_item, ServerError};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/items/:id/favorite",
            get(favorite_state).post(toggle_favorite),
        )
        .route("/api/items/:id/rating", get(rating_summary).put(submit_rating))
}

async fn favorite_state(
    headers: HeaderMap,
    State(state): State<AppState>,
    item_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<FavoriteResponse>, ServerError> {
    let Path(item_id) = item_id?;
    let identity = state.require_user(&headers).await?;
    let db = state.db.lock().await;
    Ok(Json(FavoriteResponse {
        item_id,
        favorite: db.is_favorite(identity.id, item_id)?,
    }))
}

async fn toggle_favorite(
    headers: HeaderMap,
    State(state): State<AppState>,
    item_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<FavoriteResponse>, ServerError> {
    let Path(item_id) = item_id?;
    let identity = state.require_user(&headers).await?;
    let favorite = {
        let db = state.db.lock().await;
        db.toggle_favorite(identity.id, item_id).map_err(missing_item)?
    };
    debug!(user = %identity.id, item = %item_id, favorite, "Favorite toggled");
    Ok(Json(FavoriteResponse { item_id, favorite }))
}

/// Aggregate for the item, plus the caller's own score when signed in.
async fn rating_summary(
    headers: HeaderMap,
    State(state): State<AppState>,
    item_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<RatingSummary>, ServerError> {
    let Path(item_id) = item_id?;
    let user = state.optional_user(&headers).await?;
    let db = state.db.lock().await;
    db.get_item(item_id).map_err(missing_item)?;
    let stats = db.rating_stats(item_id)?;
    let user_rating = match user {
        Some(user) => db.user_rating(user.id, item_id)?.map(|r| r.rating),
        None => None,
    };
    Ok(Json(RatingSummary {
        item_id,
        average: stats.average,
        count: stats.count,
        user_rating,
    }))
}

async fn submit_rating(
    headers: HeaderMap,
    State(state): State<AppState>,
    item_id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<RatingRequest>, JsonRejection>,
) -> Result<Json<RatingSummary>, ServerError> {
    let Path(item_id) = item_id?;
    let identity = state.require_user(&headers).await?;
    let Json(req) = payload?;
    let rating = req
        .rating
        .ok_or_else(|| ServerError::BadRequest("Missing rating".into()))?;

    let stats = {
        let db = state.db.lock().await;
        db.upsert_rating(identity.id, item_id, rating)
            .map_err(missing_item)?
    };
    Ok(Json(RatingSummary {
        item_id,
        average: stats.average,
        count: stats.count,
        user_rating: Some(rating),
    }))
}
