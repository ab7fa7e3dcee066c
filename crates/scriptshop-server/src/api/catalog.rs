use std::str::FromStr;

use axum::{
    extract::{rejection::PathRejection, Path, Query, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use scriptshop_shared::constants::FEATURED_ITEM_COUNT;
use scriptshop_shared::protocol::{AccessResponse, PaymentStatusResponse};
use scriptshop_shared::{CategoryName, SortOrder};
use scriptshop_store::{Ad, Category, Item, ItemQuery};

use super::AppState;
use crate::error::{missing_item, ServerError};
use crate::{gate, payments};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/categories", get(list_categories))
        .route("/api/items", get(list_items))
        .route("/api/items/featured", get(featured_items))
        .route("/api/items/:id", get(get_item))
        .route("/api/items/:id/access", get(item_access))
        .route("/api/items/:id/payment", get(payment_status))
        .route("/api/ads", get(active_ads))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Raw query string values; parsed by hand so a bad value is a JSON 400.
#[derive(Debug, Default, Deserialize)]
struct ItemListParams {
    category: Option<String>,
    search: Option<String>,
    sort: Option<String>,
    limit: Option<u32>,
}

impl ItemListParams {
    fn into_query(self) -> Result<ItemQuery, ServerError> {
        let category = match self.category.as_deref().filter(|c| !c.is_empty() && *c != "all") {
            Some(raw) => Some(
                CategoryName::from_str(raw).map_err(|e| ServerError::BadRequest(e.to_string()))?,
            ),
            None => None,
        };
        let sort = match self.sort.as_deref().filter(|s| !s.is_empty()) {
            Some(raw) => {
                SortOrder::from_str(raw).map_err(|e| ServerError::BadRequest(e.to_string()))?
            }
            None => SortOrder::default(),
        };
        Ok(ItemQuery {
            category,
            search: self.search.filter(|s| !s.trim().is_empty()),
            sort,
            limit: self.limit,
        })
    }
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>, ServerError> {
    let db = state.db.lock().await;
    Ok(Json(db.list_categories()?))
}

async fn list_items(
    State(state): State<AppState>,
    Query(params): Query<ItemListParams>,
) -> Result<Json<Vec<Item>>, ServerError> {
    let query = params.into_query()?;
    let db = state.db.lock().await;
    Ok(Json(db.list_items(&query)?))
}

async fn featured_items(State(state): State<AppState>) -> Result<Json<Vec<Item>>, ServerError> {
    let db = state.db.lock().await;
    Ok(Json(db.featured_items(FEATURED_ITEM_COUNT)?))
}

async fn get_item(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Item>, ServerError> {
    let Path(id) = id?;
    let db = state.db.lock().await;
    Ok(Json(db.get_item(id).map_err(missing_item)?))
}

/// Purchase gate for the item page. Anonymous callers may still see that
/// a free item is downloadable.
async fn item_access(
    headers: HeaderMap,
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<AccessResponse>, ServerError> {
    let Path(id) = id?;
    let user = state.optional_user(&headers).await?;
    let db = state.db.lock().await;
    let item = db.get_item(id).map_err(missing_item)?;
    let access = gate::check(&db, user.map(|u| u.id), &item)
        .map_err(|e| ServerError::PurchaseCheck(e.to_string()))?;
    Ok(Json(AccessResponse {
        item_id: item.id,
        allowed: access.is_allowed(),
    }))
}

async fn payment_status(
    headers: HeaderMap,
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<PaymentStatusResponse>, ServerError> {
    let Path(id) = id?;
    let identity = state.require_user(&headers).await?;
    let db = state.db.lock().await;
    db.get_item(id).map_err(missing_item)?;
    Ok(Json(payments::payment_status(&db, identity.id, id)?))
}

async fn active_ads(State(state): State<AppState>) -> Result<Json<Vec<Ad>>, ServerError> {
    let db = state.db.lock().await;
    Ok(Json(db.active_ads(Utc::now())?))
}
