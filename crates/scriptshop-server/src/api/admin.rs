//! Administrator management: publishing items, ads and manual payment
//! settlement. Every handler starts with `require_admin`.

use axum::{
    extract::{
        multipart::MultipartError,
        rejection::{JsonRejection, PathRejection},
        Multipart, Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    routing::{delete, get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use scriptshop_shared::constants::{ARCHIVE_EXTENSION, FILE_BUCKET, PREVIEW_BUCKET};
use scriptshop_shared::protocol::SuccessResponse;
use scriptshop_shared::PaymentStatus;
use scriptshop_store::{Ad, Item, NewAd, NewItem, Payment, StoreError};

use super::AppState;
use crate::blob_store::ObjectRef;
use crate::error::{missing_item, ServerError};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/items", post(upload_item))
        .route("/admin/items/:id", delete(delete_item))
        .route("/admin/ads", get(list_ads).post(create_ad))
        .route("/admin/ads/:id", patch(set_ad_active).delete(delete_ad))
        .route("/admin/payments", get(list_payments))
        .route("/admin/payments/:id/status", post(set_payment_status))
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

struct UploadedFile {
    file_name: Option<String>,
    data: bytes::Bytes,
}

#[derive(Default)]
struct ItemForm {
    name: Option<String>,
    description: Option<String>,
    price: Option<String>,
    category_id: Option<String>,
    image: Option<UploadedFile>,
    file: Option<UploadedFile>,
}

fn multipart_error(e: MultipartError, max: usize) -> ServerError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServerError::PayloadTooLarge { max }
    } else {
        ServerError::BadRequest(format!("Multipart error: {}", e.body_text()))
    }
}

async fn read_item_form(multipart: &mut Multipart, max: usize) -> Result<ItemForm, ServerError> {
    let mut form = ItemForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "image" | "file" => {
                let file_name = field.file_name().map(str::to_string);
                let data = field.bytes().await.map_err(|e| multipart_error(e, max))?;
                if data.len() > max {
                    return Err(ServerError::PayloadTooLarge { max });
                }
                if data.is_empty() {
                    continue;
                }
                let upload = Some(UploadedFile { file_name, data });
                if name == "image" {
                    form.image = upload;
                } else {
                    form.file = upload;
                }
            }
            "name" | "description" | "price" | "category_id" => {
                let text = field.text().await.map_err(|e| multipart_error(e, max))?;
                let slot = match name.as_str() {
                    "name" => &mut form.name,
                    "description" => &mut form.description,
                    "price" => &mut form.price,
                    _ => &mut form.category_id,
                };
                *slot = Some(text);
            }
            other => warn!(field = other, "Ignoring unknown upload field"),
        }
    }
    Ok(form)
}

/// Lowercased extension of an uploaded image, `png` when absent or odd.
fn image_extension(file_name: Option<&str>) -> String {
    file_name
        .and_then(|n| n.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "png".to_string())
}

async fn upload_item(
    headers: HeaderMap,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Item>), ServerError> {
    let admin = state.require_admin(&headers).await?;
    let form = read_item_form(&mut multipart, state.config.max_upload_size).await?;

    let name = form
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ServerError::BadRequest("Missing item name".into()))?;
    let price = match form.price.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        Some(raw) => raw
            .parse::<f64>()
            .map_err(|_| ServerError::BadRequest(format!("Invalid price: {raw}")))?,
        None => 0.0,
    };
    let file = form
        .file
        .ok_or_else(|| ServerError::BadRequest("Missing file".into()))?;

    let category_id = match form.category_id.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(raw) => {
            let id = Uuid::parse_str(raw)
                .map_err(|_| ServerError::BadRequest("Unknown category".into()))?;
            let db = state.db.lock().await;
            match db.get_category(id) {
                Ok(category) => Some(category.id),
                Err(StoreError::NotFound) => {
                    return Err(ServerError::BadRequest("Unknown category".into()))
                }
                Err(e) => return Err(e.into()),
            }
        }
        None => None,
    };

    let mut stored = Vec::new();
    let image_url = match &form.image {
        Some(image) => {
            let ext = image_extension(image.file_name.as_deref());
            let object = state
                .blob_store
                .put_object(PREVIEW_BUCKET, "preview", &ext, &image.data)
                .await?;
            let url = state.blob_store.public_url(&object);
            stored.push(object);
            Some(url)
        }
        None => None,
    };
    let file_object = match state
        .blob_store
        .put_object(FILE_BUCKET, "file", ARCHIVE_EXTENSION, &file.data)
        .await
    {
        Ok(object) => object,
        Err(e) => {
            discard_objects(&state, &stored).await;
            return Err(e);
        }
    };
    let file_url = state.blob_store.public_url(&file_object);
    stored.push(file_object);

    let created = {
        let db = state.db.lock().await;
        db.create_item(&NewItem {
            name,
            description: form.description.unwrap_or_default(),
            price,
            category_id,
            image_url,
            file_url,
            created_by: Some(admin.id),
        })
    };
    let item = match created {
        Ok(item) => item,
        Err(e) => {
            discard_objects(&state, &stored).await;
            return Err(e.into());
        }
    };

    info!(item = %item.id, name = %item.name, price = item.price, size = file.data.len(), "Item published");
    spawn_release_broadcast(state.clone(), item.name.clone());

    Ok((StatusCode::CREATED, Json(item)))
}

/// Announce a new item to every configured webhook. The publish request
/// never waits for this.
fn spawn_release_broadcast(state: AppState, item_name: String) {
    tokio::spawn(async move {
        let webhooks = {
            let db = state.db.lock().await;
            db.webhook_urls()
        };
        match webhooks {
            Ok(webhooks) => {
                let outcome = state
                    .notifier
                    .broadcast_new_release(&item_name, &webhooks)
                    .await;
                info!(item = %item_name, message = %outcome.message, "Release broadcast finished");
            }
            Err(e) => error!(item = %item_name, error = %e, "Failed to load webhooks for release"),
        }
    });
}

async fn discard_objects(state: &AppState, objects: &[ObjectRef]) {
    for object in objects {
        if let Err(e) = state.blob_store.delete_object(object).await {
            warn!(bucket = object.bucket(), object = object.path(), error = %e, "Failed to remove object");
        }
    }
}

async fn delete_item(
    headers: HeaderMap,
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<SuccessResponse>, ServerError> {
    let Path(id) = id?;
    state.require_admin(&headers).await?;
    let item = {
        let db = state.db.lock().await;
        let item = db.get_item(id).map_err(missing_item)?;
        db.delete_item(id)?;
        item
    };

    let objects: Vec<ObjectRef> = std::iter::once(item.file_url.as_str())
        .chain(item.image_url.as_deref())
        .filter_map(ObjectRef::parse_reference)
        .collect();
    discard_objects(&state, &objects).await;

    info!(item = %id, "Item deleted");
    Ok(Json(SuccessResponse {
        success: true,
        message: None,
    }))
}

// ---------------------------------------------------------------------------
// Ads
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct CreateAdRequest {
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct AdActiveRequest {
    is_active: bool,
}

async fn list_ads(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<Vec<Ad>>, ServerError> {
    state.require_admin(&headers).await?;
    let db = state.db.lock().await;
    Ok(Json(db.list_ads()?))
}

async fn create_ad(
    headers: HeaderMap,
    State(state): State<AppState>,
    payload: Result<Json<CreateAdRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Ad>), ServerError> {
    state.require_admin(&headers).await?;
    let Json(req) = payload?;
    let expires_at = req
        .expires_at
        .unwrap_or_else(|| Utc::now() + Duration::days(state.config.ad_default_ttl_days));

    let ad = {
        let db = state.db.lock().await;
        db.create_ad(&NewAd {
            title: req.title,
            content: req.content,
            image_url: req.image_url.filter(|u| !u.trim().is_empty()),
            expires_at,
        })?
    };
    info!(ad = %ad.id, expires_at = %ad.expires_at, "Ad created");
    Ok((StatusCode::CREATED, Json(ad)))
}

async fn set_ad_active(
    headers: HeaderMap,
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<AdActiveRequest>, JsonRejection>,
) -> Result<Json<Ad>, ServerError> {
    let Path(id) = id?;
    state.require_admin(&headers).await?;
    let Json(req) = payload?;
    let db = state.db.lock().await;
    Ok(Json(db.set_ad_active(id, req.is_active)?))
}

async fn delete_ad(
    headers: HeaderMap,
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<SuccessResponse>, ServerError> {
    let Path(id) = id?;
    state.require_admin(&headers).await?;
    let db = state.db.lock().await;
    if !db.delete_ad(id)? {
        return Err(ServerError::NotFound("Ad not found".into()));
    }
    Ok(Json(SuccessResponse {
        success: true,
        message: None,
    }))
}

// ---------------------------------------------------------------------------
// Payments
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct PaymentListParams {
    status: Option<String>,
}

#[derive(Deserialize)]
struct PaymentStatusUpdate {
    status: PaymentStatus,
}

async fn list_payments(
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(params): Query<PaymentListParams>,
) -> Result<Json<Vec<Payment>>, ServerError> {
    state.require_admin(&headers).await?;
    let status = params
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::parse::<PaymentStatus>)
        .transpose()
        .map_err(|e| ServerError::BadRequest(e.to_string()))?;
    let db = state.db.lock().await;
    Ok(Json(db.list_payments(status)?))
}

/// Out-of-band settlement: the administrator confirms the deposit arrived
/// (or never will).
async fn set_payment_status(
    headers: HeaderMap,
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<PaymentStatusUpdate>, JsonRejection>,
) -> Result<Json<Payment>, ServerError> {
    let Path(id) = id?;
    let admin = state.require_admin(&headers).await?;
    let Json(req) = payload?;
    let payment = {
        let db = state.db.lock().await;
        db.set_payment_status(id, req.status).map_err(|e| match e {
            StoreError::NotFound => ServerError::NotFound("Payment not found".into()),
            other => other.into(),
        })?
    };
    info!(payment = %id, admin = %admin.id, status = %payment.status, "Payment settled manually");
    Ok(Json(payment))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use super::super::test_support::*;
    use super::image_extension;

    #[test]
    fn image_extensions_are_sanitised() {
        assert_eq!(image_extension(Some("Shot.JPG")), "jpg");
        assert_eq!(image_extension(Some("noext")), "png");
        assert_eq!(image_extension(Some("evil.p/h")), "png");
        assert_eq!(image_extension(None), "png");
    }

    #[tokio::test]
    async fn admin_uploads_item_with_preview() {
        let (state, _dir) = test_state().await;
        let category = state.db.lock().await.list_categories().unwrap()[0].id;

        let form = MultipartForm::new()
            .text("name", "Tuner Shop")
            .text("description", "Full interior")
            .text("price", "3.5")
            .text("category_id", &category.to_string())
            .file("image", "shot.jpg", b"jpeg-bytes")
            .file("file", "tuner.zip", b"zip-bytes");
        let (status, body) = send_multipart(&state, "/admin/items", Some(ADMIN_TOKEN), form).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["name"], "Tuner Shop");
        assert_eq!(body["price"], 3.5);
        assert!(body["image_url"]
            .as_str()
            .unwrap()
            .contains("/storage/v1/object/public/item-previews/"));
        assert!(body["file_url"]
            .as_str()
            .unwrap()
            .contains("/storage/v1/object/public/item-files/"));
    }

    #[tokio::test]
    async fn publish_succeeds_while_some_webhooks_fail() {
        let sink = spawn_webhook_sink().await;
        let (state, _dir) = test_state().await;
        seed_webhooks(
            &state,
            &[
                format!("{sink}/ok/1"),
                format!("{sink}/fail/2"),
                format!("{sink}/ok/3"),
                format!("{sink}/fail/4"),
            ],
        )
        .await;
        let category = state.db.lock().await.list_categories().unwrap()[0].id;

        let form = MultipartForm::new()
            .text("name", "Drift Pack")
            .text("price", "0")
            .text("category_id", &category.to_string())
            .file("file", "drift.zip", b"zip-bytes");
        let (status, body) = send_multipart(&state, "/admin/items", Some(ADMIN_TOKEN), form).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["name"], "Drift Pack");

        let seen = sink.wait_for(4).await;
        assert_eq!(seen.len(), 4);
        assert_eq!(seen.iter().filter(|d| d.path.starts_with("/fail")).count(), 2);
        assert!(seen
            .iter()
            .all(|d| d.body["content"].as_str().unwrap().contains("**New Release:** Drift Pack")));
    }

    #[tokio::test]
    async fn upload_rejects_unknown_category_and_non_admins() {
        let (state, _dir) = test_state().await;

        let form = MultipartForm::new()
            .text("name", "Tuner Shop")
            .text("price", "1")
            .text("category_id", &uuid::Uuid::new_v4().to_string())
            .file("file", "tuner.zip", b"zip-bytes");
        let (status, body) = send_multipart(&state, "/admin/items", Some(ADMIN_TOKEN), form).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Unknown category");

        let form = MultipartForm::new()
            .text("name", "Tuner Shop")
            .file("file", "tuner.zip", b"zip-bytes");
        let (status, _) = send_multipart(&state, "/admin/items", Some(BUYER_TOKEN), form).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn delete_item_removes_row_and_archive() {
        let (state, _dir) = test_state().await;
        let item = upload_item(&state, "Doomed", 0.0).await;

        let (status, _) = send(
            &state,
            "DELETE",
            &format!("/admin/items/{}", item.id),
            Some(ADMIN_TOKEN),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(state.db.lock().await.get_item(item.id).is_err());

        let object = crate::blob_store::ObjectRef::parse_reference(&item.file_url).unwrap();
        assert!(!state.blob_store.exists(&object).await);
    }

    #[tokio::test]
    async fn ad_lifecycle() {
        let (state, _dir) = test_state().await;
        let (status, ad) = send(
            &state,
            "POST",
            "/admin/ads",
            Some(ADMIN_TOKEN),
            Some(json!({ "title": "Summer sale", "content": "Half off" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = ad["id"].as_str().unwrap().to_string();

        let (_, public) = send(&state, "GET", "/api/ads", None, None).await;
        assert_eq!(public.as_array().unwrap().len(), 1);

        let (status, updated) = send(
            &state,
            "PATCH",
            &format!("/admin/ads/{id}"),
            Some(ADMIN_TOKEN),
            Some(json!({ "is_active": false })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["is_active"], false);

        let (_, public) = send(&state, "GET", "/api/ads", None, None).await;
        assert!(public.as_array().unwrap().is_empty());

        let (status, _) = send(&state, "DELETE", &format!("/admin/ads/{id}"), Some(ADMIN_TOKEN), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&state, "DELETE", &format!("/admin/ads/{id}"), Some(ADMIN_TOKEN), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn completed_payment_is_final() {
        let (state, _dir) = test_state().await;
        let item = upload_item(&state, "Paid", 1.0).await;
        let (_, session) = send(
            &state,
            "POST",
            "/functions/v1/create-payment-session",
            Some(BUYER_TOKEN),
            Some(json!({ "item_id": item.id, "amount": 1.0, "currency": "BNB" })),
        )
        .await;
        let path = format!("/admin/payments/{}/status", session["payment_id"].as_str().unwrap());

        let (status, _) = send(&state, "POST", &path, Some(ADMIN_TOKEN), Some(json!({ "status": "completed" }))).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&state, "POST", &path, Some(ADMIN_TOKEN), Some(json!({ "status": "failed" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, listed) = send(&state, "GET", "/admin/payments?status=completed", Some(ADMIN_TOKEN), None).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
    }
}
