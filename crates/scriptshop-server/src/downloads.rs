//! Download authorizer.
//!
//! Re-runs the purchase gate, signs a short-lived link to the item's
//! archive, and detaches the bookkeeping (counter, history row) and the
//! notifications. Nothing detached can change the returned link.

use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use scriptshop_shared::constants::ARCHIVE_EXTENSION;
use scriptshop_shared::protocol::{DownloadUrlRequest, DownloadUrlResponse};
use scriptshop_shared::Identity;
use scriptshop_store::Item;

use crate::api::AppState;
use crate::blob_store::ObjectRef;
use crate::error::{missing_item, ServerError};
use crate::gate;
use crate::notify::DownloadAlert;

pub async fn authorize(
    state: &AppState,
    identity: &Identity,
    req: &DownloadUrlRequest,
) -> Result<DownloadUrlResponse, ServerError> {
    let item_id = req
        .item_id
        .ok_or_else(|| ServerError::BadRequest("Missing item_id".into()))?;

    let (item, access) = {
        let db = state.db.lock().await;
        let item = db.get_item(item_id).map_err(missing_item)?;
        let access = gate::check(&db, Some(identity.id), &item)
            .map_err(|e| ServerError::PurchaseCheck(e.to_string()))?;
        (item, access)
    };

    if !access.is_allowed() {
        debug!(user = %identity.id, item = %item.id, "Download denied, no completed payment");
        return Err(ServerError::PaymentRequired);
    }

    let object = ObjectRef::parse_reference(&item.file_url).ok_or_else(|| {
        error!(item = %item.id, file_url = %item.file_url, "Malformed file reference");
        ServerError::Storage("Invalid file URL".into())
    })?;

    let url = state
        .blob_store
        .signed_url(&object, state.config.signed_url_ttl_secs)
        .await
        .map_err(|e| {
            error!(item = %item.id, error = %e, "Signing failed");
            ServerError::Storage("Failed to create download URL".into())
        })?;

    let filename = format!("{}.{}", item.name, ARCHIVE_EXTENSION);
    spawn_download_effects(state.clone(), identity.clone(), item);

    Ok(DownloadUrlResponse { url, filename })
}

/// Fire-and-forget side effects of a granted download. Each task logs its
/// own failure.
pub fn spawn_download_effects(state: AppState, identity: Identity, item: Item) -> [JoinHandle<()>; 3] {
    let bookkeeping = {
        let state = state.clone();
        let user = identity.id;
        let item_id = item.id;
        tokio::spawn(async move {
            let db = state.db.lock().await;
            if let Err(e) = db.increment_downloads(item_id) {
                warn!(item = %item_id, error = %e, "Failed to increment download count");
            }
            if let Err(e) = db.record_download(user, item_id) {
                warn!(item = %item_id, user = %user, error = %e, "Failed to record download");
            }
        })
    };

    let thanks = {
        let state = state.clone();
        let identity = identity.clone();
        let name = item.name.clone();
        let image = item.image_url.clone();
        tokio::spawn(async move {
            match state
                .notifier
                .send_download_thanks(&identity, &name, image.as_deref())
                .await
            {
                Ok(channel) => debug!(user = %identity.id, ?channel, "Thank-you sent"),
                Err(e) => warn!(user = %identity.id, error = %e, "Thank-you not delivered"),
            }
        })
    };

    let alert = tokio::spawn(async move {
        let Some(owner) = item.created_by else {
            return;
        };
        let (webhook, downloader) = {
            let db = state.db.lock().await;
            let webhook = match db.find_profile(owner) {
                Ok(profile) => profile.and_then(|p| p.discord_webhook_url),
                Err(e) => {
                    warn!(owner = %owner, error = %e, "Failed to load uploader profile");
                    None
                }
            };
            let downloader = db
                .find_profile(identity.id)
                .ok()
                .flatten()
                .map(|p| p.username)
                .unwrap_or_else(|| "Unknown User".to_string());
            (webhook, downloader)
        };
        let Some(webhook) = webhook else {
            debug!(owner = %owner, "Uploader has no webhook configured");
            return;
        };

        let category = item.category_name.map(|c| c.as_str());
        let alert = DownloadAlert {
            downloaded_by: &downloader,
            item_name: &item.name,
            category,
        };
        if let Err(e) = state.notifier.send_download_alert(&webhook, &alert).await {
            warn!(owner = %owner, error = %e, "Download alert not delivered");
        }
    });

    [bookkeeping, thanks, alert]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{buyer, test_state, upload_item};
    use scriptshop_shared::PaymentStatus;
    use scriptshop_store::NewPayment;

    #[tokio::test]
    async fn free_item_yields_signed_link_and_counts_download() {
        let (state, _dir) = test_state().await;
        let item = upload_item(&state, "Free Garage", 0.0).await;

        let response = authorize(
            &state,
            &buyer(),
            &DownloadUrlRequest {
                item_id: Some(item.id),
            },
        )
        .await
        .unwrap();

        assert_eq!(response.filename, "Free Garage.zip");
        assert!(response.url.contains("/storage/v1/object/sign/item-files/"));
        assert!(response.url.contains("sig="));

        // Bookkeeping is detached; wait for it.
        for _ in 0..50 {
            if state.db.lock().await.get_item(item.id).unwrap().downloads == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        let db = state.db.lock().await;
        assert_eq!(db.get_item(item.id).unwrap().downloads, 1);
        assert_eq!(db.recent_downloads(buyer().id, 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn priced_item_requires_completed_payment() {
        let (state, _dir) = test_state().await;
        let item = upload_item(&state, "Paid Garage", 2.5).await;
        let req = DownloadUrlRequest {
            item_id: Some(item.id),
        };

        let err = authorize(&state, &buyer(), &req).await.unwrap_err();
        assert!(matches!(err, ServerError::PaymentRequired));

        {
            let db = state.db.lock().await;
            let payment = db
                .create_payment(&NewPayment {
                    user_id: buyer().id,
                    item_id: item.id,
                    amount: 2.5,
                    currency: "BNB".into(),
                    order_id: "order".into(),
                    payment_url: "https://pay.example".into(),
                    deposit_address: "0x0".into(),
                })
                .unwrap();
            db.set_payment_status(payment.id, PaymentStatus::Completed)
                .unwrap();
        }

        assert!(authorize(&state, &buyer(), &req).await.is_ok());
    }

    #[tokio::test]
    async fn malformed_reference_fails_the_request() {
        let (state, _dir) = test_state().await;
        let item = {
            let db = state.db.lock().await;
            db.create_item(&scriptshop_store::NewItem {
                name: "Broken".into(),
                description: String::new(),
                price: 0.0,
                category_id: None,
                image_url: None,
                file_url: "https://elsewhere.example/broken.zip".into(),
                created_by: None,
            })
            .unwrap()
        };

        let err = authorize(
            &state,
            &buyer(),
            &DownloadUrlRequest {
                item_id: Some(item.id),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServerError::Storage(ref m) if m == "Invalid file URL"));
    }

    #[tokio::test]
    async fn missing_id_and_unknown_item() {
        let (state, _dir) = test_state().await;
        let err = authorize(&state, &buyer(), &DownloadUrlRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::BadRequest(_)));

        let err = authorize(
            &state,
            &buyer(),
            &DownloadUrlRequest {
                item_id: Some(uuid::Uuid::new_v4()),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServerError::NotFound(_)));
    }
}
