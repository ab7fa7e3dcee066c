//! Payment session initiator.
//!
//! A session is a `pending` payment row plus a human-followed instruction
//! link (deposit address and amount). Settlement is never detected here:
//! an administrator flips the row to `completed` out of band.

use chrono::Utc;
use reqwest::Url;
use tracing::info;
use uuid::Uuid;

use scriptshop_shared::constants::SUB_MERCHANT;
use scriptshop_shared::protocol::{
    CreatePaymentSessionRequest, PaymentSessionResponse, PaymentStatusResponse,
};
use scriptshop_shared::Identity;
use scriptshop_store::{Database, NewPayment};

use crate::config::PaymentSettings;
use crate::error::{missing_item, ServerError};

const AMOUNT_EPSILON: f64 = 1e-9;

/// Validate the request against the catalog and record a pending payment.
///
/// The already-purchased check and the insert are two statements, so
/// concurrent duplicate requests can both pass the check.
pub fn create_session(
    db: &Database,
    settings: &PaymentSettings,
    user: &Identity,
    req: &CreatePaymentSessionRequest,
) -> Result<PaymentSessionResponse, ServerError> {
    let (Some(item_id), Some(amount), Some(_currency)) = (
        req.item_id,
        req.amount.filter(|a| *a != 0.0),
        req.currency.as_deref().filter(|c| !c.trim().is_empty()),
    ) else {
        return Err(ServerError::BadRequest("Missing required fields".into()));
    };

    let item = db.get_item(item_id).map_err(missing_item)?;

    if (item.price - amount).abs() > AMOUNT_EPSILON {
        return Err(ServerError::BadRequest("Amount mismatch".into()));
    }

    if db.has_completed_payment(user.id, item.id)? {
        return Err(ServerError::Conflict("Item already purchased".into()));
    }

    if !settings.has_credentials() {
        tracing::error!("Missing payment merchant credentials");
        return Err(ServerError::ServiceUnavailable(
            "Payment service unavailable".into(),
        ));
    }

    let order_id = order_reference(item.id, user.id, Utc::now().timestamp_millis());
    let payment_url = instruction_url(settings, &order_id, amount)?;

    let payment = db.create_payment(&NewPayment {
        user_id: user.id,
        item_id: item.id,
        amount,
        currency: settings.currency.clone(),
        order_id: order_id.clone(),
        payment_url: payment_url.clone(),
        deposit_address: settings.deposit_address.clone(),
    })?;

    info!(
        user = %user.id,
        item = %item.id,
        amount,
        currency = %settings.currency,
        "Payment session created"
    );

    Ok(PaymentSessionResponse {
        payment_id: payment.id,
        payment_url,
        order_id,
        amount,
        currency: settings.currency.clone(),
    })
}

/// Manual "check status": re-read the stored rows for the pair.
pub fn payment_status(
    db: &Database,
    user_id: Uuid,
    item_id: Uuid,
) -> Result<PaymentStatusResponse, ServerError> {
    let purchased = db.has_completed_payment(user_id, item_id)?;
    let latest = db.latest_payment(user_id, item_id)?;
    Ok(PaymentStatusResponse {
        item_id,
        purchased,
        latest_status: latest.map(|p| p.status),
    })
}

fn order_reference(item_id: Uuid, user_id: Uuid, millis: i64) -> String {
    format!("item_{item_id}_{user_id}_{millis}")
}

fn instruction_url(
    settings: &PaymentSettings,
    order_id: &str,
    amount: f64,
) -> Result<String, ServerError> {
    let amount = amount.to_string();
    let url = Url::parse_with_params(
        &settings.checkout_url,
        [
            ("orderId", order_id),
            ("amount", amount.as_str()),
            ("currency", settings.currency.as_str()),
            ("address", settings.deposit_address.as_str()),
            ("subMerchant", SUB_MERCHANT),
        ],
    )
    .map_err(|e| ServerError::Internal(format!("Invalid PAYMENT_CHECKOUT_URL: {e}")))?;
    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptshop_shared::{AuthProvider, PaymentStatus};
    use scriptshop_store::NewItem;

    fn settings() -> PaymentSettings {
        PaymentSettings {
            merchant_id: Some("merchant".into()),
            api_secret: Some("secret".into()),
            ..PaymentSettings::default()
        }
    }

    fn buyer() -> Identity {
        Identity {
            id: Uuid::new_v4(),
            email: Some("buyer@example.com".into()),
            provider: AuthProvider::Email,
            provider_id: None,
            display_name: None,
        }
    }

    fn priced_item(db: &Database, price: f64) -> Uuid {
        db.create_item(&NewItem {
            name: "Paid Script".into(),
            description: String::new(),
            price,
            category_id: None,
            image_url: None,
            file_url: "http://localhost/storage/v1/object/public/item-files/1_file.zip".into(),
            created_by: None,
        })
        .unwrap()
        .id
    }

    fn request(item_id: Uuid, amount: f64) -> CreatePaymentSessionRequest {
        CreatePaymentSessionRequest {
            item_id: Some(item_id),
            amount: Some(amount),
            currency: Some("BNB".into()),
        }
    }

    #[test]
    fn creates_pending_payment_with_instructions() {
        let db = Database::open_in_memory().unwrap();
        let item = priced_item(&db, 2.5);
        let user = buyer();

        let session = create_session(&db, &settings(), &user, &request(item, 2.5)).unwrap();
        assert_eq!(session.amount, 2.5);
        assert_eq!(session.currency, "BNB");
        assert!(session.order_id.starts_with(&format!("item_{item}_{}_", user.id)));
        assert!(session.payment_url.contains("amount=2.5"));
        assert!(session.payment_url.contains("address=0xebb11a6839fb387a3dae9cadf463571901da0744"));

        let stored = db.get_payment(session.payment_id).unwrap();
        assert_eq!(stored.status, PaymentStatus::Pending);
        assert_eq!(stored.order_id, session.order_id);
    }

    #[test]
    fn amount_must_match_current_price() {
        let db = Database::open_in_memory().unwrap();
        let item = priced_item(&db, 2.5);
        let err = create_session(&db, &settings(), &buyer(), &request(item, 2.0)).unwrap_err();
        assert!(matches!(err, ServerError::BadRequest(ref m) if m == "Amount mismatch"));
    }

    #[test]
    fn missing_fields_and_unknown_item() {
        let db = Database::open_in_memory().unwrap();
        let err = create_session(
            &db,
            &settings(),
            &buyer(),
            &CreatePaymentSessionRequest::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ServerError::BadRequest(ref m) if m == "Missing required fields"));

        let err = create_session(&db, &settings(), &buyer(), &request(Uuid::new_v4(), 1.0))
            .unwrap_err();
        assert!(matches!(err, ServerError::NotFound(_)));
    }

    #[test]
    fn completed_purchase_blocks_new_sessions() {
        let db = Database::open_in_memory().unwrap();
        let item = priced_item(&db, 1.0);
        let user = buyer();

        // Pending and failed rows never block.
        let first = create_session(&db, &settings(), &user, &request(item, 1.0)).unwrap();
        db.set_payment_status(first.payment_id, PaymentStatus::Failed)
            .unwrap();
        let second = create_session(&db, &settings(), &user, &request(item, 1.0)).unwrap();
        db.set_payment_status(second.payment_id, PaymentStatus::Completed)
            .unwrap();

        let err = create_session(&db, &settings(), &user, &request(item, 1.0)).unwrap_err();
        assert!(matches!(err, ServerError::Conflict(ref m) if m == "Item already purchased"));

        let status = payment_status(&db, user.id, item).unwrap();
        assert!(status.purchased);
        assert_eq!(status.latest_status, Some(PaymentStatus::Completed));
    }

    #[test]
    fn missing_credentials_is_unavailable() {
        let db = Database::open_in_memory().unwrap();
        let item = priced_item(&db, 1.0);
        let err = create_session(
            &db,
            &PaymentSettings::default(),
            &buyer(),
            &request(item, 1.0),
        )
        .unwrap_err();
        assert!(matches!(err, ServerError::ServiceUnavailable(_)));
        assert!(db.list_payments(None).unwrap().is_empty());
    }
}
