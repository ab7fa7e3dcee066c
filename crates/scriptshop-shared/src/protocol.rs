//! JSON bodies exchanged with the function endpoints.
//!
//! Request fields are optional on purpose: a missing field is reported by
//! the server as a validation error instead of a deserialization failure.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{AuthProvider, Identity, PaymentStatus};

// ---------------------------------------------------------------------------
// Identity service
// ---------------------------------------------------------------------------

/// User record returned by the identity service (`GET /user`, admin lookup,
/// and the `user` field of a token response).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub app_metadata: AppMetadata,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppMetadata {
    #[serde(default)]
    pub provider: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default)]
    pub provider_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl From<AuthUser> for Identity {
    fn from(user: AuthUser) -> Self {
        let meta = user.user_metadata;
        Identity {
            id: user.id,
            email: user.email.filter(|e| !e.is_empty()),
            provider: AuthProvider::from_metadata(user.app_metadata.provider.as_deref()),
            provider_id: meta.provider_id,
            display_name: meta.username.or(meta.full_name).or(meta.name),
        }
    }
}

// ---------------------------------------------------------------------------
// create-payment-session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreatePaymentSessionRequest {
    #[serde(default)]
    pub item_id: Option<Uuid>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentSessionResponse {
    pub payment_id: Uuid,
    pub payment_url: String,
    pub order_id: String,
    pub amount: f64,
    pub currency: String,
}

/// Result of the manual "check status" action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentStatusResponse {
    pub item_id: Uuid,
    pub purchased: bool,
    /// Status of the most recent payment row for the pair, if any.
    pub latest_status: Option<PaymentStatus>,
}

// ---------------------------------------------------------------------------
// get-download-url
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadUrlRequest {
    #[serde(default)]
    pub item_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadUrlResponse {
    pub url: String,
    pub filename: String,
}

// ---------------------------------------------------------------------------
// notify-new-release
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyNewReleaseRequest {
    #[serde(default)]
    pub item_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliveryResult {
    pub success: bool,
    pub webhook: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotifyNewReleaseResponse {
    pub success: bool,
    pub message: String,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<DeliveryResult>,
}

// ---------------------------------------------------------------------------
// send-download-thanks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadThanksRequest {
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub item_name: Option<String>,
    #[serde(default)]
    pub item_image_url: Option<String>,
    #[serde(default)]
    pub auth_provider: Option<AuthProvider>,
}

// ---------------------------------------------------------------------------
// Generic bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuccessResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Body of cleanup-expired-ads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CleanupResponse {
    pub success: bool,
    pub message: String,
    pub removed: u64,
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

// ---------------------------------------------------------------------------
// Engagement
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FavoriteResponse {
    pub item_id: Uuid,
    pub favorite: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RatingRequest {
    #[serde(default)]
    pub rating: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RatingSummary {
    pub item_id: Uuid,
    pub average: f64,
    pub count: u64,
    #[serde(default)]
    pub user_rating: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessResponse {
    pub item_id: Uuid,
    pub allowed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdateRequest {
    #[serde(default)]
    pub username: Option<String>,
    /// `Some("")` clears the webhook.
    #[serde(default)]
    pub discord_webhook_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_request_fields_deserialize_as_none() {
        let req: CreatePaymentSessionRequest = serde_json::from_str(r#"{"amount": 2.5}"#).unwrap();
        assert!(req.item_id.is_none());
        assert_eq!(req.amount, Some(2.5));
        assert!(req.currency.is_none());
    }

    #[test]
    fn delivery_result_omits_absent_error() {
        let ok = DeliveryResult {
            success: true,
            webhook: "https://hooks.example/1".into(),
            error: None,
        };
        let json = serde_json::to_value(&ok).unwrap();
        assert!(json.get("error").is_none());
    }
}
