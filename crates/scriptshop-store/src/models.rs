//! Write-side inputs for the storefront database.
//!
//! The row records themselves live in `scriptshop_shared::records` and are
//! re-exported here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use scriptshop_shared::records::{
    Ad, Category, DownloadEntry, FavoriteEntry, Item, Payment, Profile, Rating, RatingStats,
};
use scriptshop_shared::{CategoryName, SortOrder};

/// Values supplied by the admin upload.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub name: String,
    pub description: String,
    pub price: f64,
    pub category_id: Option<Uuid>,
    pub image_url: Option<String>,
    pub file_url: String,
    pub created_by: Option<Uuid>,
}

/// Catalog filter: category and free-text search, then ordering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemQuery {
    #[serde(default)]
    pub category: Option<CategoryName>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub sort: SortOrder,
    #[serde(default)]
    pub limit: Option<u32>,
}

/// Partial profile update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub username: Option<String>,
    /// `Some(None)` clears the webhook.
    pub discord_webhook_url: Option<Option<String>>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub user_id: Uuid,
    pub item_id: Uuid,
    pub amount: f64,
    pub currency: String,
    pub order_id: String,
    pub payment_url: String,
    pub deposit_address: String,
}

#[derive(Debug, Clone)]
pub struct NewAd {
    pub title: String,
    pub content: String,
    pub image_url: Option<String>,
    pub expires_at: DateTime<Utc>,
}
