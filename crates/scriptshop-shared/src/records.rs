//! Records returned by the storefront API.
//!
//! The store reads these out of SQLite; the client decodes them from JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{CategoryName, PaymentStatus};

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: Uuid,
    pub name: CategoryName,
    pub description: String,
}

/// A purchasable resource listed in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    /// Zero means free.
    pub price: f64,
    pub category_id: Option<Uuid>,
    /// Joined from `categories`; `None` when uncategorised.
    pub category_name: Option<CategoryName>,
    /// Public preview image reference.
    pub image_url: Option<String>,
    /// Stored archive reference (`.../storage/v1/object/public/<bucket>/<path>`).
    pub file_url: String,
    pub downloads: i64,
    /// Average of the item's ratings, refreshed after every rating write.
    pub rating: f64,
    /// Administrator who published the item.
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Item {
    pub fn is_free(&self) -> bool {
        self.price <= 0.0
    }
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// Local mirror of an identity-service account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    /// Shared with the identity service.
    pub id: Uuid,
    pub username: String,
    pub discord_webhook_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Payment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub item_id: Uuid,
    pub amount: f64,
    pub currency: String,
    pub status: PaymentStatus,
    /// External order reference.
    pub order_id: String,
    /// Human-followed payment instruction link.
    pub payment_url: String,
    pub deposit_address: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Engagement
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rating {
    pub user_id: Uuid,
    pub item_id: Uuid,
    pub rating: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate derived from the `ratings` rows at read time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct RatingStats {
    pub average: f64,
    pub count: u64,
}

/// An item in a user's favorites list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FavoriteEntry {
    pub favorited_at: DateTime<Utc>,
    pub item: Item,
}

/// An item in a user's download history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownloadEntry {
    pub id: Uuid,
    pub downloaded_at: DateTime<Utc>,
    pub item: Item,
}

// ---------------------------------------------------------------------------
// Ads
// ---------------------------------------------------------------------------

/// A promotional banner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ad {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub image_url: Option<String>,
    pub is_active: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
