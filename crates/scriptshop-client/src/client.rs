//! Typed client for the storefront API.

use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use scriptshop_shared::protocol::{
    AccessResponse, CreatePaymentSessionRequest, DeliveryResult, DownloadUrlRequest,
    DownloadUrlResponse, FavoriteResponse, PaymentSessionResponse, PaymentStatusResponse, ProfileUpdateRequest,
    RatingRequest, RatingSummary,
};
use scriptshop_shared::{CategoryName, SortOrder};
use scriptshop_shared::records::{Ad, Category, DownloadEntry, FavoriteEntry, Item, Profile};

use crate::error::{api_error, Result};
use crate::session::SessionContext;

/// Catalog listing filter.
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub category: Option<CategoryName>,
    pub search: Option<String>,
    pub sort: SortOrder,
    pub limit: Option<u32>,
}

impl ItemFilter {
    fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("sort", self.sort.as_str().to_string())];
        if let Some(category) = self.category {
            pairs.push(("category", category.as_str().to_string()));
        }
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            pairs.push(("search", search.to_string()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        pairs
    }
}

#[derive(Clone)]
pub struct StoreClient {
    http: reqwest::Client,
    base_url: String,
    session: SessionContext,
}

impl StoreClient {
    pub fn new(base_url: &str, session: SessionContext) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    /// Build a request, attaching the current session token when there is one.
    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, format!("{}{}", self.base_url, path));
        match self.session.access_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: reqwest::RequestBuilder) -> Result<T> {
        let response = builder.send().await?;
        if !response.status().is_success() {
            let err = api_error(response).await;
            debug!(error = %err, "Store request failed");
            return Err(err);
        }
        Ok(response.json().await?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(self.request(Method::GET, path)).await
    }

    async fn call<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.send(self.request(method, path).json(body)).await
    }

    // -- catalog ------------------------------------------------------------

    pub async fn categories(&self) -> Result<Vec<Category>> {
        self.get("/api/categories").await
    }

    pub async fn items(&self, filter: &ItemFilter) -> Result<Vec<Item>> {
        let builder = self
            .request(Method::GET, "/api/items")
            .query(&filter.query_pairs());
        self.send(builder).await
    }

    pub async fn featured_items(&self) -> Result<Vec<Item>> {
        self.get("/api/items/featured").await
    }

    pub async fn item(&self, id: Uuid) -> Result<Item> {
        self.get(&format!("/api/items/{id}")).await
    }

    pub async fn active_ads(&self) -> Result<Vec<Ad>> {
        self.get("/api/ads").await
    }

    // -- purchase and download ----------------------------------------------

    pub async fn can_download(&self, id: Uuid) -> Result<bool> {
        let access: AccessResponse = self.get(&format!("/api/items/{id}/access")).await?;
        Ok(access.allowed)
    }

    /// Manual "check status" after paying.
    pub async fn payment_status(&self, id: Uuid) -> Result<PaymentStatusResponse> {
        self.get(&format!("/api/items/{id}/payment")).await
    }

    pub async fn create_payment_session(&self, item: &Item, currency: &str) -> Result<PaymentSessionResponse> {
        self.call(
            Method::POST,
            "/functions/v1/create-payment-session",
            &CreatePaymentSessionRequest {
                item_id: Some(item.id),
                amount: Some(item.price),
                currency: Some(currency.to_string()),
            },
        )
        .await
    }

    pub async fn download_url(&self, id: Uuid) -> Result<DownloadUrlResponse> {
        self.call(
            Method::POST,
            "/functions/v1/get-download-url",
            &DownloadUrlRequest { item_id: Some(id) },
        )
        .await
    }

    // -- engagement ---------------------------------------------------------

    pub async fn is_favorite(&self, id: Uuid) -> Result<bool> {
        let state: FavoriteResponse = self.get(&format!("/api/items/{id}/favorite")).await?;
        Ok(state.favorite)
    }

    /// Flip membership; returns the new state.
    pub async fn toggle_favorite(&self, id: Uuid) -> Result<bool> {
        let state: FavoriteResponse = self
            .send(self.request(Method::POST, &format!("/api/items/{id}/favorite")))
            .await?;
        Ok(state.favorite)
    }

    pub async fn rating(&self, id: Uuid) -> Result<RatingSummary> {
        self.get(&format!("/api/items/{id}/rating")).await
    }

    pub async fn rate(&self, id: Uuid, rating: u8) -> Result<RatingSummary> {
        self.call(
            Method::PUT,
            &format!("/api/items/{id}/rating"),
            &RatingRequest {
                rating: Some(rating),
            },
        )
        .await
    }

    // -- account ------------------------------------------------------------

    pub async fn profile(&self) -> Result<Profile> {
        self.get("/api/me/profile").await
    }

    pub async fn update_profile(&self, update: &ProfileUpdateRequest) -> Result<Profile> {
        self.call(Method::PATCH, "/api/me/profile", update).await
    }

    /// Post a test message to the saved webhook. Delivery failure comes
    /// back as `success: false`, not as an error.
    pub async fn test_webhook(&self) -> Result<DeliveryResult> {
        self.send(self.request(Method::POST, "/api/me/profile/webhook/test"))
            .await
    }

    pub async fn recent_downloads(&self) -> Result<Vec<DownloadEntry>> {
        self.get("/api/me/downloads").await
    }

    pub async fn favorites(&self) -> Result<Vec<FavoriteEntry>> {
        self.get("/api/me/favorites").await
    }
}
