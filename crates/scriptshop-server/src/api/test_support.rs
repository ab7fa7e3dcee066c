//! In-process fixture: a full [`AppState`] over an in-memory database, a
//! temporary bucket directory and fixed bearer tokens.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, Request, StatusCode, Uri},
    routing::post,
    Router,
};
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tower::ServiceExt;
use uuid::Uuid;

use scriptshop_shared::constants::FILE_BUCKET;
use scriptshop_shared::{AuthProvider, Identity};
use scriptshop_store::{Database, Item, NewItem, ProfileChanges};

use super::{build_router, AppState};
use crate::auth::{IdentityProvider, StaticIdentities};
use crate::blob_store::BlobStore;
use crate::config::{PaymentSettings, ServerConfig};
use crate::notify::Notifier;
use crate::rate_limit::RateLimiter;

pub const BUYER_TOKEN: &str = "buyer-token";
pub const ADMIN_TOKEN: &str = "admin-token";
pub const SERVICE_TOKEN: &str = "cron-secret";

const BASE_URL: &str = "http://shop.test";

pub fn buyer() -> Identity {
    Identity {
        id: Uuid::from_u128(0xb0b),
        email: Some("buyer@example.com".into()),
        provider: AuthProvider::Email,
        provider_id: None,
        display_name: None,
    }
}

pub fn admin() -> Identity {
    Identity {
        id: Uuid::from_u128(0xad),
        email: Some("owner@shop.test".into()),
        provider: AuthProvider::Email,
        provider_id: None,
        display_name: Some("Owner".into()),
    }
}

pub async fn test_state() -> (AppState, TempDir) {
    let dir = TempDir::new().unwrap();
    let config = ServerConfig {
        storage_path: dir.path().to_path_buf(),
        public_base_url: BASE_URL.into(),
        admin_emails: vec!["owner@shop.test".into()],
        service_token: Some(SERVICE_TOKEN.into()),
        payment: PaymentSettings {
            merchant_id: Some("merchant".into()),
            api_secret: Some("secret".into()),
            ..PaymentSettings::default()
        },
        ..ServerConfig::default()
    };

    let db = Database::open_in_memory().unwrap();
    db.seed_categories().unwrap();

    let blob_store = BlobStore::new(
        config.storage_path.clone(),
        &config.public_base_url,
        config.signing_key,
    )
    .await
    .unwrap();

    let identities = HashMap::from([
        (BUYER_TOKEN.to_string(), buyer()),
        (ADMIN_TOKEN.to_string(), admin()),
    ]);

    let state = AppState {
        db: Arc::new(Mutex::new(db)),
        blob_store: Arc::new(blob_store),
        identity: Arc::new(IdentityProvider::Static(StaticIdentities::new(identities))),
        notifier: Arc::new(Notifier::new(config.notify.clone()).unwrap()),
        rate_limiter: RateLimiter::new(config.rate_limit_per_sec, config.rate_limit_burst),
        config: Arc::new(config),
    };
    (state, dir)
}

/// Publish an item backed by a real archive object.
pub async fn upload_item(state: &AppState, name: &str, price: f64) -> Item {
    let object = state
        .blob_store
        .put_object(FILE_BUCKET, "file", "zip", format!("archive of {name}").as_bytes())
        .await
        .unwrap();
    // Keep `created_at` ordering stable for the newest-first listings.
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    let db = state.db.lock().await;
    db.create_item(&NewItem {
        name: name.into(),
        description: format!("{name} resource"),
        price,
        category_id: None,
        image_url: None,
        file_url: state.blob_store.public_url(&object),
        created_by: None,
    })
    .unwrap()
}

/// Give each URL its own profile.
pub async fn seed_webhooks(state: &AppState, urls: &[String]) {
    let db = state.db.lock().await;
    for (n, url) in urls.iter().enumerate() {
        let identity = Identity {
            id: Uuid::new_v4(),
            email: Some(format!("fan{n}@example.com")),
            provider: AuthProvider::Email,
            provider_id: None,
            display_name: None,
        };
        db.ensure_profile(&identity).unwrap();
        db.update_profile(
            identity.id,
            &ProfileChanges {
                username: None,
                discord_webhook_url: Some(Some(url.clone())),
            },
        )
        .unwrap();
    }
}

/// One request received by a [`WebhookSink`].
#[derive(Debug, Clone)]
pub struct Delivery {
    pub path: String,
    pub body: Value,
}

/// Local webhook receiver; paths under `/fail` answer 500. Formats as its
/// base URL.
#[derive(Clone)]
pub struct WebhookSink {
    url: String,
    received: Arc<std::sync::Mutex<Vec<Delivery>>>,
}

impl std::fmt::Display for WebhookSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.url)
    }
}

impl WebhookSink {
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.received.lock().unwrap().clone()
    }

    /// Poll until at least `count` requests arrived, for up to five seconds.
    pub async fn wait_for(&self, count: usize) -> Vec<Delivery> {
        for _ in 0..500 {
            let seen = self.deliveries();
            if seen.len() >= count {
                return seen;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("webhook sink saw {} of {count} deliveries", self.deliveries().len());
    }
}

pub async fn spawn_webhook_sink() -> WebhookSink {
    async fn receive(
        State(received): State<Arc<std::sync::Mutex<Vec<Delivery>>>>,
        uri: Uri,
        body: Bytes,
    ) -> StatusCode {
        received.lock().unwrap().push(Delivery {
            path: uri.path().to_string(),
            body: json_or_null(&body),
        });
        if uri.path().starts_with("/fail") {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            StatusCode::NO_CONTENT
        }
    }

    let received = Arc::new(std::sync::Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/*path", post(receive))
        .with_state(received.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    WebhookSink {
        url: format!("http://{addr}"),
        received,
    }
}

async fn dispatch(state: &AppState, request: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
    let response = build_router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, bytes.to_vec())
}

fn json_or_null(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap_or(Value::Null)
}

/// One request through the full router; the body is parsed as JSON when it is JSON.
pub async fn send(
    state: &AppState,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let payload = body.map(|b| b.to_string().into_bytes()).unwrap_or_default();
    send_raw(state, method, uri, token, "application/json", payload).await
}

pub async fn send_raw(
    state: &AppState,
    method: &str,
    uri: &str,
    token: Option<&str>,
    content_type: &str,
    payload: Vec<u8>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    if !payload.is_empty() {
        builder = builder.header("content-type", content_type);
    }
    let (status, _, bytes) = dispatch(state, builder.body(Body::from(payload)).unwrap()).await;
    (status, json_or_null(&bytes))
}

/// Unauthenticated GET returning raw bytes and response headers.
pub async fn send_bytes(state: &AppState, uri: &str) -> (StatusCode, HeaderMap, Vec<u8>) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    dispatch(state, request).await
}

const BOUNDARY: &str = "scriptshop-test-boundary";

/// Minimal `multipart/form-data` body builder.
#[derive(Default)]
pub struct MultipartForm {
    body: Vec<u8>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, data: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    fn finish(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        self.body
    }
}

pub async fn send_multipart(
    state: &AppState,
    uri: &str,
    token: Option<&str>,
    form: MultipartForm,
) -> (StatusCode, Value) {
    send_raw(
        state,
        "POST",
        uri,
        token,
        &format!("multipart/form-data; boundary={BOUNDARY}"),
        form.finish(),
    )
    .await
}
