//! Identity adapter.
//!
//! Accounts live in an external identity service. Requests carry its access
//! token as `Authorization: Bearer <token>`; this module resolves the token
//! to an [`Identity`]. For local development and tests a static token map
//! stands in for the service.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use axum::http::HeaderMap;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use scriptshop_shared::protocol::AuthUser;
use scriptshop_shared::Identity;

use crate::config::{AuthSettings, ServerConfig};
use crate::error::ServerError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("identity service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("identity service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("identity service is not configured: {0}")]
    NotConfigured(&'static str),

    #[error("failed to load identities file: {0}")]
    DevFile(String),
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

pub struct RemoteIdentity {
    http: reqwest::Client,
    base_url: String,
    anon_key: Option<String>,
    service_key: Option<String>,
}

impl RemoteIdentity {
    pub fn new(base_url: &str, settings: &AuthSettings) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: settings.anon_key.clone(),
            service_key: settings.service_key.clone(),
        })
    }

    async fn current_user(&self, token: &str) -> Result<Option<Identity>, AuthError> {
        let mut request = self
            .http
            .get(format!("{}/user", self.base_url))
            .bearer_auth(token);
        if let Some(key) = &self.anon_key {
            request = request.header("apikey", key);
        }
        self.fetch_user(request).await
    }

    async fn user_by_id(&self, id: Uuid) -> Result<Option<Identity>, AuthError> {
        let key = self
            .service_key
            .as_deref()
            .ok_or(AuthError::NotConfigured("AUTH_SERVICE_KEY"))?;
        let request = self
            .http
            .get(format!("{}/admin/users/{}", self.base_url, id))
            .bearer_auth(key)
            .header("apikey", key);
        self.fetch_user(request).await
    }

    async fn fetch_user(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<Option<Identity>, AuthError> {
        let response = request.send().await?;
        let status = response.status();
        if matches!(
            status,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND
        ) {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let user: AuthUser = response.json().await?;
        Ok(Some(user.into()))
    }
}

/// Fixed token to identity map.
#[derive(Default)]
pub struct StaticIdentities {
    by_token: HashMap<String, Identity>,
}

impl StaticIdentities {
    pub fn new(by_token: HashMap<String, Identity>) -> Self {
        Self { by_token }
    }

    pub async fn load(path: &Path) -> Result<Self, AuthError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AuthError::DevFile(format!("{}: {}", path.display(), e)))?;
        let by_token: HashMap<String, Identity> = serde_json::from_str(&raw)
            .map_err(|e| AuthError::DevFile(format!("{}: {}", path.display(), e)))?;
        Ok(Self { by_token })
    }
}

pub enum IdentityProvider {
    Remote(RemoteIdentity),
    Static(StaticIdentities),
}

impl IdentityProvider {
    pub async fn from_config(config: &ServerConfig) -> Result<Self, AuthError> {
        if let Some(url) = &config.auth.url {
            return Ok(Self::Remote(RemoteIdentity::new(url, &config.auth)?));
        }
        match &config.auth.dev_identities_file {
            Some(path) => {
                let identities = StaticIdentities::load(path).await?;
                warn!(
                    count = identities.by_token.len(),
                    "AUTH_URL not set, using static development identities"
                );
                Ok(Self::Static(identities))
            }
            None => {
                warn!("No identity service configured, every request is anonymous");
                Ok(Self::Static(StaticIdentities::default()))
            }
        }
    }

    /// Resolve an access token. `Ok(None)` means the token is not valid.
    pub async fn resolve(&self, token: &str) -> Result<Option<Identity>, AuthError> {
        match self {
            Self::Remote(remote) => remote.current_user(token).await,
            Self::Static(map) => Ok(map.by_token.get(token).cloned()),
        }
    }

    /// Look up an account by id with service privileges.
    pub async fn lookup_user(&self, id: Uuid) -> Result<Option<Identity>, AuthError> {
        match self {
            Self::Remote(remote) => remote.user_by_id(id).await,
            Self::Static(map) => Ok(map.by_token.values().find(|i| i.id == id).cloned()),
        }
    }
}

/// Token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolve the caller, or `Unauthorized`.
pub async fn authenticate(
    provider: &IdentityProvider,
    headers: &HeaderMap,
) -> Result<Identity, ServerError> {
    let token = bearer_token(headers).ok_or(ServerError::Unauthorized)?;
    match provider.resolve(token).await {
        Ok(Some(identity)) => {
            debug!(user = %identity.id, provider = %identity.provider, "Authenticated request");
            Ok(identity)
        }
        Ok(None) => Err(ServerError::Unauthorized),
        Err(e) => {
            warn!(error = %e, "Identity lookup failed");
            Err(ServerError::Unauthorized)
        }
    }
}

/// Bearer check for scheduler and internal calls. With `required` false an
/// unconfigured token leaves the endpoint open.
pub fn verify_service_token(
    headers: &HeaderMap,
    config: &ServerConfig,
    required: bool,
) -> Result<(), ServerError> {
    let Some(expected) = config.service_token.as_deref() else {
        if required {
            return Err(ServerError::Forbidden(
                "Endpoint disabled (no SERVICE_TOKEN configured)".into(),
            ));
        }
        return Ok(());
    };

    let token = bearer_token(headers).unwrap_or("");

    use subtle::ConstantTimeEq;
    let token_bytes = token.as_bytes();
    let expected_bytes = expected.as_bytes();
    if token_bytes.len() != expected_bytes.len()
        || token_bytes.ct_eq(expected_bytes).unwrap_u8() != 1
    {
        return Err(ServerError::Forbidden("Invalid service token".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use scriptshop_shared::AuthProvider;

    fn headers(auth: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert("authorization", HeaderValue::from_str(auth).unwrap());
        map
    }

    #[test]
    fn remote_user_maps_metadata() {
        let json = serde_json::json!({
            "id": "6b0f1c2e-0000-4000-8000-000000000001",
            "email": "gamer@example.com",
            "app_metadata": { "provider": "discord" },
            "user_metadata": { "provider_id": "1234567890", "full_name": "Gamer" },
            "aud": "authenticated"
        });
        let user: AuthUser = serde_json::from_value(json).unwrap();
        let identity = Identity::from(user);
        assert_eq!(identity.provider, AuthProvider::Discord);
        assert_eq!(identity.provider_id.as_deref(), Some("1234567890"));
        assert_eq!(identity.default_username(), "Gamer");
    }

    #[test]
    fn remote_user_without_metadata_is_email_account() {
        let json = serde_json::json!({
            "id": "6b0f1c2e-0000-4000-8000-000000000002",
            "email": "plain@example.com"
        });
        let identity = Identity::from(serde_json::from_value::<AuthUser>(json).unwrap());
        assert_eq!(identity.provider, AuthProvider::Email);
        assert_eq!(identity.default_username(), "plain");
    }

    #[tokio::test]
    async fn static_provider_resolves_known_tokens() {
        let who = Identity {
            id: Uuid::new_v4(),
            email: Some("dev@example.com".into()),
            provider: AuthProvider::Email,
            provider_id: None,
            display_name: None,
        };
        let provider = IdentityProvider::Static(StaticIdentities::new(HashMap::from([(
            "dev-token".to_string(),
            who.clone(),
        )])));

        assert_eq!(
            authenticate(&provider, &headers("Bearer dev-token")).await.unwrap(),
            who
        );
        assert!(matches!(
            authenticate(&provider, &headers("Bearer other")).await,
            Err(ServerError::Unauthorized)
        ));
        assert!(matches!(
            authenticate(&provider, &HeaderMap::new()).await,
            Err(ServerError::Unauthorized)
        ));
        assert_eq!(provider.lookup_user(who.id).await.unwrap(), Some(who));
    }

    #[test]
    fn service_token_checks() {
        let open = ServerConfig::default();
        assert!(verify_service_token(&HeaderMap::new(), &open, false).is_ok());
        assert!(verify_service_token(&HeaderMap::new(), &open, true).is_err());

        let locked = ServerConfig {
            service_token: Some("cron-secret".into()),
            ..ServerConfig::default()
        };
        assert!(verify_service_token(&headers("Bearer cron-secret"), &locked, false).is_ok());
        assert!(verify_service_token(&headers("Bearer cron-secreT"), &locked, false).is_err());
        assert!(verify_service_token(&HeaderMap::new(), &locked, false).is_err());
    }
}
