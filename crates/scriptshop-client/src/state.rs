//! Application state shared across the storefront UI.
//!
//! [`AppState`] is built once at startup and torn down on exit. It owns the
//! process-wide [`SessionContext`] and the clients that read or write it.

use tracing::info;

use crate::auth::AuthClient;
use crate::client::StoreClient;
use crate::dismissed::DismissedAds;
use crate::error::Result;
use crate::session::SessionContext;

/// Where the client talks to.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Storefront API base, e.g. `http://localhost:8080`.
    pub api_url: String,
    /// Identity service base.
    pub auth_url: String,
    pub anon_key: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080".into(),
            auth_url: "http://localhost:9999".into(),
            anon_key: None,
        }
    }
}

impl ClientConfig {
    /// `SCRIPTSHOP_API_URL`, `SCRIPTSHOP_AUTH_URL`, `SCRIPTSHOP_ANON_KEY`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("SCRIPTSHOP_API_URL") {
            config.api_url = url;
        }
        if let Ok(url) = std::env::var("SCRIPTSHOP_AUTH_URL") {
            config.auth_url = url;
        }
        config.anon_key = std::env::var("SCRIPTSHOP_ANON_KEY")
            .ok()
            .filter(|k| !k.is_empty());
        config
    }
}

pub struct AppState {
    pub session: SessionContext,
    pub auth: AuthClient,
    pub store: StoreClient,
    pub dismissed_ads: DismissedAds,
}

impl AppState {
    pub fn init(config: &ClientConfig, dismissed_ads: DismissedAds) -> Result<Self> {
        let session = SessionContext::new();
        let auth = AuthClient::new(&config.auth_url, config.anon_key.clone(), session.clone())?;
        let store = StoreClient::new(&config.api_url, session.clone())?;
        info!(api = %config.api_url, "Client state initialised");
        Ok(Self {
            session,
            auth,
            store,
            dismissed_ads,
        })
    }

    pub fn shutdown(self) {
        self.session.shutdown();
        info!("Client state shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_and_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let dismissed = DismissedAds::load(&dir.path().join("d.json")).unwrap();
        let state = AppState::init(&ClientConfig::default(), dismissed).unwrap();
        let session = state.session.clone();
        let _listener = session.subscribe().unwrap();

        state.shutdown();
        assert!(session.is_closed());
        assert!(session.subscribe().is_err());
    }
}
