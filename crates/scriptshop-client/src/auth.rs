//! Identity service client. Every successful call updates the shared
//! [`SessionContext`].

use std::time::Duration;

use chrono::Utc;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use scriptshop_shared::protocol::AuthUser;
use scriptshop_shared::Identity;

use crate::error::{api_error, ClientError, Result};
use crate::session::{Session, SessionContext};

/// OAuth provider used for chat-platform sign-in.
pub const CHAT_OAUTH_PROVIDER: &str = "discord";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    user: AuthUser,
}

/// Sign-up answers with a session, or with just the user when the address
/// still has to be confirmed.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(TokenResponse),
    Pending(AuthUser),
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct SignUpBody<'a> {
    email: &'a str,
    password: &'a str,
    data: SignUpData<'a>,
}

#[derive(Serialize)]
struct SignUpData<'a> {
    username: &'a str,
}

/// Outcome of [`AuthClient::sign_up`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    SignedIn(Session),
    ConfirmationRequired(Identity),
}

pub struct AuthClient {
    http: reqwest::Client,
    auth_url: String,
    anon_key: Option<String>,
    session: SessionContext,
}

impl AuthClient {
    pub fn new(auth_url: &str, anon_key: Option<String>, session: SessionContext) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            http,
            auth_url: auth_url.trim_end_matches('/').to_string(),
            anon_key,
            session,
        })
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, format!("{}{}", self.auth_url, path));
        match &self.anon_key {
            Some(key) => builder.header("apikey", key),
            None => builder,
        }
    }

    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        let response = self
            .request(reqwest::Method::POST, "/token?grant_type=password")
            .json(&Credentials { email, password })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        let token: TokenResponse = response.json().await?;
        let session = session_from_token(token);
        self.session.set(Some(session.clone()))?;
        info!(user = %session.identity.id, "Signed in with password");
        Ok(session)
    }

    pub async fn sign_up(&self, email: &str, password: &str, username: &str) -> Result<SignUpOutcome> {
        let response = self
            .request(reqwest::Method::POST, "/signup")
            .json(&SignUpBody {
                email,
                password,
                data: SignUpData { username },
            })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        match response.json::<SignUpResponse>().await? {
            SignUpResponse::Session(token) => {
                let session = session_from_token(token);
                self.session.set(Some(session.clone()))?;
                info!(user = %session.identity.id, "Signed up");
                Ok(SignUpOutcome::SignedIn(session))
            }
            SignUpResponse::Pending(user) => {
                info!(user = %user.id, "Signed up, confirmation pending");
                Ok(SignUpOutcome::ConfirmationRequired(user.into()))
            }
        }
    }

    /// Revoke the session remotely and clear it locally. The local session
    /// is cleared even when the remote call fails.
    pub async fn sign_out(&self) -> Result<()> {
        let Some(token) = self.session.access_token() else {
            return Ok(());
        };
        let remote = self
            .request(reqwest::Method::POST, "/logout")
            .bearer_auth(&token)
            .send()
            .await;
        self.session.set(None)?;

        let response = remote?;
        if !response.status().is_success() {
            let err = api_error(response).await;
            warn!(error = %err, "Remote sign-out failed");
            return Err(err);
        }
        info!("Signed out");
        Ok(())
    }

    /// Browser URL that starts chat-platform OAuth and comes back to
    /// `redirect_to` with the tokens in the fragment.
    pub fn oauth_authorize_url(&self, redirect_to: &str) -> Result<String> {
        let url = Url::parse_with_params(
            &format!("{}/authorize", self.auth_url),
            [("provider", CHAT_OAUTH_PROVIDER), ("redirect_to", redirect_to)],
        )
        .map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        Ok(url.into())
    }

    /// Finish an OAuth round trip: resolve the returned access token to an
    /// identity and install the session.
    pub async fn complete_oauth(
        &self,
        access_token: &str,
        refresh_token: Option<String>,
        expires_in: Option<i64>,
    ) -> Result<Session> {
        let response = self
            .request(reqwest::Method::GET, "/user")
            .bearer_auth(access_token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        let user: AuthUser = response.json().await?;
        let session = session_from_token(TokenResponse {
            access_token: access_token.to_string(),
            refresh_token,
            expires_in,
            user,
        });
        self.session.set(Some(session.clone()))?;
        info!(user = %session.identity.id, provider = %session.identity.provider, "Signed in with OAuth");
        Ok(session)
    }
}

fn session_from_token(token: TokenResponse) -> Session {
    Session {
        expires_at: token
            .expires_in
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs)),
        access_token: token.access_token,
        refresh_token: token.refresh_token,
        identity: token.user.into(),
    }
}
