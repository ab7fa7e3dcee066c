use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx answer; `message` comes from the `{"error": ...}` body when
    /// there is one.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Not signed in")]
    NotSignedIn,

    #[error("Session context has been shut down")]
    SessionClosed,
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Turn an error response into [`ClientError::Api`]. Understands the store's
/// `{"error"}` body and the identity service's `msg`/`error_description`.
pub(crate) async fn api_error(response: reqwest::Response) -> ClientError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&text)
        .ok()
        .and_then(|body| {
            ["error_description", "msg", "message", "error"]
                .iter()
                .find_map(|key| body.get(*key).and_then(|v| v.as_str()).map(str::to_string))
        })
        .unwrap_or_else(|| if text.is_empty() { format!("HTTP {status}") } else { text });
    ClientError::Api { status, message }
}
