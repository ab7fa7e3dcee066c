//! # scriptshop-client
//!
//! Client library behind the storefront UI: the session context, the
//! identity service client, the typed storefront API client and local
//! dismissed-ad memory.

pub mod auth;
pub mod client;
pub mod dismissed;
pub mod error;
pub mod session;
pub mod state;

pub use auth::{AuthClient, SignUpOutcome};
pub use client::{ItemFilter, StoreClient};
pub use dismissed::DismissedAds;
pub use error::{ClientError, Result};
pub use session::{Session, SessionContext, SessionSubscription};
pub use state::{AppState, ClientConfig};

use tracing_subscriber::{fmt, EnvFilter};

/// Install the log subscriber for an embedding application.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("scriptshop_client=debug,warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
