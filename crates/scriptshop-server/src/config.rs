//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development. Outbound integrations (payment
//! credentials, chat bot, email relay, identity service) stay disabled until
//! their variables are set.

use std::net::SocketAddr;
use std::path::PathBuf;

use scriptshop_shared::constants::{
    DEFAULT_DEPOSIT_ADDRESS, DEFAULT_HTTP_PORT, DEFAULT_PAYMENT_CURRENCY, MAX_UPLOAD_SIZE,
    SIGNED_URL_TTL_SECS, STORE_NAME,
};

/// Identity service endpoints and keys.
#[derive(Clone, Default)]
pub struct AuthSettings {
    /// Base URL of the identity API, e.g. `https://project.example/auth/v1`.
    /// Env: `AUTH_URL`
    pub url: Option<String>,
    /// Env: `AUTH_ANON_KEY`
    pub anon_key: Option<String>,
    /// Privileged key used for user lookups by id.
    /// Env: `AUTH_SERVICE_KEY`
    pub service_key: Option<String>,
    /// JSON file mapping bearer tokens to identities, used when `url` is unset.
    /// Env: `DEV_IDENTITIES_FILE`
    pub dev_identities_file: Option<PathBuf>,
}

/// Manual crypto checkout settings.
#[derive(Clone)]
pub struct PaymentSettings {
    /// Env: `PAYMENT_MERCHANT_ID`
    pub merchant_id: Option<String>,
    /// Env: `PAYMENT_API_SECRET`
    pub api_secret: Option<String>,
    /// Env: `PAYMENT_DEPOSIT_ADDRESS`
    pub deposit_address: String,
    /// Env: `PAYMENT_CURRENCY`
    pub currency: String,
    /// Env: `PAYMENT_CHECKOUT_URL`
    pub checkout_url: String,
}

impl PaymentSettings {
    /// Sessions are refused until both merchant credentials are present.
    pub fn has_credentials(&self) -> bool {
        self.merchant_id.is_some() && self.api_secret.is_some()
    }
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            merchant_id: None,
            api_secret: None,
            deposit_address: DEFAULT_DEPOSIT_ADDRESS.to_string(),
            currency: DEFAULT_PAYMENT_CURRENCY.to_string(),
            checkout_url: "https://pay.binance.com/checkout".to_string(),
        }
    }
}

/// Chat bot, email relay and message branding.
#[derive(Clone)]
pub struct NotifySettings {
    /// Env: `DISCORD_BOT_TOKEN`
    pub discord_bot_token: Option<String>,
    /// Env: `DISCORD_API_URL`
    pub discord_api_url: String,
    /// Env: `EMAIL_API_KEY`
    pub email_api_key: Option<String>,
    /// Env: `EMAIL_API_URL`
    pub email_api_url: String,
    /// Env: `EMAIL_FROM`
    pub email_from: String,
    /// Env: `STORE_NAME`
    pub store_name: String,
    /// Env: `STORE_BOT_NAME`
    pub bot_name: String,
    /// Env: `STORE_BOT_AVATAR_URL`
    pub bot_avatar_url: Option<String>,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            discord_bot_token: None,
            discord_api_url: "https://discord.com/api/v10".to_string(),
            email_api_key: None,
            email_api_url: "https://api.resend.com".to_string(),
            email_from: format!("{STORE_NAME} <onboarding@resend.dev>"),
            store_name: STORE_NAME.to_string(),
            bot_name: "Store Bot".to_string(),
            bot_avatar_url: None,
        }
    }
}

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `./scriptshop.db`
    pub database_path: PathBuf,

    /// Root directory of the bucket store.
    /// Env: `STORAGE_PATH`
    /// Default: `./storage`
    pub storage_path: PathBuf,

    /// Externally visible origin used to build object and signed URLs.
    /// Env: `PUBLIC_BASE_URL`
    pub public_base_url: String,

    /// Maximum size of one uploaded file in bytes.
    /// Env: `MAX_UPLOAD_SIZE`
    pub max_upload_size: usize,

    /// Keyed-hash key for signed download links (hex-encoded, 64 chars).
    /// Env: `STORAGE_SIGNING_KEY`
    /// Default: random per process, so links die with a restart.
    pub signing_key: [u8; 32],

    /// Env: `SIGNED_URL_TTL_SECS`
    pub signed_url_ttl_secs: u64,

    /// Lower-cased emails of administrator accounts.
    /// Env: `ADMIN_EMAILS` (comma separated)
    pub admin_emails: Vec<String>,

    /// Bearer token for scheduler and internal function calls.
    /// Env: `SERVICE_TOKEN`
    pub service_token: Option<String>,

    pub auth: AuthSettings,
    pub payment: PaymentSettings,
    pub notify: NotifySettings,

    /// Env: `AD_CLEANUP_INTERVAL_SECS` (0 disables the in-process job)
    pub ad_cleanup_interval_secs: u64,

    /// Expiry applied to ads created without one.
    /// Env: `AD_DEFAULT_TTL_DAYS`
    pub ad_default_ttl_days: i64,

    /// Env: `RATE_LIMIT_PER_SEC`
    pub rate_limit_per_sec: f64,

    /// Env: `RATE_LIMIT_BURST`
    pub rate_limit_burst: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from("./scriptshop.db"),
            storage_path: PathBuf::from("./storage"),
            public_base_url: format!("http://localhost:{DEFAULT_HTTP_PORT}"),
            max_upload_size: MAX_UPLOAD_SIZE,
            signing_key: rand::random(),
            signed_url_ttl_secs: SIGNED_URL_TTL_SECS,
            admin_emails: Vec::new(),
            service_token: None,
            auth: AuthSettings::default(),
            payment: PaymentSettings::default(),
            notify: NotifySettings::default(),
            ad_cleanup_interval_secs: 3600,
            ad_default_ttl_days: 30,
            rate_limit_per_sec: 10.0,
            rate_limit_burst: 30.0,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(addr) = env_var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = env_var("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }
        if let Some(path) = env_var("STORAGE_PATH") {
            config.storage_path = PathBuf::from(path);
        }
        if let Some(url) = env_var("PUBLIC_BASE_URL") {
            config.public_base_url = url.trim_end_matches('/').to_string();
        }

        parse_into("MAX_UPLOAD_SIZE", &mut config.max_upload_size);
        parse_into("SIGNED_URL_TTL_SECS", &mut config.signed_url_ttl_secs);
        parse_into("AD_CLEANUP_INTERVAL_SECS", &mut config.ad_cleanup_interval_secs);
        parse_into("AD_DEFAULT_TTL_DAYS", &mut config.ad_default_ttl_days);
        parse_into("RATE_LIMIT_PER_SEC", &mut config.rate_limit_per_sec);
        parse_into("RATE_LIMIT_BURST", &mut config.rate_limit_burst);

        match env_var("STORAGE_SIGNING_KEY") {
            Some(hex_key) => match parse_hex_key(&hex_key) {
                Ok(key) => config.signing_key = key,
                Err(e) => {
                    tracing::warn!(error = %e, "Invalid STORAGE_SIGNING_KEY, using a random key");
                }
            },
            None => {
                tracing::warn!("STORAGE_SIGNING_KEY not set, signed links will not survive a restart");
            }
        }

        if let Some(list) = env_var("ADMIN_EMAILS") {
            config.admin_emails = parse_email_list(&list);
        }
        config.service_token = env_var("SERVICE_TOKEN");

        config.auth = AuthSettings {
            url: env_var("AUTH_URL").map(|u| u.trim_end_matches('/').to_string()),
            anon_key: env_var("AUTH_ANON_KEY"),
            service_key: env_var("AUTH_SERVICE_KEY"),
            dev_identities_file: env_var("DEV_IDENTITIES_FILE").map(PathBuf::from),
        };

        config.payment.merchant_id = env_var("PAYMENT_MERCHANT_ID");
        config.payment.api_secret = env_var("PAYMENT_API_SECRET");
        if let Some(address) = env_var("PAYMENT_DEPOSIT_ADDRESS") {
            config.payment.deposit_address = address;
        }
        if let Some(currency) = env_var("PAYMENT_CURRENCY") {
            config.payment.currency = currency;
        }
        if let Some(url) = env_var("PAYMENT_CHECKOUT_URL") {
            config.payment.checkout_url = url;
        }

        config.notify.discord_bot_token = env_var("DISCORD_BOT_TOKEN");
        if let Some(url) = env_var("DISCORD_API_URL") {
            config.notify.discord_api_url = url.trim_end_matches('/').to_string();
        }
        config.notify.email_api_key = env_var("EMAIL_API_KEY");
        if let Some(url) = env_var("EMAIL_API_URL") {
            config.notify.email_api_url = url.trim_end_matches('/').to_string();
        }
        if let Some(from) = env_var("EMAIL_FROM") {
            config.notify.email_from = from;
        }
        if let Some(name) = env_var("STORE_NAME") {
            config.notify.store_name = name;
        }
        if let Some(name) = env_var("STORE_BOT_NAME") {
            config.notify.bot_name = name;
        }
        config.notify.bot_avatar_url = env_var("STORE_BOT_AVATAR_URL");

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }

    pub fn is_admin_email(&self, email: Option<&str>) -> bool {
        email
            .map(|e| e.trim().to_ascii_lowercase())
            .is_some_and(|e| self.admin_emails.iter().any(|a| *a == e))
    }
}

/// Non-empty, trimmed value of an environment variable.
fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_into<T: std::str::FromStr>(name: &str, slot: &mut T) {
    if let Some(raw) = env_var(name) {
        match raw.parse::<T>() {
            Ok(value) => *slot = value,
            Err(_) => tracing::warn!(variable = name, value = %raw, "Invalid value, using default"),
        }
    }
}

fn parse_email_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|e| e.trim().to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

/// Parse a 64-character hex string into a 32-byte key.
fn parse_hex_key(hex: &str) -> Result<[u8; 32], String> {
    let hex = hex.trim();
    if hex.len() != 64 {
        return Err(format!("expected 64 hex chars, got {}", hex.len()));
    }
    let bytes = hex::decode(hex).map_err(|e| format!("invalid hex: {e}"))?;
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}
