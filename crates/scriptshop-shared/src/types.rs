use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ParseError;

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

/// The fixed set of catalog categories.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum CategoryName {
    Scripts,
    Clothes,
    Ymap,
}

impl CategoryName {
    pub const ALL: [CategoryName; 3] = [Self::Scripts, Self::Clothes, Self::Ymap];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scripts => "SCRIPTS",
            Self::Clothes => "CLOTHES",
            Self::Ymap => "YMAP",
        }
    }

    /// Description written when the category is seeded.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Scripts => "FiveM Scripts and Resources",
            Self::Clothes => "FiveM Clothing and Accessories",
            Self::Ymap => "FiveM Map Files and Locations",
        }
    }
}

impl fmt::Display for CategoryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CategoryName {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SCRIPTS" => Ok(Self::Scripts),
            "CLOTHES" => Ok(Self::Clothes),
            "YMAP" => Ok(Self::Ymap),
            _ => Err(ParseError::Category(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Payments
// ---------------------------------------------------------------------------

/// Lifecycle of a payment row: `pending` → `completed` | `failed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// A completed payment never changes state again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(ParseError::PaymentStatus(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Catalog ordering
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
    #[default]
    Newest,
    Popular,
    Rating,
    PriceLow,
    PriceHigh,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Newest => "newest",
            Self::Popular => "popular",
            Self::Rating => "rating",
            Self::PriceLow => "price-low",
            Self::PriceHigh => "price-high",
        }
    }
}

impl FromStr for SortOrder {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "newest" => Ok(Self::Newest),
            "popular" => Ok(Self::Popular),
            "rating" => Ok(Self::Rating),
            "price-low" => Ok(Self::PriceLow),
            "price-high" => Ok(Self::PriceHigh),
            other => Err(ParseError::SortOrder(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// How an account signed in with the identity service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Discord,
    #[default]
    Email,
    #[serde(other)]
    Other,
}

impl AuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discord => "discord",
            Self::Email => "email",
            Self::Other => "other",
        }
    }

    /// Lenient mapping used for identity-service metadata, where an
    /// absent provider means a password account.
    pub fn from_metadata(value: Option<&str>) -> Self {
        match value {
            Some("discord") => Self::Discord,
            Some("email") | None => Self::Email,
            Some(_) => Self::Other,
        }
    }
}

impl fmt::Display for AuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authenticated account as reported by the identity service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub provider: AuthProvider,
    /// Account id on the chat platform, present for chat-platform sign-ins.
    #[serde(default)]
    pub provider_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl Identity {
    /// Name mirrored into the profile on first sign-in: the metadata name,
    /// else the local part of the email, else a short id.
    pub fn default_username(&self) -> String {
        if let Some(name) = self.display_name.as_deref().filter(|n| !n.trim().is_empty()) {
            return name.trim().to_string();
        }
        if let Some(local) = self
            .email
            .as_deref()
            .and_then(|e| e.split('@').next())
            .filter(|l| !l.is_empty())
        {
            return local.to_string();
        }
        format!("user-{}", &self.id.simple().to_string()[..8])
    }
}
