//! # scriptshop-shared
//!
//! Types shared by the storefront server, store and client: the domain
//! enums, the authenticated [`Identity`](types::Identity) record and the
//! JSON bodies exchanged with the function endpoints.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod records;
pub mod types;

pub use error::ParseError;
pub use types::{AuthProvider, CategoryName, Identity, PaymentStatus, SortOrder};
