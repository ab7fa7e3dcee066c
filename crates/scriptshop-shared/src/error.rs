use thiserror::Error;

/// Failure to interpret a value received from storage or the wire.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown category: {0}")]
    Category(String),

    #[error("Unknown payment status: {0}")]
    PaymentStatus(String),

    #[error("Unknown sort order: {0}")]
    SortOrder(String),
}
