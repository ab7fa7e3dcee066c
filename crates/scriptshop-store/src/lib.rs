//! # scriptshop-store
//!
//! Relational storage for the storefront, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle wrapping a
//! `rusqlite::Connection` with typed helpers per table. Every write is a
//! single statement; nothing here opens a multi-row transaction.

pub mod ads;
pub mod categories;
pub mod database;
pub mod downloads;
pub mod favorites;
pub mod items;
pub mod migrations;
pub mod models;
pub mod payments;
pub mod profiles;
pub mod ratings;

mod convert;
mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;

#[cfg(test)]
pub(crate) mod testutil {
    use crate::{Database, NewItem};

    pub fn seeded_db() -> Database {
        let db = Database::open_in_memory().expect("in-memory database");
        db.seed_categories().expect("seed categories");
        db
    }

    pub fn new_item(name: &str, price: f64) -> NewItem {
        NewItem {
            name: name.to_string(),
            description: format!("{name} for your server"),
            price,
            category_id: None,
            image_url: None,
            file_url: format!(
                "http://localhost:8080/storage/v1/object/public/item-files/{}.zip",
                name.to_lowercase().replace(' ', "-")
            ),
            created_by: None,
        }
    }
}
