use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use scriptshop_shared::constants::{MAX_RATING, MIN_RATING};

use crate::convert::{ts, ts_at, uuid_at};
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Rating, RatingStats};

impl Database {
    /// Insert or replace the user's score for an item, then refresh the
    /// item's cached average.
    pub fn upsert_rating(&self, user_id: Uuid, item_id: Uuid, rating: u8) -> Result<RatingStats> {
        if !(MIN_RATING..=MAX_RATING).contains(&rating) {
            return Err(StoreError::Validation(format!(
                "rating must be between {MIN_RATING} and {MAX_RATING}"
            )));
        }
        // Surface a clean NotFound rather than a foreign-key failure.
        self.get_item(item_id)?;

        let now = ts(&Utc::now());
        self.conn().execute(
            "INSERT INTO ratings (user_id, item_id, rating, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(user_id, item_id) DO UPDATE SET
                 rating = excluded.rating,
                 updated_at = excluded.updated_at",
            params![user_id.to_string(), item_id.to_string(), rating, now],
        )?;

        let stats = self.rating_stats(item_id)?;
        self.conn().execute(
            "UPDATE items SET rating = ?1 WHERE id = ?2",
            params![stats.average, item_id.to_string()],
        )?;
        tracing::debug!(item = %item_id, average = stats.average, count = stats.count, "rating refreshed");
        Ok(stats)
    }

    pub fn user_rating(&self, user_id: Uuid, item_id: Uuid) -> Result<Option<Rating>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT user_id, item_id, rating, created_at, updated_at FROM ratings
                 WHERE user_id = ?1 AND item_id = ?2",
                params![user_id.to_string(), item_id.to_string()],
                |row| {
                    Ok(Rating {
                        user_id: uuid_at(row, 0)?,
                        item_id: uuid_at(row, 1)?,
                        rating: row.get(2)?,
                        created_at: ts_at(row, 3)?,
                        updated_at: ts_at(row, 4)?,
                    })
                },
            )
            .optional()?)
    }

    /// Average and count over the item's rating rows; zero when unrated.
    pub fn rating_stats(&self, item_id: Uuid) -> Result<RatingStats> {
        let (average, count): (Option<f64>, i64) = self.conn().query_row(
            "SELECT AVG(rating), COUNT(*) FROM ratings WHERE item_id = ?1",
            params![item_id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(RatingStats {
            average: average.unwrap_or(0.0),
            count: count.max(0) as u64,
        })
    }
}
