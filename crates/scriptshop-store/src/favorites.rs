use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::convert::{ts, ts_at};
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::items::{item_from_row, ITEM_COLUMNS};
use crate::models::FavoriteEntry;

impl Database {
    /// Flip the favorite flag for the pair and return the new state.
    pub fn toggle_favorite(&self, user_id: Uuid, item_id: Uuid) -> Result<bool> {
        let removed = self.conn().execute(
            "DELETE FROM favorites WHERE user_id = ?1 AND item_id = ?2",
            params![user_id.to_string(), item_id.to_string()],
        )?;
        if removed > 0 {
            return Ok(false);
        }

        self.conn()
            .execute(
                "INSERT INTO favorites (id, user_id, item_id, created_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id, item_id) DO NOTHING",
                params![
                    Uuid::new_v4().to_string(),
                    user_id.to_string(),
                    item_id.to_string(),
                    ts(&Utc::now())
                ],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    StoreError::NotFound
                }
                other => StoreError::Sqlite(other),
            })?;
        Ok(true)
    }

    pub fn is_favorite(&self, user_id: Uuid, item_id: Uuid) -> Result<bool> {
        let found: Option<i64> = self
            .conn()
            .query_row(
                "SELECT 1 FROM favorites WHERE user_id = ?1 AND item_id = ?2",
                params![user_id.to_string(), item_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// The user's favorites, most recently added first.
    pub fn list_favorites(&self, user_id: Uuid) -> Result<Vec<FavoriteEntry>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT f.created_at, {ITEM_COLUMNS} FROM favorites f
             JOIN items i ON i.id = f.item_id
             LEFT JOIN categories c ON c.id = i.category_id
             WHERE f.user_id = ?1
             ORDER BY f.created_at DESC"
        ))?;
        let rows = stmt.query_map(params![user_id.to_string()], |row| {
            Ok(FavoriteEntry {
                favorited_at: ts_at(row, 0)?,
                item: item_from_row(row, 1)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{new_item, seeded_db};

    #[test]
    fn toggle_twice_restores_state() {
        let db = seeded_db();
        let item = db.create_item(&new_item("Fav", 0.0)).unwrap();
        let user = Uuid::new_v4();

        assert!(!db.is_favorite(user, item.id).unwrap());
        assert!(db.toggle_favorite(user, item.id).unwrap());
        assert!(db.is_favorite(user, item.id).unwrap());
        assert!(!db.toggle_favorite(user, item.id).unwrap());
        assert!(!db.is_favorite(user, item.id).unwrap());
    }

    #[test]
    fn list_favorites_joins_items() {
        let db = seeded_db();
        let a = db.create_item(&new_item("A", 0.0)).unwrap();
        let b = db.create_item(&new_item("B", 1.0)).unwrap();
        let user = Uuid::new_v4();

        db.toggle_favorite(user, a.id).unwrap();
        db.toggle_favorite(user, b.id).unwrap();
        db.toggle_favorite(Uuid::new_v4(), a.id).unwrap();

        let favorites = db.list_favorites(user).unwrap();
        assert_eq!(favorites.len(), 2);
        assert_eq!(favorites[0].item.id, b.id);
        assert_eq!(favorites[1].item.name, "A");
    }

    #[test]
    fn favoriting_unknown_item_is_not_found() {
        let db = seeded_db();
        assert!(matches!(
            db.toggle_favorite(Uuid::new_v4(), Uuid::new_v4()),
            Err(StoreError::NotFound)
        ));
    }
}
