use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::convert::{ts, ts_at, uuid_at};
use crate::database::Database;
use crate::error::{not_found, Result, StoreError};
use crate::models::{Ad, NewAd};

const AD_COLUMNS: &str = "id, title, content, image_url, is_active, expires_at, created_at";

impl Database {
    pub fn create_ad(&self, new: &NewAd) -> Result<Ad> {
        if new.title.trim().is_empty() {
            return Err(StoreError::Validation("ad title is required".into()));
        }
        let id = Uuid::new_v4();
        self.conn().execute(
            "INSERT INTO ads (id, title, content, image_url, is_active, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6)",
            params![
                id.to_string(),
                new.title.trim(),
                new.content,
                new.image_url,
                ts(&new.expires_at),
                ts(&Utc::now()),
            ],
        )?;
        self.get_ad(id)
    }

    pub fn get_ad(&self, id: Uuid) -> Result<Ad> {
        self.conn()
            .query_row(
                &format!("SELECT {AD_COLUMNS} FROM ads WHERE id = ?1"),
                params![id.to_string()],
                row_to_ad,
            )
            .map_err(not_found)
    }

    /// Every ad, newest first. Admin view.
    pub fn list_ads(&self) -> Result<Vec<Ad>> {
        let mut stmt = self
            .conn()
            .prepare(&format!("SELECT {AD_COLUMNS} FROM ads ORDER BY created_at DESC"))?;
        let rows = stmt.query_map([], row_to_ad)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Ads shown to visitors: active and not yet expired at `now`.
    pub fn active_ads(&self, now: DateTime<Utc>) -> Result<Vec<Ad>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {AD_COLUMNS} FROM ads
             WHERE is_active = 1 AND expires_at > ?1
             ORDER BY created_at DESC"
        ))?;
        let rows = stmt.query_map(params![ts(&now)], row_to_ad)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn set_ad_active(&self, id: Uuid, active: bool) -> Result<Ad> {
        let affected = self.conn().execute(
            "UPDATE ads SET is_active = ?1 WHERE id = ?2",
            params![active, id.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_ad(id)
    }

    pub fn delete_ad(&self, id: Uuid) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM ads WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }

    /// Remove every ad whose expiry is strictly before `now`.
    pub fn delete_expired_ads(&self, now: DateTime<Utc>) -> Result<u64> {
        let removed = self
            .conn()
            .execute("DELETE FROM ads WHERE expires_at < ?1", params![ts(&now)])?;
        Ok(removed as u64)
    }
}

fn row_to_ad(row: &rusqlite::Row<'_>) -> rusqlite::Result<Ad> {
    Ok(Ad {
        id: uuid_at(row, 0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        image_url: row.get(3)?,
        is_active: row.get(4)?,
        expires_at: ts_at(row, 5)?,
        created_at: ts_at(row, 6)?,
    })
}
