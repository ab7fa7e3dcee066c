use chrono::Utc;
use rusqlite::params;
use uuid::Uuid;

use crate::convert::{ts, ts_at, uuid_at};
use crate::database::Database;
use crate::error::Result;
use crate::items::{item_from_row, ITEM_COLUMNS};
use crate::models::DownloadEntry;

impl Database {
    /// Append one row to the user's download history.
    pub fn record_download(&self, user_id: Uuid, item_id: Uuid) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.conn().execute(
            "INSERT INTO downloads (id, user_id, item_id, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                id.to_string(),
                user_id.to_string(),
                item_id.to_string(),
                ts(&Utc::now())
            ],
        )?;
        Ok(id)
    }

    pub fn recent_downloads(&self, user_id: Uuid, limit: u32) -> Result<Vec<DownloadEntry>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT d.id, d.created_at, {ITEM_COLUMNS} FROM downloads d
             JOIN items i ON i.id = d.item_id
             LEFT JOIN categories c ON c.id = i.category_id
             WHERE d.user_id = ?1
             ORDER BY d.created_at DESC
             LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![user_id.to_string(), limit], |row| {
            Ok(DownloadEntry {
                id: uuid_at(row, 0)?,
                downloaded_at: ts_at(row, 1)?,
                item: item_from_row(row, 2)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }
}
