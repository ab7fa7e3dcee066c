use rusqlite::params;
use uuid::Uuid;

use scriptshop_shared::CategoryName;

use crate::convert::{parsed_at, uuid_at};
use crate::database::Database;
use crate::error::{not_found, Result};
use crate::models::Category;

impl Database {
    /// Insert every fixed category that is not present yet.
    ///
    /// Conflicts on `name` are ignored, so running this any number of times
    /// leaves exactly one row per category. Returns how many rows were added.
    pub fn seed_categories(&self) -> Result<usize> {
        let mut inserted = 0;
        for name in CategoryName::ALL {
            inserted += self.conn().execute(
                "INSERT INTO categories (id, name, description) VALUES (?1, ?2, ?3)
                 ON CONFLICT(name) DO NOTHING",
                params![Uuid::new_v4().to_string(), name.as_str(), name.description()],
            )?;
        }
        if inserted > 0 {
            tracing::info!(inserted, "seeded categories");
        }
        Ok(inserted)
    }

    pub fn list_categories(&self) -> Result<Vec<Category>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT id, name, description FROM categories ORDER BY name ASC")?;
        let rows = stmt.query_map([], row_to_category)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn get_category(&self, id: Uuid) -> Result<Category> {
        self.conn()
            .query_row(
                "SELECT id, name, description FROM categories WHERE id = ?1",
                params![id.to_string()],
                row_to_category,
            )
            .map_err(not_found)
    }
}

fn row_to_category(row: &rusqlite::Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: uuid_at(row, 0)?,
        name: parsed_at(row, 1)?,
        description: row.get(2)?,
    })
}
