use chrono::Utc;
use rusqlite::params;
use rusqlite::types::Value;
use uuid::Uuid;

use scriptshop_shared::SortOrder;

use crate::convert::{opt_uuid_at, ts, ts_at, uuid_at};
use crate::database::Database;
use crate::error::{not_found, Result, StoreError};
use crate::models::{Item, ItemQuery, NewItem};

/// Column list shared by every item query (aliases: `i` items, `c` categories).
pub(crate) const ITEM_COLUMNS: &str = "i.id, i.name, i.description, i.price, i.category_id, c.name, \
     i.image_url, i.file_url, i.downloads, i.rating, i.created_by, i.created_at";

impl Database {
    pub fn create_item(&self, new: &NewItem) -> Result<Item> {
        if new.name.trim().is_empty() {
            return Err(StoreError::Validation("item name is required".into()));
        }
        if !new.price.is_finite() || new.price < 0.0 {
            return Err(StoreError::Validation(format!("invalid price: {}", new.price)));
        }

        let id = Uuid::new_v4();
        self.conn().execute(
            "INSERT INTO items (id, name, description, price, category_id, image_url, file_url,
                                downloads, rating, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, 0, ?8, ?9)",
            params![
                id.to_string(),
                new.name.trim(),
                new.description,
                new.price,
                new.category_id.map(|c| c.to_string()),
                new.image_url,
                new.file_url,
                new.created_by.map(|u| u.to_string()),
                ts(&Utc::now()),
            ],
        )?;

        tracing::debug!(item = %id, name = %new.name, "item created");
        self.get_item(id)
    }

    pub fn get_item(&self, id: Uuid) -> Result<Item> {
        self.conn()
            .query_row(
                &format!(
                    "SELECT {ITEM_COLUMNS} FROM items i
                     LEFT JOIN categories c ON c.id = i.category_id
                     WHERE i.id = ?1"
                ),
                params![id.to_string()],
                row_to_item,
            )
            .map_err(not_found)
    }

    /// Catalog listing: optional category and case-insensitive substring
    /// search over name and description, then the requested ordering.
    pub fn list_items(&self, query: &ItemQuery) -> Result<Vec<Item>> {
        let mut sql = format!(
            "SELECT {ITEM_COLUMNS} FROM items i LEFT JOIN categories c ON c.id = i.category_id"
        );
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(category) = query.category {
            clauses.push("c.name = ?");
            values.push(Value::Text(category.as_str().to_string()));
        }

        if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            clauses.push(
                "(lower(i.name) LIKE ? ESCAPE '\\' OR lower(i.description) LIKE ? ESCAPE '\\')",
            );
            let pattern = format!("%{}%", escape_like(&search.to_lowercase()));
            values.push(Value::Text(pattern.clone()));
            values.push(Value::Text(pattern));
        }

        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        sql.push_str(" ORDER BY ");
        sql.push_str(order_clause(query.sort));

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(i64::from(limit)));
        }

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(values), row_to_item)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// The `count` most recently published items.
    pub fn featured_items(&self, count: u32) -> Result<Vec<Item>> {
        self.list_items(&ItemQuery {
            sort: SortOrder::Newest,
            limit: Some(count),
            ..ItemQuery::default()
        })
    }

    /// Single-statement increment; concurrent callers never lose updates
    /// to each other inside SQLite.
    pub fn increment_downloads(&self, id: Uuid) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE items SET downloads = downloads + 1 WHERE id = ?1",
            params![id.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    // ON DELETE CASCADE: favorites, ratings, downloads and payments go with it
    pub fn delete_item(&self, id: Uuid) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM items WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }
}

fn order_clause(sort: SortOrder) -> &'static str {
    match sort {
        SortOrder::Newest => "i.created_at DESC",
        SortOrder::Popular => "i.downloads DESC, i.created_at DESC",
        SortOrder::Rating => "i.rating DESC, i.created_at DESC",
        SortOrder::PriceLow => "i.price ASC, i.created_at DESC",
        SortOrder::PriceHigh => "i.price DESC, i.created_at DESC",
    }
}

fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Map a row selected with [`ITEM_COLUMNS`] starting at `offset`.
pub(crate) fn item_from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Item> {
    let category_name: Option<String> = row.get(offset + 5)?;
    Ok(Item {
        id: uuid_at(row, offset)?,
        name: row.get(offset + 1)?,
        description: row.get(offset + 2)?,
        price: row.get(offset + 3)?,
        category_id: opt_uuid_at(row, offset + 4)?,
        category_name: category_name
            .map(|n| {
                n.parse().map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        offset + 5,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })
            })
            .transpose()?,
        image_url: row.get(offset + 6)?,
        file_url: row.get(offset + 7)?,
        downloads: row.get(offset + 8)?,
        rating: row.get(offset + 9)?,
        created_by: opt_uuid_at(row, offset + 10)?,
        created_at: ts_at(row, offset + 11)?,
    })
}

fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<Item> {
    item_from_row(row, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{new_item, seeded_db};
    use scriptshop_shared::CategoryName;

    #[test]
    fn create_and_get_joins_category_name() {
        let db = seeded_db();
        let scripts = db
            .list_categories()
            .unwrap()
            .into_iter()
            .find(|c| c.name == CategoryName::Scripts)
            .unwrap();

        let mut new = new_item("Garage System", 0.0);
        new.category_id = Some(scripts.id);
        let item = db.create_item(&new).unwrap();

        let fetched = db.get_item(item.id).unwrap();
        assert_eq!(fetched.category_name, Some(CategoryName::Scripts));
        assert!(fetched.is_free());
        assert_eq!(fetched.downloads, 0);
    }

    #[test]
    fn rejects_negative_price() {
        let db = seeded_db();
        let err = db.create_item(&new_item("Broken", -1.0)).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn search_matches_name_or_description_case_insensitively() {
        let db = seeded_db();
        db.create_item(&new_item("Police MDT", 1.0)).unwrap();
        let mut other = new_item("Tablet", 2.0);
        other.description = "Works with any police job".into();
        db.create_item(&other).unwrap();
        db.create_item(&new_item("Fuel", 0.0)).unwrap();

        let hits = db
            .list_items(&ItemQuery {
                search: Some("POLICE".into()),
                ..ItemQuery::default()
            })
            .unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn search_treats_wildcards_literally() {
        let db = seeded_db();
        db.create_item(&new_item("100% Drift", 0.0)).unwrap();
        db.create_item(&new_item("Drift", 0.0)).unwrap();

        let hits = db
            .list_items(&ItemQuery {
                search: Some("100%".into()),
                ..ItemQuery::default()
            })
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "100% Drift");
    }

    #[test]
    fn sort_and_category_filter() {
        let db = seeded_db();
        let clothes = db
            .list_categories()
            .unwrap()
            .into_iter()
            .find(|c| c.name == CategoryName::Clothes)
            .unwrap();

        let mut cheap = new_item("Hoodie", 1.0);
        cheap.category_id = Some(clothes.id);
        let mut pricey = new_item("Jacket", 5.0);
        pricey.category_id = Some(clothes.id);
        db.create_item(&cheap).unwrap();
        db.create_item(&pricey).unwrap();
        db.create_item(&new_item("Map", 3.0)).unwrap();

        let high = db
            .list_items(&ItemQuery {
                category: Some(CategoryName::Clothes),
                sort: SortOrder::PriceHigh,
                ..ItemQuery::default()
            })
            .unwrap();
        let names: Vec<_> = high.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Jacket", "Hoodie"]);

        let low = db
            .list_items(&ItemQuery {
                sort: SortOrder::PriceLow,
                limit: Some(1),
                ..ItemQuery::default()
            })
            .unwrap();
        assert_eq!(low[0].name, "Hoodie");
    }

    #[test]
    fn popular_orders_by_download_count() {
        let db = seeded_db();
        let a = db.create_item(&new_item("A", 0.0)).unwrap();
        let b = db.create_item(&new_item("B", 0.0)).unwrap();
        db.increment_downloads(a.id).unwrap();
        db.increment_downloads(a.id).unwrap();
        db.increment_downloads(b.id).unwrap();

        let popular = db
            .list_items(&ItemQuery {
                sort: SortOrder::Popular,
                ..ItemQuery::default()
            })
            .unwrap();
        assert_eq!(popular[0].id, a.id);
        assert_eq!(popular[0].downloads, 2);
    }

    #[test]
    fn increment_unknown_item_is_not_found() {
        let db = seeded_db();
        assert!(matches!(
            db.increment_downloads(Uuid::new_v4()),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn delete_item() {
        let db = seeded_db();
        let item = db.create_item(&new_item("Temp", 0.0)).unwrap();
        assert!(db.delete_item(item.id).unwrap());
        assert!(!db.delete_item(item.id).unwrap());
        assert!(matches!(db.get_item(item.id), Err(StoreError::NotFound)));
    }
}
