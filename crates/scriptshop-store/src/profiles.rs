use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use scriptshop_shared::Identity;

use crate::convert::{ts, ts_at, uuid_at};
use crate::database::Database;
use crate::error::{not_found, Result, StoreError};
use crate::models::{Profile, ProfileChanges};

const PROFILE_COLUMNS: &str = "id, username, discord_webhook_url, created_at, updated_at";

impl Database {
    /// Return the profile mirroring `identity`, creating it on first sight.
    pub fn ensure_profile(&self, identity: &Identity) -> Result<Profile> {
        let now = ts(&Utc::now());
        let inserted = self.conn().execute(
            "INSERT INTO profiles (id, username, discord_webhook_url, created_at, updated_at)
             VALUES (?1, ?2, NULL, ?3, ?3)
             ON CONFLICT(id) DO NOTHING",
            params![identity.id.to_string(), identity.default_username(), now],
        )?;
        if inserted > 0 {
            tracing::info!(user = %identity.id, "profile created");
        }
        self.get_profile(identity.id)
    }

    pub fn get_profile(&self, id: Uuid) -> Result<Profile> {
        self.conn()
            .query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ?1"),
                params![id.to_string()],
                row_to_profile,
            )
            .map_err(not_found)
    }

    pub fn find_profile(&self, id: Uuid) -> Result<Option<Profile>> {
        Ok(self
            .conn()
            .query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ?1"),
                params![id.to_string()],
                row_to_profile,
            )
            .optional()?)
    }

    pub fn update_profile(&self, id: Uuid, changes: &ProfileChanges) -> Result<Profile> {
        let mut profile = self.get_profile(id)?;

        if let Some(username) = &changes.username {
            let username = username.trim();
            if username.is_empty() {
                return Err(StoreError::Validation("username cannot be empty".into()));
            }
            profile.username = username.to_string();
        }
        if let Some(webhook) = &changes.discord_webhook_url {
            profile.discord_webhook_url = webhook
                .as_deref()
                .map(str::trim)
                .filter(|w| !w.is_empty())
                .map(str::to_string);
        }

        self.conn().execute(
            "UPDATE profiles SET username = ?1, discord_webhook_url = ?2, updated_at = ?3
             WHERE id = ?4",
            params![
                profile.username,
                profile.discord_webhook_url,
                ts(&Utc::now()),
                id.to_string()
            ],
        )?;
        self.get_profile(id)
    }

    /// Every non-empty webhook URL registered on a profile.
    pub fn webhook_urls(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn().prepare(
            "SELECT discord_webhook_url FROM profiles
             WHERE discord_webhook_url IS NOT NULL AND discord_webhook_url != ''
             ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }
}

fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: uuid_at(row, 0)?,
        username: row.get(1)?,
        discord_webhook_url: row.get(2)?,
        created_at: ts_at(row, 3)?,
        updated_at: ts_at(row, 4)?,
    })
}
