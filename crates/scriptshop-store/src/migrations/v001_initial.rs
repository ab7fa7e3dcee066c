//! v001 -- Initial schema creation.
//!
//! Creates the storefront tables: `categories`, `items`, `profiles`,
//! `payments`, `favorites`, `ratings`, `downloads` and `ads`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Categories (fixed set, seeded idempotently)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS categories (
    id          TEXT PRIMARY KEY NOT NULL,    -- UUID v4
    name        TEXT NOT NULL UNIQUE,         -- SCRIPTS | CLOTHES | YMAP
    description TEXT NOT NULL DEFAULT ''
);

-- ----------------------------------------------------------------
-- Items
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS items (
    id          TEXT PRIMARY KEY NOT NULL,    -- UUID v4
    name        TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    price       REAL NOT NULL DEFAULT 0 CHECK (price >= 0),
    category_id TEXT,                         -- nullable FK -> categories(id)
    image_url   TEXT,
    file_url    TEXT NOT NULL,
    downloads   INTEGER NOT NULL DEFAULT 0,
    rating      REAL NOT NULL DEFAULT 0,
    created_by  TEXT,                         -- identity id of the uploader
    created_at  TEXT NOT NULL,                -- RFC-3339 UTC

    FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_items_created_at ON items(created_at DESC);

-- ----------------------------------------------------------------
-- Profiles (mirror of identity-service accounts)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS profiles (
    id                  TEXT PRIMARY KEY NOT NULL,  -- identity id
    username            TEXT NOT NULL,
    discord_webhook_url TEXT,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Payments
--
-- No uniqueness on (user_id, item_id, completed): the purchase check is
-- performed at read time only.
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS payments (
    id              TEXT PRIMARY KEY NOT NULL,
    user_id         TEXT NOT NULL,
    item_id         TEXT NOT NULL,
    amount          REAL NOT NULL,
    currency        TEXT NOT NULL,
    status          TEXT NOT NULL DEFAULT 'pending'
                    CHECK (status IN ('pending', 'completed', 'failed')),
    order_id        TEXT NOT NULL,
    payment_url     TEXT NOT NULL,
    deposit_address TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,

    FOREIGN KEY (item_id) REFERENCES items(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_payments_pair ON payments(user_id, item_id, status);

-- ----------------------------------------------------------------
-- Favorites
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS favorites (
    id         TEXT PRIMARY KEY NOT NULL,
    user_id    TEXT NOT NULL,
    item_id    TEXT NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (item_id) REFERENCES items(id) ON DELETE CASCADE
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_favorites_unique ON favorites(user_id, item_id);

-- ----------------------------------------------------------------
-- Ratings (one per user per item)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS ratings (
    user_id    TEXT NOT NULL,
    item_id    TEXT NOT NULL,
    rating     INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    PRIMARY KEY (user_id, item_id),
    FOREIGN KEY (item_id) REFERENCES items(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_ratings_item ON ratings(item_id);

-- ----------------------------------------------------------------
-- Downloads (history log)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS downloads (
    id         TEXT PRIMARY KEY NOT NULL,
    user_id    TEXT NOT NULL,
    item_id    TEXT NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (item_id) REFERENCES items(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_downloads_user ON downloads(user_id, created_at DESC);

-- ----------------------------------------------------------------
-- Ads
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS ads (
    id         TEXT PRIMARY KEY NOT NULL,
    title      TEXT NOT NULL,
    content    TEXT NOT NULL,
    image_url  TEXT,
    is_active  INTEGER NOT NULL DEFAULT 1,    -- boolean 0/1
    expires_at TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ads_expires_at ON ads(expires_at);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
