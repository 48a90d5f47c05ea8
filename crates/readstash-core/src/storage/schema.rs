//! SQLite schema for the bookmark store
//!
//! Three logical relations: bookmarks, their optional article bodies, and
//! the id set the remote source most recently reported. Labels and authors
//! are ordered child tables rather than delimiter-joined columns, so a
//! label containing the join character stays representable and label
//! matching is plain string equality.

use rusqlite::{Connection, Result};

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- Bookmarks, one row per remote/local bookmark
        CREATE TABLE IF NOT EXISTS bookmarks (
            id TEXT PRIMARY KEY,
            url TEXT NOT NULL,
            title TEXT NOT NULL,
            site_name TEXT NOT NULL,
            type TEXT NOT NULL,
            state INTEGER NOT NULL,
            is_marked INTEGER NOT NULL DEFAULT 0,
            is_archived INTEGER NOT NULL DEFAULT 0,
            read_progress INTEGER NOT NULL DEFAULT 0,
            has_article INTEGER NOT NULL DEFAULT 0,
            lang TEXT,
            word_count INTEGER,
            reading_time INTEGER,
            description TEXT,
            icon_src TEXT,
            image_src TEXT,
            thumbnail_src TEXT,
            created INTEGER NOT NULL,
            updated INTEGER NOT NULL
        );

        -- Extracted article bodies (at most one per bookmark)
        CREATE TABLE IF NOT EXISTS article_content (
            bookmark_id TEXT PRIMARY KEY,
            content TEXT NOT NULL,
            FOREIGN KEY (bookmark_id) REFERENCES bookmarks(id) ON DELETE CASCADE
        );

        -- Labels, ordered and duplicate-free per bookmark
        CREATE TABLE IF NOT EXISTS bookmark_labels (
            bookmark_id TEXT NOT NULL,
            label TEXT NOT NULL,
            position INTEGER NOT NULL,
            PRIMARY KEY (bookmark_id, label),
            FOREIGN KEY (bookmark_id) REFERENCES bookmarks(id) ON DELETE CASCADE
        );

        -- Authors, ordered per bookmark (one-to-many)
        CREATE TABLE IF NOT EXISTS bookmark_authors (
            bookmark_id TEXT NOT NULL,
            author TEXT NOT NULL,
            position INTEGER NOT NULL,
            PRIMARY KEY (bookmark_id, position),
            FOREIGN KEY (bookmark_id) REFERENCES bookmarks(id) ON DELETE CASCADE
        );

        -- Every id the remote source currently reports;
        -- fully replaced on each sync cycle
        CREATE TABLE IF NOT EXISTS remote_bookmark_ids (
            id TEXT PRIMARY KEY
        );

        -- Indexes for common query patterns

        -- Default list ordering
        CREATE INDEX IF NOT EXISTS idx_bookmarks_created ON bookmarks(created);

        -- Most-recently-changed lookup
        CREATE INDEX IF NOT EXISTS idx_bookmarks_updated ON bookmarks(updated);

        -- Filter columns
        CREATE INDEX IF NOT EXISTS idx_bookmarks_state ON bookmarks(state);
        CREATE INDEX IF NOT EXISTS idx_bookmarks_type ON bookmarks(type);

        -- Label lookups across bookmarks
        CREATE INDEX IF NOT EXISTS idx_bookmark_labels_label ON bookmark_labels(label);
        "#,
    )?;

    // Set schema version
    conn.execute(
        "INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<Option<i32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_info WHERE key = 'version'")?;
    let result: Result<String> = stmt.query_row([], |row| row.get(0));

    match result {
        Ok(version_str) => Ok(version_str.parse().ok()),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Check if schema needs initialization or migration
pub fn needs_init(conn: &Connection) -> bool {
    let table_exists: bool = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_info'")
        .and_then(|mut stmt| stmt.exists([]))
        .unwrap_or(false);

    if !table_exists {
        return true;
    }

    match get_schema_version(conn) {
        Ok(Some(v)) => v < SCHEMA_VERSION,
        _ => true,
    }
}
