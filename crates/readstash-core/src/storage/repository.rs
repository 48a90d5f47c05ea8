//! SQLite read/write operations for the bookmark store
//!
//! Every function runs on the caller's connection. Multi-row writes open
//! their own transaction so a reader can never observe a partial change;
//! single-statement writes rely on SQLite's per-statement atomicity.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql, Transaction};

use crate::models::{
    Bookmark, BookmarkCounts, BookmarkListItem, BookmarkState, BookmarkType, BookmarkWithContent,
};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::query::QueryBuilder;

const BOOKMARK_COLUMNS: &str = "id, url, title, site_name, type, state, is_marked, \
     is_archived, read_progress, has_article, lang, word_count, reading_time, description, \
     icon_src, image_src, thumbnail_src, created, updated";

// ==================== Write paths ====================

/// Insert or wholesale-replace a single bookmark, in one transaction.
pub(crate) fn upsert_bookmark(
    conn: &mut Connection,
    bookmark: &Bookmark,
    content: Option<&str>,
) -> StorageResult<()> {
    let tx = conn.transaction()?;
    insert_bookmark(&tx, bookmark, content)?;
    tx.commit()?;
    Ok(())
}

/// Insert or replace a batch of bookmarks as one transaction.
pub(crate) fn upsert_bookmarks(
    conn: &mut Connection,
    records: &[BookmarkWithContent],
) -> StorageResult<()> {
    let tx = conn.transaction()?;
    for record in records {
        insert_bookmark(&tx, &record.bookmark, record.article_content.as_deref())?;
    }
    tx.commit()?;
    Ok(())
}

/// Merge a freshly fetched remote snapshot into the store.
///
/// One transaction, in this order: replace the remote id set, upsert the
/// fetched records, then delete every bookmark absent from the id set.
/// Removal keys on the id set alone; a sync page may omit unchanged
/// bookmarks while still listing every known id. Returns the number of
/// bookmarks deleted.
pub(crate) fn reconcile(
    conn: &mut Connection,
    remote_ids: &[String],
    records: &[BookmarkWithContent],
) -> StorageResult<usize> {
    let tx = conn.transaction()?;

    tx.execute("DELETE FROM remote_bookmark_ids", [])?;
    {
        let mut stmt = tx.prepare("INSERT OR IGNORE INTO remote_bookmark_ids (id) VALUES (?1)")?;
        for id in remote_ids {
            stmt.execute(params![id])?;
        }
    }

    for record in records {
        insert_bookmark(&tx, &record.bookmark, record.article_content.as_deref())?;
    }

    let deleted = tx.execute(
        "DELETE FROM bookmarks \
         WHERE NOT EXISTS (SELECT 1 FROM remote_bookmark_ids r WHERE r.id = bookmarks.id)",
        [],
    )?;

    tx.commit()?;
    tracing::debug!(upserted = records.len(), deleted, "reconciled remote snapshot");
    Ok(deleted)
}

fn insert_bookmark(
    tx: &Transaction,
    bookmark: &Bookmark,
    content: Option<&str>,
) -> StorageResult<()> {
    // Replace is wholesale: child rows of any previous generation go first.
    tx.execute(
        "DELETE FROM bookmark_labels WHERE bookmark_id = ?1",
        params![bookmark.id],
    )?;
    tx.execute(
        "DELETE FROM bookmark_authors WHERE bookmark_id = ?1",
        params![bookmark.id],
    )?;
    tx.execute(
        "DELETE FROM article_content WHERE bookmark_id = ?1",
        params![bookmark.id],
    )?;

    tx.execute(
        "INSERT OR REPLACE INTO bookmarks \
         (id, url, title, site_name, type, state, is_marked, is_archived, read_progress, \
          has_article, lang, word_count, reading_time, description, icon_src, image_src, \
          thumbnail_src, created, updated) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
        params![
            bookmark.id,
            bookmark.url,
            bookmark.title,
            bookmark.site_name,
            bookmark.kind.as_str(),
            bookmark.state.as_i64(),
            bookmark.is_marked,
            bookmark.is_archived,
            bookmark.read_progress,
            bookmark.has_article,
            bookmark.lang,
            bookmark.word_count,
            bookmark.reading_time,
            bookmark.description,
            bookmark.icon_src,
            bookmark.image_src,
            bookmark.thumbnail_src,
            bookmark.created.timestamp_millis(),
            bookmark.updated.timestamp_millis(),
        ],
    )?;

    insert_labels(tx, &bookmark.id, &bookmark.labels)?;

    for (position, author) in bookmark.authors.iter().enumerate() {
        tx.execute(
            "INSERT INTO bookmark_authors (bookmark_id, author, position) VALUES (?1, ?2, ?3)",
            params![bookmark.id, author, position as i64],
        )?;
    }

    if let Some(content) = content {
        tx.execute(
            "INSERT OR REPLACE INTO article_content (bookmark_id, content) VALUES (?1, ?2)",
            params![bookmark.id, content],
        )?;
    }

    Ok(())
}

fn insert_labels(tx: &Transaction, bookmark_id: &str, labels: &[String]) -> StorageResult<()> {
    let mut stmt = tx.prepare(
        "INSERT OR IGNORE INTO bookmark_labels (bookmark_id, label, position) VALUES (?1, ?2, ?3)",
    )?;
    for (position, label) in labels.iter().enumerate() {
        stmt.execute(params![bookmark_id, label, position as i64])?;
    }
    Ok(())
}

/// Delete a bookmark; labels, authors, and article content cascade.
/// Deleting an id that is already gone is a no-op.
pub(crate) fn delete_bookmark(conn: &Connection, id: &str) -> StorageResult<()> {
    conn.execute("DELETE FROM bookmarks WHERE id = ?1", params![id])?;
    Ok(())
}

pub(crate) fn delete_all(conn: &Connection) -> StorageResult<()> {
    conn.execute("DELETE FROM bookmarks", [])?;
    Ok(())
}

fn update_bookmark_field(
    conn: &Connection,
    id: &str,
    column: &str,
    value: impl ToSql,
) -> StorageResult<()> {
    let changed = conn.execute(
        &format!("UPDATE bookmarks SET {column} = ?1, updated = ?2 WHERE id = ?3"),
        params![value, Utc::now().timestamp_millis(), id],
    )?;
    if changed == 0 {
        return Err(StorageError::BookmarkNotFound { id: id.to_string() });
    }
    Ok(())
}

pub(crate) fn set_favorite(conn: &Connection, id: &str, favorite: bool) -> StorageResult<()> {
    update_bookmark_field(conn, id, "is_marked", favorite)
}

pub(crate) fn set_archived(conn: &Connection, id: &str, archived: bool) -> StorageResult<()> {
    update_bookmark_field(conn, id, "is_archived", archived)
}

pub(crate) fn set_read_progress(conn: &Connection, id: &str, progress: u8) -> StorageResult<()> {
    update_bookmark_field(conn, id, "read_progress", progress.min(100))
}

/// Replace the label set of a single bookmark.
pub(crate) fn set_bookmark_labels(
    conn: &mut Connection,
    id: &str,
    labels: &[String],
) -> StorageResult<()> {
    let tx = conn.transaction()?;

    let changed = tx.execute(
        "UPDATE bookmarks SET updated = ?1 WHERE id = ?2",
        params![Utc::now().timestamp_millis(), id],
    )?;
    if changed == 0 {
        return Err(StorageError::BookmarkNotFound { id: id.to_string() });
    }

    tx.execute(
        "DELETE FROM bookmark_labels WHERE bookmark_id = ?1",
        params![id],
    )?;
    insert_labels(&tx, id, labels)?;

    tx.commit()?;
    Ok(())
}

// ==================== Label manager ====================

/// Rename a label across every bookmark carrying it, in one transaction.
///
/// A bookmark already carrying the new name alongside the old one keeps a
/// single entry. Returns the number of bookmarks touched; 0 when the old
/// name is absent.
pub(crate) fn rename_label(conn: &mut Connection, old: &str, new: &str) -> StorageResult<usize> {
    let tx = conn.transaction()?;

    let affected: i64 = tx.query_row(
        "SELECT COUNT(DISTINCT bookmark_id) FROM bookmark_labels WHERE label = ?1",
        params![old],
        |row| row.get(0),
    )?;

    // Rows that already carry the new name just drop the old entry,
    // so the update below can never create a duplicate.
    tx.execute(
        "DELETE FROM bookmark_labels WHERE label = ?1 AND bookmark_id IN \
         (SELECT bookmark_id FROM bookmark_labels WHERE label = ?2)",
        params![old, new],
    )?;
    tx.execute(
        "UPDATE bookmark_labels SET label = ?1 WHERE label = ?2",
        params![new, old],
    )?;

    tx.commit()?;
    Ok(affected as usize)
}

/// Remove a label from every bookmark carrying it.
/// Returns the number of bookmarks touched.
pub(crate) fn delete_label(conn: &Connection, label: &str) -> StorageResult<usize> {
    // One row per (bookmark, label), so rows removed == bookmarks touched.
    let deleted = conn.execute(
        "DELETE FROM bookmark_labels WHERE label = ?1",
        params![label],
    )?;
    Ok(deleted)
}

/// Distinct labels across all Loaded bookmarks, sorted.
pub(crate) fn all_labels(conn: &Connection) -> StorageResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT bl.label FROM bookmark_labels bl \
         JOIN bookmarks b ON b.id = bl.bookmark_id \
         WHERE b.state = 0 ORDER BY bl.label",
    )?;
    let labels = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(labels)
}

/// Labels with the count of Loaded bookmarks carrying each.
pub(crate) fn label_counts(conn: &Connection) -> StorageResult<Vec<(String, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT bl.label, COUNT(bl.bookmark_id) as count \
         FROM bookmark_labels bl \
         JOIN bookmarks b ON b.id = bl.bookmark_id \
         WHERE b.state = 0 \
         GROUP BY bl.label \
         ORDER BY count DESC, bl.label",
    )?;
    let counts = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<(String, i64)>, _>>()?;
    Ok(counts)
}

// ==================== Aggregate counter ====================

/// All seven buckets in one aggregation pass over Loaded rows, so counts
/// and list results come from the same committed snapshot.
pub(crate) fn bookmark_counts(conn: &Connection) -> StorageResult<BookmarkCounts> {
    let counts = conn.query_row(
        "SELECT \
            COALESCE(SUM(read_progress < 100), 0), \
            COALESCE(SUM(is_archived), 0), \
            COALESCE(SUM(is_marked), 0), \
            COALESCE(SUM(type = 'article'), 0), \
            COALESCE(SUM(type = 'video'), 0), \
            COALESCE(SUM(type = 'picture'), 0), \
            COUNT(*) \
         FROM bookmarks WHERE state = 0",
        [],
        |row| {
            Ok(BookmarkCounts {
                unread: row.get(0)?,
                archived: row.get(1)?,
                favorite: row.get(2)?,
                article: row.get(3)?,
                video: row.get(4)?,
                picture: row.get(5)?,
                total: row.get(6)?,
            })
        },
    )?;
    Ok(counts)
}

// ==================== Read paths ====================

pub(crate) fn get_bookmark(conn: &Connection, id: &str) -> StorageResult<Bookmark> {
    get_bookmark_opt(conn, id)?.ok_or_else(|| StorageError::BookmarkNotFound {
        id: id.to_string(),
    })
}

pub(crate) fn get_bookmark_opt(conn: &Connection, id: &str) -> StorageResult<Option<Bookmark>> {
    let row = conn
        .query_row(
            &format!("SELECT {BOOKMARK_COLUMNS} FROM bookmarks WHERE id = ?1"),
            params![id],
            bookmark_row,
        )
        .optional()?;

    match row {
        Some(row) => Ok(Some(hydrate_bookmark(conn, row)?)),
        None => Ok(None),
    }
}

/// All bookmarks, newest creation first.
pub(crate) fn all_bookmarks(conn: &Connection) -> StorageResult<Vec<Bookmark>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKMARK_COLUMNS} FROM bookmarks ORDER BY created DESC"
    ))?;
    let rows = stmt
        .query_map([], bookmark_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut bookmarks = Vec::with_capacity(rows.len());
    for row in rows {
        bookmarks.push(hydrate_bookmark(conn, row)?);
    }
    Ok(bookmarks)
}

/// The bookmark that changed most recently, if any.
pub(crate) fn last_updated_bookmark(conn: &Connection) -> StorageResult<Option<Bookmark>> {
    let row = conn
        .query_row(
            &format!("SELECT {BOOKMARK_COLUMNS} FROM bookmarks ORDER BY updated DESC LIMIT 1"),
            [],
            bookmark_row,
        )
        .optional()?;

    match row {
        Some(row) => Ok(Some(hydrate_bookmark(conn, row)?)),
        None => Ok(None),
    }
}

pub(crate) fn article_content(conn: &Connection, id: &str) -> StorageResult<Option<String>> {
    let content = conn
        .query_row(
            "SELECT content FROM article_content WHERE bookmark_id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(content)
}

/// Run a compiled list/search query and hydrate the projection rows.
pub(crate) fn query_list_items(
    conn: &Connection,
    query: &QueryBuilder,
) -> StorageResult<Vec<BookmarkListItem>> {
    let mut stmt = conn.prepare(query.sql())?;
    let rows = stmt
        .query_map(query.params().as_slice(), list_item_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        items.push(hydrate_list_item(conn, row)?);
    }
    Ok(items)
}

/// The id set the remote source most recently reported.
/// Reconciliation oracle only; not part of the public query surface.
#[cfg(test)]
pub(crate) fn remote_ids(conn: &Connection) -> StorageResult<Vec<String>> {
    let mut stmt = conn.prepare("SELECT id FROM remote_bookmark_ids ORDER BY id")?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}

// ==================== Row mapping ====================

struct BookmarkRow {
    id: String,
    url: String,
    title: String,
    site_name: String,
    kind: String,
    state: i64,
    is_marked: bool,
    is_archived: bool,
    read_progress: u8,
    has_article: bool,
    lang: Option<String>,
    word_count: Option<i64>,
    reading_time: Option<i64>,
    description: Option<String>,
    icon_src: Option<String>,
    image_src: Option<String>,
    thumbnail_src: Option<String>,
    created: i64,
    updated: i64,
}

fn bookmark_row(row: &Row) -> rusqlite::Result<BookmarkRow> {
    Ok(BookmarkRow {
        id: row.get(0)?,
        url: row.get(1)?,
        title: row.get(2)?,
        site_name: row.get(3)?,
        kind: row.get(4)?,
        state: row.get(5)?,
        is_marked: row.get(6)?,
        is_archived: row.get(7)?,
        read_progress: row.get(8)?,
        has_article: row.get(9)?,
        lang: row.get(10)?,
        word_count: row.get(11)?,
        reading_time: row.get(12)?,
        description: row.get(13)?,
        icon_src: row.get(14)?,
        image_src: row.get(15)?,
        thumbnail_src: row.get(16)?,
        created: row.get(17)?,
        updated: row.get(18)?,
    })
}

fn hydrate_bookmark(conn: &Connection, row: BookmarkRow) -> StorageResult<Bookmark> {
    let labels = labels_for(conn, &row.id)?;
    let authors = authors_for(conn, &row.id)?;
    let kind = parse_kind(&row.kind)?;
    let state = parse_state(row.state)?;

    Ok(Bookmark {
        id: row.id,
        url: row.url,
        title: row.title,
        site_name: row.site_name,
        kind,
        state,
        is_marked: row.is_marked,
        is_archived: row.is_archived,
        read_progress: row.read_progress,
        has_article: row.has_article,
        labels,
        lang: row.lang,
        word_count: row.word_count,
        reading_time: row.reading_time,
        authors,
        description: row.description,
        icon_src: row.icon_src,
        image_src: row.image_src,
        thumbnail_src: row.thumbnail_src,
        created: millis_to_datetime(row.created),
        updated: millis_to_datetime(row.updated),
    })
}

struct ListItemRow {
    id: String,
    url: String,
    title: String,
    site_name: String,
    is_marked: bool,
    is_archived: bool,
    read_progress: u8,
    icon_src: Option<String>,
    image_src: Option<String>,
    thumbnail_src: Option<String>,
    kind: String,
}

fn list_item_row(row: &Row) -> rusqlite::Result<ListItemRow> {
    Ok(ListItemRow {
        id: row.get(0)?,
        url: row.get(1)?,
        title: row.get(2)?,
        site_name: row.get(3)?,
        is_marked: row.get(4)?,
        is_archived: row.get(5)?,
        read_progress: row.get(6)?,
        icon_src: row.get(7)?,
        image_src: row.get(8)?,
        thumbnail_src: row.get(9)?,
        kind: row.get(10)?,
    })
}

fn hydrate_list_item(conn: &Connection, row: ListItemRow) -> StorageResult<BookmarkListItem> {
    let labels = labels_for(conn, &row.id)?;
    let kind = parse_kind(&row.kind)?;

    Ok(BookmarkListItem {
        id: row.id,
        url: row.url,
        title: row.title,
        site_name: row.site_name,
        is_marked: row.is_marked,
        is_archived: row.is_archived,
        read_progress: row.read_progress,
        labels,
        icon_src: row.icon_src,
        image_src: row.image_src,
        thumbnail_src: row.thumbnail_src,
        kind,
    })
}

fn labels_for(conn: &Connection, bookmark_id: &str) -> StorageResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT label FROM bookmark_labels WHERE bookmark_id = ?1 ORDER BY position",
    )?;
    let labels = stmt
        .query_map(params![bookmark_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(labels)
}

fn authors_for(conn: &Connection, bookmark_id: &str) -> StorageResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT author FROM bookmark_authors WHERE bookmark_id = ?1 ORDER BY position",
    )?;
    let authors = stmt
        .query_map(params![bookmark_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(authors)
}

fn parse_kind(value: &str) -> StorageResult<BookmarkType> {
    value.parse().map_err(|_| StorageError::InvalidValue {
        column: "type",
        value: value.to_string(),
    })
}

fn parse_state(value: i64) -> StorageResult<BookmarkState> {
    BookmarkState::from_i64(value).ok_or_else(|| StorageError::InvalidValue {
        column: "state",
        value: value.to_string(),
    })
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
}
