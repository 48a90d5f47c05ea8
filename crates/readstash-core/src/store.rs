//! Unified bookmark store
//!
//! `BookmarkStore` owns the SQLite connection and coordinates:
//! - writers, serialized on the connection; every multi-row change is one
//!   transaction, so readers never observe a partial write
//! - reactive readers: watch channels holding the last materialized result,
//!   re-evaluated whenever the change bus invalidates a dependency
//! - staged deletes: cancellable grace-period countdowns for destructive
//!   label/bookmark removal
//!
//! ## Usage
//!
//! ```ignore
//! let store = BookmarkStore::open(&config)?;
//!
//! // Merge a fetched remote snapshot
//! store.reconcile(&remote_ids, &records).await?;
//!
//! // Subscribe to a filtered list; it keeps updating as rows change
//! let mut unread = store
//!     .filter_list(ListFilter { unread: Some(true), ..Default::default() })
//!     .await?;
//! let items = unread.borrow().clone();
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use rusqlite::Connection;
use tokio::sync::{broadcast, watch, Mutex};

use crate::config::Config;
use crate::live::{ChangeBus, Tables};
use crate::models::{
    Bookmark, BookmarkCounts, BookmarkListItem, BookmarkWithContent,
};
use crate::search::SearchOperators;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::query::{self, ListFilter};
use crate::storage::repository;
use crate::storage::schema::{init_schema, needs_init};

/// Unified storage interface for readstash
///
/// Cheap to clone; all clones share the same connection and change bus.
#[derive(Clone)]
pub struct BookmarkStore {
    inner: Arc<Inner>,
}

struct Inner {
    /// The SQLite connection. Writers and ad-hoc reads serialize here;
    /// live queries only touch it when re-evaluating.
    conn: Mutex<Connection>,
    /// Table invalidations, published after every commit
    bus: ChangeBus,
    /// Pending grace-period label delete
    staged_label: StagedSlot,
    /// Pending grace-period bookmark delete
    staged_bookmark: StagedSlot,
}

impl BookmarkStore {
    /// Open the store at the configured database path, initializing the
    /// schema on first run.
    pub fn open(config: &Config) -> StorageResult<Self> {
        let path = config.sqlite_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    /// Open an in-memory store (for testing)
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        if needs_init(&conn) {
            init_schema(&conn)?;
        }

        Ok(Self {
            inner: Arc::new(Inner {
                conn: Mutex::new(conn),
                bus: ChangeBus::new(),
                staged_label: StagedSlot::new(),
                staged_bookmark: StagedSlot::new(),
            }),
        })
    }

    // ==================== Bookmark writes ====================

    /// Insert or wholesale-replace a bookmark and its optional article body.
    pub async fn upsert_bookmark(
        &self,
        bookmark: &Bookmark,
        content: Option<&str>,
    ) -> StorageResult<()> {
        {
            let mut conn = self.inner.conn.lock().await;
            repository::upsert_bookmark(&mut conn, bookmark, content)?;
        }
        self.inner
            .bus
            .publish(Tables::BOOKMARKS | Tables::ARTICLE_CONTENT);
        Ok(())
    }

    /// Insert or replace a batch of bookmarks as one transaction.
    pub async fn upsert_bookmarks(&self, records: &[BookmarkWithContent]) -> StorageResult<()> {
        {
            let mut conn = self.inner.conn.lock().await;
            repository::upsert_bookmarks(&mut conn, records)?;
        }
        self.inner
            .bus
            .publish(Tables::BOOKMARKS | Tables::ARTICLE_CONTENT);
        Ok(())
    }

    /// Merge a freshly fetched remote snapshot: replace the remote id set,
    /// upsert the fetched records, then drop every bookmark the remote no
    /// longer reports. All-or-nothing; on error the store is untouched and
    /// the caller retries on the next sync tick. Returns the number of
    /// bookmarks deleted.
    pub async fn reconcile(
        &self,
        remote_ids: &[String],
        records: &[BookmarkWithContent],
    ) -> StorageResult<usize> {
        let deleted = {
            let mut conn = self.inner.conn.lock().await;
            repository::reconcile(&mut conn, remote_ids, records)?
        };
        self.inner
            .bus
            .publish(Tables::BOOKMARKS | Tables::ARTICLE_CONTENT | Tables::REMOTE_IDS);
        Ok(deleted)
    }

    /// Delete a bookmark; its article content and labels go with it.
    pub async fn delete_bookmark(&self, id: &str) -> StorageResult<()> {
        {
            let conn = self.inner.conn.lock().await;
            repository::delete_bookmark(&conn, id)?;
        }
        self.inner
            .bus
            .publish(Tables::BOOKMARKS | Tables::ARTICLE_CONTENT);
        Ok(())
    }

    /// Delete every bookmark.
    pub async fn delete_all(&self) -> StorageResult<()> {
        {
            let conn = self.inner.conn.lock().await;
            repository::delete_all(&conn)?;
        }
        self.inner
            .bus
            .publish(Tables::BOOKMARKS | Tables::ARTICLE_CONTENT);
        Ok(())
    }

    // ==================== User mutations ====================
    //
    // Local edits only; reflecting them to the remote source is the
    // networking layer's job.

    pub async fn set_favorite(&self, id: &str, favorite: bool) -> StorageResult<()> {
        {
            let conn = self.inner.conn.lock().await;
            repository::set_favorite(&conn, id, favorite)?;
        }
        self.inner.bus.publish(Tables::BOOKMARKS);
        Ok(())
    }

    pub async fn set_archived(&self, id: &str, archived: bool) -> StorageResult<()> {
        {
            let conn = self.inner.conn.lock().await;
            repository::set_archived(&conn, id, archived)?;
        }
        self.inner.bus.publish(Tables::BOOKMARKS);
        Ok(())
    }

    /// Set reading progress (clamped to 0-100); 100 marks the bookmark read.
    pub async fn set_read_progress(&self, id: &str, progress: u8) -> StorageResult<()> {
        {
            let conn = self.inner.conn.lock().await;
            repository::set_read_progress(&conn, id, progress)?;
        }
        self.inner.bus.publish(Tables::BOOKMARKS);
        Ok(())
    }

    /// Replace the label set of a single bookmark.
    pub async fn set_bookmark_labels(&self, id: &str, labels: &[String]) -> StorageResult<()> {
        {
            let mut conn = self.inner.conn.lock().await;
            repository::set_bookmark_labels(&mut conn, id, labels)?;
        }
        self.inner.bus.publish(Tables::BOOKMARKS);
        Ok(())
    }

    // ==================== Direct reads ====================

    /// Get a bookmark by id; a missing id is `StorageError::BookmarkNotFound`.
    pub async fn get_bookmark(&self, id: &str) -> StorageResult<Bookmark> {
        let conn = self.inner.conn.lock().await;
        repository::get_bookmark(&conn, id)
    }

    /// Snapshot of all bookmarks, newest creation first.
    pub async fn get_all_bookmarks(&self) -> StorageResult<Vec<Bookmark>> {
        let conn = self.inner.conn.lock().await;
        repository::all_bookmarks(&conn)
    }

    /// The bookmark that changed most recently, if any.
    pub async fn last_updated_bookmark(&self) -> StorageResult<Option<Bookmark>> {
        let conn = self.inner.conn.lock().await;
        repository::last_updated_bookmark(&conn)
    }

    /// Stored article body for a bookmark, if any.
    pub async fn get_article_content(&self, id: &str) -> StorageResult<Option<String>> {
        let conn = self.inner.conn.lock().await;
        repository::article_content(&conn, id)
    }

    /// Labels with the count of Loaded bookmarks carrying each.
    pub async fn label_counts(&self) -> StorageResult<Vec<(String, i64)>> {
        let conn = self.inner.conn.lock().await;
        repository::label_counts(&conn)
    }

    // ==================== Reactive reads ====================

    /// Observe all bookmarks, newest creation first.
    pub async fn observe_all(&self) -> StorageResult<watch::Receiver<Vec<Bookmark>>> {
        self.observe_with(Tables::BOOKMARKS, repository::all_bookmarks)
            .await
    }

    /// Observe a single bookmark; emits `None` once the row is gone.
    pub async fn observe_bookmark(
        &self,
        id: &str,
    ) -> StorageResult<watch::Receiver<Option<Bookmark>>> {
        let id = id.to_string();
        self.observe_with(Tables::BOOKMARKS, move |conn| {
            repository::get_bookmark_opt(conn, &id)
        })
        .await
    }

    /// Observe the list projection under the given filters, newest first.
    pub async fn filter_list(
        &self,
        filter: ListFilter,
    ) -> StorageResult<watch::Receiver<Vec<BookmarkListItem>>> {
        self.observe_with(Tables::BOOKMARKS, move |conn| {
            repository::query_list_items(conn, &query::list_query(&filter))
        })
        .await
    }

    /// Observe a search over the list projection. The raw query is parsed
    /// for operators; the residual text matches title, site name, or any
    /// label, case-insensitively.
    pub async fn search(
        &self,
        raw_query: &str,
        filter: ListFilter,
    ) -> StorageResult<watch::Receiver<Vec<BookmarkListItem>>> {
        let ops = SearchOperators::parse(raw_query);
        self.observe_with(Tables::BOOKMARKS | Tables::ARTICLE_CONTENT, move |conn| {
            repository::query_list_items(conn, &query::search_query(&ops, &filter))
        })
        .await
    }

    /// Observe aggregate counts over Loaded bookmarks.
    pub async fn observe_counts(&self) -> StorageResult<watch::Receiver<BookmarkCounts>> {
        self.observe_with(Tables::BOOKMARKS, repository::bookmark_counts)
            .await
    }

    /// Observe the distinct labels of Loaded bookmarks, sorted.
    pub async fn observe_labels(&self) -> StorageResult<watch::Receiver<Vec<String>>> {
        self.observe_with(Tables::BOOKMARKS, repository::all_labels)
            .await
    }

    /// Evaluate `query` once for the initial value, then keep re-evaluating
    /// whenever a table in `deps` is invalidated, pushing each result into
    /// the returned watch channel. The task ends when the last receiver is
    /// dropped.
    async fn observe_with<T, F>(
        &self,
        deps: Tables,
        query: F,
    ) -> StorageResult<watch::Receiver<T>>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(&Connection) -> StorageResult<T> + Send + 'static,
    {
        // Subscribe before the first evaluation so a write landing in
        // between still triggers a re-run.
        let mut changes = self.inner.bus.subscribe();
        let initial = {
            let conn = self.inner.conn.lock().await;
            query(&*conn)?
        };
        let (tx, rx) = watch::channel(initial);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = changes.recv() => {
                        match received {
                            Ok(tables) if !tables.intersects(deps) => continue,
                            // A lagged receiver may have missed a relevant
                            // invalidation; re-evaluate unconditionally.
                            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                            Err(broadcast::error::RecvError::Closed) => break,
                        }

                        let result = {
                            let conn = inner.conn.lock().await;
                            query(&*conn)
                        };
                        match result {
                            Ok(value) => {
                                if tx.send(value).is_err() {
                                    break;
                                }
                            }
                            // Keep the previous value; the stream stays alive.
                            Err(e) => tracing::warn!("live query re-evaluation failed: {e}"),
                        }
                    }
                    _ = tx.closed() => break,
                }
            }
        });

        Ok(rx)
    }

    // ==================== Label manager ====================

    /// Rename a label across every bookmark carrying it, as one atomic
    /// batch. A bookmark already carrying the new name keeps a single
    /// entry. Returns the number of bookmarks touched.
    pub async fn rename_label(&self, old: &str, new: &str) -> StorageResult<usize> {
        let affected = {
            let mut conn = self.inner.conn.lock().await;
            repository::rename_label(&mut conn, old, new)?
        };
        if affected > 0 {
            self.inner.bus.publish(Tables::BOOKMARKS);
        }
        Ok(affected)
    }

    /// Remove a label from every bookmark carrying it, as one atomic batch.
    /// Returns the number of bookmarks touched.
    pub async fn delete_label(&self, label: &str) -> StorageResult<usize> {
        let affected = {
            let conn = self.inner.conn.lock().await;
            repository::delete_label(&conn, label)?
        };
        if affected > 0 {
            self.inner.bus.publish(Tables::BOOKMARKS);
        }
        Ok(affected)
    }

    // ==================== Staged deletes ====================

    /// Stage a label delete behind a grace period. Any previously staged
    /// label delete is discarded. If no cancel arrives before the period
    /// elapses, the delete commits as one atomic batch.
    ///
    /// Must be called from within a tokio runtime.
    pub fn stage_label_delete(&self, label: &str, grace: Duration) {
        let token = self.inner.staged_label.stage(label);
        let store = self.clone();
        let label = label.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            // Claim under the slot lock: a cancel or a newer staging wins
            // the race by emptying the slot or rotating the token first,
            // so exactly one outcome is ever observable.
            if store.inner.staged_label.claim(token).is_some() {
                if let Err(e) = store.delete_label(&label).await {
                    tracing::error!("staged delete of label '{label}' failed: {e}");
                }
            }
        });
    }

    /// Discard the staged label delete, if one is pending.
    /// Returns the label that was staged.
    pub fn cancel_staged_label_delete(&self) -> Option<String> {
        self.inner.staged_label.cancel()
    }

    /// Stage a bookmark delete behind a grace period, giving the caller an
    /// undo window. Same semantics as [`Self::stage_label_delete`].
    pub fn stage_bookmark_delete(&self, id: &str, grace: Duration) {
        let token = self.inner.staged_bookmark.stage(id);
        let store = self.clone();
        let id = id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if store.inner.staged_bookmark.claim(token).is_some() {
                if let Err(e) = store.delete_bookmark(&id).await {
                    tracing::error!("staged delete of bookmark '{id}' failed: {e}");
                }
            }
        });
    }

    /// Discard the staged bookmark delete, if one is pending.
    /// Returns the id that was staged.
    pub fn cancel_staged_bookmark_delete(&self) -> Option<String> {
        self.inner.staged_bookmark.cancel()
    }
}

/// One cancellable staged action at a time, guarded by a generation token.
///
/// `stage` replaces whatever was pending and returns a fresh token; a timer
/// task later calls `claim` with its token and only proceeds if the slot
/// still holds it. `cancel` empties the slot. All three go through the same
/// lock, so a timer firing concurrently with a cancel resolves to exactly
/// one outcome.
struct StagedSlot {
    pending: StdMutex<Option<(String, u64)>>,
    next_token: AtomicU64,
}

impl StagedSlot {
    fn new() -> Self {
        Self {
            pending: StdMutex::new(None),
            next_token: AtomicU64::new(0),
        }
    }

    /// Stage `target`, discarding any previously staged one.
    fn stage(&self, target: &str) -> u64 {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        *pending = Some((target.to_string(), token));
        token
    }

    /// Take the staged target if `token` is still current.
    fn claim(&self, token: u64) -> Option<String> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*pending, Some((_, current)) if current == token) {
            pending.take().map(|(target, _)| target)
        } else {
            None
        }
    }

    /// Discard the staged action, returning its target if one was pending.
    fn cancel(&self) -> Option<String> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.take().map(|(target, _)| target)
    }
}
