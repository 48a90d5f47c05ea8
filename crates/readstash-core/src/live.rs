//! Change notification for live queries
//!
//! Every committed write publishes the set of tables it touched on a
//! broadcast bus. Each live query subscribes and re-evaluates when a table
//! it depends on is invalidated. Publishing is decoupled from the read
//! path: it happens once, after commit, never inside a transaction.

use tokio::sync::broadcast;

/// Set of storage tables, used to scope invalidations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Tables(u8);

impl Tables {
    pub const BOOKMARKS: Tables = Tables(1);
    pub const ARTICLE_CONTENT: Tables = Tables(1 << 1);
    pub const REMOTE_IDS: Tables = Tables(1 << 2);

    /// Whether the two sets share at least one table.
    pub fn intersects(self, other: Tables) -> bool {
        self.0 & other.0 != 0
    }
}

impl std::ops::BitOr for Tables {
    type Output = Tables;

    fn bitor(self, rhs: Tables) -> Tables {
        Tables(self.0 | rhs.0)
    }
}

/// Broadcast bus carrying table invalidations from writers to live queries.
#[derive(Debug)]
pub(crate) struct ChangeBus {
    tx: broadcast::Sender<Tables>,
}

impl ChangeBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    /// Publish an invalidation after a commit. A send with no subscribers
    /// is not an error; there is simply nothing to refresh.
    pub fn publish(&self, tables: Tables) {
        let _ = self.tx.send(tables);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Tables> {
        self.tx.subscribe()
    }
}
