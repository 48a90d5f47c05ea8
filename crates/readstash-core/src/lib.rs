//! readstash Core Library
//!
//! This crate provides the core functionality for readstash, a personal
//! bookmark-reading client: a local SQLite mirror of a remote bookmark
//! collection, with sync reconciliation and a reactive filter/search
//! query engine. The UI and networking layers sit on top of it.
//!
//! # Architecture
//!
//! - **SQLite**: the local store; the remote service stays the source of
//!   truth and is merged in via [`BookmarkStore::reconcile`]
//! - **Change bus**: every committed write publishes the tables it touched;
//!   live queries re-evaluate and push fresh results into watch channels
//! - **Query compiler**: optional filters and parsed search operators
//!   compose into one parameterized SQL query
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let store = BookmarkStore::open(&config)?;
//!
//! // Merge a fetched remote snapshot
//! store.reconcile(&remote_ids, &records).await?;
//!
//! // A live list of unread bookmarks, newest first
//! let mut unread = store
//!     .filter_list(ListFilter { unread: Some(true), ..Default::default() })
//!     .await?;
//! ```
//!
//! # Modules
//!
//! - `store`: unified storage interface (main entry point)
//! - `models`: bookmark data structures and projections
//! - `search`: search-operator parsing
//! - `storage`: SQLite schema, query compiler, and repository
//! - `config`: application configuration

pub mod config;
pub mod models;
pub mod search;
pub mod storage;
pub mod store;

mod live;

pub use config::Config;
pub use models::{
    Bookmark, BookmarkCounts, BookmarkListItem, BookmarkState, BookmarkType, BookmarkWithContent,
};
pub use search::SearchOperators;
pub use storage::{ListFilter, StorageError, StorageResult};
pub use store::BookmarkStore;
