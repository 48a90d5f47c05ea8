//! Dynamic filter/search query compilation
//!
//! Optional filter values compose into a single `WHERE` clause with a
//! matching list of bound parameters. Values are always bound, never
//! spliced into the SQL text.

use rusqlite::ToSql;

use crate::models::{BookmarkState, BookmarkType};
use crate::search::SearchOperators;

/// Optional narrowing values for list and search queries.
///
/// Each `Some` field narrows the result with logical AND; a `None` field
/// imposes no constraint. `unread: Some(true)` means `read_progress < 100`,
/// `unread: Some(false)` means fully read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListFilter {
    pub kind: Option<BookmarkType>,
    pub unread: Option<bool>,
    pub archived: Option<bool>,
    pub favorite: Option<bool>,
    pub state: Option<BookmarkState>,
    /// Exact label match; `"ai"` never matches a bookmark labeled `"email"`.
    pub label: Option<String>,
}

/// Accumulates SQL fragments and their bound parameters.
pub(crate) struct QueryBuilder {
    sql: String,
    params: Vec<Box<dyn ToSql>>,
}

impl QueryBuilder {
    fn new(base: &str) -> Self {
        Self {
            sql: base.to_string(),
            params: Vec::new(),
        }
    }

    fn push(&mut self, fragment: &str) {
        self.sql.push_str(fragment);
    }

    fn bind(&mut self, value: impl ToSql + 'static) {
        self.params.push(Box::new(value));
    }

    fn push_bound(&mut self, fragment: &str, value: impl ToSql + 'static) {
        self.push(fragment);
        self.bind(value);
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> Vec<&dyn ToSql> {
        self.params.iter().map(|p| p.as_ref()).collect()
    }
}

/// Columns of the list projection, aliased to the bookmarks table.
const LIST_ITEM_COLUMNS: &str = "b.id, b.url, b.title, b.site_name, b.is_marked, \
     b.is_archived, b.read_progress, b.icon_src, b.image_src, b.thumbnail_src, b.type";

/// Compile a filtered list query, ordered by creation time descending.
pub(crate) fn list_query(filter: &ListFilter) -> QueryBuilder {
    let mut q = QueryBuilder::new(&format!(
        "SELECT {LIST_ITEM_COLUMNS} FROM bookmarks b WHERE 1=1"
    ));
    apply_filter(&mut q, filter);
    q.push(" ORDER BY b.created DESC");
    tracing::debug!(sql = q.sql(), "compiled list query");
    q
}

/// Compile a search query: text matching plus scalar filters plus the
/// content-presence directive, ordered by creation time descending.
///
/// An operator-supplied state takes precedence over the filter's state.
pub(crate) fn search_query(ops: &SearchOperators, filter: &ListFilter) -> QueryBuilder {
    let mut q = QueryBuilder::new(&format!(
        "SELECT {LIST_ITEM_COLUMNS} FROM bookmarks b \
         LEFT JOIN article_content ac ON ac.bookmark_id = b.id WHERE 1=1"
    ));

    if !ops.text_query.is_empty() {
        let pattern = format!("%{}%", ops.text_query);
        q.push(
            " AND (b.title LIKE ? COLLATE NOCASE \
             OR b.site_name LIKE ? COLLATE NOCASE \
             OR EXISTS (SELECT 1 FROM bookmark_labels bl \
                WHERE bl.bookmark_id = b.id AND bl.label LIKE ? COLLATE NOCASE))",
        );
        q.bind(pattern.clone());
        q.bind(pattern.clone());
        q.bind(pattern);
    }

    let mut effective = filter.clone();
    if ops.state.is_some() {
        effective.state = ops.state;
    }
    apply_filter(&mut q, &effective);

    // Content presence: exactly one branch applies. `is:empty` outranks any
    // plain has:content / has:no-content value.
    if ops.requires_article {
        q.push(" AND b.has_article = 1 AND (ac.content IS NULL OR ac.content = '')");
    } else if ops.has_article_content == Some(true) {
        q.push(" AND ac.content IS NOT NULL AND ac.content != ''");
    } else if ops.has_article_content == Some(false) {
        q.push(" AND (ac.content IS NULL OR ac.content = '')");
    }

    q.push(" ORDER BY b.created DESC");
    tracing::debug!(sql = q.sql(), "compiled search query");
    q
}

fn apply_filter(q: &mut QueryBuilder, filter: &ListFilter) {
    if let Some(state) = filter.state {
        q.push_bound(" AND b.state = ?", state.as_i64());
    }

    if let Some(kind) = filter.kind {
        q.push_bound(" AND b.type = ?", kind.as_str());
    }

    match filter.unread {
        Some(true) => q.push(" AND b.read_progress < 100"),
        Some(false) => q.push(" AND b.read_progress = 100"),
        None => {}
    }

    if let Some(archived) = filter.archived {
        q.push_bound(" AND b.is_archived = ?", archived);
    }

    if let Some(favorite) = filter.favorite {
        q.push_bound(" AND b.is_marked = ?", favorite);
    }

    if let Some(label) = &filter.label {
        q.push_bound(
            " AND EXISTS (SELECT 1 FROM bookmark_labels bl \
             WHERE bl.bookmark_id = b.id AND bl.label = ?)",
            label.clone(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filter_compiles_to_plain_list() {
        let q = list_query(&ListFilter::default());
        assert!(q.sql().starts_with("SELECT"));
        assert!(q.sql().ends_with(" ORDER BY b.created DESC"));
        assert!(!q.sql().contains(" AND "));
        assert!(q.params().is_empty());
    }

    #[test]
    fn test_filters_compose_with_and() {
        let filter = ListFilter {
            kind: Some(BookmarkType::Video),
            archived: Some(false),
            favorite: Some(true),
            state: Some(BookmarkState::Loaded),
            ..Default::default()
        };
        let q = list_query(&filter);
        assert!(q.sql().contains(" AND b.state = ?"));
        assert!(q.sql().contains(" AND b.type = ?"));
        assert!(q.sql().contains(" AND b.is_archived = ?"));
        assert!(q.sql().contains(" AND b.is_marked = ?"));
        assert_eq!(q.params().len(), 4);
    }

    #[test]
    fn test_unread_binds_no_parameter() {
        let q = list_query(&ListFilter {
            unread: Some(true),
            ..Default::default()
        });
        assert!(q.sql().contains(" AND b.read_progress < 100"));
        assert!(q.params().is_empty());

        let q = list_query(&ListFilter {
            unread: Some(false),
            ..Default::default()
        });
        assert!(q.sql().contains(" AND b.read_progress = 100"));
    }

    #[test]
    fn test_label_uses_exact_match_subquery() {
        let q = list_query(&ListFilter {
            label: Some("ai".to_string()),
            ..Default::default()
        });
        assert!(q.sql().contains("bl.label = ?"));
        assert_eq!(q.params().len(), 1);
    }

    #[test]
    fn test_search_text_binds_three_patterns() {
        let ops = SearchOperators::parse("kubernetes");
        let q = search_query(&ops, &ListFilter::default());
        assert!(q.sql().contains("LEFT JOIN article_content"));
        assert!(q.sql().contains("b.title LIKE ?"));
        assert!(q.sql().contains("b.site_name LIKE ?"));
        assert!(q.sql().contains("bl.label LIKE ?"));
        assert_eq!(q.params().len(), 3);
    }

    #[test]
    fn test_blank_search_text_adds_no_clause() {
        let ops = SearchOperators::parse("is:loaded");
        let q = search_query(&ops, &ListFilter::default());
        assert!(!q.sql().contains("LIKE"));
        // state from the operator still binds
        assert_eq!(q.params().len(), 1);
    }

    #[test]
    fn test_operator_state_overrides_filter_state() {
        let ops = SearchOperators::parse("is:error");
        let filter = ListFilter {
            state: Some(BookmarkState::Loaded),
            ..Default::default()
        };
        let q = search_query(&ops, &filter);
        let params = q.params();
        assert_eq!(params.len(), 1);
        // a single state clause, bound to the operator's value
        assert_eq!(q.sql().matches("b.state = ?").count(), 1);
    }

    #[test]
    fn test_content_branches_are_exclusive() {
        // is:empty wins over has:content
        let ops = SearchOperators::parse("has:content is:empty");
        let q = search_query(&ops, &ListFilter::default());
        assert!(q.sql().contains("b.has_article = 1"));
        assert!(!q.sql().contains("ac.content IS NOT NULL"));

        let ops = SearchOperators::parse("has:content");
        let q = search_query(&ops, &ListFilter::default());
        assert!(q.sql().contains("ac.content IS NOT NULL AND ac.content != ''"));
        assert!(!q.sql().contains("b.has_article = 1"));

        let ops = SearchOperators::parse("has:no-content");
        let q = search_query(&ops, &ListFilter::default());
        assert!(q.sql().contains("(ac.content IS NULL OR ac.content = '')"));
        assert!(!q.sql().contains("b.has_article = 1"));
    }
}
