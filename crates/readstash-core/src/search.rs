//! Search query operator parsing
//!
//! Splits a free-text search string into Gmail-style operators and a
//! residual text query. Anything that is not an exact operator match is
//! treated as literal search text, never an error.
//!
//! Supported operators:
//! - `is:error` / `is:loaded` / `is:loading` - filter by extraction state
//! - `is:empty` - bookmarks that promise an article body but have none stored
//! - `has:content` - bookmarks with a stored article body
//! - `has:no-content` - bookmarks without one

use crate::models::BookmarkState;

/// Parsed search operators plus the residual text query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchOperators {
    /// Non-operator tokens, joined with single spaces in original order
    pub text_query: String,
    /// State requested via `is:error` / `is:loaded` / `is:loading`
    pub state: Option<BookmarkState>,
    /// Content presence requested via `has:content` / `has:no-content`
    pub has_article_content: Option<bool>,
    /// Set by `is:empty`: the bookmark must promise an article body
    /// (`has_article`) while no content is stored. Takes priority over
    /// `has_article_content` when both are present.
    pub requires_article: bool,
}

impl SearchOperators {
    /// Parse a raw search query.
    ///
    /// Operators match case-insensitively and exactly; when the same
    /// operator category appears more than once the last occurrence wins.
    ///
    /// Example: `"is:error kubernetes"` parses to state = `Error` and
    /// text query `"kubernetes"`.
    pub fn parse(query: &str) -> Self {
        let mut ops = Self::default();
        let mut text_tokens = Vec::new();

        for token in query.split_whitespace() {
            if token.eq_ignore_ascii_case("is:error") {
                ops.state = Some(BookmarkState::Error);
            } else if token.eq_ignore_ascii_case("is:loaded") {
                ops.state = Some(BookmarkState::Loaded);
            } else if token.eq_ignore_ascii_case("is:loading") {
                ops.state = Some(BookmarkState::Loading);
            } else if token.eq_ignore_ascii_case("is:empty") {
                ops.requires_article = true;
            } else if token.eq_ignore_ascii_case("has:content") {
                ops.has_article_content = Some(true);
            } else if token.eq_ignore_ascii_case("has:no-content") {
                ops.has_article_content = Some(false);
            } else {
                text_tokens.push(token);
            }
        }

        ops.text_query = text_tokens.join(" ");
        ops
    }
}
