//! Cursor Pagination
//!
//! GitLab list endpoints announce the next page in a `link` response header:
//!
//! ```text
//! <https://git.example.com/api/v4/groups?page=2>; rel="next", <...>; rel="last"
//! ```
//!
//! [`next_page`] resolves that header to a URL and [`walk`] follows the
//! resulting cursors until the collection is exhausted.

use super::error::ApiError;
use std::future::Future;

/// Extract the `rel="next"` URL from a `link` header
///
/// Returns an empty string when there is no next page. Entries that are not
/// exactly `<url>; rel="..."` are skipped; if several entries are `next`, the
/// first one wins.
pub fn next_page(header: &str) -> String {
    for link in header.split(',') {
        let parts: Vec<&str> = link.split(';').collect();
        if parts.len() == 2 && parts[1].trim() == "rel=\"next\"" {
            return parts[0]
                .trim()
                .trim_matches(|c| c == ' ' || c == '<' || c == '>')
                .to_string();
        }
    }
    String::new()
}

/// Items gathered by a [`walk`], plus the error that stopped it early
#[derive(Debug)]
pub struct Listing<T> {
    /// Items of every page fetched, in page order
    pub items: Vec<T>,

    /// Set when a page failed; `items` then holds the pages before it
    pub error: Option<ApiError>,
}

impl<T> Listing<T> {
    /// Drop partial results on error
    pub fn into_result(self) -> Result<Vec<T>, ApiError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.items),
        }
    }
}

/// Follow a paginated collection from `start` until the cursor runs out
///
/// `fetch` receives the current cursor and returns one page together with the
/// next cursor (empty when done). On the first failure the walk stops and the
/// error is wrapped as `error <operation>: ...`.
pub async fn walk<T, F, Fut>(operation: &str, start: String, mut fetch: F) -> Listing<T>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<(Vec<T>, String), ApiError>>,
{
    let mut items = Vec::new();
    let mut cursor = start;
    let mut pages = 0usize;

    while !cursor.is_empty() {
        match fetch(cursor).await {
            Ok((page, next)) => {
                pages += 1;
                tracing::debug!("{}: page {} returned {} items", operation, pages, page.len());
                items.extend(page);
                cursor = next;
            }
            Err(err) => {
                return Listing {
                    items,
                    error: Some(err.context(operation)),
                };
            }
        }
    }

    Listing { items, error: None }
}
