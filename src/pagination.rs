// SPDX-License-Identifier: MIT

//! Link-relation pagination for GitHub REST endpoints.
//!
//! Pages are inherently sequential: page N+1's URL is only known from page
//! N's `Link` header. A fixed inter-page delay avoids bursting the rate
//! limit, and `max_pages` is a deliberate bound: callers treat truncation
//! as expected, not exceptional.

use crate::error::AppError;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

/// Paginated-fetch options.
#[derive(Debug, Clone)]
pub struct PageOptions {
    /// Items requested per page; a shorter page means the last one.
    pub per_page: usize,
    /// Hard cap on requests issued, even if more pages remain.
    pub max_pages: u32,
    /// Search endpoints wrap their items in `{ "items": [...] }`.
    pub search_shape: bool,
    /// Inter-page throttle.
    pub page_delay_ms: u64,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self {
            per_page: 100,
            max_pages: 10,
            search_shape: false,
            page_delay_ms: 200,
        }
    }
}

/// One fetched page: the parsed body plus the raw `Link` header, if any.
#[derive(Debug, Clone)]
pub struct Page {
    pub data: Value,
    pub link_header: Option<String>,
}

/// Extract the `rel="next"` target from an RFC-5988 `Link` header.
pub fn parse_next_link(link_header: &str) -> Option<String> {
    for part in link_header.split(',') {
        let mut sections = part.split(';');
        let target = sections.next()?.trim();
        let is_next = sections
            .any(|param| param.trim().eq_ignore_ascii_case("rel=\"next\""));
        if is_next {
            return Some(target.trim_start_matches('<').trim_end_matches('>').to_string());
        }
    }
    None
}

fn extract_items(data: &Value, search_shape: bool) -> Vec<Value> {
    let array = if search_shape {
        data.get("items").and_then(Value::as_array)
    } else {
        data.as_array()
    };
    array.cloned().unwrap_or_default()
}

/// Follow pagination from `path`, concatenating every page's items.
///
/// Stops at the first empty page, the first short page (non-search shape),
/// a missing `next` link, or after `max_pages` requests, whichever comes
/// first.
pub async fn fetch_all_pages<F, Fut>(
    path: &str,
    opts: &PageOptions,
    mut fetch_page: F,
) -> Result<Vec<Value>, AppError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Page, AppError>>,
{
    let mut items = Vec::new();
    let mut url = path.to_string();
    let mut requests = 0u32;

    loop {
        requests += 1;
        let page = fetch_page(url).await?;
        let page_items = extract_items(&page.data, opts.search_shape);

        if page_items.is_empty() {
            break;
        }

        let short_page = !opts.search_shape && page_items.len() < opts.per_page;
        items.extend(page_items);

        if short_page || requests >= opts.max_pages {
            break;
        }

        let next = match page.link_header.as_deref().and_then(parse_next_link) {
            Some(next) => next,
            None => break, // last page reached
        };

        tokio::time::sleep(Duration::from_millis(opts.page_delay_ms)).await;
        url = next;
    }

    Ok(items)
}
