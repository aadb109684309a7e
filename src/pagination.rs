//! Offset pagination over ordered result sets.
//!
//! A [`PageRequest`] is the validated `(page, limit)` pair taken from a query
//! string; a [`Page`] is the window of documents plus the metadata clients use
//! to walk the result set.

use serde::{Deserialize, Serialize};

use crate::config::PaginationConfig;

/// Raw `page` / `limit` query parameters. Kept as strings so junk input
/// falls back to defaults instead of failing extraction.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: i64,
    limit: i64,
}

impl PageRequest {
    /// Clamps both values to at least 1 and `limit` to `max_limit`.
    pub fn new(page: i64, limit: i64, max_limit: i64) -> Self {
        Self {
            page: page.max(1),
            limit: limit.max(1).min(max_limit.max(1)),
        }
    }

    /// Coerce query-string values. Missing or unparsable values use the
    /// defaults (page 1, `config.default_limit`); non-positive ones clamp to 1.
    pub fn from_query(query: &PageQuery, config: &PaginationConfig) -> Self {
        let page = parse_int(query.page.as_deref()).unwrap_or(1);
        let limit = parse_int(query.limit.as_deref()).unwrap_or(config.default_limit);
        Self::new(page, limit, config.max_limit)
    }

    pub fn page(&self) -> i64 {
        self.page
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn skip(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

fn parse_int(raw: Option<&str>) -> Option<i64> {
    let raw = raw?.trim();
    raw.parse::<i64>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub docs: Vec<T>,
    pub total_docs: i64,
    pub limit: i64,
    pub page: i64,
    pub total_pages: i64,
    /// 1-based position of the first doc on this page within the full set.
    pub paging_counter: i64,
    pub has_prev_page: bool,
    pub has_next_page: bool,
    pub prev_page: Option<i64>,
    pub next_page: Option<i64>,
}

impl<T> Page<T> {
    pub fn new(docs: Vec<T>, total_docs: i64, request: PageRequest) -> Self {
        let limit = request.limit();
        let page = request.page();
        let total_pages = ((total_docs + limit - 1) / limit).max(1);
        let has_prev_page = page > 1;
        let has_next_page = page < total_pages;

        Self {
            docs,
            total_docs,
            limit,
            page,
            total_pages,
            paging_counter: request.skip().saturating_add(1),
            has_prev_page,
            has_next_page,
            prev_page: has_prev_page.then(|| page - 1),
            next_page: has_next_page.then(|| page + 1),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            docs: self.docs.into_iter().map(f).collect(),
            total_docs: self.total_docs,
            limit: self.limit,
            page: self.page,
            total_pages: self.total_pages,
            paging_counter: self.paging_counter,
            has_prev_page: self.has_prev_page,
            has_next_page: self.has_next_page,
            prev_page: self.prev_page,
            next_page: self.next_page,
        }
    }
}
