//! Server-side pagination used by every listing table.
//!
//! The API wraps list responses in `{count, next, previous, results}`; the
//! table keeps a `Pager` (current page, rows per page, total count) and turns
//! it into a `ListQuery` for the next fetch.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Rows-per-page choices offered by the table footer.
pub const PAGE_SIZE_OPTIONS: &[u32] = &[10, 25, 50, 100];

/// Default rows per page.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Pagination envelope returned by every list endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub count: u64,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<T>,
}

/// Query parameters for a list request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListQuery {
    /// 1-based page number.
    pub page: u32,
    pub page_size: u32,
    pub search: Option<String>,
    /// Field name, `-` prefixed for descending.
    pub ordering: Option<String>,
    pub filters: BTreeMap<String, String>,
}

impl ListQuery {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.max(1),
            ..Self::default()
        }
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        let term = term.into();
        self.search = if term.trim().is_empty() { None } else { Some(term) };
        self
    }

    pub fn ordering(mut self, field: impl Into<String>) -> Self {
        self.ordering = Some(field.into());
        self
    }

    pub fn filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    /// Renders the query string pairs in a stable order.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("page".to_string(), self.page.to_string()),
            ("page_size".to_string(), self.page_size.to_string()),
        ];
        if let Some(search) = &self.search {
            pairs.push(("search".to_string(), search.clone()));
        }
        if let Some(ordering) = &self.ordering {
            pairs.push(("ordering".to_string(), ordering.clone()));
        }
        pairs.extend(self.filters.iter().map(|(k, v)| (k.clone(), v.clone())));
        pairs
    }
}

/// Table pagination state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pager {
    page: u32,
    page_size: u32,
    count: u64,
}

impl Default for Pager {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            count: 0,
        }
    }
}

impl Pager {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size: page_size.max(1),
            ..Self::default()
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Total number of pages; an empty table still has one page.
    pub fn total_pages(&self) -> u32 {
        let pages = self.count.div_ceil(u64::from(self.page_size)).max(1);
        u32::try_from(pages).unwrap_or(u32::MAX)
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    /// Moves to `page`, clamped to the valid range.
    pub fn go_to(&mut self, page: u32) {
        self.page = page.clamp(1, self.total_pages());
    }

    /// Changing rows-per-page returns to the first page.
    pub fn set_page_size(&mut self, page_size: u32) {
        self.page_size = page_size.max(1);
        self.page = 1;
    }

    /// Records the server's total after a fetch; a shrunken result set pulls
    /// the current page back into range.
    pub fn update_from<T>(&mut self, page: &Page<T>) {
        self.count = page.count;
        if self.page > self.total_pages() {
            self.page = self.total_pages();
        }
    }

    /// Query for the current page.
    pub fn query(&self) -> ListQuery {
        ListQuery::new(self.page, self.page_size)
    }
}
