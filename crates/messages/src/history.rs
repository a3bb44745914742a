//! Chronological message-history pages.

use serde::Serialize;

use crate::{Error, Result, model::CanonicalMessage};

/// A validated 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    size: u32,
}

impl PageRequest {
    /// Validate `page`/`size`, clamping `size` to `max_size`.
    pub fn new(page: u32, size: u32, max_size: u32) -> Result<Self> {
        if page == 0 {
            return Err(Error::validation("page must be at least 1"));
        }
        if size == 0 {
            return Err(Error::validation("limit must be at least 1"));
        }
        Ok(Self {
            page,
            size: size.min(max_size.max(1)),
        })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Rows to skip in newest-first order.
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.size)
    }

    /// Rows to fetch: one more than the page so `has_more` is exact.
    pub fn fetch_limit(&self) -> u32 {
        self.size.saturating_add(1)
    }
}

/// One page of history, oldest message first.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub messages: Vec<CanonicalMessage>,
    #[serde(rename = "hasMore")]
    pub has_more: bool,
}

impl HistoryPage {
    /// Build a page from up to `fetch_limit()` rows in newest-first order.
    pub fn from_newest_first(mut rows: Vec<CanonicalMessage>, request: PageRequest) -> Self {
        let size = request.size() as usize;
        let has_more = rows.len() > size;
        rows.truncate(size);
        rows.reverse();
        Self {
            messages: rows,
            has_more,
        }
    }
}
