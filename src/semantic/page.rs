//! Offset/limit paging applied on top of a full ranked list.

use serde::{Deserialize, Serialize};

/// Default number of results per page
pub const DEFAULT_PAGE_SIZE: usize = 9;

/// Requested page window. A `limit` of 0 means "use the default".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct PageRequest {
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub limit: usize,
}

impl PageRequest {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    /// Resolve the effective limit: 0 falls back to `default`, anything above
    /// `max` is clamped.
    pub fn effective_limit(&self, default: usize, max: usize) -> usize {
        let limit = if self.limit == 0 { default } else { self.limit };
        limit.min(max).max(1)
    }
}

/// One window of a ranked list.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Length of the full list
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    pub has_more: bool,
}

impl<T> Page<T> {
    /// Cut `[offset, offset + limit)` out of `items`.
    ///
    /// An offset past the end yields an empty page.
    pub fn slice(items: Vec<T>, offset: usize, limit: usize) -> Self {
        let total = items.len();
        let items: Vec<T> = items.into_iter().skip(offset).take(limit).collect();
        let has_more = offset.saturating_add(items.len()) < total;

        Self {
            items,
            total,
            offset,
            limit,
            has_more,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_limit() {
        assert_eq!(PageRequest::default().effective_limit(DEFAULT_PAGE_SIZE, 100), 9);
        assert_eq!(PageRequest::new(0, 20).effective_limit(9, 100), 20);
        assert_eq!(PageRequest::new(0, 500).effective_limit(9, 100), 100);
    }

    #[test]
    fn test_slice_pages() {
        let items: Vec<u32> = (0..20).collect();

        let first = Page::slice(items.clone(), 0, DEFAULT_PAGE_SIZE);
        assert_eq!(first.items, (0..9).collect::<Vec<_>>());
        assert_eq!(first.total, 20);
        assert!(first.has_more);

        let last = Page::slice(items.clone(), 18, DEFAULT_PAGE_SIZE);
        assert_eq!(last.items, vec![18, 19]);
        assert!(!last.has_more);

        let past_end = Page::slice(items, 40, DEFAULT_PAGE_SIZE);
        assert!(past_end.items.is_empty());
        assert_eq!(past_end.total, 20);
        assert!(!past_end.has_more);
    }
}
