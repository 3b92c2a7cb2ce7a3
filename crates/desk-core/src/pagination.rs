//! # Pagination
//!
//! Offset/limit windowing for collection endpoints.

use serde::{Deserialize, Serialize};

/// Default page size when the client does not ask for one.
pub const DEFAULT_LIMIT: usize = 50;

/// Largest page a client may request.
pub const MAX_LIMIT: usize = 200;

/// Requested window into a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub limit: usize,
    pub offset: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl PageRequest {
    /// Build a request from optional query values, clamping the limit to
    /// `1..=MAX_LIMIT`.
    pub fn new(limit: Option<usize>, offset: Option<usize>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }
}

/// One page of results plus the size of the full collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// Cut a page out of an already filtered and ordered collection.
pub fn paginate<T>(items: Vec<T>, request: &PageRequest) -> Page<T> {
    let total = items.len();
    let items = items
        .into_iter()
        .skip(request.offset)
        .take(request.limit)
        .collect();
    Page {
        items,
        total,
        limit: request.limit,
        offset: request.offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_clamped() {
        assert_eq!(PageRequest::new(Some(0), None).limit, 1);
        assert_eq!(PageRequest::new(Some(10_000), None).limit, MAX_LIMIT);
        assert_eq!(PageRequest::new(None, None).limit, DEFAULT_LIMIT);
    }

    #[test]
    fn paginate_windows() {
        let page = paginate((0..10).collect(), &PageRequest::new(Some(3), Some(4)));
        assert_eq!(page.items, vec![4, 5, 6]);
        assert_eq!(page.total, 10);
    }

    #[test]
    fn offset_past_end_is_empty() {
        let page = paginate(vec![1, 2], &PageRequest::new(Some(5), Some(9)));
        assert!(page.items.is_empty());
        assert_eq!(page.total, 2);
    }
}
