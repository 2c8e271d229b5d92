//! Paginated response envelope

use serde::{Deserialize, Serialize};

/// The envelope every list endpoint returns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_pages: i64,
    pub total_items: i64,
}

impl<T> Page<T> {
    /// Builds an envelope from one page of items and the unpaged total.
    pub fn new(items: Vec<T>, total_items: i64, limit: i64) -> Self {
        let total_pages = if total_items == 0 {
            0
        } else {
            (total_items + limit - 1) / limit
        };
        Self {
            items,
            total_pages,
            total_items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pages_rounds_up() {
        let page = Page::new(vec![1, 2, 3], 25, 10);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.total_items, 25);
    }

    #[test]
    fn test_empty_result_has_zero_pages() {
        let page: Page<i32> = Page::new(vec![], 0, 10);
        assert_eq!(page.total_pages, 0);
    }
}
