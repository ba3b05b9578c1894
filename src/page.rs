//! Paginated views over a resolved collection.
//!
//! Page navigation is purely in-memory: a parse delivers the whole
//! collection up front, so changing page re-renders a slice without any
//! network call.

use std::ops::RangeInclusive;

/// Tracks shown per page.
pub const PAGE_SIZE: usize = 30;

/// Maximum number of page buttons in the navigation window.
const WINDOW: usize = 10;

/// 1-based page position over a fixed number of items.
///
/// Invariant: `1 <= current <= max(1, total_pages)`. Recomputed from
/// scratch whenever the displayed collection is replaced; never
/// persisted.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct PageView {
    current: usize,
    total_items: usize,
    page_size: usize,
}

impl PageView {
    /// A view over `total_items` items at the standard page size,
    /// positioned on page 1.
    #[must_use]
    pub fn new(total_items: usize) -> Self {
        Self::with_page_size(total_items, PAGE_SIZE)
    }

    /// A view with an explicit page size.
    ///
    /// # Panics
    ///
    /// Panics if `page_size` is zero.
    #[must_use]
    pub fn with_page_size(total_items: usize, page_size: usize) -> Self {
        assert!(page_size > 0, "page size is zero");
        Self {
            current: 1,
            total_items,
            page_size,
        }
    }

    #[must_use]
    pub fn current(&self) -> usize {
        self.current
    }

    /// Number of pages: `ceil(total / page_size)`, zero when empty.
    #[must_use]
    pub fn total_pages(&self) -> usize {
        self.total_items.div_ceil(self.page_size)
    }

    /// Half-open item range of the current page, clamped to the total.
    #[must_use]
    pub fn bounds(&self) -> (usize, usize) {
        let start = (self.current - 1) * self.page_size;
        let start = start.min(self.total_items);
        let end = (start + self.page_size).min(self.total_items);
        (start, end)
    }

    /// The current page's slice of `items`.
    ///
    /// Never reads out of bounds, also when `items` is shorter than the
    /// total this view was built for.
    #[must_use]
    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let (start, end) = self.bounds();
        let end = end.min(items.len());
        let start = start.min(end);
        &items[start..end]
    }

    /// Jumps to `page`. Returns whether the position changed; positions
    /// outside `1..=max(1, total_pages)` are rejected.
    pub fn goto(&mut self, page: usize) -> bool {
        let last = self.total_pages().max(1);
        if page < 1 || page > last || page == self.current {
            return false;
        }
        self.current = page;
        true
    }

    /// Whether a next page exists; disabled on the last page.
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.current < self.total_pages()
    }

    /// Whether a previous page exists; disabled on page 1.
    #[must_use]
    pub fn has_prev(&self) -> bool {
        self.current > 1
    }

    /// Advances one page when possible.
    pub fn next(&mut self) -> bool {
        if self.has_next() {
            self.current += 1;
            true
        } else {
            false
        }
    }

    /// Goes back one page when possible.
    pub fn prev(&mut self) -> bool {
        if self.has_prev() {
            self.current -= 1;
            true
        } else {
            false
        }
    }

    /// Page numbers of the navigation buttons.
    ///
    /// A sliding window of at most [`WINDOW`] pages, recentered so the
    /// current page stays inside it; never starts before page 1 nor runs
    /// past the last page.
    #[must_use]
    pub fn window(&self) -> RangeInclusive<usize> {
        let last = self.total_pages().max(1);
        if last <= WINDOW {
            return 1..=last;
        }

        let start = self
            .current
            .saturating_sub(WINDOW / 2 - 1)
            .clamp(1, last - WINDOW + 1);
        start..=start + WINDOW - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_count_is_ceiling_division() {
        for (total, pages) in [(0, 0), (1, 1), (29, 1), (30, 1), (31, 2), (300, 10), (301, 11)] {
            assert_eq!(PageView::new(total).total_pages(), pages, "total {total}");
        }
    }

    #[test]
    fn every_valid_page_slices_the_expected_length() {
        for total in [0usize, 1, 29, 30, 31, 95, 300] {
            let items: Vec<usize> = (0..total).collect();
            let mut view = PageView::new(total);
            for page in 1..=view.total_pages().max(1) {
                assert!(page == 1 || view.goto(page));
                let slice = view.slice(&items);
                let expected = PAGE_SIZE.min(total.saturating_sub((page - 1) * PAGE_SIZE));
                assert_eq!(slice.len(), expected, "total {total} page {page}");
                if let Some(first) = slice.first() {
                    assert_eq!(*first, (page - 1) * PAGE_SIZE);
                }
            }
        }
    }

    #[test]
    fn navigation_is_clamped_to_valid_pages() {
        let mut view = PageView::new(95);
        assert_eq!(view.total_pages(), 4);

        assert!(!view.has_prev(), "previous is disabled on page 1");
        assert!(!view.prev());
        assert!(!view.goto(0));
        assert!(!view.goto(5));

        assert!(view.goto(4));
        assert!(!view.has_next(), "next is disabled on the last page");
        assert!(!view.next());

        // Empty collections pin the view to page 1.
        let mut empty = PageView::new(0);
        assert_eq!(empty.current(), 1);
        assert!(!empty.next() && !empty.prev());
    }

    #[test]
    fn slicing_never_reads_past_a_short_delivery() {
        // The catalog declared more tracks than it delivered.
        let delivered: Vec<usize> = (0..10).collect();
        let mut view = PageView::new(40);
        assert!(view.goto(2));
        assert!(view.slice(&delivered).is_empty());
    }

    #[test]
    fn window_recenters_around_the_current_page() {
        let mut view = PageView::with_page_size(25 * PAGE_SIZE, PAGE_SIZE);
        assert_eq!(view.window(), 1..=10);

        assert!(view.goto(13));
        let window = view.window();
        assert!(window.contains(&13));
        assert_eq!(window.clone().count(), 10);
        assert_eq!(window, 9..=18);

        assert!(view.goto(25));
        assert_eq!(view.window(), 16..=25, "window never runs past the last page");

        let small = PageView::new(3 * PAGE_SIZE);
        assert_eq!(small.window(), 1..=3);
    }
}
