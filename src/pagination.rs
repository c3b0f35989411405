use serde::{Deserialize, Serialize};
use utoipa::IntoParams;

/// Number of posts shown on every listing page.
pub const POSTS_PER_PAGE: i64 = 10;

/// PageQuery
///
/// The `?page=` query parameter. Kept as a raw string so that garbage input
/// degrades to the first page instead of being rejected by the extractor.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct PageQuery {
    /// 1-based page number.
    pub page: Option<String>,
}

/// PageWindow
///
/// The slice of a collection a page covers, resolved before any row is fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub number: i64,
    pub num_pages: i64,
    pub count: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Paginator
///
/// Splits an ordered collection of `count` items into fixed-size pages.
#[derive(Debug, Clone, Copy)]
pub struct Paginator {
    per_page: i64,
}

impl Default for Paginator {
    fn default() -> Self {
        Self::new(POSTS_PER_PAGE)
    }
}

impl Paginator {
    pub fn new(per_page: i64) -> Self {
        Self {
            per_page: per_page.max(1),
        }
    }

    pub fn per_page(&self) -> i64 {
        self.per_page
    }

    /// An empty collection still has a single, empty first page.
    pub fn num_pages(&self, count: i64) -> i64 {
        if count <= 0 {
            1
        } else {
            (count + self.per_page - 1) / self.per_page
        }
    }

    /// Resolves a page token leniently:
    /// missing or non-numeric → first page, out of range (including zero and negatives) → last page.
    pub fn window(&self, count: i64, token: Option<&str>) -> PageWindow {
        let num_pages = self.num_pages(count);
        let number = match token.map(str::trim).and_then(|t| t.parse::<i64>().ok()) {
            None => 1,
            Some(n) if n < 1 || n > num_pages => num_pages,
            Some(n) => n,
        };

        PageWindow {
            number,
            num_pages,
            count: count.max(0),
            limit: self.per_page,
            offset: (number - 1) * self.per_page,
        }
    }
}

/// Page
///
/// One page of results together with the navigation data listing templates need.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page<T> {
    pub object_list: Vec<T>,
    pub number: i64,
    pub num_pages: i64,
    pub count: i64,
    pub has_next: bool,
    pub has_previous: bool,
    pub next_page_number: Option<i64>,
    pub previous_page_number: Option<i64>,
}

impl<T> Page<T> {
    pub fn new(object_list: Vec<T>, window: PageWindow) -> Self {
        let has_next = window.number < window.num_pages;
        let has_previous = window.number > 1;
        Self {
            object_list,
            number: window.number,
            num_pages: window.num_pages,
            count: window.count,
            has_next,
            has_previous,
            next_page_number: has_next.then_some(window.number + 1),
            previous_page_number: has_previous.then_some(window.number - 1),
        }
    }
}
