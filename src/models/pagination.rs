//! Page-number pagination shared by the list endpoints

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::{AppError, AppResult};

pub const BOOKS_PER_PAGE: i64 = 5;
pub const AUTHORS_PER_PAGE: i64 = 5;
pub const LOANS_PER_PAGE: i64 = 10;
pub const USERS_PER_PAGE: i64 = 20;

/// Page asked for in a query string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageNumber {
    Number(i64),
    /// `?page=last`
    Last,
    /// Anything that is not an integer
    Invalid,
}

impl PageNumber {
    /// Read a raw `page` value; an empty value means the first page
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        let raw = raw.map(str::trim).filter(|raw| !raw.is_empty())?;
        if raw == "last" {
            return Some(PageNumber::Last);
        }
        Some(raw.parse().map_or(PageNumber::Invalid, PageNumber::Number))
    }
}

impl From<i64> for PageNumber {
    fn from(page: i64) -> Self {
        PageNumber::Number(page)
    }
}

/// Query string accepted by every paginated list
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// 1-based page number, or `last` (default: 1)
    pub page: Option<String>,
}

impl PageQuery {
    pub fn number(&self) -> Option<PageNumber> {
        PageNumber::parse(self.page.as_deref())
    }
}

/// A resolved page window over `total` rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
}

impl Pagination {
    /// Resolve the requested page against the row count.
    ///
    /// The first page always exists, even over an empty table; any other page
    /// outside `1..=num_pages`, or one that is not a number, is reported as
    /// not found.
    pub fn resolve(requested: Option<PageNumber>, per_page: i64, total: i64) -> AppResult<Self> {
        let mut pagination = Self {
            page: 1,
            per_page: per_page.max(1),
            total: total.max(0),
        };

        pagination.page = match requested.unwrap_or(PageNumber::Number(1)) {
            PageNumber::Number(page) => page,
            PageNumber::Last => pagination.num_pages(),
            PageNumber::Invalid => {
                return Err(AppError::NotFound(
                    "Invalid page (not an integer)".to_string(),
                ))
            }
        };

        if pagination.page < 1 || pagination.page > pagination.num_pages() {
            return Err(AppError::NotFound(format!("Invalid page ({})", pagination.page)));
        }

        Ok(pagination)
    }

    pub fn num_pages(&self) -> i64 {
        if self.total == 0 {
            1
        } else {
            (self.total + self.per_page - 1) / self.per_page
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }

    pub fn limit(&self) -> i64 {
        self.per_page
    }

    pub fn has_next(&self) -> bool {
        self.page < self.num_pages()
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    /// Wrap the rows fetched for this window
    pub fn wrap<T>(&self, items: Vec<T>) -> Page<T> {
        Page {
            items,
            total: self.total,
            page: self.page,
            per_page: self.per_page,
            num_pages: self.num_pages(),
            has_next: self.has_next(),
            has_previous: self.has_previous(),
        }
    }
}

/// Paginated response wrapper
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub num_pages: i64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
            num_pages: self.num_pages,
            has_next: self.has_next,
            has_previous: self.has_previous,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eleven_rows_by_five_make_three_pages() {
        let p = Pagination::resolve(None, 5, 11).unwrap();
        assert_eq!(p.num_pages(), 3);
        assert_eq!(p.page, 1);
        assert!(p.has_next());
        assert!(!p.has_previous());
    }

    #[test]
    fn test_sequential_paging_covers_every_row_once() {
        let rows: Vec<i32> = (1..=11).collect();
        let mut seen = Vec::new();
        let mut sizes = Vec::new();
        let mut page = 1;

        loop {
            let p = Pagination::resolve(Some(PageNumber::Number(page)), 5, rows.len() as i64).unwrap();
            let window: Vec<i32> = rows
                .iter()
                .skip(p.offset() as usize)
                .take(p.limit() as usize)
                .copied()
                .collect();
            sizes.push(window.len());
            seen.extend(window);
            if !p.has_next() {
                break;
            }
            page += 1;
        }

        assert_eq!(sizes, vec![5, 5, 1]);
        assert_eq!(seen, rows);
    }

    #[test]
    fn test_empty_table_has_one_page() {
        let p = Pagination::resolve(Some(PageNumber::Number(1)), 10, 0).unwrap();
        assert_eq!(p.num_pages(), 1);
        assert!(!p.has_next());
        assert!(p.wrap(Vec::<i32>::new()).items.is_empty());
    }

    #[test]
    fn test_out_of_range_page_is_not_found() {
        assert!(matches!(
            Pagination::resolve(Some(PageNumber::Number(4)), 5, 11),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            Pagination::resolve(Some(PageNumber::Number(0)), 5, 11),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_last_page_window() {
        let p = Pagination::resolve(Some(PageNumber::Number(3)), 5, 11).unwrap();
        assert_eq!(p.offset(), 10);
        let page = p.wrap(vec!["k"]);
        assert_eq!(page.num_pages, 3);
        assert!(page.has_previous);
        assert!(!page.has_next);
    }

    #[test]
    fn test_page_value_parsing() {
        assert_eq!(PageNumber::parse(None), None);
        assert_eq!(PageNumber::parse(Some("")), None);
        assert_eq!(PageNumber::parse(Some(" 2 ")), Some(PageNumber::Number(2)));
        assert_eq!(PageNumber::parse(Some("last")), Some(PageNumber::Last));
        assert_eq!(PageNumber::parse(Some("abc")), Some(PageNumber::Invalid));
        assert_eq!(PageNumber::parse(Some("1.5")), Some(PageNumber::Invalid));
    }

    #[test]
    fn test_non_integer_page_is_not_found() {
        let query = PageQuery {
            page: Some("abc".to_string()),
        };
        assert!(matches!(
            Pagination::resolve(query.number(), 5, 11),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_last_page_by_name() {
        let p = Pagination::resolve(Some(PageNumber::Last), 5, 11).unwrap();
        assert_eq!(p.page, 3);
        assert_eq!(Pagination::resolve(Some(PageNumber::Last), 5, 0).unwrap().page, 1);
    }
}
