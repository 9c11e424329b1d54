//! Paging and sorting primitives shared by list queries.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_NUMBER: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Replaces zero page number/size with the defaults.
pub fn normalize_page(page_number: u32, page_size: u32) -> (u32, u32) {
    let number = if page_number == 0 {
        DEFAULT_PAGE_NUMBER
    } else {
        page_number
    };
    let size = if page_size == 0 {
        DEFAULT_PAGE_SIZE
    } else {
        page_size
    };
    (number, size)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortColumn {
    #[default]
    Name,
    CreatedAt,
    ExpectedStartDate,
    Budget,
    OwnerId,
    Currency,
}

impl SortColumn {
    pub const ALL: [SortColumn; 6] = [
        Self::Name,
        Self::CreatedAt,
        Self::ExpectedStartDate,
        Self::Budget,
        Self::OwnerId,
        Self::Currency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "Name",
            Self::CreatedAt => "CreatedAt",
            Self::ExpectedStartDate => "ExpectedStartDate",
            Self::Budget => "Budget",
            Self::OwnerId => "OwnerId",
            Self::Currency => "Currency",
        }
    }
}

impl fmt::Display for SortColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortColumn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|column| column.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown sort column: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ascending => "Ascending",
            Self::Descending => "Descending",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ascending" | "asc" => Ok(Self::Ascending),
            "descending" | "desc" => Ok(Self::Descending),
            _ => Err(format!("unknown sort direction: {s}")),
        }
    }
}

/// One page of a listing plus the counters clients use to render pagers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub total_pages: u64,
    pub total_items_count: u64,
    pub items_from: u64,
    pub items_to: u64,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, total_count: u64, page_size: u32, page_number: u32) -> Self {
        let size = u64::from(page_size.max(1));
        let number = u64::from(page_number.max(1));
        let items_from = size * (number - 1) + 1;
        Self {
            items,
            total_pages: total_count.div_ceil(size),
            total_items_count: total_count,
            items_from,
            items_to: items_from + size - 1,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PagedResult<U> {
        PagedResult {
            items: self.items.into_iter().map(f).collect(),
            total_pages: self.total_pages,
            total_items_count: self.total_items_count,
            items_from: self.items_from,
            items_to: self.items_to,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_page_defaults() {
        assert_eq!(normalize_page(0, 0), (1, 10));
        assert_eq!(normalize_page(3, 25), (3, 25));
    }

    #[test]
    fn test_paged_result_counters() {
        let page = PagedResult::new(vec!["a", "b"], 23, 10, 3);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.total_items_count, 23);
        assert_eq!(page.items_from, 21);
        assert_eq!(page.items_to, 30);
    }

    #[test]
    fn test_empty_listing_has_no_pages() {
        let page = PagedResult::<u8>::new(vec![], 0, 10, 1);
        assert_eq!(page.total_pages, 0);
        assert_eq!(page.items_from, 1);
    }

    #[test]
    fn test_sort_parsing_is_case_insensitive() {
        assert_eq!("budget".parse(), Ok(SortColumn::Budget));
        assert_eq!("DESC".parse(), Ok(SortDirection::Descending));
        assert!("Owner".parse::<SortColumn>().is_err());
    }
}
