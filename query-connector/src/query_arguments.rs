//! The connector-facing request shape: a parsed, validated counterpart of
//! the wire-level `Request` object (spec §6), independent of dialect.

use std::collections::BTreeMap;

use indexmap::IndexSet;

use crate::error::ConnectorError;
use crate::filter::FilterTree;

/// Sort direction parsed out of a `-`-prefixed path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// One entry of a parsed `sort` list: a dotted field path and a direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    pub path: Vec<String>,
    pub direction: Direction,
}

/// Which summary fields the caller wants back in `meta`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaRequest {
    pub total_count: bool,
    pub filter_count: bool,
}

impl MetaRequest {
    pub fn parse(csv: &str) -> MetaRequest {
        let mut meta = MetaRequest::default();
        for token in csv.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match token {
                "totalCount" => meta.total_count = true,
                "filterCount" => meta.filter_count = true,
                "*" => {
                    meta.total_count = true;
                    meta.filter_count = true;
                }
                _ => {}
            }
        }
        meta
    }

    pub fn any(&self) -> bool {
        self.total_count || self.filter_count
    }
}

/// Page/limit pagination. `limit = 0` means unbounded; `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    pub fn offset(&self) -> u64 {
        if self.page <= 1 {
            0
        } else {
            (self.page as u64 - 1) * self.limit as u64
        }
    }
}

/// A parsed `deep` block: per-relation nested query arguments, resolved
/// recursively by the deep-relation resolver, not by the planner.
pub type DeepRequests = BTreeMap<String, QueryArguments>;

/// The fully parsed, connector-agnostic request. Built once per call and
/// never mutated afterwards.
#[derive(Debug, Clone)]
pub struct QueryArguments {
    pub table_name: String,
    pub fields: IndexSet<String>,
    pub filter: Option<FilterTree>,
    pub sort: Vec<SortField>,
    pub pagination: Pagination,
    pub meta: MetaRequest,
    pub deep: DeepRequests,
    pub debug_mode: bool,
}

impl QueryArguments {
    pub fn parse_fields(raw: Option<&str>) -> IndexSet<String> {
        let raw = raw.unwrap_or("*");
        raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect()
    }

    pub fn parse_sort(raw: Option<&str>) -> Result<Vec<SortField>, ConnectorError> {
        let Some(raw) = raw else { return Ok(Vec::new()) };

        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|segment| {
                let (direction, path) = match segment.strip_prefix('-') {
                    Some(rest) => (Direction::Desc, rest),
                    None => (Direction::Asc, segment),
                };
                if path.is_empty() {
                    return Err(ConnectorError::validation("sort path must not be empty"));
                }
                Ok(SortField {
                    path: path.split('.').map(String::from).collect(),
                    direction,
                })
            })
            .collect()
    }

    pub fn parse_pagination(page: Option<u32>, limit: Option<u32>, default_limit: u32) -> Result<Pagination, ConnectorError> {
        let page = page.unwrap_or(1);
        if page < 1 {
            return Err(ConnectorError::validation("page must be >= 1"));
        }
        Ok(Pagination {
            page,
            limit: limit.unwrap_or(default_limit),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_parses_direction_and_path() {
        let sort = QueryArguments::parse_sort(Some("-name,createdAt")).unwrap();
        assert_eq!(sort[0].direction, Direction::Desc);
        assert_eq!(sort[0].path, vec!["name".to_string()]);
        assert_eq!(sort[1].direction, Direction::Asc);
        assert_eq!(sort[1].path, vec!["createdAt".to_string()]);
    }

    #[test]
    fn meta_star_enables_both_flags() {
        let meta = MetaRequest::parse("*");
        assert!(meta.total_count && meta.filter_count);
    }

    #[test]
    fn pagination_offset_is_zero_on_first_page() {
        let p = Pagination { page: 1, limit: 20 };
        assert_eq!(p.offset(), 0);
        let p2 = Pagination { page: 3, limit: 20 };
        assert_eq!(p2.offset(), 40);
    }

    #[test]
    fn page_below_one_is_rejected() {
        assert!(QueryArguments::parse_pagination(Some(0), None, 20).is_err());
    }

    #[test]
    fn default_fields_is_wildcard() {
        let fields = QueryArguments::parse_fields(None);
        assert!(fields.contains("*"));
    }
}
