//! `{count, next, previous, results}` offset pagination (spec §6).

use serde::{Deserialize, Serialize};

const DEFAULT_PAGE_SIZE: u32 = 50;
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
}

impl PageQuery {
    pub fn limit_offset(&self) -> (u32, u32) {
        let limit = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        (limit, self.offset.unwrap_or(0))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub count: u32,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(results: Vec<T>, count: u32, query: &PageQuery) -> Self {
        let (limit, offset) = query.limit_offset();
        let next = if offset + (results.len() as u32) < count {
            Some(format!("offset={}&page_size={}", offset + limit, limit))
        } else {
            None
        };
        let previous = if offset > 0 { Some(format!("offset={}&page_size={}", offset.saturating_sub(limit), limit)) } else { None };
        Self { count, next, previous, results }
    }
}
