//! Request and response shapes shared by catalog endpoints

use serde::{Deserialize, Serialize};

use crate::config::PAGE_LIMIT_MAX;

/// Window into a paged listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub offset: u32,
    pub limit: u32,
}

impl Pagination {
    /// First page at the given size, clamped to what the catalog serves
    pub fn first(limit: u32) -> Self {
        Self {
            offset: 0,
            limit: limit.clamp(1, PAGE_LIMIT_MAX),
        }
    }

    pub fn next(self) -> Self {
        Self {
            offset: self.offset + self.limit,
            limit: self.limit,
        }
    }

    pub fn to_query(self) -> Vec<(String, String)> {
        vec![
            ("_offset".to_string(), self.offset.to_string()),
            ("_limit".to_string(), self.limit.to_string()),
        ]
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::first(PAGE_LIMIT_MAX)
    }
}

/// One page of a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPage<T> {
    #[serde(rename = "data", default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(rename = "result_count", default)]
    pub count: u32,
    #[serde(rename = "result_offset", default)]
    pub offset: u32,
    /// Page size the server applied; shorter pages mean the listing ended
    #[serde(rename = "result_limit", default)]
    pub size: u32,
    #[serde(rename = "result_total", default)]
    pub total: u32,
}

/// Field filters for listing endpoints
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestFilter {
    pub id_in: Vec<i64>,
    pub game_id: Option<i64>,
}

impl RequestFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id_in<I: IntoIterator<Item = i64>>(mut self, ids: I) -> Self {
        self.id_in = ids.into_iter().collect();
        self
    }

    pub fn with_game_id(mut self, game_id: i64) -> Self {
        self.game_id = Some(game_id);
        self
    }

    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        if !self.id_in.is_empty() {
            let ids: Vec<String> = self.id_in.iter().map(i64::to_string).collect();
            query.push(("id-in".to_string(), ids.join(",")));
        }
        if let Some(game_id) = self.game_id {
            query.push(("game_id".to_string(), game_id.to_string()));
        }
        query
    }
}

/// Error body returned by the catalog
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: String,
}
