use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::views::CountOrigin;

#[derive(Debug, Deserialize, Serialize)]
pub struct PageViewsQuery {
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct PageViewsResponse {
    pub views: u64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct BulkViewsRequest {
    pub routes: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct BulkViewsResponse {
    pub views: BTreeMap<String, u64>,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct PostViewsResponse {
    pub slug: String,
    pub views: u64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PreloadPostViewsRequest {
    pub slugs: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// `provider` or `fallback`.
    pub mode: &'static str,
    pub cached_routes: usize,
}

/// Per-path detail emitted by the `views --detailed` command.
#[derive(Debug, Serialize)]
pub struct ViewDetail {
    pub views: u64,
    pub origin: CountOrigin,
    pub cached: bool,
}
