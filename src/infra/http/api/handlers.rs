use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;

use super::error::ApiError;
use super::models::*;
use super::state::ApiState;

pub async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        mode: state.views.mode(),
        cached_routes: state.views.cache().len(),
    })
}

pub async fn page_views(
    State(state): State<ApiState>,
    query: Result<Query<PageViewsQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) =
        query.map_err(|err| ApiError::malformed("Invalid query", err.body_text()))?;

    let path = query
        .path
        .filter(|path| !path.trim().is_empty())
        .ok_or(ApiError::MissingPath)?;

    let views = state.views.get_views(&path).await?;
    Ok(Json(PageViewsResponse { views }))
}

pub async fn bulk_views(
    State(state): State<ApiState>,
    payload: Result<Json<BulkViewsRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload.map_err(|err| {
        ApiError::malformed("Routes must be an array of strings", err.body_text())
    })?;

    let views = state.views.get_bulk_views(&payload.routes).await;
    Ok(Json(BulkViewsResponse { views }))
}

pub async fn post_views(
    State(state): State<ApiState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let views = state.views.post_views(&slug).await?;
    Ok(Json(PostViewsResponse { slug, views }))
}

pub async fn preload_post_views(
    State(state): State<ApiState>,
    payload: Result<Json<PreloadPostViewsRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload.map_err(|err| {
        ApiError::malformed("Slugs must be an array of strings", err.body_text())
    })?;

    let views = state.views.preload_post_views(&payload.slugs).await;
    Ok(Json(BulkViewsResponse { views }))
}

pub async fn not_found() -> ApiError {
    ApiError::UnknownRoute
}
