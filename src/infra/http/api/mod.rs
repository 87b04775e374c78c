pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod rate_limit;
pub mod state;

pub use state::ApiState;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

pub fn build_api_router(state: ApiState) -> Router {
    let rate_state = state.clone();

    Router::new()
        .route("/api/views/page", get(handlers::page_views))
        .route("/api/views/bulk", post(handlers::bulk_views))
        .route("/api/views/posts", post(handlers::preload_post_views))
        .route("/api/views/posts/{slug}", get(handlers::post_views))
        .with_state(state)
        .layer(axum_middleware::from_fn_with_state(
            rate_state,
            middleware::api_rate_limit,
        ))
}
