pub mod api;
mod middleware;

pub use api::rate_limit::ApiRateLimiter;
pub use api::{ApiState, build_api_router};

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::get,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

use crate::config::CorsSettings;

/// Assemble the public router: view API, health check, CORS and request logging.
pub fn build_router(state: ApiState, cors: &CorsSettings) -> Router {
    let health = Router::new()
        .route("/health", get(api::handlers::health))
        .with_state(state.clone());

    Router::new()
        .merge(build_api_router(state))
        .merge(health)
        .fallback(api::handlers::not_found)
        .layer(cors_layer(cors))
        .layer(axum_middleware::from_fn(middleware::log_failures))
        .layer(axum_middleware::from_fn(middleware::set_request_id))
}

fn cors_layer(settings: &CorsSettings) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    if settings.allowed_origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = settings
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(
                    target = "folio_views::http",
                    origin = %origin,
                    error = %err,
                    "Ignoring invalid CORS origin"
                );
                None
            }
        })
        .collect();

    // Credentials are only allowed with an explicit origin list.
    layer
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
}
