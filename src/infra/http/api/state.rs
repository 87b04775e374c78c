use std::sync::Arc;

use crate::application::views::ViewCountService;

use super::rate_limit::ApiRateLimiter;

#[derive(Clone)]
pub struct ApiState {
    pub views: Arc<ViewCountService>,
    pub rate_limiter: Arc<ApiRateLimiter>,
}

impl ApiState {
    pub fn new(views: Arc<ViewCountService>, rate_limiter: ApiRateLimiter) -> Self {
        Self {
            views,
            rate_limiter: Arc::new(rate_limiter),
        }
    }
}
