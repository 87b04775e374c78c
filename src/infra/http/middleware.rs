use std::time::Instant;

use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tracing::{error, warn};
use uuid::Uuid;

use super::api::error::ErrorReport;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Per-request identifier, echoed back in `x-request-id`.
#[derive(Debug, Clone)]
pub struct RequestId(pub Uuid);

pub async fn set_request_id(mut request: Request<Body>, next: Next) -> Response {
    let id = RequestId(Uuid::new_v4());
    request.extensions_mut().insert(id.clone());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id.0.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Log every 4xx/5xx with the route template, the error code and its detail.
pub async fn log_failures(request: Request<Body>, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string());
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.to_string())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let (code, detail) = match response.extensions_mut().remove::<ErrorReport>() {
        Some(report) => (report.code, report.detail),
        None => ("unreported", "no diagnostic available".to_string()),
    };
    let route = route.as_deref().unwrap_or("unmatched");
    let elapsed_ms = started.elapsed().as_millis() as u64;

    if status.is_server_error() {
        error!(
            target = "folio_views::http::response",
            status = status.as_u16(),
            %method,
            route,
            path = %path,
            code,
            detail = %detail,
            elapsed_ms,
            request_id = %request_id,
            "request failed"
        );
    } else {
        warn!(
            target = "folio_views::http::response",
            status = status.as_u16(),
            %method,
            route,
            path = %path,
            code,
            detail = %detail,
            elapsed_ms,
            request_id = %request_id,
            "request rejected"
        );
    }

    response
}
