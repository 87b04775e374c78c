use std::net::{IpAddr, SocketAddr};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use super::error::ApiError;
use super::rate_limit::RateDecision;
use super::state::ApiState;

const FORWARDED_FOR: &str = "x-forwarded-for";
const REAL_IP: &str = "x-real-ip";
const RATE_LIMIT_LIMIT: &str = "x-ratelimit-limit";
const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
const UNKNOWN_CLIENT: &str = "unknown";

pub async fn api_rate_limit(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let limiter = &state.rate_limiter;
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let client = identify_client(request.headers(), peer, limiter.trusts_forwarded_headers());

    match limiter.check(&client) {
        RateDecision::Limited { retry_after_secs } => {
            debug!(
                target = "folio_views::api::ratelimit",
                client = %client,
                path = %request.uri().path(),
                retry_after_secs,
                "rate limit exceeded"
            );
            ApiError::RateLimited { retry_after_secs }.into_response()
        }
        RateDecision::Allowed { remaining } => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(limiter.limit()));
            headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(remaining));
            response
        }
    }
}

/// Client identity for rate limiting.
///
/// With forwarded headers trusted, the first `x-forwarded-for` hop wins, then
/// `x-real-ip`; values that are not IP addresses are ignored. The socket peer
/// is the last resort.
pub fn identify_client(headers: &HeaderMap, peer: Option<IpAddr>, trust_forwarded: bool) -> String {
    let forwarded = trust_forwarded
        .then(|| {
            header_ip(headers, FORWARDED_FOR, |value| value.split(',').next())
                .or_else(|| header_ip(headers, REAL_IP, Some))
        })
        .flatten();

    forwarded
        .or(peer)
        .map_or_else(|| UNKNOWN_CLIENT.to_string(), |ip| ip.to_string())
}

fn header_ip<'a>(
    headers: &'a HeaderMap,
    name: &str,
    pick: impl FnOnce(&'a str) -> Option<&'a str>,
) -> Option<IpAddr> {
    let value = headers.get(name)?.to_str().ok()?;
    pick(value)?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    const PEER: Option<IpAddr> = Some(IpAddr::V4(Ipv4Addr::LOCALHOST));

    #[test]
    fn forwarded_for_wins_over_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR, HeaderValue::from_static("10.0.0.1, 10.0.0.2"));
        headers.insert(REAL_IP, HeaderValue::from_static("10.0.0.9"));

        assert_eq!(identify_client(&headers, None, true), "10.0.0.1");
    }

    #[test]
    fn falls_back_to_real_ip_then_peer() {
        let mut headers = HeaderMap::new();
        headers.insert(REAL_IP, HeaderValue::from_static("10.0.0.9"));
        assert_eq!(identify_client(&headers, PEER, true), "10.0.0.9");

        let headers = HeaderMap::new();
        assert_eq!(identify_client(&headers, PEER, true), "127.0.0.1");
        assert_eq!(identify_client(&headers, None, true), "unknown");
    }

    #[test]
    fn non_ip_header_values_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR, HeaderValue::from_static("spoofed-token-42"));

        assert_eq!(identify_client(&headers, PEER, true), "127.0.0.1");
    }

    #[test]
    fn untrusted_headers_leave_only_the_peer() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR, HeaderValue::from_static("10.0.0.1"));
        headers.insert(REAL_IP, HeaderValue::from_static("10.0.0.9"));

        assert_eq!(identify_client(&headers, PEER, false), "127.0.0.1");
        assert_eq!(identify_client(&headers, None, false), "unknown");
    }
}
