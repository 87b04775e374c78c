use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use httpmock::MockServer;
use url::Url;

use folio_views::application::provider::{ProviderError, ViewsProvider};
use folio_views::application::views::{ViewCountService, ViewsConfig};
use folio_views::config::ProviderSettings;
use folio_views::domain::views::CountOrigin;
use folio_views::infra::analytics::CloudflareAnalytics;

const DASHBOARD_PATH: &str = "/client/v4/zones/zone-1/analytics/dashboard";

fn adapter(server: &MockServer) -> CloudflareAnalytics {
    let settings = ProviderSettings {
        zone_id: Some("zone-1".to_string()),
        api_token: Some("token-1".to_string()),
        api_base: Url::parse(&server.url("/client/v4/")).expect("valid base url"),
        lookback_days: NonZeroU32::new(30).expect("non-zero"),
    };
    CloudflareAnalytics::from_settings(&settings)
        .expect("client builds")
        .expect("credentials configured")
}

#[tokio::test]
async fn zone_total_is_apportioned_to_route() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method("GET")
                .path(DASHBOARD_PATH)
                .header("authorization", "Bearer token-1")
                .query_param_exists("since")
                .query_param_exists("until");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"success":true,"errors":[],"result":{"totals":{"pageViews":{"all":1000}}}}"#);
        })
        .await;

    let provider = adapter(&server);
    assert_eq!(
        provider
            .fetch_views("/posts/hello-world")
            .await
            .expect("views"),
        400
    );
    assert_eq!(provider.fetch_views("/about").await.expect("views"), 50);
    mock.assert_calls_async(2).await;
}

#[tokio::test]
async fn any_success_status_is_accepted() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("GET").path(DASHBOARD_PATH);
            then.status(203)
                .header("content-type", "application/json")
                .body(r#"{"success":true,"errors":[],"result":{"totals":{"pageViews":{"all":200}}}}"#);
        })
        .await;

    assert_eq!(
        adapter(&server).fetch_views("/about").await.expect("views"),
        10
    );
}

#[tokio::test]
async fn non_success_status_is_reported() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("GET").path(DASHBOARD_PATH);
            then.status(403).body("forbidden");
        })
        .await;

    let err = adapter(&server)
        .fetch_views("/about")
        .await
        .expect_err("403 fails");
    assert!(matches!(err, ProviderError::Status { status: 403, .. }));
}

#[tokio::test]
async fn unsuccessful_payload_is_rejected() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("GET").path(DASHBOARD_PATH);
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"success":false,"errors":[{"code":10000,"message":"auth"}],"result":null}"#);
        })
        .await;

    let err = adapter(&server)
        .fetch_views("/about")
        .await
        .expect_err("rejected");
    assert_eq!(err.kind(), "rejected");
}

#[tokio::test]
async fn malformed_json_is_a_decode_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("GET").path(DASHBOARD_PATH);
            then.status(200)
                .header("content-type", "application/json")
                .body("{not json");
        })
        .await;

    let err = adapter(&server)
        .fetch_views("/about")
        .await
        .expect_err("decode fails");
    assert_eq!(err.kind(), "decode");
}

#[tokio::test]
async fn service_caches_zero_when_provider_errors() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method("GET").path(DASHBOARD_PATH);
            then.status(500).body("boom");
        })
        .await;

    let config = ViewsConfig {
        min_request_delay: Duration::ZERO,
        ..ViewsConfig::default()
    };
    let service = ViewCountService::new(config, Some(Arc::new(adapter(&server))));

    let first = service.lookup("/posts/hello-world").await.expect("lookup");
    let second = service.lookup("/posts/hello-world").await.expect("lookup");

    assert_eq!(first.views, 0);
    assert_eq!(first.origin, CountOrigin::Degraded);
    assert!(second.cached);
    mock.assert_calls_async(1).await;
}
