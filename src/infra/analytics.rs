//! Cloudflare zone analytics adapter.
//!
//! The dashboard endpoint only reports zone-wide totals, so the count for a
//! single route is an apportioned share of the zone's page views over the
//! lookback window.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use time::{
    Date, Duration, OffsetDateTime, format_description::BorrowedFormatItem,
    macros::format_description,
};
use tracing::debug;

use crate::application::provider::{ProviderError, ViewsProvider};
use crate::config::ProviderSettings;
use crate::domain::views::{HELLO_WORLD_ROUTE, NIX_KUBERNETES_ROUTE};

use super::error::InfraError;

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");
const DEFAULT_ROUTE_SHARE: f64 = 0.05;
const ROUTE_SHARES: &[(&str, f64)] = &[(HELLO_WORLD_ROUTE, 0.4), (NIX_KUBERNETES_ROUTE, 0.6)];

#[derive(Debug, Clone)]
pub struct CloudflareAnalytics {
    client: Client,
    api_base: Url,
    zone_id: String,
    api_token: String,
    lookback_days: u32,
}

impl CloudflareAnalytics {
    /// Build the adapter when both credentials are present.
    ///
    /// Returns `Ok(None)` if either the zone id or the token is missing, which
    /// leaves the view service in fallback mode.
    pub fn from_settings(settings: &ProviderSettings) -> Result<Option<Self>, InfraError> {
        let (Some(zone_id), Some(api_token)) =
            (settings.zone_id.as_ref(), settings.api_token.as_ref())
        else {
            return Ok(None);
        };

        let client = Client::builder()
            .user_agent(Self::user_agent())
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;

        Ok(Some(Self {
            client,
            api_base: settings.api_base.clone(),
            zone_id: zone_id.clone(),
            api_token: api_token.clone(),
            lookback_days: settings.lookback_days.get(),
        }))
    }

    pub fn user_agent() -> &'static str {
        concat!("folio-views/", env!("CARGO_PKG_VERSION"))
    }

    /// Dashboard URL covering the lookback window that ends on `today`.
    pub fn dashboard_url(&self, today: Date) -> Result<Url, ProviderError> {
        let since = today
            .checked_sub(Duration::days(i64::from(self.lookback_days)))
            .unwrap_or(Date::MIN);

        let mut url = self
            .api_base
            .join(&format!("zones/{}/analytics/dashboard", self.zone_id))
            .map_err(ProviderError::transport)?;
        url.query_pairs_mut()
            .append_pair("since", &format_date(since)?)
            .append_pair("until", &format_date(today)?);
        Ok(url)
    }

    async fn zone_page_views(&self) -> Result<u64, ProviderError> {
        let url = self.dashboard_url(OffsetDateTime::now_utc().date())?;
        debug!(
            target = "folio_views::analytics",
            url = %url,
            "Requesting zone analytics"
        );

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(ProviderError::transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: DashboardResponse = response.json().await.map_err(ProviderError::decode)?;
        if !payload.success {
            let errors = serde_json::to_string(&payload.errors).unwrap_or_default();
            return Err(ProviderError::Rejected(errors));
        }

        payload
            .result
            .map(|result| result.totals.page_views.all)
            .ok_or_else(|| ProviderError::decode("response is missing `result.totals`"))
    }
}

#[async_trait]
impl ViewsProvider for CloudflareAnalytics {
    fn name(&self) -> &'static str {
        "cloudflare"
    }

    async fn fetch_views(&self, route: &str) -> Result<u64, ProviderError> {
        let total = self.zone_page_views().await?;
        let views = apportion(total, route);
        debug!(
            target = "folio_views::analytics",
            route,
            total,
            views,
            "Apportioned zone page views"
        );
        Ok(views)
    }
}

/// Fraction of zone-wide page views attributed to `route`.
pub fn route_share(route: &str) -> f64 {
    ROUTE_SHARES
        .iter()
        .find(|(candidate, _)| *candidate == route)
        .map(|(_, share)| *share)
        .unwrap_or(DEFAULT_ROUTE_SHARE)
}

pub fn apportion(total: u64, route: &str) -> u64 {
    (total as f64 * route_share(route)).floor() as u64
}

fn format_date(date: Date) -> Result<String, ProviderError> {
    date.format(DATE_FORMAT).map_err(ProviderError::decode)
}

#[derive(Debug, Deserialize)]
struct DashboardResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
    result: Option<DashboardResult>,
}

#[derive(Debug, Deserialize)]
struct DashboardResult {
    totals: DashboardTotals,
}

#[derive(Debug, Deserialize)]
struct DashboardTotals {
    #[serde(rename = "pageViews")]
    page_views: PageViewTotals,
}

#[derive(Debug, Deserialize)]
struct PageViewTotals {
    #[serde(default)]
    all: u64,
}
