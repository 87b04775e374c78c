//! View-count records and the deterministic fallback generator.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::error::DomainError;

pub const HELLO_WORLD_ROUTE: &str = "/posts/hello-world";
pub const NIX_KUBERNETES_ROUTE: &str = "/posts/bun-api-with-nix-and-kubernetes";

const NIX_KUBERNETES_VIEWS: u64 = 42;
const FALLBACK_SPREAD: i32 = 45;
const FALLBACK_FLOOR: u64 = 5;

/// Where a cached count came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountOrigin {
    /// Reported by the analytics provider.
    Provider,
    /// Derived from the route hash because no provider is configured.
    Fallback,
    /// The provider failed; the count was replaced with zero.
    Degraded,
}

impl CountOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            CountOrigin::Provider => "provider",
            CountOrigin::Fallback => "fallback",
            CountOrigin::Degraded => "degraded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewCountEntry {
    pub path: String,
    pub count: u64,
    pub computed_at: OffsetDateTime,
    pub origin: CountOrigin,
}

impl ViewCountEntry {
    /// Whether the entry is still inside its time-to-live at `now`.
    pub fn is_fresh(&self, now: OffsetDateTime, ttl: time::Duration) -> bool {
        now - self.computed_at < ttl
    }
}

/// Which historical value the `hello-world` fixture reports.
///
/// The API server and the website client were shipped with different numbers
/// for the same post; both stay selectable until one of them is retired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HelloWorldFixture {
    #[default]
    Api,
    Client,
}

impl HelloWorldFixture {
    pub fn views(&self) -> u64 {
        match self {
            HelloWorldFixture::Api => 27,
            HelloWorldFixture::Client => 28,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HelloWorldFixture::Api => "api",
            HelloWorldFixture::Client => "client",
        }
    }
}

impl fmt::Display for HelloWorldFixture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HelloWorldFixture {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "api" | "server" => Ok(HelloWorldFixture::Api),
            "client" | "website" => Ok(HelloWorldFixture::Client),
            other => Err(DomainError::validation(format!(
                "unknown hello-world fixture `{other}` (expected `api` or `client`)"
            ))),
        }
    }
}

/// 32-bit string hash with multiplier 31, over UTF-16 code units.
pub fn route_hash(route: &str) -> i32 {
    route.encode_utf16().fold(0i32, |hash, unit| {
        hash.wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(i32::from(unit))
    })
}

/// Pseudo view count for a normalized route, in `5..=49` unless a fixture
/// override applies.
pub fn fallback_view_count(route: &str, fixture: HelloWorldFixture) -> u64 {
    match route {
        HELLO_WORLD_ROUTE => fixture.views(),
        NIX_KUBERNETES_ROUTE => NIX_KUBERNETES_VIEWS,
        _ => u64::from((route_hash(route) % FALLBACK_SPREAD).unsigned_abs()) + FALLBACK_FLOOR,
    }
}
