//! View-count cache.
//!
//! A single process-local map from normalized route to the last computed
//! count. Freshness is decided by the caller's clock and time-to-live; the
//! store itself only guarantees that `computed_at` is monotonic per route.
//!
//! ## Configuration
//!
//! ```toml
//! [views]
//! cache_ttl_seconds = 3600
//! ```

pub(crate) mod lock;
mod store;

pub use store::ViewCache;
pub(crate) use store::{METRIC_CACHE_ENTRIES, METRIC_CACHE_HIT, METRIC_CACHE_MISS};
