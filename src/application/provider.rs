//! Seam between the view-count service and an analytics backend.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("analytics request failed: {0}")]
    Transport(String),
    #[error("analytics provider returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("analytics provider rejected the query: {0}")]
    Rejected(String),
    #[error("analytics response could not be decoded: {0}")]
    Decode(String),
    #[error("analytics request timed out after {seconds}s")]
    Timeout { seconds: u64 },
}

impl ProviderError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }

    pub fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode(err.to_string())
    }

    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Transport(_) => "transport",
            ProviderError::Status { .. } => "status",
            ProviderError::Rejected(_) => "rejected",
            ProviderError::Decode(_) => "decode",
            ProviderError::Timeout { .. } => "timeout",
        }
    }
}

/// Source of real view counts for a normalized route.
#[async_trait]
pub trait ViewsProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn fetch_views(&self, route: &str) -> Result<u64, ProviderError>;
}
