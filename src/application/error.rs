use thiserror::Error;

use crate::{application::views::ViewsError, config::LoadError, infra::error::InfraError};

/// Failure that ends a CLI command or the server process.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Views(#[from] ViewsError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_errors_keep_their_message() {
        let error = AppError::from(ViewsError::InvalidArgument("path is required".into()));
        assert_eq!(error.to_string(), "invalid argument: path is required");

        let error = AppError::from(InfraError::telemetry("subscriber already set"));
        assert_eq!(
            error.to_string(),
            "telemetry initialization failed: subscriber already set"
        );
    }

    #[test]
    fn io_failures_keep_their_source() {
        let error = AppError::from(InfraError::from(std::io::Error::other("address in use")));
        let source = std::error::Error::source(&error).expect("io source");
        assert_eq!(source.to_string(), "address in use");
    }
}
