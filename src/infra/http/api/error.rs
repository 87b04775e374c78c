use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::views::ViewsError;

/// Diagnostic attached to error responses and picked up by the response logger.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub code: &'static str,
    pub detail: String,
}

/// Failures the view API reports to callers.
#[derive(Debug)]
pub enum ApiError {
    /// `?path=` absent or blank.
    MissingPath,
    /// Query string or JSON body did not decode; `expected` says what was wanted.
    Malformed {
        expected: &'static str,
        detail: String,
    },
    /// Input decoded but names nothing countable (e.g. a blank slug).
    InvalidInput(String),
    UnknownRoute,
    RateLimited {
        retry_after_secs: u64,
    },
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: ErrorMessage<'a>,
}

#[derive(Debug, Serialize)]
struct ErrorMessage<'a> {
    code: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<&'a str>,
}

impl ApiError {
    pub fn malformed(expected: &'static str, detail: impl Into<String>) -> Self {
        Self::Malformed {
            expected,
            detail: detail.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingPath | Self::Malformed { .. } | Self::InvalidInput(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::UnknownRoute => StatusCode::NOT_FOUND,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingPath | Self::Malformed { .. } => "bad_request",
            Self::InvalidInput(_) => "invalid_input",
            Self::UnknownRoute => "not_found",
            Self::RateLimited { .. } => "rate_limited",
        }
    }

    fn message(&self) -> &'static str {
        match self {
            Self::MissingPath => "Path is required",
            Self::Malformed { expected, .. } => *expected,
            Self::InvalidInput(_) => "Invalid argument",
            Self::UnknownRoute => "Route not found",
            Self::RateLimited { .. } => "Rate limit exceeded",
        }
    }

    fn hint(&self) -> Option<String> {
        match self {
            Self::MissingPath => Some("pass ?path=/some/route".to_string()),
            Self::Malformed { detail, .. } | Self::InvalidInput(detail) => Some(detail.clone()),
            Self::UnknownRoute => None,
            Self::RateLimited { retry_after_secs } => {
                Some(format!("Retry after {retry_after_secs} seconds"))
            }
        }
    }
}

impl From<ViewsError> for ApiError {
    fn from(error: ViewsError) -> Self {
        match error {
            ViewsError::InvalidArgument(detail) => Self::InvalidInput(detail),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.code();
        let message = self.message();
        let hint = self.hint();

        let body = ErrorBody {
            error: ErrorMessage {
                code,
                message,
                hint: hint.as_deref(),
            },
        };
        let mut response = (self.status(), Json(body)).into_response();

        if let Self::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }

        let detail = match hint {
            Some(hint) => format!("{message}: {hint}"),
            None => message.to_string(),
        };
        response
            .extensions_mut()
            .insert(ErrorReport { code, detail });
        response
    }
}
