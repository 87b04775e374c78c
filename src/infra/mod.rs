//! Infrastructure adapters and runtime bootstrap.

pub mod analytics;
pub mod error;
pub mod http;
pub mod telemetry;
