//! Application services layer.

pub mod clock;
pub mod error;
pub mod provider;
pub mod views;
