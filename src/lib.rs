//! View-count service for the blog: cached per-path counts backed by an
//! analytics provider or a deterministic fallback.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
