//! GitHub Codespaces client.
//!
//! Provides:
//! - `GithubClient` - authenticated list/start/stop calls
//! - The `EnvironmentApi` implementation used by the router

pub mod client;

pub use client::{ApiError, GithubClient, GithubClientBuilder, is_success_status};
