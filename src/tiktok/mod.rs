//! TikTok Research API integration module.
//!
//! Provides the client for the token endpoint and the research endpoints.

pub mod client;
pub mod models;

#[cfg(test)]
pub(crate) mod mock;

pub use client::ResearchClient;
pub use models::{AccessToken, Record, RelatedResource};
