//! HTTP access to the marketplace backend.

/// Authenticated request pipeline.
pub mod client;
mod response;

pub use client::{ApiClient, Payload, RequestOptions, SessionEvent};
