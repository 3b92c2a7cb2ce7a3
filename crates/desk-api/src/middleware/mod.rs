//! # Middleware Modules
//!
//! Tower middleware layers for the API service.

pub mod correlation;
pub mod metrics;
pub mod rate_limit;
