//! Middleware for the ACME gateway.
//!
//! Provides cross-cutting concerns like rate limiting that apply
//! across multiple routes.

pub mod rate_limit;

pub use rate_limit::{RateLimitConfig, RateLimiter, acme_limiter, general_limiter, nonce_limiter};
