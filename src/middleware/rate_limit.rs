//! Rate limiting middleware for gateway endpoints.
//!
//! Nonce issuance is cheap but unauthenticated, and account creation is
//! the most abusable write path, so each gets its own per-IP budget on
//! top of a general baseline.
//!
//! Uses actix-governor with the built-in PeerIpKeyExtractor.

use actix_governor::{Governor, GovernorConfigBuilder, PeerIpKeyExtractor};

/// Configuration for rate limiting across gateway endpoints.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum new-nonce requests per minute per IP.
    pub nonce_per_minute: u32,
    /// Maximum signed ACME requests per minute per IP.
    pub acme_per_minute: u32,
    /// Burst size for nonce issuance.
    pub nonce_burst: u32,
    /// Burst size for signed requests.
    pub acme_burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            // Clients fetch a nonce per request plus retries after badNonce.
            nonce_per_minute: 120,
            acme_per_minute: 60,
            nonce_burst: 30,
            acme_burst: 20,
        }
    }
}

impl RateLimitConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            nonce_per_minute: std::env::var("RATE_LIMIT_NONCE_PER_MINUTE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(120),
            acme_per_minute: std::env::var("RATE_LIMIT_ACME_PER_MINUTE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            nonce_burst: std::env::var("RATE_LIMIT_NONCE_BURST")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            acme_burst: std::env::var("RATE_LIMIT_ACME_BURST")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
        }
    }
}

/// Type alias for the Governor middleware with default settings.
pub type RateLimiter = Governor<PeerIpKeyExtractor, governor::middleware::NoOpMiddleware>;

fn milliseconds_per_request(per_minute: u32) -> u64 {
    if per_minute > 0 {
        60_000 / u64::from(per_minute)
    } else {
        60_000 // Default to 1 per minute if 0
    }
}

/// Create a rate limiter for the new-nonce endpoint.
pub fn nonce_limiter(config: &RateLimitConfig) -> RateLimiter {
    let governor_config = GovernorConfigBuilder::default()
        .milliseconds_per_request(milliseconds_per_request(config.nonce_per_minute))
        .burst_size(config.nonce_burst)
        .finish()
        .expect("Failed to build nonce rate limiter");

    Governor::new(&governor_config)
}

/// Create a rate limiter for signed ACME requests.
pub fn acme_limiter(config: &RateLimitConfig) -> RateLimiter {
    let governor_config = GovernorConfigBuilder::default()
        .milliseconds_per_request(milliseconds_per_request(config.acme_per_minute))
        .burst_size(config.acme_burst)
        .finish()
        .expect("Failed to build ACME rate limiter");

    Governor::new(&governor_config)
}

/// Create a general API rate limiter for all gateway endpoints.
///
/// Provides a baseline rate limit (1 request/second sustained, bursts to 50).
pub fn general_limiter() -> RateLimiter {
    let governor_config = GovernorConfigBuilder::default()
        .seconds_per_request(1)
        .burst_size(50)
        .finish()
        .expect("Failed to build general rate limiter");

    Governor::new(&governor_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RateLimitConfig::default();
        assert_eq!(config.nonce_per_minute, 120);
        assert_eq!(config.acme_per_minute, 60);
    }

    #[test]
    fn test_limiter_creation() {
        let config = RateLimitConfig::default();

        // These should not panic
        let _ = nonce_limiter(&config);
        let _ = acme_limiter(&config);
        let _ = general_limiter();
    }

    #[test]
    fn zero_rate_falls_back_to_one_per_minute() {
        assert_eq!(milliseconds_per_request(0), 60_000);
        assert_eq!(milliseconds_per_request(120), 500);
    }
}
