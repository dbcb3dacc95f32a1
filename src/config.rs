//! Service configuration derived from environment variables.
//!
//! Configuration is loaded once at startup and validated before the
//! gateway starts serving.
//!
//! ## Environment Variables
//!
//! - `ACME_GATEWAY_HOST`: Bind address (default: :: for dual-stack IPv4/IPv6)
//! - `ACME_GATEWAY_PORT`: HTTP port (default: 5300)
//! - `ACME_GATEWAY_NONCE_TTL_SECS`: Lifetime of issued nonces (default: 900)
//! - `ACME_GATEWAY_BODY_LIMIT_KB`: Maximum request body size (default: 64)
//! - `ACME_GATEWAY_EAB_REQUIRED`: Require external account bindings for new accounts
//! - `ACME_GATEWAY_EAB_KEYS`: Comma-separated `key_id:base64url-mac-key` pairs
//! - `RUST_LOG`: Log level filter

use std::env;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};

const DEFAULT_PORT: u16 = 5300;
const DEFAULT_NONCE_TTL_SECS: u64 = 900;
const DEFAULT_BODY_LIMIT_KB: usize = 64;

/// Helper to get trimmed env var or empty string.
fn env_trim(name: &str) -> String {
    env::var(name).unwrap_or_default().trim().to_string()
}

/// Check if a string value is truthy.
fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes")
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    host: IpAddr,
    port: u16,
    nonce_ttl_secs: u64,
    body_limit_bytes: usize,
    eab_required: bool,
    eab_keys: Vec<(String, Vec<u8>)>,
}

impl Settings {
    /// Load settings from environment variables.
    pub fn from_env() -> Self {
        // Default to IPv6 unspecified (::) for dual-stack support.
        let host = env_trim("ACME_GATEWAY_HOST")
            .parse::<IpAddr>()
            .unwrap_or(IpAddr::V6(Ipv6Addr::UNSPECIFIED));

        let port = env_trim("ACME_GATEWAY_PORT")
            .parse::<u16>()
            .unwrap_or(DEFAULT_PORT);

        let nonce_ttl_secs = env_trim("ACME_GATEWAY_NONCE_TTL_SECS")
            .parse::<u64>()
            .unwrap_or(DEFAULT_NONCE_TTL_SECS);

        let body_limit_kb = env_trim("ACME_GATEWAY_BODY_LIMIT_KB")
            .parse::<usize>()
            .unwrap_or(DEFAULT_BODY_LIMIT_KB);
        let body_limit_bytes = body_limit_kb.saturating_mul(1024);

        let eab_required = is_truthy(&env_trim("ACME_GATEWAY_EAB_REQUIRED"));
        let eab_keys = parse_eab_keys(&env_trim("ACME_GATEWAY_EAB_KEYS"));

        Self {
            host,
            port,
            nonce_ttl_secs,
            body_limit_bytes,
            eab_required,
            eab_keys,
        }
    }

    /// Create settings for tests.
    pub fn for_tests() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            nonce_ttl_secs: 60,
            body_limit_bytes: DEFAULT_BODY_LIMIT_KB * 1024,
            eab_required: false,
            eab_keys: vec![],
        }
    }

    /// Validate settings.
    ///
    /// Returns an error message if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.nonce_ttl_secs == 0 {
            return Err(
                "ACME_GATEWAY_NONCE_TTL_SECS must be greater than zero; a zero TTL \
                 would reject every request."
                    .to_string(),
            );
        }

        if self.eab_required && self.eab_keys.is_empty() {
            return Err(
                "ACME_GATEWAY_EAB_REQUIRED is set but no binding keys are provisioned. \
                 Provide ACME_GATEWAY_EAB_KEYS as key_id:base64url-mac-key pairs."
                    .to_string(),
            );
        }

        Ok(())
    }

    // Getters

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn nonce_ttl(&self) -> Duration {
        Duration::from_secs(self.nonce_ttl_secs)
    }

    pub fn body_limit_bytes(&self) -> usize {
        self.body_limit_bytes
    }

    pub fn eab_required(&self) -> bool {
        self.eab_required
    }

    pub fn eab_keys(&self) -> impl Iterator<Item = (String, Vec<u8>)> + '_ {
        self.eab_keys.iter().cloned()
    }
}

/// Parse `key_id:base64url-mac-key` pairs, skipping entries that do not
/// decode rather than refusing to start.
fn parse_eab_keys(raw: &str) -> Vec<(String, Vec<u8>)> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let (key_id, encoded) = entry.split_once(':')?;
            match URL_SAFE_NO_PAD.decode(encoded.trim()) {
                Ok(mac_key) if !key_id.trim().is_empty() => {
                    Some((key_id.trim().to_string(), mac_key))
                }
                _ => {
                    tracing::warn!(key_id, "skipping undecodable external binding key");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_validate() {
        let settings = Settings::for_tests();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn zero_nonce_ttl_is_rejected() {
        let settings = Settings {
            nonce_ttl_secs: 0,
            ..Settings::for_tests()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn required_binding_without_keys_is_rejected() {
        let settings = Settings {
            eab_required: true,
            ..Settings::for_tests()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn eab_key_parsing_skips_bad_entries() {
        let keys = parse_eab_keys("kid-1:c2VjcmV0, ,kid-2:!!!,:c2VjcmV0");
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].0, "kid-1");
        assert_eq!(keys[0].1, b"secret");
    }
}
