// Crate-level lint configuration
// Allow noisy pedantic/cargo lints that aren't worth fixing individually
#![allow(clippy::multiple_crate_versions)] // Transitive deps, can't easily fix
#![allow(clippy::missing_errors_doc)] // Would require extensive doc changes
#![allow(clippy::missing_panics_doc)] // Would require extensive doc changes
#![allow(clippy::must_use_candidate)] // Too many false positives for internal APIs
#![allow(clippy::module_name_repetitions)] // Acceptable for clarity (e.g., AcmeError in error mod)
#![allow(clippy::doc_markdown)] // Too strict about backticks in docs

//! ACME Gateway Service
//!
//! The protocol front door for the platform certificate authority: it
//! accepts, authenticates, and replies to automated certificate-management
//! requests before any issuance logic runs.
//!
//! ## Architecture
//!
//! Every inbound request passes through the same admission pipeline:
//!
//! 1. **Envelope parsing** — structural validation of the signed JWS
//!    wrapper (protected / payload / signature), with missing and
//!    malformed fields reported distinctly.
//! 2. **Nonce redemption** — each accepted request consumes exactly one
//!    single-use nonce; replays are rejected deterministically.
//! 3. **Authentication** — signature verification against account key
//!    material resolved through an external collaborator, including
//!    validation of nested external account bindings on account creation.
//! 4. **Dispatch** — hand-off to the certificate-authority business
//!    logic, whose failures render through the same problem-document
//!    translation as the gateway's own.
//!
//! ## Security Model
//!
//! - **At-most-once nonces**: redemption is an atomic check-and-remove;
//!   two concurrent attempts on one value cannot both succeed
//! - **Fail-closed**: a nonce consumed by an aborted request is never
//!   restored
//! - **No diagnostic leakage**: infrastructure failures render as a fixed
//!   internal-error problem document
//! - **Binding proof**: external account bindings must MAC the very key
//!   the request is signed with

pub mod acme;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;

#[cfg(feature = "otel")]
pub mod telemetry;

#[cfg(not(feature = "otel"))]
pub mod telemetry {
    //! Stub telemetry module when OpenTelemetry is disabled.

    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    /// Initialize tracing with console output only.
    pub fn init_tracing() {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "acme_gateway=info,actix_web=info".into());
        let fmt_layer = tracing_subscriber::fmt::layer();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
    }

    /// No-op shutdown when OpenTelemetry is disabled.
    pub fn shutdown_tracing() {}
}

// Re-export commonly used types
pub use acme::{NonceStore, RequestGate};
pub use config::Settings;
pub use error::{AcmeError, AcmeResult};
