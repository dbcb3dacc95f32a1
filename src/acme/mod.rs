//! ACME request admission.
//!
//! This module contains:
//! - `nonce`: anti-replay nonce issuance and redemption
//! - `envelope`: structural JWS envelope parsing and validation
//! - `auth`: signature verification and key resolution
//! - `eab`: external account binding validation
//! - `problem`: error-to-problem-document translation
//! - `gate`: per-request orchestration
//! - `registry`: in-memory key resolver for the binary and tests

pub mod auth;
pub mod eab;
pub mod envelope;
pub mod gate;
pub mod nonce;
pub mod problem;
pub mod registry;

// Re-export key types
pub use auth::{
    AccountKey, AuthenticatedIdentity, EnvelopeAuthenticator, KeyResolver, KeyResolverError,
    MacKey, jwk_thumbprint,
};
pub use envelope::{Envelope, FieldShape, Jwk, KeyReference, OuterHeader, ProtectedHeader, RawJws};
pub use gate::{
    AdmittedRequest, DispatchOutcome, Dispatcher, GateResponse, RequestContext, RequestGate,
    ResourceClass, UnconfiguredDispatcher,
};
pub use nonce::NonceStore;
pub use problem::{PROBLEM_CONTENT_TYPE, ProblemDocument, translate};
pub use registry::MemoryKeyRegistry;
