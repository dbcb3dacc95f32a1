//! Error types for the ACME gateway.
//!
//! `AcmeError` is the closed taxonomy every failure in the request
//! admission pipeline flows through. It implements `ResponseError` for
//! Actix-web integration; the wire representation (problem document plus
//! HTTP status) is produced by [`crate::acme::problem`].

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use thiserror::Error;

use crate::acme::problem;

/// Internal error taxonomy for the request admission pipeline.
///
/// Every variant has a fixed protocol mapping (URN type plus HTTP status);
/// see [`problem::translate`]. Downstream business logic reuses the same
/// variants so its failures render through the identical path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcmeError {
    /// A required envelope field is absent.
    #[error("missing required field '{field}' in '{path}' request")]
    MissingField { field: &'static str, path: String },

    /// A required envelope field is present but is not the expected JSON
    /// type. Reported distinctly from absence so callers can tell
    /// "field missing" from "field malformed".
    #[error("failed to parse '{field}' field in '{path}' request")]
    MalformedField { field: &'static str, path: String },

    /// The request is structurally invalid in some other way (base64url
    /// decode failure, unparsable JSON, protected-header rule violation).
    #[error("malformed request: {0}")]
    Malformed(String),

    /// Nonce redemption failed: unknown, already redeemed, or expired.
    #[error("invalid, expired, or already redeemed nonce")]
    BadNonce,

    /// The envelope names a signature algorithm the gateway does not accept.
    #[error("unsupported signature algorithm '{0}'")]
    BadSignatureAlgorithm(String),

    /// Signature verification or external-account-binding validation failed.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The key id in the protected header does not name a known account.
    #[error("account '{0}' does not exist")]
    AccountDoesNotExist(String),

    /// New-account request without the binding this deployment requires.
    #[error("an external account binding is required for new accounts")]
    ExternalAccountRequired,

    /// Raised by business logic when revocation is requested twice.
    #[error("certificate has already been revoked")]
    AlreadyRevoked,

    /// An error kind carrying nested causes, rendered as subproblems.
    #[error("{primary}")]
    Compound {
        primary: Box<AcmeError>,
        causes: Vec<AcmeError>,
    },

    /// Any infrastructure or unmapped failure. The message is logged but
    /// never rendered to clients.
    #[error("internal error: {0}")]
    ServerInternal(String),
}

impl AcmeError {
    /// Attach nested causes to this error, to be rendered as subproblems.
    pub fn with_causes(self, causes: Vec<AcmeError>) -> Self {
        Self::Compound {
            primary: Box::new(self),
            causes,
        }
    }
}

impl ResponseError for AcmeError {
    fn status_code(&self) -> StatusCode {
        problem::translate(self).1
    }

    fn error_response(&self) -> HttpResponse {
        let (document, status) = problem::translate(self);
        HttpResponse::build(status)
            .content_type(problem::PROBLEM_CONTENT_TYPE)
            .json(document)
    }
}

/// Result type alias for gateway operations.
pub type AcmeResult<T> = Result<T, AcmeError>;
