//! Translation of internal errors into protocol problem documents.
//!
//! The mapping is total and side-effect-free: translating the same error
//! twice yields byte-identical output. The rendered body is handed back to
//! the request boundary as raw bytes; nothing here writes a response.

use actix_web::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::AcmeError;

/// Content type for problem-document responses.
pub const PROBLEM_CONTENT_TYPE: &str = "application/problem+json";

const URN_MALFORMED: &str = "urn:ietf:params:acme:error:malformed";
const URN_BAD_NONCE: &str = "urn:ietf:params:acme:error:badNonce";
const URN_BAD_SIGNATURE_ALGORITHM: &str = "urn:ietf:params:acme:error:badSignatureAlgorithm";
const URN_UNAUTHORIZED: &str = "urn:ietf:params:acme:error:unauthorized";
const URN_ACCOUNT_DOES_NOT_EXIST: &str = "urn:ietf:params:acme:error:accountDoesNotExist";
const URN_EXTERNAL_ACCOUNT_REQUIRED: &str = "urn:ietf:params:acme:error:externalAccountRequired";
const URN_ALREADY_REVOKED: &str = "urn:ietf:params:acme:error:alreadyRevoked";
const URN_SERVER_INTERNAL: &str = "urn:ietf:params:acme:error:serverInternal";

/// Fixed detail for internal errors; diagnostic text stays in the logs.
const INTERNAL_DETAIL: &str = "The server experienced an internal error";

/// Wire-level error body.
///
/// The HTTP status travels out-of-band as response metadata. The
/// `subproblems` key is present if and only if the list is non-empty —
/// never serialized as `null` or `[]`, which trips up some client
/// libraries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemDocument {
    #[serde(rename = "type")]
    pub problem_type: String,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subproblems: Vec<ProblemDocument>,
}

/// Map an internal error to its problem document and HTTP status.
///
/// The match is exhaustive over the closed error taxonomy; any future
/// variant must be mapped here or it will not compile.
pub fn translate(err: &AcmeError) -> (ProblemDocument, StatusCode) {
    let (problem_type, detail, status) = match err {
        AcmeError::Compound { primary, causes } => {
            let (mut document, status) = translate(primary);
            document.subproblems = causes.iter().map(|cause| translate(cause).0).collect();
            return (document, status);
        }
        AcmeError::MissingField { .. } | AcmeError::MalformedField { .. } => {
            (URN_MALFORMED, err.to_string(), StatusCode::BAD_REQUEST)
        }
        AcmeError::Malformed(_) => (URN_MALFORMED, err.to_string(), StatusCode::BAD_REQUEST),
        AcmeError::BadNonce => (URN_BAD_NONCE, err.to_string(), StatusCode::BAD_REQUEST),
        AcmeError::BadSignatureAlgorithm(_) => (
            URN_BAD_SIGNATURE_ALGORITHM,
            err.to_string(),
            StatusCode::BAD_REQUEST,
        ),
        AcmeError::Unauthorized(_) => {
            (URN_UNAUTHORIZED, err.to_string(), StatusCode::UNAUTHORIZED)
        }
        AcmeError::AccountDoesNotExist(_) => (
            URN_ACCOUNT_DOES_NOT_EXIST,
            err.to_string(),
            StatusCode::BAD_REQUEST,
        ),
        AcmeError::ExternalAccountRequired => (
            URN_EXTERNAL_ACCOUNT_REQUIRED,
            err.to_string(),
            StatusCode::FORBIDDEN,
        ),
        AcmeError::AlreadyRevoked => {
            (URN_ALREADY_REVOKED, err.to_string(), StatusCode::BAD_REQUEST)
        }
        AcmeError::ServerInternal(_) => (
            URN_SERVER_INTERNAL,
            INTERNAL_DETAIL.to_string(),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    };

    (
        ProblemDocument {
            problem_type: problem_type.to_string(),
            detail,
            subproblems: Vec::new(),
        },
        status,
    )
}

/// Serialize a problem document for the wire.
pub fn to_body_bytes(document: &ProblemDocument) -> Vec<u8> {
    serde_json::to_vec(document).unwrap_or_else(|_| {
        // Serialization of this struct cannot fail in practice; fall back
        // to a minimal internal-error body rather than an empty response.
        format!(r#"{{"type":"{URN_SERVER_INTERNAL}","detail":"{INTERNAL_DETAIL}"}}"#).into_bytes()
    })
}
