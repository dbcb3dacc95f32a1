//! External account binding validation.
//!
//! A new-account request may carry an `externalAccountBinding` member: an
//! inner envelope of the same three-field JWS shape, MACed with a key
//! pre-provisioned under a key id. Validation reuses the envelope field
//! discipline — presence and type are checked before anything is decoded —
//! so binding failures distinguish missing from malformed from
//! MAC-mismatch exactly like the outer envelope does.

use serde_json::Value;

use crate::acme::auth::{KeyResolver, jwk_thumbprint, resolver_failure};
use crate::acme::envelope::{Jwk, OuterHeader, RawJws, decode_protected_header};
use crate::error::{AcmeError, AcmeResult};

/// Validate and authenticate an external account binding.
///
/// Returns the verified binding key id. The resource path feeds error
/// context only; it does not change validation logic.
pub(crate) async fn verify_binding(
    resolver: &dyn KeyResolver,
    outer: &OuterHeader,
    account_jwk: &Jwk,
    binding: &Value,
    path: &str,
) -> AcmeResult<String> {
    let map = binding.as_object().ok_or_else(|| AcmeError::MalformedField {
        field: "externalAccountBinding",
        path: path.to_string(),
    })?;

    let raw = RawJws::from_map(map, path)?;
    let header = decode_protected_header(&raw.protected, path)?;

    let alg = header.alg.ok_or_else(|| AcmeError::MissingField {
        field: "alg",
        path: path.to_string(),
    })?;
    if alg != "HS256" {
        return Err(AcmeError::BadSignatureAlgorithm(format!(
            "external account binding must use HS256, got '{alg}'"
        )));
    }
    if header.nonce.is_some() {
        return Err(AcmeError::Malformed(
            "external account binding must not carry a nonce".to_string(),
        ));
    }
    if header.jwk.is_some() {
        return Err(AcmeError::Malformed(
            "external account binding must identify its key by 'kid'".to_string(),
        ));
    }
    let key_id = header.kid.ok_or_else(|| AcmeError::MissingField {
        field: "kid",
        path: path.to_string(),
    })?;
    let url = header.url.ok_or_else(|| AcmeError::MissingField {
        field: "url",
        path: path.to_string(),
    })?;
    if url != outer.url {
        return Err(AcmeError::Malformed(
            "external account binding url must match the outer request url".to_string(),
        ));
    }

    let mac_key = resolver
        .eab_mac_key(&key_id)
        .await
        .map_err(resolver_failure)?
        .ok_or_else(|| {
            AcmeError::Unauthorized(format!(
                "unknown external account binding key '{key_id}'"
            ))
        })?;

    let signature = raw.decode_signature()?;
    if !mac_key.verify_hs256(&raw.signing_input(), &signature) {
        return Err(AcmeError::Unauthorized(
            "external account binding MAC verification failed".to_string(),
        ));
    }

    // The bound key must be the account key the outer envelope was
    // signed with, otherwise the binding proves nothing.
    let payload = raw.decode_payload()?;
    let bound_jwk: Jwk = serde_json::from_slice(&payload).map_err(|err| {
        AcmeError::Malformed(format!(
            "external account binding payload is not a JWK: {err}"
        ))
    })?;
    if jwk_thumbprint(&bound_jwk)? != jwk_thumbprint(account_jwk)? {
        return Err(AcmeError::Unauthorized(
            "external account binding key does not match the account key".to_string(),
        ));
    }

    Ok(key_id)
}
