//! Envelope authentication: JWS signature verification and key resolution.
//!
//! Key material is resolved through the [`KeyResolver`] collaborator:
//! account public keys by key id, and pre-provisioned MAC keys for
//! external account bindings. Resolver infrastructure failures are
//! surfaced as internal errors, never as authentication decisions.

use std::sync::Arc;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use ed25519_dalek::{Signature as Ed25519Signature, VerifyingKey as Ed25519VerifyingKey};
use hmac::{Hmac, Mac};
use p256::ecdsa::signature::Verifier as _;
use p256::ecdsa::{Signature as P256Signature, VerifyingKey as P256VerifyingKey};
use serde_json::json;
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::acme::eab;
use crate::acme::envelope::{Envelope, Jwk, KeyReference, OuterHeader};
use crate::acme::gate::RequestContext;
use crate::error::{AcmeError, AcmeResult};

/// Failure inside the key-resolution collaborator. This is infrastructure
/// trouble (storage down, lookup timed out), distinct from "no such key".
#[derive(Debug, Error)]
#[error("key resolution failed: {0}")]
pub struct KeyResolverError(pub String);

/// External collaborator resolving key material named by request envelopes.
///
/// `Ok(None)` means the id names nothing and is an authentication outcome;
/// `Err` means the lookup itself failed and is reported as internal.
#[async_trait]
pub trait KeyResolver: Send + Sync {
    /// Public key registered for an account key id.
    async fn account_key(&self, key_id: &str) -> Result<Option<Jwk>, KeyResolverError>;

    /// Pre-provisioned MAC key for an external-account-binding key id.
    async fn eab_mac_key(&self, key_id: &str) -> Result<Option<MacKey>, KeyResolverError>;
}

/// Symmetric MAC key for external account bindings. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MacKey(Vec<u8>);

impl MacKey {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Verify an HS256 MAC over the given signing input.
    pub fn verify_hs256(&self, signing_input: &[u8], signature: &[u8]) -> bool {
        let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(&self.0) else {
            return false;
        };
        mac.update(signing_input);
        mac.verify_slice(signature).is_ok()
    }
}

/// A verified account public key.
#[derive(Debug, Clone)]
pub enum AccountKey {
    Ed25519(Ed25519VerifyingKey),
    Es256(P256VerifyingKey),
}

impl AccountKey {
    /// Build a verifying key from a JWK, enforcing that the key type
    /// matches the algorithm named in the protected header.
    pub fn from_jwk(alg: &str, jwk: &Jwk) -> AcmeResult<Self> {
        match alg {
            "EdDSA" => {
                if jwk.kty != "OKP" || jwk.crv.as_deref() != Some("Ed25519") {
                    return Err(AcmeError::Malformed(
                        "EdDSA requires an OKP/Ed25519 JWK".to_string(),
                    ));
                }
                let x = require_member(jwk, jwk.x.as_deref(), "x")?;
                let bytes: [u8; 32] = decode_segment(x, "JWK 'x' member")?
                    .try_into()
                    .map_err(|_| {
                        AcmeError::Malformed("Ed25519 public key must be 32 bytes".to_string())
                    })?;
                let key = Ed25519VerifyingKey::from_bytes(&bytes).map_err(|_| {
                    AcmeError::Malformed("Ed25519 public key is invalid".to_string())
                })?;
                Ok(Self::Ed25519(key))
            }
            "ES256" => {
                if jwk.kty != "EC" || jwk.crv.as_deref() != Some("P-256") {
                    return Err(AcmeError::Malformed(
                        "ES256 requires an EC/P-256 JWK".to_string(),
                    ));
                }
                let x = decode_segment(require_member(jwk, jwk.x.as_deref(), "x")?, "JWK 'x'")?;
                let y = decode_segment(require_member(jwk, jwk.y.as_deref(), "y")?, "JWK 'y'")?;
                if x.len() != 32 || y.len() != 32 {
                    return Err(AcmeError::Malformed(
                        "P-256 coordinates must be 32 bytes".to_string(),
                    ));
                }
                let mut sec1 = Vec::with_capacity(1 + x.len() + y.len());
                sec1.push(0x04);
                sec1.extend_from_slice(&x);
                sec1.extend_from_slice(&y);
                let key = P256VerifyingKey::from_sec1_bytes(&sec1).map_err(|_| {
                    AcmeError::Malformed("P-256 public key is invalid".to_string())
                })?;
                Ok(Self::Es256(key))
            }
            other => Err(AcmeError::BadSignatureAlgorithm(other.to_string())),
        }
    }

    /// Verify a JWS signature (raw, not DER) over the signing input.
    pub fn verify(&self, signing_input: &[u8], signature: &[u8]) -> AcmeResult<()> {
        let mismatch = || AcmeError::Unauthorized("signature verification failed".to_string());
        match self {
            Self::Ed25519(key) => {
                let signature =
                    Ed25519Signature::try_from(signature).map_err(|_| mismatch())?;
                key.verify_strict(signing_input, &signature)
                    .map_err(|_| mismatch())
            }
            Self::Es256(key) => {
                let signature = P256Signature::from_slice(signature).map_err(|_| mismatch())?;
                key.verify(signing_input, &signature).map_err(|_| mismatch())
            }
        }
    }
}

fn require_member<'a>(jwk: &Jwk, member: Option<&'a str>, name: &str) -> AcmeResult<&'a str> {
    member.ok_or_else(|| {
        AcmeError::Malformed(format!("{} JWK is missing its '{name}' member", jwk.kty))
    })
}

fn decode_segment(value: &str, what: &str) -> AcmeResult<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|_| AcmeError::Malformed(format!("{what} is not valid base64url")))
}

/// RFC 7638 JWK thumbprint: SHA-256 over the canonical required members,
/// base64url encoded. serde_json orders object members lexicographically,
/// which is exactly the canonical form.
pub fn jwk_thumbprint(jwk: &Jwk) -> AcmeResult<String> {
    let canonical = match jwk.kty.as_str() {
        "OKP" => {
            let crv = require_member(jwk, jwk.crv.as_deref(), "crv")?;
            let x = require_member(jwk, jwk.x.as_deref(), "x")?;
            json!({ "crv": crv, "kty": jwk.kty, "x": x })
        }
        "EC" => {
            let crv = require_member(jwk, jwk.crv.as_deref(), "crv")?;
            let x = require_member(jwk, jwk.x.as_deref(), "x")?;
            let y = require_member(jwk, jwk.y.as_deref(), "y")?;
            json!({ "crv": crv, "kty": jwk.kty, "x": x, "y": y })
        }
        other => {
            return Err(AcmeError::Malformed(format!(
                "cannot compute a thumbprint for key type '{other}'"
            )));
        }
    };

    let digest = Sha256::digest(canonical.to_string().as_bytes());
    Ok(URL_SAFE_NO_PAD.encode(digest))
}

/// The identity established by a successfully authenticated envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedIdentity {
    /// Account key id, when the envelope presented one.
    pub key_id: Option<String>,
    /// RFC 7638 thumbprint of the verified key.
    pub thumbprint: String,
    /// Verified external-account-binding key id, when a binding was present.
    pub eab_key_id: Option<String>,
}

/// Verifies envelope signatures and, for account-creation requests, the
/// nested external account binding.
pub struct EnvelopeAuthenticator {
    resolver: Arc<dyn KeyResolver>,
    require_external_binding: bool,
}

impl EnvelopeAuthenticator {
    pub fn new(resolver: Arc<dyn KeyResolver>) -> Self {
        Self {
            resolver,
            require_external_binding: false,
        }
    }

    /// Require every new account to carry an external account binding.
    pub fn with_required_binding(mut self, required: bool) -> Self {
        self.require_external_binding = required;
        self
    }

    /// Authenticate a parsed envelope against its validated outer header.
    pub async fn authenticate(
        &self,
        envelope: &Envelope,
        outer: &OuterHeader,
        ctx: &RequestContext,
    ) -> AcmeResult<AuthenticatedIdentity> {
        if !outer.url.ends_with(ctx.path()) {
            return Err(AcmeError::Malformed(format!(
                "protected header url '{}' does not match the request path '{}'",
                outer.url,
                ctx.path()
            )));
        }

        let (account_jwk, key_id) = match (&outer.key, ctx.is_new_account()) {
            (KeyReference::Embedded(jwk), true) => (jwk.clone(), None),
            (KeyReference::Embedded(_), false) => {
                return Err(AcmeError::Malformed(
                    "'jwk' may only be used for new-account requests".to_string(),
                ));
            }
            (KeyReference::KeyId(_), true) => {
                return Err(AcmeError::Malformed(
                    "new-account requests must embed their key as 'jwk'".to_string(),
                ));
            }
            (KeyReference::KeyId(kid), false) => {
                let jwk = self
                    .resolver
                    .account_key(kid)
                    .await
                    .map_err(resolver_failure)?
                    .ok_or_else(|| AcmeError::AccountDoesNotExist(kid.clone()))?;
                (jwk, Some(kid.clone()))
            }
        };

        let key = AccountKey::from_jwk(&outer.alg, &account_jwk)?;
        let signature = envelope.raw.decode_signature()?;
        key.verify(&envelope.raw.signing_input(), &signature)?;

        let thumbprint = jwk_thumbprint(&account_jwk)?;

        let eab_key_id = if ctx.is_new_account() {
            self.verify_new_account_binding(envelope, outer, &account_jwk, ctx)
                .await?
        } else {
            None
        };

        tracing::debug!(
            path = ctx.path(),
            key_id = key_id.as_deref().unwrap_or("<embedded>"),
            eab = eab_key_id.is_some(),
            "envelope authenticated"
        );

        Ok(AuthenticatedIdentity {
            key_id,
            thumbprint,
            eab_key_id,
        })
    }

    async fn verify_new_account_binding(
        &self,
        envelope: &Envelope,
        outer: &OuterHeader,
        account_jwk: &Jwk,
        ctx: &RequestContext,
    ) -> AcmeResult<Option<String>> {
        let payload = envelope.raw.decode_payload()?;
        let binding = if payload.is_empty() {
            None
        } else {
            let value: serde_json::Value = serde_json::from_slice(&payload).map_err(|err| {
                AcmeError::Malformed(format!("new-account payload is not valid JSON: {err}"))
            })?;
            value.get("externalAccountBinding").cloned()
        };

        match binding {
            Some(binding) => {
                let key_id = eab::verify_binding(
                    self.resolver.as_ref(),
                    outer,
                    account_jwk,
                    &binding,
                    ctx.path(),
                )
                .await?;
                Ok(Some(key_id))
            }
            None if self.require_external_binding => Err(AcmeError::ExternalAccountRequired),
            None => Ok(None),
        }
    }
}

/// A key-resolution failure is infrastructure trouble; report it as
/// internal rather than letting it masquerade as an auth decision.
pub(crate) fn resolver_failure(err: KeyResolverError) -> AcmeError {
    tracing::error!(error = %err, "key resolution collaborator failed");
    AcmeError::ServerInternal(err.to_string())
}
