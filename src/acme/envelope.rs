//! Structural parsing and validation of signed JWS request envelopes.
//!
//! Everything here is a pure function of the input bytes. Validation is
//! two-stage: the presence and JSON type of each envelope field is checked
//! first, and only then is the base64url content decoded. The two stages
//! produce distinct error classes so callers (and clients) can tell a
//! missing field from a malformed one.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AcmeError, AcmeResult};

/// JSON shape of an envelope field, classified once up front so the rest
/// of the pipeline pattern-matches instead of re-inspecting dynamic values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldShape {
    Missing,
    String,
    Object,
    Array,
    Number,
    Boolean,
    Null,
}

impl FieldShape {
    /// Classify a field looked up from a JSON object.
    pub fn of(value: Option<&Value>) -> Self {
        match value {
            None => Self::Missing,
            Some(Value::String(_)) => Self::String,
            Some(Value::Object(_)) => Self::Object,
            Some(Value::Array(_)) => Self::Array,
            Some(Value::Number(_)) => Self::Number,
            Some(Value::Bool(_)) => Self::Boolean,
            Some(Value::Null) => Self::Null,
        }
    }
}

/// Require `field` to be present as a JSON string, distinguishing absence
/// from type mismatch. The resource path only feeds error context.
fn require_string<'a>(
    map: &'a Map<String, Value>,
    field: &'static str,
    path: &str,
) -> AcmeResult<&'a str> {
    let value = map.get(field);
    match (FieldShape::of(value), value) {
        (FieldShape::Missing, _) => Err(AcmeError::MissingField {
            field,
            path: path.to_string(),
        }),
        (FieldShape::String, Some(Value::String(s))) => Ok(s),
        _ => Err(AcmeError::MalformedField {
            field,
            path: path.to_string(),
        }),
    }
}

/// Decode a base64url (unpadded) JWS segment.
pub fn decode_segment(value: &str, what: &str) -> AcmeResult<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|_| AcmeError::Malformed(format!("{what} is not valid base64url")))
}

/// The three raw JWS segments, still base64url encoded.
///
/// Shared between the outer request envelope and the nested
/// external-account-binding envelope, which has the same shape.
#[derive(Debug, Clone)]
pub struct RawJws {
    pub protected: String,
    pub payload: String,
    pub signature: String,
}

impl RawJws {
    /// Validate the three envelope fields in priority order:
    /// `protected`, then `payload`, then `signature`.
    pub fn from_map(map: &Map<String, Value>, path: &str) -> AcmeResult<Self> {
        let protected = require_string(map, "protected", path)?;
        let payload = require_string(map, "payload", path)?;
        let signature = require_string(map, "signature", path)?;

        Ok(Self {
            protected: protected.to_string(),
            payload: payload.to_string(),
            signature: signature.to_string(),
        })
    }

    /// The ASCII signing input, `protected || "." || payload`.
    pub fn signing_input(&self) -> Vec<u8> {
        format!("{}.{}", self.protected, self.payload).into_bytes()
    }

    pub fn decode_payload(&self) -> AcmeResult<Vec<u8>> {
        decode_segment(&self.payload, "'payload'")
    }

    pub fn decode_signature(&self) -> AcmeResult<Vec<u8>> {
        decode_segment(&self.signature, "'signature'")
    }
}

/// A JSON Web Key as carried in a protected header or an
/// external-account-binding payload. Members are optional here; the
/// per-key-type rules are enforced when the key is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
}

/// Decoded protected header, before contextual validation. Outer requests
/// and the nested binding envelope impose different rules on which members
/// must (or must not) be present, so everything is optional here.
#[derive(Debug, Clone, Deserialize)]
pub struct ProtectedHeader {
    #[serde(default)]
    pub alg: Option<String>,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub kid: Option<String>,
    #[serde(default)]
    pub jwk: Option<Jwk>,
}

/// Key material reference carried by an outer protected header: either an
/// account key id or an embedded key (account creation only).
#[derive(Debug, Clone)]
pub enum KeyReference {
    KeyId(String),
    Embedded(Jwk),
}

/// Outer protected header after contextual validation: algorithm, anti-replay
/// nonce, target URL, and exactly one key reference.
#[derive(Debug, Clone)]
pub struct OuterHeader {
    pub alg: String,
    pub nonce: String,
    pub url: String,
    pub key: KeyReference,
}

impl ProtectedHeader {
    /// Apply the outer-envelope header rules: `alg`, `nonce`, and `url` are
    /// required, and exactly one of `kid` / `jwk` must identify the key.
    pub fn require_outer(&self, path: &str) -> AcmeResult<OuterHeader> {
        let alg = self.require_member(self.alg.as_ref(), "alg", path)?;
        let nonce = self.require_member(self.nonce.as_ref(), "nonce", path)?;
        let url = self.require_member(self.url.as_ref(), "url", path)?;

        let key = match (self.kid.as_ref(), self.jwk.as_ref()) {
            (Some(_), Some(_)) => {
                return Err(AcmeError::Malformed(
                    "protected header must not contain both 'jwk' and 'kid'".to_string(),
                ));
            }
            (None, None) => {
                return Err(AcmeError::Malformed(
                    "protected header must contain one of 'jwk' or 'kid'".to_string(),
                ));
            }
            (Some(kid), None) => KeyReference::KeyId(kid.clone()),
            (None, Some(jwk)) => KeyReference::Embedded(jwk.clone()),
        };

        Ok(OuterHeader {
            alg,
            nonce,
            url,
            key,
        })
    }

    fn require_member(
        &self,
        member: Option<&String>,
        field: &'static str,
        path: &str,
    ) -> AcmeResult<String> {
        member.cloned().ok_or_else(|| AcmeError::MissingField {
            field,
            path: path.to_string(),
        })
    }
}

/// Decode a base64url protected segment into its header object. Decode and
/// JSON-parse failures are a separate error class from the field type check
/// that must already have passed.
pub fn decode_protected_header(protected: &str, _path: &str) -> AcmeResult<ProtectedHeader> {
    let bytes = decode_segment(protected, "protected header")?;
    serde_json::from_slice(&bytes).map_err(|err| {
        AcmeError::Malformed(format!("protected header is not a JSON object: {err}"))
    })
}

/// A fully parsed request envelope: raw segments plus the decoded header.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub raw: RawJws,
    pub header: ProtectedHeader,
}

impl Envelope {
    /// Parse a raw request body into an envelope.
    ///
    /// The body must be a JSON object carrying string `protected`,
    /// `payload`, and `signature` members; the protected segment is then
    /// decoded into its header object.
    pub fn parse(raw_body: &[u8], path: &str) -> AcmeResult<Self> {
        let value: Value = serde_json::from_slice(raw_body)
            .map_err(|err| AcmeError::Malformed(format!("request body is not valid JSON: {err}")))?;
        let map = value.as_object().ok_or_else(|| {
            AcmeError::Malformed("request body must be a JSON object".to_string())
        })?;

        let raw = RawJws::from_map(map, path)?;
        let header = decode_protected_header(&raw.protected, path)?;

        Ok(Self { raw, header })
    }
}
