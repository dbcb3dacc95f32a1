//! Integration tests for the ACME request gate.
//!
//! These tests exercise the full admission pipeline using the actual
//! `RequestGate`, `NonceStore`, and `MemoryKeyRegistry` types with real
//! signed envelopes.
//!
//! Run with: cargo test --test `gateway_integration`

use std::sync::{Arc, Mutex};
use std::time::Duration;

use actix_web::http::StatusCode;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ed25519_dalek::{Signer as _, SigningKey};
use hmac::{Hmac, Mac};
use serde_json::{Value, json};
use sha2::Sha256;

use acme_gateway::acme::{
    AdmittedRequest, AuthenticatedIdentity, DispatchOutcome, Dispatcher, EnvelopeAuthenticator,
    Jwk, KeyResolver, KeyResolverError, MacKey, MemoryKeyRegistry, NonceStore, RequestGate,
};
use acme_gateway::error::{AcmeError, AcmeResult};

const BASE_URL: &str = "https://ca.example";

fn ed25519_jwk(key: &SigningKey) -> Jwk {
    Jwk {
        kty: "OKP".to_string(),
        crv: Some("Ed25519".to_string()),
        x: Some(URL_SAFE_NO_PAD.encode(key.verifying_key().as_bytes())),
        y: None,
        n: None,
        e: None,
    }
}

/// Build a signed request body the way an ACME client would.
fn signed_request(
    key: &SigningKey,
    nonce: &str,
    path: &str,
    key_reference: Value,
    payload: &Value,
) -> Vec<u8> {
    let mut header = json!({
        "alg": "EdDSA",
        "nonce": nonce,
        "url": format!("{BASE_URL}{path}"),
    });
    for (name, value) in key_reference.as_object().unwrap() {
        header[name] = value.clone();
    }

    let protected = URL_SAFE_NO_PAD.encode(header.to_string());
    let payload = if payload.is_null() {
        String::new()
    } else {
        URL_SAFE_NO_PAD.encode(payload.to_string())
    };
    let signature = key.sign(format!("{protected}.{payload}").as_bytes());

    json!({
        "protected": protected,
        "payload": payload,
        "signature": URL_SAFE_NO_PAD.encode(signature.to_bytes()),
    })
    .to_string()
    .into_bytes()
}

/// Dispatcher that records what the gate admitted.
#[derive(Default)]
struct RecordingDispatcher {
    seen: Mutex<Vec<(String, AuthenticatedIdentity)>>,
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn dispatch(&self, request: AdmittedRequest) -> AcmeResult<DispatchOutcome> {
        self.seen
            .lock()
            .unwrap()
            .push((request.context.path().to_string(), request.identity));
        Ok(DispatchOutcome {
            status: StatusCode::OK,
            body: br#"{"status":"valid"}"#.to_vec(),
        })
    }
}

/// Dispatcher standing in for business logic that refuses the operation.
struct AlreadyRevokedDispatcher;

#[async_trait]
impl Dispatcher for AlreadyRevokedDispatcher {
    async fn dispatch(&self, _request: AdmittedRequest) -> AcmeResult<DispatchOutcome> {
        Err(AcmeError::AlreadyRevoked)
    }
}

/// Resolver whose storage is down.
struct FailingResolver;

#[async_trait]
impl KeyResolver for FailingResolver {
    async fn account_key(&self, _key_id: &str) -> Result<Option<Jwk>, KeyResolverError> {
        Err(KeyResolverError("account storage unreachable".to_string()))
    }

    async fn eab_mac_key(&self, _key_id: &str) -> Result<Option<MacKey>, KeyResolverError> {
        Err(KeyResolverError("account storage unreachable".to_string()))
    }
}

struct Harness {
    nonces: Arc<NonceStore>,
    gate: RequestGate,
    dispatcher: Arc<RecordingDispatcher>,
    registry: Arc<MemoryKeyRegistry>,
}

fn harness() -> Harness {
    let nonces = Arc::new(NonceStore::new(Duration::from_secs(60)));
    let registry = Arc::new(MemoryKeyRegistry::new());
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let gate = RequestGate::new(
        nonces.clone(),
        EnvelopeAuthenticator::new(registry.clone()),
        dispatcher.clone(),
    );
    Harness {
        nonces,
        gate,
        dispatcher,
        registry,
    }
}

fn problem_body(body: &[u8]) -> Value {
    serde_json::from_slice(body).expect("problem body is JSON")
}

#[tokio::test]
async fn admitted_request_reaches_the_dispatcher() {
    let h = harness();
    let key = SigningKey::from_bytes(&[42_u8; 32]);
    let kid = format!("{BASE_URL}/acme/account/1");
    h.registry.register_account(kid.clone(), ed25519_jwk(&key)).await;

    let nonce = h.nonces.issue().unwrap();
    let body = signed_request(
        &key,
        &nonce,
        "/acme/new-order",
        json!({ "kid": kid }),
        &json!({ "identifiers": [{ "type": "dns", "value": "example.com" }] }),
    );

    let response = h.gate.handle("/acme/new-order", &body).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.content_type, "application/json");

    let seen = h.dispatcher.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "/acme/new-order");
    assert_eq!(seen[0].1.key_id.as_deref(), Some(kid.as_str()));
    assert!(seen[0].1.eab_key_id.is_none());
}

#[tokio::test]
async fn replayed_request_is_rejected_with_bad_nonce() {
    let h = harness();
    let key = SigningKey::from_bytes(&[42_u8; 32]);
    let kid = format!("{BASE_URL}/acme/account/1");
    h.registry.register_account(kid.clone(), ed25519_jwk(&key)).await;

    let nonce = h.nonces.issue().unwrap();
    let body = signed_request(&key, &nonce, "/acme/new-order", json!({ "kid": kid }), &json!({}));

    let first = h.gate.handle("/acme/new-order", &body).await;
    assert_eq!(first.status, StatusCode::OK);

    // Identical request presented again: same nonce, deterministic rejection.
    let second = h.gate.handle("/acme/new-order", &body).await;
    assert_eq!(second.status, StatusCode::BAD_REQUEST);
    assert_eq!(second.content_type, "application/problem+json");

    let problem = problem_body(&second.body);
    assert_eq!(
        problem["type"].as_str(),
        Some("urn:ietf:params:acme:error:badNonce")
    );

    // The dispatcher saw only the first request.
    assert_eq!(h.dispatcher.seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn never_issued_nonce_is_rejected() {
    let h = harness();
    let key = SigningKey::from_bytes(&[42_u8; 32]);
    let kid = format!("{BASE_URL}/acme/account/1");
    h.registry.register_account(kid.clone(), ed25519_jwk(&key)).await;

    let body = signed_request(
        &key,
        "made-up-nonce",
        "/acme/new-order",
        json!({ "kid": kid }),
        &json!({}),
    );

    let response = h.gate.handle("/acme/new-order", &body).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        problem_body(&response.body)["type"].as_str(),
        Some("urn:ietf:params:acme:error:badNonce")
    );
}

#[tokio::test]
async fn nonce_is_consumed_before_signature_checking() {
    let h = harness();
    let key = SigningKey::from_bytes(&[42_u8; 32]);
    let kid = format!("{BASE_URL}/acme/account/1");
    h.registry.register_account(kid.clone(), ed25519_jwk(&key)).await;

    // Sign with the wrong key: authentication fails, but the nonce is
    // gone afterwards (fail-closed, never restored).
    let wrong_key = SigningKey::from_bytes(&[7_u8; 32]);
    let nonce = h.nonces.issue().unwrap();
    let body = signed_request(
        &wrong_key,
        &nonce,
        "/acme/new-order",
        json!({ "kid": kid }),
        &json!({}),
    );

    let response = h.gate.handle("/acme/new-order", &body).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert!(!h.nonces.redeem(&nonce));
}

#[tokio::test]
async fn new_account_with_embedded_key_is_admitted() {
    let h = harness();
    let key = SigningKey::from_bytes(&[5_u8; 32]);
    let jwk = ed25519_jwk(&key);

    let nonce = h.nonces.issue().unwrap();
    let body = signed_request(
        &key,
        &nonce,
        "/acme/new-account",
        json!({ "jwk": jwk }),
        &json!({ "termsOfServiceAgreed": true }),
    );

    let response = h.gate.handle("/acme/new-account", &body).await;
    assert_eq!(response.status, StatusCode::OK);

    let seen = h.dispatcher.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].1.key_id.is_none());
    assert!(!seen[0].1.thumbprint.is_empty());
}

#[tokio::test]
async fn new_account_with_external_binding_is_admitted() {
    let h = harness();
    h.registry
        .provision_eab_key("eab-key-1", b"provisioned-secret".to_vec())
        .await;

    let key = SigningKey::from_bytes(&[5_u8; 32]);
    let jwk = ed25519_jwk(&key);
    let url = format!("{BASE_URL}/acme/new-account");

    let inner_protected = URL_SAFE_NO_PAD.encode(
        json!({ "alg": "HS256", "kid": "eab-key-1", "url": url }).to_string(),
    );
    let inner_payload = URL_SAFE_NO_PAD.encode(serde_json::to_string(&jwk).unwrap());
    let mut mac = Hmac::<Sha256>::new_from_slice(b"provisioned-secret").unwrap();
    mac.update(format!("{inner_protected}.{inner_payload}").as_bytes());
    let binding = json!({
        "protected": inner_protected,
        "payload": inner_payload,
        "signature": URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()),
    });

    let nonce = h.nonces.issue().unwrap();
    let body = signed_request(
        &key,
        &nonce,
        "/acme/new-account",
        json!({ "jwk": jwk }),
        &json!({
            "termsOfServiceAgreed": true,
            "externalAccountBinding": binding,
        }),
    );

    let response = h.gate.handle("/acme/new-account", &body).await;
    assert_eq!(response.status, StatusCode::OK);

    let seen = h.dispatcher.seen.lock().unwrap();
    assert_eq!(seen[0].1.eab_key_id.as_deref(), Some("eab-key-1"));
}

#[tokio::test]
async fn unknown_account_key_id_is_account_does_not_exist() {
    let h = harness();
    let key = SigningKey::from_bytes(&[42_u8; 32]);

    let nonce = h.nonces.issue().unwrap();
    let body = signed_request(
        &key,
        &nonce,
        "/acme/new-order",
        json!({ "kid": format!("{BASE_URL}/acme/account/404") }),
        &json!({}),
    );

    let response = h.gate.handle("/acme/new-order", &body).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        problem_body(&response.body)["type"].as_str(),
        Some("urn:ietf:params:acme:error:accountDoesNotExist")
    );
}

#[tokio::test]
async fn resolver_failure_is_internal_not_unauthorized() {
    let nonces = Arc::new(NonceStore::new(Duration::from_secs(60)));
    let gate = RequestGate::new(
        nonces.clone(),
        EnvelopeAuthenticator::new(Arc::new(FailingResolver)),
        Arc::new(RecordingDispatcher::default()),
    );

    let key = SigningKey::from_bytes(&[42_u8; 32]);
    let nonce = nonces.issue().unwrap();
    let body = signed_request(
        &key,
        &nonce,
        "/acme/new-order",
        json!({ "kid": format!("{BASE_URL}/acme/account/1") }),
        &json!({}),
    );

    let response = gate.handle("/acme/new-order", &body).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);

    let problem = problem_body(&response.body);
    assert_eq!(
        problem["type"].as_str(),
        Some("urn:ietf:params:acme:error:serverInternal")
    );
    // Infrastructure diagnostics never reach the wire.
    assert_eq!(
        problem["detail"].as_str(),
        Some("The server experienced an internal error")
    );
}

#[tokio::test]
async fn business_logic_errors_render_through_the_same_translator() {
    let nonces = Arc::new(NonceStore::new(Duration::from_secs(60)));
    let registry = Arc::new(MemoryKeyRegistry::new());
    let gate = RequestGate::new(
        nonces.clone(),
        EnvelopeAuthenticator::new(registry.clone()),
        Arc::new(AlreadyRevokedDispatcher),
    );

    let key = SigningKey::from_bytes(&[42_u8; 32]);
    let kid = format!("{BASE_URL}/acme/account/1");
    registry.register_account(kid.clone(), ed25519_jwk(&key)).await;

    let nonce = nonces.issue().unwrap();
    let body = signed_request(
        &key,
        &nonce,
        "/acme/revoke-cert",
        json!({ "kid": kid }),
        &json!({ "certificate": "MIIB" }),
    );

    let response = gate.handle("/acme/revoke-cert", &body).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let problem = problem_body(&response.body);
    let object = problem.as_object().unwrap();
    assert_eq!(
        object.get("type").and_then(Value::as_str),
        Some("urn:ietf:params:acme:error:alreadyRevoked")
    );
    assert!(object.get("detail").is_some_and(Value::is_string));
    assert!(!object.contains_key("subproblems"));
}

#[tokio::test]
async fn malformed_envelope_reports_the_failing_field() {
    let h = harness();

    let response = h
        .gate
        .handle("/acme/new-order", br#"{"protected": 5, "payload": "", "signature": ""}"#)
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let problem = problem_body(&response.body);
    assert_eq!(
        problem["type"].as_str(),
        Some("urn:ietf:params:acme:error:malformed")
    );
    assert!(
        problem["detail"]
            .as_str()
            .unwrap()
            .contains("failed to parse 'protected' field")
    );
}

#[tokio::test]
async fn required_binding_is_enforced_for_new_accounts() {
    let nonces = Arc::new(NonceStore::new(Duration::from_secs(60)));
    let registry = Arc::new(MemoryKeyRegistry::with_eab_keys([(
        "eab-key-1".to_string(),
        b"provisioned-secret".to_vec(),
    )]));
    let gate = RequestGate::new(
        nonces.clone(),
        EnvelopeAuthenticator::new(registry).with_required_binding(true),
        Arc::new(RecordingDispatcher::default()),
    );

    let key = SigningKey::from_bytes(&[5_u8; 32]);
    let jwk = ed25519_jwk(&key);
    let nonce = nonces.issue().unwrap();
    let body = signed_request(
        &key,
        &nonce,
        "/acme/new-account",
        json!({ "jwk": jwk }),
        &json!({ "termsOfServiceAgreed": true }),
    );

    let response = gate.handle("/acme/new-account", &body).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(
        problem_body(&response.body)["type"].as_str(),
        Some("urn:ietf:params:acme:error:externalAccountRequired")
    );
}
