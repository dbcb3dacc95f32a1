//! Per-request orchestration of the admission pipeline.
//!
//! Every inbound request runs the same sequence to completion: parse the
//! envelope, redeem the claimed nonce, authenticate the signature (and
//! binding, for account creation), then hand off to the business-logic
//! dispatcher. Any failure at any stage short-circuits through the
//! problem translator; no partial response is ever emitted.

use std::sync::Arc;

use actix_web::http::StatusCode;
use async_trait::async_trait;
use uuid::Uuid;

use crate::acme::auth::{AuthenticatedIdentity, EnvelopeAuthenticator};
use crate::acme::envelope::Envelope;
use crate::acme::nonce::NonceStore;
use crate::acme::problem::{self, PROBLEM_CONTENT_TYPE};
use crate::error::{AcmeError, AcmeResult};

/// Resource classification derived from the target path. Only account
/// creation changes validation behavior (embedded key, binding rules);
/// everything else is dispatched uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceClass {
    NewAccount,
    Resource,
}

/// Request context threaded through parsing and authentication. Carries
/// the target resource path for contextual error messages; the path does
/// not change validation logic beyond the new-account classification.
#[derive(Debug, Clone)]
pub struct RequestContext {
    path: String,
    class: ResourceClass,
}

impl RequestContext {
    pub fn new(resource_path: &str) -> Self {
        let class = if resource_path.trim_end_matches('/').ends_with("new-account") {
            ResourceClass::NewAccount
        } else {
            ResourceClass::Resource
        };
        Self {
            path: resource_path.to_string(),
            class,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_new_account(&self) -> bool {
        self.class == ResourceClass::NewAccount
    }
}

/// A request that has passed nonce redemption and authentication, ready
/// for the business-logic collaborator.
#[derive(Debug)]
pub struct AdmittedRequest {
    pub context: RequestContext,
    pub identity: AuthenticatedIdentity,
    /// Decoded payload bytes, opaque to the gate.
    pub payload: Vec<u8>,
}

/// Successful business-logic response: status plus opaque body bytes.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

/// External business-logic collaborator handling order, authorization,
/// challenge, and account operations. Consumed only after successful
/// authentication; its errors translate exactly like internal ones.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, request: AdmittedRequest) -> AcmeResult<DispatchOutcome>;
}

/// Placeholder dispatcher used until a certificate-authority backend is
/// wired in; every admitted request is answered with an internal error.
pub struct UnconfiguredDispatcher;

#[async_trait]
impl Dispatcher for UnconfiguredDispatcher {
    async fn dispatch(&self, _request: AdmittedRequest) -> AcmeResult<DispatchOutcome> {
        Err(AcmeError::ServerInternal(
            "certificate authority backend is not configured".to_string(),
        ))
    }
}

/// Wire response handed back to the routing layer.
#[derive(Debug)]
pub struct GateResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
    pub content_type: &'static str,
}

/// The request admission gate.
///
/// One instance serves arbitrarily many concurrent requests; the only
/// shared mutable state is the nonce store, which synchronizes itself.
pub struct RequestGate {
    nonces: Arc<NonceStore>,
    authenticator: EnvelopeAuthenticator,
    dispatcher: Arc<dyn Dispatcher>,
}

impl RequestGate {
    pub fn new(
        nonces: Arc<NonceStore>,
        authenticator: EnvelopeAuthenticator,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            nonces,
            authenticator,
            dispatcher,
        }
    }

    pub fn nonces(&self) -> &Arc<NonceStore> {
        &self.nonces
    }

    /// Run one request through the admission pipeline and render the
    /// outcome. Failures become problem documents; this never returns a
    /// bare transport error.
    #[tracing::instrument(skip(self, raw_body), fields(request_id = %Uuid::new_v4()))]
    pub async fn handle(&self, resource_path: &str, raw_body: &[u8]) -> GateResponse {
        match self.admit(resource_path, raw_body).await {
            Ok(outcome) => GateResponse {
                status: outcome.status,
                body: outcome.body,
                content_type: "application/json",
            },
            Err(err) => {
                let (document, status) = problem::translate(&err);
                if status.is_server_error() {
                    tracing::error!(error = %err, "request failed");
                } else {
                    tracing::debug!(error = %err, %status, "request rejected");
                }
                GateResponse {
                    status,
                    body: problem::to_body_bytes(&document),
                    content_type: PROBLEM_CONTENT_TYPE,
                }
            }
        }
    }

    /// The admission pipeline proper. The claimed nonce lives inside the
    /// protected header, so the structural parse that extracts it runs
    /// first; redemption then happens before any signature work, so a
    /// replayed request is rejected regardless of how it is signed, and
    /// a consumed nonce is never restored.
    async fn admit(&self, resource_path: &str, raw_body: &[u8]) -> AcmeResult<DispatchOutcome> {
        let ctx = RequestContext::new(resource_path);

        let envelope = Envelope::parse(raw_body, ctx.path())?;
        let outer = envelope.header.require_outer(ctx.path())?;

        if !self.nonces.redeem(&outer.nonce) {
            return Err(AcmeError::BadNonce);
        }

        let identity = self.authenticator.authenticate(&envelope, &outer, &ctx).await?;
        let payload = envelope.raw.decode_payload()?;

        self.dispatcher
            .dispatch(AdmittedRequest {
                context: ctx,
                identity,
                payload,
            })
            .await
    }
}
