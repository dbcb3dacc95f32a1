//! ACME front-door endpoints.
//!
//! The routing layer stays thin: it supplies raw body bytes and the
//! target resource path to the request gate, and decorates every ACME
//! response — success or problem — with a freshly issued `Replay-Nonce`
//! header, per protocol convention.

use actix_web::http::Method;
use actix_web::http::header::CACHE_CONTROL;
use actix_web::{HttpMessage as _, HttpRequest, HttpResponse, HttpResponseBuilder, web};

use crate::acme::problem::{self, PROBLEM_CONTENT_TYPE};
use crate::acme::{NonceStore, RequestGate};
use crate::error::AcmeError;
use crate::middleware::{RateLimitConfig, acme_limiter, nonce_limiter};

/// Response header carrying the next usable nonce.
pub const REPLAY_NONCE: &str = "Replay-Nonce";

/// Required content type for signed ACME requests.
const JOSE_CONTENT_TYPE: &str = "application/jose+json";

/// Attach a fresh nonce and the no-store cache directive. A failed
/// issuance is logged but never blocks the response itself.
fn decorate(builder: &mut HttpResponseBuilder, nonces: &NonceStore) {
    match nonces.issue() {
        Ok(nonce) => {
            builder.insert_header((REPLAY_NONCE, nonce));
        }
        Err(err) => {
            tracing::error!(error = %err, "failed to issue response nonce");
        }
    }
    builder.insert_header((CACHE_CONTROL, "no-store"));
}

/// HEAD /acme/new-nonce
#[tracing::instrument(skip(nonces))]
pub async fn new_nonce_head(nonces: web::Data<NonceStore>) -> HttpResponse {
    let mut builder = HttpResponse::Ok();
    decorate(&mut builder, &nonces);
    builder.finish()
}

/// GET /acme/new-nonce
#[tracing::instrument(skip(nonces))]
pub async fn new_nonce_get(nonces: web::Data<NonceStore>) -> HttpResponse {
    let mut builder = HttpResponse::NoContent();
    decorate(&mut builder, &nonces);
    builder.finish()
}

/// POST /acme/{resource}
///
/// The signed-request front door. Everything behind this route is the
/// admission pipeline; the handler only checks the transport-level
/// content type and relays bytes.
#[tracing::instrument(skip(req, gate, nonces, body), fields(path = req.path()))]
pub async fn post_resource(
    req: HttpRequest,
    gate: web::Data<RequestGate>,
    nonces: web::Data<NonceStore>,
    body: web::Bytes,
) -> HttpResponse {
    if req.content_type() != JOSE_CONTENT_TYPE {
        let err = AcmeError::Malformed(format!(
            "request content-type must be {JOSE_CONTENT_TYPE}"
        ));
        let (document, status) = problem::translate(&err);
        let mut builder = HttpResponse::build(status);
        builder.content_type(PROBLEM_CONTENT_TYPE);
        decorate(&mut builder, &nonces);
        return builder.body(problem::to_body_bytes(&document));
    }

    let response = gate.handle(req.path(), &body).await;

    let mut builder = HttpResponse::build(response.status);
    builder.content_type(response.content_type);
    decorate(&mut builder, &nonces);
    builder.body(response.body)
}

/// Configure ACME routes on the given scope.
pub fn configure(cfg: &mut web::ServiceConfig) {
    let rate = RateLimitConfig::from_env();

    cfg.service(
        web::scope("/acme")
            .service(
                web::resource("/new-nonce")
                    .wrap(nonce_limiter(&rate))
                    .route(web::get().to(new_nonce_get))
                    .route(web::method(Method::HEAD).to(new_nonce_head)),
            )
            .service(
                web::resource("/{resource:.*}")
                    .wrap(acme_limiter(&rate))
                    .route(web::post().to(post_resource)),
            ),
    );
}
