//! Health check and build info endpoints.
//!
//! These endpoints are public (no protocol authentication) and sit
//! outside the signed-request pipeline.

use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};

use crate::acme::NonceStore;

/// Health check response.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
    pub outstanding_nonces: usize,
}

/// Build information response.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfoResponse {
    pub service: String,
    pub version: String,
    pub git_sha: String,
    pub build_time: String,
}

/// GET /health
///
/// Returns service health status. Used by load balancers and monitoring.
#[tracing::instrument(skip(nonces))]
pub async fn health(nonces: web::Data<NonceStore>) -> HttpResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        outstanding_nonces: nonces.outstanding(),
    };

    HttpResponse::Ok().json(response)
}

/// GET /build-info
///
/// Returns build metadata for deployment verification.
#[tracing::instrument]
pub async fn build_info() -> HttpResponse {
    let response = BuildInfoResponse {
        service: "acme-gateway".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_sha: env!("GIT_SHA").to_string(),
        build_time: env!("BUILD_TIME").to_string(),
    };

    HttpResponse::Ok().json(response)
}

/// Configure health routes on the given scope.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/build-info", web::get().to(build_info));
}
