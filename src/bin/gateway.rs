//! ACME Gateway Service
//!
//! The protocol front door for the platform certificate authority.
//!
//! ## Responsibilities
//!
//! - Issue and track anti-replay nonces
//! - Validate and authenticate signed request envelopes
//! - Translate every failure into a protocol problem document
//! - Hand admitted requests to the certificate-authority backend
//!
//! ## Security
//!
//! - Every accepted request consumes exactly one single-use nonce
//! - External account bindings are verified against pre-provisioned MAC keys
//! - Rate limits all endpoints to prevent abuse

use std::sync::Arc;

use actix_web::{App, HttpServer, middleware, web};
use acme_gateway::{
    acme::{EnvelopeAuthenticator, MemoryKeyRegistry, NonceStore, RequestGate, UnconfiguredDispatcher},
    config::Settings,
    middleware::{RateLimitConfig, general_limiter},
    routes, telemetry,
};
use tracing_actix_web::TracingLogger;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize tracing first
    telemetry::init_tracing();

    // Load and validate settings
    let settings = Settings::from_env();
    if let Err(message) = settings.validate() {
        tracing::error!("{message}");
        std::process::exit(1);
    }

    let nonces = Arc::new(NonceStore::new(settings.nonce_ttl()));

    // Standalone mode: keys come from the in-memory registry seeded from
    // the environment. The platform deployment substitutes its own
    // resolver and dispatcher here.
    let registry = Arc::new(MemoryKeyRegistry::with_eab_keys(settings.eab_keys()));
    let authenticator =
        EnvelopeAuthenticator::new(registry).with_required_binding(settings.eab_required());
    let gate = RequestGate::new(nonces.clone(), authenticator, Arc::new(UnconfiguredDispatcher));
    tracing::warn!(
        "no certificate authority backend is linked; admitted requests will be answered \
         with serverInternal"
    );

    // Periodic expiry sweep alongside the store's amortized eviction
    let sweep_interval = settings.nonce_ttl() / 2;
    let sweeper = nonces.clone();
    actix_rt::spawn(async move {
        loop {
            actix_rt::time::sleep(sweep_interval).await;
            let evicted = sweeper.sweep();
            if evicted > 0 {
                tracing::debug!(evicted, "evicted expired nonces");
            }
        }
    });

    // Load rate limit configuration from environment
    let rate_config = RateLimitConfig::from_env();
    tracing::info!(
        nonce_per_minute = rate_config.nonce_per_minute,
        acme_per_minute = rate_config.acme_per_minute,
        "Rate limiting enabled"
    );

    let addr = settings.socket_addr();
    let body_limit = settings.body_limit_bytes();
    tracing::info!(
        addr = %addr,
        nonce_ttl_secs = settings.nonce_ttl().as_secs(),
        eab_required = settings.eab_required(),
        "Starting ACME Gateway"
    );

    // Clone shared state for app_data
    let settings_data = web::Data::new(settings.clone());
    let nonces_data = web::Data::from(nonces);
    let gate_data = web::Data::new(gate);

    HttpServer::new(move || {
        App::new()
            // Rate limiting (applied first)
            .wrap(general_limiter())
            // Request tracing
            .wrap(TracingLogger::default())
            // Default headers
            .wrap(middleware::DefaultHeaders::new().add(("X-Service", "acme-gateway")))
            // Shared state
            .app_data(settings_data.clone())
            .app_data(nonces_data.clone())
            .app_data(gate_data.clone())
            .app_data(web::PayloadConfig::new(body_limit))
            // Routes
            .configure(routes::health::configure)
            .configure(routes::acme::configure)
    })
    .bind(addr)?
    .run()
    .await?;

    // Shutdown tracing
    telemetry::shutdown_tracing();

    Ok(())
}
