//! HTTP routes for the ACME gateway.
//!
//! Routes are organized by functionality:
//! - `health`: Health check and build info
//! - `acme`: Nonce issuance and the signed-request front door

pub mod acme;
pub mod health;

pub use health::{build_info, health};
