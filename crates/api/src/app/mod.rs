//! Router assembly.
//!
//! - `services.rs`: storage selection and service wiring
//! - `routes/`: handlers, one file per area
//! - `dto.rs`: request bodies and query strings
//! - `errors.rs`: error-to-response mapping

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use repairdesk_auth::Hs256JwtValidator;
use repairdesk_infra::{AppConfig, BillingStore, StoreResult};

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the production router from configuration.
pub async fn build_app(config: &AppConfig) -> StoreResult<Router> {
    let services = services::build_services(config).await?;
    Ok(router(&config.jwt_secret, services))
}

/// Build the router over an explicit store (tests, embedding).
pub fn build_app_with_store(jwt_secret: &str, store: Arc<dyn BillingStore>) -> Router {
    router(jwt_secret, services::AppServices::new(store))
}

fn router(jwt_secret: &str, services: services::AppServices) -> Router {
    let jwt = Arc::new(Hs256JwtValidator::new(jwt_secret.as_bytes()));
    let auth_state = middleware::AuthState { jwt };

    let protected = routes::router()
        .layer(Extension(Arc::new(services)))
        .layer(axum::middleware::from_fn_with_state(auth_state, middleware::auth_middleware));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new())
}
