use axum::{Router, routing::get};

pub mod common;
pub mod estimates;
pub mod invoices;
pub mod system;
pub mod warranty;

/// Router for all authenticated, shop-scoped endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/invoices", invoices::router())
        .nest("/estimates", estimates::router())
        .nest("/warranty", warranty::router())
}
