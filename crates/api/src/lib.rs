//! HTTP API: router, auth middleware and request/response mapping for the
//! billing core.

pub mod app;
pub mod authz;
pub mod context;
pub mod middleware;
