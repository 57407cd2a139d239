use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use repairdesk_auth::Permission;
use repairdesk_core::ClaimId;

use crate::app::dto::{ClaimListQuery, FileClaimRequest, UpdateClaimRequest, WarrantyLookupQuery};
use crate::app::errors::{self, ApiResult};
use crate::app::routes::common::{CmdAuth, require};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/lookup", get(lookup))
        .route("/claims", post(file_claim).get(list_claims))
        .route("/claims/:id", get(get_claim).patch(update_claim))
}

fn parse_id(raw: &str) -> Result<ClaimId, axum::response::Response> {
    raw.parse().map_err(errors::domain_error_to_response)
}

/// `GET /warranty/lookup?q=<ticket number or phone>`
pub async fn lookup(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    query: Result<Query<WarrantyLookupQuery>, QueryRejection>,
) -> ApiResult {
    require(&tenant, &principal, Permission::WARRANTY_READ)?;
    let Query(query) = query.map_err(errors::query_rejection)?;

    let status = services
        .billing
        .lookup_warranty(tenant.tenant_id(), &query.q, Utc::now())
        .await
        .map_err(errors::service_error_to_response)?;
    Ok(Json(status).into_response())
}

pub async fn file_claim(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<FileClaimRequest>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body.map_err(errors::json_rejection)?;
    let command = body
        .into_command(tenant.tenant_id())
        .map_err(errors::domain_error_to_response)?;
    let command = CmdAuth::new(command, Permission::WARRANTY_FILE).authorize(&tenant, &principal)?;

    let claim = services
        .billing
        .file_claim(command, Utc::now())
        .await
        .map_err(errors::service_error_to_response)?;
    Ok((StatusCode::CREATED, Json(claim)).into_response())
}

pub async fn list_claims(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    query: Result<Query<ClaimListQuery>, QueryRejection>,
) -> ApiResult {
    require(&tenant, &principal, Permission::WARRANTY_READ)?;
    let Query(query) = query.map_err(errors::query_rejection)?;
    let filter = query.into_filter().map_err(errors::domain_error_to_response)?;

    let claims = services
        .billing
        .claims(tenant.tenant_id(), filter)
        .await
        .map_err(errors::service_error_to_response)?;
    Ok(Json(claims).into_response())
}

pub async fn get_claim(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, Permission::WARRANTY_READ)?;
    let claim_id = parse_id(&id)?;

    let claim = services
        .billing
        .claim(tenant.tenant_id(), claim_id)
        .await
        .map_err(errors::service_error_to_response)?;
    Ok(Json(claim).into_response())
}

pub async fn update_claim(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Result<Json<UpdateClaimRequest>, JsonRejection>,
) -> ApiResult {
    let claim_id = parse_id(&id)?;
    let Json(body) = body.map_err(errors::json_rejection)?;
    let update = body.into_update().map_err(errors::domain_error_to_response)?;
    let update = CmdAuth::new(update, Permission::WARRANTY_MANAGE).authorize(&tenant, &principal)?;

    let claim = services
        .billing
        .update_claim(tenant.tenant_id(), claim_id, update, Utc::now())
        .await
        .map_err(errors::service_error_to_response)?;
    Ok(Json(claim).into_response())
}
