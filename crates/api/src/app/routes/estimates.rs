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
use repairdesk_core::EstimateId;

use crate::app::dto::{CreateEstimateRequest, EstimateListQuery, UpdateEstimateRequest};
use crate::app::errors::{self, ApiResult};
use crate::app::routes::common::{CmdAuth, require};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_estimate).get(list_estimates))
        .route("/:id", get(get_estimate).patch(update_estimate).delete(delete_estimate))
        .route("/:id/convert", post(convert_estimate))
}

fn parse_id(raw: &str) -> Result<EstimateId, axum::response::Response> {
    raw.parse().map_err(errors::domain_error_to_response)
}

pub async fn create_estimate(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<CreateEstimateRequest>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body.map_err(errors::json_rejection)?;
    let command = body
        .into_command(tenant.tenant_id())
        .map_err(errors::domain_error_to_response)?;
    let command = CmdAuth::new(command, Permission::ESTIMATES_WRITE).authorize(&tenant, &principal)?;

    let estimate = services
        .billing
        .create_estimate(command, Utc::now())
        .await
        .map_err(errors::service_error_to_response)?;
    Ok((StatusCode::CREATED, Json(estimate)).into_response())
}

pub async fn list_estimates(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    query: Result<Query<EstimateListQuery>, QueryRejection>,
) -> ApiResult {
    require(&tenant, &principal, Permission::ESTIMATES_READ)?;
    let Query(query) = query.map_err(errors::query_rejection)?;
    let filter = query.into_filter().map_err(errors::domain_error_to_response)?;

    let estimates = services
        .billing
        .list_estimates(tenant.tenant_id(), filter)
        .await
        .map_err(errors::service_error_to_response)?;
    Ok(Json(estimates).into_response())
}

pub async fn get_estimate(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, Permission::ESTIMATES_READ)?;
    let estimate_id = parse_id(&id)?;

    let estimate = services
        .billing
        .estimate(tenant.tenant_id(), estimate_id)
        .await
        .map_err(errors::service_error_to_response)?;
    Ok(Json(estimate).into_response())
}

pub async fn update_estimate(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Result<Json<UpdateEstimateRequest>, JsonRejection>,
) -> ApiResult {
    let estimate_id = parse_id(&id)?;
    let Json(body) = body.map_err(errors::json_rejection)?;
    let update = body.into_update().map_err(errors::domain_error_to_response)?;
    let update = CmdAuth::new(update, Permission::ESTIMATES_WRITE).authorize(&tenant, &principal)?;

    let estimate = services
        .billing
        .update_estimate_status(tenant.tenant_id(), estimate_id, update, Utc::now())
        .await
        .map_err(errors::service_error_to_response)?;
    Ok(Json(estimate).into_response())
}

pub async fn delete_estimate(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, Permission::ESTIMATES_DELETE)?;
    let estimate_id = parse_id(&id)?;

    services
        .billing
        .delete_estimate(tenant.tenant_id(), estimate_id)
        .await
        .map_err(errors::service_error_to_response)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn convert_estimate(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let estimate_id = parse_id(&id)?;
    let estimate_id = CmdAuth::new(estimate_id, Permission::ESTIMATES_CONVERT).authorize(&tenant, &principal)?;

    let conversion = services
        .billing
        .convert_estimate(tenant.tenant_id(), estimate_id, Utc::now())
        .await
        .map_err(errors::service_error_to_response)?;
    Ok((StatusCode::CREATED, Json(conversion)).into_response())
}
