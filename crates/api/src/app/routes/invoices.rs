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
use repairdesk_core::InvoiceId;

use crate::app::dto::{ApplyPaymentRequest, CreateInvoiceRequest, InvoiceListQuery, UpdateInvoiceRequest};
use crate::app::errors::{self, ApiResult};
use crate::app::routes::common::{CmdAuth, require};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_invoice).get(list_invoices))
        .route("/:id", get(get_invoice).patch(update_invoice).delete(delete_invoice))
        .route("/:id/payments", post(apply_payment).get(list_payments))
}

fn parse_id(raw: &str) -> Result<InvoiceId, axum::response::Response> {
    raw.parse().map_err(errors::domain_error_to_response)
}

pub async fn create_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<CreateInvoiceRequest>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body.map_err(errors::json_rejection)?;
    let command = body
        .into_command(tenant.tenant_id())
        .map_err(errors::domain_error_to_response)?;
    let command = CmdAuth::new(command, Permission::INVOICES_CREATE).authorize(&tenant, &principal)?;

    let invoice = services
        .billing
        .create_invoice(command, Utc::now())
        .await
        .map_err(errors::service_error_to_response)?;
    Ok((StatusCode::CREATED, Json(invoice)).into_response())
}

pub async fn list_invoices(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    query: Result<Query<InvoiceListQuery>, QueryRejection>,
) -> ApiResult {
    require(&tenant, &principal, Permission::INVOICES_READ)?;
    let Query(query) = query.map_err(errors::query_rejection)?;
    let filter = query.into_filter().map_err(errors::domain_error_to_response)?;

    let invoices = services
        .billing
        .list_invoices(tenant.tenant_id(), filter)
        .await
        .map_err(errors::service_error_to_response)?;
    Ok(Json(invoices).into_response())
}

pub async fn get_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, Permission::INVOICES_READ)?;
    let invoice_id = parse_id(&id)?;

    let detail = services
        .billing
        .invoice(tenant.tenant_id(), invoice_id)
        .await
        .map_err(errors::service_error_to_response)?;
    Ok(Json(detail).into_response())
}

pub async fn update_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Result<Json<UpdateInvoiceRequest>, JsonRejection>,
) -> ApiResult {
    let invoice_id = parse_id(&id)?;
    let Json(body) = body.map_err(errors::json_rejection)?;
    let update = body.into_update().map_err(errors::domain_error_to_response)?;
    let update = CmdAuth::new(update, Permission::INVOICES_UPDATE).authorize(&tenant, &principal)?;

    let invoice = services
        .billing
        .update_invoice_status(tenant.tenant_id(), invoice_id, update, Utc::now())
        .await
        .map_err(errors::service_error_to_response)?;
    Ok(Json(invoice).into_response())
}

pub async fn delete_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, Permission::INVOICES_DELETE)?;
    let invoice_id = parse_id(&id)?;

    services
        .billing
        .delete_invoice(tenant.tenant_id(), invoice_id)
        .await
        .map_err(errors::service_error_to_response)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn apply_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Result<Json<ApplyPaymentRequest>, JsonRejection>,
) -> ApiResult {
    let invoice_id = parse_id(&id)?;
    let Json(body) = body.map_err(errors::json_rejection)?;
    let command = body.into_command().map_err(errors::domain_error_to_response)?;
    let command = CmdAuth::new(command, Permission::INVOICES_PAY).authorize(&tenant, &principal)?;

    let outcome = services
        .billing
        .apply_payment(tenant.tenant_id(), invoice_id, command, Utc::now())
        .await
        .map_err(errors::service_error_to_response)?;
    Ok((StatusCode::CREATED, Json(outcome)).into_response())
}

pub async fn list_payments(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&tenant, &principal, Permission::INVOICES_READ)?;
    let invoice_id = parse_id(&id)?;

    let payments = services
        .billing
        .payments(tenant.tenant_id(), invoice_id)
        .await
        .map_err(errors::service_error_to_response)?;
    Ok(Json(payments).into_response())
}
