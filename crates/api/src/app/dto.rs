use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use repairdesk_core::{CustomerId, DomainError, LineItemInput, Money, TenantId, TicketId};
use repairdesk_estimates::{CreateEstimate, EstimateStatus, EstimateStatusUpdate};
use repairdesk_infra::store::{ClaimFilter, EstimateFilter, InvoiceFilter};
use repairdesk_invoicing::{ApplyPayment, CreateInvoice, InvoiceStatus, InvoiceStatusUpdate, PaymentMethod};
use repairdesk_tickets::DeviceInfo;
use repairdesk_warranty::{ClaimStatus, ClaimUpdate, FileClaim, ResolutionType};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvoiceRequest {
    pub customer_id: String,
    pub ticket_id: Option<String>,
    #[serde(default)]
    pub items: Vec<LineItemInput>,
    pub tax_rate: Option<Decimal>,
    pub discount: Option<Money>,
    pub due_at: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub notes: Option<String>,
}

impl CreateInvoiceRequest {
    pub fn into_command(self, tenant_id: TenantId) -> Result<CreateInvoice, DomainError> {
        Ok(CreateInvoice {
            tenant_id,
            customer_id: self.customer_id.parse::<CustomerId>()?,
            ticket_id: self.ticket_id.as_deref().map(str::parse::<TicketId>).transpose()?,
            items: self.items,
            tax_rate: self.tax_rate.unwrap_or(Decimal::ZERO),
            discount: self.discount.unwrap_or(Money::ZERO),
            due_at: self.due_at,
            status: parse_opt::<InvoiceStatus>(self.status.as_deref())?,
            notes: self.notes,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInvoiceRequest {
    pub status: Option<String>,
    pub notes: Option<String>,
}

impl UpdateInvoiceRequest {
    pub fn into_update(self) -> Result<InvoiceStatusUpdate, DomainError> {
        Ok(InvoiceStatusUpdate {
            status: parse_opt::<InvoiceStatus>(self.status.as_deref())?,
            notes: self.notes,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyPaymentRequest {
    pub amount: Decimal,
    pub method: String,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

impl ApplyPaymentRequest {
    pub fn into_command(self) -> Result<ApplyPayment, DomainError> {
        let method: PaymentMethod = self.method.parse()?;
        ApplyPayment::new(self.amount, method, self.reference, self.notes)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEstimateRequest {
    pub customer_id: String,
    #[serde(default, alias = "device")]
    pub device_info: DeviceInfo,
    #[serde(default)]
    pub items: Vec<LineItemInput>,
    pub tax_rate: Option<Decimal>,
    pub valid_until: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl CreateEstimateRequest {
    pub fn into_command(self, tenant_id: TenantId) -> Result<CreateEstimate, DomainError> {
        Ok(CreateEstimate {
            tenant_id,
            customer_id: self.customer_id.parse()?,
            device: self.device_info,
            items: self.items,
            tax_rate: self.tax_rate,
            valid_until: self.valid_until,
            notes: self.notes,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEstimateRequest {
    pub status: String,
    pub decline_reason: Option<String>,
    pub notes: Option<String>,
}

impl UpdateEstimateRequest {
    pub fn into_update(self) -> Result<EstimateStatusUpdate, DomainError> {
        Ok(EstimateStatusUpdate {
            status: self.status.parse()?,
            decline_reason: self.decline_reason,
            notes: self.notes,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileClaimRequest {
    #[serde(default)]
    pub ticket_number: String,
    #[serde(default)]
    pub claim_reason: String,
    pub claim_description: Option<String>,
    pub resolution_type: Option<String>,
}

impl FileClaimRequest {
    pub fn into_command(self, tenant_id: TenantId) -> Result<FileClaim, DomainError> {
        Ok(FileClaim {
            tenant_id,
            ticket_number: self.ticket_number,
            claim_reason: self.claim_reason,
            claim_description: self.claim_description,
            resolution_type: parse_opt::<ResolutionType>(self.resolution_type.as_deref())?,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClaimRequest {
    pub status: Option<String>,
    pub resolution_type: Option<String>,
    pub resolution_notes: Option<String>,
}

impl UpdateClaimRequest {
    pub fn into_update(self) -> Result<ClaimUpdate, DomainError> {
        Ok(ClaimUpdate {
            status: parse_opt::<ClaimStatus>(self.status.as_deref())?,
            resolution_type: parse_opt::<ResolutionType>(self.resolution_type.as_deref())?,
            resolution_notes: self.resolution_notes,
        })
    }
}

// -------------------------
// Query strings
// -------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceListQuery {
    pub status: Option<String>,
    pub customer_id: Option<String>,
}

impl InvoiceListQuery {
    pub fn into_filter(self) -> Result<InvoiceFilter, DomainError> {
        Ok(InvoiceFilter {
            status: parse_opt::<InvoiceStatus>(self.status.as_deref())?,
            customer_id: parse_opt::<CustomerId>(self.customer_id.as_deref())?,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateListQuery {
    pub status: Option<String>,
    pub customer_id: Option<String>,
}

impl EstimateListQuery {
    pub fn into_filter(self) -> Result<EstimateFilter, DomainError> {
        Ok(EstimateFilter {
            status: parse_opt::<EstimateStatus>(self.status.as_deref())?,
            customer_id: parse_opt::<CustomerId>(self.customer_id.as_deref())?,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ClaimListQuery {
    pub status: Option<String>,
}

impl ClaimListQuery {
    pub fn into_filter(self) -> Result<ClaimFilter, DomainError> {
        Ok(ClaimFilter { status: parse_opt::<ClaimStatus>(self.status.as_deref())? })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct WarrantyLookupQuery {
    #[serde(default)]
    pub q: String,
}

/// Blank strings count as absent.
fn parse_opt<T>(raw: Option<&str>) -> Result<Option<T>, DomainError>
where
    T: core::str::FromStr<Err = DomainError>,
{
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .transpose()
}
