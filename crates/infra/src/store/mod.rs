//! Tenant-scoped persistence for the billing core.
//!
//! Every method takes the caller's `TenantId` and must filter on it. An entity
//! that exists under another tenant is reported exactly like a missing one.
//!
//! Operations that read-modify-write an aggregate (`apply_payment`,
//! `update_*`, `convert_estimate`) run as a single transaction in every
//! backend and call the domain method while holding the row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use repairdesk_core::{ClaimId, CustomerId, DomainError, EstimateId, InvoiceId, TenantId, TicketId};
use repairdesk_estimates::{Conversion, Estimate, EstimateDraft, EstimateStatus, EstimateStatusUpdate};
use repairdesk_invoicing::{
    ApplyPayment, Invoice, InvoiceDraft, InvoiceStatus, InvoiceStatusUpdate, Payment, PaymentOutcome,
};
use repairdesk_tickets::{Customer, Ticket};
use repairdesk_warranty::{ClaimStatus, ClaimUpdate, FileClaim, RepairSnapshot, WarrantyClaim};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    /// A domain rule rejected the change inside the transaction.
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("storage backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvoiceFilter {
    pub status: Option<InvoiceStatus>,
    pub customer_id: Option<CustomerId>,
}

impl InvoiceFilter {
    pub fn matches(&self, invoice: &Invoice) -> bool {
        self.status.is_none_or(|s| invoice.status == s)
            && self.customer_id.is_none_or(|c| invoice.customer_id == c)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EstimateFilter {
    pub status: Option<EstimateStatus>,
    pub customer_id: Option<CustomerId>,
}

impl EstimateFilter {
    pub fn matches(&self, estimate: &Estimate) -> bool {
        self.status.is_none_or(|s| estimate.status == s)
            && self.customer_id.is_none_or(|c| estimate.customer_id == c)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClaimFilter {
    pub status: Option<ClaimStatus>,
}

impl ClaimFilter {
    pub fn matches(&self, claim: &WarrantyClaim) -> bool {
        self.status.is_none_or(|s| claim.status == s)
    }
}

/// Read access to customers and tickets, plus the writes the shop's CRUD
/// surfaces perform.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn save_customer(&self, customer: Customer) -> StoreResult<()>;
    async fn save_ticket(&self, ticket: Ticket) -> StoreResult<()>;

    async fn customer_exists(&self, tenant_id: TenantId, customer_id: CustomerId) -> StoreResult<bool>;
    async fn ticket(&self, tenant_id: TenantId, ticket_id: TicketId) -> StoreResult<Option<Ticket>>;
    async fn ticket_by_number(&self, tenant_id: TenantId, ticket_number: &str) -> StoreResult<Option<Ticket>>;

    /// Most recent ticket whose customer's phone digits contain `digits`.
    async fn latest_ticket_for_phone(&self, tenant_id: TenantId, digits: &str) -> StoreResult<Option<Ticket>>;
}

#[async_trait]
pub trait InvoiceStore: Send + Sync {
    /// Allocate the next invoice number and insert, in one transaction.
    async fn insert_invoice(&self, draft: InvoiceDraft, now: DateTime<Utc>) -> StoreResult<Invoice>;

    async fn invoice(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> StoreResult<Option<Invoice>>;
    async fn list_invoices(&self, tenant_id: TenantId, filter: InvoiceFilter) -> StoreResult<Vec<Invoice>>;

    async fn update_invoice_status(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        update: &InvoiceStatusUpdate,
        now: DateTime<Utc>,
    ) -> StoreResult<Invoice>;

    /// Hard delete; items and payments go with the invoice.
    async fn delete_invoice(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> StoreResult<()>;

    /// Append a payment and write back derived state while holding the
    /// invoice row.
    async fn apply_payment(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        command: &ApplyPayment,
        now: DateTime<Utc>,
    ) -> StoreResult<PaymentOutcome>;

    /// Ledger entries, oldest first.
    async fn payments(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> StoreResult<Vec<Payment>>;

    async fn latest_invoice_for_ticket(&self, tenant_id: TenantId, ticket_id: TicketId) -> StoreResult<Option<Invoice>>;
}

#[async_trait]
pub trait EstimateStore: Send + Sync {
    async fn insert_estimate(&self, draft: EstimateDraft, now: DateTime<Utc>) -> StoreResult<Estimate>;
    async fn estimate(&self, tenant_id: TenantId, estimate_id: EstimateId) -> StoreResult<Option<Estimate>>;
    async fn list_estimates(&self, tenant_id: TenantId, filter: EstimateFilter) -> StoreResult<Vec<Estimate>>;

    async fn update_estimate_status(
        &self,
        tenant_id: TenantId,
        estimate_id: EstimateId,
        update: &EstimateStatusUpdate,
        now: DateTime<Utc>,
    ) -> StoreResult<Estimate>;

    async fn delete_estimate(&self, tenant_id: TenantId, estimate_id: EstimateId) -> StoreResult<()>;

    /// Create the ticket and mark the estimate converted atomically.
    async fn convert_estimate(
        &self,
        tenant_id: TenantId,
        estimate_id: EstimateId,
        now: DateTime<Utc>,
    ) -> StoreResult<Conversion>;
}

#[async_trait]
pub trait WarrantyStore: Send + Sync {
    async fn insert_claim(
        &self,
        command: FileClaim,
        snapshot: RepairSnapshot,
        now: DateTime<Utc>,
    ) -> StoreResult<WarrantyClaim>;

    async fn claim(&self, tenant_id: TenantId, claim_id: ClaimId) -> StoreResult<Option<WarrantyClaim>>;
    async fn list_claims(&self, tenant_id: TenantId, filter: ClaimFilter) -> StoreResult<Vec<WarrantyClaim>>;

    async fn update_claim(
        &self,
        tenant_id: TenantId,
        claim_id: ClaimId,
        update: &ClaimUpdate,
        now: DateTime<Utc>,
    ) -> StoreResult<WarrantyClaim>;
}

/// Everything the billing service needs from a backend.
pub trait BillingStore: Directory + InvoiceStore + EstimateStore + WarrantyStore {}

impl<T> BillingStore for T where T: Directory + InvoiceStore + EstimateStore + WarrantyStore {}
