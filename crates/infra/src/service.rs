//! Application service: the operations the HTTP surface exposes.
//!
//! Validation runs before any write. Cross-aggregate reads (customer and
//! ticket existence, the invoice behind a warranty claim) happen here; the
//! read-modify-write of a single aggregate is delegated to the store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument};

use repairdesk_core::{ClaimId, DomainError, EstimateId, InvoiceId, TenantId};
use repairdesk_estimates::{Conversion, CreateEstimate, Estimate, EstimateStatusUpdate};
use repairdesk_invoicing::{ApplyPayment, CreateInvoice, Invoice, InvoiceStatusUpdate, Payment, PaymentOutcome};
use repairdesk_tickets::{Ticket, digits_only};
use repairdesk_warranty::{ClaimUpdate, FileClaim, RepairSnapshot, WarrantyClaim, WarrantyStatus};

use crate::store::{BillingStore, ClaimFilter, EstimateFilter, InvoiceFilter, StoreError};

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Shortest digit run a warranty lookup treats as a phone number.
const MIN_PHONE_DIGITS: usize = 7;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Forbidden(String),

    /// Storage failure. The message is for logs, never for clients.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<DomainError> for ServiceError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => ServiceError::Validation(msg),
            DomainError::InvalidId(msg) => ServiceError::Validation(msg),
            DomainError::NotFound => ServiceError::NotFound("resource"),
            DomainError::Conflict(msg) => ServiceError::Conflict(msg),
            DomainError::Forbidden(msg) => ServiceError::Forbidden(msg),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ServiceError::NotFound("resource"),
            StoreError::Conflict(msg) => ServiceError::Conflict(msg),
            StoreError::Domain(err) => err.into(),
            StoreError::Backend(msg) => ServiceError::Internal(msg),
        }
    }
}

/// Name the missing entity in `NotFound` errors.
trait OrNotFound<T> {
    fn or_not_found(self, what: &'static str) -> ServiceResult<T>;
}

impl<T> OrNotFound<T> for Result<T, StoreError> {
    fn or_not_found(self, what: &'static str) -> ServiceResult<T> {
        self.map_err(|err| match err {
            StoreError::NotFound => ServiceError::NotFound(what),
            other => other.into(),
        })
    }
}

trait Required<T> {
    fn required(self, what: &'static str) -> ServiceResult<T>;
}

impl<T> Required<T> for Result<Option<T>, StoreError> {
    fn required(self, what: &'static str) -> ServiceResult<T> {
        self?.ok_or(ServiceError::NotFound(what))
    }
}

/// Invoice with its payment ledger, as returned by `GET /invoices/:id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDetail {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub payments: Vec<Payment>,
}

#[derive(Clone)]
pub struct BillingService {
    store: Arc<dyn BillingStore>,
}

impl BillingService {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn BillingStore> {
        &self.store
    }

    // ── invoices ────────────────────────────────────────────────────────────

    #[instrument(skip(self, command), fields(shop_id = %command.tenant_id, customer_id = %command.customer_id), err)]
    pub async fn create_invoice(&self, command: CreateInvoice, now: DateTime<Utc>) -> ServiceResult<Invoice> {
        let tenant_id = command.tenant_id;
        let customer_id = command.customer_id;
        let ticket_id = command.ticket_id;
        let draft = Invoice::prepare(command)?;

        if !self.store.customer_exists(tenant_id, customer_id).await? {
            return Err(ServiceError::NotFound("customer"));
        }
        if let Some(ticket_id) = ticket_id {
            self.store.ticket(tenant_id, ticket_id).await.required("ticket")?;
        }

        let invoice = self.store.insert_invoice(draft, now).await?;
        info!(invoice_id = %invoice.id, invoice_number = %invoice.invoice_number, total = %invoice.total, "invoice created");
        Ok(invoice)
    }

    pub async fn invoice(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> ServiceResult<InvoiceDetail> {
        let invoice = self.store.invoice(tenant_id, invoice_id).await.required("invoice")?;
        let payments = self.store.payments(tenant_id, invoice_id).await?;
        Ok(InvoiceDetail { invoice, payments })
    }

    pub async fn list_invoices(&self, tenant_id: TenantId, filter: InvoiceFilter) -> ServiceResult<Vec<Invoice>> {
        Ok(self.store.list_invoices(tenant_id, filter).await?)
    }

    #[instrument(skip(self, update), fields(shop_id = %tenant_id, invoice_id = %invoice_id), err)]
    pub async fn update_invoice_status(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        update: InvoiceStatusUpdate,
        now: DateTime<Utc>,
    ) -> ServiceResult<Invoice> {
        if update.status.is_none() && update.notes.is_none() {
            return Err(ServiceError::Validation("nothing to update: provide status or notes".into()));
        }
        let invoice = self
            .store
            .update_invoice_status(tenant_id, invoice_id, &update, now)
            .await
            .or_not_found("invoice")?;
        info!(status = invoice.status.as_str(), "invoice status updated");
        Ok(invoice)
    }

    #[instrument(skip(self), fields(shop_id = %tenant_id, invoice_id = %invoice_id), err)]
    pub async fn delete_invoice(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> ServiceResult<()> {
        self.store.delete_invoice(tenant_id, invoice_id).await.or_not_found("invoice")?;
        info!("invoice deleted");
        Ok(())
    }

    #[instrument(skip(self, command), fields(shop_id = %tenant_id, invoice_id = %invoice_id, amount = %command.amount()), err)]
    pub async fn apply_payment(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        command: ApplyPayment,
        now: DateTime<Utc>,
    ) -> ServiceResult<PaymentOutcome> {
        let outcome = self
            .store
            .apply_payment(tenant_id, invoice_id, &command, now)
            .await
            .or_not_found("invoice")?;
        info!(
            payment_id = %outcome.payment_id,
            amount_paid = %outcome.amount_paid,
            amount_due = %outcome.amount_due,
            status = outcome.status.as_str(),
            "payment applied"
        );
        Ok(outcome)
    }

    pub async fn payments(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> ServiceResult<Vec<Payment>> {
        self.store.invoice(tenant_id, invoice_id).await.required("invoice")?;
        Ok(self.store.payments(tenant_id, invoice_id).await?)
    }

    // ── estimates ───────────────────────────────────────────────────────────

    #[instrument(skip(self, command), fields(shop_id = %command.tenant_id, customer_id = %command.customer_id), err)]
    pub async fn create_estimate(&self, command: CreateEstimate, now: DateTime<Utc>) -> ServiceResult<Estimate> {
        let tenant_id = command.tenant_id;
        let customer_id = command.customer_id;
        let draft = Estimate::prepare(command)?;

        if !self.store.customer_exists(tenant_id, customer_id).await? {
            return Err(ServiceError::NotFound("customer"));
        }

        let estimate = self.store.insert_estimate(draft, now).await?;
        info!(estimate_id = %estimate.id, estimate_number = %estimate.estimate_number, total = %estimate.total, "estimate created");
        Ok(estimate)
    }

    pub async fn estimate(&self, tenant_id: TenantId, estimate_id: EstimateId) -> ServiceResult<Estimate> {
        self.store.estimate(tenant_id, estimate_id).await.required("estimate")
    }

    pub async fn list_estimates(&self, tenant_id: TenantId, filter: EstimateFilter) -> ServiceResult<Vec<Estimate>> {
        Ok(self.store.list_estimates(tenant_id, filter).await?)
    }

    #[instrument(skip(self, update), fields(shop_id = %tenant_id, estimate_id = %estimate_id, status = update.status.as_str()), err)]
    pub async fn update_estimate_status(
        &self,
        tenant_id: TenantId,
        estimate_id: EstimateId,
        update: EstimateStatusUpdate,
        now: DateTime<Utc>,
    ) -> ServiceResult<Estimate> {
        let estimate = self
            .store
            .update_estimate_status(tenant_id, estimate_id, &update, now)
            .await
            .or_not_found("estimate")?;
        info!("estimate status updated");
        Ok(estimate)
    }

    #[instrument(skip(self), fields(shop_id = %tenant_id, estimate_id = %estimate_id), err)]
    pub async fn delete_estimate(&self, tenant_id: TenantId, estimate_id: EstimateId) -> ServiceResult<()> {
        self.store.delete_estimate(tenant_id, estimate_id).await.or_not_found("estimate")?;
        info!("estimate deleted");
        Ok(())
    }

    #[instrument(skip(self), fields(shop_id = %tenant_id, estimate_id = %estimate_id), err)]
    pub async fn convert_estimate(
        &self,
        tenant_id: TenantId,
        estimate_id: EstimateId,
        now: DateTime<Utc>,
    ) -> ServiceResult<Conversion> {
        let conversion = self
            .store
            .convert_estimate(tenant_id, estimate_id, now)
            .await
            .or_not_found("estimate")?;
        info!(
            ticket_id = %conversion.ticket_id,
            ticket_number = %conversion.ticket_number,
            "estimate converted to ticket"
        );
        Ok(conversion)
    }

    // ── warranty ────────────────────────────────────────────────────────────

    /// Find a ticket by exact ticket number, else by customer phone digits,
    /// and report its warranty window.
    #[instrument(skip(self), fields(shop_id = %tenant_id), err)]
    pub async fn lookup_warranty(&self, tenant_id: TenantId, query: &str, now: DateTime<Utc>) -> ServiceResult<WarrantyStatus> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ServiceError::Validation("query parameter 'q' is required".into()));
        }
        let ticket = self.find_ticket(tenant_id, query).await?.ok_or(ServiceError::NotFound("ticket"))?;
        Ok(WarrantyStatus::for_ticket(&ticket, now))
    }

    async fn find_ticket(&self, tenant_id: TenantId, query: &str) -> ServiceResult<Option<Ticket>> {
        if let Some(ticket) = self.store.ticket_by_number(tenant_id, query).await? {
            return Ok(Some(ticket));
        }
        let digits = digits_only(query);
        if digits.len() < MIN_PHONE_DIGITS {
            return Ok(None);
        }
        Ok(self.store.latest_ticket_for_phone(tenant_id, &digits).await?)
    }

    #[instrument(skip(self, command), fields(shop_id = %command.tenant_id, ticket_number = %command.ticket_number), err)]
    pub async fn file_claim(&self, command: FileClaim, now: DateTime<Utc>) -> ServiceResult<WarrantyClaim> {
        command.validate()?;
        let tenant_id = command.tenant_id;

        let ticket = self
            .store
            .ticket_by_number(tenant_id, command.ticket_number.trim())
            .await
            .required("ticket")?;
        let invoice = self.store.latest_invoice_for_ticket(tenant_id, ticket.id).await?;
        let snapshot = RepairSnapshot::capture(&ticket, invoice.map(|i| (i.id, i.total)));

        let claim = self.store.insert_claim(command, snapshot, now).await?;
        info!(
            claim_id = %claim.id,
            claim_number = %claim.claim_number,
            within_window = claim.within_window(),
            "warranty claim filed"
        );
        Ok(claim)
    }

    pub async fn claims(&self, tenant_id: TenantId, filter: ClaimFilter) -> ServiceResult<Vec<WarrantyClaim>> {
        Ok(self.store.list_claims(tenant_id, filter).await?)
    }

    pub async fn claim(&self, tenant_id: TenantId, claim_id: ClaimId) -> ServiceResult<WarrantyClaim> {
        self.store.claim(tenant_id, claim_id).await.required("claim")
    }

    #[instrument(skip(self, update), fields(shop_id = %tenant_id, claim_id = %claim_id), err)]
    pub async fn update_claim(
        &self,
        tenant_id: TenantId,
        claim_id: ClaimId,
        update: ClaimUpdate,
        now: DateTime<Utc>,
    ) -> ServiceResult<WarrantyClaim> {
        let claim = self
            .store
            .update_claim(tenant_id, claim_id, &update, now)
            .await
            .or_not_found("claim")?;
        info!(status = claim.status.as_str(), "warranty claim updated");
        Ok(claim)
    }
}
