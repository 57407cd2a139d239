//! In-memory backend for development and tests.
//!
//! One mutex guards all state, so every method is trivially a serializable
//! transaction. A method that fails leaves the state untouched.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use repairdesk_core::{
    ClaimId, CustomerId, DocumentKind, EstimateId, InvoiceId, PaymentId, TenantId, TicketId,
};
use repairdesk_estimates::{Conversion, Estimate, EstimateDraft, EstimateStatusUpdate};
use repairdesk_invoicing::{ApplyPayment, Invoice, InvoiceDraft, InvoiceStatusUpdate, Payment, PaymentOutcome};
use repairdesk_tickets::{Customer, Ticket};
use repairdesk_warranty::{ClaimUpdate, FileClaim, RepairSnapshot, WarrantyClaim};

use super::{
    ClaimFilter, Directory, EstimateFilter, EstimateStore, InvoiceFilter, InvoiceStore, StoreError,
    StoreResult, WarrantyStore,
};

#[derive(Debug, Default)]
struct State {
    customers: HashMap<(TenantId, CustomerId), Customer>,
    tickets: HashMap<(TenantId, TicketId), Ticket>,
    invoices: HashMap<(TenantId, InvoiceId), Invoice>,
    payments: Vec<Payment>,
    estimates: HashMap<(TenantId, EstimateId), Estimate>,
    claims: HashMap<(TenantId, ClaimId), WarrantyClaim>,
    sequences: HashMap<(TenantId, DocumentKind), u64>,
}

impl State {
    /// Peek the next number without consuming it.
    fn peek_number(&self, tenant_id: TenantId, kind: DocumentKind) -> (u64, String) {
        let mut seq = self.sequences.get(&(tenant_id, kind)).copied().unwrap_or(0) + 1;
        // Tickets can also be created outside the billing core with their own numbers.
        while kind == DocumentKind::Ticket && self.ticket_number_taken(tenant_id, &kind.format(seq)) {
            seq += 1;
        }
        (seq, kind.format(seq))
    }

    fn commit_number(&mut self, tenant_id: TenantId, kind: DocumentKind, seq: u64) {
        self.sequences.insert((tenant_id, kind), seq);
    }

    fn ticket_number_taken(&self, tenant_id: TenantId, number: &str) -> bool {
        self.tickets
            .values()
            .any(|t| t.tenant_id == tenant_id && t.ticket_number == number)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".to_string()))
    }
}

fn newest_first<T, F>(items: &mut [T], key: F)
where
    F: Fn(&T) -> (DateTime<Utc>, String),
{
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

#[async_trait]
impl Directory for InMemoryStore {
    async fn save_customer(&self, customer: Customer) -> StoreResult<()> {
        let mut state = self.lock()?;
        state.customers.insert((customer.tenant_id, customer.id), customer);
        Ok(())
    }

    async fn save_ticket(&self, ticket: Ticket) -> StoreResult<()> {
        let mut state = self.lock()?;
        let clash = state.tickets.values().any(|t| {
            t.tenant_id == ticket.tenant_id && t.ticket_number == ticket.ticket_number && t.id != ticket.id
        });
        if clash {
            return Err(StoreError::Conflict(format!(
                "ticket number {} already exists",
                ticket.ticket_number
            )));
        }
        state.tickets.insert((ticket.tenant_id, ticket.id), ticket);
        Ok(())
    }

    async fn customer_exists(&self, tenant_id: TenantId, customer_id: CustomerId) -> StoreResult<bool> {
        Ok(self.lock()?.customers.contains_key(&(tenant_id, customer_id)))
    }

    async fn ticket(&self, tenant_id: TenantId, ticket_id: TicketId) -> StoreResult<Option<Ticket>> {
        Ok(self.lock()?.tickets.get(&(tenant_id, ticket_id)).cloned())
    }

    async fn ticket_by_number(&self, tenant_id: TenantId, ticket_number: &str) -> StoreResult<Option<Ticket>> {
        let state = self.lock()?;
        Ok(state
            .tickets
            .values()
            .find(|t| t.tenant_id == tenant_id && t.ticket_number == ticket_number)
            .cloned())
    }

    async fn latest_ticket_for_phone(&self, tenant_id: TenantId, digits: &str) -> StoreResult<Option<Ticket>> {
        let state = self.lock()?;
        let customers: Vec<CustomerId> = state
            .customers
            .values()
            .filter(|c| c.tenant_id == tenant_id && c.phone_matches(digits))
            .map(|c| c.id)
            .collect();
        Ok(state
            .tickets
            .values()
            .filter(|t| t.tenant_id == tenant_id && customers.contains(&t.customer_id))
            .max_by_key(|t| t.created_at)
            .cloned())
    }
}

#[async_trait]
impl InvoiceStore for InMemoryStore {
    async fn insert_invoice(&self, draft: InvoiceDraft, now: DateTime<Utc>) -> StoreResult<Invoice> {
        let mut state = self.lock()?;
        let tenant_id = draft.tenant_id();
        let (seq, number) = state.peek_number(tenant_id, DocumentKind::Invoice);
        let invoice = draft.into_invoice(InvoiceId::new(), number, now);
        state.commit_number(tenant_id, DocumentKind::Invoice, seq);
        state.invoices.insert((tenant_id, invoice.id), invoice.clone());
        Ok(invoice)
    }

    async fn invoice(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> StoreResult<Option<Invoice>> {
        Ok(self.lock()?.invoices.get(&(tenant_id, invoice_id)).cloned())
    }

    async fn list_invoices(&self, tenant_id: TenantId, filter: InvoiceFilter) -> StoreResult<Vec<Invoice>> {
        let state = self.lock()?;
        let mut invoices: Vec<Invoice> = state
            .invoices
            .values()
            .filter(|i| i.tenant_id == tenant_id && filter.matches(i))
            .cloned()
            .collect();
        newest_first(&mut invoices, |i| (i.created_at, i.invoice_number.clone()));
        Ok(invoices)
    }

    async fn update_invoice_status(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        update: &InvoiceStatusUpdate,
        now: DateTime<Utc>,
    ) -> StoreResult<Invoice> {
        let mut state = self.lock()?;
        let invoice = state
            .invoices
            .get_mut(&(tenant_id, invoice_id))
            .ok_or(StoreError::NotFound)?;
        let mut next = invoice.clone();
        next.update_status(update, now)?;
        *invoice = next.clone();
        Ok(next)
    }

    async fn delete_invoice(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> StoreResult<()> {
        let mut state = self.lock()?;
        state
            .invoices
            .remove(&(tenant_id, invoice_id))
            .ok_or(StoreError::NotFound)?;
        state
            .payments
            .retain(|p| !(p.tenant_id == tenant_id && p.invoice_id == invoice_id));
        Ok(())
    }

    async fn apply_payment(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        command: &ApplyPayment,
        now: DateTime<Utc>,
    ) -> StoreResult<PaymentOutcome> {
        let mut state = self.lock()?;
        let invoice = state
            .invoices
            .get_mut(&(tenant_id, invoice_id))
            .ok_or(StoreError::NotFound)?;
        let mut next = invoice.clone();
        let (payment, outcome) = next.apply_payment(command, PaymentId::new(), now)?;
        *invoice = next;
        state.payments.push(payment);
        Ok(outcome)
    }

    async fn payments(&self, tenant_id: TenantId, invoice_id: InvoiceId) -> StoreResult<Vec<Payment>> {
        let state = self.lock()?;
        Ok(state
            .payments
            .iter()
            .filter(|p| p.tenant_id == tenant_id && p.invoice_id == invoice_id)
            .cloned()
            .collect())
    }

    async fn latest_invoice_for_ticket(&self, tenant_id: TenantId, ticket_id: TicketId) -> StoreResult<Option<Invoice>> {
        let state = self.lock()?;
        Ok(state
            .invoices
            .values()
            .filter(|i| i.tenant_id == tenant_id && i.ticket_id == Some(ticket_id))
            .max_by_key(|i| i.created_at)
            .cloned())
    }
}

#[async_trait]
impl EstimateStore for InMemoryStore {
    async fn insert_estimate(&self, draft: EstimateDraft, now: DateTime<Utc>) -> StoreResult<Estimate> {
        let mut state = self.lock()?;
        let tenant_id = draft.tenant_id();
        let (seq, number) = state.peek_number(tenant_id, DocumentKind::Estimate);
        let estimate = draft.into_estimate(EstimateId::new(), number, now);
        state.commit_number(tenant_id, DocumentKind::Estimate, seq);
        state.estimates.insert((tenant_id, estimate.id), estimate.clone());
        Ok(estimate)
    }

    async fn estimate(&self, tenant_id: TenantId, estimate_id: EstimateId) -> StoreResult<Option<Estimate>> {
        Ok(self.lock()?.estimates.get(&(tenant_id, estimate_id)).cloned())
    }

    async fn list_estimates(&self, tenant_id: TenantId, filter: EstimateFilter) -> StoreResult<Vec<Estimate>> {
        let state = self.lock()?;
        let mut estimates: Vec<Estimate> = state
            .estimates
            .values()
            .filter(|e| e.tenant_id == tenant_id && filter.matches(e))
            .cloned()
            .collect();
        newest_first(&mut estimates, |e| (e.created_at, e.estimate_number.clone()));
        Ok(estimates)
    }

    async fn update_estimate_status(
        &self,
        tenant_id: TenantId,
        estimate_id: EstimateId,
        update: &EstimateStatusUpdate,
        now: DateTime<Utc>,
    ) -> StoreResult<Estimate> {
        let mut state = self.lock()?;
        let estimate = state
            .estimates
            .get_mut(&(tenant_id, estimate_id))
            .ok_or(StoreError::NotFound)?;
        let mut next = estimate.clone();
        next.update_status(update, now)?;
        *estimate = next.clone();
        Ok(next)
    }

    async fn delete_estimate(&self, tenant_id: TenantId, estimate_id: EstimateId) -> StoreResult<()> {
        self.lock()?
            .estimates
            .remove(&(tenant_id, estimate_id))
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn convert_estimate(
        &self,
        tenant_id: TenantId,
        estimate_id: EstimateId,
        now: DateTime<Utc>,
    ) -> StoreResult<Conversion> {
        let mut state = self.lock()?;
        let mut estimate = state
            .estimates
            .get(&(tenant_id, estimate_id))
            .cloned()
            .ok_or(StoreError::NotFound)?;

        let new_ticket = estimate.conversion_ticket()?;
        let (seq, ticket_number) = state.peek_number(tenant_id, DocumentKind::Ticket);
        let ticket = new_ticket.into_ticket(TicketId::new(), ticket_number, now);
        estimate.mark_converted(ticket.id, now);

        let conversion = Conversion {
            estimate_id,
            ticket_id: ticket.id,
            ticket_number: ticket.ticket_number.clone(),
        };
        state.commit_number(tenant_id, DocumentKind::Ticket, seq);
        state.tickets.insert((tenant_id, ticket.id), ticket);
        state.estimates.insert((tenant_id, estimate_id), estimate);
        Ok(conversion)
    }
}

#[async_trait]
impl WarrantyStore for InMemoryStore {
    async fn insert_claim(
        &self,
        command: FileClaim,
        snapshot: RepairSnapshot,
        now: DateTime<Utc>,
    ) -> StoreResult<WarrantyClaim> {
        let mut state = self.lock()?;
        let tenant_id = command.tenant_id;
        let (seq, number) = state.peek_number(tenant_id, DocumentKind::WarrantyClaim);
        let claim = WarrantyClaim::file(command, snapshot, ClaimId::new(), number, now)?;
        state.commit_number(tenant_id, DocumentKind::WarrantyClaim, seq);
        state.claims.insert((tenant_id, claim.id), claim.clone());
        Ok(claim)
    }

    async fn claim(&self, tenant_id: TenantId, claim_id: ClaimId) -> StoreResult<Option<WarrantyClaim>> {
        Ok(self.lock()?.claims.get(&(tenant_id, claim_id)).cloned())
    }

    async fn list_claims(&self, tenant_id: TenantId, filter: ClaimFilter) -> StoreResult<Vec<WarrantyClaim>> {
        let state = self.lock()?;
        let mut claims: Vec<WarrantyClaim> = state
            .claims
            .values()
            .filter(|c| c.tenant_id == tenant_id && filter.matches(c))
            .cloned()
            .collect();
        newest_first(&mut claims, |c| (c.created_at, c.claim_number.clone()));
        Ok(claims)
    }

    async fn update_claim(
        &self,
        tenant_id: TenantId,
        claim_id: ClaimId,
        update: &ClaimUpdate,
        now: DateTime<Utc>,
    ) -> StoreResult<WarrantyClaim> {
        let mut state = self.lock()?;
        let claim = state
            .claims
            .get_mut(&(tenant_id, claim_id))
            .ok_or(StoreError::NotFound)?;
        let mut next = claim.clone();
        next.apply_update(update, now)?;
        *claim = next.clone();
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repairdesk_core::{LineItemInput, Money};
    use repairdesk_estimates::CreateEstimate;
    use repairdesk_invoicing::{CreateInvoice, PaymentMethod};
    use repairdesk_tickets::DeviceInfo;
    use rust_decimal_macros::dec;

    fn invoice_draft(tenant_id: TenantId) -> InvoiceDraft {
        Invoice::prepare(CreateInvoice {
            tenant_id,
            customer_id: CustomerId::new(),
            ticket_id: None,
            items: vec![LineItemInput {
                description: "Battery".to_string(),
                quantity: dec!(1),
                unit_price: Money::from_major(40),
            }],
            tax_rate: dec!(0),
            discount: Money::ZERO,
            due_at: None,
            status: None,
            notes: None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn numbers_are_sequential_per_tenant() {
        let store = InMemoryStore::new();
        let a = TenantId::new();
        let b = TenantId::new();

        let a1 = store.insert_invoice(invoice_draft(a), Utc::now()).await.unwrap();
        let a2 = store.insert_invoice(invoice_draft(a), Utc::now()).await.unwrap();
        let b1 = store.insert_invoice(invoice_draft(b), Utc::now()).await.unwrap();

        assert_eq!(a1.invoice_number, "INV-00001");
        assert_eq!(a2.invoice_number, "INV-00002");
        assert_eq!(b1.invoice_number, "INV-00001");
    }

    #[tokio::test]
    async fn foreign_tenant_sees_nothing() {
        let store = InMemoryStore::new();
        let owner = TenantId::new();
        let other = TenantId::new();
        let invoice = store.insert_invoice(invoice_draft(owner), Utc::now()).await.unwrap();

        assert!(store.invoice(other, invoice.id).await.unwrap().is_none());
        assert!(store.list_invoices(other, InvoiceFilter::default()).await.unwrap().is_empty());
        assert!(matches!(
            store.delete_invoice(other, invoice.id).await,
            Err(StoreError::NotFound)
        ));
        let pay = ApplyPayment::new(dec!(10), PaymentMethod::Cash, None, None).unwrap();
        assert!(matches!(
            store.apply_payment(other, invoice.id, &pay, Utc::now()).await,
            Err(StoreError::NotFound)
        ));
        assert!(store.invoice(owner, invoice.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_removes_payments() {
        let store = InMemoryStore::new();
        let tenant = TenantId::new();
        let invoice = store.insert_invoice(invoice_draft(tenant), Utc::now()).await.unwrap();
        let pay = ApplyPayment::new(dec!(10), PaymentMethod::Cash, None, None).unwrap();
        store.apply_payment(tenant, invoice.id, &pay, Utc::now()).await.unwrap();

        store.delete_invoice(tenant, invoice.id).await.unwrap();
        assert!(store.payments(tenant, invoice.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn converted_ticket_numbers_skip_existing_tickets() {
        let store = InMemoryStore::new();
        let tenant = TenantId::new();
        let customer_id = CustomerId::new();
        store
            .save_ticket(Ticket {
                id: TicketId::new(),
                tenant_id: tenant,
                ticket_number: "TKT-00001".to_string(),
                customer_id,
                status: "completed".to_string(),
                device: DeviceInfo::default(),
                estimated_cost: None,
                assigned_technician: None,
                notes: None,
                created_at: Utc::now(),
                repaired_at: None,
                completed_at: None,
            })
            .await
            .unwrap();

        let draft = Estimate::prepare(CreateEstimate {
            tenant_id: tenant,
            customer_id,
            device: DeviceInfo::default(),
            items: vec![LineItemInput {
                description: "Charging port".to_string(),
                quantity: dec!(1),
                unit_price: Money::from_major(60),
            }],
            tax_rate: None,
            valid_until: None,
            notes: None,
        })
        .unwrap();
        let estimate = store.insert_estimate(draft, Utc::now()).await.unwrap();

        let conversion = store.convert_estimate(tenant, estimate.id, Utc::now()).await.unwrap();
        assert_eq!(conversion.ticket_number, "TKT-00002");
    }
}
