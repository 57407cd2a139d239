use core::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use repairdesk_core::line_item::price_items;
use repairdesk_core::{
    CustomerId, DomainError, DomainResult, Entity, InvoiceId, LineItem, LineItemInput, Money,
    TenantId, TicketId, Totals,
};

/// Invoice status lifecycle.
///
/// `PARTIAL` and `PAID` are reached automatically by payment application.
/// `SENT` and `PAID` may also be set explicitly; `OVERDUE`, `CANCELLED` and
/// `REFUNDED` are administrative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Partial,
    Paid,
    Overdue,
    Cancelled,
    Refunded,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "DRAFT",
            InvoiceStatus::Sent => "SENT",
            InvoiceStatus::Partial => "PARTIAL",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Overdue => "OVERDUE",
            InvoiceStatus::Cancelled => "CANCELLED",
            InvoiceStatus::Refunded => "REFUNDED",
        }
    }
}

impl FromStr for InvoiceStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DRAFT" => Ok(InvoiceStatus::Draft),
            "SENT" => Ok(InvoiceStatus::Sent),
            "PARTIAL" => Ok(InvoiceStatus::Partial),
            "PAID" => Ok(InvoiceStatus::Paid),
            "OVERDUE" => Ok(InvoiceStatus::Overdue),
            "CANCELLED" => Ok(InvoiceStatus::Cancelled),
            "REFUNDED" => Ok(InvoiceStatus::Refunded),
            other => Err(DomainError::validation(format!("unknown invoice status '{other}'"))),
        }
    }
}

impl core::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invoice entity.
///
/// Items and totals are fixed at creation; only payment/status fields change
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: InvoiceId,
    pub tenant_id: TenantId,
    pub invoice_number: String,
    pub customer_id: CustomerId,
    pub ticket_id: Option<TicketId>,
    pub items: Vec<LineItem>,
    pub subtotal: Money,
    pub tax_rate: Decimal,
    pub tax_amount: Money,
    pub discount: Money,
    pub total: Money,
    pub amount_paid: Money,
    pub amount_due: Money,
    pub status: InvoiceStatus,
    pub notes: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> InvoiceId {
        self.id
    }

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Command: CreateInvoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateInvoice {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub ticket_id: Option<TicketId>,
    pub items: Vec<LineItemInput>,
    pub tax_rate: Decimal,
    pub discount: Money,
    pub due_at: Option<DateTime<Utc>>,
    pub status: Option<InvoiceStatus>,
    pub notes: Option<String>,
}

/// A validated and priced invoice that has not been numbered yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceDraft {
    command: CreateInvoice,
    items: Vec<LineItem>,
    totals: Totals,
}

impl InvoiceDraft {
    pub fn tenant_id(&self) -> TenantId {
        self.command.tenant_id
    }

    pub fn totals(&self) -> &Totals {
        &self.totals
    }

    /// Assign identity and number. Nothing here can fail, so numbers are
    /// only allocated for invoices that will be written.
    pub fn into_invoice(self, id: InvoiceId, invoice_number: String, now: DateTime<Utc>) -> Invoice {
        let InvoiceDraft { command, items, totals } = self;
        let mut invoice = Invoice {
            id,
            tenant_id: command.tenant_id,
            invoice_number,
            customer_id: command.customer_id,
            ticket_id: command.ticket_id,
            items,
            subtotal: totals.subtotal,
            tax_rate: totals.tax_rate,
            tax_amount: totals.tax_amount,
            discount: totals.discount,
            total: totals.total,
            amount_paid: Money::ZERO,
            amount_due: totals.total.floor_zero(),
            status: InvoiceStatus::Draft,
            notes: command.notes,
            issued_at: None,
            due_at: command.due_at,
            paid_at: None,
            created_at: now,
            updated_at: now,
        };
        if let Some(status) = command.status {
            invoice.set_status(status, now);
        }
        invoice
    }
}

/// Command: UpdateInvoiceStatus (administrative override).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvoiceStatusUpdate {
    pub status: Option<InvoiceStatus>,
    pub notes: Option<String>,
}

impl Invoice {
    /// Validate and price a create command.
    pub fn prepare(command: CreateInvoice) -> DomainResult<InvoiceDraft> {
        let items = price_items(&command.items)?;
        let totals = Totals::compute(&items, command.tax_rate, command.discount)?;
        Ok(InvoiceDraft { command, items, totals })
    }

    /// Apply an explicit status/notes change.
    ///
    /// Any status may be set. `SENT` stamps `issued_at` if absent; `PAID`
    /// zeroes `amount_due` and stamps `paid_at`.
    pub fn update_status(&mut self, update: &InvoiceStatusUpdate, now: DateTime<Utc>) -> DomainResult<()> {
        if update.status.is_none() && update.notes.is_none() {
            return Err(DomainError::validation("nothing to update: provide status or notes"));
        }
        if let Some(status) = update.status {
            self.set_status(status, now);
        }
        if let Some(notes) = &update.notes {
            self.notes = Some(notes.clone());
        }
        self.updated_at = now;
        Ok(())
    }

    fn set_status(&mut self, status: InvoiceStatus, now: DateTime<Utc>) {
        match status {
            InvoiceStatus::Sent => {
                self.issued_at.get_or_insert(now);
            }
            InvoiceStatus::Paid => {
                self.amount_due = Money::ZERO;
                self.paid_at.get_or_insert(now);
            }
            _ => {}
        }
        self.status = status;
    }

    /// Recompute totals from the stored items.
    pub fn recomputed_totals(&self) -> DomainResult<Totals> {
        Totals::compute(&self.items, self.tax_rate, self.discount)
    }
}
