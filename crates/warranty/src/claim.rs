use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use repairdesk_core::{ClaimId, DomainError, DomainResult, Entity, InvoiceId, Money, TenantId, TicketId};
use repairdesk_tickets::Ticket;

use crate::lookup::{WARRANTY_PERIOD_DAYS, warranty_expires};

/// Claim lifecycle. Transitions are administrative and unconstrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimStatus {
    Pending,
    Approved,
    Denied,
    Completed,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Pending => "pending",
            ClaimStatus::Approved => "approved",
            ClaimStatus::Denied => "denied",
            ClaimStatus::Completed => "completed",
        }
    }
}

impl FromStr for ClaimStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ClaimStatus::Pending),
            "approved" => Ok(ClaimStatus::Approved),
            "denied" => Ok(ClaimStatus::Denied),
            "completed" => Ok(ClaimStatus::Completed),
            other => Err(DomainError::validation(format!("unknown claim status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionType {
    Redo,
    Refund,
    PartialRefund,
    Replacement,
}

impl ResolutionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionType::Redo => "redo",
            ResolutionType::Refund => "refund",
            ResolutionType::PartialRefund => "partial-refund",
            ResolutionType::Replacement => "replacement",
        }
    }
}

impl FromStr for ResolutionType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "redo" => Ok(ResolutionType::Redo),
            "refund" => Ok(ResolutionType::Refund),
            "partial-refund" => Ok(ResolutionType::PartialRefund),
            "replacement" => Ok(ResolutionType::Replacement),
            other => Err(DomainError::validation(format!("unknown resolution type '{other}'"))),
        }
    }
}

/// Repair facts captured when a claim is filed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairSnapshot {
    pub ticket_id: TicketId,
    pub invoice_id: Option<InvoiceId>,
    pub technician: Option<String>,
    pub amount: Option<Money>,
    pub repair_date: DateTime<Utc>,
}

impl RepairSnapshot {
    /// The billed amount comes from the ticket's invoice when one exists,
    /// otherwise from the ticket's estimated cost.
    pub fn capture(ticket: &Ticket, invoice: Option<(InvoiceId, Money)>) -> Self {
        Self {
            ticket_id: ticket.id,
            invoice_id: invoice.map(|(id, _)| id),
            technician: ticket.assigned_technician.clone(),
            amount: invoice.map(|(_, total)| total).or(ticket.estimated_cost),
            repair_date: ticket.repair_date(),
        }
    }
}

/// Command: FileClaim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileClaim {
    pub tenant_id: TenantId,
    pub ticket_number: String,
    pub claim_reason: String,
    pub claim_description: Option<String>,
    pub resolution_type: Option<ResolutionType>,
}

impl FileClaim {
    pub fn validate(&self) -> DomainResult<()> {
        if self.ticket_number.trim().is_empty() {
            return Err(DomainError::validation("ticketNumber is required"));
        }
        if self.claim_reason.trim().is_empty() {
            return Err(DomainError::validation("claimReason is required"));
        }
        Ok(())
    }
}

/// Administrative update of a filed claim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimUpdate {
    pub status: Option<ClaimStatus>,
    pub resolution_type: Option<ResolutionType>,
    pub resolution_notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarrantyClaim {
    pub id: ClaimId,
    pub tenant_id: TenantId,
    pub claim_number: String,
    pub ticket_id: TicketId,
    pub invoice_id: Option<InvoiceId>,
    pub original_technician: Option<String>,
    pub original_amount: Option<Money>,
    pub original_repair_date: DateTime<Utc>,
    pub warranty_period_days: i64,
    pub warranty_expires: DateTime<Utc>,
    pub claim_reason: String,
    pub claim_description: Option<String>,
    pub status: ClaimStatus,
    pub resolution_type: Option<ResolutionType>,
    pub resolution_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for WarrantyClaim {
    type Id = ClaimId;

    fn id(&self) -> ClaimId {
        self.id
    }

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

impl WarrantyClaim {
    /// New `pending` claim. Claims outside the warranty window are accepted;
    /// the stored `warranty_expires` lets reviewers see it.
    pub fn file(
        command: FileClaim,
        snapshot: RepairSnapshot,
        id: ClaimId,
        claim_number: String,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        command.validate()?;
        Ok(Self {
            id,
            tenant_id: command.tenant_id,
            claim_number,
            ticket_id: snapshot.ticket_id,
            invoice_id: snapshot.invoice_id,
            original_technician: snapshot.technician,
            original_amount: snapshot.amount,
            original_repair_date: snapshot.repair_date,
            warranty_period_days: WARRANTY_PERIOD_DAYS,
            warranty_expires: warranty_expires(snapshot.repair_date),
            claim_reason: command.claim_reason.trim().to_string(),
            claim_description: command.claim_description,
            status: ClaimStatus::Pending,
            resolution_type: command.resolution_type,
            resolution_notes: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn within_window(&self) -> bool {
        self.created_at < self.warranty_expires
    }

    /// Snapshot fields are never touched here.
    pub fn apply_update(&mut self, update: &ClaimUpdate, now: DateTime<Utc>) -> DomainResult<()> {
        if update.status.is_none() && update.resolution_type.is_none() && update.resolution_notes.is_none() {
            return Err(DomainError::validation(
                "nothing to update: provide status, resolutionType or resolutionNotes",
            ));
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(resolution) = update.resolution_type {
            self.resolution_type = Some(resolution);
        }
        if let Some(notes) = &update.resolution_notes {
            self.resolution_notes = Some(notes.clone());
        }
        self.updated_at = now;
        Ok(())
    }
}
