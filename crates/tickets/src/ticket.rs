use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use repairdesk_core::{CustomerId, Entity, Money, TenantId, TicketId};

/// Device descriptors carried by estimates and tickets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceInfo {
    pub device_type: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub issue_description: Option<String>,
}

impl DeviceInfo {
    /// "Apple iPhone 13", falling back to the device type.
    pub fn label(&self) -> String {
        let parts: Vec<&str> = [self.brand.as_deref(), self.model.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.trim().is_empty())
            .collect();
        if parts.is_empty() {
            self.device_type.clone().unwrap_or_default()
        } else {
            parts.join(" ")
        }
    }
}

/// Ticket fields the billing core reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: TicketId,
    pub tenant_id: TenantId,
    pub ticket_number: String,
    pub customer_id: CustomerId,
    pub status: String,
    pub device: DeviceInfo,
    pub estimated_cost: Option<Money>,
    pub assigned_technician: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub repaired_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Ticket {
    /// `completed_at ?? repaired_at ?? created_at`.
    pub fn repair_date(&self) -> DateTime<Utc> {
        self.completed_at
            .or(self.repaired_at)
            .unwrap_or(self.created_at)
    }
}

impl Entity for Ticket {
    type Id = TicketId;

    fn id(&self) -> TicketId {
        self.id
    }

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Status given to tickets created from an approved estimate.
pub const CONVERTED_TICKET_STATUS: &str = "pending";

/// A ticket to be created by the ticket surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTicket {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub device: DeviceInfo,
    pub estimated_cost: Money,
    pub notes: Option<String>,
}

impl NewTicket {
    /// Materialize the ticket once the store has assigned id and number.
    pub fn into_ticket(self, id: TicketId, ticket_number: String, now: DateTime<Utc>) -> Ticket {
        Ticket {
            id,
            tenant_id: self.tenant_id,
            ticket_number,
            customer_id: self.customer_id,
            status: CONVERTED_TICKET_STATUS.to_string(),
            device: self.device,
            estimated_cost: Some(self.estimated_cost),
            assigned_technician: None,
            notes: self.notes,
            created_at: now,
            repaired_at: None,
            completed_at: None,
        }
    }
}
