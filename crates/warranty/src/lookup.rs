use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use repairdesk_core::TicketId;
use repairdesk_tickets::{DeviceInfo, Ticket};

/// Fixed warranty period for completed repairs.
pub const WARRANTY_PERIOD_DAYS: i64 = 90;

pub fn warranty_expires(repair_date: DateTime<Utc>) -> DateTime<Utc> {
    repair_date + Duration::days(WARRANTY_PERIOD_DAYS)
}

/// Answer to a warranty lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarrantyStatus {
    pub ticket_id: TicketId,
    pub ticket_number: String,
    pub device: DeviceInfo,
    pub repair_date: DateTime<Utc>,
    pub warranty_expires: DateTime<Utc>,
    pub is_active: bool,
    pub days_remaining: i64,
    pub warranty_period_days: i64,
}

impl WarrantyStatus {
    pub fn for_ticket(ticket: &Ticket, now: DateTime<Utc>) -> Self {
        let repair_date = ticket.repair_date();
        let expires = warranty_expires(repair_date);
        Self {
            ticket_id: ticket.id,
            ticket_number: ticket.ticket_number.clone(),
            device: ticket.device.clone(),
            repair_date,
            warranty_expires: expires,
            is_active: now < expires,
            days_remaining: days_remaining(expires, now),
            warranty_period_days: WARRANTY_PERIOD_DAYS,
        }
    }
}

/// `max(0, ceil((expires − now) / 1 day))` at full timestamp precision, so
/// an active warranty always has at least one day remaining.
fn days_remaining(expires: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let remaining = expires - now;
    if remaining <= Duration::zero() {
        return 0;
    }
    let whole = remaining.num_days();
    if remaining > Duration::days(whole) { whole + 1 } else { whole }
}
