use core::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use repairdesk_core::line_item::price_items;
use repairdesk_core::{
    CustomerId, DomainError, DomainResult, Entity, EstimateId, LineItem, LineItemInput, Money,
    TenantId, TicketId, Totals,
};
use repairdesk_tickets::{DeviceInfo, NewTicket};

/// Tax rate applied when the caller does not supply one (8.25%).
pub const DEFAULT_TAX_RATE: Decimal = Decimal::from_parts(825, 0, 0, false, 4);

/// Days an estimate stays valid when the caller does not supply `valid_until`.
pub const DEFAULT_VALIDITY_DAYS: i64 = 7;

/// `draft → sent → viewed → approved|declined → expired|converted`.
///
/// Only `converted` is guarded: it is reachable solely through conversion and
/// nothing leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimateStatus {
    Draft,
    Sent,
    Viewed,
    Approved,
    Declined,
    Expired,
    Converted,
}

impl EstimateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EstimateStatus::Draft => "draft",
            EstimateStatus::Sent => "sent",
            EstimateStatus::Viewed => "viewed",
            EstimateStatus::Approved => "approved",
            EstimateStatus::Declined => "declined",
            EstimateStatus::Expired => "expired",
            EstimateStatus::Converted => "converted",
        }
    }
}

impl FromStr for EstimateStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(EstimateStatus::Draft),
            "sent" => Ok(EstimateStatus::Sent),
            "viewed" => Ok(EstimateStatus::Viewed),
            "approved" => Ok(EstimateStatus::Approved),
            "declined" => Ok(EstimateStatus::Declined),
            "expired" => Ok(EstimateStatus::Expired),
            "converted" => Ok(EstimateStatus::Converted),
            other => Err(DomainError::validation(format!("unknown estimate status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Estimate {
    pub id: EstimateId,
    pub tenant_id: TenantId,
    pub estimate_number: String,
    pub customer_id: CustomerId,
    pub device: DeviceInfo,
    pub items: Vec<LineItem>,
    pub subtotal: Money,
    pub tax_rate: Decimal,
    pub tax_amount: Money,
    pub total: Money,
    pub status: EstimateStatus,
    pub valid_until: DateTime<Utc>,
    pub notes: Option<String>,
    pub decline_reason: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub declined_at: Option<DateTime<Utc>>,
    pub converted_to_ticket_id: Option<TicketId>,
    pub converted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Estimate {
    type Id = EstimateId;

    fn id(&self) -> EstimateId {
        self.id
    }

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Command: CreateEstimate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateEstimate {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub device: DeviceInfo,
    pub items: Vec<LineItemInput>,
    pub tax_rate: Option<Decimal>,
    pub valid_until: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// A validated and priced estimate that has not been numbered yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EstimateDraft {
    command: CreateEstimate,
    items: Vec<LineItem>,
    totals: Totals,
}

impl EstimateDraft {
    pub fn tenant_id(&self) -> TenantId {
        self.command.tenant_id
    }

    pub fn totals(&self) -> &Totals {
        &self.totals
    }

    pub fn into_estimate(self, id: EstimateId, estimate_number: String, now: DateTime<Utc>) -> Estimate {
        let EstimateDraft { command, items, totals } = self;
        Estimate {
            id,
            tenant_id: command.tenant_id,
            estimate_number,
            customer_id: command.customer_id,
            device: command.device,
            items,
            subtotal: totals.subtotal,
            tax_rate: totals.tax_rate,
            tax_amount: totals.tax_amount,
            total: totals.total,
            status: EstimateStatus::Draft,
            valid_until: command
                .valid_until
                .unwrap_or(now + Duration::days(DEFAULT_VALIDITY_DAYS)),
            notes: command.notes,
            decline_reason: None,
            approved_at: None,
            declined_at: None,
            converted_to_ticket_id: None,
            converted_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Command: UpdateEstimateStatus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EstimateStatusUpdate {
    pub status: EstimateStatus,
    pub decline_reason: Option<String>,
    pub notes: Option<String>,
}

/// Result of a successful conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversion {
    pub estimate_id: EstimateId,
    pub ticket_id: TicketId,
    pub ticket_number: String,
}

impl Estimate {
    /// Validate and price a create command. Estimates carry no discount.
    pub fn prepare(command: CreateEstimate) -> DomainResult<EstimateDraft> {
        let items = price_items(&command.items)?;
        let tax_rate = command.tax_rate.unwrap_or(DEFAULT_TAX_RATE);
        let totals = Totals::compute(&items, tax_rate, Money::ZERO)?;
        Ok(EstimateDraft { command, items, totals })
    }

    pub fn is_converted(&self) -> bool {
        self.converted_to_ticket_id.is_some() || self.status == EstimateStatus::Converted
    }

    /// Explicit status change. Any prior status is accepted except `converted`.
    pub fn update_status(&mut self, update: &EstimateStatusUpdate, now: DateTime<Utc>) -> DomainResult<()> {
        if self.is_converted() {
            return Err(DomainError::conflict(format!(
                "estimate {} has already been converted",
                self.estimate_number
            )));
        }
        match update.status {
            EstimateStatus::Converted => {
                return Err(DomainError::validation(
                    "estimates become converted only through conversion",
                ));
            }
            EstimateStatus::Approved => self.approved_at = Some(now),
            EstimateStatus::Declined => {
                self.declined_at = Some(now);
                self.decline_reason = update.decline_reason.clone();
            }
            _ => {}
        }
        if let Some(notes) = &update.notes {
            self.notes = Some(notes.clone());
        }
        self.status = update.status;
        self.updated_at = now;
        Ok(())
    }

    /// Ticket to create for this estimate. Fails with `Conflict` once converted.
    pub fn conversion_ticket(&self) -> DomainResult<NewTicket> {
        if self.is_converted() {
            return Err(DomainError::conflict(format!(
                "estimate {} has already been converted",
                self.estimate_number
            )));
        }
        Ok(NewTicket {
            tenant_id: self.tenant_id,
            customer_id: self.customer_id,
            device: self.device.clone(),
            estimated_cost: self.total,
            notes: Some(format!("Created from estimate {}", self.estimate_number)),
        })
    }

    /// Record the one-way conversion. Call in the same transaction that
    /// inserted the ticket.
    pub fn mark_converted(&mut self, ticket_id: TicketId, now: DateTime<Utc>) {
        self.status = EstimateStatus::Converted;
        self.converted_to_ticket_id = Some(ticket_id);
        self.converted_at = Some(now);
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn command(items: Vec<LineItemInput>) -> CreateEstimate {
        CreateEstimate {
            tenant_id: TenantId::new(),
            customer_id: CustomerId::new(),
            device: DeviceInfo {
                brand: Some("Samsung".to_string()),
                model: Some("Galaxy S21".to_string()),
                issue_description: Some("cracked back glass".to_string()),
                ..DeviceInfo::default()
            },
            items,
            tax_rate: None,
            valid_until: None,
            notes: None,
        }
    }

    fn item(description: &str, unit_price: i64) -> LineItemInput {
        LineItemInput {
            description: description.to_string(),
            quantity: dec!(1),
            unit_price: Money::from_major(unit_price),
        }
    }

    fn estimate() -> Estimate {
        Estimate::prepare(command(vec![item("Back glass", 100)]))
            .unwrap()
            .into_estimate(EstimateId::new(), "EST-00001".to_string(), Utc::now())
    }

    #[test]
    fn defaults_tax_rate_and_validity() {
        let now = Utc::now();
        let est = Estimate::prepare(command(vec![item("Back glass", 100)]))
            .unwrap()
            .into_estimate(EstimateId::new(), "EST-00001".to_string(), now);

        assert_eq!(est.tax_rate, dec!(0.0825));
        assert_eq!(est.tax_amount.amount(), dec!(8.25));
        assert_eq!(est.total.amount(), dec!(108.25));
        assert_eq!(est.valid_until, now + Duration::days(7));
        assert_eq!(est.status, EstimateStatus::Draft);
    }

    #[test]
    fn items_without_descriptions_fail_validation() {
        let err = Estimate::prepare(command(vec![item("", 10), item("   ", 20)])).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn approval_and_decline_stamp_timestamps() {
        let mut est = estimate();
        est.update_status(
            &EstimateStatusUpdate { status: EstimateStatus::Approved, decline_reason: None, notes: None },
            Utc::now(),
        )
        .unwrap();
        assert!(est.approved_at.is_some());

        est.update_status(
            &EstimateStatusUpdate {
                status: EstimateStatus::Declined,
                decline_reason: Some("too expensive".to_string()),
                notes: None,
            },
            Utc::now(),
        )
        .unwrap();
        assert!(est.declined_at.is_some());
        assert_eq!(est.decline_reason.as_deref(), Some("too expensive"));
        assert_eq!(est.status, EstimateStatus::Declined);
    }

    #[test]
    fn converted_cannot_be_set_explicitly() {
        let mut est = estimate();
        let err = est
            .update_status(
                &EstimateStatusUpdate { status: EstimateStatus::Converted, decline_reason: None, notes: None },
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn conversion_seeds_ticket_and_is_one_way() {
        let mut est = estimate();
        let ticket = est.conversion_ticket().unwrap();
        assert_eq!(ticket.customer_id, est.customer_id);
        assert_eq!(ticket.estimated_cost, est.total);
        assert_eq!(ticket.device, est.device);

        let ticket_id = TicketId::new();
        est.mark_converted(ticket_id, Utc::now());
        assert_eq!(est.status, EstimateStatus::Converted);
        assert_eq!(est.converted_to_ticket_id, Some(ticket_id));

        assert!(matches!(est.conversion_ticket(), Err(DomainError::Conflict(_))));
        let err = est
            .update_status(
                &EstimateStatusUpdate { status: EstimateStatus::Sent, decline_reason: None, notes: None },
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&EstimateStatus::Viewed).unwrap(), "\"viewed\"");
        assert_eq!("Approved".parse::<EstimateStatus>().unwrap(), EstimateStatus::Approved);
    }
}
