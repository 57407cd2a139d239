//! Payment application.
//!
//! Payments are append-only signed ledger entries: positive amounts collect,
//! negative amounts refund. `Invoice::apply_payment` is the single place that
//! derives `amount_paid`, `amount_due` and the payment-driven status; stores
//! must call it while holding a lock on the invoice row.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use repairdesk_core::{DomainError, DomainResult, InvoiceId, Money, PaymentId, TenantId};

use crate::invoice::{Invoice, InvoiceStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Check,
    BankTransfer,
    StoreCredit,
    Other,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Check => "check",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::StoreCredit => "store_credit",
            PaymentMethod::Other => "other",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(PaymentMethod::Cash),
            "card" => Ok(PaymentMethod::Card),
            "check" => Ok(PaymentMethod::Check),
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            "store_credit" => Ok(PaymentMethod::StoreCredit),
            "other" => Ok(PaymentMethod::Other),
            other => Err(DomainError::validation(format!("unknown payment method '{other}'"))),
        }
    }
}

/// A ledger entry. Never mutated after insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: PaymentId,
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Command: ApplyPayment. Construct through [`ApplyPayment::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyPayment {
    amount: Money,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

impl ApplyPayment {
    /// Rounds `amount` to cents; zero (after rounding) and amounts beyond the
    /// money range are rejected.
    pub fn new(
        amount: Decimal,
        method: PaymentMethod,
        reference: Option<String>,
        notes: Option<String>,
    ) -> DomainResult<Self> {
        let amount = Money::new(amount).in_range("payment amount")?;
        if amount.is_zero() {
            return Err(DomainError::validation("payment amount must be non-zero"));
        }
        Ok(Self { amount, method, reference, notes })
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn is_refund(&self) -> bool {
        self.amount.is_negative()
    }
}

/// Derived invoice state after a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOutcome {
    pub payment_id: PaymentId,
    pub amount_paid: Money,
    pub amount_due: Money,
    pub status: InvoiceStatus,
    /// Amount collected beyond the invoice total by this invoice's ledger.
    /// Reported only; it is not carried as a credit anywhere.
    pub overpayment: Money,
}

impl Invoice {
    /// Append `command` to this invoice's ledger and recompute derived state.
    ///
    /// `next_paid = paid + amount`, `next_due = max(0, total − next_paid)`,
    /// status is `PAID` when nothing is due and `PARTIAL` otherwise.
    pub fn apply_payment(
        &mut self,
        command: &ApplyPayment,
        payment_id: PaymentId,
        now: DateTime<Utc>,
    ) -> DomainResult<(Payment, PaymentOutcome)> {
        let next_paid = self.amount_paid.checked_add(command.amount, "amount paid")?;
        let next_due = self.total.checked_sub(next_paid, "amount due")?.floor_zero();
        let overpayment = next_paid.checked_sub(self.total, "overpayment")?.floor_zero();

        let payment = Payment {
            id: payment_id,
            tenant_id: self.tenant_id,
            invoice_id: self.id,
            amount: command.amount,
            method: command.method,
            reference: command.reference.clone(),
            notes: command.notes.clone(),
            created_at: now,
        };

        let next_status = if next_due.is_zero() {
            InvoiceStatus::Paid
        } else {
            InvoiceStatus::Partial
        };

        self.amount_paid = next_paid;
        self.amount_due = next_due;
        self.status = next_status;
        if next_status == InvoiceStatus::Paid {
            self.paid_at.get_or_insert(now);
        }
        self.updated_at = now;

        let outcome = PaymentOutcome {
            payment_id,
            amount_paid: next_paid,
            amount_due: next_due,
            status: next_status,
            overpayment,
        };
        Ok((payment, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::CreateInvoice;
    use proptest::prelude::*;
    use repairdesk_core::{CustomerId, LineItemInput};
    use rust_decimal_macros::dec;

    fn invoice_with_total_103() -> Invoice {
        let cmd = CreateInvoice {
            tenant_id: TenantId::new(),
            customer_id: CustomerId::new(),
            ticket_id: None,
            items: vec![
                LineItemInput {
                    description: "Screen".to_string(),
                    quantity: dec!(1),
                    unit_price: Money::from_major(50),
                },
                LineItemInput {
                    description: "Labor".to_string(),
                    quantity: dec!(2),
                    unit_price: Money::from_major(25),
                },
            ],
            tax_rate: dec!(0.08),
            discount: Money::from_major(5),
            due_at: None,
            status: None,
            notes: None,
        };
        Invoice::prepare(cmd)
            .unwrap()
            .into_invoice(InvoiceId::new(), "INV-00001".to_string(), Utc::now())
    }

    fn pay(invoice: &mut Invoice, amount: Decimal) -> PaymentOutcome {
        let cmd = ApplyPayment::new(amount, PaymentMethod::Card, None, None).unwrap();
        invoice.apply_payment(&cmd, PaymentId::new(), Utc::now()).unwrap().1
    }

    #[test]
    fn full_payment_marks_paid() {
        let mut invoice = invoice_with_total_103();
        let outcome = pay(&mut invoice, dec!(103));

        assert_eq!(outcome.amount_paid, Money::from_major(103));
        assert_eq!(outcome.amount_due, Money::ZERO);
        assert_eq!(outcome.status, InvoiceStatus::Paid);
        assert!(invoice.paid_at.is_some());
    }

    #[test]
    fn two_partial_payments_settle_the_invoice() {
        let mut invoice = invoice_with_total_103();

        let first = pay(&mut invoice, dec!(50));
        assert_eq!(first.amount_due, Money::from_major(53));
        assert_eq!(first.status, InvoiceStatus::Partial);
        assert!(invoice.paid_at.is_none());

        let second = pay(&mut invoice, dec!(53));
        assert_eq!(second.amount_due, Money::ZERO);
        assert_eq!(second.status, InvoiceStatus::Paid);
    }

    #[test]
    fn refund_on_paid_invoice_reopens_it() {
        let mut invoice = invoice_with_total_103();
        pay(&mut invoice, dec!(103));

        let outcome = pay(&mut invoice, dec!(-20));
        assert_eq!(outcome.amount_paid, Money::from_major(83));
        assert_eq!(outcome.amount_due, Money::from_major(20));
        assert_eq!(outcome.status, InvoiceStatus::Partial);
    }

    #[test]
    fn overpayment_floors_due_and_is_only_reported() {
        let mut invoice = invoice_with_total_103();
        let outcome = pay(&mut invoice, dec!(110));

        assert_eq!(outcome.amount_paid, Money::from_major(110));
        assert_eq!(outcome.amount_due, Money::ZERO);
        assert_eq!(outcome.status, InvoiceStatus::Paid);
        assert_eq!(outcome.overpayment, Money::from_major(7));
    }

    #[test]
    fn zero_amount_is_rejected() {
        let err = ApplyPayment::new(dec!(0.004), PaymentMethod::Cash, None, None).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn oversized_payment_is_rejected() {
        let err = ApplyPayment::new(dec!(50000000000000000000000000000), PaymentMethod::Cash, None, None)
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn payment_overflowing_amount_paid_leaves_invoice_untouched() {
        let mut invoice = invoice_with_total_103();
        pay(&mut invoice, dec!(999999999999.99));
        let before = invoice.clone();

        let cmd = ApplyPayment::new(dec!(1), PaymentMethod::Cash, None, None).unwrap();
        let err = invoice.apply_payment(&cmd, PaymentId::new(), Utc::now()).unwrap_err();

        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(invoice, before);
    }

    #[test]
    fn payment_records_the_signed_amount() {
        let mut invoice = invoice_with_total_103();
        let cmd = ApplyPayment::new(dec!(-12.345), PaymentMethod::Cash, Some("R-1".into()), None).unwrap();
        assert!(cmd.is_refund());
        let (payment, _) = invoice.apply_payment(&cmd, PaymentId::new(), Utc::now()).unwrap();
        assert_eq!(payment.amount.amount(), dec!(-12.35));
        assert_eq!(payment.invoice_id, invoice.id);
        assert_eq!(payment.reference.as_deref(), Some("R-1"));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: after any sequence of collections and refunds the ledger
        /// invariants hold.
        #[test]
        fn ledger_invariants_hold(cents in prop::collection::vec(-20_000i64..20_000i64, 1..12)) {
            let mut invoice = invoice_with_total_103();
            let mut ledger: Vec<Money> = Vec::new();

            for c in cents {
                let Ok(cmd) = ApplyPayment::new(Decimal::new(c, 2), PaymentMethod::Card, None, None) else {
                    continue;
                };
                let (payment, outcome) = invoice.apply_payment(&cmd, PaymentId::new(), Utc::now()).unwrap();
                ledger.push(payment.amount);

                let sum = Money::checked_sum(ledger.iter().copied(), "sum").unwrap();
                prop_assert_eq!(invoice.amount_paid, sum);
                prop_assert_eq!(invoice.amount_due, invoice.total.checked_sub(sum, "due").unwrap().floor_zero());
                prop_assert_eq!(outcome.status == InvoiceStatus::Paid, outcome.amount_due.is_zero());
            }
        }
    }
}
