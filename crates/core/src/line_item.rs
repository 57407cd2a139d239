//! Line items and document totals shared by invoices and estimates.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::money::Money;

fn default_quantity() -> Decimal {
    Decimal::ONE
}

/// A line item as submitted by a caller, before pricing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemInput {
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_quantity")]
    pub quantity: Decimal,
    pub unit_price: Money,
}

/// A priced line item. Fixed once the owning document is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Money,
    /// `round(quantity × unit_price)`.
    pub total: Money,
}

impl LineItem {
    pub fn price(description: impl Into<String>, quantity: Decimal, unit_price: Money) -> DomainResult<Self> {
        let unit_price = unit_price.in_range("unit price")?;
        Ok(Self {
            description: description.into(),
            quantity,
            unit_price,
            total: unit_price.checked_times(quantity, "line item total")?,
        })
    }
}

/// Price submitted items.
///
/// Items with a blank description are dropped. Fails when nothing is left, or
/// when a kept item has a non-positive quantity or prices out of range.
pub fn price_items(inputs: &[LineItemInput]) -> DomainResult<Vec<LineItem>> {
    if inputs.is_empty() {
        return Err(DomainError::validation("at least one line item is required"));
    }

    let mut items = Vec::with_capacity(inputs.len());
    for input in inputs {
        let description = input.description.trim();
        if description.is_empty() {
            continue;
        }
        if input.quantity <= Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "line item '{description}' must have a positive quantity"
            )));
        }
        items.push(LineItem::price(description, input.quantity, input.unit_price)?);
    }

    if items.is_empty() {
        return Err(DomainError::validation(
            "at least one line item must have a description",
        ));
    }
    Ok(items)
}

/// Document totals, computed once from priced items.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub subtotal: Money,
    pub tax_rate: Decimal,
    pub tax_amount: Money,
    pub discount: Money,
    pub total: Money,
}

impl Totals {
    /// `subtotal = Σ item.total`, `tax = round(subtotal × rate)`,
    /// `total = round(subtotal + tax − discount)`.
    pub fn compute(items: &[LineItem], tax_rate: Decimal, discount: Money) -> DomainResult<Self> {
        if tax_rate < Decimal::ZERO {
            return Err(DomainError::validation("tax rate must not be negative"));
        }
        if discount.is_negative() {
            return Err(DomainError::validation("discount must not be negative"));
        }

        let discount = discount.in_range("discount")?;

        let subtotal = Money::checked_sum(items.iter().map(|i| i.total), "subtotal")?;
        let tax_amount = subtotal.checked_times(tax_rate, "tax amount")?;
        let total = subtotal
            .checked_add(tax_amount, "total")?
            .checked_sub(discount, "total")?;
        Ok(Self {
            subtotal,
            tax_rate,
            tax_amount,
            discount,
            total,
        })
    }
}
