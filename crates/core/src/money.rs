//! Fixed-point money arithmetic.
//!
//! Every monetary quantity is a decimal with exactly two fractional digits.
//! Rounding is round-half-away-from-zero and happens at **every** arithmetic
//! step, so recomputing a total from stored parts always reproduces the stored
//! value exactly. There is no division anywhere in ledger math.
//!
//! Arithmetic is checked. Every result must fit the storage columns
//! (`NUMERIC(14, 2)`), so out-of-range amounts surface as validation errors
//! before anything is written.

use core::ops::Neg;
use core::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{DomainError, DomainResult};

/// Number of fractional digits carried by every money value.
pub const MONEY_SCALE: u32 = 2;

/// Largest magnitude, in cents, that a stored amount may carry.
const MAX_CENTS: i64 = 99_999_999_999_999;

/// Largest magnitude a money value may carry (`999999999999.99`).
pub fn max_money() -> Decimal {
    Decimal::new(MAX_CENTS, MONEY_SCALE)
}

/// Round a raw decimal to the money scale (half away from zero).
pub fn round_money(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(MONEY_SCALE);
    rounded
}

/// A rounded, signed money amount.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::from_parts(0, 0, 0, false, MONEY_SCALE));

    /// Build a money value, rounding to two fractional digits.
    pub fn new(value: Decimal) -> Self {
        Self(round_money(value))
    }

    /// Whole currency units, mostly useful in tests.
    pub fn from_major(units: i64) -> Self {
        Self::new(Decimal::from(units))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Fails with a validation error naming `what` when the magnitude is
    /// larger than [`max_money`].
    pub fn in_range(self, what: &str) -> DomainResult<Money> {
        if self.0.abs() > max_money() {
            return Err(overflow(what));
        }
        Ok(self)
    }

    /// `round(self × factor)`; used for `qty × unit_price` and `subtotal × tax_rate`.
    pub fn checked_times(self, factor: Decimal, what: &str) -> DomainResult<Money> {
        let product = self.0.checked_mul(factor).ok_or_else(|| overflow(what))?;
        Money::new(product).in_range(what)
    }

    pub fn checked_add(self, rhs: Money, what: &str) -> DomainResult<Money> {
        let sum = self.0.checked_add(rhs.0).ok_or_else(|| overflow(what))?;
        Money::new(sum).in_range(what)
    }

    pub fn checked_sub(self, rhs: Money, what: &str) -> DomainResult<Money> {
        let difference = self.0.checked_sub(rhs.0).ok_or_else(|| overflow(what))?;
        Money::new(difference).in_range(what)
    }

    /// Sum of `parts`, failing as soon as a partial sum leaves the range.
    pub fn checked_sum<I>(parts: I, what: &str) -> DomainResult<Money>
    where
        I: IntoIterator<Item = Money>,
    {
        parts
            .into_iter()
            .try_fold(Money::ZERO, |acc, m| acc.checked_add(m, what))
    }

    /// Clamp negative values to zero.
    pub fn floor_zero(self) -> Money {
        if self.is_negative() { Money::ZERO } else { self }
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::ZERO
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Money::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl FromStr for Money {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim())
            .map(Money::new)
            .map_err(|e| DomainError::validation(format!("invalid money amount '{s}': {e}")))
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

// Incoming values may carry more precision than the ledger keeps.
impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        <Decimal as Deserialize>::deserialize(deserializer).map(Money::new)
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(-self.0)
    }
}

fn overflow(what: &str) -> DomainError {
    DomainError::validation(format!("{what} is out of range"))
}
