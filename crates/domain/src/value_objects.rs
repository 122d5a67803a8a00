//! Value objects shared across the domain.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::order::OrderError;
use crate::settings::SettingsError;

/// Money amount represented in cents to avoid floating point issues.
///
/// Serializes as a plain integer number of cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money {
    /// Amount in cents (e.g., 1299 = $12.99)
    cents: i64,
}

impl Money {
    /// Creates a new Money amount from cents.
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Creates a Money amount from a decimal number of currency units,
    /// rounding half away from zero to the cent.
    ///
    /// Returns None if the amount does not fit in an `i64` of cents.
    pub fn from_decimal(amount: Decimal) -> Option<Self> {
        (amount * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .map(Self::from_cents)
    }

    /// Converts a floating point amount (as stored by older snapshots).
    pub fn from_f64(amount: f64) -> Option<Self> {
        Decimal::try_from(amount).ok().and_then(Self::from_decimal)
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns the dollar portion (whole number).
    pub fn dollars(&self) -> i64 {
        self.cents / 100
    }

    /// Returns the cents portion (remainder after dollars).
    pub fn cents_part(&self) -> i64 {
        self.cents.abs() % 100
    }

    /// Returns the amount as a decimal number of currency units.
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.cents, 2)
    }

    pub fn is_zero(&self) -> bool {
        self.cents == 0
    }

    pub fn is_negative(&self) -> bool {
        self.cents < 0
    }

    /// Multiplies by a quantity.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money {
            cents: self.cents * quantity as i64,
        }
    }

    /// Applies a fractional rate, rounding half away from zero to the cent.
    pub fn apply_rate(&self, rate: Rate) -> Money {
        let cents = (Decimal::from(self.cents) * rate.as_decimal())
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .unwrap_or_default();
        Money { cents }
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.cents < 0 {
            write!(f, "-${}.{:02}", self.dollars().abs(), self.cents_part())
        } else {
            write!(f, "${}.{:02}", self.dollars(), self.cents_part())
        }
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents + rhs.cents,
        }
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.cents += rhs.cents;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

/// A fraction between 0 and 1 inclusive (tax rate, service charge).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Rate(Decimal);

impl Rate {
    /// Creates a rate, rejecting values outside `0..=1`.
    pub fn new(value: Decimal) -> Result<Self, SettingsError> {
        if value < Decimal::ZERO || value > Decimal::ONE {
            return Err(SettingsError::RateOutOfRange(value));
        }
        Ok(Self(value))
    }

    /// Creates a rate from a percentage expressed in basis points
    /// (e.g. 800 = 8%).
    pub fn from_basis_points(bps: u32) -> Result<Self, SettingsError> {
        Self::new(Decimal::new(bps as i64, 4))
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Rate {
    type Error = SettingsError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Rate> for Decimal {
    fn from(rate: Rate) -> Self {
        rate.0
    }
}

impl std::fmt::Display for Rate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", (self.0 * Decimal::ONE_HUNDRED).normalize())
    }
}

/// Maximum table number length.
pub const TABLE_NUMBER_MAX_LEN: usize = 10;

/// A table identifier: 1 to 10 ASCII alphanumeric characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableNumber(String);

impl TableNumber {
    /// Parses user input, trimming surrounding whitespace.
    pub fn parse(input: &str) -> Result<Self, OrderError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(OrderError::TableNumberRequired);
        }
        if trimmed.len() > TABLE_NUMBER_MAX_LEN
            || !trimmed.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(OrderError::InvalidTableNumber(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TableNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
