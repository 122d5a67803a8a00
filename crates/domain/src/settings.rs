//! Restaurant settings and price derivation.

use persistence::is_valid_email;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value_objects::{Money, Rate};

/// Errors from settings updates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("Restaurant name is required")]
    NameRequired,

    #[error("Invalid email address")]
    InvalidEmail,

    #[error("Currency must be a 3-letter code")]
    InvalidCurrency,

    #[error("Rate must be between 0 and 1, got {0}")]
    RateOutOfRange(Decimal),
}

/// Singleton restaurant configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestaurantSettings {
    pub name: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub currency: String,
    pub tax_rate: Rate,
    #[serde(rename = "serviceCharge")]
    pub service_charge: Rate,
}

impl Default for RestaurantSettings {
    fn default() -> Self {
        Self {
            name: "Sample Cafe".to_string(),
            address: "123 Main Street, City, State 12345".to_string(),
            phone: "+1 (555) 123-4567".to_string(),
            email: "info@samplecafe.com".to_string(),
            currency: "USD".to_string(),
            tax_rate: Rate::try_from(Decimal::new(8, 2)).unwrap_or_else(|_| Rate::zero()),
            service_charge: Rate::try_from(Decimal::new(5, 2)).unwrap_or_else(|_| Rate::zero()),
        }
    }
}

impl RestaurantSettings {
    /// Shallow-merges a patch into these settings.
    pub fn merge(&mut self, patch: &SettingsPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(address) = &patch.address {
            self.address = address.clone();
        }
        if let Some(phone) = &patch.phone {
            self.phone = phone.clone();
        }
        if let Some(email) = &patch.email {
            self.email = email.clone();
        }
        if let Some(currency) = &patch.currency {
            self.currency = currency.clone();
        }
        if let Some(tax_rate) = patch.tax_rate {
            self.tax_rate = tax_rate;
        }
        if let Some(service_charge) = patch.service_charge {
            self.service_charge = service_charge;
        }
    }
}

/// Partial settings update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_rate: Option<Rate>,
    #[serde(
        default,
        rename = "serviceCharge",
        skip_serializing_if = "Option::is_none"
    )]
    pub service_charge: Option<Rate>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.name.as_ref().is_some_and(|n| n.trim().is_empty()) {
            return Err(SettingsError::NameRequired);
        }
        if self.email.as_ref().is_some_and(|e| !is_valid_email(e.trim())) {
            return Err(SettingsError::InvalidEmail);
        }
        if self
            .currency
            .as_ref()
            .is_some_and(|c| c.len() != 3 || !c.chars().all(|ch| ch.is_ascii_alphabetic()))
        {
            return Err(SettingsError::InvalidCurrency);
        }
        Ok(())
    }
}

/// Price totals derived from a subtotal and the current rates.
///
/// Always computed on demand so a settings change is reflected immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBreakdown {
    pub subtotal: Money,
    pub tax: Money,
    pub service_charge: Money,
    pub total: Money,
}

impl PriceBreakdown {
    pub fn compute(subtotal: Money, settings: &RestaurantSettings) -> Self {
        let tax = subtotal.apply_rate(settings.tax_rate);
        let service_charge = subtotal.apply_rate(settings.service_charge);
        Self {
            subtotal,
            tax,
            service_charge,
            total: subtotal + tax + service_charge,
        }
    }
}
