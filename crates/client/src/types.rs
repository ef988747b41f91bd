//! Domain records and request payloads exchanged with the backend.
//!
//! Shapes match the API's JSON. Payloads implement [`Validate`] so a bad form
//! is rejected before anything is sent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tillwise_core::validate::{require_non_empty, require_non_negative};
use tillwise_core::{Record, RecordId, Validate, ValidationError};

fn default_true() -> bool {
    true
}

fn check_email(email: Option<&str>) -> Result<(), ValidationError> {
    match email.map(str::trim) {
        Some(e) if !e.is_empty() && !e.contains('@') => {
            Err(ValidationError::new("email", "email must contain '@'"))
        }
        _ => Ok(()),
    }
}

fn check_amount(field: &str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ValidationError::new(field, format!("{field} must be a non-negative amount")));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Customers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: RecordId,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Record for Customer {
    fn id(&self) -> RecordId {
        self.id
    }
}

/// Create/update payload for a customer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerInput {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Validate for CustomerInput {
    fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("name", &self.name)?;
        check_email(self.email.as_deref())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Products
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: RecordId,
    pub name: String,
    pub sku: String,
    pub price: f64,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl Record for Product {
    fn id(&self) -> RecordId {
        self.id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductInput {
    pub name: String,
    pub sku: String,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Validate for ProductInput {
    fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("name", &self.name)?;
        require_non_empty("sku", &self.sku)?;
        check_amount("price", self.price)?;
        if let Some(cost) = self.cost {
            check_amount("cost", cost)?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: RecordId,
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl Record for UserAccount {
    fn id(&self) -> RecordId {
        self.id
    }
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInput {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Required on create; omitted on update unless it changes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl core::fmt::Debug for UserInput {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UserInput")
            .field("username", &self.username)
            .field("full_name", &self.full_name)
            .field("email", &self.email)
            .field("role", &self.role)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Validate for UserInput {
    fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("username", &self.username)?;
        check_email(self.email.as_deref())?;
        if self.password.as_deref().is_some_and(|p| p.len() < 8) {
            return Err(ValidationError::new("password", "password must be at least 8 characters"));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Inventory
// ─────────────────────────────────────────────────────────────────────────────

/// Stock position of one product, as listed on the inventory pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockLevel {
    pub product_id: RecordId,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    pub quantity: i64,
    #[serde(default)]
    pub min_stock: i64,
    #[serde(default)]
    pub max_stock: Option<i64>,
    #[serde(default)]
    pub reorder_point: Option<i64>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl StockLevel {
    pub fn is_low(&self) -> bool {
        self.quantity <= self.reorder_point.unwrap_or(self.min_stock)
    }

    pub fn apply_settings(&mut self, settings: &StockSettings) {
        self.min_stock = settings.min_stock;
        self.max_stock = settings.max_stock;
        self.reorder_point = settings.reorder_point;
    }
}

impl Record for StockLevel {
    fn id(&self) -> RecordId {
        self.product_id
    }
}

/// Body of `POST /inventory/adjust`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub product_id: RecordId,
    /// Signed change to apply to the on-hand quantity.
    pub quantity: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Validate for StockAdjustment {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.quantity == 0 {
            return Err(ValidationError::new("quantity", "adjustment cannot be zero"));
        }
        if let Some(reason) = &self.reason {
            require_non_empty("reason", reason)?;
        }
        Ok(())
    }
}

/// Body of `PUT /inventory/{id}/settings`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSettings {
    pub min_stock: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_stock: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reorder_point: Option<i64>,
}

impl Validate for StockSettings {
    fn validate(&self) -> Result<(), ValidationError> {
        require_non_negative("min_stock", self.min_stock)?;
        if let Some(max) = self.max_stock {
            require_non_negative("max_stock", max)?;
            if max < self.min_stock {
                return Err(ValidationError::new("max_stock", "max_stock must not be below min_stock"));
            }
        }
        if let Some(point) = self.reorder_point {
            require_non_negative("reorder_point", point)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventorySummary {
    pub total_products: u64,
    #[serde(default)]
    pub total_quantity: i64,
    #[serde(default)]
    pub low_stock_count: u64,
    #[serde(default)]
    pub out_of_stock_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryValuation {
    pub total_cost: f64,
    #[serde(default)]
    pub total_retail: f64,
    #[serde(default)]
    pub currency: Option<String>,
}
