//! Input and view models used by repositories.
//!
//! Keep these structs focused on the data flowing in and out of queries.
//! Business logic should live in higher layers.

use crate::model::Unit;
use chrono::{DateTime, Utc};

/// Insert payload for an inventory item. Optional pricing fields may be
/// filled in later; the calculator reports them as missing until then.
#[derive(Debug, Clone)]
pub struct NewInventoryItem {
    pub name: String,
    pub sku: String,
    pub description: Option<String>,
    pub quantity: f64,
    pub unit: Unit,
    pub purchase_price: Option<f64>,
    pub purchase_unit: Option<Unit>,
    pub purchase_quantity: Option<f64>,
    pub low_stock_threshold: Option<f64>,
    pub high_stock_threshold: Option<f64>,
    pub expires_in_days: Option<i64>,
    pub date_received: Option<DateTime<Utc>>,
}

impl NewInventoryItem {
    /// Bare item with on-hand stock only; pricing and expiry left unset.
    pub fn basic(name: &str, sku: &str, quantity: f64, unit: Unit) -> Self {
        Self {
            name: name.into(),
            sku: sku.into(),
            description: None,
            quantity,
            unit,
            purchase_price: None,
            purchase_unit: None,
            purchase_quantity: None,
            low_stock_threshold: None,
            high_stock_threshold: None,
            expires_in_days: None,
            date_received: None,
        }
    }
}

/// One recipe line of a dish insert. `inventory_id` may be absent for
/// ingredients that are not (yet) tracked in inventory.
#[derive(Debug, Clone)]
pub struct NewRecipeLine {
    pub inventory_id: Option<i64>,
    pub name: String,
    pub unit: Unit,
    pub quantity_required: f64,
}

/// Insert/update payload for a shift.
#[derive(Debug, Clone)]
pub struct ShiftDraft {
    pub staff_id: i64,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub shift_type: String,
    pub notes: Option<String>,
}
