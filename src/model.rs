use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of stocking/purchase/recipe units. Conversions are only
/// permitted within a family (mass with mass, volume with volume, count
/// with count).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    G,
    Kg,
    Ml,
    L,
    #[serde(rename = "unit")]
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitFamily {
    Mass,
    Volume,
    Count,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::G => "g",
            Unit::Kg => "kg",
            Unit::Ml => "ml",
            Unit::L => "l",
            Unit::Count => "unit",
        }
    }

    pub fn parse_unit(s: &str) -> Option<Unit> {
        match s {
            "g" => Some(Unit::G),
            "kg" => Some(Unit::Kg),
            "ml" => Some(Unit::Ml),
            "l" => Some(Unit::L),
            "unit" => Some(Unit::Count),
            _ => None,
        }
    }

    pub fn family(&self) -> UnitFamily {
        match self {
            Unit::G | Unit::Kg => UnitFamily::Mass,
            Unit::Ml | Unit::L => UnitFamily::Volume,
            Unit::Count => UnitFamily::Count,
        }
    }

    /// How many base units (g, ml, or pieces) one of this unit holds.
    /// 1 kg = 1000 g, 1 l = 1000 ml; count has no sub-unit.
    pub fn base_factor(&self) -> f64 {
        match self {
            Unit::G | Unit::Ml | Unit::Count => 1.0,
            Unit::Kg | Unit::L => 1000.0,
        }
    }
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    StockAlert,
    SalesRecord,
    MarketingSuggestion,
    ShiftUpdate,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::StockAlert => "stock_alert",
            NotificationKind::SalesRecord => "sales_record",
            NotificationKind::MarketingSuggestion => "marketing_suggestion",
            NotificationKind::ShiftUpdate => "shift_update",
        }
    }

    pub fn parse_kind(s: &str) -> Option<NotificationKind> {
        match s {
            "stock_alert" => Some(NotificationKind::StockAlert),
            "sales_record" => Some(NotificationKind::SalesRecord),
            "marketing_suggestion" => Some(NotificationKind::MarketingSuggestion),
            "shift_update" => Some(NotificationKind::ShiftUpdate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Unread,
    Read,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Unread => "unread",
            NotificationStatus::Read => "read",
        }
    }

    pub fn parse_status(s: &str) -> Option<NotificationStatus> {
        match s {
            "unread" => Some(NotificationStatus::Unread),
            "read" => Some(NotificationStatus::Read),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Employee,
    Manager,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Employee => "employee",
            Role::Manager => "manager",
            Role::Admin => "admin",
        }
    }

    pub fn parse_role(s: &str) -> Option<Role> {
        match s {
            "employee" => Some(Role::Employee),
            "manager" => Some(Role::Manager),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: i64,
    pub name: String,
    pub sku: String,
    pub description: Option<String>,
    pub quantity: f64,
    /// Unit the on-hand quantity is recorded in.
    pub unit: Unit,
    pub purchase_price: Option<f64>,
    pub purchase_unit: Option<Unit>,
    /// Lot size: how many purchase units one purchase buys.
    pub purchase_quantity: Option<f64>,
    pub low_stock_threshold: Option<f64>,
    pub high_stock_threshold: Option<f64>,
    pub expires_in_days: Option<i64>,
    pub date_received: Option<DateTime<Utc>>,
    pub last_restocked: Option<DateTime<Utc>>,
}

/// One ingredient of a dish. `item` is the resolved inventory record; it is
/// `None` when the referenced item was deleted or never linked, which the
/// calculator reports as missing cost data rather than an error.
#[derive(Debug, Clone)]
pub struct RecipeLine {
    pub name: String,
    pub unit: Unit,
    pub quantity_required: f64,
    pub item: Option<InventoryItem>,
}

#[derive(Debug, Clone)]
pub struct Dish {
    pub id: i64,
    pub name: String,
    pub price: f64,
    pub recipe: Vec<RecipeLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub target_id: Option<String>,
    pub status: NotificationStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shift {
    pub id: i64,
    pub staff_id: i64,
    /// Calendar day, `YYYY-MM-DD`.
    pub date: String,
    /// Wall-clock times, `HH:MM`.
    pub start_time: String,
    pub end_time: String,
    pub shift_type: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}
