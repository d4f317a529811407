//! Order data model as exchanged with the admin dashboard.
//!
//! Wire format is camelCase JSON with MongoDB-style `_id` keys. Decoding is
//! deliberately lenient at the list level: a malformed row is logged and
//! skipped rather than failing the whole fetch, so one bad payload can never
//! blank out the screen.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Orders older than this are excluded from the live view.
pub const LIVE_WINDOW_HOURS: i64 = 24;

/// Lifecycle status as stored on the backend. `paid` is not a status; it is
/// the payment overlay carried by [`PaymentStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Deleted,
}

/// Where a soft delete originated. Admin deletions are hidden everywhere
/// except the trash view; order-card deletions are recoverable and shown
/// when a view explicitly asks for deleted items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeletedFrom {
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "orderCard")]
    OrderCard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeVariant {
    Half,
    Full,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<SizeVariant>,
    pub quantity: u32,
    #[serde(default)]
    pub price: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modifiers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_instructions: Option<String>,
}

impl OrderItem {
    pub fn line_total(&self) -> f64 {
        self.price * f64::from(self.quantity)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// A mirrored backend order. The client never originates one of these; it
/// only observes and mutates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_from: Option<DeletedFrom>,
    #[serde(default)]
    pub payment_status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    /// Backend-computed total. Display code goes through
    /// [`Order::display_total`] instead of reading this directly.
    #[serde(default)]
    pub total_amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtotal: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_fee: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_amount: Option<f64>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<Customer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_instructions: Option<String>,
}

impl Order {
    /// Total shown to the user: recomputed from line items when items are
    /// present, otherwise the backend-provided figure. The backend field is
    /// sent back unchanged on edits.
    pub fn display_total(&self) -> f64 {
        if self.items.is_empty() {
            self.total_amount
        } else {
            self.items.iter().map(OrderItem::line_total).sum()
        }
    }

    /// Whether the order falls inside the rolling live window.
    pub fn is_within_live_window(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.created_at) <= Duration::hours(LIVE_WINDOW_HOURS)
    }

    /// Short id used on cards and in search (`#A1B2C3` style).
    pub fn id_suffix(&self) -> &str {
        let n = self.id.len();
        &self.id[n.saturating_sub(6)..]
    }

    pub fn customer_name(&self) -> Option<&str> {
        self.customer.as_ref().and_then(|c| c.name.as_deref())
    }

    pub fn customer_phone(&self) -> Option<&str> {
        self.customer.as_ref().and_then(|c| c.phone.as_deref())
    }
}

/// Decode a fetched order list, skipping rows that fail to decode.
///
/// The dashboard occasionally serves rows written by older app versions
/// (unknown statuses, missing timestamps). Those are dropped here with a
/// warning; the remainder of the snapshot stays usable.
pub fn decode_orders(value: Value) -> Vec<Order> {
    let rows = match value {
        Value::Array(rows) => rows,
        // Some deployments wrap the list: { "orders": [...] }
        Value::Object(mut map) => match map.remove("orders") {
            Some(Value::Array(rows)) => rows,
            _ => {
                warn!("order list response was not an array");
                return Vec::new();
            }
        },
        _ => {
            warn!("order list response was not an array");
            return Vec::new();
        }
    };

    let mut orders = Vec::with_capacity(rows.len());
    for row in rows {
        let preview = row
            .get("_id")
            .and_then(Value::as_str)
            .unwrap_or("<no id>")
            .to_string();
        match serde_json::from_value::<Order>(row) {
            Ok(order) => orders.push(order),
            Err(error) => {
                warn!(order_id = %preview, %error, "skipping undecodable order row");
            }
        }
    }
    orders
}

/// Canonical fixture used by tests across the crate.
#[cfg(test)]
pub(crate) fn sample_order(id: &str) -> Order {
    Order {
        id: id.to_string(),
        status: OrderStatus::Pending,
        deleted_from: None,
        payment_status: PaymentStatus::Pending,
        payment_method: Some("cash".into()),
        items: vec![OrderItem {
            name: "Latte".into(),
            size: Some(SizeVariant::Full),
            quantity: 2,
            price: 250.0,
            modifiers: vec!["oat milk".into()],
            special_instructions: None,
        }],
        total_amount: 500.0,
        subtotal: Some(500.0),
        delivery_fee: None,
        tax_amount: None,
        created_at: Utc::now(),
        deleted_at: None,
        customer: Some(Customer {
            name: Some("Asha".into()),
            phone: Some("555-1234".into()),
            address: None,
        }),
        order_type: Some("dine-in".into()),
        table_number: Some("4".into()),
        special_instructions: None,
    }
}
