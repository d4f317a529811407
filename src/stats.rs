//! Dashboard aggregation over a date-filtered order set.
//!
//! Computed client-side from the same list the dashboard displays, so the
//! tiles always agree with the cards below them. Deleted orders count toward
//! `loss` only when the deletion came from the admin workflow; card
//! deletions are recoverable and not treated as lost revenue.

use chrono::Timelike;
use std::collections::BTreeMap;

use crate::orders::{DeletedFrom, Order, OrderStatus, SizeVariant};

/// How many entries the popular-items list keeps.
const POPULAR_ITEM_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct PopularItem {
    pub name: String,
    pub size: Option<SizeVariant>,
    pub quantity: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardStats {
    pub total: usize,
    pub confirmed: usize,
    pub pending: usize,
    pub deleted: usize,
    /// Revenue across confirmed orders.
    pub earnings: f64,
    /// Revenue lost to admin-deleted orders.
    pub loss: f64,
    pub popular_items: Vec<PopularItem>,
    /// Order count per order type ("dine-in", "delivery", ...).
    pub order_types: BTreeMap<String, usize>,
    /// Order count per hour of day (0..24) for the trend chart.
    pub hourly: [usize; 24],
}

/// Aggregate the date-filtered list, deleted orders included.
pub fn compute_stats(orders: &[Order]) -> DashboardStats {
    let mut stats = DashboardStats {
        total: orders.len(),
        ..DashboardStats::default()
    };

    let mut item_counts: BTreeMap<(String, Option<SizeVariant>), u32> = BTreeMap::new();

    for order in orders {
        match order.status {
            OrderStatus::Confirmed => {
                stats.confirmed += 1;
                stats.earnings += order.display_total();
            }
            OrderStatus::Pending => stats.pending += 1,
            OrderStatus::Deleted => {
                if order.deleted_from == Some(DeletedFrom::Admin) {
                    stats.deleted += 1;
                    stats.loss += order.display_total();
                }
            }
        }

        for item in &order.items {
            *item_counts
                .entry((item.name.clone(), item.size))
                .or_default() += item.quantity;
        }

        if let Some(order_type) = &order.order_type {
            *stats.order_types.entry(order_type.clone()).or_default() += 1;
        }

        stats.hourly[order.created_at.hour() as usize] += 1;
    }

    let mut ranked: Vec<PopularItem> = item_counts
        .into_iter()
        .map(|((name, size), quantity)| PopularItem {
            name,
            size,
            quantity,
        })
        .collect();
    // BTreeMap iteration gives a stable name ordering for equal counts.
    ranked.sort_by(|a, b| b.quantity.cmp(&a.quantity));
    ranked.truncate(POPULAR_ITEM_LIMIT);
    stats.popular_items = ranked;

    stats
}
