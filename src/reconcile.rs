//! Local reconciliation state.
//!
//! The [`OrderBoard`] is the single source of truth for what the user sees:
//! the last merged order list plus the set of locally applied changes the
//! server has not yet acknowledged. The polling loader and the action
//! dispatcher both mutate it, and every race between them resolves through
//! the deterministic merge rules in [`OrderBoard::merge_snapshot`] rather
//! than through locking order.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::orders::{Order, OrderStatus, PaymentStatus};

/// How long a local override outlives server disagreement. If the backend
/// has not reported the change after this long, we stop suppressing its
/// version: either the write was lost or another admin reverted it.
pub const OVERLAY_GRACE_SECS: i64 = 90;

/// The two kinds of unacknowledged local change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverlayKind {
    Deleted,
    Paid,
}

impl OverlayKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverlayKind::Deleted => "deleted",
            OverlayKind::Paid => "paid",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "deleted" => Some(OverlayKind::Deleted),
            "paid" => Some(OverlayKind::Paid),
            _ => None,
        }
    }
}

/// One unacknowledged local change. Exists only client-side.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalChange {
    pub order_id: String,
    pub kind: OverlayKind,
    pub applied_at: DateTime<Utc>,
}

/// Shared handle: the loader task and the dispatcher hold clones of this.
/// The mutex is never held across an await point.
pub type SharedBoard = Arc<Mutex<OrderBoard>>;

pub fn shared_board() -> SharedBoard {
    Arc::new(Mutex::new(OrderBoard::default()))
}

#[derive(Debug, Default)]
pub struct OrderBoard {
    orders: Vec<Order>,
    changes: Vec<LocalChange>,
    processing: HashSet<String>,
}

impl OrderBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hydrate the change-set from the persisted overlay cache on startup.
    pub fn with_overlays(changes: Vec<LocalChange>) -> Self {
        Self {
            changes,
            ..Self::default()
        }
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn snapshot(&self) -> Vec<Order> {
        self.orders.clone()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn get(&self, order_id: &str) -> Option<&Order> {
        self.orders.iter().find(|o| o.id == order_id)
    }

    // -----------------------------------------------------------------------
    // Change-set
    // -----------------------------------------------------------------------

    /// Record a new user-initiated change. This is the only way an ID enters
    /// the change-set; merges only ever remove entries.
    pub fn record_change(&mut self, order_id: &str, kind: OverlayKind, now: DateTime<Utc>) {
        if let Some(existing) = self
            .changes
            .iter_mut()
            .find(|c| c.order_id == order_id && c.kind == kind)
        {
            existing.applied_at = now;
            return;
        }
        self.changes.push(LocalChange {
            order_id: order_id.to_string(),
            kind,
            applied_at: now,
        });
    }

    pub fn clear_change(&mut self, order_id: &str, kind: OverlayKind) {
        self.changes
            .retain(|c| !(c.order_id == order_id && c.kind == kind));
    }

    pub fn has_change(&self, order_id: &str, kind: OverlayKind) -> bool {
        self.changes
            .iter()
            .any(|c| c.order_id == order_id && c.kind == kind)
    }

    pub fn has_any_change(&self, order_id: &str) -> bool {
        self.changes.iter().any(|c| c.order_id == order_id)
    }

    pub fn changes(&self) -> &[LocalChange] {
        &self.changes
    }

    fn expire_changes(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Duration::seconds(OVERLAY_GRACE_SECS);
        let before = self.changes.len();
        self.changes.retain(|c| c.applied_at >= cutoff);
        let expired = before - self.changes.len();
        if expired > 0 {
            debug!(expired, "expired overlays past grace period");
        }
    }

    // -----------------------------------------------------------------------
    // Merge
    // -----------------------------------------------------------------------

    /// Merge a fresh server snapshot into the board.
    ///
    /// Rules, in order, for each server row:
    /// 1. a snapshot that confirms a recorded change retires that change
    ///    (removal is monotonic: the entry only comes back via a new user
    ///    action);
    /// 2. a row contradicting a recorded `Deleted` change is suppressed, and
    ///    a row contradicting a recorded `Paid` change has the paid flag
    ///    (plus its pending→confirmed promotion) re-applied;
    /// 3. otherwise the server version is taken as-is, so edits from other
    ///    admin sessions propagate.
    /// A previously displayed order missing from the snapshot is retained
    /// only while its ID is in the change-set. The merged result never
    /// contains the same ID twice.
    pub fn merge_snapshot(&mut self, server: Vec<Order>, now: DateTime<Utc>) {
        self.expire_changes(now);

        let mut merged: Vec<Order> = Vec::with_capacity(server.len());
        let mut seen: HashSet<String> = HashSet::with_capacity(server.len());

        for mut order in server {
            if !seen.insert(order.id.clone()) {
                debug!(order_id = %order.id, "dropping duplicate id in server snapshot");
                continue;
            }

            // Server confirms the recorded change: the override has done its
            // job, retire it.
            if order.status == OrderStatus::Deleted {
                self.clear_change(&order.id, OverlayKind::Deleted);
            }
            if order.payment_status == PaymentStatus::Paid {
                self.clear_change(&order.id, OverlayKind::Paid);
            }

            // Local intent wins until the server catches up.
            if self.has_change(&order.id, OverlayKind::Deleted)
                && order.status != OrderStatus::Deleted
            {
                debug!(order_id = %order.id, "suppressing server row pending local delete");
                continue;
            }
            if self.has_change(&order.id, OverlayKind::Paid)
                && order.payment_status != PaymentStatus::Paid
            {
                order.payment_status = PaymentStatus::Paid;
                if order.status == OrderStatus::Pending {
                    order.status = OrderStatus::Confirmed;
                }
            }

            merged.push(order);
        }

        // Orders the snapshot no longer carries: keep them only while a
        // local change still references them.
        for prev in &self.orders {
            if seen.contains(&prev.id) {
                continue;
            }
            if self.changes.iter().any(|c| c.order_id == prev.id) {
                seen.insert(prev.id.clone());
                merged.push(prev.clone());
            }
        }

        self.orders = merged;
    }

    // -----------------------------------------------------------------------
    // Optimistic mutation primitives (used by the dispatcher)
    // -----------------------------------------------------------------------

    /// Replace the whole list (trash screen load, initial fetch).
    pub fn replace_all(&mut self, orders: Vec<Order>) {
        self.orders = orders;
    }

    /// Drain every order (optimistic empty-trash). Returns the drained list
    /// so a failed remote call can put it back.
    pub fn take_all(&mut self) -> Vec<Order> {
        std::mem::take(&mut self.orders)
    }

    /// Remove one order, returning it with its position for exact rollback.
    pub fn remove_order(&mut self, order_id: &str) -> Option<(usize, Order)> {
        let idx = self.orders.iter().position(|o| o.id == order_id)?;
        Some((idx, self.orders.remove(idx)))
    }

    /// Re-insert an order at its original position (clamped).
    pub fn insert_order_at(&mut self, idx: usize, order: Order) {
        let idx = idx.min(self.orders.len());
        self.orders.insert(idx, order);
    }

    /// Insert-or-replace by ID, preserving position on replace.
    pub fn upsert_order(&mut self, order: Order) {
        match self.orders.iter_mut().find(|o| o.id == order.id) {
            Some(slot) => *slot = order,
            None => self.orders.push(order),
        }
    }

    /// Set an order's status, returning the previous status for rollback.
    pub fn set_status(&mut self, order_id: &str, status: OrderStatus) -> Option<OrderStatus> {
        let order = self.orders.iter_mut().find(|o| o.id == order_id)?;
        let prev = order.status;
        order.status = status;
        Some(prev)
    }

    /// Flip the paid flag on, promoting pending→confirmed. Returns the
    /// previous (payment_status, status) pair for rollback.
    pub fn set_paid(&mut self, order_id: &str) -> Option<(PaymentStatus, OrderStatus)> {
        let order = self.orders.iter_mut().find(|o| o.id == order_id)?;
        let prev = (order.payment_status, order.status);
        order.payment_status = PaymentStatus::Paid;
        if order.status == OrderStatus::Pending {
            order.status = OrderStatus::Confirmed;
        }
        Some(prev)
    }

    /// Undo [`OrderBoard::set_paid`].
    pub fn revert_paid(&mut self, order_id: &str, prev: (PaymentStatus, OrderStatus)) {
        if let Some(order) = self.orders.iter_mut().find(|o| o.id == order_id) {
            order.payment_status = prev.0;
            order.status = prev.1;
        }
    }

    // -----------------------------------------------------------------------
    // Per-order processing flags
    // -----------------------------------------------------------------------

    /// Mark an order as having an in-flight mutation. Other orders stay
    /// interactive; this is per-order feedback, not a global lock.
    pub fn set_processing(&mut self, order_id: &str, processing: bool) {
        if processing {
            self.processing.insert(order_id.to_string());
        } else {
            self.processing.remove(order_id);
        }
    }

    pub fn is_processing(&self, order_id: &str) -> bool {
        self.processing.contains(order_id)
    }
}
