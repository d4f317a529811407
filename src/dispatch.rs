//! User-triggered order mutations.
//!
//! Every action follows the same contract: check the precondition, apply the
//! optimistic local mutation, call the remote store with bounded retry, and
//! either keep the new state (success) or restore the exact pre-action state
//! (failure) while surfacing a non-blocking error event. An action never
//! leaves the board in an intermediate state and never lets a remote error
//! escape unhandled.

use chrono::Utc;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{info, warn};

use crate::api::{with_retry, RemoteOrderStore, RetryPolicy};
use crate::error::{ActionError, StorageError};
use crate::events::{emit, EventSender, UiEvent};
use crate::orders::{DeletedFrom, Order, OrderStatus, PaymentStatus};
use crate::reconcile::{OverlayKind, SharedBoard};
use crate::storage::OverlayCache;

/// Timestamp of the most recent completed user action, shared with the
/// polling loader for its suppression window.
pub type ActionClock = Arc<Mutex<Option<Instant>>>;

pub fn action_clock() -> ActionClock {
    Arc::new(Mutex::new(None))
}

/// What happened to a dispatched action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The mutation went through and the remote store acknowledged it.
    Applied,
    /// Precondition not met (already confirmed, already paid, not present);
    /// nothing was touched locally or remotely.
    NoOp,
    /// The user answered "no" at the confirmation gate.
    Declined,
}

/// Yes/no gate shown before destructive actions. Awaited before any
/// optimistic mutation is applied.
pub trait ConfirmPrompt: Send + Sync {
    fn confirm(&self, message: &str) -> impl Future<Output = bool> + Send;
}

/// Always answers yes. For headless callers and tests.
pub struct AutoConfirm;

impl ConfirmPrompt for AutoConfirm {
    async fn confirm(&self, _message: &str) -> bool {
        true
    }
}

pub struct ActionDispatcher<R, P> {
    store: Arc<R>,
    prompt: P,
    /// Active order list.
    board: SharedBoard,
    /// Trash screen list.
    trash: SharedBoard,
    cache: Arc<OverlayCache>,
    events: EventSender,
    retry: RetryPolicy,
    clock: ActionClock,
}

impl<R: RemoteOrderStore, P: ConfirmPrompt> ActionDispatcher<R, P> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<R>,
        prompt: P,
        board: SharedBoard,
        trash: SharedBoard,
        cache: Arc<OverlayCache>,
        events: EventSender,
        retry: RetryPolicy,
        clock: ActionClock,
    ) -> Self {
        Self {
            store,
            prompt,
            board,
            trash,
            cache,
            events,
            retry,
            clock,
        }
    }

    /// Confirm a pending order.
    pub async fn confirm(&self, order_id: &str) -> Result<ActionOutcome, ActionError> {
        let prev = {
            let mut board = lock(&self.board);
            match board.get(order_id) {
                Some(order) if order.status == OrderStatus::Pending => {}
                _ => return Ok(ActionOutcome::NoOp),
            }
            board.set_processing(order_id, true);
            board.set_status(order_id, OrderStatus::Confirmed)
        };
        let Some(prev) = prev else {
            lock(&self.board).set_processing(order_id, false);
            return Ok(ActionOutcome::NoOp);
        };

        let result = with_retry(&self.retry, || {
            self.store.update_status(order_id, OrderStatus::Confirmed)
        })
        .await;

        let mut board = lock(&self.board);
        board.set_processing(order_id, false);
        match result {
            Ok(()) => {
                drop(board);
                self.finish_ok("confirm", order_id);
                Ok(ActionOutcome::Applied)
            }
            Err(error) => {
                board.set_status(order_id, prev);
                drop(board);
                self.finish_err("confirm", Some(order_id), &error);
                Err(ActionError::rejected("confirm", order_id, error))
            }
        }
    }

    /// Mark an order as paid, promoting pending → confirmed.
    pub async fn mark_paid(&self, order_id: &str) -> Result<ActionOutcome, ActionError> {
        let prev = {
            let mut board = lock(&self.board);
            match board.get(order_id) {
                Some(order) if order.payment_status != PaymentStatus::Paid => {}
                _ => return Ok(ActionOutcome::NoOp),
            }
            board.set_processing(order_id, true);
            let prev = board.set_paid(order_id);
            board.record_change(order_id, OverlayKind::Paid, Utc::now());
            prev
        };
        let Some(prev) = prev else {
            lock(&self.board).set_processing(order_id, false);
            return Ok(ActionOutcome::NoOp);
        };
        self.persist_overlay(order_id, OverlayKind::Paid);

        let result = with_retry(&self.retry, || self.store.mark_paid(order_id)).await;

        let mut board = lock(&self.board);
        board.set_processing(order_id, false);
        match result {
            Ok(()) => {
                drop(board);
                self.finish_ok("mark paid", order_id);
                Ok(ActionOutcome::Applied)
            }
            Err(error) => {
                board.revert_paid(order_id, prev);
                board.clear_change(order_id, OverlayKind::Paid);
                drop(board);
                self.unpersist_overlay(order_id, OverlayKind::Paid);
                self.finish_err("mark paid", Some(order_id), &error);
                Err(ActionError::rejected("mark paid", order_id, error))
            }
        }
    }

    /// Soft-delete an active order into the trash.
    pub async fn soft_delete(
        &self,
        order_id: &str,
        deleted_from: DeletedFrom,
    ) -> Result<ActionOutcome, ActionError> {
        let suffix = {
            let board = lock(&self.board);
            match board.get(order_id) {
                Some(order) if order.status != OrderStatus::Deleted => {
                    order.id_suffix().to_string()
                }
                _ => return Ok(ActionOutcome::NoOp),
            }
        };

        let message = format!("Delete order #{suffix}? It will be moved to the trash.");
        if !self.prompt.confirm(&message).await {
            return Ok(ActionOutcome::Declined);
        }

        let removed = {
            let mut board = lock(&self.board);
            board.set_processing(order_id, true);
            let removed = board.remove_order(order_id);
            if removed.is_some() {
                board.record_change(order_id, OverlayKind::Deleted, Utc::now());
            }
            removed
        };
        let Some((idx, order)) = removed else {
            lock(&self.board).set_processing(order_id, false);
            return Ok(ActionOutcome::NoOp);
        };
        self.persist_overlay(order_id, OverlayKind::Deleted);

        let result = with_retry(&self.retry, || {
            self.store.soft_delete(order_id, deleted_from)
        })
        .await;

        let mut board = lock(&self.board);
        board.set_processing(order_id, false);
        match result {
            Ok(()) => {
                drop(board);
                self.touch_clock();
                info!(order_id, "order moved to trash");
                emit(
                    &self.events,
                    UiEvent::OrderDeleted {
                        order_id: order_id.to_string(),
                    },
                );
                Ok(ActionOutcome::Applied)
            }
            Err(error) => {
                board.insert_order_at(idx, order);
                board.clear_change(order_id, OverlayKind::Deleted);
                drop(board);
                self.unpersist_overlay(order_id, OverlayKind::Deleted);
                self.finish_err("soft delete", Some(order_id), &error);
                Err(ActionError::rejected("soft delete", order_id, error))
            }
        }
    }

    /// Restore a trashed order.
    pub async fn restore(&self, order_id: &str) -> Result<ActionOutcome, ActionError> {
        let removed = {
            let mut trash = lock(&self.trash);
            trash.set_processing(order_id, true);
            trash.remove_order(order_id)
        };
        let Some((idx, order)) = removed else {
            lock(&self.trash).set_processing(order_id, false);
            return Ok(ActionOutcome::NoOp);
        };

        // The user explicitly un-deleted it; any pending delete override is
        // reconciled by that intent.
        lock(&self.board).clear_change(order_id, OverlayKind::Deleted);
        self.unpersist_overlay(order_id, OverlayKind::Deleted);

        let result = with_retry(&self.retry, || self.store.restore(order_id)).await;

        let mut trash = lock(&self.trash);
        trash.set_processing(order_id, false);
        match result {
            Ok(()) => {
                drop(trash);
                self.touch_clock();
                info!(order_id, "order restored from trash");
                emit(
                    &self.events,
                    UiEvent::OrderRestored {
                        order_id: order_id.to_string(),
                    },
                );
                Ok(ActionOutcome::Applied)
            }
            Err(error) => {
                trash.insert_order_at(idx, order);
                drop(trash);
                self.finish_err("restore", Some(order_id), &error);
                Err(ActionError::rejected("restore", order_id, error))
            }
        }
    }

    /// Restore several trashed orders in one confirmed sweep. Returns the
    /// number restored; a declined prompt restores none.
    pub async fn restore_many(&self, order_ids: &[String]) -> Result<usize, ActionError> {
        if order_ids.is_empty() {
            return Ok(0);
        }
        let message = format!("Restore {} order(s) from the trash?", order_ids.len());
        if !self.prompt.confirm(&message).await {
            return Ok(0);
        }

        let mut restored = 0;
        for order_id in order_ids {
            if self.restore(order_id).await? == ActionOutcome::Applied {
                restored += 1;
            }
        }
        Ok(restored)
    }

    /// Permanently delete one trashed order.
    pub async fn permanently_delete(&self, order_id: &str) -> Result<ActionOutcome, ActionError> {
        let suffix = match lock(&self.trash).get(order_id) {
            Some(order) => order.id_suffix().to_string(),
            None => return Ok(ActionOutcome::NoOp),
        };

        let message = format!("Permanently delete order #{suffix}? This cannot be undone.");
        if !self.prompt.confirm(&message).await {
            return Ok(ActionOutcome::Declined);
        }

        self.permanently_delete_unprompted(order_id).await
    }

    /// Permanently delete a selection, one confirmation for the lot.
    pub async fn permanently_delete_many(
        &self,
        order_ids: &[String],
    ) -> Result<usize, ActionError> {
        if order_ids.is_empty() {
            return Ok(0);
        }
        let message = format!(
            "Permanently delete {} order(s)? This cannot be undone.",
            order_ids.len()
        );
        if !self.prompt.confirm(&message).await {
            return Ok(0);
        }

        let mut deleted = 0;
        for order_id in order_ids {
            if self.permanently_delete_unprompted(order_id).await? == ActionOutcome::Applied {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn permanently_delete_unprompted(
        &self,
        order_id: &str,
    ) -> Result<ActionOutcome, ActionError> {
        let removed = {
            let mut trash = lock(&self.trash);
            trash.set_processing(order_id, true);
            trash.remove_order(order_id)
        };
        let Some((idx, order)) = removed else {
            lock(&self.trash).set_processing(order_id, false);
            return Ok(ActionOutcome::NoOp);
        };

        // Gone from every list, and no overlay left to resurrect it.
        let removed_from_board = {
            let mut board = lock(&self.board);
            board.clear_change(order_id, OverlayKind::Deleted);
            board.clear_change(order_id, OverlayKind::Paid);
            board.remove_order(order_id)
        };
        self.unpersist_overlay(order_id, OverlayKind::Deleted);
        self.unpersist_overlay(order_id, OverlayKind::Paid);

        let result = with_retry(&self.retry, || self.store.permanently_delete(order_id)).await;

        let mut trash = lock(&self.trash);
        trash.set_processing(order_id, false);
        match result {
            Ok(()) => {
                drop(trash);
                self.touch_clock();
                info!(order_id, "order permanently deleted");
                emit(
                    &self.events,
                    UiEvent::OrderDeleted {
                        order_id: order_id.to_string(),
                    },
                );
                Ok(ActionOutcome::Applied)
            }
            Err(error) => {
                trash.insert_order_at(idx, order);
                drop(trash);
                if let Some((board_idx, board_order)) = removed_from_board {
                    lock(&self.board).insert_order_at(board_idx, board_order);
                }
                self.finish_err("permanent delete", Some(order_id), &error);
                Err(ActionError::rejected("permanent delete", order_id, error))
            }
        }
    }

    /// Hard-delete everything in the trash.
    pub async fn empty_trash(&self) -> Result<ActionOutcome, ActionError> {
        let count = lock(&self.trash).len();
        if count == 0 {
            return Ok(ActionOutcome::NoOp);
        }

        let message =
            format!("Permanently delete all {count} trashed order(s)? This cannot be undone.");
        if !self.prompt.confirm(&message).await {
            return Ok(ActionOutcome::Declined);
        }

        let drained = lock(&self.trash).take_all();

        let result = with_retry(&self.retry, || self.store.empty_trash()).await;

        match result {
            Ok(()) => {
                self.touch_clock();
                info!(count, "trash emptied");
                emit(&self.events, UiEvent::TrashEmptied { count });
                Ok(ActionOutcome::Applied)
            }
            Err(error) => {
                // The bulk call may have partially applied; the server knows
                // best what is left. Fall back to the drained list only if
                // that reload fails too.
                match self.store.fetch_deleted_orders().await {
                    Ok(fresh) => lock(&self.trash).replace_all(fresh),
                    Err(reload_err) => {
                        warn!(%reload_err, "trash reload after failed empty-trash");
                        lock(&self.trash).replace_all(drained);
                    }
                }
                self.finish_err("empty trash", None, &error);
                Err(ActionError::RejectedBulk {
                    action: "empty trash",
                    source: error,
                })
            }
        }
    }

    /// Commit an edited order. No optimistic mutation: the local list only
    /// changes after the server accepts the update, so a failure keeps the
    /// edit form open with nothing to roll back.
    pub async fn save_edit(&self, order: Order) -> Result<ActionOutcome, ActionError> {
        let name_ok = order
            .customer_name()
            .map(|n| !n.trim().is_empty())
            .unwrap_or(false);
        if !name_ok {
            return Err(ActionError::Invalid {
                reason: "customer name is required".into(),
            });
        }
        let phone_ok = order
            .customer_phone()
            .map(|p| !p.trim().is_empty())
            .unwrap_or(false);
        if !phone_ok {
            return Err(ActionError::Invalid {
                reason: "customer phone number is required".into(),
            });
        }

        let order_id = order.id.clone();
        lock(&self.board).set_processing(&order_id, true);

        let result = with_retry(&self.retry, || self.store.update_order(&order_id, &order)).await;

        let mut board = lock(&self.board);
        board.set_processing(&order_id, false);
        match result {
            Ok(()) => {
                board.upsert_order(order);
                drop(board);
                self.finish_ok("edit", &order_id);
                Ok(ActionOutcome::Applied)
            }
            Err(error) => {
                drop(board);
                self.finish_err("edit", Some(&order_id), &error);
                Err(ActionError::rejected("edit", &order_id, error))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Shared plumbing
    // -----------------------------------------------------------------------

    fn touch_clock(&self) {
        *self.clock.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
    }

    fn finish_ok(&self, action: &'static str, order_id: &str) {
        self.touch_clock();
        info!(action, order_id, "action applied");
        emit(
            &self.events,
            UiEvent::OrderUpdated {
                order_id: order_id.to_string(),
            },
        );
    }

    fn finish_err(&self, action: &'static str, order_id: Option<&str>, error: &crate::error::ApiError) {
        warn!(action, ?order_id, %error, "action rolled back");
        emit(
            &self.events,
            UiEvent::ActionFailed {
                action,
                order_id: order_id.map(str::to_string),
                message: error.to_string(),
            },
        );
    }

    /// The cache is a mirror; a write failure must not fail the action.
    fn persist_overlay(&self, order_id: &str, kind: OverlayKind) {
        if let Err(error) = self.cache.record_overlay(&crate::reconcile::LocalChange {
            order_id: order_id.to_string(),
            kind,
            applied_at: Utc::now(),
        }) {
            log_cache_error(order_id, &error);
        }
    }

    fn unpersist_overlay(&self, order_id: &str, kind: OverlayKind) {
        if let Err(error) = self.cache.clear_overlay(order_id, kind) {
            log_cache_error(order_id, &error);
        }
    }
}

fn log_cache_error(order_id: &str, error: &StorageError) {
    warn!(order_id, %error, "overlay cache write failed");
}

fn lock(board: &SharedBoard) -> std::sync::MutexGuard<'_, crate::reconcile::OrderBoard> {
    board.lock().unwrap_or_else(|e| e.into_inner())
}
