//! Background polling loader.
//!
//! Keeps the board approximately fresh without user action: a fixed-interval
//! loop fetches the selected order set and merges it through the
//! reconciliation rules. A tick is skipped while a user action just
//! completed (the suppression window) so an optimistic update is not visibly
//! reverted before the backend has persisted it. A failed fetch is logged
//! and retried on the next tick; it never clears the displayed list and
//! never ends the loop.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::RemoteOrderStore;
use crate::config::Config;
use crate::dispatch::ActionClock;
use crate::events::{emit, EventSender, UiEvent};
use crate::orders::Order;
use crate::reconcile::SharedBoard;
use crate::view::{filter_by_date, DateGrouping};

/// Which order set a screen polls.
#[derive(Debug, Clone)]
pub enum FetchVariant {
    /// Live orders screen: active orders, card deletions excluded.
    Active { exclude_card_deleted: bool },
    /// Dashboard: the admin superset (soft-deleted included), restricted to
    /// the selected date window client-side.
    Admin {
        reference: DateTime<Utc>,
        grouping: DateGrouping,
    },
}

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub interval: Duration,
    pub suppression_window: Duration,
    pub variant: FetchVariant,
}

impl PollSettings {
    pub fn from_config(config: &Config, variant: FetchVariant) -> Self {
        Self {
            interval: config.poll_interval,
            suppression_window: config.suppression_window,
            variant,
        }
    }
}

/// Handle to a running polling loop. Dropping it does not stop the loop;
/// call [`SyncHandle::stop`] (or [`SyncHandle::shutdown`]) when the screen
/// goes away.
pub struct SyncHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SyncHandle {
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop and wait for the loop to wind down.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Fetch once and merge into the board. Used by the polling loop and by
/// view-focus / pull-to-refresh triggers. Returns whether the fetch
/// succeeded; on failure the board is left untouched.
pub async fn refresh_now<R: RemoteOrderStore>(
    store: &R,
    board: &SharedBoard,
    events: &EventSender,
    variant: &FetchVariant,
) -> bool {
    let fetched = match variant {
        FetchVariant::Active {
            exclude_card_deleted,
        } => store.fetch_orders(*exclude_card_deleted).await,
        FetchVariant::Admin {
            reference,
            grouping,
        } => store.fetch_admin_orders().await.map(|orders| {
            filter_by_date(&orders, *reference, *grouping)
                .into_iter()
                .cloned()
                .collect::<Vec<Order>>()
        }),
    };

    match fetched {
        Ok(orders) => {
            let count = orders.len();
            board
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .merge_snapshot(orders, Utc::now());
            emit(events, UiEvent::OrdersRefreshed { count });
            true
        }
        Err(error) => {
            warn!(%error, "order refresh failed; keeping current list");
            emit(
                events,
                UiEvent::RefreshFailed {
                    message: error.to_string(),
                },
            );
            false
        }
    }
}

/// Replace the trash board from the server. The trash screen loads on open
/// and after bulk actions rather than polling.
pub async fn refresh_trash<R: RemoteOrderStore>(
    store: &R,
    trash: &SharedBoard,
    events: &EventSender,
) -> bool {
    match store.fetch_deleted_orders().await {
        Ok(orders) => {
            let count = orders.len();
            trash
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .replace_all(orders);
            emit(events, UiEvent::OrdersRefreshed { count });
            true
        }
        Err(error) => {
            warn!(%error, "trash refresh failed; keeping current list");
            emit(
                events,
                UiEvent::RefreshFailed {
                    message: error.to_string(),
                },
            );
            false
        }
    }
}

/// The polling loop body. Runs until the token is cancelled.
pub async fn run_polling<R: RemoteOrderStore>(
    store: Arc<R>,
    board: SharedBoard,
    events: EventSender,
    clock: ActionClock,
    settings: PollSettings,
    cancel: CancellationToken,
) {
    info!(interval_ms = settings.interval.as_millis() as u64, "polling loop started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("polling loop stopped");
                return;
            }
            _ = tokio::time::sleep(settings.interval) => {}
        }

        let suppressed = clock
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .map(|t| t.elapsed() < settings.suppression_window)
            .unwrap_or(false);
        if suppressed {
            debug!("skipping poll inside action suppression window");
            continue;
        }

        refresh_now(store.as_ref(), &board, &events, &settings.variant).await;
    }
}

/// Spawn the polling loop for a screen and hand back its stop handle.
pub fn start_polling<R: RemoteOrderStore + 'static>(
    store: Arc<R>,
    board: SharedBoard,
    events: EventSender,
    clock: ActionClock,
    settings: PollSettings,
) -> SyncHandle {
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run_polling(
        store,
        board,
        events,
        clock,
        settings,
        cancel.clone(),
    ));
    SyncHandle { cancel, task }
}
