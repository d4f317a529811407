//! Notification events surfaced to the rendering layer.
//!
//! Sends are fire-and-forget: when the screen that owned the receiver has
//! been unmounted, the event is silently dropped, which is exactly the
//! "discard UI feedback for an unmounted component" behavior the dispatcher
//! promises. Nothing here ever blocks.

use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    /// A poll or manual refresh merged a snapshot.
    OrdersRefreshed { count: usize },
    /// A background refresh failed; the displayed list was left untouched.
    RefreshFailed { message: String },
    OrderUpdated { order_id: String },
    OrderDeleted { order_id: String },
    OrderRestored { order_id: String },
    TrashEmptied { count: usize },
    /// An action failed after rollback. Non-blocking notification material.
    ActionFailed {
        action: &'static str,
        order_id: Option<String>,
        message: String,
    },
}

pub type EventSender = mpsc::UnboundedSender<UiEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<UiEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Send ignoring a closed channel.
pub(crate) fn emit(sender: &EventSender, event: UiEvent) {
    let _ = sender.send(event);
}
