//! Brewline Admin - order reconciliation core.
//!
//! The client-side state machinery behind the restaurant dashboard screens:
//! a polling loader that mirrors the backend's order list, a reconciliation
//! board that merges server truth with unacknowledged local changes, an
//! action dispatcher implementing the optimistic mutations (confirm, mark
//! paid, soft delete, restore, permanent delete, empty trash, edit), and
//! pure projections that derive what each screen displays. Rendering and the
//! backend itself live elsewhere; this crate talks to the latter over REST
//! and feeds the former through snapshots and events.

use std::path::Path;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod api;
pub mod auth;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod export;
pub mod orders;
pub mod reconcile;
pub mod stats;
pub mod storage;
pub mod sync;
pub mod view;

pub use api::{HttpOrderStore, RemoteOrderStore, RetryPolicy};
pub use auth::Session;
pub use config::Config;
pub use dispatch::{ActionDispatcher, ActionOutcome, AutoConfirm, ConfirmPrompt};
pub use error::{ActionError, ApiError, StorageError};
pub use events::{EventReceiver, EventSender, UiEvent};
pub use orders::{Order, OrderStatus, PaymentStatus};
pub use reconcile::{OrderBoard, SharedBoard};
pub use storage::OverlayCache;
pub use sync::{FetchVariant, PollSettings, SyncHandle};

/// Initialize structured logging (console, plus a rolling file when a log
/// directory is given). Call once at startup; safe to skip in tests.
pub fn init_logging(log_dir: Option<&Path>) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,brewline_admin=debug"));

    let console_layer = fmt::layer().with_target(true);
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if let Some(log_dir) = log_dir {
        std::fs::create_dir_all(log_dir).ok();
        let file_appender = tracing_appender::rolling::daily(log_dir, "brewline-admin");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let file_layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true);
        registry.with(file_layer).init();
        // Keep the guard alive for the lifetime of the process; dropping it
        // flushes and closes the appender.
        std::mem::forget(guard);
    } else {
        registry.init();
    }

    info!("Brewline Admin core v{}", env!("CARGO_PKG_VERSION"));
}
