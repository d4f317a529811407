//! Local SQLite overlay cache.
//!
//! Uses rusqlite with WAL mode. Holds the two overlay sets (paid / recently
//! soft-deleted order IDs) so an app reload does not forget unacknowledged
//! local changes, plus a small category/key/value settings table used for
//! the session token. This cache is a convenience mirror, never a system of
//! record: the dashboard stays authoritative.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

use crate::error::StorageError;
use crate::reconcile::{LocalChange, OverlayKind};

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Handle to the overlay cache, shared between the dispatcher and session.
pub struct OverlayCache {
    conn: Mutex<Connection>,
    #[allow(dead_code)]
    path: PathBuf,
}

impl OverlayCache {
    /// Open (or create) the cache at `path`.
    ///
    /// On corruption or open failure, deletes the file and retries once;
    /// losing the overlay sets is acceptable, losing the screen is not.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)
                    .map_err(|e| StorageError::Setup(format!("create cache dir: {e}")))?;
            }
        }

        let conn = match open_and_configure(path) {
            Ok(c) => c,
            Err(first_err) => {
                warn!("cache open failed ({first_err}), deleting and retrying once");
                let _ = fs::remove_file(path);
                let _ = fs::remove_file(path.with_extension("db-wal"));
                let _ = fs::remove_file(path.with_extension("db-shm"));
                open_and_configure(path)?
            }
        };

        run_migrations(&conn)?;
        info!(path = %path.display(), "overlay cache ready (schema v{CURRENT_SCHEMA_VERSION})");

        Ok(Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
        })
    }

    /// In-memory cache for tests and the unauthenticated dev/mock mode.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        })
    }

    // -----------------------------------------------------------------------
    // Overlay set
    // -----------------------------------------------------------------------

    pub fn record_overlay(&self, change: &LocalChange) -> Result<(), StorageError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO local_overlays (kind, order_id, applied_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(kind, order_id) DO UPDATE SET applied_at = excluded.applied_at",
            params![
                change.kind.as_str(),
                change.order_id,
                change.applied_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn clear_overlay(&self, order_id: &str, kind: OverlayKind) -> Result<(), StorageError> {
        let conn = self.lock();
        conn.execute(
            "DELETE FROM local_overlays WHERE kind = ?1 AND order_id = ?2",
            params![kind.as_str(), order_id],
        )?;
        Ok(())
    }

    /// Load every persisted overlay, dropping rows whose kind or timestamp
    /// no longer parses (written by a future or ancient version).
    pub fn load_overlays(&self) -> Result<Vec<LocalChange>, StorageError> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT kind, order_id, applied_at FROM local_overlays")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut overlays = Vec::new();
        for row in rows {
            let (kind, order_id, applied_at) = row?;
            let Some(kind) = OverlayKind::parse(&kind) else {
                warn!(%kind, "dropping overlay row with unknown kind");
                continue;
            };
            let Ok(applied_at) = DateTime::parse_from_rfc3339(&applied_at) else {
                warn!(%order_id, "dropping overlay row with bad timestamp");
                continue;
            };
            overlays.push(LocalChange {
                order_id,
                kind,
                applied_at: applied_at.with_timezone(&Utc),
            });
        }
        Ok(overlays)
    }

    /// Remove overlays applied before `cutoff`. Returns how many went.
    pub fn prune_overlays_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        let conn = self.lock();
        let pruned = conn.execute(
            "DELETE FROM local_overlays WHERE applied_at < ?1",
            params![cutoff.to_rfc3339()],
        )?;
        Ok(pruned)
    }

    // -----------------------------------------------------------------------
    // Settings
    // -----------------------------------------------------------------------

    pub fn setting_get(&self, category: &str, key: &str) -> Option<String> {
        let conn = self.lock();
        conn.query_row(
            "SELECT setting_value FROM local_settings
             WHERE setting_category = ?1 AND setting_key = ?2",
            params![category, key],
            |row| row.get(0),
        )
        .optional()
        .unwrap_or_else(|e| {
            warn!(category, key, error = %e, "settings read failed");
            None
        })
    }

    pub fn setting_set(&self, category: &str, key: &str, value: &str) -> Result<(), StorageError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO local_settings (setting_category, setting_key, setting_value, updated_at)
             VALUES (?1, ?2, ?3, datetime('now'))
             ON CONFLICT(setting_category, setting_key) DO UPDATE SET
                setting_value = excluded.setting_value, updated_at = excluded.updated_at",
            params![category, key, value],
        )?;
        Ok(())
    }

    pub fn setting_delete(&self, category: &str, key: &str) -> Result<(), StorageError> {
        let conn = self.lock();
        conn.execute(
            "DELETE FROM local_settings WHERE setting_category = ?1 AND setting_key = ?2",
            params![category, key],
        )?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned lock means another thread panicked mid-statement; the
        // connection itself is still usable for our single-row operations.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Open the cache file and apply pragmas.
fn open_and_configure(path: &Path) -> Result<Connection, StorageError> {
    let conn =
        Connection::open(path).map_err(|e| StorageError::Setup(format!("sqlite open: {e}")))?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )
    .map_err(|e| StorageError::Setup(format!("pragma setup: {e}")))?;

    Ok(conn)
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
fn run_migrations(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    info!("migrating overlay cache from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// v1: the settings table (session token and friends).
fn migrate_v1(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "BEGIN;
         CREATE TABLE IF NOT EXISTS local_settings (
            setting_category TEXT NOT NULL,
            setting_key TEXT NOT NULL,
            setting_value TEXT NOT NULL,
            updated_at TEXT DEFAULT (datetime('now')),
            PRIMARY KEY (setting_category, setting_key)
         );
         INSERT INTO schema_version (version) VALUES (1);
         COMMIT;",
    )?;
    Ok(())
}

/// v2: the overlay set (paid / recently-deleted order ids).
fn migrate_v2(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "BEGIN;
         CREATE TABLE IF NOT EXISTS local_overlays (
            kind TEXT NOT NULL,
            order_id TEXT NOT NULL,
            applied_at TEXT NOT NULL,
            PRIMARY KEY (kind, order_id)
         );
         INSERT INTO schema_version (version) VALUES (2);
         COMMIT;",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_overlay_round_trip() {
        let cache = OverlayCache::open_in_memory().unwrap();
        let now = Utc::now();

        cache
            .record_overlay(&LocalChange {
                order_id: "ord-1".into(),
                kind: OverlayKind::Deleted,
                applied_at: now,
            })
            .unwrap();
        cache
            .record_overlay(&LocalChange {
                order_id: "ord-2".into(),
                kind: OverlayKind::Paid,
                applied_at: now,
            })
            .unwrap();

        let mut overlays = cache.load_overlays().unwrap();
        overlays.sort_by(|a, b| a.order_id.cmp(&b.order_id));
        assert_eq!(overlays.len(), 2);
        assert_eq!(overlays[0].kind, OverlayKind::Deleted);
        assert_eq!(overlays[1].kind, OverlayKind::Paid);

        cache.clear_overlay("ord-1", OverlayKind::Deleted).unwrap();
        assert_eq!(cache.load_overlays().unwrap().len(), 1);
    }

    #[test]
    fn test_record_overlay_is_upsert() {
        let cache = OverlayCache::open_in_memory().unwrap();
        let first = Utc::now() - Duration::seconds(30);
        let second = Utc::now();

        for applied_at in [first, second] {
            cache
                .record_overlay(&LocalChange {
                    order_id: "ord-1".into(),
                    kind: OverlayKind::Paid,
                    applied_at,
                })
                .unwrap();
        }

        let overlays = cache.load_overlays().unwrap();
        assert_eq!(overlays.len(), 1);
        assert_eq!(overlays[0].applied_at.timestamp(), second.timestamp());
    }

    #[test]
    fn test_prune_overlays_before_cutoff() {
        let cache = OverlayCache::open_in_memory().unwrap();
        let old = Utc::now() - Duration::minutes(10);
        let fresh = Utc::now();

        cache
            .record_overlay(&LocalChange {
                order_id: "stale".into(),
                kind: OverlayKind::Deleted,
                applied_at: old,
            })
            .unwrap();
        cache
            .record_overlay(&LocalChange {
                order_id: "fresh".into(),
                kind: OverlayKind::Deleted,
                applied_at: fresh,
            })
            .unwrap();

        let pruned = cache
            .prune_overlays_before(Utc::now() - Duration::minutes(5))
            .unwrap();
        assert_eq!(pruned, 1);

        let overlays = cache.load_overlays().unwrap();
        assert_eq!(overlays.len(), 1);
        assert_eq!(overlays[0].order_id, "fresh");
    }

    #[test]
    fn test_settings_round_trip() {
        let cache = OverlayCache::open_in_memory().unwrap();

        assert_eq!(cache.setting_get("auth", "token"), None);
        cache.setting_set("auth", "token", "tok-123").unwrap();
        assert_eq!(
            cache.setting_get("auth", "token").as_deref(),
            Some("tok-123")
        );

        cache.setting_set("auth", "token", "tok-456").unwrap();
        assert_eq!(
            cache.setting_get("auth", "token").as_deref(),
            Some("tok-456")
        );

        cache.setting_delete("auth", "token").unwrap();
        assert_eq!(cache.setting_get("auth", "token"), None);
    }
}
