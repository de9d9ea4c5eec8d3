use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use tracing::{debug, warn};

use crate::data::repository;
use crate::error::AppError;
use crate::models::dashboard::{DashboardFetch, DashboardSnapshot};
use crate::services::api_client::CatalogApi;

/// Persisted, version-stamped dashboard statistics for one account.
///
/// Reads are optimistic: [`snapshot`](Self::snapshot) serves whatever was last
/// persisted and [`refresh`](Self::refresh) asks the server whether that copy
/// is still current. Mutations of the catalog call
/// [`invalidate`](Self::invalidate), which drops the persisted copy so the
/// next refresh is unconditional.
pub struct DashboardCache {
    db: Mutex<Connection>,
    account: String,
    recent_files_limit: usize,
    generation: AtomicU64,
}

impl DashboardCache {
    pub fn new(conn: Connection, account: impl Into<String>, recent_files_limit: usize) -> Self {
        Self {
            db: Mutex::new(conn),
            account: account.into(),
            recent_files_limit,
            generation: AtomicU64::new(1),
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The persisted snapshot, if any. A row that no longer parses is
    /// discarded and reported as absent.
    pub fn snapshot(&self) -> Option<DashboardSnapshot> {
        let conn = self.conn();
        let row = match repository::get_dashboard(&conn, &self.account) {
            Ok(row) => row?,
            Err(e) => {
                warn!(account = %self.account, error = %e, "dashboard cache read failed");
                return None;
            }
        };

        match serde_json::from_str::<DashboardSnapshot>(&row.payload) {
            Ok(snapshot) if snapshot.version == row.data_version => {
                debug!(account = %self.account, version = %row.data_version, stored_at = %row.stored_at, "dashboard cache hit");
                Some(snapshot)
            }
            Ok(_) | Err(_) => {
                warn!(account = %self.account, "discarding unreadable dashboard cache entry");
                if let Err(e) = repository::delete_dashboard(&conn, &self.account) {
                    warn!(account = %self.account, error = %e, "failed to drop dashboard cache entry");
                }
                None
            }
        }
    }

    pub fn is_cached(&self) -> bool {
        self.snapshot().is_some()
    }

    /// Conditional fetch against the persisted version. Never fails: a
    /// transport or protocol problem falls back to the cached copy, and the
    /// next call tries again.
    pub async fn refresh(&self, api: &dyn CatalogApi) -> Option<DashboardSnapshot> {
        let cached = self.snapshot();
        let generation = self.generation.load(Ordering::Acquire);
        let current_version = cached.as_ref().map(|s| s.version.clone());

        let reply = api.dashboard(current_version.as_deref()).await;
        let superseded = self.generation.load(Ordering::Acquire) != generation;

        match reply {
            Ok(DashboardFetch::Fresh(snapshot)) => {
                let snapshot = snapshot.normalize(self.recent_files_limit);
                if superseded {
                    debug!(account = %self.account, version = %snapshot.version, "cache invalidated during fetch; not persisting");
                } else {
                    self.persist(&snapshot);
                }
                Some(snapshot)
            }
            Ok(DashboardFetch::Unchanged) => {
                if cached.is_none() {
                    warn!(account = %self.account, "server answered 'unchanged' to an unconditional fetch");
                    return None;
                }
                if superseded {
                    return None;
                }
                debug!(account = %self.account, version = ?current_version, "dashboard unchanged");
                cached
            }
            Err(e) => {
                warn!(account = %self.account, error = %e, "dashboard refresh failed");
                if superseded {
                    None
                } else {
                    cached
                }
            }
        }
    }

    fn persist(&self, snapshot: &DashboardSnapshot) {
        let payload = match serde_json::to_string(snapshot) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "failed to encode dashboard snapshot");
                return;
            }
        };
        let conn = self.conn();
        if let Err(e) =
            repository::put_dashboard(&conn, &self.account, &snapshot.version, &payload)
        {
            warn!(account = %self.account, error = %e, "failed to persist dashboard snapshot");
        }
    }

    /// Marks the statistics stale after a catalog mutation. The persisted copy
    /// is removed outright so its version can never be matched again.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        let conn = self.conn();
        match repository::delete_dashboard(&conn, &self.account) {
            Ok(removed) => debug!(account = %self.account, removed, "dashboard cache invalidated"),
            Err(e) => warn!(account = %self.account, error = %e, "failed to invalidate dashboard cache"),
        }
    }

    /// Session teardown: drops the persisted snapshot for this account.
    pub fn clear(&self) -> Result<(), AppError> {
        self.generation.fetch_add(1, Ordering::AcqRel);
        repository::delete_dashboard(&self.conn(), &self.account)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::migrations;
    use crate::models::dashboard::RecentFile;
    use crate::services::fake_api::{snapshot, FakeCatalogApi, FakeFailure};
    use chrono::{TimeZone, Utc};

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        migrations::run_migrations(&conn).unwrap();
        conn
    }

    fn test_cache() -> DashboardCache {
        DashboardCache::new(test_conn(), "alice@example.com", 5)
    }

    fn raw_row(cache: &DashboardCache) -> Option<repository::DashboardRow> {
        repository::get_dashboard(&cache.conn(), cache.account()).unwrap()
    }

    #[tokio::test]
    async fn test_first_refresh_is_unconditional_and_persists() {
        let cache = test_cache();
        let api = FakeCatalogApi::default();
        api.set_dashboard(snapshot("v1", 3)).await;

        let fetched = cache.refresh(&api).await.unwrap();

        assert_eq!(fetched.version, "v1");
        assert_eq!(*api.dashboard_calls.lock().await, vec![None::<String>]);
        assert_eq!(cache.snapshot().unwrap(), fetched);
    }

    #[tokio::test]
    async fn test_unchanged_reply_leaves_cache_byte_identical() {
        let cache = test_cache();
        let api = FakeCatalogApi::default();
        api.set_dashboard(snapshot("v1", 3)).await;
        cache.refresh(&api).await.unwrap();
        let before = raw_row(&cache).unwrap();

        let returned = cache.refresh(&api).await.unwrap();

        let after = raw_row(&cache).unwrap();
        assert_eq!(before, after);
        assert_eq!(serde_json::to_string(&returned).unwrap(), before.payload);
        assert_eq!(
            api.dashboard_calls.lock().await.last().cloned().flatten().as_deref(),
            Some("v1")
        );
    }

    #[tokio::test]
    async fn test_new_version_replaces_snapshot() {
        let cache = test_cache();
        let api = FakeCatalogApi::default();
        api.set_dashboard(snapshot("v1", 3)).await;
        cache.refresh(&api).await.unwrap();

        api.set_dashboard(snapshot("v2", 4)).await;
        let fetched = cache.refresh(&api).await.unwrap();

        assert_eq!(fetched.total_files, 4);
        assert_eq!(cache.snapshot().unwrap().version, "v2");
    }

    #[tokio::test]
    async fn test_invalidate_forces_unconditional_fetch() {
        let cache = test_cache();
        let api = FakeCatalogApi::default();
        api.set_dashboard(snapshot("v1", 3)).await;
        cache.refresh(&api).await.unwrap();

        cache.invalidate();
        assert!(!cache.is_cached());

        cache.refresh(&api).await.unwrap();
        let calls = api.dashboard_calls.lock().await.clone();
        assert_eq!(calls, vec![None::<String>, None]);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_discarded_silently() {
        let cache = test_cache();
        repository::put_dashboard(&cache.conn(), cache.account(), "v9", "{not json").unwrap();

        assert!(cache.snapshot().is_none());
        assert!(raw_row(&cache).is_none());

        let api = FakeCatalogApi::default();
        api.set_dashboard(snapshot("v1", 1)).await;
        assert_eq!(cache.refresh(&api).await.unwrap().version, "v1");
        assert_eq!(*api.dashboard_calls.lock().await, vec![None::<String>]);
    }

    #[tokio::test]
    async fn test_version_mismatch_between_row_and_payload_is_corrupt() {
        let cache = test_cache();
        let payload = serde_json::to_string(&snapshot("v1", 1)).unwrap();
        repository::put_dashboard(&cache.conn(), cache.account(), "v2", &payload).unwrap();

        assert!(cache.snapshot().is_none());
    }

    #[tokio::test]
    async fn test_transport_failure_serves_cached_copy() {
        let cache = test_cache();
        let api = FakeCatalogApi::default();
        api.set_dashboard(snapshot("v1", 3)).await;
        cache.refresh(&api).await.unwrap();

        api.fail_next(FakeFailure::Network).await;
        let served = cache.refresh(&api).await.unwrap();

        assert_eq!(served.version, "v1");
        assert!(cache.is_cached());
    }

    #[tokio::test]
    async fn test_transport_failure_without_cache_yields_none() {
        let cache = test_cache();
        let api = FakeCatalogApi::default();
        api.fail_next(FakeFailure::Server("boom".into())).await;

        assert!(cache.refresh(&api).await.is_none());
        assert!(!cache.is_cached());
    }

    #[tokio::test]
    async fn test_recent_files_are_normalized_on_ingest() {
        let cache = DashboardCache::new(test_conn(), "alice@example.com", 2);
        let api = FakeCatalogApi::default();
        let mut snap = snapshot("v1", 3);
        snap.recent_files = (1..=3)
            .map(|day| RecentFile {
                id: day as i64,
                filename: format!("f{day}.pdf"),
                uploaded_at: Utc.with_ymd_and_hms(2025, 1, day, 0, 0, 0).unwrap(),
                size_bytes: 100,
            })
            .collect();
        api.set_dashboard(snap).await;

        let fetched = cache.refresh(&api).await.unwrap();
        let ids: Vec<i64> = fetched.recent_files.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![3, 2]);
    }

    #[tokio::test]
    async fn test_clear_is_scoped_to_account() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("cache.db");
        let alice = DashboardCache::new(
            crate::config::open_database_at(&db).unwrap(),
            "alice@example.com",
            5,
        );
        let bob = DashboardCache::new(
            crate::config::open_database_at(&db).unwrap(),
            "bob@example.com",
            5,
        );
        let api = FakeCatalogApi::default();
        api.set_dashboard(snapshot("v1", 1)).await;
        alice.refresh(&api).await.unwrap();
        bob.refresh(&api).await.unwrap();

        alice.clear().unwrap();

        assert!(!alice.is_cached());
        assert!(bob.is_cached());
    }
}
