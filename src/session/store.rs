use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, SystemTime};
use tokio::sync::Notify;

use crate::error::Error;
use crate::middleware::BoxFuture;

/// The stored form of one session: its data and an optional absolute
/// expiration time.
///
#[derive(Clone, Debug, Default)]
pub struct SessionRecord {
    pub data: Map<String, Value>,
    pub expires_at: Option<SystemTime>,
}

impl SessionRecord {
    /// Returns true when the record has an expiration time in the past.
    ///
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at <= SystemTime::now())
    }
}

fn unsupported() -> Error {
    Error::message("operation not supported by this session store")
}

/// The interface a session backend implements. All operations are
/// asynchronous and must be safe to call from concurrent requests.
///
/// `len`, `ids`, and `all` are optional; stores that cannot enumerate
/// their sessions keep the default implementations.
///
pub trait SessionStore: Send + Sync {
    fn get(&self, id: &str) -> BoxFuture<Result<Option<SessionRecord>, Error>>;

    fn set(&self, id: &str, record: SessionRecord) -> BoxFuture<Result<(), Error>>;

    fn destroy(&self, id: &str) -> BoxFuture<Result<(), Error>>;

    /// Refresh the expiration time of a session without rewriting its
    /// data.
    ///
    fn touch(&self, id: &str, expires_at: Option<SystemTime>) -> BoxFuture<Result<(), Error>>;

    fn len(&self) -> BoxFuture<Result<usize, Error>> {
        Box::pin(async { Err(unsupported()) })
    }

    fn ids(&self) -> BoxFuture<Result<Vec<String>, Error>> {
        Box::pin(async { Err(unsupported()) })
    }

    fn all(&self) -> BoxFuture<Result<Vec<(String, SessionRecord)>, Error>> {
        Box::pin(async { Err(unsupported()) })
    }
}

type Entries = Arc<Mutex<HashMap<String, SessionRecord>>>;

/// The reference in-memory store: a mutex around a map, swept by a
/// background task that removes expired entries.
///
/// The sweeper holds only weak references, so dropping the store stops
/// it; [`MemoryStore::shutdown`] stops it explicitly for a clean process
/// exit.
///
pub struct MemoryStore {
    entries: Entries,
    shutdown: Arc<Notify>,
}

impl MemoryStore {
    /// Returns a store whose sweeper fires every 60 seconds.
    ///
    pub fn new() -> Arc<Self> {
        Self::with_check_period(Duration::from_secs(60))
    }

    /// Returns a store whose sweeper fires every `check_period`.
    ///
    pub fn with_check_period(check_period: Duration) -> Arc<Self> {
        let entries: Entries = Arc::new(Mutex::new(HashMap::new()));
        let shutdown = Arc::new(Notify::new());

        spawn_sweeper(Arc::downgrade(&entries), Arc::clone(&shutdown), check_period);

        Arc::new(Self { entries, shutdown })
    }

    /// Stop the background sweeper. Idempotent.
    ///
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, SessionRecord>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn spawn_sweeper(
    entries: Weak<Mutex<HashMap<String, SessionRecord>>>,
    shutdown: Arc<Notify>,
    period: Duration,
) {
    // Without a runtime (a store built before the server starts) there is
    // nothing to sweep yet; expired records stay invisible via get().
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        return;
    };

    runtime.spawn(async move {
        let mut interval = tokio::time::interval(period);

        // The immediate first tick would sweep an empty map.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.notified() => break,
                _ = interval.tick() => {}
            }

            let Some(entries) = entries.upgrade() else {
                break;
            };

            let mut guard = entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let before = guard.len();

            guard.retain(|_, record| !record.is_expired());

            let removed = before - guard.len();

            if removed > 0 {
                tracing::debug!(removed, "swept expired sessions");
            }
        }
    });
}

impl SessionStore for MemoryStore {
    fn get(&self, id: &str) -> BoxFuture<Result<Option<SessionRecord>, Error>> {
        let record = self.lock().get(id).cloned();
        let record = record.filter(|record| !record.is_expired());

        Box::pin(async move { Ok(record) })
    }

    fn set(&self, id: &str, record: SessionRecord) -> BoxFuture<Result<(), Error>> {
        self.lock().insert(id.to_owned(), record);
        Box::pin(async { Ok(()) })
    }

    fn destroy(&self, id: &str) -> BoxFuture<Result<(), Error>> {
        self.lock().remove(id);
        Box::pin(async { Ok(()) })
    }

    fn touch(&self, id: &str, expires_at: Option<SystemTime>) -> BoxFuture<Result<(), Error>> {
        if let Some(record) = self.lock().get_mut(id) {
            record.expires_at = expires_at;
        }

        Box::pin(async { Ok(()) })
    }

    fn len(&self) -> BoxFuture<Result<usize, Error>> {
        let len = self.lock().len();
        Box::pin(async move { Ok(len) })
    }

    fn ids(&self) -> BoxFuture<Result<Vec<String>, Error>> {
        let ids = self.lock().keys().cloned().collect();
        Box::pin(async move { Ok(ids) })
    }

    fn all(&self) -> BoxFuture<Result<Vec<(String, SessionRecord)>, Error>> {
        let all = self
            .lock()
            .iter()
            .map(|(id, record)| (id.clone(), record.clone()))
            .collect();

        Box::pin(async move { Ok(all) })
    }
}

#[cfg(test)]
mod tests {
    use super::{MemoryStore, SessionRecord, SessionStore};
    use std::time::{Duration, SystemTime};

    #[tokio::test]
    async fn round_trips_records() {
        let store = MemoryStore::new();
        let record = SessionRecord {
            data: serde_json::Map::new(),
            expires_at: None,
        };

        store.set("a", record).await.unwrap();

        assert!(store.get("a").await.unwrap().is_some());
        assert_eq!(store.len().await.unwrap(), 1);

        store.destroy("a").await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());

        store.shutdown();
    }

    #[tokio::test]
    async fn expired_records_are_invisible() {
        let store = MemoryStore::new();
        let record = SessionRecord {
            data: serde_json::Map::new(),
            expires_at: Some(SystemTime::now() - Duration::from_secs(1)),
        };

        store.set("a", record).await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());

        store.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn the_sweeper_removes_expired_entries() {
        let store = MemoryStore::with_check_period(Duration::from_millis(10));
        let record = SessionRecord {
            data: serde_json::Map::new(),
            expires_at: Some(SystemTime::now() - Duration::from_secs(1)),
        };

        store.set("a", record).await.unwrap();

        // Let the sweeper fire at least once.
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(store.len().await.unwrap(), 0);

        store.shutdown();
    }
}
