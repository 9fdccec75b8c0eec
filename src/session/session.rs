use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use super::middleware::SessionCookie;
use super::store::{SessionRecord, SessionStore};
use crate::error::Error;

pub(crate) type IdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Generate an opaque session id: 24 random bytes (192 bits of entropy)
/// encoded as unpadded base64url.
///
pub(crate) fn generate_id() -> String {
    let mut bytes = [0u8; 24];

    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// A handle to the request's session.
///
/// The handle is cheaply cloneable; the session middleware keeps one
/// clone across the downstream call so it can observe mutations and save
/// the session when the response ends. Plain data access is synchronous;
/// operations that talk to the store (`save`, `destroy`, `reload`,
/// `regenerate`) are asynchronous.
///
#[derive(Clone)]
pub struct Session {
    inner: Arc<Mutex<SessionInner>>,
    store: Arc<dyn SessionStore>,
    genid: IdGenerator,
}

pub(crate) struct SessionInner {
    pub id: String,
    pub data: Map<String, Value>,
    pub cookie: SessionCookie,
    pub is_new: bool,
    pub dirty: bool,
    pub destroyed: bool,
    pub id_changed: bool,
}

impl Session {
    pub(crate) fn new(
        id: String,
        data: Map<String, Value>,
        is_new: bool,
        cookie: SessionCookie,
        store: Arc<dyn SessionStore>,
        genid: IdGenerator,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionInner {
                id,
                data,
                cookie,
                is_new,
                dirty: false,
                destroyed: false,
                id_changed: false,
            })),
            store,
            genid,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the session id.
    ///
    pub fn id(&self) -> String {
        self.lock().id.clone()
    }

    /// Returns true when no session existed for the request and a fresh
    /// id was generated.
    ///
    pub fn is_new(&self) -> bool {
        self.lock().is_new
    }

    /// Returns the value stored under `name`.
    ///
    pub fn get(&self, name: &str) -> Option<Value> {
        self.lock().data.get(name).cloned()
    }

    /// Store a value under `name`.
    ///
    pub fn insert(&self, name: impl Into<String>, value: Value) {
        let mut inner = self.lock();

        inner.data.insert(name.into(), value);
        inner.dirty = true;
    }

    /// Remove and return the value stored under `name`.
    ///
    pub fn remove(&self, name: &str) -> Option<Value> {
        let mut inner = self.lock();
        let removed = inner.data.remove(name);

        if removed.is_some() {
            inner.dirty = true;
        }

        removed
    }

    /// Remove every value from the session.
    ///
    pub fn clear(&self) {
        let mut inner = self.lock();

        if !inner.data.is_empty() {
            inner.dirty = true;
        }

        inner.data.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.lock().data.is_empty()
    }

    /// Returns a copy of the session data.
    ///
    pub fn data(&self) -> Map<String, Value> {
        self.lock().data.clone()
    }

    /// Returns the cookie descriptor controlling the session cookie.
    ///
    pub fn cookie(&self) -> SessionCookie {
        self.lock().cookie.clone()
    }

    /// Update the cookie descriptor (for example, to extend `Max-Age`
    /// after a login).
    ///
    pub fn set_cookie(&self, cookie: SessionCookie) {
        let mut inner = self.lock();

        inner.cookie = cookie;
        inner.dirty = true;
    }

    /// The absolute expiration implied by the cookie's `Max-Age`, from
    /// now.
    ///
    pub fn expires_at(&self) -> Option<SystemTime> {
        self.lock()
            .cookie
            .max_age
            .map(|max_age| SystemTime::now() + max_age)
    }

    /// Persist the session to the store immediately.
    ///
    pub async fn save(&self) -> Result<(), Error> {
        let (id, record) = {
            let inner = self.lock();

            (
                inner.id.clone(),
                SessionRecord {
                    data: inner.data.clone(),
                    expires_at: inner
                        .cookie
                        .max_age
                        .map(|max_age| SystemTime::now() + max_age),
                },
            )
        };

        self.store.set(&id, record).await?;
        self.lock().dirty = false;
        Ok(())
    }

    /// Replace the in-memory data with the stored copy.
    ///
    pub async fn reload(&self) -> Result<(), Error> {
        let id = self.id();
        let record = self.store.get(&id).await?.unwrap_or_default();

        let mut inner = self.lock();

        inner.data = record.data;
        inner.dirty = false;
        Ok(())
    }

    /// Destroy the session: the stored copy is removed now, and the
    /// middleware clears the session cookie when the response ends.
    ///
    pub async fn destroy(&self) -> Result<(), Error> {
        let id = self.id();

        self.store.destroy(&id).await?;

        let mut inner = self.lock();

        inner.destroyed = true;
        inner.data.clear();
        Ok(())
    }

    /// Replace the session id, discarding the stored copy of the old
    /// session and keeping an empty data set.
    ///
    pub async fn regenerate(&self) -> Result<(), Error> {
        let old_id = self.id();

        self.store.destroy(&old_id).await?;

        let mut inner = self.lock();

        inner.id = (self.genid)();
        inner.data.clear();
        inner.is_new = true;
        inner.id_changed = true;
        inner.dirty = false;
        Ok(())
    }

    /// Refresh the stored expiration time without rewriting the data.
    ///
    pub async fn touch(&self) -> Result<(), Error> {
        let id = self.id();
        let expires_at = self.expires_at();

        self.store.touch(&id, expires_at).await
    }
}

impl Session {
    pub(crate) fn state(&self) -> (String, bool, bool, bool, bool) {
        let inner = self.lock();

        (
            inner.id.clone(),
            inner.is_new,
            inner.dirty,
            inner.destroyed,
            inner.id_changed,
        )
    }

    pub(crate) fn record(&self) -> SessionRecord {
        let inner = self.lock();

        SessionRecord {
            data: inner.data.clone(),
            expires_at: inner
                .cookie
                .max_age
                .map(|max_age| SystemTime::now() + max_age),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();

        f.debug_struct("Session")
            .field("id", &inner.id)
            .field("is_new", &inner.is_new)
            .field("keys", &inner.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::generate_id;

    #[test]
    fn ids_are_opaque_and_distinct() {
        let a = generate_id();
        let b = generate_id();

        assert_ne!(a, b);
        // 24 bytes encode to 32 base64 characters without padding.
        assert_eq!(a.len(), 32);
        assert!(!a.contains('='));
    }
}
