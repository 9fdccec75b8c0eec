use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard};

use super::settings::Settings;
use crate::view::ViewEngine;

type MountObserver = Box<dyn Fn(&str) + Send + Sync>;

/// State shared by every request of an application: the settings store,
/// the application locals, the view engine registry, and the mount graph.
///
/// Settings are read-mostly. Writes made after the server starts accepting
/// connections go through the same lock, so readers on other threads
/// observe them.
///
pub struct AppContext {
    settings: RwLock<Settings>,
    locals: RwLock<Map<String, Value>>,
    engines: RwLock<HashMap<String, Arc<dyn ViewEngine>>>,
    mount_path: RwLock<Option<String>>,
    mount_observers: Mutex<Vec<MountObserver>>,
}

impl AppContext {
    pub(crate) fn new() -> Self {
        Self {
            settings: RwLock::new(Settings::default()),
            locals: RwLock::new(Map::new()),
            engines: RwLock::new(HashMap::new()),
            mount_path: RwLock::new(None),
            mount_observers: Mutex::new(Vec::new()),
        }
    }

    /// Returns a read guard over the settings store.
    ///
    pub fn settings(&self) -> RwLockReadGuard<'_, Settings> {
        self.settings.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mutate the settings store. Readers observe the write once the
    /// closure returns.
    ///
    pub fn update_settings(&self, f: impl FnOnce(&mut Settings)) {
        let mut guard = self
            .settings
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        f(&mut guard);
    }

    /// Returns a read guard over the application locals.
    ///
    pub fn locals(&self) -> RwLockReadGuard<'_, Map<String, Value>> {
        self.locals.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Set a local visible to views and handlers for the lifetime of the
    /// application.
    ///
    pub fn set_local(&self, name: impl Into<String>, value: Value) {
        let mut guard = self
            .locals
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        guard.insert(name.into(), value);
    }

    /// Register a view engine for the provided file extension.
    ///
    pub fn register_engine(&self, extension: impl Into<String>, engine: Arc<dyn ViewEngine>) {
        let extension = extension.into();
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();

        let mut guard = self
            .engines
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        guard.insert(extension, engine);
    }

    /// Returns the engine registered for the extension of the provided
    /// view name, falling back to the `view engine` setting when the name
    /// has no extension.
    ///
    pub fn engine_for(&self, view: &str) -> Option<Arc<dyn ViewEngine>> {
        let extension = match view.rsplit_once('.') {
            Some((_, extension)) => extension.to_ascii_lowercase(),
            None => self.settings().view_engine.clone()?,
        };

        let guard = self
            .engines
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        guard.get(&extension).cloned()
    }

    /// Returns the path prefix at which this application is mounted under
    /// a parent application, if any.
    ///
    pub fn mount_path(&self) -> Option<String> {
        self.mount_path
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Register an observer notified when the application is mounted under
    /// a parent. The observer receives the mount path.
    ///
    pub fn on_mount(&self, observer: impl Fn(&str) + Send + Sync + 'static) {
        let mut guard = self
            .mount_observers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        guard.push(Box::new(observer));
    }

    pub(crate) fn notify_mounted(&self, path: &str) {
        {
            let mut guard = self
                .mount_path
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());

            *guard = Some(path.to_owned());
        }

        let guard = self
            .mount_observers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        for observer in guard.iter() {
            observer(path);
        }
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext").finish_non_exhaustive()
    }
}
