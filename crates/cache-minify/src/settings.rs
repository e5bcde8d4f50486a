//! The minify on/off setting.
//!
//! [`Settings`] is the one source of truth for whether pages get minified.
//! It is created by the host, shared by reference (usually an `Arc`), and
//! loads its persisted value from a [`ConfigStore`] the first time it is
//! consulted.
//!
//! Three independent flags live here:
//!
//! - `enabled`: the configured value, toggled by [`Settings::set`] and
//!   written through to the store
//! - `changed`: becomes true the first time `set` actually changes
//!   `enabled` and stays true until the process restarts
//! - `force_disabled`: a caller exemption that only ever goes from false to
//!   true

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::{Result, StoreError};

/// Name of the config line holding the setting.
pub const CONFIG_KEY: &str = "cache_minify";

/// Key/boolean access to the host's persisted configuration.
pub trait ConfigStore: Send + Sync {
    /// The stored value, or `None` when the key is absent.
    fn read_bool(&self, key: &str) -> std::result::Result<Option<bool>, StoreError>;

    /// Persist `value` under `key`.
    fn write_bool(&self, key: &str, value: bool) -> std::result::Result<(), StoreError>;
}

/// Process-wide minify setting, see the [module docs](self).
pub struct Settings {
    store: Arc<dyn ConfigStore>,
    key: String,
    /// The value `enabled` was initialized with.
    initial: OnceLock<bool>,
    enabled: AtomicBool,
    changed: AtomicBool,
    force_disabled: AtomicBool,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("key", &self.key)
            .field("initial", &self.initial.get())
            .field("enabled", &self.enabled.load(Ordering::SeqCst))
            .field("changed", &self.changed.load(Ordering::SeqCst))
            .field("force_disabled", &self.force_disabled.load(Ordering::SeqCst))
            .finish()
    }
}

impl Settings {
    /// Settings backed by `store` under [`CONFIG_KEY`].
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self::with_key(store, CONFIG_KEY)
    }

    pub fn with_key(store: Arc<dyn ConfigStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            initial: OnceLock::new(),
            enabled: AtomicBool::new(false),
            changed: AtomicBool::new(false),
            force_disabled: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Initialize `enabled` from a persisted value (absent means disabled).
    ///
    /// Only the first initialization counts, whether it happens here or
    /// lazily on first access. Returns false if already initialized.
    pub fn initialize(&self, persisted: Option<bool>) -> bool {
        let mut ran = false;
        self.initial.get_or_init(|| {
            ran = true;
            self.apply_initial(persisted)
        });
        ran
    }

    fn ensure_initialized(&self) {
        self.initial.get_or_init(|| {
            let persisted = match self.store.read_bool(&self.key) {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!(key = %self.key, error = %e, "failed to load minify setting, defaulting to disabled");
                    None
                }
            };
            self.apply_initial(persisted)
        });
    }

    fn apply_initial(&self, persisted: Option<bool>) -> bool {
        let enabled = persisted.unwrap_or(false);
        self.enabled.store(enabled, Ordering::SeqCst);
        tracing::debug!(key = %self.key, enabled, "minify setting initialized");
        enabled
    }

    /// Whether pages should be minified: enabled and not force-disabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled() && !self.is_force_disabled()
    }

    /// The configured value, ignoring any caller exemption.
    pub fn enabled(&self) -> bool {
        self.ensure_initialized();
        self.enabled.load(Ordering::SeqCst)
    }

    /// Whether `set` changed the value during this process lifetime.
    pub fn changed(&self) -> bool {
        self.changed.load(Ordering::SeqCst)
    }

    /// Skip minification for the rest of the process, regardless of
    /// `enabled`. Cannot be undone.
    pub fn force_disable(&self) {
        if !self.force_disabled.swap(true, Ordering::SeqCst) {
            tracing::debug!("minification force-disabled for this process");
        }
    }

    pub fn is_force_disabled(&self) -> bool {
        self.force_disabled.load(Ordering::SeqCst)
    }

    /// Set the configured value and write it through to the store.
    ///
    /// Setting the value already in effect does nothing. Otherwise memory is
    /// updated first, so a store failure leaves memory and store disagreeing
    /// until the next successful `set`.
    pub fn set(&self, value: bool) -> Result<()> {
        self.ensure_initialized();
        if self.enabled.swap(value, Ordering::SeqCst) == value {
            return Ok(());
        }
        self.changed.store(true, Ordering::SeqCst);
        tracing::info!(key = %self.key, enabled = value, "minify setting changed");

        self.store.write_bool(&self.key, value)?;
        Ok(())
    }

    /// One-line notice shown after the setting was changed.
    pub fn notice(&self) -> Option<String> {
        self.changed().then(|| {
            let state = if self.enabled() { "enabled" } else { "disabled" };
            format!("HTML Minify is now {state}.")
        })
    }
}

/// A [`ConfigStore`] that keeps values in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, bool>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store already holding `key = value`.
    pub fn with_value(key: impl Into<String>, value: bool) -> Self {
        let store = Self::default();
        store.lock().insert(key.into(), value);
        store
    }

    pub fn get(&self, key: &str) -> Option<bool> {
        self.lock().get(key).copied()
    }

    /// Number of successful `write_bool` calls.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, bool>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ConfigStore for MemoryStore {
    fn read_bool(&self, key: &str) -> std::result::Result<Option<bool>, StoreError> {
        Ok(self.get(key))
    }

    fn write_bool(&self, key: &str, value: bool) -> std::result::Result<(), StoreError> {
        self.lock().insert(key.to_owned(), value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    /// Reads fail or writes fail, depending on the flags.
    struct BrokenStore {
        fail_reads: bool,
        writes: AtomicUsize,
    }

    impl ConfigStore for BrokenStore {
        fn read_bool(&self, _key: &str) -> std::result::Result<Option<bool>, StoreError> {
            if self.fail_reads {
                Err(StoreError::Unavailable("read refused".into()))
            } else {
                Ok(Some(true))
            }
        }

        fn write_bool(&self, _key: &str, _value: bool) -> std::result::Result<(), StoreError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Unavailable("write refused".into()))
        }
    }

    fn settings_with(store: MemoryStore) -> (Arc<MemoryStore>, Settings) {
        let store = Arc::new(store);
        let settings = Settings::new(store.clone());
        (store, settings)
    }

    #[test]
    fn test_absent_value_defaults_to_disabled() {
        let (_, settings) = settings_with(MemoryStore::new());
        assert!(!settings.enabled());
        assert!(!settings.is_enabled());
        assert!(!settings.changed());
    }

    #[test]
    fn test_loads_persisted_value_lazily() {
        let (store, settings) = settings_with(MemoryStore::new());
        // Written after construction but before first access
        store.write_bool(CONFIG_KEY, true).unwrap();

        assert!(settings.is_enabled());
    }

    #[test]
    fn test_explicit_initialize_runs_once() {
        let (_, settings) = settings_with(MemoryStore::with_value(CONFIG_KEY, false));

        assert!(settings.initialize(Some(true)));
        assert!(!settings.initialize(Some(false)));
        assert!(settings.enabled());
    }

    #[test]
    fn test_initialize_after_lazy_load_is_ignored() {
        let (_, settings) = settings_with(MemoryStore::with_value(CONFIG_KEY, true));

        assert!(settings.enabled());
        assert!(!settings.initialize(None));
        assert!(settings.enabled());
    }

    #[test]
    fn test_load_failure_defaults_to_disabled() {
        let settings = Settings::new(Arc::new(BrokenStore {
            fail_reads: true,
            writes: AtomicUsize::new(0),
        }));
        assert!(!settings.enabled());
    }

    #[test]
    fn test_set_writes_through_and_flags_change() {
        let (store, settings) = settings_with(MemoryStore::new());

        settings.set(true).unwrap();

        assert!(settings.is_enabled());
        assert!(settings.changed());
        assert_eq!(store.get(CONFIG_KEY), Some(true));
        assert_eq!(store.writes(), 1);
    }

    #[test]
    fn test_set_same_value_is_noop() {
        let (store, settings) = settings_with(MemoryStore::with_value(CONFIG_KEY, true));

        settings.set(true).unwrap();

        assert!(!settings.changed());
        assert_eq!(store.writes(), 0);
        assert_eq!(settings.notice(), None);
    }

    #[test]
    fn test_changed_is_sticky() {
        let (store, settings) = settings_with(MemoryStore::new());

        settings.set(true).unwrap();
        settings.set(false).unwrap();

        assert!(!settings.enabled());
        assert!(settings.changed());
        assert_eq!(store.writes(), 2);
        assert_eq!(settings.notice().as_deref(), Some("HTML Minify is now disabled."));
    }

    #[test]
    fn test_force_disable_overrides_enabled_for_good() {
        let (_, settings) = settings_with(MemoryStore::with_value(CONFIG_KEY, true));
        assert!(settings.is_enabled());

        settings.force_disable();
        settings.force_disable();
        assert!(!settings.is_enabled());

        settings.set(false).unwrap();
        settings.set(true).unwrap();
        assert!(settings.enabled());
        assert!(!settings.is_enabled());
        assert!(settings.is_force_disabled());
    }

    #[test]
    fn test_write_failure_leaves_memory_updated() {
        let store = Arc::new(BrokenStore {
            fail_reads: false,
            writes: AtomicUsize::new(0),
        });
        let settings = Settings::new(store.clone());
        assert!(settings.enabled());

        let err = settings.set(false).unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::Unavailable(_))));
        assert!(!settings.enabled());
        assert!(settings.changed());

        // Same value again: in-memory state already matches, no retry
        settings.set(false).unwrap();
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_custom_key() {
        let store = Arc::new(MemoryStore::with_value("other_minify", true));
        let settings = Settings::with_key(store.clone(), "other_minify");

        assert!(settings.enabled());
        settings.set(false).unwrap();
        assert_eq!(store.get("other_minify"), Some(false));
        assert_eq!(store.get(CONFIG_KEY), None);
    }

    #[test]
    fn test_notice_when_enabled() {
        let (_, settings) = settings_with(MemoryStore::new());
        settings.set(true).unwrap();
        assert_eq!(settings.notice().as_deref(), Some("HTML Minify is now enabled."));
    }
}
