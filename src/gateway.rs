use std::sync::Arc;

use crate::clock::Clock;
use crate::models::{State, STORAGE_KEY};
use crate::sanitize::decode;
use crate::storage::{KeyValueStore, StorageError};

/// Loads and saves the whole state record under one namespaced key.
pub struct Gateway<S> {
    store: S,
    clock: Arc<dyn Clock>,
    key: String,
}

impl<S: KeyValueStore> Gateway<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            key: STORAGE_KEY.to_string(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn defaults(&self) -> State {
        State::default_at(self.clock.now())
    }

    /// Never fails: read errors and unusable records yield the defaults.
    pub async fn load(&self) -> State {
        let now = self.clock.now();
        match self.store.get(&self.key).await {
            Ok(Some(raw)) => match decode(raw, now) {
                Ok(state) => {
                    log::debug!(
                        "gateway: loaded key={} tasks={} projects={}",
                        self.key,
                        state.tasks.len(),
                        state.projects.len()
                    );
                    state
                }
                Err(err) => {
                    log::warn!("gateway: ignoring stored record key={}: {err}", self.key);
                    State::default_at(now)
                }
            },
            Ok(None) => {
                log::info!("gateway: no record under key={}, using defaults", self.key);
                State::default_at(now)
            }
            Err(err) => {
                log::warn!("gateway: read failed key={}: {err}", self.key);
                State::default_at(now)
            }
        }
    }

    /// Stamps `updated_at` and overwrites the record.
    pub async fn save(&self, state: &mut State) -> Result<(), StorageError> {
        state.updated_at = self.clock.now();
        let value = serde_json::to_value(&*state)?;
        if let Err(err) = self.store.set(&self.key, &value).await {
            log::error!("gateway: write failed key={}: {err}", self.key);
            return Err(err);
        }
        log::debug!("gateway: saved key={}", self.key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::Theme;
    use crate::storage::MemoryStore;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).single().unwrap(),
        ))
    }

    #[tokio::test]
    async fn empty_store_loads_defaults() {
        let gateway = Gateway::new(MemoryStore::new(), clock());
        let state = gateway.load().await;
        assert!(state.tasks.is_empty());
        assert!(!state.settings.show_completed_tasks);
        assert_eq!(state.settings.countdown.label, "Launch");
    }

    #[tokio::test]
    async fn unusable_records_and_read_errors_load_defaults() {
        let gateway = Gateway::new(MemoryStore::with_entry(STORAGE_KEY, json!("junk")), clock());
        assert_eq!(gateway.load().await, gateway.defaults());

        let gateway = Gateway::new(
            MemoryStore::with_entry(STORAGE_KEY, json!({"version": 2, "tasks": []})),
            clock(),
        );
        assert_eq!(gateway.load().await, gateway.defaults());

        let store = MemoryStore::with_entry(
            STORAGE_KEY,
            json!({"version": 1, "settings": {"theme": "light"}}),
        );
        store.set_fail_reads(true);
        let gateway = Gateway::new(store, clock());
        assert_eq!(gateway.load().await.settings.theme, Theme::Dark);
    }

    #[tokio::test]
    async fn save_stamps_updated_at_and_writes_whole_record() {
        let clock = clock();
        let gateway = Gateway::new(MemoryStore::new(), clock.clone());
        let mut state = gateway.defaults();
        clock.advance(Duration::minutes(3));
        gateway.save(&mut state).await.unwrap();
        assert_eq!(state.updated_at, clock.now());

        let raw = gateway.store().raw(STORAGE_KEY).unwrap();
        assert_eq!(raw["updatedAt"], "2026-01-05T09:03:00.000Z");
        assert_eq!(gateway.load().await, state);
    }

    #[tokio::test]
    async fn save_propagates_write_errors() {
        let gateway = Gateway::new(MemoryStore::new(), clock());
        gateway.store().set_fail_writes(true);
        let mut state = gateway.defaults();
        assert!(gateway.save(&mut state).await.is_err());
        assert!(gateway.store().raw(STORAGE_KEY).is_none());
    }
}
