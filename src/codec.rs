use chrono::NaiveDate;
use serde_json::Value;

use crate::gateway::Gateway;
use crate::models::{State, Timestamp};
use crate::sanitize::{decode, DecodeError};
use crate::storage::{KeyValueStore, StorageError};

#[derive(Debug)]
pub enum ImportError {
    Parse(serde_json::Error),
    Invalid(DecodeError),
    Storage(StorageError),
}

impl std::fmt::Display for ImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportError::Parse(err) => write!(f, "invalid JSON: {err}"),
            ImportError::Invalid(err) => write!(f, "invalid data: {err}"),
            ImportError::Storage(err) => write!(f, "could not save imported data: {err}"),
        }
    }
}

impl std::error::Error for ImportError {}

impl From<serde_json::Error> for ImportError {
    fn from(value: serde_json::Error) -> Self {
        ImportError::Parse(value)
    }
}

impl From<DecodeError> for ImportError {
    fn from(value: DecodeError) -> Self {
        ImportError::Invalid(value)
    }
}

impl From<StorageError> for ImportError {
    fn from(value: StorageError) -> Self {
        ImportError::Storage(value)
    }
}

pub fn export_file_name(date: NaiveDate) -> String {
    format!("ont-backup-{}.json", date.format("%Y-%m-%d"))
}

pub fn encode(state: &State) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(state)
}

/// Serializes what is currently persisted, not what a session holds in memory.
pub async fn export_state<S: KeyValueStore>(gateway: &Gateway<S>) -> Result<String, serde_json::Error> {
    let state = gateway.load().await;
    encode(&state)
}

pub fn parse_import(text: &str, now: Timestamp) -> Result<State, ImportError> {
    let raw: Value = serde_json::from_str(text)?;
    Ok(decode(raw, now)?)
}

/// Validates, sanitizes and persists `text` as the new state. Nothing is written on failure.
pub async fn import_state<S: KeyValueStore>(
    gateway: &Gateway<S>,
    text: &str,
) -> Result<State, ImportError> {
    let mut state = parse_import(text, gateway.clock().now())?;
    gateway.save(&mut state).await?;
    log::info!(
        "codec: imported tasks={} projects={}",
        state.tasks.len(),
        state.projects.len()
    );
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::STORAGE_KEY;
    use crate::storage::MemoryStore;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::sync::Arc;

    fn gateway_with(value: Value) -> Gateway<MemoryStore> {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).single().unwrap(),
        ));
        Gateway::new(MemoryStore::with_entry(STORAGE_KEY, value), clock)
    }

    fn sample() -> Value {
        json!({
            "version": 1,
            "updatedAt": "2026-01-04T08:00:00.000Z",
            "settings": {
                "theme": "light",
                "showCompletedTasks": true,
                "countdown": { "label": "Exam", "targetIso": "2026-05-18T09:00:00.000Z" }
            },
            "tasks": [
                { "id": "t_1", "text": "Call mom", "createdAt": "2026-01-04T07:00:00.000Z", "completedAt": null, "order": -1000 },
                { "id": "t_0", "text": "Buy milk", "createdAt": "2026-01-04T06:00:00.000Z", "completedAt": "2026-01-04T07:30:00.000Z", "order": 0 }
            ],
            "projects": [
                { "id": "p_1", "name": "Launch week", "startDate": "2026-01-01", "endDate": "2026-01-10", "color": "#fdba74", "archivedAt": null }
            ]
        })
    }

    #[test]
    fn export_file_name_embeds_date() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        assert_eq!(export_file_name(date), "ont-backup-2026-03-07.json");
    }

    #[tokio::test]
    async fn export_is_pretty_json_of_persisted_state() {
        let gateway = gateway_with(sample());
        let text = export_state(&gateway).await.unwrap();
        assert!(text.contains('\n'));
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["tasks"][0]["text"], "Call mom");
        assert_eq!(value["settings"]["theme"], "light");
    }

    #[tokio::test]
    async fn import_of_export_leaves_state_unchanged() {
        let gateway = gateway_with(sample());
        let before = gateway.load().await;
        let text = export_state(&gateway).await.unwrap();
        import_state(&gateway, &text).await.unwrap();
        let mut after = gateway.load().await;
        // `save` restamps the record; everything else must match.
        after.updated_at = before.updated_at;
        assert_eq!(after, before);
    }

    #[tokio::test]
    async fn import_rejects_wrong_version_without_writing() {
        let gateway = gateway_with(sample());
        let before = gateway.store().raw(STORAGE_KEY);
        let err = import_state(&gateway, r#"{"version":2,"tasks":[]}"#)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ImportError::Invalid(DecodeError::VersionMismatch { .. })
        ));
        assert!(err.to_string().contains("version must be 1"));
        assert_eq!(gateway.store().raw(STORAGE_KEY), before);
        assert_eq!(gateway.store().writes(), 0);
    }

    #[tokio::test]
    async fn import_rejects_unparseable_text() {
        let gateway = gateway_with(sample());
        assert!(matches!(
            import_state(&gateway, "not json").await,
            Err(ImportError::Parse(_))
        ));
        assert!(matches!(
            import_state(&gateway, "[1,2,3]").await,
            Err(ImportError::Invalid(DecodeError::NotAnObject))
        ));
        assert_eq!(gateway.store().writes(), 0);
    }

    #[tokio::test]
    async fn import_sanitizes_before_saving() {
        let gateway = gateway_with(sample());
        let state = import_state(&gateway, r#"{"version":1,"tasks":"oops"}"#)
            .await
            .unwrap();
        assert!(state.tasks.is_empty());
        assert_eq!(state.settings.countdown.label, "Launch");
        assert_eq!(gateway.load().await, state);
    }

    #[tokio::test]
    async fn import_surfaces_write_failures() {
        let gateway = gateway_with(sample());
        gateway.store().set_fail_writes(true);
        assert!(matches!(
            import_state(&gateway, r#"{"version":1}"#).await,
            Err(ImportError::Storage(_))
        ));
    }
}
