//! Schema validation and defensive reconstruction of stored or imported records.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::models::{
    date_in_range, iso, palette_color, Countdown, Project, Settings, State, Task, Theme, Timestamp,
    SCHEMA_VERSION,
};

#[derive(Debug, Clone, PartialEq)]
pub enum DecodeError {
    NotAnObject,
    VersionMismatch { found: Option<Value> },
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::NotAnObject => write!(f, "data must be a JSON object"),
            DecodeError::VersionMismatch { found: Some(found) } => {
                write!(f, "version must be {SCHEMA_VERSION}, found {found}")
            }
            DecodeError::VersionMismatch { found: None } => {
                write!(f, "version must be {SCHEMA_VERSION}, found none")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Accepts an object carrying the supported `version`, then sanitizes it.
pub fn decode(raw: Value, now: Timestamp) -> Result<State, DecodeError> {
    let Value::Object(map) = raw else {
        return Err(DecodeError::NotAnObject);
    };
    match map.get("version") {
        Some(version) if version.as_f64() == Some(f64::from(SCHEMA_VERSION)) => {}
        other => {
            return Err(DecodeError::VersionMismatch {
                found: other.cloned(),
            })
        }
    }
    Ok(sanitize(&map, now))
}

/// Rebuilds a `State` from a raw record. Well-shaped raw values win; anything missing or
/// ill-typed falls back to the defaults.
pub fn sanitize(raw: &Map<String, Value>, now: Timestamp) -> State {
    let defaults = State::default_at(now);

    let updated_at = raw
        .get("updatedAt")
        .and_then(Value::as_str)
        .and_then(iso::parse)
        .unwrap_or(defaults.updated_at);

    let settings = match raw.get("settings") {
        Some(Value::Object(settings)) => sanitize_settings(settings, defaults.settings),
        _ => defaults.settings,
    };

    let tasks = match raw.get("tasks") {
        Some(Value::Array(items)) => sanitize_tasks(items),
        _ => defaults.tasks,
    };

    let projects = match raw.get("projects") {
        Some(Value::Array(items)) => sanitize_projects(items),
        _ => defaults.projects,
    };

    State {
        version: SCHEMA_VERSION,
        updated_at,
        settings,
        tasks,
        projects,
    }
}

fn sanitize_settings(raw: &Map<String, Value>, defaults: Settings) -> Settings {
    let theme = raw
        .get("theme")
        .and_then(Value::as_str)
        .and_then(Theme::parse)
        .unwrap_or(defaults.theme);
    let show_completed_tasks = raw
        .get("showCompletedTasks")
        .and_then(Value::as_bool)
        .unwrap_or(defaults.show_completed_tasks);
    let countdown = match raw.get("countdown") {
        Some(Value::Object(countdown)) => sanitize_countdown(countdown, defaults.countdown),
        _ => defaults.countdown,
    };
    Settings {
        theme,
        show_completed_tasks,
        countdown,
    }
}

fn sanitize_countdown(raw: &Map<String, Value>, defaults: Countdown) -> Countdown {
    let label = raw
        .get("label")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or(defaults.label);
    let target_iso = match raw.get("targetIso") {
        Some(Value::Null) => None,
        Some(Value::String(value)) => match iso::parse(value) {
            Some(target) => Some(target),
            None => defaults.target_iso,
        },
        _ => defaults.target_iso,
    };
    Countdown { label, target_iso }
}

fn sanitize_tasks(items: &[Value]) -> Vec<Task> {
    let mut seen = HashSet::new();
    let mut tasks = Vec::with_capacity(items.len());
    for item in items {
        let task: Task = match serde_json::from_value(item.clone()) {
            Ok(task) => task,
            Err(err) => {
                log::warn!("sanitize: dropping malformed task: {err}");
                continue;
            }
        };
        if task.text.trim().is_empty() {
            log::warn!("sanitize: dropping task {} with empty text", task.id);
            continue;
        }
        if !seen.insert(task.id.clone()) {
            log::warn!("sanitize: dropping duplicate task id {}", task.id);
            continue;
        }
        tasks.push(task);
    }
    tasks
}

fn sanitize_projects(items: &[Value]) -> Vec<Project> {
    let mut seen = HashSet::new();
    let mut projects = Vec::with_capacity(items.len());
    for item in items {
        let mut project: Project = match serde_json::from_value(item.clone()) {
            Ok(project) => project,
            Err(err) => {
                log::warn!("sanitize: dropping malformed project: {err}");
                continue;
            }
        };
        if project.name.trim().is_empty()
            || project.start_date > project.end_date
            || !date_in_range(project.start_date)
            || !date_in_range(project.end_date)
        {
            log::warn!("sanitize: dropping invalid project {}", project.id);
            continue;
        }
        if !seen.insert(project.id.clone()) {
            log::warn!("sanitize: dropping duplicate project id {}", project.id);
            continue;
        }
        project.color = project
            .color
            .as_deref()
            .and_then(palette_color)
            .map(str::to_string);
        projects.push(project);
    }
    projects
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use serde_json::json;

    fn now() -> Timestamp {
        Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).single().unwrap()
    }

    #[test]
    fn decode_rejects_non_objects_and_wrong_versions() {
        assert_eq!(decode(json!([1, 2]), now()), Err(DecodeError::NotAnObject));
        assert_eq!(decode(json!("x"), now()), Err(DecodeError::NotAnObject));
        assert_eq!(
            decode(json!({"version": 2}), now()),
            Err(DecodeError::VersionMismatch {
                found: Some(json!(2))
            })
        );
        assert_eq!(
            decode(json!({"tasks": []}), now()),
            Err(DecodeError::VersionMismatch { found: None })
        );
        assert_eq!(
            DecodeError::VersionMismatch {
                found: Some(json!(2))
            }
            .to_string(),
            "version must be 1, found 2"
        );
    }

    #[test]
    fn bare_version_record_fills_every_field_from_defaults() {
        let state = decode(json!({"version": 1}), now()).unwrap();
        assert_eq!(state, State::default_at(now()));
    }

    #[test]
    fn settings_merge_keeps_well_shaped_values() {
        let raw = json!({
            "version": 1,
            "updatedAt": "2025-12-31T23:59:59.000Z",
            "settings": {
                "theme": "light",
                "showCompletedTasks": "yes",
                "countdown": { "label": "Exam" }
            }
        });
        let state = decode(raw, now()).unwrap();
        assert_eq!(
            state.updated_at,
            Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 59).single().unwrap()
        );
        assert_eq!(state.settings.theme, Theme::Light);
        assert!(!state.settings.show_completed_tasks);
        assert_eq!(state.settings.countdown.label, "Exam");
        assert_eq!(
            state.settings.countdown.target_iso,
            Countdown::default().target_iso
        );
    }

    #[test]
    fn countdown_target_may_be_cleared() {
        let raw = json!({
            "version": 1,
            "settings": { "countdown": { "label": "Open", "targetIso": null } }
        });
        let state = decode(raw, now()).unwrap();
        assert_eq!(state.settings.countdown.target_iso, None);

        let raw = json!({
            "version": 1,
            "settings": { "theme": "sepia", "countdown": { "targetIso": "soon" } }
        });
        let state = decode(raw, now()).unwrap();
        assert_eq!(state.settings.theme, Theme::Dark);
        assert_eq!(
            state.settings.countdown.target_iso,
            Countdown::default().target_iso
        );
    }

    #[test]
    fn non_sequence_collections_become_empty() {
        let raw = json!({"version": 1, "tasks": {"a": 1}, "projects": "none"});
        let state = decode(raw, now()).unwrap();
        assert!(state.tasks.is_empty());
        assert!(state.projects.is_empty());
    }

    #[test]
    fn invalid_entities_are_dropped_and_order_is_kept() {
        let raw = json!({
            "version": 1,
            "tasks": [
                {"id": "t_b", "text": "second", "createdAt": "2026-01-02T00:00:00.000Z", "completedAt": null, "order": -1000},
                {"id": "t_x", "text": "   ", "createdAt": "2026-01-02T00:00:00.000Z"},
                {"id": "t_a", "text": "first", "createdAt": "2026-01-01T00:00:00.000Z", "completedAt": "2026-01-03T00:00:00.000Z", "order": 0},
                {"id": "t_a", "text": "dup", "createdAt": "2026-01-01T00:00:00.000Z"},
                {"text": "no id"}
            ],
            "projects": [
                {"id": "p_1", "name": "ok", "startDate": "2026-01-01", "endDate": "2026-01-10", "color": "#86EFAC"},
                {"id": "p_2", "name": "reversed", "startDate": "2026-02-01", "endDate": "2026-01-10"},
                {"id": "p_3", "name": "odd color", "startDate": "2026-01-01", "endDate": "2026-01-01", "color": "red"}
            ]
        });
        let state = decode(raw, now()).unwrap();
        let ids: Vec<_> = state.tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t_b", "t_a"]);
        assert!(state.tasks[1].is_completed());

        let ids: Vec<_> = state.projects.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p_1", "p_3"]);
        assert_eq!(state.projects[0].color.as_deref(), Some("#86efac"));
        assert_eq!(state.projects[1].color, None);
        assert_eq!(
            state.projects[1].end_date,
            NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
        );
    }

    #[test]
    fn projects_with_unrepresentable_dates_are_dropped() {
        let raw = json!({
            "version": 1,
            "projects": [
                {"id": "p_far", "name": "far", "startDate": "2026-01-01", "endDate": "+262142-12-31"},
                {"id": "p_old", "name": "old", "startDate": "-0500-01-01", "endDate": "2026-01-01"},
                {"id": "p_ok", "name": "ok", "startDate": "9999-12-01", "endDate": "9999-12-31"}
            ]
        });
        let state = decode(raw, now()).unwrap();
        let ids: Vec<_> = state.projects.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p_ok"]);
    }
}
