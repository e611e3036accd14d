use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub type Timestamp = DateTime<Utc>;

pub const SCHEMA_VERSION: u32 = 1;
pub const STORAGE_KEY: &str = "ont_v1";

pub const DEFAULT_COUNTDOWN_LABEL: &str = "Launch";
pub const DEFAULT_COUNTDOWN_TARGET: &str = "2026-03-01T18:00:00.000Z";

/// Gap between the head task's `order` and a newly inserted task.
pub const ORDER_STEP: f64 = 1000.0;

pub const DEFAULT_PROJECT_COLOR: &str = "#7dd3fc";
pub const PROJECT_COLORS: [&str; 12] = [
    "#7dd3fc", "#93c5fd", "#a5b4fc", "#c4b5fd", "#f0abfc", "#fda4af", "#fca5a5", "#fdba74",
    "#fcd34d", "#bef264", "#86efac", "#5eead4",
];

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Returns the palette entry matching `color` (case-insensitive), normalized to lowercase.
pub fn palette_color(color: &str) -> Option<&'static str> {
    let wanted = color.trim().to_ascii_lowercase();
    PROJECT_COLORS.iter().copied().find(|c| *c == wanted)
}

/// Years a `YYYY-MM-DD` date can spell.
pub const MAX_YEAR: i32 = 9999;

/// Strict `YYYY-MM-DD`: four-digit year, no sign, no extra characters.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    let bytes = value.as_bytes();
    let shaped = bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !shaped {
        return None;
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .ok()
        .filter(|date| date_in_range(*date))
}

pub fn date_in_range(date: NaiveDate) -> bool {
    (0..=MAX_YEAR).contains(&date.year())
}

/// Builds an id like `t_m2x9k01`: base36 milliseconds followed by a base36 sequence number.
pub fn generate_id(prefix: &str, now: Timestamp, seq: u64) -> String {
    let millis = now.timestamp_millis().max(0) as u64;
    format!("{prefix}_{}{}", to_base36(millis), to_base36(seq))
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Millisecond-precision ISO-8601 instants (`2026-03-01T18:00:00.000Z`).
pub mod iso {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(value: &DateTime<Utc>) -> String {
        value.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn parse(value: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(value.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid instant: {raw}")))
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(dt) => serializer.serialize_str(&super::format(dt)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                None => Ok(None),
                Some(raw) => super::parse(&raw)
                    .map(Some)
                    .ok_or_else(|| serde::de::Error::custom(format!("invalid instant: {raw}"))),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dark" => Some(Self::Dark),
            "light" => Some(Self::Light),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dark => "dark",
            Self::Light => "light",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Countdown {
    pub label: String,
    #[serde(default, with = "iso::option")]
    pub target_iso: Option<Timestamp>,
}

impl Default for Countdown {
    fn default() -> Self {
        Self {
            label: DEFAULT_COUNTDOWN_LABEL.to_string(),
            target_iso: iso::parse(DEFAULT_COUNTDOWN_TARGET),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub theme: Theme,
    pub show_completed_tasks: bool,
    pub countdown: Countdown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub text: String,
    #[serde(with = "iso")]
    pub created_at: Timestamp,
    #[serde(default, with = "iso::option")]
    pub completed_at: Option<Timestamp>,
    #[serde(default)]
    pub order: f64,
}

impl Task {
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default, with = "iso::option")]
    pub archived_at: Option<Timestamp>,
}

impl Project {
    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }

    pub fn display_color(&self) -> &str {
        self.color.as_deref().unwrap_or(DEFAULT_PROJECT_COLOR)
    }
}

/// Raw project form input. Dates stay strings until `validate`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectDraft {
    pub name: String,
    pub start_date: String,
    pub end_date: String,
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidProject {
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub color: Option<String>,
}

impl ProjectDraft {
    pub fn new(name: &str, start_date: &str, end_date: &str) -> Self {
        Self {
            name: name.to_string(),
            start_date: start_date.to_string(),
            end_date: end_date.to_string(),
            color: None,
        }
    }

    pub fn with_color(mut self, color: &str) -> Self {
        self.color = Some(color.to_string());
        self
    }

    pub fn validate(&self) -> Result<ValidProject, ValidationError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyProjectName);
        }
        let start_date = parse_date(&self.start_date)
            .ok_or_else(|| ValidationError::InvalidDate(self.start_date.clone()))?;
        let end_date = parse_date(&self.end_date)
            .ok_or_else(|| ValidationError::InvalidDate(self.end_date.clone()))?;
        if start_date > end_date {
            return Err(ValidationError::DateOrder {
                start: start_date,
                end: end_date,
            });
        }
        let color = match self.color.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(
                palette_color(raw)
                    .ok_or_else(|| ValidationError::UnknownColor(raw.to_string()))?
                    .to_string(),
            ),
        };
        Ok(ValidProject {
            name: name.to_string(),
            start_date,
            end_date,
            color,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct State {
    pub version: u32,
    #[serde(with = "iso")]
    pub updated_at: Timestamp,
    pub settings: Settings,
    pub tasks: Vec<Task>,
    pub projects: Vec<Project>,
}

impl State {
    pub fn default_at(now: Timestamp) -> Self {
        Self {
            version: SCHEMA_VERSION,
            updated_at: now,
            settings: Settings::default(),
            tasks: Vec::new(),
            projects: Vec::new(),
        }
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn project(&self, id: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }

    /// `order` for a task inserted at the head of the list.
    pub fn next_head_order(&self) -> f64 {
        self.tasks
            .first()
            .map(|first| first.order - ORDER_STEP)
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> Timestamp {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).single().unwrap()
    }

    #[test]
    fn default_state_values() {
        let state = State::default_at(at(2026, 1, 5));
        assert_eq!(state.version, SCHEMA_VERSION);
        assert_eq!(state.updated_at, at(2026, 1, 5));
        assert_eq!(state.settings.theme, Theme::Dark);
        assert!(!state.settings.show_completed_tasks);
        assert_eq!(state.settings.countdown.label, "Launch");
        assert_eq!(
            state.settings.countdown.target_iso,
            Some(Utc.with_ymd_and_hms(2026, 3, 1, 18, 0, 0).single().unwrap())
        );
        assert!(state.tasks.is_empty());
        assert!(state.projects.is_empty());
    }

    #[test]
    fn state_serializes_with_camel_case_and_millisecond_instants() {
        let mut state = State::default_at(at(2026, 1, 5));
        state.tasks.push(Task {
            id: "t_1".into(),
            text: "Buy milk".into(),
            created_at: at(2026, 1, 5),
            completed_at: None,
            order: 0.0,
        });
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["version"], 1);
        assert_eq!(value["updatedAt"], "2026-01-05T12:00:00.000Z");
        assert_eq!(value["settings"]["theme"], "dark");
        assert_eq!(value["settings"]["showCompletedTasks"], false);
        assert_eq!(
            value["settings"]["countdown"]["targetIso"],
            "2026-03-01T18:00:00.000Z"
        );
        assert_eq!(value["tasks"][0]["createdAt"], "2026-01-05T12:00:00.000Z");
        assert!(value["tasks"][0]["completedAt"].is_null());

        let back: State = serde_json::from_value(value).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn project_dates_use_calendar_format() {
        let json = r##"{
          "id": "p_1",
          "name": "Launch week",
          "startDate": "2026-01-01",
          "endDate": "2026-01-10",
          "color": "#fda4af"
        }"##;
        let project: Project = serde_json::from_str(json).unwrap();
        assert_eq!(project.start_date, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        assert_eq!(project.archived_at, None);
        assert_eq!(project.display_color(), "#fda4af");

        let value = serde_json::to_value(&project).unwrap();
        assert_eq!(value["endDate"], "2026-01-10");
        assert!(value["archivedAt"].is_null());
    }

    #[test]
    fn draft_validation_rejects_bad_input() {
        assert_eq!(
            ProjectDraft::new("  ", "2026-01-01", "2026-01-02").validate(),
            Err(ValidationError::EmptyProjectName)
        );
        assert_eq!(
            ProjectDraft::new("x", "", "2026-01-02").validate(),
            Err(ValidationError::InvalidDate(String::new()))
        );
        assert!(matches!(
            ProjectDraft::new("x", "2026-01-02", "2026-01-01").validate(),
            Err(ValidationError::DateOrder { .. })
        ));
        assert_eq!(
            ProjectDraft::new("x", "2026-01-01", "2026-01-01")
                .with_color("#000000")
                .validate(),
            Err(ValidationError::UnknownColor("#000000".into()))
        );

        let ok = ProjectDraft::new(" Launch week ", "2026-01-01", "2026-01-01")
            .with_color("#7DD3FC")
            .validate()
            .unwrap();
        assert_eq!(ok.name, "Launch week");
        assert_eq!(ok.color.as_deref(), Some("#7dd3fc"));
    }

    #[test]
    fn parse_date_requires_strict_calendar_shape() {
        assert_eq!(
            parse_date(" 2026-03-07 "),
            NaiveDate::from_ymd_opt(2026, 3, 7)
        );
        assert_eq!(parse_date("9999-12-31"), NaiveDate::from_ymd_opt(9999, 12, 31));
        for raw in [
            "+262142-12-31",
            "-0001-01-01",
            "10000-01-01",
            "2026-3-7",
            "2026/03/07",
            "2026-02-30",
            "2026-03-07T00:00",
        ] {
            assert_eq!(parse_date(raw), None, "{raw}");
        }
        assert_eq!(
            ProjectDraft::new("x", "2026-01-01", "+262142-12-31").validate(),
            Err(ValidationError::InvalidDate("+262142-12-31".into()))
        );
    }

    #[test]
    fn head_order_steps_down_from_first_task() {
        let mut state = State::default_at(at(2026, 1, 5));
        assert_eq!(state.next_head_order(), 0.0);
        state.tasks.push(Task {
            id: "t_1".into(),
            text: "a".into(),
            created_at: at(2026, 1, 5),
            completed_at: None,
            order: -1000.0,
        });
        assert_eq!(state.next_head_order(), -2000.0);
    }

    #[test]
    fn generated_ids_carry_prefix_and_differ_by_sequence() {
        let now = at(2026, 1, 5);
        let a = generate_id("t", now, 1);
        let b = generate_id("t", now, 2);
        assert!(a.starts_with("t_"));
        assert_ne!(a, b);
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }
}
