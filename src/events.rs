use serde::Serialize;

use crate::models::{iso, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Loaded,
    TaskAdded,
    TaskToggled,
    TaskDeleted,
    ProjectAdded,
    ProjectEdited,
    ProjectDeleted,
    ProjectArchived,
    ProjectRestored,
    ProjectResized,
    SettingsChanged,
    Undone,
    Imported,
}

/// Published after each successful flush so a renderer knows to redraw.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateEvent {
    pub revision: u64,
    pub kind: ChangeKind,
    #[serde(with = "iso")]
    pub updated_at: Timestamp,
}
