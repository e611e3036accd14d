use std::collections::VecDeque;

use chrono::Duration;
use serde::Serialize;

use crate::models::{iso, Project, State, Task, Timestamp};

pub const UNDO_CAPACITY: usize = 20;
pub const UNDO_WINDOW_SECS: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UndoKind {
    Toggle,
    Delete,
    DeleteProject,
}

/// Inverse of one destructive mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum UndoRecord {
    Toggle {
        task_id: String,
        previous_completed_at: Option<Timestamp>,
    },
    Delete {
        task: Task,
        index: usize,
    },
    DeleteProject {
        project: Project,
        index: usize,
    },
}

impl UndoRecord {
    pub fn kind(&self) -> UndoKind {
        match self {
            UndoRecord::Toggle { .. } => UndoKind::Toggle,
            UndoRecord::Delete { .. } => UndoKind::Delete,
            UndoRecord::DeleteProject { .. } => UndoKind::DeleteProject,
        }
    }

    /// Applies the inverse. Returns false when the target no longer exists.
    pub fn apply(self, state: &mut State) -> bool {
        match self {
            UndoRecord::Toggle {
                task_id,
                previous_completed_at,
            } => match state.tasks.iter_mut().find(|t| t.id == task_id) {
                Some(task) => {
                    task.completed_at = previous_completed_at;
                    true
                }
                None => false,
            },
            UndoRecord::Delete { task, index } => {
                let at = index.min(state.tasks.len());
                state.tasks.insert(at, task);
                true
            }
            UndoRecord::DeleteProject { project, index } => {
                let at = index.min(state.projects.len());
                state.projects.insert(at, project);
                true
            }
        }
    }
}

/// Bounded stack; pushing past capacity evicts the oldest record.
#[derive(Debug, Clone)]
pub struct UndoLedger {
    records: VecDeque<UndoRecord>,
    capacity: usize,
}

impl UndoLedger {
    pub fn new() -> Self {
        Self::with_capacity(UNDO_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, record: UndoRecord) -> Option<UndoRecord> {
        let evicted = if self.records.len() >= self.capacity {
            self.records.pop_front()
        } else {
            None
        };
        self.records.push_back(record);
        evicted
    }

    pub fn pop(&mut self) -> Option<UndoRecord> {
        self.records.pop_back()
    }

    pub fn peek(&self) -> Option<&UndoRecord> {
        self.records.back()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

impl Default for UndoLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// Transient "Deleted …" message carrying the inline undo affordance.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoNotice {
    pub message: String,
    #[serde(with = "iso")]
    pub raised_at: Timestamp,
    #[serde(with = "iso")]
    pub expires_at: Timestamp,
}

impl UndoNotice {
    pub fn new(message: String, now: Timestamp) -> Self {
        Self {
            message,
            raised_at: now,
            expires_at: now + Duration::seconds(UNDO_WINDOW_SECS),
        }
    }

    pub fn is_live(&self, now: Timestamp) -> bool {
        now < self.expires_at
    }
}
