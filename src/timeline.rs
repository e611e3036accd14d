use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::error::ValidationError;
use crate::models::{date_in_range, Project};

const LEAD_DAYS: i64 = 14;
const TRAIL_DAYS: i64 = 60;
const START_PADDING_DAYS: i64 = 7;
const END_PADDING_DAYS: i64 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DragEdge {
    Start,
    End,
}

impl std::str::FromStr for DragEdge {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(Self::Start),
            "end" => Ok(Self::End),
            other => Err(format!("unknown edge {other:?}, expected start or end")),
        }
    }
}

/// An in-progress resize. Frames are relative to the dates at gesture start.
#[derive(Debug, Clone, PartialEq)]
pub struct DragGesture {
    pub project_id: String,
    pub edge: DragEdge,
    pub origin_start: NaiveDate,
    pub origin_end: NaiveDate,
}

impl DragGesture {
    pub fn begin(project: &Project, edge: DragEdge) -> Self {
        Self {
            project_id: project.id.clone(),
            edge,
            origin_start: project.start_date,
            origin_end: project.end_date,
        }
    }

    /// Moves one edge by `day_delta` from its origin. The other edge is a hard bound;
    /// a rejected frame leaves the project untouched.
    pub fn apply_frame(&self, project: &mut Project, day_delta: i64) -> Result<(), ValidationError> {
        match self.edge {
            DragEdge::Start => {
                let next = add_days(self.origin_start, day_delta)?;
                if next > project.end_date {
                    return Err(ValidationError::DateOrder {
                        start: next,
                        end: project.end_date,
                    });
                }
                project.start_date = next;
            }
            DragEdge::End => {
                let next = add_days(self.origin_end, day_delta)?;
                if next < project.start_date {
                    return Err(ValidationError::DateOrder {
                        start: project.start_date,
                        end: next,
                    });
                }
                project.end_date = next;
            }
        }
        Ok(())
    }

    pub fn restore(&self, project: &mut Project) {
        project.start_date = self.origin_start;
        project.end_date = self.origin_end;
    }
}

/// Shifts `date` by whole days. Results outside `YYYY-MM-DD` years are rejected.
pub fn add_days(date: NaiveDate, days: i64) -> Result<NaiveDate, ValidationError> {
    Duration::try_days(days)
        .and_then(|delta| date.checked_add_signed(delta))
        .filter(|shifted| date_in_range(*shifted))
        .ok_or_else(|| ValidationError::InvalidDate(format!("{date} {days:+} days")))
}

fn shift_saturating(date: NaiveDate, days: i64) -> NaiveDate {
    Duration::try_days(days)
        .and_then(|delta| date.checked_add_signed(delta))
        .unwrap_or(if days < 0 { NaiveDate::MIN } else { NaiveDate::MAX })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimelineRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl TimelineRange {
    pub fn len(&self) -> usize {
        ((self.to - self.from).num_days() + 1).max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Two weeks back to two months ahead of `today`, widened to fit every active project.
pub fn visible_range<'a>(
    projects: impl IntoIterator<Item = &'a Project>,
    today: NaiveDate,
) -> TimelineRange {
    let mut from = shift_saturating(today, -LEAD_DAYS);
    let mut to = shift_saturating(today, TRAIL_DAYS);
    for project in projects.into_iter().filter(|p| !p.is_archived()) {
        if project.start_date < from {
            from = shift_saturating(project.start_date, -START_PADDING_DAYS);
        }
        if project.end_date > to {
            to = shift_saturating(project.end_date, END_PADDING_DAYS);
        }
    }
    TimelineRange { from, to }
}
