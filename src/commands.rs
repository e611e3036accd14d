use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveTime;
use serde::Serialize;

use crate::codec;
use crate::countdown::TimeRemaining;
use crate::dashboard::Dashboard;
use crate::error::{DashboardError, ValidationError};
use crate::models::{iso, parse_date, Project, ProjectDraft, Settings, Task, Theme, Timestamp};
use crate::storage::{KeyValueStore, StorageError};
use crate::timeline::{DragEdge, TimelineRange};
use crate::undo::{UndoKind, UndoNotice};

#[derive(Debug, serde::Serialize)]
pub struct CommandResult<T> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

pub fn ok<T>(data: T) -> CommandResult<T> {
    CommandResult {
        ok: true,
        data: Some(data),
        error: None,
    }
}

pub fn err<T>(message: &str) -> CommandResult<T> {
    CommandResult {
        ok: false,
        data: None,
        error: Some(message.to_string()),
    }
}

fn respond<T>(action: &str, result: Result<T, DashboardError>) -> CommandResult<T> {
    match result {
        Ok(data) => ok(data),
        Err(error) => {
            log::warn!("commands: {action} failed: {error}");
            err(&error.to_string())
        }
    }
}

/// Everything a page renders on entry.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub settings: Settings,
    pub tasks: Vec<Task>,
    pub projects: Vec<Project>,
    pub selected_task_id: Option<String>,
    pub timeline: TimelineRange,
    pub countdown: CountdownView,
    pub notice: Option<UndoNotice>,
    pub undo_depth: usize,
    pub next_undo: Option<UndoKind>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountdownView {
    pub label: String,
    #[serde(with = "iso::option")]
    pub target_iso: Option<Timestamp>,
    pub remaining: TimeRemaining,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ImportSummary {
    pub tasks: usize,
    pub projects: usize,
}

/// Partial project edit. Missing fields keep the current value.
#[derive(Debug, Clone, Default)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub color: Option<String>,
    pub clear_color: bool,
}

pub fn overview_impl<S: KeyValueStore>(dash: &Dashboard<S>) -> CommandResult<Overview> {
    ok(Overview {
        settings: dash.settings(),
        tasks: dash.visible_tasks(),
        projects: dash.active_projects(),
        selected_task_id: dash.selected_task_id(),
        timeline: dash.timeline_range(),
        countdown: countdown_view(dash),
        notice: dash.notice(),
        undo_depth: dash.undo_depth(),
        next_undo: dash.next_undo(),
    })
}

fn countdown_view<S: KeyValueStore>(dash: &Dashboard<S>) -> CountdownView {
    let countdown = dash.settings().countdown;
    CountdownView {
        label: countdown.label,
        target_iso: countdown.target_iso,
        remaining: dash.countdown(),
    }
}

pub fn countdown_impl<S: KeyValueStore>(dash: &Dashboard<S>) -> CommandResult<CountdownView> {
    ok(countdown_view(dash))
}

pub async fn add_task_impl<S: KeyValueStore>(dash: &Dashboard<S>, text: &str) -> CommandResult<Task> {
    respond("add_task", dash.add_task(text).await)
}

pub async fn toggle_task_impl<S: KeyValueStore>(dash: &Dashboard<S>, id: &str) -> CommandResult<Task> {
    respond("toggle_task", dash.toggle_task(id).await)
}

pub async fn delete_task_impl<S: KeyValueStore>(dash: &Dashboard<S>, id: &str) -> CommandResult<Task> {
    respond("delete_task", dash.delete_task(id).await)
}

pub async fn add_project_impl<S: KeyValueStore>(
    dash: &Dashboard<S>,
    draft: ProjectDraft,
) -> CommandResult<Project> {
    respond("add_project", dash.add_project(&draft).await)
}

pub async fn edit_project_impl<S: KeyValueStore>(
    dash: &Dashboard<S>,
    id: &str,
    patch: ProjectPatch,
) -> CommandResult<Project> {
    let Some(current) = dash.projects().into_iter().find(|p| p.id == id) else {
        return respond("edit_project", Err(DashboardError::NotFound(id.to_string())));
    };
    respond("edit_project", dash.edit_project(id, &merge_patch(&current, patch)).await)
}

fn merge_patch(current: &Project, patch: ProjectPatch) -> ProjectDraft {
    let color = if patch.clear_color {
        None
    } else {
        patch.color.or_else(|| current.color.clone())
    };
    ProjectDraft {
        name: patch.name.unwrap_or_else(|| current.name.clone()),
        start_date: patch
            .start_date
            .unwrap_or_else(|| current.start_date.to_string()),
        end_date: patch
            .end_date
            .unwrap_or_else(|| current.end_date.to_string()),
        color,
    }
}

pub async fn delete_project_impl<S: KeyValueStore>(
    dash: &Dashboard<S>,
    id: &str,
) -> CommandResult<Project> {
    respond("delete_project", dash.delete_project(id).await)
}

pub async fn archive_project_impl<S: KeyValueStore>(
    dash: &Dashboard<S>,
    id: &str,
    restore: bool,
) -> CommandResult<Project> {
    if restore {
        respond("restore_project", dash.restore_project(id).await)
    } else {
        respond("archive_project", dash.archive_project(id).await)
    }
}

pub async fn resize_project_impl<S: KeyValueStore>(
    dash: &Dashboard<S>,
    id: &str,
    edge: DragEdge,
    day_delta: i64,
) -> CommandResult<Project> {
    respond(
        "resize_project",
        dash.drag_resize_project(id, edge, day_delta).await,
    )
}

pub async fn set_theme_impl<S: KeyValueStore>(dash: &Dashboard<S>, theme: &str) -> CommandResult<Settings> {
    let Some(theme) = Theme::parse(theme) else {
        return err(&format!("unknown theme {theme:?}, expected dark or light"));
    };
    respond("set_theme", dash.set_theme(theme).await)
}

pub async fn toggle_show_completed_impl<S: KeyValueStore>(dash: &Dashboard<S>) -> CommandResult<bool> {
    respond("toggle_show_completed", dash.toggle_show_completed().await)
}

pub async fn set_countdown_impl<S: KeyValueStore>(
    dash: &Dashboard<S>,
    label: &str,
    target: Option<&str>,
) -> CommandResult<CountdownView> {
    let target = match target.map(parse_countdown_target).transpose() {
        Ok(target) => target,
        Err(error) => return respond("set_countdown", Err(error.into())),
    };
    match dash.set_countdown(label, target).await {
        Ok(_) => ok(countdown_view(dash)),
        Err(error) => respond("set_countdown", Err(error)),
    }
}

/// Accepts an ISO-8601 instant or a calendar date, which means midnight UTC.
pub fn parse_countdown_target(value: &str) -> Result<Timestamp, ValidationError> {
    let value = value.trim();
    if let Some(instant) = iso::parse(value) {
        return Ok(instant);
    }
    parse_date(value)
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
        .ok_or_else(|| ValidationError::InvalidDate(value.to_string()))
}

pub async fn undo_impl<S: KeyValueStore>(dash: &Dashboard<S>) -> CommandResult<Option<UndoKind>> {
    respond("undo", dash.undo().await)
}

pub async fn undo_from_notice_impl<S: KeyValueStore>(
    dash: &Dashboard<S>,
) -> CommandResult<Option<UndoKind>> {
    respond("undo_from_notice", dash.undo_from_notice().await)
}

pub fn select_task_impl<S: KeyValueStore>(dash: &Dashboard<S>, id: &str) -> CommandResult<String> {
    respond("select_task", dash.select_task(id).map(|_| id.to_string()))
}

pub async fn reload_impl<S: KeyValueStore>(dash: &Dashboard<S>) -> CommandResult<Overview> {
    match dash.reload().await {
        Ok(_) => overview_impl(dash),
        Err(error) => respond("reload", Err(error)),
    }
}

pub fn begin_drag_impl<S: KeyValueStore>(
    dash: &Dashboard<S>,
    id: &str,
    edge: DragEdge,
) -> CommandResult<bool> {
    respond("begin_drag", dash.begin_drag(id, edge).map(|_| true))
}

pub fn drag_frame_impl<S: KeyValueStore>(dash: &Dashboard<S>, day_delta: i64) -> CommandResult<Project> {
    respond("drag_frame", dash.drag_frame(day_delta))
}

pub async fn end_drag_impl<S: KeyValueStore>(dash: &Dashboard<S>) -> CommandResult<Option<Project>> {
    respond("end_drag", dash.end_drag().await)
}

pub fn cancel_drag_impl<S: KeyValueStore>(dash: &Dashboard<S>) -> CommandResult<Option<Project>> {
    ok(dash.cancel_drag())
}

fn write_atomic_bytes(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let tmp = path.with_extension("tmp");
    fs::create_dir_all(
        path.parent()
            .ok_or_else(|| StorageError::Io(std::io::Error::other("invalid export path")))?,
    )?;
    fs::write(&tmp, bytes)?;
    fs::rename(tmp, path)?;
    Ok(())
}

/// Writes the persisted state to `<dir>/ont-backup-YYYY-MM-DD.json` and returns the path.
pub async fn export_to_dir_impl<S: KeyValueStore>(
    dash: &Dashboard<S>,
    dir: &Path,
) -> CommandResult<String> {
    let text = match dash.export_text().await {
        Ok(text) => text,
        Err(error) => return respond("export", Err(error)),
    };
    let path: PathBuf = dir.join(codec::export_file_name(dash.gateway().clock().today()));
    if let Err(error) = write_atomic_bytes(&path, text.as_bytes()) {
        log::warn!("commands: export failed path={} err={error}", path.display());
        return err(&format!("export error: {error}"));
    }
    log::info!("commands: exported path={}", path.display());
    ok(path.to_string_lossy().to_string())
}

pub async fn import_from_path_impl<S: KeyValueStore>(
    dash: &Dashboard<S>,
    path: &Path,
) -> CommandResult<ImportSummary> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(error) => {
            log::warn!("commands: import read failed path={} err={error}", path.display());
            return err(&format!("import error: {error}"));
        }
    };
    respond(
        "import",
        dash.import_text(&text).await.map(|state| ImportSummary {
            tasks: state.tasks.len(),
            projects: state.projects.len(),
        }),
    )
}

/// Splits a session line into arguments. Single or double quotes group words.
pub fn split_command_line(line: &str) -> Result<Vec<String>, String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();
    while let Some(ch) = chars.next() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), '\\') => match chars.next() {
                Some(next) => current.push(next),
                None => return Err("trailing backslash".to_string()),
            },
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(ch);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    args.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if quote.is_some() {
        return Err("unterminated quote".to_string());
    }
    if in_word {
        args.push(current);
    }
    Ok(args)
}
