use std::sync::{Mutex, MutexGuard};

use tokio::sync::watch;

use crate::codec;
use crate::countdown::{time_remaining, TimeRemaining};
use crate::error::{DashboardError, ValidationError};
use crate::events::{ChangeKind, StateEvent};
use crate::gateway::Gateway;
use crate::models::{
    generate_id, Countdown, Project, ProjectDraft, Settings, State, Task, Theme, Timestamp,
};
use crate::storage::KeyValueStore;
use crate::timeline::{visible_range, DragEdge, DragGesture, TimelineRange};
use crate::undo::{UndoKind, UndoLedger, UndoNotice, UndoRecord};

type FlushGuard<'a> = tokio::sync::MutexGuard<'a, ()>;

/// One page session over the persisted state.
///
/// Every mutation applies to memory before its first await and is then flushed through the
/// gateway. Flushing entry points are single-flight: while one flush is pending, the next
/// mutation fails with [`DashboardError::Busy`] and changes nothing.
pub struct Dashboard<S> {
    gateway: Gateway<S>,
    session: Mutex<Session>,
    flush_lock: tokio::sync::Mutex<()>,
    events: watch::Sender<StateEvent>,
}

#[derive(Debug)]
struct Session {
    state: State,
    selected_task: Option<String>,
    ledger: UndoLedger,
    notice: Option<UndoNotice>,
    drag: Option<DragGesture>,
    id_seq: u64,
    revision: u64,
}

impl Session {
    fn new(state: State) -> Self {
        Self {
            state,
            selected_task: None,
            ledger: UndoLedger::new(),
            notice: None,
            drag: None,
            id_seq: 0,
            revision: 0,
        }
    }

    fn reset(&mut self, state: State) {
        self.state = state;
        self.selected_task = None;
        self.ledger.clear();
        self.notice = None;
        self.drag = None;
        self.revision += 1;
    }

    fn next_id(&mut self, prefix: &str, now: Timestamp) -> String {
        loop {
            self.id_seq += 1;
            let id = generate_id(prefix, now, self.id_seq);
            let taken = self.state.tasks.iter().any(|t| t.id == id)
                || self.state.projects.iter().any(|p| p.id == id);
            if !taken {
                return id;
            }
        }
    }

    fn record(&mut self, record: UndoRecord) {
        if let Some(evicted) = self.ledger.push(record) {
            log::debug!("dashboard: undo ledger full, evicted {:?}", evicted.kind());
        }
    }

    fn task_index(&self, id: &str) -> Result<usize, DashboardError> {
        self.state
            .tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| DashboardError::NotFound(id.to_string()))
    }

    fn project_mut(&mut self, id: &str) -> Result<&mut Project, DashboardError> {
        self.state
            .projects
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| DashboardError::NotFound(id.to_string()))
    }
}

impl<S: KeyValueStore> Dashboard<S> {
    /// Loads the persisted state, as a page does on entry.
    pub async fn open(gateway: Gateway<S>) -> Self {
        let state = gateway.load().await;
        Self::with_state(gateway, state)
    }

    pub fn with_state(gateway: Gateway<S>, state: State) -> Self {
        let (events, _) = watch::channel(StateEvent {
            revision: 0,
            kind: ChangeKind::Loaded,
            updated_at: state.updated_at,
        });
        Self {
            gateway,
            session: Mutex::new(Session::new(state)),
            flush_lock: tokio::sync::Mutex::new(()),
            events,
        }
    }

    pub fn gateway(&self) -> &Gateway<S> {
        &self.gateway
    }

    fn now(&self) -> Timestamp {
        self.gateway.clock().now()
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().expect("state poisoned")
    }

    fn begin(&self) -> Result<FlushGuard<'_>, DashboardError> {
        self.flush_lock.try_lock().map_err(|_| {
            log::debug!("dashboard: rejected mutation while a flush is pending");
            DashboardError::Busy
        })
    }

    /// Writes the whole in-memory state. The guard is held until the write settles.
    async fn flush(&self, _guard: FlushGuard<'_>, kind: ChangeKind) -> Result<(), DashboardError> {
        let mut snapshot = self.session().state.clone();
        self.gateway.save(&mut snapshot).await?;
        let revision = {
            let mut session = self.session();
            session.state.updated_at = snapshot.updated_at;
            session.revision += 1;
            session.revision
        };
        self.events.send_replace(StateEvent {
            revision,
            kind,
            updated_at: snapshot.updated_at,
        });
        log::debug!("dashboard: flushed {kind:?} revision={revision}");
        Ok(())
    }

    fn replace_state(&self, state: State, kind: ChangeKind) {
        let updated_at = state.updated_at;
        let revision = {
            let mut session = self.session();
            session.reset(state);
            session.revision
        };
        self.events.send_replace(StateEvent {
            revision,
            kind,
            updated_at,
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<StateEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> State {
        self.session().state.clone()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.session().state.tasks.clone()
    }

    pub fn projects(&self) -> Vec<Project> {
        self.session().state.projects.clone()
    }

    pub fn settings(&self) -> Settings {
        self.session().state.settings.clone()
    }

    /// Tasks in display order; completed ones only when `show_completed_tasks` is set.
    pub fn visible_tasks(&self) -> Vec<Task> {
        let session = self.session();
        let show_completed = session.state.settings.show_completed_tasks;
        session
            .state
            .tasks
            .iter()
            .filter(|t| show_completed || !t.is_completed())
            .cloned()
            .collect()
    }

    pub fn active_projects(&self) -> Vec<Project> {
        self.session()
            .state
            .projects
            .iter()
            .filter(|p| !p.is_archived())
            .cloned()
            .collect()
    }

    pub fn timeline_range(&self) -> TimelineRange {
        let today = self.gateway.clock().today();
        visible_range(&self.session().state.projects, today)
    }

    pub fn countdown(&self) -> TimeRemaining {
        let target = self.session().state.settings.countdown.target_iso;
        time_remaining(target, self.now())
    }

    pub fn selected_task_id(&self) -> Option<String> {
        self.session().selected_task.clone()
    }

    pub fn select_task(&self, id: &str) -> Result<(), DashboardError> {
        let mut session = self.session();
        session.task_index(id)?;
        session.selected_task = Some(id.to_string());
        Ok(())
    }

    /// The undo notice while its window is open.
    pub fn notice(&self) -> Option<UndoNotice> {
        let now = self.now();
        let mut session = self.session();
        match &session.notice {
            Some(notice) if notice.is_live(now) => Some(notice.clone()),
            Some(_) => {
                session.notice = None;
                None
            }
            None => None,
        }
    }

    pub fn undo_depth(&self) -> usize {
        self.session().ledger.len()
    }

    /// What the next `undo` would revert.
    pub fn next_undo(&self) -> Option<UndoKind> {
        self.session().ledger.peek().map(UndoRecord::kind)
    }

    pub fn drag_gesture(&self) -> Option<DragGesture> {
        self.session().drag.clone()
    }

    pub async fn add_task(&self, text: &str) -> Result<Task, DashboardError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::EmptyTaskText.into());
        }
        let guard = self.begin()?;
        let now = self.now();
        let task = {
            let mut session = self.session();
            let task = Task {
                id: session.next_id("t", now),
                text: text.to_string(),
                created_at: now,
                completed_at: None,
                order: session.state.next_head_order(),
            };
            session.state.tasks.insert(0, task.clone());
            session.selected_task = Some(task.id.clone());
            task
        };
        self.flush(guard, ChangeKind::TaskAdded).await?;
        Ok(task)
    }

    pub async fn toggle_task(&self, id: &str) -> Result<Task, DashboardError> {
        let guard = self.begin()?;
        let now = self.now();
        let task = {
            let mut locked = self.session();
            let session = &mut *locked;
            let index = session.task_index(id)?;
            let task = &mut session.state.tasks[index];
            let previous = task.completed_at;
            task.completed_at = match previous {
                Some(_) => None,
                None => Some(now),
            };
            let task = task.clone();
            session.record(UndoRecord::Toggle {
                task_id: task.id.clone(),
                previous_completed_at: previous,
            });
            task
        };
        self.flush(guard, ChangeKind::TaskToggled).await?;
        Ok(task)
    }

    pub async fn delete_task(&self, id: &str) -> Result<Task, DashboardError> {
        let guard = self.begin()?;
        let now = self.now();
        let task = {
            let mut locked = self.session();
            let session = &mut *locked;
            let index = session.task_index(id)?;
            let task = session.state.tasks.remove(index);
            session.record(UndoRecord::Delete {
                task: task.clone(),
                index,
            });
            session.notice = Some(UndoNotice::new(format!("Deleted \"{}\"", task.text), now));
            if session.selected_task.as_deref() == Some(id) {
                session.selected_task = session
                    .state
                    .tasks
                    .get(index)
                    .or(session.state.tasks.last())
                    .map(|t| t.id.clone());
            }
            task
        };
        self.flush(guard, ChangeKind::TaskDeleted).await?;
        Ok(task)
    }

    pub async fn add_project(&self, draft: &ProjectDraft) -> Result<Project, DashboardError> {
        let valid = draft.validate()?;
        let guard = self.begin()?;
        let now = self.now();
        let project = {
            let mut session = self.session();
            let project = Project {
                id: session.next_id("p", now),
                name: valid.name,
                start_date: valid.start_date,
                end_date: valid.end_date,
                color: valid.color,
                archived_at: None,
            };
            session.state.projects.push(project.clone());
            project
        };
        self.flush(guard, ChangeKind::ProjectAdded).await?;
        Ok(project)
    }

    pub async fn edit_project(
        &self,
        id: &str,
        draft: &ProjectDraft,
    ) -> Result<Project, DashboardError> {
        let valid = draft.validate()?;
        let guard = self.begin()?;
        let project = {
            let mut session = self.session();
            let project = session.project_mut(id)?;
            project.name = valid.name;
            project.start_date = valid.start_date;
            project.end_date = valid.end_date;
            project.color = valid.color;
            project.clone()
        };
        self.flush(guard, ChangeKind::ProjectEdited).await?;
        Ok(project)
    }

    pub async fn delete_project(&self, id: &str) -> Result<Project, DashboardError> {
        let guard = self.begin()?;
        let now = self.now();
        let project = {
            let mut session = self.session();
            let index = session
                .state
                .projects
                .iter()
                .position(|p| p.id == id)
                .ok_or_else(|| DashboardError::NotFound(id.to_string()))?;
            let project = session.state.projects.remove(index);
            session.record(UndoRecord::DeleteProject {
                project: project.clone(),
                index,
            });
            session.notice = Some(UndoNotice::new(
                format!("Deleted \"{}\"", project.name),
                now,
            ));
            if session.drag.as_ref().map(|g| g.project_id.as_str()) == Some(id) {
                session.drag = None;
            }
            project
        };
        self.flush(guard, ChangeKind::ProjectDeleted).await?;
        Ok(project)
    }

    /// Soft delete: the project stays stored but leaves the active views.
    pub async fn archive_project(&self, id: &str) -> Result<Project, DashboardError> {
        let guard = self.begin()?;
        let now = self.now();
        let project = {
            let mut session = self.session();
            let project = session.project_mut(id)?;
            if project.archived_at.is_none() {
                project.archived_at = Some(now);
            }
            project.clone()
        };
        self.flush(guard, ChangeKind::ProjectArchived).await?;
        Ok(project)
    }

    pub async fn restore_project(&self, id: &str) -> Result<Project, DashboardError> {
        let guard = self.begin()?;
        let project = {
            let mut session = self.session();
            let project = session.project_mut(id)?;
            project.archived_at = None;
            project.clone()
        };
        self.flush(guard, ChangeKind::ProjectRestored).await?;
        Ok(project)
    }

    /// Starts a resize gesture. Frames stay in memory until [`Dashboard::end_drag`].
    /// A gesture that was never released is cancelled first.
    pub fn begin_drag(&self, id: &str, edge: DragEdge) -> Result<(), DashboardError> {
        let mut locked = self.session();
        let session = &mut *locked;
        session.project_mut(id)?;
        if let Some(previous) = session.drag.take() {
            if let Some(project) = session
                .state
                .projects
                .iter_mut()
                .find(|p| p.id == previous.project_id)
            {
                previous.restore(project);
            }
            log::debug!(
                "dashboard: cancelled unreleased drag on {}",
                previous.project_id
            );
        }
        let gesture = DragGesture::begin(session.project_mut(id)?, edge);
        session.drag = Some(gesture);
        Ok(())
    }

    /// Applies `day_delta` relative to the gesture origin. A frame that would cross the other
    /// edge is rejected and the last accepted dates stay.
    pub fn drag_frame(&self, day_delta: i64) -> Result<Project, DashboardError> {
        let mut locked = self.session();
        let session = &mut *locked;
        let gesture = session.drag.as_ref().ok_or(DashboardError::NoGesture)?;
        let project = session
            .state
            .projects
            .iter_mut()
            .find(|p| p.id == gesture.project_id)
            .ok_or_else(|| DashboardError::NotFound(gesture.project_id.clone()))?;
        gesture.apply_frame(project, day_delta)?;
        Ok(project.clone())
    }

    /// Ends the gesture with a single flush. `Ok(None)` when no gesture was open.
    pub async fn end_drag(&self) -> Result<Option<Project>, DashboardError> {
        let guard = self.begin()?;
        let project = {
            let mut session = self.session();
            let Some(gesture) = session.drag.take() else {
                return Ok(None);
            };
            session.state.project(&gesture.project_id).cloned()
        };
        let Some(project) = project else {
            return Ok(None);
        };
        self.flush(guard, ChangeKind::ProjectResized).await?;
        Ok(Some(project))
    }

    /// Drops the gesture and puts the original dates back. Nothing is flushed.
    pub fn cancel_drag(&self) -> Option<Project> {
        let mut locked = self.session();
        let session = &mut *locked;
        let gesture = session.drag.take()?;
        let project = session
            .state
            .projects
            .iter_mut()
            .find(|p| p.id == gesture.project_id)?;
        gesture.restore(project);
        Some(project.clone())
    }

    /// A whole resize gesture in one call.
    pub async fn drag_resize_project(
        &self,
        id: &str,
        edge: DragEdge,
        day_delta: i64,
    ) -> Result<Project, DashboardError> {
        let guard = self.begin()?;
        let project = {
            let mut session = self.session();
            let project = session.project_mut(id)?;
            DragGesture::begin(project, edge).apply_frame(project, day_delta)?;
            project.clone()
        };
        self.flush(guard, ChangeKind::ProjectResized).await?;
        Ok(project)
    }

    pub async fn set_theme(&self, theme: Theme) -> Result<Settings, DashboardError> {
        let guard = self.begin()?;
        let settings = {
            let mut session = self.session();
            session.state.settings.theme = theme;
            session.state.settings.clone()
        };
        self.flush(guard, ChangeKind::SettingsChanged).await?;
        Ok(settings)
    }

    pub async fn toggle_show_completed(&self) -> Result<bool, DashboardError> {
        let guard = self.begin()?;
        let show = {
            let mut session = self.session();
            let settings = &mut session.state.settings;
            settings.show_completed_tasks = !settings.show_completed_tasks;
            settings.show_completed_tasks
        };
        self.flush(guard, ChangeKind::SettingsChanged).await?;
        Ok(show)
    }

    pub async fn set_countdown(
        &self,
        label: &str,
        target: Option<Timestamp>,
    ) -> Result<Countdown, DashboardError> {
        let label = label.trim();
        if label.is_empty() {
            return Err(ValidationError::EmptyCountdownLabel.into());
        }
        let guard = self.begin()?;
        let countdown = {
            let mut session = self.session();
            session.state.settings.countdown = Countdown {
                label: label.to_string(),
                target_iso: target,
            };
            session.state.settings.countdown.clone()
        };
        self.flush(guard, ChangeKind::SettingsChanged).await?;
        Ok(countdown)
    }

    /// Reverts the newest ledger record. `Ok(None)` when there is nothing to undo.
    pub async fn undo(&self) -> Result<Option<UndoKind>, DashboardError> {
        let guard = self.begin()?;
        self.undo_with(guard).await
    }

    /// The notice's inline action: only works while the notice is live.
    pub async fn undo_from_notice(&self) -> Result<Option<UndoKind>, DashboardError> {
        let guard = self.begin()?;
        if self.notice().is_none() {
            return Ok(None);
        }
        self.undo_with(guard).await
    }

    async fn undo_with(&self, guard: FlushGuard<'_>) -> Result<Option<UndoKind>, DashboardError> {
        let kind = {
            let mut locked = self.session();
            let session = &mut *locked;
            let Some(record) = session.ledger.pop() else {
                return Ok(None);
            };
            let kind = record.kind();
            if !record.apply(&mut session.state) {
                log::info!("dashboard: undo {kind:?} target no longer exists");
            }
            session.notice = None;
            kind
        };
        self.flush(guard, ChangeKind::Undone).await?;
        Ok(Some(kind))
    }

    /// Re-reads the persisted record, discarding session-only state.
    pub async fn reload(&self) -> Result<State, DashboardError> {
        let _guard = self.begin()?;
        let state = self.gateway.load().await;
        self.replace_state(state.clone(), ChangeKind::Loaded);
        Ok(state)
    }

    pub async fn export_text(&self) -> Result<String, DashboardError> {
        codec::export_state(&self.gateway)
            .await
            .map_err(|err| DashboardError::Storage(err.into()))
    }

    /// Replaces everything with the imported state. Bypasses and clears the undo ledger.
    pub async fn import_text(&self, text: &str) -> Result<State, DashboardError> {
        let _guard = self.begin()?;
        let state = codec::import_state(&self.gateway, text).await?;
        self.replace_state(state.clone(), ChangeKind::Imported);
        Ok(state)
    }
}
