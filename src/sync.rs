//! Keeps the in-memory document, the local cache and the remote store in step.
//!
//! Every mutation is written to the local cache immediately and then pushed
//! to the remote store after a quiet period. The remote copy is replaced
//! wholesale on each push; there is no merging (last writer wins).

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::database::LocalCache;
use crate::models::{
    AppState, CategoryFilter, ChartType, Goal, NotificationSettings, Subtask, ThemeMode, Weight, Widget,
    WidgetKind, completion_key,
};
use crate::normalize::normalize;
use crate::remote::{RemoteError, RemoteStore};
use crate::scheduler::{Clock, Debouncer, SystemClock};
use crate::utils::format_date;

/// Quiet period before a mutation is pushed to the remote store
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(600);

/// Replication health as shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Loading,
    Ready,
    Saving,
    Error,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncStatus::Loading => "loading",
            SyncStatus::Ready => "ready",
            SyncStatus::Saving => "saving",
            SyncStatus::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MutationError {
    #[error("Goal not found: {0}")]
    GoalNotFound(String),
    #[error("Subtask not found: {0}")]
    SubtaskNotFound(String),
    #[error("Subtask id already used in this goal: {0}")]
    DuplicateSubtask(String),
    #[error("Widget not found: {0}")]
    WidgetNotFound(String),
    #[error("Position {index} is out of range for {len} items")]
    OutOfRange { index: usize, len: usize },
}

struct RemoteTier {
    store: Box<dyn RemoteStore>,
    user_id: String,
}

/// Sole owner of the mutable document for one session.
pub struct SyncCoordinator<C: Clock = SystemClock> {
    state: AppState,
    cache: LocalCache,
    remote: Option<RemoteTier>,
    clock: C,
    debouncer: Debouncer,
    status: SyncStatus,
    last_error: Option<String>,
    initial_load_complete: bool,
}

impl<C: Clock> SyncCoordinator<C> {
    /// Session without a remote tier. The document comes from the local cache.
    pub fn with_clock(cache: LocalCache, clock: C, debounce: Duration) -> Self {
        let state = cache.load();
        Self {
            state,
            cache,
            remote: None,
            clock,
            debouncer: Debouncer::new(debounce),
            status: SyncStatus::Ready,
            last_error: None,
            initial_load_complete: false,
        }
    }

    /// Attach the remote store for `user_id`. Call `start` afterwards.
    pub fn with_remote(mut self, store: Box<dyn RemoteStore>, user_id: impl Into<String>) -> Self {
        self.remote = Some(RemoteTier {
            store,
            user_id: user_id.into(),
        });
        self.status = SyncStatus::Loading;
        self
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn status(&self) -> SyncStatus {
        self.status
    }

    /// Message of the last failure, only while the status is `Error`
    pub fn last_error(&self) -> Option<&str> {
        match self.status {
            SyncStatus::Error => self.last_error.as_deref(),
            _ => None,
        }
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn initial_load_complete(&self) -> bool {
        self.initial_load_complete
    }

    pub fn push_pending(&self) -> bool {
        self.debouncer.is_armed()
    }

    /// Time until the pending push is due, if one is armed
    pub fn time_until_push(&self) -> Option<Duration> {
        self.debouncer.time_until_due(self.clock.now())
    }

    /// Startup handshake with the remote store.
    ///
    /// A remote document replaces the in-memory one unconditionally. With no
    /// remote document the current state is uploaded once to seed it. On
    /// failure the local state stays in place and no pushes are sent until a
    /// later `start` succeeds.
    pub fn start(&mut self) -> SyncStatus {
        let Some(tier) = &self.remote else {
            return self.status;
        };

        self.status = SyncStatus::Loading;
        self.last_error = None;

        let outcome = match tier.store.fetch(&tier.user_id) {
            Ok(Some(remote)) => {
                info!(user = %tier.user_id, "adopting remote state");
                Ok(Some(remote))
            }
            Ok(None) => {
                info!(user = %tier.user_id, "no remote state, seeding from local");
                tier.store
                    .upsert(&tier.user_id, &self.state, Utc::now())
                    .map(|()| None)
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(adopted) => {
                if let Some(remote) = adopted {
                    self.state = remote;
                    self.persist_local();
                }
                self.initial_load_complete = true;
                self.status = SyncStatus::Ready;
            }
            Err(e) => self.fail(&e),
        }
        self.status
    }

    /// Apply `f` to the document.
    ///
    /// On success the invariants are repaired, the local cache is written and
    /// a remote push is (re)armed. An error leaves the document untouched. A
    /// change that leaves the document identical neither saves nor pushes.
    pub fn mutate<T>(
        &mut self,
        f: impl FnOnce(&mut AppState) -> Result<T, MutationError>,
    ) -> Result<T, MutationError> {
        let before = self.state.clone();
        let value = match f(&mut self.state) {
            Ok(value) => value,
            Err(e) => {
                self.state = before;
                return Err(e);
            }
        };
        normalize(&mut self.state);

        if self.state != before {
            self.persist_local();
            self.schedule_push();
        }
        Ok(value)
    }

    /// Fire the pending push if its quiet period has elapsed.
    /// Returns true when a push was attempted.
    pub fn tick(&mut self) -> bool {
        if self.debouncer.fire_if_due(self.clock.now()) {
            self.push_now();
            true
        } else {
            false
        }
    }

    /// Send the pending push right away instead of waiting
    pub fn flush(&mut self) -> bool {
        if self.debouncer.cancel() {
            self.push_now();
            true
        } else {
            false
        }
    }

    /// End the session. The pending push is dropped so it can't land in a
    /// later session; the cache is handed back for reuse.
    pub fn sign_out(mut self) -> LocalCache {
        if self.debouncer.cancel() {
            debug!("dropped pending push on sign-out");
        }
        self.cache
    }

    /// Wipe local data back to the first-run document and overwrite the
    /// remote copy with it. The remote overwrite is best effort and runs even
    /// before the initial load has completed.
    pub fn reset(&mut self) {
        self.debouncer.cancel();
        self.state = match self.cache.clear() {
            Ok(()) => self.cache.load(),
            Err(e) => {
                warn!(error = %e, "failed to clear local cache");
                AppState::seeded()
            }
        };
        self.persist_local();

        if self.initial_load_complete {
            self.status = SyncStatus::Ready;
            self.last_error = None;
        }

        if let Some(tier) = &self.remote {
            if let Err(e) = tier.store.upsert(&tier.user_id, &self.state, Utc::now()) {
                warn!(error = %e, "remote overwrite after reset failed");
            }
        }
    }

    fn persist_local(&self) {
        if let Err(e) = self.cache.save(&self.state) {
            warn!(error = %e, "failed to write local cache");
        }
    }

    fn schedule_push(&mut self) {
        if self.remote.is_some() && self.initial_load_complete {
            self.debouncer.arm(self.clock.now());
            debug!(delay_ms = self.debouncer.delay().as_millis() as u64, "push armed");
        }
    }

    fn push_now(&mut self) {
        let Some(tier) = &self.remote else {
            return;
        };
        self.status = SyncStatus::Saving;
        self.last_error = None;

        match tier.store.upsert(&tier.user_id, &self.state, Utc::now()) {
            Ok(()) => {
                debug!(user = %tier.user_id, "remote state saved");
                self.status = SyncStatus::Ready;
            }
            Err(e) => self.fail(&e),
        }
    }

    fn fail(&mut self, err: &RemoteError) {
        warn!(error = %err, "remote sync failed");
        self.status = SyncStatus::Error;
        self.last_error = Some(err.to_string());
    }

    // Goals

    /// Insert a new goal at the front, or replace the goal with the same id.
    /// Subtask ids must be unique within the goal.
    pub fn upsert_goal(&mut self, goal: Goal) -> Result<(), MutationError> {
        if let Some(dup) = duplicate_subtask_id(&goal.subtasks) {
            return Err(MutationError::DuplicateSubtask(dup.to_string()));
        }
        self.mutate(|s| {
            match s.goals.iter().position(|g| g.id == goal.id) {
                Some(idx) => s.goals[idx] = goal,
                None => s.goals.insert(0, goal),
            }
            Ok(())
        })
    }

    /// Delete a goal with its subtasks; its notification toggle goes with it
    pub fn remove_goal(&mut self, goal_id: &str) -> Result<Goal, MutationError> {
        self.mutate(|s| {
            let idx = s
                .goals
                .iter()
                .position(|g| g.id == goal_id)
                .ok_or_else(|| MutationError::GoalNotFound(goal_id.to_string()))?;
            Ok(s.goals.remove(idx))
        })
    }

    pub fn move_goal(&mut self, from: usize, to: usize) -> Result<(), MutationError> {
        self.mutate(|s| move_item(&mut s.goals, from, to))
    }

    pub fn add_subtask(&mut self, goal_id: &str, subtask: Subtask) -> Result<(), MutationError> {
        self.mutate(|s| {
            let goal = s
                .goal_mut(goal_id)
                .ok_or_else(|| MutationError::GoalNotFound(goal_id.to_string()))?;
            if goal.subtasks.iter().any(|t| t.id == subtask.id) {
                return Err(MutationError::DuplicateSubtask(subtask.id));
            }
            goal.subtasks.push(subtask);
            Ok(())
        })
    }

    pub fn remove_subtask(&mut self, goal_id: &str, subtask_id: &str) -> Result<(), MutationError> {
        self.mutate(|s| {
            let goal = s
                .goal_mut(goal_id)
                .ok_or_else(|| MutationError::GoalNotFound(goal_id.to_string()))?;
            let before = goal.subtasks.len();
            goal.subtasks.retain(|t| t.id != subtask_id);
            if goal.subtasks.len() == before {
                return Err(MutationError::SubtaskNotFound(subtask_id.to_string()));
            }
            Ok(())
        })
    }

    /// Change a subtask's weight. Past checks are re-valued at the new weight.
    pub fn set_subtask_weight(
        &mut self,
        goal_id: &str,
        subtask_id: &str,
        weight: Weight,
    ) -> Result<(), MutationError> {
        self.mutate(|s| {
            let goal = s
                .goal_mut(goal_id)
                .ok_or_else(|| MutationError::GoalNotFound(goal_id.to_string()))?;
            let task = goal
                .subtasks
                .iter_mut()
                .find(|t| t.id == subtask_id)
                .ok_or_else(|| MutationError::SubtaskNotFound(subtask_id.to_string()))?;
            task.weight = weight;
            Ok(())
        })
    }

    // History

    /// Flip the completion flag of a subtask on `date`, creating the day's
    /// entry if needed. Returns the new flag.
    pub fn toggle_check(
        &mut self,
        date: NaiveDate,
        goal_id: &str,
        subtask_id: &str,
    ) -> Result<bool, MutationError> {
        self.mutate(|s| {
            let goal = s
                .goal(goal_id)
                .ok_or_else(|| MutationError::GoalNotFound(goal_id.to_string()))?;
            if !goal.subtasks.iter().any(|t| t.id == subtask_id) {
                return Err(MutationError::SubtaskNotFound(subtask_id.to_string()));
            }
            let key = completion_key(goal_id, subtask_id);
            let entry = s.entry_mut_or_insert(&format_date(date));
            let next = !entry.is_checked(&key);
            entry.checks.insert(key, next);
            Ok(next)
        })
    }

    pub fn set_notes(&mut self, date: NaiveDate, notes: impl Into<String>) -> Result<(), MutationError> {
        let notes = notes.into();
        self.mutate(|s| {
            s.entry_mut_or_insert(&format_date(date)).notes = notes;
            Ok(())
        })
    }

    // Widgets

    /// Append a widget and return its id
    pub fn add_widget(&mut self, kind: WidgetKind) -> Result<String, MutationError> {
        self.mutate(|s| {
            let widget = Widget::new(kind);
            let id = widget.id.clone();
            s.widgets.push(widget);
            Ok(id)
        })
    }

    pub fn remove_widget(&mut self, widget_id: &str) -> Result<(), MutationError> {
        self.mutate(|s| {
            let idx = s
                .widgets
                .iter()
                .position(|w| w.id == widget_id)
                .ok_or_else(|| MutationError::WidgetNotFound(widget_id.to_string()))?;
            s.widgets.remove(idx);
            Ok(())
        })
    }

    /// Switch a chart between line and bar
    pub fn toggle_chart_type(&mut self, widget_id: &str) -> Result<(), MutationError> {
        self.mutate(|s| {
            let widget = s
                .widgets
                .iter_mut()
                .find(|w| w.id == widget_id)
                .ok_or_else(|| MutationError::WidgetNotFound(widget_id.to_string()))?;
            widget.chart_type = Some(widget.chart_type.map_or(ChartType::Bar, ChartType::toggled));
            Ok(())
        })
    }

    pub fn move_widget(&mut self, from: usize, to: usize) -> Result<(), MutationError> {
        self.mutate(|s| move_item(&mut s.widgets, from, to))
    }

    // Settings

    pub fn set_theme(&mut self, theme: ThemeMode) -> Result<(), MutationError> {
        self.mutate(|s| {
            s.theme = theme;
            Ok(())
        })
    }

    pub fn set_category_filter(&mut self, filter: CategoryFilter) -> Result<(), MutationError> {
        self.mutate(|s| {
            s.admin_category_filter = filter;
            Ok(())
        })
    }

    pub fn set_notification(&mut self, settings: NotificationSettings) -> Result<(), MutationError> {
        self.mutate(|s| {
            s.notification = settings;
            Ok(())
        })
    }

    pub fn set_goal_notification(&mut self, goal_id: &str, enabled: bool) -> Result<(), MutationError> {
        self.mutate(|s| {
            if s.goal(goal_id).is_none() {
                return Err(MutationError::GoalNotFound(goal_id.to_string()));
            }
            s.notification.per_goal_enabled.insert(goal_id.to_string(), enabled);
            Ok(())
        })
    }
}

fn duplicate_subtask_id(subtasks: &[Subtask]) -> Option<&str> {
    let mut seen = HashSet::new();
    subtasks
        .iter()
        .map(|t| t.id.as_str())
        .find(|id| !seen.insert(*id))
}

fn move_item<T>(items: &mut Vec<T>, from: usize, to: usize) -> Result<(), MutationError> {
    let len = items.len();
    for index in [from, to] {
        if index >= len {
            return Err(MutationError::OutOfRange { index, len });
        }
    }
    let item = items.remove(from);
    items.insert(to, item);
    Ok(())
}
