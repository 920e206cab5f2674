//! Replication scenarios for the sync coordinator, driven by a manual clock
//! and an in-memory remote store.

use std::time::Duration;

use chrono::NaiveDate;
use goaltrack::database::LocalCache;
use goaltrack::metrics;
use goaltrack::models::{AppState, Category, Goal, Subtask, ThemeMode, Weight, WidgetKind};
use goaltrack::remote::MemoryRemoteStore;
use goaltrack::scheduler::ManualClock;
use goaltrack::sync::{MutationError, SyncCoordinator, SyncStatus};

const USER: &str = "user-1";
const DEBOUNCE: Duration = Duration::from_millis(600);

struct Harness {
    _dir: tempfile::TempDir,
    path: String,
    clock: ManualClock,
    remote: MemoryRemoteStore,
}

impl Harness {
    fn new(remote: MemoryRemoteStore) -> Self {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("cache.db").to_string_lossy().to_string();
        Self {
            _dir: dir,
            path,
            clock: ManualClock::new(),
            remote,
        }
    }

    fn local_cache(&self) -> LocalCache {
        LocalCache::new(&self.path).unwrap()
    }

    fn coordinator(&self) -> SyncCoordinator<ManualClock> {
        SyncCoordinator::with_clock(self.local_cache(), self.clock.clone(), DEBOUNCE)
            .with_remote(Box::new(self.remote.clone()), USER)
    }

    fn started(&self) -> SyncCoordinator<ManualClock> {
        let mut coord = self.coordinator();
        assert_eq!(coord.start(), SyncStatus::Ready);
        coord
    }
}

fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

#[test]
fn startup_seeds_remote_with_local_snapshot() {
    let h = Harness::new(MemoryRemoteStore::new());
    let mut local = AppState::seeded();
    local.theme = ThemeMode::Light;
    h.local_cache().save(&local).unwrap();

    let mut coord = h.coordinator();
    assert_eq!(coord.status(), SyncStatus::Loading);
    assert_eq!(coord.start(), SyncStatus::Ready);

    let upserts = h.remote.upserts();
    assert_eq!(upserts.len(), 1);
    assert_eq!(upserts[0].user_id, USER);
    assert_eq!(upserts[0].document, local);
    assert_eq!(coord.state(), &local);
    assert!(coord.initial_load_complete());
    assert!(!coord.push_pending());
}

#[test]
fn startup_adopts_remote_document() {
    let mut remote_doc = AppState::seeded();
    remote_doc.goals.truncate(1);
    remote_doc.notification.per_goal_enabled.clear();
    remote_doc.entry_mut_or_insert("2024-01-01").notes = "from the cloud".to_string();
    let h = Harness::new(MemoryRemoteStore::with_document(USER, remote_doc.clone()));

    let coord = h.started();

    assert_eq!(coord.state(), &remote_doc);
    assert_eq!(h.remote.upsert_count(), 0);
    assert_eq!(h.local_cache().load(), remote_doc);
}

#[test]
fn burst_of_mutations_is_pushed_once_with_latest_state() {
    let h = Harness::new(MemoryRemoteStore::new());
    let mut coord = h.started();
    let seeded_upserts = h.remote.upsert_count();

    for title in ["one", "two", "three", "four", "five"] {
        coord.upsert_goal(Goal::new(title, Category::Work)).unwrap();
        h.clock.advance(Duration::from_millis(100));
        assert!(!coord.tick());
    }

    h.clock.advance(Duration::from_millis(499));
    assert!(!coord.tick());
    assert_eq!(h.remote.upsert_count(), seeded_upserts);

    h.clock.advance(Duration::from_millis(1));
    assert!(coord.tick());

    let upserts = h.remote.upserts();
    assert_eq!(upserts.len(), seeded_upserts + 1);
    let pushed = &upserts.last().unwrap().document;
    assert_eq!(pushed, coord.state());
    assert_eq!(pushed.goals[0].title, "five");
    assert_eq!(coord.status(), SyncStatus::Ready);

    h.clock.advance(DEBOUNCE * 2);
    assert!(!coord.tick());
    assert_eq!(h.remote.upsert_count(), seeded_upserts + 1);
}

#[test]
fn mutations_are_cached_immediately() {
    let h = Harness::new(MemoryRemoteStore::new());
    let mut coord = h.started();

    coord.set_theme(ThemeMode::Light).unwrap();

    assert_eq!(h.local_cache().load().theme, ThemeMode::Light);
    assert!(coord.push_pending());
    assert_eq!(coord.time_until_push(), Some(DEBOUNCE));
}

#[test]
fn nothing_is_pushed_before_initial_load() {
    let h = Harness::new(MemoryRemoteStore::new());
    let mut coord = h.coordinator();

    coord.set_theme(ThemeMode::Light).unwrap();
    assert!(!coord.push_pending());
    h.clock.advance(DEBOUNCE);
    assert!(!coord.tick());
    assert_eq!(h.remote.upsert_count(), 0);
    assert_eq!(h.local_cache().load().theme, ThemeMode::Light);
}

#[test]
fn fetch_failure_keeps_local_state_and_blocks_pushes() {
    let h = Harness::new(MemoryRemoteStore::new());
    h.remote.fail_fetches(Some("network unreachable"));
    let local = AppState::seeded();
    h.local_cache().save(&local).unwrap();

    let mut coord = h.coordinator();
    assert_eq!(coord.start(), SyncStatus::Error);
    assert!(coord.last_error().unwrap().contains("network unreachable"));
    assert_eq!(coord.state(), &local);

    coord.set_theme(ThemeMode::Light).unwrap();
    assert!(!coord.push_pending());
    assert_eq!(h.remote.upsert_count(), 0);

    h.remote.fail_fetches(None);
    assert_eq!(coord.start(), SyncStatus::Ready);
    assert_eq!(coord.last_error(), None);
    assert_eq!(h.remote.upserts()[0].document.theme, ThemeMode::Light);
}

#[test]
fn seed_failure_reports_error() {
    let h = Harness::new(MemoryRemoteStore::new());
    h.remote.fail_upserts(Some("quota exceeded"));

    let mut coord = h.coordinator();
    assert_eq!(coord.start(), SyncStatus::Error);
    assert!(!coord.initial_load_complete());
    assert!(coord.last_error().unwrap().contains("quota exceeded"));
}

#[test]
fn push_failure_is_not_sticky() {
    let h = Harness::new(MemoryRemoteStore::new());
    let mut coord = h.started();
    h.remote.fail_upserts(Some("server busy"));

    coord.set_theme(ThemeMode::Light).unwrap();
    h.clock.advance(DEBOUNCE);
    assert!(coord.tick());
    assert_eq!(coord.status(), SyncStatus::Error);
    assert!(coord.last_error().unwrap().contains("server busy"));

    // No automatic retry
    h.clock.advance(DEBOUNCE * 3);
    assert!(!coord.tick());
    assert_eq!(coord.status(), SyncStatus::Error);

    h.remote.fail_upserts(None);
    coord.set_theme(ThemeMode::Dark).unwrap();
    h.clock.advance(DEBOUNCE);
    assert!(coord.tick());
    assert_eq!(coord.status(), SyncStatus::Ready);
    assert_eq!(coord.last_error(), None);
    assert_eq!(h.remote.document(USER).unwrap(), *coord.state());
}

#[test]
fn flush_sends_pending_push_immediately() {
    let h = Harness::new(MemoryRemoteStore::new());
    let mut coord = h.started();
    let before = h.remote.upsert_count();

    assert!(!coord.flush());
    coord.add_widget(WidgetKind::Streak).unwrap();
    assert!(coord.flush());

    assert_eq!(h.remote.upsert_count(), before + 1);
    assert!(!coord.push_pending());
}

#[test]
fn sign_out_drops_pending_push() {
    let h = Harness::new(MemoryRemoteStore::new());
    let mut coord = h.started();
    let before = h.remote.upsert_count();

    coord.set_theme(ThemeMode::Light).unwrap();
    let cache = coord.sign_out();
    h.clock.advance(DEBOUNCE * 2);

    assert_eq!(h.remote.upsert_count(), before);
    assert_eq!(cache.load().theme, ThemeMode::Light);
}

#[test]
fn unchanged_document_does_not_arm_push() {
    let h = Harness::new(MemoryRemoteStore::new());
    let mut coord = h.started();

    coord.set_theme(ThemeMode::Dark).unwrap();
    assert!(!coord.push_pending());
}

#[test]
fn reset_restores_seed_and_overwrites_remote() {
    let h = Harness::new(MemoryRemoteStore::new());
    let mut coord = h.started();
    coord.upsert_goal(Goal::new("Marathon", Category::Sport)).unwrap();
    coord.set_notes(day("2024-02-02"), "tired").unwrap();

    coord.reset();

    let state = coord.state().clone();
    assert_eq!(state.goals.len(), 2);
    assert!(state.entries.is_empty());
    assert_eq!(h.local_cache().load(), state);
    assert_eq!(h.remote.document(USER).unwrap(), state);
    assert!(!coord.push_pending());
    assert_eq!(coord.status(), SyncStatus::Ready);
}

#[test]
fn reset_ignores_remote_failure() {
    let h = Harness::new(MemoryRemoteStore::new());
    let mut coord = h.started();
    h.remote.fail_upserts(Some("offline"));

    coord.reset();

    assert_eq!(coord.status(), SyncStatus::Ready);
    assert_eq!(coord.last_error(), None);
    assert_eq!(h.local_cache().load(), *coord.state());
}

#[test]
fn goal_changes_keep_notification_map_in_step() {
    let h = Harness::new(MemoryRemoteStore::new());
    let mut coord = h.started();

    let goal = Goal::new("Read 12 books", Category::Personal);
    let id = goal.id.clone();
    coord.upsert_goal(goal).unwrap();
    assert_eq!(coord.state().notification.per_goal_enabled.get(&id), Some(&true));

    coord.set_goal_notification(&id, false).unwrap();
    assert_eq!(coord.state().notification.per_goal_enabled.get(&id), Some(&false));

    coord.remove_goal(&id).unwrap();
    let map = &coord.state().notification.per_goal_enabled;
    assert!(!map.contains_key(&id));
    assert_eq!(map.len(), coord.state().goals.len());
}

#[test]
fn toggle_check_builds_sorted_history() {
    let h = Harness::new(MemoryRemoteStore::new());
    let mut coord = h.started();
    let goal_id = coord.state().goals[0].id.clone();
    let hard = coord.state().goals[0].subtasks[0].id.clone();

    assert_eq!(coord.toggle_check(day("2024-03-03"), &goal_id, &hard), Ok(true));
    assert_eq!(coord.toggle_check(day("2024-03-01"), &goal_id, &hard), Ok(true));
    assert_eq!(coord.toggle_check(day("2024-03-03"), &goal_id, &hard), Ok(false));

    let dates: Vec<&str> = coord.state().entries.iter().map(|e| e.date.as_str()).collect();
    assert_eq!(dates, vec!["2024-03-01", "2024-03-03"]);
    assert_eq!(metrics::compute_total_xp(&coord.state().goals, &coord.state().entries), 20);

    coord.set_subtask_weight(&goal_id, &hard, Weight::Normal).unwrap();
    assert_eq!(metrics::compute_total_xp(&coord.state().goals, &coord.state().entries), 10);
}

#[test]
fn failed_mutation_leaves_document_untouched() {
    let h = Harness::new(MemoryRemoteStore::new());
    let mut coord = h.started();
    let before = coord.state().clone();

    assert_eq!(
        coord.toggle_check(day("2024-03-03"), "missing", "t"),
        Err(MutationError::GoalNotFound("missing".to_string()))
    );
    assert_eq!(
        coord.move_goal(0, 9),
        Err(MutationError::OutOfRange { index: 9, len: 2 })
    );
    assert_eq!(coord.state(), &before);
    assert!(!coord.push_pending());
}

#[test]
fn widgets_can_be_added_toggled_and_removed() {
    let h = Harness::new(MemoryRemoteStore::new());
    let mut coord = h.started();

    let id = coord.add_widget(WidgetKind::Chart).unwrap();
    coord.toggle_chart_type(&id).unwrap();
    let widget = coord.state().widgets.iter().find(|w| w.id == id).unwrap();
    assert_eq!(widget.chart_type, Some(goaltrack::models::ChartType::Bar));

    coord.move_widget(3, 0).unwrap();
    assert_eq!(coord.state().widgets[0].id, id);

    coord.remove_widget(&id).unwrap();
    assert_eq!(coord.state().widgets.len(), 3);
    assert!(matches!(
        coord.remove_widget(&id),
        Err(MutationError::WidgetNotFound(_))
    ));
}

#[test]
fn subtasks_can_be_added_and_removed() {
    let h = Harness::new(MemoryRemoteStore::new());
    let mut coord = h.started();
    let goal_id = coord.state().goals[1].id.clone();

    let task = Subtask::new("Follow-up email", Weight::Normal);
    let task_id = task.id.clone();
    coord.add_subtask(&goal_id, task).unwrap();
    assert_eq!(coord.state().goal(&goal_id).unwrap().subtasks.len(), 2);

    coord.remove_subtask(&goal_id, &task_id).unwrap();
    assert_eq!(coord.state().goal(&goal_id).unwrap().subtasks.len(), 1);
    assert_eq!(
        coord.remove_subtask(&goal_id, &task_id),
        Err(MutationError::SubtaskNotFound(task_id))
    );
}

#[test]
fn subtask_ids_stay_unique_within_a_goal() {
    let h = Harness::new(MemoryRemoteStore::new());
    let mut coord = h.started();
    let goal_id = coord.state().goals[1].id.clone();
    let existing = coord.state().goals[1].subtasks[0].id.clone();
    let before = coord.state().clone();

    let mut clash = Subtask::new("Second call", Weight::Normal);
    clash.id = existing.clone();
    assert_eq!(
        coord.add_subtask(&goal_id, clash.clone()),
        Err(MutationError::DuplicateSubtask(existing.clone()))
    );
    assert_eq!(coord.state(), &before);
    assert!(!coord.push_pending());

    let mut goal = Goal::new("Twins", Category::Work);
    goal.subtasks = vec![clash.clone(), clash];
    assert_eq!(
        coord.upsert_goal(goal),
        Err(MutationError::DuplicateSubtask(existing.clone()))
    );
    assert_eq!(coord.state(), &before);

    coord.toggle_check(day("2024-03-03"), &goal_id, &existing).unwrap();
    let summary = metrics::day_summary(&coord.state().goals, coord.state().entry("2024-03-03"));
    assert_eq!(summary, metrics::DaySummary { done: 1, total: 3, xp: 20 });
}

#[test]
fn reset_before_initial_load_still_overwrites_remote() {
    let mut remote_doc = AppState::seeded();
    remote_doc.goals.truncate(1);
    let h = Harness::new(MemoryRemoteStore::with_document(USER, remote_doc));
    let mut coord = h.coordinator();

    coord.reset();

    assert!(!coord.initial_load_complete());
    assert_eq!(coord.status(), SyncStatus::Loading);
    assert_eq!(h.remote.document(USER).unwrap(), *coord.state());
    assert_eq!(coord.state().goals.len(), 2);
}

#[test]
fn local_only_session_never_pushes() {
    let h = Harness::new(MemoryRemoteStore::new());
    let mut coord = SyncCoordinator::with_clock(h.local_cache(), h.clock.clone(), DEBOUNCE);

    assert_eq!(coord.start(), SyncStatus::Ready);
    coord.set_theme(ThemeMode::Light).unwrap();
    assert!(!coord.push_pending());
    assert!(!coord.has_remote());
    assert_eq!(h.local_cache().load().theme, ThemeMode::Light);
}
