//! Repairs the document's referential invariants after a mutation.
//!
//! Each pass reports whether it changed anything so callers can skip a
//! replication push when the document is already consistent.

use std::collections::HashSet;

use crate::models::{AppState, DailyEntry};

/// Run every repair pass. Returns `true` if the document changed.
pub fn normalize(state: &mut AppState) -> bool {
    let map_changed = normalize_notification_map(state);
    let entries_changed = normalize_entries(state);
    map_changed || entries_changed
}

/// Make the per-goal notification map's key set equal the goal id set.
///
/// Missing goals get an enabled entry, orphaned keys are dropped. Existing
/// values are left alone.
pub fn normalize_notification_map(state: &mut AppState) -> bool {
    let goal_ids: HashSet<&str> = state.goals.iter().map(|g| g.id.as_str()).collect();
    let map = &mut state.notification.per_goal_enabled;
    let mut changed = false;

    for goal in &state.goals {
        if !map.contains_key(&goal.id) {
            map.insert(goal.id.clone(), true);
            changed = true;
        }
    }

    let before = map.len();
    map.retain(|id, _| goal_ids.contains(id.as_str()));
    changed |= map.len() != before;

    changed
}

/// Keep entries sorted ascending by date with one entry per date.
///
/// Duplicate dates are folded into the first one: checks from later
/// duplicates win, notes are kept from the first non-empty one.
pub fn normalize_entries(state: &mut AppState) -> bool {
    let sorted = state.entries.windows(2).all(|w| w[0].date < w[1].date);
    if sorted {
        return false;
    }

    let mut entries = std::mem::take(&mut state.entries);
    entries.sort_by(|a, b| a.date.cmp(&b.date));

    let mut merged: Vec<DailyEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        match merged.last_mut() {
            Some(last) if last.date == entry.date => {
                last.checks.extend(entry.checks);
                if last.notes.is_empty() {
                    last.notes = entry.notes;
                }
            }
            _ => merged.push(entry),
        }
    }

    state.entries = merged;
    true
}
