//! Local cache persistence and first-run fallback.

use goaltrack::database::LocalCache;
use goaltrack::models::{AppState, ThemeMode};

fn cache_path(dir: &tempfile::TempDir) -> String {
    dir.path().join("data").join("cache.db").to_string_lossy().to_string()
}

#[test]
fn empty_cache_loads_seeded_document() {
    let cache = LocalCache::in_memory().unwrap();
    let state = cache.load();

    assert_eq!(state.goals.len(), 2);
    assert_eq!(state.widgets.len(), 3);
    assert!(state.entries.is_empty());
    assert!(cache.last_updated().unwrap().is_none());
}

#[test]
fn saved_document_survives_reopen() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = cache_path(&dir);

    let mut state = AppState::seeded();
    state.theme = ThemeMode::Light;
    state.entry_mut_or_insert("2024-06-01").notes = "good day".to_string();
    {
        let cache = LocalCache::new(&path).unwrap();
        cache.save(&state).unwrap();
    }

    let reopened = LocalCache::new(&path).unwrap();
    assert_eq!(reopened.load(), state);
    assert!(reopened.last_updated().unwrap().is_some());
}

#[test]
fn save_replaces_previous_document() {
    let cache = LocalCache::in_memory().unwrap();
    let first = AppState::seeded();
    let mut second = first.clone();
    second.goals.truncate(1);

    cache.save(&first).unwrap();
    cache.save(&second).unwrap();

    assert_eq!(cache.load(), second);
}

#[test]
fn corrupt_document_falls_back_to_seed() {
    let cache = LocalCache::in_memory().unwrap();
    cache.write_raw("{ not json").unwrap();

    let state = cache.load();
    assert_eq!(state.goals.len(), 2);
    assert_eq!(state.theme, ThemeMode::Dark);
}

#[test]
fn clear_removes_document() {
    let cache = LocalCache::in_memory().unwrap();
    let mut state = AppState::seeded();
    state.goals.clear();
    cache.save(&state).unwrap();

    cache.clear().unwrap();

    assert_eq!(cache.load().goals.len(), 2);
    assert!(cache.last_updated().unwrap().is_none());
}
