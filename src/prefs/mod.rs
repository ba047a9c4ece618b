/// Client-local preference storage.
/// The storefront used to scatter this state across process-wide browser
/// storage; here it is an injected seam so tests can observe and reset it.
// region:    --- Imports
use crate::query::handlers::BrowseParams;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

// endregion: --- Imports

// region:    --- Preference Store

/// Key-value store for client-side preferences.
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn put(&self, key: &str, value: String);
    fn remove(&self, key: &str);
}

/// In-memory store; the only implementation this crate ships.
#[derive(Default)]
pub struct InMemoryPreferenceStore {
    entries: Mutex<HashMap<String, String>>,
}

impl InMemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for InMemoryPreferenceStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    fn put(&self, key: &str, value: String) {
        self.entries.lock().unwrap().insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.entries.lock().unwrap().remove(key);
    }
}

// endregion: --- Preference Store

// region:    --- Typed Preferences

const DISMISSED_ANNOUNCEMENTS_KEY: &str = "dismissed_announcements";
const CACHED_FILTERS_KEY: &str = "marketplace_filters";

/// Announcement banners the user has closed.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DismissedAnnouncements {
    pub ids: Vec<i64>,
}

pub fn dismissed_announcements(store: &dyn PreferenceStore) -> DismissedAnnouncements {
    store
        .get(DISMISSED_ANNOUNCEMENTS_KEY)
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_default()
}

pub fn dismiss_announcement(store: &dyn PreferenceStore, id: i64) {
    let mut dismissed = dismissed_announcements(store);
    if !dismissed.ids.contains(&id) {
        dismissed.ids.push(id);
    }
    if let Ok(raw) = serde_json::to_string(&dismissed) {
        store.put(DISMISSED_ANNOUNCEMENTS_KEY, raw);
    }
}

/// Last marketplace filters the user applied.
pub fn cached_filters(store: &dyn PreferenceStore) -> Option<BrowseParams> {
    store
        .get(CACHED_FILTERS_KEY)
        .and_then(|raw| serde_json::from_str(&raw).ok())
}

pub fn cache_filters(store: &dyn PreferenceStore, filters: &BrowseParams) {
    if let Ok(raw) = serde_json::to_string(filters) {
        store.put(CACHED_FILTERS_KEY, raw);
    }
}

pub fn clear_cached_filters(store: &dyn PreferenceStore) {
    store.remove(CACHED_FILTERS_KEY);
}

// endregion: --- Typed Preferences

// endregion: --- Tests
