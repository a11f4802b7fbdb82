use std::collections::BTreeSet;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::schedule::TimeFilter;
use crate::storage::{Storage, namespaced};
use crate::types::AnimeRecord;

pub const PREFERENCES_KEY: &str = "preferences";
pub const FAVORITES_KEY: &str = "favorites";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewPreferences {
    pub dark_mode: bool,
    pub compact_view: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FavoriteSet(BTreeSet<u64>);

impl FavoriteSet {
    pub fn contains(&self, id: u64) -> bool {
        self.0.contains(&id)
    }

    /// Adds `id` if absent, removes it otherwise. Returns whether `id` is a
    /// favorite afterwards.
    pub fn toggle(&mut self, id: u64) -> bool {
        if self.0.remove(&id) {
            false
        } else {
            self.0.insert(id);
            true
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// UI state of the viewer. Preferences and favorites are written back to
/// storage on every change; the rest lives only as long as the view.
pub struct ViewState<S> {
    storage: S,
    preferences: ViewPreferences,
    favorites: FavoriteSet,
    selected: Option<AnimeRecord>,
    online: bool,
    filter: TimeFilter,
}

impl<S: Storage> ViewState<S> {
    pub fn load(storage: S) -> Self {
        let preferences = read_slice(&storage, PREFERENCES_KEY);
        let favorites = read_slice(&storage, FAVORITES_KEY);
        Self {
            storage,
            preferences,
            favorites,
            selected: None,
            online: true,
            filter: TimeFilter::default(),
        }
    }

    pub fn preferences(&self) -> ViewPreferences {
        self.preferences
    }

    pub fn favorites(&self) -> &FavoriteSet {
        &self.favorites
    }

    pub fn selected(&self) -> Option<&AnimeRecord> {
        self.selected.as_ref()
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn filter(&self) -> TimeFilter {
        self.filter
    }

    pub fn toggle_dark_mode(&mut self) -> bool {
        self.preferences.dark_mode = !self.preferences.dark_mode;
        self.persist_preferences();
        self.preferences.dark_mode
    }

    pub fn toggle_compact_view(&mut self) -> bool {
        self.preferences.compact_view = !self.preferences.compact_view;
        self.persist_preferences();
        self.preferences.compact_view
    }

    pub fn toggle_favorite(&mut self, id: u64) -> bool {
        let now_favorite = self.favorites.toggle(id);
        write_slice(&self.storage, FAVORITES_KEY, &self.favorites);
        now_favorite
    }

    pub fn is_favorite(&self, id: u64) -> bool {
        self.favorites.contains(id)
    }

    pub fn select(&mut self, record: AnimeRecord) {
        self.selected = Some(record);
    }

    pub fn dismiss(&mut self) {
        self.selected = None;
    }

    pub fn set_online(&mut self, online: bool) {
        if self.online != online {
            tracing::info!(online, "relay connectivity changed");
        }
        self.online = online;
    }

    pub fn set_filter(&mut self, filter: TimeFilter) {
        self.filter = filter;
    }

    fn persist_preferences(&self) {
        write_slice(&self.storage, PREFERENCES_KEY, &self.preferences);
    }
}

fn read_slice<T: DeserializeOwned + Default>(storage: &impl Storage, key: &str) -> T {
    let raw = match storage.get_item(&namespaced(key)) {
        Ok(Some(raw)) => raw,
        Ok(None) => return T::default(),
        Err(err) => {
            tracing::warn!(key, error = %err, "failed to read persisted view state");
            return T::default();
        }
    };
    serde_json::from_str(&raw).unwrap_or_else(|err| {
        tracing::warn!(key, error = %err, "ignoring corrupted view state");
        T::default()
    })
}

fn write_slice<T: Serialize>(storage: &impl Storage, key: &str, value: &T) {
    let raw = match serde_json::to_string(value) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::warn!(key, error = %err, "failed to encode view state");
            return;
        }
    };
    if let Err(err) = storage.set_item(&namespaced(key), &raw) {
        tracing::warn!(key, error = %err, "failed to persist view state");
    }
}
