use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use engine_logging::engine_info;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use watch_core::Fingerprint;

use crate::persist::{write_atomic, PersistError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteRecord {
    pub url: String,
    pub title: String,
    pub last_search: DateTime<Utc>,
    pub fingerprint: Fingerprint,
    /// Set only when a scan saw the fingerprint change.
    pub latest_updated: Option<DateTime<Utc>>,
}

/// A detected content change to record for a site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteChange {
    pub title: String,
    pub fingerprint: Fingerprint,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("site '{0}' not found")]
    NotFound(String),
    #[error("site '{0}' already exists")]
    AlreadyExists(String),
    #[error("site '{0}' is already pending")]
    AlreadyPending(String),
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),
    #[error("store file {path:?}: {message}")]
    Serialize { path: PathBuf, message: String },
    #[error("store lock poisoned")]
    Poisoned,
}

/// Persistent record of known sites and the queue of sites awaiting their
/// first scan. Each call is atomic on its own; there are no transactions.
pub trait SiteStore: Send + Sync {
    fn list_urls(&self) -> Result<Vec<String>, StoreError>;

    fn list_records(&self) -> Result<Vec<SiteRecord>, StoreError>;

    fn get(&self, url: &str) -> Result<SiteRecord, StoreError>;

    fn create(&self, url: &str, title: &str, fingerprint: Fingerprint) -> Result<(), StoreError>;

    /// Refreshes the last-search time, and with a change also the title,
    /// fingerprint and latest-updated time.
    fn update(&self, url: &str, change: Option<SiteChange>) -> Result<(), StoreError>;

    fn delete(&self, url: &str) -> Result<(), StoreError>;

    fn list_pending(&self) -> Result<Vec<String>, StoreError>;

    /// Queues a url for its first scan. Known or already pending urls are
    /// rejected.
    fn enqueue_pending(&self, url: &str) -> Result<(), StoreError>;

    fn dequeue_pending(&self, url: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct StoreState {
    sites: BTreeMap<String, SiteRecord>,
    pending: Vec<String>,
}

impl StoreState {
    fn get(&self, url: &str) -> Result<SiteRecord, StoreError> {
        self.sites
            .get(url)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(url.to_string()))
    }

    fn create(
        &mut self,
        url: &str,
        title: &str,
        fingerprint: Fingerprint,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if self.sites.contains_key(url) {
            return Err(StoreError::AlreadyExists(url.to_string()));
        }
        self.sites.insert(
            url.to_string(),
            SiteRecord {
                url: url.to_string(),
                title: title.to_string(),
                last_search: now,
                fingerprint,
                latest_updated: None,
            },
        );
        Ok(())
    }

    fn update(
        &mut self,
        url: &str,
        change: Option<SiteChange>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let record = self
            .sites
            .get_mut(url)
            .ok_or_else(|| StoreError::NotFound(url.to_string()))?;
        record.last_search = now;
        if let Some(change) = change {
            record.title = change.title;
            record.fingerprint = change.fingerprint;
            record.latest_updated = Some(now);
        }
        Ok(())
    }

    fn delete(&mut self, url: &str) -> Result<(), StoreError> {
        self.sites
            .remove(url)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(url.to_string()))
    }

    fn enqueue_pending(&mut self, url: &str) -> Result<(), StoreError> {
        if self.sites.contains_key(url) {
            return Err(StoreError::AlreadyExists(url.to_string()));
        }
        if self.pending.iter().any(|pending| pending == url) {
            return Err(StoreError::AlreadyPending(url.to_string()));
        }
        self.pending.push(url.to_string());
        Ok(())
    }

    fn dequeue_pending(&mut self, url: &str) -> Result<(), StoreError> {
        let index = self
            .pending
            .iter()
            .position(|pending| pending == url)
            .ok_or_else(|| StoreError::NotFound(url.to_string()))?;
        self.pending.remove(index);
        Ok(())
    }
}

/// Site store kept in memory and, when opened from a path, mirrored to a RON
/// file after every successful mutation.
pub struct LocalStore {
    state: Mutex<StoreState>,
    path: Option<PathBuf>,
}

impl LocalStore {
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            path: None,
        }
    }

    /// Loads the store file at `path`, starting empty when it does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = match fs::read_to_string(&path) {
            Ok(text) => ron::from_str(&text).map_err(|err| StoreError::Serialize {
                path: path.clone(),
                message: err.to_string(),
            })?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                engine_info!("No store file at {:?}, starting empty", path);
                StoreState::default()
            }
            Err(err) => return Err(StoreError::Persist(PersistError::Io(err))),
        };
        Ok(Self {
            state: Mutex::new(state),
            path: Some(path),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Poisoned)
    }

    fn read<T>(&self, op: impl FnOnce(&StoreState) -> T) -> Result<T, StoreError> {
        let state = self.lock()?;
        Ok(op(&*state))
    }

    /// Applies `op` to a copy and commits it only once it is saved.
    fn mutate(
        &self,
        op: impl FnOnce(&mut StoreState) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let mut next = state.clone();
        op(&mut next)?;
        if let Some(path) = &self.path {
            save(path, &next)?;
        }
        *state = next;
        Ok(())
    }
}

fn save(path: &Path, state: &StoreState) -> Result<(), StoreError> {
    let pretty = ron::ser::PrettyConfig::new();
    let content =
        ron::ser::to_string_pretty(state, pretty).map_err(|err| StoreError::Serialize {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
    write_atomic(path, content.as_bytes())?;
    Ok(())
}

impl SiteStore for LocalStore {
    fn list_urls(&self) -> Result<Vec<String>, StoreError> {
        self.read(|state| state.sites.keys().cloned().collect())
    }

    fn list_records(&self) -> Result<Vec<SiteRecord>, StoreError> {
        self.read(|state| state.sites.values().cloned().collect())
    }

    fn get(&self, url: &str) -> Result<SiteRecord, StoreError> {
        self.lock()?.get(url)
    }

    fn create(&self, url: &str, title: &str, fingerprint: Fingerprint) -> Result<(), StoreError> {
        let now = Utc::now();
        self.mutate(|state| state.create(url, title, fingerprint, now))
    }

    fn update(&self, url: &str, change: Option<SiteChange>) -> Result<(), StoreError> {
        let now = Utc::now();
        self.mutate(|state| state.update(url, change, now))
    }

    fn delete(&self, url: &str) -> Result<(), StoreError> {
        self.mutate(|state| state.delete(url))
    }

    fn list_pending(&self) -> Result<Vec<String>, StoreError> {
        self.read(|state| state.pending.clone())
    }

    fn enqueue_pending(&self, url: &str) -> Result<(), StoreError> {
        self.mutate(|state| state.enqueue_pending(url))
    }

    fn dequeue_pending(&self, url: &str) -> Result<(), StoreError> {
        self.mutate(|state| state.dequeue_pending(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn text(value: &str) -> Fingerprint {
        Fingerprint::Text {
            text: value.into(),
            length: value.len(),
        }
    }

    #[test]
    fn update_without_change_only_refreshes_search_time() {
        let t0 = Utc::now();
        let t1 = t0 + Duration::minutes(5);
        let mut state = StoreState::default();
        state.create("https://a.com/", "A", text("x"), t0).unwrap();

        state.update("https://a.com/", None, t1).unwrap();
        let record = state.get("https://a.com/").unwrap();
        assert_eq!(record.last_search, t1);
        assert_eq!(record.latest_updated, None);
        assert_eq!(record.fingerprint, text("x"));
    }

    #[test]
    fn update_with_change_sets_latest_updated() {
        let t0 = Utc::now();
        let t1 = t0 + Duration::minutes(5);
        let mut state = StoreState::default();
        state.create("https://a.com/", "A", text("x"), t0).unwrap();

        let change = SiteChange {
            title: "A2".into(),
            fingerprint: text("y"),
        };
        state.update("https://a.com/", Some(change), t1).unwrap();
        let record = state.get("https://a.com/").unwrap();
        assert_eq!(record.title, "A2");
        assert_eq!(record.fingerprint, text("y"));
        assert_eq!(record.latest_updated, Some(t1));
    }

    #[test]
    fn pending_rejects_known_and_duplicate_urls() {
        let mut state = StoreState::default();
        state.create("https://a.com/", "A", text("x"), Utc::now()).unwrap();

        assert!(matches!(
            state.enqueue_pending("https://a.com/"),
            Err(StoreError::AlreadyExists(_))
        ));
        state.enqueue_pending("https://b.com/").unwrap();
        assert!(matches!(
            state.enqueue_pending("https://b.com/"),
            Err(StoreError::AlreadyPending(_))
        ));
        state.dequeue_pending("https://b.com/").unwrap();
        assert!(matches!(
            state.dequeue_pending("https://b.com/"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn failed_mutation_leaves_state_untouched() {
        let store = LocalStore::in_memory();
        store.create("https://a.com/", "A", text("x")).unwrap();
        assert!(store.create("https://a.com/", "B", text("y")).is_err());
        assert_eq!(store.get("https://a.com/").unwrap().title, "A");
    }
}
