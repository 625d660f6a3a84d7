//! Read history stores and the read-state filter applied to freshly fetched pages.

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};

use crate::story::Story;

/// Default bound on remembered ids; the oldest ids are forgotten first.
pub const DEFAULT_HISTORY_CAP: usize = 5_000;

/// Persisted set of previously viewed article ids.
pub trait ReadHistory: Send + Sync {
    fn has_been_read(&self, id: &str) -> bool;
    fn mark_as_read(&self, id: &str);
    fn all_read_ids(&self) -> Vec<String>;
}

#[derive(Debug, Default)]
struct Ids {
    order: VecDeque<String>,
    set: HashSet<String>,
}

impl Ids {
    fn from_list(list: Vec<String>, cap: usize) -> Self {
        let mut ids = Ids::default();
        for id in list {
            ids.insert(id, cap);
        }
        ids
    }

    /// Returns false when the id was already present.
    fn insert(&mut self, id: String, cap: usize) -> bool {
        if !self.set.insert(id.clone()) {
            return false;
        }
        self.order.push_back(id);
        while self.order.len() > cap {
            if let Some(old) = self.order.pop_front() {
                self.set.remove(&old);
            }
        }
        true
    }
}

/// In-memory history; lost on restart.
#[derive(Debug)]
pub struct MemoryReadHistory {
    inner: Mutex<Ids>,
    cap: usize,
}

impl MemoryReadHistory {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAP)
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            inner: Mutex::new(Ids::default()),
            cap: cap.max(1),
        }
    }

    pub fn with_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let h = Self::new();
        for id in ids {
            h.mark_as_read(&id.into());
        }
        h
    }
}

impl Default for MemoryReadHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadHistory for MemoryReadHistory {
    fn has_been_read(&self, id: &str) -> bool {
        let g = self.inner.lock().expect("read history mutex poisoned");
        g.set.contains(id)
    }

    fn mark_as_read(&self, id: &str) {
        let mut g = self.inner.lock().expect("read history mutex poisoned");
        g.insert(id.to_string(), self.cap);
    }

    fn all_read_ids(&self) -> Vec<String> {
        let g = self.inner.lock().expect("read history mutex poisoned");
        g.order.iter().cloned().collect()
    }
}

/// History persisted as a JSON array of ids, rewritten on every new id.
#[derive(Debug)]
pub struct JsonReadHistory {
    path: PathBuf,
    inner: Mutex<Ids>,
    cap: usize,
}

impl JsonReadHistory {
    /// Open (or lazily create) the store at `path`. A missing or corrupt file
    /// starts an empty history.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let list: Vec<String> = match fs::read_to_string(&path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
                tracing::warn!(target: "feed", path = %path.display(), error = %e, "corrupt read history, starting empty");
                Vec::new()
            }),
            Err(_) => Vec::new(),
        };
        Self {
            path,
            inner: Mutex::new(Ids::from_list(list, DEFAULT_HISTORY_CAP)),
            cap: DEFAULT_HISTORY_CAP,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, ids: &Ids) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating history dir {}", dir.display()))?;
        }
        let body = serde_json::to_vec(&ids.order).context("serializing read history")?;
        fs::write(&self.path, body)
            .with_context(|| format!("writing read history to {}", self.path.display()))
    }
}

impl ReadHistory for JsonReadHistory {
    fn has_been_read(&self, id: &str) -> bool {
        let g = self.inner.lock().expect("read history mutex poisoned");
        g.set.contains(id)
    }

    fn mark_as_read(&self, id: &str) {
        let mut g = self.inner.lock().expect("read history mutex poisoned");
        if g.insert(id.to_string(), self.cap) {
            if let Err(e) = self.persist(&g) {
                tracing::warn!(target: "feed", "read history: {e:#}");
            }
        }
    }

    fn all_read_ids(&self) -> Vec<String> {
        let g = self.inner.lock().expect("read history mutex poisoned");
        g.order.iter().cloned().collect()
    }
}

/// Drop every news story the user has already read, except the pending
/// shared-article target. Cards are never filtered.
pub fn filter_read(
    stories: Vec<Story>,
    history: &dyn ReadHistory,
    pending_target: Option<&str>,
) -> Vec<Story> {
    let before = stories.len();
    let kept: Vec<Story> = stories
        .into_iter()
        .filter(|s| match s.news_id() {
            Some(id) => pending_target == Some(id) || !history.has_been_read(id),
            None => true,
        })
        .collect();
    let removed = before - kept.len();
    if removed > 0 {
        tracing::debug!(target: "feed", removed, "filtered already-read stories");
    }
    kept
}
