use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{Result, StoreError};

/// One coordination record shared between agents.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub agent_name: String,
    pub task_id: String,
    pub category: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

/// Fields supplied when storing a new entry.
#[derive(Clone, Debug, Default)]
pub struct NewEntry {
    pub agent_name: String,
    pub task_id: String,
    pub category: String,
    pub title: String,
    pub content: String,
    pub metadata: Map<String, Value>,
    pub tags: Vec<String>,
}

impl NewEntry {
    pub fn new(
        agent_name: impl Into<String>,
        task_id: impl Into<String>,
        category: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            task_id: task_id.into(),
            category: category.into(),
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Mutable fields of an entry. Identity, author, task and category are fixed.
#[derive(Clone, Debug, Default)]
pub struct MemoryUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub metadata: Option<Map<String, Value>>,
    pub tags: Option<Vec<String>>,
}

impl MemoryUpdate {
    /// Names of the fields this update touches.
    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.title.is_some() {
            fields.push("title");
        }
        if self.content.is_some() {
            fields.push("content");
        }
        if self.metadata.is_some() {
            fields.push("metadata");
        }
        if self.tags.is_some() {
            fields.push("tags");
        }
        fields
    }

    fn apply(self, entry: &mut MemoryEntry) {
        if let Some(title) = self.title {
            entry.title = title;
        }
        if let Some(content) = self.content {
            entry.content = content;
        }
        if let Some(metadata) = self.metadata {
            entry.metadata = metadata;
        }
        if let Some(tags) = self.tags {
            entry.tags = tags.into_iter().collect();
        }
    }
}

/// Conjunctive search filters. Unset filters match everything.
#[derive(Clone, Debug, Default)]
pub struct MemoryQuery {
    pub agent_name: Option<String>,
    pub task_id: Option<String>,
    pub category: Option<String>,
    /// Matches when the entry shares at least one tag.
    pub tags: Vec<String>,
    /// Case-insensitive substring of `content`.
    pub content_contains: Option<String>,
    /// Cap on results. `None` and `Some(0)` both mean unlimited.
    pub limit: Option<usize>,
}

impl MemoryQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn agent(mut self, agent_name: impl Into<String>) -> Self {
        self.agent_name = Some(agent_name.into());
        self
    }

    pub fn task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn content(mut self, needle: impl Into<String>) -> Self {
        self.content_contains = Some(needle.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, entry: &MemoryEntry, needle: Option<&str>) -> bool {
        if self.agent_name.as_ref().is_some_and(|a| *a != entry.agent_name) {
            return false;
        }
        if self.task_id.as_ref().is_some_and(|t| *t != entry.task_id) {
            return false;
        }
        if self.category.as_ref().is_some_and(|c| *c != entry.category) {
            return false;
        }
        if !self.tags.is_empty() && !self.tags.iter().any(|t| entry.tags.contains(t)) {
            return false;
        }
        if let Some(needle) = needle {
            if !entry.content.to_lowercase().contains(needle) {
                return false;
            }
        }
        true
    }
}

/// Usage statistics.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MemoryStats {
    pub total_entries: usize,
    pub categories: BTreeMap<String, usize>,
    pub agents: BTreeMap<String, usize>,
    /// Content plus serialized metadata, in bytes.
    pub estimated_size_bytes: usize,
    pub memory_dir: Option<PathBuf>,
}

struct MemoryState {
    entries: HashMap<String, MemoryEntry>,
    last_stamp: Option<DateTime<Utc>>,
}

impl MemoryState {
    /// Strictly increasing clock reading, so ids never collide and
    /// newest-first ordering is total within the process.
    fn next_stamp(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_stamp {
            if now <= last {
                now = last + Duration::microseconds(1);
            }
        }
        self.last_stamp = Some(now);
        now
    }

    fn next_id(&mut self) -> (String, DateTime<Utc>) {
        loop {
            let stamp = self.next_stamp();
            let id = format!("mem_{}", stamp.format("%Y%m%d_%H%M%S_%6f"));
            if !self.entries.contains_key(&id) {
                return (id, stamp);
            }
        }
    }
}

/// Shared coordination memory, persisted one JSON file per entry.
///
/// Every operation takes the same mutex; there are no multi-call transactions.
pub struct SharedMemory {
    dir: Option<PathBuf>,
    auto_persist: bool,
    state: Mutex<MemoryState>,
}

impl SharedMemory {
    /// Open a store rooted at `dir`, creating it if needed and loading every
    /// `*.json` entry file found there. Unreadable files are skipped.
    pub fn open(dir: impl Into<PathBuf>, auto_persist: bool) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let entries = load_dir(&dir)?;
        debug!(dir = %dir.display(), count = entries.len(), "shared memory loaded");
        Ok(Self {
            dir: Some(dir),
            auto_persist,
            state: Mutex::new(MemoryState {
                entries,
                last_stamp: None,
            }),
        })
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            auto_persist: false,
            state: Mutex::new(MemoryState {
                entries: HashMap::new(),
                last_stamp: None,
            }),
        }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert and persist a new entry, returning its id.
    pub fn store(&self, new: NewEntry) -> Result<String> {
        let mut state = self.state.lock();
        let (id, timestamp) = state.next_id();
        let entry = MemoryEntry {
            id: id.clone(),
            agent_name: new.agent_name,
            task_id: new.task_id,
            category: new.category,
            title: new.title,
            content: new.content,
            metadata: new.metadata,
            timestamp,
            tags: new.tags.into_iter().collect(),
        };
        self.persist(&entry)?;
        debug!(entry_id = %id, agent = %entry.agent_name, category = %entry.category, "memory entry stored");
        state.entries.insert(id.clone(), entry);
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Option<MemoryEntry> {
        self.state.lock().entries.get(id).cloned()
    }

    /// Apply an update and refresh the timestamp. `Ok(false)` if the id is unknown.
    pub fn update(&self, id: &str, update: MemoryUpdate) -> Result<bool> {
        let mut state = self.state.lock();
        let Some(current) = state.entries.get(id) else {
            return Ok(false);
        };
        let mut updated = current.clone();
        update.apply(&mut updated);
        updated.timestamp = state.next_stamp();
        self.persist(&updated)?;
        state.entries.insert(id.to_string(), updated);
        Ok(true)
    }

    /// Remove an entry and its file. `Ok(false)` if the id is unknown.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let mut state = self.state.lock();
        if !state.entries.contains_key(id) {
            return Ok(false);
        }
        if let Some(dir) = &self.dir {
            remove_file_if_present(&entry_path(dir, id))?;
        }
        state.entries.remove(id);
        debug!(entry_id = %id, "memory entry deleted");
        Ok(true)
    }

    /// Filtered entries, newest first.
    pub fn search(&self, query: &MemoryQuery) -> Vec<MemoryEntry> {
        let needle = query.content_contains.as_ref().map(|n| n.to_lowercase());
        let state = self.state.lock();
        let mut results: Vec<MemoryEntry> = state
            .entries
            .values()
            .filter(|e| query.matches(e, needle.as_deref()))
            .cloned()
            .collect();
        drop(state);

        results.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
        if let Some(limit) = query.limit.filter(|&n| n > 0) {
            results.truncate(limit);
        }
        results
    }

    pub fn recent(&self, limit: usize) -> Vec<MemoryEntry> {
        self.search(&MemoryQuery::new().limit(limit))
    }

    pub fn by_category(&self, category: &str, limit: Option<usize>) -> Vec<MemoryEntry> {
        let mut query = MemoryQuery::new().category(category);
        query.limit = limit;
        self.search(&query)
    }

    pub fn task_history(&self, task_id: &str) -> Vec<MemoryEntry> {
        self.search(&MemoryQuery::new().task(task_id))
    }

    pub fn stats(&self) -> MemoryStats {
        let state = self.state.lock();
        let mut categories = BTreeMap::new();
        let mut agents = BTreeMap::new();
        let mut size = 0;
        for entry in state.entries.values() {
            *categories.entry(entry.category.clone()).or_insert(0) += 1;
            *agents.entry(entry.agent_name.clone()).or_insert(0) += 1;
            size += entry.content.len() + Value::Object(entry.metadata.clone()).to_string().len();
        }
        MemoryStats {
            total_entries: state.entries.len(),
            categories,
            agents,
            estimated_size_bytes: size,
            memory_dir: self.dir.clone(),
        }
    }

    /// Drop every entry and every entry file in the directory.
    pub fn clear_all(&self) -> Result<usize> {
        let mut state = self.state.lock();
        let count = state.entries.len();
        if let Some(dir) = &self.dir {
            for path in json_files(dir)? {
                remove_file_if_present(&path)?;
            }
        }
        state.entries.clear();
        warn!(count, "shared memory cleared");
        Ok(count)
    }

    fn persist(&self, entry: &MemoryEntry) -> Result<()> {
        let Some(dir) = self.dir.as_ref().filter(|_| self.auto_persist) else {
            return Ok(());
        };
        let path = entry_path(dir, &entry.id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(entry)?;
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

fn entry_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{id}.json"))
}

fn json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for item in std::fs::read_dir(dir)? {
        let path = item?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    Ok(files)
}

fn load_dir(dir: &Path) -> Result<HashMap<String, MemoryEntry>> {
    let mut entries = HashMap::new();
    for path in json_files(dir)? {
        match read_entry(&path) {
            Ok(entry) => {
                entries.insert(entry.id.clone(), entry);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable memory file"),
        }
    }
    Ok(entries)
}

fn read_entry(path: &Path) -> Result<MemoryEntry> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn remove_file_if_present(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::Io(format!("{}: {e}", path.display()))),
    }
}
