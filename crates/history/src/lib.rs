/// Generation history store
///
/// Persists the list of submitted generation jobs as a single JSON
/// file. Every operation loads the whole array, mutates in memory and
/// rewrites the blob; at the expected scale (tens of items) that is
/// the whole design. There is no schema migration and no version
/// field.
use providers::ProviderKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("history file corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("no history item matching '{0}'")]
    NotFound(String),
}

/// Lifecycle state of a tracked job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Submitted, waiting on the provider
    Processing,
    /// Finished with media
    Completed,
    /// Finished without media (provider failure, timeout or cancel)
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One persisted generation job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryItem {
    /// Client-generated identifier, unique and immutable
    pub id: String,

    /// Provider-issued task identifier, present once submitted
    pub task_id: Option<String>,

    /// Final media location, present once completed
    pub media_uri: Option<String>,

    /// User-supplied prompt text
    pub description: String,

    /// Model the job was submitted to
    pub model_id: String,

    /// Provider that owns the task id
    pub provider: ProviderKind,

    /// Lifecycle state
    pub status: JobStatus,

    /// Submission time, epoch seconds
    pub created_at: i64,

    /// Terminal-transition time, epoch seconds
    pub completed_at: Option<i64>,

    /// Failure detail for failed items
    pub error: Option<String>,
}

impl HistoryItem {
    /// Create a new `Processing` item at the current time
    pub fn new(
        model_id: impl Into<String>,
        provider: ProviderKind,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: generate_id(),
            task_id: None,
            media_uri: None,
            description: description.into(),
            model_id: model_id.into(),
            provider,
            status: JobStatus::Processing,
            created_at: current_timestamp(),
            completed_at: None,
            error: None,
        }
    }

    /// With the provider task id attached
    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// Wall-clock age in seconds
    pub fn age_secs(&self) -> i64 {
        current_timestamp() - self.created_at
    }
}

/// Partial update merged into an existing item
#[derive(Debug, Clone, Default)]
pub struct HistoryUpdate {
    pub status: Option<JobStatus>,
    pub media_uri: Option<String>,
    pub error: Option<String>,
}

impl HistoryUpdate {
    /// Terminal completion with a media URL
    pub fn completed(media_uri: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            media_uri: Some(media_uri.into()),
            error: None,
        }
    }

    /// Terminal failure with a reason
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            media_uri: None,
            error: Some(error.into()),
        }
    }
}

/// History store over one JSON file
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    /// Store rooted at an explicit file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default per-user location
    pub fn default_path() -> PathBuf {
        let base = dirs::data_local_dir().unwrap_or_else(std::env::temp_dir);
        base.join("reelgen").join("history.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All items, newest first
    pub fn list(&self) -> Result<Vec<HistoryItem>, HistoryError> {
        let mut items = self.load()?;
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }

    /// Items still waiting on a provider
    pub fn processing(&self) -> Result<Vec<HistoryItem>, HistoryError> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|i| i.status == JobStatus::Processing)
            .collect())
    }

    /// Look up one item by id
    pub fn get(&self, id: &str) -> Result<HistoryItem, HistoryError> {
        self.load()?
            .into_iter()
            .find(|i| i.id == id)
            .ok_or_else(|| HistoryError::NotFound(id.to_string()))
    }

    /// Append a new item
    pub fn append(&self, item: HistoryItem) -> Result<(), HistoryError> {
        let mut items = self.load()?;
        items.push(item);
        self.store(&items)
    }

    /// Merge an update into the item carrying this task id.
    ///
    /// Terminal items are never mutated again, which makes repeated
    /// terminal updates idempotent and forbids re-entering
    /// `Processing`. Returns the stored item after the merge.
    pub fn update_by_task_id(
        &self,
        task_id: &str,
        update: HistoryUpdate,
    ) -> Result<HistoryItem, HistoryError> {
        self.update_where(
            |item| item.task_id.as_deref() == Some(task_id),
            task_id,
            update,
        )
    }

    /// Merge an update into the item with this id. Cancellation goes
    /// through here since an item may not have a task id yet.
    pub fn update_by_id(
        &self,
        id: &str,
        update: HistoryUpdate,
    ) -> Result<HistoryItem, HistoryError> {
        self.update_where(|item| item.id == id, id, update)
    }

    /// Delete one item by id
    pub fn delete(&self, id: &str) -> Result<(), HistoryError> {
        let mut items = self.load()?;
        let before = items.len();
        items.retain(|i| i.id != id);
        if items.len() == before {
            return Err(HistoryError::NotFound(id.to_string()));
        }
        self.store(&items)
    }

    /// Drop everything
    pub fn clear(&self) -> Result<(), HistoryError> {
        self.store(&[])
    }

    fn update_where<F>(
        &self,
        predicate: F,
        key: &str,
        update: HistoryUpdate,
    ) -> Result<HistoryItem, HistoryError>
    where
        F: Fn(&HistoryItem) -> bool,
    {
        let mut items = self.load()?;
        let item = items
            .iter_mut()
            .find(|i| predicate(i))
            .ok_or_else(|| HistoryError::NotFound(key.to_string()))?;

        if item.status.is_terminal() {
            log::debug!("ignoring update for terminal item {}", item.id);
            return Ok(item.clone());
        }

        if let Some(status) = update.status {
            item.status = status;
            if status.is_terminal() {
                item.completed_at = Some(current_timestamp());
            }
        }
        if let Some(uri) = update.media_uri {
            item.media_uri = Some(uri);
        }
        if let Some(error) = update.error {
            item.error = Some(error);
        }

        let updated = item.clone();
        self.store(&items)?;
        Ok(updated)
    }

    fn load(&self) -> Result<Vec<HistoryItem>, HistoryError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let json = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&json)?)
    }

    fn store(&self, items: &[HistoryItem]) -> Result<(), HistoryError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(items)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

/// Generate a timestamp-derived unique id
pub fn generate_id() -> String {
    use sha2::{Digest, Sha256};

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let input = format!("{}-{}", now, rand::random::<u64>());
    let hash = Sha256::digest(input.as_bytes());
    hex::encode(&hash[..8])
}

/// Current time as epoch seconds
pub fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> HistoryStore {
        HistoryStore::new(dir.path().join("history.json"))
    }

    fn item() -> HistoryItem {
        HistoryItem::new("kling-2.5-turbo", ProviderKind::Kling, "sunset")
            .with_task_id("text2video:abc123")
    }

    #[test]
    fn test_id_uniqueness() {
        assert_ne!(generate_id(), generate_id());
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_append_and_list_newest_first() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let mut older = item();
        older.created_at -= 60;
        let newer = item();

        store.append(older.clone()).unwrap();
        store.append(newer.clone()).unwrap();

        let items = store.list().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, newer.id);
        assert_eq!(items[1].id, older.id);
    }

    #[test]
    fn test_completion_transition() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.append(item()).unwrap();

        let updated = store
            .update_by_task_id(
                "text2video:abc123",
                HistoryUpdate::completed("https://cdn.test/out.mp4"),
            )
            .unwrap();

        assert_eq!(updated.status, JobStatus::Completed);
        assert_eq!(updated.media_uri.as_deref(), Some("https://cdn.test/out.mp4"));
        assert!(updated.completed_at.is_some());
    }

    #[test]
    fn test_terminal_update_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.append(item()).unwrap();

        let first = store
            .update_by_task_id(
                "text2video:abc123",
                HistoryUpdate::completed("https://cdn.test/out.mp4"),
            )
            .unwrap();
        let second = store
            .update_by_task_id(
                "text2video:abc123",
                HistoryUpdate::completed("https://cdn.test/out.mp4"),
            )
            .unwrap();

        assert_eq!(first.completed_at, second.completed_at);
        assert_eq!(first.media_uri, second.media_uri);
    }

    #[test]
    fn test_terminal_state_never_reverses() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.append(item()).unwrap();

        store
            .update_by_task_id("text2video:abc123", HistoryUpdate::failed("timeout"))
            .unwrap();

        // A late completion report must not resurrect the item
        let after = store
            .update_by_task_id(
                "text2video:abc123",
                HistoryUpdate::completed("https://cdn.test/late.mp4"),
            )
            .unwrap();

        assert_eq!(after.status, JobStatus::Failed);
        assert!(after.media_uri.is_none());

        // And nothing can push it back to processing
        let reprocessed = store
            .update_by_task_id(
                "text2video:abc123",
                HistoryUpdate {
                    status: Some(JobStatus::Processing),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(reprocessed.status, JobStatus::Failed);
    }

    #[test]
    fn test_delete_and_clear() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let a = item();
        let b = item();
        store.append(a.clone()).unwrap();
        store.append(b.clone()).unwrap();

        store.delete(&a.id).unwrap();
        assert_eq!(store.list().unwrap().len(), 1);
        assert!(matches!(
            store.delete(&a.id),
            Err(HistoryError::NotFound(_))
        ));

        store.clear().unwrap();
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_processing_filter() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let a = item();
        store.append(a.clone()).unwrap();
        store.append(item()).unwrap();

        store
            .update_by_id(&a.id, HistoryUpdate::failed("cancelled"))
            .unwrap();

        let active = store.processing().unwrap();
        assert_eq!(active.len(), 1);
        assert_ne!(active[0].id, a.id);
    }
}
